/// Value Module
///
/// Typed values flowing in and out of statements: bound parameters, fetched
/// rows, and generated insert ids.

use crate::core::{DbError, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// A single SQL value, either bound as a parameter or read from a row.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Returns the text content, if this is a `Text` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an `Integer` value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Renders a scalar as the driver would print it, `None` for NULL.
    ///
    /// Blobs are decoded lossily as UTF-8.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Converts a JSON scalar into a bindable value.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Binding` for arrays, objects, and integers that do
    /// not fit into a signed 64-bit column.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::from(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Integer(i))
                } else if let Some(u) = n.as_u64() {
                    Value::try_from(u)
                } else {
                    n.as_f64().map(Value::Real).ok_or_else(|| {
                        DbError::Binding(format!("unrepresentable number {}", n))
                    })
                }
            }
            serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
            serde_json::Value::Array(_) => Err(DbError::Binding(
                "arrays have no SQL representation".to_string(),
            )),
            serde_json::Value::Object(_) => Err(DbError::Binding(
                "objects have no SQL representation".to_string(),
            )),
        }
    }

    /// Checks that the driver can store this value without altering it.
    fn check_bindable(&self) -> Result<()> {
        match self {
            Value::Real(f) if !f.is_finite() => Err(DbError::Binding(format!(
                "non-finite float {} cannot be bound",
                f
            ))),
            _ => Ok(()),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(i64::from(b))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl TryFrom<u64> for Value {
    type Error = DbError;

    fn try_from(u: u64) -> Result<Self> {
        i64::try_from(u)
            .map(Value::Integer)
            .map_err(|_| DbError::Binding(format!("integer {} exceeds the signed 64-bit range", u)))
    }
}

/// Parameters bound to a prepared statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    /// No placeholders
    #[default]
    None,
    /// `?` or `?N` placeholders, bound in order
    Positional(Vec<Value>),
    /// `:name` placeholders
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Builds named parameters; a missing `:` prefix is added.
    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (placeholder_name(k.as_ref()), v.into()))
                .collect(),
        )
    }

    /// Converts a JSON array (positional) or object (named) into parameters.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Params::None),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>>>()
                .map(Params::Positional),
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((placeholder_name(k), Value::from_json(v)?)))
                .collect::<Result<Vec<_>>>()
                .map(Params::Named),
            other => Err(DbError::Binding(format!(
                "parameters must be an array or an object, got {}",
                other
            ))),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::Positional(values) => values.len(),
            Params::Named(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rejects values the driver would silently coerce.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Params::None => Ok(()),
            Params::Positional(values) => values.iter().try_for_each(Value::check_bindable),
            Params::Named(pairs) => pairs.iter().try_for_each(|(_, v)| v.check_bindable()),
        }
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::None
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Params {
    fn from(values: [T; N]) -> Self {
        Params::positional(values)
    }
}

fn placeholder_name(name: &str) -> String {
    if name.starts_with([':', '@', '$']) {
        name.to_string()
    } else {
        format!(":{}", name)
    }
}

/// A fetched row: column names mapped to values, in result-set order.
///
/// When a result set repeats a column name, the later value wins and keeps
/// the position of the first occurrence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Column names in result-set order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Identifier generated by the last insert.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum InsertId {
    Int(i64),
    Text(String),
}

impl InsertId {
    /// Normalizes a driver-reported id: numeric-looking ids (`"42"`,
    /// `"1.5"`, `"1e3"`) become `Int`, truncating any fraction. Anything
    /// else is kept verbatim.
    pub fn from_driver(raw: String) -> Self {
        let trimmed = raw.trim();
        if let Ok(id) = trimmed.parse::<i64>() {
            return InsertId::Int(id);
        }
        match trimmed.parse::<f64>() {
            Ok(id) if id.is_finite() => InsertId::Int(id.trunc() as i64),
            _ => InsertId::Text(raw),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            InsertId::Int(id) => Some(*id),
            InsertId::Text(_) => None,
        }
    }
}

impl fmt::Display for InsertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertId::Int(id) => write!(f, "{}", id),
            InsertId::Text(id) => f.write_str(id),
        }
    }
}
