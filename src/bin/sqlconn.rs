use serde_json::json;
use sqlconn::{load_config, Connection, DbError, Params};
use std::process::ExitCode;
use tracing::info;

const USAGE: &str = "usage: sqlconn <config.toml> <dsn | columns TABLE | select SQL [PARAMS] | exec SQL [PARAMS] | insert SQL [PARAMS]>";

fn main() -> ExitCode {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    }

    match run(&args) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<serde_json::Value, DbError> {
    let config = load_config(&args[0])?;
    let mut conn = Connection::new(config.database)?;
    info!("Using {}", conn.dsn());

    let command = args[1].as_str();
    let argument = args.get(2).map(String::as_str);
    let params = match args.get(3) {
        Some(raw) => Params::from_json(&serde_json::from_str(raw)?)?,
        None => Params::None,
    };

    match (command, argument) {
        ("dsn", _) => Ok(json!(conn.dsn())),
        ("columns", Some(table)) => Ok(serde_json::to_value(conn.columns(table)?)?),
        ("select", Some(sql)) => Ok(serde_json::to_value(conn.select(sql, params)?)?),
        ("exec", Some(sql)) => {
            let affected = conn.transaction(|c| c.update(sql, params))?;
            Ok(json!({ "affected": affected }))
        }
        ("insert", Some(sql)) => {
            let id = conn.transaction(|c| c.insert_and_get_id(sql, params))?;
            Ok(json!({ "id": id }))
        }
        _ => Err(DbError::Config(USAGE.to_string())),
    }
}
