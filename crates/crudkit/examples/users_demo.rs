//! Walks the `users` table through synchronization, writes and a filter.
//!
//! ```text
//! cargo run -p crudkit --example users_demo -- --verbose
//! cargo run -p crudkit --example users_demo --features duckdb -- --duckdb
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use crudkit::{
    record_from_json, FilterCompiler, FilterExpr, MemoryStore, Record, RecordWriter, Store,
    UserTable,
};
use crudkit_logging::LogConfig;
use serde_json::json;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "users_demo", about = "Synchronize and exercise the users table")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Hold this lock file while synchronizing
    #[arg(long)]
    lock: Option<PathBuf>,

    /// Use an in-memory DuckDB database instead of the in-process store
    #[cfg(feature = "duckdb")]
    #[arg(long)]
    duckdb: bool,
}

fn record(value: serde_json::Value) -> Result<Record> {
    let object = value
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("record must be a JSON object"))?;
    Ok(record_from_json(object)?)
}

fn run<S: Store>(users: UserTable<S>, lock: Option<PathBuf>) -> Result<()> {
    let report = match &lock {
        Some(path) => users.table().synchronize_exclusive(path)?,
        None => users.synchronize()?,
    };
    for sql in report.sql_statements() {
        println!("schema: {sql}");
    }

    users.create(&record(json!({
        "name": "Alice Smith",
        "email": "alice.smith@example.com"
    }))?)?;

    if let Err(err) = users.create(&record(json!({"email": "no_name@example.com"}))?) {
        println!("Error: {err}");
    }

    users.update(
        &"1".into(),
        &record(json!({"name": "Updated Name", "email": "updated.email@example.com"}))?,
    )?;

    if let Err(err) = users.update(&"2".into(), &Record::new()) {
        println!("Error: {err}");
    }

    if let Err(err) = users.delete(&"1".into()) {
        println!("Error: {err}");
    }

    users.create(&record(json!({
        "name": "Bob Johnson",
        "email": "bob.johnson@example.com"
    }))?)?;
    users.delete(&"2".into())?;
    println!("User with id 2 deleted.");

    let filter = FilterExpr::from_json(&json!({
        "name": "Bob Johnson",
        "email%": "@example.com",
        "[OR]": {
            "id>": 1,
            "id<": 2,
            "[AND]": {"id>": 3, "id<": 4},
            "[AND]333": {"id>": 5, "id<": 6}
        },
        "[OR]222": {"id>": 7, "id<": 8}
    }))?;
    let compiled = FilterCompiler::new(users.descriptor()).compile(&filter);
    if compiled.errors.is_empty() {
        println!("{}", compiled.predicate);
        let rows = users.table().select(&filter)?;
        info!(rows = rows.len(), "filtered users");
    } else {
        for err in &compiled.errors {
            println!("Error: {err}");
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    crudkit_logging::init_logging(LogConfig::new("users_demo").verbose(cli.verbose))?;

    #[cfg(feature = "duckdb")]
    if cli.duckdb {
        let conn = crudkit_db::DbConnection::open_duckdb_memory()?;
        return run(UserTable::new(conn)?, cli.lock);
    }

    run(UserTable::new(MemoryStore::new())?, cli.lock)
}
