//! Interactive REPL over a single in-process `Engine`.
//!
//! Not a query language parser: each line is one of a small set of
//! colon-prefixed commands over the "default" database, useful for
//! poking at a schema and watching IVM/observer notifications fire.
//! Anything resembling a real query language belongs in a host, not
//! this crate (spec.md §1 — plans are built through the fluent builder).

use clap::Parser;
use reactive_engine::schema::{ColumnDef, TableSchema};
use reactive_engine::value::{DataType, Value};
use reactive_engine::{Engine, PlanBuilder};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const DB: &str = "default";

#[derive(Parser)]
#[command(name = "engine", about = "Interactive shell for the reactive-engine library")]
struct Args {
    /// Path to a config.toml to load before starting (defaults built-in if absent).
    #[arg(long)]
    config: Option<String>,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    if let Some(path) = &args.config {
        match reactive_engine::config::EngineConfig::from_file(path) {
            Ok(cfg) => tracing::info!(?cfg, "loaded config"),
            Err(e) => tracing::warn!(error = %e, "failed to load config, using defaults"),
        }
    }

    let mut engine = Engine::new();
    engine.create_database(DB).expect("default database");

    let mut rl = DefaultEditor::new().expect("readline init");
    println!("reactive-engine shell. Commands: create <table> <col:type>..., tables, insert <table> <v>..., select <table>, quit");
    loop {
        match rl.readline("engine> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                if !handle(&mut engine, line.trim()) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }
}

fn handle(engine: &mut Engine, line: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [] => {}
        ["quit"] | ["exit"] => return false,
        ["tables"] => match engine.table_names(DB) {
            Ok(names) => println!("{}", names.join(", ")),
            Err(e) => eprintln!("error: {e}"),
        },
        ["create", table, cols @ ..] if !cols.is_empty() => {
            let columns: Result<Vec<ColumnDef>, String> = cols
                .iter()
                .map(|spec| parse_column(spec))
                .collect();
            match columns {
                Ok(columns) => {
                    let pk = columns[0].name.clone();
                    match TableSchema::new(*table, columns, pk, vec![]) {
                        Ok(schema) => match engine.create_table(DB, schema) {
                            Ok(()) => println!("created {table}"),
                            Err(e) => eprintln!("error: {e}"),
                        },
                        Err(e) => eprintln!("error: {e}"),
                    }
                }
                Err(e) => eprintln!("error: {e}"),
            }
        }
        ["insert", table, values @ ..] if !values.is_empty() => {
            let row: Vec<Value> = values.iter().map(|v| parse_value(v)).collect();
            match engine.insert(DB, table, vec![row]) {
                Ok(()) => println!("ok"),
                Err(e) => eprintln!("error: {e}"),
            }
        }
        ["select", table] => {
            let plan = PlanBuilder::scan(*table).build();
            match engine.select(DB, &plan) {
                Ok(rows) => {
                    for row in rows {
                        println!("{row:?}");
                    }
                }
                Err(e) => eprintln!("error: {e}"),
            }
        }
        _ => eprintln!("unrecognized command: {line}"),
    }
    true
}

fn parse_column(spec: &str) -> Result<ColumnDef, String> {
    let (name, ty) = spec.split_once(':').ok_or_else(|| format!("expected name:type, got '{spec}'"))?;
    let data_type = match ty {
        "bool" => DataType::Bool,
        "int32" => DataType::Int32,
        "int64" => DataType::Int64,
        "float64" => DataType::Float64,
        "string" => DataType::String,
        other => return Err(format!("unknown type '{other}'")),
    };
    Ok(ColumnDef::new(name, data_type, false))
}

fn parse_value(s: &str) -> Value {
    if s == "null" {
        Value::Null
    } else if let Ok(i) = s.parse::<i64>() {
        Value::Int64(i)
    } else if let Ok(f) = s.parse::<f64>() {
        Value::Float64(f)
    } else {
        Value::string(s)
    }
}
