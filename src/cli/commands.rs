//! Command implementations for Termsift CLI.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use log::{info, warn};
use serde_json::Value;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::EngineConfig;
use crate::engine::QueryEngine;
use crate::indexer::{ColumnUpdate, WriteOptions};
use crate::key::ObjectKey;
use crate::query::{CompiledQuery, QueryOptions};
use crate::schema::Schema;
use crate::store::MemoryStore;

/// Execute a CLI command.
pub async fn execute_command(args: TermsiftArgs) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    match &args.command {
        Command::Query(query_args) => {
            let output = run_query(query_args, config).await?;
            output_result("Query results", &output, &args)?;
        }
        Command::Explain(explain_args) => {
            let output = run_explain(explain_args)?;
            output_result("Compiled query", &output, &args)?;
        }
    }
    Ok(())
}

/// Index the data file into a fresh in-memory store and run the query.
pub async fn run_query(args: &QueryArgs, config: EngineConfig) -> anyhow::Result<QueryOutput> {
    let schema = load_schema(&args.schema)?;
    let table = schema.table().to_string();

    let engine = QueryEngine::new(Arc::new(MemoryStore::new()), config)?;
    engine.register_schema(schema);
    let objects_loaded = load_objects(&engine, &table, &args.data, &args.key_field).await?;
    info!("indexed {objects_loaded} objects into {table}");

    let mut options = QueryOptions::new().with_consistent_read(args.consistent);
    options.limit = args.limit;
    options.start_key = args.start_key.as_deref().map(ObjectKey::new);
    options.end_key = args.end_key.as_deref().map(ObjectKey::new);
    options.params.extend(args.params.iter().cloned());

    let page = engine
        .try_query(&table, &args.query, options)
        .await
        .with_context(|| format!("query {:?} failed", args.query))?;

    Ok(QueryOutput {
        table,
        query: args.query.clone(),
        objects_loaded,
        keys: page.keys.iter().map(ToString::to_string).collect(),
        last_key: page.last_key.as_ref().map(ToString::to_string),
        cost: page.cost,
    })
}

/// Compile the query and render its tree.
pub fn run_explain(args: &ExplainArgs) -> anyhow::Result<ExplainOutput> {
    let schema = Arc::new(load_schema(&args.schema)?);
    let query = CompiledQuery::compile(Arc::clone(&schema), &args.query)
        .with_context(|| format!("cannot compile {:?}", args.query))?;

    Ok(ExplainOutput {
        table: schema.table().to_string(),
        query: args.query.clone(),
        tree: query.root().to_string(),
    })
}

/// Write every line of a JSONL file through the term indexer.
pub async fn load_objects(
    engine: &QueryEngine,
    table: &str,
    path: &Path,
    key_field: &str,
) -> anyhow::Result<usize> {
    let schema = engine.schema(table)?;
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut loaded = 0;

    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let object: serde_json::Map<String, Value> = serde_json::from_str(&line)
            .with_context(|| format!("line {}: expected a JSON object", line_num + 1))?;
        let key = match object.get(key_field) {
            Some(Value::String(key)) => ObjectKey::new(key.as_str()),
            Some(Value::Number(key)) => ObjectKey::new(key.to_string()),
            _ => bail!("line {}: missing string field '{key_field}'", line_num + 1),
        };

        let mut updates = Vec::new();
        for (name, value) in object {
            if name == key_field {
                continue;
            }
            if schema.column(&name).is_none() {
                warn!("line {}: ignoring unknown column '{name}'", line_num + 1);
                continue;
            }
            updates.push((name, ColumnUpdate::Set(value)));
        }

        engine
            .write(table, &key, updates, &WriteOptions::default())
            .await
            .with_context(|| format!("line {}: cannot index {key}", line_num + 1))?;
        loaded += 1;
    }

    Ok(loaded)
}

fn load_config(args: &TermsiftArgs) -> anyhow::Result<EngineConfig> {
    match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("cannot load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_schema(path: &Path) -> anyhow::Result<Schema> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("cannot read schema {}", path.display()))?;
    Ok(Schema::from_json_str(&json)?)
}
