//! Command line argument parsing for Termsift CLI using clap.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Termsift - query secondary indexes of key-value tables
#[derive(Parser, Debug, Clone)]
#[command(name = "termsift")]
#[command(about = "Index JSON objects and run boolean index queries against them")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct TermsiftArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE", env = "TERMSIFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl TermsiftArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load objects into an in-memory index and run a query
    Query(QueryArgs),

    /// Show how a query is grouped after compilation
    Explain(ExplainArgs),
}

/// Arguments for running a query
#[derive(Parser, Debug, Clone)]
pub struct QueryArgs {
    /// Schema definition file path (JSON)
    #[arg(short, long, value_name = "SCHEMA_FILE")]
    pub schema: PathBuf,

    /// Objects to index, one JSON object per line
    #[arg(short, long, value_name = "DATA_FILE")]
    pub data: PathBuf,

    /// Field of each object holding its key
    #[arg(long, default_value = "key")]
    pub key_field: String,

    /// Parameter value for a `{name}` placeholder, as NAME=VALUE
    #[arg(short, long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Maximum number of keys to return
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Only return keys after this one
    #[arg(long)]
    pub start_key: Option<String>,

    /// Only return keys up to and including this one
    #[arg(long)]
    pub end_key: Option<String>,

    /// Use strongly consistent reads
    #[arg(long)]
    pub consistent: bool,

    /// Query string
    #[arg(value_name = "QUERY")]
    pub query: String,
}

/// Arguments for explaining a query
#[derive(Parser, Debug, Clone)]
pub struct ExplainArgs {
    /// Schema definition file path (JSON)
    #[arg(short, long, value_name = "SCHEMA_FILE")]
    pub schema: PathBuf,

    /// Query string
    #[arg(value_name = "QUERY")]
    pub query: String,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

/// Parse a `NAME=VALUE` parameter binding.
pub fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("invalid parameter '{s}', expected NAME=VALUE")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("who=alice").unwrap(),
            ("who".to_string(), "alice".to_string())
        );
        assert_eq!(
            parse_param("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_query_args() {
        let args = TermsiftArgs::try_parse_from([
            "termsift",
            "-vv",
            "--format",
            "json",
            "query",
            "--schema",
            "schema.json",
            "--data",
            "objects.jsonl",
            "-p",
            "who=alice",
            "--limit",
            "5",
            "t.name={who}",
        ])
        .unwrap();

        assert_eq!(args.verbosity(), 2);
        assert_eq!(args.output_format, OutputFormat::Json);
        match args.command {
            Command::Query(query) => {
                assert_eq!(query.query, "t.name={who}");
                assert_eq!(query.params, vec![("who".to_string(), "alice".to_string())]);
                assert_eq!(query.limit, Some(5));
                assert_eq!(query.key_field, "key");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_quiet_overrides_verbose() {
        let args = TermsiftArgs::try_parse_from([
            "termsift", "-v", "-q", "explain", "-s", "schema.json", "t.x=1",
        ])
        .unwrap();
        assert_eq!(args.verbosity(), 0);
    }
}
