//! Output formatting for CLI commands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, TermsiftArgs};
use crate::error::Result;

/// Result structure for query runs.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryOutput {
    pub table: String,
    pub query: String,
    pub objects_loaded: usize,
    pub keys: Vec<String>,
    pub last_key: Option<String>,
    pub cost: u64,
}

/// Result structure for explained queries.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExplainOutput {
    pub table: String,
    pub query: String,
    pub tree: String,
}

impl fmt::Display for QueryOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for key in &self.keys {
            writeln!(f, "{key}")?;
        }
        writeln!(f)?;
        write!(f, "{} keys (read cost {})", self.keys.len(), self.cost)?;
        if let Some(last_key) = &self.last_key {
            write!(f, ", more after {last_key}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ExplainOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tree)
    }
}

/// Output a result in the specified format.
pub fn output_result<T>(message: &str, result: &T, args: &TermsiftArgs) -> Result<()>
where
    T: Serialize + fmt::Display,
{
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 1 {
                println!("{message}");
                println!();
            }
            println!("{result}");
            Ok(())
        }
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &TermsiftArgs) -> Result<()> {
    println!("{}", render_json(result, args.pretty)?);
    Ok(())
}

fn render_json<T: Serialize>(result: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    Ok(json)
}
