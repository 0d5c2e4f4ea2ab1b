//! Static table schema descriptions.
//!
//! A [`Schema`] names a table and lists its columns. Indexed columns carry
//! the [`TermCapability`] that derives their index terms. Schemas are built
//! once, either in code through [`SchemaBuilder`] or from a serialized
//! [`SchemaDef`], and shared behind an `Arc` afterwards.
//!
//! # Example
//!
//! ```
//! use termsift::capability::{KeywordCapability, TextCapability};
//! use termsift::schema::Schema;
//!
//! let schema = Schema::builder("users")
//!     .indexed("name", KeywordCapability::new())
//!     .indexed("bio", TextCapability::new())
//!     .column("age")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.indexed_columns().count(), 2);
//! assert_eq!(schema.term_key("name", "alice"), "users.name:alice");
//! ```

use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::capability::{self, KeywordCapability, TermCapability};
use crate::error::{Result, TermsiftError};

/// Suffix of the attribute holding a column's stored term set.
pub const TERM_SET_SUFFIX: &str = ":t";

/// A column of a table.
#[derive(Clone, Debug)]
pub struct Column {
    name: String,
    capability: Option<Arc<dyn TermCapability>>,
}

impl Column {
    /// The column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The term capability, if this column is indexed.
    pub fn capability(&self) -> Option<&Arc<dyn TermCapability>> {
        self.capability.as_ref()
    }

    /// Whether this column contributes index terms.
    pub fn is_indexed(&self) -> bool {
        self.capability.is_some()
    }

    /// Name of the attribute holding this column's stored term set.
    pub fn term_set_attribute(&self) -> String {
        format!("{}{}", self.name, TERM_SET_SUFFIX)
    }
}

/// A table schema.
#[derive(Clone, Debug)]
pub struct Schema {
    table: String,
    columns: Vec<Column>,
    positions: AHashMap<String, usize>,
}

impl Schema {
    /// Start building a schema for `table`.
    pub fn builder<S: Into<String>>(table: S) -> SchemaBuilder {
        SchemaBuilder {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Parse a schema from its JSON description.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let def: SchemaDef = serde_json::from_str(json)?;
        def.into_schema()
    }

    /// The table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// All columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The indexed columns in declaration order.
    pub fn indexed_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_indexed())
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.positions.get(name).map(|&i| &self.columns[i])
    }

    /// Look up an indexed column, failing if it is unknown or not indexed.
    pub fn indexed_column(&self, name: &str) -> Result<&Column> {
        match self.column(name) {
            Some(column) if column.is_indexed() => Ok(column),
            Some(_) => Err(TermsiftError::schema(format!(
                "column '{}.{name}' is not indexed",
                self.table
            ))),
            None => Err(TermsiftError::schema(format!(
                "unknown column '{}.{name}'",
                self.table
            ))),
        }
    }

    /// The key under which a column token is stored in the index table.
    pub fn term_key(&self, column: &str, token: &str) -> String {
        format!("{}.{column}:{token}", self.table)
    }
}

/// Builder for [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    table: String,
    columns: Vec<Column>,
}

impl SchemaBuilder {
    /// Add an indexed column.
    pub fn indexed<S, C>(self, name: S, capability: C) -> Self
    where
        S: Into<String>,
        C: TermCapability + 'static,
    {
        self.indexed_with(name, Arc::new(capability))
    }

    /// Add an indexed column with a shared capability instance.
    pub fn indexed_with<S: Into<String>>(
        mut self,
        name: S,
        capability: Arc<dyn TermCapability>,
    ) -> Self {
        self.columns.push(Column {
            name: name.into(),
            capability: Some(capability),
        });
        self
    }

    /// Add a plain, non-indexed column.
    pub fn column<S: Into<String>>(mut self, name: S) -> Self {
        self.columns.push(Column {
            name: name.into(),
            capability: None,
        });
        self
    }

    /// Validate names and build the schema.
    pub fn build(self) -> Result<Schema> {
        validate_identifier("table", &self.table)?;

        let mut positions = AHashMap::with_capacity(self.columns.len());
        for (i, column) in self.columns.iter().enumerate() {
            validate_identifier("column", &column.name)?;
            if positions.insert(column.name.clone(), i).is_some() {
                return Err(TermsiftError::schema(format!(
                    "column '{}' already exists",
                    column.name
                )));
            }
        }

        Ok(Schema {
            table: self.table,
            columns: self.columns,
            positions,
        })
    }
}

fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TermsiftError::schema(format!("{kind} name cannot be empty")));
    }
    if !name.chars().all(is_identifier_char) {
        return Err(TermsiftError::schema(format!(
            "{kind} name '{name}' may only contain letters, digits and '_'"
        )));
    }
    Ok(())
}

/// Characters allowed in table and column names.
pub fn is_identifier_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Serializable schema description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDef {
    /// The table name.
    pub table: String,
    /// Column descriptions.
    pub columns: Vec<ColumnDef>,
}

/// Serializable column description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    /// The column name.
    pub name: String,
    /// Capability name (`"keyword"` or `"text"`); absent for plain columns.
    #[serde(default)]
    pub capability: Option<String>,
    /// Lowercase keyword values.
    #[serde(default)]
    pub lowercase: bool,
}

impl SchemaDef {
    /// Resolve capability names and build the schema.
    pub fn into_schema(self) -> Result<Schema> {
        let mut builder = Schema::builder(self.table);
        for column in self.columns {
            builder = match column.capability.as_deref() {
                None => builder.column(column.name),
                Some("keyword") => builder.indexed(
                    column.name,
                    KeywordCapability::new().lowercase(column.lowercase),
                ),
                Some(name) => builder.indexed_with(column.name, capability::by_name(name)?),
            };
        }
        builder.build()
    }
}
