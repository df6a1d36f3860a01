//! Remote-table access boundary.
//!
//! The reconciliation engine talks to the remote table only through
//! [`TableApi`], so tests can substitute an in-memory fake and the HTTP
//! client stays confined to one module. Identity lookups are issued as
//! parameterized-equality SQL over exactly the identity triple (plus the
//! source column for stale-row scans); values are escaped with
//! [`escape_sql`] before interpolation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map for one remote row, keyed by column name.
pub type RowFields = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response: {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("Not authenticated; call auth() first")]
    NotAuthenticated,
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Table metadata as reported by the remote service.
#[derive(Debug, Clone, Deserialize)]
pub struct TableMetadata {
    #[serde(default)]
    pub tables: Vec<TableMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableMeta {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ColumnMeta {
    /// The link identifier carried by a link column's data blob, if any.
    pub fn link_id(&self) -> Option<String> {
        self.data
            .as_ref()
            .and_then(|data| data.get("link_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// One allowed value of a single-select column.
#[derive(Debug, Clone, Serialize)]
pub struct SelectOption {
    pub name: &'static str,
    pub color: &'static str,
    #[serde(rename = "textColor")]
    pub text_color: &'static str,
}

/// The remote table service contract consumed by the reconciler.
///
/// Every mutation is expected to be commutative and idempotent at the
/// protocol level (upsert-by-lookup, edge-create-if-absent,
/// delete-if-present) so that repeated or racing poll cycles converge.
pub trait TableApi {
    /// Exchanges the API token for a base session credential.
    fn auth(&mut self) -> Result<()>;

    /// Re-authenticates when the credential is near expiry. Returns whether
    /// a re-authentication happened (link column ids are not stable across
    /// one).
    fn refresh_auth_if_needed(&mut self) -> Result<bool>;

    fn metadata(&self) -> Result<TableMetadata>;

    fn add_table(&self, table_name: &str) -> Result<()>;

    fn add_column(
        &self,
        table_name: &str,
        column_name: &str,
        column_type: &str,
        column_data: Option<Value>,
    ) -> Result<()>;

    fn add_column_options(
        &self,
        table_name: &str,
        column_name: &str,
        options: &[SelectOption],
    ) -> Result<()>;

    /// Runs a SQL-like query and returns matching rows.
    fn query(&self, sql: &str) -> Result<Vec<RowFields>>;

    /// Inserts a row. The call does not return the assigned row id; callers
    /// re-query when they need it.
    fn append_row(&self, table_name: &str, row: &RowFields) -> Result<()>;

    fn update_row(&self, table_name: &str, row_id: &str, row: &RowFields) -> Result<()>;

    fn delete_row(&self, table_name: &str, row_id: &str) -> Result<()>;

    /// Creates a relation edge between two rows of the same table.
    fn add_link(
        &self,
        link_id: &str,
        table_name: &str,
        child_row_id: &str,
        parent_row_id: &str,
    ) -> Result<()>;
}

/// Escapes embedded single quotes for interpolation into a quoted SQL
/// string literal.
pub fn escape_sql(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escape_sql_doubles_single_quotes() {
        assert_eq!(escape_sql("it's"), "it''s");
        assert_eq!(escape_sql("no quotes"), "no quotes");
        assert_eq!(escape_sql("''"), "''''");
    }

    #[test]
    fn column_meta_exposes_link_id() {
        let column = ColumnMeta {
            name: "Parent Task".to_string(),
            column_type: "link".to_string(),
            data: Some(json!({"link_id": "aB3x"})),
        };
        assert_eq!(column.link_id().as_deref(), Some("aB3x"));

        let plain = ColumnMeta {
            name: "Machine".to_string(),
            column_type: "text".to_string(),
            data: None,
        };
        assert!(plain.link_id().is_none());
    }
}
