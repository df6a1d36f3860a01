//! Reconciliation engine: maps task records onto remote-table mutations.
//!
//! The remote table has no transactions and no locks, so every operation
//! here is phrased to converge under at-least-once delivery: upsert is
//! lookup-then-write keyed by the identity triple (name, session id,
//! machine), parent links are create-if-absent with duplicate errors
//! swallowed, and stale-row pruning is delete-if-present. A duplicate row
//! produced by a racing writer on another machine is an accepted
//! eventual-consistency gap, not an error.

use crate::remote::{escape_sql, Result, RowFields, SelectOption, TableApi};
use monitor_core::types::{TaskRecord, TaskSource};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info};

pub const COL_NAME: &str = "Name";
pub const COL_STATUS: &str = "Status";
pub const COL_SOURCE: &str = "Source";
pub const COL_SESSION: &str = "Session ID";
pub const COL_OUTPUT: &str = "Latest Output";
pub const COL_UPDATED: &str = "Updated At";
pub const COL_MACHINE: &str = "Machine";
pub const COL_PARENT: &str = "Parent Task";

/// Columns beyond the name column, which the service creates with the
/// table itself. The parent column is a self-referential link.
const COLUMNS: &[(&str, &str)] = &[
    (COL_STATUS, "single-select"),
    (COL_SOURCE, "single-select"),
    (COL_SESSION, "text"),
    (COL_OUTPUT, "long-text"),
    (COL_UPDATED, "date"),
    (COL_MACHINE, "text"),
    (COL_PARENT, "link"),
];

const STATUS_OPTIONS: &[SelectOption] = &[
    SelectOption { name: "Pending", color: "#FF8000", text_color: "#FFFFFF" },
    SelectOption { name: "In Progress", color: "#59CB74", text_color: "#FFFFFF" },
    SelectOption { name: "Completed", color: "#9860E5", text_color: "#FFFFFF" },
    SelectOption { name: "Unknown", color: "#CCCCCC", text_color: "#333333" },
];

const SOURCE_OPTIONS: &[SelectOption] = &[
    SelectOption { name: "tmux", color: "#4A90D9", text_color: "#FFFFFF" },
    SelectOption { name: "claude-code", color: "#5BC8C0", text_color: "#FFFFFF" },
    SelectOption { name: "claude-session", color: "#D8A9E0", text_color: "#FFFFFF" },
];

/// Single writer against one remote table.
pub struct Reconciler<T: TableApi> {
    api: T,
    table_name: String,
    link_column_id: Option<String>,
}

impl<T: TableApi> Reconciler<T> {
    pub fn new(api: T, table_name: String) -> Self {
        Self {
            api,
            table_name,
            link_column_id: None,
        }
    }

    /// Authenticates and makes sure the table, columns, and select options
    /// exist. Fatal when it fails; everything after this degrades per-unit.
    pub fn init(&mut self) -> Result<()> {
        self.api.auth()?;
        self.ensure_table()?;
        self.ensure_columns()?;
        self.ensure_options();
        self.refresh_link_column_id()?;
        info!(table = %self.table_name, "Remote table ready");
        Ok(())
    }

    /// Re-authenticates near token expiry. The link column id is not
    /// stable across re-authentication, so it is re-resolved afterward.
    pub fn refresh_auth_if_needed(&mut self) -> Result<()> {
        if self.api.refresh_auth_if_needed()? {
            self.refresh_link_column_id()?;
        }
        Ok(())
    }

    fn ensure_table(&self) -> Result<()> {
        let metadata = self.api.metadata()?;
        if metadata.tables.iter().any(|t| t.name == self.table_name) {
            return Ok(());
        }
        self.api.add_table(&self.table_name)?;
        info!(table = %self.table_name, "Created remote table");
        Ok(())
    }

    fn ensure_columns(&self) -> Result<()> {
        let metadata = self.api.metadata()?;
        let existing: HashSet<String> = metadata
            .tables
            .iter()
            .filter(|t| t.name == self.table_name)
            .flat_map(|t| t.columns.iter().map(|c| c.name.clone()))
            .collect();

        for (column_name, column_type) in COLUMNS {
            if existing.contains(*column_name) {
                continue;
            }
            let column_data = (*column_type == "link").then(|| {
                json!({ "table": self.table_name, "other_table": self.table_name })
            });
            self.api
                .add_column(&self.table_name, column_name, column_type, column_data)?;
            info!(column = column_name, kind = column_type, "Added remote column");
        }
        Ok(())
    }

    /// Registers the closed status/source vocabularies as select options.
    /// "Already exists" is indistinguishable from other failures in this
    /// interface, so errors are swallowed.
    fn ensure_options(&self) {
        for (column, options) in [(COL_STATUS, STATUS_OPTIONS), (COL_SOURCE, SOURCE_OPTIONS)] {
            if let Err(err) = self.api.add_column_options(&self.table_name, column, options) {
                debug!(column, error = %err, "Ignoring column-option registration failure");
            }
        }
    }

    fn refresh_link_column_id(&mut self) -> Result<()> {
        let metadata = self.api.metadata()?;
        self.link_column_id = metadata
            .tables
            .iter()
            .filter(|t| t.name == self.table_name)
            .flat_map(|t| t.columns.iter())
            .find(|c| c.name == COL_PARENT)
            .and_then(|c| c.link_id());
        Ok(())
    }

    /// Upserts one record by its identity triple, then links its parent
    /// when one is declared and resolvable.
    ///
    /// The row's updated-time column is set to wall-clock now on every
    /// call, visible change or not.
    pub fn upsert(&self, record: &TaskRecord) -> Result<()> {
        let sql = self.identity_query(&record.name, &record.session_id, &record.machine);
        let rows = self.api.query(&sql)?;
        let fields = row_fields(record);

        let row_id = match first_row_id(&rows) {
            Some(id) => {
                let id = id.to_string();
                self.api.update_row(&self.table_name, &id, &fields)?;
                id
            }
            None => {
                // Append does not return the new row id; re-query for it.
                self.api.append_row(&self.table_name, &fields)?;
                let rows = self.api.query(&sql)?;
                match first_row_id(&rows) {
                    Some(id) => id.to_string(),
                    None => {
                        debug!(name = %record.name, "Row not visible after insert; skipping link");
                        return Ok(());
                    }
                }
            }
        };

        if let Some(parent_name) = record.parent_name.as_deref() {
            self.link_parent(&row_id, parent_name, record)?;
        }
        Ok(())
    }

    /// Creates the child→parent edge when the parent row exists. A missing
    /// parent is a soft dependency: no edge, no error. Duplicate-edge
    /// failures from the service are swallowed.
    fn link_parent(&self, child_row_id: &str, parent_name: &str, record: &TaskRecord) -> Result<()> {
        let Some(link_id) = self.link_column_id.as_deref() else {
            return Ok(());
        };
        let sql = self.identity_query(parent_name, &record.session_id, &record.machine);
        let parent_rows = self.api.query(&sql)?;
        let Some(parent_row_id) = first_row_id(&parent_rows) else {
            return Ok(());
        };

        if let Err(err) = self
            .api
            .add_link(link_id, &self.table_name, child_row_id, parent_row_id)
        {
            debug!(parent = parent_name, error = %err, "Ignoring link-create failure");
        }
        Ok(())
    }

    /// Deletes every row of the given (source, session, machine) whose name
    /// is no longer live. Only the pane-collector source is pruned this
    /// way; task and todo rows accumulate.
    pub fn remove_stale(
        &self,
        source: TaskSource,
        session_id: &str,
        machine: &str,
        active_names: &HashSet<String>,
    ) -> Result<()> {
        let sql = format!(
            "SELECT `_id`, `{}` FROM `{}` WHERE `{}`='{}' AND `{}`='{}' AND `{}`='{}'",
            COL_NAME,
            self.table_name,
            COL_SOURCE,
            source.as_str(),
            COL_SESSION,
            escape_sql(session_id),
            COL_MACHINE,
            escape_sql(machine),
        );
        for row in self.api.query(&sql)? {
            let name = row.get(COL_NAME).and_then(Value::as_str).unwrap_or_default();
            if active_names.contains(name) {
                continue;
            }
            if let Some(row_id) = row.get("_id").and_then(Value::as_str) {
                self.api.delete_row(&self.table_name, row_id)?;
                info!(name, session = session_id, "Removed stale row");
            }
        }
        Ok(())
    }

    fn identity_query(&self, name: &str, session_id: &str, machine: &str) -> String {
        format!(
            "SELECT `_id` FROM `{}` WHERE `{}`='{}' AND `{}`='{}' AND `{}`='{}' LIMIT 1",
            self.table_name,
            COL_NAME,
            escape_sql(name),
            COL_SESSION,
            escape_sql(session_id),
            COL_MACHINE,
            escape_sql(machine),
        )
    }
}

fn first_row_id(rows: &[RowFields]) -> Option<&str> {
    rows.first()
        .and_then(|row| row.get("_id"))
        .and_then(Value::as_str)
}

fn row_fields(record: &TaskRecord) -> RowFields {
    let mut fields = RowFields::new();
    fields.insert(COL_NAME.to_string(), json!(record.name));
    fields.insert(COL_STATUS.to_string(), json!(record.status.label()));
    fields.insert(COL_SOURCE.to_string(), json!(record.source.as_str()));
    fields.insert(COL_SESSION.to_string(), json!(record.session_id));
    fields.insert(COL_OUTPUT.to_string(), json!(record.latest_output));
    fields.insert(
        COL_UPDATED.to_string(),
        json!(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
    );
    fields.insert(COL_MACHINE.to_string(), json!(record.machine));
    fields
}
