//! SeaTable HTTP client: [`TableApi`] over the SeaTable REST API.
//!
//! Authentication exchanges the long-lived API token for a base access
//! token scoped to one base. The base token is valid for three days; we
//! proactively re-authenticate once two of those days have elapsed rather
//! than waiting for a 401 mid-cycle.

use crate::remote::{RemoteError, Result, RowFields, SelectOption, TableApi, TableMetadata};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::info;

/// Base token lifetime granted by the server.
const TOKEN_TTL: Duration = Duration::from_secs(3 * 86_400);

/// Re-authenticate after two thirds of the token lifetime.
const REFRESH_AFTER: Duration = Duration::from_secs(2 * 86_400);

const _: () = assert!(REFRESH_AFTER.as_secs() < TOKEN_TTL.as_secs());

#[derive(Debug, Clone, Deserialize)]
struct AccessInfo {
    access_token: String,
    dtable_uuid: String,
    dtable_server: String,
    /// Separate query service in newer deployments; falls back to the
    /// dtable server when absent.
    #[serde(default)]
    dtable_db: String,
}

/// A SeaTable base reachable over HTTP.
pub struct SeaTableBase {
    http: Client,
    server_url: String,
    api_token: String,
    access: Option<AccessInfo>,
    authed_at: Option<Instant>,
}

impl SeaTableBase {
    pub fn new(server_url: &str, api_token: &str) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            access: None,
            authed_at: None,
        }
    }

    fn access(&self) -> Result<&AccessInfo> {
        self.access.as_ref().ok_or(RemoteError::NotAuthenticated)
    }

    fn dtable_url(&self, suffix: &str) -> Result<String> {
        let access = self.access()?;
        Ok(format!(
            "{}/api/v1/dtables/{}/{}",
            access.dtable_server, access.dtable_uuid, suffix
        ))
    }

    fn query_url(&self) -> Result<String> {
        let access = self.access()?;
        let host = if access.dtable_db.is_empty() {
            &access.dtable_server
        } else {
            &access.dtable_db
        };
        Ok(format!("{}/api/v1/query/{}/", host, access.dtable_uuid))
    }

    fn token_header(&self) -> Result<String> {
        Ok(format!("Token {}", self.access()?.access_token))
    }

    fn needs_refresh(&self) -> bool {
        match self.authed_at {
            Some(at) => at.elapsed() > REFRESH_AFTER,
            None => true,
        }
    }

    fn send_json(&self, context: &str, request: reqwest::blocking::RequestBuilder) -> Result<Value> {
        let response = request.send().map_err(|err| RemoteError::Http {
            context: context.to_string(),
            source: err,
        })?;
        let response = expect_success(context, response)?;
        response.json().map_err(|err| RemoteError::Http {
            context: context.to_string(),
            source: err,
        })
    }
}

fn expect_success(context: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(RemoteError::Protocol {
        context: context.to_string(),
        details: format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
    })
}

impl TableApi for SeaTableBase {
    fn auth(&mut self) -> Result<()> {
        let url = format!("{}/api/v2.1/dtable/app-access-token/", self.server_url);
        let value = self.send_json(
            "app-access-token",
            self.http
                .get(&url)
                .header("Authorization", format!("Token {}", self.api_token)),
        )?;
        let mut access: AccessInfo =
            serde_json::from_value(value).map_err(|err| RemoteError::Protocol {
                context: "app-access-token".to_string(),
                details: err.to_string(),
            })?;
        access.dtable_server = access.dtable_server.trim_end_matches('/').to_string();
        access.dtable_db = access.dtable_db.trim_end_matches('/').to_string();

        self.access = Some(access);
        self.authed_at = Some(Instant::now());
        Ok(())
    }

    fn refresh_auth_if_needed(&mut self) -> Result<bool> {
        if !self.needs_refresh() {
            return Ok(false);
        }
        self.auth()?;
        info!("SeaTable base token refreshed");
        Ok(true)
    }

    fn metadata(&self) -> Result<TableMetadata> {
        #[derive(Deserialize)]
        struct MetadataEnvelope {
            metadata: TableMetadata,
        }

        let url = self.dtable_url("metadata/")?;
        let value = self.send_json(
            "metadata",
            self.http
                .get(&url)
                .header("Authorization", self.token_header()?),
        )?;
        let envelope: MetadataEnvelope =
            serde_json::from_value(value).map_err(|err| RemoteError::Protocol {
                context: "metadata".to_string(),
                details: err.to_string(),
            })?;
        Ok(envelope.metadata)
    }

    fn add_table(&self, table_name: &str) -> Result<()> {
        let url = self.dtable_url("tables/")?;
        self.send_json(
            "add-table",
            self.http
                .post(&url)
                .header("Authorization", self.token_header()?)
                .json(&json!({ "table_name": table_name, "lang": "en" })),
        )?;
        Ok(())
    }

    fn add_column(
        &self,
        table_name: &str,
        column_name: &str,
        column_type: &str,
        column_data: Option<Value>,
    ) -> Result<()> {
        let url = self.dtable_url("columns/")?;
        let mut body = json!({
            "table_name": table_name,
            "column_name": column_name,
            "column_type": column_type,
        });
        if let Some(data) = column_data {
            body["column_data"] = data;
        }
        self.send_json(
            "add-column",
            self.http
                .post(&url)
                .header("Authorization", self.token_header()?)
                .json(&body),
        )?;
        Ok(())
    }

    fn add_column_options(
        &self,
        table_name: &str,
        column_name: &str,
        options: &[SelectOption],
    ) -> Result<()> {
        let url = self.dtable_url("column-options/")?;
        self.send_json(
            "add-column-options",
            self.http
                .post(&url)
                .header("Authorization", self.token_header()?)
                .json(&json!({
                    "table_name": table_name,
                    "column": column_name,
                    "options": options,
                })),
        )?;
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<Vec<RowFields>> {
        #[derive(Deserialize)]
        struct QueryResponse {
            #[serde(default)]
            results: Vec<RowFields>,
        }

        let url = self.query_url()?;
        let value = self.send_json(
            "query",
            self.http
                .post(&url)
                .header("Authorization", self.token_header()?)
                .json(&json!({ "sql": sql, "convert_keys": true })),
        )?;
        let response: QueryResponse =
            serde_json::from_value(value).map_err(|err| RemoteError::Protocol {
                context: "query".to_string(),
                details: err.to_string(),
            })?;
        Ok(response.results)
    }

    fn append_row(&self, table_name: &str, row: &RowFields) -> Result<()> {
        let url = self.dtable_url("rows/")?;
        self.send_json(
            "append-row",
            self.http
                .post(&url)
                .header("Authorization", self.token_header()?)
                .json(&json!({ "table_name": table_name, "row": row })),
        )?;
        Ok(())
    }

    fn update_row(&self, table_name: &str, row_id: &str, row: &RowFields) -> Result<()> {
        let url = self.dtable_url("rows/")?;
        self.send_json(
            "update-row",
            self.http
                .put(&url)
                .header("Authorization", self.token_header()?)
                .json(&json!({ "table_name": table_name, "row_id": row_id, "row": row })),
        )?;
        Ok(())
    }

    fn delete_row(&self, table_name: &str, row_id: &str) -> Result<()> {
        let url = self.dtable_url("rows/")?;
        self.send_json(
            "delete-row",
            self.http
                .delete(&url)
                .header("Authorization", self.token_header()?)
                .json(&json!({ "table_name": table_name, "row_id": row_id })),
        )?;
        Ok(())
    }

    fn add_link(
        &self,
        link_id: &str,
        table_name: &str,
        child_row_id: &str,
        parent_row_id: &str,
    ) -> Result<()> {
        let url = self.dtable_url("links/")?;
        self.send_json(
            "add-link",
            self.http
                .post(&url)
                .header("Authorization", self.token_header()?)
                .json(&json!({
                    "link_id": link_id,
                    "table_name": table_name,
                    "other_table_name": table_name,
                    "row_id": child_row_id,
                    "other_row_id": parent_row_id,
                })),
        )?;
        Ok(())
    }
}
