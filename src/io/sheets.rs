use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::error::RemoteError;
use crate::model::{CellValue, SheetTarget, Table};

/// Root of the public spreadsheet API.
pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/";

/// Written strings are parsed as if typed by a user, so `"42"` lands as a
/// number.
pub const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

/// The two remote value operations the gateway depends on.
pub trait SheetsApi {
    /// Fetches the cell grid of an A1 range (`Sheet!A1:Z`).
    fn values_get(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, RemoteError>;

    /// Overwrites an A1 range with user-entered values and returns the
    /// number of updated cells.
    fn values_update(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<CellValue>],
    ) -> Result<u64, RemoteError>;
}

/// [`SheetsApi`] over HTTPS with a bearer token.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    agent: ureq::Agent,
    base_url: String,
    access_token: String,
}

impl SheetsClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    /// Points the client at another API root, e.g. a local emulator.
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(60))
                .build(),
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.base_url).map_err(|err| {
            RemoteError::Transport(format!("invalid base URL {}: {err}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::Transport(format!("base URL {} cannot hold a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet_id, "values", range]);
        Ok(url)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateValuesResponse {
    #[serde(default)]
    updated_cells: u64,
}

impl SheetsApi for SheetsClient {
    fn values_get(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, RemoteError> {
        let url = self.values_url(spreadsheet_id, range)?;
        let response = self
            .agent
            .get(url.as_str())
            .set("Authorization", &self.bearer())
            .call()
            .map_err(RemoteError::from)?;
        let body: ValueRange = response
            .into_json()
            .map_err(|err| RemoteError::Decode(err.to_string()))?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(json_cell_to_string).collect())
            .collect())
    }

    fn values_update(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<CellValue>],
    ) -> Result<u64, RemoteError> {
        let url = self.values_url(spreadsheet_id, range)?;
        let rows: Vec<Vec<Value>> = values
            .iter()
            .map(|row| row.iter().map(CellValue::to_json).collect())
            .collect();
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": rows,
        });
        let response = self
            .agent
            .put(url.as_str())
            .query("valueInputOption", VALUE_INPUT_OPTION)
            .set("Authorization", &self.bearer())
            .send_json(body)
            .map_err(RemoteError::from)?;
        let body: UpdateValuesResponse = response
            .into_json()
            .map_err(|err| RemoteError::Decode(err.to_string()))?;
        Ok(body.updated_cells)
    }
}

impl From<ureq::Error> for RemoteError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                RemoteError::Status {
                    code,
                    message: api_error_message(&body),
                }
            }
            ureq::Error::Transport(transport) => RemoteError::Transport(transport.to_string()),
        }
    }
}

/// Pulls `error.message` out of an API error body, falling back to the raw
/// body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn json_cell_to_string(value: Value) -> String {
    match value {
        Value::String(value) => value,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Reads and writes whole tables through a [`SheetsApi`].
///
/// Remote failures are logged here and surface as `None`; callers decide
/// whether that ends the run.
#[derive(Debug)]
pub struct SheetGateway<A> {
    api: A,
}

impl<A: SheetsApi> SheetGateway<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Fetches `target` and builds a table with the first row as header.
    /// Returns `None` when the call fails or the range holds no cells.
    #[instrument(
        level = "info",
        skip_all,
        fields(spreadsheet = target.spreadsheet_id, range = %target.a1())
    )]
    pub fn read(&self, target: SheetTarget<'_>) -> Option<Table> {
        let grid = match self.api.values_get(target.spreadsheet_id, &target.a1()) {
            Ok(grid) => grid,
            Err(err) => {
                error!(error = %err, "failed to read sheet");
                return None;
            }
        };
        if grid.is_empty() {
            info!("range holds no data");
            return None;
        }
        match Table::from_grid(grid) {
            Ok(table) => {
                debug!(rows = table.len(), columns = table.columns().len(), "sheet read");
                Some(table)
            }
            Err(err) => {
                error!(error = %err, "sheet data is not a table");
                None
            }
        }
    }

    /// Writes header and rows back over `target`, letting the service infer
    /// cell types. Returns the updated cell count, or `None` on failure.
    ///
    /// `previous_rows` is the data row count the range held when it was
    /// read. Missing rows are written as blanks so that rows dropped since
    /// then do not linger below the new data.
    #[instrument(
        level = "info",
        skip_all,
        fields(spreadsheet = target.spreadsheet_id, range = %target.a1())
    )]
    pub fn write(
        &self,
        target: SheetTarget<'_>,
        table: &Table,
        previous_rows: usize,
    ) -> Option<u64> {
        let mut grid = table.to_grid();
        let blank = vec![CellValue::text(""); table.columns().len()];
        let cleared = previous_rows.saturating_sub(table.len());
        grid.extend(std::iter::repeat_n(blank, cleared));
        if cleared > 0 {
            debug!(cleared, "blanking rows left over from the previous read");
        }
        match self
            .api
            .values_update(target.spreadsheet_id, &target.a1(), &grid)
        {
            Ok(updated) => {
                info!(updated_cells = updated, "sheet written");
                Some(updated)
            }
            Err(err) => {
                error!(error = %err, "failed to write sheet");
                None
            }
        }
    }
}
