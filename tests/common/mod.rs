#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use chrono::{TimeDelta, Utc};
use sheet_sync::error::{AuthError, RemoteError};
use sheet_sync::io::auth::{Authorizer, ClientSecret, Credentials, TOKEN_FILE};
use sheet_sync::io::sheets::SheetsApi;
use sheet_sync::model::CellValue;

/// Spreadsheet API double keeping grids in memory, keyed by A1 range.
#[derive(Clone, Default)]
pub struct MemorySheets {
    pub state: Rc<RefCell<MemoryState>>,
}

#[derive(Default)]
pub struct MemoryState {
    pub ranges: HashMap<String, Vec<Vec<String>>>,
    pub reads: usize,
    pub writes: usize,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub last_write: Vec<Vec<String>>,
}

impl MemorySheets {
    pub fn with_range(range: &str, grid: &[&[&str]]) -> Self {
        let sheets = Self::default();
        sheets.state.borrow_mut().ranges.insert(
            range.to_string(),
            grid.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        );
        sheets
    }

    pub fn grid(&self, range: &str) -> Vec<Vec<String>> {
        self.state
            .borrow()
            .ranges
            .get(range)
            .cloned()
            .unwrap_or_default()
    }
}

impl SheetsApi for MemorySheets {
    fn values_get(
        &self,
        _spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, RemoteError> {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        if state.fail_reads {
            return Err(RemoteError::Status {
                code: 403,
                message: "The caller does not have permission".into(),
            });
        }
        Ok(state.ranges.get(range).cloned().unwrap_or_default())
    }

    fn values_update(
        &self,
        _spreadsheet_id: &str,
        range: &str,
        values: &[Vec<CellValue>],
    ) -> Result<u64, RemoteError> {
        let mut state = self.state.borrow_mut();
        state.writes += 1;
        if state.fail_writes {
            return Err(RemoteError::Transport("connection reset".into()));
        }
        let grid: Vec<Vec<String>> = values
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect();
        let updated = grid.iter().map(Vec::len).sum::<usize>() as u64;
        state.last_write = grid.clone();
        state.ranges.insert(range.to_string(), trim_blank_tail(grid));
        Ok(updated)
    }
}

/// Drops trailing blank cells and rows, as the service omits them on read.
fn trim_blank_tail(mut grid: Vec<Vec<String>>) -> Vec<Vec<String>> {
    for row in &mut grid {
        while row.last().is_some_and(String::is_empty) {
            row.pop();
        }
    }
    while grid.last().is_some_and(Vec::is_empty) {
        grid.pop();
    }
    grid
}

/// Authorizer double that records calls and hands out fixed tokens.
#[derive(Clone, Default)]
pub struct StubAuthorizer {
    pub calls: Rc<RefCell<Vec<&'static str>>>,
}

impl StubAuthorizer {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }
}

impl Authorizer for StubAuthorizer {
    fn refresh(&self, credentials: &Credentials) -> Result<Credentials, AuthError> {
        self.calls.borrow_mut().push("refresh");
        Ok(Credentials {
            token: Some("refreshed-token".into()),
            expiry: Some(Utc::now() + TimeDelta::hours(1)),
            ..credentials.clone()
        })
    }

    fn authorize(&self, secret: &ClientSecret) -> Result<Credentials, AuthError> {
        self.calls.borrow_mut().push("authorize");
        Ok(Credentials {
            token: Some("fresh-token".into()),
            refresh_token: Some("refresh".into()),
            token_uri: Some(secret.token_uri.clone()),
            client_id: Some(secret.client_id.clone()),
            client_secret: Some(secret.client_secret.clone()),
            scopes: vec!["https://www.googleapis.com/auth/spreadsheets".into()],
            expiry: Some(Utc::now() + TimeDelta::hours(1)),
        })
    }
}

pub fn token(value: &str, expires_in: TimeDelta, refresh: Option<&str>) -> Credentials {
    Credentials {
        token: Some(value.to_string()),
        refresh_token: refresh.map(str::to_string),
        token_uri: None,
        client_id: Some("client".into()),
        client_secret: None,
        scopes: Vec::new(),
        expiry: Some(Utc::now() + expires_in),
    }
}

pub fn write_token(dir: &Path, credentials: &Credentials) {
    let json = serde_json::to_string(credentials).expect("token serialised");
    std::fs::write(dir.join(TOKEN_FILE), json).expect("token written");
}

pub fn write_client_secret(dir: &Path) {
    let json = serde_json::json!({
        "installed": {
            "client_id": "client-id",
            "client_secret": "client-secret",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["http://localhost"]
        }
    });
    std::fs::write(dir.join("credentials.json"), json.to_string()).expect("secret written");
}
