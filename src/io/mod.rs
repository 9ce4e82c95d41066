//! Adapters for everything outside the process: the authorization server,
//! the spreadsheet API, and the local backup directory.

pub mod auth;
pub mod backup;
pub mod sheets;
