//! Core library for the sheet-sync command line application.
//!
//! A run pulls a range from a remote spreadsheet, deduplicates, sorts, and
//! scores it, snapshots the result locally, and writes it back. Remote and
//! local adapters live under [`io`], the table representation in [`model`],
//! the transform stages in [`transform`], parameter collection in [`input`],
//! and the run state machine in [`sync`].

pub mod error;
pub mod input;
pub mod io;
pub mod logging;
pub mod model;
pub mod sync;
pub mod transform;

pub use error::{Result, SyncError};
