//! Error taxonomy for the reconciliation core.
//!
//! Commands surface these as plain strings over IPC (the frontend only
//! shows the message), but the core keeps them typed so callers can block
//! on `EmptySale`/`InvalidRange` before touching storage.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SalesError {
    /// Attempted to persist a sale whose total is zero. Rejected before
    /// any write happens.
    #[error("Digite pelo menos um valor para registrar a venda")]
    EmptySale,

    /// Report requested with an inverted date range. Rejected before the
    /// query runs.
    #[error("Data de início {start} deve ser menor que data de fim {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// The storage layer failed. The operation is aborted; in-memory state
    /// is left untouched.
    #[error("storage unavailable: {0}")]
    Persistence(String),

    /// A fetched record is missing required fields. Skipped during
    /// aggregation, never fatal for the batch.
    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

impl From<rusqlite::Error> for SalesError {
    fn from(e: rusqlite::Error) -> Self {
        SalesError::Persistence(e.to_string())
    }
}

impl From<SalesError> for String {
    fn from(e: SalesError) -> String {
        e.to_string()
    }
}
