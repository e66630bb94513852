//! Error types for the warehouse and the loader

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Write stage of a load, reported when the store rejects a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    Reset,
    Customers,
    Products,
    Sales,
    Commit,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStage::Reset => "reset",
            LoadStage::Customers => "customers",
            LoadStage::Products => "products",
            LoadStage::Sales => "sales",
            LoadStage::Commit => "commit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Source `{source_name}` is unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("Schema mismatch in table `{table}`: {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// The write transaction was rolled back; `accepted` counts the rows
    /// written before the failing stage.
    #[error("Load failed during {stage} ({accepted} rows accepted, {rejected} rejected): {error}")]
    LoadFailed {
        stage: LoadStage,
        accepted: usize,
        rejected: usize,
        #[source]
        error: duckdb::Error,
    },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Failed to prepare warehouse location: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WarehouseError>;
