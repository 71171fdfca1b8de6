//! Typed failures that callers branch on.
//!
//! Everything else flows through `anyhow` with context. Unparseable prices,
//! timestamps and missing columns are never errors: they surface as `None`
//! values and are resolved by the stage that consumes them.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Dataset '{dataset}' is missing required input '{file}'")]
    MissingSource { dataset: String, file: String },

    #[error("No DATA* folders and no dataset files found under {root:?}")]
    NoDatasets { root: PathBuf },

    #[error("None of the {attempted} dataset(s) under {root:?} could be processed")]
    NoProcessableDataset { root: PathBuf, attempted: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
