//! Deterministic agronomy computations and the reference data behind them.

use std::path::PathBuf;

use thiserror::Error;

pub mod crop_model;
pub mod fertilizer;

#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("failed to read reference data `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse reference data: {0}")]
    Parse(String),
    #[error("{0} contains no entries")]
    Empty(&'static str),
    #[error("invalid reference data: {0}")]
    Invalid(String),
}
