use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainerError {
    /// La fuente de streaming nunca llegó a conectarse
    #[error("Stream did not connect within {timeout:?}")]
    ConnectionTimeout { timeout: Duration },

    /// Conectado, pero sin datos dentro del plazo
    #[error("Stream connected but delivered no data within {timeout:?}")]
    DataTimeout { timeout: Duration },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Classifier has not been fitted")]
    NotFitted,

    #[error("No usable repetition groups for {folds} folds (discarded gestures: {discarded:?})")]
    NoUsableGroups { folds: usize, discarded: Vec<String> },

    #[error("Stream closed")]
    StreamClosed,

    #[error("Acquisition failed: {0:#}")]
    Acquisition(anyhow::Error),

    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(&'static str),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TrainerError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        TrainerError::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TrainerError>;
