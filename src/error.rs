use std::path::PathBuf;

use thiserror::Error;

use crate::categories::Category;

/// Errors raised by the prediction pipeline and the chat orchestrator.
///
/// None of these are fatal to the process; every one is handled at the
/// interaction boundary (web handler or CLI command).
#[derive(Error, Debug)]
pub enum Error {
    /// A label missing from its lookup table, or a token missing from its
    /// encoder vocabulary.
    #[error("unknown {category} value: {value:?}")]
    UnknownCategoryValue { category: Category, value: String },

    /// Carries the value as the caller supplied it, so unparseable form input
    /// is echoed back verbatim.
    #[error("planted area must be a finite, non-negative number (got {0:?})")]
    InvalidPlantedArea(String),

    #[error("model produced a non-finite estimate ({0})")]
    NonFiniteEstimate(f64),

    /// Model or encoder artifact missing or corrupt at load time.
    #[error("model artifact unavailable at {}: {reason}", path.display())]
    ModelUnavailable { path: PathBuf, reason: String },

    #[error("question is empty")]
    EmptyQuestion,

    #[error("chat service error: {0}")]
    ChatService(#[from] ChatServiceError),
}

/// Failure talking to the external chat model.
#[derive(Error, Debug)]
pub enum ChatServiceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("chat service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed chat service response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ModelUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
