//! Engine-level error model.

use thiserror::Error;

/// Persistence failures surfaced by a [`crate::runner::SessionStore`].
#[derive(Debug, Error)]
#[error("store: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failures the workflow runner cannot absorb into the session state.
///
/// Stage errors never appear here: they are recorded on the state and the
/// run still returns. Only a broken store makes `run` itself fail.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
