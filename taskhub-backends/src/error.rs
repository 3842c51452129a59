//! Errors raised while building a backend from settings.
//!
//! Runtime failures use the adapter error types from `taskhub-sync`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("could not determine home directory")]
    HomeNotFound,

    #[error("invalid {backend} settings: {reason}")]
    Config {
        backend: &'static str,
        reason: String,
    },
}

pub(crate) fn config_err(backend: &'static str, reason: impl Into<String>) -> BackendError {
    BackendError::Config {
        backend,
        reason: reason.into(),
    }
}
