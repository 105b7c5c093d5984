#![forbid(unsafe_code)]

use thiserror::Error;

use strata_value::ValueError;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no action named `{name}` is registered")]
    UnknownAction { name: String },

    #[error("state can only be mutated from inside an action")]
    MutationOutsideAction,

    #[error("initial state must be an object, got {found}")]
    InvalidInitialState { found: &'static str },

    #[error("action failed: {message}")]
    Action { message: String },

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Build an [`StoreError::Action`] from inside an action body.
    #[must_use]
    pub fn action(message: impl Into<String>) -> Self {
        Self::Action {
            message: message.into(),
        }
    }
}
