use serde::Serialize;
use thiserror::Error;

/// A single failed field-level validation, e.g. a draft with no sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl FieldError {
    pub fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("message {0} not found")]
    NotFound(i64),
    #[error("invalid message: {0:?}")]
    Invalid(Vec<FieldError>),
}
