//! Validation errors raised while building roster entries

use thiserror::Error;

/// Failure to obtain an appearance from a [`VisualSource`](crate::VisualSource)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisualError {
    #[error("no appearance available for '{0}'")]
    NotAvailable(String),
}

/// Reasons a [`RosterEntry`](crate::RosterEntry) cannot be built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("label is required and cannot be empty")]
    EmptyLabel,

    #[error("invalid label '{0}': must be 3-16 characters, alphanumeric and underscore only")]
    InvalidLabel(String),

    #[error("latency cannot be negative: {0}")]
    NegativeLatency(i64),

    #[error("live entry '{0}' needs an explicit identity")]
    MissingIdentity(String),

    #[error("appearance value and signature cannot be empty")]
    EmptyVisual,

    #[error(transparent)]
    Visual(#[from] VisualError),
}
