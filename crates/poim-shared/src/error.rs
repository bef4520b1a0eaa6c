use thiserror::Error;

use crate::constants::GEO_FIELD;

/// A `geo` query value that could not be turned into a filter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeoFilterError {
    #[error("expected 3 comma-separated values, got {0}")]
    WrongArity(usize),

    #[error("value {position} is not a number: {value:?}")]
    NotANumber { position: usize, value: String },

    #[error("value {0} is not finite")]
    NotFinite(usize),

    #[error("radius must not be negative")]
    NegativeRadius,
}

impl GeoFilterError {
    /// Name of the request field the error belongs to.
    pub fn field(&self) -> &'static str {
        GEO_FIELD
    }

    /// Message shown to API clients. The parse detail stays in logs.
    pub fn user_message(&self) -> &'static str {
        "Invalid coordinates format."
    }
}
