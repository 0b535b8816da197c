//! Error types for generation-time and call-time failures.

use crate::value::Value;

/// Error while synthesizing or dispatching a conversion function.
///
/// Generation failures are synchronous and fatal for the requesting call;
/// nothing is retried and no partial function is cached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    /// Reference to a record name that was never registered.
    #[error("Unknown record type: {0}")]
    UnknownRecord(String),

    /// A record with this name is already registered.
    #[error("Record type already defined: {0}")]
    AlreadyDefined(String),

    /// Generation was requested for a type that is not a record reference.
    #[error("Not a record type: {0}")]
    NotARecord(String),

    /// No handler is registered or derivable for the type.
    #[error("No handler found for type: {0}")]
    NoHandler(String),

    /// A field's type variable has no binding in the instantiation.
    #[error("Missing type for generic argument {0}, specify it when structuring")]
    MissingTypeArgument(String),

    /// The instantiation is already being generated further up the stack.
    #[error("Generation already in progress for: {0}")]
    Recursive(String),

    /// Wrong number of type arguments for the record's declared parameters.
    #[error("Record type {record} takes {expected} type argument(s), got {got}")]
    TypeArgumentCount {
        record: String,
        expected: usize,
        got: usize,
    },
}

/// Error while converting a value through a generated or registered handler.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Value kind does not match what the handler expects.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },

    /// Required key absent from the input mapping.
    #[error("Missing key: {0}")]
    MissingKey(String),

    /// Value the engine has no way to handle.
    #[error("Unsupported value: {0}")]
    Unsupported(String),

    /// A failure annotated with where it happened.
    #[error("{note}")]
    Noted {
        note: String,
        #[source]
        source: Box<ConvertError>,
    },

    /// Aggregate of per-field failures from detailed validation.
    #[error("{message} ({} field error(s))", .errors.len())]
    Validation {
        message: String,
        errors: Vec<ConvertError>,
    },

    /// Handler dispatch failed at call time.
    #[error(transparent)]
    Generate(#[from] GenerateError),
}

impl ConvertError {
    /// Shorthand for a kind mismatch against an observed value.
    pub fn mismatch(expected: &'static str, actual: &Value) -> Self {
        ConvertError::TypeMismatch {
            expected,
            actual: actual.kind().to_string(),
        }
    }

    /// Wraps the error with a location note, keeping the original as source.
    pub fn with_note(self, note: impl Into<String>) -> Self {
        ConvertError::Noted {
            note: note.into(),
            source: Box::new(self),
        }
    }
}
