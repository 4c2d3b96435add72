//! Error taxonomy shared by graph construction, compilation, and invocation.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised synchronously by `symtensor` APIs. None are retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed compile-time configuration: input ordering, update or givens collections,
    /// unused inputs, missing graph inputs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A value or replacement expression has an incompatible element kind or rank.
    #[error("type mismatch for {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    /// A required input received no value and declares no default.
    #[error("missing required argument `{name}`")]
    MissingArgument { name: String },

    /// A keyword does not match any input binding name.
    #[error("unknown keyword argument `{name}`")]
    UnknownParameter { name: String },

    /// The same input was supplied positionally and by keyword.
    #[error("argument `{name}` supplied both positionally and by keyword")]
    DuplicateArgument { name: String },

    #[error("function takes at most {expected} positional arguments but {given} were given")]
    TooManyArguments { expected: usize, given: usize },

    /// Graph construction rejected an operation (bad axes, unsupported ranks, ...).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Host value construction failed (length/shape disagreement).
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl Error {
    pub(crate) fn type_mismatch(
        context: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Error::TypeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
