//! Error types surfaced by request translation.
//!
//! Compile-time failures are returned from [`crate::translate::Translator`]
//! directly. Runtime assertions (`Forbidden`, relationship cardinality) are
//! embedded in the emitted plan and only observed when the execution
//! collaborator runs it; [`TranslateError::from_execution_message`] maps the
//! collaborator's failure text back onto this enum.

use std::fmt;

use thiserror::Error;

/// Message carried by every authorization assertion embedded in a plan.
pub const FORBIDDEN_MESSAGE: &str = "FORBIDDEN";

/// Prefix carried by every relationship cardinality assertion.
pub const RELATIONSHIP_REQUIRED_PREFIX: &str = "RELATIONSHIP-REQUIRED";

/// Errors produced while translating a request into a query plan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// A bearer token was required but the context is unauthenticated.
    #[error("Unauthenticated")]
    Unauthenticated,
    /// An authorization validate rule failed during execution.
    #[error("Forbidden")]
    Forbidden,
    /// A filter key did not resolve to a known field and operator.
    #[error("invalid filter key '{key}' on {entity}: {reason}")]
    MalformedFilterKey {
        /// Entity the filter was compiled against.
        entity: String,
        /// Offending key.
        key: String,
        /// Why the key was rejected.
        reason: String,
    },
    /// The request references something the schema model does not declare.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the missing or inconsistent reference.
        message: String,
    },
    /// A post-mutation relationship-count invariant failed during execution.
    #[error("{message}")]
    RelationshipCardinalityViolation {
        /// Deterministic violation message without the assertion prefix.
        message: String,
    },
    /// `limit`, `offset`, `first` or `after` failed validation.
    #[error("invalid pagination argument '{argument}': {reason}")]
    InvalidPagination {
        /// Argument name.
        argument: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// An input value could not be coerced to the field's declared type.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field the value was supplied for.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Result alias used throughout the crate.
pub type Result<T, E = TranslateError> = std::result::Result<T, E>;

impl TranslateError {
    /// Builds a [`TranslateError::MalformedFilterKey`].
    pub fn malformed_key(
        entity: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        TranslateError::MalformedFilterKey {
            entity: entity.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Builds a [`TranslateError::SchemaMismatch`] from a free-form message.
    pub fn schema(message: impl Into<String>) -> Self {
        TranslateError::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Schema mismatch for an entity name the model does not know.
    pub fn unknown_entity(name: &str) -> Self {
        Self::schema(format!("unknown entity '{name}'"))
    }

    /// Schema mismatch for a field missing from an entity.
    pub fn unknown_field(entity: &str, field: &str) -> Self {
        Self::schema(format!("entity '{entity}' has no field '{field}'"))
    }

    /// Builds a [`TranslateError::InvalidValue`].
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        TranslateError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Builds a [`TranslateError::InvalidPagination`].
    pub fn pagination(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        TranslateError::InvalidPagination {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            TranslateError::Unauthenticated => "UNAUTHENTICATED",
            TranslateError::Forbidden => "FORBIDDEN",
            TranslateError::MalformedFilterKey { .. } => "MALFORMED_FILTER_KEY",
            TranslateError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            TranslateError::RelationshipCardinalityViolation { .. } => {
                "RELATIONSHIP_CARDINALITY_VIOLATION"
            }
            TranslateError::InvalidPagination { .. } => "INVALID_PAGINATION",
            TranslateError::InvalidValue { .. } => "INVALID_VALUE",
        }
    }

    /// Whether the failure happens inside the executed plan rather than
    /// during translation.
    pub fn is_runtime(&self) -> bool {
        matches!(
            self,
            TranslateError::Forbidden | TranslateError::RelationshipCardinalityViolation { .. }
        )
    }

    /// Classifies an assertion failure reported by the execution collaborator.
    ///
    /// Returns `None` for messages that did not originate from an assertion
    /// embedded by this crate.
    pub fn from_execution_message(message: &str) -> Option<Self> {
        if let Some(idx) = message.find(RELATIONSHIP_REQUIRED_PREFIX) {
            let rest = &message[idx + RELATIONSHIP_REQUIRED_PREFIX.len()..];
            let rest = rest.trim_start_matches(':').trim();
            return Some(TranslateError::RelationshipCardinalityViolation {
                message: rest.to_owned(),
            });
        }
        if message.contains(FORBIDDEN_MESSAGE) {
            return Some(TranslateError::Forbidden);
        }
        None
    }
}

/// Formats a translation error together with its code.
pub struct TranslateErrorWithCode<'a>(pub &'a TranslateError);

impl fmt::Display for TranslateErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}

/// Formats the full text of a cardinality assertion message.
pub(crate) fn cardinality_message(body: &str) -> String {
    format!("{RELATIONSHIP_REQUIRED_PREFIX}: {body}")
}
