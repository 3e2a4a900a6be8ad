use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Structured runtime error with a stable internal classification.
/// Every module-level error enum converts into this type at the crate
/// boundary; callers match on `class` rather than message text.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct Error {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    /// Construct an error with an explicit class and origin.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct a schema error (missing or malformed class metadata).
    pub fn schema(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Schema, origin, message)
    }

    /// Construct a validation error (bad field data, constraint violation).
    pub fn validation(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, origin, message)
    }

    /// Construct a conflict error (duplicate rows, registration collisions).
    pub fn conflict(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Conflict, origin, message)
    }

    /// Construct an unsupported-operation error.
    pub fn unsupported(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, origin, message)
    }

    /// Construct an internal invariant failure.
    pub fn internal(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, origin, message)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class, ErrorClass::NotFound)
    }

    #[must_use]
    pub const fn is_dispatch_miss(&self) -> bool {
        matches!(self.class, ErrorClass::Dispatch)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
/// Error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Required class-level metadata is missing or malformed.
    Schema,
    /// Field data violates declared constraints; no partial write occurred.
    Validation,
    /// A lookup that warranted an error (not a boolean miss) found nothing.
    NotFound,
    /// Uniqueness or registration collision.
    Conflict,
    /// A multi-statement operation failed and was rolled back.
    Transaction,
    /// Member access denied by visibility; surfaced like an undefined member.
    Access,
    /// Undefined method or property after exhausting all providers.
    Dispatch,
    Unsupported,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Schema => "schema",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Transaction => "transaction",
            Self::Access => "access",
            Self::Dispatch => "dispatch",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Schema,
    Value,
    Sql,
    Cache,
    Mapper,
    Relation,
    Lifecycle,
    Registry,
    Dispatch,
    Store,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Schema => "schema",
            Self::Value => "value",
            Self::Sql => "sql",
            Self::Cache => "cache",
            Self::Mapper => "mapper",
            Self::Relation => "relation",
            Self::Lifecycle => "lifecycle",
            Self::Registry => "registry",
            Self::Dispatch => "dispatch",
            Self::Store => "store",
        };
        write!(f, "{label}")
    }
}
