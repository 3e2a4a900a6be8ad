use activerow_core::error::{Error, ErrorClass, ErrorOrigin};
use thiserror::Error as ThisError;

///
/// CapabilityError
/// Registration-time failures; conflicts are fatal and never silently
/// resolved.
///

#[derive(Debug, ThisError)]
pub enum CapabilityError {
    #[error("host type '{0}' is not registered")]
    HostNotRegistered(String),

    #[error("host type '{0}' is already registered")]
    HostAlreadyRegistered(String),

    #[error("cannot register expander '{expander}' on '{host}': conflicting member(s): {members}")]
    MemberConflict {
        host: String,
        expander: &'static str,
        members: String,
    },

    #[error("expander '{expander}' is malformed: {detail}")]
    MalformedSpec {
        expander: &'static str,
        detail: String,
    },

    #[error("combinator '{combinator}' names contract '{contract}' which declares no methods")]
    EmptyContract {
        combinator: &'static str,
        contract: &'static str,
    },
}

impl CapabilityError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::MemberConflict { .. } | Self::HostAlreadyRegistered(_) => ErrorClass::Conflict,
            Self::HostNotRegistered(_) | Self::MalformedSpec { .. } | Self::EmptyContract { .. } => {
                ErrorClass::Schema
            }
        }
    }
}

impl From<CapabilityError> for Error {
    fn from(err: CapabilityError) -> Self {
        Self::new(err.class(), ErrorOrigin::Registry, err.to_string())
    }
}

///
/// DispatchFault
///
/// Undefined-member faults. A visibility violation surfaces with the same
/// message shape as a plain miss; only the error class differs, so
/// callers cannot probe for hidden members by message text.
///

#[derive(Debug, ThisError)]
pub enum DispatchFault {
    #[error("call to undefined method {host}::{method}()")]
    UndefinedMethod { host: String, method: String },

    #[error("undefined property {host}::{property}")]
    UndefinedProperty { host: String, property: String },

    #[error("call to undefined static method {host}::{method}()")]
    UndefinedStaticMethod { host: String, method: String },
}

impl DispatchFault {
    /// Surface the fault; `hidden` marks a visibility denial.
    pub(crate) fn surface(self, hidden: bool) -> Error {
        let class = if hidden {
            ErrorClass::Access
        } else {
            ErrorClass::Dispatch
        };
        Error::new(class, ErrorOrigin::Dispatch, self.to_string())
    }
}
