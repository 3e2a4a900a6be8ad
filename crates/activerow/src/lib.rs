//! Active-record data access: record classes map to tables through static
//! property metadata, a session owns the storage handle and the identity
//! cache, and relationship traversal runs over a derived reference graph.
//! Deep-copy and merge are transactional lifecycle operations on top.
//!
//! Storage is a collaborator, not an implementation detail of this crate:
//! everything speaks through the [`db::Database`] trait.

pub mod db;
pub mod expand;
pub mod record;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Domain vocabulary only; helpers and builders stay module-qualified.
///

pub mod prelude {
    pub use crate::{
        db::{Database, Row, SaveOptions, Session, SessionConfig, Term},
        expand::{CallOutcome, ExpandedRecord},
        record::{Record, SharedRecord},
        registry::{FieldMap, RecordClass, TypeRegistry},
    };
    pub use activerow_core::prelude::*;
}
