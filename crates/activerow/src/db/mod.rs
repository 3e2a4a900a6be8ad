pub mod cache;
pub mod database;
pub mod lifecycle;
pub mod mapper;
pub mod relation;
pub mod session;
pub mod sql;

pub use cache::IdentityCache;
pub use database::{Database, Row};
pub use lifecycle::LifecycleError;
pub use mapper::{MapperError, SaveOptions};
pub use relation::{PathLink, ReferenceGraph, RelationError};
pub use session::{Session, SessionConfig};
pub use sql::{SqlError, Term};
