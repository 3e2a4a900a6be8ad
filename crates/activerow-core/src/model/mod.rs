pub mod index;
pub mod property;

pub use index::IndexModel;
pub use property::{PropertyDescriptor, PropertyMap, PropertyType, Reference};
