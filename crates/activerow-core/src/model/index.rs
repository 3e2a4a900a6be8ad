use std::fmt::{self, Display};

///
/// IndexModel
/// Descriptor for one declared table index; field order is significant.
/// Unique indexes drive duplicate detection during save, copy, and merge.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IndexModel {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub unique: bool,
}

impl IndexModel {
    #[must_use]
    pub const fn new(name: &'static str, fields: &'static [&'static str], unique: bool) -> Self {
        Self {
            name,
            fields,
            unique,
        }
    }

    #[must_use]
    pub const fn unique(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self::new(name, fields, true)
    }

    #[must_use]
    pub const fn btree(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self::new(name, fields, false)
    }
}

impl Display for IndexModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields.join(", ");

        if self.unique {
            write!(f, "UNIQUE {}({})", self.name, fields)
        } else {
            write!(f, "{}({})", self.name, fields)
        }
    }
}
