use activerow_core::error::Error;
use std::collections::BTreeMap;

///
/// Row
///
/// One raw result row: column name to optional raw text. All typing is
/// applied later through the column's declared `PropertyType`; a missing
/// column and a NULL cell are both surfaced as `None`.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Option<String>>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: impl Into<String>, value: Option<String>) {
        self.columns.insert(column.into(), value);
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(|cell| cell.as_deref())
    }

    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.columns
            .iter()
            .map(|(name, cell)| (name.as_str(), cell.as_deref()))
    }
}

impl FromIterator<(String, Option<String>)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Option<String>)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

///
/// Database
///
/// Storage collaborator consumed by the mapper; the library never opens
/// connections or speaks a wire protocol itself. Implementations are
/// expected to be synchronous and request-scoped; transaction semantics
/// come entirely from `begin`/`commit`/`rollback`.
///

pub trait Database {
    /// Run a statement that produces rows.
    fn query(&self, sql: &str) -> Result<Vec<Row>, Error>;

    /// Run a statement that mutates rows; returns the affected-row count.
    fn execute(&self, sql: &str) -> Result<u64, Error>;

    /// Identifier generated by the most recent INSERT.
    fn last_insert_id(&self) -> i64;

    fn begin(&self) -> Result<(), Error>;
    fn commit(&self) -> Result<(), Error>;
    fn rollback(&self) -> Result<(), Error>;

    /// Column names present on a physical table.
    fn table_columns(&self, table: &str) -> Result<Vec<String>, Error>;

    /// Index names present on a physical table.
    fn table_indexes(&self, table: &str) -> Result<Vec<String>, Error>;

    fn is_read_only(&self) -> bool {
        false
    }
}
