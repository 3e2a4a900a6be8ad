use crate::{
    db::{relation::ReferenceGraph, session::Session},
    record::SharedRecord,
};
use activerow_core::{
    error::{Error, ErrorClass, ErrorOrigin},
    model::{IndexModel, PropertyMap},
    value::Value,
};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};
use thiserror::Error as ThisError;

/// Field-name → value map used for record construction and seed data.
pub type FieldMap = BTreeMap<&'static str, Value>;

///
/// RecordClass
///
/// Contract implemented once per entity type and registered as a static
/// instance. `properties()` and `tablename()` are structural data and must
/// be invariant across calls; implementers memoize the property map.
///

pub trait RecordClass {
    /// Class name used in foreign-key references and cache keys.
    fn name(&self) -> &'static str;

    fn tablename(&self) -> &'static str;

    fn properties(&self) -> &PropertyMap;

    /// Primary-key column; by convention `<tablename>_id`.
    fn primary_key(&self) -> String {
        format!("{}_id", self.tablename())
    }

    fn indexes(&self) -> &[IndexModel] {
        &[]
    }

    /// Append-only audit classes are skipped by deep-copy and merge.
    fn is_log(&self) -> bool {
        self.name().ends_with("Log")
    }

    /// Classes backed by a database view are never merge targets.
    fn is_view(&self) -> bool {
        false
    }

    /// Runs before validation so it may still correct field values.
    fn pre_save(&self, _record: &SharedRecord, _session: &Session) -> Result<(), Error> {
        Ok(())
    }

    /// Runs after the post-write reload.
    fn post_save(&self, _record: &SharedRecord, _session: &Session) -> Result<(), Error> {
        Ok(())
    }

    /// Runs before the DELETE executes; the primary key is still present.
    fn on_delete(&self, _record: &SharedRecord, _session: &Session) -> Result<(), Error> {
        Ok(())
    }

    /// Runs after the DELETE with the primary key already cleared.
    fn post_delete(&self, _record: &SharedRecord, _session: &Session) -> Result<(), Error> {
        Ok(())
    }

    /// Seed rows inserted by `Session::insert_init_data` into an empty table.
    fn init_data(&self) -> Vec<FieldMap> {
        Vec::new()
    }
}

impl std::fmt::Debug for dyn RecordClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordClass")
            .field("name", &self.name())
            .finish()
    }
}

///
/// RegistryError
///

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("record class '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("'{0}' is not a registered record class")]
    NotRegistered(String),

    #[error("record class '{class}' does not declare its primary key '{key}' as a property")]
    MissingPrimaryKey { class: String, key: String },
}

impl RegistryError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::AlreadyRegistered(_) => ErrorClass::Conflict,
            Self::NotRegistered(_) | Self::MissingPrimaryKey { .. } => ErrorClass::Schema,
        }
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        Self::new(err.class(), ErrorOrigin::Registry, err.to_string())
    }
}

///
/// TypeRegistry
///
/// Explicit name → record-class map. Built once at startup, then shared
/// read-only by sessions; tests construct a fresh registry per case. The
/// derived reference graph is memoized and rebuilt after registration.
///

#[derive(Default)]
pub struct TypeRegistry {
    classes: BTreeMap<&'static str, &'static dyn RecordClass>,
    graph: RefCell<Option<Rc<ReferenceGraph>>>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record class. The class must declare its primary key as
    /// a property; duplicate names are rejected.
    pub fn register(&mut self, class: &'static dyn RecordClass) -> Result<(), Error> {
        let name = class.name();
        if self.classes.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()).into());
        }

        let pk = class.primary_key();
        if !class.properties().contains_key(pk.as_str()) {
            return Err(RegistryError::MissingPrimaryKey {
                class: name.to_string(),
                key: pk,
            }
            .into());
        }

        self.classes.insert(name, class);
        self.graph.replace(None);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'static dyn RecordClass> {
        self.classes.get(name).copied()
    }

    pub fn try_get(&self, name: &str) -> Result<&'static dyn RecordClass, Error> {
        self.get(name)
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()).into())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static dyn RecordClass)> + '_ {
        self.classes.iter().map(|(name, class)| (*name, *class))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The memoized reference graph over all registered classes.
    pub(crate) fn reference_graph(&self) -> Rc<ReferenceGraph> {
        if let Some(graph) = self.graph.borrow().as_ref() {
            return Rc::clone(graph);
        }
        let graph = Rc::new(ReferenceGraph::build(self));
        self.graph.replace(Some(Rc::clone(&graph)));
        graph
    }
}
