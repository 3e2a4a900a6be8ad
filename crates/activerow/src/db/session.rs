use crate::{
    db::{cache::IdentityCache, database::Database},
    record::{Record, SharedRecord},
    registry::{FieldMap, TypeRegistry},
};
use activerow_core::error::Error;
use std::rc::Rc;

///
/// SessionConfig
///
/// Explicit session policy. The identity cache is off unless switched on;
/// null-constraint validation is on unless switched off (bulk imports
/// disable it); writes against a read-only storage handle are refused
/// unless explicitly allowed.
///

#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    pub cache_enabled: bool,
    pub validate_on_save: bool,
    pub allow_save_when_read_only: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_enabled: false,
            validate_on_save: true,
            allow_save_when_read_only: false,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_cache(mut self) -> Self {
        self.cache_enabled = true;
        self
    }

    #[must_use]
    pub const fn without_validation(mut self) -> Self {
        self.validate_on_save = false;
        self
    }

    #[must_use]
    pub const fn allow_read_only_saves(mut self) -> Self {
        self.allow_save_when_read_only = true;
        self
    }
}

///
/// Session
///
/// Facade owning the storage handle, the type registry, and the identity
/// cache. All load/save/relationship/lifecycle operations hang off this
/// type; the operation groups live in the sibling modules.
///

pub struct Session {
    db: Rc<dyn Database>,
    types: Rc<TypeRegistry>,
    cache: IdentityCache,
    config: SessionConfig,
}

impl Session {
    #[must_use]
    pub fn new(db: Rc<dyn Database>, types: Rc<TypeRegistry>) -> Self {
        Self::with_config(db, types, SessionConfig::default())
    }

    #[must_use]
    pub fn with_config(db: Rc<dyn Database>, types: Rc<TypeRegistry>, config: SessionConfig) -> Self {
        Self {
            db,
            types,
            cache: IdentityCache::new(config.cache_enabled),
            config,
        }
    }

    #[must_use]
    pub fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }

    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    #[must_use]
    pub const fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Construct an unsaved record of a registered class.
    pub fn new_record(&self, class: &str, data: FieldMap) -> Result<SharedRecord, Error> {
        let class = self.types.try_get(class)?;
        Ok(Record::new(class, data)?.into_shared())
    }

    /// Construct an unsaved record with every field null.
    pub fn empty_record(&self, class: &str) -> Result<SharedRecord, Error> {
        self.new_record(class, FieldMap::new())
    }
}
