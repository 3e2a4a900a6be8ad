use crate::record::SharedRecord;
use std::{cell::RefCell, collections::HashMap, rc::Rc};

///
/// IdentityCache
///
/// Process-local map of (class, primary key) to the live record instance.
/// While enabled, repeated loads of one identity return the same `Rc`, so
/// mutations are visible everywhere. Disabled caches are inert and every
/// operation falls through to storage.
///
/// The cache cannot observe out-of-band writes; callers that bypass the
/// mapper (counter helpers, raw SQL) must evict the affected entry.
///

pub struct IdentityCache {
    enabled: bool,
    entries: RefCell<HashMap<&'static str, HashMap<i64, SharedRecord>>>,
}

impl IdentityCache {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: RefCell::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn get(&self, class: &str, id: i64) -> Option<SharedRecord> {
        if !self.enabled {
            return None;
        }
        let hit = self
            .entries
            .borrow()
            .get(class)
            .and_then(|by_id| by_id.get(&id))
            .map(Rc::clone);
        if hit.is_some() {
            tracing::trace!(class, id, "identity cache hit");
        }
        hit
    }

    /// Cache a record under its current identity; records without a
    /// primary key are ignored.
    pub fn put(&self, record: &SharedRecord) {
        if !self.enabled {
            return;
        }
        let (class, id) = {
            let record = record.borrow();
            let Some(id) = record.pk_i64() else {
                return;
            };
            (record.class_name(), id)
        };
        self.entries
            .borrow_mut()
            .entry(class)
            .or_default()
            .insert(id, Rc::clone(record));
    }

    pub fn evict(&self, class: &str, id: i64) {
        if !self.enabled {
            return;
        }
        if let Some(by_id) = self.entries.borrow_mut().get_mut(class) {
            if by_id.remove(&id).is_some() {
                tracing::trace!(class, id, "identity cache evict");
            }
        }
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
