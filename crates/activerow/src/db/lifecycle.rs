use crate::{
    db::{session::Session, sql::Term},
    record::SharedRecord,
};
use activerow_core::{
    error::{Error, ErrorClass, ErrorOrigin},
    value::Value,
};
use chrono::Utc;
use std::rc::Rc;
use thiserror::Error as ThisError;

// Audit stamp columns updated when merge touches a row.
const MOD_STAMP: &str = "mod_dt";
const MOD_USER: &str = "mod_user_id";
const ACTIVE_FLAG: &str = "active";

///
/// LifecycleError
///

#[derive(Debug, ThisError)]
pub enum LifecycleError {
    #[error("cannot merge '{source_class}' into '{target}': classes differ")]
    MergeClassMismatch { source_class: &'static str, target: &'static str },
}

impl From<LifecycleError> for Error {
    fn from(err: LifecycleError) -> Self {
        Self::new(ErrorClass::Validation, ErrorOrigin::Lifecycle, err.to_string())
    }
}

impl Session {
    // ------------------------------------------------------------------
    // Duplicate detection
    // ------------------------------------------------------------------

    /// Whether saving this record would collide with an existing row under
    /// any declared unique index. Check-then-act: a concurrent writer can
    /// still slip in between the check and the save; treat as best-effort.
    pub fn will_be_duplicate(&self, record: &SharedRecord) -> Result<bool, Error> {
        let (class, own_id) = {
            let record = record.borrow();
            (record.class(), record.pk_i64())
        };

        for index in class.indexes() {
            if !index.unique {
                continue;
            }
            let mut terms: Vec<(&str, Term)> = Vec::with_capacity(index.fields.len());
            {
                let record = record.borrow();
                for field in index.fields {
                    let value = record.get(field)?.clone();
                    let term = if value.is_null() {
                        Term::Null
                    } else {
                        Term::Equal(value)
                    };
                    terms.push((*field, term));
                }
            }
            let matches = self.query_equal(class.name(), &terms, None, None, None)?;
            for existing in matches {
                if existing.borrow().pk_i64() != own_id {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    // ------------------------------------------------------------------
    // Deep copy
    // ------------------------------------------------------------------

    /// Transactionally clone a record and its one-tier dependents.
    ///
    /// The clone gets a fresh identity; caller-specified reset columns are
    /// nulled (or zeroed when non-nullable). Every class referencing the
    /// original is walked, skipping ignore-classes and log classes, and
    /// each referencing record is duplicated pointing at the clone. A
    /// duplicate-to-be with an `active` flag is copied inactive instead;
    /// without one it is skipped. Any failure rolls everything back.
    pub fn deep_copy(
        &self,
        record: &SharedRecord,
        ignore_classes: &[&str],
        ignore_columns: &[&str],
    ) -> Result<SharedRecord, Error> {
        self.db().begin()?;
        match self.deep_copy_tx(record, ignore_classes, ignore_columns) {
            Ok(clone) => {
                self.db().commit()?;
                Ok(clone)
            }
            Err(err) => {
                self.db().rollback()?;
                tracing::debug!(error = %err, "deep copy rolled back");
                Err(err)
            }
        }
    }

    fn deep_copy_tx(
        &self,
        record: &SharedRecord,
        ignore_classes: &[&str],
        ignore_columns: &[&str],
    ) -> Result<SharedRecord, Error> {
        let (class, source_id) = {
            let record = record.borrow();
            (record.class(), record.primary_id())
        };
        let pk = class.primary_key();

        let mut clone = record.borrow().clone();
        clone.set(pk.as_str(), Value::Null)?;
        for column in ignore_columns {
            let Some(prop) = class.properties().get(column) else {
                continue;
            };
            let reset = if prop.nullable { Value::Null } else { Value::Int(0) };
            clone.set(column, reset)?;
        }
        let clone = clone.into_shared();
        self.save(&clone)?;
        let clone_id = clone.borrow().primary_id();

        let graph = self.types().reference_graph();
        for (ref_name, columns) in graph.referenced_by(class.name()) {
            if ignore_classes
                .iter()
                .any(|ignored| ignored.eq_ignore_ascii_case(ref_name))
            {
                continue;
            }
            let ref_class = self.types().try_get(ref_name)?;
            if ref_class.is_log() {
                continue;
            }
            let ref_pk = ref_class.primary_key();

            for column in columns {
                if ignore_columns.contains(&column) {
                    continue;
                }
                let originals = self.query_equal(
                    ref_name,
                    &[(column, Term::Equal(source_id.clone()))],
                    None,
                    None,
                    None,
                )?;
                for original in originals {
                    let mut duplicate = original.borrow().clone();
                    duplicate.set(ref_pk.as_str(), Value::Null)?;
                    duplicate.set(column, clone_id.clone())?;
                    let duplicate = duplicate.into_shared();
                    if !self.will_be_duplicate(&duplicate)? {
                        self.save(&duplicate)?;
                    } else if duplicate.borrow().has_property(ACTIVE_FLAG) {
                        duplicate.borrow_mut().set(ACTIVE_FLAG, false)?;
                        self.save(&duplicate)?;
                    }
                    // A unique-index collision without an active flag means
                    // the dependent cannot be duplicated; it is left alone.
                }
            }
        }

        Ok(clone)
    }

    // ------------------------------------------------------------------
    // Merge
    // ------------------------------------------------------------------

    /// Transactionally consolidate `source` into `target`: re-point every
    /// mergeable inbound foreign key (stamping the modification columns),
    /// demote or delete rows the re-pointing would duplicate, then copy
    /// merge-on-empty properties onto the target. Returns how many rows
    /// were re-pointed. Rolls back fully on any error.
    pub fn merge_into(
        &self,
        source: &SharedRecord,
        target: &SharedRecord,
        user_id: i64,
    ) -> Result<u64, Error> {
        {
            let source = source.borrow();
            let target = target.borrow();
            if source.class_name() != target.class_name() {
                return Err(LifecycleError::MergeClassMismatch {
                    source_class: source.class_name(),
                    target: target.class_name(),
                }
                .into());
            }
        }

        self.db().begin()?;
        match self.merge_tx(source, target, user_id) {
            Ok(count) => {
                self.db().commit()?;
                Ok(count)
            }
            Err(err) => {
                self.db().rollback()?;
                tracing::debug!(error = %err, "merge rolled back");
                Err(err)
            }
        }
    }

    fn merge_tx(
        &self,
        source: &SharedRecord,
        target: &SharedRecord,
        user_id: i64,
    ) -> Result<u64, Error> {
        let class = source.borrow().class();
        let source_id = source.borrow().primary_id();
        let target_id = target.borrow().primary_id();
        let mut repointed = 0u64;

        let graph = self.types().reference_graph();
        for (ref_name, _) in graph.referenced_by(class.name()) {
            let ref_class = self.types().try_get(ref_name)?;
            if ref_class.is_log() || ref_class.is_view() {
                continue;
            }

            let columns: Vec<&'static str> = ref_class
                .properties()
                .iter()
                .filter(|(_, prop)| {
                    prop.mergeable
                        && prop
                            .references
                            .is_some_and(|r| r.class.eq_ignore_ascii_case(class.name()))
                })
                .map(|(name, _)| *name)
                .collect();

            for column in columns {
                let referencing = self.query_equal(
                    ref_name,
                    &[(column, Term::Equal(source_id.clone()))],
                    None,
                    None,
                    None,
                )?;
                for reference in referencing {
                    let old_value = reference.borrow().get(column)?.clone();
                    reference.borrow_mut().set(column, target_id.clone())?;
                    Self::stamp_modification(&reference, user_id)?;

                    if !self.will_be_duplicate(&reference)? {
                        self.save(&reference)?;
                        repointed += 1;
                    } else if reference.borrow().has_property(ACTIVE_FLAG) {
                        // Restore the pointer and retire the now-redundant row.
                        reference.borrow_mut().set(column, old_value)?;
                        reference.borrow_mut().set(ACTIVE_FLAG, false)?;
                        self.save(&reference)?;
                    } else {
                        self.delete(&reference)?;
                    }
                }
            }
        }

        // Copy source values onto empty target fields where the descriptor
        // opts in, saving once at the end.
        let mut changed = false;
        let merge_fields: Vec<&'static str> = class
            .properties()
            .iter()
            .filter(|(_, prop)| prop.merge_on_empty)
            .map(|(name, _)| *name)
            .collect();
        for field in merge_fields {
            let mine = source.borrow().get(field)?.clone();
            let theirs = target.borrow().get(field)?.clone();
            if theirs.is_empty() && !mine.is_empty() {
                target.borrow_mut().set(field, mine)?;
                changed = true;
            }
        }
        if changed {
            Self::stamp_modification(target, user_id)?;
            self.save(target)?;
        }

        Ok(repointed)
    }

    // Stamp the audit columns when they exist on the record's class.
    fn stamp_modification(record: &SharedRecord, user_id: i64) -> Result<(), Error> {
        let mut record = record.borrow_mut();
        if record.has_property(MOD_STAMP) {
            record.set(MOD_STAMP, Value::DateTime(Utc::now().naive_utc()))?;
        }
        if record.has_property(MOD_USER) {
            record.set(MOD_USER, user_id)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inbound reference instances
    // ------------------------------------------------------------------

    /// All records referencing this one, deduplicated by identity even
    /// when a class references it through several columns.
    pub fn reference_instances(
        &self,
        record: &SharedRecord,
        ignore_columns: &[&str],
        ignore_classes: &[&str],
    ) -> Result<Vec<SharedRecord>, Error> {
        let (class, id) = {
            let record = record.borrow();
            (record.class(), record.primary_id())
        };

        let mut seen = std::collections::BTreeSet::new();
        let mut instances = Vec::new();

        let graph = self.types().reference_graph();
        for (ref_name, columns) in graph.referenced_by(class.name()) {
            if ignore_classes
                .iter()
                .any(|ignored| ignored.eq_ignore_ascii_case(ref_name))
            {
                continue;
            }
            for column in columns {
                if ignore_columns.contains(&column) {
                    continue;
                }
                let found = self.query_equal(
                    ref_name,
                    &[(column, Term::Equal(id.clone()))],
                    None,
                    None,
                    None,
                )?;
                for instance in found {
                    let key = format!("{ref_name}_{}", instance.borrow().primary_id());
                    if seen.insert(key) {
                        instances.push(Rc::clone(&instance));
                    }
                }
            }
        }

        Ok(instances)
    }

    /// Cascade helper: delete every record referencing this one.
    pub fn delete_reference_instances(
        &self,
        record: &SharedRecord,
        ignore_columns: &[&str],
        ignore_classes: &[&str],
    ) -> Result<(), Error> {
        for reference in self.reference_instances(record, ignore_columns, ignore_classes)? {
            self.delete(&reference)?;
        }
        Ok(())
    }
}
