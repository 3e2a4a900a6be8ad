use crate::registry::{FieldMap, RecordClass};
use activerow_core::{
    error::{Error, ErrorClass, ErrorOrigin},
    value::Value,
};
use sha2::{Digest, Sha256};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    rc::Rc,
};
use thiserror::Error as ThisError;

/// Shared handle to a live record. The identity cache guarantees at most
/// one handle graph per `(class, id)` while enabled, so in-place mutation
/// is visible across call sites.
pub type SharedRecord = Rc<RefCell<Record>>;

///
/// RecordError
///

#[derive(Debug, ThisError)]
pub enum RecordError {
    #[error("'{field}' is not a property of record class '{class}'")]
    UnknownField { class: &'static str, field: String },
}

impl From<RecordError> for Error {
    fn from(err: RecordError) -> Self {
        Self::new(ErrorClass::Validation, ErrorOrigin::Mapper, err.to_string())
    }
}

///
/// Record
///
/// One entity instance: a field map validated against the class's
/// property metadata. Every declared property is always present, with
/// `Null` standing in for unset columns.
///

#[derive(Clone)]
pub struct Record {
    class: &'static dyn RecordClass,
    fields: BTreeMap<&'static str, Value>,
}

impl Record {
    /// Construct a record, rejecting any key not declared as a property.
    pub fn new(class: &'static dyn RecordClass, data: FieldMap) -> Result<Self, Error> {
        let fields = class
            .properties()
            .keys()
            .map(|name| (*name, Value::Null))
            .collect();
        let mut record = Self { class, fields };
        record.apply(data)?;
        Ok(record)
    }

    /// Construct a record with every field null.
    pub fn empty(class: &'static dyn RecordClass) -> Self {
        Self::new(class, FieldMap::new()).expect("empty field map cannot contain unknown keys")
    }

    #[must_use]
    pub fn into_shared(self) -> SharedRecord {
        Rc::new(RefCell::new(self))
    }

    #[must_use]
    pub fn class(&self) -> &'static dyn RecordClass {
        self.class
    }

    #[must_use]
    pub fn class_name(&self) -> &'static str {
        self.class.name()
    }

    #[must_use]
    pub fn tablename(&self) -> &'static str {
        self.class.tablename()
    }

    #[must_use]
    pub fn primary_key(&self) -> String {
        self.class.primary_key()
    }

    #[must_use]
    pub fn has_property(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Result<&Value, Error> {
        self.fields.get(field).ok_or_else(|| {
            RecordError::UnknownField {
                class: self.class.name(),
                field: field.to_string(),
            }
            .into()
        })
    }

    #[must_use]
    pub fn try_get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Assign one field; unknown names are rejected.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), Error> {
        let Some((key, _)) = self.fields.get_key_value(field) else {
            return Err(RecordError::UnknownField {
                class: self.class.name(),
                field: field.to_string(),
            }
            .into());
        };
        let key = *key;
        self.fields.insert(key, value.into());
        Ok(())
    }

    /// Assign a batch of fields; unknown names are rejected, nothing is
    /// persisted.
    pub fn apply(&mut self, data: FieldMap) -> Result<(), Error> {
        for (field, value) in data {
            self.set(field, value)?;
        }
        Ok(())
    }

    /// The primary-key value, `Null` while unsaved.
    #[must_use]
    pub fn primary_id(&self) -> Value {
        self.try_get(self.primary_key().as_str())
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// The primary key as an integer, `None` while empty.
    #[must_use]
    pub fn pk_i64(&self) -> Option<i64> {
        match self.primary_id() {
            Value::Int(id) if id != 0 => Some(id),
            _ => None,
        }
    }

    /// Whether this record has not yet been persisted.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.pk_i64().is_none()
    }

    /// Snapshot the fields as a plain map.
    #[must_use]
    pub fn to_map(&self) -> FieldMap {
        self.fields.clone()
    }

    /// Rehydrate fields from a plain map; properties absent from the map
    /// reset to null, unknown keys are ignored.
    pub fn from_map(&mut self, data: &FieldMap) {
        for (name, value) in &mut self.fields {
            *value = data.get(name).cloned().unwrap_or(Value::Null);
        }
    }

    /// Copy all fields from another record of the same class.
    pub(crate) fn copy_fields_from(&mut self, other: &Self) {
        self.fields = other.fields.clone();
    }

    /// Content hash over the property values in declaration order,
    /// skipping excluded columns. Empty values hash a sentinel so that
    /// "unset" still contributes.
    #[must_use]
    pub fn content_hash(&self, exclude: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in &self.fields {
            if exclude.contains(name) {
                continue;
            }
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            if value.is_empty() {
                hasher.update(b"<empty>");
            } else {
                hasher.update(value.to_string().as_bytes());
            }
            hasher.update(b";");
        }
        format!("{:x}", hasher.finalize())
    }

    /// Columns on this class referencing the given target class.
    #[must_use]
    pub fn reference_columns(&self, target: &str) -> Vec<&'static str> {
        self.class
            .properties()
            .iter()
            .filter(|(_, prop)| {
                prop.references
                    .is_some_and(|r| r.class.eq_ignore_ascii_case(target))
            })
            .map(|(name, _)| *name)
            .collect()
    }

    /// First column referencing the target class, if any.
    #[must_use]
    pub fn foreign_key_column(&self, target: &str) -> Option<&'static str> {
        self.reference_columns(target).into_iter().next()
    }
}

// Debug rendering kept readable: class name plus non-null fields.
impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct(self.class.name());
        for (name, value) in &self.fields {
            if !value.is_null() {
                debug.field(name, value);
            }
        }
        debug.finish()
    }
}
