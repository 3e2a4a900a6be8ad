use crate::{
    db::{
        database::Row,
        session::Session,
        sql::{self, Term},
    },
    record::{Record, SharedRecord},
    registry::{FieldMap, RecordClass},
};
use activerow_core::{
    error::{Error, ErrorClass, ErrorOrigin},
    model::{PropertyDescriptor, PropertyType},
    value::Value,
};
use std::rc::Rc;
use thiserror::Error as ThisError;

// Databases commonly cap IN-list size; id-list loads chunk at this bound.
const ID_CHUNK: usize = 1000;

// Reference columns that never get an implicit btree index.
const UNINDEXED_REFERENCE_COLUMNS: [&str; 2] = ["mod_user_id", "create_user_id"];

///
/// MapperError
///

#[derive(Debug, ThisError)]
pub enum MapperError {
    #[error("failed to save {class}: null constraint on column(s): {columns}")]
    NullConstraint { class: &'static str, columns: String },

    #[error("record must have '{0}' set in order to delete")]
    DeleteWithoutKey(String),

    #[error("cannot save '{0}': the database is read-only")]
    ReadOnly(&'static str),

    #[error("column '{column}' on '{class}' must be a declared int column for counter use")]
    NotACounterColumn { class: &'static str, column: String },

    #[error("the '{0}' must be set before assigning a counter value")]
    CounterWithoutKey(String),
}

impl MapperError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::ReadOnly(_) => ErrorClass::Unsupported,
            _ => ErrorClass::Validation,
        }
    }
}

impl From<MapperError> for Error {
    fn from(err: MapperError) -> Self {
        Self::new(err.class(), ErrorOrigin::Mapper, err.to_string())
    }
}

///
/// SaveOptions
///

#[derive(Clone, Debug)]
pub struct SaveOptions {
    /// Run the class pre-save hook before validation.
    pub pre_hook: bool,
    /// Run the class post-save hook after the post-write reload.
    pub post_hook: bool,
    /// Restrict the write to these columns; `None` writes every column.
    pub columns: Option<Vec<&'static str>>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            pre_hook: true,
            post_hook: true,
            columns: None,
        }
    }
}

impl Session {
    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Load a record by its primary key, consulting the identity cache
    /// first. Returns `false` when no row exists; absence is not an error.
    pub fn load(&self, record: &SharedRecord) -> Result<bool, Error> {
        let (class, pk_id) = {
            let record = record.borrow();
            (record.class(), record.pk_i64())
        };

        if let Some(id) = pk_id
            && let Some(hit) = self.cache().get(class.name(), id)
        {
            if !Rc::ptr_eq(record, &hit) {
                record.borrow_mut().copy_fields_from(&hit.borrow());
            }
            return Ok(true);
        }

        let found = self.load_raw(record)?;
        if found {
            self.cache().put(record);
        }
        Ok(found)
    }

    /// Load a record straight from storage, bypassing the cache. Used
    /// before insert-vs-update decisions to avoid stale cache reads.
    pub fn load_raw(&self, record: &SharedRecord) -> Result<bool, Error> {
        let (class, pk_value) = {
            let record = record.borrow();
            (record.class(), record.primary_id())
        };
        if pk_value.is_empty() {
            return Ok(false);
        }

        match self.raw_fetch(class, &pk_value)? {
            Some(row) => {
                let fields = Self::hydrate_fields(class, &row)?;
                record.borrow_mut().from_map(&fields);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run a SELECT over one record class. Result-set order is preserved;
    /// rows whose identity is already live reuse the cached instance.
    pub fn query(
        &self,
        class: &str,
        condition: Option<&str>,
        order: Option<&str>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<SharedRecord>, Error> {
        let class = self.types().try_get(class)?;
        let mut select = sql::Select::from_table(class.tablename());
        for (name, _) in Self::storage_columns(class) {
            select = select.column(name);
        }
        let statement = select
            .condition(condition.unwrap_or_default())
            .order_by(order)
            .limit(limit)
            .offset(offset)
            .build();

        tracing::debug!(sql = %statement, "executing query");
        let rows = self.db().query(&statement)?;
        self.records_from_rows(class, rows)
    }

    /// Query by an equality-predicate map. A single-key primary-key-only
    /// predicate short-circuits through the identity cache.
    pub fn query_equal(
        &self,
        class: &str,
        terms: &[(&str, Term)],
        order: Option<&str>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<SharedRecord>, Error> {
        let class_ref = self.types().try_get(class)?;
        let pk = class_ref.primary_key();

        if let [(column, Term::Equal(Value::Int(id)))] = terms
            && *column == pk
            && let Some(hit) = self.cache().get(class_ref.name(), *id)
        {
            return Ok(vec![hit]);
        }

        let condition = sql::equals_where(terms, None);
        self.query(class, Some(&condition), order, limit, offset)
    }

    /// Count rows matching a raw condition.
    pub fn count(&self, class: &str, condition: Option<&str>) -> Result<u64, Error> {
        let class = self.types().try_get(class)?;
        let statement = sql::select_count(class.tablename(), condition);
        tracing::debug!(sql = %statement, "executing count");
        let rows = self.db().query(&statement)?;
        let count = rows
            .first()
            .and_then(|row| row.get("row_count"))
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(0);
        Ok(count)
    }

    /// Count rows matching an equality-predicate map.
    pub fn count_equal(&self, class: &str, terms: &[(&str, Term)]) -> Result<u64, Error> {
        let condition = sql::equals_where(terms, None);
        self.count(class, Some(&condition))
    }

    /// Load one record by id, or nothing.
    pub fn load_by_id(&self, class: &str, id: i64) -> Result<Option<SharedRecord>, Error> {
        let class_ref = self.types().try_get(class)?;
        if let Some(hit) = self.cache().get(class_ref.name(), id) {
            return Ok(Some(hit));
        }
        let pk = class_ref.primary_key();
        let found = self.query_equal(class, &[(pk.as_str(), Term::Equal(Value::Int(id)))], None, None, None)?;
        Ok(found.into_iter().next())
    }

    /// Load records for an id list, preserving the caller's id order and
    /// silently skipping missing ids. The IN list is chunked because many
    /// databases cap its size.
    pub fn load_by_ids(
        &self,
        class: &str,
        ids: &[i64],
        order: Option<&str>,
    ) -> Result<Vec<SharedRecord>, Error> {
        let class_ref = self.types().try_get(class)?;
        let pk = class_ref.primary_key();

        let mut by_id = std::collections::HashMap::new();
        for chunk in ids.chunks(ID_CHUNK) {
            let clean: Vec<Value> = chunk
                .iter()
                .filter(|id| **id != 0)
                .map(|id| Value::Int(*id))
                .collect();
            if clean.is_empty() {
                continue;
            }
            let found =
                self.query_equal(class, &[(pk.as_str(), Term::In(clean))], order, None, None)?;
            for record in found {
                if let Some(id) = record.borrow().pk_i64() {
                    by_id.insert(id, Rc::clone(&record));
                }
            }
        }

        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(id).map(Rc::clone))
            .collect())
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    /// Save with default options: both hooks, all columns.
    pub fn save(&self, record: &SharedRecord) -> Result<u64, Error> {
        self.save_with(record, &SaveOptions::default())
    }

    /// Persist a record. Decision: a non-empty primary key whose raw load
    /// finds an existing row updates; anything else inserts and captures
    /// the generated key. The record is re-loaded from storage afterwards
    /// so computed and default column values are normalized, then
    /// (re)cached.
    pub fn save_with(&self, record: &SharedRecord, opts: &SaveOptions) -> Result<u64, Error> {
        let class = record.borrow().class();

        if self.db().is_read_only() && !self.config().allow_save_when_read_only {
            return Err(MapperError::ReadOnly(class.name()).into());
        }

        if opts.pre_hook {
            class.pre_save(record, self)?;
        }

        let pk = class.primary_key();
        let mut escaped: Vec<(String, String)> = Vec::new();
        let mut null_violations: Vec<&'static str> = Vec::new();
        {
            let record = record.borrow();
            for (name, prop) in Self::storage_columns(class) {
                if let Some(columns) = &opts.columns
                    && !columns.contains(&name)
                    && name != pk
                {
                    continue;
                }
                let value = record.try_get(name).cloned().unwrap_or(Value::Null);
                if value.is_null() && name != pk && !prop.allows_null_write() {
                    null_violations.push(name);
                }
                escaped.push((
                    sql::escape_identifier(name),
                    sql::escape_value(prop.ty, &value)?,
                ));
            }
        }

        if self.config().validate_on_save && !null_violations.is_empty() {
            return Err(MapperError::NullConstraint {
                class: class.name(),
                columns: null_violations.join(", "),
            }
            .into());
        }

        let pk_value = record.borrow().primary_id();
        let exists = if pk_value.is_empty() {
            false
        } else {
            self.raw_fetch(class, &pk_value)?.is_some()
        };

        let affected = if exists {
            let pk_escaped = Self::escape_pk(class, &pk_value)?;
            let statement = sql::update(class.tablename(), &escaped, &pk, &pk_escaped);
            tracing::debug!(sql = %statement, "executing update");
            self.db().execute(&statement)?
        } else {
            let statement = sql::insert(class.tablename(), &escaped);
            tracing::debug!(sql = %statement, "executing insert");
            let affected = self.db().execute(&statement)?;
            let id = self.db().last_insert_id();
            record.borrow_mut().set(pk.as_str(), Value::Int(id))?;
            affected
        };

        // Reload so computed/default column values match storage.
        self.load_raw(record)?;
        self.cache().put(record);

        if opts.post_hook {
            class.post_save(record, self)?;
        }

        Ok(affected)
    }

    /// Delete with both hooks enabled.
    pub fn delete(&self, record: &SharedRecord) -> Result<u64, Error> {
        self.delete_with(record, true, true)
    }

    /// Delete a record. The pre-hook runs before the DELETE so it can
    /// still read key-dependent data; the primary key is cleared before
    /// the post-hook, which therefore receives a tombstone.
    pub fn delete_with(&self, record: &SharedRecord, pre: bool, post: bool) -> Result<u64, Error> {
        let (class, pk_value, pk_id) = {
            let record = record.borrow();
            (record.class(), record.primary_id(), record.pk_i64())
        };
        let pk = class.primary_key();
        if pk_value.is_empty() {
            return Err(MapperError::DeleteWithoutKey(pk).into());
        }

        if pre {
            class.on_delete(record, self)?;
        }

        let condition = format!(
            "{} = {}",
            sql::escape_identifier(&pk),
            Self::escape_pk(class, &pk_value)?
        );
        let statement = sql::delete(class.tablename(), &condition);
        tracing::debug!(sql = %statement, "executing delete");
        let affected = self.db().execute(&statement)?;

        if let Some(id) = pk_id {
            self.cache().evict(class.name(), id);
        }
        record.borrow_mut().set(pk.as_str(), Value::Null)?;

        if post {
            class.post_delete(record, self)?;
        }

        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Counter helpers
    // ------------------------------------------------------------------

    /// Compute max+1 for an int column, optionally within a raw condition.
    pub fn next_value(
        &self,
        record: &SharedRecord,
        column: &str,
        condition: Option<&str>,
    ) -> Result<i64, Error> {
        let class = record.borrow().class();
        let counter_ok = class
            .properties()
            .get(column)
            .is_some_and(|prop| matches!(prop.ty, PropertyType::Int | PropertyType::BigInt));
        if !counter_ok {
            return Err(MapperError::NotACounterColumn {
                class: class.name(),
                column: column.to_string(),
            }
            .into());
        }

        let statement = sql::select_max(class.tablename(), column, condition);
        tracing::debug!(sql = %statement, "executing counter read");
        let rows = self.db().query(&statement)?;
        let max = rows
            .first()
            .and_then(|row| row.get("max_value"))
            .and_then(|raw| raw.parse::<i64>().ok());
        Ok(max.map_or(1, |m| m + 1))
    }

    /// Assign max+1 to an int column with a raw UPDATE. This bypasses the
    /// mapper's write path, so the cached entry is evicted; the in-memory
    /// record is intentionally left untouched and must be re-loaded.
    pub fn set_next_value(
        &self,
        record: &SharedRecord,
        column: &str,
        condition: Option<&str>,
    ) -> Result<i64, Error> {
        let (class, pk_value, pk_id) = {
            let record = record.borrow();
            (record.class(), record.primary_id(), record.pk_i64())
        };
        let pk = class.primary_key();
        let Some(id) = pk_id else {
            return Err(MapperError::CounterWithoutKey(pk).into());
        };

        let next = self.next_value(record, column, condition)?;
        let sets = vec![(sql::escape_identifier(column), next.to_string())];
        let statement = sql::update(
            class.tablename(),
            &sets,
            &pk,
            &Self::escape_pk(class, &pk_value)?,
        );
        tracing::debug!(sql = %statement, "executing counter write");
        self.db().execute(&statement)?;

        self.cache().evict(class.name(), id);
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Seed data and schema drift
    // ------------------------------------------------------------------

    /// Insert a class's seed rows, only into an empty table. Returns
    /// whether anything was inserted.
    pub fn insert_init_data(&self, class: &str) -> Result<bool, Error> {
        if self.count(class, None)? > 0 {
            return Ok(false);
        }
        let class_ref = self.types().try_get(class)?;
        let rows = class_ref.init_data();
        if rows.is_empty() {
            return Ok(false);
        }
        for data in rows {
            let record = self.new_record(class, data)?;
            self.save(&record)?;
        }
        Ok(true)
    }

    /// Declared columns missing from the physical table.
    pub fn missing_columns(&self, class: &str) -> Result<Vec<String>, Error> {
        let class = self.types().try_get(class)?;
        let actual = self.db().table_columns(class.tablename())?;
        Ok(Self::storage_columns(class)
            .into_iter()
            .map(|(name, _)| name.to_string())
            .filter(|name| !actual.contains(name))
            .collect())
    }

    /// Physical columns not declared on the class.
    pub fn extra_columns(&self, class: &str) -> Result<Vec<String>, Error> {
        let class = self.types().try_get(class)?;
        let declared: Vec<&str> = Self::storage_columns(class)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        Ok(self
            .db()
            .table_columns(class.tablename())?
            .into_iter()
            .filter(|name| !declared.contains(&name.as_str()))
            .collect())
    }

    /// Declared indexes missing from the physical table. Expected indexes
    /// are the declared ones plus an implicit btree per reference column;
    /// log and view classes get no implicit reference indexes.
    pub fn missing_indexes(&self, class: &str) -> Result<Vec<String>, Error> {
        let class = self.types().try_get(class)?;
        let mut expected: Vec<String> = Vec::new();

        if !class.is_log() && !class.is_view() {
            for (name, prop) in class.properties() {
                if prop.references.is_some() && !UNINDEXED_REFERENCE_COLUMNS.contains(name) {
                    expected.push(format!("{name}_idx"));
                }
            }
        }
        for index in class.indexes() {
            expected.push(index.name.to_string());
        }

        let actual = self.db().table_indexes(class.tablename())?;
        Ok(expected
            .into_iter()
            .filter(|name| !actual.contains(name))
            .collect())
    }

    // ------------------------------------------------------------------
    // Shared internals
    // ------------------------------------------------------------------

    /// Properties that occupy physical table columns, in declaration order.
    pub(crate) fn storage_columns(
        class: &'static dyn RecordClass,
    ) -> Vec<(&'static str, &'static PropertyDescriptor)> {
        class
            .properties()
            .iter()
            .filter(|(_, prop)| prop.ty.is_storage())
            .map(|(name, prop)| (*name, prop))
            .collect()
    }

    // Escape the primary-key value with its declared type.
    fn escape_pk(class: &'static dyn RecordClass, pk_value: &Value) -> Result<String, Error> {
        let pk = class.primary_key();
        let prop = class.properties().get(pk.as_str()).ok_or_else(|| {
            Error::schema(
                ErrorOrigin::Mapper,
                format!("class '{}' lost its primary key property", class.name()),
            )
        })?;
        sql::escape_value(prop.ty, pk_value)
    }

    // Fetch the single row for a primary-key value, bypassing the cache.
    fn raw_fetch(
        &self,
        class: &'static dyn RecordClass,
        pk_value: &Value,
    ) -> Result<Option<Row>, Error> {
        let pk = class.primary_key();
        let mut select = sql::Select::from_table(class.tablename());
        for (name, _) in Self::storage_columns(class) {
            select = select.column(name);
        }
        let statement = select
            .condition(format!(
                "{} = {}",
                sql::escape_identifier(&pk),
                Self::escape_pk(class, pk_value)?
            ))
            .build();
        tracing::debug!(sql = %statement, "executing row fetch");
        let rows = self.db().query(&statement)?;
        Ok(rows.into_iter().next())
    }

    // Convert one raw row into typed fields via the property metadata.
    fn hydrate_fields(
        class: &'static dyn RecordClass,
        row: &Row,
    ) -> Result<FieldMap, Error> {
        let mut fields = FieldMap::new();
        for (name, prop) in Self::storage_columns(class) {
            fields.insert(name, prop.ty.from_db_text(row.get(name))?);
        }
        Ok(fields)
    }

    /// Build shared records from raw rows, resolving identities through
    /// the cache and preserving result-set order.
    pub(crate) fn records_from_rows(
        &self,
        class: &'static dyn RecordClass,
        rows: Vec<Row>,
    ) -> Result<Vec<SharedRecord>, Error> {
        let pk = class.primary_key();
        let pk_ty = class
            .properties()
            .get(pk.as_str())
            .map(|prop| prop.ty)
            .ok_or_else(|| {
                Error::schema(
                    ErrorOrigin::Mapper,
                    format!("class '{}' lost its primary key property", class.name()),
                )
            })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let pk_value = pk_ty.from_db_text(row.get(&pk))?;
            if let Value::Int(id) = pk_value
                && let Some(hit) = self.cache().get(class.name(), id)
            {
                records.push(hit);
                continue;
            }
            let fields = Self::hydrate_fields(class, &row)?;
            let record = Record::new(class, fields)?.into_shared();
            self.cache().put(&record);
            records.push(record);
        }
        Ok(records)
    }
}
