//! Shared test fixtures: an in-memory `Database` double that understands
//! the SQL shapes the builder emits, a small fixture schema, and session
//! constructors used across the module tests.

use crate::{
    db::{
        database::{Database, Row},
        session::{Session, SessionConfig},
    },
    registry::{FieldMap, TypeRegistry},
};
use activerow_core::{
    error::{Error, ErrorOrigin},
    value::Value,
};
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashSet},
    rc::Rc,
};

// ======================================================================
// MemoryDb
// ======================================================================

type StoredRow = BTreeMap<String, Option<String>>;

#[derive(Clone, Default)]
struct Table {
    pk: String,
    columns: Vec<String>,
    indexes: Vec<String>,
    next_id: i64,
    rows: Vec<StoredRow>,
}

///
/// MemoryDb
///
/// Deterministic in-memory storage double. It interprets exactly the SQL
/// the query builder produces (single-table selects, two-table DISTINCT
/// joins, equality predicates, COUNT/MAX, INSERT/UPDATE/DELETE) and
/// supports snapshot transactions plus failure injection for rollback
/// tests. Every executed statement is logged for zero-SQL assertions.
///

pub struct MemoryDb {
    tables: RefCell<BTreeMap<String, Table>>,
    snapshot: RefCell<Option<BTreeMap<String, Table>>>,
    last_insert: Cell<i64>,
    read_only: Cell<bool>,
    log: RefCell<Vec<String>>,
    fail_on: RefCell<Option<String>>,
}

impl MemoryDb {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RefCell::new(BTreeMap::new()),
            snapshot: RefCell::new(None),
            last_insert: Cell::new(0),
            read_only: Cell::new(false),
            log: RefCell::new(Vec::new()),
            fail_on: RefCell::new(None),
        }
    }

    pub fn create_table(&self, name: &str, pk: &str, columns: &[&str]) {
        self.tables.borrow_mut().insert(
            name.to_string(),
            Table {
                pk: pk.to_string(),
                columns: columns.iter().map(ToString::to_string).collect(),
                indexes: Vec::new(),
                next_id: 1,
                rows: Vec::new(),
            },
        );
    }

    pub fn set_indexes(&self, table: &str, names: &[&str]) {
        if let Some(table) = self.tables.borrow_mut().get_mut(table) {
            table.indexes = names.iter().map(ToString::to_string).collect();
        }
    }

    pub fn drop_column(&self, table: &str, column: &str) {
        if let Some(table) = self.tables.borrow_mut().get_mut(table) {
            table.columns.retain(|c| c != column);
        }
    }

    pub fn add_raw_column(&self, table: &str, column: &str) {
        if let Some(table) = self.tables.borrow_mut().get_mut(table) {
            table.columns.push(column.to_string());
        }
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.set(read_only);
    }

    /// Make the next statements containing this fragment fail.
    pub fn fail_on(&self, fragment: &str) {
        self.fail_on.replace(Some(fragment.to_string()));
    }

    pub fn clear_failures(&self) {
        self.fail_on.replace(None);
    }

    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    // ------------------------------------------------------------------
    // Parsing helpers
    // ------------------------------------------------------------------

    fn check_failure(&self, sql: &str) -> Result<(), Error> {
        if let Some(fragment) = self.fail_on.borrow().as_ref()
            && sql.contains(fragment.as_str())
        {
            return Err(Error::internal(
                ErrorOrigin::Store,
                format!("injected storage failure on: {sql}"),
            ));
        }
        Ok(())
    }

    fn table_or_err(&self, name: &str) -> Result<Table, Error> {
        self.tables
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::internal(ErrorOrigin::Store, format!("no such table: {name}")))
    }

    fn run_select(&self, sql: &str) -> Result<Vec<Row>, Error> {
        let body = sql.strip_prefix("SELECT ").expect("select statement");
        let (body, distinct) = match body.strip_prefix("DISTINCT ") {
            Some(rest) => (rest, true),
            None => (body, false),
        };

        let from_at = find_outside_quotes(body, " FROM ")
            .ok_or_else(|| Error::internal(ErrorOrigin::Store, format!("unparseable select: {sql}")))?;
        let columns: Vec<ColRef> = split_outside_quotes(&body[..from_at], ", ")
            .iter()
            .map(|part| ColRef::parse(part))
            .collect();
        let mut rest = body[from_at + " FROM ".len()..].to_string();

        let offset = take_section(&mut rest, " OFFSET ").and_then(|s| s.parse::<usize>().ok());
        let limit = take_section(&mut rest, " LIMIT ").and_then(|s| s.parse::<usize>().ok());
        let order = take_section(&mut rest, " ORDER BY ");
        let where_clause = take_section(&mut rest, " WHERE ");

        let table_names: Vec<String> = split_outside_quotes(&rest, ", ")
            .iter()
            .map(|t| strip_backticks(t))
            .collect();
        let tables: Vec<(String, Table)> = table_names
            .iter()
            .map(|name| self.table_or_err(name).map(|t| (name.clone(), t)))
            .collect::<Result<_, _>>()?;

        // Candidate row sets: one per row (single table) or the cross
        // product (two-table joins).
        let mut candidates: Vec<Vec<(&str, &StoredRow)>> = Vec::new();
        match tables.as_slice() {
            [(name, table)] => {
                for row in &table.rows {
                    candidates.push(vec![(name.as_str(), row)]);
                }
            }
            [(near_name, near), (far_name, far)] => {
                for near_row in &near.rows {
                    for far_row in &far.rows {
                        candidates
                            .push(vec![(near_name.as_str(), near_row), (far_name.as_str(), far_row)]);
                    }
                }
            }
            _ => {
                return Err(Error::internal(
                    ErrorOrigin::Store,
                    format!("unsupported table list: {sql}"),
                ));
            }
        }

        let conditions: Vec<String> = where_clause
            .map(|w| split_outside_quotes(&w, " AND "))
            .unwrap_or_default();
        let mut matched: Vec<Vec<(&str, &StoredRow)>> = candidates
            .into_iter()
            .filter(|candidate| conditions.iter().all(|cond| eval_condition(cond, candidate)))
            .collect();

        if let Some(order) = order {
            let (column, descending) = parse_order(&order);
            matched.sort_by(|a, b| {
                let left = resolve(&column, a);
                let right = resolve(&column, b);
                let ordering = compare_cells(left.as_deref(), right.as_deref());
                if descending { ordering.reverse() } else { ordering }
            });
        }

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        for candidate in matched {
            let mut row = Row::new();
            let mut rendered = Vec::with_capacity(columns.len());
            for column in &columns {
                let cell = resolve(column, &candidate);
                rendered.push(cell.clone());
                row.set(column.column.clone(), cell);
            }
            if distinct && !seen.insert(rendered) {
                continue;
            }
            rows.push(row);
        }

        let skip = offset.unwrap_or(0);
        let rows: Vec<Row> = rows.into_iter().skip(skip).collect();
        let rows = match limit {
            Some(limit) => rows.into_iter().take(limit).collect(),
            None => rows,
        };
        Ok(rows)
    }

    fn run_count(&self, sql: &str) -> Result<Vec<Row>, Error> {
        let body = sql
            .strip_prefix("SELECT COUNT(*) AS row_count FROM ")
            .expect("count statement");
        let (table_name, where_clause) = match find_outside_quotes(body, " WHERE ") {
            Some(at) => (strip_backticks(&body[..at]), Some(body[at + 7..].to_string())),
            None => (strip_backticks(body), None),
        };
        let table = self.table_or_err(&table_name)?;
        let conditions: Vec<String> = where_clause
            .map(|w| split_outside_quotes(&w, " AND "))
            .unwrap_or_default();
        let count = table
            .rows
            .iter()
            .filter(|row| {
                let candidate = vec![(table_name.as_str(), *row)];
                conditions.iter().all(|cond| eval_condition(cond, &candidate))
            })
            .count();

        let mut row = Row::new();
        row.set("row_count", Some(count.to_string()));
        Ok(vec![row])
    }

    fn run_max(&self, sql: &str) -> Result<Vec<Row>, Error> {
        let body = sql.strip_prefix("SELECT MAX(").expect("max statement");
        let close = body.find(") AS max_value FROM ").ok_or_else(|| {
            Error::internal(ErrorOrigin::Store, format!("unparseable max: {sql}"))
        })?;
        let column = strip_backticks(&body[..close]);
        let body = &body[close + ") AS max_value FROM ".len()..];
        let (table_name, where_clause) = match find_outside_quotes(body, " WHERE ") {
            Some(at) => (strip_backticks(&body[..at]), Some(body[at + 7..].to_string())),
            None => (strip_backticks(body), None),
        };
        let table = self.table_or_err(&table_name)?;
        let conditions: Vec<String> = where_clause
            .map(|w| split_outside_quotes(&w, " AND "))
            .unwrap_or_default();

        let max = table
            .rows
            .iter()
            .filter(|row| {
                let candidate = vec![(table_name.as_str(), *row)];
                conditions.iter().all(|cond| eval_condition(cond, &candidate))
            })
            .filter_map(|row| row.get(&column).cloned().flatten())
            .filter_map(|raw| raw.parse::<i64>().ok())
            .max();

        let mut row = Row::new();
        row.set("max_value", max.map(|m| m.to_string()));
        Ok(vec![row])
    }

    fn run_insert(&self, sql: &str) -> Result<u64, Error> {
        let body = sql.strip_prefix("INSERT INTO ").expect("insert statement");
        let open = body.find(" (").expect("column list");
        let table_name = strip_backticks(&body[..open]);
        let body = &body[open + 2..];
        let close = body.find(") VALUES (").expect("values");
        let columns: Vec<String> = split_outside_quotes(&body[..close], ", ")
            .iter()
            .map(|c| strip_backticks(c))
            .collect();
        let values_part = body[close + ") VALUES (".len()..]
            .strip_suffix(')')
            .expect("closing paren");
        let values: Vec<Option<String>> = split_outside_quotes(values_part, ", ")
            .iter()
            .map(|v| parse_literal(v))
            .collect();

        let mut tables = self.tables.borrow_mut();
        let table = tables
            .get_mut(&table_name)
            .ok_or_else(|| Error::internal(ErrorOrigin::Store, format!("no such table: {table_name}")))?;

        let mut row: StoredRow = columns.into_iter().zip(values).collect();
        let id = match row.get(&table.pk).cloned().flatten() {
            Some(raw) => raw.parse::<i64>().unwrap_or(table.next_id),
            None => table.next_id,
        };
        row.insert(table.pk.clone(), Some(id.to_string()));
        table.next_id = table.next_id.max(id + 1);
        self.last_insert.set(id);
        table.rows.push(row);
        Ok(1)
    }

    fn run_update(&self, sql: &str) -> Result<u64, Error> {
        let body = sql.strip_prefix("UPDATE ").expect("update statement");
        let set_at = find_outside_quotes(body, " SET ").expect("set clause");
        let table_name = strip_backticks(&body[..set_at]);
        let body = &body[set_at + 5..];
        let where_at = find_outside_quotes(body, " WHERE ").expect("where clause");
        let assignments: Vec<(String, Option<String>)> = split_outside_quotes(&body[..where_at], ", ")
            .iter()
            .map(|pair| {
                let (col, val) = pair.split_once(" = ").expect("assignment");
                (strip_backticks(col), parse_literal(val))
            })
            .collect();
        let conditions = split_outside_quotes(&body[where_at + 7..], " AND ");

        let mut tables = self.tables.borrow_mut();
        let table = tables
            .get_mut(&table_name)
            .ok_or_else(|| Error::internal(ErrorOrigin::Store, format!("no such table: {table_name}")))?;

        let mut affected = 0;
        for row in &mut table.rows {
            let matches = {
                let candidate = vec![(table_name.as_str(), &*row)];
                conditions.iter().all(|cond| eval_condition(cond, &candidate))
            };
            if matches {
                for (column, value) in &assignments {
                    row.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn run_delete(&self, sql: &str) -> Result<u64, Error> {
        let body = sql.strip_prefix("DELETE FROM ").expect("delete statement");
        let where_at = find_outside_quotes(body, " WHERE ").expect("where clause");
        let table_name = strip_backticks(&body[..where_at]);
        let conditions = split_outside_quotes(&body[where_at + 7..], " AND ");

        let mut tables = self.tables.borrow_mut();
        let table = tables
            .get_mut(&table_name)
            .ok_or_else(|| Error::internal(ErrorOrigin::Store, format!("no such table: {table_name}")))?;

        let before = table.rows.len();
        table.rows.retain(|row| {
            let candidate = vec![(table_name.as_str(), row)];
            !conditions.iter().all(|cond| eval_condition(cond, &candidate))
        });
        Ok((before - table.rows.len()) as u64)
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl Database for MemoryDb {
    fn query(&self, sql: &str) -> Result<Vec<Row>, Error> {
        self.log.borrow_mut().push(sql.to_string());
        self.check_failure(sql)?;
        if sql.starts_with("SELECT COUNT(*) AS row_count FROM ") {
            self.run_count(sql)
        } else if sql.starts_with("SELECT MAX(") {
            self.run_max(sql)
        } else {
            self.run_select(sql)
        }
    }

    fn execute(&self, sql: &str) -> Result<u64, Error> {
        self.log.borrow_mut().push(sql.to_string());
        self.check_failure(sql)?;
        if sql.starts_with("INSERT INTO ") {
            self.run_insert(sql)
        } else if sql.starts_with("UPDATE ") {
            self.run_update(sql)
        } else if sql.starts_with("DELETE FROM ") {
            self.run_delete(sql)
        } else {
            Err(Error::internal(
                ErrorOrigin::Store,
                format!("unsupported statement: {sql}"),
            ))
        }
    }

    fn last_insert_id(&self) -> i64 {
        self.last_insert.get()
    }

    fn begin(&self) -> Result<(), Error> {
        self.snapshot.replace(Some(self.tables.borrow().clone()));
        Ok(())
    }

    fn commit(&self) -> Result<(), Error> {
        self.snapshot.replace(None);
        Ok(())
    }

    fn rollback(&self) -> Result<(), Error> {
        if let Some(snapshot) = self.snapshot.replace(None) {
            self.tables.replace(snapshot);
        }
        Ok(())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>, Error> {
        Ok(self.table_or_err(table)?.columns)
    }

    fn table_indexes(&self, table: &str) -> Result<Vec<String>, Error> {
        Ok(self.table_or_err(table)?.indexes)
    }

    fn is_read_only(&self) -> bool {
        self.read_only.get()
    }
}

// ======================================================================
// SQL text helpers
// ======================================================================

#[derive(Clone, Debug)]
struct ColRef {
    table: Option<String>,
    column: String,
}

impl ColRef {
    fn parse(text: &str) -> Self {
        let text = text.trim();
        match find_outside_quotes(text, ".") {
            Some(at) if text.starts_with('`') => Self {
                table: Some(strip_backticks(&text[..at])),
                column: strip_backticks(&text[at + 1..]),
            },
            _ => Self {
                table: None,
                column: strip_backticks(text),
            },
        }
    }
}

fn strip_backticks(text: &str) -> String {
    text.trim().replace('`', "")
}

fn split_outside_quotes(text: &str, separator: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let sep = separator.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut in_quote = false;

    while i < bytes.len() {
        let b = bytes[i];
        if in_quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == b'\'' {
                in_quote = false;
            }
            i += 1;
            continue;
        }
        if b == b'\'' {
            in_quote = true;
            i += 1;
            continue;
        }
        if bytes[i..].starts_with(sep) {
            parts.push(text[start..i].to_string());
            i += sep.len();
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(text[start..].to_string());
    parts
}

fn find_outside_quotes(text: &str, needle: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let sep = needle.as_bytes();
    let mut i = 0;
    let mut in_quote = false;
    while i < bytes.len() {
        let b = bytes[i];
        if in_quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == b'\'' {
                in_quote = false;
            }
            i += 1;
            continue;
        }
        if b == b'\'' {
            in_quote = true;
            i += 1;
            continue;
        }
        if bytes[i..].starts_with(sep) {
            return Some(i);
        }
        i += 1;
    }
    None
}

// Remove and return the trailing section introduced by the marker.
fn take_section(text: &mut String, marker: &str) -> Option<String> {
    let at = find_outside_quotes(text, marker)?;
    let section = text[at + marker.len()..].to_string();
    text.truncate(at);
    Some(section)
}

fn parse_literal(text: &str) -> Option<String> {
    let text = text.trim();
    if text == "NULL" {
        return None;
    }
    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else {
                out.push(ch);
            }
        }
        return Some(out);
    }
    Some(text.to_string())
}

fn resolve(column: &ColRef, candidate: &[(&str, &StoredRow)]) -> Option<String> {
    for (table, row) in candidate {
        if column.table.as_ref().is_none_or(|t| t == table)
            && let Some(cell) = row.get(&column.column)
        {
            return cell.clone();
        }
    }
    None
}

fn compare_cells(left: Option<&str>, right: Option<&str>) -> std::cmp::Ordering {
    match (left, right) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(l), Some(r)) => match (l.parse::<f64>(), r.parse::<f64>()) {
            (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Equal),
            _ => l.cmp(r),
        },
    }
}

fn literal_matches(cell: Option<&str>, literal: &str) -> bool {
    if literal == "NULL" {
        return false;
    }
    let Some(cell) = cell else {
        return false;
    };
    let Some(value) = parse_literal(literal) else {
        return false;
    };
    if let (Ok(l), Ok(r)) = (cell.parse::<f64>(), value.parse::<f64>()) {
        return (l - r).abs() < f64::EPSILON;
    }
    cell == value
}

fn parse_order(order: &str) -> (ColRef, bool) {
    let trimmed = order.trim();
    let (column, descending) = if let Some(rest) = trimmed.strip_suffix(" DESC") {
        (rest, true)
    } else if let Some(rest) = trimmed.strip_suffix(" ASC") {
        (rest, false)
    } else {
        (trimmed, false)
    };
    (ColRef::parse(column), descending)
}

fn eval_condition(condition: &str, candidate: &[(&str, &StoredRow)]) -> bool {
    let condition = condition.trim();
    if condition.is_empty() {
        return true;
    }
    if let Some(column) = condition.strip_suffix(" IS NULL") {
        let column = ColRef::parse(column);
        return resolve(&column, candidate).is_none();
    }
    if let Some(at) = find_outside_quotes(condition, " IN (") {
        let column = ColRef::parse(&condition[..at]);
        let list = condition[at + " IN (".len()..]
            .strip_suffix(')')
            .unwrap_or_default();
        let cell = resolve(&column, candidate);
        return split_outside_quotes(list, ", ")
            .iter()
            .any(|literal| literal_matches(cell.as_deref(), literal));
    }
    if let Some(at) = find_outside_quotes(condition, " = ") {
        let column = ColRef::parse(&condition[..at]);
        let rhs = condition[at + 3..].trim();
        let cell = resolve(&column, candidate);
        if rhs.starts_with('`') {
            // Identifier on the right: a join equality.
            let other = ColRef::parse(rhs);
            let other_cell = resolve(&other, candidate);
            return match (cell, other_cell) {
                (Some(l), Some(r)) => l == r,
                _ => false,
            };
        }
        return literal_matches(cell.as_deref(), rhs);
    }
    false
}

// ======================================================================
// Fixture schema
// ======================================================================

pub mod fixtures {
    use crate::{
        db::session::Session,
        record::SharedRecord,
        registry::{FieldMap, RecordClass},
    };
    use activerow_core::{
        error::Error,
        model::{IndexModel, PropertyDescriptor, PropertyMap, PropertyType},
        value::Value,
    };
    use std::sync::LazyLock;

    ///
    /// Customer
    ///

    pub struct Customer;

    static CUSTOMER_PROPS: LazyLock<PropertyMap> = LazyLock::new(|| {
        PropertyMap::from([
            ("customer_id", PropertyDescriptor::new(PropertyType::Int)),
            ("name", PropertyDescriptor::new(PropertyType::Text)),
            (
                "email",
                PropertyDescriptor::new(PropertyType::Text)
                    .nullable()
                    .merge_on_empty(),
            ),
            (
                "phone",
                PropertyDescriptor::new(PropertyType::Text)
                    .nullable()
                    .merge_on_empty(),
            ),
            (
                "active",
                PropertyDescriptor::new(PropertyType::Bool).default_value(true),
            ),
            (
                "balance",
                PropertyDescriptor::new(PropertyType::Money).nullable(),
            ),
            (
                "visits",
                PropertyDescriptor::new(PropertyType::Int).nullable(),
            ),
            (
                "mod_dt",
                PropertyDescriptor::new(PropertyType::DateTime).nullable(),
            ),
            (
                "mod_user_id",
                PropertyDescriptor::new(PropertyType::Int).nullable(),
            ),
        ])
    });

    impl RecordClass for Customer {
        fn name(&self) -> &'static str {
            "Customer"
        }

        fn tablename(&self) -> &'static str {
            "customer"
        }

        fn properties(&self) -> &PropertyMap {
            &CUSTOMER_PROPS
        }
    }

    ///
    /// Order
    ///

    pub struct Order;

    static ORDER_PROPS: LazyLock<PropertyMap> = LazyLock::new(|| {
        PropertyMap::from([
            ("order_id", PropertyDescriptor::new(PropertyType::Int)),
            ("customer_id", PropertyDescriptor::foreign_key("Customer")),
            ("sku", PropertyDescriptor::new(PropertyType::Text)),
            (
                "quantity",
                PropertyDescriptor::new(PropertyType::Int).default_value(1),
            ),
            (
                "active",
                PropertyDescriptor::new(PropertyType::Bool).default_value(true),
            ),
            (
                "mod_dt",
                PropertyDescriptor::new(PropertyType::DateTime).nullable(),
            ),
            (
                "mod_user_id",
                PropertyDescriptor::new(PropertyType::Int).nullable(),
            ),
        ])
    });

    static ORDER_INDEXES: [IndexModel; 1] =
        [IndexModel::unique("customer_sku_udx", &["customer_id", "sku"])];

    impl RecordClass for Order {
        fn name(&self) -> &'static str {
            "Order"
        }

        fn tablename(&self) -> &'static str {
            "order"
        }

        fn properties(&self) -> &PropertyMap {
            &ORDER_PROPS
        }

        fn indexes(&self) -> &[IndexModel] {
            &ORDER_INDEXES
        }
    }

    ///
    /// OrderLog — append-only audit class, skipped by copy and merge.
    ///

    pub struct OrderLog;

    static ORDER_LOG_PROPS: LazyLock<PropertyMap> = LazyLock::new(|| {
        PropertyMap::from([
            ("order_log_id", PropertyDescriptor::new(PropertyType::Int)),
            ("order_id", PropertyDescriptor::foreign_key("Order")),
            (
                "note",
                PropertyDescriptor::new(PropertyType::Text).nullable(),
            ),
        ])
    });

    impl RecordClass for OrderLog {
        fn name(&self) -> &'static str {
            "OrderLog"
        }

        fn tablename(&self) -> &'static str {
            "order_log"
        }

        fn properties(&self) -> &PropertyMap {
            &ORDER_LOG_PROPS
        }
    }

    ///
    /// Shipment
    ///

    pub struct Shipment;

    static SHIPMENT_PROPS: LazyLock<PropertyMap> = LazyLock::new(|| {
        PropertyMap::from([
            ("shipment_id", PropertyDescriptor::new(PropertyType::Int)),
            ("order_id", PropertyDescriptor::foreign_key("Order")),
            (
                "carrier",
                PropertyDescriptor::new(PropertyType::Text).nullable(),
            ),
        ])
    });

    impl RecordClass for Shipment {
        fn name(&self) -> &'static str {
            "Shipment"
        }

        fn tablename(&self) -> &'static str {
            "shipment"
        }

        fn properties(&self) -> &PropertyMap {
            &SHIPMENT_PROPS
        }

        // Fills the carrier before validation runs, so an unset carrier
        // is observable proof the hook fired ahead of the write.
        fn pre_save(&self, record: &SharedRecord, _session: &Session) -> Result<(), Error> {
            let needs_default = record.borrow().get("carrier")?.is_empty();
            if needs_default {
                record.borrow_mut().set("carrier", "UPS")?;
            }
            Ok(())
        }
    }

    ///
    /// Group
    ///

    pub struct Group;

    static GROUP_PROPS: LazyLock<PropertyMap> = LazyLock::new(|| {
        PropertyMap::from([
            ("group_id", PropertyDescriptor::new(PropertyType::Int)),
            ("title", PropertyDescriptor::new(PropertyType::Text)),
        ])
    });

    impl RecordClass for Group {
        fn name(&self) -> &'static str {
            "Group"
        }

        fn tablename(&self) -> &'static str {
            "group"
        }

        fn properties(&self) -> &PropertyMap {
            &GROUP_PROPS
        }

        fn init_data(&self) -> Vec<FieldMap> {
            vec![
                FieldMap::from([("title", Value::Text("Admins".into()))]),
                FieldMap::from([("title", Value::Text("Users".into()))]),
            ]
        }
    }

    ///
    /// Membership — link table between Customer and Group.
    ///

    pub struct Membership;

    static MEMBERSHIP_PROPS: LazyLock<PropertyMap> = LazyLock::new(|| {
        PropertyMap::from([
            ("membership_id", PropertyDescriptor::new(PropertyType::Int)),
            ("customer_id", PropertyDescriptor::foreign_key("Customer")),
            ("group_id", PropertyDescriptor::foreign_key("Group")),
        ])
    });

    impl RecordClass for Membership {
        fn name(&self) -> &'static str {
            "Membership"
        }

        fn tablename(&self) -> &'static str {
            "membership"
        }

        fn properties(&self) -> &PropertyMap {
            &MEMBERSHIP_PROPS
        }
    }
}

// ======================================================================
// Session constructors and seed helpers
// ======================================================================

/// Registry holding the whole fixture schema.
pub fn fixture_registry() -> Rc<TypeRegistry> {
    use fixtures::*;
    let mut registry = TypeRegistry::new();
    registry.register(&Customer).unwrap();
    registry.register(&Order).unwrap();
    registry.register(&OrderLog).unwrap();
    registry.register(&Shipment).unwrap();
    registry.register(&Group).unwrap();
    registry.register(&Membership).unwrap();
    Rc::new(registry)
}

/// Storage with one physical table per fixture class.
pub fn fixture_storage() -> Rc<MemoryDb> {
    let db = MemoryDb::new();
    db.create_table(
        "customer",
        "customer_id",
        &[
            "customer_id",
            "name",
            "email",
            "phone",
            "active",
            "balance",
            "visits",
            "mod_dt",
            "mod_user_id",
        ],
    );
    db.create_table(
        "order",
        "order_id",
        &[
            "order_id",
            "customer_id",
            "sku",
            "quantity",
            "active",
            "mod_dt",
            "mod_user_id",
        ],
    );
    db.create_table("order_log", "order_log_id", &["order_log_id", "order_id", "note"]);
    db.create_table(
        "shipment",
        "shipment_id",
        &["shipment_id", "order_id", "carrier"],
    );
    db.create_table("group", "group_id", &["group_id", "title"]);
    db.create_table(
        "membership",
        "membership_id",
        &["membership_id", "customer_id", "group_id"],
    );
    Rc::new(db)
}

fn build_session(config: SessionConfig) -> (Session, Rc<MemoryDb>) {
    let db = fixture_storage();
    let session = Session::with_config(Rc::clone(&db) as Rc<dyn Database>, fixture_registry(), config);
    (session, db)
}

pub fn session_with_cache() -> (Session, Rc<MemoryDb>) {
    build_session(SessionConfig::new().with_cache())
}

pub fn session_without_cache() -> (Session, Rc<MemoryDb>) {
    build_session(SessionConfig::new())
}

pub fn session_without_validation() -> (Session, Rc<MemoryDb>) {
    build_session(SessionConfig::new().without_validation())
}

/// Insert a customer and return its id.
pub fn spawn_customer(session: &Session, name: &str, email: Option<&str>) -> i64 {
    let mut data = FieldMap::from([("name", Value::Text(name.into()))]);
    if let Some(email) = email {
        data.insert("email", Value::Text(email.into()));
    }
    let record = session.new_record("Customer", data).unwrap();
    session.save(&record).unwrap();
    record.borrow().pk_i64().unwrap()
}

/// Insert an order for a customer and return its id.
pub fn spawn_order(session: &Session, customer_id: i64, sku: &str) -> i64 {
    let record = session
        .new_record(
            "Order",
            FieldMap::from([
                ("customer_id", Value::Int(customer_id)),
                ("sku", Value::Text(sku.into())),
            ]),
        )
        .unwrap();
    session.save(&record).unwrap();
    record.borrow().pk_i64().unwrap()
}

/// Cache-enabled session with a small seeded world: Ada (customer 1) with
/// one order, one shipment, and two group memberships.
pub fn seeded_session() -> (Session, Rc<MemoryDb>) {
    let (session, db) = session_with_cache();

    let ada = spawn_customer(&session, "Ada", Some("ada@example.com"));
    let order = spawn_order(&session, ada, "SKU-1");

    let shipment = session
        .new_record(
            "Shipment",
            FieldMap::from([
                ("order_id", Value::Int(order)),
                ("carrier", Value::Text("DHL".into())),
            ]),
        )
        .unwrap();
    session.save(&shipment).unwrap();

    session.insert_init_data("Group").unwrap();
    for group_id in [1i64, 2] {
        let membership = session
            .new_record(
                "Membership",
                FieldMap::from([
                    ("customer_id", Value::Int(ada)),
                    ("group_id", Value::Int(group_id)),
                ]),
            )
            .unwrap();
        session.save(&membership).unwrap();
    }

    (session, db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_save_hook_runs_before_the_write() {
        let (session, _db) = session_without_cache();
        let shipment = session
            .new_record("Shipment", FieldMap::from([("order_id", Value::Int(1))]))
            .unwrap();
        session.save(&shipment).unwrap();
        assert_eq!(
            shipment.borrow().get("carrier").unwrap(),
            &Value::Text("UPS".into()),
            "the class hook fills the carrier before the insert"
        );
    }

    #[test]
    fn memory_db_rolls_back_to_the_snapshot() {
        let (session, db) = session_without_cache();
        spawn_customer(&session, "Ada", None);
        db.begin().unwrap();
        spawn_customer(&session, "Bob", None);
        db.rollback().unwrap();
        assert_eq!(session.count("Customer", None).unwrap(), 1);
    }

    #[test]
    fn memory_db_supports_quoted_separators_in_literals() {
        let (session, _db) = session_without_cache();
        spawn_customer(&session, "Ada AND Bob", None);
        let found = session
            .query_equal(
                "Customer",
                &[("name", crate::db::sql::Term::Equal(Value::Text("Ada AND Bob".into())))],
                None,
                None,
                None,
            )
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
