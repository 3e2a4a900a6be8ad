use activerow_core::{
    error::{Error, ErrorClass, ErrorOrigin},
    model::PropertyType,
    value::Value,
};
use thiserror::Error as ThisError;

///
/// SqlError
///

#[derive(Debug, ThisError)]
pub enum SqlError {
    #[error("cannot render {value} as {ty}")]
    TypeMismatch { ty: PropertyType, value: String },

    #[error("column type {0} has no storage representation")]
    NotStorable(PropertyType),
}

impl From<SqlError> for Error {
    fn from(err: SqlError) -> Self {
        let class = match err {
            SqlError::TypeMismatch { .. } => ErrorClass::Validation,
            SqlError::NotStorable(_) => ErrorClass::Unsupported,
        };
        Self::new(class, ErrorOrigin::Sql, err.to_string())
    }
}

/// Escape a table or column identifier. Backtick-quoted; embedded backticks
/// are doubled.
#[must_use]
pub fn escape_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Escape an identifier qualified by its table.
#[must_use]
pub fn qualify(table: &str, column: &str) -> String {
    format!("{}.{}", escape_identifier(table), escape_identifier(column))
}

// Quote a string literal, backslash-escaping backslashes and quotes.
fn quote_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Render a value for a column of the given semantic type.
///
/// Numeric types render unquoted, strings and dates quoted and escaped,
/// null as the NULL literal. Money is normalized to two decimal places.
pub fn escape_value(ty: PropertyType, value: &Value) -> Result<String, Error> {
    if value.is_null() {
        return Ok("NULL".to_string());
    }

    let mismatch = || {
        Error::from(SqlError::TypeMismatch {
            ty,
            value: value.to_string(),
        })
    };

    let rendered = match ty {
        PropertyType::Text | PropertyType::RawHtml => quote_text(&value.to_string()),
        PropertyType::Int | PropertyType::BigInt => match value {
            Value::Int(n) => n.to_string(),
            Value::Bool(b) => u8::from(*b).to_string(),
            Value::Text(s) => s.parse::<i64>().map_err(|_| mismatch())?.to_string(),
            Value::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
            _ => return Err(mismatch()),
        },
        PropertyType::Float | PropertyType::Percent => match value {
            Value::Float(f) => f.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Text(s) => s.parse::<f64>().map_err(|_| mismatch())?.to_string(),
            _ => return Err(mismatch()),
        },
        PropertyType::Money => match value {
            Value::Float(f) => format!("{f:.2}"),
            Value::Int(n) => format!("{n}.00"),
            Value::Text(s) => format!("{:.2}", s.parse::<f64>().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        PropertyType::Bool => match value {
            Value::Bool(b) => u8::from(*b).to_string(),
            Value::Int(n) => u8::from(*n != 0).to_string(),
            _ => return Err(mismatch()),
        },
        PropertyType::Date => match value {
            Value::Date(d) => quote_text(&d.format("%Y-%m-%d").to_string()),
            Value::Text(s) => quote_text(s),
            _ => return Err(mismatch()),
        },
        PropertyType::DateTime => match value {
            Value::DateTime(dt) => quote_text(&dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            Value::Date(d) => quote_text(&format!("{} 00:00:00", d.format("%Y-%m-%d"))),
            Value::Text(s) => quote_text(s),
            _ => return Err(mismatch()),
        },
        PropertyType::IndexMarker => return Err(SqlError::NotStorable(ty).into()),
    };

    Ok(rendered)
}

/// Render a predicate operand by value shape alone: numerics unquoted,
/// everything else quoted. Used where no column type is in scope.
#[must_use]
pub fn escape_scalar(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => u8::from(*b).to_string(),
        Value::Text(s) => quote_text(s),
        Value::Date(d) => quote_text(&d.format("%Y-%m-%d").to_string()),
        Value::DateTime(dt) => quote_text(&dt.format("%Y-%m-%d %H:%M:%S").to_string()),
    }
}

///
/// Term
/// One operand of an equality predicate.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    Null,
    Equal(Value),
    In(Vec<Value>),
}

impl Term {
    /// Equality on a value; null folds to the `IS NULL` form.
    pub fn equal(value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_null() {
            Self::Null
        } else {
            Self::Equal(value)
        }
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Self::equal(value)
    }
}

/// Build an AND-joined equality predicate over column/term pairs.
///
/// `Null` renders `IS NULL`, lists render `IN (...)` (an empty list is
/// skipped entirely), scalars render `= value`. An optional table name
/// qualifies every clause.
#[must_use]
pub fn equals_where(terms: &[(&str, Term)], table: Option<&str>) -> String {
    let mut clauses = Vec::with_capacity(terms.len());

    for (column, term) in terms {
        let column = match table {
            Some(table) => qualify(table, column),
            None => escape_identifier(column),
        };
        match term {
            Term::Null => clauses.push(format!("{column} IS NULL")),
            Term::In(values) => {
                if !values.is_empty() {
                    let list = values
                        .iter()
                        .map(escape_scalar)
                        .collect::<Vec<_>>()
                        .join(", ");
                    clauses.push(format!("{column} IN ({list})"));
                }
            }
            Term::Equal(value) => clauses.push(format!("{column} = {}", escape_scalar(value))),
        }
    }

    clauses.join(" AND ")
}

///
/// Select
///
/// Assembles a SELECT statement from pre-escaped parts in a fixed order:
/// columns, tables, WHERE, ORDER BY, LIMIT, OFFSET. Output is
/// deterministic for identical inputs.
///

#[derive(Debug, Default)]
pub struct Select {
    distinct: bool,
    columns: Vec<String>,
    tables: Vec<String>,
    conditions: Vec<String>,
    order: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    #[must_use]
    pub fn from_table(table: &str) -> Self {
        Self {
            tables: vec![escape_identifier(table)],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    #[must_use]
    pub fn column(mut self, column: &str) -> Self {
        self.columns.push(escape_identifier(column));
        self
    }

    #[must_use]
    pub fn qualified_column(mut self, table: &str, column: &str) -> Self {
        self.columns.push(qualify(table, column));
        self
    }

    #[must_use]
    pub fn join_table(mut self, table: &str) -> Self {
        self.tables.push(escape_identifier(table));
        self
    }

    /// Append a raw, already-escaped condition.
    #[must_use]
    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        let condition = condition.into();
        if !condition.is_empty() {
            self.conditions.push(condition);
        }
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: Option<&str>) -> Self {
        self.order = order.filter(|o| !o.is_empty()).map(str::to_string);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: Option<u64>) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn build(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.columns.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&self.tables.join(", "));
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        if let Some(order) = &self.order {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }
        sql
    }
}

/// Build an INSERT from pre-escaped column/value pairs.
#[must_use]
pub fn insert(table: &str, values: &[(String, String)]) -> String {
    let cols = values
        .iter()
        .map(|(col, _)| col.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let vals = values
        .iter()
        .map(|(_, val)| val.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({cols}) VALUES ({vals})",
        escape_identifier(table)
    )
}

/// Build an UPDATE from pre-escaped SET pairs; the primary-key column is
/// excluded from the SET list and used as the row filter.
#[must_use]
pub fn update(table: &str, sets: &[(String, String)], pk_column: &str, pk_value: &str) -> String {
    let pk_escaped = escape_identifier(pk_column);
    let assignments = sets
        .iter()
        .filter(|(col, _)| *col != pk_escaped)
        .map(|(col, val)| format!("{col} = {val}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {table} SET {assignments} WHERE {table}.{pk_escaped} = {pk_value}",
        table = escape_identifier(table),
    )
}

/// Build a DELETE with a raw condition.
#[must_use]
pub fn delete(table: &str, condition: &str) -> String {
    format!("DELETE FROM {} WHERE {condition}", escape_identifier(table))
}

/// Build a COUNT(*) statement.
#[must_use]
pub fn select_count(table: &str, condition: Option<&str>) -> String {
    let mut sql = format!(
        "SELECT COUNT(*) AS row_count FROM {}",
        escape_identifier(table)
    );
    if let Some(condition) = condition.filter(|c| !c.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(condition);
    }
    sql
}

/// Build a MAX(column) statement used by the counter helpers.
#[must_use]
pub fn select_max(table: &str, column: &str, condition: Option<&str>) -> String {
    let mut sql = format!(
        "SELECT MAX({}) AS max_value FROM {}",
        escape_identifier(column),
        escape_identifier(table)
    );
    if let Some(condition) = condition.filter(|c| !c.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(condition);
    }
    sql
}
