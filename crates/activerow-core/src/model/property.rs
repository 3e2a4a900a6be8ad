use crate::{
    error::{Error, ErrorOrigin},
    value::Value,
};
use chrono::{NaiveDate, NaiveDateTime};
use derive_more::Display;
use std::collections::BTreeMap;

///
/// PropertyType
///
/// Semantic column type. Every tag resolves to a raw-text conversion
/// routine here and to an escaping routine in the SQL layer.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum PropertyType {
    #[display("text")]
    Text,
    #[display("raw_html")]
    RawHtml,
    #[display("int")]
    Int,
    #[display("bigint")]
    BigInt,
    #[display("float")]
    Float,
    #[display("money")]
    Money,
    #[display("percent")]
    Percent,
    #[display("bool")]
    Bool,
    #[display("date")]
    Date,
    #[display("datetime")]
    DateTime,
    /// Marker column carrying no storage representation.
    #[display("index_marker")]
    IndexMarker,
}

impl PropertyType {
    /// Whether columns of this type occupy a table column at all.
    #[must_use]
    pub const fn is_storage(self) -> bool {
        !matches!(self, Self::IndexMarker)
    }

    /// Convert one raw database cell into a typed value.
    ///
    /// `None` and the empty string both hydrate to `Null`; anything else
    /// must parse for the declared type.
    pub fn from_db_text(self, raw: Option<&str>) -> Result<Value, Error> {
        let Some(raw) = raw else {
            return Ok(Value::Null);
        };
        if raw.is_empty() && self != Self::Text && self != Self::RawHtml {
            return Ok(Value::Null);
        }

        let parse_err = |detail: &str| {
            Error::validation(
                ErrorOrigin::Value,
                format!("cannot convert '{raw}' to {self}: {detail}"),
            )
        };

        let value = match self {
            Self::Text | Self::RawHtml => Value::Text(raw.to_string()),
            Self::Int | Self::BigInt => Value::Int(
                raw.parse::<i64>()
                    .map_err(|err| parse_err(&err.to_string()))?,
            ),
            Self::Float | Self::Money | Self::Percent => Value::Float(
                raw.parse::<f64>()
                    .map_err(|err| parse_err(&err.to_string()))?,
            ),
            Self::Bool => match raw {
                "0" | "false" => Value::Bool(false),
                "1" | "true" => Value::Bool(true),
                _ => return Err(parse_err("expected 0/1")),
            },
            Self::Date => Value::Date(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|err| parse_err(&err.to_string()))?,
            ),
            Self::DateTime => Value::DateTime(
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                    .map_err(|err| parse_err(&err.to_string()))?,
            ),
            Self::IndexMarker => Value::Null,
        };

        Ok(value)
    }
}

///
/// Reference
/// Foreign-key annotation: target record class, optionally a far column
/// other than the target's primary key.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Reference {
    pub class: &'static str,
    pub far_column: Option<&'static str>,
}

///
/// PropertyDescriptor
///
/// Per-column schema metadata. Constructed builder-style; the defaults
/// mirror a plain, viewable, non-nullable column.
///

#[derive(Clone, Debug)]
pub struct PropertyDescriptor {
    pub ty: PropertyType,
    pub nullable: bool,
    pub default: Option<Value>,
    pub references: Option<Reference>,
    pub display_name: Option<&'static str>,
    pub viewable: bool,
    pub editable: bool,
    pub listable: bool,
    pub queryable: bool,
    pub merge_on_empty: bool,
    pub mergeable: bool,
    pub required: bool,
    pub help_text: Option<&'static str>,
}

impl PropertyDescriptor {
    #[must_use]
    pub const fn new(ty: PropertyType) -> Self {
        Self {
            ty,
            nullable: false,
            default: None,
            references: None,
            display_name: None,
            viewable: true,
            editable: true,
            listable: true,
            queryable: false,
            merge_on_empty: false,
            mergeable: true,
            required: false,
            help_text: None,
        }
    }

    /// Foreign-key column referencing another record class. Defaults to a
    /// hidden, editable int column, as relationship columns usually are.
    #[must_use]
    pub fn foreign_key(class: &'static str) -> Self {
        let mut prop = Self::new(PropertyType::Int);
        prop.references = Some(Reference {
            class,
            far_column: None,
        });
        prop.viewable = false;
        prop.editable = true;
        prop.listable = false;
        prop
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn far_column(mut self, column: &'static str) -> Self {
        if let Some(reference) = self.references.as_mut() {
            reference.far_column = Some(column);
        }
        self
    }

    #[must_use]
    pub fn display(mut self, name: &'static str) -> Self {
        self.display_name = Some(name);
        self
    }

    #[must_use]
    pub fn viewable(mut self, flag: bool) -> Self {
        self.viewable = flag;
        self
    }

    #[must_use]
    pub fn editable(mut self, flag: bool) -> Self {
        self.editable = flag;
        self
    }

    #[must_use]
    pub fn listable(mut self, flag: bool) -> Self {
        self.listable = flag;
        self
    }

    #[must_use]
    pub fn queryable(mut self, flag: bool) -> Self {
        self.queryable = flag;
        self
    }

    #[must_use]
    pub fn merge_on_empty(mut self) -> Self {
        self.merge_on_empty = true;
        self
    }

    #[must_use]
    pub fn not_mergeable(mut self) -> Self {
        self.mergeable = false;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn help(mut self, text: &'static str) -> Self {
        self.help_text = Some(text);
        self
    }

    /// Whether a null value may be written for this column (the primary key
    /// is exempted separately by the save path).
    #[must_use]
    pub const fn allows_null_write(&self) -> bool {
        self.nullable || self.default.is_some()
    }
}

/// Ordered field-name → descriptor map describing one record class.
pub type PropertyMap = BTreeMap<&'static str, PropertyDescriptor>;
