use chrono::{DateTime, Utc};
use sqlx::Arguments;
use sqlx::postgres::PgArguments;

/// A value bound into a dynamically built dimension query.
///
/// The dimension table carries one typed column per staged attribute, so the
/// query layer needs a small closed set of bindable value shapes rather than
/// a full row type.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl PgValue {
    /// Returns the Postgres column type used when the attribute column is
    /// first added to the dimension table.
    pub fn column_type(&self) -> &'static str {
        match self {
            PgValue::Null => "text",
            PgValue::Bool(_) => "boolean",
            PgValue::I64(_) => "bigint",
            PgValue::F64(_) => "double precision",
            PgValue::Text(_) => "text",
            PgValue::Timestamp(_) => "timestamptz",
            PgValue::Json(_) => "jsonb",
        }
    }

    /// Adds this value to an argument buffer for dynamically built statements.
    pub fn add_to(&self, arguments: &mut PgArguments) -> Result<(), sqlx::error::BoxDynError> {
        match self {
            PgValue::Null => arguments.add(None::<String>),
            PgValue::Bool(value) => arguments.add(*value),
            PgValue::I64(value) => arguments.add(*value),
            PgValue::F64(value) => arguments.add(*value),
            PgValue::Text(value) => arguments.add(value.as_str()),
            PgValue::Timestamp(value) => arguments.add(*value),
            PgValue::Json(value) => arguments.add(value),
        }
    }
}
