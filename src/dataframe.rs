// used for storage and query execution
use rusqlite::Connection;
use rusqlite::types::{Value as SqlValue, ValueRef};
use tracing::debug;

use crate::construct::Schema;
use crate::datatype::{DataType, Value};
use crate::error::{OptabError, Result};
use crate::function::FunctionCall;
use crate::query::Query;
use crate::settings::Settings;

/// Bulk storage of table instances and execution of queries over them.
/// Rows are position-aligned with the schema they are stored or read under.
/// A scan gives back the values that were loaded, NaN doubles included.
pub trait Dataframe {
    /// Stores the rows of a table, replacing whatever was held under `name`.
    fn load(&self, name: &str, schema: &Schema, rows: &[Vec<Value>]) -> Result<()>;
    /// Reads back every row held under `name`.
    fn scan(&self, name: &str, schema: &Schema) -> Result<Vec<Vec<Value>>>;
    /// Runs a query over previously loaded tables, reading the result under `schema`.
    fn execute(&self, query: &Query, schema: &Schema) -> Result<Vec<Vec<Value>>>;
}

// ------------- SQLite -------------
pub struct SqliteDataframe {
    connection: Connection,
}

impl SqliteDataframe {
    /// Opens the database named by the settings, or an in-memory one.
    pub fn open(settings: &Settings) -> Result<Self> {
        let connection = match &settings.database {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        Ok(Self { connection })
    }
    pub fn in_memory() -> Result<Self> {
        Ok(Self { connection: Connection::open_in_memory()? })
    }
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn read_rows(&self, sql: &str, schema: &Schema) -> Result<Vec<Vec<Value>>> {
        let mut statement = self.connection.prepare(sql)?;
        if statement.column_count() != schema.len() {
            return Err(OptabError::Dataframe(format!(
                "'{}' yields {} columns but {} has {} fields",
                sql,
                statement.column_count(),
                schema,
                schema.len()
            )));
        }
        let fields: Vec<(&str, DataType)> = schema.iter().collect();
        let mut rows = statement.query([])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(fields.len());
            for (index, (field, data_type)) in fields.iter().enumerate() {
                values.push(from_sql(field, *data_type, row.get_ref(index)?)?);
            }
            result.push(values);
        }
        Ok(result)
    }
}

impl Dataframe for SqliteDataframe {
    fn load(&self, name: &str, schema: &Schema, rows: &[Vec<Value>]) -> Result<()> {
        let columns: Vec<String> = schema
            .iter()
            .map(|(field, data_type)| format!("{} {}", quote(field), affinity(data_type)))
            .collect();
        let transaction = self.connection.unchecked_transaction()?;
        transaction.execute_batch(&format!(
            "drop table if exists {table}; create table {table} ({columns});",
            table = quote(name),
            columns = columns.join(", ")
        ))?;
        {
            let placeholders = vec!["?"; schema.len()].join(", ");
            let mut insert = transaction.prepare(&format!("insert into {} values ({})", quote(name), placeholders))?;
            for row in rows {
                insert.execute(rusqlite::params_from_iter(row.iter().map(to_sql)))?;
            }
        }
        transaction.commit()?;
        debug!(table = name, rows = rows.len(), "loaded into dataframe");
        Ok(())
    }

    fn scan(&self, name: &str, schema: &Schema) -> Result<Vec<Vec<Value>>> {
        let columns: Vec<String> = schema.fields().map(quote).collect();
        self.read_rows(&format!("select {} from {}", columns.join(", "), quote(name)), schema)
    }

    fn execute(&self, query: &Query, schema: &Schema) -> Result<Vec<Vec<Value>>> {
        let sql = query.to_query_language();
        debug!(sql = %sql, "executing query");
        self.read_rows(&sql, schema)
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn affinity(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Integer => "INTEGER",
        DataType::Double | DataType::IeeeDouble => "REAL",
        DataType::String | DataType::Function(_) => "TEXT",
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Integer(i) => SqlValue::Integer(*i),
        // SQLite turns a NaN real into NULL
        Value::Double(d) | Value::IeeeDouble(d) if d.is_nan() => SqlValue::Text(String::from("NaN")),
        Value::Double(d) | Value::IeeeDouble(d) => SqlValue::Real(*d),
        // the call's text form, parsed again on the way out
        Value::Function(call) => SqlValue::Text(call.to_string()),
    }
}

fn from_sql(field: &str, data_type: DataType, cell: ValueRef<'_>) -> Result<Value> {
    let value = match (data_type, cell) {
        (_, ValueRef::Null) => Value::Null,
        (DataType::String, ValueRef::Text(bytes)) => Value::String(text(field, bytes)?.to_owned()),
        (DataType::String, ValueRef::Integer(i)) => Value::String(i.to_string()),
        (DataType::String, ValueRef::Real(d)) => Value::String(d.to_string()),
        (DataType::Integer, ValueRef::Integer(i)) => Value::Integer(i),
        (DataType::Integer, ValueRef::Real(d)) if d.fract() == 0.0 && d.abs() < 9.2e18 => Value::Integer(d as i64),
        (DataType::Double, ValueRef::Real(d)) => Value::Double(d),
        (DataType::Double, ValueRef::Integer(i)) => Value::Double(i as f64),
        (DataType::IeeeDouble, ValueRef::Real(d)) => Value::IeeeDouble(d),
        (DataType::IeeeDouble, ValueRef::Integer(i)) => Value::IeeeDouble(i as f64),
        (DataType::Function(result_type), ValueRef::Text(bytes)) => {
            Value::Function(FunctionCall::parse(text(field, bytes)?, result_type)?)
        }
        (data_type, ValueRef::Text(bytes)) => data_type.coerce(text(field, bytes)?)?,
        (data_type, other) => {
            return Err(OptabError::Dataframe(format!(
                "Column '{}' holds a {:?} value that cannot be read as {}",
                field,
                other.data_type(),
                data_type
            )));
        }
    };
    Ok(value)
}

fn text<'c>(field: &str, bytes: &'c [u8]) -> Result<&'c str> {
    std::str::from_utf8(bytes).map_err(|e| OptabError::Dataframe(format!("Column '{}' is not UTF-8: {}", field, e)))
}
