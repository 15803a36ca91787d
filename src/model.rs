// ordered maps; declaration order of modules and tables is significant
use indexmap::IndexMap;

// used to print out readable forms of the model
use std::fmt;

use tracing::debug;

// our own stuff that we need
use crate::construct::{Record, Schema};
use crate::datatype::Value;
use crate::error::{OptabError, Result};
use crate::function::FunctionKeeper;
use crate::query::Query;

// ------------- Instance -------------
/// The rows of a table, position-aligned with its schema's fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Instance {
    rows: Vec<Vec<Value>>,
}

impl Instance {
    /// Validates every row against `schema`: one item per field, each
    /// compatible with the field's declared type.
    pub fn new(schema: &Schema, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (index, row) in rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(OptabError::Schema(format!(
                    "Row {} has {} items but the schema has {} fields",
                    index,
                    row.len(),
                    schema.len()
                )));
            }
            for ((field, data_type), value) in schema.iter().zip(row) {
                if !data_type.accepts(value) {
                    return Err(OptabError::Schema(format!(
                        "Row {}: field '{}' is declared {} but holds {}",
                        index, field, data_type, value
                    )));
                }
            }
        }
        Ok(Self { rows })
    }
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    /// The rows as records borrowing `schema`, which must be the one the
    /// instance was validated against. Function calls in the records share
    /// their result cells with the rows.
    pub fn records<'s>(&self, schema: &'s Schema) -> impl Iterator<Item = Result<Record<'s>>> {
        self.rows.iter().map(move |row| Record::from_values(schema, row.clone()))
    }
}

// ------------- Table -------------
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    /// Rows given in the document.
    Literal(Instance),
    /// Rows computed from other tables, available once materialized.
    Query { query: Query, instance: Option<Instance> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    class: Option<String>,
    kind: Option<String>,
    schema: Schema,
    source: TableSource,
}

impl Table {
    pub fn literal(name: impl Into<String>, schema: Schema, instance: Instance) -> Self {
        Self { name: name.into(), class: None, kind: None, schema, source: TableSource::Literal(instance) }
    }
    /// A table whose schema is computed from the query's select list.
    pub fn from_query(name: impl Into<String>, query: Query) -> Result<Self> {
        let schema = query.result_schema()?;
        Ok(Self {
            name: name.into(),
            class: None,
            kind: None,
            schema,
            source: TableSource::Query { query, instance: None },
        })
    }
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
    pub fn source(&self) -> &TableSource {
        &self.source
    }
    pub fn is_query(&self) -> bool {
        matches!(self.source, TableSource::Query { .. })
    }
    pub fn query(&self) -> Option<&Query> {
        match &self.source {
            TableSource::Query { query, .. } => Some(query),
            TableSource::Literal(_) => None,
        }
    }
    /// The rows, if the table is literal or has been materialized.
    pub fn instance(&self) -> Option<&Instance> {
        match &self.source {
            TableSource::Literal(instance) => Some(instance),
            TableSource::Query { instance, .. } => instance.as_ref(),
        }
    }

    /// Sets the computed rows of a query table. This happens at most once.
    pub fn set_instance(&mut self, rows: Vec<Vec<Value>>) -> Result<()> {
        let instance = Instance::new(&self.schema, rows)?;
        match &mut self.source {
            TableSource::Literal(_) => Err(OptabError::State(format!(
                "Table '{}' is literal, its instance cannot be replaced",
                self.name
            ))),
            TableSource::Query { instance: Some(_), .. } => Err(OptabError::State(format!(
                "Table '{}' has already been materialized",
                self.name
            ))),
            TableSource::Query { instance: slot, .. } => {
                debug!(table = %self.name, rows = instance.len(), "materialized");
                *slot = Some(instance);
                Ok(())
            }
        }
    }

    /// Records of the table's instance. Fails for a query table not yet materialized.
    pub fn records(&self) -> Result<impl Iterator<Item = Result<Record<'_>>> + '_> {
        let instance = self
            .instance()
            .ok_or_else(|| OptabError::State(format!("Table '{}' has not been materialized", self.name)))?;
        Ok(instance.records(&self.schema))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.name, self.schema)
    }
}

// ------------- Module -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    name: String,
    class: Option<String>,
    kind: Option<String>,
    tables: IndexMap<String, Table>,
}

impl Module {
    pub fn new(name: impl Into<String>, tables: Vec<Table>) -> Result<Self> {
        let name = name.into();
        let mut kept = IndexMap::with_capacity(tables.len());
        for table in tables {
            if kept.contains_key(table.name()) {
                return Err(OptabError::Schema(format!(
                    "Duplicate table '{}' in module '{}'",
                    table.name(),
                    name
                )));
            }
            kept.insert(table.name().to_owned(), table);
        }
        Ok(Self { name, class: None, kind: None, tables: kept })
    }
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }
    pub fn tables(&self) -> impl Iterator<Item = &Table> + '_ {
        self.tables.values()
    }
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }
}

// ------------- File -------------
/// A whole document: an optional syntax tag and its modules.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    syntax: Option<String>,
    modules: Vec<Module>,
}

impl File {
    /// Fails when two modules share a name or a table name appears twice
    /// anywhere in the file.
    pub fn new(syntax: Option<String>, modules: Vec<Module>) -> Result<Self> {
        let file = Self { syntax, modules };
        let mut names = IndexMap::new();
        for module in &file.modules {
            if names.insert(module.name(), ()).is_some() {
                return Err(OptabError::Schema(format!("Duplicate module '{}'", module.name())));
            }
        }
        file.tables()?;
        Ok(file)
    }
    pub fn syntax(&self) -> Option<&str> {
        self.syntax.as_deref()
    }
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Every table of every module keyed by name, in declaration order.
    pub fn tables(&self) -> Result<IndexMap<&str, &Table>> {
        let mut tables = IndexMap::new();
        for module in &self.modules {
            for table in module.tables() {
                if tables.insert(table.name(), table).is_some() {
                    return Err(OptabError::Schema(format!(
                        "Table '{}' is declared more than once in the file",
                        table.name()
                    )));
                }
            }
        }
        Ok(tables)
    }
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.modules.iter().find_map(|module| module.table(name))
    }
    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.modules.iter_mut().find_map(|module| module.tables.get_mut(name))
    }

    /// Checks every function call held by a table instance against the
    /// defined functions and the fields of its table.
    pub fn validate_functions(&self, keeper: &FunctionKeeper) -> Result<usize> {
        let mut checked = 0;
        for module in &self.modules {
            for table in module.tables() {
                let Some(instance) = table.instance() else {
                    continue;
                };
                for call in instance.rows().iter().flatten().filter_map(Value::as_function) {
                    call.validate(keeper, table.schema())?;
                    checked += 1;
                }
            }
        }
        debug!(calls = checked, "validated function calls");
        Ok(checked)
    }
}
