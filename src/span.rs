//! Spans: schema-typed record sequences handed to solver adapters.
//!
//! A span produces its records lazily each time it is applied, and every span
//! here can be applied any number of times. Spans are composed with
//! operators, which turn one record (or a pair of records, one from each of
//! two spans) into at most one record of a fixed result schema. Every record
//! borrows its schema from a table or from the caller, hence the single
//! lifetime `'a` running through this module.

use tracing::debug;

use crate::construct::{Container, Record, RecordBuilder, Schema};
use crate::dataframe::Dataframe;
use crate::datatype::Value;
use crate::error::{OptabError, Result};
use crate::model::Table;

pub type Records<'s, 'a> = Box<dyn Iterator<Item = Result<Record<'a>>> + 's>;

pub trait Span<'a> {
    fn schema(&self) -> &'a Schema;
    fn apply(&self) -> Result<Records<'_, 'a>>;

    /// Applies the span and collects the records, failing on the first error.
    fn records(&self) -> Result<Vec<Record<'a>>> {
        self.apply()?.collect()
    }
}

impl<'a, S: Span<'a> + ?Sized> Span<'a> for Box<S> {
    fn schema(&self) -> &'a Schema {
        (**self).schema()
    }
    fn apply(&self) -> Result<Records<'_, 'a>> {
        (**self).apply()
    }
}

// ------------- Operators -------------
type Unary<'a> = Box<dyn Fn(&Record<'a>, RecordBuilder<'a>) -> Result<Record<'a>> + 'a>;
type Binary<'a> = Box<dyn Fn(&Record<'a>, &Record<'a>, RecordBuilder<'a>) -> Result<Record<'a>> + 'a>;

enum Transform<'a> {
    Unary(Unary<'a>),
    Binary(Binary<'a>),
}

/// Turns input records into records of its result schema. The transform is
/// handed a builder for the result schema; returning a record with no values
/// (see [`RecordBuilder::build_null`]) means the input contributes nothing.
pub struct Operator<'a> {
    transform: Transform<'a>,
    result_schema: Option<&'a Schema>,
}

impl<'a> Operator<'a> {
    pub fn unary<F>(transform: F) -> Self
    where
        F: Fn(&Record<'a>, RecordBuilder<'a>) -> Result<Record<'a>> + 'a,
    {
        Self { transform: Transform::Unary(Box::new(transform)), result_schema: None }
    }
    pub fn binary<F>(transform: F) -> Self
    where
        F: Fn(&Record<'a>, &Record<'a>, RecordBuilder<'a>) -> Result<Record<'a>> + 'a,
    {
        Self { transform: Transform::Binary(Box::new(transform)), result_schema: None }
    }

    pub fn arity(&self) -> usize {
        match self.transform {
            Transform::Unary(_) => 1,
            Transform::Binary(_) => 2,
        }
    }

    /// Fixes the result schema. It can only be fixed once.
    pub fn with_result_schema(mut self, schema: &'a Schema) -> Result<Self> {
        if let Some(fixed) = self.result_schema {
            return Err(OptabError::State(format!("The result schema is already fixed to {}", fixed)));
        }
        self.result_schema = Some(schema);
        Ok(self)
    }
    pub fn result_schema(&self) -> Result<&'a Schema> {
        self.result_schema
            .ok_or_else(|| OptabError::State(String::from("The result schema has not been fixed")))
    }

    pub fn apply(&self, record: &Record<'a>) -> Result<Option<Record<'a>>> {
        let schema = self.result_schema()?;
        match &self.transform {
            Transform::Unary(transform) => contribution(schema, transform(record, schema.record())?),
            Transform::Binary(_) => Err(arity_error(2, 1)),
        }
    }
    pub fn apply_pair(&self, left: &Record<'a>, right: &Record<'a>) -> Result<Option<Record<'a>>> {
        let schema = self.result_schema()?;
        match &self.transform {
            Transform::Binary(transform) => contribution(schema, transform(left, right, schema.record())?),
            Transform::Unary(_) => Err(arity_error(1, 2)),
        }
    }
}

fn contribution<'a>(schema: &Schema, record: Record<'a>) -> Result<Option<Record<'a>>> {
    if !std::ptr::eq(record.schema(), schema) {
        return Err(OptabError::Schema(format!(
            "Operator produced {} outside its result schema {}",
            record, schema
        )));
    }
    Ok(if record.is_null() { None } else { Some(record) })
}

fn arity_error(arity: usize, given: usize) -> OptabError {
    OptabError::State(format!("An operator taking {} records was applied to {}", arity, given))
}

// ------------- Spans -------------
/// Records built from a collection of containers, each checked against the schema.
pub struct ContainerSpan<'a> {
    schema: &'a Schema,
    containers: Vec<Container<Value>>,
}

impl<'a> ContainerSpan<'a> {
    pub fn new(schema: &'a Schema, containers: Vec<Container<Value>>) -> Self {
        Self { schema, containers }
    }
}

impl<'a> Span<'a> for ContainerSpan<'a> {
    fn schema(&self) -> &'a Schema {
        self.schema
    }
    fn apply(&self) -> Result<Records<'_, 'a>> {
        let schema = self.schema;
        Ok(Box::new(self.containers.iter().map(move |container| {
            let mut builder = schema.record();
            for (name, value) in container {
                builder.add_item(name.as_str(), value.clone())?;
            }
            builder.build()
        })))
    }
}

/// The rows of a literal or materialized table.
pub struct InstanceSpan<'a> {
    table: &'a Table,
}

impl<'a> Span<'a> for InstanceSpan<'a> {
    fn schema(&self) -> &'a Schema {
        self.table.schema()
    }
    fn apply(&self) -> Result<Records<'_, 'a>> {
        let table: &'a Table = self.table;
        let instance = table
            .instance()
            .ok_or_else(|| OptabError::State(format!("Table '{}' has not been materialized", table.name())))?;
        Ok(Box::new(instance.records(table.schema())))
    }
}

/// A table held by a dataframe, scanned anew on every application.
pub struct DataframeSpan<'a> {
    dataframe: &'a dyn Dataframe,
    name: String,
    schema: &'a Schema,
}

impl<'a> Span<'a> for DataframeSpan<'a> {
    fn schema(&self) -> &'a Schema {
        self.schema
    }
    fn apply(&self) -> Result<Records<'_, 'a>> {
        let schema = self.schema;
        let rows = self.dataframe.scan(&self.name, schema)?;
        Ok(Box::new(rows.into_iter().map(move |row| Record::from_values(schema, row))))
    }
}

/// A span passed through a unary operator.
pub struct OperatorSpan<'a> {
    source: Box<dyn Span<'a> + 'a>,
    operator: Operator<'a>,
    schema: &'a Schema,
}

impl<'a> Span<'a> for OperatorSpan<'a> {
    fn schema(&self) -> &'a Schema {
        self.schema
    }
    fn apply(&self) -> Result<Records<'_, 'a>> {
        let operator = &self.operator;
        let records = self.source.apply()?;
        Ok(Box::new(records.filter_map(move |record| record.and_then(|r| operator.apply(&r)).transpose())))
    }
}

/// A binary operator applied to every pair in the cross product of two spans.
pub struct PairSpan<'a> {
    left: Box<dyn Span<'a> + 'a>,
    right: Box<dyn Span<'a> + 'a>,
    operator: Operator<'a>,
    schema: &'a Schema,
}

impl<'a> Span<'a> for PairSpan<'a> {
    fn schema(&self) -> &'a Schema {
        self.schema
    }
    fn apply(&self) -> Result<Records<'_, 'a>> {
        let right: Vec<Record<'a>> = self.right.records()?;
        let operator = &self.operator;
        let left = self.left.apply()?;
        Ok(Box::new(left.flat_map(move |record| match record {
            Err(e) => vec![Err(e)],
            Ok(l) => right.iter().filter_map(|r| operator.apply_pair(&l, r).transpose()).collect(),
        })))
    }
}

// ------------- Factory -------------
/// Builds spans from the sources a solver adapter draws on.
#[derive(Default)]
pub struct SpanFactory<'a> {
    dataframe: Option<&'a dyn Dataframe>,
}

impl<'a> SpanFactory<'a> {
    pub fn new() -> Self {
        Self { dataframe: None }
    }
    pub fn with_dataframe(dataframe: &'a dyn Dataframe) -> Self {
        Self { dataframe: Some(dataframe) }
    }

    pub fn from_dataframe(&self, name: impl Into<String>, schema: &'a Schema) -> Result<Box<dyn Span<'a> + 'a>> {
        let dataframe = self
            .dataframe
            .ok_or_else(|| OptabError::State(String::from("The span factory has no dataframe")))?;
        Ok(Box::new(DataframeSpan { dataframe, name: name.into(), schema }))
    }
    pub fn from_table(&self, table: &'a Table) -> Box<dyn Span<'a> + 'a> {
        Box::new(InstanceSpan { table })
    }
    pub fn from_containers(&self, schema: &'a Schema, containers: Vec<Container<Value>>) -> Box<dyn Span<'a> + 'a> {
        Box::new(ContainerSpan::new(schema, containers))
    }

    /// A span of `source` passed through a unary operator.
    pub fn compose(&self, source: Box<dyn Span<'a> + 'a>, operator: Operator<'a>) -> Result<Box<dyn Span<'a> + 'a>> {
        if operator.arity() != 1 {
            return Err(arity_error(operator.arity(), 1));
        }
        let schema = operator.result_schema()?;
        debug!(source = %source.schema(), result = %schema, "composed span");
        Ok(Box::new(OperatorSpan { source, operator, schema }))
    }

    /// A span of a binary operator over every pair of `left` and `right` records.
    pub fn combine(
        &self,
        left: Box<dyn Span<'a> + 'a>,
        right: Box<dyn Span<'a> + 'a>,
        operator: Operator<'a>,
    ) -> Result<Box<dyn Span<'a> + 'a>> {
        if operator.arity() != 2 {
            return Err(arity_error(operator.arity(), 2));
        }
        let schema = operator.result_schema()?;
        debug!(left = %left.schema(), right = %right.schema(), result = %schema, "combined spans");
        Ok(Box::new(PairSpan { left, right, operator, schema }))
    }
}
