//! Function calls: deferred references to scalars a solver computes.
//!
//! A function call is written inside an item of a `*_FUNCTION` field, e.g.
//! `value(x)`, `dual<row>` or `reduced_cost x, y`. The three opening
//! delimiters are equivalent; the closer is optional. Once a solver has run,
//! the result-capture step sets the call's value exactly once, after which it
//! is written as `value(x) = 4.5`.

use std::fmt;
// single assignment, many readers
use std::sync::{Arc, OnceLock};

use indexmap::IndexSet;
use pest::Parser;
use pest_derive::Parser;
use tracing::debug;

use crate::construct::Schema;
use crate::datatype::{DataType, ResultType, Value};
use crate::error::{OptabError, Result};

#[derive(Parser)]
#[grammar = "function.pest"]
struct FunctionParser;

// ------------- Result slots -------------
/// One variant per result type, each holding a cell that may be written once.
/// Clones share the cell, so a value set through any copy of a row is seen by
/// the table holding it.
#[derive(Debug, Clone)]
pub enum FunctionResult {
    String(Arc<OnceLock<String>>),
    Integer(Arc<OnceLock<i64>>),
    Double(Arc<OnceLock<f64>>),
    IeeeDouble(Arc<OnceLock<f64>>),
}

impl FunctionResult {
    pub fn new(result_type: ResultType) -> Self {
        match result_type {
            ResultType::String => FunctionResult::String(Arc::default()),
            ResultType::Integer => FunctionResult::Integer(Arc::default()),
            ResultType::Double => FunctionResult::Double(Arc::default()),
            ResultType::IeeeDouble => FunctionResult::IeeeDouble(Arc::default()),
        }
    }
    pub fn result_type(&self) -> ResultType {
        match self {
            FunctionResult::String(_) => ResultType::String,
            FunctionResult::Integer(_) => ResultType::Integer,
            FunctionResult::Double(_) => ResultType::Double,
            FunctionResult::IeeeDouble(_) => ResultType::IeeeDouble,
        }
    }
    pub fn value(&self) -> Option<Value> {
        match self {
            FunctionResult::String(cell) => cell.get().cloned().map(Value::String),
            FunctionResult::Integer(cell) => cell.get().copied().map(Value::Integer),
            FunctionResult::Double(cell) => cell.get().copied().map(Value::Double),
            FunctionResult::IeeeDouble(cell) => cell.get().copied().map(Value::IeeeDouble),
        }
    }
    fn has_value(&self) -> bool {
        match self {
            FunctionResult::String(cell) => cell.get().is_some(),
            FunctionResult::Integer(cell) => cell.get().is_some(),
            FunctionResult::Double(cell) => cell.get().is_some(),
            FunctionResult::IeeeDouble(cell) => cell.get().is_some(),
        }
    }
}

impl PartialEq for FunctionResult {
    fn eq(&self, other: &Self) -> bool {
        self.result_type() == other.result_type() && self.value() == other.value()
    }
}

// ------------- Function calls -------------
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    name: String,
    arguments: Vec<String>,
    result: FunctionResult,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: Vec<String>, result_type: ResultType) -> Self {
        Self {
            name: name.into(),
            arguments,
            result: FunctionResult::new(result_type),
        }
    }

    /// Parses `name(a,b)`, `name<a,b>` or `name a,b`, with an optional
    /// `= value` suffix holding a previously captured result.
    pub fn parse(text: &str, result_type: ResultType) -> Result<Self> {
        let call = FunctionParser::parse(Rule::call, text)?
            .next()
            .ok_or_else(|| OptabError::syntax_at(text, 1, 1, "Empty function call"))?;
        let mut name = None;
        let mut arguments = Vec::new();
        let mut literal = None;
        for pair in call.into_inner() {
            match pair.as_rule() {
                Rule::name => name = Some(pair.as_str().to_owned()),
                Rule::argument => arguments.push(pair.as_str().to_owned()),
                Rule::assignment => literal = pair.into_inner().next().map(|l| l.as_str().trim().to_owned()),
                _ => (),
            }
        }
        let name = name.ok_or_else(|| OptabError::syntax_at(text, 1, 1, "Missing function name"))?;
        let call = FunctionCall::new(name, arguments, result_type);
        if let Some(literal) = literal {
            call.set_value(result_type.value_type().coerce(&literal)?)?;
        }
        Ok(call)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }
    pub fn result_type(&self) -> ResultType {
        self.result.result_type()
    }
    pub fn data_type(&self) -> DataType {
        DataType::Function(self.result_type())
    }
    /// The schema tag of fields holding this call, e.g. `DOUBLE_FUNCTION`.
    pub fn type_tag(&self) -> &'static str {
        self.data_type().tag()
    }
    pub fn has_value(&self) -> bool {
        self.result.has_value()
    }
    pub fn value(&self) -> Option<Value> {
        self.result.value()
    }

    /// Sets the computed value. A call may only ever be given one value.
    pub fn set_value(&self, value: Value) -> Result<()> {
        if self.has_value() {
            return Err(OptabError::State(format!("The value of {} has already been set", self)));
        }
        let already_set = || OptabError::State(format!("The value of {} has already been set", self));
        match (&self.result, value) {
            (FunctionResult::String(cell), Value::String(s)) => cell.set(s).map_err(|_| already_set()),
            (FunctionResult::Integer(cell), Value::Integer(i)) => cell.set(i).map_err(|_| already_set()),
            (FunctionResult::Double(cell), Value::Double(d) | Value::IeeeDouble(d)) => {
                cell.set(d).map_err(|_| already_set())
            }
            (FunctionResult::IeeeDouble(cell), Value::IeeeDouble(d) | Value::Double(d)) => {
                cell.set(d).map_err(|_| already_set())
            }
            (_, other) => Err(OptabError::Schema(format!(
                "{} cannot hold {} as a {} result",
                self,
                other,
                self.result_type().tag()
            ))),
        }
    }

    /// Fails unless the function is defined and every argument names a field of `schema`.
    pub fn validate(&self, keeper: &FunctionKeeper, schema: &Schema) -> Result<()> {
        if !keeper.is_defined(&self.name) {
            return Err(OptabError::Dependency(format!("Undefined function '{}'", self.name)));
        }
        if let Some(missing) = self.arguments.iter().find(|argument| !schema.contains(argument)) {
            return Err(OptabError::Dependency(format!(
                "Argument '{}' of {} is not a field of {}",
                missing, self, schema
            )));
        }
        Ok(())
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.name, self.arguments.join(","))?;
        if let Some(value) = self.value() {
            write!(f, " = {}", value.literal())?;
        }
        Ok(())
    }
}

// ------------- Function keeper -------------
/// Keeps the names of the functions a solver adapter knows how to compute.
#[derive(Debug, Default)]
pub struct FunctionKeeper {
    kept: IndexSet<String>,
}

impl FunctionKeeper {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn define(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.kept.contains(&name) {
            return Err(OptabError::State(format!("Function '{}' is already defined", name)));
        }
        debug!(function = %name, "defined");
        self.kept.insert(name);
        Ok(())
    }
    pub fn is_defined(&self, name: &str) -> bool {
        self.kept.contains(name)
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}
