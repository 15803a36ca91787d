// ordered maps; insertion order is the column order
use indexmap::map::{Entry, Iter};
use indexmap::{IndexMap, IndexSet};

// used to print out readable forms of a construct
use std::fmt;

// our own stuff that we need
use crate::datatype::{DataType, Value};
use crate::error::{OptabError, Result};

// ------------- Container -------------
/// An ordered, name-keyed holder of items. Names are unique and the order in
/// which items were added is significant. Containers are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Container<T> {
    items: IndexMap<String, T>,
}

impl<T> Container<T> {
    pub fn empty() -> Self {
        Self { items: IndexMap::new() }
    }
    pub fn get(&self, name: &str) -> Option<&T> {
        self.items.get(name)
    }
    pub fn get_index(&self, index: usize) -> Option<(&str, &T)> {
        self.items.get_index(index).map(|(name, item)| (name.as_str(), item))
    }
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.get_index_of(name)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }
    pub fn iter(&self) -> Iter<'_, String, T> {
        self.items.iter()
    }
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.items.keys().map(String::as_str)
    }
    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.values()
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn into_values(self) -> Vec<T> {
        self.items.into_values().collect()
    }
}

impl<'a, T> IntoIterator for &'a Container<T> {
    type Item = (&'a String, &'a T);
    type IntoIter = Iter<'a, String, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: fmt::Display> fmt::Display for Container<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let items: Vec<String> = self.items.iter().map(|(name, item)| format!("{}: {}", name, item)).collect();
        write!(f, "{{{}}}", items.join(", "))
    }
}

#[derive(Debug)]
pub struct ContainerBuilder<T> {
    items: IndexMap<String, T>,
    fields: Option<IndexSet<String>>,
}

impl<T: PartialEq + fmt::Display> ContainerBuilder<T> {
    pub fn new() -> Self {
        Self { items: IndexMap::new(), fields: None }
    }
    /// A builder whose container must hold exactly these fields.
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: IndexMap::new(),
            fields: Some(fields.into_iter().map(Into::into).collect()),
        }
    }
    /// Adds an item. Adding an equal item under a name already present is a
    /// no-op, while adding a different one fails.
    pub fn add_item(&mut self, name: impl Into<String>, item: T) -> Result<&mut Self> {
        match self.items.entry(name.into()) {
            Entry::Vacant(e) => {
                e.insert(item);
            }
            Entry::Occupied(e) => {
                if *e.get() != item {
                    return Err(OptabError::Schema(format!(
                        "Field '{}' already holds {}, cannot replace it with {}",
                        e.key(),
                        e.get(),
                        item
                    )));
                }
            }
        }
        Ok(self)
    }
    pub fn remove_item(&mut self, name: &str) -> &mut Self {
        self.items.shift_remove(name);
        self
    }
    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }
    pub fn build(self) -> Result<Container<T>> {
        if let Some(fields) = &self.fields {
            let expected: Vec<&str> = fields.iter().map(String::as_str).collect();
            let actual: Vec<&str> = self.items.keys().map(String::as_str).collect();
            check_field_names(&expected, &actual)?;
        }
        Ok(Container { items: self.items })
    }
}

impl<T: PartialEq + fmt::Display> Default for ContainerBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fails when the two name sets differ, listing what is missing and what is extra.
fn check_field_names(expected: &[&str], actual: &[&str]) -> Result<()> {
    let missing: Vec<&str> = expected.iter().filter(|e| !actual.contains(*e)).copied().collect();
    let extra: Vec<&str> = actual.iter().filter(|a| !expected.contains(*a)).copied().collect();
    if missing.is_empty() && extra.is_empty() {
        return Ok(());
    }
    Err(OptabError::Schema(format!(
        "Field mismatch, missing [{}], extra [{}]",
        missing.join(", "),
        extra.join(", ")
    )))
}

// ------------- Schema -------------
/// The declared type of every field. A schema owns no data; it is held by
/// its table and borrowed by every record built against it.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    types: Container<DataType>,
}

impl Schema {
    pub fn new(types: Container<DataType>) -> Self {
        Self { types }
    }
    /// Builds a schema from position-aligned field names and type tags.
    pub fn from_tags<F, T>(fields: &[F], tags: &[T]) -> Result<Self>
    where
        F: AsRef<str>,
        T: AsRef<str>,
    {
        if fields.len() != tags.len() {
            return Err(OptabError::Schema(format!(
                "{} fields but {} types",
                fields.len(),
                tags.len()
            )));
        }
        let mut types = IndexMap::new();
        for (field, tag) in fields.iter().zip(tags) {
            let data_type = DataType::from_tag(tag.as_ref())?;
            if types.insert(field.as_ref().to_owned(), data_type).is_some() {
                return Err(OptabError::Schema(format!("Duplicate field '{}'", field.as_ref())));
            }
        }
        Ok(Self { types: Container { items: types } })
    }
    pub fn get(&self, name: &str) -> Option<DataType> {
        self.types.get(name).copied()
    }
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains(name)
    }
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.types.index_of(name)
    }
    pub fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.types.names()
    }
    pub fn types(&self) -> impl Iterator<Item = DataType> + '_ {
        self.types.values().copied()
    }
    pub fn tags(&self) -> Vec<&'static str> {
        self.types.values().map(DataType::tag).collect()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, DataType)> + '_ {
        self.types.iter().map(|(name, data_type)| (name.as_str(), *data_type))
    }
    pub fn len(&self) -> usize {
        self.types.len()
    }
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
    pub fn container(&self) -> &Container<DataType> {
        &self.types
    }
    pub fn record(&self) -> RecordBuilder<'_> {
        RecordBuilder::new(self)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.types)
    }
}

// ------------- Record -------------
/// One row of typed data. The field names of a record are exactly those of
/// its schema, in the schema's order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<'s> {
    schema: &'s Schema,
    items: Container<Value>,
}

impl<'s> Record<'s> {
    /// Builds a record from values aligned with the schema's fields.
    pub fn from_values(schema: &'s Schema, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(OptabError::Schema(format!(
                "{} values given for {} fields of {}",
                values.len(),
                schema.len(),
                schema
            )));
        }
        let mut items = IndexMap::with_capacity(values.len());
        for ((name, data_type), value) in schema.iter().zip(values) {
            check_type(name, data_type, &value)?;
            items.insert(name.to_owned(), value);
        }
        Ok(Self { schema, items: Container { items } })
    }
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.items.get(name)
    }
    pub fn items(&self) -> &Container<Value> {
        &self.items
    }
    pub fn iter(&self) -> Iter<'_, String, Value> {
        self.items.iter()
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    /// True for a record that carries no value at all.
    pub fn is_null(&self) -> bool {
        self.items.values().all(Value::is_null)
    }
    pub fn into_values(self) -> Vec<Value> {
        self.items.into_values()
    }
}

impl fmt::Display for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.items)
    }
}

fn check_type(name: &str, data_type: DataType, value: &Value) -> Result<()> {
    if data_type.accepts(value) {
        Ok(())
    } else {
        Err(OptabError::Schema(format!(
            "Field '{}' is declared {} but holds {}",
            name, data_type, value
        )))
    }
}

#[derive(Debug)]
pub struct RecordBuilder<'s> {
    schema: &'s Schema,
    builder: ContainerBuilder<Value>,
}

impl<'s> RecordBuilder<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema, builder: ContainerBuilder::new() }
    }
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }
    pub fn add_item(&mut self, name: impl Into<String>, value: Value) -> Result<&mut Self> {
        self.builder.add_item(name, value)?;
        Ok(self)
    }
    pub fn remove_item(&mut self, name: &str) -> &mut Self {
        self.builder.remove_item(name);
        self
    }
    /// Freezes the record. Fails unless the added names are exactly the
    /// schema's fields and every value fits its declared type.
    pub fn build(self) -> Result<Record<'s>> {
        let mut built = self.builder.build()?;
        let expected: Vec<&str> = self.schema.fields().collect();
        let actual: Vec<&str> = built.names().collect();
        check_field_names(&expected, &actual)?;
        let mut items = IndexMap::with_capacity(self.schema.len());
        for (name, data_type) in self.schema.iter() {
            let value = built.items.shift_remove(name).unwrap_or(Value::Null);
            check_type(name, data_type, &value)?;
            items.insert(name.to_owned(), value);
        }
        Ok(Record { schema: self.schema, items: Container { items } })
    }
    /// A record with no value in any field, i.e. a row not computed yet.
    pub fn build_null(self) -> Record<'s> {
        let items = self.schema.fields().map(|name| (name.to_owned(), Value::Null)).collect();
        Record { schema: self.schema, items: Container { items } }
    }
}
