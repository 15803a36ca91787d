//! Reading and writing whole documents.
//!
//! A document is `{SYNTAX, MODULES: [{NAME, CLASS, KIND, TABLES: [...]}]}`
//! where every table is `{NAME, CLASS, KIND, SCHEMA, INSTANCE}` or
//! `{NAME, CLASS, KIND, SCHEMA?, QUERY}`. The generic tree reader does the
//! walking; the handlers registered here build the [`File`] on the way, and
//! instance rows are coerced straight from the JSON input without ever
//! becoming a generic tree.

use std::fmt;
use std::io::Write;
use std::time::Instant;

use indexmap::IndexMap;
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::ser::{Serialize, Serializer};
use tracing::{debug, info};

use crate::construct::Schema;
use crate::datatype::{DataType, Value, format_hex_float};
use crate::error::{OptabError, Result};
use crate::model::{File, Instance, Module, Table};
use crate::query::Query;
use crate::settings::Settings;
use crate::tree::{NameGuard, Node, ReadHandler, Site, TreeReader, TreeWriter, WriteHandler};

pub const SYNTAX: &str = "SYNTAX";
pub const MODULES: &str = "MODULES";
pub const NAME: &str = "NAME";
pub const CLASS: &str = "CLASS";
pub const KIND: &str = "KIND";
pub const TABLES: &str = "TABLES";
pub const SCHEMA: &str = "SCHEMA";
pub const FIELDS: &str = "FIELDS";
pub const TYPES: &str = "TYPES";
pub const INSTANCE: &str = "INSTANCE";
pub const QUERY: &str = "QUERY";

// ------------- Reading -------------
/// What the handlers have built so far. The pending parts of the table being
/// read are reset at the start of every table.
#[derive(Debug, Default)]
struct ReadContext {
    schema: Option<Schema>,
    rows: Option<Vec<Vec<Value>>>,
    query: Option<Query>,
    tables: Vec<Table>,
    modules: Vec<Module>,
}

/// Parses a document into its object model.
pub fn read(text: &str) -> Result<File> {
    let started = Instant::now();
    let reader = TreeReader::new()
        .with_handler(SCHEMA, Reading::Schema)
        .with_handler(INSTANCE, Reading::Instance)
        .with_handler(QUERY, Reading::Query)
        .with_handler(TABLES, Reading::Table)
        .with_handler(MODULES, Reading::Module);
    let mut context = ReadContext::default();
    let root = reader.read(text, &mut context)?;
    let members = root
        .as_object()
        .ok_or_else(|| OptabError::Schema(format!("A document must be an object, not {}", root.kind())))?;
    check_keys(members, &[SYNTAX, MODULES], "document")?;
    if !matches!(members.get(MODULES), Some(Node::Array(_))) {
        return Err(OptabError::Schema(String::from("A document needs a MODULES array")));
    }
    let syntax = optional_string(members, SYNTAX)?;
    let file = File::new(syntax, context.modules)?;
    info!(
        modules = file.modules().len(),
        tables = file.modules().iter().map(|m| m.tables().count()).sum::<usize>(),
        ms = started.elapsed().as_millis() as u64,
        "read document"
    );
    Ok(file)
}

type Reader = TreeReader<Reading, ReadContext>;

/// The handlers building the object model. Schemas, instances and queries
/// are the values of table fields; tables and modules are array elements.
#[derive(Debug, Clone, Copy)]
enum Reading {
    Schema,
    Instance,
    Query,
    Table,
    Module,
}

impl ReadHandler<ReadContext> for Reading {
    fn claims(&self, site: Site<'_>) -> bool {
        match self {
            Reading::Schema | Reading::Instance | Reading::Query => matches!(site, Site::Field(_)),
            Reading::Table | Reading::Module => matches!(site, Site::Element(..)),
        }
    }

    fn read<'de, D>(
        &self,
        reader: &Reader,
        _site: Site<'_>,
        deserializer: D,
        context: &mut ReadContext,
    ) -> std::result::Result<Node, D::Error>
    where
        D: Deserializer<'de>,
    {
        match self {
            Reading::Schema => {
                let node = reader.read_value(deserializer, context)?;
                context.schema = Some(schema_from_node(&node).map_err(|e| reader.fail::<D::Error>(e))?);
                Ok(node)
            }
            Reading::Instance => {
                let types: Vec<DataType> = match &context.schema {
                    Some(schema) => schema.types().collect(),
                    None => {
                        return Err(reader.fail(OptabError::syntax("INSTANCE must follow the SCHEMA of its table")));
                    }
                };
                let rows = deserializer.deserialize_seq(Rows { reader, types: &types })?;
                debug!(rows = rows.len(), "read instance");
                context.rows = Some(rows);
                Ok(Node::Null)
            }
            Reading::Query => {
                let node = reader.read_value(deserializer, context)?;
                context.query = Some(Query::from_node(&node).map_err(|e| reader.fail::<D::Error>(e))?);
                Ok(node)
            }
            Reading::Table => {
                context.schema = None;
                context.rows = None;
                context.query = None;
                let node = reader.read_value(deserializer, context)?;
                let table = assemble_table(&node, context).map_err(|e| reader.fail::<D::Error>(e))?;
                debug!(table = table.name(), query = table.is_query(), "read table");
                let placeholder = Node::string(table.name());
                context.tables.push(table);
                Ok(placeholder)
            }
            Reading::Module => {
                let enclosing = std::mem::take(&mut context.tables);
                let node = reader.read_value(deserializer, context)?;
                let tables = std::mem::replace(&mut context.tables, enclosing);
                let module = assemble_module(&node, tables).map_err(|e| reader.fail::<D::Error>(e))?;
                let placeholder = Node::string(module.name());
                context.modules.push(module);
                Ok(placeholder)
            }
        }
    }
}

// ------------- Instance rows -------------
/// The rows of an instance, coerced item by item without becoming a tree.
struct Rows<'a> {
    reader: &'a Reader,
    types: &'a [DataType],
}

impl<'de> Visitor<'de> for Rows<'_> {
    type Value = Vec<Vec<Value>>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of rows")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let mut rows = Vec::new();
        while let Some(row) = seq.next_element_seed(Row { reader: self.reader, types: self.types, index: rows.len() })? {
            rows.push(row);
        }
        Ok(rows)
    }
}

struct Row<'a> {
    reader: &'a Reader,
    types: &'a [DataType],
    index: usize,
}

impl<'de> DeserializeSeed<'de> for Row<'_> {
    type Value = Vec<Value>;
    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for Row<'_> {
    type Value = Vec<Value>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a row of items")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let mut row = Vec::with_capacity(self.types.len());
        while let Some(&data_type) = self.types.get(row.len()) {
            match seq.next_element_seed(Item { reader: self.reader, data_type })? {
                Some(value) => row.push(value),
                None => break,
            }
        }
        if row.len() == self.types.len() && seq.next_element::<IgnoredAny>()?.is_some() {
            return Err(self.reader.fail(OptabError::Schema(format!(
                "Row {} has more items than the {} fields of its schema",
                self.index,
                self.types.len()
            ))));
        }
        if row.len() != self.types.len() {
            return Err(self.reader.fail(OptabError::Schema(format!(
                "Row {} has {} items but its schema has {} fields",
                self.index,
                row.len(),
                self.types.len()
            ))));
        }
        Ok(row)
    }
}

/// One item, coerced to the type of its field. Numbers go through the same
/// coercion as their text would.
struct Item<'a> {
    reader: &'a Reader,
    data_type: DataType,
}

impl Item<'_> {
    fn coerce<E: de::Error>(&self, text: &str) -> std::result::Result<Value, E> {
        self.data_type.coerce(text).map_err(|e| self.reader.fail(e))
    }
}

impl<'de> DeserializeSeed<'de> for Item<'_> {
    type Value = Value;
    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for Item<'_> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a {} item", self.data_type)
    }
    fn visit_str<E: de::Error>(self, text: &str) -> std::result::Result<Value, E> {
        self.coerce(text)
    }
    fn visit_i64<E: de::Error>(self, i: i64) -> std::result::Result<Value, E> {
        self.coerce(&i.to_string())
    }
    fn visit_u64<E: de::Error>(self, u: u64) -> std::result::Result<Value, E> {
        self.coerce(&u.to_string())
    }
    fn visit_f64<E: de::Error>(self, d: f64) -> std::result::Result<Value, E> {
        self.coerce(&d.to_string())
    }
    fn visit_bool<E: de::Error>(self, b: bool) -> std::result::Result<Value, E> {
        Err(self.reader.fail(OptabError::Schema(format!(
            "'{}' is not a valid {} literal",
            b,
            self.data_type.tag()
        ))))
    }
    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }
}

fn assemble_table(node: &Node, context: &mut ReadContext) -> Result<Table> {
    let members = node
        .as_object()
        .ok_or_else(|| OptabError::Schema(format!("A table must be an object, not {}", node.kind())))?;
    check_keys(members, &[NAME, CLASS, KIND, SCHEMA, INSTANCE, QUERY], "table")?;
    let name = required_string(members, NAME, "table")?;
    let mut table = match (context.rows.take(), context.query.take()) {
        (Some(_), Some(_)) => {
            return Err(OptabError::Schema(format!("Table '{}' has both an INSTANCE and a QUERY", name)));
        }
        (None, None) => {
            return Err(OptabError::Schema(format!("Table '{}' has neither an INSTANCE nor a QUERY", name)));
        }
        (Some(rows), None) => {
            let schema = context
                .schema
                .take()
                .ok_or_else(|| OptabError::Schema(format!("Table '{}' has an INSTANCE but no SCHEMA", name)))?;
            let instance = Instance::new(&schema, rows)?;
            Table::literal(name, schema, instance)
        }
        (None, Some(query)) => {
            let table = Table::from_query(name, query)?;
            if let Some(declared) = context.schema.take() {
                if declared != *table.schema() {
                    return Err(OptabError::Schema(format!(
                        "Table '{}' declares the schema {} but its query computes {}",
                        table.name(),
                        declared,
                        table.schema()
                    )));
                }
            }
            table
        }
    };
    if let Some(class) = optional_string(members, CLASS)? {
        table = table.with_class(class);
    }
    if let Some(kind) = optional_string(members, KIND)? {
        table = table.with_kind(kind);
    }
    Ok(table)
}

fn assemble_module(node: &Node, tables: Vec<Table>) -> Result<Module> {
    let members = node
        .as_object()
        .ok_or_else(|| OptabError::Schema(format!("A module must be an object, not {}", node.kind())))?;
    check_keys(members, &[NAME, CLASS, KIND, TABLES], "module")?;
    let name = required_string(members, NAME, "module")?;
    if !matches!(members.get(TABLES), None | Some(Node::Array(_))) {
        return Err(OptabError::Schema(format!("TABLES of module '{}' must be an array", name)));
    }
    let mut module = Module::new(name, tables)?;
    if let Some(class) = optional_string(members, CLASS)? {
        module = module.with_class(class);
    }
    if let Some(kind) = optional_string(members, KIND)? {
        module = module.with_kind(kind);
    }
    Ok(module)
}

fn schema_from_node(node: &Node) -> Result<Schema> {
    let members = node
        .as_object()
        .ok_or_else(|| OptabError::Schema(format!("SCHEMA must be an object, not {}", node.kind())))?;
    check_keys(members, &[FIELDS, TYPES], SCHEMA)?;
    let fields = string_array(members, FIELDS)?;
    let types = string_array(members, TYPES)?;
    let mut guard = NameGuard::new(FIELDS);
    for field in &fields {
        guard.admit(field)?;
    }
    Schema::from_tags(&fields, &types)
}

fn check_keys(members: &IndexMap<String, Node>, allowed: &[&str], level: &str) -> Result<()> {
    match members.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(unknown) => Err(OptabError::Schema(format!("Unknown {} field '{}'", level, unknown))),
        None => Ok(()),
    }
}

fn required_string(members: &IndexMap<String, Node>, key: &str, level: &str) -> Result<String> {
    optional_string(members, key)?.ok_or_else(|| OptabError::Schema(format!("A {} needs a {}", level, key)))
}

fn optional_string(members: &IndexMap<String, Node>, key: &str) -> Result<Option<String>> {
    match members.get(key) {
        None => Ok(None),
        Some(node) => node
            .as_str()
            .map(|s| Some(s.to_owned()))
            .ok_or_else(|| OptabError::Schema(format!("{} must be a string, not {}", key, node.kind()))),
    }
}

fn string_array(members: &IndexMap<String, Node>, key: &str) -> Result<Vec<String>> {
    let wrong = || OptabError::Schema(format!("{} must be an array of strings", key));
    match members.get(key) {
        Some(Node::Array(items)) => items.iter().map(|item| item.as_str().map(str::to_owned).ok_or_else(wrong)).collect(),
        _ => Err(wrong()),
    }
}

// ------------- Writing -------------
struct WriteContext<'f> {
    file: &'f File,
    settings: &'f Settings,
}

/// Writes `file` as a document. Instances are streamed row by row from the
/// model rather than copied into the tree being written.
pub fn write(file: &File, settings: &Settings, out: &mut dyn Write) -> Result<()> {
    let started = Instant::now();
    let root = file_to_node(file);
    let writer = TreeWriter::new().with_handler(INSTANCE, StreamInstance);
    writer.write(&root, out, settings.indent, &WriteContext { file, settings })?;
    info!(modules = file.modules().len(), ms = started.elapsed().as_millis() as u64, "wrote document");
    Ok(())
}

/// Writes `file` into a string.
pub fn write_string(file: &File, settings: &Settings) -> Result<String> {
    let mut out = Vec::new();
    write(file, settings, &mut out)?;
    String::from_utf8(out).map_err(|e| OptabError::State(format!("Written document is not UTF-8: {}", e)))
}

fn file_to_node(file: &File) -> Node {
    let mut members = IndexMap::new();
    if let Some(syntax) = file.syntax() {
        members.insert(SYNTAX.to_owned(), Node::string(syntax));
    }
    let modules = file.modules().iter().map(module_to_node).collect();
    members.insert(MODULES.to_owned(), Node::Array(modules));
    Node::Object(members)
}

fn module_to_node(module: &Module) -> Node {
    let mut members = IndexMap::new();
    members.insert(NAME.to_owned(), Node::string(module.name()));
    tag_members(&mut members, module.class(), module.kind());
    members.insert(TABLES.to_owned(), Node::Array(module.tables().map(table_to_node).collect()));
    Node::Object(members)
}

fn table_to_node(table: &Table) -> Node {
    let mut members = IndexMap::new();
    members.insert(NAME.to_owned(), Node::string(table.name()));
    tag_members(&mut members, table.class(), table.kind());
    let schema = table.schema();
    let mut schema_members = IndexMap::new();
    schema_members.insert(FIELDS.to_owned(), Node::strings(schema.fields()));
    schema_members.insert(TYPES.to_owned(), Node::strings(schema.tags()));
    members.insert(SCHEMA.to_owned(), Node::Object(schema_members));
    match table.query() {
        Some(query) => members.insert(QUERY.to_owned(), query.to_node()),
        // filled in by the instance handler
        None => members.insert(INSTANCE.to_owned(), Node::Null),
    };
    Node::Object(members)
}

fn tag_members(members: &mut IndexMap<String, Node>, class: Option<&str>, kind: Option<&str>) {
    if let Some(class) = class {
        members.insert(CLASS.to_owned(), Node::string(class));
    }
    if let Some(kind) = kind {
        members.insert(KIND.to_owned(), Node::string(kind));
    }
}

/// Writes the INSTANCE of a table straight from its rows.
struct StreamInstance;

impl<'f> WriteHandler<WriteContext<'f>> for StreamInstance {
    fn claims(&self, site: Site<'_>, owner: &Node, context: &WriteContext<'f>) -> bool {
        matches!(site, Site::Field(_)) && instance_of(owner, context).is_some()
    }

    fn write<S: Serializer>(
        &self,
        _writer: &TreeWriter<Self, WriteContext<'f>>,
        _site: Site<'_>,
        owner: &Node,
        _node: &Node,
        serializer: S,
        context: &WriteContext<'f>,
    ) -> std::result::Result<S::Ok, S::Error> {
        let settings = context.settings;
        match instance_of(owner, context) {
            Some(instance) => serializer.collect_seq(instance.rows().iter().map(|row| RowView { row, settings })),
            None => serializer.serialize_unit(),
        }
    }
}

/// The instance of the table whose node is `owner`.
fn instance_of<'f>(owner: &Node, context: &WriteContext<'f>) -> Option<&'f Instance> {
    owner.get(NAME).and_then(Node::as_str).and_then(|name| context.file.table(name)).and_then(Table::instance)
}

struct RowView<'a> {
    row: &'a [Value],
    settings: &'a Settings,
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let settings = self.settings;
        serializer.collect_seq(self.row.iter().map(|value| ItemView { value, settings }))
    }
}

struct ItemView<'a> {
    value: &'a Value,
    settings: &'a Settings,
}

impl Serialize for ItemView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let value = self.value;
        match value {
            Value::Null => serializer.serialize_unit(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Integer(i) if *i == i64::MAX || *i == i64::MIN => serializer.serialize_str(&value.literal()),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Double(d) if !d.is_finite() => serializer.serialize_str(&value.literal()),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::IeeeDouble(d) if self.settings.hex_ieee_doubles || !d.is_finite() => {
                serializer.serialize_str(&format_hex_float(*d))
            }
            Value::IeeeDouble(d) => serializer.serialize_f64(*d),
            Value::Function(call) => serializer.collect_str(call),
        }
    }
}
