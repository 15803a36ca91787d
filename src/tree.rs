//! Generic document trees and the reader/writer that traverse them.
//!
//! Both traversals run on serde_json and consult a keyword→handler table
//! before doing their default work at every object field and every array
//! element. A reader handler that claims a site takes over the parse of that
//! subtree (building a domain object into the reader's context on the way);
//! otherwise the default recursion runs. A handler is asked before anything of
//! the value has been read, so declining never loses input. Writer handlers do
//! the same for output, which is how a large instance is streamed row by row
//! instead of being turned into a tree first.
//!
//! Nesting is bounded by serde_json's recursion limit; deeper input is a
//! syntax error like any other.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::marker::PhantomData;

use indexmap::IndexMap;
use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Number;
use serde_json::error::Category;
use serde_json::ser::PrettyFormatter;
use tracing::trace;

use crate::error::{OptabError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Number(Number),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Object(IndexMap<String, Node>),
    Array(Vec<Node>),
    Value(Scalar),
    Null,
}

impl Node {
    pub fn string(s: impl Into<String>) -> Node {
        Node::Value(Scalar::String(s.into()))
    }
    pub fn strings<I, S>(items: I) -> Node
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Node::Array(items.into_iter().map(Node::string).collect())
    }
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Object(members) => members.get(key),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Value(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }
    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(elements) => Some(elements),
            _ => None,
        }
    }
    /// A single string or an array of strings.
    pub fn string_list(&self) -> Option<Vec<String>> {
        match self {
            Node::Value(Scalar::String(s)) => Some(vec![s.clone()]),
            Node::Array(elements) => elements.iter().map(|e| e.as_str().map(str::to_owned)).collect(),
            _ => None,
        }
    }
    pub fn as_object(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Object(members) => Some(members),
            _ => None,
        }
    }
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Object(_) => "object",
            Node::Array(_) => "array",
            Node::Value(Scalar::String(_)) => "string",
            Node::Value(Scalar::Number(_)) => "number",
            Node::Value(Scalar::Boolean(_)) => "boolean",
            Node::Null => "null",
        }
    }
}

// ------------- Duplicate names -------------
/// Detects a name given twice within one object or array level.
#[derive(Debug)]
pub struct NameGuard {
    level: String,
    seen: HashSet<String>,
}

impl NameGuard {
    pub fn new(level: impl Into<String>) -> Self {
        Self { level: level.into(), seen: HashSet::new() }
    }
    pub fn admit(&mut self, name: &str) -> Result<()> {
        if self.seen.insert(name.to_owned()) {
            Ok(())
        } else {
            Err(OptabError::Schema(format!("Duplicate name '{}' in {}", name, self.level)))
        }
    }
}

// ------------- Handler sites -------------
/// Where a handler is being consulted: at the value of a named field, or at
/// an element of an array held (directly or nested) by a named field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site<'k> {
    Field(&'k str),
    Element(&'k str, usize),
}

impl<'k> Site<'k> {
    pub fn keyword(&self) -> &'k str {
        match self {
            Site::Field(keyword) | Site::Element(keyword, _) => keyword,
        }
    }
}

// ------------- Reader -------------
/// Takes over the parse of the values at the sites it claims.
pub trait ReadHandler<C>: Sized {
    fn claims(&self, site: Site<'_>) -> bool;
    /// Reads exactly one value from `deserializer`. The returned node stands
    /// in for the value in the tree.
    fn read<'de, D>(
        &self,
        reader: &TreeReader<Self, C>,
        site: Site<'_>,
        deserializer: D,
        context: &mut C,
    ) -> std::result::Result<Node, D::Error>
    where
        D: Deserializer<'de>;
}

pub struct TreeReader<H, C> {
    handlers: HashMap<String, H>,
    // the domain error behind the serde error being unwound, if any
    failure: RefCell<Option<OptabError>>,
    context: PhantomData<fn(&mut C)>,
}

impl<H: ReadHandler<C>, C> TreeReader<H, C> {
    pub fn new() -> Self {
        Self { handlers: HashMap::new(), failure: RefCell::new(None), context: PhantomData }
    }

    pub fn with_handler(mut self, keyword: impl Into<String>, handler: H) -> Self {
        self.handlers.insert(keyword.into(), handler);
        self
    }

    /// Reads a whole document; anything after the root value is an error.
    pub fn read(&self, text: &str, context: &mut C) -> Result<Node> {
        self.failure.replace(None);
        let mut deserializer = serde_json::Deserializer::from_str(text);
        let root = NodeSeed { reader: self, keyword: None, context }
            .deserialize(&mut deserializer)
            .map_err(|e| self.positioned(text, e))?;
        deserializer.end().map_err(|e| self.positioned(text, e))?;
        Ok(root)
    }

    /// Default handling of the value `deserializer` is positioned at.
    pub fn read_value<'de, D>(&self, deserializer: D, context: &mut C) -> std::result::Result<Node, D::Error>
    where
        D: Deserializer<'de>,
    {
        NodeSeed { reader: self, keyword: None, context }.deserialize(deserializer)
    }

    /// Turns a domain error into one serde can unwind with. The reader reports
    /// the domain error itself, at the position serde_json gives it.
    pub fn fail<E: de::Error>(&self, error: OptabError) -> E {
        let message = error.to_string();
        self.failure.replace(Some(error));
        E::custom(message)
    }

    fn claimant(&self, site: Site<'_>) -> Option<&H> {
        let handler = self.handlers.get(site.keyword()).filter(|handler| handler.claims(site));
        trace!(keyword = site.keyword(), claimed = handler.is_some(), "consulted handler");
        handler
    }

    fn positioned(&self, text: &str, error: serde_json::Error) -> OptabError {
        let (line, col) = (error.line(), error.column());
        if let Some(failure) = self.failure.take() {
            return relocate(text, failure, line, col);
        }
        let reason = match error.classify() {
            Category::Eof => String::from("Premature end of input"),
            _ => {
                let message = error.to_string();
                match message.rfind(" at line ") {
                    Some(end) => message[..end].to_owned(),
                    None => message,
                }
            }
        };
        OptabError::syntax_at(text, line, col, reason)
    }
}

impl<H: ReadHandler<C>, C> Default for TreeReader<H, C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Places a domain error raised while reading the value that ends at
/// `line`:`col`. A syntax error positioned within a string value is moved to
/// the same place inside the document.
fn relocate(text: &str, error: OptabError, line: usize, col: usize) -> OptabError {
    match error {
        OptabError::Syntax { reason, line: Some(1), col: Some(inner), .. } => {
            let quote = text.split_inclusive('\n').take(line.saturating_sub(1)).map(str::len).sum::<usize>()
                + col.saturating_sub(1);
            match string_start(text, quote) {
                Some(start) => {
                    let offset = text[start..quote]
                        .char_indices()
                        .nth(inner.saturating_sub(1))
                        .map_or(quote, |(i, _)| start + i);
                    OptabError::syntax_at_offset(text, offset, reason)
                }
                None => OptabError::syntax_at(text, line, col, reason),
            }
        }
        OptabError::Syntax { reason, .. } => OptabError::syntax_at(text, line, col, reason),
        OptabError::Schema(message) if !message.contains(" (line ") => {
            OptabError::Schema(format!("{} (line {}, column {})", message, line, col))
        }
        other => other,
    }
}

/// Byte offset of the first character of the string literal whose closing
/// quote is at `quote`.
fn string_start(text: &str, quote: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(quote) != Some(&b'"') {
        return None;
    }
    (0..quote).rev().find_map(|i| {
        let escapes = bytes[..i].iter().rev().take_while(|b| **b == b'\\').count();
        (bytes[i] == b'"' && escapes % 2 == 0).then_some(i + 1)
    })
}

/// Default parse of one value. `keyword` is the name of the closest enclosing
/// field, consulted at every element of an array.
struct NodeSeed<'a, H, C> {
    reader: &'a TreeReader<H, C>,
    keyword: Option<&'a str>,
    context: &'a mut C,
}

impl<'de, H: ReadHandler<C>, C> DeserializeSeed<'de> for NodeSeed<'_, H, C> {
    type Value = Node;
    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Node, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de, H: ReadHandler<C>, C> Visitor<'de> for NodeSeed<'_, H, C> {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON value")
    }
    fn visit_bool<E: de::Error>(self, b: bool) -> std::result::Result<Node, E> {
        Ok(Node::Value(Scalar::Boolean(b)))
    }
    fn visit_i64<E: de::Error>(self, i: i64) -> std::result::Result<Node, E> {
        Ok(Node::Value(Scalar::Number(i.into())))
    }
    fn visit_u64<E: de::Error>(self, u: u64) -> std::result::Result<Node, E> {
        Ok(Node::Value(Scalar::Number(u.into())))
    }
    fn visit_f64<E: de::Error>(self, d: f64) -> std::result::Result<Node, E> {
        Number::from_f64(d)
            .map(|n| Node::Value(Scalar::Number(n)))
            .ok_or_else(|| E::custom(format!("{} is not a JSON number", d)))
    }
    fn visit_str<E: de::Error>(self, s: &str) -> std::result::Result<Node, E> {
        Ok(Node::string(s))
    }
    fn visit_string<E: de::Error>(self, s: String) -> std::result::Result<Node, E> {
        Ok(Node::string(s))
    }
    fn visit_unit<E: de::Error>(self) -> std::result::Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(mut self, mut seq: A) -> std::result::Result<Node, A::Error> {
        let reader = self.reader;
        let mut elements = Vec::new();
        loop {
            let site = self.keyword.map(|keyword| Site::Element(keyword, elements.len()));
            let claimed = site.and_then(|site| reader.claimant(site).map(|handler| (site, handler)));
            let next = match claimed {
                Some((site, handler)) => {
                    seq.next_element_seed(HandlerSeed { reader, handler, site, context: &mut *self.context })?
                }
                None => seq.next_element_seed(NodeSeed { reader, keyword: self.keyword, context: &mut *self.context })?,
            };
            match next {
                Some(node) => elements.push(node),
                None => break,
            }
        }
        Ok(Node::Array(elements))
    }

    fn visit_map<A: MapAccess<'de>>(mut self, mut map: A) -> std::result::Result<Node, A::Error> {
        let reader = self.reader;
        let mut members = IndexMap::new();
        let mut guard = NameGuard::new("object");
        while let Some(name) = map.next_key::<String>()? {
            guard.admit(&name).map_err(|e| reader.fail::<A::Error>(e))?;
            let site = Site::Field(&name);
            let node = match reader.claimant(site) {
                Some(handler) => map.next_value_seed(HandlerSeed { reader, handler, site, context: &mut *self.context })?,
                None => map.next_value_seed(NodeSeed { reader, keyword: Some(&name), context: &mut *self.context })?,
            };
            members.insert(name, node);
        }
        Ok(Node::Object(members))
    }
}

/// Hands the value at a claimed site to its handler.
struct HandlerSeed<'a, H, C> {
    reader: &'a TreeReader<H, C>,
    handler: &'a H,
    site: Site<'a>,
    context: &'a mut C,
}

impl<'de, H: ReadHandler<C>, C> DeserializeSeed<'de> for HandlerSeed<'_, H, C> {
    type Value = Node;
    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Node, D::Error> {
        self.handler.read(self.reader, self.site, deserializer, self.context)
    }
}

// ------------- Writer -------------
/// Takes over the output of the values at the sites it claims. A handler
/// receives the node owning the site (the enclosing object of a field, the
/// array of an element) and the node at the site.
pub trait WriteHandler<C>: Sized {
    fn claims(&self, site: Site<'_>, owner: &Node, context: &C) -> bool;
    /// Writes exactly one value through `serializer`.
    fn write<S>(
        &self,
        writer: &TreeWriter<Self, C>,
        site: Site<'_>,
        owner: &Node,
        node: &Node,
        serializer: S,
        context: &C,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer;
}

pub struct TreeWriter<H, C> {
    handlers: HashMap<String, H>,
    context: PhantomData<fn(&C)>,
}

impl<H: WriteHandler<C>, C> TreeWriter<H, C> {
    pub fn new() -> Self {
        Self { handlers: HashMap::new(), context: PhantomData }
    }

    pub fn with_handler(mut self, keyword: impl Into<String>, handler: H) -> Self {
        self.handlers.insert(keyword.into(), handler);
        self
    }

    /// Writes `root` indented by `indent` spaces per level, or on a single
    /// line when `indent` is zero.
    pub fn write(&self, root: &Node, out: &mut dyn Write, indent: usize, context: &C) -> Result<()> {
        let view = NodeView { writer: self, node: root, keyword: None, context };
        if indent == 0 {
            view.serialize(&mut serde_json::Serializer::new(&mut *out))?;
        } else {
            let indent = vec![b' '; indent];
            let formatter = PrettyFormatter::with_indent(&indent);
            view.serialize(&mut serde_json::Serializer::with_formatter(&mut *out, formatter))?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }

    fn claimant(&self, site: Site<'_>, owner: &Node, context: &C) -> Option<&H> {
        self.handlers.get(site.keyword()).filter(|handler| handler.claims(site, owner, context))
    }
}

impl<H: WriteHandler<C>, C> Default for TreeWriter<H, C> {
    fn default() -> Self {
        Self::new()
    }
}

struct NodeView<'a, H, C> {
    writer: &'a TreeWriter<H, C>,
    node: &'a Node,
    keyword: Option<&'a str>,
    context: &'a C,
}

impl<H: WriteHandler<C>, C> Serialize for NodeView<'_, H, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let (writer, owner, context) = (self.writer, self.node, self.context);
        match self.node {
            Node::Object(members) => {
                let mut map = serializer.serialize_map(Some(members.len()))?;
                for (name, node) in members {
                    let site = Site::Field(name);
                    match writer.claimant(site, owner, context) {
                        Some(handler) => {
                            map.serialize_entry(name, &HandlerView { writer, handler, site, owner, node, context })?
                        }
                        None => map.serialize_entry(name, &NodeView { writer, node, keyword: Some(name), context })?,
                    }
                }
                map.end()
            }
            Node::Array(elements) => {
                let mut seq = serializer.serialize_seq(Some(elements.len()))?;
                for (index, node) in elements.iter().enumerate() {
                    let site = self.keyword.map(|keyword| Site::Element(keyword, index));
                    match site.and_then(|site| writer.claimant(site, owner, context).map(|handler| (site, handler))) {
                        Some((site, handler)) => {
                            seq.serialize_element(&HandlerView { writer, handler, site, owner, node, context })?
                        }
                        None => seq.serialize_element(&NodeView { writer, node, keyword: self.keyword, context })?,
                    }
                }
                seq.end()
            }
            Node::Value(Scalar::String(s)) => serializer.serialize_str(s),
            Node::Value(Scalar::Number(n)) => n.serialize(serializer),
            Node::Value(Scalar::Boolean(b)) => serializer.serialize_bool(*b),
            Node::Null => serializer.serialize_unit(),
        }
    }
}

struct HandlerView<'a, H, C> {
    writer: &'a TreeWriter<H, C>,
    handler: &'a H,
    site: Site<'a>,
    owner: &'a Node,
    node: &'a Node,
    context: &'a C,
}

impl<H: WriteHandler<C>, C> Serialize for HandlerView<'_, H, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.handler.write(self.writer, self.site, self.owner, self.node, serializer, self.context)
    }
}
