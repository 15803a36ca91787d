//! Queries: declarative projections and joins over other tables.
//!
//! A query is never interpreted here. Each selected expression carries its
//! declared type (`(supply-demand) AS RHS -- DOUBLE`), so the result schema
//! is known before anything executes, and the query can name the tables it
//! reads from so the resolver can order table construction.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use lazy_static::lazy_static;
use regex::Regex;

use crate::construct::Schema;
use crate::datatype::DataType;
use crate::error::{OptabError, Result};
use crate::tree::Node;

lazy_static! {
    static ref ALIAS: Regex = Regex::new(r"(?i)^(.*\S)\s+AS\s+([A-Za-z_][A-Za-z0-9_]*)$").unwrap();
    static ref COLUMN: Regex = Regex::new(r"^(?:[A-Za-z_][A-Za-z0-9_]*\.)?([A-Za-z_][A-Za-z0-9_]*)$").unwrap();
}

pub const SELECT: &str = "SELECT";
pub const FROM: &str = "FROM";
pub const JOIN: &str = "JOIN";
pub const ON: &str = "ON";
pub const CROSS_JOIN: &str = "CROSS JOIN";
pub const WHERE: &str = "WHERE";

// ------------- Select items -------------
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    expression: String,
    field: String,
    data_type: DataType,
}

impl SelectItem {
    /// Parses `expression [AS alias] -- TYPE`. Without an alias the
    /// expression must be a (possibly table-qualified) column name.
    pub fn parse(text: &str) -> Result<Self> {
        let (expression, tag) = text
            .rsplit_once("--")
            .ok_or_else(|| OptabError::Schema(format!("Select item '{}' declares no type", text)))?;
        Self::new(expression.trim(), DataType::from_tag(tag.trim())?)
    }

    pub fn new(expression: impl Into<String>, data_type: DataType) -> Result<Self> {
        let expression = expression.into();
        let field = if let Some(captures) = ALIAS.captures(&expression) {
            captures[2].to_owned()
        } else if let Some(captures) = COLUMN.captures(&expression) {
            captures[1].to_owned()
        } else {
            return Err(OptabError::Schema(format!("Select item '{}' needs an alias", expression)));
        };
        Ok(Self { expression, field, data_type })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
    pub fn field(&self) -> &str {
        &self.field
    }
    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -- {}", self.expression, self.data_type.tag())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    table: String,
    on: String,
}

impl Join {
    pub fn table(&self) -> &str {
        &self.table
    }
    pub fn on(&self) -> &str {
        &self.on
    }
}

// ------------- Query -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    select: Vec<SelectItem>,
    from: Option<String>,
    joins: Vec<Join>,
    cross_joins: Vec<String>,
    filter: Option<String>,
}

impl Query {
    pub fn new(select: Vec<SelectItem>) -> Self {
        Self { select, from: None, joins: Vec::new(), cross_joins: Vec::new(), filter: None }
    }
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.from = Some(table.into());
        self
    }
    pub fn join(mut self, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.joins.push(Join { table: table.into(), on: on.into() });
        self
    }
    pub fn cross_join(mut self, table: impl Into<String>) -> Self {
        self.cross_joins.push(table.into());
        self
    }
    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.filter = Some(predicate.into());
        self
    }

    pub fn select_items(&self) -> &[SelectItem] {
        &self.select
    }
    pub fn source(&self) -> Option<&str> {
        self.from.as_deref()
    }
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }
    pub fn cross_joins(&self) -> &[String] {
        &self.cross_joins
    }
    pub fn predicate(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Reads `{SELECT, FROM, JOIN?, ON?, "CROSS JOIN"?, WHERE?}`.
    pub fn from_node(node: &Node) -> Result<Self> {
        let members = node
            .as_object()
            .ok_or_else(|| OptabError::Schema(format!("QUERY must be an object, not {}", node.kind())))?;
        if let Some(unknown) = members
            .keys()
            .find(|key| ![SELECT, FROM, JOIN, ON, CROSS_JOIN, WHERE].contains(&key.as_str()))
        {
            return Err(OptabError::Schema(format!("Unknown query clause '{}'", unknown)));
        }
        let select = members
            .get(SELECT)
            .and_then(Node::string_list)
            .ok_or_else(|| OptabError::Schema(String::from("QUERY needs a SELECT list of strings")))?;
        if select.is_empty() {
            return Err(OptabError::Schema(String::from("QUERY selects nothing")));
        }
        let mut query = Query::new(select.iter().map(|item| SelectItem::parse(item)).collect::<Result<_>>()?);
        query.from = optional_string(members, FROM)?;
        let joins = optional_list(members, JOIN)?;
        let ons = optional_list(members, ON)?;
        if joins.len() != ons.len() {
            return Err(OptabError::Schema(format!(
                "{} JOIN tables but {} ON predicates",
                joins.len(),
                ons.len()
            )));
        }
        query.joins = joins.into_iter().zip(ons).map(|(table, on)| Join { table, on }).collect();
        query.cross_joins = optional_list(members, CROSS_JOIN)?;
        query.filter = optional_string(members, WHERE)?;
        if query.from.is_none() && (!query.joins.is_empty() || !query.cross_joins.is_empty()) {
            return Err(OptabError::Schema(String::from("QUERY joins without a FROM table")));
        }
        Ok(query)
    }

    pub fn to_node(&self) -> Node {
        let mut members = IndexMap::new();
        members.insert(SELECT.to_owned(), Node::strings(self.select.iter().map(|item| item.to_string())));
        if let Some(from) = &self.from {
            members.insert(FROM.to_owned(), Node::string(from));
        }
        if !self.joins.is_empty() {
            members.insert(JOIN.to_owned(), list_node(self.joins.iter().map(|join| join.table.clone()).collect()));
            members.insert(ON.to_owned(), list_node(self.joins.iter().map(|join| join.on.clone()).collect()));
        }
        if !self.cross_joins.is_empty() {
            members.insert(CROSS_JOIN.to_owned(), list_node(self.cross_joins.clone()));
        }
        if let Some(filter) = &self.filter {
            members.insert(WHERE.to_owned(), Node::string(filter));
        }
        Node::Object(members)
    }

    /// Names of the tables read by FROM and the joins, in order of appearance.
    pub fn dependencies(&self) -> IndexSet<&str> {
        self.from
            .iter()
            .map(String::as_str)
            .chain(self.joins.iter().map(|join| join.table.as_str()))
            .chain(self.cross_joins.iter().map(String::as_str))
            .collect()
    }

    /// The schema of the rows this query produces.
    pub fn result_schema(&self) -> Result<Schema> {
        let fields: Vec<&str> = self.select.iter().map(SelectItem::field).collect();
        let tags: Vec<&str> = self.select.iter().map(|item| item.data_type.tag()).collect();
        Schema::from_tags(&fields, &tags)
    }

    /// Renders the query as SQL: select list, FROM, JOIN/ON pairs in order,
    /// CROSS JOINs, then WHERE.
    pub fn to_query_language(&self) -> String {
        let expressions: Vec<&str> = self.select.iter().map(SelectItem::expression).collect();
        let mut sql = format!("SELECT {}", expressions.join(", "));
        if let Some(from) = &self.from {
            sql += &format!(" FROM {}", from);
        }
        for join in &self.joins {
            sql += &format!(" JOIN {} ON {}", join.table, join.on);
        }
        for table in &self.cross_joins {
            sql += &format!(" CROSS JOIN {}", table);
        }
        if let Some(filter) = &self.filter {
            sql += &format!(" WHERE {}", filter);
        }
        sql
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_query_language())
    }
}

fn optional_string(members: &IndexMap<String, Node>, clause: &str) -> Result<Option<String>> {
    match members.get(clause) {
        None => Ok(None),
        Some(node) => node
            .as_str()
            .map(|s| Some(s.to_owned()))
            .ok_or_else(|| OptabError::Schema(format!("{} must be a string, not {}", clause, node.kind()))),
    }
}

fn optional_list(members: &IndexMap<String, Node>, clause: &str) -> Result<Vec<String>> {
    match members.get(clause) {
        None => Ok(Vec::new()),
        Some(node) => node
            .string_list()
            .ok_or_else(|| OptabError::Schema(format!("{} must be a string or strings, not {}", clause, node.kind()))),
    }
}

// a lone item is written as a plain string
fn list_node(mut items: Vec<String>) -> Node {
    match items.len() {
        1 => Node::string(items.remove(0)),
        _ => Node::strings(items),
    }
}
