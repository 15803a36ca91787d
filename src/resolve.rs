//! Table dependency resolution.
//!
//! A query table depends on every table named in its FROM, JOIN and
//! CROSS JOIN clauses. The resolver builds that graph over the flattened
//! table map of a file and sorts it topologically, so that tables can be
//! materialized strictly after everything they read from.

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{OptabError, Result};
use crate::model::{File, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Unresolved,
    DependenciesFound,
    Resolved,
    /// Terminal; the graph holds a cycle.
    CycleError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug)]
pub struct Resolver<'t> {
    tables: IndexMap<&'t str, &'t Table>,
    edges: IndexMap<&'t str, Vec<&'t str>>,
    state: ResolverState,
    order: Vec<&'t str>,
}

impl<'t> Resolver<'t> {
    pub fn new(tables: IndexMap<&'t str, &'t Table>) -> Self {
        Self { tables, edges: IndexMap::new(), state: ResolverState::Unresolved, order: Vec::new() }
    }
    pub fn for_file(file: &'t File) -> Result<Self> {
        Ok(Self::new(file.tables()?))
    }
    pub fn state(&self) -> ResolverState {
        self.state
    }
    /// The tables `name` reads from, once dependencies have been found.
    pub fn dependencies_of(&self, name: &str) -> Option<&[&'t str]> {
        self.edges.get(name).map(Vec::as_slice)
    }

    /// Extracts the edges of the graph. Only the first call does any work.
    pub fn find_dependencies(&mut self) -> Result<()> {
        match self.state {
            ResolverState::Unresolved => (),
            ResolverState::CycleError => return Err(cycle_state()),
            ResolverState::DependenciesFound | ResolverState::Resolved => return Ok(()),
        }
        let mut edges = IndexMap::with_capacity(self.tables.len());
        for (&name, table) in &self.tables {
            let mut targets = Vec::new();
            if let Some(query) = table.query() {
                for dependency in query.dependencies() {
                    let Some((&target, _)) = self.tables.get_key_value(dependency) else {
                        return Err(OptabError::Dependency(format!(
                            "Table '{}' reads from unknown table '{}'",
                            name, dependency
                        )));
                    };
                    targets.push(target);
                }
            }
            edges.insert(name, targets);
        }
        debug!(tables = edges.len(), edges = edges.values().map(Vec::len).sum::<usize>(), "found dependencies");
        self.edges = edges;
        self.state = ResolverState::DependenciesFound;
        Ok(())
    }

    /// Computes the build order: literal tables first in declaration order,
    /// then query tables depth first, each after all of its dependencies.
    pub fn resolve_dependencies(&mut self) -> Result<&[&'t str]> {
        match self.state {
            ResolverState::Unresolved => self.find_dependencies()?,
            ResolverState::DependenciesFound => (),
            ResolverState::Resolved => return Ok(&self.order),
            ResolverState::CycleError => return Err(cycle_state()),
        }
        let mut marks: IndexMap<&str, Mark> = self.tables.keys().map(|&name| (name, Mark::Unvisited)).collect();
        let mut order = Vec::with_capacity(self.tables.len());
        for (&name, table) in &self.tables {
            if !table.is_query() {
                marks[name] = Mark::Done;
                order.push(name);
            }
        }
        // explicit stack of (table, index of the next dependency to visit)
        let mut stack: Vec<(&'t str, usize)> = Vec::new();
        for &root in self.tables.keys() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::InProgress;
            stack.push((root, 0));
            while let Some(top) = stack.last_mut() {
                let (name, next) = *top;
                let dependencies = &self.edges[name];
                if next == dependencies.len() {
                    marks[name] = Mark::Done;
                    order.push(name);
                    stack.pop();
                    continue;
                }
                top.1 += 1;
                let dependency = dependencies[next];
                match marks[dependency] {
                    Mark::Done => (),
                    Mark::Unvisited => {
                        marks[dependency] = Mark::InProgress;
                        stack.push((dependency, 0));
                    }
                    Mark::InProgress => {
                        let start = stack.iter().position(|(n, _)| *n == dependency).unwrap_or(0);
                        let tables: Vec<String> = stack[start..].iter().map(|(n, _)| n.to_string()).collect();
                        self.state = ResolverState::CycleError;
                        return Err(OptabError::Cycle { tables });
                    }
                }
            }
        }
        info!(order = ?order, "resolved table dependencies");
        self.order = order;
        self.state = ResolverState::Resolved;
        Ok(&self.order)
    }

    pub fn resolution_order(&self) -> Result<&[&'t str]> {
        match self.state {
            ResolverState::Resolved => Ok(&self.order),
            state => Err(OptabError::State(format!(
                "The resolution order is not available while the resolver is {:?}",
                state
            ))),
        }
    }
}

fn cycle_state() -> OptabError {
    OptabError::State(String::from("Dependency resolution has already failed on a cycle"))
}
