use std::time::Instant;

use tracing::{debug, info};

use crate::dataframe::Dataframe;
use crate::error::{OptabError, Result};
use crate::model::File;
use crate::resolve::Resolver;

/// Computes the instances of query tables, each strictly after the tables
/// it reads from.
pub struct Materializer<'d> {
    dataframe: &'d dyn Dataframe,
}

impl<'d> Materializer<'d> {
    pub fn new(dataframe: &'d dyn Dataframe) -> Self {
        Self { dataframe }
    }

    /// Loads every table into the dataframe in resolution order, executing
    /// the query of each query table first and keeping its rows as the
    /// table's instance. Returns the resolution order.
    pub fn run(&self, file: &mut File) -> Result<Vec<String>> {
        let started = Instant::now();
        let order: Vec<String> = {
            let mut resolver = Resolver::for_file(file)?;
            resolver.resolve_dependencies()?.iter().map(|name| name.to_string()).collect()
        };
        let mut executed = 0;
        for name in &order {
            let table = file
                .table(name)
                .ok_or_else(|| OptabError::State(format!("Table '{}' vanished during materialization", name)))?;
            if let Some(instance) = table.instance() {
                self.dataframe.load(name, table.schema(), instance.rows())?;
                continue;
            }
            let Some(query) = table.query() else {
                continue;
            };
            let rows = self.dataframe.execute(query, table.schema())?;
            self.dataframe.load(name, table.schema(), &rows)?;
            debug!(table = %name, rows = rows.len(), "executed query");
            if let Some(table) = file.table_mut(name) {
                table.set_instance(rows)?;
            }
            executed += 1;
        }
        info!(
            tables = order.len(),
            queries = executed,
            ms = started.elapsed().as_millis() as u64,
            "materialized"
        );
        Ok(order)
    }
}
