//! Optab – tabular optimization-model documents.
//!
//! An optimization problem (variables, constraints, objective and their data)
//! is described as a declarative document of named tables, grouped into
//! modules. Optab turns such a document into a typed object model, works out
//! the order in which tables have to be built, computes the tables that are
//! defined by queries, and hands schema-typed record streams to solver
//! adapters. Whatever a solver computes flows back into the document through
//! function calls, after which the document can be written out again.
//!
//! ## Documents
//! ```text
//! {"SYNTAX": "optab", "MODULES": [{"NAME": "data", "TABLES": [
//!     {"NAME": "cities",
//!      "SCHEMA": {"FIELDS": ["city", "supply"], "TYPES": ["STRING", "DOUBLE"]},
//!      "INSTANCE": [["Oslo", 10], ["Lund", "Infinity"]]},
//!     {"NAME": "balance",
//!      "QUERY": {"SELECT": ["city AS Row -- STRING", "(supply * 2) AS RHS -- DOUBLE"],
//!                "FROM": "cities"}}]}]}
//! ```
//! Recognized type tags are `STRING`, `INTEGER`, `DOUBLE`, `IEEEDOUBLE` and
//! `<TYPE>_FUNCTION` for each of them. Numeric items may be spelled
//! `Infinity`/`-Infinity`, and IEEE doubles may be written as hexadecimal
//! floating point literals (`0x1.8p1`).
//!
//! ## Modules
//! * [`construct`] – Containers, schemas and records, with their builders.
//! * [`datatype`] – Type tags, values and the coercion of item text into values.
//! * [`function`] – Function calls: solver-computed scalars referenced from a table.
//! * [`tree`] – Handler-driven reading and writing of document trees on serde_json.
//! * [`model`] and [`document`] – Files, modules, tables and instances, and how
//!   they are read from and written to documents.
//! * [`query`] and [`resolve`] – Query tables and the dependency resolver that
//!   orders them.
//! * [`dataframe`] and [`materialize`] – SQLite storage and the computation of
//!   query table instances.
//! * [`span`] – Record streams and operators for solver adapters.
//! * [`capture`] – Bringing solver results back into function calls.
//! * [`settings`] and [`logging`] – Configuration and log output.
//!
//! ## Quick Start
//! ```
//! use optab::{dataframe::SqliteDataframe, document, materialize::Materializer};
//! let text = r#"{"MODULES": [{"NAME": "data", "TABLES": [
//!     {"NAME": "cities",
//!      "SCHEMA": {"FIELDS": ["city", "supply"], "TYPES": ["STRING", "DOUBLE"]},
//!      "INSTANCE": [["Oslo", 10], ["Lund", 4.5]]},
//!     {"NAME": "doubled",
//!      "QUERY": {"SELECT": ["city -- STRING", "(supply * 2) AS twice -- DOUBLE"], "FROM": "cities"}}]}]}"#;
//! let mut file = document::read(text).unwrap();
//! let dataframe = SqliteDataframe::in_memory().unwrap();
//! let order = Materializer::new(&dataframe).run(&mut file).unwrap();
//! assert_eq!(order, vec!["cities", "doubled"]);
//! assert_eq!(file.table("doubled").unwrap().instance().unwrap().len(), 2);
//! ```

pub mod capture;
pub mod construct;
pub mod dataframe;
pub mod datatype;
pub mod document;
pub mod error;
pub mod function;
pub mod logging;
pub mod materialize;
pub mod model;
pub mod query;
pub mod resolve;
pub mod settings;
pub mod span;
pub mod tree;

pub use error::{OptabError, Result};
