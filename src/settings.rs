// config lets you read a separate settings file
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Settings are handed explicitly to whatever needs them; nothing reads them
/// from a global.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Filter directives for the log subscriber, overridden by `RUST_LOG`.
    pub log_filter: String,
    /// Spaces per indentation level when writing documents, 0 for compact output.
    pub indent: usize,
    /// Write IEEEDOUBLE items as hexadecimal floating point literals.
    pub hex_ieee_doubles: bool,
    /// SQLite database file for the dataframe, in memory when absent.
    #[serde(default)]
    pub database: Option<String>,
}

impl Settings {
    /// Defaults, then the given file (format by extension), then `OPTAB_*`
    /// environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("log_filter", "info")?
            .set_default("indent", 2i64)?
            .set_default("hex_ieee_doubles", true)?;
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix("OPTAB").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self { log_filter: String::from("info"), indent: 2, hex_ieee_doubles: true, database: None }
    }
}
