use tracing::info;

use crate::construct::Record;
use crate::datatype::Value;
use crate::error::Result;
use crate::function::FunctionCall;
use crate::model::{File, Table};

/// Supplies the values a solver computed for function calls.
pub trait ResultCapture {
    /// The value of `call`, found in `record` of `table`, or `None` when the
    /// solver has nothing for it.
    fn value_for(&self, table: &Table, record: &Record<'_>, call: &FunctionCall) -> Result<Option<Value>>;
}

impl<F> ResultCapture for F
where
    F: Fn(&Table, &Record<'_>, &FunctionCall) -> Result<Option<Value>>,
{
    fn value_for(&self, table: &Table, record: &Record<'_>, call: &FunctionCall) -> Result<Option<Value>> {
        self(table, record, call)
    }
}

/// Sets every function call in every instance of `file` that has no value
/// yet and for which `hook` has one. Returns how many were set.
pub fn capture_results(file: &File, hook: &dyn ResultCapture) -> Result<usize> {
    let mut captured = 0;
    for table in file.modules().iter().flat_map(|module| module.tables()) {
        let Some(instance) = table.instance() else {
            continue;
        };
        for (row, record) in instance.rows().iter().zip(instance.records(table.schema())) {
            let record = record?;
            for call in row.iter().filter_map(Value::as_function) {
                if call.has_value() {
                    continue;
                }
                if let Some(value) = hook.value_for(table, &record, call)? {
                    call.set_value(value)?;
                    captured += 1;
                }
            }
        }
    }
    info!(captured, "captured results");
    Ok(captured)
}
