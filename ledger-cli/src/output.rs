//! Output formatting utilities

use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use serde::Serialize;

use ledger_core::{LedgerResult, OperationResult};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print an engine result either as an `OperationResult` JSON envelope or
/// through `render`, turning failures into a non-zero exit
pub fn emit<T, F>(json: bool, result: LedgerResult<T>, render: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T),
{
    if json {
        let envelope = match &result {
            Ok(data) => OperationResult::ok(data),
            Err(e) => OperationResult::fail(e),
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }

    match result {
        Ok(data) => {
            if !json {
                render(&data);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
