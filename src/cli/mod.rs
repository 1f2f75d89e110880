pub mod commands;
pub mod init;
pub mod habit;
pub mod task;
pub mod project;
pub mod maintenance;

pub use commands::*;

use crate::error::CadenceError;
use crate::models::Priority;
use crate::output;

/// Turn a command result into an exit code, reporting the error on the way.
fn finish(result: Result<i32, CadenceError>, json_output: bool) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            if json_output {
                output::json::print(&output::json::error(&e));
            } else {
                eprintln!("Error: {}", e.message);
            }
            1
        }
    }
}

fn parse_priority(raw: &str) -> Result<Priority, CadenceError> {
    Priority::from_str(raw)
        .ok_or_else(|| CadenceError::validation(format!("Unknown priority '{raw}' (low, normal, high)")))
}
