use crate::cli::commands::MaintenanceCommands;
use crate::clock::Clock;
use crate::db::connection;
use crate::engine::{HabitGenerator, RegenerationStatus};
use crate::error::CadenceError;
use crate::output;

pub fn run(cmd: MaintenanceCommands, clock: &dyn Clock, json_output: bool) -> i32 {
    let result = match cmd {
        MaintenanceCommands::Regenerate => run_regenerate(clock, json_output),
    };
    super::finish(result, json_output)
}

/// Per-habit failures are part of the report, not an error. The exit code is 1 when
/// any user's pass failed so schedulers notice.
fn run_regenerate(clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let summaries = HabitGenerator::new(&conn, clock).monthly_regeneration()?;

    if json_output {
        output::json::print(&output::json::success(output::json::regeneration_json(&summaries)));
    } else {
        output::text::print_regeneration(&summaries);
    }

    let failed = summaries.iter().any(|s| s.status == RegenerationStatus::Failed);
    Ok(if failed { 1 } else { 0 })
}
