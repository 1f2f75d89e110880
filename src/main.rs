use clap::Parser;
use std::process;

use cadence::cli;
use cadence::cli::commands::{Cli, Commands};
use cadence::clock::{Clock, FixedClock, SystemClock};
use cadence::logging;

fn main() {
    logging::init();
    let cli_args = Cli::parse();
    let json_output = cli_args.json;

    let clock: Box<dyn Clock> = match cli_args.today {
        Some(date) => Box::new(FixedClock::on(date)),
        None => Box::new(SystemClock),
    };
    let clock: &dyn Clock = &*clock;

    let exit_code = match cli_args.command {
        Commands::Init { user } => cli::init::run(user.as_deref(), json_output),
        Commands::Habit(cmd) => cli::habit::run(cmd, clock, json_output),
        Commands::Task(cmd) => cli::task::run(cmd, clock, json_output),
        Commands::Project(cmd) => cli::project::run(cmd, clock, json_output),
        Commands::Maintenance(cmd) => cli::maintenance::run(cmd, clock, json_output),
    };

    process::exit(exit_code);
}
