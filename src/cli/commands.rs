use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand, ValueEnum};

const VERSION: &str = env!("CADENCE_VERSION");

#[derive(Parser)]
#[command(
    name = "cadence",
    version = VERSION,
    about = "Recurring habits and step-by-step projects",
    after_help = "\
NOTE:
  Data lives in $CADENCE_HOME (default: <data dir>/cadence).
  Run `cadence init` before any other command.

EXIT CODES:
  0  Success
  1  Error (DB, validation, invalid transition, etc.)

BEHAVIOR NOTES:
  A habit has at most one open instance. Completing it schedules the next one.
  A project has one frontier step with an open task. Completing it advances the frontier.
  Deleting a project task re-creates it unless the project is on hold.
  Dates are civil dates in the local calendar. --today pins the clock."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Treat this date as today (YYYY-MM-DD)
    #[arg(long, global = true, env = "CADENCE_TODAY")]
    pub today: Option<NaiveDate>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the data home and config
    Init {
        /// Owner recorded on everything created from now on
        #[arg(long)]
        user: Option<String>,
    },

    /// Recurring habits
    #[command(subcommand)]
    Habit(HabitCommands),

    /// Task instances
    #[command(subcommand)]
    Task(TaskCommands),

    /// Step-by-step projects
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Scheduled upkeep
    #[command(subcommand)]
    Maintenance(MaintenanceCommands),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Subcommand)]
pub enum HabitCommands {
    /// Create a habit and its first instance
    #[command(after_help = "\
EXAMPLES:
  cadence habit add \"Stretch\" --every daily
  cadence habit add \"Gym\" --every weekly --days mon,wed,fri
  cadence habit add \"Rent\" --every monthly --days 1
  cadence habit add \"Water plants\" --every daily --interval 3

NOTE:
  Monthly days clamp to the month's length (31 in February is its last day).
  Negative monthly days count back from the end (-1 is the last day).
  --interval spaces daily instances; for weekly and monthly habits it sets the
  streak stride (every listed day still gets an instance).")]
    Add {
        /// Habit title
        title: String,
        #[arg(long, value_enum)]
        every: Frequency,
        #[arg(long, default_value_t = 1)]
        interval: u32,
        /// Weekdays (mon,tue,...) for weekly, month days (1,15,-1) for monthly
        #[arg(long)]
        days: Option<String>,
        /// First date the habit can fire on (default: today)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Reminder time (HH:MM)
        #[arg(long, value_parser = parse_time)]
        time: Option<NaiveTime>,
        #[arg(long, default_value = "normal")]
        priority: String,
        #[arg(long)]
        description: Option<String>,
        /// Checklist template copied onto every instance
        #[arg(long)]
        checklist: Option<String>,
    },
    /// List habits
    List,
    /// Show a habit with its open instance
    Show {
        /// Habit ID or prefix
        reference: String,
    },
    /// Pause a habit (deletes its open instance)
    Pause {
        reference: String,
    },
    /// Resume a paused habit (creates the next instance)
    Resume {
        reference: String,
    },
    /// Replace the open instance with one starting from today
    Regenerate {
        reference: String,
    },
    /// Delete a habit and all of its instances
    Delete {
        reference: String,
    },
    /// Completion rate and streak
    Stats {
        reference: String,
        /// Trailing window in days (default from config)
        #[arg(long)]
        window: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a one-off task
    Add {
        /// Task title
        title: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "normal")]
        priority: String,
    },
    /// List tasks
    List {
        /// Only tasks assigned to this date
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show task details
    Show {
        /// Task ID or prefix
        id: String,
    },
    /// Start a task (on_deck|habit → active)
    Start {
        id: String,
    },
    /// Complete a task
    Done {
        id: String,
    },
    /// Reopen a completed task
    Undo {
        id: String,
    },
    /// Delete a task
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Load a project from stdin JSON
    #[command(after_help = "\
STDIN FORMAT:
  {\"name\":\"slug\", \"title\":\"...\", \"steps\":[{\"title\":\"...\", \"priority\":\"high\", \"due_date\":\"2024-05-01\"}]}

NOTE:
  Atomic: all-or-nothing. Project name must be unique.
  Steps are ordered as given. The first step gets a task right away.")]
    Load,
    /// List projects
    List,
    /// Show a project with its steps
    Show {
        /// Project name or ID
        reference: String,
    },
    /// Reconcile steps with their tasks and refill the frontier
    Sync {
        reference: String,
    },
    /// Put a project on hold
    Hold {
        reference: String,
    },
    /// Resume a project on hold
    Resume {
        reference: String,
    },
}

#[derive(Subcommand)]
pub enum MaintenanceCommands {
    /// Give every active habit exactly one open instance, from today
    Regenerate,
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| format!("invalid time '{s}', expected HH:MM"))
}
