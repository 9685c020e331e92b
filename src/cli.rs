//! CLI interface for diveops.
//!
//! Each subcommand is non-interactive: arguments in, plain text out. IDs are
//! printed in short form and accepted as a full UUID or an unambiguous
//! prefix.
//!
//! - `diveops operation ...`: operations, their paperwork and team.
//! - `diveops dive ...`: planning, lifecycle, telemetry and logs.
//! - `diveops rule ...`: safety rule administration.
//! - `diveops alert ...`: reviewing and acknowledging alerts.
//! - `diveops monitor ...`: periodic bottom-time checks.

mod alert;
mod dive;
mod format;
mod monitor;
mod operation;
mod rule;

use clap::{Parser, Subcommand};
use jiff::tz::TimeZone;
use uuid::Uuid;

use crate::{config::Config, storage::Storage};

use alert::AlertCommand;
use dive::DiveCommand;
use monitor::MonitorCommand;
use operation::OperationCommand;
use rule::RuleCommand;

/// diveops: compliance gate and dive safety monitoring.
#[derive(Debug, Parser)]
#[command(name = "diveops", version, after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Log debug output to stderr (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r#"Workflow: from paperwork to a monitored dive
  1. diveops operation new "Pier 4 inspection"        → prints an operation ID (e.g. 5f2c01ab)
  2. diveops operation submit 5f2 work-permit
     diveops operation submit 5f2 safety-annex
  3. diveops operation sign 5f2 work-permit --as sup-anna
     diveops operation sign 5f2 safety-annex --as sup-anna
  4. diveops operation assign-team 5f2 <team-uuid>
  5. diveops dive plan --operation 5f2 --code P4-D01 --site "Pier 4" --max-depth 18 --bottom-time 40
  6. diveops dive start 9c1
     diveops dive sample 9c1 12.5
     diveops dive complete 9c1
     diveops dive log 9c1 --notes "Piles 3-7 inspected"

Safety rules:
  diveops rule add depth-limit --priority critical
  diveops rule add ascent-rate --priority high --max-rate 9
  diveops rule add bottom-time --priority medium
  diveops monitor watch"#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage operations: paperwork, team, workflow and compliance.
    Operation {
        #[command(subcommand)]
        command: OperationCommand,
    },

    /// Plan and run dives, record depth telemetry and logs.
    Dive {
        #[command(subcommand)]
        command: DiveCommand,
    },

    /// Administer safety alert rules.
    Rule {
        #[command(subcommand)]
        command: RuleCommand,
    },

    /// Review and acknowledge safety alerts.
    Alert {
        #[command(subcommand)]
        command: AlertCommand,
    },

    /// Run time-based safety checks over active dives.
    Monitor {
        #[command(subcommand)]
        command: MonitorCommand,
    },
}

/// What every command gets to work with.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub storage: Storage,
    pub tz: TimeZone,
}

/// Run the parsed command, returning an error message on failure.
pub fn run(cli: Cli, ctx: &Context) -> Result<(), String> {
    match cli.command {
        Command::Operation { command } => operation::run(command, ctx),
        Command::Dive { command } => dive::run(command, ctx),
        Command::Rule { command } => rule::run(command, &ctx.storage),
        Command::Alert { command } => alert::run(command, ctx),
        Command::Monitor { command } => monitor::run(command, ctx),
    }
}

/// Resolve a reference (full UUID or unambiguous prefix) against `candidates`.
fn resolve_id(
    reference: &str,
    candidates: impl IntoIterator<Item = Uuid>,
    noun: &str,
) -> Result<Uuid, String> {
    if let Ok(id) = reference.parse::<Uuid>() {
        return Ok(id);
    }

    let matches: Vec<Uuid> = candidates
        .into_iter()
        .filter(|id| id.to_string().starts_with(reference))
        .collect();

    match matches.as_slice() {
        [] => Err(format!("no {noun} matching '{reference}'")),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|id| format::short_id(*id)).collect();
            Err(format!(
                "'{reference}' is ambiguous, matches {} {noun}s: {}",
                matches.len(),
                ids.join(", ")
            ))
        }
    }
}

fn resolve_operation(storage: &Storage, reference: &str) -> Result<Uuid, String> {
    let operations = storage
        .list_operations()
        .map_err(|e| format!("failed to list operations: {e}"))?;
    resolve_id(reference, operations.iter().map(|o| o.id), "operation")
}

fn resolve_dive(storage: &Storage, reference: &str) -> Result<Uuid, String> {
    let dives = storage
        .list_dives(None)
        .map_err(|e| format!("failed to list dives: {e}"))?;
    resolve_id(reference, dives.iter().map(|d| d.id), "dive")
}
