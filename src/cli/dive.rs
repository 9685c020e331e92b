//! Dive commands: plan, list, lifecycle, telemetry and logs.

use clap::Subcommand;
use jiff::{
    Timestamp,
    civil::{Date, Time},
};

use crate::{
    model::DiveState,
    monitor::{DiveMonitor, IngestReport},
    planning::{self, DivePlan},
    sink::{AlertSink, LogSubscriber},
};

use super::{
    Context,
    format::{format_alert, format_dive, local_time, short_id},
    resolve_dive, resolve_operation,
};

#[derive(Debug, Subcommand)]
pub enum DiveCommand {
    /// Plan a dive. Prints the dive ID.
    ///
    /// With `--operation`, the operation must pass the compliance gate.
    /// Without it, the dive is independent and only needs a depth and site.
    Plan {
        /// Operation ID: full UUID or unambiguous prefix.
        #[arg(long)]
        operation: Option<String>,

        /// Dive code shown in alerts (e.g. `P4-D01`).
        #[arg(long)]
        code: String,

        #[arg(long)]
        site: String,

        /// Planned maximum depth in metres.
        #[arg(long)]
        max_depth: f64,

        /// Planned bottom time in minutes.
        #[arg(long)]
        bottom_time: Option<u32>,

        /// Local date of the dive. Defaults to today.
        #[arg(long)]
        date: Option<Date>,

        /// Scheduled local start time. Otherwise recorded when the dive starts.
        #[arg(long)]
        start: Option<Time>,

        /// Who receives the dive's safety alerts.
        #[arg(long)]
        supervisor: Option<String>,
    },

    /// List dives, optionally for one operation.
    List {
        /// Operation ID: full UUID or unambiguous prefix.
        #[arg(long)]
        operation: Option<String>,
    },

    /// Put a planned dive in the water.
    Start {
        /// Dive ID: full UUID or unambiguous prefix.
        dive: String,

        /// When the dive started. Defaults to now.
        #[arg(long)]
        at: Option<Timestamp>,
    },

    /// Mark an in-progress dive completed.
    Complete {
        /// Dive ID: full UUID or unambiguous prefix.
        dive: String,
    },

    /// Cancel a planned or in-progress dive.
    Cancel {
        /// Dive ID: full UUID or unambiguous prefix.
        dive: String,
    },

    /// Record a depth reading and run the safety checks.
    Sample {
        /// Dive ID: full UUID or unambiguous prefix.
        dive: String,

        /// Depth in metres.
        depth: f64,

        /// When the reading was taken. Defaults to now.
        #[arg(long)]
        at: Option<Timestamp>,
    },

    /// Print a dive's depth history.
    Samples {
        /// Dive ID: full UUID or unambiguous prefix.
        dive: String,
    },

    /// Record the log for a finished dive.
    Log {
        /// Dive ID: full UUID or unambiguous prefix.
        dive: String,

        #[arg(long)]
        notes: Option<String>,
    },
}

pub(super) fn run(command: DiveCommand, ctx: &Context) -> Result<(), String> {
    match command {
        DiveCommand::Plan {
            operation,
            code,
            site,
            max_depth,
            bottom_time,
            date,
            start,
            supervisor,
        } => {
            let operation_id = operation
                .map(|r| resolve_operation(&ctx.storage, &r))
                .transpose()?;
            let plan = DivePlan {
                operation_id,
                code,
                site,
                planned_max_depth_m: max_depth,
                planned_bottom_time_min: bottom_time,
                date: date.unwrap_or_else(|| Timestamp::now().to_zoned(ctx.tz.clone()).date()),
                start_time: start,
                supervisor,
            };
            cmd_plan(ctx, plan)
        }
        DiveCommand::List { operation } => cmd_list(ctx, operation.as_deref()),
        DiveCommand::Start { dive, at } => cmd_start(ctx, &dive, at.unwrap_or_else(Timestamp::now)),
        DiveCommand::Complete { dive } => {
            let id = resolve_dive(&ctx.storage, &dive)?;
            let dive = planning::complete_dive(&ctx.storage, id)
                .map_err(|e| format!("failed to complete dive: {e}"))?;
            eprintln!("Dive {} completed", dive.code);
            Ok(())
        }
        DiveCommand::Cancel { dive } => {
            let id = resolve_dive(&ctx.storage, &dive)?;
            let dive = planning::cancel_dive(&ctx.storage, id)
                .map_err(|e| format!("failed to cancel dive: {e}"))?;
            eprintln!("Dive {} cancelled", dive.code);
            Ok(())
        }
        DiveCommand::Sample { dive, depth, at } => {
            cmd_sample(ctx, &dive, depth, at.unwrap_or_else(Timestamp::now))
        }
        DiveCommand::Samples { dive } => cmd_samples(ctx, &dive),
        DiveCommand::Log { dive, notes } => {
            let id = resolve_dive(&ctx.storage, &dive)?;
            planning::record_log(&ctx.storage, id, notes, Timestamp::now())
                .map_err(|e| format!("failed to record log: {e}"))?;
            eprintln!("Log recorded for {}", short_id(id));
            Ok(())
        }
    }
}

fn cmd_plan(ctx: &Context, plan: DivePlan) -> Result<(), String> {
    let dive =
        planning::plan_dive(&ctx.storage, plan).map_err(|e| format!("failed to plan dive: {e}"))?;
    println!("{}", dive.id);
    Ok(())
}

fn cmd_list(ctx: &Context, operation: Option<&str>) -> Result<(), String> {
    let operation_id = operation
        .map(|r| resolve_operation(&ctx.storage, r))
        .transpose()?;
    let dives = ctx
        .storage
        .list_dives(operation_id)
        .map_err(|e| format!("failed to list dives: {e}"))?;

    if dives.is_empty() {
        println!("No dives");
        return Ok(());
    }
    for dive in &dives {
        let current = if dive.state == DiveState::InProgress {
            ctx.storage
                .current_sample(dive.id)
                .map_err(|e| format!("failed to read depth: {e}"))?
                .map_or_else(String::new, |s| format!("  now {:.1} m", s.depth_m))
        } else {
            String::new()
        };
        println!("{}{current}", format_dive(dive));
    }
    Ok(())
}

fn cmd_start(ctx: &Context, reference: &str, at: Timestamp) -> Result<(), String> {
    let id = resolve_dive(&ctx.storage, reference)?;
    let dive = planning::start_dive(&ctx.storage, id, at, &ctx.tz)
        .map_err(|e| format!("failed to start dive: {e}"))?;
    eprintln!("Dive {} started", dive.code);
    Ok(())
}

fn cmd_sample(ctx: &Context, reference: &str, depth_m: f64, at: Timestamp) -> Result<(), String> {
    let id = resolve_dive(&ctx.storage, reference)?;
    let monitor = DiveMonitor::new(
        ctx.storage.clone(),
        ctx.tz.clone(),
        ctx.config.rule_cache_ttl(),
        AlertSink::new().with_subscriber(LogSubscriber),
    );
    let report = monitor
        .append_depth_sample(id, depth_m, at)
        .map_err(|e| format!("failed to record sample: {e}"))?;
    print_report(ctx, &report);
    Ok(())
}

fn cmd_samples(ctx: &Context, reference: &str) -> Result<(), String> {
    let id = resolve_dive(&ctx.storage, reference)?;
    let samples = ctx
        .storage
        .load_samples(id)
        .map_err(|e| format!("failed to load samples: {e}"))?;

    if samples.is_empty() {
        println!("No samples");
        return Ok(());
    }
    for sample in &samples {
        println!("{}  {:>6.1} m", local_time(sample.recorded_at, &ctx.tz), sample.depth_m);
    }
    Ok(())
}

fn print_report(ctx: &Context, report: &IngestReport) {
    for alert in &report.alerts {
        println!("ALERT {}", format_alert(alert, &ctx.tz));
    }
    if let Some(warning) = &report.warning {
        eprintln!("warning: {warning}");
    }
}
