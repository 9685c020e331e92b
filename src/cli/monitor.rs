//! Monitor commands: one-off and continuous bottom-time sweeps.

use std::{sync::mpsc, thread, time::Duration};

use clap::Subcommand;
use jiff::Timestamp;

use crate::{
    monitor::{DiveMonitor, SweepReport},
    sink::{AlertSink, ChannelSubscriber, LogSubscriber},
};

use super::{Context, format::format_alert};

#[derive(Debug, Subcommand)]
pub enum MonitorCommand {
    /// Check every in-progress dive once.
    Sweep {
        /// Instant to check at. Defaults to now.
        #[arg(long)]
        at: Option<Timestamp>,
    },

    /// Check every in-progress dive repeatedly, printing alerts as they fire.
    ///
    /// The pause between sweeps is `sweep-interval-secs` from the config.
    Watch {
        /// Stop after this many sweeps. Runs until interrupted otherwise.
        #[arg(long)]
        sweeps: Option<u64>,
    },
}

pub(super) fn run(command: MonitorCommand, ctx: &Context) -> Result<(), String> {
    match command {
        MonitorCommand::Sweep { at } => {
            let monitor = build_monitor(ctx, AlertSink::new().with_subscriber(LogSubscriber));
            let report = monitor
                .sweep(at.unwrap_or_else(Timestamp::now))
                .map_err(|e| format!("sweep failed: {e}"))?;
            for alert in &report.alerts {
                println!("ALERT {}", format_alert(alert, &ctx.tz));
            }
            print_summary(&report);
            Ok(())
        }
        MonitorCommand::Watch { sweeps } => cmd_watch(ctx, sweeps),
    }
}

fn build_monitor(ctx: &Context, sink: AlertSink) -> DiveMonitor {
    DiveMonitor::new(
        ctx.storage.clone(),
        ctx.tz.clone(),
        ctx.config.rule_cache_ttl(),
        sink,
    )
}

fn cmd_watch(ctx: &Context, sweeps: Option<u64>) -> Result<(), String> {
    let (tx, rx) = mpsc::channel();
    let monitor = build_monitor(
        ctx,
        AlertSink::new()
            .with_subscriber(LogSubscriber)
            .with_subscriber(ChannelSubscriber::new(tx)),
    );
    let interval = ctx.config.sweep_interval();
    tracing::info!(interval_secs = interval.as_secs(), "watching active dives");

    thread::scope(|s| {
        // Ends when the monitor, and with it the sender, is dropped.
        s.spawn(|| {
            for event in rx {
                let supervisor = event.supervisor.as_deref().unwrap_or("-");
                println!("ALERT {}  -> {supervisor}", format_alert(&event.alert, &ctx.tz));
            }
        });

        let result = watch_loop(&monitor, sweeps, interval);
        drop(monitor);
        result
    })
}

fn watch_loop(monitor: &DiveMonitor, sweeps: Option<u64>, interval: Duration) -> Result<(), String> {
    let mut done = 0;
    loop {
        let report = monitor
            .sweep(Timestamp::now())
            .map_err(|e| format!("sweep failed: {e}"))?;
        for warning in &report.warnings {
            eprintln!("warning: {warning}");
        }
        done += 1;
        if sweeps.is_some_and(|n| done >= n) {
            return Ok(());
        }
        thread::sleep(interval);
    }
}

fn print_summary(report: &SweepReport) {
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    eprintln!(
        "Checked {} active dive(s), {} new alert(s)",
        report.checked,
        report.alerts.len()
    );
}
