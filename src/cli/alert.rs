//! Alert commands: list, ack.

use clap::Subcommand;
use jiff::Timestamp;

use crate::identity::resolve_identity;

use super::{Context, format::format_alert, resolve_dive, resolve_id};

#[derive(Debug, Subcommand)]
pub enum AlertCommand {
    /// List alerts, oldest first.
    List {
        /// Only this dive's alerts. Full UUID or unambiguous prefix.
        #[arg(long)]
        dive: Option<String>,

        /// Only alerts nobody has acknowledged yet.
        #[arg(long)]
        open: bool,
    },

    /// Acknowledge an alert. Acknowledging twice keeps the first.
    Ack {
        /// Alert ID: full UUID or unambiguous prefix.
        alert: String,

        /// Who acknowledges. Defaults to the resolved identity.
        #[arg(long = "as")]
        identity: Option<String>,
    },
}

pub(super) fn run(command: AlertCommand, ctx: &Context) -> Result<(), String> {
    match command {
        AlertCommand::List { dive, open } => {
            let dive_id = dive.map(|r| resolve_dive(&ctx.storage, &r)).transpose()?;
            let alerts = ctx
                .storage
                .list_alerts(dive_id, open)
                .map_err(|e| format!("failed to list alerts: {e}"))?;

            if alerts.is_empty() {
                println!("No alerts");
                return Ok(());
            }
            for alert in &alerts {
                println!("{}", format_alert(alert, &ctx.tz));
            }
            Ok(())
        }
        AlertCommand::Ack { alert, identity } => {
            let identity = resolve_identity(identity.as_deref(), &ctx.config)?;
            let alerts = ctx
                .storage
                .list_alerts(None, false)
                .map_err(|e| format!("failed to list alerts: {e}"))?;
            let id = resolve_id(&alert, alerts.iter().map(|a| a.id), "alert")?;

            let alert = ctx
                .storage
                .acknowledge_alert(id, &identity, Timestamp::now())
                .map_err(|e| format!("failed to acknowledge alert: {e}"))?;
            println!("{}", format_alert(&alert, &ctx.tz));
            Ok(())
        }
    }
}
