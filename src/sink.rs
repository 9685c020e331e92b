//! Alert sink: deduplicates candidate alerts, persists them, and tells
//! whoever is listening.
//!
//! Listeners are [`AlertSubscriber`]s. Each one is called independently for
//! every stored alert; a failing subscriber is logged and the rest still run.

use std::sync::mpsc::Sender;

use crate::{
    model::{Dive, SafetyAlert},
    storage::{self, Storage},
};

/// Published once per alert that made it into storage.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub alert: SafetyAlert,

    /// Supervisor of the dive the alert was raised on.
    pub supervisor: Option<String>,
}

/// Something that wants to hear about raised alerts.
pub trait AlertSubscriber: Send + Sync {
    /// A short name used when logging delivery failures.
    fn name(&self) -> &str;

    fn alert_raised(&self, event: &AlertEvent) -> Result<(), String>;
}

/// Writes every alert to the log at `warn`.
#[derive(Debug, Default)]
pub struct LogSubscriber;

impl AlertSubscriber for LogSubscriber {
    fn name(&self) -> &'static str {
        "log"
    }

    fn alert_raised(&self, event: &AlertEvent) -> Result<(), String> {
        let alert = &event.alert;
        tracing::warn!(
            alert_id = %alert.id,
            dive_id = %alert.dive_id,
            dive_code = alert.details.dive_code(),
            kind = %alert.kind,
            priority = %alert.priority,
            supervisor = event.supervisor.as_deref().unwrap_or("-"),
            "{}",
            alert.details.summary()
        );
        Ok(())
    }
}

/// Forwards events into a channel, for a UI or any other consumer loop.
#[derive(Debug)]
pub struct ChannelSubscriber {
    tx: Sender<AlertEvent>,
}

impl ChannelSubscriber {
    pub fn new(tx: Sender<AlertEvent>) -> Self {
        Self { tx }
    }
}

impl AlertSubscriber for ChannelSubscriber {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn alert_raised(&self, event: &AlertEvent) -> Result<(), String> {
        self.tx
            .send(event.clone())
            .map_err(|_| "receiver disconnected".to_string())
    }
}

#[derive(Default)]
pub struct AlertSink {
    subscribers: Vec<Box<dyn AlertSubscriber>>,
}

impl std::fmt::Debug for AlertSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertSink")
            .field(
                "subscribers",
                &self.subscribers.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_subscriber(mut self, subscriber: impl AlertSubscriber + 'static) -> Self {
        self.subscribers.push(Box::new(subscriber));
        self
    }

    /// Stores the candidates that survive deduplication and publishes them.
    ///
    /// A kind that deduplicates is dropped when the dive already has an
    /// unacknowledged alert of that kind; storage makes that check in the
    /// same transaction as the insert. Returns what was stored; on error
    /// nothing was stored or published.
    pub fn deliver(
        &self,
        storage: &Storage,
        dive: &Dive,
        candidates: Vec<SafetyAlert>,
    ) -> storage::Result<Vec<SafetyAlert>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let offered: Vec<_> = candidates.iter().map(|c| (c.id, c.kind)).collect();
        let alerts = storage.insert_new_alerts(dive.id, candidates)?;
        for (id, kind) in offered {
            if !alerts.iter().any(|a| a.id == id) {
                tracing::debug!(dive_id = %dive.id, %kind, "open alert of this kind, candidate dropped");
            }
        }

        for alert in &alerts {
            tracing::info!(alert_id = %alert.id, dive_id = %dive.id, kind = %alert.kind, "alert raised");
            self.publish(&AlertEvent {
                alert: alert.clone(),
                supervisor: dive.supervisor.clone(),
            });
        }
        Ok(alerts)
    }

    fn publish(&self, event: &AlertEvent) {
        for subscriber in &self.subscribers {
            if let Err(e) = subscriber.alert_raised(event) {
                tracing::warn!(
                    subscriber = subscriber.name(),
                    alert_id = %event.alert.id,
                    error = %e,
                    "alert subscriber failed"
                );
            }
        }
    }
}
