// THEORY:
// Alert delivery runs off the engine's hot path. The engine host hands each tick's
// alerts to an `AlertDispatcher`, which only pushes them onto an unbounded channel
// and returns. A single worker task owns the receiving end, so alerts leave the
// dispatcher in exactly the order the engine emitted them.
//
// For every alert the worker:
// 1.  **Advises**: WARNING and CRITICAL alerts get a short piece of safety advice
//     from the configured `Advisor`. A slow or silent advisor is cut off by a
//     timeout and replaced with fixed advice for that hazard kind.
// 2.  **Fans out**: the alert and its advice go to every `AlertSink` in turn
//     (history log, tracing output, dashboard broadcast, ...).

use crate::hazard::{AlertEvent, HazardKind, Severity};
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Newest entries kept by `AlertLog` unless told otherwise.
pub const ALERT_LOG_CAPACITY: usize = 100;

pub const DEFAULT_ADVICE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed advice used when no advisor answers in time.
pub fn fallback_advice(kind: HazardKind) -> &'static str {
    match kind {
        HazardKind::Unattended => "Turn off the burner or return to the kitchen immediately.",
        HazardKind::Proximity => "Move flammable objects away from the active burner now.",
        HazardKind::Boilover => "Reduce heat immediately and slide the pot off the burner.",
        HazardKind::Smoke => "Check the source of smoke. Turn off heat and ventilate the area.",
        HazardKind::Flame => "If the flame is uncontrolled, turn off heat and cover with a lid.",
    }
}

/// An alert as delivered to sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchedAlert {
    #[serde(flatten)]
    pub alert: AlertEvent,
    pub advice: Option<String>,
}

/// Produces short safety advice for an alert. `None` means "no advice".
pub trait Advisor: Send + Sync {
    fn advise<'a>(&'a self, alert: &'a AlertEvent) -> BoxFuture<'a, Option<String>>;
}

/// Answers immediately with the fixed advice for the alert's hazard kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackAdvisor;

impl Advisor for FallbackAdvisor {
    fn advise<'a>(&'a self, alert: &'a AlertEvent) -> BoxFuture<'a, Option<String>> {
        future::ready(Some(fallback_advice(alert.kind()).to_string())).boxed()
    }
}

/// A destination for dispatched alerts. Called from the dispatcher's worker task.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &DispatchedAlert);
}

/// Bounded in-memory alert history, newest last.
#[derive(Debug, Clone)]
pub struct AlertLog {
    entries: Arc<Mutex<VecDeque<DispatchedAlert>>>,
    capacity: usize,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::with_capacity(ALERT_LOG_CAPACITY)
    }
}

impl AlertLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, alert: DispatchedAlert) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.push_back(alert);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Up to `limit` of the newest entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<DispatchedAlert> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for AlertLog {
    fn deliver(&self, alert: &DispatchedAlert) {
        self.push(alert.clone());
    }
}

/// Writes every alert to `tracing` at a level matching its severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&self, dispatched: &DispatchedAlert) {
        let alert = &dispatched.alert;
        let advice = dispatched.advice.as_deref().unwrap_or("");
        match alert.severity {
            Severity::Info => info!(zone = %alert.zone_name, kind = %alert.kind(), "{}", alert.message),
            Severity::Warning => warn!(zone = %alert.zone_name, kind = %alert.kind(), advice, "{}", alert.message),
            Severity::Critical => error!(zone = %alert.zone_name, kind = %alert.kind(), advice, "{}", alert.message),
        }
    }
}

pub struct AlertDispatcher {
    sender: mpsc::UnboundedSender<AlertEvent>,
    worker: JoinHandle<()>,
}

impl AlertDispatcher {
    /// Starts the delivery worker. Must be called from inside a tokio runtime.
    pub fn spawn(advisor: Arc<dyn Advisor>, sinks: Vec<Arc<dyn AlertSink>>, advice_timeout: Duration) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<AlertEvent>();

        let worker = tokio::spawn(async move {
            while let Some(alert) = receiver.recv().await {
                let advice = Self::advice_for(advisor.as_ref(), &alert, advice_timeout).await;
                let dispatched = DispatchedAlert { alert, advice };
                for sink in &sinks {
                    sink.deliver(&dispatched);
                }
            }
            debug!("alert dispatcher drained");
        });

        Self { sender, worker }
    }

    async fn advice_for(advisor: &dyn Advisor, alert: &AlertEvent, timeout: Duration) -> Option<String> {
        if alert.severity < Severity::Warning {
            return None;
        }
        let fallback = || fallback_advice(alert.kind()).to_string();
        match tokio::time::timeout(timeout, advisor.advise(alert)).await {
            Ok(Some(advice)) if !advice.trim().is_empty() => Some(advice),
            Ok(_) => Some(fallback()),
            Err(_) => {
                warn!(kind = %alert.kind(), "advisor timed out, using fallback advice");
                Some(fallback())
            }
        }
    }

    /// Queues alerts for delivery without waiting. Returns how many were queued.
    pub fn dispatch(&self, alerts: impl IntoIterator<Item = AlertEvent>) -> usize {
        let mut queued = 0;
        for alert in alerts {
            if self.sender.send(alert).is_err() {
                warn!("alert dispatcher worker is gone, dropping alert");
                break;
            }
            queued += 1;
        }
        queued
    }

    /// Closes the queue and waits until every queued alert has been delivered.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            warn!("alert dispatcher worker failed: {e}");
        }
    }
}
