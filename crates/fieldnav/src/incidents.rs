//! Active incident feed.
//!
//! The control room publishes incidents detected by the crowd-analysis
//! pipeline. [`IncidentPoller`] refreshes the feed on a fixed interval from
//! a task it owns; the owner starts it and stops it explicitly.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::Error;
use crate::scheduler::StopHandle;
use crate::service::DispatchService;
use crate::session::IncidentTarget;
use crate::venue::{zone_slug, VenueTable};

/// Confidence above which an incident is high severity.
pub const HIGH_SEVERITY_CONFIDENCE: f64 = 80.0;

fn default_confidence() -> f64 {
    HIGH_SEVERITY_CONFIDENCE
}

fn default_kind() -> String {
    "other".to_string()
}

/// One incident as published by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Feed identifier.
    pub id: String,
    /// Incident category, e.g. `crowd_surge`.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Detection confidence, 0 to 100.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Feed status, e.g. `active`.
    #[serde(default)]
    pub status: String,
    /// Zone or venue location label.
    pub location: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// When the incident was detected.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Snapshot of the detection.
    #[serde(default, alias = "imageUrl")]
    pub image_url: Option<String>,
}

/// How urgent an incident is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Confidence above 80.
    High,
    /// Everything else.
    Medium,
}

impl Severity {
    /// Classify a detection confidence.
    #[must_use]
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > HIGH_SEVERITY_CONFIDENCE {
            Self::High
        } else {
            Self::Medium
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
        }
    }
}

/// An incident ready to be shown and navigated to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    /// Feed identifier.
    pub id: String,
    /// Incident category.
    pub kind: String,
    /// Severity derived from confidence.
    pub severity: Severity,
    /// Feed status.
    pub status: String,
    /// Location label as published.
    pub location: String,
    /// Slug of the location label.
    pub zone: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Parsed detection time.
    pub reported_at: Option<DateTime<Utc>>,
    /// Snapshot of the detection.
    pub image_url: Option<String>,
}

impl Incident {
    /// Where to navigate for this incident.
    #[must_use]
    pub fn target(&self, venue: &VenueTable) -> IncidentTarget {
        IncidentTarget::incident(self.id.clone(), venue.target_for_zone(&self.zone))
    }
}

impl From<IncidentRecord> for Incident {
    fn from(record: IncidentRecord) -> Self {
        let reported_at = record.timestamp.as_deref().and_then(parse_timestamp);
        Self {
            severity: Severity::from_confidence(record.confidence),
            zone: zone_slug(&record.location),
            id: record.id,
            kind: record.kind,
            status: record.status,
            location: record.location,
            description: record.description,
            reported_at,
            image_url: record.image_url,
        }
    }
}

/// Parse an ISO-8601 timestamp, treating a missing offset as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            debug!(timestamp = raw, error = %e, "Unparseable incident timestamp");
            None
        }
    }
}

/// Result of one feed refresh.
#[derive(Debug)]
pub enum FeedEvent {
    /// The current list of active incidents.
    Updated(Vec<Incident>),
    /// The refresh failed; the previous list still stands.
    Failed(Error),
}

/// Periodic refresh of the incident feed.
#[derive(Debug)]
pub struct IncidentPoller {
    service: Arc<dyn DispatchService>,
    interval: Duration,
    stop: StopHandle,
    task: Option<JoinHandle<()>>,
}

impl IncidentPoller {
    /// Create a stopped poller.
    #[must_use]
    pub fn new(service: Arc<dyn DispatchService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            stop: StopHandle::new(),
            task: None,
        }
    }

    /// Start refreshing onto `tx`. The first refresh happens immediately.
    ///
    /// A running poller is stopped and restarted. The loop ends on its own
    /// when `tx` is closed.
    pub fn start(&mut self, tx: mpsc::UnboundedSender<FeedEvent>) {
        self.halt();

        let stop = StopHandle::new();
        self.stop = stop.clone();
        let service = Arc::clone(&self.service);
        let period = self.interval;

        debug!(interval_ms = period.as_millis(), "Starting incident poller");
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = stop.stopped() => break,
                    _ = ticker.tick() => {}
                }

                let event = match service.active_incidents().await {
                    Ok(records) => {
                        FeedEvent::Updated(records.into_iter().map(Incident::from).collect())
                    }
                    Err(e) => {
                        warn!(error = %e, "Incident refresh failed");
                        FeedEvent::Failed(e)
                    }
                };
                if stop.is_stopped() || tx.send(event).is_err() {
                    break;
                }
            }
            debug!("Incident poller stopped");
        }));
    }

    /// Stop refreshing and wait for the loop to exit.
    pub async fn stop(&mut self) {
        self.stop.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Incident poller task ended abnormally");
            }
        }
    }

    /// Whether the loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn halt(&mut self) {
        self.stop.stop();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for IncidentPoller {
    fn drop(&mut self) {
        self.halt();
    }
}
