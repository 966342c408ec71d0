//! Device location tracking.
//!
//! A [`PositionSensor`] is the platform capability: it is asked to watch the
//! device position and pushes typed [`PositionEvent`]s onto the engine queue
//! through a [`PositionSink`]. [`PositionSource`] owns the sensor and
//! guarantees at most one live subscription.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::TrackingConfig;
use crate::error::{Error, Result};
use crate::geo::GeoCoordinate;
use crate::navigator::EngineEvent;

/// Classification of a sensor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorErrorKind {
    /// The operator refused location access.
    PermissionDenied,
    /// The sensor has no fix to report.
    PositionUnavailable,
    /// No fix arrived within the watch timeout.
    Timeout,
    /// Anything else.
    Unknown,
}

impl SensorErrorKind {
    /// Classify a numeric platform error code (1 denied, 2 unavailable, 3 timeout).
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::PermissionDenied,
            2 => Self::PositionUnavailable,
            3 => Self::Timeout,
            _ => Self::Unknown,
        }
    }

    /// Operator-facing advisory for this failure.
    #[must_use]
    pub fn advisory(self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Unable to get your location. Please allow location access in your device settings."
            }
            Self::PositionUnavailable => {
                "Unable to get your location. Location information is unavailable."
            }
            Self::Timeout => "Unable to get your location. Location request timed out.",
            Self::Unknown => "Unable to get your location. An unknown error occurred.",
        }
    }
}

impl fmt::Display for SensorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission_denied"),
            Self::PositionUnavailable => write!(f, "position_unavailable"),
            Self::Timeout => write!(f, "timeout"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified sensor failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorFailure {
    /// What went wrong.
    pub kind: SensorErrorKind,
    /// Platform detail, if any.
    pub message: String,
}

impl SensorFailure {
    /// Create a failure.
    #[must_use]
    pub fn new(kind: SensorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<SensorFailure> for Error {
    fn from(failure: SensorFailure) -> Self {
        match failure.kind {
            SensorErrorKind::PermissionDenied => Self::SensorPermissionDenied,
            SensorErrorKind::PositionUnavailable => Self::SensorUnavailable {
                message: failure.message,
            },
            SensorErrorKind::Timeout => Self::SensorTimeout,
            SensorErrorKind::Unknown => Self::SensorUnknown {
                message: failure.message,
            },
        }
    }
}

impl From<&Error> for SensorFailure {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::SensorPermissionDenied => SensorErrorKind::PermissionDenied,
            Error::SensorUnavailable { .. } => SensorErrorKind::PositionUnavailable,
            Error::SensorTimeout => SensorErrorKind::Timeout,
            _ => SensorErrorKind::Unknown,
        };
        Self::new(kind, err.to_string())
    }
}

/// Identifies one watch on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Create an id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw identifier.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// What a sensor reports.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionReport {
    /// A new fix.
    Fix(GeoCoordinate),
    /// A failure; the watch stays registered.
    Failed(SensorFailure),
}

/// A report tagged with the subscription that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEvent {
    /// The watch that produced the report.
    pub subscription: SubscriptionId,
    /// The report.
    pub report: PositionReport,
}

/// Where a sensor delivers reports for one subscription.
#[derive(Debug, Clone)]
pub struct PositionSink {
    subscription: SubscriptionId,
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl PositionSink {
    /// Create a sink for `subscription` feeding the engine queue.
    #[must_use]
    pub fn new(subscription: SubscriptionId, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { subscription, tx }
    }

    /// The subscription this sink reports for.
    #[must_use]
    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Deliver a fix. Returns `false` once the engine has gone away.
    pub fn fix(&self, position: GeoCoordinate) -> bool {
        self.send(PositionReport::Fix(position))
    }

    /// Deliver a failure. Returns `false` once the engine has gone away.
    pub fn fail(&self, failure: SensorFailure) -> bool {
        self.send(PositionReport::Failed(failure))
    }

    fn send(&self, report: PositionReport) -> bool {
        self.tx
            .send(EngineEvent::Position(PositionEvent {
                subscription: self.subscription,
                report,
            }))
            .is_ok()
    }
}

/// Options passed to the sensor when a watch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    /// Ask for the most accurate fixes available.
    pub high_accuracy: bool,
    /// Report a timeout when no fix arrives within this window.
    pub timeout: Duration,
    /// Oldest cached fix the sensor may return.
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from(&TrackingConfig::default())
    }
}

impl From<&TrackingConfig> for WatchOptions {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: Duration::from_millis(config.timeout_ms),
            maximum_age: Duration::from_millis(config.maximum_age_ms),
        }
    }
}

/// A platform location capability.
///
/// Implementations deliver reports in measurement order and keep the watch
/// alive after a failure until `clear_watch` is called.
pub trait PositionSensor: Send + fmt::Debug {
    /// The name of this sensor (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Begin delivering reports for `sink.subscription()`.
    ///
    /// # Errors
    ///
    /// Returns a sensor error if the watch cannot be registered at all.
    fn watch(&mut self, options: &WatchOptions, sink: PositionSink) -> Result<()>;

    /// Stop delivering reports for `subscription`. Unknown ids are ignored.
    fn clear_watch(&mut self, subscription: SubscriptionId);
}

/// Owns the location sensor and its single active subscription.
#[derive(Debug)]
pub struct PositionSource {
    sensor: Box<dyn PositionSensor>,
    options: WatchOptions,
    tx: mpsc::UnboundedSender<EngineEvent>,
    active: Option<SubscriptionId>,
    next_id: u64,
}

impl PositionSource {
    /// Wrap a sensor that reports onto `tx`.
    #[must_use]
    pub fn new(
        sensor: Box<dyn PositionSensor>,
        options: WatchOptions,
        tx: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            sensor,
            options,
            tx,
            active: None,
            next_id: 1,
        }
    }

    /// Start a new subscription, stopping any active one first.
    ///
    /// # Errors
    ///
    /// Returns the sensor's error if the watch cannot be registered; no
    /// subscription is active afterwards.
    pub fn start_tracking(&mut self) -> Result<SubscriptionId> {
        self.stop_tracking();

        let id = SubscriptionId::new(self.next_id);
        self.next_id += 1;

        debug!(sensor = self.sensor.name(), subscription = %id, "Starting position watch");
        let sink = PositionSink::new(id, self.tx.clone());
        if let Err(e) = self.sensor.watch(&self.options, sink) {
            warn!(sensor = self.sensor.name(), error = %e, "Position watch failed to start");
            return Err(e);
        }
        self.active = Some(id);
        Ok(id)
    }

    /// Stop the active subscription, if any. Safe to call repeatedly.
    pub fn stop_tracking(&mut self) {
        if let Some(id) = self.active.take() {
            debug!(sensor = self.sensor.name(), subscription = %id, "Clearing position watch");
            self.sensor.clear_watch(id);
        }
    }

    /// Whether a subscription is active.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.active.is_some()
    }

    /// Whether `subscription` is the active one. Reports from any other
    /// subscription are stale.
    #[must_use]
    pub fn is_current(&self, subscription: SubscriptionId) -> bool {
        self.active == Some(subscription)
    }
}

impl Drop for PositionSource {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default)]
    struct Calls {
        watched: Vec<SubscriptionId>,
        cleared: Vec<SubscriptionId>,
    }

    #[derive(Debug)]
    struct RecordingSensor {
        calls: Arc<Mutex<Calls>>,
        refuse: bool,
    }

    impl PositionSensor for RecordingSensor {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn watch(&mut self, _options: &WatchOptions, sink: PositionSink) -> Result<()> {
            if self.refuse {
                return Err(Error::SensorPermissionDenied);
            }
            self.calls.lock().unwrap().watched.push(sink.subscription());
            Ok(())
        }

        fn clear_watch(&mut self, subscription: SubscriptionId) {
            self.calls.lock().unwrap().cleared.push(subscription);
        }
    }

    fn source(refuse: bool) -> (PositionSource, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let sensor = RecordingSensor {
            calls: Arc::clone(&calls),
            refuse,
        };
        (
            PositionSource::new(Box::new(sensor), WatchOptions::default(), tx),
            calls,
        )
    }

    #[test]
    fn test_error_kind_from_code() {
        assert_eq!(SensorErrorKind::from_code(1), SensorErrorKind::PermissionDenied);
        assert_eq!(SensorErrorKind::from_code(2), SensorErrorKind::PositionUnavailable);
        assert_eq!(SensorErrorKind::from_code(3), SensorErrorKind::Timeout);
        assert_eq!(SensorErrorKind::from_code(42), SensorErrorKind::Unknown);
    }

    #[test]
    fn test_advisory_text() {
        assert!(SensorErrorKind::PermissionDenied
            .advisory()
            .contains("allow location access"));
        assert!(SensorErrorKind::Timeout.advisory().contains("timed out"));
    }

    #[test]
    fn test_failure_into_error() {
        let err: Error = SensorFailure::new(SensorErrorKind::PermissionDenied, "").into();
        assert!(matches!(err, Error::SensorPermissionDenied));

        let err: Error = SensorFailure::new(SensorErrorKind::PositionUnavailable, "no sky").into();
        assert!(err.to_string().contains("no sky"));
    }

    #[test]
    fn test_failure_from_error() {
        let failure = SensorFailure::from(&Error::SensorTimeout);
        assert_eq!(failure.kind, SensorErrorKind::Timeout);
        let failure = SensorFailure::from(&Error::internal("boom"));
        assert_eq!(failure.kind, SensorErrorKind::Unknown);
    }

    #[test]
    fn test_watch_options_from_config() {
        let options = WatchOptions::default();
        assert!(options.high_accuracy);
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.maximum_age, Duration::from_secs(5));
    }

    #[test]
    fn test_start_tracking() {
        let (mut source, calls) = source(false);
        let id = source.start_tracking().unwrap();

        assert!(source.is_tracking());
        assert!(source.is_current(id));
        assert_eq!(calls.lock().unwrap().watched, vec![id]);
    }

    #[test]
    fn test_restart_stops_previous_watch() {
        let (mut source, calls) = source(false);
        let first = source.start_tracking().unwrap();
        let second = source.start_tracking().unwrap();

        assert_ne!(first, second);
        assert!(!source.is_current(first));
        assert!(source.is_current(second));
        assert_eq!(calls.lock().unwrap().cleared, vec![first]);
    }

    #[test]
    fn test_stop_tracking_is_idempotent() {
        let (mut source, calls) = source(false);
        let id = source.start_tracking().unwrap();
        source.stop_tracking();
        source.stop_tracking();

        assert!(!source.is_tracking());
        assert_eq!(calls.lock().unwrap().cleared, vec![id]);
    }

    #[test]
    fn test_refused_watch_leaves_no_subscription() {
        let (mut source, _calls) = source(true);
        let result = source.start_tracking();

        assert!(matches!(result, Err(Error::SensorPermissionDenied)));
        assert!(!source.is_tracking());
    }

    #[test]
    fn test_drop_clears_watch() {
        let (mut source, calls) = source(false);
        let id = source.start_tracking().unwrap();
        drop(source);
        assert_eq!(calls.lock().unwrap().cleared, vec![id]);
    }

    #[test]
    fn test_sink_tags_subscription() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = PositionSink::new(SubscriptionId(7), tx);
        assert!(sink.fix(GeoCoordinate::new(1.0, 2.0)));

        match rx.try_recv().unwrap() {
            EngineEvent::Position(event) => {
                assert_eq!(event.subscription, SubscriptionId(7));
                assert_eq!(event.report, PositionReport::Fix(GeoCoordinate::new(1.0, 2.0)));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_sink_reports_closed_engine() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = PositionSink::new(SubscriptionId(1), tx);
        assert!(!sink.fail(SensorFailure::new(SensorErrorKind::Timeout, "")));
    }
}
