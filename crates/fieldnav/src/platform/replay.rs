//! Position sensor that walks a route.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::debug;

use crate::error::{Error, Result};
use crate::geo::GeoCoordinate;
use crate::position::{
    PositionSensor, PositionSink, SensorErrorKind, SensorFailure, SubscriptionId, WatchOptions,
};
use crate::scheduler::StopHandle;

/// Points visited when walking `track` in strides of at most `step_m`.
///
/// The first point of the track is included, and every track point is hit
/// exactly.
#[must_use]
pub fn walk(track: &[GeoCoordinate], step_m: f64) -> Vec<GeoCoordinate> {
    let Some(&first) = track.first() else {
        return Vec::new();
    };
    let mut points = vec![first];
    for pair in track.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let length = from.distance_to(&to);
        if length <= f64::EPSILON {
            continue;
        }
        let bearing = from.bearing_to(&to);
        let mut along = step_m;
        while along < length {
            points.push(from.destination(bearing, along));
            along += step_m;
        }
        points.push(to);
    }
    points
}

#[derive(Debug)]
struct ActiveWatch {
    subscription: SubscriptionId,
    stop: StopHandle,
    task: JoinHandle<()>,
}

/// Replays walking fixes along the route published on a watch channel.
///
/// Until a non-empty track is published the sensor reports timeouts at the
/// watch timeout.
#[derive(Debug)]
pub struct RouteReplaySensor {
    track: watch::Receiver<Vec<GeoCoordinate>>,
    period: Duration,
    step_m: f64,
    active: Option<ActiveWatch>,
}

impl RouteReplaySensor {
    /// Create a sensor emitting one fix per `period`, `step_m` apart.
    #[must_use]
    pub fn new(track: watch::Receiver<Vec<GeoCoordinate>>, period: Duration, step_m: f64) -> Self {
        Self {
            track,
            period,
            step_m,
            active: None,
        }
    }

    fn halt(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.stop();
            active.task.abort();
        }
    }
}

impl PositionSensor for RouteReplaySensor {
    fn name(&self) -> &'static str {
        "route-replay"
    }

    fn watch(&mut self, options: &WatchOptions, sink: PositionSink) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| Error::SensorUnavailable {
            message: e.to_string(),
        })?;
        self.halt();

        let stop = StopHandle::new();
        let subscription = sink.subscription();
        let task = runtime.spawn(replay(
            self.track.clone(),
            self.period,
            self.step_m,
            options.timeout,
            sink,
            stop.clone(),
        ));
        self.active = Some(ActiveWatch {
            subscription,
            stop,
            task,
        });
        Ok(())
    }

    fn clear_watch(&mut self, subscription: SubscriptionId) {
        if self
            .active
            .as_ref()
            .is_some_and(|a| a.subscription == subscription)
        {
            self.halt();
        }
    }
}

impl Drop for RouteReplaySensor {
    fn drop(&mut self) {
        self.halt();
    }
}

async fn replay(
    mut track: watch::Receiver<Vec<GeoCoordinate>>,
    period: Duration,
    step_m: f64,
    wait: Duration,
    sink: PositionSink,
    stop: StopHandle,
) {
    let points = loop {
        let current = track.borrow_and_update().clone();
        if !current.is_empty() {
            break walk(&current, step_m);
        }

        tokio::select! {
            () = stop.stopped() => return,
            changed = timeout(wait, track.changed()) => match changed {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    sink.fail(SensorFailure::new(
                        SensorErrorKind::PositionUnavailable,
                        "route track closed",
                    ));
                    return;
                }
                Err(_) => {
                    if !sink.fail(SensorFailure::new(SensorErrorKind::Timeout, "no route to replay")) {
                        return;
                    }
                }
            }
        }
    };

    debug!(subscription = %sink.subscription(), points = points.len(), "Replaying route");
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    for point in points {
        tokio::select! {
            () = stop.stopped() => return,
            _ = ticker.tick() => {}
        }
        if !sink.fix(point) {
            return;
        }
    }
    debug!(subscription = %sink.subscription(), "Replay reached end of route");
}
