//! Navigation session state machine.
//!
//! A [`NavigationSession`] is pure: every operation updates the session and
//! returns the [`Effect`]s the caller must apply (route requests, sensor and
//! audio control, operator notices). It never touches a sensor, the audio
//! channel or the network itself.
//!
//! ```text
//! Idle --accept--> Requesting --route ok--> Active --geofence/mark--> Arrived
//!                       |                      |
//!                       +--route error--> Failed
//!                                              +--cancel--> Cancelled
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::geo::{self, GeoCoordinate};
use crate::position::{SensorErrorKind, SensorFailure};
use crate::route::{AvoidZone, PlanContext, RoutePlan, RouteRequest, RouteResponse};
use crate::venue::VenueTable;

/// Identifies one session for the lifetime of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Create an id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Tags a routing request with the session that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTicket {
    /// The issuing session.
    pub session: SessionId,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Shown an incident, nothing requested yet.
    Idle,
    /// Waiting for the routing service.
    Requesting,
    /// Guiding the responder.
    Active,
    /// Reached the target.
    Arrived,
    /// Closed by the operator.
    Cancelled,
    /// The route request failed.
    Failed,
}

impl SessionState {
    /// Lowercase state name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Active => "active",
            Self::Arrived => "arrived",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Arrived | Self::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the responder is navigating to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentTarget {
    /// Incident being responded to, if any.
    pub incident_id: Option<String>,
    /// Venue location name of the destination.
    pub target_name: String,
}

impl IncidentTarget {
    /// Navigate to a venue location with no incident attached.
    #[must_use]
    pub fn location(target_name: impl Into<String>) -> Self {
        Self {
            incident_id: None,
            target_name: target_name.into(),
        }
    }

    /// Navigate to the location of an incident.
    #[must_use]
    pub fn incident(incident_id: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            incident_id: Some(incident_id.into()),
            target_name: target_name.into(),
        }
    }
}

/// Where a session starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    /// Venue location name sent as the route start.
    pub name: String,
    /// Initial position.
    pub position: GeoCoordinate,
}

/// Tunables for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Distance to the target that counts as arrival.
    pub arrival_radius_m: f64,
    /// Walking speed for ETA estimates.
    pub walking_speed_kmh: f64,
    /// Distance to the next step's anchor that enters the step.
    pub step_advance_radius_m: f64,
    /// Locations the route should avoid.
    pub avoid: Vec<String>,
    /// Radius of each avoid-zone circle.
    pub avoid_radius_m: f64,
    /// Track the position as soon as the route is installed.
    pub tracking_on_start: bool,
    /// Switch voice on when the route has spoken steps.
    pub voice_on_start: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            arrival_radius_m: config.navigation.arrival_radius_m,
            walking_speed_kmh: config.navigation.walking_speed_kmh,
            step_advance_radius_m: config.navigation.step_advance_radius_m,
            avoid: config.venue.avoid.clone(),
            avoid_radius_m: config.venue.avoid_radius_m,
            tracking_on_start: config.tracking.enabled_on_start,
            voice_on_start: config.voice.enabled_on_start,
        }
    }
}

/// Severity of an operator notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Something completed.
    Success,
    /// Neutral status.
    Info,
    /// Degraded but still operating.
    Warning,
    /// An action failed.
    Error,
}

/// A short operator-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Message text.
    pub text: String,
}

impl Notice {
    /// A success notice.
    #[must_use]
    pub fn success(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, text)
    }

    /// An informational notice.
    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, text)
    }

    /// A warning notice.
    #[must_use]
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, text)
    }

    /// An error notice.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, text)
    }

    fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.level, self.text)
    }
}

/// Work requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Ask the routing service for a route.
    RequestRoute(RouteTicket, RouteRequest),
    /// Subscribe to position fixes.
    StartTracking,
    /// Release the position subscription.
    StopTracking,
    /// Speak on the audio channel.
    Speak {
        /// Text to speak.
        text: String,
        /// Cancel whatever is playing first.
        interrupt: bool,
    },
    /// Silence the audio channel.
    StopVoice,
    /// Enable or disable voice guidance.
    SetVoiceEnabled(bool),
    /// Show a notice to the operator.
    Notify(Notice),
}

/// Read-only view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Session identity.
    pub session: SessionId,
    /// Lifecycle state.
    pub state: SessionState,
    /// Incident being responded to.
    pub incident_id: Option<String>,
    /// Destination name.
    pub target_name: String,
    /// Destination coordinate.
    pub target_location: GeoCoordinate,
    /// Latest known position.
    pub current_position: GeoCoordinate,
    /// Step cursor.
    pub current_step: usize,
    /// Number of steps in the plan.
    pub step_count: usize,
    /// Text of the current step.
    pub step_text: Option<String>,
    /// Distance left to the target.
    pub distance_remaining_m: Option<f64>,
    /// ETA label for the remaining distance.
    pub eta_label: Option<String>,
    /// Whether position tracking is on.
    pub tracking_enabled: bool,
    /// Whether voice guidance is on. Filled in by the engine.
    pub voice_enabled: bool,
    /// Whether audio is playing. Filled in by the engine.
    pub speaking: bool,
    /// Why the route request failed.
    pub failure: Option<String>,
    /// The installed route.
    #[serde(skip)]
    pub plan: Option<Arc<RoutePlan>>,
}

/// One navigation attempt towards one target.
#[derive(Debug, Clone)]
pub struct NavigationSession {
    id: SessionId,
    venue: Arc<VenueTable>,
    settings: SessionSettings,
    incident_id: Option<String>,
    origin_name: String,
    origin_position: GeoCoordinate,
    target_name: String,
    target_location: GeoCoordinate,
    state: SessionState,
    plan: Option<Arc<RoutePlan>>,
    current_position: GeoCoordinate,
    current_step: usize,
    distance_remaining_m: Option<f64>,
    eta_label: Option<String>,
    tracking_enabled: bool,
    last_advisory: Option<SensorErrorKind>,
    failure: Option<String>,
}

impl NavigationSession {
    /// Create an idle session.
    ///
    /// The target name is resolved against the venue table; an unknown
    /// target falls back to the origin position.
    #[must_use]
    pub fn new(
        id: SessionId,
        target: IncidentTarget,
        origin: Origin,
        settings: SessionSettings,
        venue: Arc<VenueTable>,
    ) -> Self {
        let target_name = venue
            .canonical_name(&target.target_name)
            .unwrap_or(&target.target_name)
            .to_string();
        let target_location = venue.resolve_or(&target_name, origin.position);
        let tracking_enabled = settings.tracking_on_start;

        Self {
            id,
            venue,
            settings,
            incident_id: target.incident_id,
            origin_name: origin.name,
            origin_position: origin.position,
            target_name,
            target_location,
            state: SessionState::Idle,
            plan: None,
            current_position: origin.position,
            current_step: 0,
            distance_remaining_m: None,
            eta_label: None,
            tracking_enabled,
            last_advisory: None,
            failure: None,
        }
    }

    /// Session identity.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The installed route, present while Active or Arrived.
    #[must_use]
    pub fn plan(&self) -> Option<&RoutePlan> {
        self.plan.as_deref()
    }

    /// Incident being responded to.
    #[must_use]
    pub fn incident_id(&self) -> Option<&str> {
        self.incident_id.as_deref()
    }

    /// Canonical destination name.
    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Destination coordinate.
    #[must_use]
    pub fn target_location(&self) -> GeoCoordinate {
        self.target_location
    }

    /// Latest known position.
    #[must_use]
    pub fn current_position(&self) -> GeoCoordinate {
        self.current_position
    }

    /// Step cursor.
    #[must_use]
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Distance left to the target, once a route is installed.
    #[must_use]
    pub fn distance_remaining_m(&self) -> Option<f64> {
        self.distance_remaining_m
    }

    /// ETA label, once a route is installed.
    #[must_use]
    pub fn eta_label(&self) -> Option<&str> {
        self.eta_label.as_deref()
    }

    /// Whether position tracking is on.
    #[must_use]
    pub fn tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }

    /// Ticket for this session's route request.
    #[must_use]
    pub fn ticket(&self) -> RouteTicket {
        RouteTicket { session: self.id }
    }

    /// Accept the incident and request a route.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the session is Idle.
    pub fn accept(&mut self) -> Result<Vec<Effect>> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("accept"));
        }
        self.transition(SessionState::Requesting);

        let request = RouteRequest::new(
            self.origin_name.clone(),
            self.target_name.clone(),
            self.settings.avoid.clone(),
        );
        let mut effects = Vec::with_capacity(2);
        if self.incident_id.is_some() {
            effects.push(Effect::Notify(Notice::success(
                "Incident claimed. Status updated to Responding.",
            )));
        }
        effects.push(Effect::RequestRoute(self.ticket(), request));
        Ok(effects)
    }

    /// Install the route returned by the routing service.
    ///
    /// Completions for another session, or arriving after the session left
    /// Requesting, are discarded.
    pub fn route_succeeded(&mut self, ticket: RouteTicket, response: RouteResponse) -> Vec<Effect> {
        if !self.is_awaiting(ticket) {
            return Vec::new();
        }

        let ctx = PlanContext {
            venue: &self.venue,
            target_name: &self.target_name,
            target_location: self.target_location,
            origin: self.origin_position,
            avoid_zones: AvoidZone::resolve_all(
                &self.venue,
                &self.settings.avoid,
                self.settings.avoid_radius_m,
            ),
            walking_speed_kmh: self.settings.walking_speed_kmh,
        };
        let plan = RoutePlan::build(response, ctx);

        self.current_position = plan.origin();
        self.current_step = 0;
        self.distance_remaining_m = Some(plan.total_distance_meters());
        self.eta_label = Some(plan.eta_label());
        self.transition(SessionState::Active);

        let mut effects = vec![Effect::Notify(Notice::success(format!(
            "Route calculated: {:.1}km to {}",
            plan.total_distance_meters() / 1000.0,
            self.target_name
        )))];
        if self.tracking_enabled {
            effects.push(Effect::StartTracking);
        }
        if let Some(first) = plan.voice_step(0) {
            if self.settings.voice_on_start {
                effects.push(Effect::SetVoiceEnabled(true));
            }
            effects.push(Effect::Speak {
                text: first.to_string(),
                interrupt: true,
            });
        }

        self.plan = Some(Arc::new(plan));
        effects
    }

    /// Record a failed route request.
    pub fn route_failed(&mut self, ticket: RouteTicket, error: &Error) -> Vec<Effect> {
        if !self.is_awaiting(ticket) {
            return Vec::new();
        }

        warn!(session = %self.id, error = %error, "Route request failed");
        self.failure = Some(error.to_string());
        self.plan = None;
        self.transition(SessionState::Failed);

        let text = match error {
            Error::NetworkUnreachable { .. } => "Navigation service unreachable.",
            _ => "Failed to calculate path.",
        };
        vec![Effect::Notify(Notice::error(text))]
    }

    /// Apply a live position fix.
    ///
    /// Outside Active the fix is only recorded. While Active the distance
    /// and ETA are recomputed and the geofence is checked. The step cursor
    /// advances by at most one per fix, once the responder is near the next
    /// step's anchor or has already moved past it.
    pub fn position_update(&mut self, position: GeoCoordinate) -> Vec<Effect> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.current_position = position;
        self.last_advisory = None;

        let Some(plan) = self.plan.clone() else {
            return Vec::new();
        };
        if self.state != SessionState::Active {
            return Vec::new();
        }

        let remaining = geo::distance_meters(position, plan.target_location());
        self.distance_remaining_m = Some(remaining);
        self.eta_label = Some(geo::estimate_minutes(
            remaining,
            self.settings.walking_speed_kmh,
        ));
        trace!(session = %self.id, position = %position, remaining_m = remaining, "Position update");

        if remaining < self.settings.arrival_radius_m {
            self.tracking_enabled = false;
            self.transition(SessionState::Arrived);
            return vec![
                Effect::StopTracking,
                Effect::StopVoice,
                Effect::Notify(Notice::success(
                    "You have arrived at the incident location!",
                )),
            ];
        }

        let next = self.current_step + 1;
        if next >= plan.steps().len() {
            return Vec::new();
        }
        if !self.entered_step(&plan, position, next) {
            return Vec::new();
        }

        self.current_step = next;
        debug!(session = %self.id, step = next, "Advanced to next step");
        plan.voice_step(next)
            .map(|text| Effect::Speak {
                text: text.to_string(),
                interrupt: true,
            })
            .into_iter()
            .collect()
    }

    /// Whether `position` is inside step `index`: near its anchor, or already
    /// closer to the following anchor than step `index`'s anchor is.
    fn entered_step(&self, plan: &RoutePlan, position: GeoCoordinate, index: usize) -> bool {
        let anchor = plan.step_anchor(index);
        if geo::distance_meters(position, anchor) <= self.settings.step_advance_radius_m {
            return true;
        }
        let following = plan.step_anchor(index + 1);
        geo::distance_meters(position, following) < geo::distance_meters(anchor, following)
    }

    /// Apply a sensor failure. The last known position is kept.
    ///
    /// Repeats of the same failure kind produce a single advisory until the
    /// next successful fix.
    pub fn sensor_error(&mut self, failure: &SensorFailure) -> Vec<Effect> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        warn!(session = %self.id, kind = %failure.kind, message = %failure.message, "Sensor error");
        if self.last_advisory == Some(failure.kind) {
            return Vec::new();
        }
        self.last_advisory = Some(failure.kind);
        vec![Effect::Notify(Notice::warning(failure.kind.advisory()))]
    }

    /// The operator reports arrival.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the session is Active.
    pub fn mark_arrived(&mut self) -> Result<Vec<Effect>> {
        if self.state != SessionState::Active {
            return Err(self.invalid("mark arrived"));
        }
        self.current_position = self.target_location;
        self.distance_remaining_m = Some(0.0);
        self.eta_label = Some(geo::format_minutes(0));
        self.tracking_enabled = false;
        self.transition(SessionState::Arrived);

        Ok(vec![
            Effect::StopTracking,
            Effect::StopVoice,
            Effect::Notify(Notice::success("Arrived at location.")),
        ])
    }

    /// The operator closes the session. A no-op on terminal sessions.
    pub fn cancel(&mut self) -> Vec<Effect> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.plan = None;
        self.tracking_enabled = false;
        self.transition(SessionState::Cancelled);

        vec![
            Effect::StopTracking,
            Effect::StopVoice,
            Effect::Notify(Notice::info("Navigation cancelled")),
        ]
    }

    /// Switch position tracking on or off without changing state.
    ///
    /// Outside Active the preference is recorded and applied when a route
    /// is installed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] on a terminal session.
    pub fn set_tracking(&mut self, enabled: bool) -> Result<Vec<Effect>> {
        if self.state.is_terminal() {
            return Err(self.invalid("change tracking"));
        }
        if self.tracking_enabled == enabled {
            return Ok(Vec::new());
        }
        self.tracking_enabled = enabled;

        let mut effects = Vec::with_capacity(2);
        if self.state == SessionState::Active {
            effects.push(if enabled {
                Effect::StartTracking
            } else {
                Effect::StopTracking
            });
        }
        effects.push(Effect::Notify(Notice::info(if enabled {
            "GPS tracking enabled"
        } else {
            "GPS tracking disabled"
        })));
        Ok(effects)
    }

    /// Flip position tracking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] on a terminal session.
    pub fn toggle_tracking(&mut self) -> Result<Vec<Effect>> {
        self.set_tracking(!self.tracking_enabled)
    }

    /// Read-only view of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let steps = self.plan.as_ref().map_or(&[][..], |p| p.steps());
        SessionSnapshot {
            session: self.id,
            state: self.state,
            incident_id: self.incident_id.clone(),
            target_name: self.target_name.clone(),
            target_location: self.target_location,
            current_position: self.current_position,
            current_step: self.current_step,
            step_count: steps.len(),
            step_text: steps.get(self.current_step).cloned(),
            distance_remaining_m: self.distance_remaining_m,
            eta_label: self.eta_label.clone(),
            tracking_enabled: self.tracking_enabled,
            voice_enabled: false,
            speaking: false,
            failure: self.failure.clone(),
            plan: self.plan.clone(),
        }
    }

    fn is_awaiting(&self, ticket: RouteTicket) -> bool {
        if ticket.session == self.id && self.state == SessionState::Requesting {
            return true;
        }
        debug!(
            session = %self.id,
            ticket = %ticket.session,
            state = %self.state,
            "Discarding stale route response"
        );
        false
    }

    fn transition(&mut self, to: SessionState) {
        info!(session = %self.id, from = %self.state, to = %to, "Session transition");
        self.state = to;
    }

    fn invalid(&self, event: &'static str) -> Error {
        Error::InvalidTransition {
            from: self.state.as_str(),
            event,
        }
    }
}
