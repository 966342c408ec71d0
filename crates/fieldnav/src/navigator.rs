//! The navigation engine loop.
//!
//! [`Navigator`] owns the exclusive device resources (the position sensor
//! and the audio channel) and the current [`NavigationSession`]. Everything
//! that can happen to a session arrives as an [`EngineEvent`] on one queue:
//! position fixes, speech progress, route and message completions, and
//! operator commands. Events are handled one at a time, so the session is
//! never mutated concurrently.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::messaging::{self, OutgoingMessage};
use crate::position::{
    PositionEvent, PositionReport, PositionSensor, PositionSource, SensorFailure, WatchOptions,
};
use crate::route::{RouteRequest, RouteResponse};
use crate::service::DispatchService;
use crate::session::{
    Effect, IncidentTarget, NavigationSession, Notice, Origin, RouteTicket, SessionId,
    SessionSettings, SessionSnapshot, SessionState,
};
use crate::venue::VenueTable;
use crate::voice::{SpeechEngine, SpeechEvent, SpeechParams, VoiceController};

/// Operator actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start navigating to a target, discarding any current session.
    Navigate(IncidentTarget),
    /// Report arrival.
    MarkArrived,
    /// Close the current session.
    Cancel,
    /// Switch position tracking on or off.
    SetTracking(bool),
    /// Flip position tracking.
    ToggleTracking,
    /// Flip voice guidance.
    ToggleVoice,
    /// Post a message to the control room.
    SendMessage(String),
    /// Release all resources and leave the loop.
    Shutdown,
}

/// Everything the engine reacts to.
#[derive(Debug)]
pub enum EngineEvent {
    /// A report from the position sensor.
    Position(PositionEvent),
    /// Progress from the speech engine.
    Speech(SpeechEvent),
    /// A route request completed.
    RouteResolved {
        /// The session that asked.
        ticket: RouteTicket,
        /// What the routing service said.
        result: Result<RouteResponse>,
    },
    /// A message send completed.
    MessageSent(Result<()>),
    /// An operator action.
    Command(Command),
}

/// What the engine publishes to its host.
#[derive(Debug, Clone)]
pub enum Output {
    /// A notice for the operator.
    Notice(Notice),
    /// The session after an event was applied.
    Snapshot(SessionSnapshot),
}

/// Sends operator commands to a running [`Navigator`].
#[derive(Debug, Clone)]
pub struct NavigatorHandle {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl NavigatorHandle {
    /// Queue a command.
    ///
    /// # Errors
    ///
    /// Returns an error if the navigator has stopped.
    pub fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(EngineEvent::Command(command))
            .map_err(|_| Error::internal("navigator has stopped"))
    }

    /// Start navigating to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the navigator has stopped.
    pub fn navigate(&self, target: IncidentTarget) -> Result<()> {
        self.send(Command::Navigate(target))
    }

    /// Report arrival.
    ///
    /// # Errors
    ///
    /// Returns an error if the navigator has stopped.
    pub fn mark_arrived(&self) -> Result<()> {
        self.send(Command::MarkArrived)
    }

    /// Close the current session.
    ///
    /// # Errors
    ///
    /// Returns an error if the navigator has stopped.
    pub fn cancel(&self) -> Result<()> {
        self.send(Command::Cancel)
    }

    /// Flip voice guidance.
    ///
    /// # Errors
    ///
    /// Returns an error if the navigator has stopped.
    pub fn toggle_voice(&self) -> Result<()> {
        self.send(Command::ToggleVoice)
    }

    /// Flip position tracking.
    ///
    /// # Errors
    ///
    /// Returns an error if the navigator has stopped.
    pub fn toggle_tracking(&self) -> Result<()> {
        self.send(Command::ToggleTracking)
    }

    /// Post a message to the control room.
    ///
    /// # Errors
    ///
    /// Returns an error if the navigator has stopped.
    pub fn send_message(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::SendMessage(text.into()))
    }

    /// Stop the navigator.
    ///
    /// # Errors
    ///
    /// Returns an error if the navigator has already stopped.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

/// Owns the device resources and drives navigation sessions.
#[derive(Debug)]
pub struct Navigator {
    settings: SessionSettings,
    venue: Arc<VenueTable>,
    service: Arc<dyn DispatchService>,
    position: PositionSource,
    voice: VoiceController,
    events: mpsc::UnboundedSender<EngineEvent>,
    outputs: mpsc::UnboundedSender<Output>,
    session: Option<NavigationSession>,
    next_session: SessionId,
    origin: Origin,
    responder_name: String,
}

impl Navigator {
    /// Create a navigator and the queue it consumes.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured origin is not in the venue table.
    pub fn new(
        config: &Config,
        venue: Arc<VenueTable>,
        service: Arc<dyn DispatchService>,
        sensor: Box<dyn PositionSensor>,
        speech: Box<dyn SpeechEngine>,
        outputs: mpsc::UnboundedSender<Output>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EngineEvent>)> {
        let (events, rx) = mpsc::unbounded_channel();

        let origin = venue
            .get(&config.venue.origin)
            .map(|l| Origin {
                name: l.name.clone(),
                position: l.coordinate,
            })
            .ok_or_else(|| Error::unresolved(config.venue.origin.as_str()))?;

        let position = PositionSource::new(
            sensor,
            WatchOptions::from(&config.tracking),
            events.clone(),
        );
        let voice = VoiceController::new(speech, SpeechParams::from(&config.voice), events.clone());

        let navigator = Self {
            settings: SessionSettings::from(config),
            venue,
            service,
            position,
            voice,
            events,
            outputs,
            session: None,
            next_session: SessionId::new(1),
            origin,
            responder_name: config.service.responder_name.clone(),
        };
        Ok((navigator, rx))
    }

    /// A handle for sending commands.
    #[must_use]
    pub fn handle(&self) -> NavigatorHandle {
        NavigatorHandle {
            tx: self.events.clone(),
        }
    }

    /// The current session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&NavigationSession> {
        self.session.as_ref()
    }

    /// The audio channel.
    #[must_use]
    pub fn voice(&self) -> &VoiceController {
        &self.voice
    }

    /// Whether the position sensor is subscribed.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.position.is_tracking()
    }

    /// Where the next session starts.
    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// The current session with engine-held toggles filled in.
    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.as_ref().map(|s| {
            let mut snapshot = s.snapshot();
            snapshot.voice_enabled = self.voice.is_enabled();
            snapshot.speaking = self.voice.is_speaking();
            snapshot
        })
    }

    /// Drain the queue until [`Command::Shutdown`].
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<EngineEvent>) {
        info!("Navigator started");
        while let Some(event) = events.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
        self.position.stop_tracking();
        self.voice.stop();
        info!("Navigator stopped");
    }

    /// Apply one event. Returns `false` once the navigator should stop.
    pub fn handle_event(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::Position(event) => self.on_position(event),
            EngineEvent::Speech(event) => self.voice.handle_event(&event),
            EngineEvent::RouteResolved { ticket, result } => self.on_route(ticket, result),
            EngineEvent::MessageSent(result) => {
                if let Err(e) = &result {
                    warn!(error = %e, "Message send failed");
                }
                self.notify(messaging::notice_for(&result));
            }
            EngineEvent::Command(Command::Shutdown) => {
                self.shutdown();
                return false;
            }
            EngineEvent::Command(command) => self.on_command(command),
        }
        self.publish();
        true
    }

    fn on_command(&mut self, command: Command) {
        debug!(?command, "Operator command");
        let result = match command {
            Command::Navigate(target) => {
                self.navigate(target);
                Ok(())
            }
            Command::MarkArrived => self.with_session("mark arrived", NavigationSession::mark_arrived),
            Command::Cancel => self.with_session("cancel", |s| Ok(s.cancel())),
            Command::SetTracking(enabled) => {
                self.with_session("change tracking", |s| s.set_tracking(enabled))
            }
            Command::ToggleTracking => {
                self.with_session("change tracking", NavigationSession::toggle_tracking)
            }
            Command::ToggleVoice => {
                let enabled = self.voice.toggle();
                self.notify(Notice::info(if enabled {
                    "Voice navigation enabled"
                } else {
                    "Voice navigation disabled"
                }));
                Ok(())
            }
            Command::SendMessage(text) => self.send_message(&text),
            Command::Shutdown => Ok(()),
        };

        if let Err(e) = result {
            warn!(error = %e, "Command rejected");
            self.notify(Notice::warning(e.to_string()));
        }
    }

    fn navigate(&mut self, target: IncidentTarget) {
        if let Some(old) = self.session.take() {
            if !old.state().is_terminal() {
                info!(session = %old.id(), state = %old.state(), "Discarding session");
            }
        }
        self.position.stop_tracking();
        self.voice.stop();

        let id = self.next_session;
        self.next_session = id.next();
        let mut session = NavigationSession::new(
            id,
            target,
            self.origin.clone(),
            self.settings.clone(),
            Arc::clone(&self.venue),
        );
        let effects = session.accept();
        self.session = Some(session);
        match effects {
            Ok(effects) => self.apply(effects),
            Err(e) => warn!(error = %e, "Fresh session refused accept"),
        }
    }

    fn with_session(
        &mut self,
        event: &'static str,
        op: impl FnOnce(&mut NavigationSession) -> Result<Vec<Effect>>,
    ) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(Error::InvalidTransition {
                from: "absent",
                event,
            });
        };
        let effects = op(session)?;
        self.apply(effects);
        Ok(())
    }

    fn on_position(&mut self, event: PositionEvent) {
        if !self.position.is_current(event.subscription) {
            trace!(subscription = %event.subscription, "Ignoring report from stale subscription");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let effects = match &event.report {
            PositionReport::Fix(position) => session.position_update(*position),
            PositionReport::Failed(failure) => session.sensor_error(failure),
        };
        self.apply(effects);
    }

    fn on_route(&mut self, ticket: RouteTicket, result: Result<RouteResponse>) {
        let Some(session) = self.session.as_mut() else {
            debug!(ticket = %ticket.session, "Route response with no session");
            return;
        };
        let effects = match result {
            Ok(response) => session.route_succeeded(ticket, response),
            Err(e) => session.route_failed(ticket, &e),
        };
        self.apply(effects);
    }

    fn send_message(&mut self, text: &str) -> Result<()> {
        let incident_id = self
            .session
            .as_ref()
            .and_then(|s| s.incident_id().map(ToString::to_string));
        let message = OutgoingMessage::new(self.responder_name.clone(), text, incident_id)?;

        let service = Arc::clone(&self.service);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = service.send_message(&message).await;
            if tx.send(EngineEvent::MessageSent(result)).is_err() {
                debug!("Navigator gone, dropping message result");
            }
        });
        Ok(())
    }

    fn request_route(&self, ticket: RouteTicket, request: RouteRequest) {
        let service = Arc::clone(&self.service);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = service.calculate_route(&request).await;
            if tx.send(EngineEvent::RouteResolved { ticket, result }).is_err() {
                debug!("Navigator gone, dropping route response");
            }
        });
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::RequestRoute(ticket, request) => self.request_route(ticket, request),
                Effect::StartTracking => {
                    if let Err(e) = self.position.start_tracking() {
                        if let Some(session) = self.session.as_mut() {
                            queue.extend(session.sensor_error(&SensorFailure::from(&e)));
                        }
                    }
                }
                Effect::StopTracking => self.position.stop_tracking(),
                Effect::Speak { text, interrupt } => {
                    self.voice.speak(&text, interrupt);
                }
                Effect::StopVoice => self.voice.stop(),
                Effect::SetVoiceEnabled(enabled) => self.voice.set_enabled(enabled),
                Effect::Notify(notice) => self.notify(notice),
            }
        }

        if let Some(session) = &self.session {
            if session.state() == SessionState::Arrived && self.origin.name != session.target_name()
            {
                self.origin = Origin {
                    name: session.target_name().to_string(),
                    position: session.target_location(),
                };
                debug!(origin = %self.origin.name, "Next session starts at the arrival point");
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(session) = self.session.as_mut() {
            let effects = session.cancel();
            self.apply(effects);
        }
        self.publish();
    }

    fn notify(&self, notice: Notice) {
        info!(level = ?notice.level, text = %notice.text, "Notice");
        if self.outputs.send(Output::Notice(notice)).is_err() {
            trace!("No listener for notices");
        }
    }

    fn publish(&self) {
        if let Some(snapshot) = self.snapshot() {
            if self.outputs.send(Output::Snapshot(snapshot)).is_err() {
                trace!("No listener for snapshots");
            }
        }
    }
}
