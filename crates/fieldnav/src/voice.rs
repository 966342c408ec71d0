//! Spoken guidance on a single audio channel.
//!
//! A [`SpeechEngine`] is the platform text-to-speech capability. It reports
//! utterance progress as typed [`SpeechEvent`]s through a [`SpeechSink`].
//! [`VoiceController`] owns the engine and serializes utterances so that two
//! never play at once.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::VoiceConfig;
use crate::error::Result;
use crate::navigator::EngineEvent;

/// Identifies one utterance handed to the speech engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtteranceId(u64);

impl UtteranceId {
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

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "utterance-{}", self.0)
    }
}

/// Voice parameters passed with every utterance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechParams {
    /// Speaking rate, 1.0 is normal.
    pub rate: f32,
    /// Voice pitch, 1.0 is normal.
    pub pitch: f32,
    /// Volume between 0.0 and 1.0.
    pub volume: f32,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self::from(&VoiceConfig::default())
    }
}

impl From<&VoiceConfig> for SpeechParams {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            rate: config.rate,
            pitch: config.pitch,
            volume: config.volume,
        }
    }
}

/// Progress reported by the speech engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Audio for the utterance started.
    Started(UtteranceId),
    /// The utterance played to the end.
    Finished(UtteranceId),
    /// The utterance could not be played.
    Failed {
        /// The utterance that failed.
        id: UtteranceId,
        /// Engine detail.
        message: String,
    },
}

impl SpeechEvent {
    /// The utterance this event is about.
    #[must_use]
    pub fn id(&self) -> UtteranceId {
        match self {
            Self::Started(id) | Self::Finished(id) | Self::Failed { id, .. } => *id,
        }
    }
}

/// Where a speech engine reports utterance progress.
#[derive(Debug, Clone)]
pub struct SpeechSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl SpeechSink {
    /// Create a sink feeding the engine queue.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    /// Report that audio started.
    pub fn started(&self, id: UtteranceId) -> bool {
        self.send(SpeechEvent::Started(id))
    }

    /// Report that the utterance finished.
    pub fn finished(&self, id: UtteranceId) -> bool {
        self.send(SpeechEvent::Finished(id))
    }

    /// Report that the utterance failed.
    pub fn failed(&self, id: UtteranceId, message: impl Into<String>) -> bool {
        self.send(SpeechEvent::Failed {
            id,
            message: message.into(),
        })
    }

    fn send(&self, event: SpeechEvent) -> bool {
        self.tx.send(EngineEvent::Speech(event)).is_ok()
    }
}

/// A platform text-to-speech capability.
///
/// The engine plays at most one utterance; `cancel` silences it. Events for
/// a cancelled utterance may still arrive and are ignored by the controller.
pub trait SpeechEngine: Send + fmt::Debug {
    /// The name of this engine (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Start speaking `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses the utterance.
    fn speak(
        &mut self,
        id: UtteranceId,
        text: &str,
        params: &SpeechParams,
        sink: SpeechSink,
    ) -> Result<()>;

    /// Silence the current utterance, if any.
    fn cancel(&mut self);
}

#[derive(Debug)]
struct Utterance {
    id: UtteranceId,
    text: String,
}

/// Owns the audio channel.
///
/// Holds at most one playing and one pending utterance. Disabled
/// controllers drop every `speak` call.
#[derive(Debug)]
pub struct VoiceController {
    engine: Box<dyn SpeechEngine>,
    params: SpeechParams,
    sink: SpeechSink,
    enabled: bool,
    current: Option<Utterance>,
    pending: Option<String>,
    speaking: bool,
    next_id: u64,
}

impl VoiceController {
    /// Wrap a speech engine. The controller starts disabled.
    #[must_use]
    pub fn new(
        engine: Box<dyn SpeechEngine>,
        params: SpeechParams,
        tx: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            engine,
            params,
            sink: SpeechSink::new(tx),
            enabled: false,
            current: None,
            pending: None,
            speaking: false,
            next_id: 1,
        }
    }

    /// Speak `text`.
    ///
    /// With `interrupt_current` the playing utterance is cancelled first and
    /// any waiting text is discarded. Otherwise the text waits for it to
    /// finish, replacing any text that was already waiting. Returns `false`
    /// when the text was dropped.
    pub fn speak(&mut self, text: &str, interrupt_current: bool) -> bool {
        if !self.enabled {
            debug!("Voice disabled, dropping utterance");
            return false;
        }

        if self.current.is_some() && !interrupt_current {
            self.pending = Some(text.to_string());
            return true;
        }
        if interrupt_current {
            self.pending = None;
            self.silence();
        }
        self.start(text.to_string())
    }

    /// Silence the channel and forget any waiting text. Safe to call when idle.
    pub fn stop(&mut self) {
        self.pending = None;
        self.silence();
    }

    /// Enable or disable the controller. Disabling stops playback.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        debug!(engine = self.engine.name(), enabled, "Voice toggled");
        if !enabled {
            self.stop();
        }
    }

    /// Flip the enabled flag and return the new value.
    pub fn toggle(&mut self) -> bool {
        self.set_enabled(!self.enabled);
        self.enabled
    }

    /// Whether the controller accepts utterances.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether audio is currently playing.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Text of the utterance that owns the channel.
    #[must_use]
    pub fn current_text(&self) -> Option<&str> {
        self.current.as_ref().map(|u| u.text.as_str())
    }

    /// Text waiting for the channel.
    #[must_use]
    pub fn pending_text(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Apply engine progress. Events for utterances that no longer own the
    /// channel are ignored.
    pub fn handle_event(&mut self, event: &SpeechEvent) {
        let Some(current) = &self.current else {
            return;
        };
        if current.id != event.id() {
            debug!(utterance = %event.id(), "Ignoring stale speech event");
            return;
        }

        match event {
            SpeechEvent::Started(_) => self.speaking = true,
            SpeechEvent::Finished(_) => self.advance(),
            SpeechEvent::Failed { message, .. } => {
                warn!(engine = self.engine.name(), error = %message, "Utterance failed");
                self.advance();
            }
        }
    }

    fn advance(&mut self) {
        self.current = None;
        self.speaking = false;
        if let Some(text) = self.pending.take() {
            self.start(text);
        }
    }

    fn start(&mut self, text: String) -> bool {
        let id = UtteranceId(self.next_id);
        self.next_id += 1;

        match self
            .engine
            .speak(id, &text, &self.params, self.sink.clone())
        {
            Ok(()) => {
                debug!(engine = self.engine.name(), utterance = %id, text = %text, "Speaking");
                self.current = Some(Utterance { id, text });
                true
            }
            Err(e) => {
                warn!(engine = self.engine.name(), error = %e, "Speech engine refused utterance");
                false
            }
        }
    }

    fn silence(&mut self) {
        if self.current.take().is_some() {
            self.engine.cancel();
        }
        self.speaking = false;
    }
}

impl Drop for VoiceController {
    fn drop(&mut self) {
        self.stop();
    }
}
