//! Speech engine that writes utterances to the log.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{Error, Result};
use crate::voice::{SpeechEngine, SpeechParams, SpeechSink, UtteranceId};

/// Logs each utterance and holds the channel for as long as reading it
/// aloud would take.
#[derive(Debug)]
pub struct LogSpeechEngine {
    words_per_minute: u32,
    playing: Option<JoinHandle<()>>,
}

impl LogSpeechEngine {
    /// Create an engine reading at `words_per_minute` at normal rate.
    #[must_use]
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute,
            playing: None,
        }
    }

    /// How long `text` takes to read at `rate`.
    #[must_use]
    pub fn duration(&self, text: &str, rate: f32) -> Duration {
        let words = text.split_whitespace().count().max(1);
        let per_minute = f64::from(self.words_per_minute.max(1)) * f64::from(rate.max(0.1));
        #[allow(clippy::cast_precision_loss)]
        let seconds = words as f64 * 60.0 / per_minute;
        Duration::from_secs_f64(seconds)
    }
}

impl SpeechEngine for LogSpeechEngine {
    fn name(&self) -> &'static str {
        "log"
    }

    fn speak(
        &mut self,
        id: UtteranceId,
        text: &str,
        params: &SpeechParams,
        sink: SpeechSink,
    ) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| Error::internal(e.to_string()))?;
        self.cancel();

        let length = self.duration(text, params.rate);
        let text = text.to_string();
        self.playing = Some(runtime.spawn(async move {
            sink.started(id);
            info!(utterance = %id, "Voice: {text}");
            tokio::time::sleep(length).await;
            sink.finished(id);
        }));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.playing.take() {
            task.abort();
        }
    }
}

impl Drop for LogSpeechEngine {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::navigator::EngineEvent;
    use crate::voice::{SpeechEvent, VoiceController};

    #[test]
    fn test_duration_scales_with_rate() {
        let engine = LogSpeechEngine::new(120);
        assert_eq!(engine.duration("one two", 1.0), Duration::from_secs(1));
        assert!(engine.duration("one two", 0.5) > engine.duration("one two", 1.0));
        assert_eq!(engine.duration("", 1.0), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_reports_start_and_finish() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut voice = VoiceController::new(
            Box::new(LogSpeechEngine::new(6000)),
            SpeechParams::default(),
            tx,
        );
        voice.set_enabled(true);
        voice.speak("Turn left", true);

        let mut seen = Vec::new();
        while voice.current_text().is_some() {
            let Some(EngineEvent::Speech(event)) = rx.recv().await else {
                panic!("expected speech event");
            };
            voice.handle_event(&event);
            seen.push(event);
        }
        assert!(matches!(seen[0], SpeechEvent::Started(_)));
        assert!(matches!(seen[1], SpeechEvent::Finished(_)));
    }

    #[tokio::test]
    async fn test_cancel_silences() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = LogSpeechEngine::new(1);
        engine
            .speak(
                UtteranceId::new(1),
                "a very long announcement",
                &SpeechParams::default(),
                SpeechSink::new(tx),
            )
            .unwrap();
        tokio::task::yield_now().await;
        engine.cancel();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events
            .iter()
            .all(|e| !matches!(e, EngineEvent::Speech(SpeechEvent::Finished(_)))));
    }
}
