//! Operator messages to the control room.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::Notice;

/// Body posted to the messaging endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    /// Who is writing.
    pub sender: String,
    /// Message text.
    pub text: String,
    /// Incident the message is about.
    pub incident_id: Option<String>,
}

impl OutgoingMessage {
    /// Build a message. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is blank.
    pub fn new(
        sender: impl Into<String>,
        text: &str,
        incident_id: Option<String>,
    ) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }
        Ok(Self {
            sender: sender.into(),
            text: text.to_string(),
            incident_id,
        })
    }
}

/// Notice shown once a send completes.
#[must_use]
pub fn notice_for(result: &Result<()>) -> Notice {
    match result {
        Ok(()) => Notice::success("Message sent"),
        Err(_) => Notice::error("Failed to send"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::NoticeLevel;

    #[test]
    fn test_wire_shape() {
        let msg = OutgoingMessage::new("Responder", "On my way", Some("zone_1".to_string())).unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"sender": "Responder", "text": "On my way", "incidentId": "zone_1"})
        );
    }

    #[test]
    fn test_null_incident() {
        let msg = OutgoingMessage::new("Responder", "Status check", None).unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json["incidentId"].is_null());
    }

    #[test]
    fn test_blank_text_rejected() {
        assert!(matches!(
            OutgoingMessage::new("Responder", "   ", None),
            Err(Error::EmptyMessage)
        ));
        assert!(OutgoingMessage::new("Responder", "", None).is_err());
    }

    #[test]
    fn test_text_trimmed() {
        let msg = OutgoingMessage::new("Responder", "  hello \n", None).unwrap();
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn test_notice_for() {
        assert_eq!(notice_for(&Ok(())).text, "Message sent");
        let failed = notice_for(&Err(Error::network("messages", "down")));
        assert_eq!(failed.level, NoticeLevel::Error);
        assert_eq!(failed.text, "Failed to send");
    }
}
