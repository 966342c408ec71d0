//! Error types for fieldnav.
//!
//! This module defines all error types used throughout the fieldnav crate,
//! providing detailed context for debugging and operator-facing messages.

use thiserror::Error;

/// The main error type for fieldnav operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Sensor Errors ===
    /// The operator denied access to the location sensor.
    #[error("location permission denied")]
    SensorPermissionDenied,

    /// The location sensor could not produce a fix.
    #[error("location unavailable: {message}")]
    SensorUnavailable {
        /// Description reported by the sensor.
        message: String,
    },

    /// The location sensor did not produce a fix in time.
    #[error("location request timed out")]
    SensorTimeout,

    /// The location sensor failed for an unclassified reason.
    #[error("location sensor error: {message}")]
    SensorUnknown {
        /// Description reported by the sensor.
        message: String,
    },

    // === Dispatch Service Errors ===
    /// The dispatch service could not be reached.
    #[error("{endpoint} unreachable: {message}")]
    NetworkUnreachable {
        /// Endpoint that was being called.
        endpoint: &'static str,
        /// Description of the transport failure.
        message: String,
    },

    /// The dispatch service answered with an error.
    #[error("{endpoint} returned {status}: {message}")]
    ServiceError {
        /// Endpoint that was being called.
        endpoint: &'static str,
        /// HTTP status code, or 0 when the body was unusable.
        status: u16,
        /// Description of the failure.
        message: String,
    },

    // === Venue Errors ===
    /// A location name has no entry in the venue table.
    #[error("unresolved location: {name}")]
    UnresolvedLocation {
        /// The name that could not be resolved.
        name: String,
    },

    /// The static venue table failed validation.
    #[error("invalid venue table: {message}")]
    VenueTable {
        /// Description of the validation failure.
        message: String,
    },

    // === Session Errors ===
    /// An operator action is not valid in the current session state.
    #[error("cannot {event} while session is {from}")]
    InvalidTransition {
        /// The state the session was in.
        from: &'static str,
        /// The action that was attempted.
        event: &'static str,
    },

    // === Messaging Errors ===
    /// An operator message had no text.
    #[error("message text cannot be empty")]
    EmptyMessage,

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for fieldnav operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new network error.
    #[must_use]
    pub fn network(endpoint: &'static str, message: impl Into<String>) -> Self {
        Self::NetworkUnreachable {
            endpoint,
            message: message.into(),
        }
    }

    /// Create a new service error.
    #[must_use]
    pub fn service(endpoint: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self::ServiceError {
            endpoint,
            status,
            message: message.into(),
        }
    }

    /// Create an unresolved location error.
    #[must_use]
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::UnresolvedLocation { name: name.into() }
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if the operation may succeed when explicitly retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnreachable { .. } | Self::ServiceError { .. }
        )
    }

    /// Check if this error came from the location sensor.
    #[must_use]
    pub fn is_sensor_error(&self) -> bool {
        matches!(
            self,
            Self::SensorPermissionDenied
                | Self::SensorUnavailable { .. }
                | Self::SensorTimeout
                | Self::SensorUnknown { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::SensorPermissionDenied;
        assert_eq!(err.to_string(), "location permission denied");

        let err = Error::internal("test error");
        assert_eq!(err.to_string(), "internal error: test error");
    }

    #[test]
    fn test_network_error_display() {
        let err = Error::network("route", "connection refused");
        assert_eq!(err.to_string(), "route unreachable: connection refused");
    }

    #[test]
    fn test_service_error_display() {
        let err = Error::service("route", 404, "No path found");
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("No path found"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::network("route", "down").is_retryable());
        assert!(Error::service("route", 500, "boom").is_retryable());
        assert!(!Error::SensorTimeout.is_retryable());
        assert!(!Error::unresolved("Nowhere").is_retryable());
    }

    #[test]
    fn test_is_sensor_error() {
        assert!(Error::SensorPermissionDenied.is_sensor_error());
        assert!(Error::SensorTimeout.is_sensor_error());
        assert!(Error::SensorUnavailable {
            message: "no fix".to_string()
        }
        .is_sensor_error());
        assert!(!Error::network("route", "down").is_sensor_error());
    }

    #[test]
    fn test_unresolved_display() {
        let err = Error::unresolved("Moon Base");
        assert_eq!(err.to_string(), "unresolved location: Moon Base");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = Error::InvalidTransition {
            from: "idle",
            event: "cancel",
        };
        assert_eq!(err.to_string(), "cannot cancel while session is idle");
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::config("arrival_radius_m must be greater than 0");
        assert!(err.to_string().contains("arrival_radius_m"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }
}
