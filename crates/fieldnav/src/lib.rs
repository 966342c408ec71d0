//! `fieldnav` - live navigation engine for crowd-safety field responders
//!
//! Takes a route from the control-room routing service and turns it into a
//! voice-guided session that follows the responder's position until they
//! reach the incident.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod geo;
pub mod incidents;
pub mod logging;
pub mod messaging;
pub mod navigator;
pub mod overlay;
pub mod platform;
pub mod position;
pub mod route;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod venue;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use geo::{distance_meters, estimate_minutes, GeoCoordinate};
pub use logging::init_logging;
pub use navigator::{Command, EngineEvent, Navigator, NavigatorHandle, Output};
pub use route::{RoutePlan, RouteRequest, RouteResponse};
pub use service::{DispatchService, HttpDispatchService};
pub use session::{
    Effect, IncidentTarget, NavigationSession, Notice, NoticeLevel, SessionSnapshot, SessionState,
};
pub use venue::VenueTable;
