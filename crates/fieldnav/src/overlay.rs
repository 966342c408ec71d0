//! Map overlay model.
//!
//! A pure projection of a [`SessionSnapshot`] onto what a map view draws:
//! markers, the route polyline, circles and status badges. Rendering tiles
//! is left to the host.

use serde::Serialize;

use crate::geo::GeoCoordinate;
use crate::session::{SessionSnapshot, SessionState};
use crate::venue::VenueTable;

/// Initial zoom level of the map view.
pub const DEFAULT_ZOOM: u8 = 16;

/// Radius of the dot drawn on each waypoint.
pub const WAYPOINT_RADIUS_M: f64 = 30.0;

/// What a marker stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// The responder.
    CurrentLocation,
    /// The incident.
    Target,
}

/// A pin on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    /// What the marker stands for.
    pub kind: MarkerKind,
    /// Where it is.
    pub position: GeoCoordinate,
    /// Popup title.
    pub title: String,
    /// Popup detail.
    pub label: String,
}

/// What a circle stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircleKind {
    /// A route waypoint.
    Waypoint,
    /// An area to stay out of.
    AvoidZone,
}

/// A filled circle on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Circle {
    /// What the circle stands for.
    pub kind: CircleKind,
    /// Centre.
    pub center: GeoCoordinate,
    /// Radius in meters.
    pub radius_m: f64,
    /// Popup text.
    pub label: String,
}

/// Status chips shown over the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    /// Position tracking is live.
    GpsActive,
    /// Audio is playing.
    Speaking,
    /// Voice guidance is on but quiet.
    VoiceOn,
}

impl Badge {
    /// Display text.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::GpsActive => "GPS Active",
            Self::Speaking => "Speaking",
            Self::VoiceOn => "Voice On",
        }
    }
}

/// The turn-by-turn panel beside the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuidancePanel {
    /// Destination name.
    pub target_name: String,
    /// Current step text.
    pub step: Option<String>,
    /// One-based step number.
    pub step_number: usize,
    /// Total steps.
    pub step_count: usize,
    /// Distance left, whole meters.
    pub distance_label: Option<String>,
    /// ETA label.
    pub eta_label: Option<String>,
}

/// Everything the map view draws.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapOverlay {
    /// Where the view is centred.
    pub center: GeoCoordinate,
    /// Zoom level.
    pub zoom: u8,
    /// Pins.
    pub markers: Vec<Marker>,
    /// Route line, empty when there is no drawable route.
    pub polyline: Vec<GeoCoordinate>,
    /// Waypoint dots and avoid zones.
    pub circles: Vec<Circle>,
    /// Status chips.
    pub badges: Vec<Badge>,
    /// Turn-by-turn panel, present while a route is installed.
    pub guidance: Option<GuidancePanel>,
}

impl MapOverlay {
    /// The view before any session exists.
    #[must_use]
    pub fn empty(venue: &VenueTable) -> Self {
        Self {
            center: venue.default_location().coordinate,
            zoom: DEFAULT_ZOOM,
            markers: Vec::new(),
            polyline: Vec::new(),
            circles: Vec::new(),
            badges: Vec::new(),
            guidance: None,
        }
    }
}

/// Project a session snapshot onto the map.
#[must_use]
pub fn render(snapshot: &SessionSnapshot) -> MapOverlay {
    let mut circles = Vec::new();
    let mut polyline = Vec::new();
    let mut guidance = None;

    if let Some(plan) = &snapshot.plan {
        circles.extend(plan.avoid_zones().iter().map(|zone| Circle {
            kind: CircleKind::AvoidZone,
            center: zone.center,
            radius_m: zone.radius_m,
            label: "High Density Zone".to_string(),
        }));

        if plan.has_route() {
            polyline = plan.waypoints().to_vec();
            circles.extend(plan.waypoints().iter().enumerate().map(|(i, point)| Circle {
                kind: CircleKind::Waypoint,
                center: *point,
                radius_m: WAYPOINT_RADIUS_M,
                label: format!("Waypoint {}: {:.4}, {:.4}", i + 1, point.lat, point.lon),
            }));
        }

        guidance = Some(GuidancePanel {
            target_name: snapshot.target_name.clone(),
            step: snapshot.step_text.clone(),
            step_number: snapshot.current_step + 1,
            step_count: snapshot.step_count,
            distance_label: snapshot.distance_remaining_m.map(|d| format!("{d:.0} m")),
            eta_label: snapshot.eta_label.clone(),
        });
    }

    let markers = vec![
        Marker {
            kind: MarkerKind::CurrentLocation,
            position: snapshot.current_position,
            title: "Your Location".to_string(),
            label: snapshot.current_position.to_string(),
        },
        Marker {
            kind: MarkerKind::Target,
            position: snapshot.target_location,
            title: "Incident Location".to_string(),
            label: snapshot.target_location.to_string(),
        },
    ];

    let mut badges = Vec::new();
    if snapshot.tracking_enabled && snapshot.state == SessionState::Active {
        badges.push(Badge::GpsActive);
    }
    if snapshot.speaking {
        badges.push(Badge::Speaking);
    } else if snapshot.voice_enabled {
        badges.push(Badge::VoiceOn);
    }

    MapOverlay {
        center: snapshot.current_position,
        zoom: DEFAULT_ZOOM,
        markers,
        polyline,
        circles,
        badges,
        guidance,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::route::RouteResponse;
    use crate::session::{IncidentTarget, NavigationSession, Origin, SessionId, SessionSettings};

    fn session(nodes: &[&str]) -> NavigationSession {
        let venue = Arc::new(VenueTable::builtin().unwrap());
        let origin = Origin {
            name: "Entrance".to_string(),
            position: venue.resolve("Entrance").unwrap(),
        };
        let mut s = NavigationSession::new(
            SessionId::new(1),
            IncidentTarget::location("Main Stage"),
            origin,
            SessionSettings::default(),
            venue,
        );
        s.accept().unwrap();
        let ticket = s.ticket();
        s.route_succeeded(
            ticket,
            RouteResponse {
                path_nodes: nodes.iter().map(ToString::to_string).collect(),
                instructions: vec!["Walk north".to_string()],
                ..RouteResponse::default()
            },
        );
        s
    }

    #[test]
    fn test_empty_overlay_centres_on_entrance() {
        let venue = VenueTable::builtin().unwrap();
        let overlay = MapOverlay::empty(&venue);
        assert_eq!(overlay.center, GeoCoordinate::new(12.9716, 77.5946));
        assert_eq!(overlay.zoom, 16);
        assert!(overlay.markers.is_empty());
    }

    #[test]
    fn test_route_overlay() {
        let s = session(&["Entrance", "Security Gate", "Main Stage"]);
        let overlay = render(&s.snapshot());

        assert_eq!(overlay.polyline.len(), 3);
        let waypoints = overlay
            .circles
            .iter()
            .filter(|c| c.kind == CircleKind::Waypoint)
            .count();
        assert_eq!(waypoints, 3);

        let avoid: Vec<_> = overlay
            .circles
            .iter()
            .filter(|c| c.kind == CircleKind::AvoidZone)
            .collect();
        assert_eq!(avoid.len(), 1);
        assert_eq!(avoid[0].label, "High Density Zone");
        assert_eq!(avoid[0].radius_m, 200.0);
        assert_eq!(avoid[0].center, GeoCoordinate::new(12.9780, 77.5980));
    }

    #[test]
    fn test_single_waypoint_has_no_polyline() {
        let s = session(&["Entrance"]);
        let overlay = render(&s.snapshot());
        assert!(overlay.polyline.is_empty());
        assert!(overlay.circles.iter().all(|c| c.kind != CircleKind::Waypoint));
    }

    #[test]
    fn test_marker_labels() {
        let s = session(&["Entrance", "Main Stage"]);
        let overlay = render(&s.snapshot());
        assert_eq!(overlay.markers[0].label, "12.971600, 77.594600");
        assert_eq!(overlay.markers[1].kind, MarkerKind::Target);
        assert_eq!(overlay.markers[1].label, "12.974100, 77.596100");
    }

    #[test]
    fn test_badges() {
        let s = session(&["Entrance", "Main Stage"]);
        let mut snapshot = s.snapshot();
        snapshot.voice_enabled = true;
        assert_eq!(render(&snapshot).badges, vec![Badge::GpsActive, Badge::VoiceOn]);

        snapshot.speaking = true;
        snapshot.tracking_enabled = false;
        assert_eq!(render(&snapshot).badges, vec![Badge::Speaking]);
        assert_eq!(Badge::Speaking.label(), "Speaking");
    }

    #[test]
    fn test_guidance_panel() {
        let s = session(&["Entrance", "Main Stage"]);
        let guidance = render(&s.snapshot()).guidance.unwrap();
        assert_eq!(guidance.step.as_deref(), Some("Walk north"));
        assert_eq!(guidance.step_number, 1);
        assert_eq!(guidance.step_count, 1);
        assert!(guidance.distance_label.unwrap().ends_with(" m"));
    }

    #[test]
    fn test_requesting_has_no_guidance() {
        let venue = Arc::new(VenueTable::builtin().unwrap());
        let origin = Origin {
            name: "Entrance".to_string(),
            position: venue.resolve("Entrance").unwrap(),
        };
        let mut s = NavigationSession::new(
            SessionId::new(1),
            IncidentTarget::location("Backstage"),
            origin,
            SessionSettings::default(),
            venue,
        );
        s.accept().unwrap();
        let overlay = render(&s.snapshot());
        assert!(overlay.guidance.is_none());
        assert_eq!(overlay.markers.len(), 2);
    }
}
