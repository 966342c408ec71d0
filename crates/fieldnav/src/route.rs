//! Route plans built from routing service responses.
//!
//! The routing service answers with named path nodes and instruction text.
//! A [`RoutePlan`] resolves those names against the venue table and fills in
//! any summary values the service left out. Plans are immutable; requesting
//! a new route produces a new plan.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geo::{self, GeoCoordinate};
use crate::venue::VenueTable;

/// Body of a route calculation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Named start location.
    pub start: String,
    /// Named destination.
    pub end: String,
    /// Named locations to route around.
    pub avoid: Vec<String>,
}

impl RouteRequest {
    /// Create a route request.
    #[must_use]
    pub fn new(start: impl Into<String>, end: impl Into<String>, avoid: Vec<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            avoid,
        }
    }
}

/// Body of a route calculation response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    /// Named nodes in traversal order.
    pub path_nodes: Vec<String>,
    /// Turn-by-turn text.
    #[serde(default)]
    pub instructions: Vec<String>,
    /// Text to speak at each milestone.
    #[serde(default)]
    pub voice_instructions: Vec<String>,
    /// Total route length, if the service computed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_distance_meters: Option<f64>,
    /// Walking time, if the service computed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_minutes: Option<f64>,
}

/// A circular area the responder is advised to stay out of.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvoidZone {
    /// Venue location the zone surrounds.
    pub name: String,
    /// Centre of the circle.
    pub center: GeoCoordinate,
    /// Radius of the circle in meters.
    pub radius_m: f64,
}

impl AvoidZone {
    /// Resolve avoid-zone names against the venue table.
    ///
    /// Names that do not resolve are logged and skipped; avoid zones are
    /// advisory only.
    #[must_use]
    pub fn resolve_all(venue: &VenueTable, names: &[String], radius_m: f64) -> Vec<Self> {
        names
            .iter()
            .filter_map(|name| match venue.avoid_center(name) {
                Ok(center) => Some(Self {
                    name: venue.canonical_name(name).unwrap_or(name).to_string(),
                    center,
                    radius_m,
                }),
                Err(e) => {
                    warn!(error = %e, "Skipping avoid zone");
                    None
                }
            })
            .collect()
    }

    /// Check whether `position` lies inside the zone.
    #[must_use]
    pub fn contains(&self, position: GeoCoordinate) -> bool {
        geo::distance_meters(self.center, position) <= self.radius_m
    }
}

/// Session context needed to turn a response into a plan.
#[derive(Debug, Clone)]
pub struct PlanContext<'a> {
    /// Venue lookup table.
    pub venue: &'a VenueTable,
    /// Canonical name of the destination.
    pub target_name: &'a str,
    /// Resolved destination coordinate.
    pub target_location: GeoCoordinate,
    /// Where the session starts; substitutes for unknown node names.
    pub origin: GeoCoordinate,
    /// Advisory zones for this route.
    pub avoid_zones: Vec<AvoidZone>,
    /// Walking speed for derived estimates.
    pub walking_speed_kmh: f64,
}

/// An immutable, fully resolved route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePlan {
    waypoints: Vec<GeoCoordinate>,
    waypoint_names: Vec<String>,
    steps: Vec<String>,
    voice_steps: Vec<String>,
    avoid_zones: Vec<AvoidZone>,
    target_name: String,
    target_location: GeoCoordinate,
    origin: GeoCoordinate,
    total_distance_meters: f64,
    estimated_minutes: u64,
}

impl RoutePlan {
    /// Build a plan from a routing service response.
    ///
    /// The destination is taken from the context as already resolved by the
    /// caller. Unknown node names resolve to the context origin. Missing or
    /// unusable summary values are derived from the origin and target
    /// coordinates.
    #[must_use]
    pub fn build(response: RouteResponse, ctx: PlanContext<'_>) -> Self {
        let target_location = ctx.target_location;
        let waypoints: Vec<GeoCoordinate> = response
            .path_nodes
            .iter()
            .map(|node| ctx.venue.resolve_or(node, ctx.origin))
            .collect();
        let origin = waypoints.first().copied().unwrap_or(ctx.origin);

        let total_distance_meters = match response.total_distance_meters {
            Some(d) if d.is_finite() && d >= 0.0 => d,
            _ => geo::distance_meters(origin, target_location),
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let estimated_minutes = match response.estimated_time_minutes {
            Some(m) if m.is_finite() && m >= 0.0 => m.round() as u64,
            _ => geo::walking_minutes(total_distance_meters, ctx.walking_speed_kmh),
        };

        debug!(
            nodes = waypoints.len(),
            steps = response.instructions.len(),
            distance_m = total_distance_meters,
            minutes = estimated_minutes,
            "Built route plan"
        );

        Self {
            waypoints,
            waypoint_names: response.path_nodes,
            steps: response.instructions,
            voice_steps: response.voice_instructions,
            avoid_zones: ctx.avoid_zones,
            target_name: ctx.target_name.to_string(),
            target_location,
            origin,
            total_distance_meters,
            estimated_minutes,
        }
    }

    /// Waypoints in traversal order.
    #[must_use]
    pub fn waypoints(&self) -> &[GeoCoordinate] {
        &self.waypoints
    }

    /// Node names as returned by the routing service.
    #[must_use]
    pub fn waypoint_names(&self) -> &[String] {
        &self.waypoint_names
    }

    /// Turn-by-turn text.
    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Text to speak at each milestone.
    #[must_use]
    pub fn voice_steps(&self) -> &[String] {
        &self.voice_steps
    }

    /// Advisory zones.
    #[must_use]
    pub fn avoid_zones(&self) -> &[AvoidZone] {
        &self.avoid_zones
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

    /// First waypoint, or the session origin for an empty route.
    #[must_use]
    pub fn origin(&self) -> GeoCoordinate {
        self.origin
    }

    /// Route length in meters.
    #[must_use]
    pub fn total_distance_meters(&self) -> f64 {
        self.total_distance_meters
    }

    /// Walking time in whole minutes.
    #[must_use]
    pub fn estimated_minutes(&self) -> u64 {
        self.estimated_minutes
    }

    /// ETA label for the whole route.
    #[must_use]
    pub fn eta_label(&self) -> String {
        geo::format_minutes(self.estimated_minutes)
    }

    /// Whether there is a drawable route (two or more waypoints).
    #[must_use]
    pub fn has_route(&self) -> bool {
        self.waypoints.len() > 1
    }

    /// Coordinate marking the region of step `index`.
    ///
    /// Steps are index-aligned with waypoints; steps past the last waypoint
    /// belong to the target.
    #[must_use]
    pub fn step_anchor(&self, index: usize) -> GeoCoordinate {
        self.waypoints
            .get(index)
            .copied()
            .unwrap_or(self.target_location)
    }

    /// Voice text for step `index`, if any.
    #[must_use]
    pub fn voice_step(&self, index: usize) -> Option<&str> {
        self.voice_steps.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(nodes: &[&str]) -> RouteResponse {
        RouteResponse {
            path_nodes: nodes.iter().map(ToString::to_string).collect(),
            instructions: nodes.iter().map(|n| format!("Go to {n}")).collect(),
            voice_instructions: nodes.iter().map(|n| format!("Continue to {n}")).collect(),
            total_distance_meters: None,
            estimated_time_minutes: None,
        }
    }

    fn ctx<'a>(venue: &'a VenueTable, target: &'a str) -> PlanContext<'a> {
        let origin = venue.resolve("Entrance").unwrap();
        PlanContext {
            venue,
            target_name: target,
            target_location: venue.resolve_or(target, origin),
            origin,
            avoid_zones: Vec::new(),
            walking_speed_kmh: 5.0,
        }
    }

    #[test]
    fn test_request_serializes_wire_shape() {
        let req = RouteRequest::new("Entrance", "Main Stage", vec!["Food Court".to_string()]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"start": "Entrance", "end": "Main Stage", "avoid": ["Food Court"]})
        );
    }

    #[test]
    fn test_response_optional_fields() {
        let json = r#"{"path_nodes": ["Entrance", "Main Stage"]}"#;
        let resp: RouteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.path_nodes.len(), 2);
        assert!(resp.instructions.is_empty());
        assert!(resp.total_distance_meters.is_none());
    }

    #[test]
    fn test_build_uses_service_summary() {
        let venue = VenueTable::builtin().unwrap();
        let mut resp = response(&["Entrance", "Security Gate", "Main Stage"]);
        resp.total_distance_meters = Some(300.0);

        let plan = RoutePlan::build(resp, ctx(&venue, "Main Stage"));
        assert_eq!(plan.waypoints().len(), 3);
        assert_eq!(plan.total_distance_meters(), 300.0);
        assert_eq!(plan.estimated_minutes(), 4);
        assert_eq!(plan.eta_label(), "4 min");
        assert_eq!(plan.target_location(), venue.resolve("Main Stage").unwrap());
        assert!(plan.has_route());
    }

    #[test]
    fn test_build_prefers_service_minutes() {
        let venue = VenueTable::builtin().unwrap();
        let mut resp = response(&["Entrance", "Main Stage"]);
        resp.total_distance_meters = Some(800.0);
        resp.estimated_time_minutes = Some(10.0);

        let plan = RoutePlan::build(resp, ctx(&venue, "Main Stage"));
        assert_eq!(plan.estimated_minutes(), 10);
    }

    #[test]
    fn test_build_derives_missing_summary() {
        let venue = VenueTable::builtin().unwrap();
        let plan = RoutePlan::build(response(&["Entrance", "Main Stage"]), ctx(&venue, "Main Stage"));

        let expected = geo::distance_meters(
            venue.resolve("Entrance").unwrap(),
            venue.resolve("Main Stage").unwrap(),
        );
        assert_eq!(plan.total_distance_meters(), expected);
        assert_eq!(plan.estimated_minutes(), geo::walking_minutes(expected, 5.0));
    }

    #[test]
    fn test_build_rejects_negative_summary() {
        let venue = VenueTable::builtin().unwrap();
        let mut resp = response(&["Entrance", "Main Stage"]);
        resp.total_distance_meters = Some(-5.0);

        let plan = RoutePlan::build(resp, ctx(&venue, "Main Stage"));
        assert!(plan.total_distance_meters() > 0.0);
    }

    #[test]
    fn test_unknown_nodes_fall_back_to_origin() {
        let venue = VenueTable::builtin().unwrap();
        let plan = RoutePlan::build(
            response(&["Entrance", "Secret Tunnel", "Main Stage"]),
            ctx(&venue, "Main Stage"),
        );
        assert_eq!(plan.waypoints()[1], venue.resolve("Entrance").unwrap());
        assert_eq!(plan.waypoint_names()[1], "Secret Tunnel");
    }

    #[test]
    fn test_target_comes_from_context() {
        let venue = VenueTable::builtin().unwrap();
        let pinned = GeoCoordinate::new(12.9800, 77.6000);
        let plan = RoutePlan::build(
            response(&["Entrance", "Moon Base"]),
            PlanContext {
                target_location: pinned,
                ..ctx(&venue, "Moon Base")
            },
        );
        assert_eq!(plan.target_location(), pinned);
        assert_eq!(plan.waypoints()[1], venue.resolve("Entrance").unwrap());
    }

    #[test]
    fn test_empty_route() {
        let venue = VenueTable::builtin().unwrap();
        let plan = RoutePlan::build(RouteResponse::default(), ctx(&venue, "Main Stage"));
        assert!(!plan.has_route());
        assert_eq!(plan.origin(), venue.resolve("Entrance").unwrap());
        assert_eq!(plan.step_anchor(0), plan.target_location());
    }

    #[test]
    fn test_step_anchor_and_voice_step() {
        let venue = VenueTable::builtin().unwrap();
        let plan = RoutePlan::build(
            response(&["Entrance", "Security Gate", "Main Stage"]),
            ctx(&venue, "Main Stage"),
        );
        assert_eq!(plan.step_anchor(1), venue.resolve("Security Gate").unwrap());
        assert_eq!(plan.step_anchor(7), plan.target_location());
        assert_eq!(plan.voice_step(0), Some("Continue to Entrance"));
        assert_eq!(plan.voice_step(9), None);
    }

    #[test]
    fn test_avoid_zones_resolve() {
        let venue = VenueTable::builtin().unwrap();
        let zones = AvoidZone::resolve_all(
            &venue,
            &["food court".to_string(), "Nowhere".to_string()],
            200.0,
        );
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "Food Court");
        assert_eq!(zones[0].center, GeoCoordinate::new(12.9780, 77.5980));
        assert!(zones[0].contains(zones[0].center));
        assert!(!zones[0].contains(venue.resolve("Entrance").unwrap()));
    }
}
