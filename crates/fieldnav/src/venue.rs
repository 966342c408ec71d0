//! Static venue coordinate table.
//!
//! The routing service speaks in named locations ("Entrance", "Main Stage").
//! This table resolves those names to coordinates and maps incident zones to
//! navigation targets. It is validated once when it is built.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{Error, Result};
use crate::geo::GeoCoordinate;

/// Name of the location used when a name cannot be resolved.
pub const DEFAULT_LOCATION: &str = "Entrance";

/// Target used for incident zones with no explicit mapping.
pub const DEFAULT_TARGET: &str = "Testing Region";

const LOCATIONS: &[(&str, [f64; 2])] = &[
    ("Entrance", [12.9716, 77.5946]),
    ("Security Gate", [12.9726, 77.5951]),
    ("Main Stage", [12.9741, 77.5961]),
    ("Food Court", [12.9731, 77.5956]),
    ("Parking", [12.9706, 77.5941]),
    ("Medical Bay", [12.9736, 77.5956]),
    ("Testing Region", [12.9746, 77.5951]),
    ("Backstage", [12.9751, 77.5966]),
    ("VIP Area", [12.9746, 77.5961]),
    ("Control Room", [12.9721, 77.5946]),
];

/// Avoid-zone circles are drawn at the crowd-density sensor position, which
/// is not always the routing node position.
const AVOID_CENTERS: &[(&str, [f64; 2])] = &[("Food Court", [12.9780, 77.5980])];

const ZONE_TARGETS: &[(&str, &str)] = &[
    ("testing", "Testing Region"),
    ("main-stage", "Main Stage"),
    ("food-court", "Food Court"),
    ("entrance-b", "Entrance"),
    ("parking-c", "Parking"),
    ("parking", "Parking"),
    ("backstage", "Backstage"),
    ("control-room", "Control Room"),
];

/// A named venue location.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueLocation {
    /// Canonical display name.
    pub name: String,
    /// Where the location is.
    pub coordinate: GeoCoordinate,
}

/// Lookup from canonical location names to coordinates.
#[derive(Debug, Clone)]
pub struct VenueTable {
    locations: Vec<VenueLocation>,
    index: HashMap<String, usize>,
    avoid_centers: HashMap<String, GeoCoordinate>,
    zone_targets: HashMap<String, String>,
    default_index: usize,
}

impl VenueTable {
    /// Build the table for the festival grounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in data fails validation.
    pub fn builtin() -> Result<Self> {
        Self::new(
            LOCATIONS
                .iter()
                .map(|&(name, c)| (name.to_string(), GeoCoordinate::from(c))),
            AVOID_CENTERS
                .iter()
                .map(|&(name, c)| (name.to_string(), GeoCoordinate::from(c))),
            ZONE_TARGETS
                .iter()
                .map(|&(zone, target)| (zone.to_string(), target.to_string())),
        )
    }

    /// Build and validate a venue table.
    ///
    /// Names are matched case-insensitively. The table must contain
    /// [`DEFAULT_LOCATION`] and [`DEFAULT_TARGET`], every coordinate must be
    /// valid, and every avoid centre and zone target must name a known location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VenueTable`] describing the first problem found.
    pub fn new(
        locations: impl IntoIterator<Item = (String, GeoCoordinate)>,
        avoid_centers: impl IntoIterator<Item = (String, GeoCoordinate)>,
        zone_targets: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let mut table = Vec::new();
        let mut index = HashMap::new();
        for (name, coordinate) in locations {
            let key = canonical_key(&name);
            if key.is_empty() {
                return Err(venue_error("location name cannot be empty"));
            }
            if !coordinate.is_valid() {
                return Err(venue_error(format!("{name} has invalid coordinate {coordinate}")));
            }
            if index.insert(key, table.len()).is_some() {
                return Err(venue_error(format!("duplicate location {name}")));
            }
            table.push(VenueLocation { name, coordinate });
        }

        let default_index = *index
            .get(&canonical_key(DEFAULT_LOCATION))
            .ok_or_else(|| venue_error(format!("missing default location {DEFAULT_LOCATION}")))?;
        if !index.contains_key(&canonical_key(DEFAULT_TARGET)) {
            return Err(venue_error(format!("missing default target {DEFAULT_TARGET}")));
        }

        let mut centers = HashMap::new();
        for (name, coordinate) in avoid_centers {
            let key = canonical_key(&name);
            if !index.contains_key(&key) {
                return Err(venue_error(format!("avoid centre for unknown location {name}")));
            }
            if !coordinate.is_valid() {
                return Err(venue_error(format!("avoid centre {name} is invalid")));
            }
            centers.insert(key, coordinate);
        }

        let mut targets = HashMap::new();
        for (zone, target) in zone_targets {
            let Some(&i) = index.get(&canonical_key(&target)) else {
                return Err(venue_error(format!("zone {zone} maps to unknown location {target}")));
            };
            targets.insert(zone.to_lowercase(), table[i].name.clone());
        }

        Ok(Self {
            locations: table,
            index,
            avoid_centers: centers,
            zone_targets: targets,
            default_index,
        })
    }

    /// Number of locations in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Check if the table is empty (never true for a validated table).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Iterate over all locations in table order.
    pub fn iter(&self) -> impl Iterator<Item = &VenueLocation> {
        self.locations.iter()
    }

    /// Look up a location by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&VenueLocation> {
        self.index
            .get(&canonical_key(name))
            .map(|&i| &self.locations[i])
    }

    /// The canonical spelling of `name`, if known.
    #[must_use]
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        self.get(name).map(|l| l.name.as_str())
    }

    /// Resolve a name to its coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedLocation`] if the name is unknown.
    pub fn resolve(&self, name: &str) -> Result<GeoCoordinate> {
        self.get(name)
            .map(|l| l.coordinate)
            .ok_or_else(|| Error::unresolved(name))
    }

    /// Resolve a name, substituting `fallback` when it is unknown.
    ///
    /// The substitution is logged rather than surfaced.
    #[must_use]
    pub fn resolve_or(&self, name: &str, fallback: GeoCoordinate) -> GeoCoordinate {
        match self.resolve(name) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, fallback = %fallback, "Using fallback coordinate");
                fallback
            }
        }
    }

    /// The documented default coordinate.
    #[must_use]
    pub fn default_location(&self) -> &VenueLocation {
        &self.locations[self.default_index]
    }

    /// Where to draw the avoid-zone circle for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedLocation`] if the name is unknown.
    pub fn avoid_center(&self, name: &str) -> Result<GeoCoordinate> {
        match self.avoid_centers.get(&canonical_key(name)) {
            Some(c) => Ok(*c),
            None => self.resolve(name),
        }
    }

    /// Navigation target for an incident zone slug.
    #[must_use]
    pub fn target_for_zone(&self, zone: &str) -> &str {
        self.zone_targets
            .get(&zone.to_lowercase())
            .map_or(DEFAULT_TARGET, String::as_str)
    }
}

/// Slug for a free-form location label, e.g. `"Main Stage"` -> `"main-stage"`.
#[must_use]
pub fn zone_slug(location: &str) -> String {
    location.trim().to_lowercase().replace(' ', "-")
}

fn canonical_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn venue_error(message: impl Into<String>) -> Error {
    Error::VenueTable {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> VenueTable {
        VenueTable::builtin().unwrap()
    }

    #[test]
    fn test_builtin_is_valid() {
        let t = table();
        assert_eq!(t.len(), LOCATIONS.len());
        assert!(!t.is_empty());
    }

    #[test]
    fn test_resolve_known() {
        let t = table();
        assert_eq!(t.resolve("Main Stage").unwrap(), GeoCoordinate::new(12.9741, 77.5961));
        assert_eq!(t.resolve("main stage").unwrap(), GeoCoordinate::new(12.9741, 77.5961));
        assert_eq!(t.canonical_name("  vip area "), Some("VIP Area"));
    }

    #[test]
    fn test_resolve_unknown() {
        let err = table().resolve("Moon Base").unwrap_err();
        assert!(matches!(err, Error::UnresolvedLocation { ref name } if name == "Moon Base"));
    }

    #[test]
    fn test_resolve_or_falls_back() {
        let t = table();
        let fallback = GeoCoordinate::new(1.0, 2.0);
        assert_eq!(t.resolve_or("Moon Base", fallback), fallback);
        assert_eq!(t.resolve_or("Parking", fallback), GeoCoordinate::new(12.9706, 77.5941));
    }

    #[test]
    fn test_default_location() {
        let t = table();
        assert_eq!(t.default_location().name, "Entrance");
    }

    #[test]
    fn test_avoid_center_override() {
        let t = table();
        assert_eq!(t.avoid_center("Food Court").unwrap(), GeoCoordinate::new(12.9780, 77.5980));
        assert_eq!(t.avoid_center("Backstage").unwrap(), t.resolve("Backstage").unwrap());
        assert!(t.avoid_center("Nowhere").is_err());
    }

    #[test]
    fn test_target_for_zone() {
        let t = table();
        assert_eq!(t.target_for_zone("main-stage"), "Main Stage");
        assert_eq!(t.target_for_zone("parking-c"), "Parking");
        assert_eq!(t.target_for_zone("entrance-b"), "Entrance");
        assert_eq!(t.target_for_zone("unknown-zone"), DEFAULT_TARGET);
    }

    #[test]
    fn test_zone_slug() {
        assert_eq!(zone_slug("Main Stage"), "main-stage");
        assert_eq!(zone_slug(" Control Room "), "control-room");
        assert_eq!(zone_slug("testing"), "testing");
    }

    #[test]
    fn test_new_rejects_duplicates() {
        let entry = ("Entrance".to_string(), GeoCoordinate::new(0.0, 0.0));
        let result = VenueTable::new(
            vec![entry.clone(), ("entrance".to_string(), entry.1)],
            Vec::new(),
            Vec::new(),
        );
        assert!(matches!(result, Err(Error::VenueTable { .. })));
    }

    #[test]
    fn test_new_rejects_missing_default() {
        let result = VenueTable::new(
            vec![("Testing Region".to_string(), GeoCoordinate::new(0.0, 0.0))],
            Vec::new(),
            Vec::new(),
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Entrance"));
    }

    #[test]
    fn test_new_rejects_invalid_coordinate() {
        let result = VenueTable::new(
            vec![
                ("Entrance".to_string(), GeoCoordinate::new(120.0, 0.0)),
                ("Testing Region".to_string(), GeoCoordinate::new(0.0, 0.0)),
            ],
            Vec::new(),
            Vec::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_new_rejects_unknown_zone_target() {
        let result = VenueTable::new(
            vec![
                ("Entrance".to_string(), GeoCoordinate::new(0.0, 0.0)),
                ("Testing Region".to_string(), GeoCoordinate::new(0.0, 0.1)),
            ],
            Vec::new(),
            vec![("stage".to_string(), "Main Stage".to_string())],
        );
        assert!(result.unwrap_err().to_string().contains("Main Stage"));
    }
}
