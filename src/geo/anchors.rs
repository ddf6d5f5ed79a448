// src/geo/anchors.rs
//! Static nearest-city table used as the terminal step of the address chain.

use serde::{Deserialize, Serialize};

use super::{compose_full_address, AddressResult, Coordinates};
use crate::chain::TerminalFallback;

/// Returned when no anchor radius contains the point.
pub const UNRESOLVED_CITY: &str = "לא זוהה";

/// A known population center and its match radius, both in coordinate degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityAnchor {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
}

impl CityAnchor {
    pub fn new(name: &str, lat: f64, lng: f64, radius: f64) -> Self {
        Self {
            name: name.to_string(),
            lat,
            lng,
            radius,
        }
    }

    /// Euclidean distance in degree space (no projection).
    pub fn distance_to(&self, lat: f64, lng: f64) -> f64 {
        ((lat - self.lat).powi(2) + (lng - self.lng).powi(2)).sqrt()
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        self.distance_to(lat, lng) <= self.radius
    }
}

/// Built-in table. Order is priority: overlapping radii resolve to the earlier entry.
pub fn default_anchors() -> Vec<CityAnchor> {
    vec![
        CityAnchor::new("תל אביב", 32.0853, 34.7818, 0.1),
        CityAnchor::new("חיפה", 32.7940, 34.9896, 0.15),
        CityAnchor::new("ירושלים", 31.7683, 35.2137, 0.2),
        CityAnchor::new("ראשון לציון", 31.9730, 34.8066, 0.08),
        CityAnchor::new("פתח תקווה", 32.0878, 34.8878, 0.08),
        CityAnchor::new("נתניה", 32.3215, 34.8532, 0.1),
        CityAnchor::new("באר שבע", 31.2518, 34.7915, 0.15),
        CityAnchor::new("חולון", 32.0117, 34.7750, 0.06),
        CityAnchor::new("בני ברק", 32.0809, 34.8338, 0.05),
    ]
}

#[derive(Debug, Clone)]
pub struct CityAnchorTable {
    anchors: Vec<CityAnchor>,
    unresolved: String,
}

impl CityAnchorTable {
    pub fn new(anchors: Vec<CityAnchor>, unresolved: impl Into<String>) -> Self {
        Self {
            anchors,
            unresolved: unresolved.into(),
        }
    }

    /// First anchor in table order whose radius contains the point.
    /// Not a nearest-neighbour search.
    pub fn first_match(&self, lat: f64, lng: f64) -> Option<&CityAnchor> {
        self.anchors.iter().find(|a| a.contains(lat, lng))
    }

    /// City name for the point, or the unresolved sentinel.
    pub fn locate(&self, lat: f64, lng: f64) -> &str {
        self.first_match(lat, lng)
            .map(|a| a.name.as_str())
            .unwrap_or(&self.unresolved)
    }

    pub fn unresolved(&self) -> &str {
        &self.unresolved
    }
}

impl Default for CityAnchorTable {
    fn default() -> Self {
        Self::new(default_anchors(), UNRESOLVED_CITY)
    }
}

/// Terminal step: fills the city from the anchor table.
pub struct NearestCityFallback {
    table: CityAnchorTable,
}

impl NearestCityFallback {
    pub fn new(table: CityAnchorTable) -> Self {
        Self { table }
    }
}

impl TerminalFallback<Coordinates, AddressResult> for NearestCityFallback {
    fn name(&self) -> &str {
        "nearest-city"
    }

    fn resolve(&self, query: &Coordinates, partial: Option<AddressResult>) -> AddressResult {
        let city = self.table.locate(query.lat, query.lng).to_string();
        match partial {
            // Only the city is back-filled; populated fields stay as the geocoder gave them.
            // A composed full address is rebuilt with the city, a display string is kept.
            Some(mut addr) => {
                if addr.city.is_empty() {
                    let bare = compose_full_address(&addr.street, &addr.number, "");
                    let composed = addr.full_address.is_empty() || addr.full_address == bare;
                    addr.city = city;
                    if composed {
                        addr.full_address =
                            compose_full_address(&addr.street, &addr.number, &addr.city);
                    }
                }
                addr
            }
            None => AddressResult::city_only(city),
        }
    }
}
