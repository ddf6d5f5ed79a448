// src/geo/mod.rs
//! Reverse geocoding: coordinates in, normalized street address out.

pub mod anchors;
pub mod reverse;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::{ChainResolver, SourceAdapter};
use crate::config::GeoConfig;
use anchors::{CityAnchorTable, NearestCityFallback};
use reverse::ReverseGeocoder;

pub type AddressResolver = ChainResolver<Coordinates, AddressResult>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("latitude {0} is outside -90..90")]
    Latitude(f64),
    #[error("longitude {0} is outside -180..180")]
    Longitude(f64),
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::Latitude(lat));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::Longitude(lng));
        }
        Ok(Self { lat, lng })
    }
}

/// Normalized address. Unknown parts are empty strings, never null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressResult {
    pub street: String,
    pub number: String,
    pub city: String,
    pub zip: String,
    #[serde(rename = "fullAddress")]
    pub full_address: String,
}

impl AddressResult {
    pub fn city_only(city: String) -> Self {
        Self {
            full_address: city.clone(),
            city,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.street.is_empty() && self.number.is_empty() && self.city.is_empty() && self.zip.is_empty()
    }
}

/// `"<street> <number>, <city>"`, skipping empty parts.
pub fn compose_full_address(street: &str, number: &str, city: &str) -> String {
    let line = [street, number]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    [line.as_str(), city.trim()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the address chain: configured geocoders in order, then the anchor table.
pub fn build_resolver(
    cfg: &GeoConfig,
    client: &reqwest::Client,
    default_user_agent: &str,
) -> Result<AddressResolver> {
    let adapters = cfg
        .providers
        .iter()
        .map(|p| {
            Box::new(ReverseGeocoder::from_config(p, client.clone(), default_user_agent))
                as Box<dyn SourceAdapter<Coordinates, AddressResult>>
        })
        .collect();
    let table = CityAnchorTable::new(cfg.anchors.clone(), cfg.unresolved_city.clone());
    Ok(ChainResolver::new(
        "address",
        adapters,
        Box::new(NearestCityFallback::new(table)),
    ))
}
