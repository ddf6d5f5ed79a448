// src/fiber/mod.rs
//! Fiber availability: provider APIs and result pages in priority order,
//! then the metro-area heuristic.

pub mod heuristic;
pub mod json_api;
pub mod scrape;

use anyhow::Result;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::chain::{ChainResolver, SourceAdapter};
use crate::config::{FiberConfig, FiberProviderCfg};
use heuristic::MetroHeuristic;
use json_api::JsonApiAdapter;
use scrape::HtmlScrapeAdapter;

pub type FiberResolver = ChainResolver<FiberQuery, FiberResult>;

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiberQuery {
    /// Provider-facing address line.
    pub search_address: String,
    pub city: Option<String>,
}

impl FiberQuery {
    /// `None` when neither an address nor a city was given.
    pub fn from_parts(
        address: Option<&str>,
        city: Option<&str>,
        street: Option<&str>,
        number: Option<&str>,
    ) -> Option<Self> {
        let address = non_blank(address);
        let city = non_blank(city);
        if address.is_none() && city.is_none() {
            return None;
        }
        let search_address =
            format_search_address(address, city, non_blank(street), non_blank(number));
        Some(Self {
            search_address,
            city: city.map(str::to_string),
        })
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Street + city beat the free-text address; otherwise address, then city.
pub fn format_search_address(
    address: Option<&str>,
    city: Option<&str>,
    street: Option<&str>,
    number: Option<&str>,
) -> String {
    match (street, city) {
        (Some(street), Some(city)) => match number {
            Some(n) => format!("{street} {n}, {city}"),
            None => format!("{street}, {city}"),
        },
        _ => address.or(city).unwrap_or_default().to_string(),
    }
}

/// Substitute the percent-encoded address for `{address}` in a URL template.
pub fn fill_template(template: &str, address: &str) -> String {
    let encoded = utf8_percent_encode(address, COMPONENT).to_string();
    template.replace("{address}", &encoded)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiberResult {
    pub available: bool,
    /// Bandwidth label, empty when unknown.
    pub speed: String,
    pub message: String,
    /// Provider's own check page.
    pub link: String,
    pub checked: bool,
}

/// Build the fiber chain from config: providers in order, heuristic last.
pub fn build_resolver(
    cfg: &FiberConfig,
    client: &reqwest::Client,
    user_agent: &str,
) -> Result<FiberResolver> {
    let mut adapters: Vec<Box<dyn SourceAdapter<FiberQuery, FiberResult>>> =
        Vec::with_capacity(cfg.providers.len());
    for p in &cfg.providers {
        match p {
            FiberProviderCfg::JsonApi(c) => adapters.push(Box::new(JsonApiAdapter::from_config(
                c,
                client.clone(),
                user_agent,
            ))),
            FiberProviderCfg::HtmlScrape(c) => adapters.push(Box::new(
                HtmlScrapeAdapter::from_config(c, client.clone(), user_agent)?,
            )),
        }
    }
    Ok(ChainResolver::new(
        "fiber",
        adapters,
        Box::new(MetroHeuristic::from_config(&cfg.fallback)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn street_and_city_build_the_search_line() {
        let q = FiberQuery::from_parts(Some("ignored"), Some("חיפה"), Some("הרצל"), Some("12"))
            .unwrap();
        assert_eq!(q.search_address, "הרצל 12, חיפה");
        assert_eq!(q.city.as_deref(), Some("חיפה"));

        let no_number = FiberQuery::from_parts(None, Some("חיפה"), Some("הרצל"), None).unwrap();
        assert_eq!(no_number.search_address, "הרצל, חיפה");
    }

    #[test]
    fn address_then_city_when_street_missing() {
        let q = FiberQuery::from_parts(Some(" Dizengoff 50 "), None, None, Some("7")).unwrap();
        assert_eq!(q.search_address, "Dizengoff 50");
        assert!(q.city.is_none());

        let city_only = FiberQuery::from_parts(Some("  "), Some("נתניה"), None, None).unwrap();
        assert_eq!(city_only.search_address, "נתניה");
    }

    #[test]
    fn blank_address_and_city_is_rejected() {
        assert!(FiberQuery::from_parts(None, None, Some("Herzl"), Some("1")).is_none());
        assert!(FiberQuery::from_parts(Some(""), Some("   "), None, None).is_none());
    }

    #[test]
    fn template_encodes_like_uri_component() {
        assert_eq!(
            fill_template("https://x/?q={address}", "Dizengoff 50, TA"),
            "https://x/?q=Dizengoff%2050%2C%20TA"
        );
        assert_eq!(fill_template("https://x/", "a b"), "https://x/");
    }
}
