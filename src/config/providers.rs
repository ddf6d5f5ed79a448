// src/config/providers.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::geo::anchors::{default_anchors, CityAnchor, UNRESOLVED_CITY};

pub const ENV_CONFIG_PATH: &str = "FIBER_LOCATOR_CONFIG";
pub const ENV_STATIC_DIR: &str = "STATIC_DIR";
pub const DEFAULT_TOML_PATH: &str = "config/providers.toml";
pub const DEFAULT_JSON_PATH: &str = "config/providers.json";

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const BEZEQ_CHECK_PAGE: &str =
    "https://www.bezeq.co.il/internetandphone/internet/bfiber_addresscheck/";
const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 30;

/// Whole-service configuration: provider tables, anchor table, static dir.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Default User-Agent for outbound calls (adapters may override).
    pub user_agent: String,
    pub static_dir: String,
    pub fiber: FiberConfig,
    pub geo: GeoConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FiberConfig {
    /// Tried in this order; the metro heuristic always runs last.
    pub providers: Vec<FiberProviderCfg>,
    pub fallback: MetroFallbackCfg,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FiberProviderCfg {
    JsonApi(JsonApiCfg),
    HtmlScrape(HtmlScrapeCfg),
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonApiCfg {
    pub name: String,
    pub url: String,
    #[serde(default = "default_fiber_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default = "default_address_field")]
    pub address_field: String,
    /// Request field for the city; `None` means the city is not sent.
    #[serde(default)]
    pub city_field: Option<String>,
    #[serde(default = "default_available_field")]
    pub available_field: String,
    #[serde(default = "default_speed_field")]
    pub speed_field: String,
    #[serde(default = "default_message_field")]
    pub message_field: String,
    #[serde(default)]
    pub default_speed: String,
    #[serde(default)]
    pub default_message: String,
    /// Replaces whatever message the provider returns.
    #[serde(default)]
    pub fixed_message: Option<String>,
    /// `{address}` is replaced with the percent-encoded search address.
    pub link: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HtmlScrapeCfg {
    pub name: String,
    /// `{address}` is replaced with the percent-encoded search address.
    pub url: String,
    #[serde(default = "default_fiber_timeout")]
    pub timeout_secs: u64,
    pub positive_markers: Vec<String>,
    pub negative_markers: Vec<String>,
    /// Regex with one capture group holding the speed label.
    #[serde(default)]
    pub speed_pattern: Option<String>,
    #[serde(default)]
    pub available_speed: String,
    pub available_message: String,
    pub unavailable_message: String,
    pub link: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetroFallbackCfg {
    pub metro_cities: Vec<String>,
    pub available_speed: String,
    pub available_message: String,
    pub unavailable_message: String,
    pub link: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub providers: Vec<GeocoderCfg>,
    /// Table order is match priority.
    pub anchors: Vec<CityAnchor>,
    pub unresolved_city: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderCfg {
    pub name: String,
    pub url: String,
    #[serde(default = "default_geo_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_lat_param")]
    pub lat_param: String,
    #[serde(default = "default_lng_param")]
    pub lng_param: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default = "default_address_key")]
    pub address_key: String,
    pub street_fields: Vec<String>,
    pub number_fields: Vec<String>,
    pub city_fields: Vec<String>,
    pub zip_fields: Vec<String>,
    /// Top-level display string; composed from the parts when absent.
    #[serde(default)]
    pub display_field: Option<String>,
}

fn default_fiber_timeout() -> u64 {
    10
}
fn default_geo_timeout() -> u64 {
    5
}
fn default_address_field() -> String {
    "address".into()
}
fn default_available_field() -> String {
    "available".into()
}
fn default_speed_field() -> String {
    "speed".into()
}
fn default_message_field() -> String {
    "message".into()
}
fn default_lat_param() -> String {
    "lat".into()
}
fn default_lng_param() -> String {
    "lon".into()
}
fn default_address_key() -> String {
    "address".into()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_UA.to_string(),
            static_dir: "public".to_string(),
            fiber: FiberConfig::default(),
            geo: GeoConfig::default(),
        }
    }
}

impl Default for FiberConfig {
    fn default() -> Self {
        let bezeq_link = format!("{BEZEQ_CHECK_PAGE}?q={{address}}");
        Self {
            providers: vec![
                FiberProviderCfg::JsonApi(JsonApiCfg {
                    name: "bezeq-api".into(),
                    url: format!("{BEZEQ_CHECK_PAGE}api/check"),
                    timeout_secs: 10,
                    referer: Some(BEZEQ_CHECK_PAGE.into()),
                    address_field: default_address_field(),
                    city_field: Some("city".into()),
                    available_field: default_available_field(),
                    speed_field: default_speed_field(),
                    message_field: default_message_field(),
                    default_speed: "עד 1Gbps".into(),
                    default_message: "בדיקה הושלמה".into(),
                    fixed_message: None,
                    link: bezeq_link.clone(),
                }),
                FiberProviderCfg::HtmlScrape(HtmlScrapeCfg {
                    name: "bezeq-page".into(),
                    url: bezeq_link.clone(),
                    timeout_secs: 10,
                    positive_markers: strings(&["fiber-result-available", "זמין", "available"]),
                    negative_markers: strings(&[
                        "fiber-result-unavailable",
                        "לא זמין",
                        "אינו זמין",
                        "not available",
                        "unavailable",
                    ]),
                    speed_pattern: Some("מהירות: ([^<]+)<".into()),
                    available_speed: "עד 1Gbps".into(),
                    available_message: "סיבים זמינים באזור".into(),
                    unavailable_message: "סיבים לא זמינים כרגע".into(),
                    link: bezeq_link,
                }),
                FiberProviderCfg::JsonApi(JsonApiCfg {
                    name: "partner-api".into(),
                    url: "https://www.partner.co.il/api/fiber-check".into(),
                    timeout_secs: 8,
                    referer: None,
                    address_field: default_address_field(),
                    city_field: None,
                    available_field: default_available_field(),
                    speed_field: default_speed_field(),
                    message_field: default_message_field(),
                    default_speed: "עד 500Mbps".into(),
                    default_message: String::new(),
                    fixed_message: Some("נבדק דרך ספקים נוספים".into()),
                    link: "https://www.partner.co.il/internet/fiber".into(),
                }),
            ],
            fallback: MetroFallbackCfg::default(),
        }
    }
}

impl Default for MetroFallbackCfg {
    fn default() -> Self {
        Self {
            metro_cities: strings(&[
                "תל אביב",
                "חיפה",
                "ירושלים",
                "ראשון לציון",
                "פתח תקווה",
                "נתניה",
                "חולון",
                "בת ים",
            ]),
            available_speed: "עד 1Gbps".into(),
            available_message: "זמין ברוב האזורים בעיר".into(),
            unavailable_message: "יש לבדוק זמינות באתר הספק".into(),
            link: BEZEQ_CHECK_PAGE.into(),
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        let nominatim_params = [
            ("format", "json"),
            ("accept-language", "he,en"),
            ("addressdetails", "1"),
            ("zoom", "18"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            providers: vec![
                GeocoderCfg {
                    name: "israel-post".into(),
                    url: "https://api.israelpost.co.il/search/address/reverse".into(),
                    timeout_secs: 5,
                    user_agent: None,
                    lat_param: default_lat_param(),
                    lng_param: default_lng_param(),
                    params: BTreeMap::new(),
                    address_key: default_address_key(),
                    street_fields: strings(&["street"]),
                    number_fields: strings(&["house_number"]),
                    city_fields: strings(&["city"]),
                    zip_fields: strings(&["zipcode"]),
                    display_field: None,
                },
                GeocoderCfg {
                    name: "nominatim".into(),
                    url: "https://nominatim.openstreetmap.org/reverse".into(),
                    timeout_secs: 5,
                    user_agent: Some("CoordinateConverter/1.0".into()),
                    lat_param: default_lat_param(),
                    lng_param: default_lng_param(),
                    params: nominatim_params,
                    address_key: default_address_key(),
                    street_fields: strings(&["road", "pedestrian"]),
                    number_fields: strings(&["house_number"]),
                    city_fields: strings(&["city", "town", "village", "municipality"]),
                    zip_fields: strings(&["postcode"]),
                    display_field: Some("display_name".into()),
                },
            ],
            anchors: default_anchors(),
            unresolved_city: UNRESOLVED_CITY.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load from an explicit path. TOML or JSON, picked by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading provider config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = if ext == "json" {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        Ok(cfg.apply_env())
    }

    /// Load using env var + fallbacks:
    /// 1) $FIBER_LOCATOR_CONFIG
    /// 2) config/providers.toml
    /// 3) config/providers.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Ok(Self::default().apply_env())
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: ServiceConfig = toml::from_str(s).context("parsing provider config toml")?;
        Ok(cfg.sanitized())
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: ServiceConfig =
            serde_json::from_str(s).context("parsing provider config json")?;
        Ok(cfg.sanitized())
    }

    fn apply_env(mut self) -> Self {
        if let Ok(dir) = std::env::var(ENV_STATIC_DIR) {
            if !dir.trim().is_empty() {
                self.static_dir = dir;
            }
        }
        self
    }

    fn sanitized(mut self) -> Self {
        for p in &mut self.fiber.providers {
            match p {
                FiberProviderCfg::JsonApi(c) => c.timeout_secs = clamp_timeout(c.timeout_secs),
                FiberProviderCfg::HtmlScrape(c) => c.timeout_secs = clamp_timeout(c.timeout_secs),
            }
        }
        for g in &mut self.geo.providers {
            g.timeout_secs = clamp_timeout(g.timeout_secs);
        }
        self.geo.anchors.retain(|a| {
            a.lat.is_finite() && a.lng.is_finite() && a.radius.is_finite() && a.radius > 0.0
        });
        if self.geo.unresolved_city.trim().is_empty() {
            self.geo.unresolved_city = UNRESOLVED_CITY.to_string();
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = BROWSER_UA.to_string();
        }
        self
    }
}

fn clamp_timeout(secs: u64) -> u64 {
    secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_provider_priority() {
        let cfg = ServiceConfig::default();
        let names: Vec<&str> = cfg
            .fiber
            .providers
            .iter()
            .map(|p| match p {
                FiberProviderCfg::JsonApi(c) => c.name.as_str(),
                FiberProviderCfg::HtmlScrape(c) => c.name.as_str(),
            })
            .collect();
        assert_eq!(names, vec!["bezeq-api", "bezeq-page", "partner-api"]);
        assert_eq!(cfg.geo.providers[0].name, "israel-post");
        assert_eq!(cfg.geo.providers[1].name, "nominatim");
        assert_eq!(cfg.geo.anchors.len(), 9);
    }

    #[test]
    fn toml_overrides_and_sanitizes() {
        let toml = r#"
user_agent = ""

[[fiber.providers]]
kind = "json_api"
name = "only"
url = "http://localhost/check"
timeout_secs = 120
link = "http://localhost/?q={address}"

[geo]
unresolved_city = " "
anchors = [
  { name = "A", lat = 1.0, lng = 1.0, radius = 0.5 },
  { name = "Broken", lat = 1.0, lng = 1.0, radius = 0.0 },
]
"#;
        let cfg = ServiceConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.fiber.providers.len(), 1);
        match &cfg.fiber.providers[0] {
            FiberProviderCfg::JsonApi(c) => {
                assert_eq!(c.timeout_secs, MAX_TIMEOUT_SECS);
                assert_eq!(c.available_field, "available");
                assert!(c.city_field.is_none());
            }
            other => panic!("unexpected provider: {other:?}"),
        }
        assert_eq!(cfg.geo.anchors.len(), 1);
        assert_eq!(cfg.geo.unresolved_city, UNRESOLVED_CITY);
        assert_eq!(cfg.user_agent, BROWSER_UA);
        // untouched sections keep their defaults
        assert_eq!(cfg.fiber.fallback.metro_cities.len(), 8);
        assert!(cfg.geo.providers.len() == 2);
    }
}
