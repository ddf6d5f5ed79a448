use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use thiserror::Error;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;

use crate::config::ServiceConfig;
use crate::fiber::{self, FiberQuery, FiberResolver};
use crate::geo::{self, AddressResolver, CoordinateError, Coordinates};

/// Name of the chain step that produced the response body.
pub const RESOLVED_BY: HeaderName = HeaderName::from_static("x-resolved-by");

#[derive(Clone)]
pub struct AppState {
    pub fiber: Arc<FiberResolver>,
    pub address: Arc<AddressResolver>,
    static_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(fiber: FiberResolver, address: AddressResolver) -> Self {
        Self {
            fiber: Arc::new(fiber),
            address: Arc::new(address),
            static_dir: None,
        }
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    /// Build both chains from config around one shared HTTP client.
    pub fn from_config(cfg: &ServiceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .connect_timeout(Duration::from_secs(4))
            .build()?;
        let fiber = fiber::build_resolver(&cfg.fiber, &client, &cfg.user_agent)?;
        let address = geo::build_resolver(&cfg.geo, &client, &cfg.user_agent)?;
        Ok(Self::new(fiber, address).with_static_dir(&cfg.static_dir))
    }
}

pub fn router(state: AppState) -> Router {
    let mut r = Router::new()
        .route("/health", get(|| async { "Server is healthy" }))
        .route("/check-fiber", post(check_fiber))
        .route("/get-address", post(get_address));
    if let Some(dir) = &state.static_dir {
        // `/` serves index.html from the same directory
        r = r.fallback_service(ServeDir::new(dir));
    }
    r.layer(CorsLayer::very_permissive()).with_state(state)
}

/// Client errors. Every variant maps to 400; the resolvers themselves cannot fail.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Missing(&'static str),

    #[error("Invalid coordinates")]
    Coordinates(#[from] CoordinateError),

    #[error("Invalid JSON body")]
    Body(#[from] JsonRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::Missing(_) => json!({ "error": self.to_string() }),
            ApiError::Coordinates(e) => {
                json!({ "error": self.to_string(), "details": e.to_string() })
            }
            ApiError::Body(r) => json!({ "error": self.to_string(), "details": r.body_text() }),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CheckFiberReq {
    #[serde(deserialize_with = "opt_text")]
    address: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    city: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    street: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GetAddressReq {
    #[serde(deserialize_with = "opt_coord")]
    lat: Option<f64>,
    #[serde(deserialize_with = "opt_coord")]
    lng: Option<f64>,
}

// House numbers often arrive as JSON numbers.
fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

// Form-backed clients send coordinates as strings.
fn opt_coord<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

async fn check_fiber(
    State(state): State<AppState>,
    payload: Result<Json<CheckFiberReq>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let query = FiberQuery::from_parts(
        req.address.as_deref(),
        req.city.as_deref(),
        req.street.as_deref(),
        req.number.as_deref(),
    )
    .ok_or(ApiError::Missing("Address or city is required"))?;

    let res = state.fiber.resolve(&query).await;
    // Never log raw addresses. Only hashed id.
    info!(
        target: "fiber",
        id = %anon_hash(&query.search_address),
        source = %res.source,
        terminal = res.terminal,
        available = res.value.available,
        "fiber check resolved"
    );
    Ok(with_source(&res.source, Json(res.value)))
}

async fn get_address(
    State(state): State<AppState>,
    payload: Result<Json<GetAddressReq>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let (Some(lat), Some(lng)) = (req.lat, req.lng) else {
        return Err(ApiError::Missing("Latitude and longitude are required"));
    };
    let coords = Coordinates::new(lat, lng)?;

    let res = state.address.resolve(&coords).await;
    info!(
        target: "geo",
        source = %res.source,
        terminal = res.terminal,
        has_street = !res.value.street.is_empty(),
        "address resolved"
    );
    Ok(with_source(&res.source, Json(res.value)))
}

fn with_source(source: &str, body: impl IntoResponse) -> Response {
    let mut resp = body.into_response();
    if let Ok(v) = HeaderValue::from_str(source) {
        resp.headers_mut().insert(RESOLVED_BY, v);
    }
    resp
}

/// Log id for a search address: the first 6 bytes of its SHA-256, hex encoded.
pub(crate) fn anon_hash(address: &str) -> String {
    use sha2::{Digest, Sha256};
    Sha256::digest(address.as_bytes())[..6]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_hash_is_stable_and_short() {
        let a = anon_hash("Dizengoff 50");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash("Dizengoff 50"));
        assert_ne!(a, anon_hash("Dizengoff 51"));
    }

    #[test]
    fn request_fields_accept_numbers_and_strings() {
        let req: CheckFiberReq =
            serde_json::from_str(r#"{"street":"Herzl","number":12,"city":null}"#).unwrap();
        assert_eq!(req.number.as_deref(), Some("12"));
        assert!(req.city.is_none());
        assert!(req.address.is_none());

        let coords: GetAddressReq =
            serde_json::from_str(r#"{"lat":"32.08","lng":34.78}"#).unwrap();
        assert_eq!(coords.lat, Some(32.08));
        assert_eq!(coords.lng, Some(34.78));

        let junk: GetAddressReq = serde_json::from_str(r#"{"lat":"north"}"#).unwrap();
        assert!(junk.lat.is_none() && junk.lng.is_none());
    }
}
