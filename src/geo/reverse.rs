// src/geo/reverse.rs
//! Remote reverse geocoder. One adapter shape covers every configured service;
//! the services differ only in URL, query params and response field names.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{compose_full_address, AddressResult, Coordinates};
use crate::chain::{AdapterError, Attempt, SourceAdapter};
use crate::config::GeocoderCfg;

/// Prioritized response keys per address part. First non-empty candidate wins,
/// independently for each part.
#[derive(Debug, Clone)]
pub struct FieldPriority {
    pub address_key: String,
    pub street: Vec<String>,
    pub number: Vec<String>,
    pub city: Vec<String>,
    pub zip: Vec<String>,
    pub display: Option<String>,
}

impl FieldPriority {
    fn from_config(cfg: &GeocoderCfg) -> Self {
        Self {
            address_key: cfg.address_key.clone(),
            street: cfg.street_fields.clone(),
            number: cfg.number_fields.clone(),
            city: cfg.city_fields.clone(),
            zip: cfg.zip_fields.clone(),
            display: cfg.display_field.clone(),
        }
    }

    /// Map a service response onto the common address shape.
    pub fn extract(&self, body: &Value) -> Result<AddressResult, AdapterError> {
        let address = body
            .get(&self.address_key)
            .filter(|v| v.is_object())
            .ok_or_else(|| {
                AdapterError::Malformed(format!("missing `{}` object", self.address_key))
            })?;

        let street = first_non_empty(address, &self.street);
        let number = first_non_empty(address, &self.number);
        let city = first_non_empty(address, &self.city);
        let zip = first_non_empty(address, &self.zip);

        let display = self
            .display
            .as_deref()
            .and_then(|k| body.get(k))
            .and_then(scalar_to_string)
            .unwrap_or_default();
        let full_address = if display.is_empty() {
            compose_full_address(&street, &number, &city)
        } else {
            display
        };

        Ok(AddressResult {
            street,
            number,
            city,
            zip,
            full_address,
        })
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_non_empty(obj: &Value, keys: &[String]) -> String {
    keys.iter()
        .filter_map(|k| obj.get(k).and_then(scalar_to_string))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

pub struct ReverseGeocoder {
    name: String,
    url: String,
    timeout: Duration,
    user_agent: String,
    lat_param: String,
    lng_param: String,
    params: Vec<(String, String)>,
    fields: FieldPriority,
    client: reqwest::Client,
}

impl ReverseGeocoder {
    pub fn from_config(
        cfg: &GeocoderCfg,
        client: reqwest::Client,
        default_user_agent: &str,
    ) -> Self {
        Self {
            name: cfg.name.clone(),
            url: cfg.url.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            user_agent: cfg
                .user_agent
                .clone()
                .unwrap_or_else(|| default_user_agent.to_string()),
            lat_param: cfg.lat_param.clone(),
            lng_param: cfg.lng_param.clone(),
            params: cfg.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            fields: FieldPriority::from_config(cfg),
            client,
        }
    }
}

#[async_trait]
impl SourceAdapter<Coordinates, AddressResult> for ReverseGeocoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn attempt(&self, query: &Coordinates) -> Result<Attempt<AddressResult>, AdapterError> {
        let mut params = vec![
            (self.lat_param.clone(), query.lat.to_string()),
            (self.lng_param.clone(), query.lng.to_string()),
        ];
        params.extend(self.params.iter().cloned());

        let resp = self
            .client
            .get(&self.url)
            .query(&params)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AdapterError::Status {
                status: resp.status().as_u16(),
                url: self.url.clone(),
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AdapterError::Malformed(format!("{}: {e}", self.name)))?;
        let addr = self.fields.extract(&body)?;

        // A locality is what makes the answer usable.
        if !addr.city.is_empty() {
            Ok(Attempt::Definitive(addr))
        } else if !addr.is_empty() {
            Ok(Attempt::Partial(addr))
        } else {
            Ok(Attempt::Abstain)
        }
    }
}
