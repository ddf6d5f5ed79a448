// src/fiber/json_api.rs
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{fill_template, FiberQuery, FiberResult};
use crate::chain::{AdapterError, Attempt, SourceAdapter};
use crate::config::JsonApiCfg;

/// Structured provider API: JSON POST in, `{available, speed?, message?}` out.
/// Any well-formed answer is definitive, including `available=false`.
pub struct JsonApiAdapter {
    cfg: JsonApiCfg,
    timeout: Duration,
    user_agent: String,
    client: reqwest::Client,
}

impl JsonApiAdapter {
    pub fn from_config(cfg: &JsonApiCfg, client: reqwest::Client, user_agent: &str) -> Self {
        Self {
            cfg: cfg.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            user_agent: user_agent.to_string(),
            client,
        }
    }

    fn request_body(&self, query: &FiberQuery) -> Value {
        let mut body = Map::new();
        body.insert(
            self.cfg.address_field.clone(),
            Value::String(query.search_address.clone()),
        );
        if let (Some(field), Some(city)) = (&self.cfg.city_field, &query.city) {
            body.insert(field.clone(), Value::String(city.clone()));
        }
        Value::Object(body)
    }

    /// Map a provider body onto `FiberResult`; a missing/non-boolean flag is malformed.
    pub fn interpret(&self, query: &FiberQuery, body: &Value) -> Result<FiberResult, AdapterError> {
        let available = body
            .get(&self.cfg.available_field)
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                AdapterError::Malformed(format!(
                    "{}: `{}` is not a boolean",
                    self.cfg.name, self.cfg.available_field
                ))
            })?;

        let provider_speed = text_field(body, &self.cfg.speed_field);
        let speed = match provider_speed {
            Some(s) => s,
            None if available => self.cfg.default_speed.clone(),
            None => String::new(),
        };

        let message = match &self.cfg.fixed_message {
            Some(fixed) => fixed.clone(),
            None => text_field(body, &self.cfg.message_field)
                .unwrap_or_else(|| self.cfg.default_message.clone()),
        };

        Ok(FiberResult {
            available,
            speed,
            message,
            link: fill_template(&self.cfg.link, &query.search_address),
            checked: true,
        })
    }
}

fn text_field(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SourceAdapter<FiberQuery, FiberResult> for JsonApiAdapter {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn attempt(&self, query: &FiberQuery) -> Result<Attempt<FiberResult>, AdapterError> {
        let mut req = self
            .client
            .post(&self.cfg.url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .json(&self.request_body(query));
        if let Some(referer) = &self.cfg.referer {
            req = req.header(reqwest::header::REFERER, referer);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(AdapterError::Status {
                status: resp.status().as_u16(),
                url: self.cfg.url.clone(),
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AdapterError::Malformed(format!("{}: {e}", self.cfg.name)))?;
        self.interpret(query, &body).map(Attempt::Definitive)
    }
}
