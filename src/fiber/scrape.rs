// src/fiber/scrape.rs
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;

use super::{fill_template, FiberQuery, FiberResult};
use crate::chain::{AdapterError, Attempt, SourceAdapter};
use crate::config::HtmlScrapeCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageVerdict {
    Available,
    Unavailable,
    /// No known marker on the page; not trusted as a negative.
    Ambiguous,
}

/// Reads an availability verdict out of a results page.
pub trait MarkupClassifier: Send + Sync {
    fn classify(&self, page: &str) -> PageVerdict;
}

/// Literal substring markers. Any negative marker wins over positive ones.
#[derive(Debug, Clone)]
pub struct MarkerSet {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl MarkerSet {
    pub fn new(positive: Vec<String>, negative: Vec<String>) -> Self {
        let keep = |v: Vec<String>| -> Vec<String> {
            v.into_iter().filter(|m| !m.is_empty()).collect()
        };
        Self {
            positive: keep(positive),
            negative: keep(negative),
        }
    }
}

impl MarkupClassifier for MarkerSet {
    fn classify(&self, page: &str) -> PageVerdict {
        if self.negative.iter().any(|m| page.contains(m.as_str())) {
            PageVerdict::Unavailable
        } else if self.positive.iter().any(|m| page.contains(m.as_str())) {
            PageVerdict::Available
        } else {
            PageVerdict::Ambiguous
        }
    }
}

/// Human-facing results page fetched with GET and classified by markers.
pub struct HtmlScrapeAdapter {
    cfg: HtmlScrapeCfg,
    timeout: Duration,
    user_agent: String,
    classifier: Box<dyn MarkupClassifier>,
    speed_re: Option<Regex>,
    client: reqwest::Client,
}

impl HtmlScrapeAdapter {
    pub fn from_config(
        cfg: &HtmlScrapeCfg,
        client: reqwest::Client,
        user_agent: &str,
    ) -> Result<Self> {
        let classifier =
            MarkerSet::new(cfg.positive_markers.clone(), cfg.negative_markers.clone());
        Self::with_classifier(cfg, client, user_agent, Box::new(classifier))
    }

    /// Swap in a different page classifier (e.g. a structured parser).
    pub fn with_classifier(
        cfg: &HtmlScrapeCfg,
        client: reqwest::Client,
        user_agent: &str,
        classifier: Box<dyn MarkupClassifier>,
    ) -> Result<Self> {
        let speed_re = cfg
            .speed_pattern
            .as_deref()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| anyhow!("provider `{}` speed_pattern error: {}", cfg.name, e))
            })
            .transpose()?;
        Ok(Self {
            cfg: cfg.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            user_agent: user_agent.to_string(),
            classifier,
            speed_re,
            client,
        })
    }

    /// Classify a fetched page. `None` means the page is ambiguous.
    pub fn interpret(&self, query: &FiberQuery, raw: &str) -> Option<FiberResult> {
        let page = html_escape::decode_html_entities(raw);
        let available = match self.classifier.classify(&page) {
            PageVerdict::Available => true,
            PageVerdict::Unavailable => false,
            PageVerdict::Ambiguous => return None,
        };

        let (speed, message) = if available {
            let scraped = self
                .speed_re
                .as_ref()
                .and_then(|re| re.captures(&page))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty());
            (
                scraped.unwrap_or_else(|| self.cfg.available_speed.clone()),
                self.cfg.available_message.clone(),
            )
        } else {
            (String::new(), self.cfg.unavailable_message.clone())
        };

        Some(FiberResult {
            available,
            speed,
            message,
            link: fill_template(&self.cfg.link, &query.search_address),
            checked: true,
        })
    }
}

#[async_trait]
impl SourceAdapter<FiberQuery, FiberResult> for HtmlScrapeAdapter {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn attempt(&self, query: &FiberQuery) -> Result<Attempt<FiberResult>, AdapterError> {
        let url = fill_template(&self.cfg.url, &query.search_address);
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AdapterError::Status {
                status: resp.status().as_u16(),
                url,
            });
        }
        let html = resp.text().await?;
        Ok(self
            .interpret(query, &html)
            .map_or(Attempt::Abstain, Attempt::Definitive))
    }
}
