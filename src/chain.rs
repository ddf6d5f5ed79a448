// src/chain.rs
//! Ordered fallback engine shared by the fiber and address pipelines.
//!
//! A [`ChainResolver`] walks its adapters strictly in order and stops at the first
//! definitive answer. Adapter errors and timeouts are logged and absorbed; when every
//! adapter abstains the terminal fallback produces the answer, so `resolve` never fails.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(8);

/// Why an adapter produced no answer. Every variant is absorbed by the chain.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl AdapterError {
    fn outcome_label(&self) -> &'static str {
        match self {
            AdapterError::Transport(_) | AdapterError::Status { .. } => "transport",
            AdapterError::Timeout(_) => "timeout",
            AdapterError::Malformed(_) => "malformed",
        }
    }
}

/// Outcome of a single adapter attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<R> {
    /// Trusted final answer (positive or negative); ends the chain.
    Definitive(R),
    /// Not trusted as final, but carries fields the terminal step may back-fill.
    Partial(R),
    /// Nothing usable.
    Abstain,
}

#[async_trait]
pub trait SourceAdapter<Q, R>: Send + Sync
where
    Q: Sync,
    R: Send,
{
    fn name(&self) -> &str;

    fn timeout(&self) -> Duration {
        DEFAULT_ADAPTER_TIMEOUT
    }

    async fn attempt(&self, query: &Q) -> Result<Attempt<R>, AdapterError>;
}

/// Last step of a chain. Must always produce a value.
pub trait TerminalFallback<Q, R>: Send + Sync {
    fn name(&self) -> &str;

    /// `partial` is the first `Attempt::Partial` seen in the chain, if any.
    fn resolve(&self, query: &Q, partial: Option<R>) -> R;
}

/// What the chain answered and which step answered it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<R> {
    pub value: R,
    pub source: String,
    pub terminal: bool,
}

pub struct ChainResolver<Q, R> {
    pipeline: &'static str,
    adapters: Vec<Box<dyn SourceAdapter<Q, R>>>,
    terminal: Box<dyn TerminalFallback<Q, R>>,
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "chain_attempts_total",
            "Adapter attempts by pipeline, adapter and outcome."
        );
        describe_counter!(
            "chain_terminal_total",
            "Requests answered by the terminal fallback."
        );
        describe_histogram!("chain_resolve_ms", "Whole-chain resolution time in milliseconds.");
        describe_gauge!(
            "chain_adapters_configured",
            "Remote adapters configured per pipeline."
        );
    });
}

impl<Q, R> ChainResolver<Q, R>
where
    Q: Sync,
    R: Send,
{
    pub fn new(
        pipeline: &'static str,
        adapters: Vec<Box<dyn SourceAdapter<Q, R>>>,
        terminal: Box<dyn TerminalFallback<Q, R>>,
    ) -> Self {
        Self {
            pipeline,
            adapters,
            terminal,
        }
    }

    pub fn pipeline(&self) -> &'static str {
        self.pipeline
    }

    /// Adapter names in priority order, terminal last.
    pub fn order(&self) -> Vec<String> {
        self.adapters
            .iter()
            .map(|a| a.name().to_string())
            .chain(std::iter::once(self.terminal.name().to_string()))
            .collect()
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    pub async fn resolve(&self, query: &Q) -> Resolution<R> {
        ensure_metrics_described();
        let t0 = Instant::now();
        let mut partial: Option<R> = None;

        for adapter in &self.adapters {
            let limit = adapter.timeout();
            let outcome = match tokio::time::timeout(limit, adapter.attempt(query)).await {
                Ok(res) => res,
                Err(_) => Err(AdapterError::Timeout(limit)),
            };

            match outcome {
                Ok(Attempt::Definitive(value)) => {
                    self.record(adapter.name(), "definitive");
                    self.record_elapsed(t0);
                    return Resolution {
                        value,
                        source: adapter.name().to_string(),
                        terminal: false,
                    };
                }
                Ok(Attempt::Partial(value)) => {
                    self.record(adapter.name(), "partial");
                    debug!(pipeline = self.pipeline, adapter = adapter.name(), "partial answer");
                    if partial.is_none() {
                        partial = Some(value);
                    }
                }
                Ok(Attempt::Abstain) => {
                    self.record(adapter.name(), "abstain");
                    debug!(pipeline = self.pipeline, adapter = adapter.name(), "adapter abstained");
                }
                Err(e) => {
                    self.record(adapter.name(), e.outcome_label());
                    warn!(
                        pipeline = self.pipeline,
                        adapter = adapter.name(),
                        error = %e,
                        "adapter failed, trying next source"
                    );
                }
            }
        }

        counter!("chain_terminal_total", "pipeline" => self.pipeline).increment(1);
        let value = self.terminal.resolve(query, partial);
        self.record_elapsed(t0);
        Resolution {
            value,
            source: self.terminal.name().to_string(),
            terminal: true,
        }
    }

    fn record(&self, adapter: &str, outcome: &'static str) {
        counter!(
            "chain_attempts_total",
            "pipeline" => self.pipeline,
            "adapter" => adapter.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }

    fn record_elapsed(&self, t0: Instant) {
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("chain_resolve_ms", "pipeline" => self.pipeline).record(ms);
    }
}
