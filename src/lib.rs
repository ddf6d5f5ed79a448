// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod chain;
pub mod config;
pub mod fiber;
pub mod geo;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::chain::{
    AdapterError, Attempt, ChainResolver, Resolution, SourceAdapter, TerminalFallback,
};
pub use crate::fiber::{FiberQuery, FiberResult};
pub use crate::geo::{AddressResult, Coordinates};
