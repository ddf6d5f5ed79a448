// src/config/mod.rs
pub mod providers;

pub use providers::{
    FiberConfig, FiberProviderCfg, GeoConfig, GeocoderCfg, HtmlScrapeCfg, JsonApiCfg,
    MetroFallbackCfg, ServiceConfig,
};
