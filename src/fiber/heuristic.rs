// src/fiber/heuristic.rs
use super::{FiberQuery, FiberResult};
use crate::chain::TerminalFallback;
use crate::config::MetroFallbackCfg;

/// Terminal guess from the city name alone. Always answers, so `checked` is set.
pub struct MetroHeuristic {
    /// First whitespace token of each metro name.
    keys: Vec<String>,
    available_speed: String,
    available_message: String,
    unavailable_message: String,
    link: String,
}

impl MetroHeuristic {
    pub fn from_config(cfg: &MetroFallbackCfg) -> Self {
        let keys = cfg
            .metro_cities
            .iter()
            .filter_map(|c| c.split_whitespace().next())
            .map(str::to_string)
            .collect();
        Self {
            keys,
            available_speed: cfg.available_speed.clone(),
            available_message: cfg.available_message.clone(),
            unavailable_message: cfg.unavailable_message.clone(),
            link: cfg.link.clone(),
        }
    }

    pub fn is_metro(&self, city: &str) -> bool {
        !city.is_empty() && self.keys.iter().any(|k| city.contains(k.as_str()))
    }
}

impl TerminalFallback<FiberQuery, FiberResult> for MetroHeuristic {
    fn name(&self) -> &str {
        "metro-heuristic"
    }

    fn resolve(&self, query: &FiberQuery, _partial: Option<FiberResult>) -> FiberResult {
        let available = query.city.as_deref().is_some_and(|c| self.is_metro(c));
        let (speed, message) = if available {
            (self.available_speed.clone(), self.available_message.clone())
        } else {
            (String::new(), self.unavailable_message.clone())
        };
        FiberResult {
            available,
            speed,
            message,
            link: self.link.clone(),
            checked: true,
        }
    }
}
