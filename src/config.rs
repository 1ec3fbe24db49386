use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub alpha_risk: f64,
    pub base_slippage: f64,
    pub slippage_per_volatility: f64,
    /// Effective daily volume is capped at `trade_limit * volume_cap_hours`.
    pub volume_cap_hours: f64,
    pub weight_margin: f64,
    pub weight_volume: f64,
    pub weight_risk: f64,
    pub min_potential: f64,
    pub max_volatility: f64,
    pub top_n: usize,
    pub persist_debounce_ms: u64,
    pub persist_max_wait_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            alpha_risk: 1.0,
            base_slippage: 0.05,
            slippage_per_volatility: 0.1,
            volume_cap_hours: 24.0,
            weight_margin: 1.0,
            weight_volume: 0.8,
            weight_risk: 2.0,
            min_potential: 0.0,
            max_volatility: 100.0,
            top_n: 50,
            persist_debounce_ms: 5_000,
            persist_max_wait_ms: 30_000,
        }
    }
}

impl ScannerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ScannerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("alpha_risk", self.alpha_risk),
            ("base_slippage", self.base_slippage),
            ("slippage_per_volatility", self.slippage_per_volatility),
            ("volume_cap_hours", self.volume_cap_hours),
            ("weight_margin", self.weight_margin),
            ("weight_volume", self.weight_volume),
            ("weight_risk", self.weight_risk),
            ("min_potential", self.min_potential),
            ("max_volatility", self.max_volatility),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(invalid(field, format!("{value} is not finite")));
            }
        }

        if self.alpha_risk < 0.0 {
            return Err(invalid("alpha_risk", "must be >= 0".into()));
        }
        if !(0.0..=1.0).contains(&self.base_slippage) {
            return Err(invalid("base_slippage", "must be within [0, 1]".into()));
        }
        if self.slippage_per_volatility < 0.0 {
            return Err(invalid("slippage_per_volatility", "must be >= 0".into()));
        }
        if self.volume_cap_hours <= 0.0 {
            return Err(invalid("volume_cap_hours", "must be > 0".into()));
        }
        if self.top_n == 0 {
            return Err(invalid("top_n", "must be > 0".into()));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
