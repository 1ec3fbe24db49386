use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub type ItemId = u32;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMapping {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub examine: String,
    #[serde(default)]
    pub members: bool,
    #[serde(default)]
    pub lowalch: Option<u64>,
    #[serde(default)]
    pub highalch: Option<u64>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub icon: String,
}

impl ItemMapping {
    /// Per-4-hour buy limit, 0 when the catalog doesn't know it.
    pub fn trade_limit(&self) -> f64 {
        self.limit.unwrap_or(0) as f64
    }
}

/// Latest observed instant-buy/instant-sell prices. A side of 0 means no data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub high: f64,
    #[serde(default, deserialize_with = "null_as_zero_i64")]
    pub high_time: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub low: f64,
    #[serde(default, deserialize_with = "null_as_zero_i64")]
    pub low_time: i64,
}

impl Quote {
    pub fn new(high: f64, low: f64) -> Self {
        Quote {
            high,
            low,
            ..Default::default()
        }
    }

    pub fn is_finite(&self) -> bool {
        self.high.is_finite() && self.low.is_finite()
    }

    pub fn mid(&self) -> Option<f64> {
        if self.is_finite() && self.high > 0.0 && self.low > 0.0 {
            Some((self.high + self.low) / 2.0)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume24h {
    #[serde(default, alias = "highPriceVolume", deserialize_with = "null_as_zero")]
    pub high_volume: f64,
    #[serde(default, alias = "lowPriceVolume", deserialize_with = "null_as_zero")]
    pub low_volume: f64,
}

impl Volume24h {
    pub fn total(&self) -> f64 {
        non_negative(self.high_volume) + non_negative(self.low_volume)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: i64,
    pub quotes: BTreeMap<ItemId, Quote>,
}

impl Snapshot {
    pub fn new(taken_at: i64, quotes: BTreeMap<ItemId, Quote>) -> Self {
        Snapshot { taken_at, quotes }
    }

    pub fn mids(&self) -> impl Iterator<Item = (ItemId, f64)> + '_ {
        self.quotes
            .iter()
            .filter_map(|(id, q)| q.mid().map(|m| (*id, m)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub tax: f64,
    pub gross_margin: f64,
    pub net_margin: f64,
    pub roi: f64,
    pub volatility_score: f64,
    pub slippage: f64,
    pub effective_net_margin: f64,
    pub volume_24h: f64,
    pub effective_volume: f64,
    pub potential_profit: f64,
    pub profit_per_hour: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Diamond,
    Gold,
    Green,
    Normal,
    NoMargin,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Diamond => "DIAMOND",
            Tier::Gold => "GOLD",
            Tier::Green => "GREEN",
            Tier::Normal => "NORMAL",
            Tier::NoMargin => "NONE",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateSummary {
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
    pub volatility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedItem {
    pub item: ItemMapping,
    pub quote: Quote,
    pub metrics: Metrics,
    pub historical_volatility: f64,
    pub risk_score: f64,
    pub risk_adjusted_profit: f64,
    pub rank_score: f64,
    pub tier: Tier,
}

fn null_as_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(0.0))
}

fn null_as_zero_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(d)?.unwrap_or(0))
}
