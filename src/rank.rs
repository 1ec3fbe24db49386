use crate::config::ScannerConfig;
use crate::flips::{compute_metrics, tier};
use crate::model::{EnrichedItem, ItemId, ItemMapping, Quote, Volume24h};
use crate::stats::AggregateIndex;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Maps historical volatility (percent) into [0, 1).
pub fn risk_score(historical_volatility: f64, alpha_risk: f64) -> f64 {
    if !historical_volatility.is_finite() || historical_volatility <= 0.0 {
        return 0.0;
    }
    (historical_volatility / 100.0 * alpha_risk).tanh()
}

/// Log-compressed composite of margin, volume and risk, scaled by how much
/// of the item can actually be bought per limit window.
pub fn rank_score(
    net_margin: f64,
    volume_24h: f64,
    risk: f64,
    trade_limit: f64,
    config: &ScannerConfig,
) -> f64 {
    let log_margin = log10_floor_one(net_margin);
    let log_volume = log10_floor_one(volume_24h);
    let log_limit = log10_floor_one(trade_limit);
    (log_margin * config.weight_margin + log_volume * config.weight_volume
        - risk * config.weight_risk)
        * log_limit
}

fn log10_floor_one(value: f64) -> f64 {
    if value.is_finite() {
        value.max(1.0).log10()
    } else {
        0.0
    }
}

pub fn enrich(
    item: &ItemMapping,
    quote: &Quote,
    volume: Option<&Volume24h>,
    index: &AggregateIndex,
    config: &ScannerConfig,
) -> EnrichedItem {
    let metrics = compute_metrics(item, quote, volume, config);
    let historical_volatility = index.volatility(item.id);
    let risk = risk_score(historical_volatility, config.alpha_risk);

    let rank = rank_score(
        metrics.net_margin,
        metrics.volume_24h,
        risk,
        item.trade_limit(),
        config,
    );

    EnrichedItem {
        item: item.clone(),
        quote: *quote,
        metrics,
        historical_volatility,
        risk_score: risk,
        risk_adjusted_profit: metrics.profit_per_hour * (1.0 - risk),
        rank_score: rank,
        tier: tier(&metrics),
    }
}

pub fn rank_order(a: &EnrichedItem, b: &EnrichedItem) -> Ordering {
    b.rank_score
        .total_cmp(&a.rank_score)
        .then_with(|| a.item.id.cmp(&b.item.id))
}

pub fn compute_ranked(
    catalog: &[ItemMapping],
    quotes: &HashMap<ItemId, Quote>,
    volumes: Option<&HashMap<ItemId, Volume24h>>,
    index: &AggregateIndex,
    config: &ScannerConfig,
) -> Vec<EnrichedItem> {
    let mut ranked: Vec<EnrichedItem> = catalog
        .par_iter()
        .filter_map(|item| {
            let quote = quotes.get(&item.id)?;
            let volume = volumes.and_then(|v| v.get(&item.id));
            Some(enrich(item, quote, volume, index, config))
        })
        .filter(|e| {
            e.metrics.potential_profit >= config.min_potential
                && e.historical_volatility <= config.max_volatility
        })
        .collect();

    ranked.sort_by(rank_order);
    ranked.truncate(config.top_n);
    ranked
}
