use crate::config::ScannerConfig;
use crate::model::{ItemMapping, Metrics, Quote, Tier, Volume24h};

/// Grand Exchange sale tax: 1% of the sell price, floored, capped per item.
pub const TAX_RATE: f64 = 0.01;
pub const TAX_CAP: f64 = 5_000_000.0;

pub fn sale_tax(sell: f64) -> f64 {
    if !sell.is_finite() || sell <= 0.0 {
        return 0.0;
    }
    (sell * TAX_RATE).floor().min(TAX_CAP)
}

pub fn compute_metrics(
    item: &ItemMapping,
    quote: &Quote,
    volume: Option<&Volume24h>,
    config: &ScannerConfig,
) -> Metrics {
    if !quote.is_finite() || quote.high <= 0.0 || quote.low <= 0.0 {
        return Metrics::default();
    }
    if let Some(v) = volume {
        if !v.high_volume.is_finite() || !v.low_volume.is_finite() {
            return Metrics::default();
        }
    }

    let buy = quote.low;
    let sell = quote.high;

    let tax = sale_tax(sell);
    let gross_margin = sell - buy;
    let net_margin = (gross_margin - tax).max(0.0);
    let roi = (net_margin / buy) * 100.0;

    let midpoint = (sell + buy) / 2.0;
    let volatility_score = if midpoint > 0.0 {
        (gross_margin / midpoint) * 100.0
    } else {
        0.0
    };

    // Wider spreads assume worse fills. Past roughly a 9.5% spread slippage
    // exceeds 1 and the effective margin goes negative.
    let slippage = config.base_slippage + volatility_score * config.slippage_per_volatility;
    let effective_net_margin = net_margin * (1.0 - slippage);

    let volume_24h = volume.map(Volume24h::total).unwrap_or(0.0);
    let effective_volume = volume_24h.min(item.trade_limit() * config.volume_cap_hours);

    let potential_profit = effective_net_margin * effective_volume;
    let profit_per_hour = potential_profit / 24.0;

    Metrics {
        tax,
        gross_margin,
        net_margin,
        roi,
        volatility_score,
        slippage,
        effective_net_margin,
        volume_24h,
        effective_volume,
        potential_profit,
        profit_per_hour,
    }
}

pub fn tier(metrics: &Metrics) -> Tier {
    let net = metrics.net_margin;
    let roi = metrics.roi;
    if net <= 0.0 {
        Tier::NoMargin
    } else if roi > 35.0 || net > 5_000_000.0 {
        Tier::Diamond
    } else if roi > 20.0 || net > 1_000_000.0 {
        Tier::Gold
    } else if roi > 8.0 || net > 200_000.0 {
        Tier::Green
    } else {
        Tier::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(limit: u32) -> ItemMapping {
        ItemMapping {
            id: 1,
            name: "Test item".into(),
            limit: Some(limit),
            ..Default::default()
        }
    }

    #[test]
    fn tax_is_one_percent_floored() {
        assert_eq!(sale_tax(100_000.0), 1_000.0);
        assert_eq!(sale_tax(120.0), 1.0);
        assert_eq!(sale_tax(99.0), 0.0);
    }

    #[test]
    fn tax_caps_at_five_million() {
        assert_eq!(sale_tax(600_000_000.0), 5_000_000.0);
        assert_eq!(sale_tax(2_000_000_000.0), 5_000_000.0);
    }

    #[test]
    fn small_item_scenario() {
        let cfg = ScannerConfig::default();
        let volume = Volume24h {
            high_volume: 200.0,
            low_volume: 200.0,
        };
        let m = compute_metrics(&item(1000), &Quote::new(120.0, 100.0), Some(&volume), &cfg);
        assert_eq!(m.tax, 1.0);
        assert_eq!(m.gross_margin, 20.0);
        assert_eq!(m.net_margin, 19.0);
        assert!((m.roi - 19.0).abs() < 1e-12);
        assert_eq!(m.volume_24h, 400.0);
        assert_eq!(m.effective_volume, 400.0);
        assert!((m.volatility_score - 20.0 / 110.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn expensive_item_tax_is_capped() {
        let cfg = ScannerConfig::default();
        let m = compute_metrics(&item(8), &Quote::new(600_000_000.0, 580_000_000.0), None, &cfg);
        assert_eq!(m.tax, 5_000_000.0);
        let m = compute_metrics(&item(8), &Quote::new(900_000_000.0, 580_000_000.0), None, &cfg);
        assert_eq!(m.tax, 5_000_000.0);
    }

    #[test]
    fn zero_side_returns_zero_metrics() {
        let cfg = ScannerConfig::default();
        let m = compute_metrics(&item(100), &Quote::new(0.0, 500.0), None, &cfg);
        assert_eq!(m, Metrics::default());
        let m = compute_metrics(&item(100), &Quote::new(500.0, 0.0), None, &cfg);
        assert_eq!(m, Metrics::default());
    }

    #[test]
    fn non_finite_inputs_short_circuit() {
        let cfg = ScannerConfig::default();
        let m = compute_metrics(&item(100), &Quote::new(f64::NAN, 500.0), None, &cfg);
        assert_eq!(m, Metrics::default());
        let m = compute_metrics(&item(100), &Quote::new(f64::INFINITY, 500.0), None, &cfg);
        assert_eq!(m, Metrics::default());
        let bad_volume = Volume24h {
            high_volume: f64::NAN,
            low_volume: 1.0,
        };
        let m = compute_metrics(&item(100), &Quote::new(600.0, 500.0), Some(&bad_volume), &cfg);
        assert_eq!(m, Metrics::default());
    }

    #[test]
    fn volume_capped_by_trade_limit() {
        let cfg = ScannerConfig::default();
        let volume = Volume24h {
            high_volume: 50_000.0,
            low_volume: 50_000.0,
        };
        let m = compute_metrics(&item(100), &Quote::new(10_300.0, 10_000.0), Some(&volume), &cfg);
        assert_eq!(m.effective_volume, 2_400.0);
        assert_eq!(m.net_margin, 197.0);
        assert!(m.effective_net_margin > 0.0 && m.effective_net_margin < 197.0);
        assert!((m.potential_profit - m.effective_net_margin * 2_400.0).abs() < 1e-9);
        assert!((m.profit_per_hour - m.potential_profit / 24.0).abs() < 1e-9);
    }

    #[test]
    fn missing_volume_means_no_potential() {
        let cfg = ScannerConfig::default();
        let m = compute_metrics(&item(100), &Quote::new(1_100.0, 1_000.0), None, &cfg);
        assert!(m.net_margin > 0.0);
        assert_eq!(m.potential_profit, 0.0);
    }

    #[test]
    fn slippage_grows_with_spread_volatility() {
        let cfg = ScannerConfig::default();
        let volume = Volume24h {
            high_volume: 200.0,
            low_volume: 200.0,
        };
        let m = compute_metrics(&item(1000), &Quote::new(120.0, 100.0), Some(&volume), &cfg);
        let expected = 0.05 + (20.0 / 110.0 * 100.0) * 0.1;
        assert!((m.slippage - expected).abs() < 1e-12);
        assert!((m.effective_net_margin - 19.0 * (1.0 - expected)).abs() < 1e-9);
        assert!(m.effective_net_margin < 0.0);
        assert!((m.potential_profit - m.effective_net_margin * 400.0).abs() < 1e-9);
        assert!(m.potential_profit < -6_000.0);

        let m = compute_metrics(&item(100), &Quote::new(1_000.2, 1_000.0), None, &cfg);
        assert!(m.slippage > 0.05 && m.slippage < 0.06);
    }

    #[test]
    fn inverted_quote_has_no_net_margin() {
        let cfg = ScannerConfig::default();
        let m = compute_metrics(&item(100), &Quote::new(90.0, 100.0), None, &cfg);
        assert_eq!(m.net_margin, 0.0);
        assert_eq!(m.roi, 0.0);
        assert_eq!(tier(&m), Tier::NoMargin);
    }

    #[test]
    fn tiers_follow_roi_and_net() {
        let with = |net_margin: f64, roi: f64| Metrics {
            net_margin,
            roi,
            ..Default::default()
        };
        assert_eq!(tier(&with(10.0, 40.0)), Tier::Diamond);
        assert_eq!(tier(&with(6_000_000.0, 1.0)), Tier::Diamond);
        assert_eq!(tier(&with(10.0, 25.0)), Tier::Gold);
        assert_eq!(tier(&with(300_000.0, 1.0)), Tier::Green);
        assert_eq!(tier(&with(10.0, 2.0)), Tier::Normal);
    }
}
