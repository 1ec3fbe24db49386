use crate::config::ScannerConfig;
use crate::flips::compute_metrics;
use crate::model::{ItemId, ItemMapping, Quote, Volume24h};
use serde::Serialize;
use std::collections::HashMap;

const DEFAULT_LIMIT: f64 = 1_000.0;
const PICKS: usize = 6;
const ALTERNATES: usize = 3;

/// Parses "1.5M", "250k", "2,000,000" or "3b" into gp. Malformed input is 0.
pub fn parse_capital(input: &str) -> f64 {
    let clean = input.trim().replace(',', "").to_uppercase();
    let (digits, multiplier) = match clean.chars().last() {
        Some('K') => (&clean[..clean.len() - 1], 1_000.0),
        Some('M') => (&clean[..clean.len() - 1], 1_000_000.0),
        Some('B') => (&clean[..clean.len() - 1], 1_000_000_000.0),
        _ => (clean.as_str(), 1.0),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return 0.0;
    }
    match digits.parse::<f64>() {
        Ok(n) if n.is_finite() => n * multiplier,
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskAppetite {
    Low,
    Moderate,
    High,
}

impl RiskAppetite {
    /// Largest relative spread an item may show and still be recommended.
    fn max_spread(&self) -> f64 {
        match self {
            RiskAppetite::Low => 0.03,
            RiskAppetite::Moderate => 0.08,
            RiskAppetite::High => 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    TwoHours,
    Overnight,
    Long,
}

impl Horizon {
    fn multiplier(&self) -> f64 {
        match self {
            Horizon::TwoHours => 1.0,
            Horizon::Overnight => 0.6,
            Horizon::Long => 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    All,
    Gear,
    Rares,
}

impl Focus {
    fn accepts(&self, item: &ItemMapping) -> bool {
        match self {
            Focus::All => true,
            Focus::Gear => {
                let examine = item.examine.to_lowercase();
                examine.contains("armour") || examine.contains("weapon")
            }
            Focus::Rares => item.value >= 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyPrefs {
    pub risk: RiskAppetite,
    pub horizon: Horizon,
    pub focus: Focus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VolatilityClass {
    Stable,
    Moderate,
    Volatile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: ItemId,
    pub name: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub profit_per_item: f64,
    pub liquidity_rating: u8,
    pub profit_hr: f64,
    pub vol_class: VolatilityClass,
    pub note: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuddyResponse {
    pub summary: String,
    pub items: Vec<Recommendation>,
    pub alternates: Vec<Recommendation>,
    pub wildcard: Option<Recommendation>,
}

fn recommend_one(
    item: &ItemMapping,
    quote: &Quote,
    volume: &Volume24h,
    prefs: &BuddyPrefs,
    config: &ScannerConfig,
) -> Recommendation {
    let metrics = compute_metrics(item, quote, Some(volume), config);
    let v24 = volume.total();

    let liquidity_rating = (v24 / 5_000.0).ceil().clamp(1.0, 5.0) as u8;
    let limit = item.limit.map(f64::from).filter(|l| *l > 0.0).unwrap_or(DEFAULT_LIMIT);
    let turnover = (v24 / limit).min(1.0);
    let profit_hr = metrics.net_margin * turnover * 10.0 * prefs.horizon.multiplier();

    let spread = relative_spread(quote);
    let vol_class = if spread < 0.02 {
        VolatilityClass::Stable
    } else if spread < 0.05 {
        VolatilityClass::Moderate
    } else {
        VolatilityClass::Volatile
    };

    let note = if liquidity_rating < 2 {
        "LOW_LIQUIDITY_WARNING"
    } else if vol_class == VolatilityClass::Volatile {
        "STOP_LOSS_ADVISED"
    } else {
        "LOCKED_IN"
    };

    Recommendation {
        id: item.id,
        name: item.name.clone(),
        buy_price: quote.low,
        sell_price: quote.high,
        profit_per_item: metrics.net_margin,
        liquidity_rating,
        profit_hr,
        vol_class,
        note,
    }
}

fn relative_spread(quote: &Quote) -> f64 {
    quote
        .mid()
        .map(|mid| (quote.high - quote.low) / mid)
        .unwrap_or(0.0)
}

pub fn recommend(
    capital: f64,
    prefs: &BuddyPrefs,
    catalog: &[ItemMapping],
    quotes: &HashMap<ItemId, Quote>,
    volumes: &HashMap<ItemId, Volume24h>,
    config: &ScannerConfig,
) -> BuddyResponse {
    let mut candidates: Vec<Recommendation> = catalog
        .iter()
        .filter(|item| prefs.focus.accepts(item))
        .filter_map(|item| {
            let quote = quotes.get(&item.id)?;
            let volume = volumes.get(&item.id)?;
            quote.mid()?;
            if quote.low > capital || relative_spread(quote) > prefs.risk.max_spread() {
                return None;
            }
            Some(recommend_one(item, quote, volume, prefs, config))
        })
        .collect();

    candidates.sort_by(|a, b| b.profit_hr.total_cmp(&a.profit_hr).then_with(|| a.id.cmp(&b.id)));

    let wildcard = candidates
        .iter()
        .find(|r| r.vol_class == VolatilityClass::Volatile)
        .or_else(|| candidates.last())
        .cloned();

    let summary = format!(
        "Capital {:.0} gp | risk {:?} | horizon {:?} | focus {:?} | {} candidates",
        capital,
        prefs.risk,
        prefs.horizon,
        prefs.focus,
        candidates.len()
    );

    let alternates = candidates.iter().skip(PICKS).take(ALTERNATES).cloned().collect();
    candidates.truncate(PICKS);

    BuddyResponse {
        summary,
        items: candidates,
        alternates,
        wildcard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_capital_suffixes() {
        assert_eq!(parse_capital("1.5M"), 1_500_000.0);
        assert_eq!(parse_capital("250k"), 250_000.0);
        assert_eq!(parse_capital(" 2,000,000 "), 2_000_000.0);
        assert_eq!(parse_capital("3b"), 3_000_000_000.0);
        assert_eq!(parse_capital("12"), 12.0);
    }

    #[test]
    fn malformed_capital_is_zero() {
        assert_eq!(parse_capital(""), 0.0);
        assert_eq!(parse_capital("M"), 0.0);
        assert_eq!(parse_capital("lots"), 0.0);
        assert_eq!(parse_capital("-5M"), 0.0);
        assert_eq!(parse_capital("1.2.3"), 0.0);
    }

    fn item(id: ItemId, limit: u32, examine: &str, value: u64) -> ItemMapping {
        ItemMapping {
            id,
            name: format!("item-{id}"),
            examine: examine.into(),
            limit: Some(limit),
            value,
            ..Default::default()
        }
    }

    fn vol(total: f64) -> Volume24h {
        Volume24h {
            high_volume: total / 2.0,
            low_volume: total / 2.0,
        }
    }

    fn market() -> (Vec<ItemMapping>, HashMap<ItemId, Quote>, HashMap<ItemId, Volume24h>) {
        let catalog = vec![
            item(1, 100, "A sturdy weapon.", 50_000),
            item(2, 100, "Rune armour.", 2_000_000),
            item(3, 100, "Some herbs.", 100),
            item(4, 100, "An expensive trinket.", 5_000_000),
        ];
        let mut quotes = HashMap::new();
        quotes.insert(1, Quote::new(10_300.0, 10_000.0));
        quotes.insert(2, Quote::new(10_200.0, 10_000.0));
        quotes.insert(3, Quote::new(1_140.0, 1_000.0));
        quotes.insert(4, Quote::new(9_000_000.0, 8_800_000.0));
        let volumes = (1..=4).map(|id| (id, vol(12_000.0))).collect();
        (catalog, quotes, volumes)
    }

    #[test]
    fn picks_sorted_by_profit_per_hour() {
        let (catalog, quotes, volumes) = market();
        let prefs = BuddyPrefs {
            risk: RiskAppetite::High,
            horizon: Horizon::TwoHours,
            focus: Focus::All,
        };
        let out = recommend(1_000_000.0, &prefs, &catalog, &quotes, &volumes, &ScannerConfig::default());
        // Item 4 is beyond the budget.
        let ids: Vec<ItemId> = out.items.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert_eq!(out.items[0].liquidity_rating, 3);
        assert_eq!(out.wildcard.as_ref().map(|r| r.id), Some(3));
        assert!(out.alternates.is_empty());
    }

    #[test]
    fn low_risk_and_focus_filters() {
        let (catalog, quotes, volumes) = market();
        let prefs = BuddyPrefs {
            risk: RiskAppetite::Low,
            horizon: Horizon::Overnight,
            focus: Focus::Gear,
        };
        let out = recommend(1e12, &prefs, &catalog, &quotes, &volumes, &ScannerConfig::default());
        let ids: Vec<ItemId> = out.items.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(out.items.iter().all(|r| r.vol_class != VolatilityClass::Volatile));

        let rares = BuddyPrefs {
            focus: Focus::Rares,
            ..prefs
        };
        let out = recommend(1e12, &rares, &catalog, &quotes, &volumes, &ScannerConfig::default());
        let ids: Vec<ItemId> = out.items.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 2]);
    }

    #[test]
    fn empty_market_has_no_wildcard() {
        let prefs = BuddyPrefs {
            risk: RiskAppetite::Moderate,
            horizon: Horizon::Long,
            focus: Focus::All,
        };
        let out = recommend(1e9, &prefs, &[], &HashMap::new(), &HashMap::new(), &ScannerConfig::default());
        assert!(out.items.is_empty());
        assert!(out.wildcard.is_none());
    }
}
