use crate::buffer::SnapshotBuffer;
use crate::model::{AggregateSummary, ItemId, Snapshot};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};
use std::collections::HashMap;
use tracing::warn;

const MEAN_EPSILON: f64 = 1e-6;

/// Running count / sum / sum-of-squares that supports O(1) add and remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericAggregate {
    pub count: u64,
    pub sum: f64,
    pub sum_squares: f64,
    pub last_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Applied,
    Drained,
    /// Removal hit an empty aggregate or an invalid value, or left sums that
    /// can't describe the remaining values.
    Reset,
}

fn valid(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl NumericAggregate {
    pub fn add(&mut self, value: f64) {
        if !valid(value) {
            return;
        }
        self.count += 1;
        self.sum += value;
        self.sum_squares += value * value;
        self.last_value = value;
    }

    pub fn remove(&mut self, value: f64) -> Removal {
        if self.count == 0 || !valid(value) {
            self.reset();
            return Removal::Reset;
        }
        self.count -= 1;
        self.sum -= value;
        self.sum_squares -= value * value;

        if self.count == 0 {
            self.reset();
            Removal::Drained
        } else if self.drifted() {
            self.reset();
            Removal::Reset
        } else {
            Removal::Applied
        }
    }

    // Every retained value is positive, so a live sum must be too.
    fn drifted(&self) -> bool {
        !self.sum.is_finite()
            || !self.sum_squares.is_finite()
            || self.sum <= 0.0
            || self.sum_squares < 0.0
    }

    pub fn reset(&mut self) {
        *self = NumericAggregate::default();
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    /// Sample standard deviation. Variance is clamped at zero so drift from
    /// repeated removes can never surface as NaN.
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let variance = (self.sum_squares - self.sum * self.sum / n) / (n - 1.0);
        variance.max(0.0).sqrt()
    }

    pub fn volatility_percent(&self) -> f64 {
        let mean = self.mean();
        if mean > MEAN_EPSILON {
            (self.std_dev() / mean) * 100.0
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> AggregateSummary {
        AggregateSummary {
            count: self.count,
            mean: self.mean(),
            std_dev: self.std_dev(),
            volatility: self.volatility_percent(),
        }
    }

    pub fn approx_eq(&self, other: &NumericAggregate, tolerance: f64) -> bool {
        self.count == other.count
            && close(self.sum, other.sum, tolerance)
            && close(self.sum_squares, other.sum_squares, tolerance)
    }
}

fn close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0)
}

#[derive(Debug, Clone, Default)]
pub struct AggregateIndex {
    entries: HashMap<ItemId, NumericAggregate>,
}

impl AggregateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<ItemId, NumericAggregate>) -> Self {
        AggregateIndex { entries }
    }

    pub fn rebuild(buffer: &SnapshotBuffer) -> Self {
        let mut index = AggregateIndex::new();
        for snap in buffer.iter_oldest_first() {
            index.apply_insert(snap);
        }
        index
    }

    /// Returns the number of items whose aggregate received a value.
    pub fn apply_insert(&mut self, snapshot: &Snapshot) -> usize {
        let mut updated = 0;
        for (id, mid) in snapshot.mids() {
            self.entries.entry(id).or_default().add(mid);
            updated += 1;
        }
        updated
    }

    pub fn apply_evict(&mut self, snapshot: &Snapshot) {
        for (id, mid) in snapshot.mids() {
            let agg = self.entries.entry(id).or_default();
            let was_empty = agg.is_empty();
            if agg.remove(mid) == Removal::Reset {
                warn!(
                    item_id = id,
                    mid,
                    was_empty,
                    taken_at = snapshot.taken_at,
                    "aggregate drifted on eviction, reset to zero"
                );
            }
        }
    }

    pub fn get(&self, id: ItemId) -> Option<&NumericAggregate> {
        self.entries.get(&id)
    }

    pub fn summary(&self, id: ItemId) -> Option<AggregateSummary> {
        self.entries.get(&id).map(NumericAggregate::summary)
    }

    pub fn volatility(&self, id: ItemId) -> f64 {
        self.entries
            .get(&id)
            .map(NumericAggregate::volatility_percent)
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(NumericAggregate::is_empty)
    }

    pub fn entries(&self) -> &HashMap<ItemId, NumericAggregate> {
        &self.entries
    }

    pub fn approx_eq(&self, other: &AggregateIndex, tolerance: f64) -> bool {
        let empty = NumericAggregate::default();
        let one_way = |a: &AggregateIndex, b: &AggregateIndex| {
            a.entries
                .iter()
                .all(|(id, agg)| agg.approx_eq(b.entries.get(id).unwrap_or(&empty), tolerance))
        };
        one_way(self, other) && one_way(other, self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemHistory {
    pub item_id: ItemId,
    /// (taken_at, mid), oldest first.
    pub points: Vec<(i64, f64)>,
    pub min: f64,
    pub max: f64,
    pub q10: f64,
    pub q50: f64,
    pub q90: f64,
    pub std_dev: f64,
    /// Price change per unit of `taken_at`.
    pub trend: f64,
}

pub fn item_history(buffer: &SnapshotBuffer, item_id: ItemId) -> ItemHistory {
    let points: Vec<(i64, f64)> = buffer
        .iter_oldest_first()
        .filter_map(|snap| {
            snap.quotes
                .get(&item_id)
                .and_then(|q| q.mid())
                .map(|m| (snap.taken_at, m))
        })
        .collect();

    if points.is_empty() {
        return ItemHistory {
            item_id,
            ..Default::default()
        };
    }

    let prices: Vec<f64> = points.iter().map(|(_, p)| *p).collect();
    let std_dev = if prices.len() > 1 {
        prices.iter().std_dev()
    } else {
        0.0
    };
    let trend = slope_over_time(&points);
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut data = Data::new(prices);
    ItemHistory {
        item_id,
        min,
        max,
        q10: data.quantile(0.10),
        q50: data.quantile(0.50),
        q90: data.quantile(0.90),
        std_dev,
        trend,
        points,
    }
}

fn slope_over_time(points: &[(i64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f64;
    let t_mean = points.iter().map(|(t, _)| *t as f64).sum::<f64>() / n;
    let p_mean = points.iter().map(|(_, p)| p).sum::<f64>() / n;

    let (covariance, spread) = points.iter().fold((0.0, 0.0), |(cov, var), (t, p)| {
        let dt = *t as f64 - t_mean;
        (cov + dt * (p - p_mean), var + dt * dt)
    });

    if spread > 0.0 {
        covariance / spread
    } else {
        0.0
    }
}
