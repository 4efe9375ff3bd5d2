use std::sync::Arc;
use std::time::{Duration, Instant};

use booktrade_inventory::InventorySnapshot;
use booktrade_models::{Catalog, TradingConfig};
use rust_decimal::Decimal;

/// Wall-clock anchor for the trading session. Elapsed time drives the price
/// bands; everything else takes elapsed as a plain `Duration` so pricing
/// stays a pure function.
#[derive(Debug, Clone, Copy)]
pub struct TradingClock {
    inner: ClockInner,
}

#[derive(Debug, Clone, Copy)]
enum ClockInner {
    Started(Instant),
    Fixed(Duration),
}

impl TradingClock {
    pub fn start() -> Self {
        Self {
            inner: ClockInner::Started(Instant::now()),
        }
    }

    /// A clock frozen at a given elapsed time, for deterministic pricing in
    /// tests and replays.
    pub fn fixed(elapsed: Duration) -> Self {
        Self {
            inner: ClockInner::Fixed(elapsed),
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self.inner {
            ClockInner::Started(at) => at.elapsed(),
            ClockInner::Fixed(elapsed) => elapsed,
        }
    }
}

/// Time-varying price bands.
///
/// Sell prices open at catalog base + premium and decay linearly to
/// max(1, base / 2) over the decay window: sell urgency grows with time.
/// Buy prices open at max(1, goal value - discount) and rise to value - 1:
/// the peer gets less picky the longer a goal stays unmet.
pub struct PricingPolicy {
    catalog: Arc<Catalog>,
    decay_window: Duration,
    sell_premium: Decimal,
    buy_discount: Decimal,
}

impl PricingPolicy {
    pub fn new(catalog: Arc<Catalog>, config: &TradingConfig) -> Self {
        Self {
            catalog,
            decay_window: config.price_decay(),
            sell_premium: config.sell_premium,
            buy_discount: config.buy_discount,
        }
    }

    /// How much we want to get for one copy of `title`.
    pub fn sell_price(&self, title: &str, elapsed: Duration) -> Decimal {
        let base = self.catalog.base_price(title).unwrap_or(Decimal::ZERO);
        let opening = base + self.sell_premium;
        let floor = (base / Decimal::TWO).max(Decimal::ONE);
        lerp(opening, floor, self.decay_fraction(elapsed))
    }

    /// How much we are willing to pay for `title`. Zero unless the title is
    /// an active, still-unsatisfied goal.
    pub fn buy_price(&self, title: &str, elapsed: Duration, snapshot: &InventorySnapshot) -> Decimal {
        let Some(goal) = snapshot.goal_by_title(title) else {
            return Decimal::ZERO;
        };
        if snapshot.owns_title(title) {
            return Decimal::ZERO;
        }
        let opening = (goal.value - self.buy_discount).max(Decimal::ONE);
        let ceiling = goal.value - Decimal::ONE;
        lerp(opening, ceiling, self.decay_fraction(elapsed))
    }

    /// Fraction of the decay window consumed, clamped to [0, 1].
    fn decay_fraction(&self, elapsed: Duration) -> Decimal {
        let window = self.decay_window.as_millis();
        if window == 0 {
            return Decimal::ONE;
        }
        let t = elapsed.as_millis().min(window);
        Decimal::from(t as u64) / Decimal::from(window as u64)
    }
}

fn lerp(from: Decimal, to: Decimal, t: Decimal) -> Decimal {
    (from + (to - from) * t).max(Decimal::ZERO)
}
