use std::time::Duration;

use booktrade_inventory::InventorySnapshot;
use booktrade_models::{Book, Offer};
use rust_decimal::Decimal;

use crate::pricing::PricingPolicy;

/// Total cost of fulfilling an offer: the money demanded plus, for every
/// demanded book, either our sell price or (for our own goal titles) the
/// goal value plus the retention penalty that makes surrendering a goal
/// book all but unthinkable.
pub fn offer_cost(
    offer: &Offer,
    snapshot: &InventorySnapshot,
    pricing: &PricingPolicy,
    elapsed: Duration,
    goal_retention_penalty: Decimal,
) -> Decimal {
    let mut cost = offer.money;
    for book in &offer.books {
        if let Some(goal) = snapshot.goal_by_title(&book.title) {
            cost += goal.value + goal_retention_penalty;
        } else {
            cost += pricing.sell_price(&book.title, elapsed);
        }
    }
    cost
}

/// Lowest-cost offer over the full set. Ties go to the first offer seen;
/// callers must not read strategy into that.
pub fn best_offer<'a>(
    offers: &'a [Offer],
    snapshot: &InventorySnapshot,
    pricing: &PricingPolicy,
    elapsed: Duration,
    goal_retention_penalty: Decimal,
) -> Option<&'a Offer> {
    let mut best: Option<(&Offer, Decimal)> = None;
    for offer in offers {
        let cost = offer_cost(offer, snapshot, pricing, elapsed, goal_retention_penalty);
        match best {
            Some((_, best_cost)) if cost >= best_cost => {}
            _ => best = Some((offer, cost)),
        }
    }
    best.map(|(offer, _)| offer)
}

/// An offer is feasible iff we can pay its money from the last-known balance
/// and supply every demanded book without giving up an unspared goal title.
pub fn is_feasible(offer: &Offer, snapshot: &InventorySnapshot) -> bool {
    if offer.money > snapshot.money {
        return false;
    }
    offer.books.iter().all(|b| snapshot.can_supply(&b.title))
}

/// Infeasible offers are excluded from consideration entirely, not merely
/// down-ranked.
pub fn feasible_offers<'a>(offers: &'a [Offer], snapshot: &InventorySnapshot) -> Vec<&'a Offer> {
    offers.iter().filter(|o| is_feasible(o, snapshot)).collect()
}

/// What the books a responder is willing to sell are worth to us, at our buy
/// prices. `None` (responder named nothing) is treated as unbounded: there
/// is nothing to refuse.
pub fn received_valuation(
    will_sell: Option<&[Book]>,
    snapshot: &InventorySnapshot,
    pricing: &PricingPolicy,
    elapsed: Duration,
) -> Option<Decimal> {
    will_sell.map(|books| {
        books
            .iter()
            .map(|b| pricing.buy_price(&b.title, elapsed, snapshot))
            .sum()
    })
}
