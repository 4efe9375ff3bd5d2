use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::book::Catalog;

/// Top-level configuration for a trading peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PeerConfig {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Tuning knobs for the negotiation engine. The defaults carry the session
/// constants: 5 s proposal/ledger deadlines, a 2 s initiator tick and a 60 s
/// price decay window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingConfig {
    /// How long an initiator waits for proposals after broadcasting a
    /// call-for-proposals, and how long a proposal stays acceptable.
    pub cfp_timeout_ms: u64,
    /// Deadline for a single ledger round-trip.
    pub ledger_timeout_ms: u64,
    /// Period between scheduler ticks launching new initiator rounds.
    pub tick_interval_ms: u64,
    /// Window over which sell prices decay to their minimum and buy prices
    /// rise to their maximum.
    pub price_decay_ms: u64,
    /// Added on top of the catalog base price to form the opening sell price.
    pub sell_premium: Decimal,
    /// Subtracted from the goal value to form the opening buy price.
    pub buy_discount: Decimal,
    /// Cost penalty applied when an offer demands one of our own goal books.
    pub goal_retention_penalty: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            cfp_timeout_ms: 5_000,
            ledger_timeout_ms: 5_000,
            tick_interval_ms: 2_000,
            price_decay_ms: 60_000,
            sell_premium: Decimal::from(19),
            buy_discount: Decimal::from(40),
            goal_retention_penalty: Decimal::from(500),
        }
    }
}

impl TradingConfig {
    pub fn cfp_timeout(&self) -> Duration {
        Duration::from_millis(self.cfp_timeout_ms)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn price_decay(&self) -> Duration {
        Duration::from_millis(self.price_decay_ms)
    }
}

/// Catalog contents as configured (a list, so toml stays readable).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogConfig {
    pub books: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub title: String,
    pub price: Decimal,
}

impl CatalogConfig {
    pub fn build(&self) -> Catalog {
        Catalog::new(
            self.books
                .iter()
                .map(|e| (e.title.clone(), e.price))
                .collect(),
        )
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let entries = [
            ("War and Peace", 85),
            ("Don Quixote", 64),
            ("Moby Dick", 45),
            ("Crime and Punishment", 58),
            ("The Odyssey", 47),
            ("Dune", 42),
            ("The Hobbit", 38),
            ("The Trial", 32),
            ("Brave New World", 28),
            ("Hamlet", 20),
        ];
        Self {
            books: entries
                .iter()
                .map(|(title, price)| CatalogEntry {
                    title: title.to_string(),
                    price: Decimal::from(*price),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_constants_match_session_parameters() {
        let config = TradingConfig::default();
        assert_eq!(config.cfp_timeout(), Duration::from_secs(5));
        assert_eq!(config.tick_interval(), Duration::from_secs(2));
        assert_eq!(config.price_decay(), Duration::from_secs(60));
        assert_eq!(config.sell_premium, dec!(19));
        assert_eq!(config.buy_discount, dec!(40));
        assert_eq!(config.goal_retention_penalty, dec!(500));
    }

    #[test]
    fn roundtrip_peer_config() {
        let config = PeerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PeerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[trading]
cfp_timeout_ms = 1000
ledger_timeout_ms = 1000
tick_interval_ms = 250
price_decay_ms = 30000
sell_premium = "19"
buy_discount = "40"
goal_retention_penalty = "500"

[catalog]
books = [
    { title = "Dune", price = "42" },
    { title = "Hamlet", price = "20" },
]
"#;
        let config: PeerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.trading.tick_interval(), Duration::from_millis(250));
        let catalog = config.catalog.build();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.base_price("Dune"), Some(dec!(42)));
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: PeerConfig = toml::from_str("").unwrap();
        assert_eq!(config.trading, TradingConfig::default());
        assert!(!config.catalog.build().is_empty());
    }
}
