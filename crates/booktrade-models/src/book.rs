use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A book, identified by its catalog title. Owned copies additionally carry
/// an instance id distinguishing physical copies of the same title; books
/// named in a demand (e.g. inside an [`crate::Offer`]) carry no instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Book {
    pub title: String,
    pub instance: Option<Uuid>,
}

impl Book {
    /// A title-only reference, as used when demanding a book from a peer.
    pub fn wanted(title: &str) -> Self {
        Self {
            title: title.to_string(),
            instance: None,
        }
    }

    /// A concrete owned copy with a fresh instance id.
    pub fn owned(title: &str) -> Self {
        Self {
            title: title.to_string(),
            instance: Some(Uuid::new_v4()),
        }
    }
}

/// An acquisition goal: a desired title and the subjective value the peer
/// places on owning it. Fixed for the trading session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Goal {
    pub title: String,
    pub value: Decimal,
}

impl Goal {
    pub fn new(title: &str, value: Decimal) -> Self {
        Self {
            title: title.to_string(),
            value,
        }
    }
}

/// The fixed catalog of tradeable titles and their base prices.
///
/// Every price band in the engine is anchored on a catalog base price; a
/// title absent from the catalog prices as zero-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    prices: BTreeMap<String, Decimal>,
}

impl Catalog {
    pub fn new(prices: BTreeMap<String, Decimal>) -> Self {
        Self { prices }
    }

    pub fn base_price(&self, title: &str) -> Option<Decimal> {
        self.prices.get(title).copied()
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.prices.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        crate::config::CatalogConfig::default().build()
    }
}
