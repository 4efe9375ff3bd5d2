use std::sync::{Arc, RwLock};

use crate::snapshot::InventorySnapshot;

/// Shared local cache of the ledger's answer to "what do I own".
///
/// The cache is replaced wholesale after every confirmed commit and is never
/// patched incrementally; the ledger is authoritative and this copy has no
/// independent write path. Readers take an `Arc` snapshot and keep using it,
/// so a round can act on state that goes stale mid-round. That is accepted
/// behavior, not something to lock away (see the race tests in the engine).
#[derive(Clone)]
pub struct InventoryView {
    inner: Arc<RwLock<Arc<InventorySnapshot>>>,
}

impl InventoryView {
    pub fn new(initial: InventorySnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// Cheap clone of the current snapshot; may be stale by the time it is
    /// used.
    pub fn snapshot(&self) -> Arc<InventorySnapshot> {
        // The lock only guards the Arc swap; a poisoned guard still holds a
        // valid snapshot.
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Wholesale replacement with a fresh ledger read.
    pub fn replace(&self, snapshot: InventorySnapshot) {
        let fresh = Arc::new(snapshot);
        match self.inner.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booktrade_models::{Book, Goal};
    use rust_decimal_macros::dec;

    #[test]
    fn replace_swaps_the_whole_snapshot() {
        let view = InventoryView::new(InventorySnapshot::new(
            vec![Book::owned("Dune")],
            vec![Goal::new("Hamlet", dec!(30))],
            dec!(100),
        ));

        view.replace(InventorySnapshot::new(vec![], vec![], dec!(61)));

        let snap = view.snapshot();
        assert!(snap.books.is_empty());
        assert!(snap.goals.is_empty());
        assert_eq!(snap.money, dec!(61));
    }

    #[test]
    fn old_snapshots_survive_replacement() {
        let view = InventoryView::new(InventorySnapshot::new(
            vec![Book::owned("Dune")],
            vec![],
            dec!(100),
        ));

        let stale = view.snapshot();
        view.replace(InventorySnapshot::new(vec![], vec![], dec!(0)));

        // The earlier reader still sees the state it took.
        assert_eq!(stale.copies_of("Dune"), 1);
        assert_eq!(view.snapshot().copies_of("Dune"), 0);
    }
}
