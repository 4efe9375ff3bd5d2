use booktrade_models::{Book, Goal, PeerInfo};
use rust_decimal::Decimal;

/// One point-in-time copy of what the ledger said we own.
///
/// Negotiation code only ever reads a snapshot; a round keeps acting on the
/// snapshot it took even if a concurrent commit replaces the view mid-round.
#[derive(Debug, Clone, PartialEq)]
pub struct InventorySnapshot {
    pub books: Vec<Book>,
    pub goals: Vec<Goal>,
    pub money: Decimal,
}

impl InventorySnapshot {
    pub fn new(books: Vec<Book>, goals: Vec<Goal>, money: Decimal) -> Self {
        Self {
            books,
            goals,
            money,
        }
    }

    pub fn copies_of(&self, title: &str) -> usize {
        self.books.iter().filter(|b| b.title == title).count()
    }

    pub fn owns_title(&self, title: &str) -> bool {
        self.books.iter().any(|b| b.title == title)
    }

    pub fn is_goal_title(&self, title: &str) -> bool {
        self.goals.iter().any(|g| g.title == title)
    }

    pub fn goal_by_title(&self, title: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.title == title)
    }

    /// A goal is satisfied once any copy of its title is owned.
    pub fn goal_satisfied(&self, goal: &Goal) -> bool {
        self.owns_title(&goal.title)
    }

    pub fn unmet_goals(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter().filter(|g| !self.owns_title(&g.title))
    }

    /// An owned copy of `title` that may be given away without breaking the
    /// goal-retention invariant: the title must be owned, and a goal title
    /// may only be surrendered when a spare copy remains.
    pub fn sellable_instance(&self, title: &str) -> Option<&Book> {
        if self.is_goal_title(title) && self.copies_of(title) < 2 {
            return None;
        }
        self.books.iter().find(|b| b.title == title)
    }

    pub fn can_supply(&self, title: &str) -> bool {
        self.sellable_instance(title).is_some()
    }
}

impl From<PeerInfo> for InventorySnapshot {
    fn from(info: PeerInfo) -> Self {
        Self {
            books: info.books,
            goals: info.goals,
            money: info.money,
        }
    }
}
