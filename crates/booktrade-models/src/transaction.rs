use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::book::Book;

/// One completed negotiation, as reported to the ledger by each side.
///
/// Both counterparties submit a record under the same conversation id; the
/// ledger pairs them by that id and is the sole arbiter of whether the trade
/// is honored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionRecord {
    pub sender: String,
    pub receiver: String,
    pub conversation_id: Uuid,
    pub sending_books: Vec<Book>,
    pub sending_money: Decimal,
    pub receiving_books: Vec<Book>,
    pub receiving_money: Decimal,
}

impl TransactionRecord {
    /// The record the counterparty is expected to submit for the same trade.
    pub fn mirrored(&self) -> Self {
        Self {
            sender: self.receiver.clone(),
            receiver: self.sender.clone(),
            conversation_id: self.conversation_id,
            sending_books: self.receiving_books.clone(),
            sending_money: self.receiving_money,
            receiving_books: self.sending_books.clone(),
            receiving_money: self.sending_money,
        }
    }
}
