use chrono::DateTime;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

use crate::transaction::AccountId;
use crate::transaction::CorrelationId;
use crate::transaction::PositiveAmount;
use crate::transaction::TransactionId;

/// A committed tip, persisted under its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub correlation_id: CorrelationId,
    pub sender_id: AccountId,
    pub recipient_id: AccountId,
    pub amount: PositiveAmount,
    pub debit_transaction_id: TransactionId,
    pub credit_transaction_id: TransactionId,
    pub sender_balance: Decimal,
    pub recipient_balance: Decimal,
    pub committed_at: DateTime<Utc>,
}

impl TransferRecord {
    /// Whether a retried request carries the arguments this record was committed with.
    pub fn matches(&self, sender_id: AccountId, recipient_id: AccountId, amount: PositiveAmount) -> bool {
        self.sender_id == sender_id && self.recipient_id == recipient_id && self.amount == amount
    }
}

/// A tip whose sender was debited but neither credited nor reversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedTransfer {
    pub correlation_id: CorrelationId,
    pub sender_id: AccountId,
    pub recipient_id: AccountId,
    pub amount: PositiveAmount,
    pub debit_transaction_id: TransactionId,
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
}
