//! Structured audit trail of ledger mutations.
//!
//! Every transfer attempt ends in exactly one [`AuditEvent`]. [`TracingAuditSink`] forwards
//! them as `tracing` events on the `ledger::audit` target so a subscriber can route them to
//! external monitoring.

use std::sync::Mutex;
use std::sync::PoisonError;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::engine::ErrorKind;
use crate::transaction::AccountId;
use crate::transaction::CorrelationId;
use crate::transaction::TransactionId;
use crate::transaction::TransactionKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    TransferCommitted {
        correlation_id: CorrelationId,
        sender_id: AccountId,
        recipient_id: AccountId,
        amount: Decimal,
        sender_balance: Decimal,
        recipient_balance: Decimal,
    },
    TransferReplayed {
        correlation_id: CorrelationId,
        idempotency_key: String,
    },
    TransferRejected {
        sender_id: AccountId,
        recipient_id: AccountId,
        amount: Decimal,
        kind: ErrorKind,
        reason: String,
    },
    DebitReversed {
        correlation_id: CorrelationId,
        sender_id: AccountId,
        recipient_id: AccountId,
        amount: Decimal,
        reversal_transaction_id: TransactionId,
        reason: String,
    },
    TransferUnresolved {
        correlation_id: CorrelationId,
        sender_id: AccountId,
        recipient_id: AccountId,
        amount: Decimal,
        reason: String,
    },
    BalanceAdjusted {
        account_id: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        balance: Decimal,
    },
}

impl AuditEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TransferCommitted { .. } => "transfer_committed",
            Self::TransferReplayed { .. } => "transfer_replayed",
            Self::TransferRejected { .. } => "transfer_rejected",
            Self::DebitReversed { .. } => "debit_reversed",
            Self::TransferUnresolved { .. } => "transfer_unresolved",
            Self::BalanceAdjusted { .. } => "balance_adjusted",
        }
    }
}

pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, event: AuditEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let name = event.name();
        let payload = serde_json::to_string(&event).unwrap_or_else(|error| format!("{event:?} ({error})"));
        match event {
            AuditEvent::DebitReversed { .. } => warn!(target: "ledger::audit", event = name, %payload),
            AuditEvent::TransferUnresolved { .. } => error!(target: "ledger::audit", event = name, %payload),
            _ => info!(target: "ledger::audit", event = name, %payload),
        }
    }
}

/// Keeps events in memory, for tests and inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

impl<T: AuditSink + ?Sized> AuditSink for std::sync::Arc<T> {
    fn record(&self, event: AuditEvent) {
        (**self).record(event);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn audit_event_serializes_with_a_snake_case_tag() {
        let event = AuditEvent::TransferRejected {
            sender_id: AccountId(Uuid::from_u128(1)),
            recipient_id: AccountId(Uuid::from_u128(2)),
            amount: Decimal::from(30),
            kind: ErrorKind::InsufficientFunds,
            reason: "insufficient balance".to_owned(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "transfer_rejected");
        assert_eq!(json["kind"], "insufficient_funds");
        assert_eq!(json["amount"], "30");
    }

    #[test]
    fn memory_audit_sink_keeps_events_in_order() {
        let sink = MemoryAuditSink::default();
        let first = AuditEvent::TransferReplayed {
            correlation_id: CorrelationId(Uuid::from_u128(1)),
            idempotency_key: "a".to_owned(),
        };
        let second = AuditEvent::TransferReplayed {
            correlation_id: CorrelationId(Uuid::from_u128(2)),
            idempotency_key: "b".to_owned(),
        };
        sink.record(first.clone());
        sink.record(second.clone());
        assert_eq!(sink.events(), vec![first, second]);
    }
}
