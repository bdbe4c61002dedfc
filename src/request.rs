//! Request boundary for tips.
//!
//! Takes `{recipientId, amount, idempotencyKey}` from an authenticated caller and answers
//! with `{senderBalance, recipientBalance, transactionId}` or a stable `{kind, message}`.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::audit::AuditSink;
use crate::engine::ErrorKind;
use crate::engine::TransferCommand;
use crate::engine::TransferEngine;
use crate::engine::TransferError;
use crate::identity::Caller;
use crate::identity::IdentityResolver;
use crate::ledger::LedgerStore;
use crate::transaction::AccountId;
use crate::transaction::CorrelationId;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipRequest {
    pub recipient_id: AccountId,
    pub amount: Decimal,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TipResponse {
    pub sender_balance: Decimal,
    pub recipient_balance: Decimal,
    pub transaction_id: CorrelationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TransferError> for ErrorResponse {
    fn from(error: &TransferError) -> Self {
        Self {
            kind: error.kind(),
            message: error.public_message(),
        }
    }
}

/// Runs a tip on behalf of `caller`.
pub async fn handle_tip<S, A, R>(
    engine: &TransferEngine<S, A>,
    resolver: &R,
    caller: &Caller,
    request: TipRequest,
) -> Result<TipResponse, ErrorResponse>
where
    S: LedgerStore,
    A: AuditSink,
    R: IdentityResolver + ?Sized,
{
    let Some(sender_id) = resolver.resolve(caller) else {
        warn!(user_id = %caller.user_id, "caller has no wallet");
        return Err(ErrorResponse {
            kind: ErrorKind::NotFound,
            message: "caller has no wallet".to_owned(),
        });
    };

    let command = TransferCommand {
        sender_id,
        recipient_id: request.recipient_id,
        amount: request.amount,
        idempotency_key: request.idempotency_key,
    };
    engine
        .transfer(command)
        .await
        .map(|receipt| TipResponse {
            sender_balance: receipt.sender_balance,
            recipient_balance: receipt.recipient_balance,
            transaction_id: receipt.correlation_id,
        })
        .map_err(|error| ErrorResponse::from(&error))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::LedgerConfig;
    use crate::identity::UserDirectory;
    use crate::ledger::InMemoryLedgerStore;

    async fn setup() -> (TransferEngine<InMemoryLedgerStore, MemoryAuditSink>, UserDirectory) {
        let directory = UserDirectory::new();
        let engine = TransferEngine::with_audit_sink(
            Arc::new(InMemoryLedgerStore::new()),
            LedgerConfig::default(),
            MemoryAuditSink::default(),
        );
        engine
            .earn(directory.account_id("alice").unwrap(), Decimal::from(100))
            .await
            .unwrap();
        engine
            .open_account(directory.account_id("bob").unwrap())
            .await
            .unwrap();
        (engine, directory)
    }

    fn request(directory: &UserDirectory, json_amount: &str) -> TipRequest {
        let recipient = directory.account_id("bob").unwrap();
        serde_json::from_str(&format!(
            r#"{{"recipientId":"{recipient}","amount":"{json_amount}","idempotencyKey":"k-1"}}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn handle_tip_returns_both_balances_and_the_transaction_id() {
        let (engine, directory) = setup().await;

        let response = handle_tip(&engine, &directory, &Caller::new("alice"), request(&directory, "30"))
            .await
            .unwrap();

        assert_eq!(response.sender_balance, Decimal::from(70));
        assert_eq!(response.recipient_balance, Decimal::from(30));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["senderBalance"], "70");
        assert_eq!(json["transactionId"], response.transaction_id.to_string());
    }

    #[tokio::test]
    async fn handle_tip_maps_errors_to_kind_and_message_only() {
        let (engine, directory) = setup().await;

        let error = handle_tip(&engine, &directory, &Caller::new("alice"), request(&directory, "300"))
            .await
            .unwrap_err();

        assert_eq!(
            error,
            ErrorResponse {
                kind: ErrorKind::InsufficientFunds,
                message: "insufficient balance".to_owned(),
            }
        );
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["kind"], "insufficient_funds");
    }

    #[tokio::test]
    async fn handle_tip_from_unresolvable_caller_returns_not_found() {
        let (engine, directory) = setup().await;
        let error = handle_tip(&engine, &directory, &Caller::new(""), request(&directory, "1"))
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn handle_tip_to_self_returns_invalid_transfer() {
        let (engine, directory) = setup().await;
        let mut tip = request(&directory, "1");
        tip.recipient_id = directory.account_id("alice").unwrap();
        let error = handle_tip(&engine, &directory, &Caller::new("alice"), tip)
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidTransfer);
    }
}
