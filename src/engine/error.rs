use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

use crate::ledger::StoreError;
use crate::transaction::AccountId;
use crate::transaction::CorrelationId;
use crate::transaction::IdempotencyKeyError;
use crate::transaction::PositiveAmount;

/// Which side of an operation an account played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, parse_display::Display)]
#[serde(rename_all = "snake_case")]
#[display(style = "snake_case")]
pub enum AccountRole {
    Sender,
    Recipient,
    /// Target of a system-level earn or spend.
    Holder,
}

/// Stable, caller-facing error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, parse_display::Display)]
#[serde(rename_all = "snake_case")]
#[display(style = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidAmount,
    InvalidTransfer,
    InsufficientFunds,
    TransferFailed,
    StoreUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, parse_display::Display)]
pub enum InvalidAmountReason {
    #[display("must be greater than zero")]
    NotPositive,
    #[display("exceeds the per-transfer ceiling of {ceiling}")]
    AboveCeiling { ceiling: Decimal },
    #[display("would overflow the balance of the credited account")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq, parse_display::Display)]
pub enum InvalidTransferReason {
    #[display("sender and recipient are the same account")]
    SelfTransfer,
    #[display("malformed idempotency key: {0}")]
    MalformedIdempotencyKey(IdempotencyKeyError),
    #[display("idempotency key already used for a different transfer")]
    IdempotencyKeyReuse,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("{role} account not found account_id={account_id}")]
    NotFound { role: AccountRole, account_id: AccountId },
    #[error("invalid amount={amount}, {reason}")]
    InvalidAmount { amount: Decimal, reason: InvalidAmountReason },
    #[error("invalid transfer, {0}")]
    InvalidTransfer(InvalidTransferReason),
    #[error("insufficient funds account_id={account_id}, balance={balance}, requested={requested}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Decimal,
        requested: PositiveAmount,
    },
    #[error("transfer could not be completed reference={reference}, debit_reversed={debit_reversed}")]
    TransferFailed {
        reference: CorrelationId,
        debit_reversed: bool,
    },
    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(String),
}

impl TransferError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            Self::InvalidTransfer(_) => ErrorKind::InvalidTransfer,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::TransferFailed { .. } => ErrorKind::TransferFailed,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    /// Message safe to hand to callers: store internals are never included.
    pub fn public_message(&self) -> String {
        match self {
            Self::StoreUnavailable(_) => "ledger temporarily unavailable, retry later".to_owned(),
            Self::InsufficientFunds { .. } => "insufficient balance".to_owned(),
            Self::TransferFailed {
                reference,
                debit_reversed: true,
            } => format!("transfer could not be completed, no funds were moved, reference={reference}"),
            Self::TransferFailed {
                reference,
                debit_reversed: false,
            } => format!("transfer could not be completed and is pending reconciliation, reference={reference}"),
            other => other.to_string(),
        }
    }

    /// Maps a store error raised while touching the account playing `role`.
    pub(in crate::engine) fn from_store(error: StoreError, role: AccountRole, amount: Decimal) -> Self {
        match error {
            StoreError::NotFound(account_id) => Self::NotFound { role, account_id },
            StoreError::InsufficientFunds {
                account_id,
                balance,
                requested,
            } => Self::InsufficientFunds {
                account_id,
                balance,
                requested,
            },
            StoreError::Overflow { .. } => Self::InvalidAmount {
                amount,
                reason: InvalidAmountReason::Overflow,
            },
            other @ (StoreError::DirectionMismatch { .. }
            | StoreError::DuplicateAccount(_)
            | StoreError::Conflict
            | StoreError::Unavailable(_)
            | StoreError::Unsupported) => Self::StoreUnavailable(other.to_string()),
        }
    }
}
