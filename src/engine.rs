//! Transfer orchestration.
//!
//! Provides [`TransferEngine`] which validates tips, deduplicates them by idempotency key and
//! commits the debit and credit as one unit: through a multi-record transaction when the
//! [`crate::ledger::LedgerStore`] offers one, through debit, bounded credit retries and reversal
//! otherwise. [`TransferState`] names the steps a tip goes through.

mod error;
mod retry;
mod state;
pub mod transfer_engine;

pub use error::AccountRole;
pub use error::ErrorKind;
pub use error::InvalidAmountReason;
pub use error::InvalidTransferReason;
pub use error::TransferError;
pub use state::TransferState;
pub use transfer_engine::TransferCommand;
pub use transfer_engine::TransferEngine;
pub use transfer_engine::TransferReceipt;
