//! Point-credit wallet ledger.
//!
//! Every user owns a wallet: a non-negative balance and an append-only history. Value moves
//! between wallets through tips executed by [`engine::TransferEngine`], which never lets a
//! balance go negative, never applies a retried request twice and leaves no tip half done.
//!
//! ```text
//! src/
//! ├── transaction.rs - Ids, amounts, history entries
//! ├── ledger/        - LedgerStore trait and the in-memory store
//! ├── engine/        - Transfer protocol, retries, reversal
//! ├── audit.rs       - Structured audit events
//! ├── identity.rs    - Caller to account resolution
//! ├── request.rs     - Tip request/response boundary
//! ├── command.rs     - Replay CSV commands
//! └── config.rs      - Engine configuration
//! ```

pub mod audit;
pub mod command;
pub mod config;
pub mod engine;
pub mod identity;
pub mod ledger;
pub mod request;
pub mod transaction;
