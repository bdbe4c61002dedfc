//! Durable account balances and their append-only histories.
//!
//! [`LedgerStore`] is the persistence seam consumed by [`crate::engine`].
//! [`InMemoryLedgerStore`] implements it with one lock per account so writers on
//! different accounts never contend. Balance arithmetic lives in [`account`] as free
//! functions over [`AccountState`].

pub mod account;
pub mod in_memory;
pub mod records;
pub mod store;

pub use account::AccountState;
pub use in_memory::InMemoryLedgerStore;
pub use records::TransferRecord;
pub use records::UnresolvedTransfer;
pub use store::LedgerStore;
pub use store::Mutation;
pub use store::Page;
pub use store::PageRequest;
pub use store::StoreError;
