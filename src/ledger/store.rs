use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::ledger::TransferRecord;
use crate::ledger::UnresolvedTransfer;
use crate::transaction::AccountId;
use crate::transaction::Delta;
use crate::transaction::Direction;
use crate::transaction::IdempotencyKey;
use crate::transaction::LedgerEntry;
use crate::transaction::NewEntry;
use crate::transaction::PositiveAmount;
use crate::transaction::TransactionKind;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("account not found account_id={0}")]
    NotFound(AccountId),
    #[error("insufficient funds account_id={account_id}, balance={balance}, requested={requested}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Decimal,
        requested: PositiveAmount,
    },
    #[error("balance overflow account_id={account_id}")]
    Overflow { account_id: AccountId },
    #[error("entry kind={kind} cannot be applied as a {direction}")]
    DirectionMismatch { kind: TransactionKind, direction: Direction },
    #[error("both mutations target account_id={0}")]
    DuplicateAccount(AccountId),
    #[error("write conflict, retry")]
    Conflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("multi-record transactions not supported by this store")]
    Unsupported,
}

impl StoreError {
    /// Errors worth retrying with backoff; everything else is a definitive answer.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict | Self::Unavailable(_))
    }
}

/// One side of a multi-record mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub account_id: AccountId,
    pub delta: Delta,
    pub entry: NewEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { offset: 0, limit: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub next_offset: Option<usize>,
}

impl<T: Clone> Page<T> {
    pub fn slice(all: &[T], request: PageRequest) -> Self {
        let start = request.offset.min(all.len());
        let end = start.saturating_add(request.limit).min(all.len());
        Self {
            items: all[start..end].to_vec(),
            total: all.len(),
            next_offset: (end < all.len()).then_some(end),
        }
    }
}

/// Persistence contract of the ledger.
///
/// Implementations must make [`LedgerStore::apply_delta`] indivisible per account: two
/// concurrent calls on the same account serialize and neither update is lost. Reads are
/// snapshots and never an authority on funds availability.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Creates an empty account if absent. Returns whether it was created.
    async fn open_account(&self, account_id: AccountId) -> Result<bool, StoreError>;

    async fn contains(&self, account_id: AccountId) -> Result<bool, StoreError>;

    async fn get_balance(&self, account_id: AccountId) -> Result<Decimal, StoreError>;

    /// Applies `delta` and appends `entry` only if the balance stays non-negative.
    async fn apply_delta(&self, account_id: AccountId, delta: Delta, entry: NewEntry) -> Result<Decimal, StoreError>;

    async fn get_history(&self, account_id: AccountId, page: PageRequest) -> Result<Page<LedgerEntry>, StoreError>;

    fn supports_multi_record_transactions(&self) -> bool {
        false
    }

    /// Applies both mutations or neither, returning the new balances in argument order.
    async fn apply_pair(&self, _first: Mutation, _second: Mutation) -> Result<(Decimal, Decimal), StoreError> {
        Err(StoreError::Unsupported)
    }

    async fn find_receipt(&self, key: &IdempotencyKey) -> Result<Option<TransferRecord>, StoreError>;

    async fn record_receipt(&self, key: IdempotencyKey, record: TransferRecord) -> Result<(), StoreError>;

    async fn flag_for_reconciliation(&self, transfer: UnresolvedTransfer) -> Result<(), StoreError>;

    async fn unresolved_transfers(&self) -> Result<Vec<UnresolvedTransfer>, StoreError>;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(PageRequest { offset: 0, limit: 2 }, vec![1, 2], Some(2))]
    #[case(PageRequest { offset: 2, limit: 2 }, vec![3, 4], Some(4))]
    #[case(PageRequest { offset: 4, limit: 2 }, vec![5], None)]
    #[case(PageRequest { offset: 9, limit: 2 }, vec![], None)]
    fn page_slice_returns_the_expected_items(
        #[case] request: PageRequest,
        #[case] expected: Vec<i32>,
        #[case] expected_next: Option<usize>,
    ) {
        let page = Page::slice(&[1, 2, 3, 4, 5], request);
        assert_eq!(page.items, expected);
        assert_eq!(page.next_offset, expected_next);
        assert_eq!(page.total, 5);
    }

    #[rstest]
    #[case(StoreError::Conflict, true)]
    #[case(StoreError::Unavailable("down".into()), true)]
    #[case(StoreError::Unsupported, false)]
    fn store_error_is_transient_returns_the_expected_value(#[case] error: StoreError, #[case] expected: bool) {
        assert_eq!(error.is_transient(), expected);
    }
}
