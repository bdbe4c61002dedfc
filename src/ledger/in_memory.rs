use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use crate::ledger::LedgerStore;
use crate::ledger::Mutation;
use crate::ledger::Page;
use crate::ledger::PageRequest;
use crate::ledger::StoreError;
use crate::ledger::TransferRecord;
use crate::ledger::UnresolvedTransfer;
use crate::ledger::account;
use crate::ledger::account::AccountState;
use crate::transaction::AccountId;
use crate::transaction::Delta;
use crate::transaction::IdempotencyKey;
use crate::transaction::LedgerEntry;
use crate::transaction::NewEntry;

/// [`LedgerStore`] kept in process memory.
///
/// Every account sits behind its own lock; the index lock is only taken to look an
/// account up or to open one. Write locks are held for the synchronous check-and-apply
/// only.
pub struct InMemoryLedgerStore {
    accounts: RwLock<HashMap<AccountId, Arc<RwLock<AccountState>>>>,
    receipts: RwLock<HashMap<IdempotencyKey, TransferRecord>>,
    unresolved: RwLock<Vec<UnresolvedTransfer>>,
    multi_record_transactions: bool,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            receipts: RwLock::new(HashMap::new()),
            unresolved: RwLock::new(Vec::new()),
            multi_record_transactions: true,
        }
    }

    /// Toggles [`LedgerStore::apply_pair`] support, forcing callers onto single-account writes when off.
    pub const fn with_multi_record_transactions(mut self, enabled: bool) -> Self {
        self.multi_record_transactions = enabled;
        self
    }

    async fn account(&self, account_id: AccountId) -> Result<Arc<RwLock<AccountState>>, StoreError> {
        self.accounts
            .read()
            .await
            .get(&account_id)
            .cloned()
            .ok_or(StoreError::NotFound(account_id))
    }

    /// Sum of all balances, for conservation checks.
    pub async fn total_balance(&self) -> Decimal {
        let accounts: Vec<_> = self.accounts.read().await.values().cloned().collect();
        let mut total = Decimal::ZERO;
        for account in accounts {
            total += account.read().await.balance();
        }
        total
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn open_account(&self, account_id: AccountId) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account_id) {
            return Ok(false);
        }
        accounts.insert(account_id, Arc::new(RwLock::new(AccountState::new(account_id))));
        debug!(%account_id, "account opened");
        Ok(true)
    }

    async fn contains(&self, account_id: AccountId) -> Result<bool, StoreError> {
        Ok(self.accounts.read().await.contains_key(&account_id))
    }

    async fn get_balance(&self, account_id: AccountId) -> Result<Decimal, StoreError> {
        let account = self.account(account_id).await?;
        let balance = account.read().await.balance();
        Ok(balance)
    }

    async fn apply_delta(&self, account_id: AccountId, delta: Delta, entry: NewEntry) -> Result<Decimal, StoreError> {
        let account = self.account(account_id).await?;
        let mut state = account.write().await;
        let transaction_id = entry.transaction_id;
        let balance = account::apply(&mut state, delta, entry, Utc::now())?;
        debug!(%account_id, %delta, %transaction_id, %balance, "delta applied");
        Ok(balance)
    }

    async fn get_history(&self, account_id: AccountId, page: PageRequest) -> Result<Page<LedgerEntry>, StoreError> {
        let account = self.account(account_id).await?;
        let state = account.read().await;
        Ok(Page::slice(state.history(), page))
    }

    fn supports_multi_record_transactions(&self) -> bool {
        self.multi_record_transactions
    }

    async fn apply_pair(&self, first: Mutation, second: Mutation) -> Result<(Decimal, Decimal), StoreError> {
        if !self.multi_record_transactions {
            return Err(StoreError::Unsupported);
        }
        if first.account_id == second.account_id {
            return Err(StoreError::DuplicateAccount(first.account_id));
        }

        let first_lock = self.account(first.account_id).await?;
        let second_lock = self.account(second.account_id).await?;

        // Lower id is always locked first so opposite-direction pairs cannot deadlock.
        let (mut first_state, mut second_state) = if first.account_id < second.account_id {
            let first_guard = first_lock.write().await;
            let second_guard = second_lock.write().await;
            (first_guard, second_guard)
        } else {
            let second_guard = second_lock.write().await;
            let first_guard = first_lock.write().await;
            (first_guard, second_guard)
        };

        account::check_apply(&first_state, first.delta, &first.entry)?;
        account::check_apply(&second_state, second.delta, &second.entry)?;

        let now = Utc::now();
        let first_balance = account::apply(&mut first_state, first.delta, first.entry, now)?;
        let second_balance = account::apply(&mut second_state, second.delta, second.entry, now)?;
        debug!(
            first_account_id = %first.account_id,
            second_account_id = %second.account_id,
            %first_balance,
            %second_balance,
            "pair applied"
        );

        Ok((first_balance, second_balance))
    }

    async fn find_receipt(&self, key: &IdempotencyKey) -> Result<Option<TransferRecord>, StoreError> {
        Ok(self.receipts.read().await.get(key).cloned())
    }

    async fn record_receipt(&self, key: IdempotencyKey, record: TransferRecord) -> Result<(), StoreError> {
        self.receipts.write().await.insert(key, record);
        Ok(())
    }

    async fn flag_for_reconciliation(&self, transfer: UnresolvedTransfer) -> Result<(), StoreError> {
        self.unresolved.write().await.push(transfer);
        Ok(())
    }

    async fn unresolved_transfers(&self) -> Result<Vec<UnresolvedTransfer>, StoreError> {
        Ok(self.unresolved.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::transaction::CorrelationId;
    use crate::transaction::PositiveAmount;
    use crate::transaction::TransactionKind;

    const ALICE: AccountId = AccountId(Uuid::from_u128(1));
    const BOB: AccountId = AccountId(Uuid::from_u128(2));

    fn amount(value: i64) -> PositiveAmount {
        PositiveAmount::try_from(Decimal::from(value)).unwrap()
    }

    async fn store_with(balances: &[(AccountId, i64)]) -> InMemoryLedgerStore {
        let store = InMemoryLedgerStore::new();
        for (account_id, balance) in balances {
            store.open_account(*account_id).await.unwrap();
            if *balance > 0 {
                store
                    .apply_delta(
                        *account_id,
                        Delta::credit(amount(*balance)),
                        NewEntry::system(TransactionKind::Earn),
                    )
                    .await
                    .unwrap();
            }
        }
        store
    }

    fn tip_pair(sender: AccountId, recipient: AccountId, value: i64) -> (Mutation, Mutation) {
        let correlation_id = CorrelationId::new();
        (
            Mutation {
                account_id: sender,
                delta: Delta::debit(amount(value)),
                entry: NewEntry::correlated(TransactionKind::Tip, recipient, correlation_id),
            },
            Mutation {
                account_id: recipient,
                delta: Delta::credit(amount(value)),
                entry: NewEntry::correlated(TransactionKind::Earn, sender, correlation_id),
            },
        )
    }

    #[tokio::test]
    async fn open_account_is_idempotent() {
        let store = InMemoryLedgerStore::new();
        assert!(store.open_account(ALICE).await.unwrap());
        assert!(!store.open_account(ALICE).await.unwrap());
        assert_eq!(store.get_balance(ALICE).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn get_balance_of_unknown_account_returns_not_found() {
        let store = InMemoryLedgerStore::new();
        assert2::let_assert!(Err(StoreError::NotFound(account_id)) = store.get_balance(ALICE).await);
        assert_eq!(account_id, ALICE);
    }

    #[tokio::test]
    async fn apply_delta_insufficient_funds_does_not_append_history() {
        let store = store_with(&[(ALICE, 10)]).await;
        let res = store
            .apply_delta(ALICE, Delta::debit(amount(11)), NewEntry::system(TransactionKind::Spend))
            .await;
        assert2::let_assert!(Err(StoreError::InsufficientFunds { .. }) = res);
        let history = store.get_history(ALICE, PageRequest::default()).await.unwrap();
        assert_eq!(history.total, 1);
        assert_eq!(store.get_balance(ALICE).await.unwrap(), Decimal::from(10));
    }

    #[tokio::test]
    async fn apply_pair_credit_failure_leaves_debit_side_untouched() {
        let store = store_with(&[(ALICE, 100), (BOB, 0)]).await;
        let (debit, mut credit) = tip_pair(ALICE, BOB, 30);
        credit.entry.kind = TransactionKind::Tip;

        let res = store.apply_pair(debit, credit).await;

        assert2::let_assert!(Err(StoreError::DirectionMismatch { .. }) = res);
        assert_eq!(store.get_balance(ALICE).await.unwrap(), Decimal::from(100));
        assert_eq!(store.get_history(ALICE, PageRequest::default()).await.unwrap().total, 1);
        assert_eq!(store.get_history(BOB, PageRequest::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn apply_pair_returns_balances_in_argument_order_regardless_of_lock_order() {
        let store = store_with(&[(ALICE, 0), (BOB, 50)]).await;
        let (debit, credit) = tip_pair(BOB, ALICE, 20);
        let balances = store.apply_pair(debit, credit).await.unwrap();
        assert_eq!(balances, (Decimal::from(30), Decimal::from(20)));
    }

    #[tokio::test]
    async fn apply_pair_is_refused_when_multi_record_transactions_are_off() {
        let store = InMemoryLedgerStore::new().with_multi_record_transactions(false);
        store.open_account(ALICE).await.unwrap();
        store.open_account(BOB).await.unwrap();
        let (debit, credit) = tip_pair(ALICE, BOB, 1);
        assert!(!store.supports_multi_record_transactions());
        assert_eq!(store.apply_pair(debit, credit).await, Err(StoreError::Unsupported));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_apply_delta_loses_no_updates() {
        let store = Arc::new(store_with(&[(ALICE, 0)]).await);
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .apply_delta(ALICE, Delta::credit(amount(1)), NewEntry::system(TransactionKind::Earn))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.get_balance(ALICE).await.unwrap(), Decimal::from(64));
        assert_eq!(store.get_history(ALICE, PageRequest::default()).await.unwrap().total, 64);
    }
}
