use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::Instrument as _;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::info_span;
use tracing::warn;

use crate::audit::AuditEvent;
use crate::audit::AuditSink;
use crate::audit::TracingAuditSink;
use crate::config::LedgerConfig;
use crate::engine::error::AccountRole;
use crate::engine::error::InvalidAmountReason;
use crate::engine::error::InvalidTransferReason;
use crate::engine::error::TransferError;
use crate::engine::retry::with_retry;
use crate::engine::state::TransferState;
use crate::ledger::LedgerStore;
use crate::ledger::Mutation;
use crate::ledger::Page;
use crate::ledger::PageRequest;
use crate::ledger::StoreError;
use crate::ledger::TransferRecord;
use crate::ledger::UnresolvedTransfer;
use crate::transaction::AccountId;
use crate::transaction::CorrelationId;
use crate::transaction::Delta;
use crate::transaction::IdempotencyKey;
use crate::transaction::LedgerEntry;
use crate::transaction::NewEntry;
use crate::transaction::PositiveAmount;
use crate::transaction::TransactionId;
use crate::transaction::TransactionKind;

#[cfg(test)]
#[path = "tests/transfer_engine_tests.rs"]
mod transfer_engine_tests;

/// A tip as requested by an already authenticated sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    pub sender_id: AccountId,
    pub recipient_id: AccountId,
    pub amount: Decimal,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub correlation_id: CorrelationId,
    pub sender_balance: Decimal,
    pub recipient_balance: Decimal,
    pub debit_transaction_id: TransactionId,
    pub credit_transaction_id: TransactionId,
    /// Set when the receipt was served from an earlier commit under the same key.
    pub replayed: bool,
}

impl TransferReceipt {
    fn from_record(record: &TransferRecord, replayed: bool) -> Self {
        Self {
            correlation_id: record.correlation_id,
            sender_balance: record.sender_balance,
            recipient_balance: record.recipient_balance,
            debit_transaction_id: record.debit_transaction_id,
            credit_transaction_id: record.credit_transaction_id,
            replayed,
        }
    }
}

/// A command that passed every check not requiring the store.
struct ValidTransfer {
    sender_id: AccountId,
    recipient_id: AccountId,
    amount: PositiveAmount,
    idempotency_key: IdempotencyKey,
}

/// Both halves of a tip, sharing one correlation id.
struct TipLegs {
    correlation_id: CorrelationId,
    debit: NewEntry,
    credit: NewEntry,
}

/// Moves value between accounts held in a [`LedgerStore`].
///
/// The only writer of balances: every mutation goes through [`TransferEngine::transfer`],
/// [`TransferEngine::earn`] or [`TransferEngine::spend`]. Constructed once with the store
/// handle; clones share the same store, audit sink and idempotency locks.
pub struct TransferEngine<S, A = TracingAuditSink> {
    store: Arc<S>,
    config: Arc<LedgerConfig>,
    audit: Arc<A>,
    key_locks: Arc<Mutex<HashMap<IdempotencyKey, Arc<Mutex<()>>>>>,
}

impl<S, A> Clone for TransferEngine<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            audit: Arc::clone(&self.audit),
            key_locks: Arc::clone(&self.key_locks),
        }
    }
}

impl<S: LedgerStore> TransferEngine<S, TracingAuditSink> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self::with_audit_sink(store, config, TracingAuditSink)
    }
}

impl<S: LedgerStore, A: AuditSink> TransferEngine<S, A> {
    pub fn with_audit_sink(store: Arc<S>, config: LedgerConfig, audit: A) -> Self {
        Self {
            store,
            config: Arc::new(config),
            audit: Arc::new(audit),
            key_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Transfers `command.amount` from sender to recipient, all or nothing.
    ///
    /// Replays the recorded receipt when `command.idempotency_key` already committed a
    /// transfer with the same arguments.
    ///
    /// Once validated, the transfer runs on its own task: dropping the returned future
    /// (timeout, client gone) never leaves a debit without its credit, reversal or
    /// reconciliation flag.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Sender and recipient are the same, or the key is malformed or reused
    ///   ([`TransferError::InvalidTransfer`]).
    /// - The amount is not positive or exceeds the ceiling ([`TransferError::InvalidAmount`]).
    /// - Either account is missing ([`TransferError::NotFound`]).
    /// - The sender cannot cover the amount ([`TransferError::InsufficientFunds`]).
    /// - The credit could not be completed after the debit ([`TransferError::TransferFailed`]).
    /// - The store kept failing before anything was mutated ([`TransferError::StoreUnavailable`]).
    pub async fn transfer(&self, command: TransferCommand) -> Result<TransferReceipt, TransferError> {
        let span = info_span!(
            "transfer",
            sender_id = %command.sender_id,
            recipient_id = %command.recipient_id,
            amount = %command.amount,
            idempotency_key = %command.idempotency_key,
        );
        async {
            let transfer = match self.validate(&command) {
                Ok(transfer) => transfer,
                Err(error) => {
                    self.reject(&command, &error);
                    return Err(error);
                }
            };

            let engine = self.clone();
            let task = tokio::spawn(async move { engine.run_transfer(command, transfer).await }.in_current_span());
            match task.await {
                Ok(res) => res,
                Err(join_error) if join_error.is_panic() => std::panic::resume_unwind(join_error.into_panic()),
                Err(join_error) => Err(TransferError::StoreUnavailable(join_error.to_string())),
            }
        }
        .instrument(span)
        .await
    }

    async fn run_transfer(&self, command: TransferCommand, transfer: ValidTransfer) -> Result<TransferReceipt, TransferError> {
        let key_lock = self.key_lock(&transfer.idempotency_key).await;
        let res = {
            let _guard = key_lock.lock().await;
            self.transfer_under_key(&transfer).await
        };
        self.release_key_lock(&transfer.idempotency_key, key_lock).await;

        if let Err(error) = &res
            && matches!(
                error,
                TransferError::NotFound { .. }
                    | TransferError::InvalidAmount { .. }
                    | TransferError::InvalidTransfer(_)
                    | TransferError::InsufficientFunds { .. }
                    | TransferError::StoreUnavailable(_)
            )
        {
            self.reject(&command, error);
        }
        res
    }

    /// Credits `amount` to `account_id` as a system `earn`, opening the account if needed.
    pub async fn earn(&self, account_id: AccountId, amount: Decimal) -> Result<Decimal, TransferError> {
        let amount = self.validate_amount(amount)?;
        self.retry_store(|| self.store.open_account(account_id))
            .await
            .map_err(|error| TransferError::from_store(error, AccountRole::Holder, amount.as_inner()))?;
        self.adjust(account_id, Delta::credit(amount), TransactionKind::Earn).await
    }

    /// Debits `amount` from `account_id` as a system `spend`.
    pub async fn spend(&self, account_id: AccountId, amount: Decimal) -> Result<Decimal, TransferError> {
        let amount = self.validate_amount(amount)?;
        self.adjust(account_id, Delta::debit(amount), TransactionKind::Spend).await
    }

    /// Opens an empty wallet. Returns whether it was newly created.
    pub async fn open_account(&self, account_id: AccountId) -> Result<bool, TransferError> {
        let created = self
            .retry_store(|| self.store.open_account(account_id))
            .await
            .map_err(|error| TransferError::from_store(error, AccountRole::Holder, Decimal::ZERO))?;
        if created {
            info!(%account_id, "wallet opened");
        }
        Ok(created)
    }

    /// Snapshot read: never use it to decide whether funds are available.
    pub async fn balance(&self, account_id: AccountId) -> Result<Decimal, TransferError> {
        self.retry_store(|| self.store.get_balance(account_id))
            .await
            .map_err(|error| TransferError::from_store(error, AccountRole::Holder, Decimal::ZERO))
    }

    pub async fn history(&self, account_id: AccountId, page: PageRequest) -> Result<Page<LedgerEntry>, TransferError> {
        let page = PageRequest {
            limit: page.limit.min(self.config.max_page_size).max(1),
            ..page
        };
        self.retry_store(|| self.store.get_history(account_id, page))
            .await
            .map_err(|error| TransferError::from_store(error, AccountRole::Holder, Decimal::ZERO))
    }

    fn validate(&self, command: &TransferCommand) -> Result<ValidTransfer, TransferError> {
        if command.sender_id == command.recipient_id {
            return Err(TransferError::InvalidTransfer(InvalidTransferReason::SelfTransfer));
        }
        let idempotency_key = IdempotencyKey::try_from(command.idempotency_key.as_str())
            .map_err(|error| TransferError::InvalidTransfer(InvalidTransferReason::MalformedIdempotencyKey(error)))?;
        let amount = self.validate_amount(command.amount)?;
        Ok(ValidTransfer {
            sender_id: command.sender_id,
            recipient_id: command.recipient_id,
            amount,
            idempotency_key,
        })
    }

    fn validate_amount(&self, amount: Decimal) -> Result<PositiveAmount, TransferError> {
        let positive = PositiveAmount::try_from(amount).map_err(|_| TransferError::InvalidAmount {
            amount,
            reason: InvalidAmountReason::NotPositive,
        })?;
        if amount > self.config.max_transfer_amount {
            return Err(TransferError::InvalidAmount {
                amount,
                reason: InvalidAmountReason::AboveCeiling {
                    ceiling: self.config.max_transfer_amount,
                },
            });
        }
        Ok(positive)
    }

    async fn transfer_under_key(&self, transfer: &ValidTransfer) -> Result<TransferReceipt, TransferError> {
        let recorded = self
            .retry_store(|| self.store.find_receipt(&transfer.idempotency_key))
            .await
            .map_err(|error| TransferError::StoreUnavailable(error.to_string()))?;
        if let Some(record) = recorded {
            if !record.matches(transfer.sender_id, transfer.recipient_id, transfer.amount) {
                return Err(TransferError::InvalidTransfer(
                    InvalidTransferReason::IdempotencyKeyReuse,
                ));
            }
            debug!(correlation_id = %record.correlation_id, "replaying recorded transfer");
            self.audit.record(AuditEvent::TransferReplayed {
                correlation_id: record.correlation_id,
                idempotency_key: transfer.idempotency_key.to_string(),
            });
            return Ok(TransferReceipt::from_record(&record, true));
        }

        self.ensure_exists(transfer.sender_id, AccountRole::Sender).await?;
        self.ensure_exists(transfer.recipient_id, AccountRole::Recipient).await?;

        let correlation_id = CorrelationId::new();
        let legs = TipLegs {
            correlation_id,
            debit: NewEntry::correlated(TransactionKind::Tip, transfer.recipient_id, correlation_id),
            credit: NewEntry::correlated(TransactionKind::Earn, transfer.sender_id, correlation_id),
        };
        let debit_transaction_id = legs.debit.transaction_id;
        let credit_transaction_id = legs.credit.transaction_id;

        let (sender_balance, recipient_balance) = if self.store.supports_multi_record_transactions() {
            self.commit_atomically(transfer, legs).await?
        } else {
            self.commit_with_compensation(transfer, legs).await?
        };

        let record = TransferRecord {
            correlation_id,
            sender_id: transfer.sender_id,
            recipient_id: transfer.recipient_id,
            amount: transfer.amount,
            debit_transaction_id,
            credit_transaction_id,
            sender_balance,
            recipient_balance,
            committed_at: Utc::now(),
        };
        if let Err(error) = self
            .retry_store(|| self.store.record_receipt(transfer.idempotency_key.clone(), record.clone()))
            .await
        {
            // Funds already moved; a retry with this key would execute again.
            error!(%correlation_id, %error, "failed to record idempotency receipt");
        }

        info!(%correlation_id, %sender_balance, %recipient_balance, "transfer committed");
        self.audit.record(AuditEvent::TransferCommitted {
            correlation_id,
            sender_id: transfer.sender_id,
            recipient_id: transfer.recipient_id,
            amount: transfer.amount.as_inner(),
            sender_balance,
            recipient_balance,
        });
        Ok(TransferReceipt::from_record(&record, false))
    }

    async fn commit_atomically(
        &self,
        transfer: &ValidTransfer,
        legs: TipLegs,
    ) -> Result<(Decimal, Decimal), TransferError> {
        let debit = Mutation {
            account_id: transfer.sender_id,
            delta: Delta::debit(transfer.amount),
            entry: legs.debit,
        };
        let credit = Mutation {
            account_id: transfer.recipient_id,
            delta: Delta::credit(transfer.amount),
            entry: legs.credit,
        };

        let res = self
            .retry_store(|| self.store.apply_pair(debit.clone(), credit.clone()))
            .await;
        match res {
            Ok(balances) => {
                transition(legs.correlation_id, TransferState::Initiated, TransferState::Credited);
                Ok(balances)
            }
            Err(error) => {
                transition(legs.correlation_id, TransferState::Initiated, TransferState::Rejected);
                let role = match &error {
                    StoreError::NotFound(account_id) if *account_id == transfer.recipient_id => AccountRole::Recipient,
                    StoreError::Overflow { .. } => AccountRole::Recipient,
                    _ => AccountRole::Sender,
                };
                Err(TransferError::from_store(error, role, transfer.amount.as_inner()))
            }
        }
    }

    async fn commit_with_compensation(
        &self,
        transfer: &ValidTransfer,
        legs: TipLegs,
    ) -> Result<(Decimal, Decimal), TransferError> {
        let correlation_id = legs.correlation_id;

        let sender_balance = match self
            .retry_store(|| {
                self.store
                    .apply_delta(transfer.sender_id, Delta::debit(transfer.amount), legs.debit.clone())
            })
            .await
        {
            Ok(balance) => balance,
            Err(error) => {
                transition(correlation_id, TransferState::Initiated, TransferState::Rejected);
                return Err(TransferError::from_store(error, AccountRole::Sender, transfer.amount.as_inner()));
            }
        };
        transition(correlation_id, TransferState::Initiated, TransferState::Debited);

        let credit = with_retry(
            "credit",
            self.config.credit_retry_attempts,
            self.config.retry_backoff(),
            || {
                self.store
                    .apply_delta(transfer.recipient_id, Delta::credit(transfer.amount), legs.credit.clone())
            },
        )
        .await;
        let credit_error = match credit {
            Ok(recipient_balance) => {
                transition(correlation_id, TransferState::Debited, TransferState::Credited);
                return Ok((sender_balance, recipient_balance));
            }
            Err(error) => error,
        };

        warn!(%correlation_id, error = %credit_error, "credit failed after debit, reversing");
        self.reverse_debit(transfer, correlation_id, legs.debit.transaction_id, credit_error)
            .await
    }

    /// Puts the debited amount back on the sender. Always ends the transfer in failure.
    async fn reverse_debit(
        &self,
        transfer: &ValidTransfer,
        correlation_id: CorrelationId,
        debit_transaction_id: TransactionId,
        credit_error: StoreError,
    ) -> Result<(Decimal, Decimal), TransferError> {
        let reversal = NewEntry::correlated(TransactionKind::Reversal, transfer.recipient_id, correlation_id);
        let reversal_transaction_id = reversal.transaction_id;
        let reason = credit_error.to_string();

        let res = self
            .retry_store(|| {
                self.store
                    .apply_delta(transfer.sender_id, Delta::credit(transfer.amount), reversal.clone())
            })
            .await;

        match res {
            Ok(_) => {
                transition(correlation_id, TransferState::Debited, TransferState::DebitReversed);
                self.audit.record(AuditEvent::DebitReversed {
                    correlation_id,
                    sender_id: transfer.sender_id,
                    recipient_id: transfer.recipient_id,
                    amount: transfer.amount.as_inner(),
                    reversal_transaction_id,
                    reason,
                });
                Err(TransferError::TransferFailed {
                    reference: correlation_id,
                    debit_reversed: true,
                })
            }
            Err(reversal_error) => {
                transition(correlation_id, TransferState::Debited, TransferState::Unresolved);
                let reason = format!("credit failed: {reason}; reversal failed: {reversal_error}");
                let unresolved = UnresolvedTransfer {
                    correlation_id,
                    sender_id: transfer.sender_id,
                    recipient_id: transfer.recipient_id,
                    amount: transfer.amount,
                    debit_transaction_id,
                    reason: reason.clone(),
                    flagged_at: Utc::now(),
                };
                if let Err(error) = self
                    .retry_store(|| self.store.flag_for_reconciliation(unresolved.clone()))
                    .await
                {
                    error!(%correlation_id, %error, ?unresolved, "failed to flag transfer for reconciliation");
                }
                self.audit.record(AuditEvent::TransferUnresolved {
                    correlation_id,
                    sender_id: transfer.sender_id,
                    recipient_id: transfer.recipient_id,
                    amount: transfer.amount.as_inner(),
                    reason,
                });
                Err(TransferError::TransferFailed {
                    reference: correlation_id,
                    debit_reversed: false,
                })
            }
        }
    }

    async fn adjust(&self, account_id: AccountId, delta: Delta, kind: TransactionKind) -> Result<Decimal, TransferError> {
        let entry = NewEntry::system(kind);
        let balance = self
            .retry_store(|| self.store.apply_delta(account_id, delta, entry.clone()))
            .await
            .map_err(|error| TransferError::from_store(error, AccountRole::Holder, delta.amount.as_inner()))?;
        debug!(%account_id, %kind, %delta, %balance, "balance adjusted");
        self.audit.record(AuditEvent::BalanceAdjusted {
            account_id,
            kind,
            amount: delta.amount.as_inner(),
            balance,
        });
        Ok(balance)
    }

    async fn ensure_exists(&self, account_id: AccountId, role: AccountRole) -> Result<(), TransferError> {
        let exists = self
            .retry_store(|| self.store.contains(account_id))
            .await
            .map_err(|error| TransferError::from_store(error, role, Decimal::ZERO))?;
        if !exists {
            return Err(TransferError::NotFound { role, account_id });
        }
        Ok(())
    }

    async fn retry_store<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        with_retry("store", self.config.store_retry_attempts, self.config.retry_backoff(), op).await
    }

    async fn key_lock(&self, key: &IdempotencyKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    async fn release_key_lock(&self, key: &IdempotencyKey, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.key_locks.lock().await;
        // Only the map still holds it: nobody else is waiting on the key.
        if locks.get(key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(key);
        }
    }

    fn reject(&self, command: &TransferCommand, error: &TransferError) {
        info!(kind = %error.kind(), %error, "transfer rejected");
        self.audit.record(AuditEvent::TransferRejected {
            sender_id: command.sender_id,
            recipient_id: command.recipient_id,
            amount: command.amount,
            kind: error.kind(),
            reason: error.public_message(),
        });
    }
}

fn transition(correlation_id: CorrelationId, from: TransferState, to: TransferState) {
    debug_assert!(
        !from.is_terminal() && from.can_transition_to(to),
        "illegal transfer transition {from} -> {to}"
    );
    debug!(%correlation_id, %from, %to, "transfer state changed");
}
