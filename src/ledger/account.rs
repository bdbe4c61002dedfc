//! Free functions that mutate a supplied [`AccountState`].
//!
//! Checking and applying are split so that a multi-account mutation can check every
//! account first and then apply, which cannot fail, to all of them.

use chrono::DateTime;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::ledger::StoreError;
use crate::transaction::AccountId;
use crate::transaction::Delta;
use crate::transaction::Direction;
use crate::transaction::LedgerEntry;
use crate::transaction::NewEntry;

#[derive(Debug, Clone)]
pub struct AccountState {
    pub(in crate::ledger) account_id: AccountId,
    pub(in crate::ledger) balance: Decimal,
    pub(in crate::ledger) history: Vec<LedgerEntry>,
}

impl AccountState {
    pub const fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            balance: Decimal::ZERO,
            history: Vec::new(),
        }
    }

    pub const fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub const fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn history(&self) -> &[LedgerEntry] {
        &self.history
    }
}

/// Returns the balance `account` would have after applying `delta` for an entry of `entry`'s kind.
///
/// # Errors
///
/// Returns an error if:
/// - The entry kind moves value in the opposite direction of `delta` ([`StoreError::DirectionMismatch`]).
/// - The resulting balance would be negative ([`StoreError::InsufficientFunds`]).
/// - The resulting balance overflows ([`StoreError::Overflow`]).
pub fn check_apply(account: &AccountState, delta: Delta, entry: &NewEntry) -> Result<Decimal, StoreError> {
    if entry.kind.direction() != delta.direction {
        return Err(StoreError::DirectionMismatch {
            kind: entry.kind,
            direction: delta.direction,
        });
    }
    match delta.direction {
        Direction::Credit => account
            .balance
            .checked_add(delta.amount.as_inner())
            .ok_or(StoreError::Overflow {
                account_id: account.account_id,
            }),
        Direction::Debit => {
            if account.balance < delta.amount.as_inner() {
                return Err(StoreError::InsufficientFunds {
                    account_id: account.account_id,
                    balance: account.balance,
                    requested: delta.amount,
                });
            }
            account
                .balance
                .checked_sub(delta.amount.as_inner())
                .ok_or(StoreError::Overflow {
                    account_id: account.account_id,
                })
        }
    }
}

/// Applies `delta` and appends `entry` stamped no earlier than the last history entry.
///
/// # Errors
///
/// Same as [`check_apply`]; on error `account` is left untouched.
pub fn apply(
    account: &mut AccountState,
    delta: Delta,
    entry: NewEntry,
    now: DateTime<Utc>,
) -> Result<Decimal, StoreError> {
    let new_balance = check_apply(account, delta, &entry)?;
    let timestamp = account
        .history
        .last()
        .map_or(now, |last| last.timestamp.max(now));

    account.history.push(LedgerEntry {
        transaction_id: entry.transaction_id,
        kind: entry.kind,
        direction: delta.direction,
        amount: delta.amount,
        counterparty: entry.counterparty,
        correlation_id: entry.correlation_id,
        timestamp,
    });
    account.balance = new_balance;

    Ok(new_balance)
}
