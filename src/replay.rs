use std::collections::BTreeMap;

use thiserror::Error;
use wallet_ledger::audit::AuditSink;
use wallet_ledger::command::LedgerCommand;
use wallet_ledger::engine::TransferCommand;
use wallet_ledger::engine::TransferEngine;
use wallet_ledger::engine::TransferError;
use wallet_ledger::identity::Caller;
use wallet_ledger::identity::IdentityResolver;
use wallet_ledger::ledger::LedgerStore;
use wallet_ledger::transaction::AccountId;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("user cannot be resolved to a wallet user={0:?}")]
    UnknownUser(String),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Feeds [`LedgerCommand`]s to a [`TransferEngine`], remembering every user that took part
/// in a successful command so the report can list them.
pub struct Replayer<'a, S, A, R> {
    engine: &'a TransferEngine<S, A>,
    resolver: &'a R,
    users: BTreeMap<String, AccountId>,
}

impl<'a, S: LedgerStore, A: AuditSink, R: IdentityResolver> Replayer<'a, S, A, R> {
    pub const fn new(engine: &'a TransferEngine<S, A>, resolver: &'a R) -> Self {
        Self {
            engine,
            resolver,
            users: BTreeMap::new(),
        }
    }

    pub const fn users(&self) -> &BTreeMap<String, AccountId> {
        &self.users
    }

    /// Tips without an explicit key get `row-<row>`, so every row is its own transfer.
    pub async fn apply(&mut self, row: usize, command: &LedgerCommand) -> Result<(), ReplayError> {
        match command {
            LedgerCommand::Open { user } => {
                let account_id = self.resolve(user)?;
                self.engine.open_account(account_id).await?;
                self.remember(user, account_id);
            }
            LedgerCommand::Earn { user, amount } => {
                let account_id = self.resolve(user)?;
                self.engine.earn(account_id, *amount).await?;
                self.remember(user, account_id);
            }
            LedgerCommand::Spend { user, amount } => {
                let account_id = self.resolve(user)?;
                self.engine.spend(account_id, *amount).await?;
            }
            LedgerCommand::Tip {
                user,
                recipient,
                amount,
                key,
            } => {
                let sender_id = self.resolve(user)?;
                let recipient_id = self.resolve(recipient)?;
                let idempotency_key = key.clone().unwrap_or_else(|| format!("row-{row}"));
                self.engine
                    .transfer(TransferCommand {
                        sender_id,
                        recipient_id,
                        amount: *amount,
                        idempotency_key,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    fn resolve(&self, user: &str) -> Result<AccountId, ReplayError> {
        self.resolver
            .resolve(&Caller::new(user))
            .ok_or_else(|| ReplayError::UnknownUser(user.to_owned()))
    }

    fn remember(&mut self, user: &str, account_id: AccountId) {
        self.users.entry(user.trim().to_owned()).or_insert(account_id);
    }
}
