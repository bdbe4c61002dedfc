use std::collections::BTreeMap;

use color_eyre::eyre::WrapErr;
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;
use wallet_ledger::audit::AuditSink;
use wallet_ledger::engine::TransferEngine;
use wallet_ledger::ledger::LedgerStore;
use wallet_ledger::ledger::PageRequest;
use wallet_ledger::transaction::AccountId;

/// Writes one `user,balance,entries` row per user, ordered by user.
pub async fn write_to_stdout<S, A>(
    engine: &TransferEngine<S, A>,
    users: &BTreeMap<String, AccountId>,
) -> color_eyre::Result<()>
where
    S: LedgerStore,
    A: AuditSink,
{
    let mut writer = Writer::from_writer(std::io::stdout());
    for (user, account_id) in users {
        writer.serialize(WalletReport::collect(engine, user, *account_id).await?)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct WalletReport<'a> {
    user: &'a str,
    balance: Decimal,
    entries: usize,
}

impl<'a> WalletReport<'a> {
    async fn collect<S, A>(engine: &TransferEngine<S, A>, user: &'a str, account_id: AccountId) -> color_eyre::Result<Self>
    where
        S: LedgerStore,
        A: AuditSink,
    {
        let balance = engine
            .balance(account_id)
            .await
            .wrap_err_with(|| format!("cannot read balance user={user:?}"))?;
        let entries = engine
            .history(account_id, PageRequest { offset: 0, limit: 1 })
            .await
            .wrap_err_with(|| format!("cannot read history user={user:?}"))?
            .total;
        Ok(Self { user, balance, entries })
    }
}
