use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::ledger::StoreError;

/// Runs `op` up to `attempts` times while it fails with a transient [`StoreError`],
/// sleeping `backoff * 2^n` between attempts. Definitive errors return immediately.
pub(in crate::engine) async fn with_retry<T, F, Fut>(
    operation: &'static str,
    attempts: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(error) if error.is_transient() && attempt < attempts => {
                let delay = backoff.saturating_mul(1 << (attempt - 1).min(16));
                warn!(operation, attempt, attempts, ?delay, %error, "transient store error, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            res => return res,
        }
    }
}
