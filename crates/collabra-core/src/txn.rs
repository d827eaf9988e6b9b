//! Unit-of-work contract and the transactional batch helper.

use tracing::warn;

use crate::error::CollabResult;

/// Coordinates a unit of work over the entity store.
///
/// Transactions nest by joining: `begin` inside an open transaction
/// increments a depth counter and only the outermost `commit` makes the
/// batch durable. `abort` rolls back the whole unit of work immediately
/// and is idempotent, so every enclosing layer may abort again on the
/// way out without error.
pub trait TransactionCoordinator: Send + Sync {
    /// Open a transaction, or join the enclosing one if already open.
    /// `read_only` is a hint honored by the outermost `begin`.
    fn begin(&self, read_only: bool) -> impl Future<Output = CollabResult<()>> + Send;

    /// Close one nesting level; the outermost commit persists the batch.
    fn commit(&self) -> impl Future<Output = CollabResult<()>> + Send;

    /// Roll back the whole unit of work and discard all nesting levels.
    fn abort(&self) -> impl Future<Output = CollabResult<()>> + Send;
}

/// Run `body` inside a transaction.
///
/// On success the transaction is committed and the value returned. On
/// failure the transaction is aborted first, then the original error is
/// returned unchanged, so callers see the precise failure reason and no
/// partial write survives.
pub async fn in_transaction<C, T, Fut>(
    coordinator: &C,
    read_only: bool,
    body: Fut,
) -> CollabResult<T>
where
    C: TransactionCoordinator,
    Fut: Future<Output = CollabResult<T>>,
{
    coordinator.begin(read_only).await?;
    match body.await {
        Ok(value) => {
            coordinator.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(abort_err) = coordinator.abort().await {
                warn!(error = %abort_err, "transaction abort failed");
            }
            Err(err)
        }
    }
}
