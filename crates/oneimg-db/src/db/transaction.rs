//! Database transaction utilities

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Transaction};

/// A transaction that must be finished with [`commit`](Self::commit) or
/// [`rollback`](Self::rollback).
///
/// # Example
///
/// ```ignore
/// use oneimg_db::TransactionGuard;
///
/// async fn example(pool: &sqlx::PgPool) -> anyhow::Result<()> {
///     let mut guard = TransactionGuard::begin(pool).await?;
///     sqlx::query("UPDATE ...").execute(&mut **guard.tx()?).await?;
///     guard.commit().await?;
///     Ok(())
/// }
/// ```
pub struct TransactionGuard<'a> {
    transaction: Option<Transaction<'a, Postgres>>,
}

impl<'a> TransactionGuard<'a> {
    pub async fn begin(pool: &'a PgPool) -> Result<Self> {
        let transaction = pool
            .begin()
            .await
            .context("Failed to begin database transaction")?;

        Ok(Self {
            transaction: Some(transaction),
        })
    }

    /// The open transaction; an error once it has been committed or rolled back.
    pub fn tx(&mut self) -> Result<&mut Transaction<'a, Postgres>> {
        self.transaction
            .as_mut()
            .context("Transaction was already committed or rolled back")
    }

    pub async fn commit(mut self) -> Result<()> {
        if let Some(tx) = self.transaction.take() {
            tx.commit()
                .await
                .context("Failed to commit database transaction")?;
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        if let Some(tx) = self.transaction.take() {
            tx.rollback()
                .await
                .context("Failed to rollback database transaction")?;
        }
        Ok(())
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        // sqlx rolls the transaction back when it is dropped unfinished.
        if self.transaction.is_some() {
            tracing::warn!("Transaction was dropped without explicit commit or rollback - rolling back");
        }
    }
}
