//! Transaction log port - append-only history of balance mutations

use std::sync::Arc;

use crate::domain::result::Result;
use crate::domain::{NewTransaction, Transaction};

/// Append-only transaction log
///
/// The log owns `sequence` and `timestamp`: both are assigned on append and
/// records are never updated or deleted afterwards.
pub trait TransactionLog: Send + Sync {
    /// Append a record, returning it with its assigned sequence and timestamp
    fn append(&self, entry: NewTransaction) -> Result<Transaction>;

    /// Every record where the account is `from` or `to`, oldest first
    ///
    /// Records with equal timestamps come back in insertion order.
    fn query_by_participant(&self, account_number: &str) -> Result<Vec<Transaction>>;
}

impl<S> TransactionLog for Arc<S>
where
    S: TransactionLog + ?Sized,
{
    fn append(&self, entry: NewTransaction) -> Result<Transaction> {
        (**self).append(entry)
    }

    fn query_by_participant(&self, account_number: &str) -> Result<Vec<Transaction>> {
        (**self).query_by_participant(account_number)
    }
}
