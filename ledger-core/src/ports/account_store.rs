//! Account store port - keyed account storage with compare-and-set writes

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::Account;

/// Account storage abstraction
///
/// Every balance change goes through [`AccountStore::compare_and_set_balance`];
/// the trait has no unconditional balance write.
///
/// Implementations must:
/// - allocate account numbers themselves, detecting collisions against
///   existing keys instead of assuming they never happen
/// - apply each compare-and-set atomically with respect to every other write
///   on the same account
/// - report a lost race as [`Error::Conflict`](crate::domain::result::Error::Conflict)
///   and a missing key as [`Error::NotFound`](crate::domain::result::Error::NotFound)
pub trait AccountStore: Send + Sync {
    /// Create an account with a freshly allocated number and a zero balance
    fn create(&self, name: &str, pin_hash: &str) -> Result<Account>;

    /// Look up an account by number
    fn get(&self, account_number: &str) -> Result<Option<Account>>;

    /// Replace the balance only if it still equals `expected`
    ///
    /// Negative `new_balance` values are rejected with a validation error.
    fn compare_and_set_balance(
        &self,
        account_number: &str,
        expected: Decimal,
        new_balance: Decimal,
    ) -> Result<Account>;

    /// Replace the PIN hash only if it still equals `expected_hash`
    fn set_pin_hash(
        &self,
        account_number: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<Account>;

    /// Snapshot of every (account number, balance) pair
    fn list_balances(&self) -> Result<Vec<(String, Decimal)>>;
}

impl<S> AccountStore for Arc<S>
where
    S: AccountStore + ?Sized,
{
    fn create(&self, name: &str, pin_hash: &str) -> Result<Account> {
        (**self).create(name, pin_hash)
    }

    fn get(&self, account_number: &str) -> Result<Option<Account>> {
        (**self).get(account_number)
    }

    fn compare_and_set_balance(
        &self,
        account_number: &str,
        expected: Decimal,
        new_balance: Decimal,
    ) -> Result<Account> {
        (**self).compare_and_set_balance(account_number, expected, new_balance)
    }

    fn set_pin_hash(
        &self,
        account_number: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<Account> {
        (**self).set_pin_hash(account_number, expected_hash, new_hash)
    }

    fn list_balances(&self) -> Result<Vec<(String, Decimal)>> {
        (**self).list_balances()
    }
}
