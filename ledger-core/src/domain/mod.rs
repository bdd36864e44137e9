//! Core domain entities
//!
//! All ledger entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod credentials;
mod transaction;
pub mod result;

pub use account::{
    random_account_number, Account, AccountView, ACCOUNT_NUMBER_DIGITS, ACCOUNT_NUMBER_SPACE,
};
pub use credentials::{Amount, Pin, MAX_AMOUNT_SCALE, PIN_LENGTH};
pub use transaction::{NewTransaction, Transaction, TransactionKind};
