//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The ledger engine
//! depends only on these traits, not on concrete implementations.

mod account_store;
mod incident;
mod transaction_log;

pub use account_store::AccountStore;
pub use incident::{Incident, IncidentReporter, IncidentSeverity};
pub use transaction_log::TransactionLog;
