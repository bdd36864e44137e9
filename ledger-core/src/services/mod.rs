//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod auth;
pub mod ledger;
pub mod logging;
pub mod migration;

pub use auth::AuthGuard;
pub use ledger::{LedgerService, Receipt, RetryPolicy, Statement, TransferReceipt};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
