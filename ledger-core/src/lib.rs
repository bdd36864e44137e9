//! Ledger Core - PIN-gated account ledger
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Account, Transaction, Pin, Amount) and errors
//! - **ports**: Trait definitions for external dependencies (AccountStore, TransactionLog, IncidentReporter)
//! - **services**: Business logic orchestration (LedgerService, AuthGuard, logging, migrations)
//! - **adapters**: Concrete implementations (DuckDB, in-memory, tracing)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbStore;
use adapters::TracingIncidentReporter;
use config::Config;
use ports::IncidentReporter;
use services::LedgerService;

// Re-export commonly used types at crate root
pub use domain::result::{Error, ErrorKind, OperationResult, Result as LedgerResult};
pub use domain::{Account, AccountView, Amount, Pin, Transaction, TransactionKind};
pub use services::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use services::{Receipt, Statement, TransferReceipt};

/// Database file holding accounts and the transaction log
pub const LEDGER_DB_FILE: &str = "ledger.duckdb";

/// Main context for ledger operations
///
/// This is the primary entry point for all business logic. It holds
/// the database connection, configuration, and the ledger engine.
pub struct LedgerContext {
    pub config: Config,
    pub store: Arc<DuckDbStore>,
    /// `None` when the log database could not be opened
    pub logging: Option<Arc<LoggingService>>,
    pub ledger: LedgerService,
}

impl LedgerContext {
    /// Create a new ledger context rooted at `ledger_dir`
    ///
    /// Incidents go to logs.duckdb when it can be opened and to `tracing`
    /// otherwise; a broken log database never blocks the ledger itself.
    pub fn new(ledger_dir: &Path, entry_point: EntryPoint) -> Result<Self> {
        std::fs::create_dir_all(ledger_dir)
            .with_context(|| format!("Failed to create {}", ledger_dir.display()))?;
        let config = Config::load(ledger_dir)?;

        let db_path = ledger_dir.join(LEDGER_DB_FILE);
        let store = Arc::new(
            DuckDbStore::new(&db_path)
                .with_context(|| format!("Failed to open {}", db_path.display()))?
                .with_allocation_attempts(config.account_number_attempts),
        );
        store.ensure_schema().context("Failed to migrate ledger schema")?;

        let logging = match LoggingService::new(ledger_dir, entry_point, env!("CARGO_PKG_VERSION")) {
            Ok(service) => Some(Arc::new(service)),
            Err(e) => {
                tracing::warn!(error = %e, "log database unavailable, incidents go to tracing only");
                None
            }
        };

        let incidents: Arc<dyn IncidentReporter> = match &logging {
            Some(service) => service.clone() as Arc<dyn IncidentReporter>,
            None => Arc::new(TracingIncidentReporter),
        };

        let ledger = LedgerService::from_config(store.clone(), store.clone(), incidents, &config);

        Ok(Self {
            config,
            store,
            logging,
            ledger,
        })
    }
}
