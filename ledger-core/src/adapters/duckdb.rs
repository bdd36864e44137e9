//! DuckDB implementation of the account store and transaction log
//!
//! One connection behind a mutex serialises every statement, so a
//! compare-and-set is a conditional `UPDATE` whose affected-row count says
//! whether the expectation still held.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::adapters::memory::DEFAULT_ALLOCATION_ATTEMPTS;
use crate::domain::result::{Error, Result};
use crate::domain::{random_account_number, Account, NewTransaction, Transaction, TransactionKind};
use crate::ports::{AccountStore, TransactionLog};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const ACCOUNT_COLUMNS: &str =
    "account_number, name, pin_hash, balance::VARCHAR, version, created_at, updated_at";

const TRANSACTION_COLUMNS: &str =
    "sequence, from_account, to_account, kind, amount::VARCHAR, reference, recorded_at";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// DuckDB-backed ledger storage
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    allocation_attempts: u32,
}

impl DuckDbStore {
    /// Open (or create) a ledger database file
    ///
    /// Retries with exponential backoff when another process holds the file
    /// lock, which happens when two CLI invocations overlap.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self::from_connection(conn));
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::storage(format!("failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            allocation_attempts: DEFAULT_ALLOCATION_ATTEMPTS,
        }
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs an extension.
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    pub fn with_allocation_attempts(mut self, attempts: u32) -> Self {
        self.allocation_attempts = attempts.max(1);
        self
    }

    /// Run pending ledger migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure the ledger schema exists
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    /// Deposits minus withdrawals over the whole log
    ///
    /// Transfers cancel out, so with a complete log this equals the sum of
    /// all balances.
    pub fn external_net_flow(&self) -> Result<Decimal> {
        let conn = self.conn()?;
        let net: String = conn.query_row(
            "SELECT (COALESCE(SUM(amount) FILTER (WHERE kind = 'deposit'), 0)
                   - COALESCE(SUM(amount) FILTER (WHERE kind = 'withdraw'), 0))::VARCHAR
             FROM ledger_transactions",
            [],
            |row| row.get(0),
        )?;
        parse_decimal(&net)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::storage("database connection lock poisoned"))
    }

    fn fetch_account(conn: &Connection, account_number: &str) -> Result<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM ledger_accounts WHERE account_number = ?",
            ACCOUNT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map([account_number], AccountRow::read)?;

        match rows.next() {
            Some(row) => Ok(Some(row?.into_account()?)),
            None => Ok(None),
        }
    }

    fn account_exists(conn: &Connection, account_number: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ledger_accounts WHERE account_number = ?",
            [account_number],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// A zero-row conditional update is either a lost race or a missing row
    fn missed_update(conn: &Connection, account_number: &str, what: &str) -> Error {
        match Self::account_exists(conn, account_number) {
            Ok(true) => Error::conflict(format!("{} of {} changed concurrently", what, account_number)),
            Ok(false) => Error::not_found(account_number),
            Err(e) => e,
        }
    }

    /// Run a conditional `UPDATE ... RETURNING` and read back the row it wrote
    ///
    /// The write and the read are one statement, so a committed change is
    /// always reported as committed.
    fn update_returning<P: duckdb::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
        account_number: &str,
        what: &str,
    ) -> Result<Account> {
        let sql = format!("{} RETURNING {}", sql, ACCOUNT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params, AccountRow::read)?;

        match rows.next() {
            Some(row) => row?.into_account(),
            None => Err(Self::missed_update(conn, account_number, what)),
        }
    }
}

/// Raw account columns before parsing
struct AccountRow {
    account_number: String,
    name: String,
    pin_hash: String,
    balance: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl AccountRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            account_number: row.get(0)?,
            name: row.get(1)?,
            pin_hash: row.get(2)?,
            balance: row.get(3)?,
            version: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_account(self) -> Result<Account> {
        Ok(Account {
            balance: parse_decimal(&self.balance)?,
            version: self.version.max(0) as u64,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            account_number: self.account_number,
            name: self.name,
            pin_hash: self.pin_hash,
        })
    }
}

/// Raw transaction columns before parsing
struct TransactionRow {
    sequence: i64,
    from: Option<String>,
    to: Option<String>,
    kind: String,
    amount: String,
    reference: Option<String>,
    recorded_at: String,
}

impl TransactionRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            sequence: row.get(0)?,
            from: row.get(1)?,
            to: row.get(2)?,
            kind: row.get(3)?,
            amount: row.get(4)?,
            reference: row.get(5)?,
            recorded_at: row.get(6)?,
        })
    }

    fn into_transaction(self) -> Result<Transaction> {
        let kind = TransactionKind::from_str(&self.kind).map_err(Error::storage)?;
        let reference = self
            .reference
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| Error::storage(format!("corrupt transaction reference: {}", e)))?;

        Ok(Transaction {
            sequence: self.sequence.max(0) as u64,
            from: self.from,
            to: self.to,
            kind,
            amount: parse_decimal(&self.amount)?,
            timestamp: parse_timestamp(&self.recorded_at)?,
            reference,
        })
    }
}

impl AccountStore for DuckDbStore {
    fn create(&self, name: &str, pin_hash: &str) -> Result<Account> {
        let conn = self.conn()?;

        for attempt in 1..=self.allocation_attempts {
            let number = random_account_number(&mut rand::thread_rng());
            if Self::account_exists(&conn, &number)? {
                tracing::debug!(attempt, "account number collision, drawing again");
                continue;
            }

            let account = Account::new(number, name, pin_hash);
            conn.execute(
                "INSERT INTO ledger_accounts (account_number, name, pin_hash, balance, version, created_at, updated_at)
                 VALUES (?, ?, ?, 0, 0, ?, ?)",
                params![
                    account.account_number,
                    account.name,
                    account.pin_hash,
                    format_timestamp(&account.created_at),
                    format_timestamp(&account.updated_at),
                ],
            )?;
            return Ok(account);
        }

        Err(Error::storage(format!(
            "could not allocate a unique account number after {} attempts",
            self.allocation_attempts
        )))
    }

    fn get(&self, account_number: &str) -> Result<Option<Account>> {
        let conn = self.conn()?;
        Self::fetch_account(&conn, account_number)
    }

    fn compare_and_set_balance(
        &self,
        account_number: &str,
        expected: Decimal,
        new_balance: Decimal,
    ) -> Result<Account> {
        if new_balance < Decimal::ZERO {
            return Err(Error::validation("balance cannot become negative"));
        }

        let conn = self.conn()?;
        Self::update_returning(
            &conn,
            "UPDATE ledger_accounts
             SET balance = CAST(? AS DECIMAL(18,2)), version = version + 1, updated_at = ?
             WHERE account_number = ? AND balance = CAST(? AS DECIMAL(18,2))",
            params![
                new_balance.to_string(),
                format_timestamp(&Utc::now()),
                account_number,
                expected.to_string(),
            ],
            account_number,
            "balance",
        )
    }

    fn set_pin_hash(
        &self,
        account_number: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<Account> {
        let conn = self.conn()?;
        Self::update_returning(
            &conn,
            "UPDATE ledger_accounts
             SET pin_hash = ?, version = version + 1, updated_at = ?
             WHERE account_number = ? AND pin_hash = ?",
            params![
                new_hash,
                format_timestamp(&Utc::now()),
                account_number,
                expected_hash,
            ],
            account_number,
            "credentials",
        )
    }

    fn list_balances(&self) -> Result<Vec<(String, Decimal)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT account_number, balance::VARCHAR FROM ledger_accounts ORDER BY account_number",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut balances = Vec::new();
        for row in rows {
            let (number, balance) = row?;
            balances.push((number, parse_decimal(&balance)?));
        }
        Ok(balances)
    }
}

impl TransactionLog for DuckDbStore {
    fn append(&self, entry: NewTransaction) -> Result<Transaction> {
        let conn = self.conn()?;
        let sequence: i64 =
            conn.query_row("SELECT nextval('ledger_transaction_seq')", [], |row| row.get(0))?;
        let record = entry.commit(sequence.max(0) as u64, Utc::now());

        conn.execute(
            "INSERT INTO ledger_transactions (sequence, from_account, to_account, kind, amount, reference, recorded_at)
             VALUES (?, ?, ?, ?, CAST(? AS DECIMAL(18,2)), ?, ?)",
            params![
                sequence,
                record.from,
                record.to,
                record.kind.as_str(),
                record.amount.to_string(),
                record.reference.map(|r| r.to_string()),
                format_timestamp(&record.timestamp),
            ],
        )?;

        Ok(record)
    }

    fn query_by_participant(&self, account_number: &str) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM ledger_transactions
             WHERE from_account = ? OR to_account = ?
             ORDER BY recorded_at, sequence",
            TRANSACTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([account_number, account_number], TransactionRow::read)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_transaction()?);
        }
        Ok(records)
    }
}

// Helper functions

/// Fixed-width RFC 3339 (microseconds, `Z`), so string order is time order
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::storage(format!("corrupt timestamp '{}': {}", s, e)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s.trim())
        .map(|d| d.normalize())
        .map_err(|e| Error::storage(format!("corrupt decimal '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DuckDbStore {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store
    }

    #[test]
    fn test_retryable_error_detection() {
        assert!(is_retryable_error("IO Error: Could not set lock on file"));
        assert!(is_retryable_error("database is locked"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }

    #[test]
    fn test_timestamp_format_is_sortable() {
        let early = DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2024-01-01T10:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let (a, b) = (format_timestamp(&early), format_timestamp(&late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_timestamp(&a).unwrap(), early);
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let account = store.create("Alice", "hash").unwrap();

        let loaded = store.get(&account.account_number).unwrap().unwrap();
        assert_eq!(loaded.name, "Alice");
        assert_eq!(loaded.pin_hash, "hash");
        assert_eq!(loaded.balance, Decimal::ZERO);
        assert!(store.get("not-a-number").unwrap().is_none());
    }

    #[test]
    fn test_compare_and_set_balance() {
        let store = store();
        let n = store.create("Alice", "hash").unwrap().account_number;

        let updated = store
            .compare_and_set_balance(&n, Decimal::ZERO, Decimal::new(10050, 2))
            .unwrap();
        assert_eq!(updated.balance, Decimal::new(10050, 2));
        assert_eq!(updated.version, 1);

        let err = store
            .compare_and_set_balance(&n, Decimal::ZERO, Decimal::ONE)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = store
            .compare_and_set_balance("missing", Decimal::ZERO, Decimal::ONE)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_set_pin_hash() {
        let store = store();
        let n = store.create("Alice", "old").unwrap().account_number;

        assert!(matches!(
            store.set_pin_hash(&n, "stale", "new"),
            Err(Error::Conflict(_))
        ));
        assert_eq!(store.set_pin_hash(&n, "old", "new").unwrap().pin_hash, "new");
    }

    #[test]
    fn test_successful_update_returns_the_written_row() {
        let store = store();
        let n = store.create("Alice", "old").unwrap().account_number;

        let credited = store
            .compare_and_set_balance(&n, Decimal::ZERO, Decimal::new(10, 2))
            .unwrap();
        assert_eq!(credited, store.get(&n).unwrap().unwrap());
        assert_eq!(credited.balance, Decimal::new(10, 2));

        let rekeyed = store.set_pin_hash(&n, "old", "new").unwrap();
        assert_eq!(rekeyed.version, 2);
        assert_eq!(rekeyed.balance, Decimal::new(10, 2));
        assert_eq!(rekeyed, store.get(&n).unwrap().unwrap());

        // A missed update still resolves to conflict or not-found
        assert!(matches!(
            store.set_pin_hash(&n, "old", "other"),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            store.set_pin_hash("999999", "old", "other"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_log_round_trip_and_order() {
        let store = store();
        let reference = Uuid::new_v4();
        store.append(NewTransaction::deposit("A", Decimal::new(100, 0))).unwrap();
        let [out, inbound] =
            NewTransaction::transfer_pair("A", "B", Decimal::new(40, 0), reference);
        store.append(out).unwrap();
        store.append(inbound).unwrap();
        store.append(NewTransaction::deposit("C", Decimal::ONE)).unwrap();

        let a = store.query_by_participant("A").unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(a[0].kind, TransactionKind::Deposit);
        assert_eq!(a[0].amount, Decimal::new(100, 0));
        assert_eq!(a[1].reference, Some(reference));
        assert!(a.windows(2).all(|w| w[0].sequence < w[1].sequence));

        let b = store.query_by_participant("B").unwrap();
        assert_eq!(b.len(), 2);
        assert!(b.iter().all(|t| t.reference == Some(reference)));

        assert_eq!(store.external_net_flow().unwrap(), Decimal::new(101, 0));
    }
}
