//! In-memory adapters
//!
//! Intended for tests, development and embedding. State lives behind std
//! locks; a poisoned lock is reported as a storage error.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{random_account_number, Account, NewTransaction, Transaction};
use crate::ports::{AccountStore, Incident, IncidentReporter, TransactionLog};

/// Default number of draws before account number allocation gives up
pub const DEFAULT_ALLOCATION_ATTEMPTS: u32 = 16;

type NumberSource = Box<dyn FnMut() -> String + Send>;

fn poisoned(what: &str) -> Error {
    Error::storage(format!("{} lock poisoned", what))
}

/// In-memory account store
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
    numbers: Mutex<NumberSource>,
    allocation_attempts: u32,
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::with_number_source(|| random_account_number(&mut rand::thread_rng()))
    }

    /// Use a custom account number generator (handy for forcing collisions)
    pub fn with_number_source<F>(source: F) -> Self
    where
        F: FnMut() -> String + Send + 'static,
    {
        Self {
            accounts: RwLock::new(HashMap::new()),
            numbers: Mutex::new(Box::new(source)),
            allocation_attempts: DEFAULT_ALLOCATION_ATTEMPTS,
        }
    }

    pub fn with_allocation_attempts(mut self, attempts: u32) -> Self {
        self.allocation_attempts = attempts.max(1);
        self
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.accounts.read().map(|a| a.len()).unwrap_or(0)
    }
}

impl AccountStore for InMemoryAccountStore {
    fn create(&self, name: &str, pin_hash: &str) -> Result<Account> {
        let mut accounts = self.accounts.write().map_err(|_| poisoned("account store"))?;
        let mut numbers = self.numbers.lock().map_err(|_| poisoned("account number"))?;

        for attempt in 1..=self.allocation_attempts {
            let number = (*numbers)();
            if accounts.contains_key(&number) {
                tracing::debug!(attempt, "account number collision, drawing again");
                continue;
            }
            let account = Account::new(number.clone(), name, pin_hash);
            accounts.insert(number, account.clone());
            return Ok(account);
        }

        Err(Error::storage(format!(
            "could not allocate a unique account number after {} attempts",
            self.allocation_attempts
        )))
    }

    fn get(&self, account_number: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().map_err(|_| poisoned("account store"))?;
        Ok(accounts.get(account_number).cloned())
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

        let mut accounts = self.accounts.write().map_err(|_| poisoned("account store"))?;
        let account = accounts
            .get_mut(account_number)
            .ok_or_else(|| Error::not_found(account_number))?;

        if account.balance != expected {
            return Err(Error::conflict(format!(
                "balance of {} changed (expected {}, found {})",
                account_number, expected, account.balance
            )));
        }

        account.balance = new_balance;
        account.version += 1;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    fn set_pin_hash(
        &self,
        account_number: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<Account> {
        let mut accounts = self.accounts.write().map_err(|_| poisoned("account store"))?;
        let account = accounts
            .get_mut(account_number)
            .ok_or_else(|| Error::not_found(account_number))?;

        if account.pin_hash != expected_hash {
            return Err(Error::conflict(format!(
                "credentials of {} changed concurrently",
                account_number
            )));
        }

        account.pin_hash = new_hash.to_string();
        account.version += 1;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    fn list_balances(&self) -> Result<Vec<(String, Decimal)>> {
        let accounts = self.accounts.read().map_err(|_| poisoned("account store"))?;
        let mut balances: Vec<(String, Decimal)> = accounts
            .values()
            .map(|a| (a.account_number.clone(), a.balance))
            .collect();
        balances.sort();
        Ok(balances)
    }
}

/// In-memory append-only transaction log
#[derive(Debug, Default)]
pub struct InMemoryTransactionLog {
    records: Mutex<Vec<Transaction>>,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record in insertion order
    pub fn all(&self) -> Result<Vec<Transaction>> {
        let records = self.records.lock().map_err(|_| poisoned("transaction log"))?;
        Ok(records.clone())
    }
}

impl TransactionLog for InMemoryTransactionLog {
    fn append(&self, entry: NewTransaction) -> Result<Transaction> {
        let mut records = self.records.lock().map_err(|_| poisoned("transaction log"))?;

        // Timestamps never run backwards inside one log, even if the clock does.
        let now = Utc::now();
        let timestamp = match records.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        let record = entry.commit(records.len() as u64 + 1, timestamp);
        records.push(record.clone());
        Ok(record)
    }

    fn query_by_participant(&self, account_number: &str) -> Result<Vec<Transaction>> {
        let records = self.records.lock().map_err(|_| poisoned("transaction log"))?;
        let mut matching: Vec<Transaction> = records
            .iter()
            .filter(|t| t.involves(account_number))
            .cloned()
            .collect();
        matching.sort_by(Transaction::statement_order);
        Ok(matching)
    }
}

/// Incident reporter that keeps everything in memory
#[derive(Debug, Default)]
pub struct RecordingIncidentReporter {
    incidents: Mutex<Vec<Incident>>,
}

impl RecordingIncidentReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incidents(&self) -> Vec<Incident> {
        self.incidents
            .lock()
            .map(|i| i.clone())
            .unwrap_or_default()
    }
}

impl IncidentReporter for RecordingIncidentReporter {
    fn report(&self, incident: &Incident) {
        match self.incidents.lock() {
            Ok(mut incidents) => incidents.push(incident.clone()),
            Err(_) => tracing::error!(event = %incident.event, "incident recorder lock poisoned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionKind;

    #[test]
    fn test_create_allocates_distinct_numbers() {
        let store = InMemoryAccountStore::new();
        let a = store.create("Alice", "h").unwrap();
        let b = store.create("Bob", "h").unwrap();
        assert_ne!(a.account_number, b.account_number);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_create_retries_on_collision() {
        let mut draws = vec!["000001", "000001", "000002"].into_iter();
        let store = InMemoryAccountStore::with_number_source(move || {
            draws.next().unwrap_or("999999").to_string()
        });

        let first = store.create("Alice", "h").unwrap();
        let second = store.create("Bob", "h").unwrap();
        assert_eq!(first.account_number, "000001");
        assert_eq!(second.account_number, "000002");
    }

    #[test]
    fn test_create_gives_up_when_keyspace_is_exhausted() {
        let store = InMemoryAccountStore::with_number_source(|| "000007".to_string())
            .with_allocation_attempts(3);
        store.create("Alice", "h").unwrap();

        let err = store.create("Bob", "h").unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_compare_and_set_balance() {
        let store = InMemoryAccountStore::new();
        let account = store.create("Alice", "h").unwrap();
        let n = &account.account_number;

        let updated = store
            .compare_and_set_balance(n, Decimal::ZERO, Decimal::new(100, 0))
            .unwrap();
        assert_eq!(updated.balance, Decimal::new(100, 0));
        assert_eq!(updated.version, 1);

        // stale expectation loses
        let err = store
            .compare_and_set_balance(n, Decimal::ZERO, Decimal::new(50, 0))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.get(n).unwrap().unwrap().balance, Decimal::new(100, 0));
    }

    #[test]
    fn test_compare_and_set_rejects_negative_and_missing() {
        let store = InMemoryAccountStore::new();
        let account = store.create("Alice", "h").unwrap();

        let err = store
            .compare_and_set_balance(&account.account_number, Decimal::ZERO, Decimal::NEGATIVE_ONE)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = store
            .compare_and_set_balance("no-such", Decimal::ZERO, Decimal::ONE)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_set_pin_hash_is_conditional() {
        let store = InMemoryAccountStore::new();
        let account = store.create("Alice", "old").unwrap();
        let n = &account.account_number;

        assert!(matches!(
            store.set_pin_hash(n, "wrong", "new"),
            Err(Error::Conflict(_))
        ));
        let updated = store.set_pin_hash(n, "old", "new").unwrap();
        assert_eq!(updated.pin_hash, "new");
    }

    #[test]
    fn test_log_assigns_sequence_and_filters_participants() {
        let log = InMemoryTransactionLog::new();
        log.append(NewTransaction::deposit("A", Decimal::ONE)).unwrap();
        log.append(NewTransaction::deposit("B", Decimal::ONE)).unwrap();
        log.append(NewTransaction::withdraw("A", Decimal::ONE)).unwrap();

        let records = log.query_by_participant("A").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, TransactionKind::Deposit);
        assert_eq!(records[1].kind, TransactionKind::Withdraw);
        assert!(records[0].sequence < records[1].sequence);
        assert!(records[0].timestamp <= records[1].timestamp);

        assert_eq!(log.all().unwrap().len(), 3);
        assert!(log.query_by_participant("C").unwrap().is_empty());
    }

    #[test]
    fn test_recording_reporter_keeps_incidents() {
        let reporter = RecordingIncidentReporter::new();
        reporter.report(&Incident::new(
            crate::ports::IncidentSeverity::DataQuality,
            "transaction_log_append_failed",
            "disk full",
        ));
        assert_eq!(reporter.incidents().len(), 1);
    }
}
