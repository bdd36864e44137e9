//! Concurrent ledger access tests
//!
//! Many threads hammer the same accounts through one shared engine. The
//! checks are the ledger invariants: no lost deposits, no negative balance,
//! and money is neither created nor destroyed by transfers.
//!
//! Run with: cargo test --test concurrent_ledger_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;

use ledger_core::adapters::duckdb::DuckDbStore;
use ledger_core::adapters::memory::{
    InMemoryAccountStore, InMemoryTransactionLog, RecordingIncidentReporter,
};
use ledger_core::ports::{AccountStore, TransactionLog};
use ledger_core::services::{LedgerService, RetryPolicy};
use ledger_core::Error;

/// Number of concurrent threads for stress tests
const THREAD_COUNT: usize = 8;

/// Number of operations per thread
const ITERATIONS_PER_THREAD: usize = 25;

struct Setup {
    ledger: Arc<LedgerService>,
    accounts: Arc<dyn AccountStore>,
    log: Arc<dyn TransactionLog>,
    incidents: Arc<RecordingIncidentReporter>,
}

fn generous_policy() -> RetryPolicy {
    RetryPolicy {
        max_cas_attempts: 10_000,
        compensation_attempts: 10,
        compensation_backoff: Duration::from_millis(1),
    }
}

fn in_memory(policy: RetryPolicy) -> Setup {
    let accounts: Arc<dyn AccountStore> = Arc::new(InMemoryAccountStore::new());
    let log: Arc<dyn TransactionLog> = Arc::new(InMemoryTransactionLog::new());
    build(accounts, log, policy)
}

fn duckdb(policy: RetryPolicy) -> Setup {
    let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
    store.ensure_schema().unwrap();
    build(store.clone(), store, policy)
}

fn build(accounts: Arc<dyn AccountStore>, log: Arc<dyn TransactionLog>, policy: RetryPolicy) -> Setup {
    let incidents = Arc::new(RecordingIncidentReporter::new());
    let ledger = LedgerService::new(accounts.clone(), log.clone(), incidents.clone())
        .with_policy(policy);
    Setup {
        ledger: Arc::new(ledger),
        accounts,
        log,
        incidents,
    }
}

fn balance(setup: &Setup, account: &str) -> Decimal {
    setup.accounts.get(account).unwrap().unwrap().balance
}

/// Run `op(thread_id, iteration)` on THREAD_COUNT threads released together
fn run_concurrently<F>(op: F)
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let op = Arc::new(op);

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|thread_id| {
            let barrier = Arc::clone(&barrier);
            let op = Arc::clone(&op);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..ITERATIONS_PER_THREAD {
                    op(thread_id, i);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

fn check_no_lost_deposits(setup: Setup) {
    let account = setup
        .ledger
        .create_account("Shared", "1234")
        .unwrap()
        .account_number;

    let ledger = Arc::clone(&setup.ledger);
    let target = account.clone();
    run_concurrently(move |_, _| {
        ledger.deposit(&target, "1234", Decimal::ONE).unwrap();
    });

    let expected = Decimal::from(THREAD_COUNT * ITERATIONS_PER_THREAD);
    assert_eq!(balance(&setup, &account), expected);
    assert_eq!(
        setup.log.query_by_participant(&account).unwrap().len(),
        THREAD_COUNT * ITERATIONS_PER_THREAD
    );
    assert!(setup.incidents.incidents().is_empty());
}

#[test]
fn test_concurrent_deposits_lose_nothing_in_memory() {
    check_no_lost_deposits(in_memory(generous_policy()));
}

#[test]
fn test_concurrent_deposits_lose_nothing_duckdb() {
    check_no_lost_deposits(duckdb(generous_policy()));
}

/// With a tiny CAS budget some deposits give up, but every one that
/// reported success is in the balance and none that failed is
#[test]
fn test_exhausted_retries_never_half_apply() {
    let setup = in_memory(RetryPolicy {
        max_cas_attempts: 1,
        ..generous_policy()
    });
    let account = setup
        .ledger
        .create_account("Shared", "1234")
        .unwrap()
        .account_number;

    let succeeded = Arc::new(AtomicUsize::new(0));
    let ledger = Arc::clone(&setup.ledger);
    let target = account.clone();
    let counter = Arc::clone(&succeeded);
    run_concurrently(move |_, _| match ledger.deposit(&target, "1234", Decimal::ONE) {
        Ok(_) => {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Err(Error::ConcurrencyConflict { attempts: 1 }) => {}
        Err(e) => panic!("unexpected error: {e}"),
    });

    let succeeded = succeeded.load(Ordering::SeqCst);
    println!("{} of {} deposits committed", succeeded, THREAD_COUNT * ITERATIONS_PER_THREAD);
    assert_eq!(balance(&setup, &account), Decimal::from(succeeded));
}

fn check_withdrawals_never_overdraw(setup: Setup) {
    let account = setup
        .ledger
        .create_account("Shared", "1234")
        .unwrap()
        .account_number;
    setup
        .ledger
        .deposit(&account, "1234", Decimal::from(100))
        .unwrap();

    let succeeded = Arc::new(AtomicUsize::new(0));
    let ledger = Arc::clone(&setup.ledger);
    let target = account.clone();
    let counter = Arc::clone(&succeeded);
    run_concurrently(move |_, _| match ledger.withdraw(&target, "1234", Decimal::from(3)) {
        Ok(receipt) => {
            assert!(receipt.balance >= Decimal::ZERO);
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Err(Error::InsufficientFunds { balance, .. }) => assert!(balance < Decimal::from(3)),
        Err(e) => panic!("unexpected error: {e}"),
    });

    let succeeded = succeeded.load(Ordering::SeqCst);
    assert_eq!(succeeded, 33);
    assert_eq!(balance(&setup, &account), Decimal::ONE);
}

#[test]
fn test_concurrent_withdrawals_never_overdraw_in_memory() {
    check_withdrawals_never_overdraw(in_memory(generous_policy()));
}

#[test]
fn test_concurrent_withdrawals_never_overdraw_duckdb() {
    check_withdrawals_never_overdraw(duckdb(generous_policy()));
}

fn check_transfers_conserve_money(setup: Setup) {
    let a = setup.ledger.create_account("A", "1111").unwrap().account_number;
    let b = setup.ledger.create_account("B", "2222").unwrap().account_number;
    setup.ledger.deposit(&a, "1111", Decimal::from(50)).unwrap();
    setup.ledger.deposit(&b, "2222", Decimal::from(50)).unwrap();

    let ledger = Arc::clone(&setup.ledger);
    let (left, right) = (a.clone(), b.clone());
    run_concurrently(move |thread_id, i| {
        let amount = Decimal::from(1 + (thread_id + i) % 7);
        let result = if thread_id % 2 == 0 {
            ledger.transfer(&left, "1111", &right, amount)
        } else {
            ledger.transfer(&right, "2222", &left, amount)
        };
        match result {
            Ok(receipt) => assert!(receipt.from_balance >= Decimal::ZERO),
            Err(Error::InsufficientFunds { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    });

    let (balance_a, balance_b) = (balance(&setup, &a), balance(&setup, &b));
    assert!(balance_a >= Decimal::ZERO && balance_b >= Decimal::ZERO);
    assert_eq!(balance_a + balance_b, Decimal::from(100));

    let total: Decimal = setup
        .accounts
        .list_balances()
        .unwrap()
        .into_iter()
        .map(|(_, b)| b)
        .sum();
    assert_eq!(total, Decimal::from(100));
    assert!(setup.incidents.incidents().is_empty());

    // Both legs of every committed transfer are in both statements
    let statement_a = setup.ledger.statement(&a, "1111").unwrap().transactions;
    let statement_b = setup.ledger.statement(&b, "2222").unwrap().transactions;
    assert_eq!(statement_a.len(), statement_b.len());
}

#[test]
fn test_opposing_transfers_conserve_money_in_memory() {
    check_transfers_conserve_money(in_memory(generous_policy()));
}

#[test]
fn test_opposing_transfers_conserve_money_duckdb() {
    check_transfers_conserve_money(duckdb(generous_policy()));
}
