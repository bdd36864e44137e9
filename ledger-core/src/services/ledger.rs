//! Ledger service - PIN-gated balance mutations
//!
//! Every balance change goes through `AccountStore::compare_and_set_balance`.
//! A lost race re-reads the account and recomputes the new balance, so
//! checks such as "enough funds" are always evaluated against the balance
//! that is actually being replaced.
//!
//! Transfers debit the source first and credit the destination second. If
//! the credit cannot be applied, the debit is undone by crediting the source
//! back; if even that fails the money is reported as stranded through a
//! fatal incident and [`Error::FatalInconsistency`].

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::{Config, MAX_COMPENSATION_BACKOFF};
use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountView, Amount, NewTransaction, Pin, Transaction};
use crate::ports::{AccountStore, Incident, IncidentReporter, IncidentSeverity, TransactionLog};
use crate::services::auth::AuthGuard;

/// Retry budgets for optimistic writes and transfer compensation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_cas_attempts: u32,
    pub compensation_attempts: u32,
    pub compensation_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_cas_attempts: config.max_cas_attempts.max(1),
            compensation_attempts: config.compensation_attempts.max(1),
            compensation_backoff: config.compensation_backoff(),
        }
    }
}

/// Outcome of a deposit or withdrawal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub account_number: String,
    pub balance: Decimal,
    /// `None` when the balance changed but the log could not record it
    pub transaction: Option<Transaction>,
}

/// Outcome of a transfer, as seen by the source account holder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub from_account: String,
    pub to_account: String,
    pub amount: Decimal,
    pub from_balance: Decimal,
    pub reference: Uuid,
}

/// Every logged record naming an account, oldest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub account_number: String,
    pub transactions: Vec<Transaction>,
}

/// The ledger engine
pub struct LedgerService {
    accounts: Arc<dyn AccountStore>,
    log: Arc<dyn TransactionLog>,
    incidents: Arc<dyn IncidentReporter>,
    guard: AuthGuard,
    policy: RetryPolicy,
}

impl LedgerService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        log: Arc<dyn TransactionLog>,
        incidents: Arc<dyn IncidentReporter>,
    ) -> Self {
        Self {
            accounts,
            log,
            incidents,
            guard: AuthGuard::default(),
            policy: RetryPolicy::default(),
        }
    }

    /// Build an engine with the guard and retry budgets taken from config
    pub fn from_config(
        accounts: Arc<dyn AccountStore>,
        log: Arc<dyn TransactionLog>,
        incidents: Arc<dyn IncidentReporter>,
        config: &Config,
    ) -> Self {
        Self::new(accounts, log, incidents)
            .with_guard(AuthGuard::new(config.pin_scheme, config.argon2.clone()))
            .with_policy(RetryPolicy::from(config))
    }

    pub fn with_guard(mut self, guard: AuthGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Open a new account with a zero balance
    pub fn create_account(&self, name: &str, pin: &str) -> Result<AccountView> {
        let name = Account::normalize_name(name).map_err(Error::validation)?;
        let pin = Pin::parse(pin)?;
        let pin_hash = self.guard.hash(&pin)?;

        let account = self.accounts.create(&name, &pin_hash)?;
        tracing::info!(account = %account.account_number, "account created");
        Ok(account.view())
    }

    pub fn deposit(&self, account_number: &str, pin: &str, amount: Decimal) -> Result<Receipt> {
        let amount = Amount::parse(amount)?.value();
        let account = self.authorize(account_number, pin)?;

        let updated = self.mutate_balance(&account, |balance| credit(balance, amount))?;
        tracing::info!(account = %account_number, %amount, "deposit committed");

        Ok(Receipt {
            account_number: updated.account_number,
            balance: updated.balance,
            transaction: self.record(NewTransaction::deposit(account_number, amount)),
        })
    }

    pub fn withdraw(&self, account_number: &str, pin: &str, amount: Decimal) -> Result<Receipt> {
        let amount = Amount::parse(amount)?.value();
        let account = self.authorize(account_number, pin)?;

        let updated = self.mutate_balance(&account, |balance| debit(balance, amount))?;
        tracing::info!(account = %account_number, %amount, "withdrawal committed");

        Ok(Receipt {
            account_number: updated.account_number,
            balance: updated.balance,
            transaction: self.record(NewTransaction::withdraw(account_number, amount)),
        })
    }

    /// Move money between two accounts; only the source PIN is checked
    pub fn transfer(
        &self,
        from: &str,
        from_pin: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        let amount = Amount::parse(amount)?.value();
        if from == to {
            return Err(Error::validation("cannot transfer to the same account"));
        }

        let source = self.authorize(from, from_pin)?;
        let destination = self.accounts.get(to)?.ok_or(Error::Auth)?;

        let debited = self.mutate_balance(&source, |balance| debit(balance, amount))?;

        if let Err(credit_error) =
            self.mutate_balance(&destination, |balance| credit(balance, amount))
        {
            return Err(self.compensate(from, to, amount, credit_error));
        }

        let reference = Uuid::new_v4();
        tracing::info!(from = %from, to = %to, %amount, %reference, "transfer committed");
        for leg in NewTransaction::transfer_pair(from, to, amount, reference) {
            self.record(leg);
        }

        Ok(TransferReceipt {
            from_account: from.to_string(),
            to_account: to.to_string(),
            amount,
            from_balance: debited.balance,
            reference,
        })
    }

    /// Replace the PIN; the old PIN stops working immediately
    pub fn set_pin(&self, account_number: &str, old_pin: &str, new_pin: &str) -> Result<()> {
        let old_pin = Pin::parse(old_pin)?;
        let new_pin = Pin::parse(new_pin)?;
        let account = self.check(account_number, &old_pin)?;
        let new_hash = self.guard.hash(&new_pin)?;

        match self
            .accounts
            .set_pin_hash(account_number, &account.pin_hash, &new_hash)
        {
            Ok(_) => {
                tracing::info!(account = %account_number, "PIN changed");
                Ok(())
            }
            Err(Error::Conflict(_)) => Err(Error::ConcurrencyConflict { attempts: 1 }),
            Err(Error::NotFound(_)) => Err(Error::Auth),
            Err(e) => Err(e),
        }
    }

    pub fn statement(&self, account_number: &str, pin: &str) -> Result<Statement> {
        self.authorize(account_number, pin)?;

        let mut transactions = self.log.query_by_participant(account_number)?;
        transactions.sort_by(Transaction::statement_order);

        Ok(Statement {
            account_number: account_number.to_string(),
            transactions,
        })
    }

    fn authorize(&self, account_number: &str, pin: &str) -> Result<Account> {
        let pin = Pin::parse(pin)?;
        self.check(account_number, &pin)
    }

    /// Unknown accounts and wrong PINs fail identically
    fn check(&self, account_number: &str, pin: &Pin) -> Result<Account> {
        let account = self.accounts.get(account_number)?.ok_or(Error::Auth)?;
        if !self.guard.verify(&account, pin) {
            tracing::debug!(account = %account_number, "authorization rejected");
            return Err(Error::Auth);
        }
        Ok(account)
    }

    /// CAS loop: recompute from the latest balance after every lost race
    fn mutate_balance<F>(&self, account: &Account, next: F) -> Result<Account>
    where
        F: Fn(Decimal) -> Result<Decimal>,
    {
        let number = account.account_number.as_str();
        let attempts = self.policy.max_cas_attempts;
        let mut balance = account.balance;

        for attempt in 1..=attempts {
            let new_balance = next(balance)?;
            match self
                .accounts
                .compare_and_set_balance(number, balance, new_balance)
            {
                Ok(updated) => return Ok(updated),
                Err(Error::Conflict(reason)) => {
                    tracing::debug!(account = %number, attempt, %reason, "balance CAS lost, re-reading");
                    if attempt < attempts {
                        balance = self.accounts.get(number)?.ok_or(Error::Auth)?.balance;
                    }
                }
                Err(Error::NotFound(_)) => return Err(Error::Auth),
                Err(e) => return Err(e),
            }
        }

        Err(Error::ConcurrencyConflict { attempts })
    }

    /// Undo a debit whose matching credit failed; returns the error to surface
    fn compensate(&self, from: &str, to: &str, amount: Decimal, cause: Error) -> Error {
        tracing::warn!(from = %from, to = %to, %amount, error = %cause, "credit failed, restoring source");

        let mut delay = self.policy.compensation_backoff;
        let mut last_error = None;

        for attempt in 1..=self.policy.compensation_attempts {
            match self.restore(from, amount) {
                Ok(restored) => {
                    self.incidents.report(
                        &Incident::new(
                            IncidentSeverity::Warning,
                            "transfer_compensated",
                            format!("transfer {} -> {} rolled back", from, to),
                        )
                        .with_details(json!({
                            "from": from,
                            "to": to,
                            "amount": amount.to_string(),
                            "attempts": attempt,
                            "restored_balance": restored.balance.to_string(),
                            "cause": cause.to_string(),
                        })),
                    );
                    return cause;
                }
                Err(e) => {
                    tracing::debug!(account = %from, attempt, error = %e, "compensation attempt failed");
                    let lost_race = matches!(e, Error::Conflict(_));
                    last_error = Some(e);
                    if !lost_race && attempt < self.policy.compensation_attempts {
                        thread::sleep(delay);
                        delay = (delay * 2).min(MAX_COMPENSATION_BACKOFF);
                    }
                }
            }
        }

        let reason = match last_error {
            Some(restore_error) => format!("credit failed: {}; restore failed: {}", cause, restore_error),
            None => format!("credit failed: {}", cause),
        };
        self.incidents.report(
            &Incident::new(
                IncidentSeverity::Fatal,
                "fatal_inconsistency",
                format!("{} debited from {} is neither at {} nor restored", amount, from, to),
            )
            .with_details(json!({
                "from": from,
                "to": to,
                "amount": amount.to_string(),
                "attempts": self.policy.compensation_attempts,
                "reason": reason,
            })),
        );

        Error::FatalInconsistency {
            from: from.to_string(),
            to: to.to_string(),
            amount,
            reason,
        }
    }

    fn restore(&self, account_number: &str, amount: Decimal) -> Result<Account> {
        let current = self
            .accounts
            .get(account_number)?
            .ok_or_else(|| Error::not_found(account_number))?;
        let restored = credit(current.balance, amount)?;
        self.accounts
            .compare_and_set_balance(account_number, current.balance, restored)
    }

    /// Append to the log; a failure is an incident, never an error
    fn record(&self, entry: NewTransaction) -> Option<Transaction> {
        let details = json!({
            "kind": entry.kind.as_str(),
            "from": entry.from,
            "to": entry.to,
            "amount": entry.amount.to_string(),
            "reference": entry.reference.map(|r| r.to_string()),
        });

        match self.log.append(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                self.incidents.report(
                    &Incident::new(
                        IncidentSeverity::DataQuality,
                        "transaction_log_append_failed",
                        format!("committed change missing from transaction log: {}", e),
                    )
                    .with_details(details),
                );
                None
            }
        }
    }
}

fn credit(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    balance
        .checked_add(amount)
        .filter(|total| *total <= Amount::max())
        .ok_or_else(|| Error::validation("balance would exceed the maximum supported amount"))
}

fn debit(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    if balance < amount {
        return Err(Error::InsufficientFunds {
            balance,
            requested: amount,
        });
    }
    Ok(balance - amount)
}
