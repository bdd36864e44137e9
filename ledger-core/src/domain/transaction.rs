//! Transaction domain model
//!
//! Transactions are historical facts: the log assigns `sequence` and
//! `timestamp` at insert and nothing rewrites them afterwards.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of balance mutation a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    TransferOut,
    TransferIn,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::TransferOut => "transfer-out",
            TransactionKind::TransferIn => "transfer-in",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdraw" => Ok(TransactionKind::Withdraw),
            "transfer-out" => Ok(TransactionKind::TransferOut),
            "transfer-in" => Ok(TransactionKind::TransferIn),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

/// A record ready to be appended (the log fills in sequence and timestamp)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    /// Source account, `None` for money entering from outside
    pub from: Option<String>,
    /// Destination account, `None` for money leaving the ledger
    pub to: Option<String>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    /// Shared by both legs of a transfer
    pub reference: Option<Uuid>,
}

impl NewTransaction {
    pub fn deposit(account_number: &str, amount: Decimal) -> Self {
        Self {
            from: None,
            to: Some(account_number.to_string()),
            kind: TransactionKind::Deposit,
            amount,
            reference: None,
        }
    }

    pub fn withdraw(account_number: &str, amount: Decimal) -> Self {
        Self {
            from: Some(account_number.to_string()),
            to: None,
            kind: TransactionKind::Withdraw,
            amount,
            reference: None,
        }
    }

    /// Both legs of a transfer, outgoing first
    pub fn transfer_pair(from: &str, to: &str, amount: Decimal, reference: Uuid) -> [Self; 2] {
        let leg = |kind| Self {
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            kind,
            amount,
            reference: Some(reference),
        };
        [leg(TransactionKind::TransferOut), leg(TransactionKind::TransferIn)]
    }

    /// Seal the draft with the log-assigned position and time
    pub fn commit(self, sequence: u64, timestamp: DateTime<Utc>) -> Transaction {
        Transaction {
            sequence,
            from: self.from,
            to: self.to,
            kind: self.kind,
            amount: self.amount,
            timestamp,
            reference: self.reference,
        }
    }
}

/// An appended, immutable transaction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sequence: u64,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reference: Option<Uuid>,
}

impl Transaction {
    /// True when the account is on either side of this record
    pub fn involves(&self, account_number: &str) -> bool {
        self.from.as_deref() == Some(account_number) || self.to.as_deref() == Some(account_number)
    }

    /// Statement order: timestamp, then insertion order
    pub fn statement_order(a: &Transaction, b: &Transaction) -> std::cmp::Ordering {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.sequence.cmp(&b.sequence))
    }
}
