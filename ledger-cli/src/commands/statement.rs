//! Statement command - transaction history for one account

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use ledger_core::{Statement, Transaction, TransactionKind};

use super::{resolve_pin, with_context};
use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Table,
    Json,
    Csv,
}

/// Flat CSV row
#[derive(Serialize)]
struct CsvRow<'a> {
    sequence: u64,
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'a str,
    from: &'a str,
    to: &'a str,
    amount: String,
    reference: String,
}

impl<'a> From<&'a Transaction> for CsvRow<'a> {
    fn from(tx: &'a Transaction) -> Self {
        Self {
            sequence: tx.sequence,
            timestamp: tx.timestamp.to_rfc3339(),
            kind: tx.kind.as_str(),
            from: tx.from.as_deref().unwrap_or(""),
            to: tx.to.as_deref().unwrap_or(""),
            amount: tx.amount.to_string(),
            reference: tx.reference.map(|r| r.to_string()).unwrap_or_default(),
        }
    }
}

pub fn run(account: &str, pin: Option<String>, format: Format) -> Result<()> {
    let pin = resolve_pin(pin, "PIN")?;

    with_context("statement", |ctx| {
        let result = ctx.ledger.statement(account, &pin);
        match format {
            Format::Json => output::emit(true, result, |_| {}),
            Format::Table => output::emit(false, result, print_table),
            Format::Csv => write_csv(&result?),
        }
    })
}

fn counterparty<'a>(tx: &'a Transaction, account: &str) -> &'a str {
    let other = if tx.from.as_deref() == Some(account) {
        tx.to.as_deref()
    } else {
        tx.from.as_deref()
    };
    other.unwrap_or("external")
}

fn print_table(statement: &Statement) {
    if statement.transactions.is_empty() {
        println!("No transactions for {}.", statement.account_number);
        return;
    }

    println!("{} {}", "Statement for".bold(), statement.account_number.bold());

    let mut table = output::create_table();
    table.set_header(vec!["#", "Time", "Type", "Counterparty", "Amount"]);
    for tx in &statement.transactions {
        let own = Some(statement.account_number.as_str());
        // Each transfer leg moves money on one side only
        let amount = match tx.kind {
            TransactionKind::Deposit => format!("+{}", tx.amount).green().to_string(),
            TransactionKind::Withdraw => format!("-{}", tx.amount).red().to_string(),
            TransactionKind::TransferIn if tx.to.as_deref() == own => {
                format!("+{}", tx.amount).green().to_string()
            }
            TransactionKind::TransferOut if tx.from.as_deref() == own => {
                format!("-{}", tx.amount).red().to_string()
            }
            _ => tx.amount.to_string().dimmed().to_string(),
        };
        table.add_row(vec![
            tx.sequence.to_string(),
            tx.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            tx.kind.to_string(),
            counterparty(tx, &statement.account_number).to_string(),
            amount,
        ]);
    }
    println!("{}", table);
}

fn write_csv(statement: &Statement) -> Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for tx in &statement.transactions {
        writer.serialize(CsvRow::from(tx))?;
    }
    writer.flush()?;
    Ok(())
}
