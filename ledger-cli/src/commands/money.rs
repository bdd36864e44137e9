//! Money commands - deposit, withdraw, transfer

use anyhow::Result;
use colored::Colorize;

use ledger_core::{Amount, Receipt};

use super::{resolve_pin, with_context};
use crate::output;

fn print_receipt(verb: &str, amount: &str, receipt: &Receipt) {
    output::success(&format!("{} {}", verb, amount));
    println!("  Balance: {}", receipt.balance.to_string().bold());
    if receipt.transaction.is_none() {
        output::warning("  The transaction log could not record this change; it has been reported.");
    }
}

pub fn deposit(account: &str, amount: &str, pin: Option<String>, json: bool) -> Result<()> {
    let pin = resolve_pin(pin, "PIN")?;

    with_context("deposit", |ctx| {
        let result = amount
            .parse::<Amount>()
            .and_then(|a| ctx.ledger.deposit(account, &pin, a.value()));
        output::emit(json, result, |r| print_receipt("Deposited", amount, r))
    })
}

pub fn withdraw(account: &str, amount: &str, pin: Option<String>, json: bool) -> Result<()> {
    let pin = resolve_pin(pin, "PIN")?;

    with_context("withdraw", |ctx| {
        let result = amount
            .parse::<Amount>()
            .and_then(|a| ctx.ledger.withdraw(account, &pin, a.value()));
        output::emit(json, result, |r| print_receipt("Withdrew", amount, r))
    })
}

pub fn transfer(from: &str, to: &str, amount: &str, pin: Option<String>, json: bool) -> Result<()> {
    let pin = resolve_pin(pin, "PIN")?;

    with_context("transfer", |ctx| {
        let result = amount
            .parse::<Amount>()
            .and_then(|a| ctx.ledger.transfer(from, &pin, to, a.value()));
        output::emit(json, result, |r| {
            output::success(&format!("Transferred {} to {}", r.amount, r.to_account));
            println!("  Balance: {}", r.from_balance.to_string().bold());
            println!("  Reference: {}", r.reference.to_string().dimmed());
        })
    })
}
