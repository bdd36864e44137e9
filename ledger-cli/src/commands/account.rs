//! Account commands - open accounts and change PINs

use anyhow::Result;
use colored::Colorize;

use super::{resolve_new_pin, resolve_pin, with_context};
use crate::output;

pub fn create(name: &str, pin: Option<String>, json: bool) -> Result<()> {
    let pin = resolve_new_pin(pin)?;

    with_context("create", |ctx| {
        output::emit(json, ctx.ledger.create_account(name, &pin), |account| {
            output::success(&format!("Opened account for {}", account.name));
            println!("  Account number: {}", account.account_number.bold());
        })
    })
}

pub fn set_pin(
    account: &str,
    old_pin: Option<String>,
    new_pin: Option<String>,
    json: bool,
) -> Result<()> {
    let old_pin = resolve_pin(old_pin, "Current PIN")?;
    let new_pin = resolve_new_pin(new_pin)?;

    with_context("set-pin", |ctx| {
        let result = ctx
            .ledger
            .set_pin(account, &old_pin, &new_pin)
            .map(|()| serde_json::json!({ "account_number": account }));
        output::emit(json, result, |_| output::success("PIN changed"))
    })
}
