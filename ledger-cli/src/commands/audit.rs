//! Audit command - check that balances and the log agree

use anyhow::Result;
use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;

use ledger_core::ports::AccountStore;

use super::with_context;
use crate::output;

#[derive(Debug, Serialize)]
struct AuditSummary {
    accounts: usize,
    total_balance: Decimal,
    /// Deposits minus withdrawals according to the log
    logged_net_flow: Decimal,
    consistent: bool,
}

pub fn run(json: bool) -> Result<()> {
    with_context("audit", |ctx| {
        let result = ctx.store.list_balances().and_then(|balances| {
            let total_balance: Decimal = balances.iter().map(|(_, b)| *b).sum();
            let logged_net_flow = ctx.store.external_net_flow()?;
            Ok(AuditSummary {
                accounts: balances.len(),
                total_balance,
                logged_net_flow,
                consistent: total_balance == logged_net_flow,
            })
        });

        output::emit(json, result, |summary| {
            println!("{}", "Ledger Audit".bold());
            let mut table = output::create_table();
            table.add_row(vec!["Accounts".to_string(), summary.accounts.to_string()]);
            table.add_row(vec!["Total balance".to_string(), summary.total_balance.to_string()]);
            table.add_row(vec!["Logged net flow".to_string(), summary.logged_net_flow.to_string()]);
            println!("{}", table);

            if summary.consistent {
                output::success("Balances match the transaction log");
            } else {
                output::warning(
                    "Balances and transaction log disagree; check `ledger logs list --incidents`",
                );
            }
        })
    })
}
