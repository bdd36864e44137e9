//! Ledger CLI - PIN-gated accounts in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{account, audit, logs, money, statement};

/// Ledger - PIN-gated accounts in your terminal
#[derive(Parser)]
#[command(name = "ledger", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new account
    Create {
        /// Account holder name
        name: String,
        /// Four-digit PIN (prompted if omitted)
        #[arg(long)]
        pin: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Deposit money into an account
    Deposit {
        /// Account number
        account: String,
        /// Amount, at most two decimal places
        amount: String,
        #[arg(long)]
        pin: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Withdraw money from an account
    Withdraw {
        account: String,
        amount: String,
        #[arg(long)]
        pin: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Transfer money to another account
    Transfer {
        /// Source account number
        from: String,
        /// Destination account number
        to: String,
        amount: String,
        /// PIN of the source account
        #[arg(long)]
        pin: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Change an account's PIN
    SetPin {
        account: String,
        #[arg(long)]
        old_pin: Option<String>,
        #[arg(long)]
        new_pin: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Show an account's transaction history
    Statement {
        account: String,
        #[arg(long)]
        pin: Option<String>,
        /// Output format
        #[arg(long, value_enum, default_value_t = statement::Format::Table)]
        format: statement::Format,
        /// Output as JSON (shorthand for --format json)
        #[arg(long)]
        json: bool,
    },

    /// Check that stored balances add up
    Audit {
        #[arg(long)]
        json: bool,
    },

    /// View and manage application logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LEDGER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Create { name, pin, json } => account::create(&name, pin, json),
        Commands::Deposit {
            account,
            amount,
            pin,
            json,
        } => money::deposit(&account, &amount, pin, json),
        Commands::Withdraw {
            account,
            amount,
            pin,
            json,
        } => money::withdraw(&account, &amount, pin, json),
        Commands::Transfer {
            from,
            to,
            amount,
            pin,
            json,
        } => money::transfer(&from, &to, &amount, pin, json),
        Commands::SetPin {
            account,
            old_pin,
            new_pin,
            json,
        } => account::set_pin(&account, old_pin, new_pin, json),
        Commands::Statement {
            account,
            pin,
            format,
            json,
        } => {
            let format = if json { statement::Format::Json } else { format };
            statement::run(&account, pin, format)
        }
        Commands::Audit { json } => audit::run(json),
        Commands::Logs { command } => logs::run(command),
    }
}
