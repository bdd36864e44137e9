//! CLI command implementations

pub mod account;
pub mod audit;
pub mod logs;
pub mod money;
pub mod statement;

use std::path::PathBuf;

use anyhow::{Context, Result};
use dialoguer::Password;
use ledger_core::{EntryPoint, LedgerContext, LogEvent, LoggingService};

/// Get the ledger directory from environment or default
pub fn get_ledger_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("LEDGER_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".ledger"))
}

/// Get or create the ledger context
pub fn get_context() -> Result<LedgerContext> {
    let ledger_dir = get_ledger_dir()?;
    LedgerContext::new(&ledger_dir, EntryPoint::Cli).context("Failed to initialize ledger")
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: Option<&LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Open the context, record the command, run it, and record a failure
pub fn with_context<T, F>(command: &str, f: F) -> Result<T>
where
    F: FnOnce(&LedgerContext) -> Result<T>,
{
    tracing::debug!(command, "running command");
    let ctx = get_context()?;
    let logger = ctx.logging.as_deref();
    log_event(logger, LogEvent::new("command_executed").with_command(command));

    let result = f(&ctx);
    if let Err(e) = &result {
        log_event(
            logger,
            LogEvent::new("command_failed")
                .with_command(command)
                .with_error(format!("{:#}", e)),
        );
    }
    result
}

/// Get a PIN from the flag, the LEDGER_PIN env var, or a hidden prompt
pub fn resolve_pin(flag: Option<String>, prompt: &str) -> Result<String> {
    if let Some(pin) = flag {
        return Ok(pin);
    }
    if let Ok(pin) = std::env::var("LEDGER_PIN") {
        return Ok(pin);
    }
    let pin = Password::new().with_prompt(prompt).interact()?;
    Ok(pin)
}

/// Prompt for a new PIN twice unless it was given on the command line
pub fn resolve_new_pin(flag: Option<String>) -> Result<String> {
    if let Some(pin) = flag {
        return Ok(pin);
    }
    let pin = Password::new()
        .with_prompt("New PIN")
        .with_confirmation("Confirm PIN", "PINs do not match")
        .interact()?;
    Ok(pin)
}
