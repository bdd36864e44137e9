//! Account domain model

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of decimal digits in an account number
pub const ACCOUNT_NUMBER_DIGITS: usize = 6;

/// Size of the account number keyspace (000000..=999999)
pub const ACCOUNT_NUMBER_SPACE: u32 = 1_000_000;

/// A ledger account
///
/// `balance` is only ever changed through the store's compare-and-set
/// primitive, and `version` counts those successful writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_number: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub pin_hash: String,
    pub balance: Decimal,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh account with a zero balance
    pub fn new(
        account_number: impl Into<String>,
        name: impl Into<String>,
        pin_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            account_number: account_number.into(),
            name: name.into(),
            pin_hash: pin_hash.into(),
            balance: Decimal::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Outbound projection without credentials
    pub fn view(&self) -> AccountView {
        AccountView {
            account_number: self.account_number.clone(),
            name: self.name.clone(),
            balance: self.balance,
            created_at: self.created_at,
        }
    }

    /// Normalize a display name, rejecting blank input
    pub fn normalize_name(name: &str) -> Result<String, &'static str> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err("account name cannot be empty");
        }
        Ok(trimmed.to_string())
    }
}

/// What callers get to see of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub account_number: String,
    pub name: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Draw a random, zero-padded account number
///
/// Uniqueness is the store's job; this only samples the keyspace.
pub fn random_account_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{:0width$}",
        rng.gen_range(0..ACCOUNT_NUMBER_SPACE),
        width = ACCOUNT_NUMBER_DIGITS
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_new_account_starts_empty() {
        let account = Account::new("000042", "Alice", "hash");
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.version, 0);
    }

    #[test]
    fn test_serialized_account_hides_pin_hash() {
        let account = Account::new("000042", "Alice", "secret-hash");
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("pin_hash"));

        let view = serde_json::to_string(&account.view()).unwrap();
        assert!(!view.contains("secret-hash"));
    }

    #[test]
    fn test_name_normalization() {
        assert_eq!(Account::normalize_name("  Alice "), Ok("Alice".to_string()));
        assert!(Account::normalize_name("   ").is_err());
    }

    #[test]
    fn test_random_account_number_is_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let number = random_account_number(&mut rng);
            assert_eq!(number.len(), ACCOUNT_NUMBER_DIGITS);
            assert!(number.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
