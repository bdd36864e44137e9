//! Auth guard - PIN hashing and verification
//!
//! Two encodings can be stored in `Account::pin_hash`:
//! - `sha256`: 64 lowercase hex chars of SHA-256 over the PIN digits
//! - `argon2id$m=<kib>,t=<passes>,p=<lanes>$<base64 salt>$<hex key>`:
//!   salted Argon2id with the cost it was derived under
//!
//! The configured scheme only decides how *new* hashes are made; both
//! encodings always verify, so switching schemes never locks anyone out.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::{Argon2Params, PinScheme};
use crate::domain::result::{Error, Result};
use crate::domain::{Account, Pin};

const ARGON2_PREFIX: &str = "argon2id";

/// Hashes and checks PINs
#[derive(Debug, Clone, Default)]
pub struct AuthGuard {
    scheme: PinScheme,
    argon2: Argon2Params,
}

impl AuthGuard {
    pub fn new(scheme: PinScheme, argon2: Argon2Params) -> Self {
        Self { scheme, argon2 }
    }

    /// Hash a PIN with the configured scheme
    pub fn hash(&self, pin: &Pin) -> Result<String> {
        match self.scheme {
            PinScheme::Sha256 => Ok(sha256_hex(pin)),
            PinScheme::Argon2id => {
                let salt: [u8; 16] = rand::thread_rng().gen();
                let cost = Cost::from(&self.argon2);
                let key = derive(pin, &salt, cost, self.argon2.hash_len as usize)?;
                Ok(format!(
                    "{}${}${}${}",
                    ARGON2_PREFIX,
                    cost,
                    base64::engine::general_purpose::STANDARD.encode(salt),
                    hex::encode(key)
                ))
            }
        }
    }

    /// Check a PIN against the account's stored hash
    ///
    /// Malformed stored hashes never verify.
    pub fn verify(&self, account: &Account, pin: &Pin) -> bool {
        let stored = account.pin_hash.as_str();

        if let Some(rest) = stored.strip_prefix("argon2id$") {
            // Hashes written before the cost was encoded carry only salt and key
            let parts: Vec<&str> = rest.split('$').collect();
            let (cost, salt_b64, key_hex) = match parts.as_slice() {
                &[cost, salt, key] => match cost.parse::<Cost>() {
                    Ok(cost) => (cost, salt, key),
                    Err(_) => return false,
                },
                &[salt, key] => (Cost::from(&self.argon2), salt, key),
                _ => return false,
            };
            let (Ok(salt), Ok(expected)) = (
                base64::engine::general_purpose::STANDARD.decode(salt_b64),
                hex::decode(key_hex),
            ) else {
                return false;
            };
            return match derive(pin, &salt, cost, expected.len()) {
                Ok(actual) => bytes_match(&actual, &expected),
                Err(e) => {
                    tracing::warn!(error = %e, "stored argon2 hash could not be recomputed");
                    false
                }
            };
        }

        bytes_match(sha256_hex(pin).as_bytes(), stored.as_bytes())
    }
}

/// Argon2 cost recorded next to each salt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cost {
    memory: u32,
    time: u32,
    lanes: u32,
}

impl From<&Argon2Params> for Cost {
    fn from(params: &Argon2Params) -> Self {
        Self {
            memory: params.memory_cost,
            time: params.time_cost,
            lanes: params.parallelism,
        }
    }
}

impl std::fmt::Display for Cost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m={},t={},p={}", self.memory, self.time, self.lanes)
    }
}

impl std::str::FromStr for Cost {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut memory = None;
        let mut time = None;
        let mut lanes = None;
        for field in s.split(',') {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("malformed argon2 cost: {}", s)))?;
            let value: u32 = value
                .parse()
                .map_err(|_| Error::Config(format!("malformed argon2 cost: {}", s)))?;
            match key {
                "m" => memory = Some(value),
                "t" => time = Some(value),
                "p" => lanes = Some(value),
                _ => return Err(Error::Config(format!("unknown argon2 cost field: {}", key))),
            }
        }
        match (memory, time, lanes) {
            (Some(memory), Some(time), Some(lanes)) => Ok(Self { memory, time, lanes }),
            _ => Err(Error::Config(format!("incomplete argon2 cost: {}", s))),
        }
    }
}

fn derive(pin: &Pin, salt: &[u8], cost: Cost, len: usize) -> Result<Vec<u8>> {
    let params = Params::new(cost.memory, cost.time, cost.lanes, Some(len))
        .map_err(|e| Error::Config(format!("invalid argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = vec![0u8; len];
    argon2
        .hash_password_into(pin.as_str().as_bytes(), salt, &mut key)
        .map_err(|e| Error::storage(format!("failed to hash PIN: {}", e)))?;
    Ok(key)
}

fn sha256_hex(pin: &Pin) -> String {
    hex::encode(Sha256::digest(pin.as_str().as_bytes()))
}

fn bytes_match(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(s: &str) -> Pin {
        Pin::parse(s).unwrap()
    }

    fn account_with(hash: String) -> Account {
        Account::new("000001", "Test", hash)
    }

    fn fast_argon2() -> AuthGuard {
        AuthGuard::new(
            PinScheme::Argon2id,
            Argon2Params {
                memory_cost: 256,
                time_cost: 1,
                parallelism: 1,
                hash_len: 32,
            },
        )
    }

    #[test]
    fn test_sha256_matches_known_digest() {
        let guard = AuthGuard::default();
        assert_eq!(
            guard.hash(&pin("1234")).unwrap(),
            "03ac674216f3e15c761ee1a5e255f067953623c8b388b4459e13f978d7c846f4"
        );
    }

    #[test]
    fn test_sha256_verify() {
        let guard = AuthGuard::default();
        let account = account_with(guard.hash(&pin("1234")).unwrap());
        assert!(guard.verify(&account, &pin("1234")));
        assert!(!guard.verify(&account, &pin("4321")));
    }

    #[test]
    fn test_argon2_hashes_are_salted() {
        let guard = fast_argon2();
        let a = guard.hash(&pin("1234")).unwrap();
        let b = guard.hash(&pin("1234")).unwrap();
        assert!(a.starts_with("argon2id$"));
        assert_ne!(a, b);

        let account = account_with(a);
        assert!(guard.verify(&account, &pin("1234")));
        assert!(!guard.verify(&account, &pin("0000")));
    }

    #[test]
    fn test_both_encodings_verify_under_either_scheme() {
        let sha = AuthGuard::default();
        let argon = fast_argon2();
        let legacy = account_with(sha.hash(&pin("5555")).unwrap());
        let hardened = account_with(argon.hash(&pin("5555")).unwrap());

        assert!(argon.verify(&legacy, &pin("5555")));
        assert!(fast_argon2().verify(&hardened, &pin("5555")));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        let guard = AuthGuard::default();
        for stored in ["", "argon2id$", "argon2id$!!$zz", "deadbeef"] {
            assert!(!guard.verify(&account_with(stored.to_string()), &pin("1234")));
        }
    }

    #[test]
    fn test_argon2_hash_survives_cost_change() {
        let before = fast_argon2();
        let stored = before.hash(&pin("1234")).unwrap();
        assert!(stored.starts_with("argon2id$m=256,t=1,p=1$"));

        let after = AuthGuard::new(
            PinScheme::Argon2id,
            Argon2Params {
                memory_cost: 512,
                time_cost: 2,
                parallelism: 1,
                hash_len: 32,
            },
        );
        let account = account_with(stored);
        assert!(after.verify(&account, &pin("1234")));
        assert!(!after.verify(&account, &pin("4321")));
    }

    #[test]
    fn test_argon2_hash_without_cost_uses_configured_cost() {
        let guard = fast_argon2();
        let salt = [7u8; 16];
        let key = derive(&pin("2468"), &salt, Cost::from(&guard.argon2), 32).unwrap();
        let stored = format!(
            "argon2id${}${}",
            base64::engine::general_purpose::STANDARD.encode(salt),
            hex::encode(key)
        );
        assert!(guard.verify(&account_with(stored), &pin("2468")));
    }

    #[test]
    fn test_cost_parsing() {
        let cost: Cost = "m=19456,t=2,p=1".parse().unwrap();
        assert_eq!(cost.to_string(), "m=19456,t=2,p=1");
        assert!("m=1,t=2".parse::<Cost>().is_err());
        assert!("m=1,t=x,p=1".parse::<Cost>().is_err());
        assert!("q=1,t=1,p=1".parse::<Cost>().is_err());
    }
}
