use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use rand_core::OsRng;

use crate::errors::AppError;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Argon2id work factor. Verification reads the cost back from the stored
/// PHC string, so changing it only affects newly hashed passwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashCost {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        Ok(Self {
            memory_kib: env_u32("PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: env_u32("PASSWORD_HASH_ITERATIONS", defaults.iterations)?,
            parallelism: env_u32("PASSWORD_HASH_PARALLELISM", defaults.parallelism)?,
        })
    }

    fn hasher(&self) -> Result<Argon2<'static>, AppError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|err| AppError::configuration(format!("invalid password hash cost: {err}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

fn env_u32(name: &str, default: u32) -> Result<u32, AppError> {
    match std::env::var(name) {
        Ok(val) => val
            .parse::<u32>()
            .map_err(|_| AppError::configuration(format!("{name} must be a valid integer"))),
        Err(_) => Ok(default),
    }
}

pub fn hash_password(password: &str, cost: &HashCost) -> Result<String, AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let salt = SaltString::generate(&mut OsRng);
    cost.hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::internal(format!("failed to hash password: {err}")))
}

/// Constant-time check of `password` against a PHC hash string.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|err| AppError::internal(format!("invalid password hash: {err}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHEAP: HashCost = HashCost { memory_kib: 1024, iterations: 1, parallelism: 1 };

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("secure_password_123", &CHEAP).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("m=1024,t=1,p=1"));
        assert!(verify_password("secure_password_123", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(matches!(hash_password("short", &CHEAP), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn salts_differ_per_hash() {
        let a = hash_password("same-password", &CHEAP).unwrap();
        let b = hash_password("same-password", &CHEAP).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn zero_cost_is_a_configuration_error() {
        let cost = HashCost { memory_kib: 0, iterations: 0, parallelism: 0 };
        assert!(matches!(hash_password("long-enough", &cost), Err(AppError::Configuration(_))));
    }
}
