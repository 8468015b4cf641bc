use std::sync::Arc;

use crate::db::UserStore;
use crate::errors::AppError;
use crate::models::user::User;
use crate::utils::{hash_password, verify_password, HashCost};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// Unknown email, inactive account and wrong password are indistinguishable.
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("user store unavailable: {0}")]
    Store(String),
}

impl From<CredentialError> for AppError {
    fn from(value: CredentialError) -> Self {
        match value {
            CredentialError::InvalidCredentials => AppError::unauthorized("Invalid email or password"),
            CredentialError::Store(msg) => AppError::internal(msg),
        }
    }
}

#[derive(Clone)]
pub struct CredentialValidator {
    users: Arc<dyn UserStore>,
    dummy_hash: Arc<str>,
}

impl CredentialValidator {
    /// Hashes a throwaway password at the configured cost so that unknown
    /// emails cost as much to reject as wrong passwords.
    pub fn new(users: Arc<dyn UserStore>, cost: &HashCost) -> Result<Self, AppError> {
        let dummy_hash = hash_password("dummy-password-never-matches", cost)?;
        Ok(Self {
            users,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub async fn validate(&self, email: &str, password: &str) -> Result<User, CredentialError> {
        let found = self
            .users
            .find_by_email(email)
            .await
            .map_err(|err| CredentialError::Store(err.to_string()))?;

        let Some(db_user) = found else {
            let _ = verify_password(password, &self.dummy_hash);
            return Err(CredentialError::InvalidCredentials);
        };

        // An unreadable stored hash is treated like a wrong password.
        let matches = verify_password(password, &db_user.password_hash).unwrap_or_else(|err| {
            tracing::warn!(user_id = %db_user.user.id, error = %err, "stored password hash unreadable");
            false
        });

        if !matches || !db_user.is_active() {
            return Err(CredentialError::InvalidCredentials);
        }

        Ok(db_user.into_public())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::Role;
    use crate::db::MemoryUserStore;
    use crate::models::user::NewUser;

    const CHEAP: HashCost = HashCost { memory_kib: 1024, iterations: 1, parallelism: 1 };

    async fn validator_with_user(active: bool) -> CredentialValidator {
        let store = Arc::new(MemoryUserStore::new());
        store
            .create(
                NewUser {
                    email: "sales1@phtrading.com".to_string(),
                    name: "John Sales Executive".to_string(),
                    password: "correct-horse".to_string(),
                    role: Role::Regular,
                    department: Some("Sales".to_string()),
                    assigned_work: vec!["RFQ-2025-118".to_string()],
                    team_members: vec![],
                },
                &CHEAP,
            )
            .await
            .unwrap();
        if !active {
            store.deactivate("sales1@phtrading.com").await.unwrap();
        }
        CredentialValidator::new(store, &CHEAP).unwrap()
    }

    #[tokio::test]
    async fn valid_credentials_return_public_user() {
        let validator = validator_with_user(true).await;
        let user = validator.validate("sales1@phtrading.com", "correct-horse").await.unwrap();
        assert_eq!(user.role, Role::Regular);

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn failures_are_indistinguishable() {
        let validator = validator_with_user(true).await;
        let unknown = validator.validate("ghost@phtrading.com", "correct-horse").await.unwrap_err();
        let wrong = validator.validate("sales1@phtrading.com", "wrong-password").await.unwrap_err();
        assert_eq!(unknown, CredentialError::InvalidCredentials);
        assert_eq!(unknown, wrong);
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn inactive_user_is_rejected() {
        let validator = validator_with_user(false).await;
        let err = validator.validate("sales1@phtrading.com", "correct-horse").await.unwrap_err();
        assert_eq!(err, CredentialError::InvalidCredentials);
    }

    #[tokio::test]
    async fn email_match_is_exact() {
        let validator = validator_with_user(true).await;
        let err = validator.validate("SALES1@phtrading.com", "correct-horse").await.unwrap_err();
        assert_eq!(err, CredentialError::InvalidCredentials);
    }
}
