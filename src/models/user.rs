use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::{FeatureFlags, Role};
use crate::errors::AppError;

/// Public user record. Has no secret fields by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub department: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    /// Work items (e.g. RFQ codes) assigned to a regular user
    #[serde(default)]
    pub assigned_work: Vec<String>,
    /// Direct reports of a manager
    #[serde(default)]
    pub team_members: Vec<Uuid>,
}

impl crate::events::Loggable for User {
    fn entity_type() -> &'static str { "user" }
    fn subject_id(&self) -> Uuid { self.id }
}

/// Stored user record including the password hash.
///
/// The hash is only readable inside this crate; everything that leaves the
/// crate goes through `User`.
#[derive(Clone)]
pub struct DbUser {
    pub(crate) password_hash: String,
    pub user: User,
}

impl fmt::Debug for DbUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbUser")
            .field("password_hash", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

impl DbUser {
    pub(crate) fn new(user: User, password_hash: String) -> Self {
        Self { password_hash, user }
    }

    pub fn is_active(&self) -> bool {
        self.user.is_active
    }

    pub fn into_public(self) -> User {
        self.user
    }
}

impl From<DbUser> for User {
    fn from(value: DbUser) -> Self {
        value.into_public()
    }
}

/// Raw sqlite row; ids and lists are stored as text.
#[derive(Clone, FromRow)]
pub(crate) struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: String,
    pub department: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub assigned_work: String,
    pub team_members: String,
}

impl TryFrom<UserRow> for DbUser {
    type Error = AppError;

    fn try_from(value: UserRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id)
            .map_err(|err| AppError::internal(format!("invalid user id {}: {err}", value.id)))?;
        let role = value
            .role
            .parse::<Role>()
            .map_err(|err| AppError::internal(format!("user {id}: {err}")))?;
        let assigned_work: Vec<String> = serde_json::from_str(&value.assigned_work)
            .map_err(|err| AppError::internal(format!("user {id}: bad assigned_work: {err}")))?;
        let team_members: Vec<Uuid> = serde_json::from_str(&value.team_members)
            .map_err(|err| AppError::internal(format!("user {id}: bad team_members: {err}")))?;

        Ok(DbUser::new(
            User {
                id,
                email: value.email,
                name: value.name,
                role,
                department: value.department,
                is_active: value.is_active,
                created_at: value.created_at,
                last_login: value.last_login,
                assigned_work,
                team_members,
            },
            value.password_hash,
        ))
    }
}

/// Input for administrative user creation (CLI, fixtures).
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub department: Option<String>,
    #[serde(default)]
    pub assigned_work: Vec<String>,
    #[serde(default)]
    pub team_members: Vec<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "admin@phtrading.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionSummary {
    pub role: Role,
    pub modules: Vec<String>,
    pub features: FeatureFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> UserRow {
        UserRow {
            id: Uuid::new_v4().to_string(),
            email: "sales1@phtrading.com".to_string(),
            name: "John Sales Executive".to_string(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
            role: "regular".to_string(),
            department: Some("Sales".to_string()),
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
            assigned_work: r#"["RFQ-2025-118","RFQ-2025-119"]"#.to_string(),
            team_members: "[]".to_string(),
        }
    }

    #[test]
    fn public_user_serializes_without_hash() {
        let db_user = DbUser::try_from(row()).unwrap();
        let value = serde_json::to_value(db_user.into_public()).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("password_hash"));
        assert!(!obj.contains_key("password"));
        assert_eq!(value["role"], "regular");
        assert_eq!(value["assigned_work"][1], "RFQ-2025-119");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let db_user = DbUser::try_from(row()).unwrap();
        let printed = format!("{db_user:?}");
        assert!(printed.contains("sales1@phtrading.com"));
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("$argon2id$"));

        let login = LoginRequest {
            email: "sales1@phtrading.com".to_string(),
            password: "hunter2-hunter2".to_string(),
        };
        assert!(!format!("{login:?}").contains("hunter2"));
    }

    #[test]
    fn unknown_role_in_storage_is_an_error() {
        let mut bad = row();
        bad.role = "owner".to_string();
        assert!(matches!(DbUser::try_from(bad), Err(AppError::Internal(_))));
    }
}
