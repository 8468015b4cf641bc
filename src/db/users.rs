//! User record storage
//!
//! The credential validator and the security gate only need the lookup
//! contract in [`UserStore`]; the backend is chosen when the app state is
//! built.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::Role;
use crate::errors::{AppError, AppResult};
use crate::models::user::{DbUser, NewUser, User, UserRow};
use crate::utils::{hash_password, utc_now, HashCost};

const USER_COLUMNS: &str = "id, email, name, password_hash, role, department, is_active, created_at, last_login, assigned_work, team_members";

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Exact, case-sensitive email match. Inactive users are returned too.
    async fn find_by_email(&self, email: &str) -> AppResult<Option<DbUser>>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<DbUser>>;

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;

    async fn create(&self, new_user: NewUser, cost: &HashCost) -> AppResult<User>;

    /// Disables an account. Existing tokens stop working on their next request.
    async fn deactivate(&self, email: &str) -> AppResult<User>;

    /// Public records of a manager's direct reports, in stored order.
    ///
    /// Empty when `manager_id` is unknown or not a manager. Member ids that no
    /// longer resolve are skipped.
    async fn find_team(&self, manager_id: Uuid) -> AppResult<Vec<User>> {
        let manager = match self.find_by_id(manager_id).await? {
            Some(db_user) if db_user.user.role == Role::Manager => db_user.user,
            _ => return Ok(Vec::new()),
        };

        let mut team = Vec::with_capacity(manager.team_members.len());
        for member_id in manager.team_members {
            match self.find_by_id(member_id).await? {
                Some(member) => team.push(member.into_public()),
                None => tracing::debug!(%manager_id, %member_id, "team member no longer exists"),
            }
        }
        Ok(team)
    }
}

fn build_db_user(new_user: NewUser, cost: &HashCost) -> AppResult<DbUser> {
    let password_hash = hash_password(&new_user.password, cost)?;
    let user = User {
        id: Uuid::new_v4(),
        email: new_user.email,
        name: new_user.name,
        role: new_user.role,
        department: new_user.department,
        is_active: true,
        created_at: utc_now(),
        last_login: None,
        assigned_work: new_user.assigned_work,
        team_members: new_user.team_members,
    };
    Ok(DbUser::new(user, password_hash))
}

fn to_json<T: serde::Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string(value).map_err(|err| AppError::internal(format!("failed to encode list: {err}")))
}

#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, value: String) -> AppResult<Option<DbUser>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(DbUser::try_from).transpose()
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<DbUser>> {
        self.fetch_one_where("email = ?", email.to_string()).await
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<DbUser>> {
        self.fetch_one_where("id = ?", id.to_string()).await
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create(&self, new_user: NewUser, cost: &HashCost) -> AppResult<User> {
        let db_user = build_db_user(new_user, cost)?;
        let user = &db_user.user;

        let result = sqlx::query(
            "INSERT INTO users (id, email, name, password_hash, role, department, is_active, created_at, last_login, assigned_work, team_members) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&db_user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.department)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.last_login)
        .bind(to_json(&user.assigned_work)?)
        .bind(to_json(&user.team_members)?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(db_user.into_public()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(AppError::conflict("email already in use"))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn deactivate(&self, email: &str) -> AppResult<User> {
        let updated = sqlx::query("UPDATE users SET is_active = 0 WHERE email = ?")
            .bind(email)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::not_found("user not found"));
        }

        self.find_by_email(email)
            .await?
            .map(DbUser::into_public)
            .ok_or_else(|| AppError::not_found("user not found"))
    }
}

/// Process-local store, for tests and single-binary demos.
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<Uuid, DbUser>,
    by_email: DashMap<String, Uuid>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<DbUser>> {
        let Some(id) = self.by_email.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<DbUser>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(mut entry) = self.users.get_mut(&id) {
            entry.user.last_login = Some(at);
        }
        Ok(())
    }

    async fn create(&self, new_user: NewUser, cost: &HashCost) -> AppResult<User> {
        let db_user = build_db_user(new_user, cost)?;
        match self.by_email.entry(db_user.user.email.clone()) {
            Entry::Occupied(_) => Err(AppError::conflict("email already in use")),
            Entry::Vacant(slot) => {
                slot.insert(db_user.user.id);
                let user = db_user.user.clone();
                self.users.insert(user.id, db_user);
                Ok(user)
            }
        }
    }

    async fn deactivate(&self, email: &str) -> AppResult<User> {
        let id = self
            .by_email
            .get(email)
            .map(|id| *id)
            .ok_or_else(|| AppError::not_found("user not found"))?;
        let mut entry = self
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("user not found"))?;
        entry.user.is_active = false;
        Ok(entry.user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHEAP: HashCost = HashCost { memory_kib: 1024, iterations: 1, parallelism: 1 };

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "Finance Team".to_string(),
            password: "ledger-password".to_string(),
            role: Role::Accounts,
            department: Some("Finance".to_string()),
            assigned_work: vec![],
            team_members: vec![],
        }
    }

    #[tokio::test]
    async fn memory_store_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        store.create(new_user("accounts@phtrading.com"), &CHEAP).await.unwrap();
        let err = store.create(new_user("accounts@phtrading.com"), &CHEAP).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn memory_store_lookup_is_case_sensitive() {
        let store = MemoryUserStore::new();
        store.create(new_user("accounts@phtrading.com"), &CHEAP).await.unwrap();
        assert!(store.find_by_email("accounts@phtrading.com").await.unwrap().is_some());
        assert!(store.find_by_email("Accounts@PHTrading.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn team_resolves_only_for_managers() {
        let store = MemoryUserStore::new();
        let rep = store.create(new_user("sales1@phtrading.com"), &CHEAP).await.unwrap();
        let gone = Uuid::new_v4();
        let manager = store
            .create(
                NewUser {
                    role: Role::Manager,
                    team_members: vec![rep.id, gone],
                    ..new_user("manager@phtrading.com")
                },
                &CHEAP,
            )
            .await
            .unwrap();
        let admin = store
            .create(
                NewUser {
                    role: Role::Admin,
                    team_members: vec![rep.id],
                    ..new_user("admin@phtrading.com")
                },
                &CHEAP,
            )
            .await
            .unwrap();

        let team = store.find_team(manager.id).await.unwrap();
        assert_eq!(team, vec![rep]);
        assert!(store.find_team(admin.id).await.unwrap().is_empty());
        assert!(store.find_team(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_deactivate_and_login() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("accounts@phtrading.com"), &CHEAP).await.unwrap();
        let now = utc_now();
        store.record_login(user.id, now).await.unwrap();
        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap().user.last_login, Some(now));

        let disabled = store.deactivate("accounts@phtrading.com").await.unwrap();
        assert!(!disabled.is_active);
        assert!(!store.find_by_id(user.id).await.unwrap().unwrap().is_active());
        assert!(matches!(store.deactivate("nobody@phtrading.com").await, Err(AppError::NotFound(_))));
    }
}
