use uuid::Uuid;

use super::{has_feature, has_module_permission, Feature, Role};
use crate::errors::{AppError, AppResult};
use crate::models::user::User;

/// Principal represents the authenticated, still-active user behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    /// Direct reports, only populated for managers
    pub team_members: Vec<Uuid>,
}

/// Records that belong to a user, for row-level scoping (RFQs, orders, follow-ups...)
pub trait OwnedRecord {
    fn assigned_to(&self) -> Option<Uuid>;
    fn created_by(&self) -> Option<Uuid>;
}

impl Principal {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            team_members: user.team_members.clone(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn can_open(&self, module: &str) -> bool {
        has_module_permission(self.role, module)
    }

    pub fn can(&self, feature: Feature) -> bool {
        has_feature(self.role, feature)
    }

    pub fn require_role(&self, role: Role) -> AppResult<()> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(AppError::forbidden("Insufficient permissions"))
        }
    }

    pub fn require_module(&self, module: &str) -> AppResult<()> {
        if self.can_open(module) {
            Ok(())
        } else {
            tracing::debug!(user_id = %self.user_id, role = %self.role, module, "module denied");
            Err(AppError::forbidden("Insufficient permissions"))
        }
    }

    pub fn require_feature(&self, feature: Feature) -> AppResult<()> {
        if self.can(feature) {
            Ok(())
        } else {
            tracing::debug!(
                user_id = %self.user_id,
                role = %self.role,
                feature = feature.as_str(),
                "feature denied"
            );
            Err(AppError::forbidden("Insufficient permissions"))
        }
    }

    /// Whether a single record is visible to this principal.
    ///
    /// Admin and accounts see everything, a manager sees their team's and
    /// their own records, a regular user only their own.
    pub fn can_see<R: OwnedRecord>(&self, record: &R) -> bool {
        let own = record.created_by() == Some(self.user_id);
        match self.role {
            Role::Admin | Role::Accounts => true,
            Role::Manager => {
                own || record
                    .assigned_to()
                    .map(|id| self.team_members.contains(&id))
                    .unwrap_or(false)
            }
            Role::Regular => own || record.assigned_to() == Some(self.user_id),
        }
    }

    pub fn scope<R: OwnedRecord>(&self, records: Vec<R>) -> Vec<R> {
        records.into_iter().filter(|r| self.can_see(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Rfq {
        code: &'static str,
        assigned_to: Option<Uuid>,
        created_by: Option<Uuid>,
    }

    impl OwnedRecord for Rfq {
        fn assigned_to(&self) -> Option<Uuid> {
            self.assigned_to
        }
        fn created_by(&self) -> Option<Uuid> {
            self.created_by
        }
    }

    fn principal(role: Role, team: Vec<Uuid>) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            name: "Someone".to_string(),
            role,
            team_members: team,
        }
    }

    #[test]
    fn scoping_follows_the_role() {
        let rep_a = Uuid::new_v4();
        let rep_b = Uuid::new_v4();
        let manager = principal(Role::Manager, vec![rep_a]);
        let regular = Principal { user_id: rep_b, ..principal(Role::Regular, vec![]) };

        let records = vec![
            Rfq { code: "RFQ-118", assigned_to: Some(rep_a), created_by: None },
            Rfq { code: "RFQ-119", assigned_to: Some(rep_b), created_by: None },
            Rfq { code: "RFQ-120", assigned_to: None, created_by: Some(manager.user_id) },
            Rfq { code: "RFQ-121", assigned_to: None, created_by: Some(rep_b) },
        ];

        let codes = |p: &Principal| -> Vec<&'static str> {
            p.scope(records.clone()).into_iter().map(|r| r.code).collect()
        };

        assert_eq!(codes(&principal(Role::Admin, vec![])).len(), 4);
        assert_eq!(codes(&principal(Role::Accounts, vec![])).len(), 4);
        assert_eq!(codes(&manager), vec!["RFQ-118", "RFQ-120"]);
        assert_eq!(codes(&regular), vec!["RFQ-119", "RFQ-121"]);
    }

    #[test]
    fn require_helpers_map_to_forbidden() {
        let accounts = principal(Role::Accounts, vec![]);
        assert!(accounts.require_module("payments").is_ok());
        assert!(matches!(accounts.require_module("rfq"), Err(AppError::Forbidden(_))));
        assert!(accounts.require_feature(Feature::CashFlowVisibility).is_ok());
        assert!(matches!(
            accounts.require_feature(Feature::DeleteRecords),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(accounts.require_role(Role::Admin), Err(AppError::Forbidden(_))));
    }
}
