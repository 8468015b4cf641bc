//! Authorization module - role matrix and principal checks
//!
//! This module implements the fixed four-role permission model:
//! - Closed `Role` enum, matched exhaustively everywhere
//! - Static per-role permission profiles (modules + feature flags)
//! - The authenticated `Principal` with data scoping helpers
//! - Per-role cloud storage access profiles carried in session tokens

pub mod cloud;
mod matrix;
mod principal;

pub use matrix::{
    has_feature, has_feature_named, has_module_permission, list_modules, profile, FeatureFlags,
    PermissionProfile,
};
pub use principal::{OwnedRecord, Principal};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identity classification controlling module and feature access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Owner / master user
    Admin,
    /// Sales manager
    Manager,
    /// Finance team
    Accounts,
    /// Sales executive
    Regular,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::Accounts, Role::Regular];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Accounts => "accounts",
            Role::Regular => "regular",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "accounts" => Ok(Role::Accounts),
            "regular" => Ok(Role::Regular),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Named boolean capabilities attached to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    CashFlowVisibility,
    UserManagement,
    TeamActivityView,
    ExportData,
    EditSettings,
    ViewAllMetrics,
    DeleteRecords,
    SetTargets,
}

impl Feature {
    pub const ALL: [Feature; 8] = [
        Feature::CashFlowVisibility,
        Feature::UserManagement,
        Feature::TeamActivityView,
        Feature::ExportData,
        Feature::EditSettings,
        Feature::ViewAllMetrics,
        Feature::DeleteRecords,
        Feature::SetTargets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::CashFlowVisibility => "cashFlowVisibility",
            Feature::UserManagement => "userManagement",
            Feature::TeamActivityView => "teamActivityView",
            Feature::ExportData => "exportData",
            Feature::EditSettings => "editSettings",
            Feature::ViewAllMetrics => "viewAllMetrics",
            Feature::DeleteRecords => "deleteRecords",
            Feature::SetTargets => "setTargets",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Feature::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

/// Well-known application module identifiers
pub mod modules {
    pub const DASHBOARD: &str = "dashboard";
    pub const QUICK_CAPTURE: &str = "quick-capture";
    pub const RFQ: &str = "rfq";
    pub const COSTING: &str = "costing";
    pub const QUOTATIONS: &str = "quotations";
    pub const ORDERS: &str = "orders";
    pub const DELIVERY: &str = "delivery";
    pub const PAYMENTS: &str = "payments";
    pub const FOLLOW_UPS: &str = "follow-ups";
    pub const PIPELINE: &str = "pipeline";
    pub const CUSTOMER_INTELLIGENCE: &str = "customer-intelligence";
    pub const COMPETITION_INTELLIGENCE: &str = "competition-intelligence";
    pub const CUSTOMERS: &str = "customers";
    pub const SUPPLIERS: &str = "suppliers";
    pub const DATA_MIGRATION: &str = "data-migration";
    pub const PRODUCTIVITY: &str = "productivity";
    pub const COMMISSIONS: &str = "commissions";
    pub const CURRENCY: &str = "currency";
    pub const REPORTS: &str = "reports";
    pub const ADMIN: &str = "admin";
    pub const SECURITY: &str = "security";
    pub const SETTINGS: &str = "settings";
}
