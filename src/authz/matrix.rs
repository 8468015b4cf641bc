use serde::Serialize;
use utoipa::ToSchema;

use super::modules::*;
use super::{Feature, Role};

/// Static module/feature access rules attached to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionProfile {
    pub modules: &'static [&'static str],
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub cash_flow_visibility: bool,
    pub user_management: bool,
    pub team_activity_view: bool,
    pub export_data: bool,
    pub edit_settings: bool,
    pub view_all_metrics: bool,
    pub delete_records: bool,
    pub set_targets: bool,
}

impl FeatureFlags {
    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::CashFlowVisibility => self.cash_flow_visibility,
            Feature::UserManagement => self.user_management,
            Feature::TeamActivityView => self.team_activity_view,
            Feature::ExportData => self.export_data,
            Feature::EditSettings => self.edit_settings,
            Feature::ViewAllMetrics => self.view_all_metrics,
            Feature::DeleteRecords => self.delete_records,
            Feature::SetTargets => self.set_targets,
        }
    }
}

static ADMIN_PROFILE: PermissionProfile = PermissionProfile {
    modules: &[
        DASHBOARD, QUICK_CAPTURE, RFQ, COSTING, QUOTATIONS,
        ORDERS, DELIVERY, PAYMENTS, FOLLOW_UPS, PIPELINE,
        CUSTOMER_INTELLIGENCE, COMPETITION_INTELLIGENCE, CUSTOMERS,
        SUPPLIERS, DATA_MIGRATION, PRODUCTIVITY, COMMISSIONS,
        CURRENCY, REPORTS, ADMIN, SECURITY, SETTINGS,
    ],
    features: FeatureFlags {
        cash_flow_visibility: true,
        user_management: true,
        team_activity_view: true,
        export_data: true,
        edit_settings: true,
        view_all_metrics: true,
        delete_records: true,
        set_targets: true,
    },
};

// No cash flow, no admin/security/settings, no finance modules.
static MANAGER_PROFILE: PermissionProfile = PermissionProfile {
    modules: &[
        DASHBOARD, QUICK_CAPTURE, RFQ, COSTING, QUOTATIONS,
        ORDERS, DELIVERY, FOLLOW_UPS, PIPELINE,
        CUSTOMER_INTELLIGENCE, COMPETITION_INTELLIGENCE, CUSTOMERS,
        SUPPLIERS, PRODUCTIVITY, REPORTS,
    ],
    features: FeatureFlags {
        cash_flow_visibility: false,
        user_management: false,
        team_activity_view: true,
        export_data: true,
        edit_settings: false,
        view_all_metrics: true,
        delete_records: true,
        set_targets: true,
    },
};

static ACCOUNTS_PROFILE: PermissionProfile = PermissionProfile {
    modules: &[
        DASHBOARD, ORDERS, DELIVERY, PAYMENTS, CUSTOMERS,
        SUPPLIERS, COMMISSIONS, CURRENCY, REPORTS,
    ],
    features: FeatureFlags {
        cash_flow_visibility: true,
        user_management: false,
        team_activity_view: false,
        export_data: true,
        edit_settings: false,
        view_all_metrics: false,
        delete_records: false,
        set_targets: false,
    },
};

static REGULAR_PROFILE: PermissionProfile = PermissionProfile {
    modules: &[
        DASHBOARD, QUICK_CAPTURE, RFQ, QUOTATIONS,
        ORDERS, FOLLOW_UPS, CUSTOMERS, PRODUCTIVITY,
    ],
    features: FeatureFlags {
        cash_flow_visibility: false,
        user_management: false,
        team_activity_view: false,
        export_data: false,
        edit_settings: false,
        view_all_metrics: false,
        delete_records: false,
        set_targets: false,
    },
};

pub fn profile(role: Role) -> &'static PermissionProfile {
    match role {
        Role::Admin => &ADMIN_PROFILE,
        Role::Manager => &MANAGER_PROFILE,
        Role::Accounts => &ACCOUNTS_PROFILE,
        Role::Regular => &REGULAR_PROFILE,
    }
}

pub fn has_module_permission(role: Role, module: &str) -> bool {
    profile(role).modules.contains(&module)
}

pub fn has_feature(role: Role, feature: Feature) -> bool {
    profile(role).features.get(feature)
}

/// Lookup by wire name; names that are not a known feature are denied.
pub fn has_feature_named(role: Role, name: &str) -> bool {
    Feature::from_name(name)
        .map(|feature| has_feature(role, feature))
        .unwrap_or(false)
}

/// Modules in menu order.
pub fn list_modules(role: Role) -> &'static [&'static str] {
    profile(role).modules
}
