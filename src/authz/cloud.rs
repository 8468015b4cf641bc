//! Cloud storage access profiles
//!
//! Maps each role to a graduated OneDrive permission level. The profile is
//! embedded in session tokens (`cloud_access` claim) so downstream proxies can
//! check it without another lookup.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Role;

pub const PROFILE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CloudPermission {
    Read,
    Write,
    Full,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CloudOperation {
    Read,
    Write,
    Delete,
    Share,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OneDriveProfile {
    pub enabled: bool,
    pub permissions: CloudPermission,
    pub folder_access: Vec<String>,
    pub file_types: Vec<String>,
    pub quota_gb: u32,
    pub sharing: bool,
    pub admin_controls: bool,
}

/// Token extension payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CloudAccessGrant {
    pub onedrive: OneDriveProfile,
    pub profile_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CloudDenied {
    #[error("Access denied to this folder")]
    Folder,
    #[error("File type not allowed for this role")]
    FileType,
    #[error("Write access not permitted")]
    Write,
    #[error("Delete access not permitted")]
    Delete,
    #[error("Sharing not permitted for this role")]
    Share,
}

struct StaticProfile {
    permissions: CloudPermission,
    folder_access: &'static [&'static str],
    file_types: &'static [&'static str],
    quota_gb: u32,
    sharing: bool,
    admin_controls: bool,
}

fn static_profile(role: Role) -> &'static StaticProfile {
    static ADMIN: StaticProfile = StaticProfile {
        permissions: CloudPermission::Admin,
        folder_access: &["/*"],
        file_types: &["*"],
        quota_gb: 1000,
        sharing: true,
        admin_controls: true,
    };
    static MANAGER: StaticProfile = StaticProfile {
        permissions: CloudPermission::Full,
        folder_access: &["/PH-Trading-Shared/*", "/Team-Files/*", "/Reports/*", "/Templates/*"],
        file_types: &[".xlsx", ".docx", ".pdf", ".png", ".jpg"],
        quota_gb: 100,
        sharing: true,
        admin_controls: false,
    };
    static ACCOUNTS: StaticProfile = StaticProfile {
        permissions: CloudPermission::Write,
        folder_access: &[
            "/PH-Trading-Shared/Finance/*",
            "/Reports/Financial/*",
            "/Templates/Invoices/*",
        ],
        file_types: &[".xlsx", ".pdf", ".csv"],
        quota_gb: 50,
        sharing: false,
        admin_controls: false,
    };
    static REGULAR: StaticProfile = StaticProfile {
        permissions: CloudPermission::Read,
        folder_access: &["/PH-Trading-Shared/Public/*", "/Templates/Sales/*"],
        file_types: &[".pdf", ".docx"],
        quota_gb: 10,
        sharing: false,
        admin_controls: false,
    };

    match role {
        Role::Admin => &ADMIN,
        Role::Manager => &MANAGER,
        Role::Accounts => &ACCOUNTS,
        Role::Regular => &REGULAR,
    }
}

pub fn onedrive_profile(role: Role) -> OneDriveProfile {
    let p = static_profile(role);
    OneDriveProfile {
        enabled: true,
        permissions: p.permissions,
        folder_access: p.folder_access.iter().map(|s| s.to_string()).collect(),
        file_types: p.file_types.iter().map(|s| s.to_string()).collect(),
        quota_gb: p.quota_gb,
        sharing: p.sharing,
        admin_controls: p.admin_controls,
    }
}

pub fn grant_for(role: Role) -> CloudAccessGrant {
    CloudAccessGrant {
        onedrive: onedrive_profile(role),
        profile_version: PROFILE_VERSION.to_string(),
    }
}

pub fn can_access_path(role: Role, path: &str) -> bool {
    static_profile(role).folder_access.iter().any(|allowed| {
        if *allowed == "/*" {
            return true;
        }
        match allowed.strip_suffix("/*") {
            Some(prefix) => path.starts_with(prefix),
            None => path == *allowed,
        }
    })
}

pub fn can_handle_file_type(role: Role, file_name: &str) -> bool {
    let types = static_profile(role).file_types;
    if types.contains(&"*") {
        return true;
    }
    match file_name.rfind('.') {
        Some(idx) => types.contains(&&file_name[idx..]),
        None => false,
    }
}

pub fn quota_gb(role: Role) -> u32 {
    static_profile(role).quota_gb
}

pub fn can_share(role: Role) -> bool {
    static_profile(role).sharing
}

/// Microsoft Graph scopes to request for the role
pub fn graph_scopes(role: Role) -> Vec<&'static str> {
    let mut scopes = vec!["User.Read", "offline_access"];
    match static_profile(role).permissions {
        CloudPermission::Admin => scopes.extend(["Files.ReadWrite.All", "Sites.FullControl.All"]),
        CloudPermission::Full => scopes.extend(["Files.ReadWrite", "Sites.ReadWrite.All"]),
        CloudPermission::Write => scopes.push("Files.ReadWrite"),
        CloudPermission::Read => scopes.push("Files.Read"),
    }
    scopes
}

pub fn validate_operation(
    role: Role,
    operation: CloudOperation,
    path: &str,
    file_name: Option<&str>,
) -> Result<(), CloudDenied> {
    let profile = static_profile(role);

    if !can_access_path(role, path) {
        return Err(CloudDenied::Folder);
    }

    if let Some(name) = file_name {
        if !can_handle_file_type(role, name) {
            return Err(CloudDenied::FileType);
        }
    }

    match operation {
        CloudOperation::Read => Ok(()),
        CloudOperation::Write if profile.permissions >= CloudPermission::Write => Ok(()),
        CloudOperation::Write => Err(CloudDenied::Write),
        CloudOperation::Delete if profile.permissions >= CloudPermission::Full => Ok(()),
        CloudOperation::Delete => Err(CloudDenied::Delete),
        CloudOperation::Share if profile.sharing => Ok(()),
        CloudOperation::Share => Err(CloudDenied::Share),
    }
}
