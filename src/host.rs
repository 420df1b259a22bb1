//! Boundary to the platform that owns the installed packages.

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveBytes;
use crate::error::HostError;

pub const INTERNET_PERMISSION: &str = "android.permission.INTERNET";

/// Reserved identifier of the platform itself.
pub const PLATFORM_PACKAGE: &str = "android";

/// One installed package as the platform reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPackage {
    pub package_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub first_install_time: i64,
    #[serde(default)]
    pub requested_permissions: Vec<String>,
}

impl InstalledPackage {
    pub fn requests_permission(&self, permission: &str) -> bool {
        self.requested_permissions.iter().any(|p| p == permission)
    }
}

/// A service, activity, receiver or provider declared by a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    pub owner: String,
    pub class_name: String,
}

pub trait PackageHost: Send + Sync {
    fn installed_packages(&self) -> Result<Vec<InstalledPackage>, HostError>;

    /// Services, activities, receivers and providers together.
    fn installed_components(&self, id: &str) -> Result<Vec<ComponentRecord>, HostError>;

    fn archive_bytes(&self, id: &str) -> Result<ArchiveBytes, HostError>;

    fn package_icon(&self, _id: &str) -> Result<Option<Vec<u8>>, HostError> {
        Ok(None)
    }

    fn default_icon(&self) -> Result<Option<Vec<u8>>, HostError> {
        Ok(None)
    }
}
