//! Process-lifetime memo of the installed-package list and package icons.
//!
//! The package list is built once on first use; concurrent first callers wait
//! for that single build. A failed build is not cached. There is no
//! invalidation, a new process is needed to see installs or removals.

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::host::{INTERNET_PERMISSION, InstalledPackage, PLATFORM_PACKAGE, PackageHost};

/// Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub package_name: String,
    pub label: String,
    pub is_system: bool,
    pub first_install_time: i64,
}

impl From<InstalledPackage> for PackageRecord {
    fn from(p: InstalledPackage) -> Self {
        Self {
            package_name: p.package_name,
            label: p.label,
            is_system: p.is_system,
            first_install_time: p.first_install_time,
        }
    }
}

pub struct InventoryCache<H> {
    host: Arc<H>,
    host_identifier: Option<String>,
    packages: OnceCell<Arc<[PackageRecord]>>,
    icons: Mutex<HashMap<String, String>>,
    default_icon: OnceCell<Option<String>>,
}

impl<H: PackageHost> InventoryCache<H> {
    pub fn new(host: Arc<H>, host_identifier: Option<String>) -> Self {
        Self {
            host,
            host_identifier,
            packages: OnceCell::new(),
            icons: Mutex::new(HashMap::new()),
            default_icon: OnceCell::new(),
        }
    }

    pub fn list_installed_packages(&self) -> Result<Arc<[PackageRecord]>> {
        let packages = self.packages.get_or_try_init(|| {
            let installed = self
                .host
                .installed_packages()
                .context("Failed to enumerate installed packages")?;
            let total = installed.len();
            let kept: Vec<PackageRecord> = installed
                .into_iter()
                .filter(|p| self.include(p))
                .map(PackageRecord::from)
                .collect();
            log::debug!("inventory built: {} of {total} packages kept", kept.len());
            Ok::<_, anyhow::Error>(kept.into())
        })?;
        Ok(Arc::clone(packages))
    }

    pub fn package_identifiers(&self) -> Result<Vec<String>> {
        Ok(self
            .list_installed_packages()?
            .iter()
            .map(|p| p.package_name.clone())
            .collect())
    }

    fn include(&self, p: &InstalledPackage) -> bool {
        let is_host = self
            .host_identifier
            .as_deref()
            .is_some_and(|host| host == p.package_name);
        !is_host || p.requests_permission(INTERNET_PERMISSION) || p.package_name == PLATFORM_PACKAGE
    }

    /// Base64 icon for `id`, or the default icon when the package has none.
    /// Only successful per-package lookups are memoised.
    pub fn package_icon(&self, id: &str) -> Option<String> {
        if let Some(hit) = self.lock_icons().get(id) {
            return Some(hit.clone());
        }

        match self.host.package_icon(id) {
            Ok(Some(bytes)) => {
                let encoded = STANDARD.encode(bytes);
                self.lock_icons().insert(id.to_string(), encoded.clone());
                return Some(encoded);
            }
            Ok(None) => {}
            Err(err) => log::debug!("{id}: icon lookup failed: {err}"),
        }
        self.default_icon()
    }

    pub fn default_icon(&self) -> Option<String> {
        self.default_icon
            .get_or_init(|| match self.host.default_icon() {
                Ok(icon) => icon.map(|bytes| STANDARD.encode(bytes)),
                Err(err) => {
                    log::debug!("default icon lookup failed: {err}");
                    None
                }
            })
            .clone()
    }

    fn lock_icons(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.icons.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
