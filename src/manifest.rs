//! File-backed `PackageHost`.
//!
//! Reads the inventory from a JSON manifest, or synthesises one from a
//! directory of `.apk` files. Relative archive and icon paths resolve against
//! the manifest's directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::archive::ArchiveBytes;
use crate::error::HostError;
use crate::host::{ComponentRecord, InstalledPackage, PackageHost};
use crate::scan::{archive_identifier, scan_archives};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestFile {
    packages: Vec<ManifestPackage>,
    default_icon: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestPackage {
    #[serde(flatten)]
    installed: InstalledPackage,
    #[serde(default)]
    services: Vec<String>,
    #[serde(default)]
    activities: Vec<String>,
    #[serde(default)]
    receivers: Vec<String>,
    #[serde(default)]
    providers: Vec<String>,
    archive: Option<PathBuf>,
    icon: Option<PathBuf>,
}

impl ManifestPackage {
    fn components(&self) -> impl Iterator<Item = &String> {
        self.services
            .iter()
            .chain(&self.activities)
            .chain(&self.receivers)
            .chain(&self.providers)
    }
}

#[derive(Debug)]
pub struct ManifestHost {
    order: Vec<String>,
    packages: HashMap<String, ManifestPackage>,
    default_icon: Option<PathBuf>,
}

impl ManifestHost {
    pub fn load(manifest_path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(manifest_path)
            .with_context(|| format!("Failed to read manifest: {}", manifest_path.display()))?;
        let file: ManifestFile = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse manifest: {}", manifest_path.display()))?;
        let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let host = Self::from_packages(base, file.packages)?;
        Ok(match file.default_icon {
            Some(icon) => host.with_default_icon(base.join(icon)),
            None => host,
        })
    }

    /// One package per `.apk` below `dir`, named after the file stem.
    pub fn from_apk_dir(dir: &Path) -> Result<Self> {
        let mut packages = Vec::new();
        for path in scan_archives(dir)? {
            let Some(id) = archive_identifier(&path) else {
                log::warn!("skipping archive without a usable name: {}", path.display());
                continue;
            };
            packages.push(ManifestPackage {
                installed: InstalledPackage {
                    package_name: id.clone(),
                    label: id,
                    is_system: false,
                    first_install_time: modified_millis(&path),
                    requested_permissions: Vec::new(),
                },
                services: Vec::new(),
                activities: Vec::new(),
                receivers: Vec::new(),
                providers: Vec::new(),
                archive: Some(path),
                icon: None,
            });
        }
        // scan_archives already yields paths rooted at `dir`
        Self::from_packages(Path::new(""), packages)
    }

    fn from_packages(base: &Path, packages: Vec<ManifestPackage>) -> Result<Self> {
        let mut order = Vec::with_capacity(packages.len());
        let mut by_id = HashMap::with_capacity(packages.len());
        for mut pkg in packages {
            let id = pkg.installed.package_name.clone();
            if id.is_empty() || id.contains(['/', '\\']) {
                anyhow::bail!("Invalid package identifier in manifest: {id:?}");
            }
            pkg.archive = pkg.archive.map(|p| base.join(p));
            pkg.icon = pkg.icon.map(|p| base.join(p));
            if by_id.insert(id.clone(), pkg).is_some() {
                anyhow::bail!("Duplicate package identifier in manifest: {id}");
            }
            order.push(id);
        }
        Ok(Self {
            order,
            packages: by_id,
            default_icon: None,
        })
    }

    pub fn with_default_icon(mut self, path: PathBuf) -> Self {
        self.default_icon = Some(path);
        self
    }

    fn package(&self, id: &str) -> Result<&ManifestPackage, HostError> {
        self.packages
            .get(id)
            .ok_or_else(|| HostError::PackageNotFound(id.to_string()))
    }
}

impl PackageHost for ManifestHost {
    fn installed_packages(&self) -> Result<Vec<InstalledPackage>, HostError> {
        Ok(self
            .order
            .iter()
            .filter_map(|id| self.packages.get(id))
            .map(|p| p.installed.clone())
            .collect())
    }

    fn installed_components(&self, id: &str) -> Result<Vec<ComponentRecord>, HostError> {
        Ok(self
            .package(id)?
            .components()
            .map(|class_name| ComponentRecord {
                owner: id.to_string(),
                class_name: qualify_component(id, class_name),
            })
            .collect())
    }

    fn archive_bytes(&self, id: &str) -> Result<ArchiveBytes, HostError> {
        let path = self
            .package(id)?
            .archive
            .as_deref()
            .ok_or_else(|| HostError::NotFound(format!("archive of {id}")))?;
        if !path.is_file() {
            return Err(HostError::NotFound(path.display().to_string()));
        }
        ArchiveBytes::map(path).map_err(|err| HostError::Io(std::io::Error::other(format!("{err:#}"))))
    }

    fn package_icon(&self, id: &str) -> Result<Option<Vec<u8>>, HostError> {
        match self.package(id)?.icon.as_deref() {
            Some(path) => read_optional(path),
            None => Ok(None),
        }
    }

    fn default_icon(&self) -> Result<Option<Vec<u8>>, HostError> {
        match self.default_icon.as_deref() {
            Some(path) => read_optional(path),
            None => Ok(None),
        }
    }
}

/// Manifest shorthand `.Main` expands to `<package>.Main`.
fn qualify_component(owner: &str, class_name: &str) -> String {
    if class_name.starts_with('.') {
        format!("{owner}{class_name}")
    } else {
        class_name.to_string()
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, HostError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(HostError::Io(err)),
    }
}

fn modified_millis(path: &Path) -> i64 {
    path.metadata()
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
