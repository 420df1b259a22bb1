use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use zip::write::{FileOptions, ZipWriter};

use crate::archive::ArchiveBytes;
use crate::error::HostError;
use crate::host::{ComponentRecord, InstalledPackage, PackageHost};

mod dex_image;

pub use dex_image::build_dex;

pub fn write_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[derive(Default)]
pub struct FakePackage {
    pub record: Option<InstalledPackage>,
    pub components: Vec<String>,
    pub archive: Option<Vec<u8>>,
    pub icon: Option<Vec<u8>>,
}

/// In-memory host that counts how often each boundary call is made.
#[derive(Default)]
pub struct FakeHost {
    pub packages: HashMap<String, FakePackage>,
    pub default_icon: Option<Vec<u8>>,
    pub inventory_calls: AtomicUsize,
    pub icon_calls: AtomicUsize,
    pub archive_calls: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn with_archive(mut self, id: &str, archive: Vec<u8>) -> Self {
        self.packages.entry(id.to_string()).or_default().archive = Some(archive);
        self
    }

    pub fn with_components(mut self, id: &str, components: &[&str]) -> Self {
        self.packages.entry(id.to_string()).or_default().components =
            components.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_record(mut self, record: InstalledPackage) -> Self {
        let id = record.package_name.clone();
        self.packages.entry(id).or_default().record = Some(record);
        self
    }

    pub fn with_icon(mut self, id: &str, icon: &[u8]) -> Self {
        self.packages.entry(id.to_string()).or_default().icon = Some(icon.to_vec());
        self
    }
}

impl PackageHost for FakeHost {
    fn installed_packages(&self) -> Result<Vec<InstalledPackage>, HostError> {
        self.inventory_calls.fetch_add(1, Ordering::SeqCst);
        let mut records: Vec<_> = self
            .packages
            .values()
            .filter_map(|p| p.record.clone())
            .collect();
        records.sort_by(|a, b| a.package_name.cmp(&b.package_name));
        Ok(records)
    }

    fn installed_components(&self, id: &str) -> Result<Vec<ComponentRecord>, HostError> {
        let pkg = self
            .packages
            .get(id)
            .ok_or_else(|| HostError::PackageNotFound(id.to_string()))?;
        Ok(pkg
            .components
            .iter()
            .map(|c| ComponentRecord {
                owner: id.to_string(),
                class_name: c.clone(),
            })
            .collect())
    }

    fn archive_bytes(&self, id: &str) -> Result<ArchiveBytes, HostError> {
        self.archive_calls.lock().unwrap().push(id.to_string());
        self.packages
            .get(id)
            .and_then(|p| p.archive.clone())
            .map(ArchiveBytes::from)
            .ok_or_else(|| HostError::NotFound(format!("archive of {id}")))
    }

    fn package_icon(&self, id: &str) -> Result<Option<Vec<u8>>, HostError> {
        self.icon_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.packages.get(id).and_then(|p| p.icon.clone()))
    }

    fn default_icon(&self) -> Result<Option<Vec<u8>>, HostError> {
        Ok(self.default_icon.clone())
    }
}

pub fn installed(id: &str, permissions: &[&str]) -> InstalledPackage {
    InstalledPackage {
        package_name: id.to_string(),
        label: id.rsplit('.').next().unwrap_or(id).to_string(),
        is_system: false,
        first_install_time: 1_700_000_000_000,
        requested_permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}
