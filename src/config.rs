use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::classify::ClassifierConfig;
use crate::cli::Cli;

pub const MANIFEST_ENV: &str = "VENDOR_FINDER_MANIFEST";
pub const APK_DIR_ENV: &str = "VENDOR_FINDER_APK_DIR";
pub const HOST_ID_ENV: &str = "VENDOR_FINDER_HOST_ID";
pub const TIMEOUT_ENV: &str = "VENDOR_FINDER_TIMEOUT_MS";
pub const JOBS_ENV: &str = "VENDOR_FINDER_JOBS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventorySource {
    Manifest(PathBuf),
    ApkDir(PathBuf),
}

pub fn resolve_inventory_source(cli: &Cli) -> Result<InventorySource> {
    if let Some(p) = cli.manifest.clone() {
        return Ok(InventorySource::Manifest(p));
    }
    if let Some(p) = cli.apk_dir.clone() {
        return Ok(InventorySource::ApkDir(p));
    }
    if let Ok(p) = env::var(MANIFEST_ENV) {
        return Ok(InventorySource::Manifest(PathBuf::from(p)));
    }
    if let Ok(p) = env::var(APK_DIR_ENV) {
        return Ok(InventorySource::ApkDir(PathBuf::from(p)));
    }
    Ok(InventorySource::Manifest(
        vendor_finder_home()?.join("inventory.json"),
    ))
}

pub fn resolve_host_identifier(cli: &Cli) -> Option<String> {
    cli.host_id
        .clone()
        .or_else(|| env::var(HOST_ID_ENV).ok())
        .filter(|id| !id.is_empty())
}

pub fn resolve_classifier_config(cli: &Cli) -> Result<ClassifierConfig> {
    let mut config = ClassifierConfig::default();

    let timeout_ms = match cli.timeout_ms {
        Some(ms) => Some(ms),
        None => env_number::<u64>(TIMEOUT_ENV)?,
    };
    if let Some(ms) = timeout_ms {
        config.package_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }

    let jobs = match cli.jobs {
        Some(n) => Some(n),
        None => env_number::<usize>(JOBS_ENV)?,
    };
    if let Some(n) = jobs {
        config.max_concurrent = n.max(1);
    }

    Ok(config)
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid {name}: {raw:?}")),
        Err(_) => Ok(None),
    }
}

fn vendor_finder_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::config_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("vendor-finder"))
}
