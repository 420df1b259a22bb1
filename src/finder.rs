//! Query surface handed to callers such as a UI layer.

use anyhow::Result;
use std::sync::Arc;

use crate::classify::{Classifier, ClassifierConfig};
use crate::dex::{ClassDecoder, DexDecoder};
use crate::host::PackageHost;
use crate::inventory::{InventoryCache, PackageRecord};

pub struct VendorFinder<H, D = DexDecoder> {
    inventory: InventoryCache<H>,
    classifier: Classifier<H, D>,
}

impl<H: PackageHost + 'static> VendorFinder<H, DexDecoder> {
    pub fn new(host: H, host_identifier: Option<String>, config: ClassifierConfig) -> Result<Self> {
        let host = Arc::new(host);
        Ok(Self {
            inventory: InventoryCache::new(Arc::clone(&host), host_identifier),
            classifier: Classifier::new(host, config)?,
        })
    }
}

impl<H, D> VendorFinder<H, D>
where
    H: PackageHost + 'static,
    D: ClassDecoder + 'static,
{
    pub fn classifier(&self) -> &Classifier<H, D> {
        &self.classifier
    }

    pub fn inventory(&self) -> &InventoryCache<H> {
        &self.inventory
    }

    pub fn list_installed_packages(&self) -> Result<Arc<[PackageRecord]>> {
        self.inventory.list_installed_packages()
    }

    pub fn packages_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.list_installed_packages()?)?)
    }

    pub fn is_flagged(&self, id: &str) -> bool {
        self.classifier.is_flagged(id)
    }

    pub fn list_flagged<S: AsRef<str> + Sync>(&self, ids: &[S]) -> Vec<String> {
        self.classifier.list_flagged(ids)
    }

    /// Installed identifiers that classify as flagged, in inventory order.
    pub fn flagged_installed_packages(&self) -> Result<Vec<String>> {
        let ids = self.inventory.package_identifiers()?;
        let flagged = self.classifier.list_flagged(&ids);
        log::info!("{} of {} installed packages flagged", flagged.len(), ids.len());
        Ok(flagged)
    }

    pub fn flagged_installed_packages_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.flagged_installed_packages()?)?)
    }

    pub fn package_icon(&self, id: &str) -> Option<String> {
        self.inventory.package_icon(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeHost, build_dex, installed, write_archive};

    #[test]
    fn flagged_installed_packages_uses_inventory_order() -> Result<()> {
        let flagged = write_archive(&[("classes.dex", &build_dex(&["Lcom/bytedance/sdk/Init;"]))]);
        let clean = write_archive(&[("classes.dex", &build_dex(&["Lorg/example/Main;"]))]);
        let host = FakeHost::default()
            .with_record(installed("org.a", &[]))
            .with_archive("org.a", clean)
            .with_record(installed("org.b", &[]))
            .with_archive("org.b", flagged)
            .with_record(installed("com.xiaomi.market", &[]));
        let finder = VendorFinder::new(
            host,
            None,
            ClassifierConfig {
                max_concurrent: 2,
                ..ClassifierConfig::default()
            },
        )?;

        assert_eq!(
            finder.flagged_installed_packages()?,
            vec!["com.xiaomi.market", "org.b"]
        );
        assert_eq!(
            finder.flagged_installed_packages_json()?,
            r#"["com.xiaomi.market","org.b"]"#
        );
        Ok(())
    }

    #[test]
    fn packages_json_is_an_ordered_record_list() -> Result<()> {
        let host = FakeHost::default().with_record(installed("org.example.app", &[]));
        let finder = VendorFinder::new(host, None, ClassifierConfig::default())?;
        let parsed: serde_json::Value = serde_json::from_str(&finder.packages_json()?)?;
        assert_eq!(parsed[0]["packageName"], "org.example.app");
        assert_eq!(parsed[0]["isSystem"], false);
        Ok(())
    }
}
