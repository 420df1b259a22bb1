//! Per-package vendor classification.
//!
//! Checks run cheapest first and the first conclusive one wins:
//!
//! 1. skip list
//! 2. package identifier against the flagged pattern
//! 3. declared component class names
//! 4. the installed archive: neutral-library marker, oversized class
//!    containers, then every decoded class name
//!
//! Every failure along the way resolves to "not flagged".

use anyhow::Result;
use rayon::ThreadPool;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use crate::archive::{ArchiveScanner, is_class_container};
use crate::dex::{ClassDecoder, DexDecoder};
use crate::error::ClassifyError;
use crate::host::PackageHost;
use crate::patterns::{NEUTRAL_LIBRARY_MARKER, VendorPatterns};

pub const OVERSIZED_CLASS_CONTAINER_BYTES: u64 = 15_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum Verdict {
    Skipped,
    IdentifierMatch,
    ComponentMatch { class_name: String },
    NeutralLibrary { entry: String },
    OversizedClassContainer { entry: String, size: u64 },
    ClassMatch { entry: String, class_name: String },
    Clean,
}

impl Verdict {
    pub fn is_flagged(&self) -> bool {
        matches!(
            self,
            Self::IdentifierMatch
                | Self::ComponentMatch { .. }
                | Self::OversizedClassContainer { .. }
                | Self::ClassMatch { .. }
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifierConfig {
    pub oversized_class_container_bytes: u64,
    pub package_timeout: Option<Duration>,
    pub max_concurrent: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            oversized_class_container_bytes: OVERSIZED_CLASS_CONTAINER_BYTES,
            package_timeout: Some(Duration::from_secs(30)),
            max_concurrent: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Cooperative stop flag for one query, checked between archive entries.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), ClassifyError> {
        if self.is_cancelled() {
            return Err(ClassifyError::Cancelled);
        }
        Ok(())
    }
}

/// Archive-only part of classification; needs no host, so it also runs on a
/// bare `.apk`.
pub struct ArchiveInspector<D = DexDecoder> {
    decoder: Arc<D>,
    patterns: Arc<VendorPatterns>,
    oversized_class_container_bytes: u64,
}

impl<D> Clone for ArchiveInspector<D> {
    fn clone(&self) -> Self {
        Self {
            decoder: Arc::clone(&self.decoder),
            patterns: Arc::clone(&self.patterns),
            oversized_class_container_bytes: self.oversized_class_container_bytes,
        }
    }
}

impl<D: ClassDecoder> ArchiveInspector<D> {
    pub fn new(decoder: D, oversized_class_container_bytes: u64) -> Self {
        Self {
            decoder: Arc::new(decoder),
            patterns: Arc::new(VendorPatterns::builtin().clone()),
            oversized_class_container_bytes,
        }
    }

    pub fn with_patterns(mut self, patterns: Arc<VendorPatterns>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn scan(&self, bytes: &[u8], cancel: &Cancellation) -> Result<Verdict, ClassifyError> {
        let mut scanner = ArchiveScanner::open(bytes)?;
        if let Some(entry) = scanner.find_name_with_prefix(NEUTRAL_LIBRARY_MARKER) {
            return Ok(Verdict::NeutralLibrary { entry });
        }

        while let Some(entry) = scanner.next_entry() {
            cancel.check()?;
            let mut entry = entry?;
            if !is_class_container(entry.name()) {
                continue;
            }

            let size = entry.uncompressed_size();
            if size > self.oversized_class_container_bytes {
                return Ok(Verdict::OversizedClassContainer {
                    entry: entry.name().to_string(),
                    size,
                });
            }

            // The first undecodable container ends the whole scan.
            let classes = self.decoder.decode(&mut entry, size)?;
            if let Some(class_name) = classes
                .into_iter()
                .find(|c| self.patterns.is_flagged_name(c))
            {
                return Ok(Verdict::ClassMatch {
                    entry: entry.name().to_string(),
                    class_name,
                });
            }
        }
        Ok(Verdict::Clean)
    }
}

pub struct Classifier<H, D = DexDecoder> {
    host: Arc<H>,
    inspector: ArchiveInspector<D>,
    pool: Arc<ThreadPool>,
    config: ClassifierConfig,
}

impl<H, D> Clone for Classifier<H, D> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            inspector: self.inspector.clone(),
            pool: Arc::clone(&self.pool),
            config: self.config,
        }
    }
}

impl<H: PackageHost + 'static> Classifier<H, DexDecoder> {
    pub fn new(host: Arc<H>, config: ClassifierConfig) -> Result<Self> {
        Self::with_decoder(host, DexDecoder, config)
    }
}

impl<H, D> Classifier<H, D>
where
    H: PackageHost + 'static,
    D: ClassDecoder + 'static,
{
    pub fn with_decoder(host: Arc<H>, decoder: D, config: ClassifierConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrent.max(1))
            .thread_name(|i| format!("vendor-finder-{i}"))
            .build()?;
        Ok(Self {
            host,
            inspector: ArchiveInspector::new(decoder, config.oversized_class_container_bytes),
            pool: Arc::new(pool),
            config,
        })
    }

    pub fn with_patterns(mut self, patterns: VendorPatterns) -> Self {
        self.inspector = self.inspector.with_patterns(Arc::new(patterns));
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn inspector(&self) -> &ArchiveInspector<D> {
        &self.inspector
    }

    /// Never fails: errors and timeouts classify as not flagged.
    pub fn is_flagged(&self, id: &str) -> bool {
        match self.config.package_timeout {
            Some(timeout) => self.is_flagged_within(id, timeout),
            None => collapse(id, self.classify(id, &Cancellation::new())),
        }
    }

    /// Runs the query on its own thread and gives up after `timeout`. The
    /// abandoned query is cancelled at its next entry boundary.
    pub fn is_flagged_within(&self, id: &str, timeout: Duration) -> bool {
        let (tx, rx) = mpsc::channel();
        let cancel = Cancellation::new();
        let worker = self.clone();
        let worker_cancel = cancel.clone();
        let owned_id = id.to_string();

        let spawned = std::thread::Builder::new()
            .name("vendor-finder-classify".to_string())
            .spawn(move || {
                let _ = tx.send(worker.classify(&owned_id, &worker_cancel));
            });
        if let Err(err) = spawned {
            log::warn!("{id}: cannot spawn classifier thread ({err}), classifying inline");
            return collapse(id, self.classify(id, &cancel));
        }

        match rx.recv_timeout(timeout) {
            Ok(result) => collapse(id, result),
            Err(_) => {
                cancel.cancel();
                log::warn!("{id}: not flagged, classification timed out after {timeout:?}");
                false
            }
        }
    }

    /// Flagged identifiers from `ids`, in input order.
    pub fn list_flagged<S>(&self, ids: &[S]) -> Vec<String>
    where
        S: AsRef<str> + Sync,
    {
        self.pool.install(|| {
            ids.par_iter()
                .filter(|id| self.is_flagged(id.as_ref()))
                .map(|id| id.as_ref().to_string())
                .collect()
        })
    }

    pub fn classify(&self, id: &str, cancel: &Cancellation) -> Result<Verdict, ClassifyError> {
        let patterns = &self.inspector.patterns;
        if patterns.is_skipped(id) {
            return Ok(Verdict::Skipped);
        }
        if patterns.is_flagged_name(id) {
            return Ok(Verdict::IdentifierMatch);
        }

        let components = self.host.installed_components(id)?;
        if let Some(component) = components
            .into_iter()
            .find(|c| patterns.is_flagged_name(&c.class_name))
        {
            return Ok(Verdict::ComponentMatch {
                class_name: component.class_name,
            });
        }

        cancel.check()?;
        let bytes = self.host.archive_bytes(id)?;
        self.inspector.scan(&bytes, cancel)
    }
}

fn collapse(id: &str, result: Result<Verdict, ClassifyError>) -> bool {
    match result {
        Ok(verdict) => {
            log::debug!("{id}: {verdict:?}");
            verdict.is_flagged()
        }
        Err(err @ ClassifyError::Archive(_)) => {
            log::warn!("{id}: not flagged, unreadable archive: {err}");
            false
        }
        Err(err) => {
            log::debug!("{id}: not flagged, {} error: {err}", err.kind());
            false
        }
    }
}
