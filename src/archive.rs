//! Installed-archive access.
//!
//! `ArchiveBytes` holds the raw bytes of an `.apk` (memory-mapped when it comes
//! from disk). `ArchiveScanner` walks the zip central directory in order and
//! hands out one entry at a time with a decompressing reader.

use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::ops::Deref;
use std::path::Path;
use zip::ZipArchive;
use zip::read::ZipFile;

use crate::error::ArchiveFormatError;

pub const CLASS_CONTAINER_PREFIX: &str = "classes";
pub const CLASS_CONTAINER_SUFFIX: &str = ".dex";

/// `classes.dex`, `classes2.dex`, ... Case-sensitive.
pub fn is_class_container(entry_name: &str) -> bool {
    entry_name.starts_with(CLASS_CONTAINER_PREFIX) && entry_name.ends_with(CLASS_CONTAINER_SUFFIX)
}

#[derive(Debug)]
pub enum ArchiveBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl ArchiveBytes {
    pub fn map(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open archive: {}", path.display()))?;
        // SAFETY: The file is opened read-only and the map owns its own handle to
        // the pages; installed archives are not rewritten while a scan runs.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to mmap archive: {}", path.display()))?;
        Ok(Self::Mapped(mmap))
    }
}

impl Deref for ArchiveBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(m) => &m[..],
            Self::Owned(v) => v.as_slice(),
        }
    }
}

impl From<Vec<u8>> for ArchiveBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Owned(bytes)
    }
}

pub struct ArchiveEntry<'s> {
    name: String,
    uncompressed_size: u64,
    stream: ZipFile<'s>,
}

impl ArchiveEntry<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }
}

impl Read for ArchiveEntry<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

/// Single forward pass over an archive's entries. Start a new scanner to
/// iterate again.
pub struct ArchiveScanner<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    next: usize,
}

impl<'a> ArchiveScanner<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self, ArchiveFormatError> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        Ok(Self { archive, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// First entry in central-directory order whose name starts with
    /// `prefix`. Entries are not decompressed.
    pub fn find_name_with_prefix(&mut self, prefix: &str) -> Option<String> {
        (0..self.archive.len()).find_map(|index| {
            let entry = self.archive.by_index_raw(index).ok()?;
            entry.name().starts_with(prefix).then(|| entry.name().to_string())
        })
    }

    pub fn next_entry(&mut self) -> Option<Result<ArchiveEntry<'_>, ArchiveFormatError>> {
        if self.next >= self.archive.len() {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let entry = match self.archive.by_index(index) {
            Ok(entry) => entry,
            Err(err) => {
                return Some(Err(ArchiveFormatError::UnreadableEntry {
                    index,
                    reason: err.to_string(),
                }));
            }
        };
        log::trace!("archive entry #{index}: {} ({} bytes)", entry.name(), entry.size());
        Some(Ok(ArchiveEntry {
            name: entry.name().to_string(),
            uncompressed_size: entry.size(),
            stream: entry,
        }))
    }
}
