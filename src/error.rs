use std::io;

use thiserror::Error;
use zip::result::ZipError;

#[derive(Error, Debug)]
pub enum ArchiveFormatError {
    #[error("archive is not a zip container: {0}")]
    NotAnArchive(String),
    #[error("unreadable archive entry #{index}: {reason}")]
    UnreadableEntry { index: usize, reason: String },
    #[error("archive io: {0}")]
    Io(io::Error),
}

impl From<ZipError> for ArchiveFormatError {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(io) => Self::Io(io),
            other => Self::NotAnArchive(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("reading class container: {0}")]
    Io(#[from] io::Error),
    #[error("class container too short ({0} bytes)")]
    Truncated(usize),
    #[error("bad class container magic {0:02x?}")]
    BadMagic([u8; 8]),
    #[error("unsupported endian tag {0:#010x}")]
    UnsupportedEndian(u32),
    #[error("{what} at {offset:#x} runs past end of container")]
    OutOfBounds { what: &'static str, offset: u64 },
    #[error("{what} index {index} out of range (size {size})")]
    IndexOutOfRange {
        what: &'static str,
        index: u32,
        size: u32,
    },
    #[error("malformed string data at {0:#x}")]
    BadString(u32),
    #[error("not a class type descriptor: {0:?}")]
    BadDescriptor(String),
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("package {0} not found")]
    PackageNotFound(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Archive(#[from] ArchiveFormatError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("classification cancelled")]
    Cancelled,
}

impl ClassifyError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Host(HostError::PackageNotFound(_)) => "package-not-found",
            Self::Host(HostError::NotFound(_)) => "not-found",
            Self::Host(HostError::Io(_)) => "host-io",
            Self::Archive(_) => "archive-format",
            Self::Decode(_) => "decode",
            Self::Cancelled => "cancelled",
        }
    }
}
