//! # vendor-finder
//!
//! Classifies installed Android packages as associated with a fixed set of
//! vendor ecosystems, from package metadata first and from the class names
//! compiled into the installed archive when metadata is inconclusive.
//!
//! ## Architecture
//!
//! - **patterns**: Skip list, flagged vendor prefixes and the compiled pattern
//! - **archive**: Zip entry enumeration over installed `.apk` bytes
//! - **dex**: DEX class-definition reader producing dotted class names
//! - **classify**: Ordered, fail-closed per-package classification
//! - **inventory**: Build-once installed package list and icon cache
//! - **host**: Boundary traits and records supplied by the platform
//! - **manifest**: File-backed host (JSON inventory or a directory of `.apk`s)
//! - **scan**: `.apk` discovery on disk
//! - **finder**: Query surface combining inventory and classification

pub mod archive;
pub mod classify;
pub mod cli;
pub mod config;
pub mod dex;
pub mod error;
pub mod finder;
pub mod host;
pub mod inventory;
pub mod manifest;
pub mod patterns;
pub mod scan;

#[cfg(test)]
mod testing;
