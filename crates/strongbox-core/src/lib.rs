//! strongbox-core - Shared store layout and configuration for strongbox
//!
//! Nothing in here touches key material or ciphertext. This crate only
//! answers two questions for the rest of the workspace: where does the
//! store live on disk, and how was the process configured at startup.

pub mod config;
pub mod paths;

pub use config::{Config, PassphraseMode};
pub use paths::StorePaths;
