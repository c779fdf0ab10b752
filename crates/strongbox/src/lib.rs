//! strongbox - Local encrypted credential store
//!
//! "One secret, one file, one signature."
//!
//! Each secret is an individually encrypted, individually signed file under
//! a managed directory tree. The cryptography itself is delegated to
//! external providers (an openssl-style RSA tool and a signify-style
//! signer); strongbox owns entry naming, durability of the on-disk store,
//! pattern resolution, and the all-or-nothing key rotation that re-seals
//! every entry under fresh keys without ever exposing a half-migrated
//! store.

pub mod crypto;
pub mod engine;
pub mod error;
pub mod keyring;
pub mod matcher;
pub mod store;

pub use crypto::{CryptoBackend, OpensslSignify};
pub use engine::CommandEngine;
pub use error::StoreError;
pub use keyring::Keyring;
pub use matcher::{Resolution, SearchMatcher};
pub use store::{EntryStore, StagingArea};
