//! Error taxonomy for store operations
//!
//! Every error is terminal for the current command: the binary prints the
//! one-line message and exits 1. There is no retry inside the engine.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Missing openssl or signify secret, run strongbox init")]
    MissingKeys,

    #[error("keyring already exists in {0}")]
    AlreadyInitialized(PathBuf),

    #[error("invalid entry name: {0}")]
    InvalidName(String),

    #[error("incorrect passphrase")]
    IncorrectPassphrase,

    #[error("no signature for {0}")]
    MissingSignature(String),

    #[error("signature verification failed for {0}")]
    VerificationFailed(String),

    #[error("invalid choice: {0}")]
    InvalidOption(String),

    #[error("no entry matching {0}")]
    NotFound(String),

    #[error("invalid pattern: {0}")]
    Pattern(String),

    #[error("no staged plaintext for {0}")]
    Staging(String),

    #[error("{failed} of {checked} entries failed verification")]
    VerifySummary { failed: usize, checked: usize },

    #[error("{0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
