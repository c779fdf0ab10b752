//! Store directory layout
//!
//! Everything strongbox persists lives under a single root:
//!
//! ```text
//! private/   encrypt.key  encrypt.pub  signify.sec  signify.pub
//! store/     <name>  <name>.sig       one pair per sealed entry
//! tmpstore/                           staging, normally empty
//! ```
//!
//! During key rotation the replacement keys are generated next to the live
//! ones under `tmp.`-prefixed names and only renamed into place once every
//! entry has been re-sealed.

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Prefix for rotation-staged key files under `private/`
pub const TMP_KEY_PREFIX: &str = "tmp.";

/// Resolved locations of the store's directories and key files
#[derive(Debug, Clone)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Key material, mode 0700
    pub fn private(&self) -> PathBuf {
        self.root.join("private")
    }

    /// One ciphertext file (plus detached `.sig`) per entry
    pub fn store(&self) -> PathBuf {
        self.root.join("store")
    }

    /// Staging for plaintext being composed and for rotation
    pub fn tmpstore(&self) -> PathBuf {
        self.root.join("tmpstore")
    }

    pub fn encrypt_key(&self) -> PathBuf {
        self.private().join("encrypt.key")
    }

    pub fn encrypt_pub(&self) -> PathBuf {
        self.private().join("encrypt.pub")
    }

    pub fn signify_sec(&self) -> PathBuf {
        self.private().join("signify.sec")
    }

    pub fn signify_pub(&self) -> PathBuf {
        self.private().join("signify.pub")
    }

    pub fn tmp_encrypt_key(&self) -> PathBuf {
        self.private().join(format!("{TMP_KEY_PREFIX}encrypt.key"))
    }

    pub fn tmp_encrypt_pub(&self) -> PathBuf {
        self.private().join(format!("{TMP_KEY_PREFIX}encrypt.pub"))
    }

    pub fn tmp_signify_sec(&self) -> PathBuf {
        self.private().join(format!("{TMP_KEY_PREFIX}signify.sec"))
    }

    pub fn tmp_signify_pub(&self) -> PathBuf {
        self.private().join(format!("{TMP_KEY_PREFIX}signify.pub"))
    }

    /// Create the directory tree. Only the owner may read `private/` or the
    /// root itself.
    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.private())?;
        fs::create_dir_all(self.store())?;
        fs::create_dir_all(self.tmpstore())?;
        fs::set_permissions(&self.root, Permissions::from_mode(0o700))?;
        fs::set_permissions(self.private(), Permissions::from_mode(0o700))?;
        Ok(())
    }
}
