//! Keypair lifecycle and all-or-nothing rotation
//!
//! The keyring is one passphrase-protected encryption keypair plus one
//! passphrase-protected signing keypair. They are always replaced together:
//! rotation re-seals every entry with both keys in a single pass, staging
//! everything first and committing only when the whole store has been
//! re-encrypted and re-signed. A failure anywhere before the commit leaves
//! the live store and the live keys byte-for-byte untouched.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use strongbox_core::StorePaths;
use tracing::debug;

use crate::crypto::CryptoBackend;
use crate::error::StoreError;
use crate::store::EntryStore;

pub struct Keyring {
    pub encrypt_key: PathBuf,
    pub encrypt_pub: PathBuf,
    pub signify_sec: PathBuf,
    pub signify_pub: PathBuf,
}

impl Keyring {
    fn live(paths: &StorePaths) -> Self {
        Self {
            encrypt_key: paths.encrypt_key(),
            encrypt_pub: paths.encrypt_pub(),
            signify_sec: paths.signify_sec(),
            signify_pub: paths.signify_pub(),
        }
    }

    /// The rotation-staged keyring under `tmp.` names
    fn staged(paths: &StorePaths) -> Self {
        Self {
            encrypt_key: paths.tmp_encrypt_key(),
            encrypt_pub: paths.tmp_encrypt_pub(),
            signify_sec: paths.tmp_signify_sec(),
            signify_pub: paths.tmp_signify_pub(),
        }
    }

    fn all_present(&self) -> bool {
        self.encrypt_key.is_file()
            && self.encrypt_pub.is_file()
            && self.signify_sec.is_file()
            && self.signify_pub.is_file()
    }

    fn any_present(&self) -> bool {
        self.encrypt_key.exists()
            || self.encrypt_pub.exists()
            || self.signify_sec.exists()
            || self.signify_pub.exists()
    }

    /// Load the live keyring; every operation but `init` starts here.
    pub fn load(paths: &StorePaths) -> Result<Self, StoreError> {
        let keyring = Self::live(paths);
        if !keyring.all_present() {
            return Err(StoreError::MissingKeys);
        }
        Ok(keyring)
    }

    /// Generate both keypairs under one passphrase. Refuses to clobber an
    /// existing keyring. Key generation takes seconds; the provider's
    /// diagnostics stream to stderr while the operator waits.
    pub fn init(
        paths: &StorePaths,
        backend: &dyn CryptoBackend,
        passphrase: &str,
    ) -> Result<Self, StoreError> {
        let keyring = Self::live(paths);
        if keyring.any_present() {
            return Err(StoreError::AlreadyInitialized(paths.private()));
        }
        backend.generate_encryption_keypair(&keyring.encrypt_key, &keyring.encrypt_pub, passphrase)?;
        backend.generate_signing_keypair(&keyring.signify_sec, &keyring.signify_pub, passphrase)?;
        debug!(private = %paths.private().display(), "keyring initialized");
        Ok(keyring)
    }

    /// Re-seal every entry under a freshly generated keyring.
    ///
    /// Two phases. Staging: generate the replacement keypairs under `tmp.`
    /// names, then decrypt each entry with the old key and old passphrase
    /// and write a re-encrypted, re-signed copy into `tmpstore/`, touching
    /// nothing live. A wrong old passphrase fails on the first entry,
    /// before any mutation. Commit: rename every staged pair over its live
    /// counterpart, then the staged keys over the live keys. The guard
    /// clears staged files on every exit path, so an interrupted or failed
    /// rotation leaves no trace.
    pub fn rotate(
        &self,
        paths: &StorePaths,
        store: &EntryStore,
        backend: &dyn CryptoBackend,
        old_passphrase: &str,
        new_passphrase: &str,
        out: &mut dyn Write,
    ) -> Result<(), StoreError> {
        let staged_keys = Self::staged(paths);
        let staging = EntryStore::new(paths.tmpstore());
        let _guard = RotationGuard { paths };

        backend.generate_encryption_keypair(
            &staged_keys.encrypt_key,
            &staged_keys.encrypt_pub,
            new_passphrase,
        )?;
        backend.generate_signing_keypair(
            &staged_keys.signify_sec,
            &staged_keys.signify_pub,
            new_passphrase,
        )?;

        let names = store.list()?;
        for name in &names {
            let plaintext =
                backend.decrypt(&store.entry_path(name), &self.encrypt_key, old_passphrase)?;
            let ciphertext = backend.encrypt(&plaintext, &staged_keys.encrypt_pub)?;
            staging.write(name, &ciphertext)?;
            writeln!(
                out,
                "Signing {} with {}",
                staging.entry_path(name).display(),
                staged_keys.signify_sec.display()
            )?;
            out.flush()?;
            backend.sign(
                &staging.entry_path(name),
                &staging.signature_path(name),
                &staged_keys.signify_sec,
                new_passphrase,
            )?;
            debug!(name = %name, "entry re-sealed");
        }

        // Every entry is staged; from here on each step is a rename.
        for name in &names {
            fs::rename(staging.entry_path(name), store.entry_path(name))?;
            fs::rename(staging.signature_path(name), store.signature_path(name))?;
        }
        fs::rename(&staged_keys.encrypt_key, &self.encrypt_key)?;
        fs::rename(&staged_keys.encrypt_pub, &self.encrypt_pub)?;
        fs::rename(&staged_keys.signify_sec, &self.signify_sec)?;
        fs::rename(&staged_keys.signify_pub, &self.signify_pub)?;
        debug!(entries = names.len(), "keyring rotated");
        Ok(())
    }
}

/// Removes rotation leftovers: `tmp.` key files and anything staged in
/// `tmpstore/`. After a committed rotation the renames have already emptied
/// both, so this is a no-op on success.
struct RotationGuard<'a> {
    paths: &'a StorePaths,
}

impl Drop for RotationGuard<'_> {
    fn drop(&mut self) {
        for key in [
            self.paths.tmp_encrypt_key(),
            self.paths.tmp_encrypt_pub(),
            self.paths.tmp_signify_sec(),
            self.paths.tmp_signify_pub(),
        ] {
            let _ = fs::remove_file(key);
        }
        if let Ok(entries) = fs::read_dir(self.paths.tmpstore()) {
            for entry in entries.flatten() {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}
