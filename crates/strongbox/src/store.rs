//! On-disk entry collection and plaintext staging
//!
//! `store/` holds one ciphertext file per entry plus a detached `.sig` for
//! every sealed entry. An entry with ciphertext but no signature is
//! unsigned, which `verify` surfaces. `tmpstore/` holds plaintext for at
//! most one in-flight operation; the `StagedFile` guard removes it on every
//! exit path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::StoreError;

/// Detached-signature suffix
pub const SIG_SUFFIX: &str = ".sig";

/// The collection of encrypted entries under `store/`
pub struct EntryStore {
    dir: PathBuf,
}

impl EntryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// An entry name is a single path segment. Dot-prefixed names are
    /// reserved for temp files, the `.sig` suffix for signatures.
    pub fn validate_name(name: &str) -> Result<(), StoreError> {
        let invalid = name.is_empty()
            || name.starts_with('.')
            || name.ends_with(SIG_SUFFIX)
            || name.contains('\0')
            || name.chars().any(std::path::is_separator);
        if invalid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn signature_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{SIG_SUFFIX}"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entry_path(name).is_file()
    }

    pub fn is_signed(&self, name: &str) -> bool {
        self.signature_path(name).is_file()
    }

    /// Entry names in lexicographic order, unsigned entries included,
    /// signatures and temp files excluded.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name.ends_with(SIG_SUFFIX) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Persist ciphertext. Write-to-temp-then-rename, so a crash never
    /// leaves a truncated entry.
    pub fn write(&self, name: &str, ciphertext: &[u8]) -> Result<(), StoreError> {
        Self::validate_name(name)?;
        self.write_atomic(&self.entry_path(name), ciphertext)
    }

    /// Persist a detached signature, same atomicity as `write`.
    pub fn write_signature(&self, name: &str, signature: &[u8]) -> Result<(), StoreError> {
        Self::validate_name(name)?;
        self.write_atomic(&self.signature_path(name), signature)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(data)?;
        tmp.persist(path).map_err(|err| StoreError::Io(err.error))?;
        Ok(())
    }

    /// Remove ciphertext and signature together. A missing signature is
    /// not an error; a missing entry is.
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        if !self.exists(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        fs::remove_file(self.entry_path(name))?;
        let sig = self.signature_path(name);
        if sig.is_file() {
            fs::remove_file(sig)?;
        }
        Ok(())
    }

    /// Move ciphertext and signature together. An unsigned entry moves its
    /// ciphertext only.
    pub fn rename(&self, old: &str, new: &str) -> Result<(), StoreError> {
        Self::validate_name(new)?;
        if !self.exists(old) {
            return Err(StoreError::NotFound(old.to_string()));
        }
        fs::rename(self.entry_path(old), self.entry_path(new))?;
        let old_sig = self.signature_path(old);
        if old_sig.is_file() {
            fs::rename(old_sig, self.signature_path(new))?;
        }
        Ok(())
    }
}

/// Ephemeral plaintext staging under `tmpstore/`
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claim the staging slot for `name`. The returned guard removes the
    /// file when dropped.
    pub fn claim(&self, name: &str) -> Result<StagedFile, StoreError> {
        EntryStore::validate_name(name)?;
        Ok(StagedFile {
            path: self.dir.join(name),
        })
    }
}

/// Plaintext staged for a single operation. Removed on drop, success or
/// failure: staged plaintext never outlives the command.
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn write(&self, plaintext: &[u8]) -> Result<(), StoreError> {
        fs::write(&self.path, plaintext)?;
        Ok(())
    }

    /// The staged plaintext, or `Staging` if the external composing step
    /// never produced a file.
    pub fn read(&self) -> Result<Vec<u8>, StoreError> {
        if !self.exists() {
            let name = self.path.file_name().unwrap_or_default().to_string_lossy();
            return Err(StoreError::Staging(name.into_owned()));
        }
        Ok(fs::read(&self.path)?)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(tmp: &tempfile::TempDir) -> EntryStore {
        EntryStore::new(tmp.path())
    }

    #[test]
    fn test_validate_name() {
        for ok in ["Foo", "foo-bar", "a b", "mail@example.org", "1"] {
            assert!(EntryStore::validate_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "Bar/Baz", "/abs", "Foo.sig", ".hidden", ".", "..", "nul\0"] {
            assert!(
                matches!(
                    EntryStore::validate_name(bad),
                    Err(StoreError::InvalidName(_))
                ),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_list_sorted_excludes_signatures() {
        let tmp = tempdir().unwrap();
        let store = store(&tmp);
        store.write("Baz", b"c2").unwrap();
        store.write("Bar", b"c1").unwrap();
        store.write_signature("Bar", b"s1").unwrap();
        fs::write(tmp.path().join(".tmp12345"), b"junk").unwrap();

        assert_eq!(store.list().unwrap(), vec!["Bar", "Baz"]);
    }

    #[test]
    fn test_write_then_read_back() {
        let tmp = tempdir().unwrap();
        let store = store(&tmp);
        store.write("Foo", b"ciphertext").unwrap();
        assert!(store.exists("Foo"));
        assert!(!store.is_signed("Foo"));
        assert_eq!(fs::read(store.entry_path("Foo")).unwrap(), b"ciphertext");

        store.write_signature("Foo", b"sig").unwrap();
        assert!(store.is_signed("Foo"));
    }

    #[test]
    fn test_remove_takes_signature_along() {
        let tmp = tempdir().unwrap();
        let store = store(&tmp);
        store.write("Foo", b"c").unwrap();
        store.write_signature("Foo", b"s").unwrap();

        store.remove("Foo").unwrap();
        assert!(!store.exists("Foo"));
        assert!(!store.is_signed("Foo"));

        assert!(matches!(
            store.remove("Foo"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_unsigned_entry() {
        let tmp = tempdir().unwrap();
        let store = store(&tmp);
        store.write("Foo", b"c").unwrap();
        store.remove("Foo").unwrap();
        assert!(!store.exists("Foo"));
    }

    #[test]
    fn test_rename_moves_pair() {
        let tmp = tempdir().unwrap();
        let store = store(&tmp);
        store.write("Foo", b"c").unwrap();
        store.write_signature("Foo", b"s").unwrap();

        store.rename("Foo", "Baz").unwrap();
        assert_eq!(store.list().unwrap(), vec!["Baz"]);
        assert!(store.is_signed("Baz"));
        assert!(!store.is_signed("Foo"));
    }

    #[test]
    fn test_rename_unsigned_moves_ciphertext_only() {
        let tmp = tempdir().unwrap();
        let store = store(&tmp);
        store.write("Foo", b"c").unwrap();

        store.rename("Foo", "Baz").unwrap();
        assert!(store.exists("Baz"));
        assert!(!store.is_signed("Baz"));
    }

    #[test]
    fn test_rename_validates_target() {
        let tmp = tempdir().unwrap();
        let store = store(&tmp);
        store.write("Foo", b"c").unwrap();

        assert!(matches!(
            store.rename("Foo", "Bar/Baz"),
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(
            store.rename("Foo", "Bar.sig"),
            Err(StoreError::InvalidName(_))
        ));
        assert!(store.exists("Foo"));
    }

    #[test]
    fn test_staged_file_removed_on_drop() {
        let tmp = tempdir().unwrap();
        let staging = StagingArea::new(tmp.path());

        let path = {
            let staged = staging.claim("Foo").unwrap();
            staged.write(b"bar\nbaz").unwrap();
            assert_eq!(staged.read().unwrap(), b"bar\nbaz");
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_staged_read_without_file() {
        let tmp = tempdir().unwrap();
        let staging = StagingArea::new(tmp.path());
        let staged = staging.claim("Foo").unwrap();
        assert!(matches!(staged.read(), Err(StoreError::Staging(_))));
    }
}
