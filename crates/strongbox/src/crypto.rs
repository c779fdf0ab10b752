//! Crypto provider backends
//!
//! strongbox performs no cryptography of its own. Asymmetric encryption is
//! delegated to an openssl-style RSA tool and detached signatures to a
//! signify-style signer, both invoked as subprocesses. Passphrases are
//! piped to the provider's stdin; provider stderr is inherited so
//! diagnostics ("Generating a 4096 bit RSA private key", "signify:
//! incorrect passphrase") reach the operator live and verbatim rather than
//! buffered or reworded.
//!
//! The trait keeps the invocation contract narrow enough that tests
//! substitute a reversible in-memory fake.

use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};

use crate::error::StoreError;

/// Capability interface over the external encryption and signing providers
pub trait CryptoBackend {
    /// Generate a passphrase-protected encryption keypair. Long-running;
    /// provider diagnostics stream to stderr as they occur.
    fn generate_encryption_keypair(
        &self,
        private_key: &Path,
        public_key: &Path,
        passphrase: &str,
    ) -> Result<(), StoreError>;

    /// Generate a passphrase-protected signing keypair.
    fn generate_signing_keypair(
        &self,
        secret_key: &Path,
        public_key: &Path,
        passphrase: &str,
    ) -> Result<(), StoreError>;

    /// Encrypt `plaintext` to the holder of `public_key`'s counterpart.
    fn encrypt(&self, plaintext: &[u8], public_key: &Path) -> Result<Vec<u8>, StoreError>;

    /// Recover the exact plaintext bytes, embedded line terminators
    /// included. A wrong passphrase (or a key that never sealed this
    /// ciphertext) is `IncorrectPassphrase`.
    fn decrypt(
        &self,
        ciphertext: &Path,
        private_key: &Path,
        passphrase: &str,
    ) -> Result<Vec<u8>, StoreError>;

    /// Write a detached signature for `message` to `signature`.
    fn sign(
        &self,
        message: &Path,
        signature: &Path,
        secret_key: &Path,
        passphrase: &str,
    ) -> Result<(), StoreError>;

    /// Check `signature` against `message`.
    fn verify(
        &self,
        message: &Path,
        signature: &Path,
        public_key: &Path,
    ) -> Result<(), StoreError>;
}

/// Production backend: `openssl` for RSA encryption, `signify` for
/// detached signatures.
pub struct OpensslSignify {
    /// RSA modulus size for generated encryption keys
    pub rsa_bits: u32,
}

impl Default for OpensslSignify {
    fn default() -> Self {
        Self { rsa_bits: 4096 }
    }
}

impl OpensslSignify {
    /// Run a provider with `input` piped to its stdin and stderr inherited.
    /// Stdout is captured when the caller consumes it, discarded otherwise.
    fn run(mut cmd: Command, input: &[u8], capture_stdout: bool) -> Result<Output, StoreError> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        cmd.stdin(Stdio::piped());
        cmd.stdout(if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StoreError::Provider(format!("{program} not found in PATH"))
            } else {
                StoreError::Io(err)
            }
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A provider that rejects the passphrase may exit before
            // draining its stdin.
            match stdin.write_all(input) {
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
                other => other?,
            }
        }

        Ok(child.wait_with_output()?)
    }
}

impl CryptoBackend for OpensslSignify {
    fn generate_encryption_keypair(
        &self,
        private_key: &Path,
        public_key: &Path,
        passphrase: &str,
    ) -> Result<(), StoreError> {
        let mut cmd = Command::new("openssl");
        cmd.arg("genrsa")
            .args(["-aes256", "-passout", "stdin", "-out"])
            .arg(private_key)
            .arg(self.rsa_bits.to_string());
        let output = Self::run(cmd, passphrase.as_bytes(), false)?;
        if !output.status.success() {
            return Err(StoreError::Provider("openssl key generation failed".into()));
        }

        let mut cmd = Command::new("openssl");
        cmd.arg("rsa")
            .arg("-in")
            .arg(private_key)
            .args(["-passin", "stdin", "-pubout", "-out"])
            .arg(public_key);
        let output = Self::run(cmd, passphrase.as_bytes(), false)?;
        if !output.status.success() {
            return Err(StoreError::Provider(
                "openssl public key extraction failed".into(),
            ));
        }
        Ok(())
    }

    fn generate_signing_keypair(
        &self,
        secret_key: &Path,
        public_key: &Path,
        passphrase: &str,
    ) -> Result<(), StoreError> {
        let mut cmd = Command::new("signify");
        cmd.arg("-G").arg("-p").arg(public_key).arg("-s").arg(secret_key);
        // signify asks for the passphrase twice
        let input = format!("{passphrase}\n{passphrase}\n");
        let output = Self::run(cmd, input.as_bytes(), false)?;
        if !output.status.success() {
            return Err(StoreError::Provider("signify key generation failed".into()));
        }
        Ok(())
    }

    fn encrypt(&self, plaintext: &[u8], public_key: &Path) -> Result<Vec<u8>, StoreError> {
        let mut cmd = Command::new("openssl");
        cmd.args(["pkeyutl", "-encrypt", "-pubin", "-inkey"]).arg(public_key);
        let output = Self::run(cmd, plaintext, true)?;
        if !output.status.success() {
            return Err(StoreError::Provider("openssl encryption failed".into()));
        }
        Ok(output.stdout)
    }

    fn decrypt(
        &self,
        ciphertext: &Path,
        private_key: &Path,
        passphrase: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let mut cmd = Command::new("openssl");
        cmd.args(["pkeyutl", "-decrypt", "-inkey"])
            .arg(private_key)
            .args(["-passin", "stdin", "-in"])
            .arg(ciphertext);
        let output = Self::run(cmd, passphrase.as_bytes(), true)?;
        if !output.status.success() {
            return Err(StoreError::IncorrectPassphrase);
        }
        Ok(output.stdout)
    }

    fn sign(
        &self,
        message: &Path,
        signature: &Path,
        secret_key: &Path,
        passphrase: &str,
    ) -> Result<(), StoreError> {
        let mut cmd = Command::new("signify");
        cmd.arg("-S")
            .arg("-s")
            .arg(secret_key)
            .arg("-m")
            .arg(message)
            .arg("-x")
            .arg(signature);
        let output = Self::run(cmd, format!("{passphrase}\n").as_bytes(), false)?;
        if !output.status.success() {
            return Err(StoreError::IncorrectPassphrase);
        }
        Ok(())
    }

    fn verify(
        &self,
        message: &Path,
        signature: &Path,
        public_key: &Path,
    ) -> Result<(), StoreError> {
        let mut cmd = Command::new("signify");
        cmd.arg("-V")
            .arg("-q")
            .arg("-p")
            .arg(public_key)
            .arg("-m")
            .arg(message)
            .arg("-x")
            .arg(signature);
        let output = Self::run(cmd, &[], false)?;
        if !output.status.success() {
            return Err(StoreError::VerificationFailed(
                message.display().to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Reversible fake backend
    //!
    //! Key files carry a generation id and the protecting passphrase;
    //! ciphertext and signatures embed the id, so stale keys and wrong
    //! passphrases fail the same way the real providers do.

    use std::collections::hash_map::DefaultHasher;
    use std::fs;
    use std::hash::Hasher;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::CryptoBackend;
    use crate::error::StoreError;

    static KEY_ID: AtomicU64 = AtomicU64::new(1);

    pub struct FakeBackend;

    fn write_keypair(
        private_key: &Path,
        public_key: &Path,
        passphrase: &str,
    ) -> Result<(), StoreError> {
        let id = KEY_ID.fetch_add(1, Ordering::SeqCst);
        fs::write(private_key, format!("fake-priv {id} {passphrase}"))?;
        fs::write(public_key, format!("fake-pub {id}"))?;
        Ok(())
    }

    fn key_id(key: &Path) -> Result<String, StoreError> {
        let text = fs::read_to_string(key)?;
        text.split_whitespace()
            .nth(1)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Provider(format!("malformed fake key {}", key.display())))
    }

    fn check_passphrase(key: &Path, passphrase: &str) -> Result<String, StoreError> {
        let text = fs::read_to_string(key)?;
        let mut parts = text.split_whitespace();
        let id = parts.nth(1).unwrap_or_default().to_string();
        let stored = parts.next().unwrap_or_default();
        if stored != passphrase {
            return Err(StoreError::IncorrectPassphrase);
        }
        Ok(id)
    }

    fn digest(data: &[u8]) -> u64 {
        let mut hasher = DefaultHasher::new();
        hasher.write(data);
        hasher.finish()
    }

    impl CryptoBackend for FakeBackend {
        fn generate_encryption_keypair(
            &self,
            private_key: &Path,
            public_key: &Path,
            passphrase: &str,
        ) -> Result<(), StoreError> {
            write_keypair(private_key, public_key, passphrase)
        }

        fn generate_signing_keypair(
            &self,
            secret_key: &Path,
            public_key: &Path,
            passphrase: &str,
        ) -> Result<(), StoreError> {
            write_keypair(secret_key, public_key, passphrase)
        }

        fn encrypt(&self, plaintext: &[u8], public_key: &Path) -> Result<Vec<u8>, StoreError> {
            let id = key_id(public_key)?;
            let mut out = format!("{id}\n").into_bytes();
            out.extend_from_slice(plaintext);
            Ok(out)
        }

        fn decrypt(
            &self,
            ciphertext: &Path,
            private_key: &Path,
            passphrase: &str,
        ) -> Result<Vec<u8>, StoreError> {
            let id = check_passphrase(private_key, passphrase)?;
            let data = fs::read(ciphertext)?;
            let split = data
                .iter()
                .position(|&b| b == b'\n')
                .ok_or(StoreError::IncorrectPassphrase)?;
            if data[..split] != *id.as_bytes() {
                // sealed under a different keypair generation
                return Err(StoreError::IncorrectPassphrase);
            }
            Ok(data[split + 1..].to_vec())
        }

        fn sign(
            &self,
            message: &Path,
            signature: &Path,
            secret_key: &Path,
            passphrase: &str,
        ) -> Result<(), StoreError> {
            let id = check_passphrase(secret_key, passphrase)?;
            let body = fs::read(message)?;
            fs::write(signature, format!("fake-sig {id} {}", digest(&body)))?;
            Ok(())
        }

        fn verify(
            &self,
            message: &Path,
            signature: &Path,
            public_key: &Path,
        ) -> Result<(), StoreError> {
            let id = key_id(public_key)?;
            let body = fs::read(message)?;
            let expected = format!("fake-sig {id} {}", digest(&body));
            let actual = fs::read_to_string(signature)?;
            if actual != expected {
                return Err(StoreError::VerificationFailed(
                    message.display().to_string(),
                ));
            }
            Ok(())
        }
    }
}
