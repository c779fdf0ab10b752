//! Command orchestration
//!
//! Each operation is a short pipeline over the store, keyring, matcher and
//! crypto backend. Passphrases, disambiguation choices, the editor and the
//! clipboard are injected capabilities, so the engine runs under tests with
//! canned input and no terminal.
//!
//! Failure policy: every error ends the command. The one deliberate
//! asymmetry is `add`/`edit`, where a signing failure still leaves the
//! freshly written ciphertext behind as an unsigned entry; `verify`
//! detects that state and `sign` repairs it.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use strongbox_core::{Config, StorePaths};
use tracing::debug;

use crate::crypto::CryptoBackend;
use crate::error::StoreError;
use crate::keyring::Keyring;
use crate::matcher::{Resolution, SearchMatcher};
use crate::store::{EntryStore, StagingArea};

/// Where passphrases come from
pub trait PassphraseSource {
    fn read_passphrase(&mut self, prompt: &str) -> Result<String, StoreError>;
}

/// Hidden prompt on the controlling terminal
pub struct TerminalPassphrase;

impl PassphraseSource for TerminalPassphrase {
    fn read_passphrase(&mut self, prompt: &str) -> Result<String, StoreError> {
        rpassword::prompt_password(prompt).map_err(StoreError::Io)
    }
}

/// One passphrase per line on standard input, no prompt echo
pub struct StdinPassphrase;

impl PassphraseSource for StdinPassphrase {
    fn read_passphrase(&mut self, _prompt: &str) -> Result<String, StoreError> {
        read_line(&mut io::stdin().lock())
    }
}

/// Where disambiguation choices come from
pub trait ChoiceSource {
    fn read_choice(&mut self) -> Result<String, StoreError>;
}

pub struct StdinChoice;

impl ChoiceSource for StdinChoice {
    fn read_choice(&mut self) -> Result<String, StoreError> {
        read_line(&mut io::stdin().lock())
    }
}

fn read_line(input: &mut dyn BufRead) -> Result<String, StoreError> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

/// External editing step that fills or updates a staged plaintext file
pub trait Editor {
    fn compose(&mut self, path: &Path) -> Result<(), StoreError>;
}

/// Runs the configured editor program on the staged file
pub struct ExternalEditor {
    program: String,
}

impl ExternalEditor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Editor for ExternalEditor {
    fn compose(&mut self, path: &Path) -> Result<(), StoreError> {
        let status = Command::new(&self.program).arg(path).status()?;
        if !status.success() {
            return Err(StoreError::Provider(format!(
                "editor {} exited with {status}",
                self.program
            )));
        }
        Ok(())
    }
}

/// External clipboard utility; receives data on stdin
pub trait Clipboard {
    fn copy(&mut self, data: &[u8]) -> Result<(), StoreError>;
}

pub struct ExternalClipboard {
    program: String,
}

impl ExternalClipboard {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Clipboard for ExternalClipboard {
    fn copy(&mut self, data: &[u8]) -> Result<(), StoreError> {
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(data)?;
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(StoreError::Provider(format!(
                "{} exited with {status}",
                self.program
            )));
        }
        Ok(())
    }
}

/// Orchestrates one command invocation
pub struct CommandEngine<W: Write> {
    paths: StorePaths,
    store: EntryStore,
    staging: StagingArea,
    backend: Box<dyn CryptoBackend>,
    passphrases: Box<dyn PassphraseSource>,
    choices: Box<dyn ChoiceSource>,
    editor: Box<dyn Editor>,
    clipboard: Box<dyn Clipboard>,
    out: W,
}

impl<W: Write> CommandEngine<W> {
    pub fn new(
        config: &Config,
        backend: Box<dyn CryptoBackend>,
        passphrases: Box<dyn PassphraseSource>,
        choices: Box<dyn ChoiceSource>,
        out: W,
    ) -> Result<Self, StoreError> {
        let paths = config.store_paths();
        paths.ensure()?;
        Ok(Self {
            store: EntryStore::new(paths.store()),
            staging: StagingArea::new(paths.tmpstore()),
            backend,
            passphrases,
            choices,
            editor: Box::new(ExternalEditor::new(&config.editor)),
            clipboard: Box::new(ExternalClipboard::new(&config.clip_program)),
            out,
            paths,
        })
    }

    pub fn with_editor(mut self, editor: Box<dyn Editor>) -> Self {
        self.editor = editor;
        self
    }

    pub fn with_clipboard(mut self, clipboard: Box<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    fn keyring(&self) -> Result<Keyring, StoreError> {
        Keyring::load(&self.paths)
    }

    /// `init`: generate the keyring. Fails if one exists.
    pub fn init(&mut self) -> Result<(), StoreError> {
        let passphrase = self
            .passphrases
            .read_passphrase("passphrase for new keys: ")?;
        Keyring::init(&self.paths, self.backend.as_ref(), &passphrase)?;
        Ok(())
    }

    /// `add`: compose plaintext in the staging area, encrypt, then sign.
    /// A signing failure leaves the entry unsigned; the ciphertext stays.
    pub fn add(&mut self, name: &str) -> Result<(), StoreError> {
        EntryStore::validate_name(name)?;
        let keyring = self.keyring()?;
        let staged = self.staging.claim(name)?;
        self.editor.compose(staged.path())?;
        let plaintext = staged.read()?;
        let ciphertext = self.backend.encrypt(&plaintext, &keyring.encrypt_pub)?;
        self.store.write(name, &ciphertext)?;
        debug!(name = %name, "entry encrypted");
        // plaintext is gone before we block on the signing passphrase
        drop(staged);
        self.seal(&keyring, name)
    }

    /// `sign`: sign an existing entry's ciphertext in place.
    pub fn sign(&mut self, name: &str) -> Result<(), StoreError> {
        let keyring = self.keyring()?;
        if !self.store.exists(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        self.seal(&keyring, name)
    }

    /// Progress line first, then the passphrase: a caller piping input
    /// sees what is about to be signed before the read blocks.
    fn seal(&mut self, keyring: &Keyring, name: &str) -> Result<(), StoreError> {
        writeln!(
            self.out,
            "Signing {} with {}",
            self.store.entry_path(name).display(),
            keyring.signify_sec.display()
        )?;
        self.out.flush()?;
        let passphrase = self.passphrases.read_passphrase("signing passphrase: ")?;
        self.sign_with(keyring, name, &passphrase)
    }

    fn sign_with(
        &mut self,
        keyring: &Keyring,
        name: &str,
        passphrase: &str,
    ) -> Result<(), StoreError> {
        let sig = tempfile::NamedTempFile::new_in(self.store.dir())?;
        self.backend.sign(
            &self.store.entry_path(name),
            sig.path(),
            &keyring.signify_sec,
            passphrase,
        )?;
        let signature = fs::read(sig.path())?;
        self.store.write_signature(name, &signature)
    }

    /// `verify`: check every entry. One stderr line per unsigned or
    /// bad-signature entry; fails unless the set is empty.
    pub fn verify(&mut self) -> Result<(), StoreError> {
        let keyring = self.keyring()?;
        let names = self.store.list()?;
        let mut failed = 0usize;
        for name in &names {
            let result = if !self.store.is_signed(name) {
                Err(StoreError::MissingSignature(name.clone()))
            } else {
                self.backend.verify(
                    &self.store.entry_path(name),
                    &self.store.signature_path(name),
                    &keyring.signify_pub,
                )
            };
            if let Err(err) = result {
                failed += 1;
                eprintln!("{err}");
            }
        }
        if failed > 0 {
            return Err(StoreError::VerifySummary {
                failed,
                checked: names.len(),
            });
        }
        Ok(())
    }

    /// `show` / `s`: resolve the pattern to one entry and print its
    /// plaintext exactly. `s` echoes the resolved name first.
    pub fn show(&mut self, pattern: &str, echo_name: bool) -> Result<(), StoreError> {
        let keyring = self.keyring()?;
        let Some(name) = self.resolve_one(pattern)? else {
            return Ok(());
        };
        let plaintext = self.decrypt_prompting(&keyring, &name)?;
        if echo_name {
            writeln!(self.out, "{name}")?;
        }
        self.out.write_all(&plaintext)?;
        self.out.flush()?;
        Ok(())
    }

    /// `edit`: decrypt into staging, hand to the editor, re-seal. One
    /// passphrase covers both the decrypt and the re-sign.
    pub fn edit(&mut self, name: &str) -> Result<(), StoreError> {
        let keyring = self.keyring()?;
        if !self.store.exists(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let passphrase = self.passphrases.read_passphrase("passphrase: ")?;
        let plaintext = self.decrypt_with(&keyring, name, &passphrase)?;

        let staged = self.staging.claim(name)?;
        staged.write(&plaintext)?;
        self.editor.compose(staged.path())?;
        let updated = staged.read()?;
        let ciphertext = self.backend.encrypt(&updated, &keyring.encrypt_pub)?;
        self.store.write(name, &ciphertext)?;
        drop(staged);

        writeln!(
            self.out,
            "Signing {} with {}",
            self.store.entry_path(name).display(),
            keyring.signify_sec.display()
        )?;
        self.out.flush()?;
        self.sign_with(&keyring, name, &passphrase)
    }

    /// `mv`: rename an entry and its signature together.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), StoreError> {
        self.keyring()?;
        self.store.rename(old, new)
    }

    /// `rm`: delete an entry and its signature together.
    pub fn remove(&mut self, name: &str) -> Result<(), StoreError> {
        self.keyring()?;
        self.store.remove(name)
    }

    /// `ls`: entry names, one per line, lexicographic.
    pub fn list(&mut self) -> Result<(), StoreError> {
        self.keyring()?;
        for name in self.store.list()? {
            writeln!(self.out, "{name}")?;
        }
        Ok(())
    }

    /// `find`: names matching the pattern, no forced resolution.
    pub fn find(&mut self, pattern: &str) -> Result<(), StoreError> {
        self.keyring()?;
        let matcher = SearchMatcher::new(pattern)?;
        for name in self.store.list()? {
            if matcher.is_match(&name) {
                writeln!(self.out, "{name}")?;
            }
        }
        Ok(())
    }

    /// `rotate`: re-seal every entry under a fresh keyring, all or nothing.
    pub fn rotate(&mut self) -> Result<(), StoreError> {
        let keyring = self.keyring()?;
        let old = self.passphrases.read_passphrase("old passphrase: ")?;
        let new = self.passphrases.read_passphrase("new passphrase: ")?;
        keyring.rotate(
            &self.paths,
            &self.store,
            self.backend.as_ref(),
            &old,
            &new,
            &mut self.out,
        )
    }

    /// `export`: decrypt every sealed entry into `dir`, bytes unchanged.
    pub fn export(&mut self, dir: &Path) -> Result<(), StoreError> {
        let keyring = self.keyring()?;
        fs::create_dir_all(dir)?;
        let passphrase = self.passphrases.read_passphrase("passphrase: ")?;
        for name in self.store.list()? {
            if !self.store.is_signed(&name) {
                continue;
            }
            let plaintext = self.decrypt_with(&keyring, &name, &passphrase)?;
            fs::write(dir.join(&name), plaintext)?;
        }
        Ok(())
    }

    /// `clip`: hand only the first plaintext line to the clipboard program.
    pub fn clip(&mut self, name: &str) -> Result<(), StoreError> {
        let keyring = self.keyring()?;
        if !self.store.exists(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let plaintext = self.decrypt_prompting(&keyring, name)?;
        let mut first_line = plaintext.split(|&b| b == b'\n').next().unwrap_or(&[]);
        if first_line.ends_with(b"\r") {
            first_line = &first_line[..first_line.len() - 1];
        }
        self.clipboard.copy(first_line)
    }

    /// Resolve a pattern to exactly one entry, prompting on ambiguity.
    /// `Ok(None)` means the operator cancelled with an empty choice.
    fn resolve_one(&mut self, pattern: &str) -> Result<Option<String>, StoreError> {
        let matcher = SearchMatcher::new(pattern)?;
        match matcher.resolve(&self.store.list()?) {
            Resolution::NoMatch => Err(StoreError::NotFound(pattern.to_string())),
            Resolution::Unique(name) => Ok(Some(name)),
            Resolution::Ambiguous(candidates) => {
                for (ordinal, name) in candidates.iter().enumerate() {
                    writeln!(self.out, "{}) {}", ordinal + 1, name)?;
                }
                self.out.flush()?;
                let choice = self.choices.read_choice()?;
                let choice = choice.trim();
                if choice.is_empty() {
                    return Ok(None);
                }
                match choice.parse::<usize>() {
                    Ok(n) if (1..=candidates.len()).contains(&n) => {
                        Ok(Some(candidates[n - 1].clone()))
                    }
                    _ => Err(StoreError::InvalidOption(choice.to_string())),
                }
            }
        }
    }

    fn decrypt_prompting(
        &mut self,
        keyring: &Keyring,
        name: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let passphrase = self.passphrases.read_passphrase("passphrase: ")?;
        self.decrypt_with(keyring, name, &passphrase)
    }

    fn decrypt_with(
        &mut self,
        keyring: &Keyring,
        name: &str,
        passphrase: &str,
    ) -> Result<Vec<u8>, StoreError> {
        self.backend
            .decrypt(&self.store.entry_path(name), &keyring.encrypt_key, passphrase)
    }
}
