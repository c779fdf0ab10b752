//! Environment-derived configuration
//!
//! Read once at startup and passed down explicitly; no component reads the
//! environment on its own.
//!
//! - `STRONGBOX_DIR`: store root (default `~/.local/share/strongbox`)
//! - `STRONGBOX_READ_PASS`: `stdin` to read passphrases from standard input
//! - `EDITOR`: program used to compose plaintext (default `vi`)
//! - `STRONGBOX_CLIP`: clipboard program fed the first plaintext line
//!   (default `xclip`)

use std::env;
use std::path::PathBuf;

use crate::paths::StorePaths;

/// How passphrases are acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassphraseMode {
    /// Hidden prompt on the controlling terminal
    Terminal,
    /// One passphrase per line on standard input, no prompt
    Stdin,
}

/// Process-wide configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Store root directory
    pub root: PathBuf,
    /// Passphrase acquisition mode
    pub passphrase_mode: PassphraseMode,
    /// Editor program for composing plaintext
    pub editor: String,
    /// Clipboard program for `clip`
    pub clip_program: String,
}

impl Config {
    pub fn from_env() -> Self {
        let root = env::var_os("STRONGBOX_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("strongbox")
            });

        let passphrase_mode = match env::var("STRONGBOX_READ_PASS").as_deref() {
            Ok("stdin") => PassphraseMode::Stdin,
            _ => PassphraseMode::Terminal,
        };

        let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
        let clip_program = env::var("STRONGBOX_CLIP").unwrap_or_else(|_| "xclip".to_string());

        Self {
            root,
            passphrase_mode,
            editor,
            clip_program,
        }
    }

    pub fn store_paths(&self) -> StorePaths {
        StorePaths::new(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment mutation is process-global, so everything env-dependent
    // lives in a single test.
    #[test]
    fn test_from_env() {
        env::set_var("STRONGBOX_DIR", "/tmp/boxtest");
        env::set_var("STRONGBOX_READ_PASS", "stdin");
        env::set_var("EDITOR", "ed");
        env::set_var("STRONGBOX_CLIP", "wl-copy");

        let config = Config::from_env();
        assert_eq!(config.root, PathBuf::from("/tmp/boxtest"));
        assert_eq!(config.passphrase_mode, PassphraseMode::Stdin);
        assert_eq!(config.editor, "ed");
        assert_eq!(config.clip_program, "wl-copy");
        assert_eq!(
            config.store_paths().store(),
            PathBuf::from("/tmp/boxtest/store")
        );

        env::remove_var("STRONGBOX_READ_PASS");
        let config = Config::from_env();
        assert_eq!(config.passphrase_mode, PassphraseMode::Terminal);

        env::remove_var("STRONGBOX_DIR");
        env::remove_var("EDITOR");
        env::remove_var("STRONGBOX_CLIP");
    }
}
