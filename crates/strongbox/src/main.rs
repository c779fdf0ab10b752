//! strongbox - Password Manager for the command line
//!
//! Each secret lives in its own encrypted, signed file. Encryption and
//! signatures come from external providers (openssl, signify); composing
//! plaintext goes through $EDITOR via an ephemeral staging file.
//!
//! Commands:
//! - init: generate the keyring
//! - add/edit <NAME>: compose, encrypt, sign
//! - show/s <PATTERN>: decrypt and print (s echoes the resolved name)
//! - sign <NAME>, verify: signature maintenance
//! - ls, find <PATTERN>, mv, rm: store housekeeping
//! - rotate: re-seal everything under fresh keys
//! - export <DIR>: decrypt all sealed entries into a directory
//! - clip <NAME>: first plaintext line to the clipboard

use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use strongbox::engine::{
    ChoiceSource, PassphraseSource, StdinChoice, StdinPassphrase, TerminalPassphrase,
};
use strongbox::{CommandEngine, OpensslSignify};
use strongbox_core::{Config, PassphraseMode};

#[derive(Debug, Parser)]
#[command(name = "strongbox")]
#[command(version)]
#[command(about = "Password Manager - per-entry encrypted, signed credential store")]
#[command(after_help = "ENVIRONMENT:
    STRONGBOX_DIR        store root (default ~/.local/share/strongbox)
    STRONGBOX_READ_PASS  'stdin' to read passphrases from standard input
    EDITOR               program used to compose plaintext
    STRONGBOX_CLIP       clipboard program for clip (default xclip)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate the encryption and signing keypairs
    Init,

    /// Compose a new entry in $EDITOR, encrypt and sign it
    Add { name: String },

    /// Sign an existing entry's ciphertext
    Sign { name: String },

    /// Check every entry's signature
    Verify,

    /// Delete an entry and its signature
    Rm { name: String },

    /// Rename an entry and its signature
    Mv { old: String, new: String },

    /// Decrypt the entry matching a pattern and print it
    Show { pattern: String },

    /// Like show, but echo the resolved name before the content
    S { pattern: String },

    /// Decrypt an entry into the staging area, edit, re-seal
    Edit { name: String },

    /// List entries
    Ls,

    /// List entries matching a case-insensitive regex
    Find { pattern: String },

    /// Re-encrypt and re-sign every entry under a fresh keyring
    Rotate,

    /// Decrypt every sealed entry into a directory
    Export { dir: PathBuf },

    /// Copy the first line of an entry to the clipboard
    Clip { name: String },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // -h/--help and -V print to stdout and exit 0; anything else
            // is a usage error and exits 1, store untouched either way
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            process::exit(code);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env();

    let passphrases: Box<dyn PassphraseSource> = match config.passphrase_mode {
        PassphraseMode::Terminal => Box::new(TerminalPassphrase),
        PassphraseMode::Stdin => Box::new(StdinPassphrase),
    };
    let choices: Box<dyn ChoiceSource> = Box::new(StdinChoice);

    let mut engine = CommandEngine::new(
        &config,
        Box::new(OpensslSignify::default()),
        passphrases,
        choices,
        io::stdout(),
    )?;

    match cli.command {
        Commands::Init => engine.init()?,
        Commands::Add { name } => engine.add(&name)?,
        Commands::Sign { name } => engine.sign(&name)?,
        Commands::Verify => engine.verify()?,
        Commands::Rm { name } => engine.remove(&name)?,
        Commands::Mv { old, new } => engine.rename(&old, &new)?,
        Commands::Show { pattern } => engine.show(&pattern, false)?,
        Commands::S { pattern } => engine.show(&pattern, true)?,
        Commands::Edit { name } => engine.edit(&name)?,
        Commands::Ls => engine.list()?,
        Commands::Find { pattern } => engine.find(&pattern)?,
        Commands::Rotate => engine.rotate()?,
        Commands::Export { dir } => engine.export(&dir)?,
        Commands::Clip { name } => engine.clip(&name)?,
    }

    Ok(())
}
