//! chap - stream encryption and secure file wiping.
//!
//! `e` and `d` pipe stdin through the stream cipher to stdout, keyed by a
//! secret taken from the environment. `wipe` overwrites a file several
//! times before removing it.
//!
//! Key material lives in values that zeroize on drop. The command body
//! runs under `catch_unwind`, so those values are dropped (and cleared) on
//! normal return, on error, and while unwinding from a panic. This is best
//! effort: it does not reach copies made by the allocator or the OS.

mod config;

use std::io::{self, BufWriter, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use chap_common::Error;
use chap_crypto::{derive_key, CipherContext};
use chap_wipe::{Eraser, ForcedConfirmation, PromptConfirmation};

use crate::config::Settings;

const EXAMPLES: &str = "\
Examples:
  chap e < inputfile > outputfile   Encrypt inputfile and save to outputfile
  chap d < inputfile > outputfile   Decrypt inputfile and save to outputfile
  chap wipe /path/to/file           Securely wipe the specified file";

#[derive(Parser)]
#[command(name = "chap")]
#[command(about = "chap - Stream encryption and secure file wiping")]
#[command(version)]
#[command(arg_required_else_help = true)]
#[command(after_help = EXAMPLES)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt data from stdin to stdout (requires CKEY env var).
    #[command(name = "e")]
    Encrypt,

    /// Decrypt data from stdin to stdout (requires CKEY env var).
    #[command(name = "d")]
    Decrypt,

    /// Securely wipe the specified file (FORCE_WIPE=true skips the prompt).
    #[command(name = "wipe", visible_alias = "w")]
    Wipe {
        /// File to overwrite and remove.
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return usage_error(err),
    };

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let settings = Settings::from_env();
    run_guarded(|| run(cli.command, &settings))
}

/// Run a command body, turning errors and panics into a failing exit code.
///
/// Values owned by `body` are dropped while unwinding, so key material
/// it holds is zeroized before this returns.
fn run_guarded<F: FnOnce() -> Result<()>>(body: F) -> ExitCode {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
        Err(_) => {
            error!("Recovered from panic, key material was wiped while unwinding");
            ExitCode::FAILURE
        }
    }
}

/// Report a command line that could not be parsed. Always a failure,
/// except for `--version`.
fn usage_error(err: clap::Error) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayVersion => {
            print!("{}", err);
            return ExitCode::SUCCESS;
        }
        ErrorKind::InvalidSubcommand => {
            let name = match err.get(ContextKind::InvalidSubcommand) {
                Some(ContextValue::String(name)) => name.clone(),
                _ => String::new(),
            };
            eprintln!("{}\n", Error::UnknownCommand(name));
            eprint!("{}", Cli::command().render_help());
        }
        _ => eprint!("{}", err),
    }
    ExitCode::FAILURE
}

/// Log to stderr; stdout carries the data stream.
fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn run(command: Commands, settings: &Settings) -> Result<()> {
    match command {
        Commands::Encrypt => cmd_encrypt(settings),
        Commands::Decrypt => cmd_decrypt(settings),
        Commands::Wipe { path } => cmd_wipe(&path, settings),
    }
}

/// Build the cipher context from the secret in the environment.
///
/// The secret is dropped, and so zeroized, before this returns.
fn cipher_context(settings: &Settings) -> Result<CipherContext> {
    let secret = settings
        .take_secret()
        .with_context(|| format!("{} env var not set", settings.key_env))?;
    let key = derive_key(secret.as_bytes()).context("Failed to initialize cipher")?;
    Ok(CipherContext::new(key))
}

fn encrypt<R: Read, W: Write>(settings: &Settings, input: R, output: W) -> Result<u64> {
    let context = cipher_context(settings)?;
    let bytes = context
        .seal_stream(input, output, settings.chunk_size)
        .context("Failed to encrypt data")?;
    Ok(bytes)
}

fn decrypt<R: Read, W: Write>(settings: &Settings, input: R, output: W) -> Result<u64> {
    let context = cipher_context(settings)?;
    let bytes = context
        .open_stream(input, output, settings.chunk_size)
        .context("Failed to decrypt data")?;
    Ok(bytes)
}

/// Encrypt stdin to stdout.
fn cmd_encrypt(settings: &Settings) -> Result<()> {
    info!("Encrypting stdin to stdout");
    let output = BufWriter::new(io::stdout().lock());
    let bytes = encrypt(settings, io::stdin().lock(), output)?;
    debug!(bytes, "Encryption finished");
    Ok(())
}

/// Decrypt stdin to stdout.
fn cmd_decrypt(settings: &Settings) -> Result<()> {
    info!("Decrypting stdin to stdout");
    let output = BufWriter::new(io::stdout().lock());
    let bytes = decrypt(settings, io::stdin().lock(), output)?;
    debug!(bytes, "Decryption finished");
    Ok(())
}

/// Wipe a file after confirmation.
fn cmd_wipe(path: &Path, settings: &Settings) -> Result<()> {
    info!("Wiping: {}", path.display());

    let eraser = Eraser::new(settings.passes);
    debug!(passes = eraser.passes(), "Overwrite passes");
    let result = if settings.force_wipe {
        eraser.wipe(path, &mut ForcedConfirmation)
    } else {
        let mut prompt = PromptConfirmation::new(io::stdin().lock(), io::stderr());
        eraser.wipe(path, &mut prompt)
    };

    match result {
        Ok(report) => {
            debug!(passes = report.passes, bytes = report.bytes, "Wipe finished");
            Ok(())
        }
        Err(Error::Cancelled) => Err(Error::Cancelled.into()),
        Err(e) => Err(e).with_context(|| format!("Failed to wipe {}", path.display())),
    }
}
