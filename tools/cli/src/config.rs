//! Runtime settings taken from the environment.
//!
//! There is no configuration file. Chunk size and pass count are fixed
//! policy; only the secret and the wipe override come from the environment.

use std::env;
use std::ffi::OsString;

use chap_common::{Error, Result, Secret};
use chap_crypto::DEFAULT_CHUNK_SIZE;
use chap_wipe::DEFAULT_PASSES;

/// Environment variable holding the secret for `e` and `d`.
pub const KEY_ENV: &str = "CKEY";

/// Environment variable that skips the wipe prompt when set to `true`.
pub const FORCE_WIPE_ENV: &str = "FORCE_WIPE";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Name of the variable the secret is read from.
    pub key_env: String,
    /// Plaintext bytes per sealed chunk.
    pub chunk_size: usize,
    /// Overwrite passes per wipe.
    pub passes: u32,
    /// Skip the interactive wipe confirmation.
    pub force_wipe: bool,
}

impl Settings {
    /// Settings for this process.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var_os(name))
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let force_wipe = lookup(FORCE_WIPE_ENV)
            .map(|value| value.to_str() == Some("true"))
            .unwrap_or(false);

        Self {
            key_env: KEY_ENV.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            passes: DEFAULT_PASSES,
            force_wipe,
        }
    }

    /// Read the secret and remove it from this process's environment.
    ///
    /// # Errors
    /// - `MissingSecret` if the variable is unset or empty
    pub fn take_secret(&self) -> Result<Secret> {
        let value = env::var_os(&self.key_env).ok_or(Error::MissingSecret)?;
        // The environment block the process started with keeps its copy.
        env::remove_var(&self.key_env);

        let secret = Secret::new(value.into_encoded_bytes());
        if secret.is_empty() {
            return Err(Error::MissingSecret);
        }
        Ok(secret)
    }
}
