//! Client secrets and bearer tokens
//!
//! The client secret arrives from an env var or a file and ends up inside
//! the login request body; bearer tokens are cached for their lifetime.
//! Both pass through tracing fields and `Debug` output of config structs,
//! so formatting never shows the value and the buffer is wiped on drop.

use std::fmt;
use std::path::Path;

use zeroize::Zeroize;

use crate::error::{Error, Result};

const REDACTED: &str = "[REDACTED]";

pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// The raw value, for the one place that has to send it.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Trimmed text, or `None` when nothing but whitespace is left.
    pub fn from_trimmed(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
    }

    /// Read a secret file such as `api.secret_file`. A blank file is `None`.
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        let mut contents = std::fs::read_to_string(path).map_err(|source| Error::SecretFile {
            path: path.to_path_buf(),
            source,
        })?;
        let secret = Self::from_trimmed(&contents);
        contents.zeroize();
        Ok(secret)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
