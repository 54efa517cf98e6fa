//! Errors from loading client settings and credentials

use std::path::PathBuf;

use thiserror::Error;

/// Failure to assemble a usable client configuration.
///
/// `Config` carries a validation message meant for the operator; the other
/// variants wrap the underlying read or parse failure.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("failed to read secret file {}: {source}", path.display())]
    SecretFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
