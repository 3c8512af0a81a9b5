//! Crate-wide error types.
//!
//! Operations on the core data structures (`store`, `event`) never return
//! this type — per the error taxonomy in spec.md §7, invalid argument,
//! duplicate, and not-found outcomes on those types are reportable booleans,
//! not errors. `Error` is reserved for the ambient, boundary-facing modules:
//! config loading, file/path helpers, subprocess spawning, and DNS
//! resolution.

use std::fmt;
use std::io;

/// The catch-all error type for the ambient (non-core) parts of this crate.
#[derive(Debug)]
pub enum Error {
    /// An I/O operation failed.
    Io(io::Error),
    /// A configuration file was syntactically invalid.
    ConfigSyntax(toml::de::Error),
    /// A configuration file was syntactically valid but had an
    /// out-of-range or otherwise unusable value.
    ConfigValue(&'static str),
    /// A subprocess exited with a non-zero status or could not be spawned.
    Subprocess(String),
    /// A DNS lookup produced no usable addresses.
    Resolution(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {e}"),
            Error::ConfigSyntax(e) => write!(f, "syntax error in configuration: {e}"),
            Error::ConfigValue(msg) => write!(f, "invalid configuration value: {msg}"),
            Error::Subprocess(msg) => write!(f, "subprocess error: {msg}"),
            Error::Resolution(msg) => write!(f, "resolution error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::ConfigSyntax(e)
    }
}

/// A generic result alias for the ambient modules.
pub type Result<T> = std::result::Result<T, Error>;
