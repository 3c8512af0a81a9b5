//! File read/write helpers (spec.md §1).
//!
//! Non-goals exclude a persistence/durability layer for `store` itself, but
//! the library still needs to read its own config file and write things
//! like PID files, the way the teacher's `config::cfgfile` does — these are
//! the thin helpers that back that, kept separate from `store`/`event` so
//! neither core module touches `std::fs` directly.

use crate::error::Result;
use std::fs;
use std::path::Path;

/// Read an entire file to a `String`, wrapping the I/O error in
/// [`crate::error::Error`].
pub fn read_to_string(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}

/// Write `contents` to `path`, creating the file if it doesn't exist and
/// truncating it if it does.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
