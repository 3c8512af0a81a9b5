//! Logging initialization (spec.md §1).
//!
//! Grounded on the teacher's `server/src/main.rs`, which builds an
//! `env_logger::Builder` from an env-var-supplied filter string, defaulting
//! to `info` when unset. We use `COREVAULT_LOG` in place of the teacher's
//! `SKY_LOG` name.

use env_logger::Builder;
use std::env;

const LOG_ENV_VAR: &str = "COREVAULT_LOG";
const DEFAULT_FILTER: &str = "info";

/// Initialize the global logger. Safe to call more than once per process;
/// only the first call has any effect (later calls are no-ops, matching
/// `env_logger`'s own `try_init` semantics).
pub fn init() {
    let filter = env::var(LOG_ENV_VAR).unwrap_or_else(|_| DEFAULT_FILTER.to_owned());
    let _ = Builder::new().parse_filters(&filter).try_init();
}
