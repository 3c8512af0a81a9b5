//! A subprocess spawner wrapping `std::process::Command` (spec.md §1, §6).
//!
//! Grounded on the teacher's `harness/src/util.rs` (`get_child`/
//! `handle_child`: spawn, describe failures with the command's purpose,
//! then wait for an exit status). We add a timeout, since `traceroute`
//! needs to bound how long it waits on a child hop probe.

use crate::error::{Error, Result};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

/// Spawn `command`, capturing stdout/stderr, and wait up to `timeout` for
/// it to exit. On timeout the child is killed and an error returned.
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<Output> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = command
        .spawn()
        .map_err(|e| Error::Subprocess(format!("failed to spawn: {e}")))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_status)) => {
                return child
                    .wait_with_output()
                    .map_err(|e| Error::Subprocess(format!("failed to collect output: {e}")));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::Subprocess("timed out".to_owned()));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => {
                return Err(Error::Subprocess(format!("failed to poll child: {e}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let mut cmd = Command::new("echo");
        cmd.arg("hello");
        let output = run_with_timeout(cmd, Duration::from_secs(2)).unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[test]
    fn kills_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let result = run_with_timeout(cmd, Duration::from_millis(50));
        assert!(result.is_err());
    }
}
