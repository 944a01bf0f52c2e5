//! Shared `ps` helpers for the Unix probes.
//!
//! Both the macOS and Linux backends join the socket table against the
//! process table in one pass; the catalog builder falls back to the per-PID
//! lookup for rows the join missed.

use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Longest command line kept before truncation.
const MAX_COMMAND_LEN: usize = 200;

fn truncate_command(full: &str) -> String {
    if full.chars().count() > MAX_COMMAND_LEN {
        let head: String = full.chars().take(MAX_COMMAND_LEN).collect();
        format!("{}...", head)
    } else {
        full.to_string()
    }
}

/// Get the full command line for every process on the host.
///
/// Executes `ps -axo pid,args` and returns a PID-to-command map. Failure
/// degrades to an empty map: a missing command line never fails a scan.
pub(crate) async fn command_table() -> HashMap<u32, String> {
    let output = match Command::new("/bin/ps")
        .args(["-axo", "pid,args"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            debug!(error = %e, "ps table lookup failed");
            return HashMap::new();
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut commands = HashMap::new();

    // Skip the PID/ARGS header line.
    for line in stdout.lines().skip(1) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        // "PID COMMAND": the PID is left-padded, then the command follows.
        let mut parts = trimmed.splitn(2, ' ');
        let pid: u32 = match parts.next().and_then(|p| p.trim().parse().ok()) {
            Some(p) => p,
            None => continue,
        };
        let command = match parts.next() {
            Some(c) => truncate_command(c.trim()),
            None => continue,
        };

        commands.insert(pid, command);
    }

    commands
}

/// Look up the command line of a single process.
///
/// Executes `ps -p <pid> -o args=`. Returns `None` when the process is gone
/// or the lookup fails; the caller degrades the field to empty.
pub(crate) async fn command_of(pid: u32) -> Option<String> {
    let output = Command::new("/bin/ps")
        .args(["-p", &pid.to_string(), "-o", "args="])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let command = stdout.trim();
    if command.is_empty() {
        None
    } else {
        Some(truncate_command(command))
    }
}
