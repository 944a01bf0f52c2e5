//! macOS socket probe.
//!
//! Uses `lsof` for the socket table and joins `ps` for full command lines.

use super::{find_tool, ps, split_address_port, ProbeError, RawSocketRecord, SocketProbe};
use std::collections::HashMap;
use tokio::process::Command;
use tracing::debug;

const LSOF_DIRS: &[&str] = &["/usr/sbin", "/usr/bin"];

/// macOS probe backed by `lsof -iTCP -sTCP:LISTEN`.
#[derive(Debug)]
pub(crate) struct MacosProbe {
    lsof: std::path::PathBuf,
}

impl MacosProbe {
    /// Locate `lsof`; fails when it is not installed.
    pub(crate) fn detect() -> Result<Self, ProbeError> {
        let lsof = find_tool("lsof", LSOF_DIRS)
            .ok_or_else(|| ProbeError::Unavailable("lsof not found".to_string()))?;
        Ok(Self { lsof })
    }

    /// Decode lsof's escaped process names.
    ///
    /// lsof escapes special characters as `\xNN` (e.g., `\x20` for space,
    /// `\x2f` for slash). Unparseable escapes pass through unchanged.
    fn decode_escaped(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '\\' {
                result.push(c);
                continue;
            }

            if chars.peek() != Some(&'x') {
                result.push(c);
                continue;
            }
            chars.next();

            let mut hex = String::with_capacity(2);
            for _ in 0..2 {
                match chars.peek() {
                    Some(&h) if h.is_ascii_hexdigit() => {
                        hex.push(h);
                        chars.next();
                    }
                    _ => break,
                }
            }

            match u8::from_str_radix(&hex, 16) {
                Ok(byte) if hex.len() == 2 => result.push(byte as char),
                _ => {
                    result.push('\\');
                    result.push('x');
                    result.push_str(&hex);
                }
            }
        }

        result
    }

    /// Parse `lsof` output rows into raw records.
    ///
    /// Expected format:
    /// ```text
    /// COMMAND    PID  USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME
    /// node     34805  code   19u  IPv6 0x3d8015e195af1f3f      0t0  TCP [::1]:3000 (LISTEN)
    /// ```
    fn parse_lsof_output(
        output: &str,
        commands: &HashMap<u32, String>,
    ) -> Vec<RawSocketRecord> {
        let mut records = Vec::new();

        // Skip header line.
        for line in output.lines().skip(1) {
            if line.is_empty() {
                continue;
            }

            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 9 {
                continue;
            }

            let process_name = Self::decode_escaped(columns[0]);

            let pid: u32 = match columns[1].parse() {
                Ok(p) => p,
                Err(_) => continue,
            };

            // The NAME column sits near the end, before "(LISTEN)". Search
            // backwards for a component with ":" that is not a device ID or
            // a size/offset.
            let address_part = columns[8..]
                .iter()
                .rev()
                .find(|col| col.contains(':') && !col.starts_with("0x") && !col.starts_with("0t"));

            let Some(address_str) = address_part else {
                continue;
            };

            let Some((address, port)) = split_address_port(address_str) else {
                continue;
            };

            records.push(RawSocketRecord {
                port,
                pid,
                address,
                process_name,
                command: commands.get(&pid).cloned(),
            });
        }

        records
    }
}

impl SocketProbe for MacosProbe {
    /// Scan all listening TCP sockets.
    ///
    /// Executes `lsof -iTCP -sTCP:LISTEN -P -n +c 0`:
    /// - `-iTCP`: TCP sockets only
    /// - `-sTCP:LISTEN`: listening state only, never established connections
    /// - `-P` / `-n`: numeric ports and addresses, no resolution
    /// - `+c 0`: unlimited command name length
    ///
    /// `ps` runs in parallel to supply full command lines.
    async fn scan_listening_sockets(&self) -> Result<Vec<RawSocketRecord>, ProbeError> {
        let lsof_future = Command::new(&self.lsof)
            .args(["-iTCP", "-sTCP:LISTEN", "-P", "-n", "+c", "0"])
            .output();

        let (lsof_result, commands) = tokio::join!(lsof_future, ps::command_table());

        let lsof_output = lsof_result?;

        // lsof exits 1 when nothing matched; that is an empty scan, not a
        // failure. Anything else with a diagnostic is a real error.
        if !lsof_output.status.success() && !lsof_output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&lsof_output.stderr);
            return Err(ProbeError::CommandFailed(format!(
                "lsof failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&lsof_output.stdout);
        if stdout.is_empty() {
            debug!("lsof reported no listening sockets");
            return Ok(Vec::new());
        }

        Ok(Self::parse_lsof_output(&stdout, &commands))
    }
}
