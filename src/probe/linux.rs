//! Linux socket probe.
//!
//! Prefers `ss` and falls back to `netstat` when `ss` is not installed. The
//! choice is made once at detection time and cached for the life of the
//! instance.

use super::{find_tool, ps, split_address_port, ProbeError, RawSocketRecord, SocketProbe};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::debug;

const TOOL_DIRS: &[&str] = &["/usr/sbin", "/usr/bin", "/sbin", "/bin"];

/// Matches the ss process column: `users:(("name",pid=1234,fd=5))`.
fn ss_process_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"users:\(\("(.+?)",pid=(\d+),fd="#).unwrap())
}

/// Matches the netstat PID/Program column: `1234/node`.
fn netstat_process_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)/(.*)$").unwrap())
}

/// Which socket-table query tool this host affords.
#[derive(Debug, Clone)]
enum Strategy {
    Ss(PathBuf),
    Netstat(PathBuf),
}

/// Linux probe backed by `ss -Htlnp` or `netstat -tlnp`.
#[derive(Debug)]
pub(crate) struct LinuxProbe {
    strategy: Strategy,
}

impl LinuxProbe {
    /// Pick a strategy; fails when neither `ss` nor `netstat` is installed.
    pub(crate) fn detect() -> Result<Self, ProbeError> {
        if let Some(ss) = find_tool("ss", TOOL_DIRS) {
            return Ok(Self {
                strategy: Strategy::Ss(ss),
            });
        }
        if let Some(netstat) = find_tool("netstat", TOOL_DIRS) {
            debug!("ss not found, falling back to netstat");
            return Ok(Self {
                strategy: Strategy::Netstat(netstat),
            });
        }
        Err(ProbeError::Unavailable(
            "neither ss nor netstat found".to_string(),
        ))
    }

    /// Parse `ss -Htlnp` rows into raw records.
    ///
    /// Expected format (no header with -H):
    /// ```text
    /// LISTEN 0 4096 127.0.0.1:3000 0.0.0.0:* users:(("node",pid=53561,fd=18))
    /// ```
    ///
    /// Rows without a process column (sockets owned by other users when
    /// running unprivileged) carry no PID and are skipped.
    fn parse_ss_output(output: &str, commands: &HashMap<u32, String>) -> Vec<RawSocketRecord> {
        let mut records = Vec::new();

        for line in output.lines() {
            if line.is_empty() {
                continue;
            }

            // [State] [Recv-Q] [Send-Q] [Local Address:Port] [Peer Address:Port] [Process]
            let components: Vec<&str> = line.split_whitespace().collect();
            if components.len() < 6 {
                continue;
            }

            let Some(caps) = ss_process_regex().captures(components[5]) else {
                continue;
            };

            let process_name = caps[1].to_string();
            let pid: u32 = match caps[2].parse() {
                Ok(p) => p,
                Err(_) => continue,
            };

            let Some((address, port)) = split_address_port(components[3]) else {
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

    /// Parse `netstat -tlnp` rows into raw records.
    ///
    /// Expected format:
    /// ```text
    /// tcp   0   0 127.0.0.1:3000   0.0.0.0:*   LISTEN   1234/node
    /// ```
    ///
    /// The PID/Program column shows `-` for sockets the caller may not
    /// inspect; those rows are skipped.
    fn parse_netstat_output(output: &str, commands: &HashMap<u32, String>) -> Vec<RawSocketRecord> {
        let mut records = Vec::new();

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() || !line.starts_with("tcp") {
                continue;
            }

            // [Proto] [Recv-Q] [Send-Q] [Local Address] [Foreign Address] [State] [PID/Program]
            let components: Vec<&str> = line.split_whitespace().collect();
            if components.len() < 7 || components[5] != "LISTEN" {
                continue;
            }

            let Some(caps) = netstat_process_regex().captures(components[6]) else {
                continue;
            };

            let pid: u32 = match caps[1].parse() {
                Ok(p) => p,
                Err(_) => continue,
            };
            let process_name = caps[2].to_string();

            let Some((address, port)) = split_address_port(components[3]) else {
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

    async fn run_table_query(&self) -> Result<std::process::Output, ProbeError> {
        let (path, args): (&PathBuf, &[&str]) = match &self.strategy {
            // -H no header, -t TCP only, -l listening only, -n numeric,
            // -p show owning process
            Strategy::Ss(path) => (path, &["-Htlnp"]),
            Strategy::Netstat(path) => (path, &["-tlnp"]),
        };

        Command::new(path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ProbeError::CommandFailed(format!("{}: {}", path.display(), e)))
    }
}

impl SocketProbe for LinuxProbe {
    async fn scan_listening_sockets(&self) -> Result<Vec<RawSocketRecord>, ProbeError> {
        let (query_result, commands) = tokio::join!(self.run_table_query(), ps::command_table());
        let output = query_result?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Operation not permitted") || stderr.contains("Permission denied") {
                return Err(ProbeError::PermissionDenied(stderr.trim().to_string()));
            }
            return Err(ProbeError::CommandFailed(format!(
                "socket table query failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| ProbeError::ParseError(format!("invalid UTF-8 in output: {}", e)))?;

        let records = match &self.strategy {
            Strategy::Ss(_) => Self::parse_ss_output(&stdout, &commands),
            Strategy::Netstat(_) => Self::parse_netstat_output(&stdout, &commands),
        };

        Ok(records)
    }
}
