//! Windows socket probe.
//!
//! Uses `netstat -ano` for the socket table and `tasklist /FO CSV` to
//! resolve PIDs to image names.

use super::{split_address_port, ProbeError, RawSocketRecord, SocketProbe};
use std::collections::HashMap;
use tokio::process::Command;

/// Windows probe backed by `netstat` and `tasklist`.
#[derive(Debug)]
pub(crate) struct WindowsProbe;

impl WindowsProbe {
    /// Both tools ship with every supported Windows version.
    pub(crate) fn detect() -> Result<Self, ProbeError> {
        Ok(Self)
    }

    /// Parse `netstat -ano` output into `(port, pid, address)` triples.
    ///
    /// Example output:
    /// ```text
    ///   Proto  Local Address          Foreign Address        State           PID
    ///   TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1020
    ///   TCP    [::]:445               [::]:0                 LISTENING       4
    /// ```
    fn parse_netstat_output(output: &str) -> Vec<(u16, u32, String)> {
        let mut rows = Vec::new();

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() || !line.starts_with("TCP") {
                continue;
            }

            // [Proto] [Local Address] [Foreign Address] [State] [PID]
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 5 || parts[3] != "LISTENING" {
                continue;
            }

            let Some((address, port)) = split_address_port(parts[1]) else {
                continue;
            };

            let pid: u32 = match parts[4].parse() {
                Ok(p) => p,
                Err(_) => continue,
            };

            rows.push((port, pid, address));
        }

        rows
    }

    /// Parse `tasklist /FO CSV` output into a PID-to-image-name map.
    ///
    /// Example output:
    /// ```text
    /// "Image Name","PID","Session Name","Session#","Mem Usage"
    /// "node.exe","5432","Console","1","45,000 K"
    /// ```
    ///
    /// `.exe` suffixes are stripped for display consistency with the Unix
    /// backends.
    fn parse_tasklist_output(output: &str) -> HashMap<u32, String> {
        let mut map = HashMap::new();

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("\"Image Name\"") {
                continue;
            }

            let fields = Self::parse_csv_line(line);
            if fields.len() < 2 {
                continue;
            }

            let pid: u32 = match fields[1].parse() {
                Ok(p) => p,
                Err(_) => continue,
            };

            let name = fields[0]
                .strip_suffix(".exe")
                .unwrap_or(fields[0])
                .to_string();

            map.insert(pid, name);
        }

        map
    }

    /// Split a CSV line, honoring quoted fields.
    fn parse_csv_line(line: &str) -> Vec<&str> {
        let mut fields = Vec::new();
        let mut in_quotes = false;
        let mut field_start: Option<usize> = None;

        for (i, c) in line.char_indices() {
            match c {
                '"' => {
                    if in_quotes {
                        if let Some(start) = field_start {
                            fields.push(&line[start..i]);
                        }
                        field_start = None;
                        in_quotes = false;
                    } else {
                        in_quotes = true;
                        field_start = Some(i + 1);
                    }
                }
                ',' => {
                    if !in_quotes {
                        if let Some(start) = field_start {
                            fields.push(&line[start..i]);
                            field_start = None;
                        }
                    }
                }
                _ => {
                    if field_start.is_none() && !in_quotes {
                        field_start = Some(i);
                    }
                }
            }
        }

        if let Some(start) = field_start {
            if !in_quotes {
                fields.push(&line[start..]);
            }
        }

        fields
    }

    async fn run_netstat() -> Result<String, ProbeError> {
        let output = Command::new("netstat")
            .args(["-ano"])
            .output()
            .await
            .map_err(|e| ProbeError::CommandFailed(format!("netstat -ano: {}", e)))?;

        if !output.status.success() {
            return Err(ProbeError::CommandFailed(format!(
                "netstat -ano failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn run_tasklist() -> Result<String, ProbeError> {
        let output = Command::new("tasklist")
            .args(["/FO", "CSV"])
            .output()
            .await
            .map_err(|e| ProbeError::CommandFailed(format!("tasklist /FO CSV: {}", e)))?;

        if !output.status.success() {
            return Err(ProbeError::CommandFailed(format!(
                "tasklist /FO CSV failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl SocketProbe for WindowsProbe {
    async fn scan_listening_sockets(&self) -> Result<Vec<RawSocketRecord>, ProbeError> {
        let (netstat_result, tasklist_result) =
            tokio::join!(Self::run_netstat(), Self::run_tasklist());

        let rows = Self::parse_netstat_output(&netstat_result?);

        // A failed name lookup degrades every name to empty, it does not
        // fail the scan; the socket table alone is still actionable.
        let names = match tasklist_result {
            Ok(output) => Self::parse_tasklist_output(&output),
            Err(_) => HashMap::new(),
        };

        let records = rows
            .into_iter()
            .map(|(port, pid, address)| RawSocketRecord {
                port,
                pid,
                address,
                process_name: names.get(&pid).cloned().unwrap_or_default(),
                // Full command lines are not cheaply available on Windows.
                command: None,
            })
            .collect();

        Ok(records)
    }
}
