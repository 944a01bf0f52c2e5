//! Port catalog builder.
//!
//! Turns raw socket-table records into the canonical [`PortInfo`] snapshot:
//! deduplicates rows that describe the same binding across address families,
//! resolves missing process fields, confirms liveness, classifies, and
//! orders the result deterministically.

use std::collections::HashSet;

use crate::models::{PortInfo, ProcessType};
use crate::probe::RawSocketRecord;

/// PIDs at or below this value belong to the OS (Windows System idle/System
/// are 0 and 4, Unix init is 1). An otherwise unclassified process in this
/// range is reported as `System`.
const RESERVED_PID_MAX: u32 = 4;

/// Best-effort process-table lookups the catalog builder needs.
///
/// Both methods degrade instead of failing: a vanished process yields `None`
/// or `false`, never an error. Implemented by the OS-backed resolver in the
/// crate root and by scripted fakes in tests.
pub trait ProcessResolver: Send + Sync {
    /// Look up the full command line of a process, if it still exists.
    fn command_of(&self, pid: u32) -> impl std::future::Future<Output = Option<String>> + Send;

    /// Check whether a process is currently alive.
    fn is_alive(&self, pid: u32) -> impl std::future::Future<Output = bool> + Send;
}

/// Derive a short display name from a command line.
///
/// Takes the first token and strips any path prefix. Used when the socket
/// table did not carry a name but the command could be resolved.
fn name_from_command(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .map(|token| {
            token
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(token)
                .to_string()
        })
        .unwrap_or_default()
}

/// Build the canonical catalog from raw probe records.
///
/// For each unique `(port, pid)` pair, in probe order:
/// 1. missing command lines get one secondary lookup by PID; failure
///    degrades the field to empty
/// 2. a missing name is derived from the command when possible
/// 3. liveness is re-confirmed so `is_active` closes the gap between the
///    socket-table snapshot and now
/// 4. the process is classified from `(name, command)`, with the
///    reserved-PID override applied to otherwise unclassified entries
///
/// Output is sorted by port ascending, then PID ascending. One port maps to
/// many entries when several processes share it; that is preserved, never
/// collapsed.
pub async fn build_catalog<R: ProcessResolver>(
    records: Vec<RawSocketRecord>,
    resolver: &R,
) -> Vec<PortInfo> {
    let mut seen: HashSet<(u16, u32)> = HashSet::new();
    let mut catalog = Vec::new();

    for record in records {
        if !seen.insert((record.port, record.pid)) {
            continue;
        }

        let command = match record.command {
            Some(command) if !command.is_empty() => command,
            _ => resolver.command_of(record.pid).await.unwrap_or_default(),
        };

        let process_name = if record.process_name.is_empty() {
            name_from_command(&command)
        } else {
            record.process_name
        };

        let mut process_type = ProcessType::classify(&process_name, &command);
        if process_type == ProcessType::Other && record.pid <= RESERVED_PID_MAX {
            process_type = ProcessType::System;
        }

        let is_active = resolver.is_alive(record.pid).await;

        catalog.push(PortInfo {
            port: record.port,
            pid: record.pid,
            process_name,
            command,
            address: record.address,
            process_type,
            is_active,
        });
    }

    catalog.sort_by(|a, b| a.port.cmp(&b.port).then(a.pid.cmp(&b.pid)));
    catalog
}
