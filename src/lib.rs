//! Portsweep - discover listening TCP ports and free them.
//!
//! This library answers two questions for the local host: "what is
//! listening on my ports?" and "free this port". It provides:
//! - Scanning all listening TCP sockets with owning process details
//! - Terminating processes by PID, gracefully or forcefully
//! - Freeing a port by terminating every active listener bound to it
//!
//! # Architecture
//! - [`probe`]: per-OS socket-table adapters behind one contract
//! - [`catalog`]: deduplication, field resolution, and classification into
//!   the canonical [`PortInfo`] snapshot
//! - [`terminator`]: graceful-then-forceful termination primitives
//! - [`orchestrator`]: batched "free this port" composition
//!
//! Every scan is a fresh snapshot; the only process-wide state is the
//! probing strategy detected once at instance creation, immutable
//! afterwards, so a single [`PortSweep`] is safe to share across
//! concurrent calls.
//!
//! # Platform Support
//! - macOS: `lsof` and `ps`
//! - Linux: `ss` (or `netstat`) and `ps`
//! - Windows: `netstat`, `tasklist`, and `taskkill`
//!
//! # Example
//! ```no_run
//! use portsweep::PortSweep;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sweep = PortSweep::new()?;
//! for port in sweep.scan().await? {
//!     println!("{} [{}]", port, port.process_type);
//! }
//! let report = sweep.kill_all_on_port(3000).await?;
//! if report.succeeded() {
//!     println!("port 3000 is free");
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod models;
pub mod orchestrator;
pub mod probe;
pub mod terminator;

// Re-export the primary API surface.
pub use catalog::{build_catalog, ProcessResolver};
pub use models::{PortInfo, ProcessType};
pub use orchestrator::{PidOutcome, PortKillReport, BULK_KILL_TIMEOUT_MS};
pub use probe::{PlatformProbe, ProbeError, RawSocketRecord, SocketProbe};
pub use terminator::{
    KillError, KillMode, KillOutcome, ProcessTerminator, GRACEFUL_KILL_TIMEOUT_MS,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// OS-backed resolver for the catalog builder's secondary lookups.
///
/// Command lines come from the process table (`ps` on Unix; not cheaply
/// available on Windows, where lookups return `None`); liveness checks are
/// delegated to the platform terminator so both subsystems agree on what
/// "running" means.
#[derive(Debug, Default)]
pub struct SystemResolver {
    terminator: terminator::PlatformTerminator,
}

impl SystemResolver {
    pub fn new() -> Self {
        Self {
            terminator: terminator::PlatformTerminator::new(),
        }
    }
}

impl ProcessResolver for SystemResolver {
    async fn command_of(&self, pid: u32) -> Option<String> {
        #[cfg(unix)]
        {
            probe::ps::command_of(pid).await
        }
        #[cfg(not(unix))]
        {
            let _ = pid;
            None
        }
    }

    async fn is_alive(&self, pid: u32) -> bool {
        self.terminator.is_running(pid).await
    }
}

/// Main entry point: a scan-and-terminate instance for the local host.
///
/// Creation runs capability detection and fails when no socket-probing
/// strategy is available on the host. The instance holds no per-scan
/// state; every call produces or acts on a fresh snapshot.
pub struct PortSweep {
    probe: PlatformProbe,
    resolver: SystemResolver,
    terminator: terminator::PlatformTerminator,
}

impl PortSweep {
    /// Create a new instance.
    ///
    /// Fails with [`ProbeError::Unavailable`] when the OS socket table
    /// cannot be queried on this host at all.
    pub fn new() -> Result<Self, ProbeError> {
        Ok(Self {
            probe: PlatformProbe::detect()?,
            resolver: SystemResolver::new(),
            terminator: terminator::PlatformTerminator::new(),
        })
    }

    /// Scan all listening TCP ports.
    ///
    /// Returns a snapshot ordered by port, then PID. `(port, pid)` is
    /// unique within it; a port bound by several processes yields one entry
    /// per process.
    pub async fn scan(&self) -> Result<Vec<PortInfo>, ProbeError> {
        let records = self.probe.scan_listening_sockets().await?;
        Ok(build_catalog(records, &self.resolver).await)
    }

    /// Get the PIDs of all processes listening on a specific port.
    ///
    /// Duplicate-free by construction. An empty result means the port has
    /// no listeners; that is not an error.
    pub async fn list_pids_on_port(&self, port: u16) -> Result<Vec<u32>, ProbeError> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .filter(|entry| entry.port == port)
            .map(|entry| entry.pid)
            .collect())
    }

    /// Terminate a process gracefully (cooperative stop, 500 ms grace,
    /// then forced kill).
    pub async fn terminate_graceful(&self, pid: u32) -> Result<KillOutcome, KillError> {
        terminator::terminate(&self.terminator, pid, KillMode::Graceful).await
    }

    /// Terminate a process immediately (forced kill).
    pub async fn terminate_force(&self, pid: u32) -> Result<KillOutcome, KillError> {
        terminator::terminate(&self.terminator, pid, KillMode::Force).await
    }

    /// Free a port: terminate every active listener bound to it.
    ///
    /// All cooperative stop requests are sent before one shared 300 ms
    /// wait; survivors are force-killed. The report records one outcome per
    /// PID; [`PortKillReport::no_listeners`] distinguishes the
    /// success-shaped no-op from a failed kill.
    pub async fn kill_all_on_port(&self, port: u16) -> Result<PortKillReport, ProbeError> {
        let catalog = self.scan().await?;
        Ok(orchestrator::kill_all_on_port(&self.terminator, &catalog, port).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[tokio::test]
    async fn test_instance_scan() {
        // Hosts without any probing tool fail creation; nothing to assert.
        let Ok(sweep) = PortSweep::new() else { return };
        let snapshot = sweep.scan().await.expect("scan");

        // (port, pid) unique within one snapshot; ordering is stable.
        let mut seen = HashSet::new();
        let mut last = None;
        for entry in &snapshot {
            assert!(seen.insert((entry.port, entry.pid)));
            if let Some(prev) = last {
                assert!((entry.port, entry.pid) > prev);
            }
            last = Some((entry.port, entry.pid));
        }
    }

    #[tokio::test]
    async fn test_list_pids_matches_scan() {
        let Ok(sweep) = PortSweep::new() else { return };
        let snapshot = sweep.scan().await.expect("scan");

        if let Some(entry) = snapshot.first() {
            let pids = sweep.list_pids_on_port(entry.port).await.expect("lookup");
            assert!(pids.contains(&entry.pid));
        }
    }

    #[tokio::test]
    async fn test_concurrent_scans_share_one_instance() {
        let Ok(sweep) = PortSweep::new().map(std::sync::Arc::new) else {
            return;
        };
        let a = tokio::spawn({
            let sweep = sweep.clone();
            async move { sweep.scan().await }
        });
        let b = tokio::spawn({
            let sweep = sweep.clone();
            async move { sweep.scan().await }
        });

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_system_resolver_current_process() {
        let resolver = SystemResolver::new();
        assert!(resolver.is_alive(std::process::id()).await);
        assert!(!resolver.is_alive(999_999_999).await);
    }
}
