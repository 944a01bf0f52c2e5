//! Platform probes for the OS socket table.
//!
//! Each backend answers one question: which TCP sockets are currently in the
//! listening state, and which PID owns each of them. Probes return raw
//! records straight off the OS tables; deduplication, classification, and
//! ordering happen in [`crate::catalog`].

use thiserror::Error;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(unix)]
pub(crate) mod ps;

#[cfg(target_os = "windows")]
mod windows;

/// One raw row from the OS socket table, before cataloging.
///
/// `process_name` and `command` are best effort: the owning process can exit
/// between the socket-table read and the name lookup, in which case they come
/// back empty rather than failing the scan. Rows whose PID cannot be
/// determined at all are skipped by the probes (nothing can be done with
/// them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSocketRecord {
    /// Local TCP port.
    pub port: u16,

    /// Owning process ID.
    pub pid: u32,

    /// Local bind address as reported by the OS (e.g., "127.0.0.1", "*").
    pub address: String,

    /// Short process name. May be empty if unresolved.
    pub process_name: String,

    /// Full command line, when the OS table affords it cheaply. `None` means
    /// the catalog builder should attempt a secondary lookup by PID.
    pub command: Option<String>,
}

/// Errors from probing the OS socket table.
///
/// A `ProbeError` is total: it means the table could not be read at all. A
/// partially readable table is never silently truncated into an `Ok`.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Failed to execute the underlying query command.
    #[error("Failed to execute probe command: {0}")]
    CommandFailed(String),

    /// Failed to parse query output.
    #[error("Failed to parse probe output: {0}")]
    ParseError(String),

    /// The OS refused access to the socket table.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error while running the query.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No probing strategy is available on this host.
    #[error("No usable socket probe on this platform: {0}")]
    Unavailable(String),
}

/// Trait for platform-specific socket probes.
pub trait SocketProbe: Send + Sync {
    /// Enumerate all listening TCP sockets.
    ///
    /// Returns one record per socket-table row that carries a PID. Ordering
    /// is unspecified; duplicates across address families are expected and
    /// resolved downstream.
    fn scan_listening_sockets(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<RawSocketRecord>, ProbeError>> + Send;
}

/// The socket probe for the current platform.
///
/// Capability detection happens once in [`PlatformProbe::detect`]; the chosen
/// strategy is immutable afterwards and safe to share across concurrent
/// scans. Every scan is a fresh snapshot: no state is carried between calls.
pub struct PlatformProbe {
    #[cfg(target_os = "linux")]
    inner: linux::LinuxProbe,

    #[cfg(target_os = "macos")]
    inner: macos::MacosProbe,

    #[cfg(target_os = "windows")]
    inner: windows::WindowsProbe,
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
impl PlatformProbe {
    /// Detect a usable probing strategy for this host.
    ///
    /// Fails with [`ProbeError::Unavailable`] when none of the query tools
    /// the platform backend relies on can be found. Detection is cheap and
    /// has no side effects beyond filesystem lookups.
    pub fn detect() -> Result<Self, ProbeError> {
        Ok(Self {
            #[cfg(target_os = "linux")]
            inner: linux::LinuxProbe::detect()?,

            #[cfg(target_os = "macos")]
            inner: macos::MacosProbe::detect()?,

            #[cfg(target_os = "windows")]
            inner: windows::WindowsProbe::detect()?,
        })
    }
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
impl SocketProbe for PlatformProbe {
    async fn scan_listening_sockets(&self) -> Result<Vec<RawSocketRecord>, ProbeError> {
        self.inner.scan_listening_sockets().await
    }
}

// Stub so the crate still compiles on platforms without a backend; every
// scan fails with Unavailable.
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
impl PlatformProbe {
    pub fn detect() -> Result<Self, ProbeError> {
        Err(ProbeError::Unavailable(
            "unsupported operating system".to_string(),
        ))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
impl SocketProbe for PlatformProbe {
    async fn scan_listening_sockets(&self) -> Result<Vec<RawSocketRecord>, ProbeError> {
        Err(ProbeError::Unavailable(
            "unsupported operating system".to_string(),
        ))
    }
}

/// Locate `name` among candidate directories, returning the first hit.
///
/// Used by the platform backends for capability detection without spawning
/// anything.
#[cfg(unix)]
pub(crate) fn find_tool(name: &str, dirs: &[&str]) -> Option<std::path::PathBuf> {
    for dir in dirs {
        let candidate = std::path::Path::new(dir).join(name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Split an `address:port` string into `(address, port)`.
///
/// Handles the formats every backend emits:
/// - IPv4: `127.0.0.1:3000`, `*:8080`, `0.0.0.0:443`
/// - IPv6: `[::1]:3000`, `[fe80::1]:8080`, `[::ffff:127.0.0.1]:80`
pub(crate) fn split_address_port(address: &str) -> Option<(String, u16)> {
    if address.starts_with('[') {
        let bracket_end = address.find(']')?;
        let after_bracket = &address[bracket_end + 1..];
        if !after_bracket.starts_with(':') {
            return None;
        }

        let addr = address[..=bracket_end].to_string();
        let port: u16 = after_bracket[1..].parse().ok()?;
        Some((addr, port))
    } else {
        // Find the last colon so IPv6-ish addresses without brackets (ss
        // emits `::ffff:127.0.0.1:80`) still split on the port.
        let last_colon = address.rfind(':')?;
        let addr = &address[..last_colon];
        let port: u16 = address[last_colon + 1..].parse().ok()?;

        let addr = if addr.is_empty() || addr == "0.0.0.0" {
            "*"
        } else {
            addr
        };
        Some((addr.to_string(), port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_address_port_ipv4() {
        assert_eq!(
            split_address_port("127.0.0.1:3000"),
            Some(("127.0.0.1".to_string(), 3000))
        );
        assert_eq!(split_address_port("*:8080"), Some(("*".to_string(), 8080)));
        assert_eq!(
            split_address_port("0.0.0.0:443"),
            Some(("*".to_string(), 443))
        );
    }

    #[test]
    fn test_split_address_port_ipv6() {
        assert_eq!(
            split_address_port("[::1]:3000"),
            Some(("[::1]".to_string(), 3000))
        );
        assert_eq!(
            split_address_port("[fe80::1]:8080"),
            Some(("[fe80::1]".to_string(), 8080))
        );
        assert_eq!(split_address_port("[::]:80"), Some(("[::]".to_string(), 80)));
        assert_eq!(
            split_address_port("::ffff:127.0.0.1:80"),
            Some(("::ffff:127.0.0.1".to_string(), 80))
        );
    }

    #[test]
    fn test_split_address_port_invalid() {
        assert_eq!(split_address_port("invalid"), None);
        assert_eq!(split_address_port("no:port:here"), None);
        assert_eq!(split_address_port("[::1]"), None);
        assert_eq!(split_address_port("[::1]3000"), None);
    }
}
