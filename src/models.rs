//! Core data models for portsweep.
//!
//! These models are platform-agnostic and shared by every probe backend.

use serde::{Deserialize, Serialize};

/// One listening TCP socket bound to one process, observed at scan time.
///
/// A `PortInfo` collection is a snapshot: PIDs may be reused by the OS the
/// moment it is returned, so callers must act on it promptly and never cache
/// it across decisions. Several entries may share a `port` when multiple
/// processes legitimately bind it; `(port, pid)` is unique within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// The local TCP port number.
    pub port: u16,

    /// Process ID of the owning process at scan time.
    pub pid: u32,

    /// Short process name (e.g., "node", "postgres"). Empty if unresolved.
    pub process_name: String,

    /// Full command line. Empty if unresolved.
    pub command: String,

    /// Local bind address (e.g., "127.0.0.1", "*", "[::1]").
    pub address: String,

    /// Categorized process type.
    pub process_type: ProcessType,

    /// Whether the owning process was confirmed alive at catalog time.
    /// `false` marks a stale socket-table entry that is informational only.
    pub is_active: bool,
}

impl PortInfo {
    /// Create a new `PortInfo`, classifying the process from its name and
    /// command line.
    pub fn new(
        port: u16,
        pid: u32,
        process_name: String,
        command: String,
        address: String,
    ) -> Self {
        let process_type = ProcessType::classify(&process_name, &command);
        Self {
            port,
            pid,
            process_name,
            command,
            address,
            process_type,
            is_active: true,
        }
    }
}

impl std::fmt::Display for PortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} (PID: {}, Process: {})",
            self.address, self.port, self.pid, self.process_name
        )
    }
}

/// Categorization of process types for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum ProcessType {
    /// Web servers: nginx, apache, caddy, etc.
    WebServer = 0,
    /// Databases: postgres, mysql, redis, mongo, etc.
    Database = 1,
    /// Development tools: node, python, cargo, vite, etc.
    Development = 2,
    /// OS-critical processes: launchd, systemd, svchost, etc.
    System = 3,
    /// Everything else.
    #[default]
    Other = 4,
}

/// Ordered classification rules, most specific category first.
///
/// Order matters: a dev server whose command line mentions a generic system
/// word must match its own category before the `System` needles are tried.
/// New classifications are additive rows, not new branching.
const CLASSIFICATION_RULES: &[(ProcessType, &[&str])] = &[
    (
        ProcessType::WebServer,
        &[
            "nginx", "apache", "httpd", "caddy", "traefik", "lighttpd", "haproxy", "envoy",
        ],
    ),
    (
        ProcessType::Database,
        &[
            "postgres",
            "mysql",
            "mariadb",
            "redis",
            "mongo",
            "sqlite",
            "cockroach",
            "clickhouse",
            "cassandra",
            "elasticsearch",
            "memcached",
        ],
    ),
    (
        ProcessType::Development,
        &[
            "node", "npm", "yarn", "pnpm", "bun", "deno", "python", "ruby", "php", "java",
            "kotlin", "cargo", "rustc", "swift", "dotnet", "vite", "webpack", "esbuild", "next",
            "nuxt", "remix", "astro", "turbo", "parcel", "expo", "flutter",
        ],
    ),
    (
        ProcessType::System,
        &[
            "launchd",
            "rapportd",
            "sharingd",
            "airplay",
            "kernel",
            "mds",
            "spotlight",
            "coreaudio",
            "windowserver",
            "systemd",
            "init",
            "dbus",
            "udev",
            "svchost",
            "lsass",
            "csrss",
            "wininit",
            "smss",
        ],
    ),
];

impl ProcessType {
    /// All process types, in discriminant order.
    pub const ALL: [ProcessType; 5] = [
        ProcessType::WebServer,
        ProcessType::Database,
        ProcessType::Development,
        ProcessType::System,
        ProcessType::Other,
    ];

    /// Classify a process from its name and command line.
    ///
    /// Pure and deterministic: the same `(process_name, command)` always
    /// yields the same type. Matching is case-insensitive substring search
    /// against [`CLASSIFICATION_RULES`], first matching row wins.
    ///
    /// # Examples
    /// ```
    /// use portsweep::ProcessType;
    ///
    /// assert_eq!(ProcessType::classify("nginx", ""), ProcessType::WebServer);
    /// assert_eq!(ProcessType::classify("postgres", ""), ProcessType::Database);
    /// assert_eq!(ProcessType::classify("node", "node server.js"), ProcessType::Development);
    /// assert_eq!(ProcessType::classify("unknown", ""), ProcessType::Other);
    /// ```
    pub fn classify(process_name: &str, command: &str) -> Self {
        let name_lower = process_name.to_lowercase();
        let cmd_lower = command.to_lowercase();

        for (process_type, needles) in CLASSIFICATION_RULES {
            if needles
                .iter()
                .any(|n| name_lower.contains(n) || cmd_lower.contains(n))
            {
                return *process_type;
            }
        }

        ProcessType::Other
    }

    /// Get the display name for this process type.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProcessType::WebServer => "Web Server",
            ProcessType::Database => "Database",
            ProcessType::Development => "Development",
            ProcessType::System => "System",
            ProcessType::Other => "Other",
        }
    }
}

impl std::fmt::Display for ProcessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl From<u8> for ProcessType {
    fn from(value: u8) -> Self {
        match value {
            0 => ProcessType::WebServer,
            1 => ProcessType::Database,
            2 => ProcessType::Development,
            3 => ProcessType::System,
            _ => ProcessType::Other,
        }
    }
}

impl From<ProcessType> for u8 {
    fn from(value: ProcessType) -> Self {
        value as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_web_servers() {
        assert_eq!(ProcessType::classify("nginx", ""), ProcessType::WebServer);
        assert_eq!(ProcessType::classify("apache2", ""), ProcessType::WebServer);
        assert_eq!(ProcessType::classify("caddy", ""), ProcessType::WebServer);
        assert_eq!(
            ProcessType::classify("main", "/usr/bin/haproxy -f /etc/haproxy.cfg"),
            ProcessType::WebServer
        );
    }

    #[test]
    fn test_classify_databases() {
        assert_eq!(ProcessType::classify("postgres", ""), ProcessType::Database);
        assert_eq!(ProcessType::classify("mysqld", ""), ProcessType::Database);
        assert_eq!(
            ProcessType::classify("redis-server", ""),
            ProcessType::Database
        );
    }

    #[test]
    fn test_classify_development() {
        assert_eq!(
            ProcessType::classify("node", "node server.js"),
            ProcessType::Development
        );
        assert_eq!(ProcessType::classify("python3", ""), ProcessType::Development);
        assert_eq!(ProcessType::classify("vite", ""), ProcessType::Development);
    }

    #[test]
    fn test_classify_system() {
        assert_eq!(ProcessType::classify("launchd", ""), ProcessType::System);
        assert_eq!(ProcessType::classify("systemd", ""), ProcessType::System);
        assert_eq!(ProcessType::classify("svchost", ""), ProcessType::System);
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(ProcessType::classify("unknown_app", ""), ProcessType::Other);
        assert_eq!(
            ProcessType::classify("my_custom_server", "some random process"),
            ProcessType::Other
        );
    }

    #[test]
    fn test_classify_case_insensitive() {
        assert_eq!(ProcessType::classify("NGINX", ""), ProcessType::WebServer);
        assert_eq!(
            ProcessType::classify("PostgreSQL", ""),
            ProcessType::Database
        );
    }

    #[test]
    fn test_rule_order_specific_before_system() {
        // A dev tool whose command line mentions a system word must keep its
        // own category: WebServer/Database/Development rows are tried first.
        assert_eq!(
            ProcessType::classify("node", "node /opt/init-dashboard/server.js"),
            ProcessType::Development
        );
        assert_eq!(
            ProcessType::classify("mongod", "/usr/bin/mongod"),
            ProcessType::Database
        );
    }

    #[test]
    fn test_classify_deterministic() {
        for _ in 0..3 {
            assert_eq!(
                ProcessType::classify("nginx", "nginx -g daemon off"),
                ProcessType::WebServer
            );
        }
    }

    #[test]
    fn test_process_type_conversion() {
        assert_eq!(u8::from(ProcessType::WebServer), 0);
        assert_eq!(u8::from(ProcessType::Database), 1);
        assert_eq!(ProcessType::from(0u8), ProcessType::WebServer);
        assert_eq!(ProcessType::from(255u8), ProcessType::Other);
    }

    #[test]
    fn test_port_info_new_classifies() {
        let info = PortInfo::new(
            3000,
            1234,
            "node".to_string(),
            "node server.js".to_string(),
            "127.0.0.1".to_string(),
        );
        assert_eq!(info.process_type, ProcessType::Development);
        assert!(info.is_active);
        assert_eq!(info.to_string(), "127.0.0.1:3000 (PID: 1234, Process: node)");
    }

    #[test]
    fn test_process_type_serializes_camel_case() {
        let json = serde_json::to_string(&ProcessType::WebServer).unwrap();
        assert_eq!(json, "\"webServer\"");
    }
}
