//! Port-kill orchestration.
//!
//! Composes the catalog and the terminator to implement "free this port":
//! resolve every active PID bound to the port, request a cooperative stop
//! from all of them, wait one shared grace period, then force whatever is
//! left. Partial success is an explicit, reportable outcome, never an
//! abort.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::models::PortInfo;
use crate::terminator::{Delivery, KillOutcome, ProcessTerminator};

/// Grace period for the batched port-kill wait (300 ms).
///
/// Deliberately distinct from the single-PID
/// [`crate::terminator::GRACEFUL_KILL_TIMEOUT_MS`]; neither governs the
/// other.
pub const BULK_KILL_TIMEOUT_MS: u64 = 300;

/// Termination outcome for one PID within a port-kill batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidOutcome {
    pub pid: u32,
    pub outcome: KillOutcome,
}

/// Aggregated result of freeing one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortKillReport {
    /// The port that was targeted.
    pub port: u16,

    /// Per-PID outcomes, one per active listener found on the port. Empty
    /// when the port had no active listeners.
    pub outcomes: Vec<PidOutcome>,
}

impl PortKillReport {
    /// True when the port had no active listeners to begin with. A
    /// success-shaped no-op, distinguishable from a failed kill.
    pub fn no_listeners(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// True when at least one listener was confirmed terminated.
    pub fn any_killed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.outcome == KillOutcome::Killed)
    }

    /// Boundary-facing success flag: the port is free when it had no
    /// listeners, or when at least one listener is gone — killed by us or
    /// exited on its own between the scan and the signal. A listener that
    /// vanished in that window leaves the port just as free as a kill.
    pub fn succeeded(&self) -> bool {
        self.no_listeners() || self.outcomes.iter().any(|o| o.outcome.is_terminated())
    }
}

/// Kill every active listener on `port` with the default batch grace period.
pub async fn kill_all_on_port<T: ProcessTerminator>(
    terminator: &T,
    catalog: &[PortInfo],
    port: u16,
) -> PortKillReport {
    kill_all_on_port_with_grace(
        terminator,
        catalog,
        port,
        Duration::from_millis(BULK_KILL_TIMEOUT_MS),
    )
    .await
}

/// Kill every active listener on `port`, waiting `grace` once for the whole
/// batch.
///
/// All cooperative stop requests are issued before the wait begins, so the
/// total wall-clock cost is bounded by one grace interval plus escalation,
/// regardless of how many PIDs share the port. Per-PID failures (permission
/// denied, unconfirmed delivery) are recorded in the report and never abort
/// the rest of the batch.
pub async fn kill_all_on_port_with_grace<T: ProcessTerminator>(
    terminator: &T,
    catalog: &[PortInfo],
    port: u16,
    grace: Duration,
) -> PortKillReport {
    let targets: Vec<u32> = catalog
        .iter()
        .filter(|entry| entry.port == port && entry.is_active)
        .map(|entry| entry.pid)
        .collect();

    if targets.is_empty() {
        debug!(port = port, "no active listeners, nothing to do");
        return PortKillReport {
            port,
            outcomes: Vec::new(),
        };
    }

    let mut outcomes = Vec::with_capacity(targets.len());
    let mut pending = Vec::with_capacity(targets.len());

    // Phase 1: every cooperative request goes out before any waiting.
    for pid in targets {
        match terminator.request_stop(pid).await {
            Ok(Delivery::Delivered) => pending.push(pid),
            Ok(Delivery::Gone) => outcomes.push(PidOutcome {
                pid,
                outcome: KillOutcome::NotFound,
            }),
            Ok(Delivery::Denied) => outcomes.push(PidOutcome {
                pid,
                outcome: KillOutcome::PermissionDenied,
            }),
            Err(e) => {
                warn!(port = port, pid = pid, error = %e, "stop request failed");
                outcomes.push(PidOutcome {
                    pid,
                    outcome: KillOutcome::StillAlive,
                });
            }
        }
    }

    // Phase 2: one shared wait for the whole batch.
    if !pending.is_empty() {
        sleep(grace).await;

        // Phase 3: verify each survivor and force the stubborn ones.
        for pid in pending {
            let outcome = if terminator.is_running(pid).await {
                match terminator.force_stop(pid).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(port = port, pid = pid, error = %e, "force kill failed");
                        KillOutcome::StillAlive
                    }
                }
            } else {
                KillOutcome::Killed
            };
            outcomes.push(PidOutcome { pid, outcome });
        }
    }

    outcomes.sort_by_key(|o| o.pid);
    PortKillReport { port, outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminator::testing::{Behavior, Event, ScriptedTerminator};
    use tokio::time::Instant;

    fn entry(port: u16, pid: u32, name: &str, active: bool) -> PortInfo {
        let mut info = PortInfo::new(
            port,
            pid,
            name.to_string(),
            name.to_string(),
            "127.0.0.1".to_string(),
        );
        info.is_active = active;
        info
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_port_is_success_shaped_noop() {
        let t = ScriptedTerminator::new(&[]);
        let catalog = vec![entry(3000, 1, "node", true)];

        let report = kill_all_on_port(&t, &catalog, 8080).await;

        assert!(report.no_listeners());
        assert!(!report.any_killed());
        assert!(report.succeeded());
        assert!(t.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_entries_are_not_targeted() {
        let t = ScriptedTerminator::new(&[(1001, Behavior::ExitsOnRequest)]);
        let catalog = vec![entry(8080, 1001, "node", false)];

        let report = kill_all_on_port(&t, &catalog, 8080).await;

        assert!(report.no_listeners());
        assert!(t.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_requests_precede_any_force() {
        let t = ScriptedTerminator::new(&[
            (1001, Behavior::IgnoresRequest),
            (1002, Behavior::IgnoresRequest),
        ]);
        let catalog = vec![
            entry(8080, 1001, "node", true),
            entry(8080, 1002, "postgres", true),
        ];
        let start = Instant::now();

        let report = kill_all_on_port(&t, &catalog, 8080).await;

        assert_eq!(
            t.events(),
            vec![
                Event::Request(1001),
                Event::Request(1002),
                Event::Force(1001),
                Event::Force(1002),
            ]
        );
        assert!(report.any_killed());

        // One shared grace interval, not one per PID.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(BULK_KILL_TIMEOUT_MS));
        assert!(elapsed < Duration::from_millis(2 * BULK_KILL_TIMEOUT_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_is_recorded_not_fatal() {
        let t = ScriptedTerminator::new(&[
            (1001, Behavior::ExitsOnRequest),
            (1002, Behavior::Denied),
        ]);
        let catalog = vec![
            entry(8080, 1001, "node", true),
            entry(8080, 1002, "postgres", true),
        ];

        let report = kill_all_on_port(&t, &catalog, 8080).await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].pid, 1001);
        assert_eq!(report.outcomes[0].outcome, KillOutcome::Killed);
        assert_eq!(report.outcomes[1].pid, 1002);
        assert_eq!(report.outcomes[1].outcome, KillOutcome::PermissionDenied);
        assert!(report.any_killed());
        assert!(report.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_gone_before_request() {
        let t = ScriptedTerminator::new(&[]);
        let catalog = vec![entry(8080, 1001, "node", true)];

        let report = kill_all_on_port(&t, &catalog, 8080).await;

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].outcome, KillOutcome::NotFound);
        // Already-gone listeners are not confirmed kills, but the port is
        // free: the operation still counts as a success.
        assert!(!report.any_killed());
        assert!(!report.no_listeners());
        assert!(report.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_listener_is_success_shaped() {
        // Scan saw an active listener, but it exited before the signal went
        // out. NotFound must read as success, not as a failed kill.
        let t = ScriptedTerminator::new(&[]);
        let catalog = vec![entry(8080, 1001, "node", true)];

        let report = kill_all_on_port(&t, &catalog, 8080).await;

        assert_eq!(report.outcomes, vec![PidOutcome {
            pid: 1001,
            outcome: KillOutcome::NotFound,
        }]);
        assert!(report.succeeded());
        assert!(!report.any_killed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_only_batch_is_not_success() {
        let t = ScriptedTerminator::new(&[(1001, Behavior::Denied)]);
        let catalog = vec![entry(8080, 1001, "node", true)];

        let report = kill_all_on_port(&t, &catalog, 8080).await;

        assert_eq!(report.outcomes[0].outcome, KillOutcome::PermissionDenied);
        assert!(!report.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_within_grace_skips_force() {
        let t = ScriptedTerminator::new(&[(1001, Behavior::ExitsOnRequest)]);
        let catalog = vec![entry(8080, 1001, "node", true)];

        let report = kill_all_on_port(&t, &catalog, 8080).await;

        assert_eq!(report.outcomes[0].outcome, KillOutcome::Killed);
        assert_eq!(t.events(), vec![Event::Request(1001)]);
        assert!(report.any_killed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_grace_period() {
        let t = ScriptedTerminator::new(&[(1001, Behavior::IgnoresRequest)]);
        let catalog = vec![entry(8080, 1001, "node", true)];
        let start = Instant::now();

        let report =
            kill_all_on_port_with_grace(&t, &catalog, 8080, Duration::from_millis(50)).await;

        assert!(report.any_killed());
        assert!(start.elapsed() < Duration::from_millis(BULK_KILL_TIMEOUT_MS));
    }

    #[test]
    fn test_report_serializes() {
        let report = PortKillReport {
            port: 8080,
            outcomes: vec![PidOutcome {
                pid: 1001,
                outcome: KillOutcome::Killed,
            }],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"port\":8080"));
        assert!(json.contains("\"killed\""));
    }
}
