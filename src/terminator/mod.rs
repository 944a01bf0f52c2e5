//! Process termination.
//!
//! Platform backends supply three primitives: deliver the cooperative stop
//! request, deliver the forced kill, and check liveness. The graceful
//! escalation machine (request, wait, verify, escalate) is written once here
//! on top of those primitives, so its timing and race handling behave
//! identically on every OS.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixTerminator as PlatformTerminator;

#[cfg(windows)]
pub use windows::WindowsTerminator as PlatformTerminator;

#[cfg(not(any(unix, windows)))]
compile_error!("Unsupported platform: process termination requires unix or windows");

/// Grace period between the cooperative stop request and the forced kill
/// when terminating a single PID (500 ms).
pub const GRACEFUL_KILL_TIMEOUT_MS: u64 = 500;

/// Errors from the termination machinery itself.
///
/// Per-PID conditions (gone, denied, unconfirmed) are not errors; they are
/// [`KillOutcome`] values. A `KillError` means the kill mechanism could not
/// be exercised at all.
#[derive(Debug, Error)]
pub enum KillError {
    /// Failed to execute the kill command.
    #[error("Failed to execute kill command: {0}")]
    CommandFailed(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Termination mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KillMode {
    /// Cooperative stop request first, forced kill only after the grace
    /// period expires.
    Graceful,
    /// Immediate, non-catchable kill.
    Force,
}

/// Terminal outcome of a termination attempt against one PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KillOutcome {
    /// The OS confirmed delivery of the kill to an existing process.
    ///
    /// If the PID was reused between verification and delivery, the signal
    /// reached the new process; PID-based APIs cannot close that window and
    /// this is still reported as `Killed`.
    Killed,
    /// The PID no longer exists. Benign for termination intents: the port is
    /// just as free as if we had killed it.
    NotFound,
    /// The OS refused signal delivery.
    PermissionDenied,
    /// Forced delivery could not be confirmed. Soft failure; the caller may
    /// retry the whole operation, the core does not.
    StillAlive,
}

impl KillOutcome {
    /// Whether the target is gone as far as termination intent is concerned.
    pub fn is_terminated(&self) -> bool {
        matches!(self, KillOutcome::Killed | KillOutcome::NotFound)
    }
}

/// Result of delivering a cooperative stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The request reached the process.
    Delivered,
    /// The process was already gone.
    Gone,
    /// The OS refused delivery.
    Denied,
}

/// Trait for platform-specific termination primitives.
pub trait ProcessTerminator: Send + Sync {
    /// Deliver the cooperative stop request (SIGTERM / graceful taskkill)
    /// without waiting.
    fn request_stop(
        &self,
        pid: u32,
    ) -> impl std::future::Future<Output = Result<Delivery, KillError>> + Send;

    /// Deliver the forced kill (SIGKILL / taskkill /F) once and report the
    /// outcome.
    fn force_stop(
        &self,
        pid: u32,
    ) -> impl std::future::Future<Output = Result<KillOutcome, KillError>> + Send;

    /// Check whether a process currently exists.
    fn is_running(&self, pid: u32) -> impl std::future::Future<Output = bool> + Send;
}

/// Terminate one PID in the given mode.
///
/// `Graceful` uses the default grace period of
/// [`GRACEFUL_KILL_TIMEOUT_MS`]; `Force` skips straight to the forced kill.
/// Terminating an already-dead PID is not an error; it resolves to
/// [`KillOutcome::NotFound`].
pub async fn terminate<T: ProcessTerminator>(
    terminator: &T,
    pid: u32,
    mode: KillMode,
) -> Result<KillOutcome, KillError> {
    match mode {
        KillMode::Force => terminator.force_stop(pid).await,
        KillMode::Graceful => {
            terminate_with_grace(
                terminator,
                pid,
                Duration::from_millis(GRACEFUL_KILL_TIMEOUT_MS),
            )
            .await
        }
    }
}

/// Graceful termination with an explicit grace period.
///
/// Request → Wait → Verify → Escalate: the cooperative request goes out,
/// the full grace period elapses (bounded, non-busy), liveness is
/// re-checked, and only a survivor is escalated to the forced kill.
pub async fn terminate_with_grace<T: ProcessTerminator>(
    terminator: &T,
    pid: u32,
    grace: Duration,
) -> Result<KillOutcome, KillError> {
    match terminator.request_stop(pid).await? {
        Delivery::Gone => return Ok(KillOutcome::NotFound),
        Delivery::Denied => return Ok(KillOutcome::PermissionDenied),
        Delivery::Delivered => {}
    }

    sleep(grace).await;

    if !terminator.is_running(pid).await {
        debug!(pid = pid, "process exited within grace period");
        return Ok(KillOutcome::Killed);
    }

    debug!(pid = pid, "process survived grace period, escalating");
    terminator.force_stop(pid).await
}


#[cfg(test)]
mod tests {
    use super::testing::{Behavior, Event, ScriptedTerminator};
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_graceful_exit_skips_force_path() {
        let t = ScriptedTerminator::new(&[(100, Behavior::ExitsOnRequest)]);

        let outcome = terminate(&t, 100, KillMode::Graceful).await.unwrap();

        assert_eq!(outcome, KillOutcome::Killed);
        assert_eq!(t.events(), vec![Event::Request(100)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_escalates_after_full_grace_period() {
        let t = ScriptedTerminator::new(&[(100, Behavior::IgnoresRequest)]);
        let start = Instant::now();

        let outcome = terminate(&t, 100, KillMode::Graceful).await.unwrap();

        assert_eq!(outcome, KillOutcome::Killed);
        assert_eq!(t.events(), vec![Event::Request(100), Event::Force(100)]);
        // Completion is never reported before the grace interval elapsed.
        assert!(start.elapsed() >= Duration::from_millis(GRACEFUL_KILL_TIMEOUT_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_missing_pid_is_benign() {
        let t = ScriptedTerminator::new(&[]);

        let outcome = terminate(&t, 42, KillMode::Graceful).await.unwrap();
        assert_eq!(outcome, KillOutcome::NotFound);
        assert!(outcome.is_terminated());

        // Idempotent: a second attempt resolves the same way, no panic.
        let again = terminate(&t, 42, KillMode::Graceful).await.unwrap();
        assert_eq!(again, KillOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_denied() {
        let t = ScriptedTerminator::new(&[(7, Behavior::Denied)]);

        let outcome = terminate(&t, 7, KillMode::Graceful).await.unwrap();
        assert_eq!(outcome, KillOutcome::PermissionDenied);
        assert!(!outcome.is_terminated());
        // Denied on request never escalates.
        assert_eq!(t.events(), vec![Event::Request(7)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_mode_skips_request() {
        let t = ScriptedTerminator::new(&[(100, Behavior::IgnoresRequest)]);

        let outcome = terminate(&t, 100, KillMode::Force).await.unwrap();
        assert_eq!(outcome, KillOutcome::Killed);
        assert_eq!(t.events(), vec![Event::Force(100)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_missing_pid() {
        let t = ScriptedTerminator::new(&[]);

        let outcome = terminate(&t, 42, KillMode::Force).await.unwrap();
        assert_eq!(outcome, KillOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_force_reports_still_alive() {
        let t = ScriptedTerminator::new(&[(100, Behavior::Unkillable)]);

        let outcome = terminate(&t, 100, KillMode::Graceful).await.unwrap();
        assert_eq!(outcome, KillOutcome::StillAlive);
        assert!(!outcome.is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_grace_period() {
        let t = ScriptedTerminator::new(&[(100, Behavior::IgnoresRequest)]);
        let start = Instant::now();

        let outcome = terminate_with_grace(&t, 100, Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(outcome, KillOutcome::Killed);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(GRACEFUL_KILL_TIMEOUT_MS));
    }
}
