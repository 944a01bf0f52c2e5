//! Windows termination primitives.
//!
//! Uses the taskkill/tasklist utilities:
//! - `taskkill /PID xxx` for the cooperative stop request (WM_CLOSE)
//! - `taskkill /PID xxx /F` for the forced kill (TerminateProcess)
//! - `tasklist /FI "PID eq xxx" /NH` for liveness probes

use super::{Delivery, KillError, KillOutcome, ProcessTerminator};
use tokio::process::Command;
use tracing::{debug, warn};

/// Windows process terminator. Stateless and cheap to construct.
#[derive(Debug, Default)]
pub struct WindowsTerminator;

/// What taskkill's diagnostics said about the attempt.
enum TaskkillResult {
    Ok,
    NotFound,
    AccessDenied,
    AlreadyTerminated,
    Failed(String),
}

impl WindowsTerminator {
    pub fn new() -> Self {
        Self
    }

    async fn taskkill(&self, pid: u32, force: bool) -> Result<TaskkillResult, KillError> {
        let mut cmd = Command::new("taskkill");
        cmd.arg("/PID").arg(pid.to_string());
        if force {
            cmd.arg("/F");
        }

        let output = cmd.output().await?;

        if output.status.success() {
            return Ok(TaskkillResult::Ok);
        }

        // taskkill reports its reason on stdout or stderr depending on the
        // Windows version.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let combined = format!("{} {}", stdout, stderr);

        if combined.contains("not found") || combined.contains("could not be found") {
            return Ok(TaskkillResult::NotFound);
        }
        if combined.contains("Access is denied") || combined.contains("access denied") {
            return Ok(TaskkillResult::AccessDenied);
        }
        if combined.contains("already been terminated") || combined.contains("has exited") {
            return Ok(TaskkillResult::AlreadyTerminated);
        }

        Ok(TaskkillResult::Failed(combined.trim().to_string()))
    }
}

impl ProcessTerminator for WindowsTerminator {
    async fn request_stop(&self, pid: u32) -> Result<Delivery, KillError> {
        match self.taskkill(pid, false).await? {
            TaskkillResult::Ok => {
                debug!(pid = pid, "graceful taskkill delivered");
                Ok(Delivery::Delivered)
            }
            TaskkillResult::NotFound | TaskkillResult::AlreadyTerminated => {
                debug!(pid = pid, "process not found, already terminated");
                Ok(Delivery::Gone)
            }
            TaskkillResult::AccessDenied => {
                warn!(pid = pid, "access denied for graceful taskkill");
                Ok(Delivery::Denied)
            }
            TaskkillResult::Failed(reason) => {
                // Graceful taskkill fails for console applications with no
                // window to close; report delivered so the caller escalates
                // after the grace period instead of giving up.
                warn!(pid = pid, reason = %reason, "graceful taskkill failed, escalation will handle it");
                Ok(Delivery::Delivered)
            }
        }
    }

    async fn force_stop(&self, pid: u32) -> Result<KillOutcome, KillError> {
        match self.taskkill(pid, true).await? {
            TaskkillResult::Ok | TaskkillResult::AlreadyTerminated => {
                debug!(pid = pid, "taskkill /F succeeded");
                Ok(KillOutcome::Killed)
            }
            TaskkillResult::NotFound => {
                debug!(pid = pid, "process not found during force kill");
                Ok(KillOutcome::NotFound)
            }
            TaskkillResult::AccessDenied => {
                warn!(pid = pid, "access denied for taskkill /F");
                Ok(KillOutcome::PermissionDenied)
            }
            TaskkillResult::Failed(reason) => {
                // Delivery could not be confirmed; soft failure, not retried.
                warn!(pid = pid, reason = %reason, "taskkill /F unconfirmed");
                Ok(KillOutcome::StillAlive)
            }
        }
    }

    async fn is_running(&self, pid: u32) -> bool {
        let result = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/NH"])
            .output()
            .await;

        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                // tasklist prints "INFO: No tasks are running..." when the
                // filter matched nothing.
                output.status.success()
                    && !stdout.contains("No tasks are running")
                    && !stdout.contains("INFO:")
                    && stdout.contains(&pid.to_string())
            }
            Err(e) => {
                warn!(pid = pid, error = %e, "liveness check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING_PID: u32 = 999_999_999;

    #[tokio::test]
    async fn test_is_running_current_process() {
        let t = WindowsTerminator::new();
        assert!(t.is_running(std::process::id()).await);
    }

    #[tokio::test]
    async fn test_is_running_nonexistent() {
        let t = WindowsTerminator::new();
        assert!(!t.is_running(MISSING_PID).await);
    }

    #[tokio::test]
    async fn test_force_nonexistent_is_benign() {
        let t = WindowsTerminator::new();
        let outcome = t.force_stop(MISSING_PID).await.unwrap();
        assert!(matches!(
            outcome,
            KillOutcome::NotFound | KillOutcome::Killed
        ));
    }
}
