//! Unix termination primitives.
//!
//! Signals are delivered directly through `kill(2)`:
//! - SIGTERM for the cooperative stop request
//! - SIGKILL for the forced kill
//! - signal 0 for liveness probes

use super::{Delivery, KillError, KillOutcome, ProcessTerminator};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Unix process terminator. Stateless and cheap to construct.
#[derive(Debug, Default)]
pub struct UnixTerminator;

impl UnixTerminator {
    pub fn new() -> Self {
        Self
    }

    fn send(pid: u32, signal: Option<Signal>) -> Result<(), Errno> {
        kill(Pid::from_raw(pid as i32), signal)
    }
}

impl ProcessTerminator for UnixTerminator {
    async fn request_stop(&self, pid: u32) -> Result<Delivery, KillError> {
        match Self::send(pid, Some(Signal::SIGTERM)) {
            Ok(()) => {
                debug!(pid = pid, "SIGTERM delivered");
                Ok(Delivery::Delivered)
            }
            Err(Errno::ESRCH) => {
                debug!(pid = pid, "process not found, already terminated");
                Ok(Delivery::Gone)
            }
            Err(Errno::EPERM) => {
                warn!(pid = pid, "permission denied delivering SIGTERM");
                Ok(Delivery::Denied)
            }
            Err(e) => Err(KillError::CommandFailed(format!(
                "kill -TERM {} failed: {}",
                pid, e
            ))),
        }
    }

    async fn force_stop(&self, pid: u32) -> Result<KillOutcome, KillError> {
        match Self::send(pid, Some(Signal::SIGKILL)) {
            // A successful kill() is delivery confirmation; if the PID was
            // reused in the meantime the signal reached the new process, and
            // the outcome is still Killed.
            Ok(()) => {
                debug!(pid = pid, "SIGKILL delivered");
                Ok(KillOutcome::Killed)
            }
            Err(Errno::ESRCH) => {
                debug!(pid = pid, "process not found during force kill");
                Ok(KillOutcome::NotFound)
            }
            Err(Errno::EPERM) => {
                warn!(pid = pid, "permission denied delivering SIGKILL");
                Ok(KillOutcome::PermissionDenied)
            }
            Err(e) => Err(KillError::CommandFailed(format!(
                "kill -KILL {} failed: {}",
                pid, e
            ))),
        }
    }

    async fn is_running(&self, pid: u32) -> bool {
        // Signal 0 performs every check except delivery. EPERM means the
        // process exists but belongs to someone else: it is running.
        match Self::send(pid, None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}
