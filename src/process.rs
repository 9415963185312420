//! Background process handles
//!
//! Preflight may launch long-lived processes the submission needs (e.g. a
//! server). Each one is held as a [`BackgroundProcess`] in a run-owned
//! [`ProcessSet`]: handles are appended during setup and drained exactly
//! once during teardown. Termination is graceful-then-forced: SIGTERM, a
//! bounded wait, then a kill. Dropping the set force-kills anything still
//! registered, so no failure path leaks a child process.

use std::process::Child;
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// How long teardown waits after the graceful terminate before force-killing
pub const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// An owned handle to one detached background process
#[derive(Debug)]
pub struct BackgroundProcess {
    name: String,
    child: Child,
}

impl BackgroundProcess {
    pub fn new(name: impl Into<String>, child: Child) -> Self {
        BackgroundProcess {
            name: name.into(),
            child,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Liveness probe; false once the process has exited
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Send the graceful termination signal. No-op for an already-exited
    /// process (the pid must not be signaled after reaping).
    pub fn terminate(&mut self) {
        if !self.is_running() {
            return;
        }
        #[cfg(unix)]
        {
            let pid = self.child.id() as libc::pid_t;
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }
    }

    /// Forcibly kill the process. Safe on an already-terminated process.
    pub fn force_kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    /// Wait up to `timeout` for exit; true when the process is gone
    pub fn wait_timeout(&mut self, timeout: Duration) -> bool {
        match self.child.wait_timeout(timeout) {
            Ok(Some(_)) => true,
            Ok(None) => false,
            // A wait error means the child is no longer ours to reap
            Err(_) => true,
        }
    }
}

/// Run-owned collection of background handles, drained in teardown
#[derive(Debug, Default)]
pub struct ProcessSet {
    processes: Vec<BackgroundProcess>,
}

impl ProcessSet {
    pub fn new() -> Self {
        ProcessSet::default()
    }

    pub fn register(&mut self, process: BackgroundProcess) {
        debug!(name = process.name(), "registered background process");
        self.processes.push(process);
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Terminate every registered process: graceful signal, bounded wait,
    /// force-kill stragglers. Draining makes repeated calls no-ops.
    pub fn shutdown(&mut self) {
        for mut process in self.processes.drain(..) {
            if !process.is_running() {
                debug!(name = process.name(), "background process already exited");
                continue;
            }
            process.terminate();
            if process.wait_timeout(TERMINATE_TIMEOUT) {
                debug!(name = process.name(), "background process terminated");
            } else {
                warn!(
                    name = process.name(),
                    "background process ignored terminate, force-killing"
                );
                process.force_kill();
            }
        }
    }
}

impl Drop for ProcessSet {
    fn drop(&mut self) {
        // Backstop for abnormal exits; normal runs drained in teardown
        for mut process in self.processes.drain(..) {
            process.force_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};
    use std::time::Instant;

    fn spawn_sleep(secs: u32) -> Child {
        Command::new("sleep")
            .arg(secs.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn sleep")
    }

    #[test]
    fn test_shutdown_with_no_processes_is_a_noop() {
        let mut set = ProcessSet::new();
        assert!(set.is_empty());
        set.shutdown();
        set.shutdown();
        assert!(set.is_empty());
    }

    #[test]
    fn test_shutdown_is_idempotent_after_draining() {
        let mut set = ProcessSet::new();
        set.register(BackgroundProcess::new("sleeper", spawn_sleep(30)));
        assert_eq!(set.len(), 1);

        set.shutdown();
        assert!(set.is_empty());
        // Second call sees an empty set and does nothing
        set.shutdown();
        assert!(set.is_empty());
    }

    #[test]
    fn test_graceful_terminate_beats_the_force_kill_timeout() {
        let mut set = ProcessSet::new();
        set.register(BackgroundProcess::new("sleeper", spawn_sleep(30)));

        let start = Instant::now();
        set.shutdown();
        // sleep dies on SIGTERM, so we never sit out the full timeout
        assert!(start.elapsed() < TERMINATE_TIMEOUT);
    }

    #[test]
    fn test_liveness_probe_sees_exited_process() {
        let mut process = BackgroundProcess::new("true", spawn_sleep(0));
        // give the process a moment to exit
        std::thread::sleep(Duration::from_millis(200));
        assert!(!process.is_running());
        // terminate/force_kill on an exited process must not panic
        process.terminate();
        process.force_kill();
    }
}
