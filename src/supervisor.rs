//! Reference preforking supervisor built on the registry.
//!
//! The supervisor owns the process side of the contract: it boots the
//! registry once in the master, runs `cleanup_before_fork` in the parent
//! strictly before every `fork(2)`, and has each child run
//! `reconnect_after_fork` before its worker body. Worker processes are
//! reaped with `wait(2)`; a failed worker can be respawned.
//!
//! Timeouts for hung initializer hooks are deliberately not mediated here
//! or in the registry; killing a stuck process is an operator concern.

use crate::context::InitContext;
use crate::error::Result;
use crate::registry::Registry;
use crate::report::RunReport;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{wait, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::collections::HashMap;
use tracing::{info, warn};

/// Settings for the prefork supervisor.
#[derive(Debug, Clone)]
pub struct PreforkConfig {
    /// Number of worker processes to fork
    pub workers: usize,
    /// Whether to respawn a worker that exits abnormally
    pub respawn: bool,
}

impl Default for PreforkConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            respawn: false,
        }
    }
}

/// Exit status of a reaped worker.
#[derive(Debug, Clone)]
pub struct WorkerExit {
    /// Worker slot index
    pub worker: usize,
    /// Process ID
    pub pid: u32,
    /// Exit code (if exited normally)
    pub code: Option<i32>,
    /// Signal (if killed by signal)
    pub signal: Option<i32>,
}

impl WorkerExit {
    /// Check if the worker exited cleanly.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Minimal preforking supervisor.
///
/// # Example
///
/// ```no_run
/// use prefork::{InitContext, PreforkConfig, PreforkSupervisor, Registry};
///
/// fn main() -> prefork::Result<()> {
///     let registry = Registry::new();
///     let mut supervisor = PreforkSupervisor::new(registry, PreforkConfig::default());
///     supervisor.boot(&InitContext::default())?;
///     supervisor.run(|worker| {
///         // serve requests...
///         let _ = worker;
///         0
///     })?;
///     Ok(())
/// }
/// ```
pub struct PreforkSupervisor {
    /// The process's registry; each child inherits its own copy on fork
    registry: Registry,
    /// Supervisor settings
    config: PreforkConfig,
    /// Live workers, PID to slot index
    children: HashMap<Pid, usize>,
}

impl PreforkSupervisor {
    /// Create a supervisor around a loaded registry.
    pub fn new(registry: Registry, config: PreforkConfig) -> Self {
        Self {
            registry,
            config,
            children: HashMap::new(),
        }
    }

    /// Access the registry for health checks and introspection.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Boot the master process: preflight validation, then `run_all`.
    ///
    /// A validation error means a misconfigured initializer set and stops
    /// boot before any hook runs. Execute failures do not: they come back
    /// in the report and the caller decides whether a degraded boot is
    /// acceptable.
    pub fn boot(&mut self, ctx: &InitContext) -> Result<RunReport> {
        self.registry.validate()?;

        info!(
            initializers = self.registry.len(),
            fork_sensitive = ?self.registry.fork_sensitive_names(),
            "Booting master process"
        );

        Ok(self.registry.run_all(ctx))
    }

    /// Fork the configured number of workers and supervise them until all
    /// have exited.
    ///
    /// The worker closure runs in each child after `reconnect_after_fork`;
    /// its return value becomes the child's exit code. Returns the exit
    /// records of every reaped worker, in reap order.
    pub fn run<F>(&mut self, worker: F) -> Result<Vec<WorkerExit>>
    where
        F: Fn(usize) -> i32,
    {
        for index in 0..self.config.workers {
            self.spawn_worker(index, &worker)?;
        }
        self.supervise(&worker)
    }

    /// One worker-spawn event: cleanup in the parent, fork, reconnect in
    /// the child.
    fn spawn_worker<F>(&mut self, index: usize, worker: &F) -> Result<()>
    where
        F: Fn(usize) -> i32,
    {
        let cleanup = self.registry.cleanup_before_fork();
        if !cleanup.errors.is_empty() {
            warn!(
                errors = ?cleanup.error_names(),
                "Some subsystems failed to clean up before fork"
            );
        }

        // The supervisor spawns no threads; the process is single-threaded
        // at every fork point.
        match unsafe { fork() }? {
            ForkResult::Parent { child } => {
                info!(worker = index, pid = child.as_raw(), "Forked worker");
                self.children.insert(child, index);
                Ok(())
            }
            ForkResult::Child => {
                let reconnect = self.registry.reconnect_after_fork();
                if !reconnect.errors.is_empty() {
                    warn!(
                        worker = index,
                        errors = ?reconnect.error_names(),
                        "Worker starting degraded"
                    );
                }
                let code = worker(index);
                std::process::exit(code);
            }
        }
    }

    /// Reap workers until none remain, respawning abnormal exits when
    /// configured.
    fn supervise<F>(&mut self, worker: &F) -> Result<Vec<WorkerExit>>
    where
        F: Fn(usize) -> i32,
    {
        let mut exits = Vec::new();

        while !self.children.is_empty() {
            let status = match wait() {
                Ok(status) => status,
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => break,
                Err(e) => return Err(e.into()),
            };

            if let Some(exit) = self.take_exit(status) {
                let respawn = self.config.respawn && !exit.success();
                let index = exit.worker;
                exits.push(exit);

                if respawn {
                    info!(worker = index, "Respawning failed worker");
                    self.spawn_worker(index, worker)?;
                }
            }
        }

        Ok(exits)
    }

    /// Send SIGTERM to all live workers and reap them.
    pub fn shutdown(&mut self) -> Result<Vec<WorkerExit>> {
        for pid in self.children.keys() {
            if let Err(e) = kill(*pid, Signal::SIGTERM) {
                warn!(pid = pid.as_raw(), error = %e, "Failed to signal worker");
            }
        }

        let mut exits = Vec::new();
        while !self.children.is_empty() {
            let status = match wait() {
                Ok(status) => status,
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => break,
                Err(e) => return Err(e.into()),
            };
            if let Some(exit) = self.take_exit(status) {
                exits.push(exit);
            }
        }

        Ok(exits)
    }

    /// Translate a wait status into a worker exit record.
    fn take_exit(&mut self, status: WaitStatus) -> Option<WorkerExit> {
        match status {
            WaitStatus::Exited(pid, code) => self.children.remove(&pid).map(|index| {
                info!(worker = index, pid = pid.as_raw(), code = code, "Worker exited");
                WorkerExit {
                    worker: index,
                    pid: pid.as_raw() as u32,
                    code: Some(code),
                    signal: None,
                }
            }),
            WaitStatus::Signaled(pid, signal, _) => self.children.remove(&pid).map(|index| {
                warn!(
                    worker = index,
                    pid = pid.as_raw(),
                    signal = signal as i32,
                    "Worker killed by signal"
                );
                WorkerExit {
                    worker: index,
                    pid: pid.as_raw() as u32,
                    code: None,
                    signal: Some(signal as i32),
                }
            }),
            _ => None,
        }
    }
}
