//! Ordered initializer registry with fork-transition orchestration.
//!
//! The registry owns the boot sequence (`load`, `run_all`), the two
//! fork-transition entry points consumed by a process supervisor
//! (`cleanup_before_fork`, `reconnect_after_fork`), and introspection.
//!
//! ## Rules
//! - Registration order == execute order == cleanup order == reconnect order
//! - Every hook runs inside a per-initializer containment boundary: one
//!   failure is recorded and logged, iteration continues
//! - Validation happens at load time, before any hook and before any fork
//! - All iteration is synchronous and single-threaded; concurrency is
//!   OS-level forking owned by the supervisor, never the registry

use crate::context::InitContext;
use crate::error::{Error, Result};
use crate::initializer::{ForkSensitive, Phase, Registration};
use crate::report::{
    Health, HealthState, HookFailure, InitState, InitializerStatus, RunReport, TransitionKind,
    TransitionRecord,
};
use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, error, info};

/// One registered initializer plus its runtime state.
struct Entry {
    /// The typed registration
    registration: Registration,
    /// Current lifecycle state
    state: InitState,
    /// Most recent hook failure
    last_error: Option<String>,
}

impl Entry {
    fn new(registration: Registration) -> Self {
        Self {
            registration,
            state: InitState::Unexecuted,
            last_error: None,
        }
    }

    fn record_failure(&mut self, reason: String) {
        self.state = InitState::Failed;
        self.last_error = Some(reason);
    }
}

/// Ordered collection and orchestrator of initializers for one process.
///
/// A registry is created fresh at process boot and destroyed with its
/// owning process. After a fork, the child's inherited copy is independent
/// of the parent's; children run `reconnect_after_fork` and never `cleanup`.
#[derive(Default)]
pub struct Registry {
    /// Registered initializers, in registration order
    entries: Vec<Entry>,
    /// Outcome of the most recent `run_all`
    last_run: Option<RunReport>,
    /// Record of the most recent cleanup transition
    last_cleanup: Option<TransitionRecord>,
    /// Record of the most recent reconnect transition
    last_reconnect: Option<TransitionRecord>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register initializers in order.
    ///
    /// Validates the whole batch before any of it takes effect: duplicate
    /// names (within the batch or against existing entries) and phase/hook
    /// mismatches are configuration errors that leave the registry
    /// untouched. Never calls `execute`.
    pub fn load(&mut self, registrations: Vec<Registration>) -> Result<()> {
        let mut seen: HashSet<String> = self
            .entries
            .iter()
            .map(|e| e.registration.name().to_string())
            .collect();

        for registration in &registrations {
            if !seen.insert(registration.name().to_string()) {
                return Err(Error::DuplicateName(registration.name().to_string()));
            }
            validate_registration(registration)?;
        }

        for registration in registrations {
            info!(
                initializer = %registration.name(),
                phase = %registration.phase(),
                "Registered initializer"
            );
            self.entries.push(Entry::new(registration));
        }

        Ok(())
    }

    /// Re-assert the load-time invariants.
    ///
    /// Supervisors call this as a preflight step before launching workers.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.registration.name()) {
                return Err(Error::DuplicateName(entry.registration.name().to_string()));
            }
            validate_registration(&entry.registration)?;
        }
        Ok(())
    }

    /// Number of registered initializers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of all registered initializers, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.registration.name())
            .collect()
    }

    /// Execute every initializer once, in registration order.
    ///
    /// Each `execute` runs inside the containment boundary: an error is
    /// recorded and logged, and every later initializer still gets its
    /// attempt. The report is retained for later inspection and also
    /// returned; whether a failed boot should abort is the caller's policy.
    pub fn run_all(&mut self, ctx: &InitContext) -> RunReport {
        let started_at = Utc::now();
        let mut successful = Vec::new();
        let mut failed = Vec::new();

        for entry in &mut self.entries {
            let name = entry.registration.name().to_string();
            debug!(initializer = %name, "Executing initializer");

            match entry.registration.execute(ctx) {
                Ok(()) => {
                    entry.state = InitState::Executed;
                    entry.last_error = None;
                    info!(initializer = %name, "Initializer executed");
                    successful.push(name);
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    error!(
                        initializer = %name,
                        error = %reason,
                        "Initializer execute failed; continuing with remaining initializers"
                    );
                    entry.record_failure(reason.clone());
                    failed.push(HookFailure { name, reason });
                }
            }
        }

        let report = RunReport {
            successful,
            failed,
            started_at,
            finished_at: Utc::now(),
        };
        self.last_run = Some(report.clone());
        report
    }

    /// Fork-sensitive initializers, in registration order.
    ///
    /// This is the authoritative set a supervisor must make fork-aware.
    pub fn fork_sensitive_initializers(&self) -> Vec<&dyn ForkSensitive> {
        self.entries
            .iter()
            .filter_map(|e| e.registration.as_fork_sensitive())
            .collect()
    }

    /// Names of the fork-sensitive set, in registration order.
    pub fn fork_sensitive_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.registration.has_fork_hooks())
            .map(|e| e.registration.name())
            .collect()
    }

    /// Run `cleanup` on the fork-sensitive set, in the parent, before `fork`.
    ///
    /// The record starts empty on every call. One initializer's failure
    /// never prevents the remaining cleanups: a subsystem that fails to
    /// release its resources must not cause every other subsystem to leak
    /// across the fork as well.
    pub fn cleanup_before_fork(&mut self) -> TransitionRecord {
        let record = self.run_transition(TransitionKind::Cleanup);
        self.last_cleanup = Some(record.clone());
        record
    }

    /// Run `reconnect` on the fork-sensitive set, in the calling process.
    ///
    /// Symmetric to [`cleanup_before_fork`](Registry::cleanup_before_fork):
    /// same ordered set, same containment semantics, fresh record per call.
    /// Invoked by each forked child before it serves any request.
    pub fn reconnect_after_fork(&mut self) -> TransitionRecord {
        let record = self.run_transition(TransitionKind::Reconnect);
        self.last_reconnect = Some(record.clone());
        record
    }

    fn run_transition(&mut self, kind: TransitionKind) -> TransitionRecord {
        let mut record = TransitionRecord::begin(kind);

        for entry in &mut self.entries {
            let name = entry.registration.name().to_string();
            let hooks = match entry.registration.as_fork_sensitive_mut() {
                Some(hooks) => hooks,
                None => continue,
            };

            record.order.push(name.clone());
            let outcome = match kind {
                TransitionKind::Cleanup => hooks.cleanup(),
                TransitionKind::Reconnect => hooks.reconnect(),
            };

            match outcome {
                Ok(()) => {
                    entry.state = match kind {
                        TransitionKind::Cleanup => InitState::CleanedUp,
                        TransitionKind::Reconnect => InitState::Reconnected,
                    };
                    debug!(initializer = %name, transition = %kind, "Fork hook completed");
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    error!(
                        initializer = %name,
                        transition = %kind,
                        error = %reason,
                        "Fork hook failed; continuing with remaining initializers"
                    );
                    entry.record_failure(reason.clone());
                    record.errors.push(HookFailure { name, reason });
                }
            }
        }

        record.finish();
        info!(
            transition = %kind,
            attempted = record.order.len(),
            failed = record.errors.len(),
            "Fork transition finished"
        );
        record
    }

    /// Names of initializers claiming a capability, in registration order.
    pub fn providers_of(&self, capability: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.registration.provides().contains(&capability))
            .map(|e| e.registration.name())
            .collect()
    }

    /// All capability tags claimed by registered initializers.
    pub fn provided_capabilities(&self) -> BTreeSet<&str> {
        self.entries
            .iter()
            .flat_map(|e| e.registration.provides().iter().copied())
            .collect()
    }

    /// Assert that every required capability has at least one provider.
    pub fn require_capabilities(&self, capabilities: &[&str]) -> Result<()> {
        for capability in capabilities {
            if self.providers_of(capability).is_empty() {
                return Err(Error::MissingCapability((*capability).to_string()));
            }
        }
        Ok(())
    }

    /// Outcome of the most recent `run_all`, if any.
    pub fn last_run(&self) -> Option<&RunReport> {
        self.last_run.as_ref()
    }

    /// Record of the most recent cleanup transition, if any.
    pub fn last_cleanup(&self) -> Option<&TransitionRecord> {
        self.last_cleanup.as_ref()
    }

    /// Record of the most recent reconnect transition, if any.
    pub fn last_reconnect(&self) -> Option<&TransitionRecord> {
        self.last_reconnect.as_ref()
    }

    /// Introspection view of every initializer, in registration order.
    pub fn status(&self) -> Vec<InitializerStatus> {
        self.entries
            .iter()
            .map(|e| InitializerStatus {
                name: e.registration.name().to_string(),
                phase: e.registration.phase(),
                state: e.state,
                provides: e
                    .registration
                    .provides()
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
                last_error: e.last_error.clone(),
            })
            .collect()
    }

    /// Health summary over the retained records.
    ///
    /// Failures make the process degraded, never dead: a health endpoint
    /// built on this keeps answering while some subsystems are down.
    pub fn health(&self) -> Health {
        let failed_execute: Vec<String> = self
            .last_run
            .iter()
            .flat_map(|r| r.failed.iter().map(|f| f.name.clone()))
            .collect();
        let failed_cleanup: Vec<String> = self
            .last_cleanup
            .iter()
            .flat_map(|r| r.errors.iter().map(|f| f.name.clone()))
            .collect();
        let failed_reconnect: Vec<String> = self
            .last_reconnect
            .iter()
            .flat_map(|r| r.errors.iter().map(|f| f.name.clone()))
            .collect();

        let state = if failed_execute.is_empty()
            && failed_cleanup.is_empty()
            && failed_reconnect.is_empty()
        {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        };

        Health {
            state,
            failed_execute,
            failed_cleanup,
            failed_reconnect,
        }
    }

    /// Clear all registrations and retained records.
    ///
    /// Reinstates an unloaded registry inside a running process so a later
    /// `load` can repopulate it. Test and administrative use only; never
    /// part of a production fork transition.
    pub fn soft_reset(&mut self) {
        self.entries.clear();
        self.last_run = None;
        self.last_cleanup = None;
        self.last_reconnect = None;
        info!("Registry soft reset");
    }
}

fn validate_registration(registration: &Registration) -> Result<()> {
    match (registration.phase(), registration.has_fork_hooks()) {
        (Phase::ForkSensitive, false) => {
            Err(Error::MissingForkHooks(registration.name().to_string()))
        }
        (Phase::Normal, true) => Err(Error::UnexpectedForkHooks(
            registration.name().to_string(),
        )),
        _ => Ok(()),
    }
}
