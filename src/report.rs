//! Run and fork-transition records surfaced to health tooling.
//!
//! Everything here is plain serializable data: the registry accumulates
//! these records and operational tooling (health endpoints, boot checks)
//! reads them after the fact. A process with failures in these records is
//! degraded, not dead.

use crate::initializer::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitState {
    /// Registered but not yet executed
    Unexecuted,
    /// `execute` completed
    Executed,
    /// The most recent hook attempt failed
    Failed,
    /// `cleanup` ran in the parent ahead of a fork
    CleanedUp,
    /// `reconnect` ran in a forked worker
    Reconnected,
}

impl Default for InitState {
    fn default() -> Self {
        InitState::Unexecuted
    }
}

impl std::fmt::Display for InitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitState::Unexecuted => write!(f, "unexecuted"),
            InitState::Executed => write!(f, "executed"),
            InitState::Failed => write!(f, "failed"),
            InitState::CleanedUp => write!(f, "cleaned-up"),
            InitState::Reconnected => write!(f, "reconnected"),
        }
    }
}

/// A hook failure recorded during `run_all` or a fork transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookFailure {
    /// Initializer name
    pub name: String,
    /// Rendered error chain
    pub reason: String,
}

/// Outcome of one `run_all` batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Names whose `execute` succeeded, in execution order
    pub successful: Vec<String>,
    /// Failures, in execution order
    pub failed: Vec<HookFailure>,
    /// When the batch started
    pub started_at: DateTime<Utc>,
    /// When the batch finished
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Names of the failed initializers, in execution order.
    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.name.as_str()).collect()
    }

    /// True when every initializer executed without error.
    pub fn is_fully_successful(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Which fork-transition hook a record covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    /// `cleanup` in the parent, before the fork
    Cleanup,
    /// `reconnect` in a child, after the fork
    Reconnect,
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionKind::Cleanup => write!(f, "cleanup"),
            TransitionKind::Reconnect => write!(f, "reconnect"),
        }
    }
}

/// Record of one fork transition over the fork-sensitive set.
///
/// Reset at the start of every transition; the registry retains only the
/// most recent record per kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Which hook this transition ran
    pub kind: TransitionKind,
    /// Names attempted, in attempt order (failures included)
    pub order: Vec<String>,
    /// Failures among the attempts
    pub errors: Vec<HookFailure>,
    /// When the transition started
    pub started_at: DateTime<Utc>,
    /// When the transition finished
    pub finished_at: DateTime<Utc>,
}

impl TransitionRecord {
    pub(crate) fn begin(kind: TransitionKind) -> Self {
        let now = Utc::now();
        Self {
            kind,
            order: Vec::new(),
            errors: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// Names of the initializers whose hook failed, in attempt order.
    pub fn error_names(&self) -> Vec<&str> {
        self.errors.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Introspection view of one registered initializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializerStatus {
    /// Initializer name
    pub name: String,
    /// Declared phase
    pub phase: Phase,
    /// Current lifecycle state
    pub state: InitState,
    /// Capability tags it claims
    pub provides: Vec<String>,
    /// Most recent hook failure, if any
    pub last_error: Option<String>,
}

/// Aggregate health of the process as seen through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Every recorded hook attempt succeeded
    Healthy,
    /// Some subsystems failed but the process is still serviceable
    Degraded,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Degraded => write!(f, "degraded"),
        }
    }
}

/// Health summary for liveness/readiness reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Aggregate state
    pub state: HealthState,
    /// Initializers whose `execute` failed in the last run
    pub failed_execute: Vec<String>,
    /// Initializers whose `cleanup` failed in the last transition
    pub failed_cleanup: Vec<String>,
    /// Initializers whose `reconnect` failed in the last transition
    pub failed_reconnect: Vec<String>,
}

impl Health {
    /// True when some subsystems failed but the process stays up.
    pub fn is_degraded(&self) -> bool {
        self.state == HealthState::Degraded
    }
}
