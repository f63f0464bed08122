//! Initializer contract types for the lifecycle registry.
//!
//! A subsystem contributes startup logic by implementing [`Initializer`]
//! and, when its resources cannot safely cross a process fork, the
//! [`ForkSensitive`] extension with the two fork-transition hooks. The
//! registry only ever talks to these traits; it has no subsystem-specific
//! knowledge.

use crate::context::InitContext;
use serde::{Deserialize, Serialize};

/// Execution phase of an initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Runs once at boot and never again
    Normal,
    /// Holds resources that must be released before a fork and re-acquired after
    ForkSensitive,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Normal
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Normal => write!(f, "normal"),
            Phase::ForkSensitive => write!(f, "fork-sensitive"),
        }
    }
}

/// A unit of subsystem startup logic.
///
/// Implementations perform one-time setup in [`execute`](Initializer::execute)
/// (open connections, configure a client). Environment and configuration
/// lookups are the initializer's own responsibility; the registry passes the
/// [`InitContext`] through unchanged.
///
/// An error returned from `execute` is recorded as a per-initializer failure
/// and does not stop the remaining initializers from running.
///
/// # Example
///
/// ```
/// use prefork::{InitContext, Initializer};
///
/// struct Banner;
///
/// impl Initializer for Banner {
///     fn name(&self) -> &str {
///         "banner"
///     }
///
///     fn execute(&mut self, _ctx: &InitContext) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait Initializer: Send {
    /// Returns the stable name of this initializer, unique within a registry.
    fn name(&self) -> &str;

    /// Returns the phase this initializer participates in.
    ///
    /// Fork-sensitive initializers must override this to declare
    /// [`Phase::ForkSensitive`]; the registry validates the declaration
    /// against the registration at load time.
    fn phase(&self) -> Phase {
        Phase::Normal
    }

    /// Returns the capability tags this initializer claims to set up.
    ///
    /// Capabilities feed introspection and cross-initializer dependency
    /// assertions; they never influence ordering.
    fn provides(&self) -> &[&str] {
        &[]
    }

    /// Performs one-time setup at boot.
    fn execute(&mut self, ctx: &InitContext) -> anyhow::Result<()>;
}

/// A fork-aware initializer.
///
/// Implemented by initializers whose underlying resource cannot be shared
/// across `fork(2)`: socket-backed connection pools, message-queue clients,
/// anything holding a file descriptor that two processes must not use
/// concurrently.
pub trait ForkSensitive: Initializer {
    /// Releases or quiesces resources that must not cross the fork boundary.
    ///
    /// Runs in the parent, strictly before the fork. Must be safe to call
    /// repeatedly and after a partially failed `execute`.
    fn cleanup(&mut self) -> anyhow::Result<()>;

    /// Re-establishes what [`cleanup`](ForkSensitive::cleanup) released,
    /// scoped to the calling process.
    ///
    /// Runs once per worker, in the child, before it serves any request.
    fn reconnect(&mut self) -> anyhow::Result<()>;
}

/// A typed registration entry for the registry.
///
/// The two constructors encode the fork contract in the type system: a
/// fork-sensitive registration is only possible for a type that implements
/// both fork hooks. Load-time validation then checks the declared
/// [`Phase`] against the registration slot.
pub enum Registration {
    /// An initializer that runs once at boot
    Normal(Box<dyn Initializer>),
    /// An initializer that participates in fork transitions
    ForkSensitive(Box<dyn ForkSensitive>),
}

impl Registration {
    /// Register an initializer for the normal phase.
    pub fn normal<I: Initializer + 'static>(initializer: I) -> Self {
        Registration::Normal(Box::new(initializer))
    }

    /// Register an initializer for the fork-sensitive phase.
    pub fn fork_sensitive<I: ForkSensitive + 'static>(initializer: I) -> Self {
        Registration::ForkSensitive(Box::new(initializer))
    }

    /// The registered initializer's name.
    pub fn name(&self) -> &str {
        match self {
            Registration::Normal(init) => init.name(),
            Registration::ForkSensitive(init) => init.name(),
        }
    }

    /// The phase the initializer declares.
    pub fn phase(&self) -> Phase {
        match self {
            Registration::Normal(init) => init.phase(),
            Registration::ForkSensitive(init) => init.phase(),
        }
    }

    /// The capability tags the initializer claims.
    pub fn provides(&self) -> &[&str] {
        match self {
            Registration::Normal(init) => init.provides(),
            Registration::ForkSensitive(init) => init.provides(),
        }
    }

    /// Whether this registration carries the fork hooks.
    pub fn has_fork_hooks(&self) -> bool {
        matches!(self, Registration::ForkSensitive(_))
    }

    /// View of the fork hooks, when present.
    pub fn as_fork_sensitive(&self) -> Option<&dyn ForkSensitive> {
        match self {
            Registration::Normal(_) => None,
            Registration::ForkSensitive(init) => Some(init.as_ref()),
        }
    }

    pub(crate) fn as_fork_sensitive_mut(&mut self) -> Option<&mut dyn ForkSensitive> {
        match self {
            Registration::Normal(_) => None,
            Registration::ForkSensitive(init) => Some(init.as_mut()),
        }
    }

    pub(crate) fn execute(&mut self, ctx: &InitContext) -> anyhow::Result<()> {
        match self {
            Registration::Normal(init) => init.execute(ctx),
            Registration::ForkSensitive(init) => init.execute(ctx),
        }
    }
}
