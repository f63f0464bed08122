//! Fork-safe initializer lifecycle registry for preforking servers.
//!
//! A preforking server starts shared subsystem resources (database pools,
//! message-queue connections, log sinks) once in a master process, then
//! forks workers to serve requests. Resources backed by sockets or other
//! file descriptors must not be shared across that fork: the master
//! releases them just before forking, and every child re-establishes its
//! own. This crate provides the registry that orchestrates those
//! transitions:
//!
//! - Ordered, deterministic execution of registered initializers
//! - Per-initializer fault containment: one failing subsystem degrades the
//!   process, it never brings it down
//! - The two fork-transition entry points a process supervisor calls
//!   (`cleanup_before_fork` in the parent, `reconnect_after_fork` in each
//!   child)
//! - Load-time validation of the fork contract, before any fork happens
//! - Status and health introspection for degraded-mode reporting
//!
//! # Architecture
//!
//! - **[`Initializer`] / [`ForkSensitive`]**: the contract one subsystem
//!   implements; the registry has no subsystem-specific knowledge
//! - **[`Registry`]**: ordering, batch execution, fault containment, and
//!   the retained run/transition records
//! - **[`PreforkSupervisor`]**: reference harness that drives the registry
//!   through `fork(2)`
//!
//! # Example
//!
//! ```
//! use prefork::{InitContext, Initializer, Registration, Registry};
//!
//! struct Banner;
//!
//! impl Initializer for Banner {
//!     fn name(&self) -> &str {
//!         "banner"
//!     }
//!
//!     fn execute(&mut self, _ctx: &InitContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> prefork::Result<()> {
//! let mut registry = Registry::new();
//! registry.load(vec![Registration::normal(Banner)])?;
//!
//! let report = registry.run_all(&InitContext::default());
//! assert_eq!(report.successful, vec!["banner"]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod initializer;
pub mod registry;
pub mod report;
pub mod supervisor;

// Re-export main types
pub use config::Config;
pub use context::InitContext;
pub use error::{Error, Result};
pub use initializer::{ForkSensitive, Initializer, Phase, Registration};
pub use registry::Registry;
pub use report::{
    Health, HealthState, HookFailure, InitState, InitializerStatus, RunReport, TransitionKind,
    TransitionRecord,
};
pub use supervisor::{PreforkConfig, PreforkSupervisor, WorkerExit};
