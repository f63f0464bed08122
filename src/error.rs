//! Error types for the initializer registry and the prefork supervisor.

use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the registry and the prefork supervisor.
///
/// Configuration errors (`DuplicateName`, `MissingForkHooks`,
/// `UnexpectedForkHooks`) are raised at load/validation time, before any
/// hook runs. Failures inside initializer hooks are never surfaced here;
/// they are recorded in the run and transition records instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Duplicate initializer name
    #[error("Duplicate initializer name: {0}")]
    DuplicateName(String),

    /// Fork-sensitive initializer registered without fork hooks
    #[error("Initializer {0} declares the fork-sensitive phase but was registered without cleanup/reconnect hooks")]
    MissingForkHooks(String),

    /// Normal-phase initializer registered with fork hooks
    #[error("Initializer {0} declares the normal phase but was registered as fork-sensitive")]
    UnexpectedForkHooks(String),

    /// No registered initializer provides a required capability
    #[error("No initializer provides required capability: {0}")]
    MissingCapability(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Nix error
    #[error("System error: {0}")]
    Nix(#[from] nix::Error),
}
