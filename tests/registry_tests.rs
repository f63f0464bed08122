//! Tests for the initializer registry lifecycle contract.

use prefork::{
    Error, ForkSensitive, HealthState, InitContext, InitState, Initializer, Phase, Registration,
    Registry,
};
use std::sync::{Arc, Mutex};

/// Shared log of hook invocations, as "name:hook" entries.
type CallLog = Arc<Mutex<Vec<String>>>;

fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Configurable test initializer recording every hook call.
struct Probe {
    name: &'static str,
    phase: Phase,
    provides: &'static [&'static str],
    log: CallLog,
    fail_execute: bool,
    fail_cleanup: bool,
    fail_reconnect: bool,
}

impl Probe {
    fn normal(name: &'static str, log: &CallLog) -> Self {
        Self {
            name,
            phase: Phase::Normal,
            provides: &[],
            log: Arc::clone(log),
            fail_execute: false,
            fail_cleanup: false,
            fail_reconnect: false,
        }
    }

    fn fork_sensitive(name: &'static str, log: &CallLog) -> Self {
        Self {
            phase: Phase::ForkSensitive,
            ..Self::normal(name, log)
        }
    }

    fn with_provides(mut self, provides: &'static [&'static str]) -> Self {
        self.provides = provides;
        self
    }

    fn with_fail_execute(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    fn with_fail_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    fn with_fail_reconnect(mut self) -> Self {
        self.fail_reconnect = true;
        self
    }

    fn record(&self, hook: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, hook));
    }
}

impl Initializer for Probe {
    fn name(&self) -> &str {
        self.name
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn provides(&self) -> &[&str] {
        self.provides
    }

    fn execute(&mut self, _ctx: &InitContext) -> anyhow::Result<()> {
        self.record("execute");
        if self.fail_execute {
            anyhow::bail!("{} refused to start", self.name);
        }
        Ok(())
    }
}

impl ForkSensitive for Probe {
    fn cleanup(&mut self) -> anyhow::Result<()> {
        self.record("cleanup");
        if self.fail_cleanup {
            anyhow::bail!("{} could not release its connection", self.name);
        }
        Ok(())
    }

    fn reconnect(&mut self) -> anyhow::Result<()> {
        self.record("reconnect");
        if self.fail_reconnect {
            anyhow::bail!("{} could not re-establish its connection", self.name);
        }
        Ok(())
    }
}

mod loading {
    use super::*;

    #[test]
    fn test_load_preserves_registration_order() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![
                Registration::normal(Probe::normal("settings", &log)),
                Registration::fork_sensitive(Probe::fork_sensitive("db-pool", &log)),
                Registration::normal(Probe::normal("templates", &log)),
            ])
            .unwrap();

        assert_eq!(registry.names(), vec!["settings", "db-pool", "templates"]);
    }

    #[test]
    fn test_load_never_executes() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![Registration::fork_sensitive(Probe::fork_sensitive(
                "db-pool", &log,
            ))])
            .unwrap();

        assert!(calls(&log).is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let log = new_log();
        let mut registry = Registry::new();
        let err = registry
            .load(vec![
                Registration::normal(Probe::normal("cache", &log)),
                Registration::normal(Probe::normal("cache", &log)),
            ])
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateName(name) if name == "cache"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_name_across_loads_rejected() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![Registration::normal(Probe::normal("cache", &log))])
            .unwrap();

        let err = registry
            .load(vec![Registration::normal(Probe::normal("cache", &log))])
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateName(name) if name == "cache"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_fork_sensitive_without_hooks_fails_before_any_execute() {
        let log = new_log();
        let mut registry = Registry::new();

        // Declares the fork-sensitive phase but is registered without hooks.
        let err = registry
            .load(vec![Registration::normal(Probe::fork_sensitive(
                "db-pool", &log,
            ))])
            .unwrap_err();

        assert!(matches!(err, Error::MissingForkHooks(name) if name == "db-pool"));
        assert!(registry.is_empty());
        assert!(calls(&log).is_empty());
    }

    #[test]
    fn test_normal_phase_with_fork_hooks_rejected() {
        let log = new_log();
        let mut registry = Registry::new();
        let err = registry
            .load(vec![Registration::fork_sensitive(Probe::normal(
                "cache", &log,
            ))])
            .unwrap_err();

        assert!(matches!(err, Error::UnexpectedForkHooks(name) if name == "cache"));
    }

    #[test]
    fn test_load_batch_is_atomic() {
        let log = new_log();
        let mut registry = Registry::new();
        let result = registry.load(vec![
            Registration::normal(Probe::normal("settings", &log)),
            Registration::normal(Probe::fork_sensitive("db-pool", &log)),
        ]);

        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}

mod run_all {
    use super::*;

    #[test]
    fn test_every_initializer_attempted_despite_failure() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![
                Registration::normal(Probe::normal("one", &log)),
                Registration::normal(Probe::normal("two", &log).with_fail_execute()),
                Registration::normal(Probe::normal("three", &log)),
            ])
            .unwrap();

        let report = registry.run_all(&InitContext::default());

        assert_eq!(report.successful, vec!["one", "three"]);
        assert_eq!(report.failed_names(), vec!["two"]);
        assert_eq!(
            calls(&log),
            vec!["one:execute", "two:execute", "three:execute"]
        );
    }

    #[test]
    fn test_failure_reason_recorded() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![Registration::normal(
                Probe::normal("two", &log).with_fail_execute(),
            )])
            .unwrap();

        let report = registry.run_all(&InitContext::default());

        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].reason.contains("refused to start"));
    }

    #[test]
    fn test_report_retained_for_later_inspection() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![Registration::normal(Probe::normal("one", &log))])
            .unwrap();

        registry.run_all(&InitContext::default());

        let retained = registry.last_run().unwrap();
        assert_eq!(retained.successful, vec!["one"]);
        assert!(retained.is_fully_successful());
    }
}

mod fork_transitions {
    use super::*;

    #[test]
    fn test_cleanup_then_reconnect_once_each_in_order() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![
                Registration::fork_sensitive(Probe::fork_sensitive("db-pool", &log)),
                Registration::normal(Probe::normal("templates", &log)),
                Registration::fork_sensitive(Probe::fork_sensitive("queue", &log)),
            ])
            .unwrap();

        registry.run_all(&InitContext::default());
        log.lock().unwrap().clear();

        let cleanup = registry.cleanup_before_fork();
        let reconnect = registry.reconnect_after_fork();

        assert_eq!(cleanup.order, vec!["db-pool", "queue"]);
        assert_eq!(reconnect.order, vec!["db-pool", "queue"]);
        assert_eq!(
            calls(&log),
            vec![
                "db-pool:cleanup",
                "queue:cleanup",
                "db-pool:reconnect",
                "queue:reconnect"
            ]
        );
    }

    #[test]
    fn test_cleanup_failure_does_not_stop_later_cleanups() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![
                Registration::fork_sensitive(
                    Probe::fork_sensitive("db-pool", &log).with_fail_cleanup(),
                ),
                Registration::fork_sensitive(Probe::fork_sensitive("queue", &log)),
            ])
            .unwrap();

        let cleanup = registry.cleanup_before_fork();

        assert_eq!(cleanup.order, vec!["db-pool", "queue"]);
        assert_eq!(cleanup.error_names(), vec!["db-pool"]);
        assert!(calls(&log).contains(&"queue:cleanup".to_string()));
    }

    #[test]
    fn test_full_lifecycle_scenario() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![
                Registration::fork_sensitive(Probe::fork_sensitive("Init1", &log)),
                Registration::fork_sensitive(Probe::fork_sensitive("Init2", &log)),
                Registration::fork_sensitive(Probe::fork_sensitive("Init3", &log)),
                Registration::fork_sensitive(
                    Probe::fork_sensitive("FailingCleanup", &log).with_fail_cleanup(),
                ),
                Registration::fork_sensitive(
                    Probe::fork_sensitive("FailingReconnect", &log).with_fail_reconnect(),
                ),
            ])
            .unwrap();

        let report = registry.run_all(&InitContext::default());
        assert_eq!(report.successful.len(), 5);

        let cleanup = registry.cleanup_before_fork();
        assert_eq!(
            cleanup.order,
            vec!["Init1", "Init2", "Init3", "FailingCleanup", "FailingReconnect"]
        );
        assert_eq!(cleanup.error_names(), vec!["FailingCleanup"]);

        let reconnect = registry.reconnect_after_fork();
        assert_eq!(
            reconnect.order,
            vec!["Init1", "Init2", "Init3", "FailingCleanup", "FailingReconnect"]
        );
        assert_eq!(reconnect.error_names(), vec!["FailingReconnect"]);

        // The process stays serviceable: the health check answers and
        // reports degraded instead of failing.
        let health = registry.health();
        assert!(health.is_degraded());
        assert!(health.failed_execute.is_empty());
        assert_eq!(health.failed_cleanup, vec!["FailingCleanup"]);
        assert_eq!(health.failed_reconnect, vec!["FailingReconnect"]);
    }

    #[test]
    fn test_normal_phase_excluded_from_transitions() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![
                Registration::normal(Probe::normal("settings", &log)),
                Registration::fork_sensitive(Probe::fork_sensitive("db-pool", &log)),
            ])
            .unwrap();

        let cleanup = registry.cleanup_before_fork();
        let reconnect = registry.reconnect_after_fork();

        assert_eq!(cleanup.order, vec!["db-pool"]);
        assert_eq!(reconnect.order, vec!["db-pool"]);
        assert!(!calls(&log).contains(&"settings:cleanup".to_string()));
    }

    #[test]
    fn test_fork_sensitive_filter_preserves_order() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![
                Registration::fork_sensitive(Probe::fork_sensitive("db-pool", &log)),
                Registration::normal(Probe::normal("settings", &log)),
                Registration::fork_sensitive(Probe::fork_sensitive("queue", &log)),
                Registration::normal(Probe::normal("templates", &log)),
            ])
            .unwrap();

        assert_eq!(registry.fork_sensitive_names(), vec!["db-pool", "queue"]);
        assert_eq!(registry.fork_sensitive_initializers().len(), 2);
    }

    #[test]
    fn test_second_transition_resets_accumulators() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![
                Registration::fork_sensitive(
                    Probe::fork_sensitive("db-pool", &log).with_fail_cleanup(),
                ),
                Registration::fork_sensitive(Probe::fork_sensitive("queue", &log)),
            ])
            .unwrap();

        registry.cleanup_before_fork();
        let second = registry.cleanup_before_fork();

        // A fresh record per transition, not an appended one.
        assert_eq!(second.order, vec!["db-pool", "queue"]);
        assert_eq!(second.error_names(), vec!["db-pool"]);

        let retained = registry.last_cleanup().unwrap();
        assert_eq!(retained.order.len(), 2);
        assert_eq!(retained.errors.len(), 1);
    }
}

mod introspection {
    use super::*;

    #[test]
    fn test_providers_and_capabilities() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![
                Registration::fork_sensitive(
                    Probe::fork_sensitive("db-pool", &log).with_provides(&["database"]),
                ),
                Registration::fork_sensitive(
                    Probe::fork_sensitive("replica-pool", &log).with_provides(&["database"]),
                ),
                Registration::normal(Probe::normal("log-sink", &log).with_provides(&["logging"])),
            ])
            .unwrap();

        assert_eq!(
            registry.providers_of("database"),
            vec!["db-pool", "replica-pool"]
        );
        assert_eq!(registry.providers_of("metrics"), Vec::<&str>::new());

        let capabilities = registry.provided_capabilities();
        assert!(capabilities.contains("database"));
        assert!(capabilities.contains("logging"));
    }

    #[test]
    fn test_require_capabilities() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![Registration::normal(
                Probe::normal("log-sink", &log).with_provides(&["logging"]),
            )])
            .unwrap();

        assert!(registry.require_capabilities(&["logging"]).is_ok());

        let err = registry
            .require_capabilities(&["logging", "database"])
            .unwrap_err();
        assert!(matches!(err, Error::MissingCapability(cap) if cap == "database"));
    }

    #[test]
    fn test_status_tracks_lifecycle_states() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![
                Registration::normal(Probe::normal("one", &log)),
                Registration::normal(Probe::normal("two", &log).with_fail_execute()),
            ])
            .unwrap();

        let before: Vec<_> = registry.status();
        assert!(before.iter().all(|s| s.state == InitState::Unexecuted));

        registry.run_all(&InitContext::default());

        let after = registry.status();
        assert_eq!(after[0].state, InitState::Executed);
        assert!(after[0].last_error.is_none());
        assert_eq!(after[1].state, InitState::Failed);
        assert!(after[1].last_error.as_ref().unwrap().contains("refused"));
    }

    #[test]
    fn test_status_after_fork_transitions() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![Registration::fork_sensitive(Probe::fork_sensitive(
                "db-pool", &log,
            ))])
            .unwrap();

        registry.run_all(&InitContext::default());
        registry.cleanup_before_fork();
        assert_eq!(registry.status()[0].state, InitState::CleanedUp);

        registry.reconnect_after_fork();
        assert_eq!(registry.status()[0].state, InitState::Reconnected);
    }
}

mod reset {
    use super::*;

    #[test]
    fn test_soft_reset_clears_and_allows_reload() {
        let log = new_log();
        let mut registry = Registry::new();
        registry
            .load(vec![Registration::fork_sensitive(
                Probe::fork_sensitive("db-pool", &log).with_fail_cleanup(),
            )])
            .unwrap();

        registry.run_all(&InitContext::default());
        registry.cleanup_before_fork();
        assert!(registry.health().is_degraded());

        registry.soft_reset();

        assert!(registry.is_empty());
        assert!(registry.last_run().is_none());
        assert!(registry.last_cleanup().is_none());
        assert_eq!(registry.health().state, HealthState::Healthy);

        // The same names load cleanly into the reinstated registry.
        registry
            .load(vec![Registration::fork_sensitive(Probe::fork_sensitive(
                "db-pool", &log,
            ))])
            .unwrap();
        let report = registry.run_all(&InitContext::default());
        assert_eq!(report.successful, vec!["db-pool"]);
    }
}
