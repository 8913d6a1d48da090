//! Tournament settings that are not resource limits.
//!
//! This module provides configuration options for controlling how matches are run and
//! how faults are handled.
//!
//! Start from [`Configuration::new()`] and chain the `with_*` setters, or read everything from
//! the environment with [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! Every variable is optional. Flags are enabled by `"true"`, in any case.
//!
//! - `EVAL_VERBOSE`: Print match results and final standings (default: `true`)
//! - `EVAL_LOG`: Enable logging to a file (default: `false`)
//! - `EVAL_ALLOW_UNCONTAINED`: Run bots without a cgroup if one cannot be created (default: `false`)
//! - `EVAL_DEBUG_AGENT_STDERR`: Print bot stderr for debugging (default: `false`)
//! - `EVAL_MAX_CONCURRENT_MATCHES`: Matches run at the same time, `0` meaning one per physical CPU (default: `0`)
//! - `EVAL_FAILURE_POLICY`: `abort`, `forfeit` or `discard` (default: `abort`)
//! - `EVAL_MAX_TICKS`: Maximum number of ticks per match (default: unlimited)
//! - `EVAL_READY_LINE`: Line a bot must print once started (default: no handshake)
//! - `EVAL_PAIRING_SYSTEM`: Name of the pairing system (see [`crate::tournament_strategy::create`])

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What the tournament does with a match that failed (bot crash, timeout, rule authority fault).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Stop the tournament and report the fault.
    #[default]
    Abort,
    /// The faulty participant loses the match, everyone else wins it.
    /// Failures without an identified culprit are discarded.
    Forfeit,
    /// Treat the match as never played.
    Discard,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "forfeit" => Ok(FailurePolicy::Forfeit),
            "discard" => Ok(FailurePolicy::Discard),
            other => Err(format!("unknown failure policy '{other}'")),
        }
    }
}

/// Configuration for tournament behaviors.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) allow_uncontained: bool,
    pub(crate) debug_agent_stderr: bool,
    pub(crate) max_concurrent_matches: usize,
    pub(crate) failure_policy: FailurePolicy,
    pub(crate) max_ticks: Option<usize>,
    pub(crate) ready_line: Option<String>,
    pub(crate) pairing_system: Option<String>,
}

impl Configuration {
    /// The default configuration.
    ///
    /// By default:
    /// - Match results and final standings are printed to stdout.
    /// - Nothing is logged to a file.
    /// - Bots that cannot be contained are not launched.
    /// - Bot stderr output is disabled.
    /// - One match runs per physical CPU.
    /// - A failed match aborts the tournament.
    /// - Matches have no tick cap and bots need no startup handshake.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            allow_uncontained: false,
            debug_agent_stderr: false,
            max_concurrent_matches: 0,
            failure_policy: FailurePolicy::Abort,
            max_ticks: None,
            ready_line: None,
            pairing_system: None,
        }
    }

    /// Configuration read from `EVAL_*` environment variables.
    ///
    /// See the [module documentation](self) for the recognized variables. Any unset or
    /// unparsable value falls back to the default of [`Configuration::new`].
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_parsed<T: FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok()?.trim().parse().ok()
        }

        let defaults = Self::new();
        Self {
            verbose: get_env_flag("EVAL_VERBOSE", defaults.verbose),
            log: get_env_flag("EVAL_LOG", defaults.log),
            allow_uncontained: get_env_flag("EVAL_ALLOW_UNCONTAINED", defaults.allow_uncontained),
            debug_agent_stderr: get_env_flag(
                "EVAL_DEBUG_AGENT_STDERR",
                defaults.debug_agent_stderr,
            ),
            max_concurrent_matches: get_env_parsed("EVAL_MAX_CONCURRENT_MATCHES")
                .unwrap_or(defaults.max_concurrent_matches),
            failure_policy: get_env_parsed("EVAL_FAILURE_POLICY")
                .unwrap_or(defaults.failure_policy),
            max_ticks: get_env_parsed("EVAL_MAX_TICKS"),
            ready_line: std::env::var("EVAL_READY_LINE").ok(),
            pairing_system: std::env::var("EVAL_PAIRING_SYSTEM").ok(),
        }
    }

    /// Enable or disable console output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable running bots without cgroup containment when it is unavailable.
    pub fn with_allow_uncontained(mut self, value: bool) -> Self {
        self.allow_uncontained = value;
        self
    }

    /// Enable or disable bot stderr output (debug purposes only).
    pub fn with_debug_agent_stderr(mut self, value: bool) -> Self {
        self.debug_agent_stderr = value;
        self
    }

    /// Number of matches allowed to run at the same time. `0` means one per physical CPU.
    pub fn with_max_concurrent_matches(mut self, value: usize) -> Self {
        self.max_concurrent_matches = value;
        self
    }

    /// What to do with failed matches.
    pub fn with_failure_policy(mut self, value: FailurePolicy) -> Self {
        self.failure_policy = value;
        self
    }

    /// Abort a match whose rule authority has not finished it after `value` ticks.
    pub fn with_max_ticks(mut self, value: usize) -> Self {
        self.max_ticks = Some(value);
        self
    }

    /// Require every bot to print `line` on its output once it is ready to play.
    pub fn with_ready_line(mut self, line: impl Into<String>) -> Self {
        self.ready_line = Some(line.into());
        self
    }

    /// Name of the pairing system used by [`crate::tournament_strategy::create`].
    pub fn with_pairing_system(mut self, name: impl Into<String>) -> Self {
        self.pairing_system = Some(name.into());
        self
    }

    /// Configured failure policy.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Configured pairing system name, if any.
    pub fn pairing_system(&self) -> Option<&str> {
        self.pairing_system.as_deref()
    }

    /// Number of worker threads a round may use.
    pub(crate) fn worker_count(&self) -> usize {
        if self.max_concurrent_matches == 0 {
            num_cpus::get_physical().max(1)
        } else {
            self.max_concurrent_matches
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_policy_parses_case_insensitively() {
        assert_eq!("Forfeit".parse(), Ok(FailurePolicy::Forfeit));
        assert_eq!("DISCARD".parse(), Ok(FailurePolicy::Discard));
        assert!("retry".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn auto_worker_count_is_positive() {
        let config = Configuration::new();
        assert!(config.worker_count() >= 1);
        assert_eq!(config.with_max_concurrent_matches(3).worker_count(), 3);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = Configuration::new()
            .with_verbose(false)
            .with_failure_policy(FailurePolicy::Discard)
            .with_ready_line("ready")
            .with_pairing_system("swiss");
        assert!(!config.verbose);
        assert_eq!(config.failure_policy(), FailurePolicy::Discard);
        assert_eq!(config.ready_line.as_deref(), Some("ready"));
        assert_eq!(config.pairing_system(), Some("swiss"));
    }
}
