//! Defines resource and time constraints for bot execution.
//!
//! Every interaction with a bot process is bounded:
//!
//! - **Startup**: how long a bot may take to be spawned and (optionally) print its ready line
//! - **Per-move timeout**: how long a bot may think about one move
//! - **Time budget**: total thinking time of a bot across a whole match
//! - **Stop grace**: how long a bot may take to exit after its input is closed, before it
//!   is killed
//!
//! A per-bot memory limit can also be set. On Linux with cgroups v2 it makes every bot run
//! inside its own cgroup, so that the bot and all the processes it spawns are limited and
//! killed together.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bot_tournament::constraints::ConstraintsBuilder;
//!
//! let constraints = ConstraintsBuilder::new()
//!     .with_ram_per_agent(2_000)
//!     .with_time_budget(Duration::from_secs(60))
//!     .with_action_timeout(Duration::from_millis(200))
//!     .build()
//!     .unwrap();
//! ```
//!
//! You may also construct constraints from environment variables using
//! [`ConstraintsBuilder::from_env()`] for runtime configurability.

use std::{env, time::Duration};

use crate::error::ConfigurationError;

/// A builder for the limits applied to every bot process.
///
/// By default there is no memory limit, bots have 5 seconds to start, 1 second per move,
/// no overall time budget and 200 milliseconds to exit gracefully.
#[derive(Debug, Default)]
pub struct ConstraintsBuilder {
    agent_ram: Option<usize>,
    startup_time: Option<Duration>,
    action_time: Option<Duration>,
    time_budget: Option<Duration>,
    stop_grace: Option<Duration>,
}

impl ConstraintsBuilder {
    const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
    const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(1);
    const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(200);

    /// Creates a new `ConstraintsBuilder` with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `ConstraintsBuilder` configured from environment variables.
    ///
    /// Read environment variables are:
    /// - `RAM_PER_AGENT` (usize): maximum RAM per bot in MB
    /// - `STARTUP_TIMEOUT_MS` (u64): startup timeout in milliseconds
    /// - `ACTION_TIMEOUT_MS` (u64): timeout per move in milliseconds
    /// - `TIME_BUDGET_SECS` (u64): total time budget per bot and per match in seconds
    /// - `STOP_GRACE_MS` (u64): graceful exit period in milliseconds
    ///
    /// Unset or unparsable variables keep their default.
    #[must_use]
    pub fn from_env() -> Self {
        fn read<T: std::str::FromStr>(var: &str) -> Option<T> {
            env::var(var).ok()?.trim().parse().ok()
        }

        ConstraintsBuilder {
            agent_ram: read("RAM_PER_AGENT"),
            startup_time: read("STARTUP_TIMEOUT_MS").map(Duration::from_millis),
            action_time: read("ACTION_TIMEOUT_MS").map(Duration::from_millis),
            time_budget: read("TIME_BUDGET_SECS").map(Duration::from_secs),
            stop_grace: read("STOP_GRACE_MS").map(Duration::from_millis),
        }
    }

    /// Sets the maximum RAM available per bot (in MB).
    ///
    /// Setting a limit makes bots run inside cgroups (Linux only).
    #[must_use]
    pub fn with_ram_per_agent(mut self, megabytes: usize) -> Self {
        self.agent_ram = Some(megabytes);
        self
    }

    /// Sets how long a bot may take to start.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_time = Some(timeout);
        self
    }

    /// Sets the maximum duration allowed for a single move.
    #[must_use]
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_time = Some(timeout);
        self
    }

    /// Sets the total thinking time of a bot across one match.
    ///
    /// Once spent, the pending move request times out.
    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    /// Sets how long a bot may take to exit once its input is closed.
    #[must_use]
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = Some(grace);
        self
    }

    /// Consumes the builder and returns the constructed `Constraints`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidConstraint`] when a timeout is zero or when the
    /// per-bot RAM exceeds the memory currently available.
    pub fn build(self) -> Result<Constraints, ConfigurationError> {
        let startup_time = self.startup_time.unwrap_or(Self::DEFAULT_STARTUP_TIMEOUT);
        let action_time = self.action_time.unwrap_or(Self::DEFAULT_ACTION_TIMEOUT);
        let time_budget = self.time_budget.unwrap_or(Duration::MAX);
        let stop_grace = self.stop_grace.unwrap_or(Self::DEFAULT_STOP_GRACE);

        for (name, value) in [
            ("startup timeout", startup_time),
            ("action timeout", action_time),
            ("time budget", time_budget),
        ] {
            if value.is_zero() {
                return Err(ConfigurationError::InvalidConstraint(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        let agent_ram = self.agent_ram.map(checked_ram).transpose()?;

        Ok(Constraints {
            agent_ram,
            startup_time,
            action_time,
            time_budget,
            stop_grace,
        })
    }
}

/// Converts a per-bot limit in MB to bytes, refusing what this machine cannot provide.
fn checked_ram(megabytes: usize) -> Result<usize, ConfigurationError> {
    if megabytes == 0 {
        return Err(ConfigurationError::InvalidConstraint(
            "RAM per bot must be greater than zero".to_string(),
        ));
    }
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    let available = system.available_memory() as usize / 1_000_000;
    // an unknown amount reads as zero
    if available > 0 && megabytes > available {
        return Err(ConfigurationError::InvalidConstraint(format!(
            "{megabytes}MB of RAM per bot requested, only {available}MB available"
        )));
    }
    Ok(megabytes.saturating_mul(1_000_000))
}

/// Limits of every bot process, built by [`ConstraintsBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraints {
    pub(crate) agent_ram: Option<usize>,
    pub(crate) startup_time: Duration,
    pub(crate) action_time: Duration,
    pub(crate) time_budget: Duration,
    pub(crate) stop_grace: Duration,
}

impl Constraints {
    pub fn builder() -> ConstraintsBuilder {
        ConstraintsBuilder::new()
    }

    /// Memory limit per bot in bytes, if any.
    pub fn agent_ram(&self) -> Option<usize> {
        self.agent_ram
    }

    /// Per-move timeout.
    pub fn action_timeout(&self) -> Duration {
        self.action_time
    }

    /// Timeout of a move when `used` thinking time was already spent in the match.
    pub(crate) fn move_timeout(&self, used: Duration) -> Duration {
        self.action_time.min(self.time_budget.saturating_sub(used))
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            agent_ram: None,
            startup_time: ConstraintsBuilder::DEFAULT_STARTUP_TIMEOUT,
            action_time: ConstraintsBuilder::DEFAULT_ACTION_TIMEOUT,
            time_budget: Duration::MAX,
            stop_grace: ConstraintsBuilder::DEFAULT_STOP_GRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let c = ConstraintsBuilder::new().build().unwrap();
        assert_eq!(c, Constraints::default());
        assert_eq!(c.action_timeout(), Duration::from_secs(1));
        assert_eq!(c.agent_ram(), None);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ConstraintsBuilder::new()
            .with_action_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidConstraint(_)));
    }

    #[test]
    fn huge_ram_is_rejected() {
        let err = ConstraintsBuilder::new()
            .with_ram_per_agent(usize::MAX / 2_000_000)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidConstraint(_)));
    }

    #[test]
    fn move_timeout_is_capped_by_budget() {
        let c = ConstraintsBuilder::new()
            .with_action_timeout(Duration::from_millis(500))
            .with_time_budget(Duration::from_secs(1))
            .build()
            .unwrap();
        assert_eq!(c.move_timeout(Duration::ZERO), Duration::from_millis(500));
        assert_eq!(
            c.move_timeout(Duration::from_millis(800)),
            Duration::from_millis(200)
        );
        assert_eq!(c.move_timeout(Duration::from_secs(2)), Duration::ZERO);
    }
}
