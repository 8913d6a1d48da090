//! Error kinds surfaced by the arena.
//!
//! Every fault is a variant of a closed enumeration so that each layer (bot adapter,
//! match runner, series/round, tournament) can pattern-match on *what* went wrong
//! instead of inspecting messages:
//!
//! - [`LaunchError`]: a bot process could not be started. Fatal to the match.
//! - [`ExecutionError`]: a bot misbehaved mid-match (timeout, garbage output, crash).
//!   Fatal to the current match only.
//! - [`ConfigurationError`]: the tournament setup is invalid, or an operation was
//!   called in the wrong state.
//! - [`Error::NoResultsYet`] / [`Error::NotFinished`]: results were read before the
//!   work producing them completed.

use std::{any::Any, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::match_log::MatchId;

/// Convenient alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A participant's program could not be started.
#[derive(Debug, Clone, Error)]
#[error("could not launch '{participant}': {reason}")]
pub struct LaunchError {
    /// Name of the participant whose process failed to start.
    pub participant: String,
    /// Human readable cause.
    pub reason: String,
}

impl LaunchError {
    pub(crate) fn new(participant: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            reason: reason.into(),
        }
    }
}

/// What a bot did wrong while a move was requested.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExecutionFailure {
    /// No response arrived in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),
    /// The response could not be decoded into a move.
    #[error("malformed output: {0}")]
    MalformedOutput(String),
    /// The process closed its output channel or exited cleanly mid-match.
    #[error("process exited")]
    ProcessExited,
    /// The process exited with a failure code.
    #[error("process exited with code {0}")]
    NonZeroExit(i32),
}

/// A participant misbehaved during a match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{participant}' failed: {reason}")]
pub struct ExecutionError {
    /// Name of the faulty participant.
    pub participant: String,
    /// What happened.
    pub reason: ExecutionFailure,
}

impl ExecutionError {
    pub(crate) fn new(participant: impl Into<String>, reason: ExecutionFailure) -> Self {
        Self {
            participant: participant.into(),
            reason,
        }
    }
}

/// Invalid tournament setup, or an operation called out of order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A tournament needs at least one participant.
    #[error("a tournament needs at least one participant")]
    NoParticipants,
    /// Two participants share the same name.
    #[error("participant '{0}' is registered twice")]
    DuplicateParticipant(String),
    /// A ranking was requested before any round result was applied.
    #[error("no round result has been applied yet")]
    NoResultsApplied,
    /// A final ranking was requested while rounds are still to be played.
    #[error("the tournament still has rounds to play")]
    TournamentInProgress,
    /// The tournament was already run, to completion or until it aborted.
    #[error("the tournament already ran")]
    AlreadyRan,
    /// `next_round` was called while the previous round was not applied.
    #[error("round {0} is still in progress")]
    RoundInProgress(u32),
    /// `apply_results` was called while no round was in progress.
    #[error("no round is in progress")]
    NoRoundInProgress,
    /// The round token does not belong to the round in progress.
    #[error("round token for round {got} does not match round {expected}")]
    StaleRoundToken {
        /// Round currently in progress.
        expected: u32,
        /// Round the token was issued for.
        got: u32,
    },
    /// No pairing system name was configured.
    #[error("no pairing system was chosen")]
    PairingSystemNotChosen,
    /// The configured pairing system name is not known.
    #[error("unknown pairing system '{0}'")]
    UnknownPairingSystem(String),
    /// A resource or time constraint is impossible.
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),
    /// A result mentions a participant the pairing system does not know.
    #[error("result mentions unknown participant '{0}'")]
    UnknownParticipant(String),
}

/// Every error the arena can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// See [`LaunchError`].
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// See [`ExecutionError`].
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// The game's rule authority raised a fault.
    #[error("rule authority fault: {0:#}")]
    RuleAuthority(anyhow::Error),
    /// The rule authority finished the match with an unusable score list.
    #[error("invalid final scores: {0}")]
    InvalidScores(String),
    /// The rule authority did not finish the match within the tick cap.
    #[error("match did not finish within {0} ticks")]
    TickLimit(usize),
    /// A snapshot was appended to a finished log.
    #[error("match log is already terminal")]
    LogTerminal,
    /// The rule authority asked a move from a player number that does not exist.
    #[error("no player #{0} in this match")]
    UnknownPlayer(usize),
    /// See [`ConfigurationError`].
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A series was queried before it ran to completion.
    #[error("series has no results yet")]
    NoResultsYet,
    /// A tournament was queried before its last round was applied.
    #[error("tournament is not finished")]
    NotFinished,
    /// A match failed; `source` holds the reason.
    #[error("match {id} failed: {source}")]
    MatchFailed {
        /// Identity of the failed match.
        id: MatchId,
        /// Underlying fault.
        #[source]
        source: Box<Error>,
    },
    /// A persisted record is inconsistent.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
    /// A record could not be (de)serialized.
    #[error("persistence error: {0}")]
    Persistence(#[from] serde_json::Error),
    /// I/O while reading or writing records.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Name of the participant responsible for this error, if any.
    pub fn culprit(&self) -> Option<&str> {
        match self {
            Error::Launch(e) => Some(&e.participant),
            Error::Execution(e) => Some(&e.participant),
            Error::MatchFailed { source, .. } => source.culprit(),
            _ => None,
        }
    }

    /// The innermost error, skipping [`Error::MatchFailed`] wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::MatchFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// A rule authority error describing a caught panic.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Error {
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown panic payload");
        Error::RuleAuthority(anyhow::anyhow!("game code panicked: {message}"))
    }
}
