//! Tournament formats used to schedule the groupings of every round.
//!
//! This module defines the [`PairingSystem`] trait and the built-in formats:
//! - [`RoundRobinTournament`]: every participant meets every other one (optionally twice).
//! - [`SwissTournament`]: pairings based on score. Much faster than round robin.
//! - [`SingleEliminationTournament`]: knockout bracket.
//! - [`SinglePlayerTournament`]: each participant plays alone, several times.
//!
//! A pairing system owns the [`Standings`]. The tournament calls
//! [`next_round`](PairingSystem::next_round), plays the returned groupings, then hands the
//! results back with [`apply_results`](PairingSystem::apply_results), until `next_round`
//! returns `None`.
//!
//! ```text
//! Idle --next_round--> RoundInProgress --apply_results--> Idle
//!  \--next_round (no more rounds)--> Finished
//! ```
//!
//! Every [`RoundPlan`] carries a single-use [`RoundToken`] that `apply_results` consumes, so
//! results are applied at most once per round.

mod elimination;
mod round_robin;
mod single_player;
mod swiss;

use std::{
    cmp::Ordering as CmpOrdering,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

pub use elimination::SingleEliminationTournament;
pub use round_robin::RoundRobinTournament;
pub use single_player::SinglePlayerTournament;
pub use swiss::SwissTournament;

use crate::{
    error::ConfigurationError,
    participant::{check_roster, Participant},
    round::{Grouping, RoundResult},
    standings::{StandingEntry, Standings},
};

/// Proof that a round was planned. Consumed when its results are applied.
#[derive(Debug)]
pub struct RoundToken {
    owner: u64,
    round: u32,
}

impl RoundToken {
    pub fn round(&self) -> u32 {
        self.round
    }
}

/// Groupings of the next round.
#[derive(Debug)]
pub struct RoundPlan {
    round: u32,
    groupings: Vec<Grouping>,
    byes: Vec<Arc<Participant>>,
    token: RoundToken,
}

impl RoundPlan {
    /// Round number, starting at 1.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Participants playing together. Grouping `i` is played as series `i`.
    pub fn groupings(&self) -> &[Grouping] {
        &self.groupings
    }

    /// Participants not playing this round.
    pub fn byes(&self) -> &[Arc<Participant>] {
        &self.byes
    }

    pub fn into_token(self) -> RoundToken {
        self.token
    }
}

/// A tournament format.
///
/// Rankings are total orders: every format documents its tie-breaks, and ends with the
/// participant name (or seed) so that equal standings never depend on hashing or timing.
pub trait PairingSystem: Send {
    fn name(&self) -> &'static str;

    /// Players per grouping.
    fn players_per_match(&self) -> usize;

    /// Registered participants, in registration order.
    fn participants(&self) -> &[Arc<Participant>];

    /// Plans the next round from the current standings. `None` once the tournament is over.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::RoundInProgress`] if the previous round was not applied.
    fn next_round(&mut self) -> Result<Option<RoundPlan>, ConfigurationError>;

    /// Updates the standings with the results of the round `token` was issued for.
    ///
    /// Nothing changes when an error is returned.
    fn apply_results(
        &mut self,
        token: RoundToken,
        result: &RoundResult,
    ) -> Result<(), ConfigurationError>;

    fn standings(&self) -> &Standings;

    fn is_finished(&self) -> bool;

    /// Number of rounds whose results were applied.
    fn rounds_applied(&self) -> u32;

    /// Participants ordered by the current standings, best first.
    fn ranking(&self) -> Vec<Arc<Participant>>;

    /// Ranking once the tournament is over.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::NoResultsApplied`] if no round was applied,
    /// [`ConfigurationError::TournamentInProgress`] if rounds remain.
    fn final_ranking(&self) -> Result<Vec<Arc<Participant>>, ConfigurationError> {
        if self.rounds_applied() == 0 {
            return Err(ConfigurationError::NoResultsApplied);
        }
        if !self.is_finished() {
            return Err(ConfigurationError::TournamentInProgress);
        }
        Ok(self.ranking())
    }

    /// Ranking at any time after the first applied round.
    fn interim_ranking(&self) -> Result<Vec<Arc<Participant>>, ConfigurationError> {
        if self.rounds_applied() == 0 {
            return Err(ConfigurationError::NoResultsApplied);
        }
        Ok(self.ranking())
    }
}

/// Options of [`create`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PairingOptions {
    /// Number of rounds of Swiss and single player tournaments. `None` for the default
    /// (`ceil(log2 n)` for Swiss, 1 for single player).
    pub rounds: Option<u32>,
}

/// Names accepted by [`create`].
pub const PAIRING_SYSTEMS: [&str; 5] = [
    "round-robin",
    "double-round-robin",
    "swiss",
    "single-elimination",
    "single-player",
];

/// Creates a pairing system from its name.
///
/// # Errors
///
/// [`ConfigurationError::PairingSystemNotChosen`] without a name,
/// [`ConfigurationError::UnknownPairingSystem`] for a name not in [`PAIRING_SYSTEMS`], and
/// the errors of the chosen format's constructor.
pub fn create(
    name: Option<&str>,
    participants: Vec<Arc<Participant>>,
    options: PairingOptions,
) -> Result<Box<dyn PairingSystem>, ConfigurationError> {
    let name = name.ok_or(ConfigurationError::PairingSystemNotChosen)?;
    let system: Box<dyn PairingSystem> = match name.trim().to_ascii_lowercase().as_str() {
        "round-robin" => Box::new(RoundRobinTournament::new(participants, false)?),
        "double-round-robin" => Box::new(RoundRobinTournament::new(participants, true)?),
        "swiss" => Box::new(SwissTournament::new(participants, options.rounds)?),
        "single-elimination" => Box::new(SingleEliminationTournament::new(participants)?),
        "single-player" => Box::new(SinglePlayerTournament::new(
            participants,
            options.rounds.unwrap_or(1),
        )?),
        _ => return Err(ConfigurationError::UnknownPairingSystem(name.to_owned())),
    };
    Ok(system)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardState {
    Idle,
    RoundInProgress(u32),
    Finished,
}

/// Round state machine shared by every format.
#[derive(Debug)]
struct RoundGuard {
    owner: u64,
    state: GuardState,
    planned: u32,
    applied: u32,
}

impl RoundGuard {
    fn new() -> RoundGuard {
        static OWNERS: AtomicU64 = AtomicU64::new(1);
        RoundGuard {
            owner: OWNERS.fetch_add(1, Ordering::Relaxed),
            state: GuardState::Idle,
            planned: 0,
            applied: 0,
        }
    }

    /// `Ok(false)` once the tournament is finished.
    fn ready_for_next(&self) -> Result<bool, ConfigurationError> {
        match self.state {
            GuardState::Idle => Ok(true),
            GuardState::RoundInProgress(round) => Err(ConfigurationError::RoundInProgress(round)),
            GuardState::Finished => Ok(false),
        }
    }

    fn begin(&mut self) -> RoundToken {
        self.planned += 1;
        self.state = GuardState::RoundInProgress(self.planned);
        RoundToken {
            owner: self.owner,
            round: self.planned,
        }
    }

    fn check(&self, token: &RoundToken, result: &RoundResult) -> Result<(), ConfigurationError> {
        let GuardState::RoundInProgress(expected) = self.state else {
            return Err(ConfigurationError::NoRoundInProgress);
        };
        if token.owner != self.owner || token.round != expected {
            return Err(ConfigurationError::StaleRoundToken {
                expected,
                got: token.round,
            });
        }
        if result.round() != expected {
            return Err(ConfigurationError::StaleRoundToken {
                expected,
                got: result.round(),
            });
        }
        Ok(())
    }

    fn complete(&mut self, token: RoundToken) {
        debug_assert_eq!(self.state, GuardState::RoundInProgress(token.round));
        self.applied += 1;
        self.state = GuardState::Idle;
    }

    fn finish(&mut self) {
        self.state = GuardState::Finished;
    }

    fn is_finished(&self) -> bool {
        self.state == GuardState::Finished
    }
}

/// Participants, standings and round state, common to every format.
#[derive(Debug)]
struct PairingCore {
    participants: Vec<Arc<Participant>>,
    standings: Standings,
    guard: RoundGuard,
}

impl PairingCore {
    fn new(participants: Vec<Arc<Participant>>) -> Result<PairingCore, ConfigurationError> {
        check_roster(&participants)?;
        Ok(PairingCore {
            standings: Standings::new(&participants),
            participants,
            guard: RoundGuard::new(),
        })
    }

    fn plan(&mut self, groupings: Vec<Grouping>, byes: Vec<Arc<Participant>>) -> RoundPlan {
        let token = self.guard.begin();
        RoundPlan {
            round: token.round,
            groupings,
            byes,
            token,
        }
    }

    /// Checks the token and every name of the result.
    fn check(&self, token: &RoundToken, result: &RoundResult) -> Result<(), ConfigurationError> {
        self.guard.check(token, result)?;
        for scores in result.completed().map(|(_, scores)| scores) {
            self.standings.check_known(scores.keys())?;
        }
        Ok(())
    }

    /// Records every series as one grouping.
    fn record_series(&mut self, result: &RoundResult) -> Result<(), ConfigurationError> {
        for totals in result.series_totals().values() {
            self.standings.record_grouping(totals)?;
        }
        Ok(())
    }

    /// Participants ordered by `compare` over their standings.
    fn ranked_by(
        &self,
        compare: impl Fn(&StandingEntry, &StandingEntry) -> CmpOrdering,
    ) -> Vec<Arc<Participant>> {
        self.standings
            .order_by(compare)
            .into_iter()
            .map(|index| self.participants[index].clone())
            .collect()
    }
}
