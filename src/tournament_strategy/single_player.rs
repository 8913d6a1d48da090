use std::sync::Arc;

use super::{PairingCore, PairingSystem, RoundPlan, RoundToken};
use crate::{
    error::ConfigurationError, participant::Participant, round::RoundResult,
    standings::Standings,
};

/// Every participant plays alone, once per round, for a fixed number of rounds.
///
/// Ranking: summed match scores, then name.
pub struct SinglePlayerTournament {
    core: PairingCore,
    rounds: u32,
}

impl SinglePlayerTournament {
    /// Zero rounds is read as one.
    pub fn new(
        participants: Vec<Arc<Participant>>,
        rounds: u32,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            core: PairingCore::new(participants)?,
            rounds: rounds.max(1),
        })
    }
}

impl PairingSystem for SinglePlayerTournament {
    fn name(&self) -> &'static str {
        "single-player"
    }

    fn players_per_match(&self) -> usize {
        1
    }

    fn participants(&self) -> &[Arc<Participant>] {
        &self.core.participants
    }

    fn next_round(&mut self) -> Result<Option<RoundPlan>, ConfigurationError> {
        if !self.core.guard.ready_for_next()? {
            return Ok(None);
        }
        if self.core.guard.planned >= self.rounds {
            self.core.guard.finish();
            return Ok(None);
        }
        let groupings = self
            .core
            .participants
            .iter()
            .map(|p| vec![p.clone()])
            .collect();
        Ok(Some(self.core.plan(groupings, vec![])))
    }

    fn apply_results(
        &mut self,
        token: RoundToken,
        result: &RoundResult,
    ) -> Result<(), ConfigurationError> {
        self.core.check(&token, result)?;
        self.core.record_series(result)?;
        self.core.guard.complete(token);
        Ok(())
    }

    fn standings(&self) -> &Standings {
        &self.core.standings
    }

    fn is_finished(&self) -> bool {
        self.core.guard.is_finished()
    }

    fn rounds_applied(&self) -> u32 {
        self.core.guard.applied
    }

    fn ranking(&self) -> Vec<Arc<Participant>> {
        self.core.ranked_by(|a, b| {
            b.score_sum
                .total_cmp(&a.score_sum)
                .then(a.name.cmp(&b.name))
        })
    }
}
