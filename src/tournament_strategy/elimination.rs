use std::sync::Arc;

use tracing::{debug, info};

use super::{PairingCore, PairingSystem, RoundPlan, RoundToken};
use crate::{
    error::ConfigurationError, match_log::ScoreMap, participant::Participant,
    round::RoundResult, standings::Standings,
};

/// What happens to a pair of bracket slots this round.
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Grouping `series` between two participant indices.
    Match { series: u32, a: usize, b: usize },
    Bye(usize),
    Empty,
}

/// A knockout bracket for two-player games.
///
/// The bracket has the size of the next power of two, seeded in the standard order
/// (registration order is the seed, seed 1 meets the lowest seed), so the top seeds get
/// the byes of the first round. The winner of a grouping is the highest summed score; a tie
/// or a missing result (discarded grouping) advances the better seed.
///
/// Ranking: champion first, then by elimination round (later is better), then points, then
/// seed.
pub struct SingleEliminationTournament {
    core: PairingCore,
    /// Participant indices still in the bracket, in bracket order.
    slots: Vec<Option<usize>>,
    current: Vec<Slot>,
}

/// Seeds (1-based) in bracket order for a bracket of `size` slots.
fn seed_order(size: usize) -> Vec<usize> {
    let mut order = vec![1];
    while order.len() < size {
        let len = order.len() * 2;
        order = order.iter().flat_map(|&s| [s, len + 1 - s]).collect();
    }
    order
}

impl SingleEliminationTournament {
    pub fn new(participants: Vec<Arc<Participant>>) -> Result<Self, ConfigurationError> {
        let core = PairingCore::new(participants)?;
        let n = core.participants.len();
        let size = n.next_power_of_two();
        let slots = seed_order(size)
            .into_iter()
            .map(|seed| (seed <= n).then(|| seed - 1))
            .collect();
        info!("Single elimination: bracket of {size} for {n} participants");
        Ok(Self {
            core,
            slots,
            current: vec![],
        })
    }

    fn total(totals: Option<&ScoreMap>, participant: &Participant) -> f32 {
        totals
            .and_then(|scores| scores.get(&participant.name))
            .copied()
            .unwrap_or(0.0)
    }
}

impl PairingSystem for SingleEliminationTournament {
    fn name(&self) -> &'static str {
        "single-elimination"
    }

    fn players_per_match(&self) -> usize {
        2
    }

    fn participants(&self) -> &[Arc<Participant>] {
        &self.core.participants
    }

    fn next_round(&mut self) -> Result<Option<RoundPlan>, ConfigurationError> {
        if !self.core.guard.ready_for_next()? {
            return Ok(None);
        }
        if self.core.guard.planned > 0 && self.slots.len() <= 1 {
            self.core.guard.finish();
            return Ok(None);
        }

        let participants = &self.core.participants;
        let mut groupings = vec![];
        let mut byes = vec![];
        self.current = self
            .slots
            .chunks(2)
            .map(|pair| match pair {
                [Some(a), Some(b)] => {
                    groupings.push(vec![participants[*a].clone(), participants[*b].clone()]);
                    Slot::Match {
                        series: groupings.len() as u32 - 1,
                        a: *a,
                        b: *b,
                    }
                }
                [Some(alone), None] | [None, Some(alone)] | [Some(alone)] => {
                    byes.push(participants[*alone].clone());
                    Slot::Bye(*alone)
                }
                _ => Slot::Empty,
            })
            .collect();
        Ok(Some(self.core.plan(groupings, byes)))
    }

    fn apply_results(
        &mut self,
        token: RoundToken,
        result: &RoundResult,
    ) -> Result<(), ConfigurationError> {
        self.core.check(&token, result)?;
        self.core.record_series(result)?;

        let round = token.round();
        let totals = result.series_totals();
        let mut next = Vec::with_capacity(self.current.len());
        for slot in std::mem::take(&mut self.current) {
            let winner = match slot {
                Slot::Match { series, a, b } => {
                    let scores = totals.get(&series);
                    let (pa, pb) = (&self.core.participants[a], &self.core.participants[b]);
                    let (ta, tb) = (Self::total(scores, pa), Self::total(scores, pb));
                    // the better seed is the lower index
                    let (winner, loser) = if tb > ta || (tb == ta && b < a) {
                        (b, a)
                    } else {
                        (a, b)
                    };
                    debug!(
                        "{} advances, {} is eliminated in round {round}",
                        self.core.participants[winner], self.core.participants[loser]
                    );
                    self.core
                        .standings
                        .eliminate(&self.core.participants[loser].name, round)?;
                    Some(winner)
                }
                Slot::Bye(alone) => {
                    self.core
                        .standings
                        .record_bye(&self.core.participants[alone].name)?;
                    Some(alone)
                }
                Slot::Empty => None,
            };
            next.push(winner);
        }
        self.slots = next;
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
        // registration order is the seed: the stable sort keeps it for equal entries
        self.core.ranked_by(|a, b| {
            let alive = |round: Option<u32>| round.unwrap_or(u32::MAX);
            alive(b.eliminated_in)
                .cmp(&alive(a.eliminated_in))
                .then(b.points().cmp(&a.points()))
        })
    }
}
