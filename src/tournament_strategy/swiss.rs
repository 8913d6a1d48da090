use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use tracing::{info, warn};

use super::{PairingCore, PairingSystem, RoundPlan, RoundToken};
use crate::{
    error::ConfigurationError, participant::Participant, round::RoundResult,
    standings::Standings,
};

/// A Swiss-style tournament for two-player games. Does not follow strictly the Swiss
/// tournament rules.
///
/// Participants are paired inside groups of equal points, avoiding rematches; whoever cannot
/// be paired floats down to the next group, and anyone left at the end gets a bye (a win,
/// credited when the round's results are applied). The number of rounds can be fixed, or
/// automatically determined as `ceil(log2(n))`.
///
/// Ranking: points, then median-Buchholz, then summed match scores, then name.
pub struct SwissTournament {
    core: PairingCore,
    max_rounds: u32,
    pending_byes: Vec<Arc<Participant>>,
    bye_history: HashSet<String>,
}

impl SwissTournament {
    /// Creates a Swiss tournament of `rounds` rounds, or `ceil(log2(n))` (at least one) when
    /// `rounds` is `None` or zero.
    pub fn new(
        participants: Vec<Arc<Participant>>,
        rounds: Option<u32>,
    ) -> Result<Self, ConfigurationError> {
        let core = PairingCore::new(participants)?;
        let max_rounds = match rounds {
            Some(rounds) if rounds > 0 => rounds,
            _ => {
                let n = core.participants.len();
                let auto = (f32::log2(n as f32).ceil() as u32).max(1);
                info!("Swiss tournament auto number of rounds: {auto}");
                auto
            }
        };
        Ok(Self {
            core,
            max_rounds,
            pending_byes: vec![],
            bye_history: HashSet::new(),
        })
    }

    fn has_played(&self, a: &Participant, b: &Participant) -> bool {
        self.core
            .standings
            .get(&a.name)
            .is_some_and(|entry| entry.opponents.contains(&b.name))
    }

    fn points(&self, participant: &Participant) -> u32 {
        self.core
            .standings
            .get(&participant.name)
            .map_or(0, |entry| entry.points())
    }

    fn tie_breaker(&self, participant: &Participant) -> u32 {
        self.core
            .standings
            .get(&participant.name)
            .map_or(0, |entry| entry.tie_breaker)
    }

    fn create_next_round_pairings(&self) -> (Vec<Vec<Arc<Participant>>>, Vec<Arc<Participant>>) {
        // 1. Group by points, best tie-breaker first inside a group
        let mut score_groups: BTreeMap<u32, Vec<Arc<Participant>>> = BTreeMap::new();
        for participant in &self.core.participants {
            score_groups
                .entry(self.points(participant))
                .or_default()
                .push(participant.clone());
        }
        for group in score_groups.values_mut() {
            group.sort_by_key(|p| std::cmp::Reverse(self.tie_breaker(p)));
        }

        // 2. Pair within each group, from the best group down
        let mut pairings = vec![];
        let mut leftovers = vec![];

        for group in score_groups.values_mut().rev() {
            // leftovers of the group above come last: same-group pairing has priority
            group.append(&mut leftovers);

            let mut i = 0;
            while i + 1 < group.len() {
                let mut paired = false;

                // greedy pairing: pair with the first valid opponent
                for j in (i + 1)..group.len() {
                    if !self.has_played(&group[i], &group[j]) {
                        pairings.push(vec![group[i].clone(), group[j].clone()]);
                        // j > i: remove b first
                        group.swap_remove(j);
                        group.swap_remove(i);
                        paired = true;
                        break;
                    }
                }

                // group[i] was replaced if a pair was found
                if !paired {
                    i += 1;
                }
            }

            // unpaired participants float to the next group
            leftovers.append(group);
        }

        // 3. Whoever is left gets a bye
        for participant in &leftovers {
            if self.bye_history.contains(&participant.name) {
                warn!(
                    "{} already received a bye, assigning another one due to no valid opponents",
                    participant.name
                );
            }
        }
        (pairings, leftovers)
    }
}

impl PairingSystem for SwissTournament {
    fn name(&self) -> &'static str {
        "swiss"
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
        if self.core.guard.planned >= self.max_rounds {
            self.core.guard.finish();
            return Ok(None);
        }
        let (groupings, byes) = self.create_next_round_pairings();
        self.pending_byes = byes.clone();
        Ok(Some(self.core.plan(groupings, byes)))
    }

    fn apply_results(
        &mut self,
        token: RoundToken,
        result: &RoundResult,
    ) -> Result<(), ConfigurationError> {
        self.core.check(&token, result)?;
        self.core.record_series(result)?;
        for participant in std::mem::take(&mut self.pending_byes) {
            self.core.standings.record_bye(&participant.name)?;
            self.bye_history.insert(participant.name.clone());
        }
        self.core.standings.update_median_buchholz();
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
            b.points()
                .cmp(&a.points())
                .then(b.tie_breaker.cmp(&a.tie_breaker))
                .then(b.score_sum.total_cmp(&a.score_sum))
                .then(a.name.cmp(&b.name))
        })
    }
}
