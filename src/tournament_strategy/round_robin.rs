use std::sync::Arc;

use tracing::info;

use super::{PairingCore, PairingSystem, RoundPlan, RoundToken};
use crate::{
    error::ConfigurationError, participant::Participant, round::RoundResult,
    standings::Standings,
};

/// A round-robin tournament where each participant plays against every other participant.
///
/// Rounds follow the circle method: `n - 1` rounds for `n` participants (`n` rounded up to
/// an even number; with an odd count, one participant sits out every round without points).
/// A double round robin plays the whole schedule a second time with the seats swapped.
///
/// Ranking: points, then wins, then summed match scores, then name.
pub struct RoundRobinTournament {
    core: PairingCore,
    double: bool,
}

impl RoundRobinTournament {
    /// Creates a round robin. Set `double` to meet every opponent twice, once on each seat.
    pub fn new(
        participants: Vec<Arc<Participant>>,
        double: bool,
    ) -> Result<Self, ConfigurationError> {
        let tournament = Self {
            core: PairingCore::new(participants)?,
            double,
        };
        info!(
            "Round robin: {} rounds for {} participants",
            tournament.total_rounds(),
            tournament.core.participants.len()
        );
        Ok(tournament)
    }

    fn seats(&self) -> usize {
        let n = self.core.participants.len();
        n + n % 2
    }

    fn total_rounds(&self) -> u32 {
        let single = (self.seats() - 1) as u32;
        if self.double {
            single * 2
        } else {
            single
        }
    }

    /// Groupings and byes of round `index` (0-based).
    fn pairings(&self, index: u32) -> (Vec<Vec<Arc<Participant>>>, Vec<Arc<Participant>>) {
        let seats = self.seats();
        let single = seats as u32 - 1;
        let mirrored = index >= single;
        let r = (index % single) as usize;
        // seat 0 stays, the others rotate
        let seat_at = |position: usize| {
            if position == 0 {
                0
            } else {
                1 + (position - 1 + r) % (seats - 1)
            }
        };

        let participants = &self.core.participants;
        let mut groupings = vec![];
        let mut byes = vec![];
        for i in 0..seats / 2 {
            let (mut a, mut b) = (seat_at(i), seat_at(seats - 1 - i));
            // the fixed seat alternates sides
            if i == 0 && r % 2 == 1 {
                std::mem::swap(&mut a, &mut b);
            }
            if mirrored {
                std::mem::swap(&mut a, &mut b);
            }
            match (participants.get(a), participants.get(b)) {
                (Some(a), Some(b)) => groupings.push(vec![a.clone(), b.clone()]),
                (Some(alone), None) | (None, Some(alone)) => byes.push(alone.clone()),
                (None, None) => {}
            }
        }
        (groupings, byes)
    }
}

impl PairingSystem for RoundRobinTournament {
    fn name(&self) -> &'static str {
        if self.double {
            "double-round-robin"
        } else {
            "round-robin"
        }
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
        if self.core.guard.planned >= self.total_rounds() {
            self.core.guard.finish();
            return Ok(None);
        }
        let (groupings, byes) = self.pairings(self.core.guard.planned);
        Ok(Some(self.core.plan(groupings, byes)))
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
            b.points()
                .cmp(&a.points())
                .then(b.wins.cmp(&a.wins))
                .then(b.score_sum.total_cmp(&a.score_sum))
                .then(a.name.cmp(&b.name))
        })
    }
}
