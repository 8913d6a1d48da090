//! Cumulative results of every participant.
//!
//! Standings are only changed by a pairing system, once per applied round. A grouping
//! (all the matches of one series) counts as one game: the scores of its matches are summed,
//! the highest total wins, and if every total is equal the grouping is a draw.
//!
//! Points: win 2, draw 1, loss 0, bye 2.

use std::{cmp::Ordering, collections::BTreeSet, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::ConfigurationError, match_log::ScoreMap, participant::Participant};

/// Standing of one participant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StandingEntry {
    pub name: String,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub byes: u32,
    /// Sum of every match score.
    pub score_sum: f32,
    /// Format-specific tie-breaker (median-Buchholz for Swiss).
    pub tie_breaker: u32,
    /// Names of the participants already met.
    pub opponents: BTreeSet<String>,
    /// Round in which the participant was knocked out (single elimination).
    pub eliminated_in: Option<u32>,
}

impl StandingEntry {
    pub fn points(&self) -> u32 {
        (self.wins + self.byes) * 2 + self.draws
    }

    pub fn games(&self) -> u32 {
        self.wins + self.draws + self.losses
    }
}

impl fmt::Display for StandingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "points: {}, win: {}, draw: {}, loss: {}, bye: {}, score: {}, tie-breaker: {}",
            self.points(),
            self.wins,
            self.draws,
            self.losses,
            self.byes,
            self.score_sum,
            self.tie_breaker
        )
    }
}

/// Standings of every participant, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Standings {
    entries: Vec<StandingEntry>,
}

impl Standings {
    pub(crate) fn new(participants: &[Arc<Participant>]) -> Standings {
        Standings {
            entries: participants
                .iter()
                .map(|p| StandingEntry {
                    name: p.name.clone(),
                    ..StandingEntry::default()
                })
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StandingEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StandingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut StandingEntry, ConfigurationError> {
        self.entries
            .iter_mut()
            .find(|entry| entry.name == name)
            .ok_or_else(|| ConfigurationError::UnknownParticipant(name.to_owned()))
    }

    /// Fails if any name of `totals` is not registered.
    pub(crate) fn check_known<'a>(
        &self,
        names: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), ConfigurationError> {
        for name in names {
            if self.get(name).is_none() {
                return Err(ConfigurationError::UnknownParticipant(name.clone()));
            }
        }
        Ok(())
    }

    /// Records one grouping from the summed scores of its matches.
    ///
    /// A grouping of a single participant only adds to its score sum.
    pub(crate) fn record_grouping(&mut self, totals: &ScoreMap) -> Result<(), ConfigurationError> {
        self.check_known(totals.keys())?;

        for (name, total) in totals {
            let entry = self.entry_mut(name)?;
            entry.score_sum += total;
            entry
                .opponents
                .extend(totals.keys().filter(|other| *other != name).cloned());
        }
        if totals.len() < 2 {
            return Ok(());
        }

        let best = totals.values().copied().fold(f32::NEG_INFINITY, f32::max);
        let is_draw = totals.values().all(|total| (total - best).abs() < f32::EPSILON);
        info!(
            "aggregated results {}",
            totals
                .iter()
                .map(|(name, total)| format!("{name}: {total}"))
                .collect::<Vec<_>>()
                .join(" VS ")
        );
        for (name, total) in totals {
            let entry = self.entry_mut(name)?;
            if is_draw {
                entry.draws += 1;
            } else if (total - best).abs() < f32::EPSILON {
                entry.wins += 1;
            } else {
                entry.losses += 1;
            }
        }
        Ok(())
    }

    pub(crate) fn record_bye(&mut self, name: &str) -> Result<(), ConfigurationError> {
        info!("{name} receives a bye");
        self.entry_mut(name)?.byes += 1;
        Ok(())
    }

    pub(crate) fn eliminate(&mut self, name: &str, round: u32) -> Result<(), ConfigurationError> {
        self.entry_mut(name)?.eliminated_in = Some(round);
        Ok(())
    }

    /// Median-Buchholz: sum of the opponents' points, without the best and the worst.
    // https://en.wikipedia.org/wiki/Tie-breaking_in_Swiss-system_tournaments#Median_/_Buchholz_/_Solkoff
    pub(crate) fn update_median_buchholz(&mut self) {
        let tie_breakers: Vec<u32> = self
            .entries
            .iter()
            .map(|entry| {
                let adv_scores: Vec<u32> = entry
                    .opponents
                    .iter()
                    .filter_map(|name| self.get(name))
                    .map(StandingEntry::points)
                    .collect();
                if adv_scores.len() <= 2 {
                    return 0;
                }
                let min = adv_scores.iter().min().copied().unwrap_or(0);
                let max = adv_scores.iter().max().copied().unwrap_or(0);
                adv_scores.iter().sum::<u32>() - min - max
            })
            .collect();
        for (entry, tie_breaker) in self.entries.iter_mut().zip(tie_breakers) {
            entry.tie_breaker = tie_breaker;
        }
    }

    /// Indices of the entries (registration order) sorted with `compare`.
    ///
    /// The sort is stable: entries `compare` finds equal keep their registration order.
    pub(crate) fn order_by(
        &self,
        compare: impl Fn(&StandingEntry, &StandingEntry) -> Ordering,
    ) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by(|&a, &b| compare(&self.entries[a], &self.entries[b]));
        order
    }
}

impl<'a> IntoIterator for &'a Standings {
    type Item = &'a StandingEntry;
    type IntoIter = std::slice::Iter<'a, StandingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
