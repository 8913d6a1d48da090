//! Saving and loading results.
//!
//! Finished match logs, round results and whole tournaments can be written to a byte stream
//! (JSON) and read back as equal values, to replay a match or re-rank a tournament without
//! playing anything again. Loading checks what serde alone cannot: a record that could not
//! have been produced by a real run fails with [`Error::CorruptRecord`].

use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
    sync::Arc,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::info;

use crate::{
    configuration::FailurePolicy,
    error::{Error, Result},
    match_log::MatchLog,
    participant::Participant,
    round::{MatchOutcome, RoundResult},
    standings::Standings,
    tournament_strategy::PairingSystem,
};

/// A value that can be saved and restored.
pub trait Record: Serialize + DeserializeOwned {
    /// Checks the invariants of a restored value.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: Self = serde_json::from_slice(bytes)?;
        record.validate()?;
        Ok(record)
    }

    fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!("record saved to {}", path.as_ref().display());
        Ok(())
    }

    fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let record: Self = serde_json::from_reader(reader)?;
        record.validate()?;
        Ok(record)
    }
}

fn corrupt(reason: impl Into<String>) -> Error {
    Error::CorruptRecord(reason.into())
}

impl<S: Serialize + DeserializeOwned> Record for MatchLog<S> {
    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(corrupt(format!("match {} has no snapshot", self.id())));
        }
        let Some(scores) = self.scores() else {
            return Err(corrupt(format!("match {} is not finished", self.id())));
        };
        if !self.is_terminal() {
            return Err(corrupt(format!("match {} has scores but is not terminal", self.id())));
        }
        let players: HashSet<&String> = self.players().iter().collect();
        if players.len() != self.players().len()
            || scores.len() != players.len()
            || !scores.keys().all(|name| players.contains(name))
        {
            return Err(corrupt(format!(
                "match {} scores do not match its players",
                self.id()
            )));
        }
        if scores.values().any(|score| !score.is_finite()) {
            return Err(corrupt(format!("match {} has a score that is not finite", self.id())));
        }
        Ok(())
    }
}

impl Record for RoundResult {
    fn validate(&self) -> Result<()> {
        for (id, outcome) in self.outcomes() {
            if id.round != self.round() {
                return Err(corrupt(format!("match {id} is not part of round {}", self.round())));
            }
            if let MatchOutcome::Completed(scores) = outcome {
                if scores.values().any(|score| !score.is_finite()) {
                    return Err(corrupt(format!("match {id} has a score that is not finite")));
                }
            }
        }
        Ok(())
    }
}

/// What a finished tournament produced, without its match logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentRecord {
    pub tournament: u32,
    /// Name of the pairing system, as given to [`crate::tournament_strategy::create`].
    pub pairing_system: String,
    pub failure_policy: FailurePolicy,
    /// Participants in registration order.
    pub participants: Vec<Participant>,
    /// Round results as played, failed matches included.
    pub rounds: Vec<RoundResult>,
    pub standings: Standings,
    /// Participant names, best first.
    pub ranking: Vec<String>,
}

impl TournamentRecord {
    /// Feeds the recorded rounds to `system` and returns its final ranking.
    ///
    /// `system` must be a fresh pairing system of the same kind, over the same participants:
    /// it then plans the recorded rounds again, and ends up with the recorded standings.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptRecord`] if `system` does not plan the recorded rounds, and the errors
    /// of the pairing system.
    pub fn replay(&self, system: &mut dyn PairingSystem) -> Result<Vec<Arc<Participant>>> {
        for recorded in &self.rounds {
            let plan = system.next_round()?.ok_or_else(|| {
                corrupt(format!(
                    "{} has no round {}",
                    system.name(),
                    recorded.round()
                ))
            })?;
            if plan.round() != recorded.round() {
                return Err(corrupt(format!(
                    "round {} was recorded in place of round {}",
                    recorded.round(),
                    plan.round()
                )));
            }
            for (id, outcome) in recorded.outcomes() {
                let mut players: Vec<&String> = match outcome {
                    MatchOutcome::Completed(scores) => scores.keys().collect(),
                    MatchOutcome::Failed(failure) => failure.players.iter().collect(),
                };
                players.sort();
                let mut planned: Vec<&String> = plan
                    .groupings()
                    .get(id.series as usize)
                    .map(|grouping| grouping.iter().map(|p| &p.name).collect())
                    .unwrap_or_default();
                planned.sort();
                if players != planned {
                    return Err(corrupt(format!("match {id} was not planned with these players")));
                }
            }
            let resolved = recorded.resolve_failures(self.failure_policy)?;
            system.apply_results(plan.into_token(), &resolved)?;
        }
        if system.next_round()?.is_some() {
            return Err(corrupt("the record ends before the tournament"));
        }
        Ok(system.final_ranking()?)
    }
}

impl Record for TournamentRecord {
    fn validate(&self) -> Result<()> {
        for (index, round) in self.rounds.iter().enumerate() {
            if round.round() != index as u32 + 1 {
                return Err(corrupt(format!(
                    "round {} found at position {}",
                    round.round(),
                    index + 1
                )));
            }
            round.validate()?;
        }
        let names: HashSet<&str> = self.participants.iter().map(|p| p.name.as_str()).collect();
        if names.len() != self.participants.len() {
            return Err(corrupt("a participant is registered twice"));
        }
        if self.ranking.len() != names.len()
            || !self.ranking.iter().all(|name| names.contains(name.as_str()))
        {
            return Err(corrupt("the ranking does not match the participants"));
        }
        if self.standings.len() != names.len()
            || !self.standings.iter().all(|entry| names.contains(entry.name.as_str()))
        {
            return Err(corrupt("the standings do not match the participants"));
        }
        Ok(())
    }
}
