//! Registered competitors and roster loading.
//!
//! A [`Participant`] is identified by its name. Rosters can be built by hand or read
//! from a *bots file*: one launch command per line, blank lines and `#` comments
//! ignored.
//!
//! ```text
//! # greedy players
//! ./bots/greedy
//! python3 bots/random_walk.py --seed 4
//! ```
//!
//! The bot name is the file name of the last token of the command (`greedy`,
//! `random_walk.py`, ...) and the author is `Bot #<line number among bots>`.

use std::{
    collections::HashSet,
    hash::Hash,
    path::Path,
    sync::Arc,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::ConfigurationError;

/// An external program competing in the tournament. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Unique name, used as the participant's identity everywhere.
    pub name: String,
    /// Who wrote the bot.
    pub author: String,
    /// Launch command: program followed by whitespace-separated arguments.
    pub command: String,
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Participant {}

impl Hash for Participant {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Participant {
    /// Creates a participant.
    pub fn new(
        name: impl Into<String>,
        author: impl Into<String>,
        command: impl Into<String>,
    ) -> Participant {
        Participant {
            name: name.into(),
            author: author.into(),
            command: command.into(),
        }
    }

    /// Derives name and author from a bots-file line.
    pub fn from_command(command: &str, number: usize) -> Participant {
        let name = command
            .split_whitespace()
            .last()
            .and_then(|token| token.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or(command)
            .to_owned();
        Participant::new(name, format!("Bot #{number}"), command.trim())
    }

    /// Splits the launch command into program and arguments.
    pub(crate) fn program_and_args(&self) -> Option<(String, Vec<String>)> {
        let mut tokens = self.command.split_whitespace().map(str::to_owned);
        let program = tokens.next()?;
        Some((program, tokens.collect()))
    }
}

/// Parses a bots file's content into participants.
///
/// Names clashing with an earlier bot get a `-<number>` suffix.
pub fn parse_roster(text: &str) -> Vec<Arc<Participant>> {
    let mut taken = HashSet::new();
    let mut roster = vec![];
    let commands = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));

    for (number, command) in commands.enumerate() {
        let mut participant = Participant::from_command(command, number);
        if !taken.insert(participant.name.clone()) {
            participant.name = format!("{}-{number}", participant.name);
            taken.insert(participant.name.clone());
        }
        roster.push(Arc::new(participant));
    }
    roster
}

/// Reads a bots file.
#[instrument]
pub fn load_roster(path: &Path) -> anyhow::Result<Vec<Arc<Participant>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("could not read bots file '{}'", path.display()))?;
    let roster = parse_roster(&text);
    info!(bots = roster.len(), "roster loaded");
    Ok(roster)
}

/// Rejects empty rosters and duplicated names.
pub(crate) fn check_roster(participants: &[Arc<Participant>]) -> Result<(), ConfigurationError> {
    if participants.is_empty() {
        return Err(ConfigurationError::NoParticipants);
    }
    let mut seen = HashSet::with_capacity(participants.len());
    for participant in participants {
        if !seen.insert(participant.name.as_str()) {
            return Err(ConfigurationError::DuplicateParticipant(
                participant.name.clone(),
            ));
        }
    }
    Ok(())
}
