//! Match identities and the append-only history of a match.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Final score of every participant of a match, by participant name.
pub type ScoreMap = BTreeMap<String, f32>;

/// Identity of one match: which tournament, round, series and game it belongs to.
///
/// Ordered field by field, displayed (and persisted) as `t<tournament>-r<round>-s<series>-g<game>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchId {
    pub tournament: u32,
    pub round: u32,
    pub series: u32,
    pub game: u32,
}

impl MatchId {
    pub fn new(tournament: u32, round: u32, series: u32, game: u32) -> MatchId {
        MatchId {
            tournament,
            round,
            series,
            game,
        }
    }

    /// Identity of game `game` of the same series.
    pub fn with_game(self, game: u32) -> MatchId {
        MatchId { game, ..self }
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t{}-r{}-s{}-g{}",
            self.tournament, self.round, self.series, self.game
        )
    }
}

impl FromStr for MatchId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let mut field = |prefix: char| -> std::result::Result<u32, String> {
            parts
                .next()
                .and_then(|part| part.strip_prefix(prefix))
                .and_then(|number| number.parse().ok())
                .ok_or_else(|| format!("invalid match id '{s}'"))
        };
        let id = MatchId::new(field('t')?, field('r')?, field('s')?, field('g')?);
        match parts.next() {
            None => Ok(id),
            Some(_) => Err(format!("invalid match id '{s}'")),
        }
    }
}

impl Serialize for MatchId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MatchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered history of the snapshots of one match, and its final scores.
///
/// Only the match runner appends to a log. Once the log is terminal it never changes again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchLog<S> {
    id: MatchId,
    players: Vec<String>,
    snapshots: Vec<S>,
    terminal: bool,
    scores: Option<ScoreMap>,
}

impl<S> MatchLog<S> {
    pub(crate) fn new(id: MatchId, players: Vec<String>, initial: S) -> MatchLog<S> {
        MatchLog {
            id,
            players,
            snapshots: vec![initial],
            terminal: false,
            scores: None,
        }
    }

    pub(crate) fn append(&mut self, snapshot: S) -> Result<()> {
        if self.terminal {
            return Err(Error::LogTerminal);
        }
        self.snapshots.push(snapshot);
        Ok(())
    }

    /// Marks the log terminal with one score per player, in player order.
    pub(crate) fn finish(&mut self, scores: &[f32]) -> Result<()> {
        if self.terminal {
            return Err(Error::LogTerminal);
        }
        if scores.len() != self.players.len() {
            return Err(Error::InvalidScores(format!(
                "{} scores for {} players",
                scores.len(),
                self.players.len()
            )));
        }
        if let Some(score) = scores.iter().find(|score| !score.is_finite()) {
            return Err(Error::InvalidScores(format!("score {score} is not finite")));
        }
        self.scores = Some(
            self.players
                .iter()
                .cloned()
                .zip(scores.iter().copied())
                .collect(),
        );
        self.terminal = true;
        Ok(())
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Names of the players, in seat order.
    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn get(&self, index: usize) -> Option<&S> {
        self.snapshots.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, S> {
        self.snapshots.iter()
    }

    /// Number of snapshots, the initial one included.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Logs built by a match always hold their initial snapshot.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&S> {
        self.snapshots.last()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Final scores, once the match is finished.
    pub fn scores(&self) -> Option<&ScoreMap> {
        self.scores.as_ref()
    }
}

impl<'a, S> IntoIterator for &'a MatchLog<S> {
    type Item = &'a S;
    type IntoIter = std::slice::Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_id_text_form() {
        let id = MatchId::new(1, 2, 3, 4);
        assert_eq!(id.to_string(), "t1-r2-s3-g4");
        assert_eq!("t1-r2-s3-g4".parse::<MatchId>(), Ok(id));
        assert!("t1-r2-s3".parse::<MatchId>().is_err());
        assert!("t1-r2-s3-g4-x".parse::<MatchId>().is_err());
        assert!("r1-t2-s3-g4".parse::<MatchId>().is_err());
        assert_eq!(id.with_game(9), MatchId::new(1, 2, 3, 9));
    }

    #[test]
    fn match_id_is_a_json_map_key() {
        let mut map = BTreeMap::new();
        map.insert(MatchId::new(0, 1, 0, 2), 1.5f32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"t0-r1-s0-g2":1.5}"#);
        let back: BTreeMap<MatchId, f32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn log_grows_until_terminal() {
        let mut log = MatchLog::new(MatchId::new(0, 0, 0, 0), vec!["a".into(), "b".into()], 0);
        log.append(1).unwrap();
        log.append(2).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.latest(), Some(&2));
        assert_eq!(log.iter().copied().collect::<Vec<_>>(), [0, 1, 2]);
        assert!(log.scores().is_none());

        log.finish(&[2.0, 0.0]).unwrap();
        assert!(log.is_terminal());
        assert_eq!(log.scores().unwrap()["a"], 2.0);
        assert!(matches!(log.append(3), Err(Error::LogTerminal)));
        assert!(matches!(log.finish(&[0.0, 0.0]), Err(Error::LogTerminal)));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn finish_needs_one_finite_score_per_player() {
        let mut log = MatchLog::new(MatchId::new(0, 0, 0, 0), vec!["a".into(), "b".into()], ());
        assert!(matches!(log.finish(&[1.0]), Err(Error::InvalidScores(_))));
        assert!(matches!(
            log.finish(&[1.0, f32::NAN]),
            Err(Error::InvalidScores(_))
        ));
        assert!(!log.is_terminal());
    }
}
