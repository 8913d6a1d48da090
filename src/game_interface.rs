//! Module defining traits that need to be implemented to run a tournament of a game
//!
//! A game is plugged in through three pieces:
//! - a [`Game`], the rule authority of one match, called once per tick,
//! - a [`Codec`], turning what a bot sees into bytes and what it answers into a move,
//! - a [`GameFactory`], creating games and the start positions of every series.

use std::{fmt::Display, marker::PhantomData, str::FromStr};

use anyhow::{anyhow, Context};
use serde::{de::DeserializeOwned, Serialize};

use crate::{match_log::MatchId, match_runner::MatchContext};

/// Rule authority of one match.
pub trait Game {
    /// Full game state at one point in time.
    ///
    /// Snapshots are values: the runner hands a clone of the latest one to every tick and
    /// keeps the returned one in the match log, so no party observes another's mutations.
    type Snapshot: Clone + Send + 'static;

    /// Advances the match by one step.
    ///
    /// Moves are obtained through [`MatchContext::get_move`]. The match ends once
    /// [`MatchContext::finish`] has been called with one score per player.
    ///
    /// # Errors
    ///
    /// Any error aborts the match. Errors coming from `ctx` should be propagated with `?`
    /// so the runner can tell a faulty bot from a faulty rule authority.
    fn tick(
        &mut self,
        snapshot: Self::Snapshot,
        ctx: &mut MatchContext<'_>,
    ) -> anyhow::Result<Self::Snapshot>;
}

/// Converts the view sent to a bot into bytes, and its answer into a move.
///
/// Encoded views are sent as one line: they must not contain `\n`.
pub trait Codec {
    /// What a bot is shown.
    type View;
    /// What a bot answers.
    type Move;

    fn encode(&self, view: &Self::View) -> anyhow::Result<Vec<u8>>;

    /// # Errors
    ///
    /// Malformed answers. The faulty bot loses the match.
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<Self::Move>;
}

/// Plain text protocol: views are written with [`Display`], moves are parsed with [`FromStr`]
/// after trimming surrounding whitespace.
pub struct TextCodec<V, M> {
    _marker: PhantomData<fn(&V) -> M>,
}

impl<V, M> TextCodec<V, M> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V, M> Default for TextCodec<V, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, M> Codec for TextCodec<V, M>
where
    V: Display,
    M: FromStr,
{
    type View = V;
    type Move = M;

    fn encode(&self, view: &V) -> anyhow::Result<Vec<u8>> {
        Ok(view.to_string().into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> anyhow::Result<M> {
        let text = std::str::from_utf8(bytes).context("answer is not valid UTF-8")?;
        let text = text.trim();
        M::from_str(text).map_err(|_| anyhow!("could not parse '{text}'"))
    }
}

/// JSON protocol, one compact document per line.
pub struct JsonCodec<V, M> {
    _marker: PhantomData<fn(&V) -> M>,
}

impl<V, M> JsonCodec<V, M> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V, M> Default for JsonCodec<V, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, M> Codec for JsonCodec<V, M>
where
    V: Serialize,
    M: DeserializeOwned,
{
    type View = V;
    type Move = M;

    fn encode(&self, view: &V) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(view).context("could not serialize view")
    }

    fn decode(&self, bytes: &[u8]) -> anyhow::Result<M> {
        serde_json::from_slice(bytes).context("answer is not a valid move")
    }
}

/// What will be given to the tournament to allow it to create games
pub trait GameFactory: Sync {
    type Game: Game;

    /// Returns an initialized game
    fn new_game(&self) -> Self::Game;

    /// Initial snapshots of a series, one match each.
    ///
    /// `series` identifies the series (its `game` field is 0), which makes the positions
    /// reproducible.
    fn start_positions(&self, series: &MatchId, num_players: usize) -> Vec<SnapshotOf<Self>>;
}

/// Snapshot type of the games created by `F`.
pub type SnapshotOf<F> = <<F as GameFactory>::Game as Game>::Snapshot;

#[cfg(test)]
mod interface_tests {
    use serde::Deserialize;

    use super::*;

    #[test]
    fn text_codec_trims_answers() {
        let codec = TextCodec::<u32, i64>::new();
        assert_eq!(codec.encode(&42).unwrap(), b"42");
        assert_eq!(codec.decode(b"  -7 \r\n").unwrap(), -7);
        let err = codec.decode(b"seven").unwrap_err();
        assert!(err.to_string().contains("seven"));
        assert!(codec.decode(&[0xff, 0xfe]).is_err());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Step {
        dx: i32,
        dy: i32,
    }

    #[test]
    fn json_codec_is_single_line() {
        let codec = JsonCodec::<Vec<Step>, Step>::new();
        let bytes = codec
            .encode(&vec![Step { dx: 1, dy: 0 }, Step { dx: 0, dy: -1 }])
            .unwrap();
        assert!(!bytes.contains(&b'\n'));
        assert_eq!(
            codec.decode(br#"{"dx":3,"dy":4}"#).unwrap(),
            Step { dx: 3, dy: 4 }
        );
        assert!(codec.decode(b"{\"dx\":3}").is_err());
    }

    struct Countdown;

    impl Game for Countdown {
        type Snapshot = u8;

        fn tick(&mut self, snapshot: u8, ctx: &mut MatchContext<'_>) -> anyhow::Result<u8> {
            if snapshot == 0 {
                ctx.finish(vec![1.0; ctx.num_players()]);
            }
            Ok(snapshot.saturating_sub(1))
        }
    }

    struct CountdownFactory;

    impl GameFactory for CountdownFactory {
        type Game = Countdown;

        fn new_game(&self) -> Countdown {
            Countdown
        }

        fn start_positions(&self, series: &MatchId, num_players: usize) -> Vec<u8> {
            vec![(series.series as usize + num_players) as u8; 2]
        }
    }

    fn positions<F: GameFactory>(factory: &F) -> Vec<SnapshotOf<F>> {
        factory.start_positions(&MatchId::new(0, 1, 3, 0), 2)
    }

    #[test]
    fn factory_positions_are_reproducible() {
        assert_eq!(positions(&CountdownFactory), vec![5, 5]);
        assert_eq!(positions(&CountdownFactory), positions(&CountdownFactory));
    }
}
