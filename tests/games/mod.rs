//! A Nim game and shell-script bots for the integration tests.

use std::{fs, path::Path, sync::Arc};

use bot_tournament::prelude::*;
use serde::{Deserialize, Serialize};

/// Takes `heap % 4` items, or one when the heap is lost anyway.
pub const OPTIMAL: &str = r#"while read heap; do
    take=$((heap % 4))
    [ "$take" -eq 0 ] && take=1
    echo "$take"
done"#;

pub const TAKE_ONE: &str = "while read heap; do echo 1; done";

/// Never answers; `exec` keeps the pid of the launched process.
pub const SILENT: &str = "exec sleep 30";

pub const CRASH: &str = "read heap; exit 3";

pub const GARBAGE: &str = "while read heap; do echo banana; done";

/// Thinks 300 milliseconds before taking one item.
pub const SLOW: &str = "while read heap; do sleep 0.3; echo 1; done";

pub const READY: &str = r#"echo ready
while read heap; do echo 1; done"#;

/// Writes `script` in `dir` and returns a participant running it with `sh`.
pub fn bot(dir: &Path, name: &str, script: &str) -> Arc<Participant> {
    let path = dir.join(format!("{name}.sh"));
    fs::write(&path, script).unwrap();
    Arc::new(Participant::new(
        name,
        "tests",
        format!("sh {}", path.display()),
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NimState {
    pub heap: u32,
    pub to_play: usize,
}

/// Players take 1 to 3 items in turn; whoever takes the last one scores 1. An illegal move
/// loses the game.
pub struct Nim {
    codec: TextCodec<u32, u32>,
}

impl Game for Nim {
    type Snapshot = NimState;

    fn tick(&mut self, state: NimState, ctx: &mut MatchContext<'_>) -> anyhow::Result<NimState> {
        let player = state.to_play;
        let take = ctx.get_move(player, &state.heap, &self.codec)?;
        let mut scores = vec![0.0; ctx.num_players()];
        if take == 0 || take > 3 || take > state.heap {
            scores.iter_mut().for_each(|score| *score = 1.0);
            scores[player] = 0.0;
            ctx.finish(scores);
            return Ok(state);
        }
        if take == state.heap {
            scores[player] = 1.0;
            ctx.finish(scores);
        }
        Ok(NimState {
            heap: state.heap - take,
            to_play: (player + 1) % ctx.num_players(),
        })
    }
}

/// `games` games per series, each player starting in turn.
pub struct NimFactory {
    pub games: usize,
    pub heap: u32,
}

impl GameFactory for NimFactory {
    type Game = Nim;

    fn new_game(&self) -> Nim {
        Nim {
            codec: TextCodec::new(),
        }
    }

    fn start_positions(&self, _series: &MatchId, num_players: usize) -> Vec<NimState> {
        (0..self.games)
            .map(|game| NimState {
                heap: self.heap,
                to_play: game % num_players.max(1),
            })
            .collect()
    }
}
