//! In-memory bots and a tiny game for unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicIsize, AtomicUsize, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

use crate::{
    bot_adapter::{Bot, Launcher},
    error::{ExecutionError, ExecutionFailure, LaunchError},
    game_interface::{Game, GameFactory, TextCodec},
    match_log::MatchId,
    match_runner::MatchContext,
    participant::Participant,
};

/// How a fake bot behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    /// Takes `heap % 4` (or 1).
    Optimal,
    TakeOne,
    /// Exits with code 1 at its first move.
    Crash,
    /// Cannot be launched.
    NoLaunch,
    /// Answers something that is not a number.
    Garbage,
}

pub(crate) struct FakeBot {
    participant: Arc<Participant>,
    strategy: Strategy,
    running: bool,
    live: Arc<AtomicIsize>,
}

impl FakeBot {
    fn fail(&mut self, reason: ExecutionFailure) -> ExecutionError {
        self.stop();
        ExecutionError::new(self.participant.name.clone(), reason)
    }
}

impl Bot for FakeBot {
    fn participant(&self) -> &Participant {
        &self.participant
    }

    fn start(&mut self) -> Result<(), LaunchError> {
        if self.strategy == Strategy::NoLaunch {
            return Err(LaunchError::new(self.participant.name.clone(), "not found"));
        }
        if !self.running {
            self.running = true;
            self.live.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, ExecutionError> {
        if !self.running {
            return Err(self.fail(ExecutionFailure::ProcessExited));
        }
        let heap: u32 = std::str::from_utf8(request)
            .ok()
            .and_then(|text| text.parse().ok())
            .unwrap_or(1);
        let take = match self.strategy {
            Strategy::Optimal => match heap % 4 {
                0 => 1,
                n => n,
            },
            Strategy::TakeOne => 1,
            Strategy::Crash => return Err(self.fail(ExecutionFailure::NonZeroExit(1))),
            Strategy::Garbage => return Ok(b"lots".to_vec()),
            Strategy::NoLaunch => unreachable!("never started"),
        };
        Ok(take.to_string().into_bytes())
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Launches [`FakeBot`]s, by participant name.
pub(crate) struct FakeLauncher {
    bots: Vec<(String, Strategy)>,
    live: Arc<AtomicIsize>,
    launched: AtomicUsize,
}

impl FakeLauncher {
    pub(crate) fn new(bots: &[(&str, Strategy)]) -> FakeLauncher {
        FakeLauncher {
            bots: bots
                .iter()
                .map(|(name, strategy)| (name.to_string(), *strategy))
                .collect(),
            live: Arc::new(AtomicIsize::new(0)),
            launched: AtomicUsize::new(0),
        }
    }

    pub(crate) fn roster(&self) -> Vec<Arc<Participant>> {
        self.bots
            .iter()
            .map(|(name, _)| Arc::new(Participant::new(name, "tests", format!("./{name}"))))
            .collect()
    }

    /// Bots started and not stopped yet.
    pub(crate) fn live(&self) -> isize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, participant: &Arc<Participant>) -> Box<dyn Bot> {
        self.launched.fetch_add(1, Ordering::SeqCst);
        let strategy: HashMap<_, _> = self.bots.iter().cloned().collect();
        Box::new(FakeBot {
            participant: participant.clone(),
            strategy: strategy
                .get(&participant.name)
                .copied()
                .unwrap_or(Strategy::Optimal),
            running: false,
            live: self.live.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct NimState {
    pub heap: u32,
    pub to_play: usize,
}

/// Players take 1 to 3 items in turn; whoever takes the last one scores 1, the others 0.
/// An illegal move loses the game.
pub(crate) struct Nim {
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
        let heap = state.heap - take;
        if heap == 0 {
            scores[player] = 1.0;
            ctx.finish(scores);
        }
        Ok(NimState {
            heap,
            to_play: (player + 1) % ctx.num_players(),
        })
    }
}

/// Series of `games` Nim games with growing heaps, the first player rotating.
pub(crate) struct NimFactory {
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
                heap: self.heap + game as u32,
                to_play: game % num_players.max(1),
            })
            .collect()
    }
}

/// Heap that makes [`Fragile`] panic.
const PANIC_HEAP: u32 = u32::MAX;

/// Nim that panics on [`PANIC_HEAP`].
pub(crate) struct Fragile(Nim);

impl Game for Fragile {
    type Snapshot = NimState;

    fn tick(&mut self, state: NimState, ctx: &mut MatchContext<'_>) -> anyhow::Result<NimState> {
        if state.heap == PANIC_HEAP {
            panic!("heap overflow in series {}", ctx.id().series);
        }
        self.0.tick(state, ctx)
    }
}

/// Nim series where one series gets a game that panics mid-match and another panics
/// while producing its start positions.
pub(crate) struct FragileFactory {
    pub nim: NimFactory,
    pub panics_in_game: Option<u32>,
    pub panics_in_positions: Option<u32>,
}

impl GameFactory for FragileFactory {
    type Game = Fragile;

    fn new_game(&self) -> Fragile {
        Fragile(self.nim.new_game())
    }

    fn start_positions(&self, series: &MatchId, num_players: usize) -> Vec<NimState> {
        if self.panics_in_positions == Some(series.series) {
            panic!("no positions for series {}", series.series);
        }
        let mut positions = self.nim.start_positions(series, num_players);
        if self.panics_in_game == Some(series.series) {
            if let Some(last) = positions.last_mut() {
                last.heap = PANIC_HEAP;
            }
        }
        positions
    }
}
