//! # Bot Tournament
//!
//! A crate for running tournaments between external bot programs, with process isolation,
//! resource constraints and replayable results.
//!
//! It provides:
//! - Match execution: bots are OS processes speaking a line protocol over stdin/stdout
//!   ([`bot_adapter`]), driven by a game-specific rule authority ([`Game`](game_interface::Game))
//! - Series of matches between the same bots, and rounds of series run concurrently
//! - Tournament formats through the [`PairingSystem`](tournament_strategy::PairingSystem) trait,
//!   with built-in round robin, Swiss, single elimination and single player formats
//! - Resource constraints enforced through Linux cgroups v2 and per-move timeouts
//! - Saving and replaying match logs and tournament results ([`record`], [`replay`])
//!
//! Each match consists of one or more bots, each running as a separate OS process that is
//! always stopped when the match ends, whichever way it ends.
//!
//! # Documentation Overview
//!
//! - For the tournament loop, see the [`tournament`] module.
//! - For configuring behavior, resource limits and execution environment, see
//!   [`Configuration`](crate::configuration::Configuration) and [`constraints`].
//! - For tournament formats, see the [`PairingSystem`](tournament_strategy::PairingSystem)
//!   trait and [`tournament_strategy::create`].
//! - For implementing custom games, check out the [`Game`](game_interface::Game),
//!   [`Codec`](game_interface::Codec) and [`GameFactory`](game_interface::GameFactory) traits.
//! - For the errors and which component raises them, see [`error`].
//!
//! # Usage Example
//!
//! A game of Nim between bots listed in a bots file (one launch command per line):
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use bot_tournament::prelude::*;
//!
//! /// Players take 1 to 3 items in turn; whoever takes the last one wins.
//! struct Nim {
//!     codec: TextCodec<u32, u32>,
//! }
//!
//! impl Game for Nim {
//!     type Snapshot = (u32, usize);
//!
//!     fn tick(
//!         &mut self,
//!         (heap, player): (u32, usize),
//!         ctx: &mut MatchContext<'_>,
//!     ) -> anyhow::Result<(u32, usize)> {
//!         let take = ctx.get_move(player, &heap, &self.codec)?;
//!         anyhow::ensure!((1..=3).contains(&take) && take <= heap, "illegal move");
//!         if take == heap {
//!             let mut scores = vec![0.0; ctx.num_players()];
//!             scores[player] = 1.0;
//!             ctx.finish(scores);
//!         }
//!         Ok((heap - take, (player + 1) % ctx.num_players()))
//!     }
//! }
//!
//! struct NimFactory;
//!
//! impl GameFactory for NimFactory {
//!     type Game = Nim;
//!
//!     fn new_game(&self) -> Nim {
//!         Nim { codec: TextCodec::new() }
//!     }
//!
//!     // two games per pairing, each player starting once
//!     fn start_positions(&self, _series: &MatchId, _num_players: usize) -> Vec<(u32, usize)> {
//!         vec![(21, 0), (21, 1)]
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     // Define per-bot constraints
//!     let constraints = ConstraintsBuilder::new()
//!         .with_ram_per_agent(500) // in MB
//!         .with_action_timeout(Duration::from_millis(100))
//!         .build()?;
//!
//!     // Allow uncontained execution if cgroup v2 is not available
//!     let config = Configuration::from_env()
//!         .with_allow_uncontained(true)
//!         .with_pairing_system("swiss")
//!         .with_failure_policy(FailurePolicy::Forfeit);
//!
//!     let bots = load_roster("bots.txt".as_ref())?;
//!     let mut tournament = Tournament::new(NimFactory, bots, config, constraints);
//!     tournament.run()?;
//!
//!     for (rank, bot) in tournament.final_ranking()?.iter().enumerate() {
//!         println!("{}: {bot}", rank + 1);
//!     }
//!     tournament.record()?.write_to("tournament.json")?;
//!     Ok(())
//! }
//! ```
//!
//! # Example Bot
//!
//! Bots read one view per line on stdin and answer one move per line on stdout. A Nim bot
//! taking one item every turn:
//!
//! ```sh
//! #!/bin/sh
//! while read heap; do
//!     echo 1
//! done
//! ```
//!
//! ## Bot Requirements
//!
//! - Answer every line within the action timeout, and within the time budget of the match
//! - Flush stdout after every answer
//! - Exit when stdin is closed
//! - If a ready line is configured, print it once started

mod cgroup_manager;
pub mod bot_adapter;
pub mod configuration;
pub mod constraints;
pub mod error;
pub mod game_interface;
mod logger;
pub mod match_log;
pub mod match_runner;
pub mod participant;
pub mod record;
pub mod replay;
pub mod round;
pub mod series;
pub mod standings;
pub mod tournament;
pub mod tournament_strategy;

#[cfg(test)]
mod testing;

pub use anyhow;
pub use error::{Error, Result};

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use bot_tournament::prelude::*;
/// ```
///
/// Includes:
/// - [`Configuration`](crate::configuration::Configuration) and
///   [`ConstraintsBuilder`](crate::constraints::ConstraintsBuilder)
/// - the game traits and the provided codecs
/// - [`Tournament`](crate::tournament::Tournament)
/// - all built-in [`pairing systems`](crate::tournament_strategy)
pub mod prelude {
    pub use crate::configuration::{Configuration, FailurePolicy};
    pub use crate::constraints::ConstraintsBuilder;
    pub use crate::error::{Error, Result};
    pub use crate::game_interface::{Codec, Game, GameFactory, JsonCodec, TextCodec};
    pub use crate::match_log::{MatchId, MatchLog};
    pub use crate::match_runner::{MatchContext, MatchRunner};
    pub use crate::participant::{load_roster, parse_roster, Participant};
    pub use crate::record::{Record, TournamentRecord};
    pub use crate::replay::ReplayCursor;
    pub use crate::tournament::Tournament;
    pub use crate::tournament_strategy::*;
}
