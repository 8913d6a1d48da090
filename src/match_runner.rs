//! Runs one match from its initial snapshot to its final scores.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use tracing::{error, info, instrument, trace};

use crate::{
    bot_adapter::{Bot, Launcher},
    error::{Error, ExecutionError, Result},
    game_interface::{Codec, Game},
    match_log::{MatchId, MatchLog},
    participant::Participant,
};

/// What a rule authority can do during a tick.
pub struct MatchContext<'a> {
    id: MatchId,
    players: &'a [Arc<Participant>],
    bots: &'a mut [Box<dyn Bot>],
    final_scores: Option<Vec<f32>>,
    fault: Option<ExecutionError>,
}

impl MatchContext<'_> {
    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Participants, in seat order.
    pub fn players(&self) -> &[Arc<Participant>] {
        self.players
    }

    pub fn num_players(&self) -> usize {
        self.players.len()
    }

    /// Asks player number `player` for a move.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownPlayer`] if there is no such seat, [`Error::Execution`] if the bot
    /// failed. A failed bot fails the match even if the error is not propagated.
    pub fn get_move<C: Codec>(
        &mut self,
        player: usize,
        view: &C::View,
        codec: &C,
    ) -> Result<C::Move> {
        let bot = self
            .bots
            .get_mut(player)
            .ok_or(Error::UnknownPlayer(player))?;
        let answer = bot.as_mut().request_move(view, codec);
        if let Err(Error::Execution(fault)) = &answer {
            self.fault.get_or_insert_with(|| fault.clone());
        }
        answer
    }

    /// Ends the match once the current tick returns. One score per player, in seat order.
    pub fn finish(&mut self, scores: Vec<f32>) {
        self.final_scores = Some(scores);
    }

    pub fn is_finished(&self) -> bool {
        self.final_scores.is_some()
    }
}

/// Stops every bot when dropped, whatever the way out of the match.
struct Bots(Vec<Box<dyn Bot>>);

impl Drop for Bots {
    fn drop(&mut self) {
        for bot in &mut self.0 {
            bot.stop();
        }
    }
}

/// Plays matches with bots created by a [`Launcher`].
pub struct MatchRunner<'a> {
    launcher: &'a dyn Launcher,
    max_ticks: Option<usize>,
}

impl<'a> MatchRunner<'a> {
    pub fn new(launcher: &'a dyn Launcher) -> MatchRunner<'a> {
        MatchRunner {
            launcher,
            max_ticks: None,
        }
    }

    /// Fails matches whose rule authority has not finished after `max_ticks` ticks.
    pub fn with_max_ticks(self, max_ticks: Option<usize>) -> Self {
        Self { max_ticks, ..self }
    }

    /// Plays one match.
    ///
    /// Bots are started in seat order, then `game` is ticked until it finishes the match.
    /// Every bot is stopped before this returns.
    ///
    /// # Errors
    ///
    /// - [`Error::Launch`]: a bot could not start.
    /// - [`Error::Execution`]: a bot failed during the match.
    /// - [`Error::RuleAuthority`]: `game` returned an error of its own.
    /// - [`Error::InvalidScores`]: the final scores do not match the players.
    /// - [`Error::TickLimit`]: the match lasted too long.
    #[instrument(skip_all, fields(id = %id))]
    pub fn run<G: Game>(
        &self,
        id: MatchId,
        players: &[Arc<Participant>],
        game: &mut G,
        initial: G::Snapshot,
    ) -> Result<MatchLog<G::Snapshot>> {
        let mut bots = Bots(
            players
                .iter()
                .map(|participant| self.launcher.launch(participant))
                .collect(),
        );
        for bot in &mut bots.0 {
            bot.start()?;
        }

        let names = players.iter().map(|p| p.name.clone()).collect();
        let mut log = MatchLog::new(id, names, initial.clone());
        let mut current = initial;
        let mut ticks = 0;

        loop {
            if self.max_ticks.is_some_and(|max| ticks >= max) {
                error!("match {id} did not finish within {ticks} ticks");
                return Err(Error::TickLimit(ticks));
            }
            trace!(tick = ticks, "tick");

            let mut ctx = MatchContext {
                id,
                players,
                bots: &mut bots.0,
                final_scores: None,
                fault: None,
            };
            // bots are stopped by the guard whichever way the tick ends
            let ticked = panic::catch_unwind(AssertUnwindSafe(|| {
                game.tick(current.clone(), &mut ctx)
            }))
            .unwrap_or_else(|payload| Err(Error::from_panic(payload.as_ref()).into()));
            let MatchContext {
                final_scores,
                fault,
                ..
            } = ctx;
            ticks += 1;

            if let Some(fault) = fault {
                error!("{fault}");
                return Err(Error::Execution(fault));
            }
            let next = match ticked {
                Ok(next) => next,
                Err(e) => {
                    let e = match e.downcast::<Error>() {
                        Ok(e) => e,
                        Err(e) => Error::RuleAuthority(e),
                    };
                    error!("match {id} failed: {e}");
                    return Err(e);
                }
            };

            log.append(next.clone())?;
            if let Some(scores) = final_scores {
                log.finish(&scores)?;
                break;
            }
            current = next;
        }

        drop(bots);
        info!(ticks, scores = ?log.scores(), "match finished");
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ExecutionFailure,
        game_interface::GameFactory,
        testing::{FakeLauncher, NimFactory, NimState, Strategy},
    };

    fn play(
        launcher: &FakeLauncher,
        heap: u32,
        max_ticks: Option<usize>,
    ) -> Result<MatchLog<NimState>> {
        let factory = NimFactory { games: 1, heap };
        let mut game = factory.new_game();
        MatchRunner::new(launcher)
            .with_max_ticks(max_ticks)
            .run(
                MatchId::new(0, 0, 0, 0),
                &launcher.roster(),
                &mut game,
                NimState { heap, to_play: 0 },
            )
    }

    #[test]
    fn optimal_player_wins() {
        let launcher =
            FakeLauncher::new(&[("smart", Strategy::Optimal), ("naive", Strategy::TakeOne)]);
        let log = play(&launcher, 6, None).unwrap();
        assert!(log.is_terminal());
        let scores = log.scores().unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["smart"], 1.0);
        assert_eq!(scores["naive"], 0.0);
        // 6 -> 4 -> 3 -> 0
        let heaps: Vec<_> = log.iter().map(|s| s.heap).collect();
        assert_eq!(heaps, [6, 4, 3, 0]);
        assert_eq!(launcher.live(), 0);
    }

    #[test]
    fn crashing_bot_fails_the_match_and_everyone_is_stopped() {
        let launcher =
            FakeLauncher::new(&[("smart", Strategy::Optimal), ("crash", Strategy::Crash)]);
        let err = play(&launcher, 6, None).unwrap_err();
        match err {
            Error::Execution(e) => {
                assert_eq!(e.participant, "crash");
                assert_eq!(e.reason, ExecutionFailure::NonZeroExit(1));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(launcher.live(), 0);
    }

    #[test]
    fn garbage_answer_is_malformed_output() {
        let launcher =
            FakeLauncher::new(&[("garbage", Strategy::Garbage), ("smart", Strategy::Optimal)]);
        let err = play(&launcher, 6, None).unwrap_err();
        assert_eq!(err.culprit(), Some("garbage"));
        assert!(matches!(
            err,
            Error::Execution(ExecutionError {
                reason: ExecutionFailure::MalformedOutput(_),
                ..
            })
        ));
        assert_eq!(launcher.live(), 0);
    }

    #[test]
    fn launch_failure_stops_the_started_bots() {
        let launcher =
            FakeLauncher::new(&[("smart", Strategy::Optimal), ("ghost", Strategy::NoLaunch)]);
        let err = play(&launcher, 6, None).unwrap_err();
        assert!(matches!(err, Error::Launch(_)));
        assert_eq!(err.culprit(), Some("ghost"));
        assert_eq!(launcher.live(), 0);
    }

    #[test]
    fn tick_cap_fails_long_matches() {
        let launcher =
            FakeLauncher::new(&[("a", Strategy::TakeOne), ("b", Strategy::TakeOne)]);
        let err = play(&launcher, 20, Some(5)).unwrap_err();
        assert!(matches!(err, Error::TickLimit(5)));
        assert_eq!(launcher.live(), 0);
    }

    struct Swallowing;

    impl Game for Swallowing {
        type Snapshot = u32;

        fn tick(&mut self, turn: u32, ctx: &mut MatchContext<'_>) -> anyhow::Result<u32> {
            let codec = crate::game_interface::TextCodec::<u32, u32>::new();
            // the error is ignored on purpose
            let _ = ctx.get_move(0, &turn, &codec);
            if turn == 3 {
                ctx.finish(vec![1.0]);
            }
            Ok(turn + 1)
        }
    }

    #[test]
    fn swallowed_bot_fault_still_fails_the_match() {
        let launcher = FakeLauncher::new(&[("crash", Strategy::Crash)]);
        let err = MatchRunner::new(&launcher)
            .run(MatchId::new(0, 0, 0, 0), &launcher.roster(), &mut Swallowing, 0)
            .unwrap_err();
        assert_eq!(err.culprit(), Some("crash"));
    }

    struct Broken;

    impl Game for Broken {
        type Snapshot = u32;

        fn tick(&mut self, turn: u32, ctx: &mut MatchContext<'_>) -> anyhow::Result<u32> {
            match turn {
                0 => Ok(1),
                1 => {
                    ctx.get_move(7, &turn, &crate::game_interface::TextCodec::<u32, u32>::new())?;
                    Ok(2)
                }
                _ => anyhow::bail!("board is inconsistent"),
            }
        }
    }

    #[test]
    fn rule_authority_faults_are_typed() {
        let launcher = FakeLauncher::new(&[("solo", Strategy::Optimal)]);
        let runner = MatchRunner::new(&launcher);
        let roster = launcher.roster();

        let err = runner
            .run(MatchId::new(0, 0, 0, 0), &roster, &mut Broken, 1)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownPlayer(7)));

        let err = runner
            .run(MatchId::new(0, 0, 0, 1), &roster, &mut Broken, 2)
            .unwrap_err();
        assert!(matches!(err, Error::RuleAuthority(_)));
        assert_eq!(err.culprit(), None);
        assert_eq!(launcher.live(), 0);
    }

    struct WrongScores;

    impl Game for WrongScores {
        type Snapshot = ();

        fn tick(&mut self, _: (), ctx: &mut MatchContext<'_>) -> anyhow::Result<()> {
            ctx.finish(vec![1.0; ctx.num_players() + 1]);
            Ok(())
        }
    }

    #[test]
    fn score_list_must_match_players() {
        let launcher = FakeLauncher::new(&[("a", Strategy::Optimal), ("b", Strategy::Optimal)]);
        let err = MatchRunner::new(&launcher)
            .run(MatchId::new(0, 0, 0, 0), &launcher.roster(), &mut WrongScores, ())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidScores(_)));
    }

    struct Panicking;

    impl Game for Panicking {
        type Snapshot = u32;

        fn tick(&mut self, turn: u32, ctx: &mut MatchContext<'_>) -> anyhow::Result<u32> {
            let codec = crate::game_interface::TextCodec::<u32, u32>::new();
            ctx.get_move(0, &turn, &codec)?;
            let empty: Vec<u32> = vec![];
            Ok(empty[turn as usize])
        }
    }

    #[test]
    fn panicking_rule_authority_fails_the_match() {
        let launcher =
            FakeLauncher::new(&[("a", Strategy::Optimal), ("b", Strategy::TakeOne)]);
        let err = MatchRunner::new(&launcher)
            .run(MatchId::new(0, 0, 0, 0), &launcher.roster(), &mut Panicking, 0)
            .unwrap_err();
        match err {
            Error::RuleAuthority(e) => {
                let message = e.to_string();
                assert!(message.contains("panicked"), "{message}");
                assert!(message.contains("index out of bounds"), "{message}");
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(launcher.live(), 0);
    }
}
