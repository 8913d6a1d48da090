//! A fixed sequence of matches between the same participants.

use std::{collections::BTreeMap, sync::Arc};

use tracing::{info, instrument};

use crate::{
    error::{Error, Result},
    game_interface::{Game, GameFactory},
    match_log::{MatchId, MatchLog, ScoreMap},
    match_runner::MatchRunner,
    participant::Participant,
};

/// One match per initial snapshot, played in order.
///
/// Match `i` is identified by the series id with `game = i`. Results are all or nothing:
/// they exist only once every match of the series finished.
#[derive(Debug)]
pub struct Series<S> {
    id: MatchId,
    players: Vec<Arc<Participant>>,
    positions: Vec<S>,
    logs: Option<Vec<MatchLog<S>>>,
}

impl<S: Clone + Send + 'static> Series<S> {
    pub fn new(id: MatchId, players: Vec<Arc<Participant>>, positions: Vec<S>) -> Series<S> {
        Series {
            id: id.with_game(0),
            players,
            positions,
            logs: None,
        }
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn players(&self) -> &[Arc<Participant>] {
        &self.players
    }

    /// Number of matches of the series.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Plays every match, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// [`Error::MatchFailed`] with the identity of the failed match. Results of the matches
    /// played before are discarded.
    #[instrument(skip_all, fields(series = %self.id))]
    pub fn run<F>(&mut self, factory: &F, runner: &MatchRunner<'_>) -> Result<()>
    where
        F: GameFactory,
        F::Game: Game<Snapshot = S>,
    {
        self.logs = None;
        let mut logs = Vec::with_capacity(self.positions.len());
        for (game, position) in self.positions.iter().enumerate() {
            let id = self.id.with_game(game as u32);
            let mut rules = factory.new_game();
            let log = runner
                .run(id, &self.players, &mut rules, position.clone())
                .map_err(|e| Error::MatchFailed {
                    id,
                    source: Box::new(e),
                })?;
            logs.push(log);
        }
        info!(matches = logs.len(), "series finished");
        self.logs = Some(logs);
        Ok(())
    }

    /// Final scores of every match, by match identity.
    ///
    /// # Errors
    ///
    /// [`Error::NoResultsYet`] until [`Series::run`] succeeded.
    pub fn get_results(&self) -> Result<BTreeMap<MatchId, ScoreMap>> {
        Ok(self
            .logs()?
            .iter()
            .filter_map(|log| Some((log.id(), log.scores()?.clone())))
            .collect())
    }

    /// Logs of every match, in order.
    ///
    /// # Errors
    ///
    /// [`Error::NoResultsYet`] until [`Series::run`] succeeded.
    pub fn logs(&self) -> Result<&[MatchLog<S>]> {
        self.logs.as_deref().ok_or(Error::NoResultsYet)
    }

    pub(crate) fn into_logs(self) -> Option<Vec<MatchLog<S>>> {
        self.logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLauncher, NimFactory, Strategy};

    #[test]
    fn results_are_keyed_by_game() {
        let launcher =
            FakeLauncher::new(&[("smart", Strategy::Optimal), ("naive", Strategy::TakeOne)]);
        let factory = NimFactory { games: 3, heap: 5 };
        let id = MatchId::new(1, 2, 3, 0);
        let players = launcher.roster();
        let mut series = Series::new(id, players.clone(), factory.start_positions(&id, 2));

        assert!(matches!(series.get_results(), Err(Error::NoResultsYet)));
        series.run(&factory, &MatchRunner::new(&launcher)).unwrap();

        let results = series.get_results().unwrap();
        let ids: Vec<_> = results.keys().copied().collect();
        assert_eq!(ids, [id, id.with_game(1), id.with_game(2)]);
        assert!(results.values().all(|scores| scores["smart"] == 1.0));
        assert_eq!(series.logs().unwrap().len(), 3);
        assert_eq!(launcher.launched(), 6);
        assert_eq!(launcher.live(), 0);
    }

    #[test]
    fn first_failure_aborts_the_series() {
        let launcher =
            FakeLauncher::new(&[("smart", Strategy::Optimal), ("crash", Strategy::Crash)]);
        let factory = NimFactory { games: 3, heap: 5 };
        let id = MatchId::new(0, 0, 1, 0);
        let mut series = Series::new(id, launcher.roster(), factory.start_positions(&id, 2));

        let err = series
            .run(&factory, &MatchRunner::new(&launcher))
            .unwrap_err();
        match &err {
            Error::MatchFailed { id: failed, .. } => assert_eq!(*failed, id),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(err.culprit(), Some("crash"));
        // fail fast: only the first match was played
        assert_eq!(launcher.launched(), 2);
        assert!(matches!(series.get_results(), Err(Error::NoResultsYet)));
    }
}
