//! Runs every grouping of a tournament round and collects their results.
//!
//! Each grouping is played as one [`Series`] whose series number is the grouping's index.
//! Groupings run concurrently on a pool of worker threads. A failed grouping never stops
//! the others: its failure is recorded in the [`RoundResult`] at the identity of the match
//! that failed.

use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc,
    },
    thread,
};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    configuration::FailurePolicy,
    error::{Error, ExecutionError, ExecutionFailure, LaunchError, Result},
    game_interface::{GameFactory, SnapshotOf},
    match_log::{MatchId, MatchLog, ScoreMap},
    match_runner::MatchRunner,
    participant::Participant,
    series::Series,
};

/// Participants playing together, in seat order.
pub type Grouping = Vec<Arc<Participant>>;

/// What kind of fault made a match fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureKind {
    Launch,
    Execution(ExecutionFailure),
    RuleAuthority,
    InvalidScores,
    TickLimit,
    Other,
}

/// A failed match, as stored in round results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFailure {
    /// Names of the players of the match.
    pub players: Vec<String>,
    /// Participant responsible for the failure, if there is one.
    pub culprit: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl MatchFailure {
    pub(crate) fn from_error(players: Vec<String>, error: &Error) -> MatchFailure {
        let kind = match error.root() {
            Error::Launch(_) => FailureKind::Launch,
            Error::Execution(e) => FailureKind::Execution(e.reason.clone()),
            Error::RuleAuthority(_) | Error::UnknownPlayer(_) | Error::LogTerminal => {
                FailureKind::RuleAuthority
            }
            Error::InvalidScores(_) => FailureKind::InvalidScores,
            Error::TickLimit(_) => FailureKind::TickLimit,
            _ => FailureKind::Other,
        };
        MatchFailure {
            players,
            culprit: error.culprit().map(str::to_owned),
            kind,
            message: error.root().to_string(),
        }
    }

    /// Rebuilds an error equivalent to the one that made the match fail.
    pub fn to_error(&self, id: MatchId) -> Error {
        let culprit = self.culprit.clone().unwrap_or_default();
        let source = match &self.kind {
            FailureKind::Launch => Error::Launch(LaunchError::new(culprit, self.message.clone())),
            FailureKind::Execution(reason) => {
                Error::Execution(ExecutionError::new(culprit, reason.clone()))
            }
            FailureKind::InvalidScores => Error::InvalidScores(self.message.clone()),
            _ => Error::RuleAuthority(anyhow!(self.message.clone())),
        };
        Error::MatchFailed {
            id,
            source: Box::new(source),
        }
    }

    /// Scores of a forfeit: the culprit loses, everyone else wins.
    fn forfeit_scores(&self) -> Option<ScoreMap> {
        let culprit = self.culprit.as_ref()?;
        Some(
            self.players
                .iter()
                .map(|name| (name.clone(), if name == culprit { 0.0 } else { 1.0 }))
                .collect(),
        )
    }
}

/// How one match of a round ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchOutcome {
    Completed(ScoreMap),
    Failed(MatchFailure),
}

/// Outcome of every match of one round, by match identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    round: u32,
    outcomes: BTreeMap<MatchId, MatchOutcome>,
}

impl RoundResult {
    pub fn new(round: u32) -> RoundResult {
        RoundResult {
            round,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn outcomes(&self) -> &BTreeMap<MatchId, MatchOutcome> {
        &self.outcomes
    }

    pub fn get(&self, id: &MatchId) -> Option<&MatchOutcome> {
        self.outcomes.get(id)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub(crate) fn insert(&mut self, id: MatchId, outcome: MatchOutcome) {
        self.outcomes.insert(id, outcome);
    }

    pub fn failures(&self) -> impl Iterator<Item = (&MatchId, &MatchFailure)> {
        self.outcomes.iter().filter_map(|(id, outcome)| match outcome {
            MatchOutcome::Failed(failure) => Some((id, failure)),
            MatchOutcome::Completed(_) => None,
        })
    }

    /// Scores of every completed match.
    pub fn completed(&self) -> impl Iterator<Item = (&MatchId, &ScoreMap)> {
        self.outcomes.iter().filter_map(|(id, outcome)| match outcome {
            MatchOutcome::Completed(scores) => Some((id, scores)),
            MatchOutcome::Failed(_) => None,
        })
    }

    /// Summed scores of the completed matches of each series, by series number.
    pub fn series_totals(&self) -> BTreeMap<u32, ScoreMap> {
        let mut totals: BTreeMap<u32, ScoreMap> = BTreeMap::new();
        for (id, scores) in self.completed() {
            let series = totals.entry(id.series).or_default();
            for (name, score) in scores {
                *series.entry(name.clone()).or_default() += score;
            }
        }
        totals
    }

    /// Applies `policy` to the failed matches.
    ///
    /// # Errors
    ///
    /// With [`FailurePolicy::Abort`], the first failure as an [`Error::MatchFailed`].
    pub fn resolve_failures(&self, policy: FailurePolicy) -> Result<RoundResult> {
        let mut resolved = RoundResult::new(self.round);
        for (id, outcome) in &self.outcomes {
            match outcome {
                MatchOutcome::Completed(_) => resolved.insert(*id, outcome.clone()),
                MatchOutcome::Failed(failure) => match policy {
                    FailurePolicy::Abort => return Err(failure.to_error(*id)),
                    FailurePolicy::Discard => {
                        info!("match {id} discarded: {}", failure.message);
                    }
                    FailurePolicy::Forfeit => match failure.forfeit_scores() {
                        Some(scores) => {
                            warn!(
                                "match {id}: {} forfeits ({})",
                                failure.culprit.as_deref().unwrap_or_default(),
                                failure.message
                            );
                            resolved.insert(*id, MatchOutcome::Completed(scores));
                        }
                        None => info!("match {id} has no culprit, discarded"),
                    },
                },
            }
        }
        Ok(resolved)
    }
}

/// Everything a round produced.
#[derive(Debug)]
pub struct RoundReport<S> {
    pub result: RoundResult,
    /// Logs of the completed series, in grouping order.
    pub logs: Vec<MatchLog<S>>,
    /// Errors of the failed groupings, in grouping order.
    pub errors: Vec<Error>,
}

/// The groupings of one tournament round.
#[derive(Debug, Clone)]
pub struct Round {
    tournament: u32,
    number: u32,
    groupings: Vec<Grouping>,
}

type GroupingOutcome<S> = (usize, std::result::Result<Vec<MatchLog<S>>, (MatchId, Error)>);

impl Round {
    pub fn new(tournament: u32, number: u32, groupings: Vec<Grouping>) -> Round {
        Round {
            tournament,
            number,
            groupings,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn groupings(&self) -> &[Grouping] {
        &self.groupings
    }

    /// Plays every grouping, `workers` at a time.
    ///
    /// Never fails as a whole: failed groupings are recorded in the result and their
    /// errors returned in the report.
    #[instrument(skip_all, fields(round = self.number))]
    pub fn run<F: GameFactory>(
        &self,
        factory: &F,
        runner: &MatchRunner<'_>,
        workers: usize,
    ) -> RoundReport<SnapshotOf<F>> {
        let workers = workers.clamp(1, self.groupings.len().max(1));
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<GroupingOutcome<SnapshotOf<F>>>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(grouping) = self.groupings.get(index) else {
                        return;
                    };
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        self.play(index, grouping, factory, runner)
                    }))
                    .unwrap_or_else(|payload| Err(self.panicked(index, payload.as_ref())));
                    if tx.send((index, outcome)).is_err() {
                        return;
                    }
                });
            }
        });
        drop(tx);

        let mut outcomes: Vec<_> = rx.into_iter().collect();
        outcomes.sort_by_key(|(index, _)| *index);

        let mut report = RoundReport {
            result: RoundResult::new(self.number),
            logs: vec![],
            errors: vec![],
        };
        for (index, outcome) in outcomes {
            match outcome {
                Ok(logs) => {
                    for log in &logs {
                        if let Some(scores) = log.scores() {
                            report
                                .result
                                .insert(log.id(), MatchOutcome::Completed(scores.clone()));
                        }
                    }
                    report.logs.extend(logs);
                }
                Err((id, error)) => {
                    let players = self.groupings[index]
                        .iter()
                        .map(|p| p.name.clone())
                        .collect();
                    report.result.insert(
                        id,
                        MatchOutcome::Failed(MatchFailure::from_error(players, &error)),
                    );
                    report.errors.push(error);
                }
            }
        }
        info!(
            matches = report.result.len(),
            failures = report.errors.len(),
            "round finished"
        );
        report
    }

    /// Failure of a grouping whose factory panicked outside of any match.
    fn panicked(&self, index: usize, payload: &(dyn std::any::Any + Send)) -> (MatchId, Error) {
        let id = MatchId::new(self.tournament, self.number, index as u32, 0);
        let error = Error::MatchFailed {
            id,
            source: Box::new(Error::from_panic(payload)),
        };
        warn!("{error}");
        (id, error)
    }

    fn play<F: GameFactory>(
        &self,
        index: usize,
        grouping: &Grouping,
        factory: &F,
        runner: &MatchRunner<'_>,
    ) -> std::result::Result<Vec<MatchLog<SnapshotOf<F>>>, (MatchId, Error)> {
        let id = MatchId::new(self.tournament, self.number, index as u32, 0);
        let positions = factory.start_positions(&id, grouping.len());
        if positions.is_empty() {
            let error = Error::MatchFailed {
                id,
                source: Box::new(Error::RuleAuthority(anyhow!("no start positions"))),
            };
            warn!("{error}");
            return Err((id, error));
        }

        let mut series = Series::new(id, grouping.clone(), positions);
        match series.run(factory, runner) {
            Ok(()) => Ok(series.into_logs().unwrap_or_default()),
            Err(error) => {
                let failed = match &error {
                    Error::MatchFailed { id, .. } => *id,
                    _ => id,
                };
                warn!("{error}");
                Err((failed, error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLauncher, FragileFactory, NimFactory, Strategy};

    fn pairs(roster: &[Arc<Participant>], seats: &[(usize, usize)]) -> Vec<Grouping> {
        seats
            .iter()
            .map(|&(a, b)| vec![roster[a].clone(), roster[b].clone()])
            .collect()
    }

    #[test]
    fn failed_grouping_does_not_stop_the_others() {
        let launcher = FakeLauncher::new(&[
            ("a", Strategy::Optimal),
            ("b", Strategy::TakeOne),
            ("c", Strategy::Optimal),
            ("d", Strategy::TakeOne),
            ("crash", Strategy::Crash),
        ]);
        let roster = launcher.roster();
        let round = Round::new(7, 1, pairs(&roster, &[(0, 1), (2, 3), (4, 0), (1, 3)]));
        let factory = NimFactory { games: 2, heap: 5 };

        let report = round.run(&factory, &MatchRunner::new(&launcher), 3);

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].culprit(), Some("crash"));
        let failure = report
            .result
            .get(&MatchId::new(7, 1, 2, 0))
            .expect("failure recorded at the failed match");
        let MatchOutcome::Failed(failure) = failure else {
            panic!("expected a failure");
        };
        assert_eq!(failure.culprit.as_deref(), Some("crash"));
        assert_eq!(failure.kind, FailureKind::Execution(ExecutionFailure::NonZeroExit(1)));
        assert_eq!(failure.players, ["crash", "a"]);

        // groupings 0, 1 and 3 completed both their games
        for series in [0, 1, 3] {
            for game in [0, 1] {
                let id = MatchId::new(7, 1, series, game);
                assert!(matches!(
                    report.result.get(&id),
                    Some(MatchOutcome::Completed(_))
                ));
            }
        }
        assert_eq!(report.result.len(), 7);
        assert_eq!(report.logs.len(), 6);
        assert_eq!(launcher.live(), 0);
    }

    #[test]
    fn panicking_game_code_fails_only_its_grouping() {
        let launcher = FakeLauncher::new(&[
            ("a", Strategy::Optimal),
            ("b", Strategy::TakeOne),
            ("c", Strategy::Optimal),
            ("d", Strategy::TakeOne),
        ]);
        let roster = launcher.roster();
        let round = Round::new(0, 2, pairs(&roster, &[(0, 1), (2, 3), (0, 2)]));
        let factory = FragileFactory {
            nim: NimFactory { games: 2, heap: 5 },
            panics_in_game: Some(0),
            panics_in_positions: Some(1),
        };

        // a single worker plays every grouping after the panics
        let report = round.run(&factory, &MatchRunner::new(&launcher), 1);

        assert_eq!(report.errors.len(), 2);
        for id in [MatchId::new(0, 2, 0, 1), MatchId::new(0, 2, 1, 0)] {
            let Some(MatchOutcome::Failed(failure)) = report.result.get(&id) else {
                panic!("no failure recorded at {id}");
            };
            assert_eq!(failure.kind, FailureKind::RuleAuthority);
            assert_eq!(failure.culprit, None);
            assert!(failure.message.contains("panicked"), "{}", failure.message);
        }
        for game in [0, 1] {
            assert!(matches!(
                report.result.get(&MatchId::new(0, 2, 2, game)),
                Some(MatchOutcome::Completed(_))
            ));
        }
        assert_eq!(report.logs.len(), 2);
        assert_eq!(launcher.live(), 0);
    }

    #[test]
    fn series_totals_sum_the_games() {
        let launcher =
            FakeLauncher::new(&[("smart", Strategy::Optimal), ("naive", Strategy::TakeOne)]);
        let round = Round::new(0, 1, pairs(&launcher.roster(), &[(0, 1)]));
        let report = round.run(&NimFactory { games: 3, heap: 5 }, &MatchRunner::new(&launcher), 0);
        let totals = report.result.series_totals();
        assert_eq!(totals[&0]["smart"], 3.0);
        assert_eq!(totals[&0]["naive"], 0.0);
    }

    #[test]
    fn grouping_without_positions_fails() {
        let launcher = FakeLauncher::new(&[("a", Strategy::Optimal), ("b", Strategy::Optimal)]);
        let round = Round::new(0, 1, pairs(&launcher.roster(), &[(0, 1)]));
        let report = round.run(&NimFactory { games: 0, heap: 5 }, &MatchRunner::new(&launcher), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.result.failures().count(), 1);
        assert_eq!(launcher.launched(), 0);
    }

    fn failed(culprit: Option<&str>) -> MatchOutcome {
        MatchOutcome::Failed(MatchFailure {
            players: vec!["a".into(), "b".into()],
            culprit: culprit.map(str::to_owned),
            kind: FailureKind::Execution(ExecutionFailure::ProcessExited),
            message: "process exited".into(),
        })
    }

    #[test]
    fn failure_policies() {
        let mut result = RoundResult::new(1);
        let done: ScoreMap = [("a".to_string(), 1.0), ("b".to_string(), 0.0)].into();
        result.insert(MatchId::new(0, 1, 0, 0), MatchOutcome::Completed(done.clone()));
        result.insert(MatchId::new(0, 1, 1, 0), failed(Some("b")));
        result.insert(MatchId::new(0, 1, 2, 0), failed(None));

        let err = result.resolve_failures(FailurePolicy::Abort).unwrap_err();
        assert_eq!(err.culprit(), Some("b"));
        assert!(matches!(err, Error::MatchFailed { id, .. } if id == MatchId::new(0, 1, 1, 0)));

        let discarded = result.resolve_failures(FailurePolicy::Discard).unwrap();
        assert_eq!(discarded.len(), 1);

        let forfeited = result.resolve_failures(FailurePolicy::Forfeit).unwrap();
        assert_eq!(forfeited.len(), 2);
        assert_eq!(
            forfeited.get(&MatchId::new(0, 1, 1, 0)),
            Some(&MatchOutcome::Completed(done))
        );
        assert_eq!(forfeited.failures().count(), 0);
    }
}
