//! Top-level tournament loop.
//!
//! This module defines the [`Tournament`] type, which drives a whole tournament:
//!
//! - Chooses the pairing system (by name from the [`Configuration`], or given explicitly)
//! - Plays every round it plans through a [`Round`], with bots launched under [`Constraints`]
//! - Applies the configured [`FailurePolicy`](crate::configuration::FailurePolicy) to each
//!   round result before handing it back to the pairing system
//! - Exposes the final ranking, standings, raw round results and match logs
//!
//! Results are only available once [`Tournament::run`] completed; before that every
//! accessor fails with [`Error::NotFinished`].
//!
//! # Verbose output
//!
//! With `config.verbose`, one line is printed per finished or failed match, followed by the
//! final standings.

use std::sync::Arc;

use tracing::{error, info, instrument, trace};

use crate::{
    bot_adapter::{Launcher, ProcessLauncher},
    configuration::Configuration,
    constraints::Constraints,
    error::{ConfigurationError, Error, Result},
    game_interface::{GameFactory, SnapshotOf},
    logger::init_logger,
    match_log::MatchLog,
    match_runner::MatchRunner,
    participant::Participant,
    record::TournamentRecord,
    round::{Round, RoundReport, RoundResult},
    standings::Standings,
    tournament_strategy::{self, PairingOptions, PairingSystem},
};

/// Everything a finished tournament produced.
struct Finished<S> {
    pairing: Box<dyn PairingSystem>,
    ranking: Vec<Arc<Participant>>,
    rounds: Vec<RoundResult>,
    logs: Vec<MatchLog<S>>,
}

/// A tournament between external bots.
///
/// # Type Parameters
/// - `F`: the [`GameFactory`] creating the games and their start positions
pub struct Tournament<F: GameFactory> {
    id: u32,
    factory: F,
    participants: Vec<Arc<Participant>>,
    config: Configuration,
    constraints: Constraints,
    options: PairingOptions,
    launcher: Option<Box<dyn Launcher>>,
    pairing: Option<Box<dyn PairingSystem>>,
    /// Set once the pairing system has planned a round.
    started: bool,
    finished: Option<Finished<SnapshotOf<F>>>,
}

impl<F: GameFactory> Tournament<F> {
    /// Creates a tournament. Nothing runs until [`Tournament::run`].
    #[instrument(skip_all)]
    pub fn new(
        factory: F,
        participants: Vec<Arc<Participant>>,
        config: Configuration,
        constraints: Constraints,
    ) -> Tournament<F> {
        trace!(?config, ?constraints);
        Tournament {
            id: 0,
            factory,
            participants,
            config,
            constraints,
            options: PairingOptions::default(),
            launcher: None,
            pairing: None,
            started: false,
            finished: None,
        }
    }

    /// Tournament number, used in every match identity (default `0`).
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Options given to the pairing system factory.
    pub fn with_pairing_options(mut self, options: PairingOptions) -> Self {
        self.options = options;
        self
    }

    /// Launches bots with `launcher` instead of starting OS processes.
    pub fn with_launcher(mut self, launcher: Box<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Uses `pairing` instead of the pairing system named in the configuration.
    ///
    /// Its participants replace the ones given to [`Tournament::new`].
    pub fn with_pairing_system(mut self, pairing: Box<dyn PairingSystem>) -> Self {
        self.participants = pairing.participants().to_vec();
        self.pairing = Some(pairing);
        self
    }

    /// Plays every round until the pairing system has no more.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if the pairing system cannot be created or rejects a result
    /// - [`Error::MatchFailed`] for the first failed match, with
    ///   [`FailurePolicy::Abort`](crate::configuration::FailurePolicy::Abort)
    /// - [`ConfigurationError::AlreadyRan`] on a second call, even if the first one failed:
    ///   the pairing system of an aborted tournament is left mid-round and is not reused
    #[instrument(skip_all, fields(tournament = self.id))]
    pub fn run(&mut self) -> Result<()> {
        if self.started {
            return Err(ConfigurationError::AlreadyRan.into());
        }
        if self.config.log {
            if let Err(e) = init_logger() {
                eprintln!("Could not start logging: {e:#}");
            }
        }

        let mut pairing = match self.pairing.take() {
            Some(pairing) => pairing,
            None => tournament_strategy::create(
                self.config.pairing_system(),
                self.participants.clone(),
                self.options,
            )?,
        };
        self.started = true;
        info!(
            pairing_system = pairing.name(),
            participants = self.participants.len(),
            "starting tournament"
        );

        let default_launcher;
        let launcher: &dyn Launcher = match &self.launcher {
            Some(launcher) => launcher.as_ref(),
            None => {
                default_launcher =
                    ProcessLauncher::new(self.constraints.clone(), self.config.clone());
                &default_launcher
            }
        };
        let runner = MatchRunner::new(launcher).with_max_ticks(self.config.max_ticks);
        let policy = self.config.failure_policy();
        let verbose = self.config.verbose;

        let mut rounds = vec![];
        let mut logs = vec![];
        while let Some(plan) = pairing.next_round()? {
            info!(
                round = plan.round(),
                groupings = plan.groupings().len(),
                byes = plan.byes().len(),
                "next round"
            );
            let round = Round::new(self.id, plan.round(), plan.groupings().to_vec());
            let report = round.run(&self.factory, &runner, self.config.worker_count());
            if verbose {
                print_round_report(&report);
            }

            let resolved = match report.result.resolve_failures(policy) {
                Ok(resolved) => resolved,
                Err(e) => {
                    error!("tournament aborted: {e}");
                    return Err(e);
                }
            };
            pairing.apply_results(plan.into_token(), &resolved)?;
            rounds.push(report.result);
            logs.extend(report.logs);
        }

        let ranking = pairing.final_ranking()?;
        if verbose {
            print_final_standings(&ranking, pairing.standings());
        }
        info!(
            winner = ranking.first().map(|p| p.name.as_str()),
            "tournament finished"
        );
        self.finished = Some(Finished {
            pairing,
            ranking,
            rounds,
            logs,
        });
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    fn finished(&self) -> Result<&Finished<SnapshotOf<F>>> {
        self.finished.as_ref().ok_or(Error::NotFinished)
    }

    /// Participants from best to worst.
    pub fn final_ranking(&self) -> Result<&[Arc<Participant>]> {
        Ok(&self.finished()?.ranking)
    }

    pub fn standings(&self) -> Result<&Standings> {
        Ok(self.finished()?.pairing.standings())
    }

    /// Round results as played, failed matches included.
    pub fn rounds(&self) -> Result<&[RoundResult]> {
        Ok(&self.finished()?.rounds)
    }

    /// Logs of every completed series, round after round.
    pub fn logs(&self) -> Result<&[MatchLog<SnapshotOf<F>>]> {
        Ok(&self.finished()?.logs)
    }

    /// A record of the tournament that can be saved and replayed.
    pub fn record(&self) -> Result<TournamentRecord> {
        let finished = self.finished()?;
        Ok(TournamentRecord {
            tournament: self.id,
            pairing_system: finished.pairing.name().to_owned(),
            failure_policy: self.config.failure_policy(),
            participants: self.participants.iter().map(|p| (**p).clone()).collect(),
            rounds: finished.rounds.clone(),
            standings: finished.pairing.standings().clone(),
            ranking: finished.ranking.iter().map(|p| p.name.clone()).collect(),
        })
    }
}

fn print_round_report<S>(report: &RoundReport<S>) {
    for log in &report.logs {
        let scores = log
            .scores()
            .map(|scores| {
                log.players()
                    .iter()
                    .map(|name| format!("{}", scores.get(name).copied().unwrap_or_default()))
                    .collect::<Vec<_>>()
                    .join("-")
            })
            .unwrap_or_default();
        // clear line, green match, default results, start of line
        println!(
            "\x1b[2K\x1b[32m{} {}: \x1b[39m{scores}\x1b[0G",
            log.id(),
            log.players().join(" VS "),
        );
    }
    for e in &report.errors {
        // red errors
        println!("\x1b[2K\x1b[31m{e}\x1b[39m\x1b[0G");
    }
}

fn print_final_standings(ranking: &[Arc<Participant>], standings: &Standings) {
    let width = ranking
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(0)
        .max(4);
    println!("\x1b[1m{:>4}  {:<width$}  {:<16}  points\x1b[0m", "#", "bot", "author");
    for (rank, participant) in ranking.iter().enumerate() {
        let points = standings
            .get(&participant.name)
            .map_or(0, |entry| entry.points());
        println!(
            "{:>4}  {:<width$}  {:<16}  {points}",
            rank + 1,
            participant.name,
            participant.author,
        );
    }
}
