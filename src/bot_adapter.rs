//! Bot processes and the way matches talk to them.
//!
//! A match only sees the [`Bot`] trait. The real implementation, [`BotProcess`], runs the
//! participant's launch command and talks to it line by line:
//!
//! - a request is the encoded view followed by `\n`, written on the bot's stdin,
//! - the answer is the next line the bot prints on its stdout.
//!
//! Every wait is bounded by the [`Constraints`]: startup, each move (and the remaining
//! time budget of the match) and stop. After any fault the process is stopped at once.

use std::{
    io::{BufRead, BufReader, Read, Write},
    process::{ChildStdin, ChildStdout},
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, instrument, trace, warn};

use crate::{
    cgroup_manager::LimitedProcess,
    configuration::Configuration,
    constraints::Constraints,
    error::{Error, ExecutionError, ExecutionFailure, LaunchError},
    game_interface::Codec,
    participant::Participant,
};

/// One participant's program, as seen by a match.
///
/// Implementations own at most one OS process and must not share it.
pub trait Bot: Send {
    fn participant(&self) -> &Participant;

    /// Starts the program. Blocks until it is ready or the startup timeout elapses.
    fn start(&mut self) -> Result<(), LaunchError>;

    /// Sends one request and waits for one answer.
    ///
    /// A failed exchange leaves the bot stopped. Nothing is retried.
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, ExecutionError>;

    /// Stops the program. Idempotent, and valid on a bot that never started.
    fn stop(&mut self);
}

impl dyn Bot + '_ {
    /// Encodes `view`, sends it and decodes the answer into a move.
    ///
    /// An answer the codec rejects is a [`ExecutionFailure::MalformedOutput`] and stops the bot.
    pub fn request_move<C: Codec>(&mut self, view: &C::View, codec: &C) -> crate::Result<C::Move> {
        let request = codec.encode(view).map_err(Error::RuleAuthority)?;
        let answer = self.exchange(&request)?;
        codec.decode(&answer).map_err(|e| {
            self.stop();
            ExecutionError::new(
                self.participant().name.clone(),
                ExecutionFailure::MalformedOutput(format!("{e:#}")),
            )
            .into()
        })
    }
}

/// Creates the bots of a match.
pub trait Launcher: Sync {
    fn launch(&self, participant: &Arc<Participant>) -> Box<dyn Bot>;
}

/// Launches every participant as an OS process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    constraints: Constraints,
    config: Configuration,
}

impl ProcessLauncher {
    pub fn new(constraints: Constraints, config: Configuration) -> ProcessLauncher {
        ProcessLauncher {
            constraints,
            config,
        }
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, participant: &Arc<Participant>) -> Box<dyn Bot> {
        Box::new(BotProcess::new(
            participant.clone(),
            self.constraints.clone(),
            &self.config,
        ))
    }
}

/// Answers longer than this are rejected.
const MAX_LINE_BYTES: u64 = 1 << 20;
/// How long a forced kill may take.
const KILL_TIMEOUT: Duration = Duration::from_secs(1);

enum ReadEvent {
    Line(Vec<u8>),
    Eof,
    Failed(String),
}

struct Running {
    process: LimitedProcess,
    requests: Option<Sender<Vec<u8>>>,
    answers: Receiver<ReadEvent>,
    time_used: Duration,
}

enum State {
    NotStarted,
    Running(Running),
    Stopped,
}

/// A participant's program running as a child process.
pub struct BotProcess {
    participant: Arc<Participant>,
    constraints: Constraints,
    ready_line: Option<String>,
    allow_uncontained: bool,
    allow_stderr: bool,
    state: State,
}

impl BotProcess {
    pub fn new(
        participant: Arc<Participant>,
        constraints: Constraints,
        config: &Configuration,
    ) -> BotProcess {
        BotProcess {
            participant,
            constraints,
            ready_line: config.ready_line.clone(),
            allow_uncontained: config.allow_uncontained,
            allow_stderr: config.debug_agent_stderr,
            state: State::NotStarted,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    /// OS process id, while running.
    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            State::Running(running) => Some(running.process.id()),
            _ => None,
        }
    }

    /// Thinking time spent so far.
    pub fn time_used(&self) -> Duration {
        match &self.state {
            State::Running(running) => running.time_used,
            _ => Duration::ZERO,
        }
    }

    fn launch_error(&self, reason: impl Into<String>) -> LaunchError {
        LaunchError::new(self.participant.name.clone(), reason)
    }

    fn spawn(&self) -> Result<LimitedProcess, LaunchError> {
        let (program, args) = self
            .participant
            .program_and_args()
            .ok_or_else(|| self.launch_error("empty launch command"))?;

        let uncontained = || {
            LimitedProcess::launch_without_container(&program, &args, self.allow_stderr)
                .map_err(|e| self.launch_error(format!("{e:#}")))
        };

        match self.constraints.agent_ram {
            None => uncontained(),
            Some(max_memory) => {
                match LimitedProcess::launch(
                    &program,
                    &args,
                    max_memory as i64,
                    self.allow_stderr,
                ) {
                    Ok(process) => Ok(process),
                    Err(e) if self.allow_uncontained => {
                        warn!(
                            "could not contain '{}', running it uncontained: {e:#}",
                            self.participant
                        );
                        uncontained()
                    }
                    Err(e) => Err(self.launch_error(format!("{e:#}"))),
                }
            }
        }
    }

    fn wait_until_ready(
        &self,
        answers: &Receiver<ReadEvent>,
        ready_line: &str,
    ) -> Result<(), LaunchError> {
        match answers.recv_timeout(self.constraints.startup_time) {
            Ok(ReadEvent::Line(line)) if line.trim_ascii() == ready_line.as_bytes() => Ok(()),
            Ok(ReadEvent::Line(line)) => Err(self.launch_error(format!(
                "expected '{ready_line}', got '{}'",
                String::from_utf8_lossy(&line)
            ))),
            Ok(ReadEvent::Failed(e)) => Err(self.launch_error(e)),
            Ok(ReadEvent::Eof) | Err(RecvTimeoutError::Disconnected) => {
                Err(self.launch_error("exited before being ready"))
            }
            Err(RecvTimeoutError::Timeout) => Err(self.launch_error(format!(
                "not ready within {:?}",
                self.constraints.startup_time
            ))),
        }
    }

    /// Stops the process and describes why it stopped answering.
    fn exit_failure(&mut self) -> ExecutionFailure {
        let State::Running(running) = std::mem::replace(&mut self.state, State::Stopped) else {
            return ExecutionFailure::ProcessExited;
        };
        match shutdown(running, self.constraints.stop_grace) {
            Some(code) if code != 0 => ExecutionFailure::NonZeroExit(code),
            _ => ExecutionFailure::ProcessExited,
        }
    }

    fn fault(&mut self, reason: ExecutionFailure) -> ExecutionError {
        warn!("'{}' failed: {reason}", self.participant);
        self.stop();
        ExecutionError::new(self.participant.name.clone(), reason)
    }
}

impl Bot for BotProcess {
    fn participant(&self) -> &Participant {
        &self.participant
    }

    #[instrument(skip_all, fields(bot = %self.participant.name))]
    fn start(&mut self) -> Result<(), LaunchError> {
        match self.state {
            State::NotStarted => {}
            State::Running(_) => return Ok(()),
            State::Stopped => return Err(self.launch_error("bot was already stopped")),
        }
        self.state = State::Stopped;

        let mut process = self.spawn()?;
        let (stdin, stdout) = process.take_stdio();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            return Err(self.launch_error("could not open the process pipes"));
        };

        let (answers_tx, answers) = mpsc::channel();
        let (requests, requests_rx) = mpsc::channel();
        // both threads end by themselves once the pipes are closed; they are never joined
        // since a leftover child of the bot may hold a pipe open
        let threads = thread::Builder::new()
            .name(format!("{}-stdout", self.participant.name))
            .spawn(move || read_lines(stdout, answers_tx))
            .and_then(|_| {
                thread::Builder::new()
                    .name(format!("{}-stdin", self.participant.name))
                    .spawn(move || write_requests(stdin, requests_rx))
            });
        if let Err(e) = threads {
            if let Err(kill) = process.try_kill(KILL_TIMEOUT) {
                warn!("could not kill '{}': {kill:#}", self.participant);
            }
            return Err(self.launch_error(format!("could not start io threads: {e}")));
        }

        let mut running = Running {
            process,
            requests: Some(requests),
            answers,
            time_used: Duration::ZERO,
        };

        let ready = match &self.ready_line {
            Some(line) => self.wait_until_ready(&running.answers, line),
            None => match running.process.try_wait() {
                Ok(None) => Ok(()),
                Ok(Some(status)) => {
                    Err(self.launch_error(format!("exited at startup ({status})")))
                }
                Err(e) => Err(self.launch_error(e.to_string())),
            },
        };
        if let Err(e) = ready {
            shutdown(running, Duration::ZERO);
            return Err(e);
        }

        debug!(
            pid = running.process.id(),
            contained = running.process.is_contained(),
            "bot started"
        );
        self.state = State::Running(running);
        Ok(())
    }

    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, ExecutionError> {
        let State::Running(running) = &mut self.state else {
            return Err(ExecutionError::new(
                self.participant.name.clone(),
                ExecutionFailure::ProcessExited,
            ));
        };

        let timeout = self.constraints.move_timeout(running.time_used);
        let mut message = Vec::with_capacity(request.len() + 1);
        message.extend_from_slice(request);
        message.push(b'\n');
        let sent = running
            .requests
            .as_ref()
            .is_some_and(|requests| requests.send(message).is_ok());
        if !sent {
            let reason = self.exit_failure();
            return Err(self.fault(reason));
        }

        let asked = Instant::now();
        let event = running.answers.recv_timeout(timeout);
        running.time_used += asked.elapsed();
        trace!(bot = %self.participant.name, elapsed = ?asked.elapsed(), "answer received");

        match event {
            Ok(ReadEvent::Line(line)) => Ok(line),
            Ok(ReadEvent::Failed(e)) => Err(self.fault(ExecutionFailure::MalformedOutput(e))),
            Ok(ReadEvent::Eof) | Err(RecvTimeoutError::Disconnected) => {
                let reason = self.exit_failure();
                Err(self.fault(reason))
            }
            Err(RecvTimeoutError::Timeout) => Err(self.fault(ExecutionFailure::Timeout(timeout))),
        }
    }

    fn stop(&mut self) {
        if let State::Running(running) = std::mem::replace(&mut self.state, State::Stopped) {
            debug!("stopping '{}'", self.participant);
            shutdown(running, self.constraints.stop_grace);
        }
    }
}

impl Drop for BotProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Closes the bot's stdin, gives it `grace` to exit, then kills it.
///
/// Returns the exit code if the bot exited by itself.
fn shutdown(mut running: Running, grace: Duration) -> Option<i32> {
    running.requests.take();
    match running.process.terminate(grace, KILL_TIMEOUT) {
        Ok(status) => status.and_then(|status| status.code()),
        Err(e) => {
            tracing::error!("could not stop bot process {}: {e:#}", running.process.id());
            None
        }
    }
}

fn read_lines(stdout: ChildStdout, answers: Sender<ReadEvent>) {
    let mut reader = BufReader::new(stdout);
    loop {
        let mut line = Vec::new();
        let event = match (&mut reader).take(MAX_LINE_BYTES).read_until(b'\n', &mut line) {
            Ok(0) => ReadEvent::Eof,
            Ok(_) if line.last() == Some(&b'\n') => {
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                ReadEvent::Line(line)
            }
            Ok(n) if n as u64 == MAX_LINE_BYTES => {
                ReadEvent::Failed(format!("line longer than {MAX_LINE_BYTES} bytes"))
            }
            // last line without newline
            Ok(_) => ReadEvent::Line(line),
            Err(e) => ReadEvent::Failed(format!("could not read output: {e}")),
        };
        let last = !matches!(event, ReadEvent::Line(_));
        if answers.send(event).is_err() || last {
            return;
        }
    }
}

fn write_requests(mut stdin: ChildStdin, requests: Receiver<Vec<u8>>) {
    for message in requests {
        if stdin.write_all(&message).and_then(|()| stdin.flush()).is_err() {
            return;
        }
    }
}
