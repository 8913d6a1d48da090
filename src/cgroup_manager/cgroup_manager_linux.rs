use std::{
    io,
    process::{Child, ChildStdin, ChildStdout, ExitStatus},
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use cgroups_rs::{cgroup_builder::CgroupBuilder, Cgroup, CgroupPid, MaxValue};
use tracing::{debug, error, warn};

use super::{create_process, discard, kill_child, wait_for_exit};

/// Processes a bot may run at the same time, itself included.
const MAX_PIDS: i64 = 100;

/// Real user id, read from `/proc/self/status`.
fn real_uid() -> anyhow::Result<u32> {
    let status =
        std::fs::read_to_string("/proc/self/status").context("could not read process status")?;
    let line = status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .context("no Uid line in process status")?;
    let uid = line
        .split_whitespace()
        .next()
        .context("empty Uid line")?;
    uid.parse().with_context(|| format!("invalid uid '{uid}'"))
}

/// The cgroup of one bot. Deleted when dropped.
#[derive(Debug)]
struct BotCgroup {
    cgroup: Cgroup,
    path: String,
}

impl BotCgroup {
    /// Creates a cgroup under the user's systemd service, which is delegated to the user.
    fn create(max_memory: i64) -> anyhow::Result<BotCgroup> {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        let uid = real_uid()?;
        let path = format!(
            "user.slice/user-{uid}.slice/user@{uid}.service/bot_tournament_{}_{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        );

        let mut builder = CgroupBuilder::new(&path)
            .pid()
            .maximum_number_of_processes(MaxValue::Value(MAX_PIDS))
            .done();
        if max_memory > 0 {
            builder = builder.memory().memory_hard_limit(max_memory).done();
        }
        let cgroup = builder
            .build(cgroups_rs::hierarchies::auto())
            .with_context(|| format!("could not create cgroup '{path}'"))?;
        Ok(BotCgroup { cgroup, path })
    }

    /// Moves `child` into the cgroup. The child is killed if it cannot be moved.
    fn adopt(&self, child: &mut Child) -> anyhow::Result<()> {
        let pid = CgroupPid::from(child.id() as u64);
        if let Err(e) = self.cgroup.add_task_by_tgid(pid) {
            discard(child);
            return Err(e).context("could not add process to cgroup");
        }
        Ok(())
    }

    /// Kills every process of the cgroup and waits until it is empty.
    fn kill_all(&self, max_duration: Duration) -> anyhow::Result<()> {
        self.cgroup.kill().context("could not kill cgroup")?;
        let deadline = Instant::now() + max_duration;
        while !self.cgroup.tasks().is_empty() {
            if Instant::now() > deadline {
                bail!("cgroup '{}' still not empty after {max_duration:?}", self.path);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(())
    }
}

impl Drop for BotCgroup {
    fn drop(&mut self) {
        if let Err(e) = self.cgroup.delete() {
            warn!("could not remove cgroup '{}', it will stay until reboot: {e}", self.path);
        }
    }
}

/// A child process, contained in its own cgroup when launched with [`LimitedProcess::launch`].
#[derive(Debug)]
pub struct LimitedProcess {
    child: Child,
    cgroup: Option<BotCgroup>,
    reaped: bool,
}

impl LimitedProcess {
    /// Launches `command` inside a new cgroup limited to `max_memory` bytes.
    pub fn launch(
        command: &str,
        args: &[String],
        max_memory: i64,
        allow_stderr: bool,
    ) -> anyhow::Result<LimitedProcess> {
        let cgroup = BotCgroup::create(max_memory)?;
        let mut child = create_process(command, args, allow_stderr)?;
        cgroup.adopt(&mut child)?;
        debug!(pid = child.id(), cgroup = %cgroup.path, "contained process launched");

        Ok(LimitedProcess {
            child,
            cgroup: Some(cgroup),
            reaped: false,
        })
    }

    /// Launches `command` without any containment.
    pub fn launch_without_container(
        command: &str,
        args: &[String],
        allow_stderr: bool,
    ) -> anyhow::Result<LimitedProcess> {
        Ok(LimitedProcess {
            child: create_process(command, args, allow_stderr)?,
            cgroup: None,
            reaped: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn is_contained(&self) -> bool {
        self.cgroup.is_some()
    }

    pub fn take_stdio(&mut self) -> (Option<ChildStdin>, Option<ChildStdout>) {
        (self.child.stdin.take(), self.child.stdout.take())
    }

    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Gives the process `grace` to exit on its own, then kills it.
    ///
    /// Returns the exit status when the process exited by itself.
    pub fn terminate(
        &mut self,
        grace: Duration,
        max_duration: Duration,
    ) -> anyhow::Result<Option<ExitStatus>> {
        let status = wait_for_exit(&mut self.child, grace);
        // children of the bot may still be alive in the cgroup
        self.try_kill(max_duration)?;
        Ok(status)
    }

    /// Kills the process (and everything in its cgroup) and reaps it.
    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        if self.reaped {
            return Ok(());
        }
        match &self.cgroup {
            Some(cgroup) => {
                cgroup.kill_all(max_duration)?;
                wait_for_exit(&mut self.child, max_duration)
                    .context("process did not exit after its cgroup was killed")?;
            }
            None => kill_child(&mut self.child, max_duration)?,
        }
        self.reaped = true;
        // dropping the cgroup deletes it
        self.cgroup = None;
        Ok(())
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        if let Err(e) = self.try_kill(Duration::from_millis(500)) {
            error!("could not kill process {}: {e:#}", self.child.id());
        }
    }
}
