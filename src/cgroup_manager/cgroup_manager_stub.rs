use std::{
    io,
    process::{Child, ChildStdin, ChildStdout, ExitStatus},
    time::Duration,
};

use anyhow::{self, bail};

use super::{create_process, kill_child, wait_for_exit};

/// A child process. Containment is not available on this platform.
#[derive(Debug)]
#[derive(Debug)]
pub struct LimitedProcess {
    child: Child,
    cleaned_up: bool,
}

impl LimitedProcess {
    pub fn launch(
        _command: &str,
        _args: &[String],
        _max_memory: i64,
        _allow_stderr: bool,
    ) -> anyhow::Result<LimitedProcess> {
        bail!("cgroups only available on linux")
    }

    pub fn launch_without_container(
        command: &str,
        args: &[String],
        allow_stderr: bool,
    ) -> anyhow::Result<LimitedProcess> {
        let child = create_process(command, args, allow_stderr)?;

        Ok(LimitedProcess {
            child,
            cleaned_up: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn is_contained(&self) -> bool {
        false
    }

    pub fn take_stdio(&mut self) -> (Option<ChildStdin>, Option<ChildStdout>) {
        (self.child.stdin.take(), self.child.stdout.take())
    }

    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    pub fn terminate(
        &mut self,
        grace: Duration,
        max_duration: Duration,
    ) -> anyhow::Result<Option<ExitStatus>> {
        let status = wait_for_exit(&mut self.child, grace);
        self.try_kill(max_duration)?;
        Ok(status)
    }

    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
        kill_child(&mut self.child, max_duration)?;
        self.cleaned_up = true;
        Ok(())
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        const CLEANUP_DURATION: Duration = Duration::from_millis(500);
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(CLEANUP_DURATION) {
                tracing::error!(
                    "could not kill process {} on LimitedProcess::drop: {e:#}",
                    self.child.id()
                );
            }
        }
    }
}
