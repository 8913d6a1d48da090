//! Bot processes, optionally contained in a cgroup.
//!
//! A [`LimitedProcess`] owns the child and, on Linux, the cgroup it was placed in. Killing
//! it kills every process of the cgroup, so a bot cannot leave helpers behind.

#[cfg(target_os = "linux")]
mod cgroup_manager_linux;

#[cfg(target_os = "linux")]
pub use cgroup_manager_linux::*;

#[cfg(not(target_os = "linux"))]
mod cgroup_manager_stub;

#[cfg(not(target_os = "linux"))]
pub use cgroup_manager_stub::*;

use std::{
    process::{Child, ExitStatus, Stdio},
    time::{Duration, Instant},
};

use anyhow::Context;

/// Spawns `command` with piped stdin/stdout.
fn create_process(command: &str, args: &[String], allow_stderr: bool) -> anyhow::Result<Child> {
    let mut cmd = std::process::Command::new(command);
    cmd.args(args).stdin(Stdio::piped()).stdout(Stdio::piped());
    if !allow_stderr {
        cmd.stderr(Stdio::null());
    }
    cmd.spawn()
        .with_context(|| format!("command '{command}' could not be started"))
}

/// Polls the child until it exits or `max_duration` elapses.
fn wait_for_exit(child: &mut Child, max_duration: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + max_duration;
    let step = (max_duration / 10).clamp(Duration::from_millis(1), Duration::from_millis(5));
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => std::thread::sleep(step),
            _ => return None,
        }
    }
}

/// Kills an uncontained child and reaps it.
fn kill_child(child: &mut Child, max_duration: Duration) -> anyhow::Result<()> {
    if let Ok(Some(_)) = child.try_wait() {
        return Ok(());
    }
    child.kill().context("could not kill process")?;
    wait_for_exit(child, max_duration)
        .map(|_| ())
        .context("process did not exit after being killed")
}

/// Kills and reaps a child that will not be used, logging what fails.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn discard(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::warn!("could not kill process {}: {e}", child.id());
    }
    if let Err(e) = child.wait() {
        tracing::warn!("could not reap process {}: {e}", child.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncontained_process_is_killed() {
        let mut process = LimitedProcess::launch_without_container(
            "sleep",
            &["30".to_string()],
            false,
        )
        .unwrap();
        assert!(process.try_wait().unwrap().is_none());
        process.try_kill(Duration::from_secs(1)).unwrap();
        assert!(process.try_wait().unwrap().is_some());
    }

    #[test]
    fn terminate_lets_process_exit_on_its_own() {
        let mut process =
            LimitedProcess::launch_without_container("cat", &[], false).unwrap();
        let (stdin, _stdout) = process.take_stdio();
        drop(stdin);
        let status = process
            .terminate(Duration::from_secs(1), Duration::from_secs(1))
            .unwrap();
        assert!(status.is_some_and(|s| s.success()));
    }

    #[test]
    fn unknown_command_is_reported() {
        let err = LimitedProcess::launch_without_container("./definitely-not-a-bot", &[], false)
            .unwrap_err();
        assert!(format!("{err:#}").contains("definitely-not-a-bot"));
    }

    #[test]
    fn discarded_child_is_reaped() {
        let mut child = create_process("sleep", &["30".to_string()], false).unwrap();
        discard(&mut child);
        assert!(child.try_wait().unwrap().is_some());
        // already reaped: only logs
        discard(&mut child);
    }
}
