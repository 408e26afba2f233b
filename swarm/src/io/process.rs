//! Helpers for running child processes without risking pipe deadlocks.
//!
//! Every entry point returns a [`CommandResult`]; spawn and I/O faults are
//! folded into a failed result (exit status [`FAILED_EXIT_STATUS`]) instead of
//! being returned as errors.

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Exit status reported when the process never exited normally.
pub const FAILED_EXIT_STATUS: i32 = -1;

/// Which pipe a streamed line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Line callback shared by both reader threads.
pub type LineCallback<'a> = dyn Fn(StreamKind, &str) + Sync + 'a;

/// A command either interpreted by `sh -c` or executed directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    Shell(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    fn to_command(&self) -> Result<Command> {
        match self {
            CommandSpec::Shell(script) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(script);
                Ok(cmd)
            }
            CommandSpec::Argv(argv) => {
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| anyhow!("empty argument list"))?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                Ok(cmd)
            }
        }
    }

    fn prepare(&self, workdir: Option<&Path>) -> Result<Command> {
        let mut cmd = self.to_command()?;
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Ok(cmd)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Shell(script) => f.write_str(script),
            CommandSpec::Argv(argv) => f.write_str(&argv.join(" ")),
        }
    }
}

impl From<&str> for CommandSpec {
    fn from(script: &str) -> Self {
        CommandSpec::Shell(script.to_string())
    }
}

impl From<String> for CommandSpec {
    fn from(script: String) -> Self {
        CommandSpec::Shell(script)
    }
}

impl From<Vec<String>> for CommandSpec {
    fn from(argv: Vec<String>) -> Self {
        CommandSpec::Argv(argv)
    }
}

impl From<&[&str]> for CommandSpec {
    fn from(argv: &[&str]) -> Self {
        CommandSpec::Argv(argv.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CommandSpec {
    fn from(argv: [&str; N]) -> Self {
        CommandSpec::Argv(argv.iter().map(|s| s.to_string()).collect())
    }
}

/// Outcome of one command. `success` holds iff `exit_status == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    stdout: String,
    stderr: String,
    exit_status: i32,
    success: bool,
}

impl CommandResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_status: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status,
            success: exit_status == 0,
        }
    }

    /// A result for a command that never produced a normal exit status.
    pub fn failed(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::new(stdout, stderr, FAILED_EXIT_STATUS)
    }

    fn from_status(stdout: String, stderr: String, status: ExitStatus) -> Self {
        Self::new(stdout, stderr, status.code().unwrap_or(FAILED_EXIT_STATUS))
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn exit_status(&self) -> i32 {
        self.exit_status
    }

    pub fn success(&self) -> bool {
        self.success
    }
}

/// Seam for executing setup commands, so callers can substitute a runner.
pub trait CommandRunner {
    fn run(&self, command: &CommandSpec, workdir: Option<&Path>) -> Result<CommandResult>;
}

/// Stateless process executor.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl CommandRunner for ProcessExecutor {
    fn run(&self, command: &CommandSpec, workdir: Option<&Path>) -> Result<CommandResult> {
        Ok(Self::capture(command.clone(), workdir))
    }
}

impl ProcessExecutor {
    /// Run to completion and return fully buffered output.
    pub fn capture(command: impl Into<CommandSpec>, workdir: Option<&Path>) -> CommandResult {
        let command = command.into();
        capture_command(&command, workdir).unwrap_or_else(|err| {
            error!(command = %command, err = %format!("{err:#}"), "command could not be run");
            CommandResult::failed("", format!("{err:#}"))
        })
    }

    /// Run to completion, draining stdout and stderr on separate threads and
    /// handing every line (newline included) to `on_line` as it arrives.
    ///
    /// Line order is preserved within a stream, not across streams.
    pub fn stream(
        command: impl Into<CommandSpec>,
        workdir: Option<&Path>,
        on_line: Option<&LineCallback<'_>>,
    ) -> CommandResult {
        let command = command.into();
        let mut stdout = String::new();
        let mut stderr = String::new();
        match stream_command(&command, workdir, on_line, &mut stdout, &mut stderr) {
            Ok(status) => CommandResult::from_status(stdout, stderr, status),
            Err(err) => {
                error!(command = %command, err = %format!("{err:#}"), "streamed command failed");
                stderr.push_str(&format!("{err:#}"));
                CommandResult::failed(stdout, stderr)
            }
        }
    }

    /// Like [`capture`](Self::capture), but gives up after `timeout_secs`.
    ///
    /// The deadline also bounds reading the output. On timeout the child is
    /// killed; a grandchild that keeps the pipes open is not waited for.
    pub fn with_timeout(
        command: impl Into<CommandSpec>,
        timeout_secs: f64,
        workdir: Option<&Path>,
    ) -> CommandResult {
        let command = command.into();
        match timed_command(&command, timeout_secs, workdir) {
            Ok(Some(result)) => result,
            Ok(None) => {
                CommandResult::failed("", format!("Command timed out after {timeout_secs} seconds"))
            }
            Err(err) => {
                error!(command = %command, err = %format!("{err:#}"), "command could not be run");
                CommandResult::failed("", format!("{err:#}"))
            }
        }
    }

    pub fn command_exists(name: &str) -> bool {
        Self::which(name).is_some()
    }

    /// Resolve `name` with the POSIX `command -v` probe.
    pub fn which(name: &str) -> Option<String> {
        // The name is passed as `$1` so it is never parsed as shell syntax.
        let probe = Self::capture(["sh", "-c", "command -v \"$1\"", "sh", name], None);
        let path = probe.stdout().trim();
        if probe.success() && !path.is_empty() {
            Some(path.to_string())
        } else {
            None
        }
    }
}

#[instrument(skip_all, fields(command = %command))]
fn capture_command(command: &CommandSpec, workdir: Option<&Path>) -> Result<CommandResult> {
    debug!("spawning child process");
    // `output` collects both pipes concurrently.
    let output = command
        .prepare(workdir)?
        .output()
        .context("spawn command")?;
    let result = CommandResult::from_status(
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
        output.status,
    );
    debug!(exit_status = result.exit_status(), "command finished");
    Ok(result)
}

#[instrument(skip_all, fields(command = %command, streaming = on_line.is_some()))]
fn stream_command(
    command: &CommandSpec,
    workdir: Option<&Path>,
    on_line: Option<&LineCallback<'_>>,
    stdout_buf: &mut String,
    stderr_buf: &mut String,
) -> Result<ExitStatus> {
    debug!("spawning child process");
    let mut child = command.prepare(workdir)?.spawn().context("spawn command")?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (stdout_read, stderr_read) = thread::scope(|scope| {
        let stdout_handle =
            scope.spawn(move || read_lines(stdout, StreamKind::Stdout, on_line, stdout_buf));
        let stderr_handle =
            scope.spawn(move || read_lines(stderr, StreamKind::Stderr, on_line, stderr_buf));
        (join_reader(stdout_handle), join_reader(stderr_handle))
    });

    if stdout_read.is_err() || stderr_read.is_err() {
        // A child blocked on a full pipe would otherwise never exit.
        if let Err(e) = child.kill() {
            warn!(err = %e, "failed to kill child after read error");
        }
    }
    let status = child.wait().context("wait for command")?;
    stdout_read.context("read stdout")?;
    stderr_read.context("read stderr")?;

    debug!(exit_code = ?status.code(), "command finished");
    Ok(status)
}

/// Returns `Ok(None)` when the timeout expired.
///
/// One deadline covers both the child's exit and the draining of its pipes,
/// since a background grandchild can hold them open after the child exits.
#[instrument(skip_all, fields(command = %command, timeout_secs = timeout_secs))]
fn timed_command(
    command: &CommandSpec,
    timeout_secs: f64,
    workdir: Option<&Path>,
) -> Result<Option<CommandResult>> {
    let deadline = Duration::try_from_secs_f64(timeout_secs)
        .ok()
        .and_then(|timeout| Instant::now().checked_add(timeout))
        .ok_or_else(|| anyhow!("invalid timeout {timeout_secs}"))?;

    debug!("spawning child process");
    let mut child = command.prepare(workdir)?.spawn().context("spawn command")?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    // Readers are detached; on timeout they finish once the pipes close.
    let stdout_rx = spawn_reader(stdout);
    let stderr_rx = spawn_reader(stderr);

    let Some(status) = child
        .wait_timeout(remaining(deadline))
        .context("wait for command")?
    else {
        abandon(&mut child, timeout_secs);
        return Ok(None);
    };

    let Some(stdout) = recv_before(&stdout_rx, deadline).context("read stdout")? else {
        abandon(&mut child, timeout_secs);
        return Ok(None);
    };
    let Some(stderr) = recv_before(&stderr_rx, deadline).context("read stderr")? else {
        abandon(&mut child, timeout_secs);
        return Ok(None);
    };

    debug!(exit_code = ?status.code(), "command finished");
    Ok(Some(CommandResult::from_status(stdout, stderr, status)))
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn spawn_reader<R: Read + Send + 'static>(reader: R) -> Receiver<Result<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone once the command has been abandoned.
        let _ = tx.send(read_to_string(reader));
    });
    rx
}

/// `Ok(None)` when the reader has not finished by `deadline`.
fn recv_before(rx: &Receiver<Result<String>>, deadline: Instant) -> Result<Option<String>> {
    match rx.recv_timeout(remaining(deadline)) {
        Ok(output) => output.map(Some),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

fn abandon(child: &mut Child, timeout_secs: f64) {
    warn!(timeout_secs, "command timed out, killing");
    if let Err(e) = child.kill() {
        warn!(err = %e, "failed to kill timed out command");
    }
    if let Err(e) = child.wait() {
        warn!(err = %e, "failed to reap timed out command");
    }
}

fn read_lines<R: Read>(
    reader: R,
    kind: StreamKind,
    on_line: Option<&LineCallback<'_>>,
    buf: &mut String,
) -> Result<()> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("read {kind} line"))?;
        if n == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&line);
        buf.push_str(&text);
        if let Some(callback) = on_line {
            callback(kind, &text);
        }
    }
    Ok(())
}

fn read_to_string<R: Read>(mut reader: R) -> Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn join_reader<T>(handle: thread::ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn capture_collects_stdout_and_status() {
        let result = ProcessExecutor::capture("echo hello", None);
        assert!(result.success());
        assert_eq!(result.exit_status(), 0);
        assert_eq!(result.stdout(), "hello\n");
        assert_eq!(result.stderr(), "");
    }

    #[test]
    fn capture_reports_nonzero_exit() {
        let result = ProcessExecutor::capture("exit 42", None);
        assert!(!result.success());
        assert_eq!(result.exit_status(), 42);
    }

    #[test]
    fn capture_argv_does_not_use_a_shell() {
        let result = ProcessExecutor::capture(["echo", "a | b"], None);
        assert_eq!(result.stdout(), "a | b\n");
    }

    #[test]
    fn capture_runs_in_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "x").expect("write marker");
        let result = ProcessExecutor::capture("ls", Some(temp.path()));
        assert!(result.stdout().contains("marker.txt"));
    }

    #[test]
    fn capture_spawn_failure_becomes_failed_result() {
        let result = ProcessExecutor::capture(["definitely-not-a-real-binary-xyz"], None);
        assert!(!result.success());
        assert_eq!(result.exit_status(), FAILED_EXIT_STATUS);
        assert_eq!(result.stdout(), "");
        assert!(result.stderr().contains("spawn command"));
    }

    #[test]
    fn empty_argv_is_a_failed_result() {
        let result = ProcessExecutor::capture(Vec::<String>::new(), None);
        assert_eq!(result.exit_status(), FAILED_EXIT_STATUS);
        assert!(result.stderr().contains("empty argument list"));
    }

    #[test]
    fn stream_delivers_tagged_lines_in_stream_order() {
        let seen = Mutex::new(Vec::new());
        let on_line: &LineCallback<'_> = &|kind, line| {
            seen.lock().expect("lock").push((kind, line.to_string()));
        };

        let result = ProcessExecutor::stream(
            "printf 'a\\nb\\n'; printf 'e\\n' >&2",
            None,
            Some(on_line),
        );

        assert!(result.success());
        assert_eq!(result.exit_status(), 0);
        assert_eq!(result.stdout(), "a\nb\n");
        assert_eq!(result.stderr(), "e\n");

        let seen = seen.into_inner().expect("lock");
        let stdout: Vec<&str> = seen
            .iter()
            .filter(|(k, _)| *k == StreamKind::Stdout)
            .map(|(_, l)| l.as_str())
            .collect();
        let stderr: Vec<&str> = seen
            .iter()
            .filter(|(k, _)| *k == StreamKind::Stderr)
            .map(|(_, l)| l.as_str())
            .collect();
        assert_eq!(stdout, ["a\n", "b\n"]);
        assert_eq!(stderr, ["e\n"]);
    }

    #[test]
    fn stream_without_callback_still_buffers() {
        let result = ProcessExecutor::stream("echo out; echo err >&2; exit 3", None, None);
        assert_eq!(result.stdout(), "out\n");
        assert_eq!(result.stderr(), "err\n");
        assert_eq!(result.exit_status(), 3);
    }

    #[test]
    fn stream_drains_large_stderr_without_deadlock() {
        // Well past a 64 KiB pipe buffer on stderr before any stdout.
        let script = "i=0; while [ $i -lt 4000 ]; do echo 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx' >&2; i=$((i+1)); done; echo done";
        let result = ProcessExecutor::stream(script, None, None);
        assert!(result.success());
        assert_eq!(result.stdout(), "done\n");
        assert_eq!(result.stderr().lines().count(), 4000);
    }

    #[test]
    fn stream_spawn_failure_becomes_failed_result() {
        let result = ProcessExecutor::stream(["definitely-not-a-real-binary-xyz"], None, None);
        assert!(!result.success());
        assert_eq!(result.exit_status(), FAILED_EXIT_STATUS);
        assert!(result.stderr().contains("spawn command"));
    }

    #[test]
    fn stream_fault_keeps_output_read_so_far() {
        let on_line: &LineCallback<'_> = &|kind, line| {
            if kind == StreamKind::Stdout && line == "boom\n" {
                panic!("line handler failed");
            }
        };

        let result = ProcessExecutor::stream(
            "printf 'e1\\ne2\\n' >&2; echo boom",
            None,
            Some(on_line),
        );

        assert!(!result.success());
        assert_eq!(result.exit_status(), FAILED_EXIT_STATUS);
        assert_eq!(result.stdout(), "boom\n");
        assert_eq!(
            result.stderr(),
            "e1\ne2\nread stdout: output reader thread panicked"
        );
    }

    #[test]
    fn with_timeout_aborts_slow_commands() {
        let started = Instant::now();
        let result = ProcessExecutor::with_timeout("sleep 2", 0.1, None);
        assert!(!result.success());
        assert_eq!(result.exit_status(), FAILED_EXIT_STATUS);
        assert_eq!(result.stdout(), "");
        assert!(result.stderr().contains("timed out"));
        assert_eq!(result.stderr(), "Command timed out after 0.1 seconds");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn with_timeout_does_not_wait_for_background_pipe_holders() {
        let started = Instant::now();
        let result = ProcessExecutor::with_timeout("sleep 3 & echo hi", 0.3, None);
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
        assert_eq!(result.exit_status(), FAILED_EXIT_STATUS);
        assert_eq!(result.stdout(), "");
        assert_eq!(result.stderr(), "Command timed out after 0.3 seconds");
    }

    #[test]
    fn with_timeout_returns_output_of_fast_commands() {
        let result = ProcessExecutor::with_timeout("echo quick; echo slow >&2", 5.0, None);
        assert!(result.success());
        assert_eq!(result.stdout(), "quick\n");
        assert_eq!(result.stderr(), "slow\n");
    }

    #[test]
    fn with_timeout_rejects_invalid_timeout() {
        let result = ProcessExecutor::with_timeout("true", -1.0, None);
        assert_eq!(result.exit_status(), FAILED_EXIT_STATUS);
        assert!(result.stderr().contains("invalid timeout"));
    }

    #[test]
    fn which_finds_sh_and_rejects_unknown_names() {
        assert!(ProcessExecutor::command_exists("sh"));
        assert!(ProcessExecutor::which("sh").is_some());
        assert!(!ProcessExecutor::command_exists("definitely-not-a-real-binary-xyz"));
        assert_eq!(ProcessExecutor::which("definitely-not-a-real-binary-xyz"), None);
    }

    #[test]
    fn which_does_not_interpret_shell_syntax() {
        assert!(!ProcessExecutor::command_exists("sh; echo pwned"));
    }

    #[test]
    fn success_tracks_exit_status() {
        assert!(CommandResult::new("", "", 0).success());
        assert!(!CommandResult::new("", "", 1).success());
        assert!(!CommandResult::failed("", "boom").success());
    }
}
