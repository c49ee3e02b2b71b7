//! External build process execution.
//!
//! [`BuildRunner`] is the seam between the fallback orchestrator and the
//! operating system; [`ProcessRunner`] is the real implementation.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use coinpress_shared::{CoinpressError, Result};

/// Bytes of combined output kept per attempt.
pub const OUTPUT_TAIL_BYTES: usize = 4096;

/// Grace period for output readers after the child exits or is killed.
const READER_GRACE: Duration = Duration::from_secs(2);

/// One fully resolved build invocation.
#[derive(Debug, Clone)]
pub struct BuildCommand {
    pub program: String,
    pub args: Vec<String>,
    pub dir: PathBuf,
    /// Applied on top of the inherited environment, later entries win.
    pub env: Vec<(String, String)>,
    /// Run through `sh -c` before the main command.
    pub pre_commands: Vec<String>,
    /// Budget shared by the pre-commands and the main command.
    pub timeout: Duration,
}

impl BuildCommand {
    /// Last value set for `key`, if any.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What happened when a command ran.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Set when a pre-command failed; the main command did not run.
    pub failed_pre_command: Option<String>,
    /// Tail of stdout followed by stderr, at most [`OUTPUT_TAIL_BYTES`].
    pub output_tail: String,
    pub duration: Duration,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.failed_pre_command.is_none() && self.exit_code == Some(0)
    }
}

/// Runs build commands.
pub trait BuildRunner: Send + Sync {
    fn run(&self, command: &BuildCommand) -> impl Future<Output = Result<RunOutcome>> + Send;
}

/// Spawns real child processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl BuildRunner for ProcessRunner {
    fn run(&self, command: &BuildCommand) -> impl Future<Output = Result<RunOutcome>> + Send {
        run_process(command)
    }
}

#[instrument(skip_all, fields(cmd = %command.display(), timeout_s = command.timeout.as_secs()))]
async fn run_process(command: &BuildCommand) -> Result<RunOutcome> {
    let start = Instant::now();
    let deadline = tokio::time::Instant::now() + command.timeout;

    for pre in &command.pre_commands {
        debug!(pre = %pre, "running pre-command");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(pre);
        let step = supervise(cmd, command, deadline).await?;

        if step.timed_out || step.exit_code != Some(0) {
            warn!(pre = %pre, exit_code = ?step.exit_code, "pre-command failed");
            return Ok(RunOutcome {
                failed_pre_command: Some(pre.clone()),
                duration: start.elapsed(),
                ..step
            });
        }
    }

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);
    let outcome = supervise(cmd, command, deadline).await?;

    Ok(RunOutcome {
        duration: start.elapsed(),
        ..outcome
    })
}

/// Spawn `cmd`, wait until it exits or `deadline` passes, and capture output.
async fn supervise(
    mut cmd: Command,
    command: &BuildCommand,
    deadline: tokio::time::Instant,
) -> Result<RunOutcome> {
    cmd.current_dir(&command.dir)
        .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a timeout also reaches npm's grandchildren.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| {
        CoinpressError::build(format!(
            "failed to spawn `{}` in {}: {e}",
            command.display(),
            command.dir.display()
        ))
    })?;

    let stdout = child.stdout.take().map(spawn_tail_reader);
    let stderr = child.stderr.take().map(spawn_tail_reader);

    let waited = tokio::time::timeout_at(deadline, child.wait()).await;
    let (exit_code, timed_out) = match waited {
        Ok(status) => {
            let status = status
                .map_err(|e| CoinpressError::build(format!("failed to wait for build: {e}")))?;
            (status.code(), false)
        }
        Err(_) => {
            warn!("build timed out, killing process group");
            kill_tree(&mut child).await;
            (None, true)
        }
    };

    let out = collect_tail(stdout).await;
    let err = collect_tail(stderr).await;

    Ok(RunOutcome {
        exit_code,
        timed_out,
        failed_pre_command: None,
        output_tail: combine_tails(&out, &err),
        duration: Duration::ZERO,
    })
}

/// Kill the child's whole process group, then reap the child itself.
async fn kill_tree(child: &mut Child) {
    signal_group(child);
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill timed-out build");
    }
}

#[cfg(unix)]
fn signal_group(child: &Child) {
    let Some(pid) = child.id().and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers. A negative pid targets the group
    // created by `process_group(0)`, whose id equals the child's pid.
    let rc = unsafe { libc::kill(-pid, libc::SIGKILL) };
    if rc != 0 {
        let e = std::io::Error::last_os_error();
        debug!(error = %e, pid, "failed to signal process group");
    }
}

#[cfg(not(unix))]
fn signal_group(_child: &Child) {}

fn spawn_tail_reader<R>(reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(read_tail(reader, OUTPUT_TAIL_BYTES))
}

/// Read `reader` to the end, keeping only the last `limit` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                kept.extend_from_slice(&buf[..n]);
                if kept.len() > limit * 2 {
                    kept.drain(..kept.len() - limit);
                }
            }
        }
    }
    if kept.len() > limit {
        kept.drain(..kept.len() - limit);
    }
    kept
}

/// Grandchildren may hold the pipe open after the child is gone, so readers
/// get a bounded grace period.
async fn collect_tail(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(handle) = handle else {
        return Vec::new();
    };
    let abort = handle.abort_handle();
    match tokio::time::timeout(READER_GRACE, handle).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            abort.abort();
            Vec::new()
        }
    }
}

fn combine_tails(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&String::from_utf8_lossy(stderr));
    }
    tail_chars(&text, OUTPUT_TAIL_BYTES).to_string()
}

/// The longest suffix of `text` no larger than `max` bytes, on a char boundary.
pub fn tail_chars(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(program: &str, args: &[&str], dir: &std::path::Path) -> BuildCommand {
        BuildCommand {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            dir: dir.to_path_buf(),
            env: Vec::new(),
            pre_commands: Vec::new(),
            timeout: Duration::from_secs(20),
        }
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let text = "ab€cd";
        assert_eq!(tail_chars(text, 3), "cd");
        assert_eq!(tail_chars(text, 5), "€cd");
        assert_eq!(tail_chars("short", 100), "short");
    }

    #[test]
    fn combines_stdout_then_stderr() {
        assert_eq!(combine_tails(b"out", b"err"), "out\nerr");
        assert_eq!(combine_tails(b"", b"err"), "err");
        assert_eq!(combine_tails(b"out\n", b""), "out\n");
    }

    #[test]
    fn env_value_takes_last_entry() {
        let mut cmd = command("true", &[], std::path::Path::new("."));
        cmd.env.push(("SKIP_LINT".into(), "false".into()));
        cmd.env.push(("SKIP_LINT".into(), "true".into()));
        assert_eq!(cmd.env_value("SKIP_LINT"), Some("true"));
        assert_eq!(cmd.env_value("MISSING"), None);
    }

    #[tokio::test]
    async fn captures_exit_code_env_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = command("sh", &["-c", "echo \"mem=$NODE_OPTIONS\"; echo oops >&2; exit 3"], dir.path());
        cmd.env.push(("NODE_OPTIONS".into(), "--max-old-space-size=1536".into()));

        let outcome = ProcessRunner.run(&cmd).await.unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.timed_out);
        assert!(!outcome.succeeded());
        assert!(outcome.output_tail.contains("mem=--max-old-space-size=1536"));
        assert!(outcome.output_tail.ends_with("oops\n"));
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = command("sleep", &["30"], dir.path());
        cmd.timeout = Duration::from_millis(200);

        let outcome = ProcessRunner.run(&cmd).await.unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.duration < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let script = "sh -c 'sleep 2; touch grandchild-wrote' & wait";
        let mut cmd = command("sh", &["-c", script], dir.path());
        cmd.timeout = Duration::from_millis(300);

        let outcome = ProcessRunner.run(&cmd).await.unwrap();
        assert!(outcome.timed_out);
        // The reader grace period is not needed once the group is gone.
        assert!(outcome.duration < Duration::from_millis(1500), "{outcome:?}");

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!dir.path().join("grandchild-wrote").exists());
    }

    #[tokio::test]
    async fn failing_pre_command_skips_main_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = command("sh", &["-c", "touch built"], dir.path());
        cmd.pre_commands = vec!["exit 7".into()];

        let outcome = ProcessRunner.run(&cmd).await.unwrap();
        assert_eq!(outcome.failed_pre_command.as_deref(), Some("exit 7"));
        assert_eq!(outcome.exit_code, Some(7));
        assert!(!dir.path().join("built").exists());
    }

    #[tokio::test]
    async fn pre_commands_run_in_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cache/nested")).unwrap();
        let mut cmd = command("sh", &["-c", "test ! -e cache"], dir.path());
        cmd.pre_commands = vec!["rm -rf 'cache'".into()];

        let outcome = ProcessRunner.run(&cmd).await.unwrap();
        assert!(outcome.succeeded(), "{outcome:?}");
    }

    #[tokio::test]
    async fn missing_program_is_a_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = command("definitely-not-a-real-program-xyz", &[], dir.path());
        let err = ProcessRunner.run(&cmd).await.unwrap_err();
        assert!(matches!(err, CoinpressError::Build(_)));
    }
}
