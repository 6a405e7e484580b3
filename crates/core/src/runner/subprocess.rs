//! Shared subprocess management.
//!
//! [`run_command`] is the single place where the service spawns a process.
//! Compile stages, program runs, interpreter version checks, and pip invocations all
//! go through it so that the timeout and output-capture rules are uniform.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Maximum stdout or stderr size captured per stream (1 MiB).
///
/// Anything past the cap is still drained from the pipe so the child never
/// blocks on a full buffer, but it is discarded.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Options for one [`run_command`] call.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Wall-clock budget measured from spawn.
    pub timeout: Duration,
    /// Written to the child's stdin, which is then closed. `None` gives the
    /// child an already-closed stdin.
    pub stdin: Option<String>,
    pub working_directory: Option<PathBuf>,
}

impl RunOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            stdin: None,
            working_directory: None,
        }
    }

    pub fn stdin(mut self, stdin: Option<String>) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

/// Captured result of a process that exited with status zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    /// Set when either stream hit [`MAX_OUTPUT_BYTES`].
    pub truncated: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{program} timed out after {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u64 },

    /// The process ran to completion but reported failure. Whatever it wrote
    /// before exiting is kept.
    #[error("{program} exited with code {exit_code}")]
    NonZeroExit {
        program: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// Best available diagnostic text for logs and responses.
    pub fn diagnostic(&self) -> String {
        match self {
            RunError::NonZeroExit {
                exit_code, stderr, ..
            } if !stderr.trim().is_empty() => {
                format!("exit code {exit_code}: {}", stderr.trim())
            }
            other => other.to_string(),
        }
    }
}

/// Spawn `program` directly (no shell), feed stdin, capture stdout/stderr,
/// and enforce the configured timeout.
///
/// The child leads its own process group. The budget covers both the wait
/// and the collection of output, so a background process that keeps the
/// pipes open cannot stretch a run past the deadline. On timeout the whole
/// group is killed and the child reaped before the error is returned.
pub async fn run_command<S: AsRef<OsStr>>(
    program: impl AsRef<OsStr>,
    args: &[S],
    options: RunOptions,
) -> Result<RunOutput, RunError> {
    let program_name = program.as_ref().to_string_lossy().into_owned();

    let mut cmd = Command::new(program.as_ref());
    cmd.args(args)
        .stdin(if options.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    if let Some(dir) = &options.working_directory {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let deadline = tokio::time::Instant::now() + options.timeout;

    let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
        program: program_name.clone(),
        source,
    })?;
    // Taken now: `id()` returns None once the child has been reaped.
    let pgid = child.id();

    // Readers start before stdin is written so a child that prints before
    // reading cannot deadlock against us.
    let mut stdout_task = tokio::spawn(read_capped(child.stdout.take()));
    let mut stderr_task = tokio::spawn(read_capped(child.stderr.take()));

    let stdin_task = match (child.stdin.take(), options.stdin) {
        (Some(mut pipe), Some(input)) => Some(tokio::spawn(async move {
            // The child may exit without reading; a broken pipe is fine.
            let _ = pipe.write_all(input.as_bytes()).await;
            drop(pipe);
        })),
        _ => None,
    };

    let timeout_ms = options.timeout.as_millis() as u64;
    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(source)) => {
            return Err(RunError::Wait {
                program: program_name,
                source,
            });
        }
        Err(_elapsed) => {
            kill_process_group(pgid, &program_name);
            if let Err(e) = child.kill().await {
                tracing::warn!(program = %program_name, error = %e, "Failed to kill timed-out process");
            }
            stdout_task.abort();
            stderr_task.abort();
            if let Some(task) = stdin_task {
                task.abort();
            }
            tracing::debug!(program = %program_name, timeout_ms, "Process timed out");
            return Err(RunError::Timeout {
                program: program_name,
                timeout_ms,
            });
        }
    };

    let collected = tokio::time::timeout_at(deadline, async {
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        (stdout, stderr)
    })
    .await;

    let ((stdout_bytes, stdout_truncated), (stderr_bytes, stderr_truncated)) = match collected {
        Ok(streams) => streams,
        Err(_elapsed) => {
            // The child exited but a descendant still holds its pipes.
            kill_process_group(pgid, &program_name);
            stdout_task.abort();
            stderr_task.abort();
            if let Some(task) = stdin_task {
                task.abort();
            }
            tracing::debug!(
                program = %program_name,
                timeout_ms,
                "Process output still open at deadline",
            );
            return Err(RunError::Timeout {
                program: program_name,
                timeout_ms,
            });
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
    let exit_code = status.code().unwrap_or(-1);

    if !status.success() {
        return Err(RunError::NonZeroExit {
            program: program_name,
            exit_code,
            stdout,
            stderr,
        });
    }

    Ok(RunOutput {
        stdout,
        stderr,
        exit_code,
        duration_ms,
        truncated: stdout_truncated || stderr_truncated,
    })
}

/// SIGKILL every process in the group led by `pgid`.
///
/// A group that has already emptied (`ESRCH`) is not an error.
#[cfg(unix)]
fn kill_process_group(pgid: Option<u32>, program: &str) {
    let Some(pgid) = pgid.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // Safety: kill(2) takes plain integers and touches no memory we own.
    let ret = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(program, error = %err, "Failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: Option<u32>, _program: &str) {}

/// Read a stream to EOF, keeping at most [`MAX_OUTPUT_BYTES`].
async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> (Vec<u8>, bool) {
    let mut buf = Vec::new();
    let mut truncated = false;
    let Some(mut h) = handle else {
        return (buf, truncated);
    };
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match h.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = MAX_OUTPUT_BYTES.saturating_sub(buf.len());
                if n > room {
                    truncated = true;
                }
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    (buf, truncated)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn opts(ms: u64) -> RunOptions {
        RunOptions::with_timeout(Duration::from_millis(ms))
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = run_command("echo", &["hello"], opts(5_000)).await.unwrap();
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.exit_code, 0);
        assert!(!out.truncated);
    }

    #[tokio::test]
    async fn feeds_stdin_and_closes_it() {
        let out = run_command("cat", &[] as &[&str], opts(5_000).stdin(Some("abc\n".into())))
            .await
            .unwrap();
        assert_eq!(out.stdout, "abc\n");
    }

    #[tokio::test]
    async fn missing_stdin_reads_eof() {
        // `cat` would hang forever on an open stdin.
        let out = run_command("cat", &[] as &[&str], opts(2_000)).await.unwrap();
        assert_eq!(out.stdout, "");
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_partial_output() {
        let err = run_command(
            "sh",
            &["-c", "echo partial; echo boom >&2; exit 3"],
            opts(5_000),
        )
        .await
        .unwrap_err();
        assert_matches!(
            err,
            RunError::NonZeroExit { exit_code: 3, ref stdout, ref stderr, .. }
                if stdout == "partial\n" && stderr == "boom\n"
        );
        assert_eq!(err.diagnostic(), "exit code 3: boom");
    }

    #[tokio::test]
    async fn timeout_kills_process_promptly() {
        let start = Instant::now();
        let err = run_command("sleep", &["10"], opts(200)).await.unwrap_err();
        assert_matches!(err, RunError::Timeout { timeout_ms: 200, .. });
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let err = run_command("definitely-not-a-real-binary-xyz", &[] as &[&str], opts(1_000))
            .await
            .unwrap_err();
        assert_matches!(err, RunError::Spawn { ref program, .. } if program == "definitely-not-a-real-binary-xyz");
    }

    #[tokio::test]
    async fn output_is_capped() {
        let script = format!("head -c {} /dev/zero", MAX_OUTPUT_BYTES * 2);
        let out = run_command("sh", &["-c", script.as_str()], opts(10_000))
            .await
            .unwrap();
        assert_eq!(out.stdout.len(), MAX_OUTPUT_BYTES);
        assert!(out.truncated);
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command("pwd", &[] as &[&str], opts(5_000).current_dir(dir.path()))
            .await
            .unwrap();
        let reported = PathBuf::from(out.stdout.trim()).canonicalize().unwrap();
        assert_eq!(reported, dir.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn background_child_holding_pipes_hits_timeout() {
        let start = Instant::now();
        let err = run_command("sh", &["-c", "sleep 8 & echo hi"], opts(1_000))
            .await
            .unwrap_err();
        assert_matches!(err, RunError::Timeout { timeout_ms: 1_000, .. });
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn timeout_kills_the_whole_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("survivor");
        let script = format!("(sleep 2; touch '{}') & wait", marker.display());

        let err = run_command("sh", &["-c", script.as_str()], opts(500))
            .await
            .unwrap_err();
        assert_matches!(err, RunError::Timeout { .. });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists(), "background subshell outlived the timeout");
    }

    #[tokio::test]
    async fn detached_output_does_not_block_a_quick_exit() {
        let out = run_command("sh", &["-c", "sleep 5 >/dev/null 2>&1 & echo done"], opts(3_000))
            .await
            .unwrap();
        assert_eq!(out.stdout, "done\n");
    }
}
