//! Per-request stage pipeline.
//!
//! Stage -> (Compile) -> Execute -> Collect -> Cleanup. Each request gets its
//! own scratch directory, so fixed artifact names such as
//! [`COMPILED_ARTIFACT_NAME`] never collide between concurrent requests.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::execution::ExecutionRequest;
use crate::language::{
    infer_entry_point, project_descriptor, Invocation, COMPILED_ARTIFACT_NAME,
    PROJECT_DESCRIPTOR_NAME, PROJECT_SOURCE_NAME,
};
use crate::runner::subprocess::{run_command, RunError, RunOptions, RunOutput};

/// Default budget for compile stages.
pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 30_000;

const SOURCE_STEM: &str = "main";

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("failed to stage source: {0}")]
    Staging(#[source] std::io::Error),

    #[error("compilation failed: {0}")]
    Compile(#[source] RunError),

    #[error(transparent)]
    Run(RunError),
}

/// What a successful pipeline run hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock time across every stage, staging included.
    pub execution_time_ms: u64,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct StagePipeline {
    compile_timeout: Duration,
    scratch_root: Option<PathBuf>,
}

impl Default for StagePipeline {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_COMPILE_TIMEOUT_MS))
    }
}

impl StagePipeline {
    pub fn new(compile_timeout: Duration) -> Self {
        Self {
            compile_timeout,
            scratch_root: None,
        }
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Run `request` to completion.
    ///
    /// `interpreter` replaces the program of interpreted languages; the
    /// orchestrator uses it to point Python at the system binary or at an
    /// environment's interpreter.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        interpreter: Option<&Path>,
    ) -> Result<ExecutionOutcome, StageError> {
        let start = Instant::now();
        let scratch = self.scratch_dir().map_err(StageError::Staging)?;

        let result = self.run_stages(scratch.path(), request, interpreter).await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            tracing::warn!(
                path = %scratch_path.display(),
                error = %e,
                "Failed to remove scratch directory",
            );
        }

        let output = result?;
        Ok(ExecutionOutcome {
            stdout: output.stdout,
            stderr: output.stderr,
            execution_time_ms: start.elapsed().as_millis() as u64,
            truncated: output.truncated,
        })
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("coderun-");
        match &self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }

    async fn run_stages(
        &self,
        dir: &Path,
        request: &ExecutionRequest,
        interpreter: Option<&Path>,
    ) -> Result<RunOutput, StageError> {
        let profile = request.language.profile();
        let run_timeout = Duration::from_millis(request.effective_timeout_ms());
        let run_options = RunOptions::with_timeout(run_timeout)
            .stdin(request.stdin.clone())
            .current_dir(dir);

        match profile.invocation {
            Invocation::Interpret { program, args } => {
                let source = stage_source(dir, SOURCE_STEM, profile.extension, &request.code).await?;
                let program = interpreter.map(Path::as_os_str).unwrap_or(OsStr::new(program));
                let mut argv: Vec<&OsStr> = args.iter().map(|a| OsStr::new(*a)).collect();
                argv.push(source.as_os_str());
                run_command(program, &argv, run_options)
                    .await
                    .map_err(StageError::Run)
            }
            Invocation::CompileThenRun { compiler } => {
                let source = stage_source(dir, SOURCE_STEM, profile.extension, &request.code).await?;
                let artifact = dir.join(COMPILED_ARTIFACT_NAME);
                run_command(
                    compiler,
                    &[source.as_os_str(), OsStr::new("-o"), artifact.as_os_str()],
                    self.compile_options(dir),
                )
                .await
                .map_err(StageError::Compile)?;
                run_command(&artifact, &[] as &[&str], run_options)
                    .await
                    .map_err(StageError::Run)
            }
            Invocation::InferredEntryPoint { compiler, runtime } => {
                let entry_point = infer_entry_point(&request.code);
                let source = stage_source(dir, &entry_point, profile.extension, &request.code).await?;
                run_command(compiler, &[source.as_os_str()], self.compile_options(dir))
                    .await
                    .map_err(StageError::Compile)?;
                run_command(
                    runtime,
                    &[OsStr::new("-cp"), dir.as_os_str(), OsStr::new(&entry_point)],
                    run_options,
                )
                .await
                .map_err(StageError::Run)
            }
            Invocation::ProjectBuild { program } => {
                stage_source(dir, PROJECT_SOURCE_NAME, profile.extension, &request.code).await?;
                let descriptor = dir.join(PROJECT_DESCRIPTOR_NAME);
                tokio::fs::write(&descriptor, project_descriptor())
                    .await
                    .map_err(StageError::Staging)?;
                // Build and run happen in one invocation, so it gets both budgets.
                let options = RunOptions {
                    timeout: self.compile_timeout + run_timeout,
                    ..run_options
                };
                run_command(
                    program,
                    &[OsStr::new("run"), OsStr::new("--project"), descriptor.as_os_str()],
                    options,
                )
                .await
                .map_err(StageError::Run)
            }
        }
    }

    fn compile_options(&self, dir: &Path) -> RunOptions {
        RunOptions::with_timeout(self.compile_timeout).current_dir(dir)
    }
}

async fn stage_source(
    dir: &Path,
    stem: &str,
    extension: &str,
    code: &str,
) -> Result<PathBuf, StageError> {
    let path = dir.join(format!("{stem}.{extension}"));
    tokio::fs::write(&path, code)
        .await
        .map_err(StageError::Staging)?;
    Ok(path)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::language::Language;
    use which::which;
    use assert_matches::assert_matches;

    fn request(language: Language, code: &str) -> ExecutionRequest {
        ExecutionRequest {
            code: code.to_string(),
            language,
            stdin: None,
            timeout_ms: None,
            environment_ref: None,
        }
    }

    /// `sh -u <file>` runs the staged file as a script, which exercises the
    /// interpret path without any language toolchain.
    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    #[tokio::test]
    async fn interpret_path_runs_staged_source() {
        let pipeline = StagePipeline::default();
        let outcome = pipeline
            .execute(&request(Language::Python, "echo hello"), Some(&sh()))
            .await
            .unwrap();
        assert_eq!(outcome.stdout, "hello\n");
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn stdin_reaches_the_program() {
        let mut req = request(Language::Python, "read line; echo \"got $line\"");
        req.stdin = Some("abc\n".to_string());
        let outcome = StagePipeline::default()
            .execute(&req, Some(&sh()))
            .await
            .unwrap();
        assert_eq!(outcome.stdout, "got abc\n");
    }

    #[tokio::test]
    async fn run_timeout_is_enforced() {
        let mut req = request(Language::Python, "sleep 10");
        req.timeout_ms = Some(1_000);
        let err = StagePipeline::default()
            .execute(&req, Some(&sh()))
            .await
            .unwrap_err();
        assert_matches!(err, StageError::Run(RunError::Timeout { timeout_ms: 1_000, .. }));
    }

    #[tokio::test]
    async fn scratch_directory_is_removed() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = StagePipeline::default().with_scratch_root(root.path());
        let outcome = pipeline
            .execute(&request(Language::Python, "pwd"), Some(&sh()))
            .await
            .unwrap();
        let scratch = PathBuf::from(outcome.stdout.trim());
        assert!(!scratch.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failing_run_keeps_output() {
        let err = StagePipeline::default()
            .execute(&request(Language::Python, "echo before; exit 2"), Some(&sh()))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            StageError::Run(RunError::NonZeroExit { exit_code: 2, ref stdout, .. }) if stdout == "before\n"
        );
    }

    #[tokio::test]
    async fn python_hello_world() {
        let Ok(python) = which("python3") else {
            eprintln!("python3 not on PATH, skipping");
            return;
        };
        let outcome = StagePipeline::default()
            .execute(&request(Language::Python, "print('hello')"), Some(&python))
            .await
            .unwrap();
        assert_eq!(outcome.stdout, "hello\n");
    }

    #[tokio::test]
    async fn javascript_hello_world() {
        if which("node").is_err() {
            eprintln!("node not on PATH, skipping");
            return;
        }
        let outcome = StagePipeline::default()
            .execute(&request(Language::JavaScript, "console.log('hello')"), None)
            .await
            .unwrap();
        assert_eq!(outcome.stdout, "hello\n");
    }

    #[tokio::test]
    async fn ruby_hello_world() {
        if which("ruby").is_err() {
            eprintln!("ruby not on PATH, skipping");
            return;
        }
        let outcome = StagePipeline::default()
            .execute(&request(Language::Ruby, "puts 'hello'"), None)
            .await
            .unwrap();
        assert_eq!(outcome.stdout, "hello\n");
    }

    #[tokio::test]
    async fn cpp_compile_then_run() {
        if which("g++").is_err() {
            eprintln!("g++ not on PATH, skipping");
            return;
        }
        let code = "#include <iostream>\nint main(){std::cout<<\"hello\"<<std::endl;return 0;}\n";
        let outcome = StagePipeline::default()
            .execute(&request(Language::Cpp, code), None)
            .await
            .unwrap();
        assert_eq!(outcome.stdout, "hello\n");
    }

    #[tokio::test]
    async fn rust_compile_then_run() {
        if which("rustc").is_err() {
            eprintln!("rustc not on PATH, skipping");
            return;
        }
        let outcome = StagePipeline::default()
            .execute(&request(Language::Rust, "fn main() { println!(\"hello\"); }"), None)
            .await
            .unwrap();
        assert_eq!(outcome.stdout, "hello\n");
    }

    #[tokio::test]
    async fn rust_compile_error_is_a_compile_failure() {
        if which("rustc").is_err() {
            eprintln!("rustc not on PATH, skipping");
            return;
        }
        let err = StagePipeline::default()
            .execute(&request(Language::Rust, "fn main() { let x: i32 = \"no\"; }"), None)
            .await
            .unwrap_err();
        assert_matches!(err, StageError::Compile(RunError::NonZeroExit { .. }));
    }

    #[tokio::test]
    async fn java_uses_inferred_class_name() {
        if which("javac").is_err() || which("java").is_err() {
            eprintln!("java toolchain not on PATH, skipping");
            return;
        }
        let code = "public class Greeter {\n  public static void main(String[] a) { System.out.println(\"hello\"); }\n}\n";
        let outcome = StagePipeline::default()
            .execute(&request(Language::Java, code), None)
            .await
            .unwrap();
        assert_eq!(outcome.stdout, "hello\n");
    }

    #[tokio::test]
    async fn missing_toolchain_is_a_spawn_failure() {
        let missing = PathBuf::from("/nonexistent/python-xyz");
        let err = StagePipeline::default()
            .execute(&request(Language::Python, "print(1)"), Some(&missing))
            .await
            .unwrap_err();
        assert_matches!(err, StageError::Run(RunError::Spawn { .. }));
    }
}
