//! # Compile-and-Run Harness
//!
//! Turns a source file into a pass/fail signal with diagnostic text:
//! compile with the toolchain matching the file extension, then execute the
//! binary. Each step runs as a child process under a time budget.
//!
//! Process faults (missing compiler, permission errors, ...) never escape as
//! errors; they come back as a synthetic compile failure. The only error
//! [`Harness::run`] returns is `UnsupportedSourceType`.

use crate::error::{self, Error, Result};
use crate::record::{ExecutionResult, TIMEOUT_EXIT_CODE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Source languages with a known toolchain, keyed by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    C,
    Cpp,
    Fortran,
}

impl SourceLanguage {
    /// Select the language from a file extension (`.c`, `.cpp`, `.f90`)
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("c") => Ok(SourceLanguage::C),
            Some("cpp") => Ok(SourceLanguage::Cpp),
            Some("f90") => Ok(SourceLanguage::Fortran),
            _ => Err(Error::unsupported_source_type(path.display().to_string())),
        }
    }

    /// Name used in prompts
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceLanguage::C => "C",
            SourceLanguage::Cpp => "C++",
            SourceLanguage::Fortran => "Fortran",
        }
    }
}

/// Compilers, flags, and time budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    pub c_compiler: String,
    pub cpp_compiler: String,
    pub fortran_compiler: String,
    /// Flags placed before `-o <build_path> <source_path>`
    pub flags: Vec<String>,
    pub build_dir: PathBuf,
    pub compile_timeout_secs: u64,
    pub run_timeout_secs: u64,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            c_compiler: "nvc".into(),
            cpp_compiler: "nvc++".into(),
            fortran_compiler: "nvfortran".into(),
            flags: vec!["-acc".into(), "-Minfo=all".into()],
            build_dir: PathBuf::from("build"),
            compile_timeout_secs: 300,
            run_timeout_secs: 60,
        }
    }
}

impl ToolchainConfig {
    pub fn compiler_for(&self, language: SourceLanguage) -> &str {
        match language {
            SourceLanguage::C => &self.c_compiler,
            SourceLanguage::Cpp => &self.cpp_compiler,
            SourceLanguage::Fortran => &self.fortran_compiler,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.compile_timeout_secs == 0 || self.run_timeout_secs == 0 {
            return Err(Error::config_invalid("compile and run timeouts must be positive")
                .with_operation("toolchain::validate"));
        }
        Ok(())
    }
}

/// Captured output of one child process
#[derive(Debug)]
struct Invocation {
    /// `None` when the time budget ran out
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl Invocation {
    /// Compilers print informational notes on stderr even on success, so
    /// stderr wins when it has anything to say.
    fn prefer_stderr(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            self.stderr.clone()
        }
    }

    /// Test binaries report through stdout; stderr is the fallback.
    fn prefer_stdout(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            self.stdout.clone()
        }
    }
}

/// Compiles and runs generated tests
#[derive(Debug, Clone, Default)]
pub struct Harness {
    config: ToolchainConfig,
}

impl Harness {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    /// `<build_dir>/<source base name>`
    pub fn build_path(&self, source: &Path) -> Result<PathBuf> {
        let stem = source.file_stem().ok_or_else(|| {
            Error::invalid_argument("source path has no file name")
                .with_operation("harness::build_path")
                .with_context("source", source.display().to_string())
        })?;
        let path = self.config.build_dir.join(stem);
        // a bare relative name would be looked up on PATH
        if path.is_relative() && !path.starts_with(".") {
            return Ok(Path::new(".").join(path));
        }
        Ok(path)
    }

    /// The compiler program and its arguments for `source`
    fn command_for(&self, language: SourceLanguage, source: &Path, build_path: &Path) -> (String, Vec<String>) {
        let mut args = self.config.flags.clone();
        args.push("-o".into());
        args.push(build_path.display().to_string());
        args.push(source.display().to_string());
        (self.config.compiler_for(language).to_string(), args)
    }

    /// Compile `source` and, if that succeeds, run the binary.
    ///
    /// Returns `Err` only for an unsupported extension; every other problem
    /// is reported inside the [`ExecutionResult`].
    pub async fn run(&self, source: &Path) -> Result<ExecutionResult> {
        let language = SourceLanguage::from_path(source).map_err(|e| e.with_operation("harness::run"))?;

        match self.compile_and_run(language, source).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(error = %e, source = %source.display(), "tool invocation fault");
                Ok(ExecutionResult::fault(format!("An error occurred: {}", e.message())))
            }
        }
    }

    async fn compile_and_run(&self, language: SourceLanguage, source: &Path) -> Result<ExecutionResult> {
        let build_path = self.build_path(source)?;
        tokio::fs::create_dir_all(&self.config.build_dir)
            .await
            .map_err(|e| error::io_error(&self.config.build_dir, e).with_operation("harness::prepare"))?;

        let (program, args) = self.command_for(language, source, &build_path);
        let compile_budget = Duration::from_secs(self.config.compile_timeout_secs);
        let compile = invoke(&program, &args, compile_budget).await?;
        let compiler_output = compile.prefer_stderr();

        let compile_code = match compile.exit_code {
            None => {
                let note = timeout_note("compilation", compile_budget);
                return Ok(ExecutionResult::compile_failed(TIMEOUT_EXIT_CODE, join_notes(&compiler_output, &note)));
            }
            Some(code) => code,
        };
        if compile_code != 0 {
            info!(exit_code = compile_code, "compilation failed");
            return Ok(ExecutionResult::compile_failed(compile_code, compiler_output));
        }

        let binary = build_path.display().to_string();
        let run_budget = Duration::from_secs(self.config.run_timeout_secs);
        let run = invoke(&binary, &[], run_budget).await?;
        let runtime_output = run.prefer_stdout();

        match run.exit_code {
            None => {
                let note = timeout_note("execution", run_budget);
                Ok(ExecutionResult::ran(TIMEOUT_EXIT_CODE, compiler_output, join_notes(&runtime_output, &note)))
            }
            Some(code) => {
                info!(exit_code = code, "test binary finished");
                Ok(ExecutionResult::ran(code, compiler_output, runtime_output))
            }
        }
    }
}

/// Spawn `program` with piped output and wait for it within `budget`.
///
/// Output is collected as it arrives, so a timed-out child still reports
/// whatever it printed before the budget ran out.
async fn invoke(program: &str, args: &[String], budget: Duration) -> Result<Invocation> {
    debug!(program, ?args, "spawning");
    let started = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let fault = |e: std::io::Error| {
        Error::tool_invocation_fault(program, e.to_string())
            .with_operation("harness::invoke")
            .set_source(e)
    };

    let mut child = cmd.spawn().map_err(fault)?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();

    let waited = tokio::time::timeout(budget, async {
        let (out, err, status) = tokio::join!(
            drain(stdout, &mut out_buf),
            drain(stderr, &mut err_buf),
            child.wait()
        );
        out.and(err).and(status)
    })
    .await;

    let exit_code = match waited {
        Ok(Ok(status)) => {
            let code = exit_code(status);
            debug!(program, exit_code = code, elapsed_ms = started.elapsed().as_millis() as u64, "process exited");
            Some(code)
        }
        Ok(Err(e)) => return Err(fault(e)),
        Err(_) => {
            warn!(program, budget_secs = budget.as_secs(), "process timed out");
            if let Err(e) = child.kill().await {
                debug!(program, error = %e, "kill after timeout failed");
            }
            None
        }
    };

    Ok(Invocation {
        exit_code,
        stdout: String::from_utf8_lossy(&out_buf).trim().to_string(),
        stderr: String::from_utf8_lossy(&err_buf).trim().to_string(),
    })
}

/// Append everything `pipe` yields to `buf`, chunk by chunk
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };
    let mut chunk = [0u8; 4096];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

fn timeout_note(step: &str, budget: Duration) -> String {
    format!("{} timed out after {}s", step, budget.as_secs())
}

fn join_notes(output: &str, note: &str) -> String {
    if output.is_empty() {
        note.to_string()
    } else {
        format!("{}\n{}", output, note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::{Stage, FAULT_EXIT_CODE};

    #[test]
    fn test_language_selection() {
        assert_eq!(SourceLanguage::from_path(Path::new("parsedTest.c")).unwrap(), SourceLanguage::C);
        assert_eq!(SourceLanguage::from_path(Path::new("t.cpp")).unwrap(), SourceLanguage::Cpp);
        assert_eq!(SourceLanguage::from_path(Path::new("t.f90")).unwrap(), SourceLanguage::Fortran);

        let err = SourceLanguage::from_path(Path::new("t.rs")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedSourceType);
        assert!(SourceLanguage::from_path(Path::new("Makefile")).is_err());
    }

    fn command(harness: &Harness, source: &str) -> (String, Vec<String>) {
        let source = Path::new(source);
        let language = SourceLanguage::from_path(source).unwrap();
        let build_path = harness.build_path(source).unwrap();
        harness.command_for(language, source, &build_path)
    }

    #[test]
    fn test_compile_command_templates() {
        let harness = Harness::default();

        let (program, args) = command(&harness, "parsedTest.c");
        assert_eq!(program, "nvc");
        assert_eq!(args, vec!["-acc", "-Minfo=all", "-o", "./build/parsedTest", "parsedTest.c"]);

        let (program, _) = command(&harness, "x.cpp");
        assert_eq!(program, "nvc++");

        let (program, args) = command(&harness, "dir/x.f90");
        assert_eq!(program, "nvfortran");
        assert_eq!(args[3], "./build/x");
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_exit_code() {
        use std::os::unix::process::ExitStatusExt;
        // raw wait statuses: low bits carry the signal, the next byte the exit code
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(11)), 139);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(ToolchainConfig {
            build_dir: dir.path().join("build"),
            ..Default::default()
        });
        let err = harness.run(&dir.path().join("test.rs")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedSourceType);
        // nothing was prepared or spawned
        assert!(!dir.path().join("build").exists());
    }

    #[tokio::test]
    async fn test_missing_compiler_is_folded_into_result() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("parsedTest.c");
        std::fs::write(&source, "int main() { return 0; }").unwrap();

        let harness = Harness::new(ToolchainConfig {
            c_compiler: dir.path().join("no-such-compiler").display().to_string(),
            build_dir: dir.path().join("build"),
            ..Default::default()
        });
        let result = harness.run(&source).await.unwrap();
        assert_eq!(result.exit_code, FAULT_EXIT_CODE);
        assert!(result.compiler_output.starts_with("An error occurred"));
        assert!(result.runtime_output.is_empty());
        assert_eq!(result.failure_kind(), Some(ErrorKind::CompileFailure));
    }

    #[test]
    fn test_output_preference() {
        let both = Invocation {
            exit_code: Some(0),
            stdout: "out".into(),
            stderr: "err".into(),
        };
        assert_eq!(both.prefer_stderr(), "err");
        assert_eq!(both.prefer_stdout(), "out");

        let only_out = Invocation {
            exit_code: Some(0),
            stdout: "out".into(),
            stderr: String::new(),
        };
        assert_eq!(only_out.prefer_stderr(), "out");
    }

    #[cfg(unix)]
    mod fake_toolchain {
        use super::*;

        /// Mimics `<cc> -o <out> <src>`: hangs on sources containing
        /// COMPILE_HANG, rejects those containing COMPILE_ERROR, otherwise prints offload notes to stderr and
        /// "compiles" by copying the (shell script) source to the output.
        const FAKE_CC: &str = r#"
out=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -*) shift ;;
    *) src="$1"; shift ;;
  esac
done
if grep -q COMPILE_HANG "$src"; then
  echo "parsedTest.c: compiling main" >&2
  exec sleep 30
fi
if grep -q COMPILE_ERROR "$src"; then
  echo "PGC-S-0035-Syntax error: Recovery attempted by deleting identifier" >&2
  exit 2
fi
echo "main:" >&2
echo "     12, Generating NVIDIA GPU code" >&2
cp "$src" "$out"
chmod +x "$out"
"#;

        struct Fixture {
            dir: tempfile::TempDir,
            harness: Harness,
        }

        impl Fixture {
            fn new(run_timeout_secs: u64) -> Self {
                Self::with_timeouts(30, run_timeout_secs)
            }

            fn with_timeouts(compile_timeout_secs: u64, run_timeout_secs: u64) -> Self {
                let dir = tempfile::tempdir().unwrap();
                let script = dir.path().join("fakecc.sh");
                std::fs::write(&script, FAKE_CC).unwrap();

                // run the script through sh so no freshly written file is exec'd
                let harness = Harness::new(ToolchainConfig {
                    c_compiler: "sh".into(),
                    flags: vec![script.display().to_string()],
                    build_dir: dir.path().join("build"),
                    compile_timeout_secs,
                    run_timeout_secs,
                    ..Default::default()
                });
                Self { dir, harness }
            }

            fn source(&self, body: &str) -> PathBuf {
                let path = self.dir.path().join("parsedTest.c");
                std::fs::write(&path, body).unwrap();
                path
            }
        }

        #[tokio::test]
        async fn test_passing_test() {
            let fx = Fixture::new(30);
            let source = fx.source("#!/bin/sh\necho OK\nexit 0\n");

            let result = fx.harness.run(&source).await.unwrap();
            assert_eq!(result.exit_code, 0);
            assert_eq!(result.compiler_output, "main:\n     12, Generating NVIDIA GPU code");
            assert_eq!(result.runtime_output, "OK");
            assert_eq!(result.stage, Stage::Run);
        }

        #[tokio::test]
        async fn test_compile_failure_never_runs() {
            let fx = Fixture::new(30);
            let source = fx.source("COMPILE_ERROR\n");

            let result = fx.harness.run(&source).await.unwrap();
            assert_eq!(result.exit_code, 2);
            assert!(result.compiler_output.starts_with("PGC-S-0035"));
            assert_eq!(result.runtime_output, "");
            assert_eq!(result.stage, Stage::Compile);
            assert!(!fx.dir.path().join("build").join("parsedTest").exists());
        }

        #[tokio::test]
        async fn test_runtime_failure_falls_back_to_stderr() {
            let fx = Fixture::new(30);
            let source = fx.source("#!/bin/sh\necho 'Check failed: x == y' >&2\nexit 1\n");

            let result = fx.harness.run(&source).await.unwrap();
            assert_eq!(result.exit_code, 1);
            assert_eq!(result.runtime_output, "Check failed: x == y");
            assert_eq!(result.failure_kind(), Some(ErrorKind::RuntimeFailure));
        }

        #[tokio::test]
        async fn test_hanging_binary_times_out() {
            let fx = Fixture::new(1);
            let source = fx.source("#!/bin/sh\necho 'copyin done'\nexec sleep 30\n");

            let started = Instant::now();
            let result = fx.harness.run(&source).await.unwrap();
            assert!(started.elapsed() < Duration::from_secs(20));
            assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
            assert_eq!(result.runtime_output, "copyin done\nexecution timed out after 1s");
            assert_eq!(result.compiler_output, "main:\n     12, Generating NVIDIA GPU code");
            assert_eq!(result.stage, Stage::Run);
        }

        #[tokio::test]
        async fn test_hanging_compiler_times_out() {
            let fx = Fixture::with_timeouts(1, 30);
            let source = fx.source("COMPILE_HANG\n");

            let started = Instant::now();
            let result = fx.harness.run(&source).await.unwrap();
            assert!(started.elapsed() < Duration::from_secs(20));
            assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
            assert_eq!(
                result.compiler_output,
                "parsedTest.c: compiling main\ncompilation timed out after 1s"
            );
            assert_eq!(result.runtime_output, "");
            assert_eq!(result.stage, Stage::Compile);
            assert_eq!(result.failure_kind(), Some(ErrorKind::CompileFailure));
        }

        #[tokio::test]
        async fn test_killed_binary_reports_signal() {
            let fx = Fixture::new(30);
            let source = fx.source("#!/bin/sh\nkill -9 $$\n");

            let result = fx.harness.run(&source).await.unwrap();
            assert_eq!(result.exit_code, 128 + 9);
            assert_eq!(result.stage, Stage::Run);
            assert_eq!(result.failure_kind(), Some(ErrorKind::RuntimeFailure));
        }
    }
}
