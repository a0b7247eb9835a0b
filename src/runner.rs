use async_trait::async_trait;
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::cmd::{parse_env_entry, render_command_line, Cmd, OutputSink, StdinSource};
use crate::config::ExecConfig;
use crate::error::ProcessError;
use crate::executor::{Executor, PathResolver};

/// Executor backed by real OS processes through `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioExecutor {
    config: ExecConfig,
}

impl TokioExecutor {
    pub fn new(config: ExecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Create a command without going through the switchboard.
    pub fn create(&self, cancel: CancellationToken, name: &str, args: &[String]) -> TokioCmd {
        TokioCmd {
            program: name.to_string(),
            args: args.to_vec(),
            env: None,
            working_dir: None,
            stdin: None,
            stdout: None,
            stderr: None,
            timeout: self.config.default_timeout,
            preserve_env: self.config.preserve_env.clone(),
            cancel,
        }
    }
}

impl Executor for TokioExecutor {
    fn command(&self, cancel: CancellationToken, name: &str, args: &[String]) -> Box<dyn Cmd> {
        Box::new(self.create(cancel, name, args))
    }
}

impl PathResolver for TokioExecutor {
    fn look_path(&self, name: &str) -> Result<PathBuf, ProcessError> {
        which::which(name).map_err(|e| {
            tracing::trace!("Failed to resolve '{}' in PATH: {}", name, e);
            ProcessError::ExecutableNotFound(name.to_string())
        })
    }
}

/// Which streams the caller wants handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Nothing,
    Stdout,
    Combined,
}

/// A real process invocation.
///
/// Nothing is spawned until one of [`Cmd::run`], [`Cmd::output`] or
/// [`Cmd::combined_output`] is awaited. The process is killed when the
/// cancellation token fires or the timeout elapses.
pub struct TokioCmd {
    program: String,
    args: Vec<String>,
    env: Option<Vec<(String, String)>>,
    working_dir: Option<PathBuf>,
    stdin: Option<StdinSource>,
    stdout: Option<OutputSink>,
    stderr: Option<OutputSink>,
    timeout: Option<Duration>,
    preserve_env: Vec<String>,
    cancel: CancellationToken,
}

impl TokioCmd {
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    fn command_line(&self) -> String {
        render_command_line(&self.program, &self.args)
    }

    fn log_command_start(&self) {
        tracing::debug!("Executing subprocess: {}", self.command_line());

        if let Some(ref env) = self.env {
            tracing::trace!(
                "Environment replaced with {} variables (preserving {:?})",
                env.len(),
                self.preserve_env
            );
        }

        if let Some(ref dir) = self.working_dir {
            tracing::trace!("Working directory: {:?}", dir);
        }

        if let Some(timeout) = self.timeout {
            tracing::trace!("Timeout: {:?}", timeout);
        }
    }

    /// Build the tokio command for the requested capture mode
    fn configure_command(&self, capture: Capture) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        // Dropping the wait future on cancellation or timeout must kill the child
        cmd.kill_on_drop(true);

        if let Some(ref env) = self.env {
            cmd.env_clear();
            for var in &self.preserve_env {
                if let Ok(value) = std::env::var(var) {
                    cmd.env(var, value);
                }
            }
            for (key, value) in env {
                cmd.env(key, value);
            }
        }

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(match self.stdin {
            Some(StdinSource::Reader(_)) => Stdio::piped(),
            Some(StdinSource::Inherit) => Stdio::inherit(),
            None => Stdio::null(),
        });

        let stdout_captured = capture != Capture::Nothing;
        cmd.stdout(Self::stdio_for(self.stdout.as_ref(), stdout_captured));

        // Uncaptured stderr is still collected so it can be attached to exit errors
        let stderr_captured = capture == Capture::Combined || self.stderr.is_none();
        cmd.stderr(Self::stdio_for(self.stderr.as_ref(), stderr_captured));

        cmd
    }

    fn stdio_for(sink: Option<&OutputSink>, captured: bool) -> Stdio {
        match sink {
            _ if captured => Stdio::piped(),
            Some(OutputSink::Writer(_)) => Stdio::piped(),
            Some(OutputSink::Inherit) => Stdio::inherit(),
            None => Stdio::null(),
        }
    }

    fn check_capture(&self, capture: Capture) -> Result<(), ProcessError> {
        if capture != Capture::Nothing && self.stdout.is_some() {
            return Err(ProcessError::StdoutAlreadySet);
        }
        if capture == Capture::Combined && self.stderr.is_some() {
            return Err(ProcessError::StderrAlreadySet);
        }
        Ok(())
    }

    /// Drain the caller's reader on the blocking pool; it may block on I/O.
    async fn read_stdin(&mut self) -> Result<Option<Vec<u8>>, ProcessError> {
        let mut reader = match self.stdin.take() {
            Some(StdinSource::Reader(reader)) => reader,
            other => {
                self.stdin = other;
                return Ok(None);
            }
        };

        let (reader, result) = tokio::task::spawn_blocking(move || {
            let mut data = Vec::new();
            let result = reader.read_to_end(&mut data).map(|_| data);
            (reader, result)
        })
        .await
        .map_err(|e| ProcessError::Io(std::io::Error::other(e)))?;

        // Keeps stdin piped for the spawn
        self.stdin = Some(StdinSource::Reader(reader));
        let data = result.map_err(ProcessError::StdinRead)?;
        tracing::trace!("Stdin provided: {} bytes", data.len());
        Ok(Some(data))
    }

    fn map_spawn_error(&self, error: std::io::Error) -> ProcessError {
        tracing::error!(
            "Failed to spawn '{}': {:?} (kind: {:?})",
            self.program,
            error,
            error.kind()
        );
        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(self.program.clone())
        } else {
            ProcessError::SpawnFailed {
                command: self.command_line(),
                source: error,
            }
        }
    }

    async fn wait_with_timeout(
        child: tokio::process::Child,
        timeout: Option<Duration>,
    ) -> Result<std::process::Output, ProcessError> {
        match timeout {
            Some(duration) => {
                match tokio::time::timeout(duration, child.wait_with_output()).await {
                    Ok(result) => result.map_err(ProcessError::Io),
                    Err(_) => Err(ProcessError::Timeout(duration)),
                }
            }
            None => child.wait_with_output().await.map_err(ProcessError::Io),
        }
    }

    /// Copy piped output into writer sinks set with `set_stdout`/`set_stderr`
    fn forward_to_sinks(
        &mut self,
        output: &std::process::Output,
        capture: Capture,
    ) -> Result<(), ProcessError> {
        if capture == Capture::Nothing {
            if let Some(OutputSink::Writer(ref mut w)) = self.stdout {
                w.write_all(&output.stdout)?;
                w.flush()?;
            }
        }
        if capture != Capture::Combined {
            if let Some(OutputSink::Writer(ref mut w)) = self.stderr {
                w.write_all(&output.stderr)?;
                w.flush()?;
            }
        }
        Ok(())
    }

    fn check_status(output: std::process::Output) -> Result<std::process::Output, ProcessError> {
        if output.status.success() {
            return Ok(output);
        }
        if let Some(code) = output.status.code() {
            return Err(ProcessError::ExitCode {
                code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Err(Self::signal_error(output.status))
    }

    #[cfg(unix)]
    fn signal_error(status: std::process::ExitStatus) -> ProcessError {
        use std::os::unix::process::ExitStatusExt;
        ProcessError::Signal(status.signal().unwrap_or(-1))
    }

    #[cfg(not(unix))]
    fn signal_error(_status: std::process::ExitStatus) -> ProcessError {
        ProcessError::ExitCode {
            code: 1,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    async fn execute(&mut self, capture: Capture) -> Result<std::process::Output, ProcessError> {
        self.check_capture(capture)?;
        let stdin_data = self.read_stdin().await?;

        let start = Instant::now();
        self.log_command_start();

        let mut child = self
            .configure_command(capture)
            .spawn()
            .map_err(|e| self.map_spawn_error(e))?;

        if let (Some(data), Some(mut pipe)) = (stdin_data, child.stdin.take()) {
            // Written concurrently so a child filling its stdout pipe cannot deadlock us
            tokio::spawn(async move {
                use tokio::io::AsyncWriteExt;
                if let Err(e) = pipe.write_all(&data).await {
                    tracing::debug!("Failed to write stdin: {}", e);
                }
                let _ = pipe.shutdown().await;
            });
        }

        let timeout = self.timeout;
        let output = tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::warn!("Subprocess cancelled after {:?}: {}", start.elapsed(), self.command_line());
                return Err(ProcessError::Cancelled { command: self.command_line() });
            }
            result = Self::wait_with_timeout(child, timeout) => {
                if let Err(ProcessError::Timeout(d)) = result {
                    tracing::warn!("Subprocess timed out after {:?}: {}", d, self.command_line());
                }
                result?
            }
        };

        tracing::debug!(
            "Subprocess finished in {:?} with {}: {}",
            start.elapsed(),
            output.status,
            self.command_line()
        );
        tracing::trace!("Stdout length: {} bytes", output.stdout.len());
        tracing::trace!("Stderr length: {} bytes", output.stderr.len());

        self.forward_to_sinks(&output, capture)?;
        Self::check_status(output)
    }
}

impl fmt::Display for TokioCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let program = match which::which(&self.program) {
            Ok(path) => path.display().to_string(),
            Err(_) => self.program.clone(),
        };
        f.write_str(&render_command_line(&program, &self.args))
    }
}

#[async_trait]
impl Cmd for TokioCmd {
    async fn run(&mut self) -> Result<(), ProcessError> {
        self.execute(Capture::Nothing).await.map(|_| ())
    }

    async fn output(&mut self) -> Result<Vec<u8>, ProcessError> {
        self.execute(Capture::Stdout).await.map(|o| o.stdout)
    }

    async fn combined_output(&mut self) -> Result<Vec<u8>, ProcessError> {
        let mut output = self.execute(Capture::Combined).await?;
        output.stdout.append(&mut output.stderr);
        Ok(output.stdout)
    }

    fn set_environ(&mut self, env: Vec<String>) {
        let vars = env
            .iter()
            .filter_map(|entry| match parse_env_entry(entry) {
                Some((key, value)) => Some((key.to_string(), value.to_string())),
                None => {
                    tracing::warn!("Ignoring malformed environment entry {:?}", entry);
                    None
                }
            })
            .collect();
        self.env = Some(vars);
    }

    fn set_dir(&mut self, dir: &Path) {
        self.working_dir = Some(dir.to_path_buf());
    }

    fn set_stdout(&mut self, sink: Box<dyn Write + Send>) {
        self.stdout = Some(OutputSink::Writer(sink));
    }

    fn set_stderr(&mut self, sink: Box<dyn Write + Send>) {
        self.stderr = Some(OutputSink::Writer(sink));
    }

    fn set_stdin(&mut self, source: Box<dyn Read + Send>) {
        self.stdin = Some(StdinSource::Reader(source));
    }

    fn use_os_streams(&mut self, stdin: bool) {
        self.stdout = Some(OutputSink::Inherit);
        self.stderr = Some(OutputSink::Inherit);
        if stdin {
            self.stdin = Some(StdinSource::Inherit);
        }
    }
}
