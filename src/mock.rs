//! Scripted commands and the mock executor that serves them
//!
//! A [`MockExecutor`] is a registry of [`MockCommand`]s keyed by the exact
//! program name and argument list they answer to, plus a registry of
//! executable look-ups. Once installed on the switchboard (see
//! [`use_mock_executor`](crate::use_mock_executor)) every command created
//! through the crate is answered from it.
//!
//! # Unregistered invocations panic
//!
//! Dispatching a command, or resolving a path, that was never registered does
//! not produce a [`ProcessError`]. It panics with a message naming the
//! invocation, because it means the test forgot to script it. Code under
//! test cannot swallow the failure in its own error handling.

use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::cmd::{render_command_line, Cmd};
use crate::error::{ProcessError, SharedError};
use crate::executor::{Executor, PathResolver};

/// Exact program name plus ordered argument list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvocationKey {
    name: String,
    args: Vec<String>,
}

impl InvocationKey {
    pub fn new(name: &str, args: &[String]) -> Self {
        Self {
            name: name.to_string(),
            args: args.to_vec(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for InvocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_command_line(&self.name, &self.args))
    }
}

#[derive(Clone)]
enum LookPathEntry {
    Path(PathBuf),
    Error(SharedError),
}

type LookPathTable = HashMap<String, LookPathEntry>;

/// A command that returns scripted output instead of running a process.
///
/// ```
/// use cmdexec::MockCommand;
///
/// let cmd = MockCommand::new("git")
///     .with_args(["status", "--short"])
///     .returns_stdout(" M src/lib.rs\n");
/// assert_eq!(cmd.to_string(), "git status --short");
/// ```
#[derive(Default)]
pub struct MockCommand {
    /// Name (or path) the command is invoked with
    pub name: String,

    /// Exact arguments the command is invoked with
    pub args: Vec<String>,

    pub stdout: Vec<u8>,

    pub stderr: Vec<u8>,

    /// Expected stdin. When non-empty the caller must provide matching input
    /// through `set_stdin`.
    pub stdin: Vec<u8>,

    /// Error returned once the stdin check passes. The scripted stdout and
    /// stderr travel with it in [`ProcessError::Scripted`].
    pub err: Option<SharedError>,

    actual_stdin: Mutex<Option<Box<dyn Read + Send>>>,
    look_paths: Arc<LookPathTable>,
}

impl MockCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn returns_stdout(mut self, stdout: impl Into<Vec<u8>>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn returns_stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Require the caller to provide exactly `stdin` through `set_stdin`.
    ///
    /// The check reads `stdin.len()` bytes from the provided source. A source
    /// that ends early, including an empty one, is reported as a mismatch
    /// (`... but got ""` for an empty source) rather than a read failure.
    pub fn expects_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = stdin.into();
        self
    }

    pub fn returns_error(mut self, err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.err = Some(Arc::from(err.into()));
        self
    }

    pub fn key(&self) -> InvocationKey {
        InvocationKey::new(&self.name, &self.args)
    }

    /// Copy of the script with no caller state attached.
    fn scripted_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            args: self.args.clone(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            stdin: self.stdin.clone(),
            err: self.err.clone(),
            actual_stdin: Mutex::new(None),
            look_paths: Arc::clone(&self.look_paths),
        }
    }

    /// Validate the stdin provided by the caller against the expected bytes.
    fn check_stdin(&mut self) -> Result<(), ProcessError> {
        if self.stdin.is_empty() {
            return Ok(());
        }

        let reader = self
            .actual_stdin
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
            .ok_or(ProcessError::StdinNotProvided)?;

        let mut got = vec![0u8; self.stdin.len()];
        let read = read_up_to(reader, &mut got).map_err(ProcessError::StdinRead)?;
        got.truncate(read);

        if got != self.stdin {
            // Drain the rest so the error shows everything that was provided
            reader
                .read_to_end(&mut got)
                .map_err(ProcessError::StdinRead)?;
            return Err(ProcessError::StdinMismatch {
                expected: self.stdin.clone(),
                actual: got,
            });
        }

        Ok(())
    }

    fn has_stdin(&self) -> bool {
        self.actual_stdin
            .lock()
            .map(|stdin| stdin.is_some())
            .unwrap_or(false)
    }

    fn resolved_name(&self) -> &str {
        match self.look_paths.get(&self.name) {
            Some(LookPathEntry::Path(path)) => path.to_str().unwrap_or(&self.name),
            _ => &self.name,
        }
    }
}

/// Fill `buf` from `reader`, stopping early only at end of input.
fn read_up_to(reader: &mut (dyn Read + Send), buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl Clone for MockCommand {
    fn clone(&self) -> Self {
        self.scripted_copy()
    }
}

impl fmt::Debug for MockCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockCommand")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("stdout", &String::from_utf8_lossy(&self.stdout))
            .field("stderr", &String::from_utf8_lossy(&self.stderr))
            .field("stdin", &String::from_utf8_lossy(&self.stdin))
            .field("err", &self.err.as_ref().map(|e| e.to_string()))
            .field("stdin_set", &self.has_stdin())
            .finish()
    }
}

/// Renders like the real command: a registered look-up path replaces the
/// name, anything else leaves it as is.
impl fmt::Display for MockCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_command_line(self.resolved_name(), &self.args))
    }
}

#[async_trait]
impl Cmd for MockCommand {
    async fn run(&mut self) -> Result<(), ProcessError> {
        self.check_stdin()?;
        match self.err {
            Some(ref err) => Err(ProcessError::Scripted {
                source: Arc::clone(err),
                stdout: self.stdout.clone(),
                stderr: self.stderr.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn output(&mut self) -> Result<Vec<u8>, ProcessError> {
        self.run().await?;
        Ok(self.stdout.clone())
    }

    async fn combined_output(&mut self) -> Result<Vec<u8>, ProcessError> {
        self.run().await?;
        let mut out = self.stdout.clone();
        out.extend_from_slice(&self.stderr);
        Ok(out)
    }

    // Output is scripted, so the following setters have nothing to affect.

    fn set_environ(&mut self, _env: Vec<String>) {}

    fn set_dir(&mut self, _dir: &Path) {}

    fn set_stdout(&mut self, _sink: Box<dyn Write + Send>) {}

    fn set_stderr(&mut self, _sink: Box<dyn Write + Send>) {}

    /// Recorded for validation against the expected stdin.
    fn set_stdin(&mut self, source: Box<dyn Read + Send>) {
        *self.actual_stdin.get_mut().unwrap_or_else(|e| e.into_inner()) = Some(source);
    }

    fn use_os_streams(&mut self, _stdin: bool) {}
}

/// Registry of scripted commands and executable look-ups.
///
/// Build it up front, then hand it to
/// [`use_mock_executor`](crate::use_mock_executor). Registration is not meant
/// to race with dispatch. Clones share the call history, so keep a clone
/// around to inspect calls after installing.
#[derive(Clone, Default)]
pub struct MockExecutor {
    commands: HashMap<InvocationKey, MockCommand>,
    look_paths: Arc<LookPathTable>,
    calls: Arc<Mutex<Vec<InvocationKey>>>,
}

impl MockExecutor {
    pub fn new<I>(cmds: I) -> Self
    where
        I: IntoIterator<Item = MockCommand>,
    {
        let mut executor = Self::default();
        for cmd in cmds {
            executor.add_command(cmd);
        }
        executor
    }

    /// Register a command, replacing any command with the same name and args.
    pub fn add_command(&mut self, cmd: MockCommand) -> &mut Self {
        let key = cmd.key();
        if self.commands.insert(key.clone(), cmd).is_some() {
            tracing::trace!("Replacing mock command: {}", key);
        }
        self
    }

    pub fn add_look_path(&mut self, name: &str, path: impl Into<PathBuf>) -> &mut Self {
        Arc::make_mut(&mut self.look_paths)
            .insert(name.to_string(), LookPathEntry::Path(path.into()));
        self
    }

    pub fn add_look_path_error(
        &mut self,
        name: &str,
        err: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> &mut Self {
        Arc::make_mut(&mut self.look_paths).insert(
            name.to_string(),
            LookPathEntry::Error(Arc::from(err.into())),
        );
        self
    }

    pub fn get(&self, name: &str, args: &[String]) -> Option<&MockCommand> {
        self.commands.get(&InvocationKey::new(name, args))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Return a fresh copy of the command registered for `name` and `args`.
    ///
    /// # Panics
    ///
    /// Panics when nothing is registered for the invocation.
    pub fn dispatch(&self, name: &str, args: &[String]) -> MockCommand {
        let key = InvocationKey::new(name, args);
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(key.clone());

        match self.commands.get(&key) {
            Some(cmd) => {
                tracing::debug!("Mock dispatch: {}", key);
                let mut cmd = cmd.scripted_copy();
                cmd.look_paths = Arc::clone(&self.look_paths);
                cmd
            }
            None => panic!(
                "cmdexec: no command registered for '{} {}' missing call to MockExecutor.AddCommand?",
                name,
                args.join(" ")
            ),
        }
    }

    /// Resolve a registered look-up.
    ///
    /// # Panics
    ///
    /// Panics when nothing is registered for `name`.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, ProcessError> {
        match self.look_paths.get(name) {
            Some(LookPathEntry::Path(path)) => {
                tracing::debug!("Mock look-up: {} -> {}", name, path.display());
                Ok(path.clone())
            }
            Some(LookPathEntry::Error(err)) => {
                tracing::debug!("Mock look-up: {} -> error: {}", name, err);
                Err(ProcessError::Scripted {
                    source: Arc::clone(err),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                })
            }
            None => panic!(
                "cmdexec: no LookPath registered for \"{}\" missing call to MockExecutor.AddLookPath?",
                name
            ),
        }
    }

    /// Every invocation dispatched so far, registered or not.
    pub fn calls(&self) -> Vec<InvocationKey> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn verify_called(&self, name: &str, times: usize) -> bool {
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.iter().filter(|key| key.name() == name).count() == times
    }
}

impl fmt::Debug for MockExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<String> = self.commands.keys().map(|k| k.to_string()).collect();
        commands.sort();
        let mut look_paths: Vec<&String> = self.look_paths.keys().collect();
        look_paths.sort();
        f.debug_struct("MockExecutor")
            .field("commands", &commands)
            .field("look_paths", &look_paths)
            .finish()
    }
}

impl Executor for MockExecutor {
    fn command(&self, _cancel: CancellationToken, name: &str, args: &[String]) -> Box<dyn Cmd> {
        Box::new(self.dispatch(name, args))
    }
}

impl PathResolver for MockExecutor {
    fn look_path(&self, name: &str) -> Result<PathBuf, ProcessError> {
        self.resolve(name)
    }
}
