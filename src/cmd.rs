use async_trait::async_trait;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::ProcessError;

/// Where a command reads its standard input from.
pub(crate) enum StdinSource {
    /// Caller supplied reader
    Reader(Box<dyn Read + Send>),
    /// The parent process' stdin
    Inherit,
}

impl fmt::Debug for StdinSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StdinSource::Reader(_) => f.write_str("StdinSource::Reader(..)"),
            StdinSource::Inherit => f.write_str("StdinSource::Inherit"),
        }
    }
}

/// Where a command writes stdout or stderr to when it is run with
/// [`Cmd::run`].
pub(crate) enum OutputSink {
    Writer(Box<dyn Write + Send>),
    /// The parent process' stream
    Inherit,
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSink::Writer(_) => f.write_str("OutputSink::Writer(..)"),
            OutputSink::Inherit => f.write_str("OutputSink::Inherit"),
        }
    }
}

/// A single external process invocation.
///
/// Obtained from [`command`](crate::command) or
/// [`command_context`](crate::command_context). Depending on the state of the
/// switchboard this is either a real OS process
/// ([`TokioCmd`](crate::TokioCmd)) or a scripted stand-in
/// ([`MockCommand`](crate::MockCommand)).
///
/// `Display` renders the command line: the resolved executable path when one
/// can be found, otherwise the raw name, followed by the arguments.
#[async_trait]
pub trait Cmd: fmt::Display + Send {
    /// Run the command to completion without capturing output.
    async fn run(&mut self) -> Result<(), ProcessError>;

    /// Run the command and return its standard output.
    async fn output(&mut self) -> Result<Vec<u8>, ProcessError>;

    /// Run the command and return stdout followed by stderr.
    async fn combined_output(&mut self) -> Result<Vec<u8>, ProcessError>;

    /// Replace the environment with `KEY=VALUE` entries.
    fn set_environ(&mut self, env: Vec<String>);

    fn set_dir(&mut self, dir: &Path);

    fn set_stdout(&mut self, sink: Box<dyn Write + Send>);

    fn set_stderr(&mut self, sink: Box<dyn Write + Send>);

    fn set_stdin(&mut self, source: Box<dyn Read + Send>);

    /// Connect stdout and stderr (and stdin when `stdin` is true) to the
    /// parent process' streams.
    fn use_os_streams(&mut self, stdin: bool);

    fn display_string(&self) -> String {
        self.to_string()
    }
}

/// Split a `KEY=VALUE` entry. Entries without `=` are rejected.
pub(crate) fn parse_env_entry(entry: &str) -> Option<(&str, &str)> {
    entry.split_once('=').filter(|(key, _)| !key.is_empty())
}

/// Render `<program> <arg1> <arg2> ...`.
pub(crate) fn render_command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
