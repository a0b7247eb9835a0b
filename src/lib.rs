//! # cmdexec
//!
//! Run external commands through a seam that tests can swap out.
//!
//! Application code creates commands with [`command`] / [`command_context`]
//! and looks up executables with [`look_path`]. By default these go straight
//! to the operating system. A test can install a [`MockExecutor`] that answers
//! every invocation with scripted output instead:
//!
//! ```
//! use cmdexec::testing::TestScope;
//! use cmdexec::{MockCommand, MockExecutor};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let t = TestScope::new("greets");
//! cmdexec::use_mock_executor(
//!     &t,
//!     MockExecutor::new([MockCommand::new("echo")
//!         .with_args(["hello", "world"])
//!         .returns_stdout("hello world ---")]),
//! );
//!
//! let out = cmdexec::command("echo", ["hello", "world"]).output().await.unwrap();
//! assert_eq!(out, b"hello world ---");
//! # }
//! ```
//!
//! ## Modules
//!
//! - `cmd` - The [`Cmd`] trait implemented by real and scripted commands
//! - `config` - Settings for the real executor
//! - `error` - [`ProcessError`] and error codes
//! - `executor` - The [`Executor`] / [`PathResolver`] seams
//! - `mock` - Scripted commands and the mock registry
//! - `runner` - Real processes via `tokio::process`
//! - `switchboard` - Process-wide selection between real and mock
//! - `testing` - Test handles and helpers
//!
//! ## Unregistered invocations
//!
//! While a mock is installed, creating a command or resolving a path that was
//! not registered panics instead of returning an error. See [`mock`].
pub mod cmd;
pub mod config;
pub mod error;
pub mod executor;
pub mod mock;
pub mod runner;
pub mod switchboard;
pub mod testing;

pub use cmd::Cmd;
pub use config::{ConfigError, ExecConfig};
pub use error::{describe_error_code, ErrorCode, ProcessError, SharedError};
pub use executor::{Executor, PathResolver};
pub use mock::{InvocationKey, MockCommand, MockExecutor};
pub use runner::{TokioCmd, TokioExecutor};
pub use switchboard::{ExecutionContext, MockGuard, SwitchboardState};
pub use tokio_util::sync::CancellationToken;

use std::path::PathBuf;
use testing::TestHandle;

/// Empty argument list for commands invoked without arguments.
pub const NO_ARGS: [&str; 0] = [];

/// Create a command on the global context. See
/// [`ExecutionContext::command`].
pub fn command<I, S>(name: &str, args: I) -> Box<dyn Cmd>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ExecutionContext::global().command(name, args)
}

/// Create a cancellable command on the global context. See
/// [`ExecutionContext::command_context`].
pub fn command_context<I, S>(cancel: CancellationToken, name: &str, args: I) -> Box<dyn Cmd>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ExecutionContext::global().command_context(cancel, name, args)
}

/// Resolve an executable on the global context. See
/// [`ExecutionContext::look_path`].
pub fn look_path(name: &str) -> Result<PathBuf, ProcessError> {
    ExecutionContext::global().look_path(name)
}

/// Install `mock` on the global context for the lifetime of the test behind
/// `t`. Calling it again before `t` is cleaned up fails `t`.
pub fn use_mock_executor<T>(t: &T, mock: MockExecutor)
where
    T: TestHandle + ?Sized,
{
    ExecutionContext::global().use_mock_executor(t, mock)
}

/// Install `mock` on the global context until the returned guard is dropped.
pub fn install_mock_executor(mock: MockExecutor) -> Result<MockGuard, ProcessError> {
    ExecutionContext::global().install(mock)
}
