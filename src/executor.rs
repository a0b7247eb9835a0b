//! The two swappable capabilities held by the switchboard

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::cmd::Cmd;
use crate::error::ProcessError;

/// Creates commands.
///
/// Creation itself never fails through the `Result` channel. The mock
/// implementation panics when asked for an invocation it has no script for.
pub trait Executor: Send + Sync {
    fn command(&self, cancel: CancellationToken, name: &str, args: &[String]) -> Box<dyn Cmd>;
}

/// Resolves an executable name to a path, like a `PATH` search.
pub trait PathResolver: Send + Sync {
    fn look_path(&self, name: &str) -> Result<PathBuf, ProcessError>;
}
