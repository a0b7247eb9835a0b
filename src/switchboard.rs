//! Process-wide selection between the real executor and a mock
//!
//! An [`ExecutionContext`] holds the active command executor and path
//! resolver. It is guarded by two independent locks:
//!
//! - the *read lock* is held only while the pair is swapped or while a
//!   single command is created / path is resolved, so every invocation sees
//!   either the old pair or the new pair, never a mix;
//! - the *exclusivity token* is taken with a non-blocking try when a mock is
//!   installed and held until that substitution is released, so only one
//!   substitution can be active at a time.

use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

use crate::cmd::Cmd;
use crate::config::ExecConfig;
use crate::error::ProcessError;
use crate::executor::{Executor, PathResolver};
use crate::mock::MockExecutor;
use crate::runner::TokioExecutor;
use crate::testing::TestHandle;

/// Reported through the test handle when a second mock is installed while
/// one is active.
pub const ALREADY_INSTALLED_MESSAGE: &str = "use_mock_executor can only be called once per test";

static GLOBAL: Lazy<ExecutionContext> =
    Lazy::new(|| ExecutionContext::with_executor(TokioExecutor::new(ExecConfig::from_env())));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchboardState {
    /// Commands reach the operating system
    Direct,
    /// Commands are answered by a mock executor
    Substituted,
}

#[derive(Clone)]
struct Active {
    executor: Arc<dyn Executor>,
    resolver: Arc<dyn PathResolver>,
    state: SwitchboardState,
}

struct Inner {
    active: Mutex<Active>,
    exclusive: Arc<tokio::sync::Mutex<()>>,
}

/// Switchboard deciding where command creation and path look-ups go.
///
/// [`ExecutionContext::global`] is the instance used by the crate level
/// functions such as [`command`](crate::command). Independent instances can
/// be created for code that takes a context explicitly.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

impl ExecutionContext {
    /// A context in the direct state using a default [`TokioExecutor`].
    pub fn new() -> Self {
        Self::with_executor(TokioExecutor::default())
    }

    /// A context in the direct state using `executor` for commands and
    /// look-ups.
    pub fn with_executor<E>(executor: E) -> Self
    where
        E: Executor + PathResolver + 'static,
    {
        let executor = Arc::new(executor);
        Self {
            inner: Arc::new(Inner {
                active: Mutex::new(Active {
                    executor: Arc::clone(&executor) as Arc<dyn Executor>,
                    resolver: executor as Arc<dyn PathResolver>,
                    state: SwitchboardState::Direct,
                }),
                exclusive: Arc::new(tokio::sync::Mutex::new(())),
            }),
        }
    }

    /// The process-wide context.
    pub fn global() -> &'static ExecutionContext {
        &GLOBAL
    }

    // A fault raised by a mock while the lock is held poisons it; the pair
    // itself is never left half-written, so the poison is ignored.
    fn active(&self) -> MutexGuard<'_, Active> {
        self.inner.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SwitchboardState {
        self.active().state
    }

    pub fn command<I, S>(&self, name: &str, args: I) -> Box<dyn Cmd>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command_context(CancellationToken::new(), name, args)
    }

    /// Create a command that is killed when `cancel` fires.
    ///
    /// # Panics
    ///
    /// Panics when a mock executor is installed and has no command registered
    /// for `name` and `args`.
    pub fn command_context<I, S>(
        &self,
        cancel: CancellationToken,
        name: &str,
        args: I,
    ) -> Box<dyn Cmd>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        let active = self.active();
        active.executor.command(cancel, name, &args)
    }

    /// Search for an executable the way a `PATH` look-up does.
    ///
    /// # Panics
    ///
    /// Panics when a mock executor is installed and has no look-up registered
    /// for `name`.
    pub fn look_path(&self, name: &str) -> Result<PathBuf, ProcessError> {
        let active = self.active();
        active.resolver.look_path(name)
    }

    /// Substitute `mock` until the returned guard is dropped.
    ///
    /// Fails with [`ProcessError::AlreadySubstituted`] without touching the
    /// active pair when another substitution holds the exclusivity token.
    pub fn install(&self, mock: MockExecutor) -> Result<MockGuard, ProcessError> {
        let token = Arc::clone(&self.inner.exclusive)
            .try_lock_owned()
            .map_err(|_| {
                tracing::warn!("Refusing to install mock executor: one is already installed");
                ProcessError::AlreadySubstituted
            })?;

        let mock = Arc::new(mock);
        let previous = {
            let mut active = self.active();
            std::mem::replace(
                &mut *active,
                Active {
                    executor: Arc::clone(&mock) as Arc<dyn Executor>,
                    resolver: Arc::clone(&mock) as Arc<dyn PathResolver>,
                    state: SwitchboardState::Substituted,
                },
            )
        };
        tracing::debug!("Installed mock executor: {:?}", mock);

        Ok(MockGuard {
            context: self.clone(),
            previous: Some(previous),
            token: Some(token),
            mock,
        })
    }

    /// Substitute `mock` for the lifetime of the test behind `t`.
    ///
    /// Restoration is registered as a cleanup on `t`. When a substitution is
    /// already active the test is marked failed and nothing changes; this
    /// does not panic.
    pub fn use_mock_executor<T>(&self, t: &T, mock: MockExecutor)
    where
        T: TestHandle + ?Sized,
    {
        match self.install(mock) {
            Ok(guard) => t.cleanup(Box::new(move || guard.restore())),
            Err(_) => t.fail(ALREADY_INSTALLED_MESSAGE),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// An active substitution.
///
/// Dropping the guard restores the previous executor and resolver and
/// releases the exclusivity token, exactly once, including while unwinding.
pub struct MockGuard {
    context: ExecutionContext,
    previous: Option<Active>,
    token: Option<OwnedMutexGuard<()>>,
    mock: Arc<MockExecutor>,
}

impl MockGuard {
    /// The installed mock, for inspecting its call history.
    pub fn mock(&self) -> &MockExecutor {
        &self.mock
    }

    pub fn restore(self) {
        drop(self);
    }

    fn release(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        let mut active = self.context.active();
        *active = previous;
        // Released while the read lock is still held
        drop(self.token.take());
        tracing::debug!("Restored executor, state is now {:?}", active.state);
    }
}

impl Drop for MockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
