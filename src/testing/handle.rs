use std::sync::Mutex;

use super::{Cleanup, TestHandle};

#[derive(Default)]
struct Record {
    failed: bool,
    messages: Vec<String>,
    cleanups: Vec<Cleanup>,
}

/// A test handle that is not attached to a running test.
///
/// ```
/// use cmdexec::testing::{MockTestHandle, TestHandle};
///
/// let t = MockTestHandle::new();
/// t.fail("boom");
/// assert!(t.failed());
/// assert_eq!(t.messages(), vec!["boom".to_string()]);
/// ```
#[derive(Default)]
pub struct MockTestHandle {
    record: Mutex<Record>,
}

impl MockTestHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lock().messages.clone()
    }

    /// Run and clear every registered cleanup, newest first.
    pub fn run_cleanup(&self) {
        let cleanups = std::mem::take(&mut self.lock().cleanups);
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TestHandle for MockTestHandle {
    fn fail(&self, message: &str) {
        tracing::error!("{}", message);
        let mut record = self.lock();
        record.failed = true;
        record.messages.push(message.to_string());
    }

    fn failed(&self) -> bool {
        self.lock().failed
    }

    fn cleanup(&self, f: Cleanup) {
        self.lock().cleanups.push(f);
    }
}

/// Test handle scoped to a block.
///
/// Cleanups run when the scope is dropped, whether the test body returned
/// normally or is unwinding from a panic. A scope that was marked failed
/// panics on drop so the surrounding test fails, unless it is already
/// unwinding.
///
/// ```
/// use cmdexec::testing::TestScope;
/// use cmdexec::{MockCommand, MockExecutor};
///
/// let t = TestScope::new("renders_command");
/// let ctx = cmdexec::ExecutionContext::new();
/// ctx.use_mock_executor(&t, MockExecutor::new([MockCommand::new("echo").with_args(["hi"])]));
/// assert_eq!(ctx.command("echo", ["hi"]).to_string(), "echo hi");
/// ```
pub struct TestScope {
    name: String,
    handle: MockTestHandle,
}

impl TestScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: MockTestHandle::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TestHandle for TestScope {
    fn fail(&self, message: &str) {
        self.handle.fail(message);
    }

    fn failed(&self) -> bool {
        self.handle.failed()
    }

    fn cleanup(&self, f: Cleanup) {
        self.handle.cleanup(f);
    }
}

impl Drop for TestScope {
    fn drop(&mut self) {
        self.handle.run_cleanup();
        if self.handle.failed() && !std::thread::panicking() {
            panic!(
                "test scope '{}' failed: {}",
                self.name,
                self.handle.messages().join("; ")
            );
        }
    }
}
