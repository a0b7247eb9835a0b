//! Testing utilities
//!
//! [`TestHandle`] is the small slice of a test framework the switchboard
//! needs: failing a test, asking whether it failed, and registering cleanup.
//! Two implementations are provided:
//!
//! - [`TestScope`] for ordinary `#[test]` functions: cleanups run when the
//!   scope is dropped, on every exit path, and a failed scope fails the test;
//! - [`MockTestHandle`] for exercising the switchboard itself, with cleanups
//!   run explicitly through [`MockTestHandle::run_cleanup`].

mod handle;
mod support;

pub use handle::{MockTestHandle, TestScope};
pub use support::{init_test_tracing, SharedBuffer};

/// Cleanup callback registered with a [`TestHandle`].
pub type Cleanup = Box<dyn FnOnce() + Send>;

pub trait TestHandle {
    /// Mark the test as failed and keep going.
    fn fail(&self, message: &str);

    fn failed(&self) -> bool;

    /// Register `f` to run when the test finishes. Cleanups run in reverse
    /// registration order.
    fn cleanup(&self, f: Cleanup);
}
