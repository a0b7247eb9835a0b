//! Common test utilities and helpers

use once_cell::sync::Lazy;
use std::sync::{Mutex, MutexGuard};

/// Tests touching the global switchboard run one at a time
static GLOBAL_SWITCHBOARD: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Hold for the whole test body before installing anything globally.
pub fn serial() -> MutexGuard<'static, ()> {
    GLOBAL_SWITCHBOARD
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
