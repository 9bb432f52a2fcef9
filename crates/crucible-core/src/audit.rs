//! Tool-call audit counters.
//!
//! A role can claim a compile or run outcome in text without the
//! corresponding capability ever executing. These counters advance exactly
//! when the compiler service or execution runner is really invoked; the
//! workflow manager samples them around each turn to catch the mismatch.
//!
//! The counters are explicitly owned and injected (shared via `Arc`), never
//! module-level globals, so concurrent pipeline runs in one process do not
//! cross-contaminate.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-safe invocation counters for the two audited capabilities.
#[derive(Debug, Default)]
pub struct AuditCounters {
    compile: AtomicU64,
    execute: AtomicU64,
}

impl AuditCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one real invocation of the compile capability.
    pub fn record_compile(&self) {
        self.compile.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one real invocation of the run capability.
    pub fn record_execute(&self) {
        self.execute.fetch_add(1, Ordering::Relaxed);
    }

    /// Samples both counters.
    pub fn snapshot(&self) -> AuditSnapshot {
        AuditSnapshot {
            compile: self.compile.load(Ordering::Relaxed),
            execute: self.execute.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time sample of the audit counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuditSnapshot {
    pub compile: u64,
    pub execute: u64,
}

impl AuditSnapshot {
    /// True if the compile counter advanced between `self` and `later`.
    pub fn compile_advanced(&self, later: &AuditSnapshot) -> bool {
        later.compile > self.compile
    }

    /// True if the execute counter advanced between `self` and `later`.
    pub fn execute_advanced(&self, later: &AuditSnapshot) -> bool {
        later.execute > self.execute
    }
}
