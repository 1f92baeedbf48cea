//! Failure injection for exercising error paths in tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use shardvault_repository::RepositoryError;

/// When the backend should start failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPlan {
    /// Never fail.
    Never,
    /// Fail exactly the Nth call (1-based), succeed on every other call.
    OnCall(usize),
    /// Fail every call after the first N calls have succeeded.
    After(usize),
}

/// Counts backend calls and decides which ones fail.
#[derive(Debug)]
pub(crate) struct FaultInjector {
    plan: FaultPlan,
    calls: AtomicUsize,
}

impl FaultInjector {
    pub(crate) fn new(plan: FaultPlan) -> Self {
        Self {
            plan,
            calls: AtomicUsize::new(0),
        }
    }

    /// Register one call; returns an error if the plan says it fails.
    pub(crate) fn tick(&self, operation: &str) -> Result<(), RepositoryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fail = match self.plan {
            FaultPlan::Never => false,
            FaultPlan::OnCall(n) => call == n,
            FaultPlan::After(n) => call > n,
        };
        if fail {
            Err(RepositoryError::Backend(format!(
                "injected failure on call {call} ({operation})"
            )))
        } else {
            Ok(())
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}
