//! Run a procedure and check the events it emitted.

use crate::error::{HostError, Result};
use crate::event::ExpectedEventSet;
use crate::runner::{ProcedureInvocation, ProcedureResult, RemoteTestRunner};

/// Couples a procedure run with an exact comparison of its events.
pub struct EventAssertion<'a> {
    runner: &'a RemoteTestRunner,
}

impl<'a> EventAssertion<'a> {
    /// Creates an assertion helper over `runner`.
    pub fn new(runner: &'a RemoteTestRunner) -> Self {
        Self { runner }
    }

    /// Runs `invocation` and requires it to pass and to emit exactly
    /// `expected`.
    ///
    /// A failed procedure is reported as [`HostError::ProcedureFailed`]
    /// before any events are looked at, since a procedure that failed part
    /// way may not have emitted everything.
    pub async fn run_and_assert(
        &self,
        invocation: &ProcedureInvocation,
        expected: &ExpectedEventSet,
    ) -> Result<ProcedureResult> {
        let result = self.runner.run(invocation).await?;
        if !result.passed {
            return Err(HostError::ProcedureFailed {
                procedure: invocation.name(),
                user_id: invocation.context().id,
                detail: result.failure.clone().unwrap_or_default(),
            });
        }

        let diff = expected.compare(&result.events);
        if !diff.is_empty() {
            tracing::debug!(
                missing = diff.missing.len(),
                unexpected = diff.unexpected.len(),
                "event mismatch"
            );
            return Err(HostError::EventMismatch {
                missing: diff.missing,
                unexpected: diff.unexpected,
            });
        }
        Ok(result)
    }
}
