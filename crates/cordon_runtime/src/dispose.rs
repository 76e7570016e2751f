//! Teardown for stateful services.
//!
//! A [`DisposableGroup`] collects resources acquired for a unit of work and
//! tears all of them down, recording every failure instead of stopping at
//! the first one.

use async_trait::async_trait;
use futures::future::join_all;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, warn};

/// Teardown errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisposeError {
    /// A single member failed to tear down
    #[error("Teardown of {member} failed: {reason}")]
    Teardown {
        /// Member name
        member: String,
        /// Why teardown failed
        reason: String,
    },

    /// Some members of a group failed
    #[error("{failed} of {total} teardowns failed")]
    Partial {
        /// Failed teardowns
        failed: usize,
        /// Attempted teardowns
        total: usize,
    },
}

/// A resource with teardown hooks
#[async_trait]
pub trait Disposable: Send + Sync {
    /// Name used in reports and logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Synchronous teardown
    ///
    /// # Errors
    ///
    /// Returns error if teardown fails
    fn dispose(&self) -> Result<(), DisposeError> {
        Ok(())
    }

    /// Asynchronous teardown
    ///
    /// # Errors
    ///
    /// Returns error if teardown fails
    async fn dispose_async(&self) -> Result<(), DisposeError> {
        Ok(())
    }
}

/// Which hook produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownPhase {
    /// [`Disposable::dispose`]
    Sync,
    /// [`Disposable::dispose_async`]
    Async,
}

/// Result of one teardown hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposalOutcome {
    /// Member name
    pub member: String,
    /// Hook that ran
    pub phase: TeardownPhase,
    /// What it returned
    pub result: Result<(), DisposeError>,
}

/// Every outcome of a group teardown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisposalReport {
    /// Outcomes: sync hooks in insertion order, then async hooks
    pub outcomes: Vec<DisposalOutcome>,
}

impl DisposalReport {
    /// Outcomes that failed
    pub fn failures(&self) -> impl Iterator<Item = &DisposalOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Whether every hook succeeded
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Collapse into a single result
    ///
    /// # Errors
    ///
    /// Returns [`DisposeError::Partial`] if any hook failed
    pub fn into_result(self) -> Result<(), DisposeError> {
        let failed = self.failures().count();
        if failed == 0 {
            Ok(())
        } else {
            Err(DisposeError::Partial {
                failed,
                total: self.outcomes.len(),
            })
        }
    }
}

/// Resources disposed together
#[derive(Default)]
pub struct DisposableGroup {
    members: Vec<Arc<dyn Disposable>>,
}

impl DisposableGroup {
    /// Create an empty group
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member
    #[must_use]
    pub fn add<D: Disposable + 'static>(mut self, member: Arc<D>) -> Self {
        self.members.push(member);
        self
    }

    /// Add a member in place
    pub fn push(&mut self, member: Arc<dyn Disposable>) {
        self.members.push(member);
    }

    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Tear down every member
    ///
    /// Sync hooks run first in insertion order, then all async hooks are
    /// awaited together. No failure stops the remaining hooks.
    pub async fn dispose(self) -> DisposalReport {
        let mut outcomes: Vec<DisposalOutcome> = self
            .members
            .iter()
            .map(|member| DisposalOutcome {
                member: member.name().to_string(),
                phase: TeardownPhase::Sync,
                result: member.dispose(),
            })
            .collect();

        let pending = self.members.iter().map(|member| async move {
            DisposalOutcome {
                member: member.name().to_string(),
                phase: TeardownPhase::Async,
                result: member.dispose_async().await,
            }
        });
        outcomes.extend(join_all(pending).await);

        let report = DisposalReport { outcomes };
        for failure in report.failures() {
            warn!(
                member = %failure.member,
                phase = ?failure.phase,
                error = ?failure.result,
                "teardown failed"
            );
        }
        debug!(
            members = self.members.len(),
            clean = report.is_clean(),
            "group disposed"
        );
        report
    }

    /// Run a body, then dispose the group whatever the body returned
    pub async fn scoped<F, Fut, T>(self, body: F) -> (T, DisposalReport)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let value = body().await;
        let report = self.dispose().await;
        (value, report)
    }
}

impl std::fmt::Debug for DisposableGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposableGroup")
            .field(
                "members",
                &self.members.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Runs a member's synchronous teardown when dropped
#[derive(Debug)]
pub struct Guard<T: Disposable> {
    value: Arc<T>,
    armed: bool,
}

impl<T: Disposable> Guard<T> {
    /// Guard a value
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Guard a shared value
    #[must_use]
    pub fn from_arc(value: Arc<T>) -> Self {
        Self { value, armed: true }
    }

    /// Give up the guard without tearing down
    #[must_use]
    pub fn release(mut self) -> Arc<T> {
        self.armed = false;
        Arc::clone(&self.value)
    }
}

impl<T: Disposable> Deref for Guard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Disposable> Drop for Guard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.value.dispose() {
            warn!(member = %self.value.name(), error = %e, "teardown failed on drop");
        }
    }
}
