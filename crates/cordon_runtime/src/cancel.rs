//! Cooperative cancellation scopes.
//!
//! A scope is a one-way flag. Cancelling it notifies every [`CancelSignal`]
//! subscribed to it and then cancels its parent scope, if any. Cancellation
//! never flows from a parent down to its children.

use cordon_core::ScopeId;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug)]
struct ScopeState {
    id: ScopeId,
    tx: watch::Sender<bool>,
    parent: Option<CancelScope>,
}

/// Owner side of a cancellation flag
#[derive(Debug, Clone)]
pub struct CancelScope {
    inner: Arc<ScopeState>,
}

impl CancelScope {
    /// Create a root scope
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a scope whose cancellation also cancels `parent`
    #[must_use]
    pub fn child_of(parent: &CancelScope) -> Self {
        Self::build(Some(parent.clone()))
    }

    fn build(parent: Option<CancelScope>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(ScopeState {
                id: ScopeId::new(),
                tx,
                parent,
            }),
        }
    }

    /// Scope identity
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// Parent scope, if wired
    #[must_use]
    pub fn parent(&self) -> Option<&CancelScope> {
        self.inner.parent.as_ref()
    }

    /// Cancel this scope and propagate to the parent
    ///
    /// Returns `true` only for the call that flipped the flag; later calls
    /// are no-ops and do not propagate again.
    pub fn cancel(&self) -> bool {
        let flipped = self.inner.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });

        if flipped {
            debug!(scope = %self.inner.id, "scope cancelled");
            if let Some(parent) = &self.inner.parent {
                parent.cancel();
            }
        }
        flipped
    }

    /// Check whether the scope has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.tx.borrow()
    }

    /// Subscribe to the flag
    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.inner.tx.subscribe(),
        }
    }

    /// Whether both handles own the same scope
    #[must_use]
    pub fn same_scope(&self, other: &CancelScope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation flag
///
/// Interruptible operations take a `&CancelSignal` and poll it or await
/// [`CancelSignal::cancelled`]; nothing is ever interrupted for them.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Check whether the scope has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the scope is cancelled
    ///
    /// Stays pending forever if the scope is dropped without being cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
