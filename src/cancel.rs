//! Composable cancellation tokens.
//!
//! A [`CancellationToken`] holds cleanup actions that run exactly once,
//! on the first call to [`CancellationToken::cancel`]. Tokens attached to
//! another token are cancelled together with it, before its own cleanup.
//!
//! Dropping a token never cancels it. Scope-bound cancellation is opt-in
//! through [`CancellationToken::drop_guard`].
//!
//! # Example
//!
//! ```
//! use gql_transport_ws::CancellationToken;
//!
//! let session = CancellationToken::new(|| println!("session closed"));
//! let feed = CancellationToken::new(|| println!("feed closed"));
//! session.attach(feed.clone());
//!
//! // Prints "feed closed" then "session closed".
//! session.cancel();
//! assert!(feed.is_cancelled());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

// ============================================================================
// Types
// ============================================================================

/// A cleanup action run on cancellation.
type Cleanup = Box<dyn FnOnce() + Send>;

/// Shared token state.
#[derive(Default)]
struct TokenState {
    /// Set once, by the first `cancel`.
    cancelled: bool,
    /// Tokens cancelled before the own cleanup runs, in attach order.
    children: Vec<CancellationToken>,
    /// Own cleanup actions.
    actions: Vec<Cleanup>,
}

// ============================================================================
// CancellationToken
// ============================================================================

/// A cloneable handle that runs its cleanup once when cancelled.
///
/// Clones share state: cancelling any clone cancels all of them.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Mutex<TokenState>>,
}

impl CancellationToken {
    /// Creates a token that runs `cleanup` when cancelled.
    #[must_use]
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = Self::default();
        token.inner.lock().actions.push(Box::new(cleanup));
        token
    }

    /// Creates a token without cleanup.
    #[inline]
    #[must_use]
    pub fn noop() -> Self {
        Self::default()
    }

    /// Chains `other` into this token.
    ///
    /// Cancelling `self` cancels `other` first, then runs `self`'s own
    /// cleanup. If `self` is already cancelled, `other` is cancelled
    /// immediately. Attaching a token to itself is a no-op.
    pub fn attach(&self, other: CancellationToken) {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return;
        }

        {
            let mut state = self.inner.lock();
            if !state.cancelled {
                state.children.push(other);
                return;
            }
        }

        other.cancel();
    }

    /// Cancels the token.
    ///
    /// Idempotent. When this returns, every attached token and cleanup
    /// action has run.
    pub fn cancel(&self) {
        // Take the work out of the lock so cleanups may touch this token.
        let (children, actions) = {
            let mut state = self.inner.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            (
                mem::take(&mut state.children),
                mem::take(&mut state.actions),
            )
        };

        for child in children {
            child.cancel();
        }

        for action in actions {
            action();
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Returns a guard that cancels this token when dropped.
    #[inline]
    #[must_use]
    pub fn drop_guard(self) -> DropGuard {
        DropGuard { token: Some(self) }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DropGuard
// ============================================================================

/// Cancels the wrapped token when it goes out of scope.
#[derive(Debug)]
pub struct DropGuard {
    token: Option<CancellationToken>,
}

impl DropGuard {
    /// Releases the token without cancelling it.
    #[inline]
    #[must_use]
    pub fn disarm(mut self) -> CancellationToken {
        self.token.take().unwrap_or_default()
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_cancel_runs_once() {
        let (count, cleanup) = counter();
        let token = CancellationToken::new(cleanup);

        token.cancel();
        token.clone().cancel();
        token.cancel();

        assert!(token.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attached_runs_before_own_cleanup() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let outer_order = Arc::clone(&order);
        let outer = CancellationToken::new(move || outer_order.lock().push("outer"));

        let inner_order = Arc::clone(&order);
        let inner = CancellationToken::new(move || inner_order.lock().push("inner"));

        outer.attach(inner.clone());
        outer.cancel();

        assert!(inner.is_cancelled());
        assert_eq!(*order.lock(), vec!["inner", "outer"]);
    }

    #[test]
    fn test_cancelling_child_leaves_parent() {
        let parent = CancellationToken::noop();
        let child = CancellationToken::noop();
        parent.attach(child.clone());

        child.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_attach_after_cancel_cancels_immediately() {
        let parent = CancellationToken::noop();
        parent.cancel();

        let (count, cleanup) = counter();
        parent.attach(CancellationToken::new(cleanup));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_self_attach_is_ignored() {
        let (count, cleanup) = counter();
        let token = CancellationToken::new(cleanup);
        token.attach(token.clone());

        assert!(token.inner.lock().children.is_empty());
        assert_eq!(Arc::strong_count(&token.inner), 1);

        token.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_does_not_cancel() {
        let (count, cleanup) = counter();
        drop(CancellationToken::new(cleanup));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_guard() {
        let (count, cleanup) = counter();
        let token = CancellationToken::new(cleanup);
        {
            let _guard = token.clone().drop_guard();
        }
        assert!(token.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disarmed_guard_keeps_token_alive() {
        let (count, cleanup) = counter();
        let token = CancellationToken::new(cleanup).drop_guard().disarm();
        assert!(!token.is_cancelled());
        token.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
