//! Cooperative cancellation signal.
//!
//! A [`CancelToken`] is fired either explicitly through [`CancelToken::cancel`]
//! or implicitly once its deadline passes. Children are fired together with
//! their parent. The signal can be waited on inside a `crossbeam` `select!`
//! through [`CancelToken::done`] and [`CancelToken::expired`].

use crate::error::ValveError;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    Cancelled,
    DeadlineExceeded,
}

impl From<Reason> for ValveError {
    fn from(reason: Reason) -> Self {
        match reason {
            Reason::Cancelled => ValveError::Cancelled,
            Reason::DeadlineExceeded => ValveError::DeadlineExceeded,
        }
    }
}

#[derive(Debug)]
struct State {
    // Dropping the sender disconnects `done`, waking every waiter at once.
    trigger: Option<Sender<()>>,
    reason: Option<Reason>,
    children: Vec<Weak<Inner>>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    done: Receiver<()>,
    deadline: Option<Instant>,
}

impl Inner {
    fn fire(&self, reason: Reason) {
        let children = {
            let mut state = self.state.lock();
            if state.reason.is_some() {
                return;
            }
            state.reason = Some(reason);
            state.trigger.take();
            std::mem::take(&mut state.children)
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.fire(reason);
        }
    }
}

/// A cloneable cancellation signal with an optional deadline
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Create a token that fires only when cancelled explicitly
    pub fn new() -> Self {
        Self::with_optional_deadline(None)
    }

    /// Create a token that fires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Create a token that fires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::with_optional_deadline(Some(deadline))
    }

    fn with_optional_deadline(deadline: Option<Instant>) -> Self {
        let (trigger, done) = channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    trigger: Some(trigger),
                    reason: None,
                    children: Vec::new(),
                }),
                done,
                deadline,
            }),
        }
    }

    /// Create a token fired together with this one
    pub fn child(&self) -> Self {
        self.child_with_optional_deadline(self.inner.deadline)
    }

    /// Create a child token that additionally fires after `timeout`
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now() + timeout;
        let deadline = match self.inner.deadline {
            Some(parent) => parent.min(own),
            None => own,
        };
        self.child_with_optional_deadline(Some(deadline))
    }

    fn child_with_optional_deadline(&self, deadline: Option<Instant>) -> Self {
        let child = Self::with_optional_deadline(deadline);
        let fired = {
            let mut state = self.inner.state.lock();
            if state.reason.is_none() {
                state.children.retain(|c| c.strong_count() > 0);
                state.children.push(Arc::downgrade(&child.inner));
            }
            state.reason
        };
        if let Some(reason) = fired {
            child.inner.fire(reason);
        }
        child
    }

    /// Fire the signal; later calls have no effect
    pub fn cancel(&self) {
        self.inner.fire(Reason::Cancelled);
    }

    /// Whether the signal has fired, explicitly or by deadline
    pub fn is_cancelled(&self) -> bool {
        self.error().is_some()
    }

    /// The cancellation error, if the signal has fired
    pub fn error(&self) -> Option<ValveError> {
        if let Some(reason) = self.inner.state.lock().reason {
            return Some(reason.into());
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ValveError::DeadlineExceeded),
            _ => None,
        }
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Channel that becomes ready (disconnected) on explicit cancellation
    pub fn done(&self) -> Receiver<()> {
        self.inner.done.clone()
    }

    /// Channel that delivers once the deadline passes; never ready without one
    pub fn expired(&self) -> Receiver<Instant> {
        match self.inner.deadline {
            Some(deadline) => channel::at(deadline),
            None => channel::never(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
