//! Single-shot asynchronous values: [`Completer`] (producer half) and
//! [`Deferred`] (consumer half).
//!
//! Both halves share one cell. The completer settles it exactly once, either
//! with a value or with a [`Failure`]. The deferred registers at most one
//! continuation and any number of failure handlers. Whichever side arrives
//! second runs the callback, synchronously, inside its own call.
//!
//! Callbacks never run while the shared cell is borrowed, so a continuation is
//! free to register further work on the same or on other deferreds.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use super::failure::{DeferredError, Failure, FailureKind};

type Continuation<T> = Box<dyn FnOnce(T)>;
type Handler = Box<dyn FnOnce(Failure)>;

enum State<T> {
    Pending,
    /// Resolved before a continuation was attached.
    Resolved(T),
    /// Value handed to a continuation.
    Delivered,
    /// Failed before a matching handler was attached.
    Failed(Failure),
    /// Failure handed to a handler.
    Handled,
}

struct Shared<T> {
    state: State<T>,
    continuation: Option<Continuation<T>>,
    handlers: Vec<(FailureKind, Handler)>,
    catch_all: Option<Handler>,
    forward: Option<Handler>,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            state: State::Pending,
            continuation: None,
            handlers: Vec::new(),
            catch_all: None,
            forward: None,
        }
    }

    /// Picks the handler for `kind`: specific first, then default, then forwarding.
    fn take_handler(&mut self, kind: FailureKind) -> Option<Handler> {
        if let Some(pos) = self.handlers.iter().position(|(k, _)| *k == kind) {
            return Some(self.handlers.remove(pos).1);
        }
        self.catch_all.take().or_else(|| self.forward.take())
    }

    /// Detaches every registered callback so they can be dropped outside the borrow.
    fn take_callbacks(&mut self) -> (Option<Continuation<T>>, Vec<(FailureKind, Handler)>, Option<Handler>, Option<Handler>) {
        (
            self.continuation.take(),
            mem::take(&mut self.handlers),
            self.catch_all.take(),
            self.forward.take(),
        )
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if let State::Failed(failure) = &self.state {
            tracing::warn!(%failure, "deferred_drop: failure was never handled");
        }
    }
}

/// Producer half of a single-shot asynchronous value.
///
/// Only a completer can settle the value. Cloning a completer yields another
/// handle to the same cell; settling through either handle counts.
pub struct Completer<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: 'static> Default for Completer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Completer<T> {
    /// Creates a pending completer.
    pub fn new() -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared::new())),
        }
    }

    /// Returns the consumer half to hand back to the caller.
    pub fn deferred(&self) -> Deferred<T> {
        Deferred {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Returns true once the value has been resolved or failed.
    pub fn is_settled(&self) -> bool {
        !matches!(self.shared.borrow().state, State::Pending)
    }

    /// Settles the cell with `value`.
    ///
    /// Runs the registered continuation immediately, or stores the value until
    /// one is registered. A second settle is a programming error: it is
    /// logged, leaves the cell untouched and returns
    /// [`DeferredError::AlreadySettled`].
    pub fn resolve(&self, value: T) -> Result<(), DeferredError> {
        let mut shared = self.shared.borrow_mut();
        if !matches!(shared.state, State::Pending) {
            drop(shared);
            tracing::error!("deferred_resolve: completer settled twice");
            return Err(DeferredError::AlreadySettled);
        }
        let (continuation, handlers, catch_all, forward) = shared.take_callbacks();
        match continuation {
            Some(continuation) => {
                shared.state = State::Delivered;
                drop(shared);
                drop((handlers, catch_all, forward));
                continuation(value);
            }
            None => {
                shared.state = State::Resolved(value);
                drop(shared);
                drop((handlers, catch_all, forward));
            }
        }
        Ok(())
    }

    /// Settles the cell with `failure`.
    ///
    /// The failure goes to a handler registered for its kind, else to the
    /// default handler, else to the forwarding target. With none attached it
    /// is buffered for the first applicable handler registered later.
    pub fn fail(&self, failure: Failure) -> Result<(), DeferredError> {
        let mut shared = self.shared.borrow_mut();
        if !matches!(shared.state, State::Pending) {
            drop(shared);
            tracing::error!(%failure, "deferred_fail: completer settled twice");
            return Err(DeferredError::AlreadySettled);
        }
        match shared.take_handler(failure.kind()) {
            Some(handler) => {
                shared.state = State::Handled;
                let rest = shared.take_callbacks();
                drop(shared);
                drop(rest);
                handler(failure);
            }
            None => {
                tracing::debug!(%failure, "deferred_fail: buffered until a handler attaches");
                shared.state = State::Failed(failure);
            }
        }
        Ok(())
    }
}

/// Consumer half of a single-shot asynchronous value.
///
/// Registration methods consume and return the handle so calls chain:
///
/// ```rust,ignore
/// canvas
///     .create_module("osc.sine")
///     .catch(FailureKind::InstanceCreationFailed, |f| tracing::warn!(%f, "refused"))
///     .then(|id| tracing::info!(?id, "module ready"));
/// ```
pub struct Deferred<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: 'static> Deferred<T> {
    /// Returns a deferred that already holds `value`.
    pub fn resolved(value: T) -> Self {
        let completer = Completer::new();
        let deferred = completer.deferred();
        let _ = completer.resolve(value);
        deferred
    }

    /// Returns a deferred that already carries `failure`.
    pub fn failed(failure: Failure) -> Self {
        let completer = Completer::new();
        let deferred = completer.deferred();
        let _ = completer.fail(failure);
        deferred
    }

    /// Returns true once the value has been resolved or failed.
    pub fn is_settled(&self) -> bool {
        !matches!(self.shared.borrow().state, State::Pending)
    }

    /// Registers the continuation that receives the value.
    ///
    /// Runs `f` right away if the value is already there. Registering again
    /// before resolution replaces the earlier continuation. A value is
    /// delivered at most once.
    pub fn then(self, f: impl FnOnce(T) + 'static) -> Self {
        let mut shared = self.shared.borrow_mut();
        match mem::replace(&mut shared.state, State::Pending) {
            State::Resolved(value) => {
                shared.state = State::Delivered;
                drop(shared);
                f(value);
            }
            State::Delivered => {
                shared.state = State::Delivered;
                drop(shared);
                tracing::warn!("deferred_then: value already delivered to another continuation");
            }
            state => {
                shared.state = state;
                let previous = shared.continuation.replace(Box::new(f));
                drop(shared);
                if previous.is_some() {
                    tracing::debug!("deferred_then: replaced earlier continuation");
                }
            }
        }
        self
    }

    /// Registers a handler for failures of one `kind`.
    pub fn catch(self, kind: FailureKind, handler: impl FnOnce(Failure) + 'static) -> Self {
        let mut shared = self.shared.borrow_mut();
        match mem::replace(&mut shared.state, State::Pending) {
            State::Failed(failure) if failure.kind() == kind => {
                shared.state = State::Handled;
                drop(shared);
                handler(failure);
            }
            state => {
                let settled = !matches!(state, State::Pending | State::Failed(_));
                shared.state = state;
                if !settled {
                    shared.handlers.retain(|(k, _)| *k != kind);
                    shared.handlers.push((kind, Box::new(handler)));
                }
                drop(shared);
            }
        }
        self
    }

    /// Registers the default handler for failures without a specific handler.
    pub fn catch_all(self, handler: impl FnOnce(Failure) + 'static) -> Self {
        self.attach_fallback(Box::new(handler), false);
        self
    }

    /// Pipes any failure this deferred does not handle itself into `parent`.
    ///
    /// This is how a compound operation surfaces the failure of one of its
    /// steps to its own caller.
    pub fn forward_failures_to<U: 'static>(self, parent: &Completer<U>) -> Self {
        let parent = parent.clone();
        self.attach_fallback(
            Box::new(move |failure| {
                let _ = parent.fail(failure);
            }),
            true,
        );
        self
    }

    /// Runs `f` on the value and resolves a new deferred with its result.
    pub fn map<U: 'static>(self, f: impl FnOnce(T) -> U + 'static) -> Deferred<U> {
        let completer = Completer::new();
        let mapped = completer.deferred();
        self.forward_failures_to(&completer).then(move |value| {
            let _ = completer.resolve(f(value));
        });
        mapped
    }

    /// Chains a dependent asynchronous step.
    ///
    /// The returned deferred resolves with the value of the deferred that `f`
    /// produces. Failures of either step are forwarded to it.
    pub fn and_then<U: 'static>(self, f: impl FnOnce(T) -> Deferred<U> + 'static) -> Deferred<U> {
        let completer = Completer::new();
        let chained = completer.deferred();
        self.forward_failures_to(&completer).then(move |value| {
            let inner = completer.clone();
            f(value).forward_failures_to(&inner).then(move |next| {
                let _ = completer.resolve(next);
            });
        });
        chained
    }

    /// Captures the outcome into a [`Slot`] that can be polled later.
    pub fn into_slot(self) -> Slot<T> {
        let slot = Slot {
            outcome: Rc::new(RefCell::new(None)),
        };
        let on_value = Rc::clone(&slot.outcome);
        let on_failure = Rc::clone(&slot.outcome);
        self.catch_all(move |failure| {
            *on_failure.borrow_mut() = Some(Err(failure));
        })
        .then(move |value| {
            *on_value.borrow_mut() = Some(Ok(value));
        });
        slot
    }

    fn attach_fallback(&self, handler: Handler, forward: bool) {
        let mut shared = self.shared.borrow_mut();
        match mem::replace(&mut shared.state, State::Pending) {
            State::Failed(failure) => {
                shared.state = State::Handled;
                drop(shared);
                handler(failure);
            }
            State::Pending => {
                if forward {
                    shared.forward = Some(handler);
                } else {
                    shared.catch_all = Some(handler);
                }
            }
            state => shared.state = state,
        }
    }
}

/// Polled view of a deferred outcome, produced by [`Deferred::into_slot`].
pub struct Slot<T> {
    outcome: Rc<RefCell<Option<Result<T, Failure>>>>,
}

impl<T> Slot<T> {
    /// Returns true once the outcome has arrived and has not been taken.
    pub fn is_ready(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Takes the outcome, leaving the slot empty.
    pub fn take(&self) -> Option<Result<T, Failure>> {
        self.outcome.borrow_mut().take()
    }
}
