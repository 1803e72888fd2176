//! Request correlation between the main loop and a transport thread.
//!
//! The [`Scheduler`] owns every pending request: a map from [`RequestId`] to
//! the completer waiting for that reply. The transport thread never touches
//! it. It only pushes raw replies into a channel through a [`ReplySender`].
//! The main loop calls [`drain()`](Scheduler::drain) or
//! [`wait()`](Scheduler::wait), which pop replies in arrival order and settle
//! the matching completers on the main thread.
//!
//! Replies are matched by id, so requests may complete in any order.
//! There is no timeout: a request whose reply never arrives stays pending
//! until [`shutdown()`](Scheduler::shutdown).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use thiserror::Error;

use super::completer::{Completer, Deferred};
use super::failure::Failure;

/// Default number of replies settled per [`Scheduler::drain`] pass.
pub const DEFAULT_DRAIN_BUDGET: usize = 256;

/// Identifier correlating a request with its reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// A raw reply tagged with the request it answers.
#[derive(Debug)]
pub struct Envelope<R> {
    /// Request this reply answers.
    pub request: RequestId,
    /// Reply payload, decoded on the main thread.
    pub reply: R,
}

/// The main loop has gone away; replies can no longer be delivered.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("reply queue closed")]
pub struct QueueClosed;

/// Thread-safe handle the transport thread uses to enqueue replies.
#[derive(Debug)]
pub struct ReplySender<R> {
    tx: Sender<Envelope<R>>,
}

impl<R> Clone for ReplySender<R> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<R> ReplySender<R> {
    /// Enqueues `reply` for `request` and wakes a waiting main loop.
    pub fn send(&self, request: RequestId, reply: R) -> Result<(), QueueClosed> {
        self.tx
            .send(Envelope { request, reply })
            .map_err(|_| QueueClosed)
    }
}

type Resolver<R> = Box<dyn FnOnce(Result<R, Failure>)>;

struct Inner<R> {
    pending: RefCell<HashMap<RequestId, Resolver<R>>>,
    next_id: Cell<u64>,
    open: Cell<bool>,
    drain_budget: usize,
    tx: Sender<Envelope<R>>,
    rx: Receiver<Envelope<R>>,
}

/// Owner of all pending asynchronous requests for one main loop.
///
/// Cloning yields another handle to the same scheduler; pass it to whatever
/// needs to issue requests.
pub struct Scheduler<R> {
    inner: Rc<Inner<R>>,
}

impl<R> Clone for Scheduler<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R: 'static> Scheduler<R> {
    /// Creates a scheduler with the default drain budget.
    pub fn init() -> Self {
        Self::with_drain_budget(DEFAULT_DRAIN_BUDGET)
    }

    /// Creates a scheduler that settles at most `budget` replies per drain pass.
    pub fn with_drain_budget(budget: usize) -> Self {
        let (tx, rx) = unbounded();
        tracing::debug!(budget, "scheduler_init");
        Self {
            inner: Rc::new(Inner {
                pending: RefCell::new(HashMap::new()),
                next_id: Cell::new(1),
                open: Cell::new(true),
                drain_budget: budget.max(1),
                tx,
                rx,
            }),
        }
    }

    /// Returns a `Send` handle for the transport thread.
    pub fn reply_sender(&self) -> ReplySender<R> {
        ReplySender {
            tx: self.inner.tx.clone(),
        }
    }

    /// Registers a new pending request.
    ///
    /// `decode` turns the raw reply into the typed value, or into a failure.
    /// After [`shutdown()`](Self::shutdown) the returned deferred is already
    /// failed with [`Failure::Aborted`].
    pub fn register<T: 'static>(
        &self,
        decode: impl FnOnce(R) -> Result<T, Failure> + 'static,
    ) -> (RequestId, Deferred<T>) {
        let id = RequestId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        if !self.inner.open.get() {
            return (id, Deferred::failed(Failure::Aborted));
        }

        let completer = Completer::new();
        let deferred = completer.deferred();
        let resolver: Resolver<R> = Box::new(move |outcome| {
            let settled = match outcome.and_then(decode) {
                Ok(value) => completer.resolve(value),
                Err(failure) => completer.fail(failure),
            };
            if settled.is_err() {
                tracing::error!("scheduler_dispatch: request settled twice");
            }
        });
        self.inner.pending.borrow_mut().insert(id, resolver);
        (id, deferred)
    }

    /// Fails a pending request without waiting for its reply.
    ///
    /// Used when the request could not be handed to the transport. Returns
    /// false if the id is not pending.
    pub fn reject(&self, request: RequestId, failure: Failure) -> bool {
        let resolver = self.inner.pending.borrow_mut().remove(&request);
        match resolver {
            Some(resolver) => {
                resolver(Err(failure));
                true
            }
            None => false,
        }
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Returns false once [`shutdown()`](Self::shutdown) has run.
    pub fn is_open(&self) -> bool {
        self.inner.open.get()
    }

    /// Settles queued replies without blocking. Returns how many were handled.
    pub fn drain(&self) -> usize {
        let mut handled = 0;
        while handled < self.inner.drain_budget {
            match self.inner.rx.try_recv() {
                Ok(envelope) => {
                    self.dispatch(envelope);
                    handled += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    /// Blocks until a reply arrives or `timeout` passes, then drains.
    ///
    /// Returns the number of replies handled (zero on timeout).
    pub fn wait(&self, timeout: Duration) -> usize {
        match self.inner.rx.recv_timeout(timeout) {
            Ok(envelope) => {
                self.dispatch(envelope);
                1 + self.drain()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Runs the reply loop until `done` returns true or `timeout` passes.
    ///
    /// Returns the final value of `done()`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        self.drain();
        while !done() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.wait(deadline - now);
        }
        true
    }

    /// Stops accepting requests and drops every pending one unresolved.
    ///
    /// Returns the number of requests that never received a reply.
    pub fn shutdown(&self) -> usize {
        self.inner.open.set(false);
        let abandoned: Vec<_> = self.inner.pending.borrow_mut().drain().collect();
        let count = abandoned.len();
        if count > 0 {
            tracing::warn!(count, "scheduler_shutdown: requests never answered");
        } else {
            tracing::debug!("scheduler_shutdown");
        }
        drop(abandoned);
        count
    }

    fn dispatch(&self, envelope: Envelope<R>) {
        let resolver = self.inner.pending.borrow_mut().remove(&envelope.request);
        match resolver {
            Some(resolver) => resolver(Ok(envelope.reply)),
            None => {
                tracing::warn!(request = %envelope.request, "scheduler_dispatch: reply for unknown request");
            }
        }
    }
}
