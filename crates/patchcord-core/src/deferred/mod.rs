//! Continuation framework for operations that wait on the audio server.
//!
//! Anything that cannot finish synchronously returns a [`Deferred`]. The
//! producer keeps the matching [`Completer`] and settles it once, with a value
//! or a [`Failure`]. Consumers chain work with [`then()`](Deferred::then),
//! select failures with [`catch()`](Deferred::catch) /
//! [`catch_all()`](Deferred::catch_all), and hand unhandled failures to an
//! enclosing operation with
//! [`forward_failures_to()`](Deferred::forward_failures_to).
//!
//! # Scheduling model
//!
//! Single-threaded and cooperative. A continuation runs inside whichever call
//! settles its completer. Replies from a background transport thread go
//! through the [`Scheduler`]'s queue and are settled when the main loop
//! drains it, so no completer is ever touched off the main thread.
//!
//! # Fan-out / fan-in
//!
//! [`JoinBarrier`] counts N completions in any order; [`join_all`] builds on it
//! to collect N values.

mod barrier;
mod completer;
mod failure;
mod scheduler;

pub use barrier::{JoinBarrier, join_all};
pub use completer::{Completer, Deferred, Slot};
pub use failure::{DeferredError, Failure, FailureKind};
pub use scheduler::{
    DEFAULT_DRAIN_BUDGET, Envelope, QueueClosed, ReplySender, RequestId, Scheduler,
};
