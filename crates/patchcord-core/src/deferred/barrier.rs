//! Join barrier: resume once N independent asynchronous steps have finished.

use std::cell::RefCell;
use std::rc::Rc;

use super::completer::{Completer, Deferred};

struct BarrierState {
    remaining: usize,
    on_complete: Option<Box<dyn FnOnce()>>,
}

/// Counter that fires a callback once it has been ticked `n` times.
///
/// Clones share the same counter, so each pending step can hold its own
/// handle and tick it from its continuation, in any order.
#[derive(Clone)]
pub struct JoinBarrier {
    state: Rc<RefCell<BarrierState>>,
}

impl JoinBarrier {
    /// Creates a barrier that completes after `n` ticks.
    pub fn new(n: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(BarrierState {
                remaining: n,
                on_complete: None,
            })),
        }
    }

    /// Number of ticks still outstanding.
    pub fn remaining(&self) -> usize {
        self.state.borrow().remaining
    }

    /// Returns true once every tick has arrived.
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Records one completed step. The last tick runs the completion callback.
    pub fn tick(&self) {
        let mut state = self.state.borrow_mut();
        if state.remaining == 0 {
            drop(state);
            tracing::warn!("barrier_tick: tick after completion ignored");
            return;
        }
        state.remaining -= 1;
        if state.remaining == 0 {
            let callback = state.on_complete.take();
            drop(state);
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    /// Registers `f` to run when the count reaches zero.
    ///
    /// Runs `f` immediately if the count is already zero.
    pub fn on_complete(&self, f: impl FnOnce() + 'static) {
        let mut state = self.state.borrow_mut();
        if state.remaining == 0 {
            drop(state);
            f();
        } else {
            state.on_complete = Some(Box::new(f));
        }
    }
}

/// Waits for every deferred in `deferreds` and resolves with their values in
/// input order.
///
/// The first failure is forwarded to the returned deferred; failures arriving
/// after that are dropped.
pub fn join_all<T: 'static>(deferreds: Vec<Deferred<T>>) -> Deferred<Vec<T>> {
    let completer = Completer::new();
    let joined = completer.deferred();
    let slots: Rc<RefCell<Vec<Option<T>>>> =
        Rc::new(RefCell::new((0..deferreds.len()).map(|_| None).collect()));
    let barrier = JoinBarrier::new(deferreds.len());

    {
        let slots = Rc::clone(&slots);
        let completer = completer.clone();
        barrier.on_complete(move || {
            let values: Vec<T> = slots.borrow_mut().drain(..).flatten().collect();
            let _ = completer.resolve(values);
        });
    }

    for (index, deferred) in deferreds.into_iter().enumerate() {
        let failed = completer.clone();
        let slots = Rc::clone(&slots);
        let barrier = barrier.clone();
        deferred
            .catch_all(move |failure| {
                if !failed.is_settled() {
                    let _ = failed.fail(failure);
                }
            })
            .then(move |value| {
                slots.borrow_mut()[index] = Some(value);
                barrier.tick();
            });
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Failure;
    use std::cell::Cell;

    #[test]
    fn fires_once_after_n_ticks() {
        let barrier = JoinBarrier::new(3);
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        barrier.on_complete(move || f.set(f.get() + 1));
        barrier.tick();
        barrier.tick();
        assert_eq!(fired.get(), 0);
        barrier.tick();
        assert_eq!(fired.get(), 1);
        barrier.tick();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn on_complete_after_ticks_runs_immediately() {
        let barrier = JoinBarrier::new(2);
        barrier.tick();
        barrier.tick();
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        barrier.on_complete(move || f.set(true));
        assert!(fired.get());
    }

    #[test]
    fn zero_barrier_is_complete() {
        let barrier = JoinBarrier::new(0);
        assert!(barrier.is_complete());
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        barrier.on_complete(move || f.set(true));
        assert!(fired.get());
    }

    #[test]
    fn join_all_keeps_input_order() {
        let completers: Vec<Completer<u32>> = (0..3).map(|_| Completer::new()).collect();
        let slot = join_all(completers.iter().map(|c| c.deferred()).collect()).into_slot();
        completers[2].resolve(30).unwrap();
        completers[0].resolve(10).unwrap();
        assert!(!slot.is_ready());
        completers[1].resolve(20).unwrap();
        assert_eq!(slot.take(), Some(Ok(vec![10, 20, 30])));
    }

    #[test]
    fn join_all_empty_resolves_immediately() {
        let slot = join_all(Vec::<Deferred<u8>>::new()).into_slot();
        assert_eq!(slot.take(), Some(Ok(vec![])));
    }

    #[test]
    fn join_all_forwards_first_failure() {
        let completers: Vec<Completer<u32>> = (0..3).map(|_| Completer::new()).collect();
        let slot = join_all(completers.iter().map(|c| c.deferred()).collect()).into_slot();
        completers[0].resolve(1).unwrap();
        completers[1]
            .fail(Failure::BusAllocationFailed("none left".into()))
            .unwrap();
        completers[2].fail(Failure::Aborted).unwrap();
        assert_eq!(
            slot.take(),
            Some(Err(Failure::BusAllocationFailed("none left".into())))
        );
    }
}
