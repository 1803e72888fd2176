//! Minimal observer primitive.
//!
//! A [`Signal`] is a typed event source. [`Signal::connect`] attaches a
//! listener and returns a [`Subscription`]; the listener stays attached exactly
//! as long as that subscription lives.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Listener<T> = Rc<dyn Fn(&T)>;

struct Slots<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
    emitting: bool,
}

/// Typed event source with any number of listeners.
pub struct Signal<T> {
    slots: Rc<RefCell<Slots<T>>>,
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Signal<T> {
    /// Creates a signal with no listeners.
    pub fn new() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Slots {
                next_id: 0,
                listeners: Vec::new(),
                emitting: false,
            })),
        }
    }

    /// Attaches `listener`. Dropping the returned subscription detaches it.
    pub fn connect(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let id = {
            let mut slots = self.slots.borrow_mut();
            let id = slots.next_id;
            slots.next_id += 1;
            slots.listeners.push((id, Rc::new(listener)));
            id
        };
        let slots: Weak<RefCell<Slots<T>>> = Rc::downgrade(&self.slots);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(slots) = slots.upgrade() {
                    slots.borrow_mut().listeners.retain(|(i, _)| *i != id);
                }
            })),
        }
    }

    /// Delivers `value` to every listener attached when the call starts.
    ///
    /// An emit from inside one of this signal's own listeners is skipped and
    /// returns false, which breaks feedback loops between bound values.
    pub fn emit(&self, value: &T) -> bool {
        let listeners: Vec<Listener<T>> = {
            let mut slots = self.slots.borrow_mut();
            if slots.emitting {
                tracing::debug!("signal_emit: re-entrant emit skipped");
                return false;
            }
            slots.emitting = true;
            slots.listeners.iter().map(|(_, l)| Rc::clone(l)).collect()
        };
        for listener in listeners {
            listener(value);
        }
        self.slots.borrow_mut().emitting = false;
        true
    }

    /// Returns true while listeners are being notified.
    pub fn is_emitting(&self) -> bool {
        self.slots.borrow().emitting
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.slots.borrow().listeners.len()
    }
}

/// Keeps one listener attached to a [`Signal`].
#[must_use = "dropping a Subscription detaches its listener"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Detaches the listener now.
    pub fn detach(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}
