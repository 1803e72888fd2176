//! Live, bindable control values.

use std::cell::Cell;

use crate::signal::{Signal, Subscription};

/// How a parameter binding pushes values to its destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamMode {
    /// Push the literal value.
    Absolute,
    /// Push the value's fractional position within the source range, mapped
    /// onto the destination range.
    Relative,
}

/// A named float control with a fixed range and a "value changed" signal.
///
/// Modules share their controllers as `Rc<ParamController>` so bindings can
/// reach a destination without going through the canvas.
pub struct ParamController {
    name: String,
    min: f32,
    max: f32,
    value: Cell<f32>,
    changed: Signal<f32>,
}

impl ParamController {
    /// Creates a controller. The bounds are swapped if given in reverse and
    /// `default` is clamped into them.
    pub fn new(name: impl Into<String>, min: f32, max: f32, default: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            name: name.into(),
            min,
            max,
            value: Cell::new(default.clamp(min, max)),
            changed: Signal::new(),
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn value(&self) -> f32 {
        self.value.get()
    }

    /// Inclusive `(min, max)` range.
    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// Sets the value, clamped to the range. Listeners are notified only when
    /// the stored value actually changes.
    ///
    /// A write arriving while this controller is still notifying its
    /// listeners (a binding loop back onto itself) is dropped, so every
    /// listener has seen the value that stays stored.
    pub fn set_value(&self, value: f32) {
        if value.is_nan() {
            tracing::warn!(param = %self.name, "param_set: NaN ignored");
            return;
        }
        if self.changed.is_emitting() {
            tracing::debug!(param = %self.name, value, "param_set: write during notify dropped");
            return;
        }
        let clamped = value.clamp(self.min, self.max);
        if clamped == self.value.get() {
            return;
        }
        self.value.set(clamped);
        self.changed.emit(&clamped);
    }

    /// Current value as a fraction of the range, in `[0, 1]`.
    pub fn normalized(&self) -> f32 {
        normalize(self.value.get(), self.min, self.max)
    }

    /// Sets the value from a fraction of the range.
    pub fn set_normalized(&self, fraction: f32) {
        let fraction = fraction.clamp(0.0, 1.0);
        self.set_value(self.min + fraction * (self.max - self.min));
    }

    /// Subscribes to value changes.
    pub fn on_change(&self, listener: impl Fn(&f32) + 'static) -> Subscription {
        self.changed.connect(listener)
    }
}

impl std::fmt::Debug for ParamController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamController")
            .field("name", &self.name)
            .field("value", &self.value.get())
            .field("min", &self.min)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

/// Position of `value` within `[min, max]` as a fraction. A zero-width range maps to 0.
pub(crate) fn normalize(value: f32, min: f32, max: f32) -> f32 {
    let span = max - min;
    if span <= 0.0 {
        return 0.0;
    }
    ((value - min) / span).clamp(0.0, 1.0)
}
