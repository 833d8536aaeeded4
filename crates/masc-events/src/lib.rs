//! Masc Events
//!
//! Named, ordered, multi-subscriber event listeners.
//!
//! Two scopes share the same semantics on separate tables:
//! - [`EventBus`]: instance scope. Listeners receive the bus and the
//!   payload; the event name is not passed.
//! - [`GlobalEvents`]: static scope. Listeners receive the event name and
//!   the payload. [`GlobalEvents::shared`] returns the per-thread table for a
//!   payload type.
//!
//! Dispatch is synchronous and re-entrant. The listener list is snapshotted
//! before iteration, so listeners added during dispatch run on the next
//! fire and listeners removed during dispatch still run this time.

mod bus;
mod global;

pub use bus::{EventBus, Listener};
pub use global::{GlobalEvents, GlobalListener};

use std::rc::Rc;

/// A type that owns an [`EventBus`] and exposes it as its own events.
pub trait EventEmitter<A> {
    /// The embedded bus
    fn events(&self) -> &EventBus<A>;

    /// Append a listener for `name`
    fn on(&self, name: &str, listener: Listener<A>) {
        self.events().add_event_listener(name, listener, false);
    }

    /// Remove the first registration of `listener` for `name`
    fn off(&self, name: &str, listener: &Listener<A>) {
        self.events().remove_event_listener(name, listener);
    }

    /// Fire `name` with `args`, returning how many listeners ran
    fn emit(&self, name: &str, args: &A) -> usize {
        self.events().fire_event(name, args)
    }
}

/// Wrap a closure as an instance-scope listener.
pub fn listener<A, F>(f: F) -> Listener<A>
where
    F: Fn(&EventBus<A>, &A) + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as a static-scope listener.
pub fn global_listener<A, F>(f: F) -> GlobalListener<A>
where
    F: Fn(&str, &A) + 'static,
{
    Rc::new(f)
}

/// Identity comparison for listener handles (data pointer only).
pub(crate) fn same_listener<F: ?Sized>(a: &Rc<F>, b: &Rc<F>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
