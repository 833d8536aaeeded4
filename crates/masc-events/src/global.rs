//! Static-scope events
//!
//! Same registry semantics as [`EventBus`](crate::EventBus), but listeners
//! get the event name instead of the bus, and one table per payload type is
//! shared by everything running on the thread.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::bus::ListenerTable;

/// Static-scope listener. Receives the event name and the payload.
pub type GlobalListener<A> = Rc<dyn Fn(&str, &A)>;

thread_local! {
    static SHARED: RefCell<HashMap<TypeId, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Named event registry for the static scope.
pub struct GlobalEvents<A> {
    table: ListenerTable<dyn Fn(&str, &A)>,
}

impl<A: 'static> GlobalEvents<A> {
    /// The table shared by every caller on this thread for payload `A`.
    pub fn shared() -> Rc<Self> {
        SHARED.with(|shared| {
            let mut shared = shared.borrow_mut();
            let entry = shared
                .entry(TypeId::of::<A>())
                .or_insert_with(|| Rc::new(GlobalEvents::<A>::new()) as Rc<dyn Any>);
            match Rc::clone(entry).downcast::<Self>() {
                Ok(events) => events,
                // The map is keyed by the payload type, so this is unreachable;
                // hand back a private table rather than panic.
                Err(_) => Rc::new(Self::new()),
            }
        })
    }
}

impl<A> GlobalEvents<A> {
    /// Create a private table, not reachable through [`GlobalEvents::shared`]
    pub fn new() -> Self {
        Self {
            table: ListenerTable::new(),
        }
    }

    /// Register `listener` for `name`, appending unless `prepend` is set
    pub fn add_event_listener(&self, name: &str, listener: GlobalListener<A>, prepend: bool) {
        self.table.add(name, listener, prepend);
    }

    /// Remove the first registration of `listener` for `name`
    pub fn remove_event_listener(&self, name: &str, listener: &GlobalListener<A>) -> bool {
        self.table.remove(name, listener)
    }

    /// Whether a listener list exists for `name`
    pub fn is_event(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    /// Drop every listener for `name`
    pub fn remove_event(&self, name: &str) {
        self.table.clear(name);
    }

    /// Number of listeners registered for `name`
    pub fn listener_count(&self, name: &str) -> usize {
        self.table.len(name)
    }

    /// Invoke every listener of `name` with the name and `args`
    pub fn fire_event(&self, name: &str, args: &A) -> usize {
        let Some(listeners) = self.table.snapshot(name) else {
            return 0;
        };
        tracing::trace!(event_name = name, listeners = listeners.len(), "dispatching global event");
        for listener in &listeners {
            listener(name, args);
        }
        listeners.len()
    }
}

impl<A> Default for GlobalEvents<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for GlobalEvents<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalEvents")
            .field("events", &self.table.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_listener;

    #[derive(Debug)]
    struct Ping(u8);

    #[test]
    fn test_shared_table_is_shared() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        GlobalEvents::<Ping>::shared().add_event_listener(
            "ping",
            global_listener(move |name, ping: &Ping| sink.borrow_mut().push(format!("{name}={}", ping.0))),
            false,
        );

        assert_eq!(GlobalEvents::<Ping>::shared().fire_event("ping", &Ping(3)), 1);
        assert_eq!(*seen.borrow(), vec!["ping=3"]);

        GlobalEvents::<Ping>::shared().remove_event("ping");
        assert!(!GlobalEvents::<Ping>::shared().is_event("ping"));
    }

    #[test]
    fn test_private_table_is_isolated() {
        let private = GlobalEvents::<u32>::new();
        private.add_event_listener("x", global_listener(|_, _: &u32| {}), false);

        assert!(private.is_event("x"));
        assert!(!GlobalEvents::<u32>::shared().is_event("x"));
    }
}
