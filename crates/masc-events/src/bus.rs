//! Instance-scope event bus

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::same_listener;

/// Instance-scope listener. Receives the bus it was fired on and the payload.
pub type Listener<A> = Rc<dyn Fn(&EventBus<A>, &A)>;

/// Ordered listener lists keyed by event name.
pub(crate) struct ListenerTable<F: ?Sized> {
    lists: RefCell<HashMap<String, Vec<Rc<F>>>>,
}

impl<F: ?Sized> ListenerTable<F> {
    pub(crate) fn new() -> Self {
        Self {
            lists: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn add(&self, name: &str, listener: Rc<F>, prepend: bool) {
        let mut lists = self.lists.borrow_mut();
        let list = lists.entry(name.to_string()).or_default();
        if prepend {
            list.insert(0, listener);
        } else {
            list.push(listener);
        }
    }

    pub(crate) fn remove(&self, name: &str, listener: &Rc<F>) -> bool {
        let mut lists = self.lists.borrow_mut();
        let Some(list) = lists.get_mut(name) else {
            return false;
        };
        match list.iter().position(|l| same_listener(l, listener)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.lists.borrow().contains_key(name)
    }

    pub(crate) fn clear(&self, name: &str) -> Option<Vec<Rc<F>>> {
        self.lists.borrow_mut().remove(name)
    }

    pub(crate) fn len(&self, name: &str) -> usize {
        self.lists.borrow().get(name).map_or(0, Vec::len)
    }

    /// Clone the list so dispatch never holds the borrow.
    pub(crate) fn snapshot(&self, name: &str) -> Option<Vec<Rc<F>>> {
        self.lists.borrow().get(name).cloned()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lists.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Named event registry with per-instance listener tables.
pub struct EventBus<A> {
    table: ListenerTable<dyn Fn(&EventBus<A>, &A)>,
}

impl<A> EventBus<A> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            table: ListenerTable::new(),
        }
    }

    /// Register `listener` for `name`.
    ///
    /// Appends by default; `prepend` puts it ahead of every existing
    /// listener. Registering the same listener twice makes it fire twice.
    pub fn add_event_listener(&self, name: &str, listener: Listener<A>, prepend: bool) {
        self.table.add(name, listener, prepend);
    }

    /// Remove the first registration of `listener` for `name`.
    ///
    /// Returns whether anything was removed.
    pub fn remove_event_listener(&self, name: &str, listener: &Listener<A>) -> bool {
        self.table.remove(name, listener)
    }

    /// Whether a listener list exists for `name`.
    ///
    /// A list emptied by `remove_event_listener` still exists; only
    /// `remove_event` drops it.
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

    /// Names with a listener list, sorted
    pub fn event_names(&self) -> Vec<String> {
        self.table.names()
    }

    /// Invoke every listener of `name` in registration order.
    ///
    /// Returns the number of listeners invoked (0 when none are registered).
    pub fn fire_event(&self, name: &str, args: &A) -> usize {
        match self.table.snapshot(name) {
            Some(listeners) => self.dispatch(name, listeners, args),
            None => 0,
        }
    }

    /// Detach the listener list of `name`, then dispatch to it.
    ///
    /// Listeners run exactly once; anything they register for `name` lands
    /// in a fresh list.
    pub fn drain_event(&self, name: &str, args: &A) -> usize {
        match self.table.clear(name) {
            Some(listeners) => self.dispatch(name, listeners, args),
            None => 0,
        }
    }

    fn dispatch(&self, name: &str, listeners: Vec<Listener<A>>, args: &A) -> usize {
        tracing::trace!(event_name = name, listeners = listeners.len(), "dispatching event");
        for listener in &listeners {
            listener(self, args);
        }
        listeners.len()
    }
}

impl<A> Default for EventBus<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for EventBus<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.table.names())
            .finish()
    }
}
