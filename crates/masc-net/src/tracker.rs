//! Load tracking
//!
//! At most one fetch per URL is in flight. The first caller to
//! [`LoadTracker::reserve`] a URL gets a [`LoadTicket`] and does the work;
//! later callers get a [`Waiter`] and are settled when the ticket completes.
//!
//! Waiters are listeners on two synthetic events per URL, `<url>#load` and
//! `<url>#error`, so all of them are woken in one dispatch pass in the order
//! they reserved.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use masc_events::{EventBus, listener};
use smol::channel::{Receiver, Sender};
use tracing::debug;

use crate::NetError;

/// What every caller for a URL eventually receives
pub type LoadOutcome = Result<(), NetError>;

/// Per-caller completion callbacks
#[derive(Default)]
pub struct Callbacks {
    on_load: Option<Box<dyn FnOnce()>>,
    on_error: Option<Box<dyn FnOnce(&NetError)>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_load(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_load = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&NetError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Fire the callback matching `outcome`
    pub fn run(self, outcome: &LoadOutcome) {
        match outcome {
            Ok(()) => {
                if let Some(on_load) = self.on_load {
                    on_load();
                }
            }
            Err(err) => {
                if let Some(on_error) = self.on_error {
                    on_error(err);
                }
            }
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_load", &self.on_load.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Result of [`LoadTracker::reserve`]
#[derive(Debug)]
pub enum Reservation {
    /// Someone else is fetching; await the waiter, do not fetch
    AlreadyLoading(Waiter),
    /// The caller fetches and must complete the ticket
    Owner(LoadTicket),
}

/// Resolves once the owner of the load completes
#[derive(Debug)]
pub struct Waiter {
    outcome: Receiver<LoadOutcome>,
}

impl Waiter {
    pub async fn wait(self) -> LoadOutcome {
        match self.outcome.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(NetError::transport(0, "load abandoned")),
        }
    }
}

struct TrackerState {
    coordinate: bool,
    bus: EventBus<LoadOutcome>,
    loading: RefCell<HashSet<String>>,
}

impl TrackerState {
    fn settle(&self, url: &str, outcome: &LoadOutcome) -> usize {
        self.loading.borrow_mut().remove(url);
        let (fire, discard) = match outcome {
            Ok(()) => (load_event(url), error_event(url)),
            Err(_) => (error_event(url), load_event(url)),
        };
        self.bus.remove_event(&discard);
        self.bus.drain_event(&fire, outcome)
    }
}

/// In-flight table for one loader
#[derive(Clone)]
pub struct LoadTracker {
    state: Rc<TrackerState>,
}

impl LoadTracker {
    /// With `coordinate` off every reservation is an untracked owner
    pub fn new(coordinate: bool) -> Self {
        Self {
            state: Rc::new(TrackerState {
                coordinate,
                bus: EventBus::new(),
                loading: RefCell::new(HashSet::new()),
            }),
        }
    }

    /// Claim `url`, or queue behind whoever already has it.
    ///
    /// `force` skips coordination entirely: the caller always owns an
    /// untracked ticket and nobody waits on it.
    pub fn reserve(&self, url: &str, callbacks: Callbacks, force: bool) -> Reservation {
        if force || !self.state.coordinate {
            return Reservation::Owner(LoadTicket {
                url: url.to_string(),
                target: Some(Target::Untracked(callbacks)),
            });
        }

        let outcome = self.register(url, callbacks);
        if self.is_loading(url) {
            debug!(url, waiting = self.waiting(url), "load already in flight");
            return Reservation::AlreadyLoading(Waiter { outcome });
        }

        self.state.loading.borrow_mut().insert(url.to_string());
        Reservation::Owner(LoadTicket {
            url: url.to_string(),
            target: Some(Target::Tracked(Rc::clone(&self.state))),
        })
    }

    pub fn is_loading(&self, url: &str) -> bool {
        self.state.loading.borrow().contains(url)
    }

    /// Callers registered for `url`'s outcome, the owner included
    pub fn waiting(&self, url: &str) -> usize {
        self.state.bus.listener_count(&load_event(url))
    }

    fn register(&self, url: &str, callbacks: Callbacks) -> Receiver<LoadOutcome> {
        let (sender, receiver) = smol::channel::bounded(1);
        let slot: Rc<RefCell<Option<(Callbacks, Sender<LoadOutcome>)>>> =
            Rc::new(RefCell::new(Some((callbacks, sender))));

        for name in [load_event(url), error_event(url)] {
            let slot = Rc::clone(&slot);
            let settle = listener(move |_, outcome: &LoadOutcome| {
                let taken = slot.borrow_mut().take();
                if let Some((callbacks, sender)) = taken {
                    callbacks.run(outcome);
                    let _ = sender.try_send(outcome.clone());
                }
            });
            self.state.bus.add_event_listener(&name, settle, false);
        }

        receiver
    }
}

impl Default for LoadTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for LoadTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadTracker")
            .field("coordinate", &self.state.coordinate)
            .field("loading", &self.state.loading.borrow().len())
            .finish()
    }
}

enum Target {
    Tracked(Rc<TrackerState>),
    Untracked(Callbacks),
}

/// Ownership of one in-flight load.
///
/// Dropping a ticket without completing it settles every waiter with a
/// transport error.
pub struct LoadTicket {
    url: String,
    target: Option<Target>,
}

impl LoadTicket {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Clear the in-flight flag and hand `outcome` to every registered caller
    pub fn complete(mut self, outcome: LoadOutcome) {
        self.settle(&outcome);
    }

    fn settle(&mut self, outcome: &LoadOutcome) {
        match self.target.take() {
            Some(Target::Tracked(state)) => {
                let woken = state.settle(&self.url, outcome);
                debug!(url = %self.url, woken, ok = outcome.is_ok(), "load settled");
            }
            Some(Target::Untracked(callbacks)) => callbacks.run(outcome),
            None => {}
        }
    }
}

impl Drop for LoadTicket {
    fn drop(&mut self) {
        if self.target.is_some() {
            debug!(url = %self.url, "load ticket dropped before completion");
            self.settle(&Err(NetError::transport(0, "load abandoned")));
        }
    }
}

impl fmt::Debug for LoadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadTicket")
            .field("url", &self.url)
            .field("settled", &self.target.is_none())
            .finish()
    }
}

fn load_event(url: &str) -> String {
    format!("{url}#load")
}

fn error_event(url: &str) -> String {
    format!("{url}#error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting(hits: &Rc<Cell<u32>>, misses: &Rc<Cell<u32>>) -> Callbacks {
        let hits = Rc::clone(hits);
        let misses = Rc::clone(misses);
        Callbacks::new()
            .on_load(move || hits.set(hits.get() + 1))
            .on_error(move |_| misses.set(misses.get() + 1))
    }

    #[test]
    fn test_second_reservation_waits() {
        let tracker = LoadTracker::new(true);
        let hits = Rc::new(Cell::new(0));
        let misses = Rc::new(Cell::new(0));

        let Reservation::Owner(ticket) = tracker.reserve("/a.js", counting(&hits, &misses), false)
        else {
            panic!("first reservation should own the load");
        };
        let Reservation::AlreadyLoading(waiter) =
            tracker.reserve("/a.js", counting(&hits, &misses), false)
        else {
            panic!("second reservation should wait");
        };

        assert!(tracker.is_loading("/a.js"));
        assert_eq!(tracker.waiting("/a.js"), 2);

        ticket.complete(Ok(()));

        assert_eq!(hits.get(), 2);
        assert_eq!(misses.get(), 0);
        assert!(!tracker.is_loading("/a.js"));
        assert_eq!(tracker.waiting("/a.js"), 0);
        assert!(smol::block_on(waiter.wait()).is_ok());
    }

    #[test]
    fn test_error_fans_out() {
        let tracker = LoadTracker::new(true);
        let hits = Rc::new(Cell::new(0));
        let misses = Rc::new(Cell::new(0));

        let Reservation::Owner(ticket) = tracker.reserve("/b.js", counting(&hits, &misses), false)
        else {
            panic!("expected owner");
        };
        let _ = tracker.reserve("/b.js", counting(&hits, &misses), false);

        ticket.complete(Err(NetError::transport(404, "Not Found")));

        assert_eq!(misses.get(), 2);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_dropped_ticket_releases_waiters() {
        let tracker = LoadTracker::new(true);
        let Reservation::Owner(ticket) = tracker.reserve("/c.js", Callbacks::new(), false) else {
            panic!("expected owner");
        };
        let Reservation::AlreadyLoading(waiter) = tracker.reserve("/c.js", Callbacks::new(), false)
        else {
            panic!("expected waiter");
        };

        drop(ticket);

        assert!(!tracker.is_loading("/c.js"));
        let outcome = smol::block_on(waiter.wait());
        assert_eq!(outcome.unwrap_err().code(), 0);
    }

    #[test]
    fn test_force_is_untracked() {
        let tracker = LoadTracker::new(true);
        let hits = Rc::new(Cell::new(0));
        let misses = Rc::new(Cell::new(0));

        let Reservation::Owner(ticket) = tracker.reserve("/d.js", counting(&hits, &misses), true)
        else {
            panic!("expected owner");
        };
        assert!(!tracker.is_loading("/d.js"));

        ticket.complete(Ok(()));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_uncoordinated_never_waits() {
        let tracker = LoadTracker::new(false);
        let first = tracker.reserve("/e.js", Callbacks::new(), false);
        let second = tracker.reserve("/e.js", Callbacks::new(), false);

        assert!(matches!(first, Reservation::Owner(_)));
        assert!(matches!(second, Reservation::Owner(_)));
    }
}
