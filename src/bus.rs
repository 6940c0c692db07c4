//! Publish/subscribe event bus.
//!
//! Producers (drivers, services) post tagged events; consumers register
//! one bounded FIFO queue per facility they care about and block on it.
//!
//! ```text
//! ┌──────────────┐  post(Event)  ┌──────────────┐   get()   ┌──────────────┐
//! │ Input poller │──────────────▶│              │──────────▶│  Pair state  │
//! │ WiFi adapter │──────────────▶│   EventBus   │           ├──────────────┤
//! │ Battery task │──────────────▶│  (routing)   │──────────▶│ LowBatt task │
//! └──────────────┘               └──────────────┘           └──────────────┘
//! ```
//!
//! Events are a sum type keyed by facility — payloads move by value and
//! are released when the consumer drops its copy; there is no manual
//! free contract.
//!
//! ## Full-queue policy
//!
//! `post` never blocks: producers are interrupt-adjacent and must not
//! stall. When a listener queue is full the **oldest** entry is evicted
//! to make room for the new one.
//!
//! ## Delivery guarantees
//!
//! - Per facility, per listener: FIFO in post order.
//! - A facility with zero listeners silently discards posted events.
//! - No replay: a queue registered after a post never sees it.

use core::fmt;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use log::trace;

use crate::services::battery::PowerLevel;

// ───────────────────────────────────────────────────────────────
// Facilities and payloads
// ───────────────────────────────────────────────────────────────

/// Routing key for publish/subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facility {
    Wifi,
    Input,
    Pair,
    Battery,
    Comm,
}

/// Physical buttons exposed by the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Pair,
    Headlights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Press,
    Release,
}

/// A debounced button edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub button: Button,
    pub action: InputAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiEvent {
    Connected,
    Disconnected,
}

/// Outcome of a pairing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairEvent {
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryEvent {
    pub level: PowerLevel,
}

/// Control-channel connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommEvent {
    ControllerConnected,
    ControllerDisconnected,
}

/// An immutable event record. The variant *is* the facility tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Wifi(WifiEvent),
    Input(InputEvent),
    Pair(PairEvent),
    Battery(BatteryEvent),
    Comm(CommEvent),
}

impl Event {
    /// The facility this event is routed on.
    pub fn facility(&self) -> Facility {
        match self {
            Self::Wifi(_) => Facility::Wifi,
            Self::Input(_) => Facility::Input,
            Self::Pair(_) => Facility::Pair,
            Self::Battery(_) => Facility::Battery,
            Self::Comm(_) => Facility::Comm,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Listener queue
// ───────────────────────────────────────────────────────────────

/// Why a blocking [`EventQueue::get`] returned without an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// The timeout elapsed with no event posted.
    TimedOut,
    /// [`EventQueue::unblock`] was called; the queue is being retired.
    Cancelled,
}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

struct QueueInner {
    buf: VecDeque<Event>,
    unblocked: bool,
}

/// A bounded FIFO channel of events, owned by exactly one subscriber.
///
/// Created when a subscriber registers interest in a facility and
/// dropped when it unregisters. The `unblock` latch is sticky: once
/// set, every in-progress and future `get` returns
/// [`RecvError::Cancelled`] immediately, so a worker blocked in its
/// wait loop can be released during shutdown without a real event.
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    cond: Condvar,
    capacity: usize,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` pending events.
    pub fn new(capacity: usize) -> Arc<Self> {
        assert!(capacity > 0, "EventQueue capacity must be non-zero");
        Arc::new(Self {
            inner: Mutex::new(QueueInner {
                buf: VecDeque::with_capacity(capacity),
                unblocked: false,
            }),
            cond: Condvar::new(),
            capacity,
        })
    }

    /// Block until an event arrives, the timeout elapses, or the queue
    /// is unblocked. `None` waits indefinitely (still interruptible by
    /// [`unblock`](Self::unblock)).
    pub fn get(&self, timeout: Option<Duration>) -> Result<Event, RecvError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock().expect("event queue poisoned");

        loop {
            if inner.unblocked {
                return Err(RecvError::Cancelled);
            }
            if let Some(event) = inner.buf.pop_front() {
                return Ok(event);
            }

            inner = match deadline {
                None => self.cond.wait(inner).expect("event queue poisoned"),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(RecvError::TimedOut);
                    }
                    let (guard, _) = self
                        .cond
                        .wait_timeout(inner, deadline - now)
                        .expect("event queue poisoned");
                    guard
                }
            };
        }
    }

    /// Force any in-progress or future `get` to return
    /// [`RecvError::Cancelled`] immediately. Sticky.
    pub fn unblock(&self) {
        let mut inner = self.inner.lock().expect("event queue poisoned");
        inner.unblocked = true;
        drop(inner);
        self.cond.notify_all();
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("event queue poisoned").buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue, evicting the oldest entry when full. Returns `true` if
    /// an entry was evicted.
    fn push(&self, event: Event) -> bool {
        let mut inner = self.inner.lock().expect("event queue poisoned");
        let mut evicted = false;
        if inner.buf.len() == self.capacity {
            inner.buf.pop_front();
            evicted = true;
        }
        inner.buf.push_back(event);
        drop(inner);
        self.cond.notify_one();
        evicted
    }
}

// ───────────────────────────────────────────────────────────────
// Bus
// ───────────────────────────────────────────────────────────────

struct Registration {
    facility: Facility,
    queue: Weak<EventQueue>,
}

/// Routes posted events to every queue registered for their facility.
pub struct EventBus {
    listeners: Mutex<Vec<Registration>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Register `queue` for `facility`. A queue may be registered for
    /// several facilities; each `post` to any of them enqueues into it.
    pub fn listen(&self, facility: Facility, queue: &Arc<EventQueue>) {
        let mut listeners = self.listeners.lock().expect("bus poisoned");
        listeners.push(Registration {
            facility,
            queue: Arc::downgrade(queue),
        });
    }

    /// Remove *all* of `queue`'s facility registrations. After this
    /// returns, no subsequent `post` delivers to the queue.
    pub fn unlisten(&self, queue: &Arc<EventQueue>) {
        let mut listeners = self.listeners.lock().expect("bus poisoned");
        listeners.retain(|reg| {
            reg.queue
                .upgrade()
                .is_some_and(|q| !Arc::ptr_eq(&q, queue))
        });
    }

    /// Deliver a copy of `event` to every queue currently registered
    /// for its facility. Never blocks; full queues evict their oldest
    /// entry. Zero listeners discard the event.
    pub fn post(&self, event: Event) {
        let facility = event.facility();
        let mut listeners = self.listeners.lock().expect("bus poisoned");
        // Dropped subscribers that never unlistened leave dead weak
        // refs behind; prune them on the way through.
        listeners.retain(|reg| reg.queue.strong_count() > 0);
        for reg in listeners.iter().filter(|r| r.facility == facility) {
            if let Some(queue) = reg.queue.upgrade() {
                if queue.push(event) {
                    trace!("bus: {:?} listener full, oldest evicted", facility);
                }
            }
        }
    }

    /// Number of live registrations for a facility.
    pub fn listener_count(&self, facility: Facility) -> usize {
        let listeners = self.listeners.lock().expect("bus poisoned");
        listeners
            .iter()
            .filter(|r| r.facility == facility && r.queue.strong_count() > 0)
            .count()
    }
}
