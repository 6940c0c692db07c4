//! Top-level rover state machine.
//!
//! The rover is always in exactly one of two states:
//!
//! ```text
//!           pairing succeeded
//!   ┌──────┐ ────────────────▶ ┌───────┐
//!   │ Pair │                   │ Drive │
//!   └──────┘ ◀──────────────── └───────┘
//!           controller disconnected
//! ```
//!
//! Transitions are requested by name ([`StateKind`]) and applied on
//! the machine's own worker thread: the request is parked in a pending
//! slot, and on the next step the worker drops the old state *to
//! completion* (its `Drop` unregisters listeners and stops any
//! sub-workers) before constructing the new one. A state requesting a
//! transition from inside its own `poll` therefore never destroys
//! itself mid-call.
//!
//! If several transitions are requested before the worker gets to
//! them, the latest one wins.

pub mod drive;
pub mod pair;

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::info;

use crate::bus::EventBus;
use crate::registry::Registry;
use crate::worker::{StopToken, Task, Worker, WorkerConfig};

use drive::DriveState;
use pair::PairState;

/// Names of the constructible states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Pair,
    Drive,
}

/// A live state. Constructed fully subscribed and visible; `Drop`
/// must undo everything the constructor did.
pub trait RoverState: Send {
    fn name(&self) -> &'static str;

    /// One bounded wait-and-handle pass. Must return within ~1 s so
    /// pending transitions and stop requests are picked up.
    fn poll(&mut self, stop: &StopToken);
}

/// Constructs the state for a kind. A function pointer so tests can
/// substitute tracking states.
type StateBuilder =
    fn(StateKind, &Arc<Registry>, &Arc<EventBus>, &Arc<StopToken>) -> Box<dyn RoverState>;

fn build_state(
    kind: StateKind,
    registry: &Arc<Registry>,
    bus: &Arc<EventBus>,
    stop: &Arc<StopToken>,
) -> Box<dyn RoverState> {
    match kind {
        StateKind::Pair => Box::new(PairState::new(registry, bus, stop)),
        StateKind::Drive => Box::new(DriveState::new(registry, bus, stop)),
    }
}

/// Owns the current state and the worker that drives it.
pub struct StateMachine {
    registry: Arc<Registry>,
    bus: Arc<EventBus>,
    pending: Arc<Mutex<Option<StateKind>>>,
    builder: StateBuilder,
    worker: Mutex<Option<Worker>>,
}

impl StateMachine {
    pub fn new(registry: Arc<Registry>, bus: Arc<EventBus>) -> Self {
        Self::with_builder(registry, bus, build_state)
    }

    fn with_builder(registry: Arc<Registry>, bus: Arc<EventBus>, builder: StateBuilder) -> Self {
        Self {
            registry,
            bus,
            pending: Arc::new(Mutex::new(None)),
            builder,
            worker: Mutex::new(None),
        }
    }

    /// Request a transition. Applied on the machine's worker; safe to
    /// call from any thread, including from inside the current state.
    pub fn transition(&self, kind: StateKind) {
        *self.pending.lock().expect("state machine poisoned") = Some(kind);
    }

    /// Spawn the machine worker. Idempotent.
    pub fn begin(&self) {
        let mut worker = self.worker.lock().expect("state machine poisoned");
        if worker.is_some() {
            return;
        }
        *worker = Some(Worker::spawn(
            WorkerConfig::new("state\0").stack_kb(8),
            MachineTask {
                registry: Arc::clone(&self.registry),
                bus: Arc::clone(&self.bus),
                pending: Arc::clone(&self.pending),
                builder: self.builder,
                stop: None,
                current: None,
            },
        ));
    }

    /// Stop the worker and destroy the current state.
    pub fn stop(&self) {
        let worker = self.worker.lock().expect("state machine poisoned").take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}

struct MachineTask {
    registry: Arc<Registry>,
    bus: Arc<EventBus>,
    pending: Arc<Mutex<Option<StateKind>>>,
    builder: StateBuilder,
    stop: Option<Arc<StopToken>>,
    current: Option<Box<dyn RoverState>>,
}

impl Task for MachineTask {
    fn on_start(&mut self, stop: &Arc<StopToken>) -> anyhow::Result<()> {
        self.stop = Some(Arc::clone(stop));
        Ok(())
    }

    fn step(&mut self, stop: &StopToken) -> ControlFlow<()> {
        let next = self.pending.lock().expect("state machine poisoned").take();
        if let Some(kind) = next {
            // Destroy-then-construct: the old state's Drop runs to
            // completion before the new one subscribes to anything.
            if let Some(old) = self.current.take() {
                info!("state machine: {} -> {:?}", old.name(), kind);
                drop(old);
            } else {
                info!("state machine: entering {:?}", kind);
            }
            let token = self.stop.as_ref().expect("on_start sets the token");
            self.current = Some((self.builder)(kind, &self.registry, &self.bus, token));
            return ControlFlow::Continue(());
        }

        match self.current.as_mut() {
            Some(state) => state.poll(stop),
            None => {
                stop.sleep(Duration::from_millis(50));
            }
        }
        ControlFlow::Continue(())
    }

    fn on_stop(&mut self) {
        self.current = None;
    }
}
