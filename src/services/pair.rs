//! Pairing worker: wait for a controller to connect over TCP.
//!
//! Polls until Wi-Fi is up and a controller accepts, then posts one
//! pair-success event and self-terminates. There is no timeout — the
//! attempt runs until it succeeds, the transport fails, or the owner
//! (the Pair state) stops the worker. A transport failure posts one
//! pair-failure event.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::bus::{Event, EventBus, PairEvent};
use crate::registry::Registry;
use crate::worker::{StopToken, Task};

const RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct PairTask {
    registry: Arc<Registry>,
    bus: Arc<EventBus>,
}

impl PairTask {
    pub fn new(registry: &Arc<Registry>, bus: &Arc<EventBus>) -> Self {
        Self {
            registry: Arc::clone(registry),
            bus: Arc::clone(bus),
        }
    }
}

impl Task for PairTask {
    fn step(&mut self, stop: &StopToken) -> ControlFlow<()> {
        // Re-fetch collaborators each pass; either may be retired
        // under us during shutdown.
        let wifi_up = self
            .registry
            .wifi
            .get()
            .is_some_and(|wifi| wifi.is_connected());
        if !wifi_up {
            stop.sleep(RETRY_DELAY);
            return ControlFlow::Continue(());
        }

        let Some(tcp) = self.registry.tcp.get() else {
            stop.sleep(RETRY_DELAY);
            return ControlFlow::Continue(());
        };

        match tcp.try_accept() {
            Ok(true) => {
                info!("pairing: controller connected");
                self.bus.post(Event::Pair(PairEvent { success: true }));
                ControlFlow::Break(())
            }
            Ok(false) => {
                stop.sleep(RETRY_DELAY);
                ControlFlow::Continue(())
            }
            Err(e) => {
                warn!("pairing: transport failed: {e}");
                self.bus.post(Event::Pair(PairEvent { success: false }));
                ControlFlow::Break(())
            }
        }
    }
}
