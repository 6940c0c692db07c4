//! Worker threads with cooperative cancellation.
//!
//! Every long-running service in the firmware runs as a [`Worker`]: a
//! dedicated thread driving a [`Task`] through start/step/stop hooks.
//! Cancellation is a [`StopToken`] shared between the worker and its
//! thread — triggering it wakes token sleeps *and* any event queues
//! bound to it, so a task blocked on `EventQueue::get(None)` still
//! stops within a bounded time.
//!
//! Dropping a `Worker` stops and joins it; after `Drop` returns the
//! task has run `on_stop` and the thread is gone.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::bus::EventQueue;

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// Which CPU a worker is pinned to on the ESP32-S3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// PRO_CPU — protocol stacks (Wi-Fi, BT) live here.
    Pro = 0,
    /// APP_CPU — application workers default here.
    App = 1,
}

/// Thread parameters for a worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Thread name. On ESP-IDF this lands in the FreeRTOS task name,
    /// which expects a null-terminated string — use e.g. `"pair\0"`.
    pub name: &'static str,
    pub stack_kb: usize,
    pub priority: u8,
    pub core: Core,
}

impl WorkerConfig {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stack_kb: 4,
            priority: 5,
            core: Core::App,
        }
    }

    pub fn stack_kb(mut self, kb: usize) -> Self {
        self.stack_kb = kb;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn core(mut self, core: Core) -> Self {
        self.core = core;
        self
    }
}

// ───────────────────────────────────────────────────────────────
// Cancellation
// ───────────────────────────────────────────────────────────────

/// One-shot cancellation token.
///
/// `trigger` is sticky and idempotent. Queues registered through
/// [`bind_queue`](Self::bind_queue) are unblocked on trigger, which is
/// what makes indefinite `EventQueue::get` waits safe inside a task.
pub struct StopToken {
    stopped: AtomicBool,
    gate: Mutex<()>,
    cond: Condvar,
    queues: Mutex<Vec<Weak<EventQueue>>>,
}

impl StopToken {
    pub fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            gate: Mutex::new(()),
            cond: Condvar::new(),
            queues: Mutex::new(Vec::new()),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Register a queue to be unblocked when this token triggers. A
    /// queue bound after the trigger is unblocked immediately.
    pub fn bind_queue(&self, queue: &Arc<EventQueue>) {
        let mut queues = self.queues.lock().expect("stop token poisoned");
        queues.retain(|q| q.strong_count() > 0);
        queues.push(Arc::downgrade(queue));
        drop(queues);
        if self.is_stopped() {
            queue.unblock();
        }
    }

    /// Request stop: wake token sleeps and unblock bound queues.
    pub fn trigger(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        // Taking the gate lock orders this against a sleeper between
        // its stopped check and its wait, so the notify cannot be lost.
        drop(self.gate.lock().expect("stop token poisoned"));
        self.cond.notify_all();
        let queues = self.queues.lock().expect("stop token poisoned");
        for queue in queues.iter().filter_map(Weak::upgrade) {
            queue.unblock();
        }
    }

    /// Sleep for `duration`, waking early on trigger. Returns `true`
    /// if stop was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut gate = self.gate.lock().expect("stop token poisoned");
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(gate, deadline - now)
                .expect("stop token poisoned");
            gate = guard;
        }
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Task + worker
// ───────────────────────────────────────────────────────────────

/// Body of a worker thread.
///
/// `on_start` failing skips the loop *and* `on_stop` — the task never
/// ran. `step` returning `Break` self-terminates the thread without an
/// external `stop` call (the worker stays joinable).
pub trait Task: Send {
    fn on_start(&mut self, _stop: &Arc<StopToken>) -> anyhow::Result<()> {
        Ok(())
    }

    fn step(&mut self, stop: &StopToken) -> ControlFlow<()>;

    fn on_stop(&mut self) {}
}

/// A joinable service thread. Dropping stops and joins it.
pub struct Worker {
    name: &'static str,
    stop: Arc<StopToken>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Spawn `task` on a new thread configured by `config`.
    pub fn spawn(config: WorkerConfig, mut task: impl Task + 'static) -> Self {
        let stop = Arc::new(StopToken::new());
        let token = Arc::clone(&stop);
        let name = config.name;

        let handle = spawn_thread(config, move || {
            if let Err(e) = task.on_start(&token) {
                warn!(
                    "{}: start failed, not entering loop: {e:#}",
                    display_name(name)
                );
                return;
            }
            while !token.is_stopped() {
                if task.step(&token).is_break() {
                    debug!("{}: self-terminating", display_name(name));
                    break;
                }
            }
            task.on_stop();
        });

        Self {
            name,
            stop,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Request stop and join. Idempotent. Must not be called from the
    /// worker's own thread — a task stops itself by returning `Break`.
    pub fn stop(&self) {
        self.stop.trigger();
        let handle = self.handle.lock().expect("worker poisoned").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("{}: worker thread panicked", display_name(self.name));
            }
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_stopped()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn display_name(name: &'static str) -> &'static str {
    name.trim_end_matches('\0')
}

#[cfg(target_os = "espidf")]
fn spawn_thread(config: WorkerConfig, f: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
    // pthread attributes don't carry core/priority on ESP-IDF; the
    // esp_pthread config applies to the next spawn on this thread.
    let mut cfg = unsafe { esp_idf_sys::esp_pthread_get_default_config() };
    cfg.pin_to_core = config.core as i32;
    cfg.prio = i32::from(config.priority);
    cfg.stack_size = config.stack_kb * 1024;
    cfg.thread_name = config.name.as_ptr().cast();
    let err = unsafe { esp_idf_sys::esp_pthread_set_cfg(&cfg) };
    assert_eq!(err, esp_idf_sys::ESP_OK, "esp_pthread_set_cfg failed");
    debug!(
        "spawning {} on core {:?} (prio {}, {}KB stack)",
        display_name(config.name),
        config.core,
        config.priority,
        config.stack_kb
    );
    std::thread::Builder::new()
        .name(display_name(config.name).to_owned())
        .spawn(f)
        .expect("worker thread creation failed")
}

#[cfg(not(target_os = "espidf"))]
fn spawn_thread(config: WorkerConfig, f: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(display_name(config.name).to_owned())
        .stack_size(config.stack_kb * 1024)
        .spawn(f)
        .expect("worker thread creation failed")
}
