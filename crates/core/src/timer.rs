//! Hashed timing wheel and the internal module that drives it.

use crate::app::App;
use crate::error::CoreResult;
use crate::module::Module;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use svcmesh_config::ModuleSettings;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Module type of the internal timer module
pub const TIMER_MODULE_TYPE: &str = "Timer";

/// Default wheel resolution
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

/// Default number of wheel slots
pub const DEFAULT_SLOTS: usize = 3600;

/// Handle of a scheduled timer
pub type TimerId = u64;

type Callback = Box<dyn FnOnce() + Send>;

struct TimerEntry {
    id: TimerId,
    rounds: u64,
    callback: Callback,
}

struct WheelState {
    slots: Vec<Vec<TimerEntry>>,
    cursor: usize,
    index: HashMap<TimerId, usize>,
}

/// Timing wheel with a fixed tick
pub struct TimingWheel {
    tick: Duration,
    state: Mutex<WheelState>,
    next_id: AtomicU64,
}

impl TimingWheel {
    /// Creates a wheel of `slots` slots advancing every `tick`
    pub fn new(tick: Duration, slots: usize) -> Self {
        let slots = slots.max(1);
        Self {
            tick: tick.max(Duration::from_millis(1)),
            state: Mutex::new(WheelState {
                slots: (0..slots).map(|_| Vec::new()).collect(),
                cursor: 0,
                index: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Wheel resolution
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Runs `callback` once, `delay` from now rounded up to whole ticks
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let ticks = (delay.as_nanos().div_ceil(self.tick.as_nanos()) as u64).max(1);

        let mut state = self.state.lock();
        let len = state.slots.len() as u64;
        let slot = ((state.cursor as u64 + ticks) % len) as usize;
        state.slots[slot].push(TimerEntry {
            id,
            rounds: (ticks - 1) / len,
            callback: Box::new(callback),
        });
        state.index.insert(id, slot);
        id
    }

    /// Cancels a pending timer; false when it already fired or never existed
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state.lock();
        let Some(slot) = state.index.remove(&id) else {
            return false;
        };
        state.slots[slot].retain(|entry| entry.id != id);
        true
    }

    /// Number of timers not yet fired
    pub fn pending(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Advances the wheel one tick and fires due timers.
    ///
    /// Callbacks run after the wheel lock is released. Returns how many fired.
    pub fn advance(&self) -> usize {
        let due = {
            let mut state = self.state.lock();
            let len = state.slots.len();
            state.cursor = (state.cursor + 1) % len;
            let cursor = state.cursor;

            let entries = std::mem::take(&mut state.slots[cursor]);
            let mut due = Vec::new();
            for mut entry in entries {
                if entry.rounds == 0 {
                    state.index.remove(&entry.id);
                    due.push(entry.callback);
                } else {
                    entry.rounds -= 1;
                    state.slots[cursor].push(entry);
                }
            }
            due
        };

        let fired = due.len();
        for callback in due {
            callback();
        }
        fired
    }
}

impl Default for TimingWheel {
    fn default() -> Self {
        Self::new(DEFAULT_TICK, DEFAULT_SLOTS)
    }
}

/// Internal module ticking a [`TimingWheel`]; runs in every process
pub struct TimerModule {
    wheel: Arc<TimingWheel>,
}

impl TimerModule {
    /// Creates a module driving `wheel`
    pub fn new(wheel: Arc<TimingWheel>) -> Self {
        Self { wheel }
    }

    /// The wheel driven by this module
    pub fn wheel(&self) -> &Arc<TimingWheel> {
        &self.wheel
    }
}

#[async_trait]
impl Module for TimerModule {
    fn module_type(&self) -> &str {
        TIMER_MODULE_TYPE
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    async fn on_init(&self, _app: &Arc<App>, _settings: &ModuleSettings) -> CoreResult<()> {
        debug!(tick_ms = self.wheel.tick().as_millis() as u64, "timing wheel ready");
        Ok(())
    }

    async fn run(&self, close: CancellationToken) {
        let mut ticker = interval(self.wheel.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = close.cancelled() => break,
                _ = ticker.tick() => {
                    self.wheel.advance();
                }
            }
        }
        info!(pending = self.wheel.pending(), "timing wheel stopped");
    }
}
