//! Deadline monitor: one background thread per floor watching container
//! timeouts.
//!
//! Containers are held weakly; a recycled or dropped container simply
//! falls out of the watch list. Epochs make expiry idempotent against
//! state changes that race the deadline.

use crate::kernel::container::ManagedObjectContainer;
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// Upper bound on sleep so shutdown is never far away.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Watch {
    container: Weak<ManagedObjectContainer>,
    deadline: Instant,
    epoch: u64,
}

#[derive(Default)]
struct State {
    watches: Vec<Watch>,
    shutdown: bool,
}

pub(crate) struct Monitor {
    state: Mutex<State>,
    wakeup: Condvar,
}

impl Monitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            wakeup: Condvar::new(),
        })
    }

    /// Watch a container until `deadline`; expire it if its epoch is still
    /// `epoch` when the deadline passes.
    pub fn watch(&self, container: Weak<ManagedObjectContainer>, deadline: Instant, epoch: u64) {
        let mut state = self.state.lock();
        state.watches.push(Watch {
            container,
            deadline,
            epoch,
        });
        self.wakeup.notify_one();
    }

    /// Spawn the monitor thread.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = self.clone();
        std::thread::Builder::new()
            .name("floor-monitor".to_string())
            .spawn(move || monitor.run())
            .unwrap_or_else(|e| {
                // Without a monitor, timeouts never fire; everything else
                // still works.
                tracing::warn!(error = %e, "failed to spawn monitor thread");
                std::thread::spawn(|| {})
            })
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        self.wakeup.notify_one();
    }

    fn run(&self) {
        loop {
            let expired = {
                let mut state = self.state.lock();
                if state.shutdown {
                    return;
                }
                let now = Instant::now();
                let mut expired = Vec::new();
                state.watches.retain(|watch| {
                    if watch.container.strong_count() == 0 {
                        return false;
                    }
                    if watch.deadline <= now {
                        if let Some(container) = watch.container.upgrade() {
                            expired.push((container, watch.epoch));
                        }
                        return false;
                    }
                    true
                });
                if expired.is_empty() {
                    let next = state
                        .watches
                        .iter()
                        .map(|w| w.deadline)
                        .min()
                        .map(|d| d.saturating_duration_since(now).min(POLL_INTERVAL))
                        .unwrap_or(POLL_INTERVAL);
                    self.wakeup.wait_for(&mut state, next);
                }
                expired
            };
            for (container, epoch) in expired {
                container.expire(epoch);
            }
        }
    }
}
