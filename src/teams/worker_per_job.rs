//! Team spawning one short-lived worker thread per job.

use crate::source::team::{Job, Team, TeamSource, TeamSourceContext};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::warn;

/// Spawns a named thread for each assigned job.
///
/// Suits bursty, low-volume work where worker reuse is not worth a queue.
/// `stop_working` joins every thread spawned so far, so assigned jobs
/// always finish before the floor closes.
#[derive(Debug)]
pub struct WorkerPerJobTeam {
    name: String,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPerJobTeam {
    /// Team with the given name used for worker thread names.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handles: Mutex::new(Vec::new()),
        }
    }
}

impl Team for WorkerPerJobTeam {
    fn assign_job(&self, job: Job) {
        let thread_name = format!("{}-worker", self.name);
        // The closure is dropped unrun when the spawn fails, leaving the
        // job in the slot for the inline fallback.
        let slot = Arc::new(Mutex::new(Some(job)));
        let worker_slot = slot.clone();
        match std::thread::Builder::new().name(thread_name).spawn(move || {
            if let Some(job) = worker_slot.lock().take() {
                job.run();
            }
        }) {
            Ok(handle) => self.handles.lock().push(handle),
            Err(e) => {
                warn!(team = %self.name, error = %e, "failed to spawn worker, running job inline");
                if let Some(job) = slot.lock().take() {
                    job.run();
                }
            }
        }
    }

    fn stop_working(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if handle.join().is_err() {
                warn!(team = %self.name, "worker thread panicked");
            }
        }
    }
}

/// Source for [`WorkerPerJobTeam`]. Ignores size and properties.
#[derive(Debug, Default)]
pub struct WorkerPerJobTeamSource;

impl TeamSource for WorkerPerJobTeamSource {
    fn create_team(&self, context: TeamSourceContext<'_>) -> anyhow::Result<Arc<dyn Team>> {
        Ok(Arc::new(WorkerPerJobTeam::new(context.name)))
    }
}
