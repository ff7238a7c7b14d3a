//! Fixed-size worker pool over a job channel.

use crate::source::team::{Job, Team, TeamSource, TeamSourceContext};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// A fixed set of workers draining an unbounded job channel.
///
/// Workers start on `start_working` and exit once `stop_working` closes the
/// channel and every already-assigned job has drained.
pub struct FixedTeam {
    name: String,
    size: usize,
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl FixedTeam {
    /// Team with the given worker count. A count of zero gets one worker.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            name: name.into(),
            size: size.max(1),
            sender: Mutex::new(Some(sender)),
            receiver,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Configured worker count.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Team for FixedTeam {
    fn start_working(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return;
        }
        for worker in 0..self.size {
            let receiver = self.receiver.clone();
            let thread_name = format!("{}-worker-{}", self.name, worker);
            match std::thread::Builder::new().name(thread_name).spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job.run();
                }
            }) {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!(team = %self.name, worker, error = %e, "failed to spawn worker"),
            }
        }
        debug!(team = %self.name, workers = handles.len(), "team started");
    }

    fn assign_job(&self, job: Job) {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => {
                // Unbounded channel: send only fails when all receivers are
                // gone, which means the workers already exited.
                if let Err(e) = sender.send(job) {
                    warn!(team = %self.name, "workers stopped, running job inline");
                    e.into_inner().run();
                }
            }
            None => {
                warn!(team = %self.name, "team stopped, running job inline");
                drop(sender);
                job.run();
            }
        }
    }

    fn stop_working(&self) {
        // Closing the channel lets workers drain remaining jobs and exit.
        self.sender.lock().take();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if handle.join().is_err() {
                warn!(team = %self.name, "worker thread panicked");
            }
        }
        debug!(team = %self.name, "team stopped");
    }
}

impl std::fmt::Debug for FixedTeam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedTeam")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

/// Source for [`FixedTeam`]. Worker count comes from the configured size,
/// overridable by a `workers` property.
#[derive(Debug, Default)]
pub struct FixedTeamSource;

impl TeamSource for FixedTeamSource {
    fn specification(&self) -> Vec<crate::source::PropertySpec> {
        vec![crate::source::PropertySpec::optional("workers")]
    }

    fn create_team(&self, context: TeamSourceContext<'_>) -> anyhow::Result<Arc<dyn Team>> {
        let size = match context.properties.get("workers") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("workers property '{}' is not a count", value))?,
            None => context.size,
        };
        Ok(Arc::new(FixedTeam::new(context.name, size)))
    }
}
