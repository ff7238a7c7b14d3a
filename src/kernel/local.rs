//! Thread-local-aware dispatch.
//!
//! A team may request that jobs of a process run on the thread that
//! initiated the process. The router keeps one job channel per process
//! with a waiting initiator; jobs of registered processes are sent there
//! and serviced by [`crate::floor::ProcessHandle::wait`]. Jobs of
//! processes with no waiting initiator fall through to the team itself.

use crate::source::team::{Job, ProcessId, Team};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;

struct Route {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    servicer: ThreadId,
}

#[derive(Default)]
pub(crate) struct ThreadLocalRouter {
    routes: Mutex<HashMap<ProcessId, Route>>,
}

impl ThreadLocalRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register the calling thread as the local servicer for a process.
    pub fn register(&self, process: ProcessId) -> Receiver<Job> {
        let (tx, rx) = unbounded();
        self.routes.lock().insert(
            process,
            Route {
                sender: tx,
                receiver: rx.clone(),
                servicer: std::thread::current().id(),
            },
        );
        rx
    }

    pub fn unregister(&self, process: ProcessId) {
        self.routes.lock().remove(&process);
    }

    /// The process's job queue, but only on the thread registered to
    /// service it. A worker blocking on that thread must keep draining
    /// this queue or routed jobs would never run.
    pub fn servicer_queue(&self, process: ProcessId) -> Option<Receiver<Job>> {
        let routes = self.routes.lock();
        let route = routes.get(&process)?;
        (route.servicer == std::thread::current().id()).then(|| route.receiver.clone())
    }

    /// Route a job to its process's servicing thread, or hand it to the
    /// team when no route exists (or the servicer is gone).
    pub fn assign(&self, job: Job, team: &Arc<dyn Team>) {
        let sender = self.routes.lock().get(&job.process()).map(|r| r.sender.clone());
        match sender {
            Some(sender) => {
                if let Err(send_error) = sender.send(job) {
                    team.assign_job(send_error.into_inner());
                }
            }
            None => team.assign_job(job),
        }
    }
}
