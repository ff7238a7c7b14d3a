//! Process, thread and work scope state.
//!
//! A process is one logical execution started by invoking a work. It owns
//! the process-scope containers and the count of live job chains; threads
//! of execution (one per parallel flow plus the initial one) own the
//! thread-scope containers and the work frames opened on them. All of it
//! is recycled, innermost scope first and within each scope in reverse
//! slot order, when the last chain finishes.

use crate::error::FloorError;
use crate::kernel::Engine;
use crate::kernel::container::ManagedObjectContainer;
use crate::metadata::WorkMetadata;
use crate::source::admin::Administrator;
use crate::source::team::ProcessId;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Completion {
    done: bool,
    failure: Option<String>,
}

pub(crate) struct ProcessState {
    pub id: ProcessId,
    pub engine: Arc<Engine>,
    pub containers: Vec<Arc<ManagedObjectContainer>>,
    // Live job chains. The process completes when this drops to zero.
    active: AtomicUsize,
    completion: Mutex<Completion>,
    completed: Condvar,
    threads: Mutex<Vec<Arc<ThreadState>>>,
}

impl ProcessState {
    pub fn new(engine: Arc<Engine>, id: ProcessId) -> Arc<Self> {
        let containers = engine
            .office
            .process_objects
            .iter()
            .map(|m| ManagedObjectContainer::new(m.clone()))
            .collect();
        Arc::new(Self {
            id,
            engine,
            containers,
            active: AtomicUsize::new(0),
            completion: Mutex::new(Completion::default()),
            completed: Condvar::new(),
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Open a new thread of execution with fresh thread-scope containers.
    pub fn spawn_thread(self: &Arc<Self>) -> Arc<ThreadState> {
        let containers = self
            .engine
            .office
            .thread_objects
            .iter()
            .map(|m| ManagedObjectContainer::new(m.clone()))
            .collect();
        let thread = Arc::new(ThreadState {
            process: self.clone(),
            containers,
            frames: Mutex::new(Vec::new()),
        });
        self.threads.lock().push(thread.clone());
        thread
    }

    /// A job chain came alive.
    pub fn chain_started(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    /// A job chain finished. The last one out finalizes the process.
    pub fn chain_finished(self: &Arc<Self>) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.finalize();
        }
    }

    /// Record a fatal failure. The first failure wins; chains keep
    /// draining so already-scheduled jobs are not cancelled.
    pub fn fail(&self, message: String) {
        let mut completion = self.completion.lock();
        if completion.failure.is_none() {
            completion.failure = Some(message);
        }
    }

    pub fn is_done(&self) -> bool {
        self.completion.lock().done
    }

    /// Block until the process completes, surfacing any recorded failure.
    pub fn wait_done(&self, timeout: Option<Duration>) -> Result<(), FloorError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut completion = self.completion.lock();
        while !completion.done {
            match deadline {
                Some(deadline) => {
                    if self
                        .completed
                        .wait_until(&mut completion, deadline)
                        .timed_out()
                    {
                        return Err(FloorError::WaitTimeout(
                            timeout.unwrap_or(Duration::ZERO),
                        ));
                    }
                }
                None => self.completed.wait(&mut completion),
            }
        }
        match &completion.failure {
            Some(failure) => Err(FloorError::ProcessFailure(failure.clone())),
            None => Ok(()),
        }
    }

    // Recycle everything, innermost scope first, reverse slot order within
    // each scope, then signal completion.
    fn finalize(self: &Arc<Self>) {
        let threads = std::mem::take(&mut *self.threads.lock());
        for thread in threads.iter().rev() {
            let frames = std::mem::take(&mut *thread.frames.lock());
            for frame in frames.iter().rev() {
                for container in frame.containers.iter().rev() {
                    container.recycle();
                }
            }
            for container in thread.containers.iter().rev() {
                container.recycle();
            }
        }
        for container in self.containers.iter().rev() {
            container.recycle();
        }

        let mut completion = self.completion.lock();
        completion.done = true;
        tracing::debug!(
            process = %self.id,
            failed = completion.failure.is_some(),
            "process completed"
        );
        self.completed.notify_all();
        drop(completion);
        self.engine.router.unregister(self.id);
    }
}

/// One thread of execution within a process.
pub(crate) struct ThreadState {
    pub process: Arc<ProcessState>,
    pub containers: Vec<Arc<ManagedObjectContainer>>,
    frames: Mutex<Vec<Arc<WorkFrame>>>,
}

impl ThreadState {
    /// Open a work frame on this thread: work-scope containers plus one
    /// administrator instance per bound administrator.
    pub fn open_frame(self: &Arc<Self>, work_slot: usize) -> Arc<WorkFrame> {
        let work = self.process.engine.office.works[work_slot].clone();
        let containers = work
            .work_objects
            .iter()
            .map(|m| ManagedObjectContainer::new(m.clone()))
            .collect();
        let administrators = work
            .administrators
            .iter()
            .map(|a| Mutex::new(a.source.create_administrator()))
            .collect();
        let frame = Arc::new(WorkFrame {
            work_slot,
            work,
            containers,
            administrators,
        });
        self.frames.lock().push(frame.clone());
        frame
    }
}

/// One work execution scope on a thread.
pub(crate) struct WorkFrame {
    pub work_slot: usize,
    pub work: Arc<WorkMetadata>,
    pub containers: Vec<Arc<ManagedObjectContainer>>,
    pub administrators: Vec<Mutex<Box<dyn Administrator>>>,
}

/// Completion signal for a sequential flow: the invoking worker blocks on
/// it until the flow's chain finishes.
#[derive(Default)]
pub(crate) struct FlowDone {
    done: Mutex<bool>,
    signal: Condvar,
}

impl FlowDone {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn complete(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.signal.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        *self.done.lock()
    }

    pub fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.signal.wait(&mut done);
        }
    }
}
