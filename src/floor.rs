//! The floor: public facade over construction and the execution kernel.
//!
//! A [`Floor`] is opened from a [`FloorConfig`], refuses to open when
//! construction reported any issue, and runs work invocations as
//! processes until closed.

use crate::config::FloorConfig;
use crate::construct::construct_office;
use crate::error::FloorError;
use crate::issues::Issues;
use crate::kernel::job::{JobNode, activate};
use crate::kernel::local::ThreadLocalRouter;
use crate::kernel::monitor::Monitor;
use crate::kernel::process::ProcessState;
use crate::kernel::{Engine, TeamUnit};
use crate::metadata::FunctionRef;
use crate::source::managed_object::{ExecuteContext, ProcessTicket, WorkInvoker};
use crate::source::team::{Job, ProcessId};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Last-resort handler for escalations nothing in the office handles.
pub trait EscalationHandler: Send + Sync {
    /// Called once per unhandled escalation, before the process is marked
    /// failed.
    fn handle_escalation(&self, escalation: &anyhow::Error);
}

/// Default last-resort handler: log and move on.
pub struct LoggingEscalationHandler;

impl EscalationHandler for LoggingEscalationHandler {
    fn handle_escalation(&self, escalation: &anyhow::Error) {
        tracing::error!(error = %format!("{:#}", escalation), "escalation reached the floor");
    }
}

struct FloorInner {
    engine: Arc<Engine>,
    next_process: AtomicU64,
    open: AtomicBool,
}

impl FloorInner {
    fn start_process(
        &self,
        work_slot: usize,
        argument: Option<Box<dyn Any + Send>>,
        register_route: bool,
    ) -> (Arc<ProcessState>, Option<Receiver<Job>>) {
        let id = ProcessId(self.next_process.fetch_add(1, Ordering::SeqCst));
        let process = ProcessState::new(self.engine.clone(), id);
        let jobs = if register_route && self.engine.teams.iter().any(|t| t.thread_local) {
            Some(self.engine.router.register(id))
        } else {
            None
        };
        let thread = process.spawn_thread();
        let frame = thread.open_frame(work_slot);
        let initial = FunctionRef {
            work: work_slot,
            function: frame.work.initial_function,
        };
        let node = JobNode::new(thread, frame, initial, argument, None);
        process.chain_started();
        tracing::debug!(process = %id, work = %self.engine.office.works[work_slot].name, "process started");
        activate(node);
        (process, jobs)
    }

    fn work_slot(&self, work: &str) -> Result<usize, FloorError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(FloorError::Closed);
        }
        self.engine
            .office
            .work_by_name(work)
            .ok_or_else(|| FloorError::UnknownWork(work.to_string()))
    }
}

impl WorkInvoker for FloorInner {
    fn invoke(
        &self,
        work: &str,
        argument: Option<Box<dyn Any + Send>>,
    ) -> Result<ProcessTicket, FloorError> {
        let slot = self.work_slot(work)?;
        // Bootstrap invocations have no waiting thread to route to.
        let (process, _) = self.start_process(slot, argument, false);
        Ok(ProcessTicket(process.id.0))
    }
}

/// An open floor running one office over its teams.
pub struct Floor {
    inner: Arc<FloorInner>,
    monitor_thread: Option<std::thread::JoinHandle<()>>,
}

impl Floor {
    /// Open a floor, reporting construction issues into `issues`.
    ///
    /// Returns `None` when anything was reported; a floor never opens over
    /// a partially constructed office.
    pub fn open_reporting(
        config: &FloorConfig,
        issues: &mut Issues,
        escalation: Arc<dyn EscalationHandler>,
    ) -> Option<Floor> {
        let constructed = construct_office(config, issues)?;
        if issues.has_issues() {
            return None;
        }

        let teams: Vec<TeamUnit> = constructed
            .teams
            .into_iter()
            .map(|t| TeamUnit {
                thread_local: t.requires_thread_local_awareness(),
                name: t.name,
                team: t.team,
            })
            .collect();
        for unit in &teams {
            unit.team.start_working();
        }

        let monitor = Monitor::new();
        let monitor_thread = monitor.spawn();
        let engine = Arc::new(Engine {
            office: constructed.metadata,
            teams,
            monitor,
            router: ThreadLocalRouter::new(),
            escalation,
        });
        let inner = Arc::new(FloorInner {
            engine,
            next_process: AtomicU64::new(1),
            open: AtomicBool::new(true),
        });

        // Give every source its bootstrap hook now the office is live.
        let invoker: Arc<dyn WorkInvoker> = inner.clone();
        for source in &constructed.sources {
            if let Err(error) = source.source.start(ExecuteContext::new(invoker.clone())) {
                tracing::error!(
                    source = %source.name,
                    error = %format!("{:#}", error),
                    "managed object source failed to start"
                );
            }
        }

        tracing::info!(office = %inner.engine.office.name, "floor open");
        Some(Floor {
            inner,
            monitor_thread: Some(monitor_thread),
        })
    }

    /// Open a floor with the default logging escalation handler.
    ///
    /// Construction issues are rendered into the error.
    pub fn open(config: &FloorConfig) -> Result<Floor, FloorError> {
        Self::open_with(config, Arc::new(LoggingEscalationHandler))
    }

    /// Open a floor with a custom last-resort escalation handler.
    pub fn open_with(
        config: &FloorConfig,
        escalation: Arc<dyn EscalationHandler>,
    ) -> Result<Floor, FloorError> {
        let mut issues = Issues::new();
        Self::open_reporting(config, &mut issues, escalation).ok_or_else(|| {
            FloorError::Configuration(format!(
                "office construction reported issues:\n{}",
                issues.render()
            ))
        })
    }

    /// The office name this floor runs.
    pub fn office_name(&self) -> &str {
        &self.inner.engine.office.name
    }

    /// Invoke a work by name, starting a new process.
    ///
    /// The returned handle observes completion; [`ProcessHandle::wait`]
    /// also services jobs routed back by thread-local-aware teams.
    pub fn invoke_work(
        &self,
        work: &str,
        argument: Option<Box<dyn Any + Send>>,
    ) -> Result<ProcessHandle, FloorError> {
        let slot = self.inner.work_slot(work)?;
        let (process, jobs) = self.inner.start_process(slot, argument, true);
        Ok(ProcessHandle {
            router: self.inner.engine.router.clone(),
            process,
            jobs,
        })
    }

    /// Close the floor: stop accepting invocations, stop teams in reverse
    /// start order, stop the monitor.
    pub fn close(mut self) {
        self.close_inner();
    }

    fn close_inner(&mut self) {
        if !self.inner.open.swap(false, Ordering::SeqCst) {
            return;
        }
        for unit in self.inner.engine.teams.iter().rev() {
            unit.team.stop_working();
            tracing::debug!(team = %unit.name, "team stopped");
        }
        self.inner.engine.monitor.shutdown();
        if let Some(handle) = self.monitor_thread.take() {
            let _ = handle.join();
        }
        tracing::info!(office = %self.inner.engine.office.name, "floor closed");
    }
}

impl Drop for Floor {
    fn drop(&mut self) {
        self.close_inner();
    }
}

/// Handle to one running process.
pub struct ProcessHandle {
    router: Arc<ThreadLocalRouter>,
    process: Arc<ProcessState>,
    jobs: Option<Receiver<Job>>,
}

impl ProcessHandle {
    /// The process identifier.
    pub fn id(&self) -> ProcessId {
        self.process.id
    }

    /// Whether the process has completed.
    pub fn is_complete(&self) -> bool {
        self.process.is_done()
    }

    /// Block until the process completes. Surfaces the process failure if
    /// an escalation went unhandled.
    pub fn wait(&self) -> Result<(), FloorError> {
        self.service(None)
    }

    /// Block until the process completes or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), FloorError> {
        self.service(Some(timeout))
    }

    fn service(&self, timeout: Option<Duration>) -> Result<(), FloorError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        if let Some(jobs) = &self.jobs {
            // Run thread-local-aware jobs of this process here while
            // waiting, as the thread that initiated the process.
            loop {
                if self.process.is_done() {
                    break;
                }
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return Err(FloorError::WaitTimeout(
                            timeout.unwrap_or(Duration::ZERO),
                        ));
                    }
                }
                match jobs.recv_timeout(Duration::from_millis(10)) {
                    Ok(job) => job.run(),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        }
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        match self.process.wait_done(remaining) {
            Err(FloorError::WaitTimeout(_)) => Err(FloorError::WaitTimeout(
                timeout.unwrap_or(Duration::ZERO),
            )),
            other => other,
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.router.unregister(self.process.id);
    }
}
