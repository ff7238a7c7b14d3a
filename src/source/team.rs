//! Team contract: a named, independently managed worker pool.
//!
//! A team executes [`Job`]s handed to it by the kernel. The kernel never
//! knows what sits behind [`Team::assign_job`] — one thread, N threads, or
//! the caller's own thread for tests.

use crate::properties::PropertyList;
use crate::source::PropertySpec;
use std::sync::Arc;

/// Identifier of one logical execution (process) on a floor.
///
/// Carried by every [`Job`] so thread-local-aware teams can route jobs of a
/// process back to the thread that initiated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub(crate) u64);

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "process-{}", self.0)
    }
}

/// A unit of executable work handed to a team.
///
/// Jobs are one-shot: a team runs each assigned job exactly once on one of
/// its workers. A parked continuation re-enters the team as a fresh job.
pub struct Job {
    process: ProcessId,
    run: Box<dyn FnOnce() + Send>,
}

impl Job {
    /// Create a job belonging to the given process.
    pub fn new(process: ProcessId, run: impl FnOnce() + Send + 'static) -> Self {
        Self {
            process,
            run: Box::new(run),
        }
    }

    /// The process this job executes on behalf of.
    pub fn process(&self) -> ProcessId {
        self.process
    }

    /// Execute the job on the current thread, consuming it.
    pub fn run(self) {
        (self.run)();
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("process", &self.process).finish()
    }
}

/// A worker pool executing assigned jobs.
///
/// `start_working` is called once before any job is assigned;
/// `stop_working` drains already-assigned jobs and stops the workers.
/// Both default to no-ops for pools with no worker lifecycle.
pub trait Team: Send + Sync {
    /// Bring workers up. Called once at floor open.
    fn start_working(&self) {}

    /// Assign one job for execution. Must not block on the job completing.
    fn assign_job(&self, job: Job);

    /// Drain assigned jobs and stop workers. Called once at floor close.
    fn stop_working(&self) {}

    /// Whether this team requests thread-local awareness: jobs of a process
    /// should run on the thread that initiated the process whenever that
    /// thread is available. Honoured by the kernel's dispatch wrapper.
    fn requests_thread_local_awareness(&self) -> bool {
        false
    }
}

/// Configuration handed to a [`TeamSource`] when creating its team.
#[derive(Debug)]
pub struct TeamSourceContext<'a> {
    /// Configured team name.
    pub name: &'a str,
    /// Configured size hint (worker count). Zero means "source decides".
    pub size: usize,
    /// Source properties.
    pub properties: &'a PropertyList,
}

/// Factory for one category of team.
pub trait TeamSource: Send + Sync {
    /// Properties this source understands.
    fn specification(&self) -> Vec<PropertySpec> {
        Vec::new()
    }

    /// Create the team. Errors are caught at the construction boundary and
    /// converted to reported issues.
    fn create_team(&self, context: TeamSourceContext<'_>) -> anyhow::Result<Arc<dyn Team>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct InlineTeam;

    impl Team for InlineTeam {
        fn assign_job(&self, job: Job) {
            job.run();
        }
    }

    #[test]
    fn job_runs_once_with_process_identity() {
        static RAN: AtomicUsize = AtomicUsize::new(0);
        let job = Job::new(ProcessId(7), || {
            RAN.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(job.process(), ProcessId(7));

        InlineTeam.assign_job(job);
        assert_eq!(RAN.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn awareness_defaults_off() {
        assert!(!InlineTeam.requests_thread_local_awareness());
    }
}
