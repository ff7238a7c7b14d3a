//! The execution kernel.
//!
//! Everything below dispatches purely through the indices compiled during
//! construction; configured names appear only in log lines and failure
//! messages. The kernel owns no threads of its own beyond the deadline
//! monitor; all function execution happens on team workers (or on threads
//! servicing thread-local-aware dispatch).

pub(crate) mod container;
pub(crate) mod job;
pub(crate) mod local;
pub(crate) mod monitor;
pub(crate) mod process;

use crate::floor::EscalationHandler;
use crate::kernel::local::ThreadLocalRouter;
use crate::kernel::monitor::Monitor;
use crate::metadata::OfficeMetadata;
use crate::source::team::{Job, Team};
use std::sync::Arc;

#[cfg(test)]
mod tests;

/// One started team with its dispatch mode.
pub(crate) struct TeamUnit {
    pub name: String,
    pub team: Arc<dyn Team>,
    pub thread_local: bool,
}

/// Shared runtime of one open floor.
pub(crate) struct Engine {
    pub office: Arc<OfficeMetadata>,
    pub teams: Vec<TeamUnit>,
    pub monitor: Arc<Monitor>,
    pub router: Arc<ThreadLocalRouter>,
    pub escalation: Arc<dyn EscalationHandler>,
}

impl Engine {
    /// Dispatch a job to the team at `slot`, honouring thread-local
    /// awareness where the team requested it.
    pub fn assign(&self, slot: usize, job: Job) {
        let unit = &self.teams[slot];
        if unit.thread_local {
            self.router.assign(job, &unit.team);
        } else {
            unit.team.assign_job(job);
        }
    }
}
