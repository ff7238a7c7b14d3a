//! Team executing jobs on the assigning thread.

use crate::source::team::{Job, Team, TeamSource, TeamSourceContext};
use std::sync::Arc;

/// Runs each assigned job immediately on the caller's thread.
///
/// No workers, no queue. Useful for tests and for embeddings that want the
/// kernel's dispatch semantics without extra threads. Note that a parallel
/// flow dispatched to a passive team runs before `assign_job` returns, so
/// "parallel" degenerates to eager execution.
#[derive(Debug, Default)]
pub struct PassiveTeam;

impl Team for PassiveTeam {
    fn assign_job(&self, job: Job) {
        job.run();
    }
}

/// Source for [`PassiveTeam`]. Ignores size and properties.
#[derive(Debug, Default)]
pub struct PassiveTeamSource;

impl TeamSource for PassiveTeamSource {
    fn create_team(&self, _context: TeamSourceContext<'_>) -> anyhow::Result<Arc<dyn Team>> {
        Ok(Arc::new(PassiveTeam))
    }
}
