//! Built-in team implementations.
//!
//! Three worker-pool strategies cover the common cases: [`PassiveTeam`]
//! runs jobs on the assigning caller's thread (tests, single-threaded
//! embedding), [`WorkerPerJobTeam`] spawns a short-lived thread per job,
//! and [`FixedTeam`] runs a fixed set of workers over a job channel.
//! Anything else comes in through a custom [`crate::source::team::TeamSource`].

mod fixed;
mod passive;
mod worker_per_job;

pub use fixed::{FixedTeam, FixedTeamSource};
pub use passive::{PassiveTeam, PassiveTeamSource};
pub use worker_per_job::{WorkerPerJobTeam, WorkerPerJobTeamSource};
