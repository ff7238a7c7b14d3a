//! Team construction: configuration to a started-ready worker pool.

use crate::config::TeamConfig;
use crate::construct::check_name;
use crate::issues::{AssetType, Issues};
use crate::source::team::{Team, TeamSourceContext};
use std::sync::Arc;
use tracing::debug;

/// A validated, created team with its management metadata.
pub struct ConstructedTeam {
    /// Team name.
    pub name: String,
    /// The created worker pool.
    pub team: Arc<dyn Team>,
    thread_local_aware: bool,
}

impl ConstructedTeam {
    /// Whether dispatch must honour thread-local awareness for this team:
    /// the created team requested it.
    pub fn requires_thread_local_awareness(&self) -> bool {
        self.thread_local_aware
    }
}

impl std::fmt::Debug for ConstructedTeam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructedTeam")
            .field("name", &self.name)
            .field("thread_local_aware", &self.thread_local_aware)
            .finish()
    }
}

/// Construct one team from its configuration.
///
/// Validates the name and size, checks required source properties, and
/// creates the team. Any source error is caught and reported; `None` means
/// an issue has been reported and this team is skipped, leaving sibling
/// teams unaffected.
pub fn construct_team(config: &TeamConfig, issues: &mut Issues) -> Option<ConstructedTeam> {
    if !check_name(&config.name, AssetType::Team, issues) {
        return None;
    }

    if config.size < 0 {
        issues.add_issue(
            AssetType::Team,
            &config.name,
            format!("size must not be negative (configured {})", config.size),
        );
        return None;
    }

    for spec in config.source.specification() {
        if spec.required && config.properties.get(&spec.name).is_none() {
            issues.add_issue(
                AssetType::Team,
                &config.name,
                format!("missing required property '{}'", spec.name),
            );
            return None;
        }
    }

    let context = TeamSourceContext {
        name: &config.name,
        size: config.size as usize,
        properties: &config.properties,
    };
    let team = match config.source.create_team(context) {
        Ok(team) => team,
        Err(e) => {
            issues.add_issue_with_cause(
                AssetType::Team,
                &config.name,
                "team source failed to create team",
                &e,
            );
            return None;
        }
    };

    let thread_local_aware = team.requests_thread_local_awareness();
    debug!(team = %config.name, thread_local_aware, "team constructed");

    Some(ConstructedTeam {
        name: config.name.clone(),
        team,
        thread_local_aware,
    })
}
