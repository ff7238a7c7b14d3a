//! Office construction: the top of the construction phase.
//!
//! Drives every other construct function over a [`FloorConfig`] and
//! assembles the [`OfficeMetadata`] the kernel runs against. Per the
//! phase-wide contract, every problem lands in the issue sink and the
//! remaining configuration keeps constructing; the caller refuses to open
//! a floor whose sink is non-empty.

use crate::config::FloorConfig;
use crate::construct::bound::all_bound;
use crate::construct::work::{FunctionDirectory, WorkScaffold, resolve_escalations};
use crate::construct::{
    ConstructedObjectSource, ConstructedTeam, ScopeResolver, check_name, construct_bound_objects,
    construct_object_source, construct_team,
};
use crate::issues::{AssetType, Issues};
use crate::metadata::{ManagedObjectScope, OfficeMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a floor needs to run: compiled office metadata plus the
/// created teams, in team-slot order.
pub struct ConstructedOffice {
    /// Compiled metadata the kernel dispatches through.
    pub metadata: Arc<OfficeMetadata>,
    /// Created teams; function metadata's team slots index this table.
    pub teams: Vec<ConstructedTeam>,
    /// The constructed sources, for post-open `start` bootstrapping.
    pub sources: Vec<Arc<ConstructedObjectSource>>,
}

impl std::fmt::Debug for ConstructedOffice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructedOffice")
            .field("office", &self.metadata.name)
            .field("teams", &self.teams.len())
            .field("works", &self.metadata.works.len())
            .finish()
    }
}

/// Construct the full office from a floor configuration.
///
/// Returns `None` only when the office as a whole cannot exist (bad office
/// name, no usable team). Lesser problems are reported and construction
/// continues, so one run surfaces every issue at once.
pub fn construct_office(config: &FloorConfig, issues: &mut Issues) -> Option<ConstructedOffice> {
    if !check_name(&config.office_name, AssetType::Office, issues) {
        return None;
    }

    // Teams. Function dispatch is impossible without at least one.
    let mut teams = Vec::new();
    let mut team_slots: HashMap<String, usize> = HashMap::new();
    for team_config in &config.teams {
        if team_slots.contains_key(&team_config.name) {
            issues.add_issue(
                AssetType::Team,
                &team_config.name,
                "duplicate team name",
            );
            continue;
        }
        if let Some(team) = construct_team(team_config, issues) {
            team_slots.insert(team.name.clone(), teams.len());
            teams.push(team);
        }
    }
    if teams.is_empty() {
        issues.add_issue(
            AssetType::Office,
            &config.office_name,
            "an office needs at least one team",
        );
        return None;
    }

    let default_team = match &config.default_team {
        Some(name) => match team_slots.get(name) {
            Some(slot) => *slot,
            None => {
                issues.add_issue(
                    AssetType::Office,
                    &config.office_name,
                    format!("default team '{}' is not a configured team", name),
                );
                0
            }
        },
        None => 0,
    };

    // Managed object sources: one instance per configured name.
    let mut sources: HashMap<String, ConstructedObjectSource> = HashMap::new();
    for source_config in &config.managed_object_sources {
        if sources.contains_key(&source_config.name) {
            issues.add_issue(
                AssetType::ManagedObject,
                &source_config.name,
                "duplicate managed object source name",
            );
            continue;
        }
        if let Some(source) = construct_object_source(source_config, issues) {
            sources.insert(source.name.clone(), source);
        }
    }

    // Process and thread scope bindings.
    let process_bindings = construct_bound_objects(
        ManagedObjectScope::Process,
        &all_bound(&config.process_objects),
        &sources,
        None,
        issues,
    );
    let process_resolver = ScopeResolver::root(&process_bindings.names);
    let thread_bindings = construct_bound_objects(
        ManagedObjectScope::Thread,
        &all_bound(&config.thread_objects),
        &sources,
        Some(&process_resolver),
        issues,
    );
    let thread_resolver = ScopeResolver::nested(&thread_bindings.names, &process_resolver);

    // Works, pass A.
    let mut scaffolds = Vec::new();
    let mut seen_works: Vec<String> = Vec::new();
    for work_config in &config.works {
        if seen_works.contains(&work_config.name) {
            issues.add_issue(AssetType::Work, &work_config.name, "duplicate work name");
            continue;
        }
        if let Some(scaffold) = WorkScaffold::build(
            work_config,
            &sources,
            &thread_resolver,
            &process_bindings.objects,
            &thread_bindings.objects,
            &team_slots,
            default_team,
            issues,
        ) {
            seen_works.push(scaffold.name().to_string());
            scaffolds.push(scaffold);
        }
    }

    // Works, pass B: resolve cross-function references.
    let directory = FunctionDirectory::new(
        scaffolds
            .iter()
            .map(|s| (s.name().to_string(), s.function_names()))
            .collect(),
    );
    let works: Vec<_> = scaffolds
        .into_iter()
        .enumerate()
        .map(|(slot, scaffold)| scaffold.finish(slot, &directory, issues).work_metadata())
        .collect();

    // A source's declared flow keys are its bootstrap entry points; each
    // must name a configured work.
    for source in sources.values() {
        for flow in &source.meta.flows {
            if !works.iter().any(|w| w.name == flow.label) {
                issues.add_issue(
                    AssetType::ManagedObject,
                    &source.name,
                    format!(
                        "declared flow '{}' does not name a configured work",
                        flow.label
                    ),
                );
            }
        }
    }

    // Office-level escalations must use qualified work.function handlers.
    let escalations = resolve_escalations(
        &config.escalations,
        None,
        &directory,
        AssetType::Office,
        &config.office_name,
        issues,
    );

    let metadata = Arc::new(OfficeMetadata {
        name: config.office_name.clone(),
        process_objects: process_bindings.objects,
        thread_objects: thread_bindings.objects,
        works,
        escalations,
        default_team,
    });

    tracing::info!(
        office = %metadata.name,
        teams = teams.len(),
        works = metadata.works.len(),
        issues = issues.len(),
        "office constructed"
    );

    let sources = sources
        .into_values()
        .map(Arc::new)
        .collect();

    Some(ConstructedOffice {
        metadata,
        teams,
        sources,
    })
}
