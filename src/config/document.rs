//! Declarative YAML configuration.
//!
//! A [`FloorDocument`] carries the structural configuration; code artifacts
//! (team sources, managed object sources, administrators, function bodies)
//! are looked up by name in a [`SourceRegistry`]. Unknown names are
//! reported as issues and the item is skipped, same as any other
//! construction problem.
//!
//! YAML escalation entries are catch-all only: matching a concrete error
//! type requires a typed matcher, which only the programmatic API can
//! supply.

use crate::config::model::{
    AdministratorConfig, BoundManagedObjectConfig, DependencyMappingConfig, DutyConfig,
    EscalationConfig, FloorConfig, FlowConfig, FunctionConfig, ManagedObjectSourceConfig,
    ScopeObjectConfig, TeamConfig, WorkConfig,
};
use crate::issues::{AssetType, Issues};
use crate::properties::PropertyList;
use crate::source::admin::AdministratorSource;
use crate::source::managed_object::ManagedObjectSource;
use crate::source::team::TeamSource;
use crate::source::work::ManagedFunction;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of code artifacts a YAML document may reference by name.
#[derive(Default)]
pub struct SourceRegistry {
    team_sources: HashMap<String, Arc<dyn TeamSource>>,
    object_sources: HashMap<String, Arc<dyn Fn() -> Box<dyn ManagedObjectSource> + Send + Sync>>,
    administrator_sources:
        HashMap<String, Arc<dyn Fn() -> Box<dyn AdministratorSource> + Send + Sync>>,
    functions: HashMap<String, Arc<dyn ManagedFunction>>,
}

impl SourceRegistry {
    /// Registry preloaded with the built-in team sources
    /// (`passive`, `worker_per_job`, `fixed`).
    pub fn with_builtin_teams() -> Self {
        let mut registry = Self::default();
        registry.register_team_source("passive", Arc::new(crate::teams::PassiveTeamSource));
        registry.register_team_source(
            "worker_per_job",
            Arc::new(crate::teams::WorkerPerJobTeamSource),
        );
        registry.register_team_source("fixed", Arc::new(crate::teams::FixedTeamSource));
        registry
    }

    /// Register a team source under a name.
    pub fn register_team_source(&mut self, name: impl Into<String>, source: Arc<dyn TeamSource>) {
        self.team_sources.insert(name.into(), source);
    }

    /// Register a managed object source factory under a name.
    pub fn register_object_source<S, F>(&mut self, name: impl Into<String>, factory: F)
    where
        S: ManagedObjectSource + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.object_sources
            .insert(name.into(), Arc::new(move || Box::new(factory())));
    }

    /// Register an administrator source factory under a name.
    pub fn register_administrator_source<S, F>(&mut self, name: impl Into<String>, factory: F)
    where
        S: AdministratorSource + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.administrator_sources
            .insert(name.into(), Arc::new(move || Box::new(factory())));
    }

    /// Register a function body under a name.
    pub fn register_function(&mut self, name: impl Into<String>, body: Arc<dyn ManagedFunction>) {
        self.functions.insert(name.into(), body);
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PropertyDoc {
    name: String,
    value: String,
}

fn properties(docs: &[PropertyDoc]) -> PropertyList {
    docs.iter()
        .map(|p| (p.name.clone(), p.value.clone()))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
struct TeamDoc {
    name: String,
    source: String,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    properties: Vec<PropertyDoc>,
}

#[derive(Debug, Clone, Deserialize)]
struct ObjectSourceDoc {
    name: String,
    source: String,
    #[serde(default)]
    timeout_ms: i64,
    #[serde(default)]
    properties: Vec<PropertyDoc>,
}

#[derive(Debug, Clone, Deserialize)]
struct DependencyDoc {
    key: String,
    bound_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BoundObjectDoc {
    bound_name: String,
    source_name: String,
    #[serde(default)]
    dependencies: Vec<DependencyDoc>,
}

impl BoundObjectDoc {
    fn into_config(self) -> BoundManagedObjectConfig {
        BoundManagedObjectConfig {
            bound_name: self.bound_name,
            source_name: self.source_name,
            dependencies: self
                .dependencies
                .into_iter()
                .map(|d| DependencyMappingConfig {
                    key: d.key,
                    bound_name: d.bound_name,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ScopeObjectDoc {
    Bound(BoundObjectDoc),
    Linked { name: String, target: String },
}

#[derive(Debug, Clone, Deserialize)]
struct AdministratorDoc {
    name: String,
    source: String,
    #[serde(default)]
    properties: Vec<PropertyDoc>,
    #[serde(default)]
    administered: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FlowDoc {
    target: String,
    #[serde(default)]
    parallel: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct DutyDoc {
    administrator: String,
    duty: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct EscalationDoc {
    handler: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FunctionDoc {
    name: String,
    body: String,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    bound_objects: Vec<BoundObjectDoc>,
    #[serde(default)]
    objects: Vec<String>,
    #[serde(default)]
    flows: Vec<FlowDoc>,
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    pre_duties: Vec<DutyDoc>,
    #[serde(default)]
    post_duties: Vec<DutyDoc>,
    #[serde(default)]
    escalations: Vec<EscalationDoc>,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkDoc {
    name: String,
    #[serde(default)]
    objects: Vec<ScopeObjectDoc>,
    #[serde(default)]
    administrators: Vec<AdministratorDoc>,
    #[serde(default)]
    functions: Vec<FunctionDoc>,
    #[serde(default)]
    initial_function: Option<String>,
    #[serde(default)]
    escalations: Vec<EscalationDoc>,
}

/// Top-level YAML configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct FloorDocument {
    /// Office name.
    pub office: String,
    #[serde(default)]
    default_team: Option<String>,
    #[serde(default)]
    teams: Vec<TeamDoc>,
    #[serde(default)]
    managed_object_sources: Vec<ObjectSourceDoc>,
    #[serde(default)]
    process_objects: Vec<BoundObjectDoc>,
    #[serde(default)]
    thread_objects: Vec<BoundObjectDoc>,
    #[serde(default)]
    works: Vec<WorkDoc>,
    #[serde(default)]
    escalations: Vec<EscalationDoc>,
}

fn catch_all(docs: Vec<EscalationDoc>) -> Vec<EscalationConfig> {
    docs.into_iter()
        .map(|d| EscalationConfig::any(d.handler))
        .collect()
}

impl FloorDocument {
    /// Parse a document from YAML text.
    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Resolve registry references and produce a [`FloorConfig`].
    ///
    /// Items naming an unregistered artifact are reported and skipped.
    pub fn into_config(self, registry: &SourceRegistry, issues: &mut Issues) -> FloorConfig {
        let mut config = FloorConfig::new(self.office);
        config.default_team = self.default_team;

        for team in self.teams {
            match registry.team_sources.get(&team.source) {
                Some(source) => {
                    config.add_team(TeamConfig {
                        name: team.name,
                        size: team.size,
                        source: source.clone(),
                        properties: properties(&team.properties),
                    });
                }
                None => issues.add_issue(
                    AssetType::Team,
                    team.name,
                    format!("unregistered team source '{}'", team.source),
                ),
            }
        }

        for source_doc in self.managed_object_sources {
            match registry.object_sources.get(&source_doc.source) {
                Some(factory) => {
                    config.add_managed_object_source(ManagedObjectSourceConfig {
                        name: source_doc.name,
                        factory: factory.clone(),
                        timeout_ms: source_doc.timeout_ms,
                        properties: properties(&source_doc.properties),
                        pool: None,
                    });
                }
                None => issues.add_issue(
                    AssetType::ManagedObject,
                    source_doc.name,
                    format!("unregistered managed object source '{}'", source_doc.source),
                ),
            }
        }

        for bound in self.process_objects {
            config.bind_process_object(bound.into_config());
        }
        for bound in self.thread_objects {
            config.bind_thread_object(bound.into_config());
        }

        for work_doc in self.works {
            let mut work = WorkConfig::new(work_doc.name.clone());
            work.initial_function = work_doc.initial_function;
            work.escalations = catch_all(work_doc.escalations);

            for entry in work_doc.objects {
                work.objects.push(match entry {
                    ScopeObjectDoc::Bound(b) => ScopeObjectConfig::Bound(b.into_config()),
                    ScopeObjectDoc::Linked { name, target } => {
                        ScopeObjectConfig::Linked { name, target }
                    }
                });
            }

            for admin_doc in work_doc.administrators {
                match registry.administrator_sources.get(&admin_doc.source) {
                    Some(factory) => work.administrators.push(AdministratorConfig {
                        name: admin_doc.name,
                        factory: factory.clone(),
                        properties: properties(&admin_doc.properties),
                        administered: admin_doc.administered,
                    }),
                    None => issues.add_issue(
                        AssetType::Administrator,
                        admin_doc.name,
                        format!("unregistered administrator source '{}'", admin_doc.source),
                    ),
                }
            }

            for function_doc in work_doc.functions {
                let Some(body) = registry.functions.get(&function_doc.body) else {
                    issues.add_issue(
                        AssetType::Function,
                        format!("{}.{}", work_doc.name, function_doc.name),
                        format!("unregistered function body '{}'", function_doc.body),
                    );
                    continue;
                };
                work.functions.push(FunctionConfig {
                    name: function_doc.name,
                    team: function_doc.team,
                    body: Some(body.clone()),
                    bound_objects: function_doc
                        .bound_objects
                        .into_iter()
                        .map(BoundObjectDoc::into_config)
                        .collect(),
                    objects: function_doc.objects,
                    flows: function_doc
                        .flows
                        .into_iter()
                        .map(|f| FlowConfig {
                            target: f.target,
                            parallel: f.parallel,
                        })
                        .collect(),
                    next: function_doc.next,
                    pre_duties: function_doc
                        .pre_duties
                        .into_iter()
                        .map(|d| DutyConfig {
                            administrator: d.administrator,
                            duty: d.duty,
                        })
                        .collect(),
                    post_duties: function_doc
                        .post_duties
                        .into_iter()
                        .map(|d| DutyConfig {
                            administrator: d.administrator,
                            duty: d.duty,
                        })
                        .collect(),
                    escalations: catch_all(function_doc.escalations),
                });
            }

            config.add_work(work);
        }

        config.escalations = catch_all(self.escalations);
        config
    }
}

/// Read a YAML configuration file and resolve it against the registry.
pub fn load_yaml_file(
    path: &std::path::Path,
    registry: &SourceRegistry,
    issues: &mut Issues,
) -> Option<FloorConfig> {
    match std::fs::read_to_string(path) {
        Ok(yaml) => load_yaml_config(&yaml, registry, issues),
        Err(e) => {
            issues.add_issue(
                AssetType::Floor,
                "configuration",
                format!("cannot read '{}': {}", path.display(), e),
            );
            None
        }
    }
}

/// Parse YAML text and resolve it against the registry in one step.
pub fn load_yaml_config(
    yaml: &str,
    registry: &SourceRegistry,
    issues: &mut Issues,
) -> Option<FloorConfig> {
    match FloorDocument::parse(yaml) {
        Ok(document) => Some(document.into_config(registry, issues)),
        Err(e) => {
            issues.add_issue(
                AssetType::Floor,
                "configuration",
                format!("invalid YAML configuration: {}", e),
            );
            None
        }
    }
}
