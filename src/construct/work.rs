//! Work construction.
//!
//! Runs in two passes. Pass A ([`WorkScaffold::build`]) validates one work
//! in isolation: scope bindings, administrators, function bodies, teams,
//! object usage and duties. Function-to-function references (flows, next
//! continuations, escalation handlers) may point forward or across works,
//! so they stay as names until every work's function table exists; pass B
//! ([`WorkScaffold::finish`]) resolves them against the full directory and
//! produces the immutable [`WorkMetadata`].

use crate::config::{DutyConfig, EscalationConfig, FunctionConfig, ScopeObjectConfig, WorkConfig};
use crate::construct::bound::all_bound;
use crate::construct::managed_object_source::ConstructedObjectSource;
use crate::construct::{
    ObjectTables, ScopeResolver, check_name, construct_administrator, construct_bound_objects,
};
use crate::issues::{AssetType, Issues};
use crate::metadata::{
    AdministratorMetadata, DutyRef, EscalationEntry, EscalationTable, FlowMetadata, FunctionMetadata,
    FunctionRef, InstigationStrategy, ManagedObjectIndex, ManagedObjectMetadata, ManagedObjectScope,
    WorkMetadata,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Office-wide directory of function names, built once every work's pass A
/// has completed.
pub(crate) struct FunctionDirectory {
    // Work name and its function names in slot order, by work slot.
    works: Vec<(String, Vec<String>)>,
}

impl FunctionDirectory {
    pub fn new(works: Vec<(String, Vec<String>)>) -> Self {
        Self { works }
    }

    /// Resolve a function target: `"function"` within `current_work`, or
    /// qualified `"work.function"`. Unqualified targets need a current
    /// work; office-level escalations have none.
    pub fn resolve(&self, target: &str, current_work: Option<usize>) -> Option<FunctionRef> {
        let (work_slot, function_name) = match target.split_once('.') {
            Some((work_name, function_name)) => {
                let slot = self.works.iter().position(|(n, _)| n == work_name)?;
                (slot, function_name)
            }
            None => (current_work?, target),
        };
        let function = self.works[work_slot]
            .1
            .iter()
            .position(|n| n == function_name)?;
        Some(FunctionRef {
            work: work_slot,
            function,
        })
    }
}

// Per-function output of pass A. References to other functions are still
// names here.
struct FunctionScaffold {
    name: String,
    team: usize,
    body: Arc<dyn crate::source::work::ManagedFunction>,
    function_objects: Vec<Arc<ManagedObjectMetadata>>,
    object_indexes: Vec<ManagedObjectIndex>,
    required_objects: Vec<ManagedObjectIndex>,
    flows: Vec<(String, InstigationStrategy)>,
    next: Option<String>,
    pre_duties: Vec<DutyRef>,
    post_duties: Vec<DutyRef>,
    escalations: Vec<EscalationConfig>,
}

/// One work after pass A: internally consistent, external function
/// references unresolved.
pub struct WorkScaffold {
    name: String,
    work_objects: Vec<Arc<ManagedObjectMetadata>>,
    administrators: Vec<Arc<AdministratorMetadata>>,
    functions: Vec<FunctionScaffold>,
    initial_function: usize,
    escalations: Vec<EscalationConfig>,
}

/// A fully constructed work. The metadata is built once and shared.
pub struct ConstructedWork {
    metadata: Arc<WorkMetadata>,
}

impl ConstructedWork {
    /// Work name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The compiled work metadata. Every call returns the same allocation.
    pub fn work_metadata(&self) -> Arc<WorkMetadata> {
        self.metadata.clone()
    }
}

impl WorkScaffold {
    /// Pass A: validate and bind everything local to one work.
    ///
    /// `enclosing` resolves thread and process scope names;
    /// `process_objects` / `thread_objects` are those scopes' metadata
    /// tables. Returns `None` with issues reported when the work as a
    /// whole is unusable; individually bad functions are dropped while
    /// their siblings survive.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build(
        config: &WorkConfig,
        sources: &HashMap<String, ConstructedObjectSource>,
        enclosing: &ScopeResolver<'_>,
        process_objects: &[Arc<ManagedObjectMetadata>],
        thread_objects: &[Arc<ManagedObjectMetadata>],
        team_slots: &HashMap<String, usize>,
        default_team: usize,
        issues: &mut Issues,
    ) -> Option<WorkScaffold> {
        if !check_name(&config.name, AssetType::Work, issues) {
            return None;
        }
        if config.functions.is_empty() {
            issues.add_issue(AssetType::Work, &config.name, "work declares no functions");
            return None;
        }

        let bindings = construct_bound_objects(
            ManagedObjectScope::Work,
            &config.objects,
            sources,
            Some(enclosing),
            issues,
        );
        let work_resolver = ScopeResolver::nested(&bindings.names, enclosing);
        let work_tables = ObjectTables {
            process: process_objects,
            thread: thread_objects,
            work: &bindings.objects,
            function: &[],
        };

        let mut administrators = Vec::new();
        let mut administrator_slots: HashMap<String, usize> = HashMap::new();
        for admin_config in &config.administrators {
            if administrator_slots.contains_key(&admin_config.name) {
                issues.add_issue(
                    AssetType::Administrator,
                    &admin_config.name,
                    format!("duplicate administrator in work '{}'", config.name),
                );
                continue;
            }
            if let Some(admin) =
                construct_administrator(admin_config, &work_resolver, &work_tables, issues)
            {
                administrator_slots.insert(admin.bound_name.clone(), administrators.len());
                administrators.push(admin);
            }
        }

        let mut functions = Vec::new();
        let mut seen_functions: Vec<String> = Vec::new();
        for function_config in &config.functions {
            if seen_functions.contains(&function_config.name) {
                issues.add_issue(
                    AssetType::Function,
                    &function_config.name,
                    format!("duplicate function in work '{}'", config.name),
                );
                continue;
            }
            if let Some(function) = build_function(
                function_config,
                &config.name,
                sources,
                &work_resolver,
                process_objects,
                thread_objects,
                &bindings.objects,
                &administrators,
                &administrator_slots,
                team_slots,
                default_team,
                issues,
            ) {
                seen_functions.push(function.name.clone());
                functions.push(function);
            }
        }
        if functions.is_empty() {
            issues.add_issue(
                AssetType::Work,
                &config.name,
                "no function of the work could be constructed",
            );
            return None;
        }

        let initial_function = match &config.initial_function {
            Some(name) => match functions.iter().position(|f| &f.name == name) {
                Some(slot) => slot,
                None => {
                    issues.add_issue(
                        AssetType::Work,
                        &config.name,
                        format!("initial function '{}' is not a function of this work", name),
                    );
                    return None;
                }
            },
            None => 0,
        };

        Some(WorkScaffold {
            name: config.name.clone(),
            work_objects: bindings.objects,
            administrators,
            functions,
            initial_function,
            escalations: config.escalations.clone(),
        })
    }

    /// Work name, available between passes.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Function names in slot order, for the directory.
    pub(crate) fn function_names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name.clone()).collect()
    }

    /// Pass B: resolve cross-function references and seal the metadata.
    ///
    /// Invalid flow, next or escalation entries are dropped individually
    /// with a reported issue; an office carrying issues is never opened,
    /// so partially resolved metadata cannot run.
    pub(crate) fn finish(
        self,
        self_slot: usize,
        directory: &FunctionDirectory,
        issues: &mut Issues,
    ) -> ConstructedWork {
        let mut functions = Vec::with_capacity(self.functions.len());
        for scaffold in self.functions {
            let mut flows = Vec::with_capacity(scaffold.flows.len());
            for (target, strategy) in scaffold.flows {
                match directory.resolve(&target, Some(self_slot)) {
                    Some(target) => flows.push(FlowMetadata { target, strategy }),
                    None => issues.add_issue(
                        AssetType::Function,
                        &scaffold.name,
                        format!("flow target '{}' does not name a function", target),
                    ),
                }
            }

            let next = match &scaffold.next {
                Some(target) => match directory.resolve(target, Some(self_slot)) {
                    Some(target) => Some(target),
                    None => {
                        issues.add_issue(
                            AssetType::Function,
                            &scaffold.name,
                            format!("next function '{}' does not name a function", target),
                        );
                        None
                    }
                },
                None => None,
            };

            let escalations = resolve_escalations(
                &scaffold.escalations,
                Some(self_slot),
                directory,
                AssetType::Function,
                &scaffold.name,
                issues,
            );

            functions.push(Arc::new(FunctionMetadata {
                name: scaffold.name,
                team: scaffold.team,
                body: scaffold.body,
                function_objects: scaffold.function_objects,
                object_indexes: scaffold.object_indexes,
                required_objects: scaffold.required_objects,
                flows,
                next,
                pre_duties: scaffold.pre_duties,
                post_duties: scaffold.post_duties,
                escalations,
            }));
        }

        let escalations = resolve_escalations(
            &self.escalations,
            Some(self_slot),
            directory,
            AssetType::Work,
            &self.name,
            issues,
        );

        ConstructedWork {
            metadata: Arc::new(WorkMetadata {
                name: self.name,
                work_objects: self.work_objects,
                administrators: self.administrators,
                functions,
                initial_function: self.initial_function,
                escalations,
            }),
        }
    }
}

/// Resolve escalation handler names into an [`EscalationTable`].
pub(crate) fn resolve_escalations(
    configs: &[EscalationConfig],
    current_work: Option<usize>,
    directory: &FunctionDirectory,
    asset: AssetType,
    asset_name: &str,
    issues: &mut Issues,
) -> EscalationTable {
    let mut entries = Vec::with_capacity(configs.len());
    for config in configs {
        match directory.resolve(&config.handler, current_work) {
            Some(handler) => entries.push(EscalationEntry {
                type_label: config.type_label.clone(),
                matcher: config.matcher.clone(),
                handler,
            }),
            None => issues.add_issue(
                asset,
                asset_name,
                format!(
                    "escalation handler '{}' does not name a function",
                    config.handler
                ),
            ),
        }
    }
    EscalationTable::new(entries)
}

#[allow(clippy::too_many_arguments)]
fn build_function(
    config: &FunctionConfig,
    work_name: &str,
    sources: &HashMap<String, ConstructedObjectSource>,
    work_resolver: &ScopeResolver<'_>,
    process_objects: &[Arc<ManagedObjectMetadata>],
    thread_objects: &[Arc<ManagedObjectMetadata>],
    work_objects: &[Arc<ManagedObjectMetadata>],
    administrators: &[Arc<AdministratorMetadata>],
    administrator_slots: &HashMap<String, usize>,
    team_slots: &HashMap<String, usize>,
    default_team: usize,
    issues: &mut Issues,
) -> Option<FunctionScaffold> {
    if !check_name(&config.name, AssetType::Function, issues) {
        return None;
    }

    let Some(body) = config.body.clone() else {
        issues.add_issue(
            AssetType::Function,
            &config.name,
            format!("function of work '{}' has no body", work_name),
        );
        return None;
    };

    let team = match &config.team {
        Some(name) => match team_slots.get(name) {
            Some(slot) => *slot,
            None => {
                issues.add_issue(
                    AssetType::Function,
                    &config.name,
                    format!("unknown team '{}'", name),
                );
                return None;
            }
        },
        None => default_team,
    };

    let entries: Vec<ScopeObjectConfig> = all_bound(&config.bound_objects);
    let bindings = construct_bound_objects(
        ManagedObjectScope::Function,
        &entries,
        sources,
        Some(work_resolver),
        issues,
    );
    let function_resolver = ScopeResolver::nested(&bindings.names, work_resolver);
    let tables = ObjectTables {
        process: process_objects,
        thread: thread_objects,
        work: work_objects,
        function: &bindings.objects,
    };

    let mut object_indexes = Vec::with_capacity(config.objects.len());
    for bound_name in &config.objects {
        match function_resolver.resolve(bound_name) {
            Some(index) => object_indexes.push(index),
            None => {
                issues.add_issue(
                    AssetType::Function,
                    &config.name,
                    format!("used object '{}' is not bound at any scope", bound_name),
                );
                return None;
            }
        }
    }

    let mut resolve_duties = |configs: &[DutyConfig]| -> Option<Vec<DutyRef>> {
        let mut duties = Vec::with_capacity(configs.len());
        for duty in configs {
            let Some(administrator) = administrator_slots.get(&duty.administrator).copied() else {
                issues.add_issue(
                    AssetType::Function,
                    &config.name,
                    format!("unknown administrator '{}'", duty.administrator),
                );
                return None;
            };
            let duty_count = administrators[administrator].source.meta_data().duties.len();
            if duty.duty >= duty_count {
                issues.add_issue(
                    AssetType::Function,
                    &config.name,
                    format!(
                        "administrator '{}' has no duty {}",
                        duty.administrator, duty.duty
                    ),
                );
                return None;
            }
            duties.push(DutyRef {
                administrator,
                duty: duty.duty,
            });
        }
        Some(duties)
    };
    let pre_duties = resolve_duties(&config.pre_duties)?;
    let post_duties = resolve_duties(&config.post_duties)?;

    // Required closure: each directly used object, then its dependencies
    // depth-first, then everything the duty administrators administer.
    // All of it must be sourced and ready before the body runs.
    let mut required_objects = Vec::new();
    for index in &object_indexes {
        visit_required(*index, &tables, &mut required_objects);
    }
    for duty in pre_duties.iter().chain(post_duties.iter()) {
        for (index, _) in &administrators[duty.administrator].administered {
            visit_required(*index, &tables, &mut required_objects);
        }
    }

    Some(FunctionScaffold {
        name: config.name.clone(),
        team,
        body,
        function_objects: bindings.objects,
        object_indexes,
        required_objects,
        flows: config
            .flows
            .iter()
            .map(|f| {
                let strategy = if f.parallel {
                    InstigationStrategy::Parallel
                } else {
                    InstigationStrategy::Sequential
                };
                (f.target.clone(), strategy)
            })
            .collect(),
        next: config.next.clone(),
        pre_duties,
        post_duties,
        escalations: config.escalations.clone(),
    })
}

fn visit_required(
    index: ManagedObjectIndex,
    tables: &ObjectTables<'_>,
    out: &mut Vec<ManagedObjectIndex>,
) {
    if out.contains(&index) {
        return;
    }
    out.push(index);
    if let Some(metadata) = tables.get(index) {
        for dependency in &metadata.dependencies {
            visit_required(*dependency, tables, out);
        }
    }
}
