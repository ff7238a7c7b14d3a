use super::*;
use crate::config::{
    BoundManagedObjectConfig, EscalationConfig, FloorConfig, FunctionConfig,
    ManagedObjectSourceConfig, ScopeObjectConfig, TeamConfig, WorkConfig,
};
use crate::metadata::ManagedObjectScope;
use crate::source::managed_object::{
    DependencyMetaData, FlowRequestMetaData, ManagedObject, ManagedObjectSource,
    ManagedObjectSourceMetaData, ManagedObjectUser,
};
use crate::source::team::{Job, Team, TeamSource, TeamSourceContext};
use crate::teams::PassiveTeamSource;
use std::any::Any;

struct UnitObject;

impl ManagedObject for UnitObject {
    fn object(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::new(())
    }
}

struct UnitSource {
    dependencies: Vec<&'static str>,
}

impl UnitSource {
    fn plain() -> Self {
        Self {
            dependencies: Vec::new(),
        }
    }

    fn depending_on(labels: &[&'static str]) -> Self {
        Self {
            dependencies: labels.to_vec(),
        }
    }
}

impl ManagedObjectSource for UnitSource {
    fn meta_data(&self) -> ManagedObjectSourceMetaData {
        ManagedObjectSourceMetaData {
            object_type: "unit".to_string(),
            dependencies: self
                .dependencies
                .iter()
                .map(|l| DependencyMetaData {
                    label: l.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn source_managed_object(&self, user: ManagedObjectUser) {
        user.set_managed_object(Box::new(UnitObject));
    }
}

struct BootstrappingSource {
    flows: Vec<&'static str>,
}

impl ManagedObjectSource for BootstrappingSource {
    fn meta_data(&self) -> ManagedObjectSourceMetaData {
        ManagedObjectSourceMetaData {
            object_type: "bootstrapper".to_string(),
            flows: self
                .flows
                .iter()
                .map(|l| FlowRequestMetaData {
                    label: l.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn source_managed_object(&self, user: ManagedObjectUser) {
        user.set_managed_object(Box::new(UnitObject));
    }
}

fn noop_function(name: &str) -> FunctionConfig {
    FunctionConfig::from_fn(name, |_ctx| Ok(()))
}

fn floor_with_team() -> FloorConfig {
    let mut config = FloorConfig::new("test-office");
    config.add_team(TeamConfig::new("main", Arc::new(PassiveTeamSource)));
    config
}

fn bound(name: &str, source: &str) -> BoundManagedObjectConfig {
    BoundManagedObjectConfig::new(name, source)
}

#[test]
fn unresolved_dependency_drops_binding_and_keeps_sibling() {
    let mut issues = Issues::new();
    let mut sources = HashMap::new();
    for (name, src) in [
        ("needy", UnitSource::depending_on(&["db"])),
        ("plain", UnitSource::plain()),
    ] {
        let constructed = construct_object_source(
            &ManagedObjectSourceConfig::from_fn(name, {
                let deps = src.dependencies.clone();
                move || UnitSource {
                    dependencies: deps.clone(),
                }
            }),
            &mut issues,
        )
        .unwrap();
        sources.insert(name.to_string(), constructed);
    }

    let entries = vec![
        ScopeObjectConfig::Bound(bound("broken", "needy").with_dependency("db", "nowhere")),
        ScopeObjectConfig::Bound(bound("fine", "plain")),
    ];
    let bindings = construct_bound_objects(
        ManagedObjectScope::Process,
        &entries,
        &sources,
        None,
        &mut issues,
    );

    assert_eq!(issues.len(), 1);
    assert_eq!(issues.records()[0].asset_name, "broken");
    assert_eq!(bindings.objects.len(), 1);
    assert_eq!(bindings.objects[0].bound_name, "fine");
    assert!(bindings.names.contains_key("fine"));
    assert!(!bindings.names.contains_key("broken"));
}

#[test]
fn forward_reference_within_scope_resolves() {
    let mut issues = Issues::new();
    let mut sources = HashMap::new();
    sources.insert(
        "needy".to_string(),
        construct_object_source(
            &ManagedObjectSourceConfig::from_fn("needy", || UnitSource::depending_on(&["db"])),
            &mut issues,
        )
        .unwrap(),
    );
    sources.insert(
        "plain".to_string(),
        construct_object_source(
            &ManagedObjectSourceConfig::from_fn("plain", UnitSource::plain),
            &mut issues,
        )
        .unwrap(),
    );

    // The dependency target is declared after its dependent.
    let entries = vec![
        ScopeObjectConfig::Bound(bound("user", "needy").with_dependency("db", "database")),
        ScopeObjectConfig::Bound(bound("database", "plain")),
    ];
    let bindings = construct_bound_objects(
        ManagedObjectScope::Process,
        &entries,
        &sources,
        None,
        &mut issues,
    );

    assert!(!issues.has_issues(), "{}", issues.render());
    assert_eq!(bindings.objects.len(), 2);
    let user = &bindings.objects[0];
    assert_eq!(user.dependencies, vec![bindings.names["database"]]);
}

#[test]
fn duplicate_bound_name_keeps_first_registration() {
    let mut issues = Issues::new();
    let mut sources = HashMap::new();
    sources.insert(
        "plain".to_string(),
        construct_object_source(
            &ManagedObjectSourceConfig::from_fn("plain", UnitSource::plain),
            &mut issues,
        )
        .unwrap(),
    );

    let entries = vec![
        ScopeObjectConfig::Bound(bound("item", "plain")),
        ScopeObjectConfig::Bound(bound("item", "plain")),
    ];
    let bindings = construct_bound_objects(
        ManagedObjectScope::Thread,
        &entries,
        &sources,
        None,
        &mut issues,
    );

    assert_eq!(bindings.objects.len(), 1);
    assert_eq!(issues.len(), 1);
}

#[test]
fn scope_local_name_shadows_enclosing_scope() {
    let mut outer = HashMap::new();
    outer.insert(
        "db".to_string(),
        ManagedObjectIndex::new(ManagedObjectScope::Process, 0),
    );
    let mut inner = HashMap::new();
    inner.insert(
        "db".to_string(),
        ManagedObjectIndex::new(ManagedObjectScope::Work, 2),
    );
    let root = ScopeResolver::root(&outer);
    let nested = ScopeResolver::nested(&inner, &root);

    assert_eq!(
        nested.resolve("db"),
        Some(ManagedObjectIndex::new(ManagedObjectScope::Work, 2))
    );
    assert_eq!(
        root.resolve("db"),
        Some(ManagedObjectIndex::new(ManagedObjectScope::Process, 0))
    );
}

#[test]
fn required_closure_lists_direct_object_before_its_dependencies() {
    let mut issues = Issues::new();
    let mut config = floor_with_team();
    config.add_managed_object_source(ManagedObjectSourceConfig::from_fn("needy", || {
        UnitSource::depending_on(&["db"])
    }));
    config.add_managed_object_source(ManagedObjectSourceConfig::from_fn(
        "plain",
        UnitSource::plain,
    ));
    config.bind_process_object(bound("database", "plain"));
    config.bind_process_object(bound("service", "needy").with_dependency("db", "database"));
    config.add_work(
        WorkConfig::new("job").with_function(noop_function("run").using_object("service")),
    );

    let office = construct_office(&config, &mut issues).unwrap();
    assert!(!issues.has_issues(), "{}", issues.render());

    let function = &office.metadata.works[0].functions[0];
    let service = ManagedObjectIndex::new(ManagedObjectScope::Process, 1);
    let database = ManagedObjectIndex::new(ManagedObjectScope::Process, 0);
    assert_eq!(function.object_indexes, vec![service]);
    assert_eq!(function.required_objects, vec![service, database]);
}

#[test]
fn work_metadata_is_memoized() {
    let mut issues = Issues::new();
    let mut config = floor_with_team();
    config.add_work(WorkConfig::new("job").with_function(noop_function("run")));

    let sources = HashMap::new();
    let names = HashMap::new();
    let resolver = ScopeResolver::root(&names);
    let scaffold = crate::construct::work::WorkScaffold::build(
        &config.works[0],
        &sources,
        &resolver,
        &[],
        &[],
        &HashMap::from([("main".to_string(), 0)]),
        0,
        &mut issues,
    )
    .unwrap();
    let directory = crate::construct::work::FunctionDirectory::new(vec![(
        "job".to_string(),
        vec!["run".to_string()],
    )]);
    let constructed = scaffold.finish(0, &directory, &mut issues);

    let a = constructed.work_metadata();
    let b = constructed.work_metadata();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn office_needs_at_least_one_team() {
    let mut issues = Issues::new();
    let config = FloorConfig::new("empty-office");

    assert!(construct_office(&config, &mut issues).is_none());
    assert!(issues.has_issues());
}

#[test]
fn source_flow_keys_must_name_configured_works() {
    let mut config = floor_with_team();
    config.add_managed_object_source(ManagedObjectSourceConfig::from_fn("greeter", || {
        BootstrappingSource {
            flows: vec!["boot", "missing"],
        }
    }));
    config.add_work(WorkConfig::new("boot").with_function(noop_function("run")));

    let mut issues = Issues::new();
    construct_office(&config, &mut issues).unwrap();

    assert_eq!(issues.len(), 1);
    let record = &issues.records()[0];
    assert_eq!(record.asset_name, "greeter");
    assert!(record.message.contains("missing"));
}

#[test]
fn thread_local_awareness_follows_team_request() {
    struct AwareTeam;
    impl Team for AwareTeam {
        fn assign_job(&self, job: Job) {
            job.run();
        }
        fn requests_thread_local_awareness(&self) -> bool {
            true
        }
    }
    struct AwareSource;
    impl TeamSource for AwareSource {
        fn create_team(&self, _ctx: TeamSourceContext<'_>) -> anyhow::Result<Arc<dyn Team>> {
            Ok(Arc::new(AwareTeam))
        }
    }

    let mut issues = Issues::new();
    let aware = construct_team(&TeamConfig::new("aware", Arc::new(AwareSource)), &mut issues)
        .unwrap();
    let passive = construct_team(
        &TeamConfig::new("plain", Arc::new(PassiveTeamSource)),
        &mut issues,
    )
    .unwrap();

    assert!(aware.requires_thread_local_awareness());
    assert!(!passive.requires_thread_local_awareness());
}

#[test]
fn unknown_flow_target_reports_issue_but_other_functions_survive() {
    let mut issues = Issues::new();
    let mut config = floor_with_team();
    config.add_work(
        WorkConfig::new("job")
            .with_function(noop_function("first").with_sequential_flow("no-such"))
            .with_function(noop_function("second")),
    );

    let office = construct_office(&config, &mut issues).unwrap();

    assert_eq!(issues.len(), 1);
    let work = &office.metadata.works[0];
    assert_eq!(work.functions.len(), 2);
    assert!(work.functions[0].flows.is_empty());
}

#[test]
fn qualified_targets_resolve_across_works() {
    let mut issues = Issues::new();
    let mut config = floor_with_team();
    config.add_work(
        WorkConfig::new("alpha")
            .with_function(noop_function("go").with_parallel_flow("beta.land")),
    );
    config.add_work(WorkConfig::new("beta").with_function(noop_function("land")));
    config.add_escalation(EscalationConfig::any("beta.land"));

    let office = construct_office(&config, &mut issues).unwrap();

    assert!(!issues.has_issues(), "{}", issues.render());
    let flow = office.metadata.works[0].functions[0].flows[0];
    assert_eq!(flow.target, crate::metadata::FunctionRef { work: 1, function: 0 });
    assert!(!office.metadata.escalations.is_empty());
}

#[test]
fn invalid_name_is_rejected() {
    let mut issues = Issues::new();
    assert!(!check_name("has.dot", AssetType::Work, &mut issues));
    assert!(!check_name("", AssetType::Work, &mut issues));
    assert!(!check_name("9lives", AssetType::Team, &mut issues));
    assert!(check_name("ok-name_2", AssetType::Team, &mut issues));
    assert_eq!(issues.len(), 3);
}
