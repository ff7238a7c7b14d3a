//! Programmatic configuration model.
//!
//! These types are what the construction phase consumes. Nothing here is
//! validated; validation happens during construction, where every problem
//! is reported as an issue and the offending item is skipped.

use crate::metadata::EscalationMatcher;
use crate::properties::PropertyList;
use crate::source::admin::AdministratorSource;
use crate::source::managed_object::{ManagedObjectPool, ManagedObjectSource};
use crate::source::team::TeamSource;
use crate::source::work::ManagedFunction;
use std::sync::Arc;
use std::time::Duration;

/// Factory creating a fresh managed object source instance.
///
/// One instance is created per configured source name and reused across
/// every scope binding that names it; properties apply only at that first
/// construction.
pub type ManagedObjectSourceFactory = Arc<dyn Fn() -> Box<dyn ManagedObjectSource> + Send + Sync>;

/// Factory creating a fresh administrator source instance.
pub type AdministratorSourceFactory = Arc<dyn Fn() -> Box<dyn AdministratorSource> + Send + Sync>;

/// Configuration of one team.
#[derive(Clone)]
pub struct TeamConfig {
    /// Team name.
    pub name: String,
    /// Worker count hint. Negative values are a reported issue.
    pub size: i64,
    /// Source creating the worker pool.
    pub source: Arc<dyn TeamSource>,
    /// Properties handed to the source.
    pub properties: PropertyList,
}

impl TeamConfig {
    /// Team configuration with defaults (size 0, no properties).
    pub fn new(name: impl Into<String>, source: Arc<dyn TeamSource>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            source,
            properties: PropertyList::new(),
        }
    }

    /// Set the worker count hint.
    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    /// Add a source property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.add(name, value);
        self
    }
}

/// Configuration of one managed object source.
#[derive(Clone)]
pub struct ManagedObjectSourceConfig {
    /// Source name, referenced by scope bindings.
    pub name: String,
    /// Factory for the source instance.
    pub factory: ManagedObjectSourceFactory,
    /// Sourcing / asynchronous-operation timeout in milliseconds.
    /// Negative values are a reported issue; `0` waits forever.
    pub timeout_ms: i64,
    /// Properties handed to the source at `init`.
    pub properties: PropertyList,
    /// Optional pool recycled instances return to.
    pub pool: Option<Arc<dyn ManagedObjectPool>>,
}

impl ManagedObjectSourceConfig {
    /// Source configuration with defaults (no timeout, no properties).
    pub fn new(name: impl Into<String>, factory: ManagedObjectSourceFactory) -> Self {
        Self {
            name: name.into(),
            factory,
            timeout_ms: 0,
            properties: PropertyList::new(),
            pool: None,
        }
    }

    /// Convenience constructor from a source-producing closure.
    pub fn from_fn<S, F>(name: impl Into<String>, factory: F) -> Self
    where
        S: ManagedObjectSource + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(move || Box::new(factory())))
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as i64;
        self
    }

    /// Add a source property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.add(name, value);
        self
    }

    /// Attach a pool.
    pub fn with_pool(mut self, pool: Arc<dyn ManagedObjectPool>) -> Self {
        self.pool = Some(pool);
        self
    }
}

/// Mapping of one declared dependency key to a bound name in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyMappingConfig {
    /// Dependency key label, as declared by the source's metadata.
    pub key: String,
    /// Bound name the key resolves to. May name a binding at this scope or
    /// any enclosing scope; forward references within the scope are fine.
    pub bound_name: String,
}

/// Configuration newly binding a managed object at a scope.
#[derive(Debug, Clone)]
pub struct BoundManagedObjectConfig {
    /// Name the binding is known by within its scope.
    pub bound_name: String,
    /// Name of the configured managed object source.
    pub source_name: String,
    /// Dependency key mappings.
    pub dependencies: Vec<DependencyMappingConfig>,
}

impl BoundManagedObjectConfig {
    /// Binding with no dependencies.
    pub fn new(bound_name: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            bound_name: bound_name.into(),
            source_name: source_name.into(),
            dependencies: Vec::new(),
        }
    }

    /// Map a dependency key to a bound name.
    pub fn with_dependency(
        mut self,
        key: impl Into<String>,
        bound_name: impl Into<String>,
    ) -> Self {
        self.dependencies.push(DependencyMappingConfig {
            key: key.into(),
            bound_name: bound_name.into(),
        });
        self
    }
}

/// One entry of a scope's managed object list: a new binding owning
/// lifecycle at this scope, or a link aliasing an enclosing scope's binding.
#[derive(Debug, Clone)]
pub enum ScopeObjectConfig {
    /// Newly bound at this scope.
    Bound(BoundManagedObjectConfig),
    /// Linked: `name` in this scope aliases `target` in an enclosing scope.
    Linked {
        /// Alias within this scope.
        name: String,
        /// Bound name at an enclosing scope.
        target: String,
    },
}

impl ScopeObjectConfig {
    /// The name this entry registers in its scope.
    pub fn name(&self) -> &str {
        match self {
            ScopeObjectConfig::Bound(b) => &b.bound_name,
            ScopeObjectConfig::Linked { name, .. } => name,
        }
    }
}

/// Configuration binding one administrator at work scope.
#[derive(Clone)]
pub struct AdministratorConfig {
    /// Name the administrator is known by.
    pub name: String,
    /// Factory for the administrator source.
    pub factory: AdministratorSourceFactory,
    /// Properties handed to the source at `init`.
    pub properties: PropertyList,
    /// Bound names of the managed objects this administrator administers.
    pub administered: Vec<String>,
}

impl AdministratorConfig {
    /// Administrator configuration with no administered objects yet.
    pub fn new(name: impl Into<String>, factory: AdministratorSourceFactory) -> Self {
        Self {
            name: name.into(),
            factory,
            properties: PropertyList::new(),
            administered: Vec::new(),
        }
    }

    /// Convenience constructor from a source-producing closure.
    pub fn from_fn<S, F>(name: impl Into<String>, factory: F) -> Self
    where
        S: AdministratorSource + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(move || Box::new(factory())))
    }

    /// Administer the managed object bound under the given name.
    pub fn administering(mut self, bound_name: impl Into<String>) -> Self {
        self.administered.push(bound_name.into());
        self
    }
}

/// One flow continuation a function declares.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Target function: `"function"` within the same work, or
    /// `"work.function"` across works.
    pub target: String,
    /// Whether the flow runs sequentially or in parallel.
    pub parallel: bool,
}

/// One pre/post duty a function declares.
#[derive(Debug, Clone)]
pub struct DutyConfig {
    /// Name of a work-bound administrator.
    pub administrator: String,
    /// Duty key within that administrator.
    pub duty: usize,
}

/// One escalation handler registration.
#[derive(Clone)]
pub struct EscalationConfig {
    /// Label of the handled error type, for diagnostics.
    pub type_label: String,
    /// Match predicate.
    pub matcher: EscalationMatcher,
    /// Handler function: `"function"` within the same work, or
    /// `"work.function"` across works. Office-level escalations must use
    /// the qualified form.
    pub handler: String,
}

impl EscalationConfig {
    /// Handler for one concrete error type, matched by downcast.
    pub fn typed<E: std::error::Error + Send + Sync + 'static>(
        handler: impl Into<String>,
    ) -> Self {
        Self {
            type_label: std::any::type_name::<E>().to_string(),
            matcher: EscalationMatcher::Typed(Arc::new(|e: &anyhow::Error| {
                e.downcast_ref::<E>().is_some()
            })),
            handler: handler.into(),
        }
    }

    /// Catch-all handler, consulted after every typed handler at its level.
    pub fn any(handler: impl Into<String>) -> Self {
        Self {
            type_label: "any".to_string(),
            matcher: EscalationMatcher::Any,
            handler: handler.into(),
        }
    }
}

/// Configuration of one function within a work.
#[derive(Clone)]
pub struct FunctionConfig {
    /// Function name, unique within its work.
    pub name: String,
    /// Responsible team name. `None` uses the office default team.
    pub team: Option<String>,
    /// The function body. Missing body is a reported issue.
    pub body: Option<Arc<dyn ManagedFunction>>,
    /// Managed objects bound for the duration of one invocation.
    pub bound_objects: Vec<BoundManagedObjectConfig>,
    /// Directly used managed objects, by bound name, in the order the body
    /// addresses them by position.
    pub objects: Vec<String>,
    /// Flows the body may instigate, in the order it addresses them.
    pub flows: Vec<FlowConfig>,
    /// Function to continue with on normal completion.
    pub next: Option<String>,
    /// Duties applied before the body.
    pub pre_duties: Vec<DutyConfig>,
    /// Duties applied after normal completion.
    pub post_duties: Vec<DutyConfig>,
    /// Function-level escalation handlers.
    pub escalations: Vec<EscalationConfig>,
}

impl FunctionConfig {
    /// Function with the given body and defaults otherwise.
    pub fn new(name: impl Into<String>, body: Arc<dyn ManagedFunction>) -> Self {
        Self {
            name: name.into(),
            team: None,
            body: Some(body),
            bound_objects: Vec::new(),
            objects: Vec::new(),
            flows: Vec::new(),
            next: None,
            pre_duties: Vec::new(),
            post_duties: Vec::new(),
            escalations: Vec::new(),
        }
    }

    /// Function from a closure body.
    pub fn from_fn<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut dyn crate::source::work::FunctionContext) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, Arc::new(body))
    }

    /// Assign the responsible team.
    pub fn on_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    /// Declare a directly used managed object by bound name.
    pub fn using_object(mut self, bound_name: impl Into<String>) -> Self {
        self.objects.push(bound_name.into());
        self
    }

    /// Bind a managed object for the duration of each invocation.
    pub fn binding_object(mut self, config: BoundManagedObjectConfig) -> Self {
        self.bound_objects.push(config);
        self
    }

    /// Declare a sequential flow.
    pub fn with_sequential_flow(mut self, target: impl Into<String>) -> Self {
        self.flows.push(FlowConfig {
            target: target.into(),
            parallel: false,
        });
        self
    }

    /// Declare a parallel flow.
    pub fn with_parallel_flow(mut self, target: impl Into<String>) -> Self {
        self.flows.push(FlowConfig {
            target: target.into(),
            parallel: true,
        });
        self
    }

    /// Continue with the named function on normal completion.
    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    /// Apply a duty before the body runs.
    pub fn with_pre_duty(mut self, administrator: impl Into<String>, duty: usize) -> Self {
        self.pre_duties.push(DutyConfig {
            administrator: administrator.into(),
            duty,
        });
        self
    }

    /// Apply a duty after normal completion.
    pub fn with_post_duty(mut self, administrator: impl Into<String>, duty: usize) -> Self {
        self.post_duties.push(DutyConfig {
            administrator: administrator.into(),
            duty,
        });
        self
    }

    /// Register an escalation handler.
    pub fn with_escalation(mut self, escalation: EscalationConfig) -> Self {
        self.escalations.push(escalation);
        self
    }
}

/// Configuration of one unit of work.
#[derive(Clone, Default)]
pub struct WorkConfig {
    /// Work name, unique within the office.
    pub name: String,
    /// Work-scope managed object list (bound and linked entries).
    pub objects: Vec<ScopeObjectConfig>,
    /// Administrators bound at this work.
    pub administrators: Vec<AdministratorConfig>,
    /// Functions, in declaration order.
    pub functions: Vec<FunctionConfig>,
    /// Function invoked when the work is invoked by name. Defaults to the
    /// first declared function.
    pub initial_function: Option<String>,
    /// Work-level escalation handlers.
    pub escalations: Vec<EscalationConfig>,
}

impl WorkConfig {
    /// Empty work with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Bind a managed object at work scope.
    pub fn binding_object(mut self, config: BoundManagedObjectConfig) -> Self {
        self.objects.push(ScopeObjectConfig::Bound(config));
        self
    }

    /// Link an enclosing scope's binding into work scope under an alias.
    pub fn linking_object(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.objects.push(ScopeObjectConfig::Linked {
            name: name.into(),
            target: target.into(),
        });
        self
    }

    /// Bind an administrator.
    pub fn with_administrator(mut self, config: AdministratorConfig) -> Self {
        self.administrators.push(config);
        self
    }

    /// Add a function.
    pub fn with_function(mut self, config: FunctionConfig) -> Self {
        self.functions.push(config);
        self
    }

    /// Set the initial function by name.
    pub fn initially(mut self, function: impl Into<String>) -> Self {
        self.initial_function = Some(function.into());
        self
    }

    /// Register a work-level escalation handler.
    pub fn with_escalation(mut self, escalation: EscalationConfig) -> Self {
        self.escalations.push(escalation);
        self
    }
}

/// Complete configuration of a floor: teams plus one office.
#[derive(Clone, Default)]
pub struct FloorConfig {
    /// Office name.
    pub office_name: String,
    /// Teams, in start order.
    pub teams: Vec<TeamConfig>,
    /// Team used for functions with no explicit team. Defaults to the
    /// first configured team.
    pub default_team: Option<String>,
    /// Managed object sources, referenced by scope bindings.
    pub managed_object_sources: Vec<ManagedObjectSourceConfig>,
    /// Process-scope bindings.
    pub process_objects: Vec<BoundManagedObjectConfig>,
    /// Thread-scope bindings.
    pub thread_objects: Vec<BoundManagedObjectConfig>,
    /// Works.
    pub works: Vec<WorkConfig>,
    /// Office-level escalation handlers.
    pub escalations: Vec<EscalationConfig>,
}

impl FloorConfig {
    /// Empty configuration for the named office.
    pub fn new(office_name: impl Into<String>) -> Self {
        Self {
            office_name: office_name.into(),
            ..Default::default()
        }
    }

    /// Add a team.
    pub fn add_team(&mut self, config: TeamConfig) -> &mut Self {
        self.teams.push(config);
        self
    }

    /// Set the default team by name.
    pub fn set_default_team(&mut self, name: impl Into<String>) -> &mut Self {
        self.default_team = Some(name.into());
        self
    }

    /// Register a managed object source.
    pub fn add_managed_object_source(&mut self, config: ManagedObjectSourceConfig) -> &mut Self {
        self.managed_object_sources.push(config);
        self
    }

    /// Bind a managed object at process scope.
    pub fn bind_process_object(&mut self, config: BoundManagedObjectConfig) -> &mut Self {
        self.process_objects.push(config);
        self
    }

    /// Bind a managed object at thread scope.
    pub fn bind_thread_object(&mut self, config: BoundManagedObjectConfig) -> &mut Self {
        self.thread_objects.push(config);
        self
    }

    /// Add a work.
    pub fn add_work(&mut self, config: WorkConfig) -> &mut Self {
        self.works.push(config);
        self
    }

    /// Register an office-level escalation handler (qualified
    /// `"work.function"` target).
    pub fn add_escalation(&mut self, escalation: EscalationConfig) -> &mut Self {
        self.escalations.push(escalation);
        self
    }
}
