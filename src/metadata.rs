//! Compiled, immutable metadata consumed by the execution kernel.
//!
//! Construction resolves every configured name into the index types here.
//! At run time the kernel dispatches purely through these indices — names
//! survive only for diagnostics.

use crate::source::admin::AdministratorSource;
use crate::source::managed_object::{ExtensionMetaData, ManagedObjectPool, ManagedObjectSource};
use crate::source::work::ManagedFunction;
use std::sync::Arc;
use std::time::Duration;

/// Scope a managed object binding lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedObjectScope {
    /// One instance per process, shared by all its threads and functions.
    Process,
    /// One instance per thread of execution within a process.
    Thread,
    /// One instance per work execution on a thread.
    Work,
    /// One instance per function invocation, never shared.
    Function,
}

impl std::fmt::Display for ManagedObjectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ManagedObjectScope::Process => "process",
            ManagedObjectScope::Thread => "thread",
            ManagedObjectScope::Work => "work",
            ManagedObjectScope::Function => "function",
        };
        write!(f, "{}", s)
    }
}

/// The sole runtime handle to a managed object: scope plus slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagedObjectIndex {
    /// Scope owning the instance.
    pub scope: ManagedObjectScope,
    /// Slot within that scope's container table.
    pub slot: usize,
}

impl ManagedObjectIndex {
    /// Index at the given scope and slot.
    pub fn new(scope: ManagedObjectScope, slot: usize) -> Self {
        Self { scope, slot }
    }
}

impl std::fmt::Display for ManagedObjectIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.scope, self.slot)
    }
}

/// Reference to a function: work slot and function slot within that work,
/// both office-wide. Used for flows, next-function links, and escalation
/// handlers; avoids reference cycles between function metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionRef {
    /// Index of the work in the office's work table.
    pub work: usize,
    /// Index of the function in that work's function table.
    pub function: usize,
}

/// How an invoked flow relates to its invoker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstigationStrategy {
    /// Runs to completion before the invoker's remaining code continues.
    Sequential,
    /// Scheduled independently; no ordering relative to the invoker.
    Parallel,
}

/// One flow a function may instigate, by position.
#[derive(Debug, Clone, Copy)]
pub struct FlowMetadata {
    /// Target function.
    pub target: FunctionRef,
    /// Sequential or parallel instigation.
    pub strategy: InstigationStrategy,
}

/// Predicate deciding whether an escalation entry handles an error.
#[derive(Clone)]
pub enum EscalationMatcher {
    /// Matches one concrete error type via downcast.
    Typed(Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>),
    /// Matches any error. Consulted only after every typed entry.
    Any,
}

impl std::fmt::Debug for EscalationMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationMatcher::Typed(_) => f.write_str("Typed"),
            EscalationMatcher::Any => f.write_str("Any"),
        }
    }
}

/// One escalation handler registration.
#[derive(Debug, Clone)]
pub struct EscalationEntry {
    /// Label of the handled error type, for diagnostics.
    pub type_label: String,
    /// Match predicate.
    pub matcher: EscalationMatcher,
    /// Handler function; receives the escalation as its argument.
    pub handler: FunctionRef,
}

/// Ordered escalation handler table for one level of the chain.
#[derive(Debug, Clone, Default)]
pub struct EscalationTable {
    entries: Vec<EscalationEntry>,
}

impl EscalationTable {
    /// Table over the given entries, kept in declaration order.
    pub fn new(entries: Vec<EscalationEntry>) -> Self {
        Self { entries }
    }

    /// Whether no handlers are registered at this level.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the handler for an escalation. Typed entries are consulted in
    /// declaration order before any catch-all, so the most specific
    /// declared type wins.
    pub fn match_escalation(&self, escalation: &anyhow::Error) -> Option<&EscalationEntry> {
        self.entries
            .iter()
            .find(|e| match &e.matcher {
                EscalationMatcher::Typed(matches) => matches(escalation),
                EscalationMatcher::Any => false,
            })
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|e| matches!(e.matcher, EscalationMatcher::Any))
            })
    }
}

/// Runtime metadata for one managed object binding.
pub struct ManagedObjectMetadata {
    /// Bound name, retained for diagnostics and issue messages.
    pub bound_name: String,
    /// Source producing instances.
    pub source: Arc<dyn ManagedObjectSource>,
    /// Sourcing / asynchronous-operation timeout. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Resolved dependency indices, in the source's dependency-key order.
    pub dependencies: Vec<ManagedObjectIndex>,
    /// Extension interfaces instances support.
    pub extensions: Vec<ExtensionMetaData>,
    /// Optional recycling pool.
    pub pool: Option<Arc<dyn ManagedObjectPool>>,
}

impl std::fmt::Debug for ManagedObjectMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedObjectMetadata")
            .field("bound_name", &self.bound_name)
            .field("timeout", &self.timeout)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// One duty of an administrator, applied before or after a function body.
#[derive(Debug, Clone, Copy)]
pub struct DutyRef {
    /// Slot of the administrator in the work's administrator table.
    pub administrator: usize,
    /// Duty key within that administrator.
    pub duty: usize,
}

/// Runtime metadata for one bound administrator.
pub struct AdministratorMetadata {
    /// Bound name, for diagnostics.
    pub bound_name: String,
    /// Source creating administrator instances.
    pub source: Arc<dyn AdministratorSource>,
    /// Administered managed objects, with the extension factory slot used
    /// for each (index into that object's extension metadata).
    pub administered: Vec<(ManagedObjectIndex, usize)>,
}

impl std::fmt::Debug for AdministratorMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdministratorMetadata")
            .field("bound_name", &self.bound_name)
            .field("administered", &self.administered)
            .finish()
    }
}

/// Compiled metadata for one function.
pub struct FunctionMetadata {
    /// Function name within its work, for diagnostics.
    pub name: String,
    /// Team responsible for running this function, as a slot in the floor
    /// team table.
    pub team: usize,
    /// The function body.
    pub body: Arc<dyn ManagedFunction>,
    /// Managed objects bound per invocation (function scope), by slot.
    pub function_objects: Vec<Arc<ManagedObjectMetadata>>,
    /// Directly used managed objects, in declared order. Position in this
    /// array is the handle the function body uses.
    pub object_indexes: Vec<ManagedObjectIndex>,
    /// Transitive closure of required objects: each directly used object
    /// first, then its dependencies depth-first, no duplicates. Everything
    /// here is sourced and ready before the body runs.
    pub required_objects: Vec<ManagedObjectIndex>,
    /// Flows this function may instigate, by position.
    pub flows: Vec<FlowMetadata>,
    /// Function to continue with when the body completes normally.
    pub next: Option<FunctionRef>,
    /// Duties applied before the body runs.
    pub pre_duties: Vec<DutyRef>,
    /// Duties applied after the body completes normally.
    pub post_duties: Vec<DutyRef>,
    /// Function-level escalation handlers.
    pub escalations: EscalationTable,
}

impl std::fmt::Debug for FunctionMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionMetadata")
            .field("name", &self.name)
            .field("team", &self.team)
            .field("required_objects", &self.required_objects)
            .finish()
    }
}

/// Compiled metadata for one unit of work.
#[derive(Debug)]
pub struct WorkMetadata {
    /// Work name.
    pub name: String,
    /// Work-scope managed object bindings, by slot.
    pub work_objects: Vec<Arc<ManagedObjectMetadata>>,
    /// Bound administrators, by slot.
    pub administrators: Vec<Arc<AdministratorMetadata>>,
    /// Functions, by slot.
    pub functions: Vec<Arc<FunctionMetadata>>,
    /// Function invoked when this work is invoked by name.
    pub initial_function: usize,
    /// Work-level escalation handlers.
    pub escalations: EscalationTable,
}

/// Compiled metadata for the office: everything the kernel needs.
#[derive(Debug)]
pub struct OfficeMetadata {
    /// Office name.
    pub name: String,
    /// Process-scope managed object bindings, by slot.
    pub process_objects: Vec<Arc<ManagedObjectMetadata>>,
    /// Thread-scope managed object bindings, by slot.
    pub thread_objects: Vec<Arc<ManagedObjectMetadata>>,
    /// Works, by slot.
    pub works: Vec<Arc<WorkMetadata>>,
    /// Office-level escalation handlers.
    pub escalations: EscalationTable,
    /// Team used for functions with no explicit team.
    pub default_team: usize,
}

impl OfficeMetadata {
    /// Resolve a function reference to its metadata.
    pub fn function(&self, r: FunctionRef) -> &Arc<FunctionMetadata> {
        &self.works[r.work].functions[r.function]
    }

    /// Resolve a function reference to its work metadata.
    pub fn work_of(&self, r: FunctionRef) -> &Arc<WorkMetadata> {
        &self.works[r.work]
    }

    /// Find a work slot by name.
    pub fn work_by_name(&self, name: &str) -> Option<usize> {
        self.works.iter().position(|w| w.name == name)
    }
}
