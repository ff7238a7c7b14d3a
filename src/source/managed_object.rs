//! Managed object contract: pluggable runtime resources.
//!
//! A [`ManagedObjectSource`] is a named factory for one category of managed
//! object. The kernel sources instances lazily per scope, possibly
//! asynchronously, and recycles them when the scope ends. Capability
//! variants (asynchronous completion, coordinated dependencies) are opt-in
//! accessors, not subtypes.

use crate::error::FloorError;
use crate::properties::PropertyList;
use crate::source::PropertySpec;
use std::any::Any;
use std::sync::Arc;

/// A sourced runtime resource instance.
pub trait ManagedObject: Send {
    /// The object handed to functions using this managed object.
    fn object(&self) -> Arc<dyn Any + Send + Sync>;

    /// Asynchronous capability: the object performs operations whose
    /// completion is signalled externally.
    fn as_asynchronous(&mut self) -> Option<&mut dyn AsynchronousManagedObject> {
        None
    }

    /// Coordinating capability: the object resolves dependencies on other
    /// managed objects before first use.
    fn as_coordinating(&mut self) -> Option<&mut dyn CoordinatingManagedObject> {
        None
    }
}

/// Capability: managed object with externally completed operations.
pub trait AsynchronousManagedObject: ManagedObject {
    /// Receive the listener used to signal operation start and completion.
    /// Called once, before the object is handed to any function.
    fn register_listener(&mut self, listener: AsynchronousListener);
}

/// Capability: managed object depending on other managed objects.
pub trait CoordinatingManagedObject: ManagedObject {
    /// Resolve dependencies from the registry. Called once all declared
    /// dependencies are sourced and ready, before first use.
    fn load_objects(&mut self, registry: &ObjectRegistry) -> anyhow::Result<()>;
}

pub(crate) trait AsynchronousCompletion: Send + Sync {
    fn started(&self);
    fn complete(&self);
}

/// Listener a managed object uses to signal asynchronous operations.
///
/// `notify_started` parks functions depending on this object until
/// `notify_complete` is signalled; the timeout clock runs between the two.
#[derive(Clone)]
pub struct AsynchronousListener {
    inner: Arc<dyn AsynchronousCompletion>,
}

impl AsynchronousListener {
    pub(crate) fn new(inner: Arc<dyn AsynchronousCompletion>) -> Self {
        Self { inner }
    }

    /// An asynchronous operation has started; the object is not ready.
    pub fn notify_started(&self) {
        self.inner.started();
    }

    /// The outstanding asynchronous operation has completed.
    pub fn notify_complete(&self) {
        self.inner.complete();
    }
}

impl std::fmt::Debug for AsynchronousListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AsynchronousListener")
    }
}

/// Dependency objects for a coordinating managed object, keyed by the
/// position of the dependency in the source's declared dependency list.
pub struct ObjectRegistry {
    objects: Vec<Arc<dyn Any + Send + Sync>>,
}

impl ObjectRegistry {
    pub(crate) fn new(objects: Vec<Arc<dyn Any + Send + Sync>>) -> Self {
        Self { objects }
    }

    /// The object for the given dependency key.
    pub fn object(&self, dependency: usize) -> anyhow::Result<Arc<dyn Any + Send + Sync>> {
        self.objects
            .get(dependency)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no dependency at key {}", dependency))
    }

    /// The object for the given dependency key, downcast to its type.
    pub fn object_as<T: Send + Sync + 'static>(&self, dependency: usize) -> anyhow::Result<Arc<T>> {
        self.object(dependency)?
            .downcast::<T>()
            .map_err(|_| anyhow::anyhow!("dependency at key {} has unexpected type", dependency))
    }

    /// Number of resolved dependencies.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the registry holds no dependencies.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

pub(crate) trait SourcingReceiver: Send + Sync {
    fn set_managed_object(&self, object: Box<dyn ManagedObject>);
    fn set_failure(&self, cause: anyhow::Error);
}

/// Callback handle a source uses to deliver the sourced object.
///
/// May be invoked synchronously inside `source_managed_object` or later
/// from another thread. Exactly one of the two methods must be called.
#[derive(Clone)]
pub struct ManagedObjectUser {
    inner: Arc<dyn SourcingReceiver>,
}

impl ManagedObjectUser {
    pub(crate) fn new(inner: Arc<dyn SourcingReceiver>) -> Self {
        Self { inner }
    }

    /// Deliver the sourced managed object.
    pub fn set_managed_object(&self, object: Box<dyn ManagedObject>) {
        self.inner.set_managed_object(object);
    }

    /// Report that sourcing failed.
    pub fn set_failure(&self, cause: anyhow::Error) {
        self.inner.set_failure(cause);
    }
}

impl std::fmt::Debug for ManagedObjectUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ManagedObjectUser")
    }
}

/// Factory producing an extension interface view of a managed object,
/// used by administrators to act on many objects through one interface.
pub type ExtensionFactory =
    Arc<dyn Fn(&dyn ManagedObject) -> Arc<dyn Any + Send + Sync> + Send + Sync>;

/// Metadata for one extension interface a source supports.
#[derive(Clone)]
pub struct ExtensionMetaData {
    /// Label identifying the extension interface; administrators name the
    /// interface they administer with the same label.
    pub interface: String,
    /// Factory extracting the extension from a sourced object.
    pub factory: ExtensionFactory,
}

impl std::fmt::Debug for ExtensionMetaData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionMetaData")
            .field("interface", &self.interface)
            .finish()
    }
}

/// One dependency a source's objects declare on another managed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyMetaData {
    /// Label for the dependency key, used in binding configuration.
    pub label: String,
}

/// One flow a source may instigate from its `start` bootstrap.
///
/// Each label must name a configured work; construction reports an issue
/// for any that does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRequestMetaData {
    /// Label for the flow key, naming the work to invoke.
    pub label: String,
}

/// Metadata a source exposes after initialisation.
#[derive(Debug, Clone, Default)]
pub struct ManagedObjectSourceMetaData {
    /// Type label of the object handed to functions.
    pub object_type: String,
    /// Declared dependency keys, in key order.
    pub dependencies: Vec<DependencyMetaData>,
    /// Declared flow keys, in key order.
    pub flows: Vec<FlowRequestMetaData>,
    /// Supported extension interfaces.
    pub extensions: Vec<ExtensionMetaData>,
}

/// Initialisation context for a [`ManagedObjectSource`].
#[derive(Debug)]
pub struct ManagedObjectSourceContext<'a> {
    /// Configured source name.
    pub name: &'a str,
    /// Source properties.
    pub properties: &'a PropertyList,
}

pub(crate) trait WorkInvoker: Send + Sync {
    fn invoke(
        &self,
        work: &str,
        argument: Option<Box<dyn Any + Send>>,
    ) -> Result<ProcessTicket, FloorError>;
}

/// Opaque receipt for work invoked from a source's bootstrap.
#[derive(Debug, Clone, Copy)]
pub struct ProcessTicket(pub(crate) u64);

impl ProcessTicket {
    /// Identifier of the process the invocation started.
    pub fn process_id(&self) -> u64 {
        self.0
    }
}

/// Context handed to [`ManagedObjectSource::start`], letting a source run
/// its own bootstrap work on the office once the floor is open.
#[derive(Clone)]
pub struct ExecuteContext {
    invoker: Arc<dyn WorkInvoker>,
}

impl ExecuteContext {
    pub(crate) fn new(invoker: Arc<dyn WorkInvoker>) -> Self {
        Self { invoker }
    }

    /// Invoke work on the office in a new process.
    pub fn invoke_work(
        &self,
        work: &str,
        argument: Option<Box<dyn Any + Send>>,
    ) -> Result<ProcessTicket, FloorError> {
        self.invoker.invoke(work, argument)
    }
}

impl std::fmt::Debug for ExecuteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExecuteContext")
    }
}

/// Named factory for one category of managed object.
///
/// Instantiated once per configuration; immutable after `init`.
pub trait ManagedObjectSource: Send + Sync {
    /// Properties this source understands.
    fn specification(&self) -> Vec<PropertySpec> {
        Vec::new()
    }

    /// Initialise from configuration. Errors become reported issues.
    fn init(&mut self, context: &ManagedObjectSourceContext<'_>) -> anyhow::Result<()> {
        let _ = context;
        Ok(())
    }

    /// Metadata describing sourced objects. Stable after `init`.
    fn meta_data(&self) -> ManagedObjectSourceMetaData;

    /// Called once the floor is open, with a context able to invoke
    /// bootstrap work.
    fn start(&self, context: ExecuteContext) -> anyhow::Result<()> {
        let _ = context;
        Ok(())
    }

    /// Source one managed object instance, delivering it (or a failure)
    /// through the user callback, synchronously or later.
    fn source_managed_object(&self, user: ManagedObjectUser);
}

/// Optional pool for recycled managed objects.
pub trait ManagedObjectPool: Send + Sync {
    /// Take a pooled instance if one is available.
    fn take(&self) -> Option<Box<dyn ManagedObject>>;

    /// Return an instance whose scope has ended.
    fn give_back(&self, object: Box<dyn ManagedObject>);
}
