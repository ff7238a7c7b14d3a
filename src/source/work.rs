//! Function contract: the body of one unit of executable work.

use std::any::Any;
use std::sync::Arc;

/// Context a function body receives while RUNNING.
///
/// Objects are addressed by the position of the managed object in the
/// function's declared object list; flows by the position in its declared
/// flow list. Names never appear on this path.
pub trait FunctionContext {
    /// The argument this function was invoked with, if any.
    fn argument(&self) -> Option<&(dyn Any + Send)>;

    /// The object of the managed object at the given position.
    fn object(&self, position: usize) -> anyhow::Result<Arc<dyn Any + Send + Sync>>;

    /// Trigger the flow at the given position. A sequential flow runs to
    /// completion before this call returns; a parallel flow is scheduled
    /// independently and this call returns immediately.
    fn do_flow(&mut self, position: usize, argument: Option<Box<dyn Any + Send>>)
    -> anyhow::Result<()>;

    /// Request re-invocation of this function after the current body
    /// returns, without re-entering the scheduler.
    fn repeat(&mut self);
}

/// Convenience downcasts over [`FunctionContext`].
impl dyn FunctionContext + '_ {
    /// The object at `position`, downcast to its concrete type.
    pub fn object_as<T: Send + Sync + 'static>(&self, position: usize) -> anyhow::Result<Arc<T>> {
        self.object(position)?
            .downcast::<T>()
            .map_err(|_| anyhow::anyhow!("object at position {} has unexpected type", position))
    }

    /// The argument, downcast to its concrete type.
    pub fn argument_as<T: Send + 'static>(&self) -> Option<&T> {
        self.argument().and_then(|a| a.downcast_ref::<T>())
    }
}

/// One executable function body.
///
/// Implemented directly, or supplied as a closure via the blanket
/// implementation. An `Err` return escalates through the function's
/// escalation chain; it is not a construction issue.
pub trait ManagedFunction: Send + Sync {
    /// Execute one invocation.
    fn execute(&self, context: &mut dyn FunctionContext) -> anyhow::Result<()>;
}

impl<F> ManagedFunction for F
where
    F: Fn(&mut dyn FunctionContext) -> anyhow::Result<()> + Send + Sync,
{
    fn execute(&self, context: &mut dyn FunctionContext) -> anyhow::Result<()> {
        self(context)
    }
}
