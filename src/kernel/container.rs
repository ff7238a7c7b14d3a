//! Per-scope managed object container: one lazily sourced instance and the
//! continuations parked on it.
//!
//! Lifecycle: not sourced, sourcing (delivery outstanding), coordinating
//! (sourced, dependencies not yet loaded), ready (possibly with
//! asynchronous operations outstanding), failed, recycled. The source is
//! always invoked outside the container lock so a synchronous delivery
//! cannot deadlock.

use crate::kernel::monitor::Monitor;
use crate::metadata::ManagedObjectMetadata;
use crate::source::managed_object::{
    AsynchronousCompletion, AsynchronousListener, ManagedObject, ManagedObjectUser,
    ObjectRegistry, SourcingReceiver,
};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Continuation parked on a container, run once when it becomes ready.
pub(crate) type Waker = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotSourced,
    Sourcing,
    Coordinating,
    Ready,
    Failed,
    Recycled,
}

struct Inner {
    phase: Phase,
    object: Option<Box<dyn ManagedObject>>,
    cached: Option<Arc<dyn Any + Send + Sync>>,
    failure: Option<String>,
    // Asynchronous operations started but not yet complete.
    outstanding: usize,
    // Bumped whenever the wait the monitor may be watching ends, so a
    // stale deadline cannot fail a container that already progressed.
    epoch: u64,
    wakers: Vec<Waker>,
}

/// Result of polling a container for readiness.
pub(crate) enum Readiness {
    /// Sourced, coordinated, no asynchronous operation outstanding.
    Ready,
    /// Not ready; the supplied waker is registered and will run when the
    /// container changes state.
    Pending,
    /// Sourced but dependencies are not loaded yet; the polling job drives
    /// coordination once every dependency is sourced.
    NeedsCoordination,
    /// Sourcing failed or timed out.
    Failed(String),
}

pub(crate) struct ManagedObjectContainer {
    pub(crate) meta: Arc<ManagedObjectMetadata>,
    inner: Mutex<Inner>,
}

impl ManagedObjectContainer {
    pub fn new(meta: Arc<ManagedObjectMetadata>) -> Arc<Self> {
        Arc::new(Self {
            meta,
            inner: Mutex::new(Inner {
                phase: Phase::NotSourced,
                object: None,
                cached: None,
                failure: None,
                outstanding: 0,
                epoch: 0,
                wakers: Vec::new(),
            }),
        })
    }

    /// Poll for readiness, starting sourcing on first touch. `make_waker`
    /// is only invoked when the result is [`Readiness::Pending`].
    pub fn poll_ready(
        self: &Arc<Self>,
        monitor: &Arc<Monitor>,
        make_waker: impl FnOnce() -> Waker,
    ) -> Readiness {
        loop {
            let mut inner = self.inner.lock();
            match inner.phase {
                Phase::NotSourced => {
                    inner.phase = Phase::Sourcing;
                    let epoch = inner.epoch;
                    drop(inner);
                    if let Some(timeout) = self.meta.timeout {
                        monitor.watch(Arc::downgrade(self), Instant::now() + timeout, epoch);
                    }
                    let receiver = Arc::new(Delivery {
                        container: Arc::downgrade(self),
                        monitor: Arc::downgrade(monitor),
                    });
                    // Pool hit skips the source entirely.
                    let pooled = self.meta.pool.as_ref().and_then(|p| p.take());
                    match pooled {
                        Some(object) => receiver.set_managed_object(object),
                        None => self
                            .meta
                            .source
                            .source_managed_object(ManagedObjectUser::new(receiver)),
                    }
                    // Delivery may have happened synchronously; re-evaluate.
                    continue;
                }
                Phase::Sourcing => {
                    inner.wakers.push(make_waker());
                    return Readiness::Pending;
                }
                Phase::Coordinating => return Readiness::NeedsCoordination,
                Phase::Ready if inner.outstanding > 0 => {
                    inner.wakers.push(make_waker());
                    return Readiness::Pending;
                }
                Phase::Ready => return Readiness::Ready,
                Phase::Failed => {
                    return Readiness::Failed(
                        inner.failure.clone().unwrap_or_else(|| "failed".to_string()),
                    );
                }
                Phase::Recycled => {
                    return Readiness::Failed(format!(
                        "managed object '{}' used after recycle",
                        self.meta.bound_name
                    ));
                }
            }
        }
    }

    /// Whether the container is waiting for its dependencies to be loaded.
    pub fn needs_coordination(&self) -> bool {
        self.inner.lock().phase == Phase::Coordinating
    }

    /// Load dependencies into a sourced coordinating object. `dependencies`
    /// must follow the source's declared dependency-key order.
    pub fn coordinate(
        &self,
        dependencies: Vec<Arc<dyn Any + Send + Sync>>,
    ) -> Result<(), String> {
        let mut inner = self.inner.lock();
        if inner.phase != Phase::Coordinating {
            return Ok(());
        }
        let registry = ObjectRegistry::new(dependencies);
        let result = match inner.object.as_mut().and_then(|o| o.as_coordinating()) {
            Some(coordinating) => coordinating.load_objects(&registry),
            None => Ok(()),
        };
        match result {
            Ok(()) => {
                inner.phase = Phase::Ready;
                inner.epoch += 1;
                let wakers = std::mem::take(&mut inner.wakers);
                drop(inner);
                for waker in wakers {
                    waker();
                }
                Ok(())
            }
            Err(cause) => {
                let message = format!(
                    "managed object '{}' failed to load dependencies: {:#}",
                    self.meta.bound_name, cause
                );
                let wakers = Self::fail_locked(&mut inner, message.clone());
                drop(inner);
                for waker in wakers {
                    waker();
                }
                Err(message)
            }
        }
    }

    /// The object handed to functions. Only valid once ready.
    pub fn object(&self) -> Result<Arc<dyn Any + Send + Sync>, String> {
        let inner = self.inner.lock();
        inner.cached.clone().ok_or_else(|| {
            format!("managed object '{}' is not sourced", self.meta.bound_name)
        })
    }

    /// Extract the extension at the given slot of this binding's extension
    /// metadata from the live object.
    pub fn extension(&self, slot: usize) -> Result<Arc<dyn Any + Send + Sync>, String> {
        let inner = self.inner.lock();
        let object = inner.object.as_ref().ok_or_else(|| {
            format!("managed object '{}' is not sourced", self.meta.bound_name)
        })?;
        let factory = self
            .meta
            .extensions
            .get(slot)
            .map(|e| e.factory.clone())
            .ok_or_else(|| {
                format!(
                    "managed object '{}' has no extension slot {}",
                    self.meta.bound_name, slot
                )
            })?;
        Ok(factory(object.as_ref()))
    }

    /// Called by the monitor when a watched deadline expires. A no-op when
    /// the wait the watch was taken for has already ended.
    pub fn expire(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        let pending = matches!(inner.phase, Phase::Sourcing)
            || (inner.phase == Phase::Ready && inner.outstanding > 0);
        if !pending {
            return;
        }
        let message = match inner.phase {
            Phase::Sourcing => format!(
                "managed object '{}' timed out while sourcing",
                self.meta.bound_name
            ),
            _ => format!(
                "asynchronous operation on managed object '{}' timed out",
                self.meta.bound_name
            ),
        };
        tracing::warn!(object = %self.meta.bound_name, "{}", message);
        let wakers = Self::fail_locked(&mut inner, message);
        drop(inner);
        for waker in wakers {
            waker();
        }
    }

    /// End of scope: return the instance to its pool or drop it. Late
    /// deliveries and notifications against a recycled container are
    /// ignored.
    pub fn recycle(&self) {
        let mut inner = self.inner.lock();
        let object = inner.object.take();
        inner.cached = None;
        inner.phase = Phase::Recycled;
        inner.epoch += 1;
        let wakers = std::mem::take(&mut inner.wakers);
        drop(inner);
        if let (Some(pool), Some(object)) = (self.meta.pool.as_ref(), object) {
            pool.give_back(object);
        }
        for waker in wakers {
            waker();
        }
    }

    fn fail(&self, message: String) {
        let mut inner = self.inner.lock();
        if matches!(inner.phase, Phase::Failed | Phase::Recycled) {
            return;
        }
        let wakers = Self::fail_locked(&mut inner, message);
        drop(inner);
        for waker in wakers {
            waker();
        }
    }

    // Wakers must run after the lock is released; a waker may re-enter
    // this container through `poll_ready` on the same thread.
    #[must_use]
    fn fail_locked(inner: &mut Inner, message: String) -> Vec<Waker> {
        inner.phase = Phase::Failed;
        inner.failure = Some(message);
        inner.object = None;
        inner.cached = None;
        inner.epoch += 1;
        std::mem::take(&mut inner.wakers)
    }
}

// Delivery callback handed to the source; also installs the asynchronous
// listener before the object becomes visible.
struct Delivery {
    container: Weak<ManagedObjectContainer>,
    monitor: Weak<Monitor>,
}

impl SourcingReceiver for Delivery {
    fn set_managed_object(&self, mut object: Box<dyn ManagedObject>) {
        let Some(container) = self.container.upgrade() else {
            return;
        };
        if let Some(asynchronous) = object.as_asynchronous() {
            asynchronous.register_listener(AsynchronousListener::new(Arc::new(AsyncTracker {
                container: self.container.clone(),
                monitor: self.monitor.clone(),
            })));
        }
        let coordinating = object.as_coordinating().is_some();
        let cached = object.object();

        let mut inner = container.inner.lock();
        if matches!(inner.phase, Phase::Failed | Phase::Recycled) {
            // Timed out or torn down before delivery.
            return;
        }
        inner.object = Some(object);
        inner.cached = Some(cached);
        inner.phase = if coordinating {
            Phase::Coordinating
        } else {
            Phase::Ready
        };
        inner.epoch += 1;
        let wakers = std::mem::take(&mut inner.wakers);
        drop(inner);
        for waker in wakers {
            waker();
        }
    }

    fn set_failure(&self, cause: anyhow::Error) {
        if let Some(container) = self.container.upgrade() {
            container.fail(format!(
                "failed to source managed object '{}': {:#}",
                container.meta.bound_name, cause
            ));
        }
    }
}

// Listener plumbing for asynchronous managed objects: tracks outstanding
// operations and wakes parked continuations on completion.
struct AsyncTracker {
    container: Weak<ManagedObjectContainer>,
    monitor: Weak<Monitor>,
}

impl AsynchronousCompletion for AsyncTracker {
    fn started(&self) {
        let Some(container) = self.container.upgrade() else {
            return;
        };
        let mut inner = container.inner.lock();
        if matches!(inner.phase, Phase::Failed | Phase::Recycled) {
            return;
        }
        inner.outstanding += 1;
        let epoch = inner.epoch;
        drop(inner);
        if let (Some(monitor), Some(timeout)) = (self.monitor.upgrade(), container.meta.timeout) {
            monitor.watch(Arc::downgrade(&container), Instant::now() + timeout, epoch);
        }
    }

    fn complete(&self) {
        let Some(container) = self.container.upgrade() else {
            return;
        };
        let mut inner = container.inner.lock();
        if inner.outstanding == 0 || matches!(inner.phase, Phase::Failed | Phase::Recycled) {
            return;
        }
        inner.outstanding -= 1;
        if inner.outstanding == 0 {
            inner.epoch += 1;
            let wakers = std::mem::take(&mut inner.wakers);
            drop(inner);
            for waker in wakers {
                waker();
            }
        }
    }
}
