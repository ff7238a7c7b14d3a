//! Managed object source construction: instantiate, initialise, and
//! extract metadata from one configured source.

use crate::config::ManagedObjectSourceConfig;
use crate::construct::check_name;
use crate::issues::{AssetType, Issues};
use crate::source::managed_object::{
    ManagedObjectPool, ManagedObjectSource, ManagedObjectSourceContext,
    ManagedObjectSourceMetaData,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A constructed managed object source with its extracted metadata.
///
/// One instance exists per configured source name and is reused by every
/// scope binding that names it; properties apply only here, at first
/// construction.
pub struct ConstructedObjectSource {
    /// Configured source name.
    pub name: String,
    /// The initialised source.
    pub source: Arc<dyn ManagedObjectSource>,
    /// Metadata extracted after initialisation.
    pub meta: ManagedObjectSourceMetaData,
    /// Sourcing / asynchronous-operation timeout. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Optional recycling pool.
    pub pool: Option<Arc<dyn ManagedObjectPool>>,
}

impl std::fmt::Debug for ConstructedObjectSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructedObjectSource")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Construct one managed object source from its configuration.
///
/// `None` means an issue has been reported and this source is skipped;
/// scope bindings naming it will then fail their own construction with an
/// unknown-source issue.
pub fn construct_object_source(
    config: &ManagedObjectSourceConfig,
    issues: &mut Issues,
) -> Option<ConstructedObjectSource> {
    if !check_name(&config.name, AssetType::ManagedObject, issues) {
        return None;
    }

    if config.timeout_ms < 0 {
        issues.add_issue(
            AssetType::ManagedObject,
            &config.name,
            format!(
                "timeout must not be negative (configured {}ms)",
                config.timeout_ms
            ),
        );
        return None;
    }
    let timeout = if config.timeout_ms == 0 {
        None
    } else {
        Some(Duration::from_millis(config.timeout_ms as u64))
    };

    let mut source = (config.factory)();

    for spec in source.specification() {
        if spec.required && config.properties.get(&spec.name).is_none() {
            issues.add_issue(
                AssetType::ManagedObject,
                &config.name,
                format!("missing required property '{}'", spec.name),
            );
            return None;
        }
    }

    let context = ManagedObjectSourceContext {
        name: &config.name,
        properties: &config.properties,
    };
    if let Err(e) = source.init(&context) {
        issues.add_issue_with_cause(
            AssetType::ManagedObject,
            &config.name,
            "source failed to initialise",
            &e,
        );
        return None;
    }

    let meta = source.meta_data();
    debug!(
        source = %config.name,
        dependencies = meta.dependencies.len(),
        extensions = meta.extensions.len(),
        "managed object source constructed"
    );

    Some(ConstructedObjectSource {
        name: config.name.clone(),
        source: Arc::from(source),
        meta,
        timeout,
        pool: config.pool.clone(),
    })
}
