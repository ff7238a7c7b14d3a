//! Administrator construction: bind a source, match its extension
//! interface against the administered objects, resolve duty metadata.

use crate::config::AdministratorConfig;
use crate::construct::{ObjectTables, ScopeResolver, check_name};
use crate::issues::{AssetType, Issues};
use crate::metadata::AdministratorMetadata;
use crate::source::admin::AdministratorSourceContext;
use std::sync::Arc;

/// Construct one work-bound administrator.
///
/// Every administered bound name must resolve (work scope or enclosing)
/// and its metadata must advertise an extension matching the source's
/// extension interface. Any failure reports an issue and drops the
/// administrator; sibling administrators are unaffected.
pub fn construct_administrator(
    config: &AdministratorConfig,
    resolver: &ScopeResolver<'_>,
    tables: &ObjectTables<'_>,
    issues: &mut Issues,
) -> Option<Arc<AdministratorMetadata>> {
    if !check_name(&config.name, AssetType::Administrator, issues) {
        return None;
    }

    let mut source = (config.factory)();

    for spec in source.specification() {
        if spec.required && config.properties.get(&spec.name).is_none() {
            issues.add_issue(
                AssetType::Administrator,
                &config.name,
                format!("missing required property '{}'", spec.name),
            );
            return None;
        }
    }

    let context = AdministratorSourceContext {
        name: &config.name,
        properties: &config.properties,
    };
    if let Err(cause) = source.init(&context) {
        issues.add_issue_with_cause(
            AssetType::Administrator,
            &config.name,
            "administrator source failed to initialise",
            &cause,
        );
        return None;
    }

    let meta = source.meta_data();
    if meta.duties.is_empty() {
        issues.add_issue(
            AssetType::Administrator,
            &config.name,
            "administrator source declares no duties",
        );
        return None;
    }

    let mut administered = Vec::with_capacity(config.administered.len());
    let mut ok = true;
    for bound_name in &config.administered {
        let Some(index) = resolver.resolve(bound_name) else {
            issues.add_issue(
                AssetType::Administrator,
                &config.name,
                format!("administered object '{}' is not bound", bound_name),
            );
            ok = false;
            continue;
        };
        let Some(object) = tables.get(index) else {
            issues.add_issue(
                AssetType::Administrator,
                &config.name,
                format!("administered object '{}' has no metadata", bound_name),
            );
            ok = false;
            continue;
        };
        let Some(extension_slot) = object
            .extensions
            .iter()
            .position(|e| e.interface == meta.extension_interface)
        else {
            issues.add_issue(
                AssetType::Administrator,
                &config.name,
                format!(
                    "administered object '{}' does not support extension '{}'",
                    bound_name, meta.extension_interface
                ),
            );
            ok = false;
            continue;
        };
        administered.push((index, extension_slot));
    }
    if !ok {
        return None;
    }

    tracing::debug!(
        administrator = %config.name,
        extension = %meta.extension_interface,
        duties = meta.duties.len(),
        administered = administered.len(),
        "constructed administrator"
    );

    Some(Arc::new(AdministratorMetadata {
        bound_name: config.name.clone(),
        source: Arc::from(source),
        administered,
    }))
}
