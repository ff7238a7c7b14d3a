//! Bound managed object resolution for one scope.
//!
//! Two-phase arena: phase 1 registers every declared name into the scope's
//! slot table without resolving anything, so forward references and
//! shadowing work without ordering rules; phase 2 walks dependency keys
//! resolving names to indices. A binding whose resolution fails is dropped
//! with one reported issue, its dependents cascade, and the surviving
//! bindings are compacted into the final slot order.

use crate::config::{BoundManagedObjectConfig, ScopeObjectConfig};
use crate::construct::managed_object_source::ConstructedObjectSource;
use crate::construct::{ScopeResolver, check_name};
use crate::issues::{AssetType, Issues};
use crate::metadata::{ManagedObjectIndex, ManagedObjectMetadata, ManagedObjectScope};
use std::collections::HashMap;
use std::sync::Arc;

/// Result of binding one scope's managed object list.
pub struct ScopeBindings {
    /// Scope these bindings live in.
    pub scope: ManagedObjectScope,
    /// Every resolvable name in this scope (bound entries and links) to its
    /// index. Links map to the enclosing scope's index.
    pub names: HashMap<String, ManagedObjectIndex>,
    /// Newly bound metadata, by slot. Links create no entries here.
    pub objects: Vec<Arc<ManagedObjectMetadata>>,
}

impl std::fmt::Debug for ScopeBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeBindings")
            .field("scope", &self.scope)
            .field("bound", &self.objects.len())
            .field("names", &self.names.len())
            .finish()
    }
}

enum Registration {
    // Pending bound entry, by position in `pending`.
    Local(usize),
    // Link to an enclosing scope.
    Outer(ManagedObjectIndex),
}

enum ResolvedDependency {
    Local(usize),
    Outer(ManagedObjectIndex),
}

struct Pending<'a> {
    config: &'a BoundManagedObjectConfig,
    source: &'a ConstructedObjectSource,
    // One entry per declared dependency key, filled in phase 2.
    dependencies: Vec<ResolvedDependency>,
    dead: bool,
}

/// Resolve one scope's managed object list into bindings.
///
/// `enclosing` chains the already-built outer scopes; pass `None` for the
/// outermost (process) scope. Failures are local: each bad entry is
/// reported and dropped while its siblings construct.
pub fn construct_bound_objects(
    scope: ManagedObjectScope,
    entries: &[ScopeObjectConfig],
    sources: &HashMap<String, ConstructedObjectSource>,
    enclosing: Option<&ScopeResolver<'_>>,
    issues: &mut Issues,
) -> ScopeBindings {
    let mut registrations: HashMap<String, Registration> = HashMap::new();
    let mut pending: Vec<Pending<'_>> = Vec::new();

    // Phase 1: register every declared name, no resolution.
    for entry in entries {
        let name = entry.name();
        if !check_name(name, AssetType::ManagedObject, issues) {
            continue;
        }
        if registrations.contains_key(name) {
            issues.add_issue(
                AssetType::ManagedObject,
                name,
                format!("duplicate bound name at {} scope, first registration wins", scope),
            );
            continue;
        }
        match entry {
            ScopeObjectConfig::Bound(config) => {
                let Some(source) = sources.get(&config.source_name) else {
                    issues.add_issue(
                        AssetType::ManagedObject,
                        name,
                        format!("unknown managed object source '{}'", config.source_name),
                    );
                    continue;
                };
                registrations.insert(name.to_string(), Registration::Local(pending.len()));
                pending.push(Pending {
                    config,
                    source,
                    dependencies: Vec::new(),
                    dead: false,
                });
            }
            ScopeObjectConfig::Linked { name, target } => {
                let Some(index) = enclosing.and_then(|r| r.resolve(target)) else {
                    issues.add_issue(
                        AssetType::ManagedObject,
                        name.as_str(),
                        format!("link target '{}' is not bound at any enclosing scope", target),
                    );
                    continue;
                };
                registrations.insert(name.clone(), Registration::Outer(index));
            }
        }
    }

    // Phase 2: resolve dependency keys against the full name table, so a
    // binding declared later in the list is a valid dependency.
    for i in 0..pending.len() {
        let config = pending[i].config;
        let declared = &pending[i].source.meta.dependencies;
        let mut resolved = Vec::with_capacity(declared.len());
        let mut dead = false;

        for mapping in &config.dependencies {
            if !declared.iter().any(|d| d.label == mapping.key) {
                issues.add_issue(
                    AssetType::ManagedObject,
                    &config.bound_name,
                    format!("mapping for undeclared dependency key '{}'", mapping.key),
                );
                dead = true;
            }
        }

        for dependency in declared {
            let Some(mapping) = config
                .dependencies
                .iter()
                .find(|m| m.key == dependency.label)
            else {
                issues.add_issue(
                    AssetType::ManagedObject,
                    &config.bound_name,
                    format!("no mapping for dependency '{}'", dependency.label),
                );
                dead = true;
                continue;
            };
            match registrations.get(&mapping.bound_name) {
                Some(Registration::Local(slot)) => {
                    resolved.push(ResolvedDependency::Local(*slot));
                }
                Some(Registration::Outer(index)) => {
                    resolved.push(ResolvedDependency::Outer(*index));
                }
                None => match enclosing.and_then(|r| r.resolve(&mapping.bound_name)) {
                    Some(index) => resolved.push(ResolvedDependency::Outer(index)),
                    None => {
                        issues.add_issue(
                            AssetType::ManagedObject,
                            &config.bound_name,
                            format!(
                                "dependency '{}' resolves to unknown bound name '{}'",
                                dependency.label, mapping.bound_name
                            ),
                        );
                        dead = true;
                    }
                },
            }
        }

        pending[i].dependencies = resolved;
        pending[i].dead = dead;
    }

    // Cascade: a binding depending on a dead local binding is dead too.
    loop {
        let mut cascaded = Vec::new();
        for (i, entry) in pending.iter().enumerate() {
            if entry.dead {
                continue;
            }
            if let Some(dead_dep) = entry.dependencies.iter().find_map(|d| match d {
                ResolvedDependency::Local(slot) if pending[*slot].dead => {
                    Some(pending[*slot].config.bound_name.clone())
                }
                _ => None,
            }) {
                cascaded.push((i, dead_dep));
            }
        }
        if cascaded.is_empty() {
            break;
        }
        for (i, dead_dep) in cascaded {
            issues.add_issue(
                AssetType::ManagedObject,
                &pending[i].config.bound_name,
                format!("depends on '{}' which failed to construct", dead_dep),
            );
            pending[i].dead = true;
        }
    }

    // Compact survivors into final slots.
    let mut final_slot: HashMap<usize, usize> = HashMap::new();
    for (i, entry) in pending.iter().enumerate() {
        if !entry.dead {
            let slot = final_slot.len();
            final_slot.insert(i, slot);
        }
    }

    let mut objects = Vec::with_capacity(final_slot.len());
    for entry in pending.iter() {
        if entry.dead {
            continue;
        }
        let dependencies = entry
            .dependencies
            .iter()
            .map(|d| match d {
                ResolvedDependency::Local(slot) => {
                    ManagedObjectIndex::new(scope, final_slot[slot])
                }
                ResolvedDependency::Outer(index) => *index,
            })
            .collect();
        objects.push(Arc::new(ManagedObjectMetadata {
            bound_name: entry.config.bound_name.clone(),
            source: entry.source.source.clone(),
            timeout: entry.source.timeout,
            dependencies,
            extensions: entry.source.meta.extensions.clone(),
            pool: entry.source.pool.clone(),
        }));
    }

    let mut names = HashMap::new();
    for (name, registration) in registrations {
        match registration {
            Registration::Local(slot) => {
                if let Some(final_slot) = final_slot.get(&slot) {
                    names.insert(name, ManagedObjectIndex::new(scope, *final_slot));
                }
            }
            Registration::Outer(index) => {
                names.insert(name, index);
            }
        }
    }

    ScopeBindings {
        scope,
        names,
        objects,
    }
}

/// Convenience wrapper for scopes whose configuration is all-bound
/// (process and thread scope lists take no linked entries).
pub(crate) fn all_bound(configs: &[BoundManagedObjectConfig]) -> Vec<ScopeObjectConfig> {
    configs
        .iter()
        .cloned()
        .map(ScopeObjectConfig::Bound)
        .collect()
}
