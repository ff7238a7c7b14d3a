//! The construction phase: configuration in, immutable metadata out.
//!
//! Every construct function follows the same contract: validate, resolve
//! names to indices, report each problem through the [`Issues`] sink, and
//! return `None` (or drop the item) on failure. Nothing here panics or
//! returns an error; a misconfigured item must not abort construction of
//! its siblings.

mod admin;
mod bound;
mod managed_object_source;
mod office;
mod team;
mod work;

pub use managed_object_source::{ConstructedObjectSource, construct_object_source};
pub use office::{ConstructedOffice, construct_office};
pub use team::{ConstructedTeam, construct_team};
pub(crate) use admin::construct_administrator;
pub(crate) use bound::{ScopeBindings, construct_bound_objects};
pub(crate) use work::{ConstructedWork, WorkScaffold};

use crate::issues::{AssetType, Issues};
use crate::metadata::{ManagedObjectIndex, ManagedObjectMetadata, ManagedObjectScope};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

#[cfg(test)]
mod tests;

/// Valid asset names: leading letter, then letters, digits, `_` or `-`.
/// Dots are reserved for qualified `work.function` references.
static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("invalid name regex"));

/// Validate an asset name, reporting an issue when invalid.
pub(crate) fn check_name(name: &str, asset: AssetType, issues: &mut Issues) -> bool {
    if name.trim().is_empty() {
        issues.add_issue(asset, "<unnamed>", "name is blank");
        return false;
    }
    if !NAME_REGEX.is_match(name) {
        issues.add_issue(
            asset,
            name,
            "invalid name: use a leading letter then letters, digits, '_' or '-'",
        );
        return false;
    }
    true
}

/// Chained name-to-index resolution across nested scopes.
///
/// A scope-local name always shadows a same-named binding at an enclosing
/// scope.
pub(crate) struct ScopeResolver<'a> {
    local: &'a HashMap<String, ManagedObjectIndex>,
    parent: Option<&'a ScopeResolver<'a>>,
}

impl<'a> ScopeResolver<'a> {
    /// Resolver for an outermost scope.
    pub fn root(local: &'a HashMap<String, ManagedObjectIndex>) -> Self {
        Self {
            local,
            parent: None,
        }
    }

    /// Resolver for a scope nested inside `parent`.
    pub fn nested(
        local: &'a HashMap<String, ManagedObjectIndex>,
        parent: &'a ScopeResolver<'a>,
    ) -> Self {
        Self {
            local,
            parent: Some(parent),
        }
    }

    /// Resolve a bound name, innermost scope first.
    pub fn resolve(&self, name: &str) -> Option<ManagedObjectIndex> {
        self.local
            .get(name)
            .copied()
            .or_else(|| self.parent.and_then(|p| p.resolve(name)))
    }
}

/// Lookup of managed object metadata by index, across all scopes known at
/// one construction point.
pub(crate) struct ObjectTables<'a> {
    pub process: &'a [Arc<ManagedObjectMetadata>],
    pub thread: &'a [Arc<ManagedObjectMetadata>],
    pub work: &'a [Arc<ManagedObjectMetadata>],
    pub function: &'a [Arc<ManagedObjectMetadata>],
}

impl ObjectTables<'_> {
    /// Metadata for the binding at `index`, if the slot exists.
    pub fn get(&self, index: ManagedObjectIndex) -> Option<&Arc<ManagedObjectMetadata>> {
        let table = match index.scope {
            ManagedObjectScope::Process => self.process,
            ManagedObjectScope::Thread => self.thread,
            ManagedObjectScope::Work => self.work,
            ManagedObjectScope::Function => self.function,
        };
        table.get(index.slot)
    }
}
