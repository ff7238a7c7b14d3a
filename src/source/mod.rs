//! Pluggable source contracts consumed by the kernel.
//!
//! Collaborators outside the core implement these traits: worker pools come
//! from a [`team::TeamSource`], runtime resources from a
//! [`managed_object::ManagedObjectSource`], cross-cutting pre/post
//! processing from an [`admin::AdministratorSource`], and function bodies
//! from [`work::ManagedFunction`].

pub mod admin;
pub mod managed_object;
pub mod team;
pub mod work;

/// Descriptor for one property a source understands.
///
/// Returned from a source's `specification()` so tooling can prompt for and
/// validate configuration before the source is initialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    /// Property name.
    pub name: String,
    /// Whether the source refuses to initialise without it.
    pub required: bool,
}

impl PropertySpec {
    /// A required property.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    /// An optional property.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}
