//! Floor configuration.
//!
//! Configuration is built programmatically through the model types in
//! [`model`], or loaded declaratively from YAML through [`document`] with
//! pluggable sources and function bodies supplied by a registry.

mod document;
mod model;

pub use document::{FloorDocument, SourceRegistry, load_yaml_config, load_yaml_file};
pub use model::{
    AdministratorConfig, AdministratorSourceFactory, BoundManagedObjectConfig,
    DependencyMappingConfig, DutyConfig, EscalationConfig, FloorConfig, FlowConfig,
    FunctionConfig, ManagedObjectSourceConfig, ManagedObjectSourceFactory, ScopeObjectConfig,
    TeamConfig, WorkConfig,
};
