//! Foreman: an index-based inversion-of-control execution kernel with
//! pluggable worker pools.
//!
//! A floor is built from a declarative configuration (builder API or YAML
//! document) naming teams, managed object sources, and works of functions.
//! Construction resolves every name to an integer index up front and reports
//! problems through an issue sink rather than failing fast; a floor only
//! opens when construction produced no issues. At runtime, functions run as
//! job chains on their assigned teams, with managed objects sourced lazily,
//! coordinated against their dependencies, and administered around function
//! bodies.
//!
//! The typical entry point is [`Floor::open`] followed by
//! [`Floor::invoke_work`].

pub mod config;
pub mod construct;
pub mod error;
pub mod floor;
pub mod issues;
mod kernel;
pub mod metadata;
pub mod properties;
pub mod source;
pub mod teams;

pub use error::{FloorError, Result};
pub use floor::{EscalationHandler, Floor, LoggingEscalationHandler, ProcessHandle};
pub use issues::{AssetType, Issue, Issues};
pub use properties::{Property, PropertyList};
