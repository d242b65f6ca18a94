#![forbid(unsafe_code)]

//! Scenefield public facade.
//!
//! Re-exports the field/route engine from `scenefield-core` and, with the
//! default `nodes` feature, the node types from `scenefield-nodes`.
//!
//! ```
//! use scenefield::prelude::*;
//!
//! let a = ValueField::new(1.0_f32);
//! let b = ValueField::new(0.0_f32);
//! a.route(&*b).unwrap();
//! assert_eq!(b.value(), 1.0);
//! ```

use std::fmt;

pub use scenefield_core as engine;
#[cfg(feature = "nodes")]
pub use scenefield_nodes as nodes;

pub use scenefield_core::{ConfigError, FieldError, GraphConfig, RegistryError};

#[cfg(feature = "log-init")]
pub mod logging;

/// Errors raised while setting up a thread for scene work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Config(ConfigError),
    Registry(RegistryError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration: {err}"),
            Self::Registry(err) => write!(f, "type registration: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Registry(err) => Some(err),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err)
    }
}

/// Register the bundled node types in this thread's default registry.
#[cfg(feature = "nodes")]
pub fn register_builtin_types() -> Result<(), RegistryError> {
    scenefield_nodes::register_default()
}

/// Prepare the current thread: install the configuration read from the
/// `SCENEFIELD_*` environment variables and, with the `nodes` feature,
/// register the bundled node types.
///
/// Returns the installed configuration. Registering twice on one thread
/// fails with [`RegistryError::DuplicateType`].
pub fn bootstrap() -> Result<GraphConfig, Error> {
    let config = GraphConfig::from_env()?;
    config.install();
    #[cfg(feature = "nodes")]
    register_builtin_types()?;
    tracing::debug!(?config, "scenefield thread ready");
    Ok(config)
}

pub mod prelude {
    pub use scenefield_core::{
        AccessType, DependentDescriptor, DependentNodeField, DependentNodeListField, EventSink,
        Field, FieldBuild, FieldError, FieldExt, FieldRef, GraphConfig, LinkMode, ListField,
        NamedNode, Node, NodeExt, NodeField, NodeFilter, NodeListField, NodeRef, Period,
        RealtimeField, Requester, SignalField, TypeConstraint, UpdateMode, ValueField, Vec2f,
        Vec3f, registry,
    };

    #[cfg(feature = "nodes")]
    pub use scenefield_nodes::{
        BoxNode, Coordinate, Group, PointSet, ProgramShader, Shape,
    };
}
