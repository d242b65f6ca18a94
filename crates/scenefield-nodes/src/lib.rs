#![forbid(unsafe_code)]

//! Scene-graph node types built on `scenefield-core`.
//!
//! Abstract types ([`parts`]) carry their fields in part structs that
//! concrete nodes embed. [`register_all`] adds every type, abstract ones
//! first, to a [`TypeRegistry`].
//!
//! # Example
//!
//! ```
//! use scenefield_core::{FieldExt, Vec3f};
//! use scenefield_nodes::{BoxNode, Shape};
//!
//! let shape = Shape::new();
//! let geometry = BoxNode::new();
//! shape.geometry.set_value(Some(geometry.clone())).unwrap();
//!
//! geometry.size.set_value(Vec3f::new(1.0, 1.0, 1.0)).unwrap();
//! assert_eq!(
//!     shape.display_changed().latest_event().stamp,
//!     geometry.size.latest_event().stamp,
//! );
//! ```

pub mod coordinate;
pub mod geometry;
pub mod grouping;
pub mod parts;
pub mod shader;
pub mod shape;

pub use coordinate::Coordinate;
pub use geometry::{BoxNode, PointSet};
pub use grouping::Group;
pub use parts::{GeometricPropertyPart, GeometryPart, GroupingPart, NodePart, ShaderPart};
pub use shader::ProgramShader;
pub use shape::Shape;

use scenefield_core::{Field, RegistryError, Requester, TypeRegistry, route};
use tracing::warn;

/// Route between two fields of the same node, bypassing access checks.
pub(crate) fn wire(from: &dyn Field, to: &dyn Field) {
    if let Err(err) = route::connect(from, to, false, Requester::Graph) {
        warn!(%err, "internal route not created");
    }
}

/// Remove a route made by [`wire`].
pub(crate) fn unwire(from: &dyn Field, to: &dyn Field) {
    if !route::disconnect(from, to) {
        warn!(from = %from.base().full_name(), "internal route already gone");
    }
}

/// Register the abstract types and every node type of this crate.
pub fn register_all(reg: &mut TypeRegistry) -> Result<(), RegistryError> {
    parts::register_abstract(reg)?;
    for def in [
        Coordinate::type_def(),
        BoxNode::type_def(),
        PointSet::type_def(),
        Group::type_def(),
        Shape::type_def(),
        ProgramShader::type_def(),
    ] {
        reg.register_type(def)?;
    }
    Ok(())
}

/// Register everything into the thread's default registry.
pub fn register_default() -> Result<(), RegistryError> {
    scenefield_core::registry::with_mut(register_all)
}
