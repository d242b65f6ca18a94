#![forbid(unsafe_code)]

use std::any::Any;
use std::rc::{Rc, Weak};

use scenefield_core::{
    AccessType, DependentDescriptor, DependentNodeField, FieldBuild, FieldDescriptor, LinkMode,
    NamedNode, Node, NodeCore, NodeFilter, NodeRef, SignalField, TypeDef,
};

use crate::parts::{self, GeometryPart, NodePart, X3D_CHILD_NODE, X3D_GEOMETRY_NODE, X3D_SHAPE_NODE};
use crate::wire;

/// Pairs a geometry with its appearance.
///
/// `geometry` relays its node's geometry signal into `display_changed`, so
/// anything that alters the held geometry invalidates the shape.
pub struct Shape {
    core: NodeCore,
    node: NodePart,
    pub geometry: Rc<DependentNodeField>,
    display_changed: Rc<SignalField>,
}

impl NamedNode for Shape {
    const TYPE_NAME: &'static str = "Shape";
}

impl Shape {
    #[must_use]
    pub fn new() -> Rc<Self> {
        let shape = Rc::new_cyclic(|this: &Weak<Self>| {
            let owner: Weak<dyn Node> = this.clone();
            Self {
                core: NodeCore::new(),
                node: NodePart::new(&owner),
                geometry: DependentNodeField::dependent(
                    vec![DependentDescriptor::part(
                        X3D_GEOMETRY_NODE,
                        |p: &GeometryPart| &p.changed,
                    )],
                    LinkMode::Loose,
                )
                .with_filter(NodeFilter::is_a(X3D_GEOMETRY_NODE))
                .owned_by(owner.clone()),
                display_changed: SignalField::new()
                    .named("displayChanged")
                    .owned_by(owner),
            }
        });
        wire(&*shape.geometry, &*shape.display_changed);
        parts::init(&shape);
        shape
    }

    /// Raised when the geometry is swapped or the held geometry changes.
    #[must_use]
    pub fn display_changed(&self) -> &Rc<SignalField> {
        &self.display_changed
    }

    pub(crate) fn type_def() -> TypeDef {
        TypeDef::new(Self::TYPE_NAME)
            .parent(X3D_SHAPE_NODE)
            .factory(|| -> NodeRef { Self::new() })
            .field(FieldDescriptor::of(
                "geometry",
                AccessType::InputOutput,
                |n: &Self| &n.geometry,
            ))
    }
}

impl Node for Shape {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn part(&self, type_name: &str) -> Option<&dyn Any> {
        match type_name {
            parts::X3D_NODE | X3D_CHILD_NODE | X3D_SHAPE_NODE => Some(&self.node as &dyn Any),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use scenefield_core::{FieldError, FieldExt, Vec3f};

    use super::*;
    use crate::coordinate::Coordinate;
    use crate::geometry::{BoxNode, PointSet};

    #[test]
    fn geometry_edits_reach_the_shape() {
        let shape = Shape::new();
        let b = BoxNode::new();
        shape.geometry.set_value(Some(b.clone())).unwrap();
        assert_eq!(shape.geometry.hooks().linked_nodes(), 1);

        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _sub = shape
            .display_changed()
            .subscribe(move |_| counter.set(counter.get() + 1));
        b.size.set_value(Vec3f::new(3.0, 1.0, 1.0)).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn nested_dependencies_chain() {
        let shape = Shape::new();
        let ps = PointSet::new();
        let c = Coordinate::new();
        ps.coord.set_value(Some(c.clone())).unwrap();
        shape.geometry.set_value(Some(ps)).unwrap();

        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _sub = shape
            .display_changed()
            .subscribe(move |_| counter.set(counter.get() + 1));
        c.point.push(Vec3f::ZERO).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn geometry_must_be_a_geometry() {
        let shape = Shape::new();
        let err = shape.geometry.set_value(Some(Coordinate::new())).unwrap_err();
        assert!(matches!(err, FieldError::InvalidNodeType { .. }));
    }
}
