#![forbid(unsafe_code)]

//! Geometry nodes.
//!
//! Each geometry embeds a [`GeometryPart`] whose `changed` signal fires on
//! anything that affects its shape. Containers of geometries watch that
//! signal instead of the individual fields.

use std::any::Any;
use std::rc::{Rc, Weak};

use scenefield_core::{
    AccessType, DependentDescriptor, DependentNodeField, FieldBuild, FieldDescriptor, LinkMode,
    NamedNode, Node, NodeCore, NodeFilter, NodeRef, SignalField, TypeConstraint, TypeDef,
    ValueField, Vec3f,
};

use crate::coordinate::Coordinate;
use crate::parts::{
    self, GeometricPropertyPart, GeometryPart, NodePart, X3D_COORDINATE_NODE,
    X3D_GEOMETRIC_PROPERTY_NODE, X3D_GEOMETRY_NODE,
};
use crate::wire;

// ---------------------------------------------------------------------------
// Box
// ---------------------------------------------------------------------------

/// An axis-aligned box centred on the origin.
pub struct BoxNode {
    core: NodeCore,
    node: NodePart,
    geometry: GeometryPart,
    pub size: Rc<ValueField<Vec3f>>,
    pub solid: Rc<ValueField<bool>>,
}

impl NamedNode for BoxNode {
    const TYPE_NAME: &'static str = "Box";
}

impl BoxNode {
    #[must_use]
    pub fn new() -> Rc<Self> {
        let node = Rc::new_cyclic(|this: &Weak<Self>| {
            let owner: Weak<dyn Node> = this.clone();
            Self {
                core: NodeCore::new(),
                node: NodePart::new(&owner),
                geometry: GeometryPart::new(&owner),
                size: ValueField::new(Vec3f::new(2.0, 2.0, 2.0)).owned_by(owner.clone()),
                solid: ValueField::new(true)
                    .with_access(AccessType::InitializeOnly)
                    .owned_by(owner),
            }
        });
        wire(&*node.size, &*node.geometry.changed);
        parts::init(&node);
        node
    }

    #[must_use]
    pub fn changed(&self) -> &Rc<SignalField> {
        &self.geometry.changed
    }

    pub(crate) fn type_def() -> TypeDef {
        TypeDef::new(Self::TYPE_NAME)
            .parent(X3D_GEOMETRY_NODE)
            .factory(|| -> NodeRef { Self::new() })
            .field(FieldDescriptor::of("size", AccessType::InputOutput, |n: &Self| &n.size))
            .field(FieldDescriptor::of(
                "solid",
                AccessType::InitializeOnly,
                |n: &Self| &n.solid,
            ))
    }
}

impl Node for BoxNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn part(&self, type_name: &str) -> Option<&dyn Any> {
        match type_name {
            parts::X3D_NODE => Some(&self.node as &dyn Any),
            X3D_GEOMETRY_NODE => Some(&self.geometry as &dyn Any),
            _ => None,
        }
    }

    fn default_container_field(&self) -> &'static str {
        "geometry"
    }
}

// ---------------------------------------------------------------------------
// PointSet
// ---------------------------------------------------------------------------

/// Unconnected points taken from a coordinate node.
///
/// `coord` relays the coordinate node's property signal, so editing the
/// points of the held node raises this geometry's `changed` signal.
pub struct PointSet {
    core: NodeCore,
    node: NodePart,
    geometry: GeometryPart,
    pub coord: Rc<DependentNodeField>,
    pub point_count: Rc<ValueField<i32>>,
}

impl NamedNode for PointSet {
    const TYPE_NAME: &'static str = "PointSet";
}

fn count_points(held: Option<NodeRef>) -> i32 {
    held.as_deref()
        .and_then(|node| node.downcast_ref::<Coordinate>())
        .map_or(0, |coord| i32::try_from(coord.point.len()).unwrap_or(i32::MAX))
}

impl PointSet {
    #[must_use]
    pub fn new() -> Rc<Self> {
        let node = Rc::new_cyclic(|this: &Weak<Self>| {
            let owner: Weak<dyn Node> = this.clone();
            let coord = DependentNodeField::dependent(
                vec![DependentDescriptor::part(
                    X3D_GEOMETRIC_PROPERTY_NODE,
                    |p: &GeometricPropertyPart| &p.changed,
                )],
                LinkMode::Loose,
            )
            .with_filter(NodeFilter::is_a(X3D_COORDINATE_NODE))
            .owned_by(owner.clone());
            let point_count = ValueField::computed(
                0,
                TypeConstraint::exactly(["SFNode"]),
                |inputs| Some(count_points(inputs.get::<Option<NodeRef>>(0)?)),
            )
            .with_access(AccessType::OutputOnly)
            .owned_by(owner.clone());
            Self {
                core: NodeCore::new(),
                node: NodePart::new(&owner),
                geometry: GeometryPart::new(&owner),
                coord,
                point_count,
            }
        });
        wire(&*node.coord, &*node.geometry.changed);
        wire(&*node.coord, &*node.point_count);
        parts::init(&node);
        node
    }

    #[must_use]
    pub fn changed(&self) -> &Rc<SignalField> {
        &self.geometry.changed
    }

    pub(crate) fn type_def() -> TypeDef {
        TypeDef::new(Self::TYPE_NAME)
            .parent(X3D_GEOMETRY_NODE)
            .factory(|| -> NodeRef { Self::new() })
            .field(FieldDescriptor::of(
                "coord",
                AccessType::InputOutput,
                |n: &Self| &n.coord,
            ))
            .field(FieldDescriptor::of(
                "pointCount",
                AccessType::OutputOnly,
                |n: &Self| &n.point_count,
            ))
    }
}

impl Node for PointSet {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn part(&self, type_name: &str) -> Option<&dyn Any> {
        match type_name {
            parts::X3D_NODE => Some(&self.node as &dyn Any),
            X3D_GEOMETRY_NODE => Some(&self.geometry as &dyn Any),
            _ => None,
        }
    }

    fn default_container_field(&self) -> &'static str {
        "geometry"
    }
}
