#![forbid(unsafe_code)]

use std::any::Any;
use std::rc::{Rc, Weak};

use scenefield_core::{
    AccessType, FieldBuild, FieldDescriptor, ListField, NamedNode, Node, NodeCore, NodeRef,
    SignalField, TypeDef, Vec3f,
};

use crate::parts::{self, GeometricPropertyPart, NodePart, X3D_COORDINATE_NODE};
use crate::wire;

/// A list of 3D points, used by geometry nodes.
///
/// Every change of `point` raises the internal `propertyChanged` signal.
pub struct Coordinate {
    core: NodeCore,
    node: NodePart,
    property: GeometricPropertyPart,
    pub point: Rc<ListField<Vec3f>>,
}

impl NamedNode for Coordinate {
    const TYPE_NAME: &'static str = "Coordinate";
}

impl Coordinate {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_points(Vec::new())
    }

    #[must_use]
    pub fn with_points(points: Vec<Vec3f>) -> Rc<Self> {
        let coord = Rc::new_cyclic(|this: &Weak<Self>| {
            let owner: Weak<dyn Node> = this.clone();
            Self {
                core: NodeCore::new(),
                node: NodePart::new(&owner),
                property: GeometricPropertyPart::new(&owner),
                point: ListField::new(points).owned_by(owner),
            }
        });
        wire(&*coord.point, &*coord.property.changed);
        parts::init(&coord);
        coord
    }

    /// Raised whenever `point` changes.
    #[must_use]
    pub fn changed(&self) -> &Rc<SignalField> {
        &self.property.changed
    }

    pub(crate) fn type_def() -> TypeDef {
        TypeDef::new(Self::TYPE_NAME)
            .parent(X3D_COORDINATE_NODE)
            .factory(|| -> NodeRef { Self::new() })
            .field(FieldDescriptor::of(
                "point",
                AccessType::InputOutput,
                |n: &Self| &n.point,
            ))
    }
}

impl Node for Coordinate {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn part(&self, type_name: &str) -> Option<&dyn Any> {
        match type_name {
            parts::X3D_NODE => Some(&self.node as &dyn Any),
            parts::X3D_GEOMETRIC_PROPERTY_NODE | X3D_COORDINATE_NODE => {
                Some(&self.property as &dyn Any)
            }
            _ => None,
        }
    }

    fn default_container_field(&self) -> &'static str {
        "coord"
    }
}
