#![forbid(unsafe_code)]

//! Abstract node types and the parts that carry their fields.
//!
//! An abstract type with declared fields has a part struct here. Concrete
//! nodes embed the parts of every abstract type they derive from and hand
//! them out from [`Node::part`](scenefield_core::Node::part).

use std::rc::{Rc, Weak};

use scenefield_core::{
    AccessType, FieldBuild, FieldDescriptor, NoHooks, Node, NodeField, NodeListField, NodeRef,
    RegistryError, SignalField, TypeConstraint, TypeDef, TypeRegistry, ValueField, registry,
};

use crate::wire;

pub const X3D_NODE: &str = "X3DNode";
pub const X3D_CHILD_NODE: &str = "X3DChildNode";
pub const X3D_GROUPING_NODE: &str = "X3DGroupingNode";
pub const X3D_GEOMETRIC_PROPERTY_NODE: &str = "X3DGeometricPropertyNode";
pub const X3D_COORDINATE_NODE: &str = "X3DCoordinateNode";
pub const X3D_GEOMETRY_NODE: &str = "X3DGeometryNode";
pub const X3D_SHAPE_NODE: &str = "X3DShapeNode";
pub const X3D_SHADER_NODE: &str = "X3DShaderNode";

/// Fields every node has.
pub struct NodePart {
    pub metadata: Rc<NodeField>,
}

impl NodePart {
    pub(crate) fn new(owner: &Weak<dyn Node>) -> Self {
        Self {
            metadata: NodeField::<NoHooks>::new().owned_by(owner.clone()),
        }
    }
}

/// Signal raised whenever a geometric property (coordinates, colors, ...)
/// changes. Not a declared field.
pub struct GeometricPropertyPart {
    pub changed: Rc<SignalField>,
}

impl GeometricPropertyPart {
    pub(crate) fn new(owner: &Weak<dyn Node>) -> Self {
        Self {
            changed: SignalField::new()
                .named("propertyChanged")
                .owned_by(owner.clone()),
        }
    }
}

/// Signal raised whenever anything affecting a geometry's shape changes.
/// Not a declared field.
pub struct GeometryPart {
    pub changed: Rc<SignalField>,
}

impl GeometryPart {
    pub(crate) fn new(owner: &Weak<dyn Node>) -> Self {
        Self {
            changed: SignalField::new()
                .named("geometryChanged")
                .owned_by(owner.clone()),
        }
    }
}

/// Children of a grouping node, plus the input-only fields that edit them.
pub struct GroupingPart {
    pub children: Rc<NodeListField>,
    pub add_children: Rc<NodeListField>,
    pub remove_children: Rc<NodeListField>,
}

impl GroupingPart {
    pub(crate) fn new(owner: &Weak<dyn Node>) -> Self {
        Self {
            children: NodeListField::<NoHooks>::new().owned_by(owner.clone()),
            add_children: NodeListField::<NoHooks>::new()
                .with_access(AccessType::InputOnly)
                .owned_by(owner.clone()),
            remove_children: NodeListField::<NoHooks>::new()
                .with_access(AccessType::InputOnly)
                .owned_by(owner.clone()),
        }
    }
}

/// Fields shared by all shader nodes.
pub struct ShaderPart {
    pub activate: Rc<ValueField<bool>>,
    pub is_valid: Rc<ValueField<bool>>,
    pub language: Rc<ValueField<String>>,
}

impl ShaderPart {
    pub(crate) fn new(owner: &Weak<dyn Node>) -> Self {
        let language = ValueField::new(String::new())
            .with_access(AccessType::InitializeOnly)
            .owned_by(owner.clone());
        let is_valid = ValueField::computed(
            false,
            TypeConstraint::exactly(["SFString"]),
            |inputs| Some(!inputs.get::<String>(0)?.is_empty()),
        )
        .with_access(AccessType::OutputOnly)
        .owned_by(owner.clone());
        wire(&*language, &*is_valid);
        Self {
            activate: ValueField::new(false)
                .with_access(AccessType::InputOnly)
                .owned_by(owner.clone()),
            is_valid,
            language,
        }
    }
}

/// Register the abstract types, parents first.
pub fn register_abstract(reg: &mut TypeRegistry) -> Result<(), RegistryError> {
    reg.register_type(TypeDef::new(X3D_NODE).field(FieldDescriptor::part(
        "metadata",
        AccessType::InputOutput,
        X3D_NODE,
        |p: &NodePart| &p.metadata,
    )))?;
    reg.register_type(TypeDef::new(X3D_CHILD_NODE).parent(X3D_NODE))?;
    reg.register_type(
        TypeDef::new(X3D_GROUPING_NODE)
            .parent(X3D_CHILD_NODE)
            .field(FieldDescriptor::part(
                "addChildren",
                AccessType::InputOnly,
                X3D_GROUPING_NODE,
                |p: &GroupingPart| &p.add_children,
            ))
            .field(FieldDescriptor::part(
                "removeChildren",
                AccessType::InputOnly,
                X3D_GROUPING_NODE,
                |p: &GroupingPart| &p.remove_children,
            ))
            .field(FieldDescriptor::part(
                "children",
                AccessType::InputOutput,
                X3D_GROUPING_NODE,
                |p: &GroupingPart| &p.children,
            )),
    )?;
    reg.register_type(TypeDef::new(X3D_GEOMETRIC_PROPERTY_NODE).parent(X3D_NODE))?;
    reg.register_type(TypeDef::new(X3D_COORDINATE_NODE).parent(X3D_GEOMETRIC_PROPERTY_NODE))?;
    reg.register_type(TypeDef::new(X3D_GEOMETRY_NODE).parent(X3D_NODE))?;
    reg.register_type(TypeDef::new(X3D_SHAPE_NODE).parent(X3D_CHILD_NODE))?;
    reg.register_type(
        TypeDef::new(X3D_SHADER_NODE)
            .parent(X3D_NODE)
            .field(FieldDescriptor::part(
                "activate",
                AccessType::InputOnly,
                X3D_SHADER_NODE,
                |p: &ShaderPart| &p.activate,
            ))
            .field(FieldDescriptor::part(
                "isValid",
                AccessType::OutputOnly,
                X3D_SHADER_NODE,
                |p: &ShaderPart| &p.is_valid,
            ))
            .field(FieldDescriptor::part(
                "language",
                AccessType::InitializeOnly,
                X3D_SHADER_NODE,
                |p: &ShaderPart| &p.language,
            )),
    )?;
    Ok(())
}

/// Apply the default registry's names and policies to a new node.
pub(crate) fn init<N: Node>(node: &Rc<N>) {
    let node: NodeRef = Rc::<N>::clone(node);
    registry::init_node(&node);
}
