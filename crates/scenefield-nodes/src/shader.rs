#![forbid(unsafe_code)]

use std::any::Any;
use std::rc::{Rc, Weak};

use scenefield_core::{
    AccessType, DynamicFieldHost, FieldBuild, FieldRef, NamedNode, Node, NodeCore, NodeRef,
    SignalField, TypeDef,
};

use crate::parts::{self, NodePart, ShaderPart, X3D_SHADER_NODE};
use crate::{unwire, wire};

/// A shader program whose uniforms are added per instance.
///
/// Every added uniform, and `activate`, is routed into `uniforms_changed`.
pub struct ProgramShader {
    core: NodeCore,
    node: NodePart,
    shader: ShaderPart,
    uniforms: DynamicFieldHost,
    uniforms_changed: Rc<SignalField>,
}

impl NamedNode for ProgramShader {
    const TYPE_NAME: &'static str = "ProgramShader";
}

impl ProgramShader {
    #[must_use]
    pub fn new() -> Rc<Self> {
        let shader = Rc::new_cyclic(|this: &Weak<Self>| {
            let owner: Weak<dyn Node> = this.clone();
            let uniforms = DynamicFieldHost::new();
            uniforms.bind_owner(owner.clone());
            Self {
                core: NodeCore::new(),
                node: NodePart::new(&owner),
                shader: ShaderPart::new(&owner),
                uniforms,
                uniforms_changed: SignalField::new()
                    .named("uniformsChanged")
                    .owned_by(owner),
            }
        });
        wire(&*shader.shader.activate, &*shader.uniforms_changed);
        parts::init(&shader);
        shader
    }

    /// Add a uniform. `false` if the name is already in use.
    pub fn add_uniform(&self, name: impl Into<String>, access: AccessType, field: FieldRef) -> bool {
        self.uniforms.add_field(name, access, field)
    }

    #[must_use]
    pub fn uniforms(&self) -> &DynamicFieldHost {
        &self.uniforms
    }

    #[must_use]
    pub fn uniforms_changed(&self) -> &Rc<SignalField> {
        &self.uniforms_changed
    }

    #[must_use]
    pub fn part_fields(&self) -> &ShaderPart {
        &self.shader
    }

    pub(crate) fn type_def() -> TypeDef {
        TypeDef::new(Self::TYPE_NAME)
            .parent(X3D_SHADER_NODE)
            .factory(|| -> NodeRef { Self::new() })
    }
}

impl Node for ProgramShader {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn part(&self, type_name: &str) -> Option<&dyn Any> {
        match type_name {
            parts::X3D_NODE => Some(&self.node as &dyn Any),
            X3D_SHADER_NODE => Some(&self.shader as &dyn Any),
            _ => None,
        }
    }

    fn dynamic_fields(&self) -> Option<&DynamicFieldHost> {
        Some(&self.uniforms)
    }

    fn field_added(&self, _name: &str, field: &FieldRef) {
        wire(&**field, &*self.uniforms_changed);
    }

    fn field_removed(&self, _name: &str, field: &FieldRef) {
        unwire(&**field, &*self.uniforms_changed);
    }

    fn default_container_field(&self) -> &'static str {
        "shaders"
    }
}
