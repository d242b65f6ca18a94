//! Type registry: parent chains, aliases, instantiation and dynamic fields.

use std::rc::{Rc, Weak};

use scenefield_core::{
    AccessType, DynamicFieldHost, Field, FieldDescriptor, FieldExt, Node, NodeCore, NodeExt,
    NodeRef, RegistryError, TypeDef, TypeRegistry, ValueField, registry,
};

struct Leaf {
    core: NodeCore,
    f: Rc<ValueField<f32>>,
    g: Rc<ValueField<i32>>,
}

impl Node for Leaf {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "C"
    }
}

fn leaf() -> NodeRef {
    Rc::new(Leaf {
        core: NodeCore::new(),
        f: ValueField::new(1.5),
        g: ValueField::new(0),
    })
}

fn chain() -> TypeRegistry {
    let mut reg = TypeRegistry::new();
    reg.register_type(TypeDef::new("A").field(FieldDescriptor::of(
        "f",
        AccessType::InputOutput,
        |n: &Leaf| &n.f,
    )))
    .unwrap();
    reg.register_type(TypeDef::new("B").parent("A")).unwrap();
    reg.register_type(
        TypeDef::new("C")
            .parent("B")
            .factory(leaf)
            .field(FieldDescriptor::of("g", AccessType::OutputOnly, |n: &Leaf| &n.g)),
    )
    .unwrap();
    reg
}

#[test]
fn field_declared_two_levels_up_is_found() {
    let reg = chain();
    let desc = reg.lookup("C", "f").unwrap();
    assert_eq!(desc.name(), "f");
    assert!(reg.get("A").unwrap().field("f").is_some());
    assert!(reg.get("C").unwrap().field("f").is_none());
    assert!(reg.lookup("C", "missing").is_none());
}

#[test]
fn set_and_changed_names_resolve_for_input_output() {
    let reg = chain();
    let node = reg.instantiate("C").unwrap();
    let f = reg.lookup_field(&*node, "f").unwrap();
    let set_f = reg.lookup_field(&*node, "set_f").unwrap();
    let f_changed = reg.lookup_field(&*node, "f_changed").unwrap();
    assert_eq!(f.base().id(), set_f.base().id());
    assert_eq!(f.base().id(), f_changed.base().id());
    assert!(reg.lookup_field(&*node, "set_g").is_none());
}

#[test]
fn instantiate_names_fields_and_binds_owner() {
    let reg = chain();
    let node = reg.instantiate("C").unwrap();
    node.set_name("L1");
    let g = reg.lookup_field(&*node, "g").unwrap();
    assert_eq!(g.full_name(), "L1.g");
    assert_eq!(g.access(), AccessType::OutputOnly);
    assert!(g.set_value_from_str("3").is_err());
    assert!(matches!(reg.instantiate("A"), Err(RegistryError::NoFactory(_))));
    assert!(matches!(reg.instantiate("Z"), Err(RegistryError::UnknownType(_))));
}

struct Proto {
    core: NodeCore,
    host: DynamicFieldHost,
}

impl Node for Proto {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "ChainProto"
    }

    fn dynamic_fields(&self) -> Option<&DynamicFieldHost> {
        Some(&self.host)
    }
}

#[test]
fn dynamic_field_twice_keeps_the_first() {
    registry::reset();
    let proto = Rc::new_cyclic(|weak: &Weak<Proto>| {
        let host = DynamicFieldHost::new();
        let owner: Weak<dyn Node> = weak.clone();
        host.bind_owner(owner);
        Proto {
            core: NodeCore::new(),
            host,
        }
    });
    let first = ValueField::new(1_i32);
    let second = ValueField::new(2_i32);
    assert!(proto.host.add_field("x", AccessType::InputOutput, first.clone()));
    assert!(!proto.host.add_field("x", AccessType::InputOutput, second));

    let x = proto.get_field("x").unwrap();
    assert_eq!(x.base().id(), first.base().id());
    assert_eq!(x.value_as_string().as_deref(), Some("1"));
    assert_eq!(proto.fields().len(), 1);
}

#[test]
fn dynamic_field_cannot_shadow_a_declared_one() {
    registry::reset();
    registry::register_type(TypeDef::new("ChainProto").field(FieldDescriptor::new(
        "declared",
        AccessType::InputOutput,
        "SFInt32",
        scenefield_core::FieldAccessor::new(|_| None),
    )))
    .unwrap();
    let proto = Rc::new_cyclic(|weak: &Weak<Proto>| {
        let host = DynamicFieldHost::new();
        let owner: Weak<dyn Node> = weak.clone();
        host.bind_owner(owner);
        Proto {
            core: NodeCore::new(),
            host,
        }
    });
    assert!(!proto.host.add_field("declared", AccessType::InputOutput, ValueField::new(0_i32)));
    assert!(proto.host.add_field("other", AccessType::InputOutput, ValueField::new(0_i32)));
    registry::reset();
}
