#![forbid(unsafe_code)]

//! Node type registry.
//!
//! Each registered type has a name, an optional parent, an optional
//! factory (abstract types have none) and an ordered table of field
//! descriptors. Field lookups walk the parent chain, so a field declared on
//! `X3DNode` is found on every type that derives from it.
//!
//! A thread-local default registry backs [`NodeExt::get_field`] and
//! [`instantiate`]; [`reset`] empties it. Independent [`TypeRegistry`]
//! values can be created for tests and tools.
//!
//! # Invariants
//!
//! 1. A parent is registered before its children, so the chain is acyclic.
//! 2. Within one type, field names are unique.
//! 3. Lookup order is: own fields, then the parent's, up to the root.
//!
//! [`NodeExt::get_field`]: crate::NodeExt::get_field

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use tracing::{debug, trace};

use crate::access::AccessType;
use crate::error::RegistryError;
use crate::field::{Field, FieldKind, FieldRef};
use crate::node::{Node, NodeRef};

/// Creates a fresh instance of a node type.
pub type NodeFactory = Rc<dyn Fn() -> NodeRef>;

// ---------------------------------------------------------------------------
// FieldAccessor
// ---------------------------------------------------------------------------

/// Resolves one field on a node instance.
#[derive(Clone)]
pub struct FieldAccessor {
    resolve: Rc<dyn Fn(&dyn Node) -> Option<FieldRef>>,
}

impl FieldAccessor {
    pub fn new(resolve: impl Fn(&dyn Node) -> Option<FieldRef> + 'static) -> Self {
        Self {
            resolve: Rc::new(resolve),
        }
    }

    /// A field of concrete node type `N`.
    #[must_use]
    pub fn of<N: Node, F: Field>(get: fn(&N) -> &Rc<F>) -> Self {
        Self::new(move |node| {
            let field: FieldRef = Rc::<F>::clone(get(node.downcast_ref::<N>()?));
            Some(field)
        })
    }

    /// A field of part `P`, the embedded implementation of `part_type`.
    #[must_use]
    pub fn part<P: 'static, F: Field>(part_type: &'static str, get: fn(&P) -> &Rc<F>) -> Self {
        Self::new(move |node| {
            let field: FieldRef = Rc::<F>::clone(get(node.part_as::<P>(part_type)?));
            Some(field)
        })
    }

    /// Any field the node resolves under `name`.
    ///
    /// Goes through the registry, so it cannot back a registry descriptor.
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move |node| crate::node::NodeExt::get_field(node, &name))
    }

    #[must_use]
    pub fn resolve(&self, node: &dyn Node) -> Option<FieldRef> {
        (self.resolve)(node)
    }
}

impl fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// One entry in a type's field table.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    access: AccessType,
    field_type: Cow<'static, str>,
    accessor: FieldAccessor,
}

impl FieldDescriptor {
    pub fn new(
        name: impl Into<String>,
        access: AccessType,
        field_type: impl Into<Cow<'static, str>>,
        accessor: FieldAccessor,
    ) -> Self {
        Self {
            name: name.into(),
            access,
            field_type: field_type.into(),
            accessor,
        }
    }

    /// Descriptor for a field of concrete node type `N`.
    pub fn of<N: Node, F: Field + FieldKind>(
        name: impl Into<String>,
        access: AccessType,
        get: fn(&N) -> &Rc<F>,
    ) -> Self {
        Self::new(name, access, F::TYPE_NAME, FieldAccessor::of(get))
    }

    /// Descriptor for a field held in the part of an abstract type.
    pub fn part<P: 'static, F: Field + FieldKind>(
        name: impl Into<String>,
        access: AccessType,
        part_type: &'static str,
        get: fn(&P) -> &Rc<F>,
    ) -> Self {
        Self::new(name, access, F::TYPE_NAME, FieldAccessor::part(part_type, get))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn access(&self) -> AccessType {
        self.access
    }

    #[must_use]
    pub fn field_type(&self) -> &str {
        &self.field_type
    }

    #[must_use]
    pub fn resolve(&self, node: &dyn Node) -> Option<FieldRef> {
        self.accessor.resolve(node)
    }
}

/// Static description of one field of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub access: AccessType,
    pub field_type: String,
    pub declared_in: String,
}

/// Registration request for one node type.
#[derive(Default)]
pub struct TypeDef {
    name: String,
    parent: Option<String>,
    factory: Option<NodeFactory>,
    fields: Vec<FieldDescriptor>,
    aliases: Vec<String>,
}

impl TypeDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn factory(mut self, factory: impl Fn() -> NodeRef + 'static) -> Self {
        self.factory = Some(Rc::new(factory));
        self
    }

    #[must_use]
    pub fn field(mut self, descriptor: FieldDescriptor) -> Self {
        self.fields.push(descriptor);
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// A registered node type.
pub struct NodeType {
    name: String,
    parent: Option<String>,
    factory: Option<NodeFactory>,
    fields: Vec<FieldDescriptor>,
    index: AHashMap<String, usize>,
}

impl NodeType {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.factory.is_none()
    }

    /// Fields declared on this type itself, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|&i| &self.fields[i])
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("abstract", &self.is_abstract())
            .field("fields", &self.fields.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

/// Table of node types keyed by name.
#[derive(Default)]
pub struct TypeRegistry {
    types: AHashMap<String, NodeType>,
    aliases: AHashMap<String, String>,
    order: Vec<String>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.order)
            .field("aliases", &self.aliases.len())
            .finish()
    }
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateType`] if the name or an alias is taken.
    /// - [`RegistryError::UnknownParentType`] if the parent is not registered.
    /// - [`RegistryError::DuplicateField`] if a field name repeats.
    pub fn register_type(&mut self, def: TypeDef) -> Result<(), RegistryError> {
        let TypeDef {
            name,
            parent,
            factory,
            fields,
            aliases,
        } = def;
        for taken in std::iter::once(&name).chain(&aliases) {
            if self.contains(taken) {
                return Err(RegistryError::DuplicateType(taken.clone()));
            }
        }
        let parent = match parent {
            Some(parent) => Some(
                self.canonical(&parent)
                    .map(str::to_string)
                    .ok_or_else(|| RegistryError::UnknownParentType {
                        type_name: name.clone(),
                        parent,
                    })?,
            ),
            None => None,
        };
        let mut index = AHashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if index.insert(field.name.clone(), i).is_some() {
                return Err(RegistryError::DuplicateField {
                    type_name: name,
                    field: field.name.clone(),
                });
            }
        }
        debug!(type_name = %name, parent = ?parent, fields = fields.len(), "node type registered");
        for alias in aliases {
            self.aliases.insert(alias, name.clone());
        }
        self.order.push(name.clone());
        self.types.insert(
            name.clone(),
            NodeType {
                name,
                parent,
                factory,
                fields,
                index,
            },
        );
        Ok(())
    }

    /// Add another name for a registered type.
    pub fn add_alias(
        &mut self,
        type_name: &str,
        alias: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let alias = alias.into();
        if self.contains(&alias) {
            return Err(RegistryError::DuplicateType(alias));
        }
        let canonical = self
            .canonical(type_name)
            .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))?
            .to_string();
        self.aliases.insert(alias, canonical);
        Ok(())
    }

    fn canonical<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.types.contains_key(name) {
            Some(name)
        } else {
            self.aliases.get(name).map(String::as_str)
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.canonical(name).is_some()
    }

    /// The type registered under `name` or one of its aliases.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NodeType> {
        self.types.get(self.canonical(name)?)
    }

    /// Registered type names in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// `name` followed by its ancestors, nearest first.
    pub fn ancestry<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a NodeType> + use<'a> {
        let mut next = self.get(name);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.parent().and_then(|p| self.types.get(p));
            Some(current)
        })
    }

    /// Whether `name` is `ancestor` or derives from it.
    #[must_use]
    pub fn is_subtype(&self, name: &str, ancestor: &str) -> bool {
        let Some(ancestor) = self.canonical(ancestor) else {
            return false;
        };
        self.ancestry(name).any(|t| t.name == ancestor)
    }

    /// Descriptor for `field` on `type_name`, searching the parent chain.
    #[must_use]
    pub fn lookup(&self, type_name: &str, field: &str) -> Option<&FieldDescriptor> {
        self.ancestry(type_name).find_map(|t| t.field(field))
    }

    /// Resolve `name` on `node`, accepting `set_<f>` and `<f>_changed` for
    /// `InputOutput` fields.
    #[must_use]
    pub fn lookup_field(&self, node: &dyn Node, name: &str) -> Option<FieldRef> {
        let type_name = node.type_name();
        if let Some(desc) = self.lookup(type_name, name) {
            return desc.resolve(node);
        }
        let base = name
            .strip_prefix("set_")
            .or_else(|| name.strip_suffix("_changed"))?;
        self.lookup(type_name, base)
            .filter(|desc| desc.access.accepts_set_prefix())
            .and_then(|desc| desc.resolve(node))
    }

    /// All fields of `type_name`, own first, then inherited.
    ///
    /// Returns `None` for unknown types.
    #[must_use]
    pub fn describe_type(&self, type_name: &str) -> Option<Vec<FieldInfo>> {
        self.get(type_name)?;
        let mut seen = AHashSet::new();
        let mut out = Vec::new();
        for node_type in self.ancestry(type_name) {
            for desc in &node_type.fields {
                if seen.insert(desc.name.as_str()) {
                    out.push(FieldInfo {
                        name: desc.name.clone(),
                        access: desc.access,
                        field_type: desc.field_type.to_string(),
                        declared_in: node_type.name.clone(),
                    });
                }
            }
        }
        Some(out)
    }

    /// Name every declared field of `node`, set its access policy and make
    /// `node` its owner.
    pub fn init_fields(&self, node: &NodeRef) {
        let mut seen = AHashSet::new();
        let owner = Rc::downgrade(node);
        for node_type in self.ancestry(node.type_name()) {
            for desc in &node_type.fields {
                let Some(field) = desc.resolve(&**node) else {
                    continue;
                };
                let base = field.base();
                if !seen.insert(base.id()) {
                    continue;
                }
                base.set_name(desc.name.clone());
                base.set_access(desc.access);
                base.set_owner(owner.clone());
            }
        }
    }

    fn factory(&self, type_name: &str) -> Result<NodeFactory, RegistryError> {
        let node_type = self
            .get(type_name)
            .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))?;
        node_type
            .factory
            .clone()
            .ok_or_else(|| RegistryError::NoFactory(node_type.name.clone()))
    }

    /// Create and initialize fields of a new `type_name` instance.
    pub fn instantiate(&self, type_name: &str) -> Result<NodeRef, RegistryError> {
        let node = (self.factory(type_name)?)();
        self.init_fields(&node);
        Ok(node)
    }

    /// Remove every type and alias.
    pub fn clear(&mut self) {
        self.types.clear();
        self.aliases.clear();
        self.order.clear();
    }
}

// ---------------------------------------------------------------------------
// Thread-local default registry
// ---------------------------------------------------------------------------

thread_local! {
    static REGISTRY: RefCell<TypeRegistry> = RefCell::new(TypeRegistry::new());
}

/// Read the default registry.
///
/// Inside a [`with_mut`] closure the registry is busy; `f` then sees an
/// empty registry, so node constructors and field lookups that run during
/// a modification find no types instead of panicking.
pub fn with<R>(f: impl FnOnce(&TypeRegistry) -> R) -> R {
    REGISTRY.with(|reg| match reg.try_borrow() {
        Ok(reg) => f(&reg),
        Err(_) => {
            trace!("default registry busy, reading an empty view");
            f(&TypeRegistry::new())
        }
    })
}

/// Modify the default registry.
///
/// # Panics
///
/// If called from inside another `with_mut` or `with` closure.
pub fn with_mut<R>(f: impl FnOnce(&mut TypeRegistry) -> R) -> R {
    REGISTRY.with(|reg| f(&mut reg.borrow_mut()))
}

/// Empty the default registry.
pub fn reset() {
    with_mut(TypeRegistry::clear);
}

/// Register a type in the default registry.
pub fn register_type(def: TypeDef) -> Result<(), RegistryError> {
    with_mut(|reg| reg.register_type(def))
}

/// Instantiate `type_name` from the default registry.
///
/// The factory runs outside the registry borrow, so it may look up or
/// instantiate other types.
pub fn instantiate(type_name: &str) -> Result<NodeRef, RegistryError> {
    let factory = with(|reg| reg.factory(type_name))?;
    let node = factory();
    with(|reg| reg.init_fields(&node));
    Ok(node)
}

/// Apply the default registry's field table to `node`.
///
/// Does nothing while the default registry is being modified;
/// [`TypeRegistry::instantiate`] names the fields itself.
pub fn init_node(node: &NodeRef) {
    with(|reg| reg.init_fields(node));
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::*;
    use crate::node::{NodeCore, NodeExt};
    use crate::value_field::ValueField;

    struct BasePart {
        tag: Rc<ValueField<i32>>,
    }

    struct Leaf {
        core: NodeCore,
        base: BasePart,
        size: Rc<ValueField<f32>>,
        hidden: Rc<ValueField<bool>>,
    }

    impl Leaf {
        fn create() -> NodeRef {
            Rc::new(Self {
                core: NodeCore::new(),
                base: BasePart {
                    tag: ValueField::new(0),
                },
                size: ValueField::new(1.0),
                hidden: ValueField::new(false),
            })
        }
    }

    impl Node for Leaf {
        fn core(&self) -> &NodeCore {
            &self.core
        }

        fn type_name(&self) -> &'static str {
            "Leaf"
        }

        fn part(&self, type_name: &str) -> Option<&dyn Any> {
            (type_name == "Base").then_some(&self.base as &dyn Any)
        }
    }

    fn registry() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.register_type(TypeDef::new("Base").field(FieldDescriptor::part(
            "tag",
            AccessType::InputOutput,
            "Base",
            |p: &BasePart| &p.tag,
        )))
        .unwrap();
        reg.register_type(TypeDef::new("Middle").parent("Base")).unwrap();
        reg.register_type(
            TypeDef::new("Leaf")
                .parent("Middle")
                .factory(Leaf::create)
                .alias("Twig")
                .field(FieldDescriptor::of(
                    "size",
                    AccessType::InputOutput,
                    |n: &Leaf| &n.size,
                ))
                .field(FieldDescriptor::of(
                    "hidden",
                    AccessType::InitializeOnly,
                    |n: &Leaf| &n.hidden,
                )),
        )
        .unwrap();
        reg
    }

    #[test]
    fn lookup_walks_three_levels() {
        let reg = registry();
        let desc = reg.lookup("Leaf", "tag").unwrap();
        assert_eq!(desc.field_type(), "SFInt32");
        assert!(reg.lookup("Middle", "size").is_none());
        assert!(reg.is_subtype("Leaf", "Base"));
        assert!(!reg.is_subtype("Base", "Leaf"));
    }

    #[test]
    fn describe_lists_own_then_inherited() {
        let reg = registry();
        let info = reg.describe_type("Leaf").unwrap();
        let names: Vec<_> = info.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["size", "hidden", "tag"]);
        assert_eq!(info[2].declared_in, "Base");
        assert!(reg.describe_type("Nope").is_none());
    }

    #[test]
    fn instantiate_names_fields() {
        let reg = registry();
        let node = reg.instantiate("Twig").unwrap();
        let size = reg.lookup_field(&*node, "size").unwrap();
        assert_eq!(size.base().name(), "size");
        assert_eq!(size.base().full_name(), "Leaf.size");
        let tag = reg.lookup_field(&*node, "tag").unwrap();
        assert_eq!(tag.base().owner().map(|o| o.id()), Some(node.id()));
    }

    #[test]
    fn set_and_changed_aliases_only_for_input_output() {
        let reg = registry();
        let node = reg.instantiate("Leaf").unwrap();
        assert!(reg.lookup_field(&*node, "set_size").is_some());
        assert!(reg.lookup_field(&*node, "size_changed").is_some());
        assert!(reg.lookup_field(&*node, "set_hidden").is_none());
        assert!(reg.lookup_field(&*node, "missing").is_none());
    }

    #[test]
    fn registration_errors() {
        let mut reg = registry();
        assert_eq!(
            reg.register_type(TypeDef::new("Leaf")),
            Err(RegistryError::DuplicateType("Leaf".into()))
        );
        assert_eq!(
            reg.register_type(TypeDef::new("Twig")),
            Err(RegistryError::DuplicateType("Twig".into()))
        );
        assert!(matches!(
            reg.register_type(TypeDef::new("Orphan").parent("Nowhere")),
            Err(RegistryError::UnknownParentType { .. })
        ));
        assert!(matches!(reg.instantiate("Base"), Err(RegistryError::NoFactory(_))));
        assert!(matches!(reg.instantiate("Nope"), Err(RegistryError::UnknownType(_))));
    }

    #[test]
    fn duplicate_field_rejected() {
        let mut reg = TypeRegistry::new();
        let def = TypeDef::new("Twice")
            .field(FieldDescriptor::of("a", AccessType::InputOutput, |n: &Leaf| &n.size))
            .field(FieldDescriptor::of("a", AccessType::InputOutput, |n: &Leaf| &n.size));
        assert!(matches!(
            reg.register_type(def),
            Err(RegistryError::DuplicateField { .. })
        ));
        assert!(!reg.contains("Twice"));
    }

    struct Named {
        core: NodeCore,
        size: Rc<ValueField<f32>>,
    }

    impl Named {
        fn create() -> NodeRef {
            let node: NodeRef = Rc::new(Self {
                core: NodeCore::new(),
                size: ValueField::new(1.0),
            });
            init_node(&node);
            node
        }
    }

    impl Node for Named {
        fn core(&self) -> &NodeCore {
            &self.core
        }

        fn type_name(&self) -> &'static str {
            "Named"
        }
    }

    #[test]
    fn instantiate_while_modifying_default_registry() {
        reset();
        register_type(TypeDef::new("Named").factory(Named::create).field(
            FieldDescriptor::of("size", AccessType::InputOutput, |n: &Named| &n.size),
        ))
        .unwrap();

        let node = with_mut(|reg| reg.instantiate("Named")).unwrap();
        let size = with(|reg| reg.lookup_field(&*node, "size")).unwrap();
        assert_eq!(size.base().full_name(), "Named.size");

        let seen = with_mut(|_| with(|reg| reg.contains("Named")));
        assert!(!seen);
        assert!(node.get_field("size").is_some());
        reset();
    }

    #[test]
    fn default_registry_reset() {
        reset();
        register_type(TypeDef::new("Base")).unwrap();
        assert!(with(|r| r.contains("Base")));
        reset();
        assert!(with(TypeRegistry::is_empty));
    }
}
