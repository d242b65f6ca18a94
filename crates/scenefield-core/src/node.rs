#![forbid(unsafe_code)]

//! Nodes: the owners of fields.
//!
//! A node embeds a [`NodeCore`] and its fields, and implements [`Node`].
//! Field names and access policies come from the node's type entry in the
//! [`TypeRegistry`](crate::TypeRegistry); [`NodeExt::get_field`] looks
//! names up in the node's dynamic fields first and the registry second.
//!
//! Abstract types are expressed as *parts*: a node that implements an
//! abstract type embeds that type's part struct and returns it from
//! [`Node::part`]. Field accessors declared on the abstract type reach the
//! field through the part, so they work for every concrete subtype.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dynamic::DynamicFieldHost;
use crate::field::FieldRef;
use crate::registry;

/// Shared handle to a type-erased node.
pub type NodeRef = Rc<dyn Node>;
/// Non-owning handle to a type-erased node.
pub type WeakNodeRef = Weak<dyn Node>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Identity and lifecycle state shared by every node.
#[derive(Debug)]
pub struct NodeCore {
    id: NodeId,
    name: RefCell<String>,
    initialized: Cell<bool>,
}

impl Default for NodeCore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeCore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)),
            name: RefCell::new(String::new()),
            initialized: Cell::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.borrow_mut() = name.into();
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    pub fn mark_initialized(&self) {
        self.initialized.set(true);
    }
}

/// Upcasts available on every node, including `dyn Node`.
pub trait AsNodeAny {
    fn as_any(&self) -> &dyn Any;
    fn as_node(&self) -> &dyn Node;
}

impl<T: Node> AsNodeAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_node(&self) -> &dyn Node {
        self
    }
}

/// A scene-graph node.
pub trait Node: AsNodeAny + 'static {
    fn core(&self) -> &NodeCore;

    /// Registered type name, e.g. `Box`.
    fn type_name(&self) -> &'static str;

    /// The embedded part implementing abstract type `type_name`.
    fn part(&self, type_name: &str) -> Option<&dyn Any> {
        let _ = type_name;
        None
    }

    /// Per-instance fields, for nodes that support them.
    fn dynamic_fields(&self) -> Option<&DynamicFieldHost> {
        None
    }

    /// Finish setup. `InitializeOnly` fields are frozen afterwards.
    fn initialize(&self) {
        self.core().mark_initialized();
    }

    /// Field a loader puts this node into when no container is named.
    fn default_container_field(&self) -> &'static str {
        "children"
    }

    /// Hook run after a dynamic field was added.
    fn field_added(&self, name: &str, field: &FieldRef) {
        let _ = (name, field);
    }

    /// Hook run when a dynamic field is removed, before it is detached.
    /// Undo whatever [`Node::field_added`] set up.
    fn field_removed(&self, name: &str, field: &FieldRef) {
        let _ = (name, field);
    }
}

/// Concrete node types with a fixed registered name.
pub trait NamedNode: Node {
    const TYPE_NAME: &'static str;
}

impl dyn Node {
    #[must_use]
    pub fn downcast_ref<N: Node>(&self) -> Option<&N> {
        self.as_any().downcast_ref::<N>()
    }

    #[must_use]
    pub fn is<N: Node>(&self) -> bool {
        self.as_any().is::<N>()
    }

    /// The part for `type_name`, downcast to `P`.
    #[must_use]
    pub fn part_as<P: 'static>(&self, type_name: &str) -> Option<&P> {
        self.part(type_name)?.downcast_ref::<P>()
    }
}

impl fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("type", &self.type_name())
            .field("id", &self.core().id())
            .field("name", &self.core().name())
            .finish()
    }
}

/// Lookups available on every node.
pub trait NodeExt: Node {
    fn id(&self) -> NodeId {
        self.core().id()
    }

    fn name(&self) -> String {
        self.core().name()
    }

    fn set_name(&self, name: impl Into<String>) {
        self.core().set_name(name);
    }

    fn is_initialized(&self) -> bool {
        self.core().is_initialized()
    }

    /// Field by name: dynamic fields first, then the type's field table
    /// (including `set_<name>` and `<name>_changed`).
    fn get_field(&self, name: &str) -> Option<FieldRef> {
        if let Some(field) = self.dynamic_fields().and_then(|host| host.get_field(name)) {
            return Some(field);
        }
        registry::with(|reg| reg.lookup_field(self.as_node(), name))
    }

    /// Every field with its name: declared fields, then dynamic fields.
    fn fields(&self) -> Vec<(String, FieldRef)> {
        let node = self.as_node();
        let mut out: Vec<(String, FieldRef)> = registry::with(|reg| {
            reg.describe_type(node.type_name())
                .unwrap_or_default()
                .into_iter()
                .filter_map(|info| {
                    let field = reg.lookup_field(node, &info.name)?;
                    Some((info.name, field))
                })
                .collect()
        });
        if let Some(host) = self.dynamic_fields() {
            out.extend(host.fields().into_iter().map(|(name, _, field)| (name, field)));
        }
        out
    }

    /// Whether this node is, derives from, or embeds a part of `type_name`.
    fn is_a(&self, type_name: &str) -> bool {
        self.type_name() == type_name
            || self.part(type_name).is_some()
            || registry::with(|reg| reg.is_subtype(self.type_name(), type_name))
    }
}

impl<N: Node + ?Sized> NodeExt for N {}

/// Whether two handles refer to the same node.
#[must_use]
pub fn same_node(a: &dyn Node, b: &dyn Node) -> bool {
    a.core().id() == b.core().id()
}
