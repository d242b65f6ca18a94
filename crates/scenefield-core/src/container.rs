#![forbid(unsafe_code)]

//! Node-holding fields.
//!
//! [`NodeField`] holds zero or one node (`SFNode`), [`NodeListField`] an
//! ordered list (`MFNode`). Both run [`NodeHooks`] when a node enters or
//! leaves the container and can be restricted to node types with a
//! [`NodeFilter`].
//!
//! # Invariants
//!
//! 1. `on_remove` runs for a node before the container lets go of it.
//! 2. Storing the node a `NodeField` already holds runs no hooks.
//! 3. A node rejected by the filter is never stored and runs no hooks.
//! 4. Dropping a container runs `on_remove` for everything it still holds.

use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::access::Requester;
use crate::constraint::TypeConstraint;
use crate::error::{FieldError, FieldOperation};
use crate::field::{Field, FieldBase, FieldKind, WeakFieldRef};
use crate::node::{NamedNode, Node, NodeExt, NodeRef, same_node};
use crate::route;

/// Callbacks run as nodes enter and leave a container.
pub trait NodeHooks: 'static {
    fn on_add(&self, container: &dyn Field, node: &NodeRef) {
        let _ = (container, node);
    }

    fn on_remove(&self, container: &dyn Field, node: &NodeRef) {
        let _ = (container, node);
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl NodeHooks for NoHooks {}

/// Restricts which nodes a container accepts.
#[derive(Clone)]
pub struct NodeFilter {
    expected: Cow<'static, str>,
    accepts: Rc<dyn Fn(&dyn Node) -> bool>,
}

impl NodeFilter {
    /// Nodes of `type_name`, its registered subtypes, or nodes embedding
    /// its part.
    #[must_use]
    pub fn is_a(type_name: &'static str) -> Self {
        Self {
            expected: Cow::Borrowed(type_name),
            accepts: Rc::new(move |node: &dyn Node| node.is_a(type_name)),
        }
    }

    /// Exactly the concrete node type `N`.
    #[must_use]
    pub fn concrete<N: NamedNode>() -> Self {
        Self {
            expected: Cow::Borrowed(N::TYPE_NAME),
            accepts: Rc::new(|node: &dyn Node| node.is::<N>()),
        }
    }

    pub fn custom(
        expected: impl Into<Cow<'static, str>>,
        accepts: impl Fn(&dyn Node) -> bool + 'static,
    ) -> Self {
        Self {
            expected: expected.into(),
            accepts: Rc::new(accepts),
        }
    }

    #[must_use]
    pub fn accepts(&self, node: &dyn Node) -> bool {
        (self.accepts)(node)
    }

    #[must_use]
    pub fn expected(&self) -> &str {
        &self.expected
    }
}

impl fmt::Debug for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeFilter")
            .field("expected", &self.expected)
            .finish()
    }
}

fn check_filter(
    base: &FieldBase,
    filter: &RefCell<Option<NodeFilter>>,
    node: &NodeRef,
) -> Result<(), FieldError> {
    match &*filter.borrow() {
        Some(filter) if !filter.accepts(&**node) => Err(FieldError::InvalidNodeType {
            field: base.full_name(),
            expected: filter.expected().to_string(),
            actual: node.type_name().to_string(),
        }),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// NodeField
// ---------------------------------------------------------------------------

/// A field holding zero or one node.
pub struct NodeField<H: NodeHooks = NoHooks> {
    base: FieldBase,
    value: RefCell<Option<NodeRef>>,
    filter: RefCell<Option<NodeFilter>>,
    hooks: H,
}

impl<H: NodeHooks> FieldKind for NodeField<H> {
    const TYPE_NAME: &'static str = "SFNode";
}

impl<H: NodeHooks + Default> NodeField<H> {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_hooks(|_| H::default())
    }
}

impl<H: NodeHooks> NodeField<H> {
    /// Create a container whose hooks may capture the container's handle.
    pub fn with_hooks(make: impl FnOnce(&WeakFieldRef) -> H) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let this: WeakFieldRef = this.clone();
            let hooks = make(&this);
            Self {
                base: FieldBase::new(this, TypeConstraint::any_number_of(Self::TYPE_NAME)),
                value: RefCell::new(None),
                filter: RefCell::new(None),
                hooks,
            }
        })
    }

    #[must_use]
    pub fn with_filter(self: Rc<Self>, filter: NodeFilter) -> Rc<Self> {
        self.set_filter(filter);
        self
    }

    pub fn set_filter(&self, filter: NodeFilter) {
        *self.filter.borrow_mut() = Some(filter);
    }

    #[must_use]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    #[must_use]
    pub fn value(&self) -> Option<NodeRef> {
        self.up_to_date();
        self.value.borrow().clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value().is_none()
    }

    pub fn get_value(&self) -> Result<Option<NodeRef>, FieldError> {
        self.base
            .check_access(FieldOperation::Get, Requester::External)?;
        Ok(self.value())
    }

    /// Store `node` (or clear with `None`) as an external requester.
    pub fn set_value(&self, node: Option<NodeRef>) -> Result<(), FieldError> {
        self.set_value_by(node, Requester::External)
    }

    pub fn set_value_by(&self, node: Option<NodeRef>, requester: Requester) -> Result<(), FieldError> {
        self.base.check_access(FieldOperation::Set, requester)?;
        if let Some(node) = &node {
            check_filter(&self.base, &self.filter, node)?;
        }
        self.replace(node);
        route::start_event(self);
        Ok(())
    }

    fn replace(&self, node: Option<NodeRef>) {
        let same = match (&*self.value.borrow(), &node) {
            (Some(held), Some(new)) => same_node(&**held, &**new),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }
        let old = self.value.replace(None);
        if let Some(old) = &old {
            self.hooks.on_remove(self, old);
        }
        self.value.replace(node.clone());
        if let Some(new) = &node {
            self.hooks.on_add(self, new);
        }
    }
}

impl<H: NodeHooks> Field for NodeField<H> {
    fn base(&self) -> &FieldBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn update(&self) {
        let Some(source) = self.base.pending_source() else {
            return;
        };
        let Some(next) = source
            .value_any()
            .and_then(|v| v.downcast::<Option<NodeRef>>().ok())
        else {
            return;
        };
        if let Some(node) = next.as_ref() {
            if let Err(err) = check_filter(&self.base, &self.filter, node) {
                warn!(%err, "routed node rejected");
                return;
            }
        }
        self.replace(*next);
    }

    fn value_any(&self) -> Option<Box<dyn Any>> {
        Some(Box::new(self.value()))
    }
}

impl<H: NodeHooks> Drop for NodeField<H> {
    fn drop(&mut self) {
        if let Some(old) = self.value.get_mut().take() {
            self.hooks.on_remove(&*self, &old);
        }
    }
}

impl<H: NodeHooks> fmt::Debug for NodeField<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeField")
            .field("value", &*self.value.borrow())
            .field("filter", &*self.filter.borrow())
            .field("base", &self.base)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// NodeListField
// ---------------------------------------------------------------------------

/// A field holding an ordered list of nodes.
pub struct NodeListField<H: NodeHooks = NoHooks> {
    base: FieldBase,
    value: RefCell<Vec<NodeRef>>,
    filter: RefCell<Option<NodeFilter>>,
    hooks: H,
}

impl<H: NodeHooks> FieldKind for NodeListField<H> {
    const TYPE_NAME: &'static str = "MFNode";
}

impl<H: NodeHooks + Default> NodeListField<H> {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_hooks(|_| H::default())
    }
}

impl<H: NodeHooks> NodeListField<H> {
    pub fn with_hooks(make: impl FnOnce(&WeakFieldRef) -> H) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let this: WeakFieldRef = this.clone();
            let hooks = make(&this);
            Self {
                base: FieldBase::new(this, TypeConstraint::any_number_of(Self::TYPE_NAME)),
                value: RefCell::new(Vec::new()),
                filter: RefCell::new(None),
                hooks,
            }
        })
    }

    #[must_use]
    pub fn with_filter(self: Rc<Self>, filter: NodeFilter) -> Rc<Self> {
        self.set_filter(filter);
        self
    }

    pub fn set_filter(&self, filter: NodeFilter) {
        *self.filter.borrow_mut() = Some(filter);
    }

    #[must_use]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    #[must_use]
    pub fn value(&self) -> Vec<NodeRef> {
        self.up_to_date();
        self.value.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.up_to_date();
        self.value.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<NodeRef> {
        self.up_to_date();
        self.value.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn contains(&self, node: &dyn Node) -> bool {
        self.up_to_date();
        self.value.borrow().iter().any(|n| same_node(&**n, node))
    }

    pub fn get_value(&self) -> Result<Vec<NodeRef>, FieldError> {
        self.base
            .check_access(FieldOperation::Get, Requester::External)?;
        Ok(self.value())
    }

    /// Replace the whole list as an external requester.
    pub fn set_value(&self, nodes: Vec<NodeRef>) -> Result<(), FieldError> {
        self.set_value_by(nodes, Requester::External)
    }

    pub fn set_value_by(&self, nodes: Vec<NodeRef>, requester: Requester) -> Result<(), FieldError> {
        self.base.check_access(FieldOperation::Set, requester)?;
        for node in &nodes {
            check_filter(&self.base, &self.filter, node)?;
        }
        self.replace_all(nodes);
        route::start_event(self);
        Ok(())
    }

    /// Append `node`.
    pub fn push_back(&self, node: NodeRef) -> Result<(), FieldError> {
        let len = self.len();
        self.insert(len, node)
    }

    /// Insert `node` at `index`, clamped to the list length.
    pub fn insert(&self, index: usize, node: NodeRef) -> Result<(), FieldError> {
        self.base
            .check_access(FieldOperation::Set, Requester::External)?;
        check_filter(&self.base, &self.filter, &node)?;
        self.up_to_date();
        {
            let mut list = self.value.borrow_mut();
            let index = index.min(list.len());
            list.insert(index, NodeRef::clone(&node));
        }
        self.hooks.on_add(self, &node);
        route::start_event(self);
        Ok(())
    }

    /// Remove the first occurrence of `node`. Returns whether it was held.
    pub fn erase(&self, node: &dyn Node) -> Result<bool, FieldError> {
        self.base
            .check_access(FieldOperation::Set, Requester::External)?;
        self.up_to_date();
        let position = self
            .value
            .borrow()
            .iter()
            .position(|n| same_node(&**n, node));
        match position {
            Some(index) => {
                self.remove_at(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove the node at `index`.
    pub fn erase_at(&self, index: usize) -> Result<Option<NodeRef>, FieldError> {
        self.base
            .check_access(FieldOperation::Set, Requester::External)?;
        self.up_to_date();
        if index >= self.value.borrow().len() {
            return Ok(None);
        }
        Ok(Some(self.remove_at(index)))
    }

    pub fn clear(&self) -> Result<(), FieldError> {
        self.set_value(Vec::new())
    }

    fn remove_at(&self, index: usize) -> NodeRef {
        let removed = NodeRef::clone(&self.value.borrow()[index]);
        self.hooks.on_remove(self, &removed);
        self.value.borrow_mut().remove(index);
        route::start_event(self);
        removed
    }

    fn replace_all(&self, nodes: Vec<NodeRef>) {
        let old = self.value.borrow().clone();
        for node in &old {
            self.hooks.on_remove(self, node);
        }
        self.value.replace(nodes.clone());
        drop(old);
        for node in &nodes {
            self.hooks.on_add(self, node);
        }
    }
}

impl<H: NodeHooks> Field for NodeListField<H> {
    fn base(&self) -> &FieldBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn update(&self) {
        let Some(source) = self.base.pending_source() else {
            return;
        };
        let Some(next) = source
            .value_any()
            .and_then(|v| v.downcast::<Vec<NodeRef>>().ok())
        else {
            return;
        };
        for node in next.iter() {
            if let Err(err) = check_filter(&self.base, &self.filter, node) {
                warn!(%err, "routed node list rejected");
                return;
            }
        }
        self.replace_all(*next);
    }

    fn value_any(&self) -> Option<Box<dyn Any>> {
        Some(Box::new(self.value()))
    }
}

impl<H: NodeHooks> Drop for NodeListField<H> {
    fn drop(&mut self) {
        let held = std::mem::take(self.value.get_mut());
        for node in &held {
            self.hooks.on_remove(&*self, node);
        }
    }
}

impl<H: NodeHooks> fmt::Debug for NodeListField<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeListField")
            .field("len", &self.value.borrow().len())
            .field("filter", &*self.filter.borrow())
            .field("base", &self.base)
            .finish()
    }
}
