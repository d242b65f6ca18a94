#![forbid(unsafe_code)]

//! Containers that also react to changes *inside* the nodes they hold.
//!
//! A dependent container watches selected fields of each held node. The
//! watched fields are routed into a private [`EventRelay`], which passes
//! every event on to the container within the same propagation pass. The
//! container does not become dirty from a relayed event; its subscribers
//! and downstream routes see it as a touch.
//!
//! Which fields are watched is described by an ordered list of
//! [`DependentDescriptor`]s. In [`LinkMode::Strict`] a descriptor applies
//! only to nodes whose type name equals its owner type; in
//! [`LinkMode::Loose`] it applies to any node that is, derives from, or
//! embeds a part of the owner type.
//!
//! # Invariants
//!
//! 1. While a node is held, every applicable watched field routes into the
//!    relay exactly once, even if the node is held several times.
//! 2. When the last occurrence of a node leaves, every route made for it is
//!    removed, in reverse descriptor order.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::access::Requester;
use crate::constraint::TypeConstraint;
use crate::container::{NodeField, NodeHooks, NodeListField};
use crate::event::Event;
use crate::field::{Field, FieldBase, FieldRef, WeakFieldRef};
use crate::node::{NamedNode, Node, NodeExt, NodeId, NodeRef};
use crate::registry::FieldAccessor;
use crate::route::{self, Propagation};

/// How descriptors are matched against held nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// The node's type name must equal the descriptor's owner type.
    #[default]
    Strict,
    /// The node must be, derive from, or embed a part of the owner type.
    Loose,
}

/// One watched field: the type that declares it and how to reach it.
#[derive(Debug, Clone)]
pub struct DependentDescriptor {
    owner_type: Cow<'static, str>,
    accessor: FieldAccessor,
}

impl DependentDescriptor {
    pub fn new(owner_type: impl Into<Cow<'static, str>>, accessor: FieldAccessor) -> Self {
        Self {
            owner_type: owner_type.into(),
            accessor,
        }
    }

    /// Watch a field of concrete node type `N`.
    #[must_use]
    pub fn of<N: NamedNode, F: Field>(get: fn(&N) -> &Rc<F>) -> Self {
        Self::new(N::TYPE_NAME, FieldAccessor::of(get))
    }

    /// Watch a field of the part implementing abstract type `part_type`.
    #[must_use]
    pub fn part<P: 'static, F: Field>(part_type: &'static str, get: fn(&P) -> &Rc<F>) -> Self {
        Self::new(part_type, FieldAccessor::part(part_type, get))
    }

    #[must_use]
    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    fn resolve(&self, node: &dyn Node, mode: LinkMode) -> Option<FieldRef> {
        let applies = match mode {
            LinkMode::Strict => node.type_name() == self.owner_type,
            LinkMode::Loose => node.is_a(&self.owner_type),
        };
        if applies {
            self.accessor.resolve(node)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// EventRelay
// ---------------------------------------------------------------------------

/// Forwards every accepted event to a target field in the same pass.
pub struct EventRelay {
    base: FieldBase,
    target: WeakFieldRef,
}

impl EventRelay {
    #[must_use]
    pub fn new(target: WeakFieldRef) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let this: WeakFieldRef = this.clone();
            Self {
                base: FieldBase::new(this, TypeConstraint::unconstrained()),
                target,
            }
        })
    }

    #[must_use]
    pub fn target(&self) -> Option<FieldRef> {
        self.target.upgrade()
    }
}

impl Field for EventRelay {
    fn base(&self) -> &FieldBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        "EventRelay"
    }

    fn on_event(&self, _event: &Event, pass: &mut Propagation) {
        if let Some(target) = self.target.upgrade() {
            pass.relay(self, target);
        }
    }
}

impl fmt::Debug for EventRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRelay")
            .field("base", &self.base)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// DependentHooks
// ---------------------------------------------------------------------------

struct Link {
    node: NodeId,
    count: usize,
    fields: Vec<WeakFieldRef>,
}

/// Container hooks that route watched fields of held nodes into a relay.
pub struct DependentHooks {
    relay: Rc<EventRelay>,
    descriptors: Vec<DependentDescriptor>,
    mode: LinkMode,
    links: RefCell<Vec<Link>>,
}

impl DependentHooks {
    #[must_use]
    pub fn new(container: WeakFieldRef, descriptors: Vec<DependentDescriptor>, mode: LinkMode) -> Self {
        Self {
            relay: EventRelay::new(container),
            descriptors,
            mode,
            links: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn relay(&self) -> &Rc<EventRelay> {
        &self.relay
    }

    #[must_use]
    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    #[must_use]
    pub fn descriptors(&self) -> &[DependentDescriptor] {
        &self.descriptors
    }

    /// Number of distinct nodes currently linked.
    #[must_use]
    pub fn linked_nodes(&self) -> usize {
        self.links.borrow().len()
    }

    /// Watched fields currently routed into the relay.
    #[must_use]
    pub fn watched_fields(&self) -> Vec<FieldRef> {
        self.relay.base().routes_in()
    }

    fn link(&self, node: &dyn Node) -> Vec<WeakFieldRef> {
        let mut fields = Vec::new();
        for descriptor in &self.descriptors {
            let Some(field) = descriptor.resolve(node, self.mode) else {
                continue;
            };
            match route::connect(&*field, &*self.relay, false, Requester::Graph) {
                Ok(()) => fields.push(field.base().weak()),
                Err(err) => warn!(%err, owner = descriptor.owner_type(), "watched field not linked"),
            }
        }
        fields
    }
}

impl NodeHooks for DependentHooks {
    fn on_add(&self, _container: &dyn Field, node: &NodeRef) {
        let id = node.id();
        if let Some(link) = self.links.borrow_mut().iter_mut().find(|l| l.node == id) {
            link.count += 1;
            return;
        }
        let fields = self.link(&**node);
        self.links.borrow_mut().push(Link {
            node: id,
            count: 1,
            fields,
        });
    }

    fn on_remove(&self, _container: &dyn Field, node: &NodeRef) {
        let id = node.id();
        let link = {
            let mut links = self.links.borrow_mut();
            let Some(index) = links.iter().position(|l| l.node == id) else {
                return;
            };
            links[index].count -= 1;
            if links[index].count > 0 {
                return;
            }
            links.remove(index)
        };
        for field in link.fields.iter().rev().filter_map(|w| w.upgrade()) {
            route::disconnect(&*field, &*self.relay);
        }
    }
}

impl fmt::Debug for DependentHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependentHooks")
            .field("mode", &self.mode)
            .field("descriptors", &self.descriptors.len())
            .field("linked_nodes", &self.linked_nodes())
            .finish()
    }
}

/// `SFNode` container that relays changes of watched fields in its node.
pub type DependentNodeField = NodeField<DependentHooks>;
/// `MFNode` container that relays changes of watched fields in its nodes.
pub type DependentNodeListField = NodeListField<DependentHooks>;

impl NodeField<DependentHooks> {
    #[must_use]
    pub fn dependent(descriptors: Vec<DependentDescriptor>, mode: LinkMode) -> Rc<Self> {
        Self::with_hooks(|this| DependentHooks::new(this.clone(), descriptors, mode))
    }
}

impl NodeListField<DependentHooks> {
    #[must_use]
    pub fn dependent(descriptors: Vec<DependentDescriptor>, mode: LinkMode) -> Rc<Self> {
        Self::with_hooks(|this| DependentHooks::new(this.clone(), descriptors, mode))
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::cell::Cell;

    use super::*;
    use crate::field::FieldExt;
    use crate::node::NodeCore;
    use crate::value_field::{SignalField, ValueField};

    struct WatchPart {
        changed: Rc<SignalField>,
    }

    struct Source {
        core: NodeCore,
        part: WatchPart,
        value: Rc<ValueField<f32>>,
    }

    impl Node for Source {
        fn core(&self) -> &NodeCore {
            &self.core
        }

        fn type_name(&self) -> &'static str {
            "Source"
        }

        fn part(&self, type_name: &str) -> Option<&dyn Any> {
            (type_name == "Watched").then_some(&self.part as &dyn Any)
        }
    }

    impl NamedNode for Source {
        const TYPE_NAME: &'static str = "Source";
    }

    fn source() -> Rc<Source> {
        let part = WatchPart {
            changed: SignalField::new(),
        };
        let value = ValueField::new(0.0);
        value.route_no_event(&*part.changed).unwrap();
        Rc::new(Source {
            core: NodeCore::new(),
            part,
            value,
        })
    }

    fn count_events(field: &dyn Field) -> (Rc<Cell<usize>>, crate::event::Subscription) {
        let hits = Rc::new(Cell::new(0));
        let hits2 = Rc::clone(&hits);
        let sub = field.base().subscribe(move |_| hits2.set(hits2.get() + 1));
        (hits, sub)
    }

    #[test]
    fn watched_field_touch_reaches_container_once() {
        let container = DependentNodeField::dependent(
            vec![DependentDescriptor::of(|s: &Source| &s.value)],
            LinkMode::Strict,
        );
        let n = source();
        container.set_value(Some(n.clone())).unwrap();
        let (hits, _sub) = count_events(&*container);
        n.value.touch();
        assert_eq!(hits.get(), 1);
        let relay_event = container.hooks().relay().latest_event();
        assert_eq!(container.latest_event().stamp, relay_event.stamp);
        assert_eq!(n.value.latest_event().stamp, relay_event.stamp);
    }

    #[test]
    fn removing_node_removes_routes() {
        let container = DependentNodeField::dependent(
            vec![DependentDescriptor::of(|s: &Source| &s.value)],
            LinkMode::Strict,
        );
        let n1 = source();
        let n2 = source();
        container.set_value(Some(n1.clone())).unwrap();
        assert!(n1.value.routes_to(&**container.hooks().relay()));
        container.set_value(Some(n2.clone())).unwrap();
        assert!(!n1.value.routes_to(&**container.hooks().relay()));
        let (hits, _sub) = count_events(&*container);
        n1.value.touch();
        assert_eq!(hits.get(), 0);
        n2.value.set_value(3.0).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn loose_mode_matches_parts() {
        let strict = DependentNodeField::dependent(
            vec![DependentDescriptor::part("Watched", |p: &WatchPart| &p.changed)],
            LinkMode::Strict,
        );
        let loose = DependentNodeField::dependent(
            vec![DependentDescriptor::part("Watched", |p: &WatchPart| &p.changed)],
            LinkMode::Loose,
        );
        let n = source();
        strict.set_value(Some(n.clone())).unwrap();
        loose.set_value(Some(n.clone())).unwrap();
        assert!(strict.hooks().watched_fields().is_empty());
        assert_eq!(loose.hooks().watched_fields().len(), 1);
        let (hits, _sub) = count_events(&*loose);
        n.value.set_value(1.0).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn list_holds_same_node_twice() {
        let list = DependentNodeListField::dependent(
            vec![DependentDescriptor::of(|s: &Source| &s.value)],
            LinkMode::Strict,
        );
        let n = source();
        list.push_back(n.clone()).unwrap();
        list.push_back(n.clone()).unwrap();
        assert_eq!(list.hooks().linked_nodes(), 1);
        assert_eq!(list.hooks().watched_fields().len(), 1);
        list.erase_at(0).unwrap();
        assert!(n.value.routes_to(&**list.hooks().relay()));
        list.erase_at(0).unwrap();
        assert!(!n.value.routes_to(&**list.hooks().relay()));
    }

    #[test]
    fn dropping_container_unroutes() {
        let n = source();
        {
            let container = DependentNodeField::dependent(
                vec![DependentDescriptor::of(|s: &Source| &s.value)],
                LinkMode::Strict,
            );
            container.set_value(Some(n.clone())).unwrap();
            assert_eq!(n.value.routes_out().len(), 2);
        }
        assert_eq!(n.value.routes_out().len(), 1);
    }

    #[test]
    fn downstream_of_container_sees_relayed_event() {
        let container = DependentNodeField::dependent(
            vec![DependentDescriptor::of(|s: &Source| &s.value)],
            LinkMode::Strict,
        );
        let n = source();
        container.set_value(Some(n.clone())).unwrap();
        let count = ValueField::computed(0_i32, TypeConstraint::unconstrained(), |_| Some(1));
        container.route_no_event(&*count).unwrap();
        assert!(count.is_up_to_date());
        n.value.touch();
        assert!(!count.is_up_to_date());
        assert!(container.is_up_to_date());
    }
}
