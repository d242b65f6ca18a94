#![forbid(unsafe_code)]

//! The [`Field`] trait and the bookkeeping every field shares.
//!
//! A field is a reactive cell that lives behind an `Rc` and is wired to
//! other fields with directed routes. Writing a field (or touching it)
//! starts a propagation pass that marks every downstream field dirty;
//! dirty fields recompute the next time they are read.
//!
//! # Architecture
//!
//! [`FieldBase`] holds the state common to all fields: identity, name and
//! owner, access policy, both route lists, the latest event, the pending
//! event source, the re-entrancy lock and the subscriber list. Concrete
//! field types embed a `FieldBase` and implement [`Field`] to supply a
//! type name, a value and an [`update`](Field::update) step.
//!
//! Routes are held as `Weak` references in both directions, keyed by
//! [`FieldId`]. Dropping a field removes it from every peer's route list,
//! so routes never outlive their endpoints.
//!
//! # Invariants
//!
//! 1. `a.routes_to(b)` holds exactly when `b.has_route_from(a)` holds.
//! 2. A field accepts at most one event per propagation pass.
//! 3. A field never recomputes while it is already recomputing.
//! 4. After a successful external write, the written field is up to date.
//!
//! # Failure Modes
//!
//! - `update` panics: the panic reaches the caller of the read that
//!   triggered it; the re-entrancy lock is released on unwind.
//! - A subscriber drops the field it is notified about: remaining
//!   deliveries to that field are skipped.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::access::{AccessType, Requester};
use crate::config::GraphConfig;
use crate::constraint::TypeConstraint;
use crate::error::{FieldError, FieldOperation};
use crate::event::{Event, EventStamp, Subscribers, Subscription};
use crate::node::{Node, NodeRef};
use crate::route::{self, Propagation};

/// Shared handle to a type-erased field.
pub type FieldRef = Rc<dyn Field>;
/// Non-owning handle to a type-erased field.
pub type WeakFieldRef = Weak<dyn Field>;

static NEXT_FIELD_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique field identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(u64);

impl FieldId {
    fn next() -> Self {
        Self(NEXT_FIELD_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{}", self.0)
    }
}

/// When a dirty field recomputes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// On the next read.
    #[default]
    Lazy,
    /// At the end of the propagation pass that dirtied it.
    Eager,
}

/// Static type name of a concrete field type.
pub trait FieldKind {
    const TYPE_NAME: &'static str;
}

/// Upcasts available on every field, including `dyn Field`.
pub trait AsFieldAny {
    fn as_any(&self) -> &dyn Any;
    fn as_field(&self) -> &dyn Field;
}

impl<T: Field> AsFieldAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_field(&self) -> &dyn Field {
        self
    }
}

/// A reactive cell in the field graph.
pub trait Field: AsFieldAny + 'static {
    fn base(&self) -> &FieldBase;

    /// Field type name, e.g. `SFFloat` or `MFNode`.
    fn type_name(&self) -> &'static str;

    /// Bring the cached value in line with the pending event.
    ///
    /// Called at most once per dirty period, under the re-entrancy lock.
    fn update(&self) {}

    /// React to an accepted event. The default forwards it along every
    /// outgoing route.
    fn on_event(&self, event: &Event, pass: &mut Propagation) {
        let _ = event;
        pass.forward(self.as_field());
    }

    /// Recompute if dirty.
    fn up_to_date(&self) {
        self.base().refresh(self.as_field());
    }

    /// Current value, boxed. Used to copy values along routes.
    fn value_any(&self) -> Option<Box<dyn Any>> {
        None
    }

    /// Textual form of the current value.
    fn value_as_string(&self) -> Option<String> {
        None
    }

    /// Parse and store a textual value as an external write.
    fn set_value_from_str(&self, text: &str) -> Result<(), FieldError> {
        let _ = text;
        Err(FieldError::Unsupported {
            field: self.base().full_name(),
            operation: "textual values",
        })
    }
}

impl fmt::Debug for dyn Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.base().full_name())
            .field("type", &self.type_name())
            .field("id", &self.base().id())
            .finish()
    }
}

#[derive(Clone)]
struct Route {
    id: FieldId,
    field: WeakFieldRef,
}

impl Route {
    fn of(field: &dyn Field) -> Self {
        Self {
            id: field.base().id(),
            field: field.base().weak(),
        }
    }
}

/// Resets the re-entrancy lock on scope exit, including unwinds.
struct UpdateGuard<'a>(&'a Cell<bool>);

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// State shared by every field type.
pub struct FieldBase {
    id: FieldId,
    this: WeakFieldRef,
    name: RefCell<String>,
    access: Cell<AccessType>,
    access_check: Cell<bool>,
    owner: RefCell<Option<Weak<dyn Node>>>,
    routes_in: RefCell<Vec<Route>>,
    routes_out: RefCell<Vec<Route>>,
    last_stamp: Cell<EventStamp>,
    latest: Cell<Event>,
    pending: RefCell<Option<Route>>,
    update_lock: Cell<bool>,
    mode: Cell<UpdateMode>,
    constraint: RefCell<TypeConstraint>,
    subscribers: Subscribers<Event>,
    causes: RefCell<Option<Vec<FieldId>>>,
}

impl FieldBase {
    /// Create the base for the field `this` points at.
    ///
    /// Call from inside `Rc::new_cyclic` so the field knows its own handle.
    #[must_use]
    pub fn new(this: WeakFieldRef, constraint: TypeConstraint) -> Self {
        let id = FieldId::next();
        Self {
            id,
            this,
            name: RefCell::new(String::new()),
            access: Cell::new(AccessType::InputOutput),
            access_check: Cell::new(GraphConfig::current().access_checks),
            owner: RefCell::new(None),
            routes_in: RefCell::new(Vec::new()),
            routes_out: RefCell::new(Vec::new()),
            last_stamp: Cell::new(EventStamp::ZERO),
            latest: Cell::new(Event::new(id, EventStamp::ZERO)),
            pending: RefCell::new(None),
            update_lock: Cell::new(false),
            mode: Cell::new(UpdateMode::Lazy),
            constraint: RefCell::new(constraint),
            subscribers: Subscribers::default(),
            causes: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> FieldId {
        self.id
    }

    #[must_use]
    pub fn weak(&self) -> WeakFieldRef {
        self.this.clone()
    }

    /// Strong handle to the field, if it is still alive.
    #[must_use]
    pub fn this(&self) -> Option<FieldRef> {
        self.this.upgrade()
    }

    // -- naming -------------------------------------------------------------

    #[must_use]
    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.borrow_mut() = name.into();
    }

    /// `<owner>.<field>`, where the owner is named by its node name or,
    /// failing that, its type name.
    #[must_use]
    pub fn full_name(&self) -> String {
        let name = self.name.borrow();
        let field = if name.is_empty() { "<unnamed>" } else { name.as_str() };
        match self.owner() {
            Some(owner) => {
                let node_name = owner.core().name();
                if node_name.is_empty() {
                    format!("{}.{field}", owner.type_name())
                } else {
                    format!("{node_name}.{field}")
                }
            }
            None => field.to_string(),
        }
    }

    // -- ownership and access -----------------------------------------------

    #[must_use]
    pub fn owner(&self) -> Option<NodeRef> {
        self.owner.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub fn set_owner(&self, owner: Weak<dyn Node>) {
        *self.owner.borrow_mut() = Some(owner);
    }

    /// Detach from the owning node. The name is kept.
    pub fn clear_owner(&self) {
        self.owner.borrow_mut().take();
    }

    #[must_use]
    pub fn access(&self) -> AccessType {
        self.access.get()
    }

    pub fn set_access(&self, access: AccessType) {
        self.access.set(access);
    }

    #[must_use]
    pub fn access_check_enabled(&self) -> bool {
        self.access_check.get()
    }

    pub fn set_access_check(&self, enabled: bool) {
        self.access_check.set(enabled);
    }

    fn is_external(&self, requester: Requester) -> bool {
        match requester {
            Requester::External => true,
            Requester::Graph => false,
            Requester::Node(id) => self.owner().is_none_or(|owner| owner.core().id() != id),
        }
    }

    /// Check `operation` against this field's access policy.
    pub fn check_access(
        &self,
        operation: FieldOperation,
        requester: Requester,
    ) -> Result<(), FieldError> {
        if !self.access_check.get() || requester == Requester::Graph {
            return Ok(());
        }
        let access = self.access.get();
        let external = self.is_external(requester);
        let refused = match operation {
            FieldOperation::Set => match access {
                AccessType::InitializeOnly => self
                    .owner()
                    .is_some_and(|owner| owner.core().is_initialized()),
                AccessType::OutputOnly => external,
                AccessType::InputOnly | AccessType::InputOutput => false,
            },
            FieldOperation::Get => {
                access == AccessType::InputOnly
                    && external
                    && self.routes_out.borrow().is_empty()
            }
            FieldOperation::RouteFrom => external && !access.allows_route_from(),
            FieldOperation::RouteTo => external && !access.allows_route_to(),
        };
        if refused {
            Err(FieldError::AccessViolation {
                field: self.full_name(),
                access,
                operation,
            })
        } else {
            Ok(())
        }
    }

    // -- routes -------------------------------------------------------------

    /// Live incoming routes, in connection order.
    #[must_use]
    pub fn routes_in(&self) -> Vec<FieldRef> {
        self.routes_in
            .borrow()
            .iter()
            .filter_map(|r| r.field.upgrade())
            .collect()
    }

    /// Live outgoing routes, in connection order.
    #[must_use]
    pub fn routes_out(&self) -> Vec<FieldRef> {
        self.routes_out
            .borrow()
            .iter()
            .filter_map(|r| r.field.upgrade())
            .collect()
    }

    #[must_use]
    pub fn routes_in_count(&self) -> usize {
        self.routes_in.borrow().len()
    }

    #[must_use]
    pub fn routes_out_count(&self) -> usize {
        self.routes_out.borrow().len()
    }

    #[must_use]
    pub fn routes_to(&self, dest: FieldId) -> bool {
        self.routes_out.borrow().iter().any(|r| r.id == dest)
    }

    #[must_use]
    pub fn has_route_from(&self, source: FieldId) -> bool {
        self.routes_in.borrow().iter().any(|r| r.id == source)
    }

    pub(crate) fn link(source: &dyn Field, dest: &dyn Field) {
        source
            .base()
            .routes_out
            .borrow_mut()
            .push(Route::of(dest));
        dest.base().routes_in.borrow_mut().push(Route::of(source));
    }

    /// Remove the route `source -> dest`. Returns whether it existed.
    pub(crate) fn unlink(source: &FieldBase, dest: &FieldBase) -> bool {
        let removed = source.forget_out(dest.id);
        dest.forget_in(source.id);
        removed
    }

    /// Put `source` at input position `index`, returning the previous source.
    pub(crate) fn replace_in(&self, index: usize, source: &dyn Field) -> Option<WeakFieldRef> {
        let mut routes = self.routes_in.borrow_mut();
        let slot = routes.get_mut(index)?;
        let old = std::mem::replace(slot, Route::of(source));
        drop(routes);
        source
            .base()
            .routes_out
            .borrow_mut()
            .push(Route::of_base(self));
        self.retarget_pending(old.id, source);
        Some(old.field)
    }

    fn forget_out(&self, dest: FieldId) -> bool {
        let mut routes = self.routes_out.borrow_mut();
        let before = routes.len();
        routes.retain(|r| r.id != dest);
        routes.len() != before
    }

    fn forget_in(&self, source: FieldId) {
        self.routes_in.borrow_mut().retain(|r| r.id != source);
        let mut pending = self.pending.borrow_mut();
        if pending.as_ref().is_some_and(|p| p.id == source) {
            *pending = None;
        }
    }

    fn retarget_pending(&self, old: FieldId, source: &dyn Field) {
        let mut pending = self.pending.borrow_mut();
        if pending.as_ref().is_some_and(|p| p.id == old) {
            *pending = Some(Route::of(source));
        }
    }

    // -- events -------------------------------------------------------------

    #[must_use]
    pub fn latest_event(&self) -> Event {
        self.latest.get()
    }

    /// Whether a pending event still has to be applied.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// The field whose event is pending, if any.
    #[must_use]
    pub fn pending_source(&self) -> Option<FieldRef> {
        self.pending.borrow().as_ref().and_then(|p| p.field.upgrade())
    }

    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.update_lock.get()
    }

    #[must_use]
    pub fn update_mode(&self) -> UpdateMode {
        self.mode.get()
    }

    pub fn set_update_mode(&self, mode: UpdateMode) {
        self.mode.set(mode);
    }

    #[must_use]
    pub fn constraint(&self) -> Ref<'_, TypeConstraint> {
        self.constraint.borrow()
    }

    pub fn set_constraint(&self, constraint: TypeConstraint) {
        *self.constraint.borrow_mut() = constraint;
    }

    /// Register a callback for every event this field emits or accepts.
    pub fn subscribe(&self, callback: impl Fn(&Event) + 'static) -> Subscription {
        self.subscribers.subscribe(callback)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Start or stop recording which fields delivered events here.
    pub fn collect_causes(&self, enabled: bool) {
        *self.causes.borrow_mut() = enabled.then(Vec::new);
    }

    /// Fields that delivered events since the last recompute.
    #[must_use]
    pub fn causes(&self) -> Vec<FieldId> {
        self.causes.borrow().clone().unwrap_or_default()
    }

    #[must_use]
    pub fn has_caused_event(&self, source: FieldId) -> bool {
        self.causes
            .borrow()
            .as_ref()
            .is_some_and(|c| c.contains(&source))
    }

    fn record_cause(&self, source: FieldId) {
        if let Some(causes) = self.causes.borrow_mut().as_mut() {
            if !causes.contains(&source) {
                causes.push(source);
            }
        }
    }

    fn stamp_is_new(&self, event: Event) -> bool {
        if event.stamp <= self.last_stamp.get() {
            return false;
        }
        self.last_stamp.set(event.stamp);
        self.latest.set(event);
        self.record_cause(event.source);
        true
    }

    /// Accept a routed event, making `from` the pending source.
    pub(crate) fn accept(&self, event: Event, from: &WeakFieldRef) -> bool {
        if !self.stamp_is_new(event) {
            return false;
        }
        *self.pending.borrow_mut() = Some(Route {
            id: event.source,
            field: from.clone(),
        });
        true
    }

    /// Accept a relayed event without becoming dirty.
    pub(crate) fn observe(&self, event: Event) -> bool {
        self.stamp_is_new(event)
    }

    /// Open a new pass originating at this field.
    pub(crate) fn begin_event(&self, clear_pending: bool) -> Event {
        let event = Event::new(self.id, EventStamp::next());
        self.last_stamp.set(event.stamp);
        self.latest.set(event);
        if clear_pending {
            *self.pending.borrow_mut() = None;
        }
        event
    }

    pub(crate) fn notify(&self, event: &Event) {
        self.subscribers.notify(event);
    }

    /// Run `field.update()` if an event is pending and no update is running.
    pub fn refresh(&self, field: &dyn Field) {
        if self.update_lock.get() || !self.is_dirty() {
            return;
        }
        self.update_lock.set(true);
        let _guard = UpdateGuard(&self.update_lock);
        field.update();
        *self.pending.borrow_mut() = None;
        if let Some(causes) = self.causes.borrow_mut().as_mut() {
            causes.clear();
        }
    }
}

impl Route {
    fn of_base(base: &FieldBase) -> Self {
        Self {
            id: base.id,
            field: base.weak(),
        }
    }
}

impl Drop for FieldBase {
    fn drop(&mut self) {
        for route in self.routes_out.get_mut().drain(..) {
            if let Some(dest) = route.field.upgrade() {
                dest.base().forget_in(self.id);
            }
        }
        for route in self.routes_in.get_mut().drain(..) {
            if let Some(source) = route.field.upgrade() {
                source.base().forget_out(self.id);
            }
        }
    }
}

impl fmt::Debug for FieldBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBase")
            .field("id", &self.id)
            .field("name", &*self.name.borrow())
            .field("access", &self.access.get())
            .field("routes_in", &self.routes_in.borrow().len())
            .field("routes_out", &self.routes_out.borrow().len())
            .field("latest", &self.latest.get())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// Builder-style configuration for freshly created fields.
pub trait FieldBuild: Sized {
    #[must_use]
    fn named(self, name: impl Into<String>) -> Self;
    #[must_use]
    fn with_access(self, access: AccessType) -> Self;
    #[must_use]
    fn with_constraint(self, constraint: TypeConstraint) -> Self;
    #[must_use]
    fn with_mode(self, mode: UpdateMode) -> Self;
    #[must_use]
    fn owned_by(self, owner: Weak<dyn Node>) -> Self;
}

impl<F: Field> FieldBuild for Rc<F> {
    fn named(self, name: impl Into<String>) -> Self {
        self.base().set_name(name);
        self
    }

    fn with_access(self, access: AccessType) -> Self {
        self.base().set_access(access);
        self
    }

    fn with_constraint(self, constraint: TypeConstraint) -> Self {
        self.base().set_constraint(constraint);
        self
    }

    fn with_mode(self, mode: UpdateMode) -> Self {
        self.base().set_update_mode(mode);
        self
    }

    fn owned_by(self, owner: Weak<dyn Node>) -> Self {
        self.base().set_owner(owner);
        self
    }
}

/// Graph operations available on every field.
pub trait FieldExt: Field {
    fn id(&self) -> FieldId {
        self.base().id()
    }

    fn name(&self) -> String {
        self.base().name()
    }

    fn full_name(&self) -> String {
        self.base().full_name()
    }

    fn access(&self) -> AccessType {
        self.base().access()
    }

    fn owner(&self) -> Option<NodeRef> {
        self.base().owner()
    }

    /// Emit a fresh event without changing the value.
    fn touch(&self) {
        route::touch(self.as_field());
    }

    /// Route this field into `dest` and send it an event.
    fn route<D: Field + ?Sized>(&self, dest: &D) -> Result<(), FieldError> {
        route::connect(self.as_field(), dest.as_field(), true, Requester::External)
    }

    /// Route this field into `dest` without sending an event.
    fn route_no_event<D: Field + ?Sized>(&self, dest: &D) -> Result<(), FieldError> {
        route::connect(self.as_field(), dest.as_field(), false, Requester::External)
    }

    /// Route on behalf of `requester`.
    fn route_by<D: Field + ?Sized>(
        &self,
        dest: &D,
        send_event: bool,
        requester: Requester,
    ) -> Result<(), FieldError> {
        route::connect(self.as_field(), dest.as_field(), send_event, requester)
    }

    /// Remove the route into `dest`. Returns whether it existed.
    fn unroute<D: Field + ?Sized>(&self, dest: &D) -> bool {
        route::disconnect(self.as_field(), dest.as_field())
    }

    /// Remove every outgoing route.
    fn unroute_all(&self) {
        route::disconnect_all(self.as_field());
    }

    /// Make this field input `index` of `dest`, returning the replaced source.
    fn replace_route<D: Field + ?Sized>(
        &self,
        dest: &D,
        index: usize,
    ) -> Result<Option<FieldRef>, FieldError> {
        route::replace(self.as_field(), dest.as_field(), index, Requester::External)
    }

    fn routes_to<D: Field + ?Sized>(&self, dest: &D) -> bool {
        self.base().routes_to(dest.base().id())
    }

    fn has_route_from<S: Field + ?Sized>(&self, source: &S) -> bool {
        self.base().has_route_from(source.base().id())
    }

    fn routes_in(&self) -> Vec<FieldRef> {
        self.base().routes_in()
    }

    fn routes_out(&self) -> Vec<FieldRef> {
        self.base().routes_out()
    }

    fn is_up_to_date(&self) -> bool {
        !self.base().is_dirty()
    }

    fn latest_event(&self) -> Event {
        self.base().latest_event()
    }

    fn subscribe(&self, callback: impl Fn(&Event) + 'static) -> Subscription {
        self.base().subscribe(callback)
    }

    /// Check the number of incoming routes against the constraint minimum.
    fn check_route_count(&self) -> Result<(), FieldError> {
        let base = self.base();
        let count = base.routes_in_count();
        base.constraint()
            .check_count(count)
            .map_err(|v| v.into_field_error(base.full_name()))
    }

    fn has_caused_event<S: Field + ?Sized>(&self, source: &S) -> bool {
        self.base().has_caused_event(source.base().id())
    }
}

impl<F: Field + ?Sized> FieldExt for F {}

/// Whether two handles refer to the same field.
#[must_use]
pub fn same_field(a: &dyn Field, b: &dyn Field) -> bool {
    a.base().id() == b.base().id()
}
