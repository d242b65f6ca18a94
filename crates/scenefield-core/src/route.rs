#![forbid(unsafe_code)]

//! Route maintenance and event propagation.
//!
//! A propagation pass is a breadth-first walk over outgoing routes, tagged
//! with one [`EventStamp`]. Each field accepts the pass at most once, so
//! diamonds deliver a single event and cycles stop where they started.
//! Lazy fields are only marked dirty; eager fields are collected and
//! recomputed after the walk finishes.

use std::collections::VecDeque;

use tracing::{debug, debug_span, trace};

use crate::access::Requester;
use crate::config::GraphConfig;
use crate::error::{FieldError, FieldOperation};
use crate::event::{Event, EventStamp};
use crate::field::{Field, FieldBase, FieldRef, UpdateMode, WeakFieldRef};

struct Delivery {
    dest: FieldRef,
    from: WeakFieldRef,
    event: Event,
    relayed: bool,
}

/// One in-flight propagation pass.
pub struct Propagation {
    stamp: EventStamp,
    queue: VecDeque<Delivery>,
    eager: Vec<FieldRef>,
    trace: bool,
}

impl Propagation {
    fn new(stamp: EventStamp) -> Self {
        Self {
            stamp,
            queue: VecDeque::new(),
            eager: Vec::new(),
            trace: GraphConfig::current().trace_propagation,
        }
    }

    #[must_use]
    pub fn stamp(&self) -> EventStamp {
        self.stamp
    }

    /// Queue delivery of this pass along every outgoing route of `from`.
    pub fn forward(&mut self, from: &dyn Field) {
        let base = from.base();
        let event = Event::new(base.id(), self.stamp);
        for dest in base.routes_out() {
            self.queue.push_back(Delivery {
                dest,
                from: base.weak(),
                event,
                relayed: false,
            });
        }
    }

    /// Signal `target` as part of this pass without making it dirty.
    ///
    /// The target notifies its subscribers and forwards along its own
    /// routes, but keeps its cached value.
    pub fn relay(&mut self, from: &dyn Field, target: FieldRef) {
        let base = from.base();
        self.queue.push_back(Delivery {
            dest: target,
            from: base.weak(),
            event: Event::new(base.id(), self.stamp),
            relayed: true,
        });
    }

    fn deliver(&mut self, from: &dyn Field, dest: FieldRef) {
        let base = from.base();
        self.queue.push_back(Delivery {
            dest,
            from: base.weak(),
            event: Event::new(base.id(), self.stamp),
            relayed: false,
        });
    }

    fn run(mut self) {
        let _span = debug_span!("propagate", stamp = self.stamp.get()).entered();
        let mut delivered = 0usize;
        while let Some(delivery) = self.queue.pop_front() {
            let dest = delivery.dest;
            let base = dest.base();
            let accepted = if delivery.relayed {
                base.observe(delivery.event)
            } else {
                base.accept(delivery.event, &delivery.from)
            };
            if !accepted {
                continue;
            }
            delivered += 1;
            if self.trace {
                trace!(to = %base.full_name(), source = %delivery.event.source, "event");
            }
            base.notify(&delivery.event);
            if !delivery.relayed && base.update_mode() == UpdateMode::Eager {
                self.eager.push(FieldRef::clone(&dest));
            }
            dest.on_event(&delivery.event, &mut self);
        }
        for field in std::mem::take(&mut self.eager) {
            field.up_to_date();
        }
        trace!(delivered, "pass complete");
    }
}

fn run_from(field: &dyn Field, event: Event) {
    let base = field.base();
    base.notify(&event);
    let mut pass = Propagation::new(event.stamp);
    pass.forward(field);
    pass.run();
}

/// Emit a fresh event from `field` without changing its value.
///
/// Ignored while `field` is recomputing.
pub fn touch(field: &dyn Field) {
    let base = field.base();
    if base.is_updating() {
        debug!(field = %base.full_name(), "touch ignored during update");
        return;
    }
    let event = base.begin_event(false);
    run_from(field, event);
}

/// Emit a fresh event after `field`'s value was written.
pub(crate) fn start_event(field: &dyn Field) {
    let event = field.base().begin_event(true);
    run_from(field, event);
}

/// Connect `source -> dest`.
///
/// A route that already exists is left alone. With `send_event`, `dest`
/// receives an event from `source` once the route is in place.
///
/// Fails with [`FieldError::FieldDropped`] if either end has no live
/// handle, e.g. while it is being dropped.
pub fn connect(
    source: &dyn Field,
    dest: &dyn Field,
    send_event: bool,
    requester: Requester,
) -> Result<(), FieldError> {
    let (src, dst) = (source.base(), dest.base());
    if src.this().is_none() || dst.this().is_none() {
        return Err(FieldError::FieldDropped);
    }
    src.check_access(FieldOperation::RouteFrom, requester)?;
    dst.check_access(FieldOperation::RouteTo, requester)?;
    if src.routes_to(dst.id()) {
        return Ok(());
    }
    let position = dst.routes_in_count();
    dst.constraint()
        .check(position, source.type_name())
        .map_err(|v| v.into_field_error(dst.full_name()))?;
    FieldBase::link(source, dest);
    debug!(from = %src.full_name(), to = %dst.full_name(), "route added");
    if send_event {
        send_route_event(source, dest);
    }
    Ok(())
}

fn send_route_event(source: &dyn Field, dest: &dyn Field) {
    if !GraphConfig::current().route_events {
        return;
    }
    let Some(dest) = dest.base().this() else {
        return;
    };
    let mut pass = Propagation::new(EventStamp::next());
    pass.deliver(source, dest);
    pass.run();
}

/// Remove `source -> dest`. Returns whether the route existed.
///
/// The destination keeps its last cached value.
pub fn disconnect(source: &dyn Field, dest: &dyn Field) -> bool {
    let removed = FieldBase::unlink(source.base(), dest.base());
    if removed {
        debug!(
            from = %source.base().full_name(),
            to = %dest.base().full_name(),
            "route removed"
        );
    }
    removed
}

/// Remove every outgoing route of `source`.
pub fn disconnect_all(source: &dyn Field) {
    for dest in source.base().routes_out() {
        disconnect(source, &*dest);
    }
}

/// Make `source` input `index` of `dest`, returning the source it replaced.
///
/// An index past the current inputs appends a new route instead.
pub fn replace(
    source: &dyn Field,
    dest: &dyn Field,
    index: usize,
    requester: Requester,
) -> Result<Option<FieldRef>, FieldError> {
    let (src, dst) = (source.base(), dest.base());
    if index >= dst.routes_in_count() {
        return connect(source, dest, true, requester).map(|()| None);
    }
    src.check_access(FieldOperation::RouteFrom, requester)?;
    dst.check_access(FieldOperation::RouteTo, requester)?;
    if src.routes_to(dst.id()) {
        return Ok(None);
    }
    dst.constraint()
        .check(index, source.type_name())
        .map_err(|v| v.into_field_error(dst.full_name()))?;
    let old = dst.replace_in(index, source).and_then(|w| w.upgrade());
    if let Some(old) = &old {
        FieldBase::unlink(old.base(), dst);
    }
    debug!(from = %src.full_name(), to = %dst.full_name(), index, "route replaced");
    send_route_event(source, dest);
    Ok(old)
}
