#![forbid(unsafe_code)]

//! Fields shared with a realtime device thread.
//!
//! The graph is single-threaded. A [`RealtimeField`] is the only kind of
//! field whose value crosses to another thread, and it does so through two
//! snapshot slots rather than through routes:
//!
//! ```text
//!  scene thread                         device thread
//!  ------------                         -------------
//!  set_value / update ──► published ──► RealtimeHandle::read
//!  sync (on read/tick) ◄── device   ◄── RealtimeHandle::write
//! ```
//!
//! Each slot has a single writer. The scene thread only reads the device
//! slot, and only during [`RealtimeField::sync`], which runs whenever the
//! field is brought up to date (typically from
//! [`EventSink::tick`](crate::tick::EventSink::tick)).

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use tracing::{trace, warn};

use crate::access::Requester;
use crate::constraint::TypeConstraint;
use crate::error::{FieldError, FieldOperation};
use crate::event::{Subscribers, Subscription};
use crate::field::{Field, FieldBase, FieldKind, WeakFieldRef};
use crate::route;
use crate::value::FieldValue;

struct Exchange<T> {
    published: ArcSwap<T>,
    published_version: AtomicU64,
    device: ArcSwapOption<T>,
    device_version: AtomicU64,
    closed: AtomicBool,
}

/// The device thread's end of a [`RealtimeField`].
pub struct RealtimeHandle<T> {
    exchange: Arc<Exchange<T>>,
}

impl<T> Clone for RealtimeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            exchange: Arc::clone(&self.exchange),
        }
    }
}

impl<T: Send + Sync> RealtimeHandle<T> {
    /// Latest value published by the scene thread.
    #[must_use]
    pub fn read(&self) -> Arc<T> {
        self.exchange.published.load_full()
    }

    /// Incremented on every scene-side publish.
    #[must_use]
    pub fn published_version(&self) -> u64 {
        self.exchange.published_version.load(Ordering::Acquire)
    }

    /// Offer a value to the scene thread. It replaces any write the scene
    /// thread has not picked up yet.
    ///
    /// Returns `false` if the field no longer exists.
    pub fn write(&self, value: T) -> bool {
        if self.exchange.closed.load(Ordering::Acquire) {
            warn!("realtime write dropped: field is gone");
            return false;
        }
        self.exchange.device.store(Some(Arc::new(value)));
        self.exchange.device_version.fetch_add(1, Ordering::Release);
        true
    }

    /// Whether the scene-side field still exists.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.exchange.closed.load(Ordering::Acquire)
    }
}

impl<T> fmt::Debug for RealtimeHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeHandle")
            .field(
                "published_version",
                &self.exchange.published_version.load(Ordering::Relaxed),
            )
            .field(
                "device_version",
                &self.exchange.device_version.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// A single value readable and writable from a device thread.
pub struct RealtimeField<T: FieldValue + Send + Sync> {
    base: FieldBase,
    value: RefCell<T>,
    exchange: Arc<Exchange<T>>,
    seen_device_version: Cell<u64>,
    changes: Subscribers<T>,
}

impl<T: FieldValue + Send + Sync> FieldKind for RealtimeField<T> {
    const TYPE_NAME: &'static str = T::SF_NAME;
}

impl<T: FieldValue + Send + Sync> RealtimeField<T> {
    #[must_use]
    pub fn new(value: T) -> Rc<Self> {
        let exchange = Arc::new(Exchange {
            published: ArcSwap::from_pointee(value.clone()),
            published_version: AtomicU64::new(0),
            device: ArcSwapOption::empty(),
            device_version: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        Rc::new_cyclic(|this: &Weak<Self>| {
            let this: WeakFieldRef = this.clone();
            Self {
                base: FieldBase::new(this, TypeConstraint::any_number_of(T::SF_NAME)),
                value: RefCell::new(value),
                exchange,
                seen_device_version: Cell::new(0),
                changes: Subscribers::default(),
            }
        })
    }

    /// A handle for the device thread.
    #[must_use]
    pub fn handle(&self) -> RealtimeHandle<T> {
        RealtimeHandle {
            exchange: Arc::clone(&self.exchange),
        }
    }

    /// The up-to-date value, including any pending device write.
    #[must_use]
    pub fn value(&self) -> T {
        self.up_to_date();
        self.value.borrow().clone()
    }

    pub fn get_value(&self) -> Result<T, FieldError> {
        self.base
            .check_access(FieldOperation::Get, Requester::External)?;
        Ok(self.value())
    }

    /// Write from the scene thread, publish, and propagate.
    pub fn set_value(&self, value: T) -> Result<(), FieldError> {
        self.set_value_by(value, Requester::External)
    }

    pub fn set_value_by(&self, value: T, requester: Requester) -> Result<(), FieldError> {
        self.base.check_access(FieldOperation::Set, requester)?;
        self.store(value);
        self.publish();
        route::start_event(self);
        Ok(())
    }

    pub fn on_change(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.changes.subscribe(callback)
    }

    /// Pick up the latest device write, if there is a new one, and
    /// propagate it. Returns whether anything was picked up.
    pub fn sync(&self) -> bool {
        let version = self.exchange.device_version.load(Ordering::Acquire);
        if version == self.seen_device_version.get() {
            return false;
        }
        self.seen_device_version.set(version);
        let Some(written) = self.exchange.device.load_full() else {
            return false;
        };
        trace!(field = %self.base.full_name(), version, "device write picked up");
        self.store(T::clone(&written));
        self.publish();
        route::start_event(self);
        true
    }

    fn store(&self, value: T) {
        let changed = *self.value.borrow() != value;
        *self.value.borrow_mut() = value;
        if changed {
            let current = self.value.borrow().clone();
            self.changes.notify(&current);
        }
    }

    fn publish(&self) {
        let snapshot = self.value.borrow().clone();
        self.exchange.published.store(Arc::new(snapshot));
        self.exchange
            .published_version
            .fetch_add(1, Ordering::Release);
    }
}

impl<T: FieldValue + Send + Sync> Field for RealtimeField<T> {
    fn base(&self) -> &FieldBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        T::SF_NAME
    }

    fn update(&self) {
        let Some(source) = self.base.pending_source() else {
            return;
        };
        let Some(value) = source.value_any().and_then(|v| v.downcast::<T>().ok()) else {
            return;
        };
        self.store(*value);
        self.publish();
    }

    fn up_to_date(&self) {
        if !self.base.is_updating() {
            self.sync();
        }
        self.base.refresh(self);
    }

    fn value_any(&self) -> Option<Box<dyn Any>> {
        Some(Box::new(self.value()))
    }

    fn value_as_string(&self) -> Option<String> {
        Some(self.value().format())
    }

    fn set_value_from_str(&self, text: &str) -> Result<(), FieldError> {
        let value = T::parse(text).map_err(|e| FieldError::Parse {
            field: self.base.full_name(),
            message: e.to_string(),
        })?;
        self.set_value(value)
    }
}

impl<T: FieldValue + Send + Sync> Drop for RealtimeField<T> {
    fn drop(&mut self) {
        self.exchange.closed.store(true, Ordering::Release);
    }
}

impl<T: FieldValue + Send + Sync> fmt::Debug for RealtimeField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeField")
            .field("type", &T::SF_NAME)
            .field("value", &*self.value.borrow())
            .field("base", &self.base)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::field::FieldExt;
    use crate::value::Vec3f;
    use crate::value_field::ValueField;

    #[test]
    fn scene_writes_are_published() {
        let field = RealtimeField::new(Vec3f::ZERO);
        let handle = field.handle();
        let v0 = handle.published_version();
        field.set_value(Vec3f::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(*handle.read(), Vec3f::new(1.0, 2.0, 3.0));
        assert!(handle.published_version() > v0);
    }

    #[test]
    fn device_write_reaches_scene_on_sync() {
        let field = RealtimeField::new(0.0_f32);
        let downstream = ValueField::new(0.0_f32);
        field.route(&*downstream).unwrap();
        let handle = field.handle();

        thread::spawn(move || {
            handle.write(0.25);
            handle.write(0.5);
        })
        .join()
        .unwrap();

        assert!(field.sync());
        assert!(!field.sync());
        assert!(!downstream.is_up_to_date());
        assert_eq!(downstream.value(), 0.5);
    }

    #[test]
    fn reading_pulls_pending_device_write() {
        let field = RealtimeField::new(1_i32);
        field.handle().write(7);
        assert_eq!(field.value(), 7);
        assert_eq!(*field.handle().read(), 7);
    }

    #[test]
    fn routed_value_is_published() {
        let source = ValueField::new(3_i32);
        let field = RealtimeField::new(0_i32);
        source.route(&*field).unwrap();
        let handle = field.handle();
        source.set_value(9).unwrap();
        assert_eq!(field.value(), 9);
        assert_eq!(*handle.read(), 9);
    }

    #[test]
    fn write_after_drop_is_refused() {
        let field = RealtimeField::new(0_i32);
        let handle = field.handle();
        assert!(handle.is_connected());
        drop(field);
        assert!(!handle.is_connected());
        assert!(!handle.write(1));
    }

    #[test]
    fn handle_is_send_and_sync() {
        fn assert_send_sync<S: Send + Sync>() {}
        assert_send_sync::<RealtimeHandle<Vec3f>>();
    }
}
