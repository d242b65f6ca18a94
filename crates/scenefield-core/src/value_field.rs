#![forbid(unsafe_code)]

//! Value-carrying fields.
//!
//! - [`ValueField<T>`]: a single value (`SFFloat`, `SFVec3f`, ...).
//! - [`ListField<T>`]: a list of values (`MFFloat`, `MFVec3f`, ...).
//! - [`SignalField`]: carries no value; used purely for its events.
//!
//! Without a recompute function a dirty value field copies the value of the
//! field whose event is pending. With one, it evaluates the function over
//! its current inputs.
//!
//! ```ignore
//! let a = ValueField::new(1.0_f32);
//! let b = ValueField::new(2.0_f32);
//! let sum = ValueField::computed(0.0_f32, TypeConstraint::exactly(["SFFloat", "SFFloat"]), |inputs| {
//!     Some(inputs.get::<f32>(0)? + inputs.get::<f32>(1)?)
//! });
//! a.route(&*sum)?;
//! b.route(&*sum)?;
//! assert_eq!(sum.value(), 3.0);
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::access::Requester;
use crate::constraint::{ANY_FIELD_TYPE, TypeConstraint};
use crate::error::{FieldError, FieldOperation};
use crate::event::{Subscribers, Subscription};
use crate::field::{Field, FieldBase, FieldKind, FieldRef, WeakFieldRef};
use crate::route;
use crate::value::FieldValue;

/// Snapshot of a field's incoming routes, in connection order.
pub struct Inputs {
    fields: Vec<FieldRef>,
}

impl Inputs {
    #[must_use]
    pub fn of(base: &FieldBase) -> Self {
        Self {
            fields: base.routes_in(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn field(&self, index: usize) -> Option<&FieldRef> {
        self.fields.get(index)
    }

    /// Value of input `index`, if it exists and holds a `V`.
    ///
    /// Single-value fields hold `T`, list fields `Vec<T>`, node containers
    /// `Option<NodeRef>` and node lists `Vec<NodeRef>`.
    #[must_use]
    pub fn get<V: 'static>(&self, index: usize) -> Option<V> {
        let boxed = self.fields.get(index)?.value_any()?;
        boxed.downcast::<V>().ok().map(|v| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldRef> {
        self.fields.iter()
    }
}

type Recompute<T> = Box<dyn Fn(&Inputs) -> Option<T>>;

fn copy_from_source<V: 'static>(base: &FieldBase) -> Option<V> {
    let source = base.pending_source()?;
    source.value_any()?.downcast::<V>().ok().map(|v| *v)
}

fn check_inputs(base: &FieldBase, inputs: &Inputs) -> bool {
    match base.constraint().check_count(inputs.len()) {
        Ok(()) => true,
        Err(violation) => {
            warn!(
                field = %base.full_name(),
                error = %violation.into_field_error(base.full_name()),
                "recompute skipped"
            );
            false
        }
    }
}

// ---------------------------------------------------------------------------
// ValueField<T>
// ---------------------------------------------------------------------------

/// A field holding a single `T`.
pub struct ValueField<T: FieldValue> {
    base: FieldBase,
    value: RefCell<T>,
    recompute: RefCell<Option<Recompute<T>>>,
    changes: Subscribers<T>,
}

impl<T: FieldValue> FieldKind for ValueField<T> {
    const TYPE_NAME: &'static str = T::SF_NAME;
}

impl<T: FieldValue> ValueField<T> {
    /// Create a field accepting any number of routes of its own type.
    #[must_use]
    pub fn new(value: T) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let this: WeakFieldRef = this.clone();
            Self {
                base: FieldBase::new(this, TypeConstraint::any_number_of(T::SF_NAME)),
                value: RefCell::new(value),
                recompute: RefCell::new(None),
                changes: Subscribers::default(),
            }
        })
    }

    /// Create a field whose value is derived from its inputs.
    #[must_use]
    pub fn computed(
        initial: T,
        constraint: TypeConstraint,
        recompute: impl Fn(&Inputs) -> Option<T> + 'static,
    ) -> Rc<Self> {
        let field = Self::new(initial);
        field.base.set_constraint(constraint);
        field.set_recompute(recompute);
        field
    }

    /// Replace the recompute function. `None` results keep the cached value.
    pub fn set_recompute(&self, recompute: impl Fn(&Inputs) -> Option<T> + 'static) {
        *self.recompute.borrow_mut() = Some(Box::new(recompute));
    }

    /// The up-to-date value.
    #[must_use]
    pub fn value(&self) -> T {
        self.up_to_date();
        self.value.borrow().clone()
    }

    /// Borrow the up-to-date value.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.up_to_date();
        f(&self.value.borrow())
    }

    /// Read the value as an external requester.
    pub fn get_value(&self) -> Result<T, FieldError> {
        self.get_value_by(Requester::External)
    }

    pub fn get_value_by(&self, requester: Requester) -> Result<T, FieldError> {
        self.base.check_access(FieldOperation::Get, requester)?;
        Ok(self.value())
    }

    /// Write the value as an external requester and propagate.
    pub fn set_value(&self, value: T) -> Result<(), FieldError> {
        self.set_value_by(value, Requester::External)
    }

    pub fn set_value_by(&self, value: T, requester: Requester) -> Result<(), FieldError> {
        self.base.check_access(FieldOperation::Set, requester)?;
        self.store(value);
        route::start_event(self);
        Ok(())
    }

    /// Called with the new value whenever the stored value changes.
    pub fn on_change(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.changes.subscribe(callback)
    }

    fn store(&self, value: T) {
        let changed = *self.value.borrow() != value;
        *self.value.borrow_mut() = value;
        if changed {
            let current = self.value.borrow().clone();
            self.changes.notify(&current);
        }
    }
}

impl<T: FieldValue> Field for ValueField<T> {
    fn base(&self) -> &FieldBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        T::SF_NAME
    }

    fn update(&self) {
        let recompute = self.recompute.borrow();
        let next = match recompute.as_ref() {
            Some(recompute) => {
                let inputs = Inputs::of(&self.base);
                if !check_inputs(&self.base, &inputs) {
                    return;
                }
                recompute(&inputs)
            }
            None => copy_from_source::<T>(&self.base),
        };
        drop(recompute);
        if let Some(value) = next {
            self.store(value);
        }
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

impl<T: FieldValue> fmt::Debug for ValueField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueField")
            .field("type", &T::SF_NAME)
            .field("value", &*self.value.borrow())
            .field("base", &self.base)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ListField<T>
// ---------------------------------------------------------------------------

/// A field holding a list of `T`.
pub struct ListField<T: FieldValue> {
    base: FieldBase,
    values: RefCell<Vec<T>>,
    recompute: RefCell<Option<Recompute<Vec<T>>>>,
    changes: Subscribers<Vec<T>>,
}

impl<T: FieldValue> FieldKind for ListField<T> {
    const TYPE_NAME: &'static str = T::MF_NAME;
}

impl<T: FieldValue> ListField<T> {
    #[must_use]
    pub fn new(values: Vec<T>) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let this: WeakFieldRef = this.clone();
            Self {
                base: FieldBase::new(this, TypeConstraint::any_number_of(T::MF_NAME)),
                values: RefCell::new(values),
                recompute: RefCell::new(None),
                changes: Subscribers::default(),
            }
        })
    }

    #[must_use]
    pub fn computed(
        initial: Vec<T>,
        constraint: TypeConstraint,
        recompute: impl Fn(&Inputs) -> Option<Vec<T>> + 'static,
    ) -> Rc<Self> {
        let field = Self::new(initial);
        field.base.set_constraint(constraint);
        *field.recompute.borrow_mut() = Some(Box::new(recompute));
        field
    }

    #[must_use]
    pub fn value(&self) -> Vec<T> {
        self.up_to_date();
        self.values.borrow().clone()
    }

    pub fn with_value<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.up_to_date();
        f(&self.values.borrow())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.with_value(<[T]>::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.with_value(|v| v.get(index).cloned())
    }

    pub fn get_value(&self) -> Result<Vec<T>, FieldError> {
        self.base
            .check_access(FieldOperation::Get, Requester::External)?;
        Ok(self.value())
    }

    pub fn set_value(&self, values: Vec<T>) -> Result<(), FieldError> {
        self.set_value_by(values, Requester::External)
    }

    pub fn set_value_by(&self, values: Vec<T>, requester: Requester) -> Result<(), FieldError> {
        self.base.check_access(FieldOperation::Set, requester)?;
        self.store(values);
        route::start_event(self);
        Ok(())
    }

    /// Append one value and propagate.
    pub fn push(&self, value: T) -> Result<(), FieldError> {
        self.base
            .check_access(FieldOperation::Set, Requester::External)?;
        self.up_to_date();
        let mut values = self.values.borrow().clone();
        values.push(value);
        self.store(values);
        route::start_event(self);
        Ok(())
    }

    /// Remove all values and propagate.
    pub fn clear(&self) -> Result<(), FieldError> {
        self.set_value(Vec::new())
    }

    pub fn on_change(&self, callback: impl Fn(&Vec<T>) + 'static) -> Subscription {
        self.changes.subscribe(callback)
    }

    fn store(&self, values: Vec<T>) {
        let changed = *self.values.borrow() != values;
        *self.values.borrow_mut() = values;
        if changed {
            let current = self.values.borrow().clone();
            self.changes.notify(&current);
        }
    }
}

impl<T: FieldValue> Field for ListField<T> {
    fn base(&self) -> &FieldBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        T::MF_NAME
    }

    fn update(&self) {
        let recompute = self.recompute.borrow();
        let next = match recompute.as_ref() {
            Some(recompute) => {
                let inputs = Inputs::of(&self.base);
                if !check_inputs(&self.base, &inputs) {
                    return;
                }
                recompute(&inputs)
            }
            None => copy_from_source::<Vec<T>>(&self.base),
        };
        drop(recompute);
        if let Some(values) = next {
            self.store(values);
        }
    }

    fn value_any(&self) -> Option<Box<dyn Any>> {
        Some(Box::new(self.value()))
    }

    fn value_as_string(&self) -> Option<String> {
        Some(self.with_value(T::format_list))
    }

    fn set_value_from_str(&self, text: &str) -> Result<(), FieldError> {
        let values = T::parse_list(text).map_err(|e| FieldError::Parse {
            field: self.base.full_name(),
            message: e.to_string(),
        })?;
        self.set_value(values)
    }
}

impl<T: FieldValue> fmt::Debug for ListField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListField")
            .field("type", &T::MF_NAME)
            .field("len", &self.values.borrow().len())
            .field("base", &self.base)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SignalField
// ---------------------------------------------------------------------------

/// A field without a value. Forwards every event it receives.
pub struct SignalField {
    base: FieldBase,
}

impl FieldKind for SignalField {
    const TYPE_NAME: &'static str = ANY_FIELD_TYPE;
}

impl SignalField {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let this: WeakFieldRef = this.clone();
            Self {
                base: FieldBase::new(this, TypeConstraint::unconstrained()),
            }
        })
    }
}

impl Field for SignalField {
    fn base(&self) -> &FieldBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        ANY_FIELD_TYPE
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::field::{FieldBuild, FieldExt, UpdateMode};
    use crate::value::Vec3f;

    #[test]
    fn copies_value_along_route() {
        let a = ValueField::new(1.0_f32);
        let b = ValueField::new(0.0_f32);
        a.route(&*b).unwrap();
        assert_eq!(b.value(), 1.0);
        a.set_value(4.0).unwrap();
        assert!(!b.is_up_to_date());
        assert_eq!(b.value(), 4.0);
        assert!(b.is_up_to_date());
    }

    #[test]
    fn computed_sum_is_lazy() {
        let calls = Rc::new(Cell::new(0));
        let calls2 = Rc::clone(&calls);
        let a = ValueField::new(1.0_f32);
        let b = ValueField::new(2.0_f32);
        let sum = ValueField::computed(
            0.0_f32,
            TypeConstraint::exactly(["SFFloat", "SFFloat"]),
            move |inputs| {
                calls2.set(calls2.get() + 1);
                Some(inputs.get::<f32>(0)? + inputs.get::<f32>(1)?)
            },
        );
        a.route_no_event(&*sum).unwrap();
        b.route_no_event(&*sum).unwrap();
        a.touch();
        b.set_value(5.0).unwrap();
        assert_eq!(calls.get(), 0);
        assert_eq!(sum.value(), 6.0);
        assert_eq!(sum.value(), 6.0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn too_few_inputs_keeps_cached_value() {
        let a = ValueField::new(1.0_f32);
        let sum = ValueField::computed(
            -1.0_f32,
            TypeConstraint::exactly(["SFFloat", "SFFloat"]),
            |inputs| Some(inputs.get::<f32>(0)? + inputs.get::<f32>(1)?),
        );
        a.route(&*sum).unwrap();
        assert_eq!(sum.value(), -1.0);
        assert!(sum.check_route_count().is_err());
    }

    #[test]
    fn eager_field_updates_at_end_of_pass() {
        let a = ValueField::new(1_i32);
        let b = ValueField::new(0_i32).with_mode(UpdateMode::Eager);
        let seen = Rc::new(Cell::new(0));
        let seen2 = Rc::clone(&seen);
        let _sub = b.on_change(move |v| seen2.set(*v));
        a.route(&*b).unwrap();
        assert_eq!(seen.get(), 1);
        a.set_value(7).unwrap();
        assert_eq!(seen.get(), 7);
        assert!(b.is_up_to_date());
    }

    #[test]
    fn on_change_skips_equal_values() {
        let a = ValueField::new(Vec3f::ZERO);
        let hits = Rc::new(Cell::new(0));
        let hits2 = Rc::clone(&hits);
        let _sub = a.on_change(move |_| hits2.set(hits2.get() + 1));
        a.set_value(Vec3f::ZERO).unwrap();
        a.set_value(Vec3f::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn list_field_text_round() {
        let points = ListField::<Vec3f>::new(Vec::new()).named("point");
        points.set_value_from_str("0 0 0, 1 1 1").unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points.get(1), Some(Vec3f::new(1.0, 1.0, 1.0)));
        let err = points.set_value_from_str("0 0").unwrap_err();
        assert!(matches!(err, FieldError::Parse { .. }));
    }

    #[test]
    fn list_push_propagates() {
        let src = ListField::new(vec![1_i32]);
        let dst = ListField::new(Vec::<i32>::new());
        src.route(&*dst).unwrap();
        src.push(2).unwrap();
        assert_eq!(dst.value(), vec![1, 2]);
    }

    #[test]
    fn default_constraint_is_same_type() {
        let f = ValueField::new(0.0_f32);
        let v = ValueField::new(Vec3f::ZERO);
        let err = v.route(&*f).unwrap_err();
        assert!(matches!(err, FieldError::InvalidType { .. }));
        assert!(!v.routes_to(&*f));
    }

    #[test]
    fn signal_forwards_events() {
        let a = ValueField::new(1_i32);
        let signal = SignalField::new();
        let b = ValueField::computed(0_i32, TypeConstraint::unconstrained(), |_| Some(99));
        a.route(&*signal).unwrap();
        signal.route(&*b).unwrap();
        a.set_value(2).unwrap();
        assert!(!b.is_up_to_date());
        assert_eq!(b.value(), 99);
    }
}
