#![forbid(unsafe_code)]

//! Per-instance fields added at runtime.
//!
//! A node that supports dynamic fields embeds a [`DynamicFieldHost`] and
//! returns it from [`Node::dynamic_fields`]. The host owns the added
//! fields; the overlay list is only allocated on the first addition.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::Weak;

use tracing::debug;

use crate::access::AccessType;
use crate::field::FieldRef;
use crate::node::{Node, NodeRef};
use crate::registry;

struct DynamicEntry {
    name: String,
    access: AccessType,
    field: FieldRef,
}

/// Owner of a node's dynamically added fields.
#[derive(Default)]
pub struct DynamicFieldHost {
    owner: OnceCell<Weak<dyn Node>>,
    overlay: RefCell<Option<Vec<DynamicEntry>>>,
}

impl DynamicFieldHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the owning node. Only the first call has an effect.
    pub fn bind_owner(&self, owner: Weak<dyn Node>) -> bool {
        self.owner.set(owner).is_ok()
    }

    #[must_use]
    pub fn owner(&self) -> Option<NodeRef> {
        self.owner.get().and_then(Weak::upgrade)
    }

    /// Add `field` under `name`.
    ///
    /// Returns `false`, leaving everything unchanged, if the name is taken
    /// by another dynamic field or by a declared field of the owner's type.
    pub fn add_field(&self, name: impl Into<String>, access: AccessType, field: FieldRef) -> bool {
        let name = name.into();
        if self.get_field(&name).is_some() {
            return false;
        }
        let owner = self.owner();
        if let Some(owner) = &owner {
            let declared = registry::with(|reg| reg.lookup(owner.type_name(), &name).is_some());
            if declared {
                return false;
            }
        }
        let base = field.base();
        base.set_name(name.clone());
        base.set_access(access);
        if let Some(weak) = self.owner.get() {
            base.set_owner(weak.clone());
        }
        debug!(field = %base.full_name(), %access, "dynamic field added");
        self.overlay
            .borrow_mut()
            .get_or_insert_with(Vec::new)
            .push(DynamicEntry {
                name: name.clone(),
                access,
                field: FieldRef::clone(&field),
            });
        if let Some(owner) = owner {
            owner.field_added(&name, &field);
        }
        true
    }

    /// Remove and release every dynamic field. Returns how many there were.
    ///
    /// The owner's [`Node::field_removed`] runs for each field, which is then
    /// detached from the owner. Handles kept elsewhere stay usable as plain
    /// fields.
    pub fn clear_fields(&self) -> usize {
        let removed = self.overlay.borrow_mut().take().unwrap_or_default();
        let owner = self.owner();
        for entry in &removed {
            if let Some(owner) = &owner {
                owner.field_removed(&entry.name, &entry.field);
            }
            entry.field.base().clear_owner();
            debug!(field = %entry.name, "dynamic field removed");
        }
        removed.len()
    }

    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<FieldRef> {
        self.overlay
            .borrow()
            .as_ref()?
            .iter()
            .find(|e| e.name == name)
            .map(|e| FieldRef::clone(&e.field))
    }

    /// Dynamic fields in insertion order.
    #[must_use]
    pub fn fields(&self) -> Vec<(String, AccessType, FieldRef)> {
        self.overlay
            .borrow()
            .iter()
            .flatten()
            .map(|e| (e.name.clone(), e.access, FieldRef::clone(&e.field)))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.overlay.borrow().as_ref().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the overlay has been allocated.
    #[must_use]
    pub fn has_overlay(&self) -> bool {
        self.overlay.borrow().is_some()
    }
}

impl fmt::Debug for DynamicFieldHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.fields().into_iter().map(|(n, _, _)| n).collect();
        f.debug_struct("DynamicFieldHost")
            .field("fields", &names)
            .finish()
    }
}
