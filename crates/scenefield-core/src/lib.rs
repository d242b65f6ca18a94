#![forbid(unsafe_code)]

//! Reactive field/route dataflow engine for scene graphs.
//!
//! Scene-graph nodes own typed fields. Fields are connected by directed
//! routes; writing a field marks everything downstream dirty, and dirty
//! fields recompute lazily when read.
//!
//! This crate provides:
//! - [`Field`], [`FieldBase`] and the value fields [`ValueField`],
//!   [`ListField`] and [`SignalField`]
//! - Routing and event propagation ([`FieldExt::route`], [`route`])
//! - Per-field input constraints ([`TypeConstraint`])
//! - Node containers ([`NodeField`], [`NodeListField`]) and containers that
//!   relay events from fields of the held nodes ([`DependentNodeField`])
//! - The [`Node`] trait, a [`TypeRegistry`] of node types and declared
//!   fields, and per-instance [`DynamicFieldHost`]s
//! - [`RealtimeField`] for values shared with a device thread, refreshed by
//!   an [`EventSink`]
//! - Thread-local [`GraphConfig`]
//!
//! The graph is single-threaded: fields and nodes are `Rc`-based and all
//! structural changes happen on one thread.

pub mod access;
pub mod config;
pub mod constraint;
pub mod container;
pub mod dependent;
pub mod dynamic;
pub mod error;
pub mod event;
pub mod field;
pub mod node;
pub mod realtime;
pub mod registry;
pub mod route;
pub mod tick;
pub mod value;
pub mod value_field;

pub use access::{AccessType, Requester};
pub use config::{ConfigGuard, GraphConfig};
pub use constraint::{ANY_FIELD_TYPE, ConstraintEntry, RouteCount, TypeConstraint};
pub use container::{NoHooks, NodeField, NodeFilter, NodeHooks, NodeListField};
pub use dependent::{
    DependentDescriptor, DependentHooks, DependentNodeField, DependentNodeListField, EventRelay,
    LinkMode,
};
pub use dynamic::DynamicFieldHost;
pub use error::{ConfigError, FieldError, FieldOperation, RegistryError};
pub use event::{Event, EventStamp, Subscription};
pub use field::{
    Field, FieldBase, FieldBuild, FieldExt, FieldId, FieldKind, FieldRef, UpdateMode,
    WeakFieldRef, same_field,
};
pub use node::{NamedNode, Node, NodeCore, NodeExt, NodeId, NodeRef, WeakNodeRef, same_node};
pub use realtime::{RealtimeField, RealtimeHandle};
pub use registry::{
    FieldAccessor, FieldDescriptor, FieldInfo, NodeFactory, NodeType, TypeDef, TypeRegistry,
};
pub use route::Propagation;
pub use tick::{EventSink, Period};
pub use value::{FieldValue, ParseValueError, Rgb, Rotation, Vec2f, Vec3f};
pub use value_field::{Inputs, ListField, SignalField, ValueField};
