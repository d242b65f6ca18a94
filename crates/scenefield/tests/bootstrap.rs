#![cfg(feature = "nodes")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use scenefield::prelude::*;
use scenefield::{Error, RegistryError, bootstrap};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn bootstrap_registers_builtin_types() {
    registry::reset();
    let config = bootstrap().unwrap();
    assert_eq!(config, GraphConfig::current());

    let node = registry::instantiate("Shape").unwrap();
    assert!(node.get_field("geometry").is_some());
    assert!(node.is_a("X3DChildNode"));
    registry::reset();
}

#[test]
fn second_bootstrap_on_a_thread_fails() {
    registry::reset();
    bootstrap().unwrap();
    let err = bootstrap().unwrap_err();
    assert!(matches!(err, Error::Registry(RegistryError::DuplicateType(_))));
    assert!(err.to_string().starts_with("type registration:"));
    registry::reset();
}

#[test]
fn rejected_children_edit_is_logged() {
    let counter = WarnCounter::default();
    let subscriber = Registry::default().with(counter.clone());

    tracing::subscriber::with_default(subscriber, || {
        let group = Group::new();
        group
            .add_children()
            .set_value(vec![BoxNode::new() as NodeRef])
            .unwrap();
        assert!(group.children().is_empty());
    });

    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
}

#[test]
fn shape_sees_geometry_edits() {
    let shape = Shape::new();
    let geometry = BoxNode::new();
    shape.geometry.set_value(Some(geometry.clone())).unwrap();
    geometry.size.set_value(Vec3f::new(4.0, 4.0, 4.0)).unwrap();
    assert_eq!(
        shape.display_changed().latest_event().stamp,
        geometry.size.latest_event().stamp
    );
}
