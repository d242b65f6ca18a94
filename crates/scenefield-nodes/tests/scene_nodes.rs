//! End-to-end tests across node types, containers and the registry.

use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;
use scenefield_core::{
    AccessType, DependentDescriptor, DependentNodeField, Field, FieldExt, LinkMode, NodeExt,
    NodeRef, RegistryError, Subscription, ValueField, Vec3f, registry,
};
use scenefield_nodes::{BoxNode, Coordinate, Group, PointSet, ProgramShader, register_default};

fn count_events(field: &dyn Field) -> (Rc<Cell<u32>>, Subscription) {
    let hits = Rc::new(Cell::new(0));
    let counter = Rc::clone(&hits);
    let sub = field.subscribe(move |_| counter.set(counter.get() + 1));
    (hits, sub)
}

fn watch_coordinates() -> Rc<DependentNodeField> {
    DependentNodeField::dependent(
        vec![DependentDescriptor::of(Coordinate::changed)],
        LinkMode::Strict,
    )
}

fn fresh_registry() {
    registry::reset();
    register_default().unwrap();
}

#[test]
fn point_write_reaches_watcher_once_with_same_stamp() {
    let watcher = watch_coordinates();
    let c1 = Coordinate::new();
    watcher.set_value(Some(c1.clone())).unwrap();

    let (hits, _sub) = count_events(&*watcher);
    c1.point
        .set_value(vec![Vec3f::ZERO, Vec3f::new(1.0, 2.0, 3.0)])
        .unwrap();

    assert_eq!(hits.get(), 1);
    assert_eq!(
        watcher.latest_event().stamp,
        c1.point.latest_event().stamp
    );
}

#[test]
fn swapping_held_node_moves_the_links() {
    let watcher = watch_coordinates();
    let n1 = Coordinate::new();
    let n2 = Coordinate::new();
    watcher.set_value(Some(n1.clone())).unwrap();

    let (hits, _sub) = count_events(&*watcher);
    n1.changed().touch();
    assert_eq!(hits.get(), 1);

    watcher.set_value(Some(n2.clone())).unwrap();
    let relay = watcher.hooks().relay();
    assert!(!n1.changed().routes_to(&**relay));
    assert!(n2.changed().routes_to(&**relay));

    hits.set(0);
    n1.changed().touch();
    assert_eq!(hits.get(), 0);
    n2.changed().touch();
    assert_eq!(hits.get(), 1);
}

#[test]
fn strict_watcher_ignores_other_types() {
    let watcher = watch_coordinates();
    watcher.set_value(Some(BoxNode::new())).unwrap();
    assert!(watcher.hooks().watched_fields().is_empty());
    assert_eq!(watcher.hooks().linked_nodes(), 1);
}

#[test]
fn box_defaults_through_the_registry() {
    fresh_registry();
    let node = registry::instantiate("Box").unwrap();
    let b = node.downcast_ref::<BoxNode>().unwrap();
    assert_eq!(b.size.value(), Vec3f::new(2.0, 2.0, 2.0));

    let size = node.get_field("set_size").unwrap();
    size.set_value_from_str("1 2 3").unwrap();
    assert_eq!(b.size.value(), Vec3f::new(1.0, 2.0, 3.0));
    assert!(node.get_field("size_changed").is_some());
    assert!(node.get_field("metadata").is_some());
    registry::reset();
}

#[test]
fn box_instantiated_while_the_registry_is_borrowed() {
    fresh_registry();
    let node = registry::with_mut(|reg| reg.instantiate("Box")).unwrap();
    let b = node.downcast_ref::<BoxNode>().unwrap();
    assert_eq!(b.size.base().full_name(), "Box.size");
    assert!(node.get_field("size_changed").is_some());

    let shader = registry::with_mut(|reg| reg.instantiate("ProgramShader")).unwrap();
    assert!(shader.get_field("language").is_some());
    registry::reset();
}

#[test]
fn inherited_fields_resolve_through_abstract_types() {
    fresh_registry();
    let found = registry::with(|reg| {
        let desc = reg.lookup("Group", "children")?;
        Some(desc.access())
    });
    assert_eq!(found, Some(AccessType::InputOutput));
    assert!(registry::with(|reg| reg.is_subtype("Coordinate", "X3DNode")));

    let group = registry::instantiate("Group").unwrap();
    let children = group.get_field("children").unwrap();
    assert_eq!(children.type_name(), "MFNode");
    registry::reset();
}

#[test]
fn abstract_types_cannot_be_instantiated() {
    fresh_registry();
    let err = registry::instantiate("X3DGeometryNode").unwrap_err();
    assert!(matches!(err, RegistryError::NoFactory(_)));
    registry::reset();
}

#[test]
fn registering_twice_is_refused() {
    fresh_registry();
    assert!(register_default().is_err());
    registry::reset();
}

#[test]
fn point_set_counts_through_the_registry() {
    fresh_registry();
    let node = registry::instantiate("PointSet").unwrap();
    let coord: NodeRef = Coordinate::with_points(vec![Vec3f::ZERO; 3]);
    let ps = node.downcast_ref::<PointSet>().unwrap();
    ps.coord.set_value(Some(coord)).unwrap();
    let count = node.get_field("pointCount").unwrap();
    assert_eq!(count.value_as_string().as_deref(), Some("3"));
    registry::reset();
}

#[test]
fn shader_uniform_added_once() {
    let shader = ProgramShader::new();
    let first = ValueField::new(1.0_f32);
    assert!(shader.add_uniform("x", AccessType::InputOutput, first.clone()));
    assert!(!shader.add_uniform("x", AccessType::InputOutput, ValueField::new(5.0_f32)));

    let x = shader.get_field("x").unwrap();
    assert!(scenefield_core::same_field(&*x, &*first));
    assert_eq!(x.value_as_string().as_deref(), Some("1"));
}

#[derive(Debug, Clone)]
enum Edit {
    Add(usize),
    Remove(usize),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0usize..5).prop_map(Edit::Add),
        (0usize..5).prop_map(Edit::Remove),
    ]
}

proptest! {
    #[test]
    fn group_edits_match_a_model(edits in proptest::collection::vec(edit(), 0..24)) {
        let group = Group::new();
        let pool: Vec<NodeRef> = (0..5).map(|_| -> NodeRef { Group::new() }).collect();
        let mut model: Vec<usize> = Vec::new();

        for e in edits {
            match e {
                Edit::Add(i) => {
                    group.add_children().set_value(vec![pool[i].clone()]).unwrap();
                    if !model.contains(&i) {
                        model.push(i);
                    }
                }
                Edit::Remove(i) => {
                    group.remove_children().set_value(vec![pool[i].clone()]).unwrap();
                    model.retain(|&m| m != i);
                }
            }
        }

        let children = group.children().value();
        prop_assert_eq!(children.len(), model.len());
        for (child, &i) in children.iter().zip(&model) {
            prop_assert!(scenefield_core::same_node(&**child, &*pool[i]));
        }
    }
}
