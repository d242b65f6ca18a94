//! Property tests for route bookkeeping, propagation and constraints.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use proptest::prelude::*;
use scenefield_core::{FieldExt, SignalField, Subscription, TypeConstraint};

const NODES: usize = 6;

fn fields(n: usize) -> Vec<Rc<SignalField>> {
    (0..n).map(|_| SignalField::new()).collect()
}

#[derive(Debug, Clone)]
enum Op {
    Connect(usize, usize),
    Disconnect(usize, usize),
    DisconnectAll(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..NODES, 0..NODES).prop_map(|(a, b)| Op::Connect(a, b)),
        2 => (0..NODES, 0..NODES).prop_map(|(a, b)| Op::Disconnect(a, b)),
        1 => (0..NODES).prop_map(Op::DisconnectAll),
    ]
}

proptest! {
    #[test]
    fn routes_stay_symmetric(ops in prop::collection::vec(op(), 0..60)) {
        let f = fields(NODES);
        let mut model: BTreeSet<(usize, usize)> = BTreeSet::new();
        for op in ops {
            match op {
                Op::Connect(a, b) if a != b => {
                    f[a].route_no_event(&*f[b]).unwrap();
                    model.insert((a, b));
                }
                Op::Connect(..) => {}
                Op::Disconnect(a, b) => {
                    let existed = model.remove(&(a, b));
                    prop_assert_eq!(f[a].unroute(&*f[b]), existed);
                }
                Op::DisconnectAll(a) => {
                    f[a].unroute_all();
                    model.retain(|&(from, _)| from != a);
                }
            }
            for a in 0..NODES {
                for b in 0..NODES {
                    let expected = model.contains(&(a, b));
                    prop_assert_eq!(f[a].routes_to(&*f[b]), expected);
                    prop_assert_eq!(f[b].has_route_from(&*f[a]), expected);
                }
                let outs = model.iter().filter(|&&(from, _)| from == a).count();
                let ins = model.iter().filter(|&&(_, to)| to == a).count();
                prop_assert_eq!(f[a].routes_out().len(), outs);
                prop_assert_eq!(f[a].routes_in().len(), ins);
            }
        }
    }

    #[test]
    fn each_reachable_field_is_marked_once_per_touch(
        edges in prop::collection::vec((0..NODES, 0..NODES), 0..20),
        touches in 1..4usize,
    ) {
        let f = fields(NODES);
        let mut reachable = [false; NODES];
        reachable[0] = true;
        let mut dag: Vec<(usize, usize)> = edges
            .into_iter()
            .filter(|(a, b)| a < b)
            .collect();
        dag.sort_unstable();
        dag.dedup();
        for &(a, b) in &dag {
            f[a].route_no_event(&*f[b]).unwrap();
            if reachable[a] {
                reachable[b] = true;
            }
        }

        let hits: Vec<Rc<Cell<usize>>> = (0..NODES).map(|_| Rc::new(Cell::new(0))).collect();
        let _subs: Vec<Subscription> = f
            .iter()
            .zip(&hits)
            .skip(1)
            .map(|(field, counter)| {
                let counter = Rc::clone(counter);
                field.subscribe(move |_| counter.set(counter.get() + 1))
            })
            .collect();

        for _ in 0..touches {
            f[0].touch();
        }
        for i in 1..NODES {
            let expected = if reachable[i] { touches } else { 0 };
            prop_assert_eq!(hits[i].get(), expected, "field {}", i);
        }
    }

    #[test]
    fn constraint_matches_reference_model(
        required in prop::collection::vec(0..3usize, 0..4),
        optional in prop::collection::vec(0..3usize, 0..3),
        inputs in prop::collection::vec(0..3usize, 0..7),
    ) {
        const TYPES: [&str; 3] = ["SFFloat", "SFInt32", "SFVec3f"];
        let mut builder = TypeConstraint::builder();
        for &t in &required {
            builder = builder.required(TYPES[t]);
        }
        for &t in &optional {
            builder = builder.optional(TYPES[t]);
        }
        let constraint = builder.build().unwrap();

        let declared: Vec<usize> = required.iter().chain(&optional).copied().collect();
        let expected_ok = inputs.len() >= required.len()
            && inputs.len() <= declared.len()
            && inputs.iter().zip(&declared).all(|(a, b)| a == b);
        let names: Vec<&str> = inputs.iter().map(|&t| TYPES[t]).collect();
        prop_assert_eq!(constraint.check_all(&names).is_ok(), expected_ok);
    }
}
