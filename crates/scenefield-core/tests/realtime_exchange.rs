//! A device thread exchanging values with the scene thread through
//! realtime fields, driven by an event sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use scenefield_core::{
    EventSink, FieldExt, FieldRef, Period, RealtimeField, TypeConstraint, ValueField, Vec3f,
};

#[test]
fn device_positions_reach_the_scene_once_per_tick() {
    let position = RealtimeField::new(Vec3f::ZERO);
    let offset = ValueField::new(Vec3f::new(0.0, 1.0, 0.0));
    let world = ValueField::computed(
        Vec3f::ZERO,
        TypeConstraint::exactly(["SFVec3f", "SFVec3f"]),
        |inputs| Some(inputs.get::<Vec3f>(0)? + inputs.get::<Vec3f>(1)?),
    );
    position.route(&*world).unwrap();
    offset.route(&*world).unwrap();

    let sink = EventSink::new();
    let as_ref: FieldRef = position.clone();
    sink.register(&as_ref, Period::EveryTick);

    let device = position.handle();
    thread::spawn(move || {
        for i in 1..=10 {
            device.write(Vec3f::new(i as f32, 0.0, 0.0));
        }
    })
    .join()
    .unwrap();

    sink.tick();
    assert_eq!(world.value(), Vec3f::new(10.0, 1.0, 0.0));

    // Nothing new from the device: the tick leaves downstream clean.
    sink.tick();
    assert!(world.is_up_to_date());
}

#[test]
fn device_sees_scene_writes_while_running() {
    let force = RealtimeField::new(0.0_f32);
    let handle = force.handle();
    let stop = Arc::new(AtomicBool::new(false));

    let reader = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut max = 0.0_f32;
            while !stop.load(Ordering::Acquire) {
                max = max.max(*handle.read());
                thread::yield_now();
            }
            max.max(*handle.read())
        })
    };

    for step in 1..=5 {
        force.set_value(step as f32).unwrap();
    }
    stop.store(true, Ordering::Release);
    let seen = reader.join().unwrap();
    assert_eq!(seen, 5.0);
}

#[test]
fn handle_outlives_field() {
    let handle = {
        let field = RealtimeField::new(1_i32);
        field.set_value(2).unwrap();
        field.handle()
    };
    assert_eq!(*handle.read(), 2);
    assert!(!handle.write(3));
}
