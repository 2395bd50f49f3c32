//! End-to-end exchange tests
//!
//! Drives the full bus the way a plugin shell would: units publish and
//! subscribe, the host runs cycles, and the tests pin down delivery
//! counts, ordering, record lifetime and cancellation semantics.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use plugbus::observer::{PRIORITY_DEFAULT, PRIORITY_FIRST, PRIORITY_LAST};
use plugbus::{Bus, ReleaseOutcome, UnitId};

fn counting_subscriber(bus: &Bus, name: &str, subscription: &str, counter: &Arc<AtomicUsize>) -> UnitId {
    let unit = bus.add_unit(name);
    let counter = Arc::clone(counter);
    bus.subscribe(
        subscription,
        unit,
        PRIORITY_DEFAULT,
        Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }),
    )
    .unwrap();
    unit
}

/// The canonical flow: two subscribers, one publish, one cycle.
#[test]
fn test_single_publish_delivers_once_to_each_subscriber() {
    let bus = Bus::new();
    let camera = bus.add_unit("camera");
    let p1_seen = Arc::new(AtomicUsize::new(0));
    let p2_seen = Arc::new(AtomicUsize::new(0));
    counting_subscriber(&bus, "p1", "image", &p1_seen);
    counting_subscriber(&bus, "p2", "image", &p2_seen);

    bus.publish("image", camera, Arc::new(vec![1u8, 2, 3]), None);
    let report = bus.run_cycle();

    assert_eq!(p1_seen.load(Ordering::SeqCst), 1);
    assert_eq!(p2_seen.load(Ordering::SeqCst), 1);
    assert_eq!(report.delivered, 2);

    // After the cycle the record is no longer new; unreferenced and
    // floating, it was destroyed by the sweep.
    assert!(bus.get_new("image", None, None).is_none());
    assert!(bus.get("image", None, None).is_none());

    // A second cycle with nothing new delivers nothing.
    let report = bus.run_cycle();
    assert_eq!(report.delivered, 0);
}

/// A subscriber that takes a reference keeps the record alive past the
/// sweep; `get` still finds it while `get_new` does not.
#[test]
fn test_referenced_record_survives_cycle() {
    let bus = Arc::new(Bus::new());
    let camera = bus.add_unit("camera");
    let keeper = bus.add_unit("keeper");
    let bus_for_cb = Arc::clone(&bus);
    bus.subscribe(
        "image",
        keeper,
        PRIORITY_DEFAULT,
        Arc::new(move |_, record| {
            bus_for_cb.ref_record(record);
            true
        }),
    )
    .unwrap();

    bus.publish("image", camera, Arc::new(7u32), None);
    bus.run_cycle();

    assert!(bus.get_new("image", None, None).is_none());
    let held = bus.get("image", None, None).expect("record still referenced");
    assert!(!held.is_new());
    assert_eq!(held.payload::<u32>(), Some(&7));

    // Drop both references; the floating record waits for the next sweep.
    assert_eq!(bus.release(&held), ReleaseOutcome::Alive(1));
    assert_eq!(bus.release(&held), ReleaseOutcome::Deferred);
    bus.run_cycle();
    assert!(bus.get("image", None, None).is_none());
}

/// Reclaim callbacks fire exactly once: at the sweep for floating records,
/// immediately for sunk ones.
#[test]
fn test_reclaim_timing() {
    let bus = Bus::new();
    let camera = bus.add_unit("camera");
    let swept = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&swept);
    bus.publish(
        "frame",
        camera,
        Arc::new(0u8),
        Some(Box::new(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        })),
    );

    assert_eq!(swept.load(Ordering::SeqCst), 0);
    bus.run_cycle();
    assert_eq!(swept.load(Ordering::SeqCst), 1);

    let sunk = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&sunk);
    bus.publish(
        "frame",
        camera,
        Arc::new(0u8),
        Some(Box::new(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        })),
    );
    let rec = bus.get("frame", None, None).unwrap();
    bus.sink(&rec);
    assert_eq!(sunk.load(Ordering::SeqCst), 0);
    assert_eq!(bus.release(&rec), ReleaseOutcome::Destroyed);
    assert_eq!(sunk.load(Ordering::SeqCst), 1);
    bus.run_cycle();
    assert_eq!(sunk.load(Ordering::SeqCst), 1);
}

/// Declared dependencies win over subscription order, both ways around.
#[test]
fn test_dependency_ordering_is_subscription_order_independent() {
    for reversed in [false, true] {
        let bus = Bus::new();
        let camera = bus.add_unit("camera");
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let alpha = bus.add_unit("alpha");
        let beta = bus.add_unit("beta");
        let o1 = Arc::clone(&order);
        let alpha_cb: plugbus::ProcessFn = Arc::new(move |_, _| {
            o1.lock().unwrap().push("alpha");
            true
        });
        let o2 = Arc::clone(&order);
        // beta declares that alpha must have run first.
        let beta_cb: plugbus::ProcessFn = Arc::new(move |_, _| {
            o2.lock().unwrap().push("beta");
            true
        });

        if reversed {
            bus.subscribe("image(alpha)", beta, PRIORITY_DEFAULT, beta_cb).unwrap();
            bus.subscribe("image", alpha, PRIORITY_DEFAULT, alpha_cb).unwrap();
        } else {
            bus.subscribe("image", alpha, PRIORITY_DEFAULT, alpha_cb).unwrap();
            bus.subscribe("image(alpha)", beta, PRIORITY_DEFAULT, beta_cb).unwrap();
        }

        bus.publish("image", camera, Arc::new(()), None);
        bus.run_cycle();

        assert_eq!(*order.lock().unwrap(), vec!["alpha", "beta"], "reversed={}", reversed);
    }
}

/// Reserved priorities pin subscribers to the ends of the list.
#[test]
fn test_priority_sentinels() {
    let bus = Bus::new();
    let camera = bus.add_unit("camera");
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    for (name, priority, tag) in [
        ("middle", PRIORITY_DEFAULT, "middle"),
        ("tail", PRIORITY_LAST, "tail"),
        ("head", PRIORITY_FIRST, "head"),
    ] {
        let unit = bus.add_unit(name);
        let order = Arc::clone(&order);
        bus.subscribe(
            "image",
            unit,
            priority,
            Arc::new(move |_, _| {
                order.lock().unwrap().push(tag);
                true
            }),
        )
        .unwrap();
    }

    bus.publish("image", camera, Arc::new(()), None);
    bus.run_cycle();
    assert_eq!(*order.lock().unwrap(), vec!["head", "middle", "tail"]);
}

/// A mid-dispatch publish to a name the walk has not reached yet is
/// delivered in the same cycle.
#[test]
fn test_same_cycle_publish_to_name_ahead() {
    let bus = Arc::new(Bus::new());
    let camera = bus.add_unit("camera");
    let forwarder = bus.add_unit("forwarder");
    let y_seen = Arc::new(AtomicUsize::new(0));

    let bus_for_cb = Arc::clone(&bus);
    bus.subscribe(
        "x",
        forwarder,
        PRIORITY_DEFAULT,
        Arc::new(move |_, _| {
            bus_for_cb.publish("y", camera, Arc::new(()), None);
            true
        }),
    )
    .unwrap();
    counting_subscriber(&bus, "y-consumer", "y", &y_seen);

    bus.publish("x", camera, Arc::new(()), None);
    let report = bus.run_cycle();

    assert_eq!(y_seen.load(Ordering::SeqCst), 1);
    assert_eq!(report.delivered, 2);
}

/// A mid-dispatch publish to a name the walk already passed moves that
/// name to the tail and still delivers in the same cycle.
#[test]
fn test_same_cycle_publish_to_name_behind() {
    let bus = Arc::new(Bus::new());
    let camera = bus.add_unit("camera");
    let y_seen = Arc::new(AtomicUsize::new(0));

    // Subscribe "y" first so its header sits ahead of "x" in the walk.
    counting_subscriber(&bus, "y-consumer", "y", &y_seen);
    let forwarder = bus.add_unit("forwarder");
    let bus_for_cb = Arc::clone(&bus);
    bus.subscribe(
        "x",
        forwarder,
        PRIORITY_DEFAULT,
        Arc::new(move |_, _| {
            bus_for_cb.publish("y", camera, Arc::new(()), None);
            true
        }),
    )
    .unwrap();

    bus.publish("x", camera, Arc::new(()), None);
    let report = bus.run_cycle();

    assert_eq!(y_seen.load(Ordering::SeqCst), 1);
    assert_eq!(report.delivered, 2);
}

/// A subscriber republishing its own name is revisited in the same cycle
/// and each record is delivered exactly once.
#[test]
fn test_self_publish_revisits_without_duplicates() {
    let bus = Arc::new(Bus::new());
    let camera = bus.add_unit("camera");
    let echo = bus.add_unit("echo");
    let seen = Arc::new(AtomicUsize::new(0));
    let republished = Arc::new(AtomicBool::new(false));

    let bus_for_cb = Arc::clone(&bus);
    let seen_cb = Arc::clone(&seen);
    let republished_cb = Arc::clone(&republished);
    bus.subscribe(
        "x",
        echo,
        PRIORITY_DEFAULT,
        Arc::new(move |_, _| {
            seen_cb.fetch_add(1, Ordering::SeqCst);
            if !republished_cb.swap(true, Ordering::SeqCst) {
                bus_for_cb.publish("x", camera, Arc::new(()), None);
            }
            true
        }),
    )
    .unwrap();

    bus.publish("x", camera, Arc::new(()), None);
    bus.run_cycle();

    // Original record plus the one republished mid-dispatch, once each.
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

/// Returning false cancels the rest of the cycle, not just the current
/// name; the next cycle runs normally.
#[test]
fn test_cancellation_stops_whole_cycle() {
    let bus = Bus::new();
    let camera = bus.add_unit("camera");
    let canceller = bus.add_unit("canceller");
    let y_seen = Arc::new(AtomicUsize::new(0));

    bus.subscribe("x", canceller, PRIORITY_DEFAULT, Arc::new(|_, _| false))
        .unwrap();
    counting_subscriber(&bus, "y-consumer", "y", &y_seen);

    bus.publish("x", camera, Arc::new(()), None);
    bus.publish("y", camera, Arc::new(()), None);
    let report = bus.run_cycle();

    assert!(report.cancelled);
    assert_eq!(y_seen.load(Ordering::SeqCst), 0);

    // The cancelled cycle still swept: the skipped record is gone.
    assert!(bus.get("y", None, None).is_none());

    bus.publish("y", camera, Arc::new(()), None);
    let report = bus.run_cycle();
    assert!(!report.cancelled);
    assert_eq!(y_seen.load(Ordering::SeqCst), 1);
    assert_eq!(bus.stats().dispatch_cancellations, 1);
}

/// A dependency cycle between subscribers is reported and given up on;
/// every subscriber still runs.
#[test]
fn test_dependency_cycle_gives_up_but_delivers() {
    let bus = Bus::new();
    let camera = bus.add_unit("camera");
    let a = bus.add_unit("a");
    let b = bus.add_unit("b");
    let seen = Arc::new(AtomicUsize::new(0));
    for (unit, subscription) in [(a, "image(b)"), (b, "image(a)")] {
        let seen = Arc::clone(&seen);
        bus.subscribe(
            subscription,
            unit,
            PRIORITY_DEFAULT,
            Arc::new(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                true
            }),
        )
        .unwrap();
    }

    bus.publish("image", camera, Arc::new(()), None);
    bus.run_cycle();

    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(bus.stats().reorder_give_ups, 1);
}

/// Hooks bracket dispatch every cycle.
#[test]
fn test_hooks_bracket_dispatch() {
    let bus = Bus::new();
    let camera = bus.add_unit("camera");
    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let e = Arc::clone(&events);
    bus.run_before(Arc::new(move || e.lock().unwrap().push("before")));
    let e = Arc::clone(&events);
    bus.run_after(Arc::new(move || e.lock().unwrap().push("after")));
    let viewer = bus.add_unit("viewer");
    let e = Arc::clone(&events);
    bus.subscribe(
        "image",
        viewer,
        PRIORITY_DEFAULT,
        Arc::new(move |_, _| {
            e.lock().unwrap().push("process");
            true
        }),
    )
    .unwrap();

    bus.publish("image", camera, Arc::new(()), None);
    bus.run_cycle();
    assert_eq!(*events.lock().unwrap(), vec!["before", "process", "after"]);
}

/// The known end-of-list edge case: a publish after the dispatch walk has
/// finished (here, from an "after" hook) is not delivered that cycle, and
/// the cleanup clears its new flag, so it is never dispatched at all. A
/// reference taken by the publisher keeps the record findable via `get`.
#[test]
fn test_publish_after_walk_is_never_dispatched() {
    let bus = Arc::new(Bus::new());
    let camera = bus.add_unit("camera");
    let seen = Arc::new(AtomicUsize::new(0));
    counting_subscriber(&bus, "late-consumer", "late", &seen);

    let bus_for_hook = Arc::clone(&bus);
    let published = Arc::new(AtomicBool::new(false));
    let published_hook = Arc::clone(&published);
    let held: Arc<Mutex<Option<plugbus::RecordRef>>> = Arc::new(Mutex::new(None));
    let held_hook = Arc::clone(&held);
    bus.run_after(Arc::new(move || {
        if !published_hook.swap(true, Ordering::SeqCst) {
            bus_for_hook.publish("late", camera, Arc::new(9u8), None);
            let rec = bus_for_hook.get("late", None, None).unwrap();
            *held_hook.lock().unwrap() = Some(rec);
        }
    }));

    bus.run_cycle();
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    // Next cycle does not deliver it either: the record is no longer new.
    bus.run_cycle();
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert!(bus.get_new("late", None, None).is_none());

    let guard = held.lock().unwrap();
    let rec = guard.as_ref().unwrap();
    assert_eq!(rec.payload::<u8>(), Some(&9));
    assert_eq!(bus.get("late", None, None).unwrap().handle(), rec.handle());
}

/// Statistics add up across a small scenario.
#[test]
fn test_stats_accumulate() {
    let bus = Bus::new();
    let camera = bus.add_unit("camera");
    let seen = Arc::new(AtomicUsize::new(0));
    counting_subscriber(&bus, "viewer", "image", &seen);

    bus.publish("image", camera, Arc::new(()), None);
    bus.publish("image", camera, Arc::new(()), None);
    bus.run_cycle();
    bus.run_cycle();

    let stats = bus.stats();
    assert_eq!(stats.cycles_completed, 2);
    assert_eq!(stats.records_published, 2);
    assert_eq!(stats.records_delivered, 2);
    assert_eq!(stats.records_destroyed, 2);
    assert_eq!(stats.dispatch_cancellations, 0);
}
