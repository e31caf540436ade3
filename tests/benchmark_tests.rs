//! Performance benchmarks and randomized stress for the roster core

use client::roster::ClientRoster;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use server::{GlobalRegistry, RecordingTransport, RosterCoordinator, SessionDefaults};
use shared::{RosterEntry, RosterOp};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn setup() -> (Arc<RosterCoordinator>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    let coordinator = Arc::new(RosterCoordinator::new(
        Arc::new(GlobalRegistry::new()),
        transport.clone(),
        SessionDefaults::default(),
    ));
    (coordinator, transport)
}

fn npc(index: usize, latency: i64) -> RosterEntry {
    RosterEntry::builder()
        .label(format!("Npc_{index}"))
        .latency_ms(latency)
        .build()
        .unwrap()
}

/// Benchmarks global upsert fan-out across many sessions
#[test]
fn benchmark_upsert_fan_out() {
    let (coordinator, transport) = setup();
    for client_id in 0..50 {
        coordinator.register_client(client_id);
    }

    let iterations = 1_000;
    let start = Instant::now();

    for i in 0..iterations {
        coordinator.registry().upsert(npc(i % 100, (i % 500) as i64));
    }

    let duration = start.elapsed();
    println!(
        "Upsert fan-out: {} upserts to 50 sessions in {:?} ({:.2} μs/upsert)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(transport.len(), iterations * 50);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks hide/show cycles on a large roster
#[test]
fn benchmark_visibility_toggle() {
    let (coordinator, transport) = setup();
    coordinator
        .registry()
        .initialize((0..500).map(|i| npc(i, 0)).collect());
    let session = coordinator.register_client(1);
    transport.take();

    let cycles = 100;
    let start = Instant::now();

    for _ in 0..cycles {
        session.set_visible(false);
        session.set_visible(true);
        transport.take();
    }

    let duration = start.elapsed();
    println!(
        "Visibility toggle: {} cycles of 500 entries in {:?}",
        cycles, duration
    );

    assert_eq!(session.visible_count(), 500);
    assert!(duration.as_millis() < 2000);
}

/// Random mutations from every layer; every mirror must end up equal to
/// its session's composed view
#[test]
fn randomized_mutations_converge() {
    let (coordinator, transport) = setup();
    let registry = coordinator.registry();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let labels = ["Alice", "Bob", "Carl", "Dana", "Eve", "Finn"];

    let sessions: Vec<_> = (1..=4).map(|id| coordinator.register_client(id)).collect();
    let mut rosters: Vec<ClientRoster> = (0..4).map(|_| ClientRoster::new()).collect();

    for _ in 0..2_000 {
        let label = labels[rng.gen_range(0..labels.len())];
        let base = RosterEntry::builder().label(label);
        let session = &sessions[rng.gen_range(0..sessions.len())];

        match rng.gen_range(0..10) {
            0..=2 => registry.upsert(
                base.latency_ms(rng.gen_range(0..1000))
                    .sort_key(rng.gen_range(-3..3))
                    .build()
                    .unwrap(),
            ),
            3 => {
                registry.remove(shared::synthetic_identity(label));
            }
            4 => {
                // relabel keeps the identity and forces a full replace
                if let Some(current) = registry.find_by_label(label) {
                    let renamed = format!("{label}_{}", rng.gen_range(0..3));
                    registry.upsert(current.to_builder().label(renamed).build().unwrap());
                }
            }
            5..=6 => session.add_override(
                base.latency_ms(rng.gen_range(0..1000))
                    .listed(rng.gen_bool(0.8))
                    .build()
                    .unwrap(),
            ),
            7 => {
                session.remove_override(shared::synthetic_identity(label));
            }
            8 => session.set_visible(rng.gen_bool(0.5)),
            _ => {
                if rng.gen_bool(0.1) {
                    session.reset_to_baseline();
                } else {
                    session.refresh();
                }
            }
        }
    }

    for (index, session) in sessions.iter().enumerate() {
        for op in transport.take_ops(session.client_id()) {
            rosters[index].apply(&op);
        }

        let expected = if session.is_visible() {
            session.composed_view()
        } else {
            Vec::new()
        };
        let held = rosters[index].entries();
        assert_eq!(held.len(), expected.len(), "client {}", session.client_id());
        for (held, expected) in held.iter().zip(&expected) {
            assert!(held.same_fields(expected), "client {}", session.client_id());
        }
    }
}

/// Concurrent writers from several threads never lose or reorder updates
#[test]
fn concurrent_upserts_keep_order() {
    let (coordinator, transport) = setup();
    let session = coordinator.register_client(1);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                for i in 0..250 {
                    coordinator
                        .registry()
                        .upsert(npc(worker * 10 + i % 10, i as i64));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut roster = ClientRoster::new();
    for op in transport.take_ops(1) {
        roster.apply(&op);
    }

    let expected = session.composed_view();
    assert_eq!(expected.len(), 40);
    let held = roster.entries();
    assert_eq!(held.len(), 40);
    for (held, expected) in held.iter().zip(&expected) {
        assert!(held.same_fields(expected));
        assert!(held.same_fields(&coordinator.registry().find(expected.identity()).unwrap()));
    }
}

/// Clients registering while a writer runs get every entry exactly once and
/// never a patch for something they were not given
#[test]
fn registration_races_upserts() {
    for _ in 0..10 {
        let (coordinator, transport) = setup();
        let writer = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                for i in 0..500 {
                    coordinator.registry().upsert(npc(i % 25, i as i64));
                }
            })
        };
        let sessions: Vec<_> = (1..=20).map(|id| coordinator.register_client(id)).collect();
        writer.join().unwrap();

        for session in &sessions {
            let mut roster = ClientRoster::new();
            for op in transport.take_ops(session.client_id()) {
                match &op {
                    RosterOp::Add(entry) => {
                        assert!(roster.get(entry.identity()).is_none(), "duplicate add");
                    }
                    RosterOp::Patch { identity, .. } => {
                        assert!(roster.get(*identity).is_some(), "patch before add");
                    }
                    other => panic!("unexpected {other:?}"),
                }
                roster.apply(&op);
            }

            let expected = session.composed_view();
            assert_eq!(expected.len(), 25);
            let held = roster.entries();
            assert_eq!(held.len(), expected.len());
            for (held, expected) in held.iter().zip(&expected) {
                assert!(held.same_fields(expected));
            }
        }
    }
}
