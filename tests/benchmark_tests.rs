//! Performance benchmarks for the hot paths of the protocol and the game

use client::game::Reconciler;
use server::simulation::{Simulation, World, WorldConfig};
use shared::{
    decode_batch, CancellationToken, Datagram, Entity, Input, InputBuffer, Listener,
    ListenerConfig, Message, State, Vec2,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Benchmarks datagram header encoding and decoding
#[test]
fn benchmark_datagram_codec() {
    let payload = vec![0xAB; 512];
    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = Datagram::data(payload.clone()).encode();
        let decoded = Datagram::decode(&bytes).unwrap();
        assert_eq!(decoded.payload.len(), payload.len());
    }

    let duration = start.elapsed();
    println!(
        "Datagram codec: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks encoding and decoding a full jitter buffer
#[test]
fn benchmark_jitter_batch() {
    let mut buffer = InputBuffer::new();
    for i in 0..64u8 {
        buffer.append(Input::from_byte(i));
    }

    let iterations = 20_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let batch = buffer.encode();
        let decoded = decode_batch(&batch).unwrap();
        assert_eq!(decoded.len(), 64);
    }

    let duration = start.elapsed();
    println!(
        "Jitter batch (64 inputs): {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks snapshot encoding for a busy world
#[test]
fn benchmark_snapshot_encoding() {
    let state = busy_state(16, 64, 8);
    let iterations = 10_000;
    let start = Instant::now();

    for index in 0..iterations {
        let bytes = Message::Snapshot {
            index,
            state: state.clone(),
        }
        .encode()
        .unwrap();
        let _ = Message::decode(&bytes).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Snapshot encode/decode ({} entities): {} iterations in {:?}",
        state.entity_count(),
        iterations,
        duration
    );

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks per-frame interpolation between two snapshots
#[test]
fn benchmark_interpolation() {
    let prev = busy_state(16, 64, 8);
    let mut next = prev.clone();
    for entity in next.players.iter_mut().chain(next.bullets.iter_mut()) {
        entity.transform.position = entity.transform.position + Vec2::new(5.0, -5.0);
        entity.transform.rotation += 0.3;
    }

    let mut reconciler = Reconciler::new();
    let start_time = Instant::now();
    reconciler.apply(0, prev, start_time);
    reconciler.apply(1, next, start_time + Duration::from_millis(100));

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let now = start_time + Duration::from_millis(100 + (i % 100) as u64);
        let state = reconciler.interpolated(now).unwrap();
        assert_eq!(state.players.len(), 16);
    }

    let duration = start.elapsed();
    println!(
        "Interpolation: {} frames in {:?} ({:.2} μs/frame)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks world simulation with many players firing
#[test]
fn benchmark_world_simulation() {
    let mut world = World::new(WorldConfig {
        max_asteroids: 8,
        asteroid_spawn_ticks: 1,
        seed: 11,
    });

    let mut inputs = HashMap::new();
    for port in 0..16u16 {
        let key = SocketAddr::from(([127, 0, 0, 1], 10_000 + port));
        world.add_entity(key);
        inputs.insert(key, Input::UP | Input::RIGHT | Input::SPACE);
    }

    let ticks = 1_000;
    let start = Instant::now();

    for _ in 0..ticks {
        let state = world.advance(Duration::from_millis(100), &inputs);
        assert_eq!(state.players.len(), 16);
    }

    let duration = start.elapsed();
    println!("World simulation: {} ticks in {:?}", ticks, duration);

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks loopback round trips through two listeners
#[tokio::test]
async fn benchmark_loopback_round_trip() {
    let server = Listener::bind("127.0.0.1:0", ListenerConfig::default())
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let session = Listener::dial(&cancel, server.local_addr(), ListenerConfig::default())
        .await
        .unwrap();
    let peer = server.accept(&cancel).await.unwrap();

    let echo = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Ok(payload) = peer.receive(&cancel).await {
                if peer.send(&cancel, payload).await.is_err() {
                    break;
                }
            }
        })
    };

    let round_trips = 500;
    let start = Instant::now();

    for i in 0..round_trips {
        let payload = (i as u32).to_be_bytes().to_vec();
        session.send(&cancel, payload.clone()).await.unwrap();
        let echoed = tokio::time::timeout(Duration::from_secs(1), session.receive(&cancel))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, payload);
    }

    let duration = start.elapsed();
    println!(
        "Loopback round trip: {} in {:?} ({:.2} μs/rtt)",
        round_trips,
        duration,
        duration.as_micros() as f64 / round_trips as f64
    );

    session.close(&cancel).await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(1), echo).await;

    assert!(duration.as_secs() < 10);
}

// HELPER FUNCTIONS

fn busy_state(players: u32, bullets: u32, asteroids: u32) -> State {
    let mut state = State::new();
    let mut id = 0;
    let mut entity = |x: f64| {
        id += 1;
        Entity::new(id, Vec2::new(x, x / 2.0))
    };

    state.players = (0..players).map(|i| entity(f64::from(i) * 10.0)).collect();
    state.bullets = (0..bullets).map(|i| entity(f64::from(i) * 3.0)).collect();
    state.asteroids = (0..asteroids).map(|i| entity(f64::from(i) * 50.0)).collect();
    state.total_score = 42;
    state
}
