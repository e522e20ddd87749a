//! Performance benchmarks for the controller's hot paths

use ctf_client::config::MovementTuning;
use ctf_client::executor::plan_move;
use ctf_client::rate_limiter::RateLimiter;
use ctf_client::report;
use ctf_client::Identity;
use ctf_shared::{decode_server_frame, PlayerRecord, Point, ServerFrame, Team, TeamMessage, WorldSnapshot};
use std::time::{Duration, Instant};

fn crowded_world(players: usize) -> WorldSnapshot {
    let mut world = WorldSnapshot::default();
    for i in 0..players {
        let team = if i % 2 == 0 { Team::Red } else { Team::Blue };
        let id = format!("player_{:08x}", i);
        let position = Point::new((i * 13 % 800) as f64, (i * 7 % 600) as f64);
        world
            .players
            .insert(id.clone(), PlayerRecord::new(&id, &format!("Bot{}", i), team, position));
    }
    for i in 0..20 {
        world.red_team_messages.push(TeamMessage {
            sender: "Bot0".to_string(),
            message: format!("message {}", i),
            timestamp: i * 500,
            team: "red".to_string(),
        });
    }
    world.game_time = 10_000;
    world
}

/// Benchmarks rate limiter admission under a constant stream of calls
#[test]
fn benchmark_rate_limiter_admission() {
    let limiter = RateLimiter::new(10, Duration::from_secs(1));
    let start_clock = Instant::now();

    let iterations = 100_000u64;
    let start = Instant::now();
    let mut admitted = 0;

    for i in 0..iterations {
        // One simulated call every 100 microseconds
        if limiter.admit_at(start_clock + Duration::from_micros(i * 100)) {
            admitted += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Rate limiter: {} calls in {:?} ({:.2} ns/call), {} admitted",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64,
        admitted
    );

    // 10 seconds of simulated time at 10 calls per second
    assert_eq!(admitted, 100);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks decoding of full state frames with many players
#[test]
fn benchmark_snapshot_decode() {
    let encoded = serde_json::to_string(&crowded_world(50)).unwrap();

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        match decode_server_frame(&encoded).unwrap() {
            ServerFrame::State(world) => assert_eq!(world.players.len(), 50),
            ServerFrame::Error { message } => panic!("Unexpected error frame: {}", message),
        }
    }

    let duration = start.elapsed();
    println!(
        "Snapshot decode: {} frames of {} bytes in {:?} ({:.2} μs/frame)",
        iterations,
        encoded.len(),
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds even in debug builds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks status report rendering for a crowded world
#[test]
fn benchmark_report_rendering() {
    let world = crowded_world(50);
    let me = Identity {
        player_id: "player_00000000".to_string(),
        name: "Bot0".to_string(),
        team: Team::Red,
    };

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let text = report::render(&world, Some(&me));
        assert!(text.contains("TEAM CHAT:"));
    }

    let duration = start.elapsed();
    println!(
        "Report rendering: {} reports in {:?} ({:.2} μs/report)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 3000);
}

/// Stress tests move planning across the whole field
#[test]
fn stress_test_move_planning() {
    let tuning = MovementTuning::default();
    let start = Instant::now();
    let mut planned = 0;
    let mut rejected = 0;

    for x in (0..=800).step_by(10) {
        for y in (0..=600).step_by(10) {
            let target = Point::new(x as f64, y as f64);
            match plan_move(Point::new(50.0, 300.0), target, &tuning) {
                Ok(request) => {
                    assert!(request.travel <= tuning.max_step + 1e-9);
                    assert!(request.resolved.in_world());
                    planned += 1;
                }
                Err(_) => rejected += 1,
            }
        }
    }

    let duration = start.elapsed();
    println!(
        "Move planning: {} planned, {} rejected in {:?}",
        planned, rejected, duration
    );

    assert!(planned > 0);
    assert!(duration.as_millis() < 1000);
}
