//! Load test for the pong server.
//!
//! Spawns multiple fake WebSocket clients that:
//! - Connect to the server and join the matchmaking queue
//! - Once paired, press paddle keys at a fixed rate
//! - Count game updates, finished games and opponent departures
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 100)
//!   --duration S     Test duration in seconds (default: 30)
//!   --move-rate R    Paddle moves per second per client (default: 10)
//!   --url URL        Server URL (default: ws://127.0.0.1:3001/ws)

use futures_util::{SinkExt, StreamExt};
use pong_shared::protocol::{ClientMsg, Direction, ServerMsg};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    in_match: AtomicU64,
    messages_received: AtomicU64,
    updates_received: AtomicU64,
    games_started: AtomicU64,
    games_ended: AtomicU64,
    opponents_lost: AtomicU64,
    moves_sent: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    move_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();

    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let connect_latency = connect_start.elapsed();
    metrics
        .latency_sum_ms
        .fetch_add(connect_latency.as_millis() as u64, Ordering::Relaxed);
    metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let join = match ClientMsg::JoinRoom.to_json() {
        Ok(json) => json,
        Err(_) => return,
    };
    if ws.send(Message::Text(join.clone().into())).await.is_err() {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        metrics.connected.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    let move_interval = if move_rate > 0.0 {
        Duration::from_secs_f64(1.0 / move_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };
    let mut move_timer = tokio::time::interval(move_interval);
    move_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = Instant::now() + duration;
    let mut rng = ChaCha8Rng::seed_from_u64(client_id as u64);
    let mut playing = false;

    loop {
        if Instant::now() >= test_end {
            break;
        }

        tokio::select! {
            _ = move_timer.tick(), if playing => {
                let direction = if rng.gen_bool(0.5) { Direction::Up } else { Direction::Down };
                let Ok(json) = (ClientMsg::PaddleMove { direction }).to_json() else {
                    continue;
                };
                if ws.send(Message::Text(json.into())).await.is_ok() {
                    metrics.moves_sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                        let rejoin = match ServerMsg::from_json(text.as_str()) {
                            Ok(ServerMsg::GameUpdate(_)) => {
                                metrics.updates_received.fetch_add(1, Ordering::Relaxed);
                                false
                            }
                            Ok(ServerMsg::GameStart(_)) => {
                                metrics.games_started.fetch_add(1, Ordering::Relaxed);
                                metrics.in_match.fetch_add(1, Ordering::Relaxed);
                                playing = true;
                                false
                            }
                            Ok(ServerMsg::GameEnd(_)) => {
                                metrics.games_ended.fetch_add(1, Ordering::Relaxed);
                                true
                            }
                            Ok(ServerMsg::PlayerDisconnected) => {
                                metrics.opponents_lost.fetch_add(1, Ordering::Relaxed);
                                true
                            }
                            Ok(_) => false,
                            Err(e) => {
                                if client_id < 3 {
                                    eprintln!("Client {} got bad message: {}", client_id, e);
                                }
                                metrics.errors.fetch_add(1, Ordering::Relaxed);
                                false
                            }
                        };
                        if rejoin {
                            if playing {
                                metrics.in_match.fetch_sub(1, Ordering::Relaxed);
                            }
                            playing = false;
                            if ws.send(Message::Text(join.clone().into())).await.is_err() {
                                metrics.errors.fetch_add(1, Ordering::Relaxed);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
    }

    if playing {
        metrics.in_match.fetch_sub(1, Ordering::Relaxed);
    }
    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 100;
    let mut duration_secs: u64 = 30;
    let mut move_rate: f64 = 10.0;
    let mut url = "ws://127.0.0.1:3001/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(100);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--move-rate" => {
                i += 1;
                move_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(10.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Pong Server Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Move rate: {}/s per client", move_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);

        handles.push(tokio::spawn(async move {
            run_client(client_id, url, move_rate, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            if elapsed >= duration_secs + 5 {
                break;
            }

            let m = &metrics_clone;
            println!(
                "[{:3}s] connected={}, in_match={}, msgs={}, updates={}, started={}, ended={}, moves={}, errors={}",
                elapsed,
                m.connected.load(Ordering::Relaxed),
                m.in_match.load(Ordering::Relaxed),
                m.messages_received.load(Ordering::Relaxed),
                m.updates_received.load(Ordering::Relaxed),
                m.games_started.load(Ordering::Relaxed),
                m.games_ended.load(Ordering::Relaxed),
                m.moves_sent.load(Ordering::Relaxed),
                m.errors.load(Ordering::Relaxed),
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }

    stats_handle.abort();

    println!();
    println!("=== Final Results ===");
    let updates = metrics.updates_received.load(Ordering::Relaxed);
    let latency_sum = metrics.latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.latency_count.load(Ordering::Relaxed);

    println!(
        "Total messages received: {}",
        metrics.messages_received.load(Ordering::Relaxed)
    );
    println!("Total game updates: {}", updates);
    println!(
        "Games started (per client): {}",
        metrics.games_started.load(Ordering::Relaxed)
    );
    println!(
        "Games ended (per client): {}",
        metrics.games_ended.load(Ordering::Relaxed)
    );
    println!(
        "Opponents lost: {}",
        metrics.opponents_lost.load(Ordering::Relaxed)
    );
    println!(
        "Paddle moves sent: {}",
        metrics.moves_sent.load(Ordering::Relaxed)
    );
    println!("Total errors: {}", metrics.errors.load(Ordering::Relaxed));

    if latency_count > 0 {
        println!("Average connect latency: {}ms", latency_sum / latency_count);
    }

    let updates_per_client = updates as f64 / num_clients.max(1) as f64;
    println!();
    println!("Updates per client: {:.1}", updates_per_client);
    // Ticks alone produce ~62.5 updates per second of play.
    println!(
        "Tick updates expected per client: {:.1}",
        duration_secs as f64 * 1000.0 / 16.0
    );
}
