//! Prometheus-compatible metrics endpoint
//!
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::engine::{Engine, TickReport};

/// Samples kept for tick time percentiles
const TICK_HISTORY_LEN: usize = 1000;

#[derive(Debug)]
pub struct Metrics {
    // World
    pub bubbles_total: AtomicU64,
    pub bubbles_alive: AtomicU64,
    pub npcs_alive: AtomicU64,
    pub players_total: AtomicU64,
    pub players_alive: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Simulation events
    pub eats_total: AtomicU64,
    pub npcs_spawned_total: AtomicU64,
    pub placement_fallbacks_total: AtomicU64,
    pub stagnations_total: AtomicU64,
    pub snapshots_total: AtomicU64,

    // Network
    pub connections_active: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_rejected: AtomicU64,
    pub messages_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            bubbles_total: AtomicU64::new(0),
            bubbles_alive: AtomicU64::new(0),
            npcs_alive: AtomicU64::new(0),
            players_total: AtomicU64::new(0),
            players_alive: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            eats_total: AtomicU64::new(0),
            npcs_spawned_total: AtomicU64::new(0),
            placement_fallbacks_total: AtomicU64::new(0),
            stagnations_total: AtomicU64::new(0),
            snapshots_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_rejected: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Fold one tick's events and the resulting world counts into the gauges
    pub fn record_tick(&self, report: &TickReport, engine: &Engine) {
        self.eats_total.fetch_add(report.eaten.len() as u64, Ordering::Relaxed);
        self.npcs_spawned_total.fetch_add(report.npcs_spawned as u64, Ordering::Relaxed);
        self.placement_fallbacks_total
            .fetch_add(report.placement_fallbacks as u64, Ordering::Relaxed);
        self.stagnations_total.fetch_add(report.stagnated as u64, Ordering::Relaxed);
        if report.snapshot_sent {
            self.snapshots_total.fetch_add(1, Ordering::Relaxed);
        }

        let store = engine.store();
        self.bubbles_total.store(store.len() as u64, Ordering::Relaxed);
        self.bubbles_alive.store(store.alive_count() as u64, Ordering::Relaxed);
        self.players_total.store(engine.players().len() as u64, Ordering::Relaxed);
        self.players_alive.store(engine.live_player_count() as u64, Ordering::Relaxed);
        self.npcs_alive.store(engine.live_npc_count() as u64, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("bubble_server_bubbles_total", "Bubbles in the store, including eaten ones", "gauge",
            self.bubbles_total.load(Ordering::Relaxed));
        metric!("bubble_server_bubbles_alive", "Bubbles not yet eaten", "gauge",
            self.bubbles_alive.load(Ordering::Relaxed));
        metric!("bubble_server_npcs_alive", "Live NPC bubbles", "gauge",
            self.npcs_alive.load(Ordering::Relaxed));
        metric!("bubble_server_players_total", "Players ever joined", "gauge",
            self.players_total.load(Ordering::Relaxed));
        metric!("bubble_server_players_alive", "Players whose bubble is alive", "gauge",
            self.players_alive.load(Ordering::Relaxed));

        metric!("bubble_server_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("bubble_server_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("bubble_server_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("bubble_server_tick_time_max_microseconds", "Maximum recent tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("bubble_server_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("bubble_server_eats_total", "Bubbles eaten", "counter",
            self.eats_total.load(Ordering::Relaxed));
        metric!("bubble_server_npcs_spawned_total", "NPCs spawned by replenishment", "counter",
            self.npcs_spawned_total.load(Ordering::Relaxed));
        metric!("bubble_server_placement_fallbacks_total", "Players placed without a safe spot", "counter",
            self.placement_fallbacks_total.load(Ordering::Relaxed));
        metric!("bubble_server_stagnations_total", "Players stopped for inactivity", "counter",
            self.stagnations_total.load(Ordering::Relaxed));
        metric!("bubble_server_snapshots_total", "Snapshots reported", "counter",
            self.snapshots_total.load(Ordering::Relaxed));

        metric!("bubble_server_connections_active", "Active WebTransport connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("bubble_server_messages_received_total", "Client messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("bubble_server_messages_rejected_total", "Client messages that failed validation", "counter",
            self.messages_rejected.load(Ordering::Relaxed));
        metric!("bubble_server_messages_sent_total", "Snapshot messages sent", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("bubble_server_bytes_sent_total", "Total bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("bubble_server_bytes_received_total", "Total bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));
        metric!("bubble_server_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    pub fn to_json(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        serde_json::json!({
            "world": {
                "bubbles_total": load(&self.bubbles_total),
                "bubbles_alive": load(&self.bubbles_alive),
                "npcs_alive": load(&self.npcs_alive),
                "players_total": load(&self.players_total),
                "players_alive": load(&self.players_alive),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
            },
            "events": {
                "eats": load(&self.eats_total),
                "npcs_spawned": load(&self.npcs_spawned_total),
                "placement_fallbacks": load(&self.placement_fallbacks_total),
                "stagnations": load(&self.stagnations_total),
                "snapshots": load(&self.snapshots_total),
            },
            "network": {
                "connections": load(&self.connections_active),
                "messages_received": load(&self.messages_received),
                "messages_rejected": load(&self.messages_rejected),
                "messages_sent": load(&self.messages_sent),
                "bytes_sent": load(&self.bytes_sent),
                "bytes_received": load(&self.bytes_received),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// Route one raw HTTP request
fn respond(metrics: &Metrics, request: &str) -> String {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("GET "))
        .and_then(|rest| rest.split_whitespace().next());

    match path {
        Some("/metrics/json") => http_response("200 OK", "application/json", &metrics.to_json()),
        Some("/metrics") => http_response(
            "200 OK",
            "text/plain; version=0.0.4",
            &metrics.to_prometheus(),
        ),
        Some("/health") | Some("/") => http_response("200 OK", "text/plain", "OK"),
        _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = respond(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
