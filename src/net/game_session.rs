//! Game session - drives the engine on a timer and broadcasts snapshots

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{GameConfig, TickPolicy};
use crate::game::constants::net::MAX_SERVER_MESSAGE_SIZE;
use crate::game::engine::{Engine, TickReport};
use crate::game::input_buffer::{Command, CommandQueueError, CommandSender};
use crate::game::snapshot::{Snapshot, SnapshotReporter};
use crate::metrics::Metrics;
use crate::net::framing::write_message;
use crate::net::protocol::encode_snapshot;

/// How often the loop logs a status line
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

pub type ConnectionId = u64;

/// Hands snapshots to the broadcaster without blocking the tick
pub struct ChannelReporter {
    tx: UnboundedSender<Snapshot>,
}

impl SnapshotReporter for ChannelReporter {
    fn report(&self, snapshot: Snapshot) {
        if self.tx.send(snapshot).is_err() {
            debug!("Snapshot dropped: broadcaster has stopped");
        }
    }
}

/// Connected clients' write halves
pub struct Clients<W> {
    writers: RwLock<HashMap<ConnectionId, Arc<tokio::sync::Mutex<W>>>>,
    next_id: AtomicU64,
}

impl<W> Clients<W> {
    pub fn new() -> Self {
        Self {
            writers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, writer: W) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.writers
            .write()
            .insert(id, Arc::new(tokio::sync::Mutex::new(writer)));
        id
    }

    pub fn remove(&self, id: ConnectionId) -> bool {
        self.writers.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.writers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.read().is_empty()
    }

    fn handles(&self) -> Vec<(ConnectionId, Arc<tokio::sync::Mutex<W>>)> {
        self.writers
            .read()
            .iter()
            .map(|(id, writer)| (*id, writer.clone()))
            .collect()
    }
}

impl<W> Default for Clients<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared engine plus the policy deciding when it ticks
pub struct GameSession {
    engine: Mutex<Engine>,
    commands: CommandSender,
    policy: TickPolicy,
    tick_period: Duration,
    metrics: Arc<Metrics>,
}

impl GameSession {
    /// Build the engine and the receiving end of its snapshot channel
    pub fn new(config: GameConfig, metrics: Arc<Metrics>) -> (Arc<Self>, UnboundedReceiver<Snapshot>) {
        let (tx, rx) = unbounded_channel();
        let engine = Engine::new(config, Box::new(ChannelReporter { tx }), Instant::now());
        (Arc::new(Self::from_engine(engine, metrics)), rx)
    }

    pub fn from_engine(engine: Engine, metrics: Arc<Metrics>) -> Self {
        let policy = engine.config().tick_policy;
        let tick_period = engine.config().tick_period();
        Self {
            commands: engine.command_sender(),
            engine: Mutex::new(engine),
            policy,
            tick_period,
            metrics,
        }
    }

    pub fn policy(&self) -> TickPolicy {
        self.policy
    }

    /// Accept a validated command from a connection.
    ///
    /// Under the timer policy it is queued for the next tick; under the
    /// command policy it triggers a tick immediately.
    pub fn submit(&self, command: Command) -> Result<(), CommandQueueError> {
        match self.policy {
            TickPolicy::Timer => self.commands.try_send(command),
            TickPolicy::Command => {
                self.run(|engine, now| engine.tick_on_command(command, now));
                Ok(())
            }
        }
    }

    /// One timer-driven step: a full tick, or the watchdog under the
    /// command policy
    pub fn tick(&self) -> TickReport {
        match self.policy {
            TickPolicy::Timer => self.run(|engine, now| engine.tick(now)),
            TickPolicy::Command => self.run(|engine, now| engine.tick_watchdog(now)),
        }
    }

    pub fn status_line(&self) -> String {
        let engine = self.engine.lock();
        format!(
            "tick {}, {} bubbles ({} alive), {} players ({} alive), {} live NPCs",
            engine.tick_count(),
            engine.store().len(),
            engine.store().alive_count(),
            engine.players().len(),
            engine.live_player_count(),
            engine.live_npc_count()
        )
    }

    pub fn snapshot(&self) -> Snapshot {
        self.engine.lock().snapshot()
    }

    fn run(&self, step: impl FnOnce(&mut Engine, Instant) -> TickReport) -> TickReport {
        let mut engine = self.engine.lock();
        let started = Instant::now();
        let report = step(&mut *engine, started);
        self.metrics.record_tick_time(started.elapsed());
        self.metrics.record_tick(&report, &*engine);

        for eat in &report.eaten {
            debug!("{} ate {}", eat.eater, eat.victim);
        }
        report
    }
}

/// Start the game loop background task
pub fn start_game_loop(session: Arc<GameSession>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(session.tick_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "Game loop started: {:?} policy, period {:?}",
            session.policy, session.tick_period
        );
        let start = Instant::now();
        let mut last_status = start;

        loop {
            ticker.tick().await;
            session.tick();

            if last_status.elapsed() >= STATUS_INTERVAL {
                last_status = Instant::now();
                info!("Game: {}s, {}", start.elapsed().as_secs(), session.status_line());
            }
        }
    })
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Send one encoded snapshot to every client.
///
/// Each write runs in its own task. A client still busy with the previous
/// snapshot is skipped, which keeps per-client order and bounds backlog.
/// Returns the number of writes started.
pub fn broadcast<W>(clients: &Arc<Clients<W>>, payload: Arc<Vec<u8>>, metrics: &Arc<Metrics>) -> usize
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut started = 0;
    for (id, writer) in clients.handles() {
        let Ok(mut guard) = writer.try_lock_owned() else {
            debug!("Client {} still writing, skipping snapshot", id);
            continue;
        };
        let payload = payload.clone();
        let metrics = metrics.clone();
        let clients = clients.clone();

        tokio::spawn(async move {
            match write_message(&mut *guard, &payload, MAX_SERVER_MESSAGE_SIZE).await {
                Ok(()) => {
                    metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
                    metrics
                        .bytes_sent
                        .fetch_add(payload.len() as u64 + 4, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("Broadcast to client {} failed: {}", id, e);
                    clients.remove(id);
                }
            }
        });
        started += 1;
    }
    started
}

/// Serialize each reported snapshot once, stamp it, and fan it out.
/// Snapshots queued behind a slow encode collapse into the newest.
pub async fn run_broadcaster<W>(
    mut snapshots: UnboundedReceiver<Snapshot>,
    clients: Arc<Clients<W>>,
    metrics: Arc<Metrics>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    while let Some(mut snapshot) = snapshots.recv().await {
        while let Ok(newer) = snapshots.try_recv() {
            snapshot = newer;
        }
        if clients.is_empty() {
            continue;
        }
        let payload = match encode_snapshot(&snapshot, epoch_millis()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode snapshot for broadcast: {}", e);
                continue;
            }
        };
        broadcast(&clients, Arc::new(payload), &metrics);
    }
    debug!("Snapshot channel closed, broadcaster exiting");
}
