//! Simulation engine
//!
//! Owns the entity store and the player registry; all mutation happens
//! inside one of the tick methods. Each tick:
//!
//! 1. drains queued commands (creating players on first contact),
//! 2. applies the latest command per player and moves player bubbles by the
//!    wall-clock time since the previous tick,
//! 3. lets every live player eat whatever it can reach,
//! 4. tops up the NPC population,
//! 5. hands a snapshot to the reporter.
//!
//! `tick` is the fixed-timer cycle. `tick_on_command` and `tick_watchdog`
//! together implement the command-driven cycle, where each inbound command
//! runs a tick and a watchdog timer keeps the world moving in between.

use std::time::Instant;

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::game::bubble::{try_eat, Bubble, BubbleId, Rules};
use crate::game::input_buffer::{Command, CommandQueue, CommandSender, PendingCommand};
use crate::game::player::{CommandOutcome, Player};
use crate::game::population::{Placement, PopulationManager};
use crate::game::snapshot::{Snapshot, SnapshotReporter};
use crate::game::store::BubbleStore;

/// One successful eat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EatEvent {
    pub eater: BubbleId,
    pub victim: BubbleId,
}

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    /// Seconds of movement integrated this tick
    pub dt: f64,
    pub joined: Vec<BubbleId>,
    pub eaten: Vec<EatEvent>,
    pub stagnated: usize,
    pub npcs_spawned: usize,
    pub placement_fallbacks: usize,
    pub snapshot_sent: bool,
}

pub struct Engine {
    config: GameConfig,
    rules: Rules,
    population: PopulationManager,
    store: BubbleStore,
    /// Players in join order
    players: Vec<Player>,
    player_index: HashMap<BubbleId, usize>,
    queue: CommandQueue,
    rng: StdRng,
    reporter: Box<dyn SnapshotReporter>,
    last_tick_time: Instant,
    last_snapshot_time: Instant,
    tick: u64,
}

impl Engine {
    /// Create an engine seeded from OS entropy and spawn the initial NPCs
    pub fn new(config: GameConfig, reporter: Box<dyn SnapshotReporter>, now: Instant) -> Self {
        Self::with_rng(config, reporter, StdRng::from_entropy(), now)
    }

    /// Create an engine with an explicit RNG (deterministic in tests)
    pub fn with_rng(
        config: GameConfig,
        reporter: Box<dyn SnapshotReporter>,
        mut rng: StdRng,
        now: Instant,
    ) -> Self {
        let rules = Rules::from_config(&config);
        let population = PopulationManager::from_config(&config);
        let mut store = BubbleStore::with_capacity(population.initial_target() * 2);

        let spawned = population.populate(&mut store, &rules.bounds, &mut rng);
        info!(
            "Engine initialized: {} NPCs on a {}x{} map",
            spawned, config.map_width, config.map_height
        );

        Self {
            config,
            rules,
            population,
            store,
            players: Vec::new(),
            player_index: HashMap::new(),
            queue: CommandQueue::default(),
            rng,
            reporter,
            last_tick_time: now,
            last_snapshot_time: now,
            tick: 0,
        }
    }

    /// Producer handle for connection tasks; safe to use while a tick runs
    pub fn command_sender(&self) -> CommandSender {
        self.queue.sender()
    }

    /// Buffer a command for its player, creating the player on first contact.
    /// Returns false if the ID belongs to a bubble that is not a player.
    pub fn buffer_command(&mut self, command: Command, now: Instant) -> bool {
        self.buffer_command_inner(command, now, &mut TickReport::default())
    }

    /// Fixed-timer tick: apply commands, move, eat, replenish, report
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = self.begin_tick(now);
        self.drain_queue(now, &mut report);
        self.apply_commands(now, &mut report);
        self.move_players(report.dt);
        self.resolve_collisions(&mut report);
        self.replenish(&mut report);
        self.emit(now, &mut report);
        report
    }

    /// Command-driven tick: move for the elapsed time and resolve eating,
    /// then apply the triggering command and report
    pub fn tick_on_command(&mut self, command: Command, now: Instant) -> TickReport {
        let mut report = self.begin_tick(now);
        self.drain_queue(now, &mut report);
        self.move_players(report.dt);
        self.resolve_collisions(&mut report);
        self.buffer_command_inner(command, now, &mut report);
        self.apply_commands(now, &mut report);
        self.replenish(&mut report);
        self.emit(now, &mut report);
        report
    }

    /// Timer fallback for the command-driven cycle. Reports only when a
    /// bubble died or the snapshot period has run out.
    pub fn tick_watchdog(&mut self, now: Instant) -> TickReport {
        let mut report = self.begin_tick(now);
        self.drain_queue(now, &mut report);
        self.apply_commands(now, &mut report);
        self.move_players(report.dt);
        self.resolve_collisions(&mut report);
        self.replenish(&mut report);

        let overdue =
            now.saturating_duration_since(self.last_snapshot_time) >= self.config.max_server_msg_period;
        if overdue || !report.eaten.is_empty() {
            self.emit(now, &mut report);
        }
        report
    }

    /// Current world state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            bubbles: self.store.as_slice().to_vec(),
            players: self.players.iter().map(|p| p.id.clone()).collect(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn store(&self) -> &BubbleStore {
        &self.store
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.player_index.get(id).map(|&i| &self.players[i])
    }

    pub fn bubble(&self, id: &str) -> Option<&Bubble> {
        self.store.get(id)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn live_player_count(&self) -> usize {
        self.players
            .iter()
            .filter(|p| self.store.get(p.id.as_str()).map(Bubble::is_alive).unwrap_or(false))
            .count()
    }

    pub fn live_npc_count(&self) -> usize {
        self.store.alive_count() - self.live_player_count()
    }

    fn begin_tick(&mut self, now: Instant) -> TickReport {
        let dt = now.saturating_duration_since(self.last_tick_time).as_secs_f64();
        self.last_tick_time = now;
        self.tick += 1;
        TickReport {
            tick: self.tick,
            dt,
            ..TickReport::default()
        }
    }

    fn drain_queue(&mut self, now: Instant, report: &mut TickReport) {
        for command in self.queue.drain() {
            self.buffer_command_inner(command, now, report);
        }
    }

    fn buffer_command_inner(&mut self, command: Command, now: Instant, report: &mut TickReport) -> bool {
        let Some(index) = self.ensure_player(&command.player_id, now, report) else {
            warn!(
                "Dropping command for {}: ID belongs to a non-player bubble",
                command.player_id
            );
            return false;
        };
        self.players[index].buffer(PendingCommand {
            direction: command.direction,
            timestamp: command.timestamp,
        });
        true
    }

    /// Index of the player with `id`, placing a new bubble for unseen IDs
    fn ensure_player(&mut self, id: &BubbleId, now: Instant, report: &mut TickReport) -> Option<usize> {
        if let Some(&index) = self.player_index.get(id) {
            return Some(index);
        }
        if self.store.contains(id.as_str()) {
            return None;
        }

        let placement = self
            .population
            .place_player(&self.store, &self.rules, &mut self.rng);
        if let Placement::Fallback { attempts, .. } = placement {
            warn!(
                "No safe spawn for {} after {} attempts, using last sample",
                id, attempts
            );
            report.placement_fallbacks += 1;
        }

        let bubble = Bubble::new(id.clone(), self.population.player_init_radius(), placement.coordinate());
        self.store.insert(bubble);
        let index = self.players.len();
        self.players.push(Player::new(id.clone(), now));
        self.player_index.insert(id.clone(), index);
        report.joined.push(id.clone());

        info!("Player {} joined at {:?}", id, placement.coordinate());
        Some(index)
    }

    fn apply_commands(&mut self, now: Instant, report: &mut TickReport) {
        let timeout = self.config.stagnation_timeout;
        for player in &mut self.players {
            let Some(bubble) = self.store.get_mut(player.id.as_str()) else {
                continue;
            };
            let was_moving = bubble.kinematic.speed > 0.0;
            let outcome = player.apply_command(bubble, now, timeout, &self.rules.speed);
            if outcome == CommandOutcome::Stagnated && was_moving {
                debug!("Player {} stagnated", player.id);
                report.stagnated += 1;
            }
        }
    }

    fn move_players(&mut self, dt: f64) {
        for player in &self.players {
            if let Some(bubble) = self.store.get_mut(player.id.as_str()) {
                bubble.step(dt, &self.rules.bounds);
            }
        }
    }

    /// Every live player tries to eat every other bubble, in store order.
    /// NPCs never initiate eating.
    fn resolve_collisions(&mut self, report: &mut TickReport) {
        for player in &self.players {
            let Some(eater_index) = self.store.index_of(player.id.as_str()) else {
                continue;
            };
            for victim_index in 0..self.store.len() {
                if victim_index == eater_index {
                    continue;
                }
                let (eater, victim) = self.store.pair_mut(eater_index, victim_index);
                if eater.is_eaten() {
                    break;
                }
                if try_eat(eater, victim, &self.rules) {
                    if let Some(victim_id) = victim.id() {
                        debug!(
                            "{} ate {} (radius now {:.2})",
                            player.id,
                            victim_id,
                            eater.radius()
                        );
                        report.eaten.push(EatEvent {
                            eater: player.id.clone(),
                            victim: victim_id.clone(),
                        });
                    }
                }
            }
        }
    }

    fn replenish(&mut self, report: &mut TickReport) {
        let live_players = self.live_player_count();
        let live_npcs = self.store.alive_count() - live_players;
        let spawned = self.population.replenish(
            &mut self.store,
            live_npcs,
            live_players,
            &self.rules.bounds,
            &mut self.rng,
        );
        if spawned > 0 {
            debug!(
                "Spawned {} NPCs ({} live NPCs, {} live players before)",
                spawned, live_npcs, live_players
            );
        }
        report.npcs_spawned = spawned;
    }

    fn emit(&mut self, now: Instant, report: &mut TickReport) {
        self.reporter.report(self.snapshot());
        self.last_snapshot_time = now;
        report.snapshot_sent = true;
    }
}
