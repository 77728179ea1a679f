//! NPC population and new-player placement
//!
//! NPCs are spawned in bulk at start-up and topped up in random-sized
//! batches whenever live NPCs get scarce, either relative to live players or
//! in absolute terms. New players are placed by rejection sampling: a probe
//! bubble is dropped at a random spot and the spot is rejected while any
//! existing bubble could eat it. The check uses `would_eat`, so a rejected
//! spot never grows the bubble that would have eaten the probe.

use rand::Rng;

use crate::config::GameConfig;
use crate::game::bubble::{would_eat, Bubble, BubbleId, Rules};
use crate::game::constants::bubble::NPC_MIN_RADIUS;
use crate::game::kinematics::MapBounds;
use crate::game::store::BubbleStore;
use crate::util::vec2::Vec2;

/// Result of placing a new player
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// A coordinate no existing bubble can eat
    Safe { coordinate: Vec2, attempts: u32 },
    /// Attempts ran out; the last sampled coordinate is used regardless
    Fallback { coordinate: Vec2, attempts: u32 },
}

impl Placement {
    pub fn coordinate(&self) -> Vec2 {
        match *self {
            Placement::Safe { coordinate, .. } | Placement::Fallback { coordinate, .. } => coordinate,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Placement::Fallback { .. })
    }
}

#[derive(Debug, Clone)]
pub struct PopulationManager {
    initial_target: usize,
    npc_player_ratio: f64,
    player_init_radius: f64,
    max_bubble_radius: f64,
    max_spawn_attempts: u32,
}

impl PopulationManager {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            initial_target: config.initial_npc_target(),
            npc_player_ratio: config.npc_player_ratio,
            player_init_radius: config.player_init_radius,
            max_bubble_radius: config.max_bubble_radius,
            max_spawn_attempts: config.max_spawn_attempts.max(1),
        }
    }

    /// NPC count created at start-up
    #[inline]
    pub fn initial_target(&self) -> usize {
        self.initial_target
    }

    #[inline]
    pub fn player_init_radius(&self) -> f64 {
        self.player_init_radius
    }

    /// Insert one NPC with a fresh ID, a random radius in
    /// `[1, 2 × player radius]` (never above the radius cap) and a uniform random position. No overlap
    /// check: NPCs may appear inside other bubbles.
    pub fn spawn_npc<R: Rng + ?Sized>(
        &self,
        store: &mut BubbleStore,
        bounds: &MapBounds,
        rng: &mut R,
    ) -> BubbleId {
        let id = loop {
            let candidate = BubbleId::random(rng);
            if !store.contains(candidate.as_str()) {
                break candidate;
            }
        };
        let max_radius = (2.0 * self.player_init_radius).min(self.max_bubble_radius);
        let min_radius = NPC_MIN_RADIUS.min(max_radius);
        let radius = rng.gen_range(min_radius..=max_radius);
        let coordinate = bounds.random_point(rng);

        store.insert(Bubble::new(id.clone(), radius, coordinate));
        id
    }

    /// Spawn the start-up population
    pub fn populate<R: Rng + ?Sized>(
        &self,
        store: &mut BubbleStore,
        bounds: &MapBounds,
        rng: &mut R,
    ) -> usize {
        for _ in 0..self.initial_target {
            let id = self.spawn_npc(store, bounds, rng);
            tracing::trace!("Initialized NPC {}", id);
        }
        self.initial_target
    }

    /// Whether live NPCs have become scarce.
    ///
    /// The ratio term is undefined without live players and is skipped
    /// then; the absolute floor of half the initial target always applies.
    pub fn needs_replenishment(&self, live_npcs: usize, live_players: usize) -> bool {
        let below_floor = (live_npcs as f64) < self.initial_target as f64 / 2.0;
        let below_ratio =
            live_players > 0 && (live_npcs as f64 / live_players as f64) < self.npc_player_ratio;
        below_floor || below_ratio
    }

    /// Random batch size averaging half the initial target
    pub fn batch_size<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        (self.initial_target as f64 * rng.gen::<f64>()).floor() as usize
    }

    /// Run the replenishment check and spawn a batch if needed. Returns the
    /// number of NPCs spawned.
    pub fn replenish<R: Rng + ?Sized>(
        &self,
        store: &mut BubbleStore,
        live_npcs: usize,
        live_players: usize,
        bounds: &MapBounds,
        rng: &mut R,
    ) -> usize {
        if !self.needs_replenishment(live_npcs, live_players) {
            return 0;
        }
        let count = self.batch_size(rng);
        for _ in 0..count {
            self.spawn_npc(store, bounds, rng);
        }
        count
    }

    /// Find a spot where no live bubble would immediately eat a new player.
    ///
    /// Bounded by `max_spawn_attempts`; on exhaustion the last sampled
    /// coordinate is returned as a `Fallback`.
    pub fn place_player<R: Rng + ?Sized>(
        &self,
        store: &BubbleStore,
        rules: &Rules,
        rng: &mut R,
    ) -> Placement {
        let mut coordinate = Vec2::ZERO;
        for attempt in 1..=self.max_spawn_attempts {
            coordinate = rules.bounds.random_point(rng);
            let probe = Bubble::probe(self.player_init_radius, coordinate);
            let threatened = store
                .alive()
                .any(|existing| would_eat(existing, &probe, rules.stomach_radius_ratio));
            if !threatened {
                return Placement::Safe {
                    coordinate,
                    attempts: attempt,
                };
            }
        }
        Placement::Fallback {
            coordinate,
            attempts: self.max_spawn_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> GameConfig {
        GameConfig {
            init_npc_count: Some(40),
            ..GameConfig::default()
        }
    }

    #[test]
    fn test_populate_spawns_initial_target() {
        let config = config();
        let manager = PopulationManager::from_config(&config);
        let mut store = BubbleStore::new();
        let mut rng = StdRng::seed_from_u64(42);

        let spawned = manager.populate(&mut store, &config.bounds(), &mut rng);

        assert_eq!(spawned, 40);
        assert_eq!(store.len(), 40);
    }

    #[test]
    fn test_npc_radius_and_position_ranges() {
        let config = config();
        let manager = PopulationManager::from_config(&config);
        let bounds = config.bounds();
        let mut store = BubbleStore::new();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..500 {
            manager.spawn_npc(&mut store, &bounds, &mut rng);
        }

        for npc in store.iter() {
            assert!(npc.radius() >= 1.0 && npc.radius() <= 20.0);
            assert!(bounds.contains(npc.coordinate()));
            assert!(npc.is_alive());
            assert_eq!(npc.kinematic.speed, 0.0);
        }
    }

    #[test]
    fn test_npc_radius_respects_cap() {
        let config = GameConfig {
            player_init_radius: 8.0,
            max_bubble_radius: 10.0,
            ..config()
        };
        let manager = PopulationManager::from_config(&config);
        let mut store = BubbleStore::new();
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..500 {
            manager.spawn_npc(&mut store, &config.bounds(), &mut rng);
        }

        assert!(store.iter().all(|npc| npc.radius() >= 1.0 && npc.radius() <= 10.0));
    }

    #[test]
    fn test_replenishment_ratio() {
        let manager = PopulationManager::from_config(&config());
        // floor is 20
        assert!(!manager.needs_replenishment(30, 5));
        assert!(manager.needs_replenishment(30, 7));
        assert!(manager.needs_replenishment(19, 0));
    }

    #[test]
    fn test_zero_players_uses_only_floor() {
        let manager = PopulationManager::from_config(&config());
        assert!(!manager.needs_replenishment(20, 0));
        assert!(!manager.needs_replenishment(40, 0));
        assert!(manager.needs_replenishment(0, 0));
    }

    #[test]
    fn test_batch_size_below_target() {
        let manager = PopulationManager::from_config(&config());
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            assert!(manager.batch_size(&mut rng) < 40);
        }
    }

    #[test]
    fn test_replenish_skips_when_not_needed() {
        let config = config();
        let manager = PopulationManager::from_config(&config);
        let mut store = BubbleStore::new();
        let mut rng = StdRng::seed_from_u64(5);

        assert_eq!(manager.replenish(&mut store, 40, 1, &config.bounds(), &mut rng), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_replenish_spawns_batch() {
        let config = config();
        let manager = PopulationManager::from_config(&config);
        let mut store = BubbleStore::new();
        let mut rng = StdRng::seed_from_u64(5);

        let spawned = manager.replenish(&mut store, 0, 1, &config.bounds(), &mut rng);

        assert_eq!(store.len(), spawned);
        assert!(spawned < 40);
    }

    #[test]
    fn test_place_player_in_empty_world() {
        let config = config();
        let manager = PopulationManager::from_config(&config);
        let rules = Rules::from_config(&config);
        let mut rng = StdRng::seed_from_u64(11);

        let placement = manager.place_player(&BubbleStore::new(), &rules, &mut rng);

        assert_eq!(
            placement,
            Placement::Safe {
                coordinate: placement.coordinate(),
                attempts: 1
            }
        );
        assert!(config.bounds().contains(placement.coordinate()));
    }

    #[test]
    fn test_place_player_avoids_larger_bubbles() {
        let config = GameConfig {
            map_width: 100.0,
            map_height: 100.0,
            max_bubble_radius: 1000.0,
            ..config()
        };
        let manager = PopulationManager::from_config(&config);
        let rules = Rules::from_config(&config);
        let mut store = BubbleStore::new();
        // Reach of 0.6 * 60 = 36 covers a big chunk of the map around the center
        store.insert(Bubble::new(BubbleId::from("giant"), 60.0, Vec2::ZERO));
        let mut rng = StdRng::seed_from_u64(21);

        for _ in 0..50 {
            let placement = manager.place_player(&store, &rules, &mut rng);
            if let Placement::Safe { coordinate, .. } = placement {
                assert!(coordinate.length() > 36.0);
            }
        }
        // Probing never mutates existing bubbles
        assert_eq!(store.get("giant").map(|b| b.radius()), Some(60.0));
        assert!(store.get("giant").map(|b| b.body.ate.is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_place_player_falls_back_when_map_is_covered() {
        let config = GameConfig {
            map_width: 20.0,
            map_height: 20.0,
            max_bubble_radius: 1000.0,
            max_spawn_attempts: 8,
            ..config()
        };
        let manager = PopulationManager::from_config(&config);
        let rules = Rules::from_config(&config);
        let mut store = BubbleStore::new();
        store.insert(Bubble::new(BubbleId::from("blanket"), 100.0, Vec2::ZERO));
        let mut rng = StdRng::seed_from_u64(1);

        let placement = manager.place_player(&store, &rules, &mut rng);

        assert!(placement.is_fallback());
        assert_eq!(
            placement,
            Placement::Fallback {
                coordinate: placement.coordinate(),
                attempts: 8
            }
        );
        assert!(config.bounds().contains(placement.coordinate()));
    }

    #[test]
    fn test_dead_bubbles_do_not_block_placement() {
        let config = GameConfig {
            map_width: 20.0,
            map_height: 20.0,
            max_bubble_radius: 1000.0,
            ..config()
        };
        let manager = PopulationManager::from_config(&config);
        let rules = Rules::from_config(&config);
        let mut store = BubbleStore::new();
        let mut blanket = Bubble::new(BubbleId::from("blanket"), 100.0, Vec2::ZERO);
        blanket.body.eaten_by = Some(BubbleId::from("someone"));
        store.insert(blanket);
        let mut rng = StdRng::seed_from_u64(1);

        assert!(!manager.place_player(&store, &rules, &mut rng).is_fallback());
    }
}
