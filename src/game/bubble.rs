//! Bubble entity, eating predicate and movement
//!
//! A bubble is never removed once created. Being eaten turns it into a
//! tombstone: `eaten_by` is set once and the bubble stops moving, eating and
//! being eaten for the rest of the process lifetime.

use std::borrow::Borrow;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize, Serializer};

use crate::config::GameConfig;
use crate::game::kinematics::{grown_radius, MapBounds, SpeedCurve};
use crate::util::vec2::Vec2;

/// Opaque bubble identifier, unique within the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BubbleId(String);

impl BubbleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random identifier for an NPC, drawn from the simulation RNG
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let uuid = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        Self(uuid.simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BubbleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for BubbleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BubbleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BubbleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Who a bubble is: a stored entity, or a throwaway probe used to test a
/// spawn location. Probes are never stored and never recorded as eaten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Real(BubbleId),
    Probe,
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Identity::Real(id) => serializer.serialize_str(id.as_str()),
            Identity::Probe => serializer.serialize_str(""),
        }
    }
}

/// Size and eating history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Body {
    pub radius: f64,
    /// Victims in the order they were eaten
    pub ate: Vec<BubbleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eaten_by: Option<BubbleId>,
}

/// Position and motion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Kinematic {
    pub coordinate: Vec2,
    /// Zero or unit length
    pub direction: Vec2,
    pub speed: f64,
}

/// Circular entity, serialized in the client-facing shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bubble {
    #[serde(rename = "ID")]
    pub identity: Identity,
    #[serde(rename = "Body")]
    pub body: Body,
    #[serde(rename = "Kinematic")]
    pub kinematic: Kinematic,
}

/// Physical rules every eat and move is evaluated against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rules {
    /// Fraction of the eater's radius that defines its eating reach
    pub stomach_radius_ratio: f64,
    pub speed: SpeedCurve,
    pub bounds: MapBounds,
}

impl Rules {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            stomach_radius_ratio: config.stomach_radius_ratio,
            speed: config.speed_curve(),
            bounds: config.bounds(),
        }
    }

    #[inline]
    pub fn max_radius(&self) -> f64 {
        self.speed.max_radius
    }
}

impl Bubble {
    /// A stationary live bubble
    pub fn new(id: BubbleId, radius: f64, coordinate: Vec2) -> Self {
        Self::with_identity(Identity::Real(id), radius, coordinate)
    }

    /// A probe bubble for testing spawn locations
    pub fn probe(radius: f64, coordinate: Vec2) -> Self {
        Self::with_identity(Identity::Probe, radius, coordinate)
    }

    fn with_identity(identity: Identity, radius: f64, coordinate: Vec2) -> Self {
        Self {
            identity,
            body: Body {
                radius,
                ate: Vec::new(),
                eaten_by: None,
            },
            kinematic: Kinematic {
                coordinate,
                direction: Vec2::ZERO,
                speed: 0.0,
            },
        }
    }

    /// Stored identifier; `None` for probes
    pub fn id(&self) -> Option<&BubbleId> {
        match &self.identity {
            Identity::Real(id) => Some(id),
            Identity::Probe => None,
        }
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.body.radius
    }

    #[inline]
    pub fn coordinate(&self) -> Vec2 {
        self.kinematic.coordinate
    }

    #[inline]
    pub fn is_eaten(&self) -> bool {
        self.body.eaten_by.is_some()
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.is_eaten()
    }

    /// Two bubbles share an identity only when both are stored with the same ID
    fn same_identity(&self, other: &Bubble) -> bool {
        match (&self.identity, &other.identity) {
            (Identity::Real(a), Identity::Real(b)) => a == b,
            _ => false,
        }
    }

    /// Set a new heading and the speed that matches the current radius
    pub fn steer(&mut self, direction: Vec2, curve: &SpeedCurve) {
        self.kinematic.direction = direction.normalize();
        self.kinematic.speed = if self.kinematic.direction.is_exactly_zero() {
            0.0
        } else {
            curve.speed_for_radius(self.body.radius)
        };
    }

    /// Stop dead: no heading, no speed
    pub fn halt(&mut self) {
        self.kinematic.direction = Vec2::ZERO;
        self.kinematic.speed = 0.0;
    }

    /// Advance the bubble along its heading for `dt` seconds, then clamp to
    /// the map. Tombstones and stationary bubbles do not move.
    pub fn step(&mut self, dt: f64, bounds: &MapBounds) {
        if self.is_eaten() || self.kinematic.speed == 0.0 {
            return;
        }
        let direction = self.kinematic.direction.normalize();
        self.kinematic.direction = direction;
        let displaced = self.kinematic.coordinate + direction * (self.kinematic.speed * dt);
        self.kinematic.coordinate = bounds.clamp(displaced);
    }
}

/// Whether `victim` may be eaten by `candidate` ignoring distance: different
/// bubbles, victim still alive, candidate strictly larger.
pub fn can_be_eaten_by(candidate: &Bubble, victim: &Bubble) -> bool {
    !candidate.same_identity(victim) && victim.is_alive() && candidate.radius() > victim.radius()
}

/// Side-effect-free version of [`try_eat`]: would `eater` consume `victim`
/// if they met right now?
pub fn would_eat(eater: &Bubble, victim: &Bubble, stomach_radius_ratio: f64) -> bool {
    if eater.is_eaten() || eater.id().is_none() {
        return false;
    }
    let distance = eater.coordinate().distance_to(victim.coordinate());
    if distance > eater.radius() * stomach_radius_ratio {
        return false;
    }
    can_be_eaten_by(eater, victim)
}

/// Let `eater` consume `victim` if it is within reach and allowed to.
///
/// On success the victim becomes a tombstone pointing at the eater, the
/// eater records the victim (unless it is a probe) and grows by area. A
/// moving eater gets the slower speed of its new size.
pub fn try_eat(eater: &mut Bubble, victim: &mut Bubble, rules: &Rules) -> bool {
    if !would_eat(eater, victim, rules.stomach_radius_ratio) {
        return false;
    }
    let Some(eater_id) = eater.id().cloned() else {
        return false;
    };

    victim.kinematic.speed = 0.0;
    victim.body.eaten_by = Some(eater_id);
    if let Identity::Real(victim_id) = &victim.identity {
        eater.body.ate.push(victim_id.clone());
    }

    eater.body.radius = grown_radius(eater.body.radius, victim.body.radius, rules.max_radius());
    if eater.kinematic.speed > 0.0 {
        eater.kinematic.speed = rules.speed.speed_for_radius(eater.body.radius);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rules() -> Rules {
        Rules {
            stomach_radius_ratio: 0.6,
            speed: SpeedCurve::new(5.0, 50.0, 2000.0),
            bounds: MapBounds::new(2000.0, 2000.0),
        }
    }

    fn bubble(id: &str, radius: f64, x: f64, y: f64) -> Bubble {
        Bubble::new(BubbleId::from(id), radius, Vec2::new(x, y))
    }

    #[test]
    fn test_player_eats_npc_in_reach() {
        let mut player = bubble("p", 10.0, 0.0, 0.0);
        let mut npc = bubble("n", 4.0, 5.0, 0.0);

        assert!(try_eat(&mut player, &mut npc, &rules()));

        assert_eq!(player.radius(), (10.0f64 * 10.0 + 4.0 * 4.0).sqrt());
        assert!((player.radius() - 10.77).abs() < 0.01);
        assert_eq!(player.body.ate, vec![BubbleId::from("n")]);
        assert_eq!(npc.body.eaten_by, Some(BubbleId::from("p")));
        assert_eq!(npc.kinematic.speed, 0.0);
    }

    #[test]
    fn test_out_of_reach_is_untouched() {
        let mut player = bubble("p", 10.0, 0.0, 0.0);
        let mut npc = bubble("n", 4.0, 6.01, 0.0);

        assert!(!try_eat(&mut player, &mut npc, &rules()));
        assert_eq!(player.radius(), 10.0);
        assert!(npc.is_alive());
        assert!(player.body.ate.is_empty());
    }

    #[test]
    fn test_reach_boundary_is_inclusive() {
        let rules = Rules {
            stomach_radius_ratio: 0.5,
            ..rules()
        };
        let mut player = bubble("p", 10.0, 0.0, 0.0);
        let mut npc = bubble("n", 4.0, 0.0, 5.0);
        assert!(try_eat(&mut player, &mut npc, &rules));
    }

    #[test]
    fn test_equal_radii_never_eat() {
        let mut a = bubble("a", 10.0, 0.0, 0.0);
        let mut b = bubble("b", 10.0, 1.0, 0.0);

        assert!(!try_eat(&mut a, &mut b, &rules()));
        assert!(!try_eat(&mut b, &mut a, &rules()));
        assert_eq!(a.radius(), 10.0);
        assert_eq!(b.radius(), 10.0);
    }

    #[test]
    fn test_smaller_never_eats_larger_regardless_of_distance() {
        let small = bubble("s", 5.0, 0.0, 0.0);
        let large = bubble("l", 9.0, 0.0, 0.0);
        assert!(!can_be_eaten_by(&small, &large));
        assert!(!would_eat(&small, &large, 1.0));
    }

    #[test]
    fn test_self_is_never_edible() {
        let a = bubble("a", 10.0, 0.0, 0.0);
        let mut same = a.clone();
        same.body.radius = 1.0;
        assert!(!can_be_eaten_by(&a, &same));
    }

    #[test]
    fn test_tombstone_cannot_be_eaten_twice() {
        let mut first = bubble("first", 10.0, 0.0, 0.0);
        let mut second = bubble("second", 20.0, 0.0, 0.0);
        let mut npc = bubble("n", 2.0, 1.0, 0.0);

        assert!(try_eat(&mut first, &mut npc, &rules()));
        assert!(!try_eat(&mut second, &mut npc, &rules()));
        assert_eq!(npc.body.eaten_by, Some(BubbleId::from("first")));
        assert!(second.body.ate.is_empty());
    }

    #[test]
    fn test_tombstone_cannot_eat() {
        let mut dead = bubble("dead", 30.0, 0.0, 0.0);
        dead.body.eaten_by = Some(BubbleId::from("someone"));
        let mut npc = bubble("n", 2.0, 0.0, 0.0);
        assert!(!try_eat(&mut dead, &mut npc, &rules()));
    }

    #[test]
    fn test_probe_victim_is_not_recorded() {
        let mut eater = bubble("e", 20.0, 0.0, 0.0);
        let mut probe = Bubble::probe(10.0, Vec2::new(1.0, 1.0));

        assert!(try_eat(&mut eater, &mut probe, &rules()));
        assert!(eater.body.ate.is_empty());
        assert!(probe.is_eaten());
    }

    #[test]
    fn test_probe_never_eats() {
        let probe = Bubble::probe(100.0, Vec2::ZERO);
        let npc = bubble("n", 1.0, 0.0, 0.0);
        assert!(!would_eat(&probe, &npc, 1.0));
    }

    #[test]
    fn test_growth_is_capped() {
        let mut rules = rules();
        rules.speed.max_radius = 12.0;
        let mut player = bubble("p", 10.0, 0.0, 0.0);
        let mut npc = bubble("n", 9.0, 0.0, 0.0);
        assert!(try_eat(&mut player, &mut npc, &rules));
        assert_eq!(player.radius(), 12.0);
    }

    #[test]
    fn test_moving_eater_slows_down() {
        let rules = rules();
        let mut player = bubble("p", 10.0, 0.0, 0.0);
        player.steer(Vec2::new(1.0, 0.0), &rules.speed);
        let before = player.kinematic.speed;
        let mut npc = bubble("n", 4.0, 1.0, 0.0);

        assert!(try_eat(&mut player, &mut npc, &rules));
        assert!(player.kinematic.speed < before);
        assert_eq!(player.kinematic.speed, rules.speed.speed_for_radius(player.radius()));
    }

    #[test]
    fn test_stationary_eater_stays_stationary() {
        let mut player = bubble("p", 10.0, 0.0, 0.0);
        let mut npc = bubble("n", 4.0, 1.0, 0.0);
        assert!(try_eat(&mut player, &mut npc, &rules()));
        assert_eq!(player.kinematic.speed, 0.0);
    }

    #[test]
    fn test_step_moves_and_normalizes() {
        let rules = rules();
        let mut b = bubble("b", 10.0, 0.0, 0.0);
        b.kinematic.direction = Vec2::new(3.0, 4.0);
        b.kinematic.speed = 10.0;

        b.step(0.5, &rules.bounds);

        assert!(b.kinematic.direction.is_unit());
        assert!((b.coordinate().x - 3.0).abs() < 1e-9);
        assert!((b.coordinate().y - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_step_clamps_to_bounds() {
        let rules = rules();
        let mut b = bubble("b", 10.0, 990.0, -990.0);
        b.steer(Vec2::new(1.0, -1.0), &rules.speed);

        b.step(10.0, &rules.bounds);

        assert_eq!(b.coordinate(), Vec2::new(1000.0, -1000.0));
    }

    #[test]
    fn test_step_skips_tombstones_and_idle() {
        let rules = rules();
        let mut idle = bubble("i", 10.0, 1.0, 1.0);
        idle.kinematic.direction = Vec2::new(1.0, 0.0);
        idle.step(1.0, &rules.bounds);
        assert_eq!(idle.coordinate(), Vec2::new(1.0, 1.0));

        let mut dead = bubble("d", 10.0, 1.0, 1.0);
        dead.steer(Vec2::new(1.0, 0.0), &rules.speed);
        dead.body.eaten_by = Some(BubbleId::from("x"));
        dead.step(1.0, &rules.bounds);
        assert_eq!(dead.coordinate(), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_steer_zero_stops() {
        let rules = rules();
        let mut b = bubble("b", 10.0, 0.0, 0.0);
        b.steer(Vec2::new(0.0, 2.0), &rules.speed);
        assert_eq!(b.kinematic.direction, Vec2::new(0.0, 1.0));
        assert_eq!(b.kinematic.speed, rules.speed.speed_for_radius(10.0));
        b.steer(Vec2::ZERO, &rules.speed);
        assert_eq!(b.kinematic.speed, 0.0);
    }

    #[test]
    fn test_wire_shape() {
        let mut eater = bubble("p", 10.0, 1.0, 2.0);
        let mut npc = bubble("n", 4.0, 1.0, 2.0);
        try_eat(&mut eater, &mut npc, &rules());

        let alive = serde_json::to_value(&eater).unwrap();
        assert_eq!(alive["ID"], "p");
        assert_eq!(alive["Body"]["Ate"], serde_json::json!(["n"]));
        assert!(alive["Body"].get("EatenBy").is_none());
        assert_eq!(alive["Kinematic"]["Coordinate"], serde_json::json!([1.0, 2.0]));
        assert_eq!(alive["Kinematic"]["Direction"], serde_json::json!([0.0, 0.0]));
        assert_eq!(alive["Kinematic"]["Speed"], 0.0);

        let dead = serde_json::to_value(&npc).unwrap();
        assert_eq!(dead["Body"]["EatenBy"], "p");
        assert_eq!(dead["Body"]["Radius"], 4.0);
    }

    #[test]
    fn test_random_ids_are_distinct() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = BubbleId::random(&mut rng);
        let b = BubbleId::random(&mut rng);
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}
