//! Geometry and kinematics helpers shared by movement, eating and spawning.

use rand::Rng;

use crate::util::vec2::Vec2;

/// Playable rectangle centered on the origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapBounds {
    /// Half-extents: x in [-X_MAX, X_MAX], y in [-Y_MAX, Y_MAX]
    pub half: Vec2,
}

impl MapBounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            half: Vec2::new(width / 2.0, height / 2.0),
        }
    }

    #[inline]
    pub fn x_max(&self) -> f64 {
        self.half.x
    }

    #[inline]
    pub fn y_max(&self) -> f64 {
        self.half.y
    }

    /// Clamp each axis independently to the map
    #[inline]
    pub fn clamp(&self, point: Vec2) -> Vec2 {
        point.clamp_axes(self.half)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x.abs() <= self.half.x && point.y.abs() <= self.half.y
    }

    /// Uniformly distributed point over the whole map
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        Vec2::new(
            (rng.gen::<f64>() - 0.5) * 2.0 * self.half.x,
            (rng.gen::<f64>() - 0.5) * 2.0 * self.half.y,
        )
    }

    pub fn area(&self) -> f64 {
        4.0 * self.half.x * self.half.y
    }
}

/// Linear radius-to-speed mapping: larger bubbles are slower
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedCurve {
    pub min_speed: f64,
    pub max_speed: f64,
    pub max_radius: f64,
}

impl SpeedCurve {
    pub fn new(min_speed: f64, max_speed: f64, max_radius: f64) -> Self {
        Self {
            min_speed,
            max_speed,
            max_radius,
        }
    }

    /// `MAX_SPEED - radius / MAX_RADIUS * (MAX_SPEED - MIN_SPEED)`
    ///
    /// Radius never exceeds the cap, so the result stays within
    /// `[min_speed, max_speed]` for every live bubble.
    pub fn speed_for_radius(&self, radius: f64) -> f64 {
        self.max_speed - radius / self.max_radius * (self.max_speed - self.min_speed)
    }
}

/// Area-conserving growth: the eater's new area is the sum of both areas,
/// capped at `max_radius`
#[inline]
pub fn grown_radius(eater: f64, victim: f64, max_radius: f64) -> f64 {
    (eater * eater + victim * victim).sqrt().min(max_radius)
}
