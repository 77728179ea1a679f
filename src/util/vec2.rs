use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// 2D vector for positions and headings.
///
/// Serialized as a two-element array `[x, y]`, which is how coordinates and
/// directions travel on the wire.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

/// Tolerance used when deciding whether a vector already has unit length
pub const UNIT_EPSILON: f64 = 1e-9;

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    #[inline]
    pub fn length_sq(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Exact zero check (no tolerance); a zero command means "keep heading"
    #[inline]
    pub fn is_exactly_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Whether the vector has unit length within `UNIT_EPSILON`
    pub fn is_unit(&self) -> bool {
        (self.length() - 1.0).abs() <= UNIT_EPSILON
    }

    /// Returns the unit vector pointing the same way.
    ///
    /// Zero stays zero, and vectors that are already unit length are
    /// returned untouched so repeated normalization does not drift.
    pub fn normalize(&self) -> Self {
        if self.is_exactly_zero() || self.is_unit() {
            return *self;
        }
        let len = self.length();
        if len > 0.0 && len.is_finite() {
            Self {
                x: self.x / len,
                y: self.y / len,
            }
        } else {
            Self::ZERO
        }
    }

    #[inline]
    pub fn distance_to(&self, other: Vec2) -> f64 {
        (*self - other).length()
    }

    /// Clamp each axis independently into `[-half.x, half.x] × [-half.y, half.y]`
    pub fn clamp_axes(&self, half: Vec2) -> Self {
        Self {
            x: self.x.clamp(-half.x, half.x),
            y: self.y.clamp(-half.y, half.y),
        }
    }
}

impl From<[f64; 2]> for Vec2 {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Vec2> for [f64; 2] {
    fn from(v: Vec2) -> Self {
        [v.x, v.y]
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}
