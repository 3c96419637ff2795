//! Vector math and map geometry helpers.
//!
//! Decisions are made on `f64` positions because the game reports them
//! that way and the combat model needs infinities (time-to-kill against
//! an empty group). When a value must be compared or hashed bit-exactly
//! across runs it is quantized to [`Fixed`] first.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number used to quantize positions for hashing.
///
/// 32 integer bits, 32 fractional bits.
pub type Fixed = I32F32;

/// Game loops in one normal-speed game second. Unit speeds are expressed
/// per game second.
pub const GAME_LOOPS_PER_SECOND: f64 = 16.0;

/// 2D point or direction on the map plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Vec2 {
    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Unit vector in the same direction, or zero for the zero vector.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }

    /// Unit vector pointing from `self` towards `target`.
    #[must_use]
    pub fn direction_to(self, target: Self) -> Self {
        (target - self).normalize()
    }

    /// Point reached by moving `distance` along `direction` (assumed unit length).
    #[must_use]
    pub fn offset(self, direction: Self, distance: f64) -> Self {
        self + direction * distance
    }

    /// Point on the circle of `radius` around `self` at `angle` radians.
    #[must_use]
    pub fn polar_offset(self, radius: f64, angle: f64) -> Self {
        Self::new(self.x + radius * angle.cos(), self.y + radius * angle.sin())
    }

    /// Rotate the vector counter-clockwise by `angle` radians.
    #[must_use]
    pub fn rotate(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Clamp into the rectangle `[0, width] x [0, height]`.
    #[must_use]
    pub fn clamp_to_bounds(self, width: f64, height: f64) -> Self {
        Self::new(self.x.clamp(0.0, width), self.y.clamp(0.0, height))
    }

    /// Whether both coordinates are finite numbers.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Raw fixed-point bits of both coordinates, for stable hashing.
    #[must_use]
    pub fn quantized_bits(self) -> (i64, i64) {
        (quantize(self.x), quantize(self.y))
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::Div<f64> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f64) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

/// Fixed-point bits of `value`; non-finite or out-of-range values map to 0.
#[must_use]
pub fn quantize(value: f64) -> i64 {
    Fixed::checked_from_num(value).map_or(0, Fixed::to_bits)
}

/// Points spaced roughly one distance unit apart on the circle of `radius`
/// around `center`. Always yields at least eight points.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn border_positions(center: Vec2, radius: f64) -> Vec<Vec2> {
    let circumference = std::f64::consts::TAU * radius.max(0.0);
    let count = (circumference.floor() as usize).max(8);
    let step = std::f64::consts::TAU / count as f64;
    (0..count)
        .map(|i| center.polar_offset(radius, step * i as f64))
        .collect()
}
