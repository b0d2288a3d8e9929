//! Fixed-point math utilities for deterministic simulation.
//!
//! Positions, durations and rates all use fixed-point arithmetic so that
//! two runs fed the same commands and seed produce bit-identical state.
//! Whole-number quantities (currency, hit points) stay as integers.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers in simulation state.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for fixed-point tuning values in hand-written data files.
///
/// Values are written as plain decimals (`attack_speed: 0.8`) and converted
/// once on load. Simulation state snapshots use [`fixed_serde`] instead.
pub mod fixed_decimal {
    use super::Fixed;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.to_num::<f64>())
    }

    /// Deserialize a decimal into a fixed-point number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| de::Error::custom(format!("value {value} out of fixed-point range")))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from whole world units.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Length of the vector.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Scale both components.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }

    /// Step from `self` toward `target` by at most `max_step`.
    ///
    /// Lands exactly on `target` when it is within reach, so repeated calls
    /// never overshoot or oscillate.
    #[must_use]
    pub fn move_towards(self, target: Self, max_step: Fixed) -> Self {
        let remaining = self.distance(target);
        if remaining <= max_step || remaining == Fixed::ZERO {
            return target;
        }
        self + (target - self).normalize().scale(max_step)
    }
}

/// Computes the square root of a fixed-point number using binary search.
///
/// Deterministic on every platform; 48 halvings resolve the full I32F32
/// range well below one fractional ulp of game-relevant magnitudes.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..48 {
        let mid = low + (high - low) / 2;
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Scale an integer amount by a fixed-point factor, rounding to nearest.
///
/// Negative results clamp to zero.
#[must_use]
pub fn scale_amount(amount: u32, factor: Fixed) -> u32 {
    let scaled = Fixed::saturating_from_num(amount).saturating_mul(factor);
    if scaled <= Fixed::ZERO {
        return 0;
    }
    scaled.round().to_num::<u32>()
}

/// `amount * rate * part / whole`, rounded to nearest.
///
/// `part` is clamped to `[0, whole]`. A job with no length is already
/// complete, so a non-positive `whole` yields zero.
/// Multiplies before dividing so exact fractions such as 3/5 stay exact.
#[must_use]
pub fn prorate(amount: u32, rate: Fixed, part: Fixed, whole: Fixed) -> u32 {
    if whole <= Fixed::ZERO {
        return 0;
    }
    let value = Fixed::saturating_from_num(amount)
        .saturating_mul(rate)
        .saturating_mul(part.clamp(Fixed::ZERO, whole))
        / whole;
    value.max(Fixed::ZERO).round().to_num::<u32>()
}

/// Linear per-level growth: `base * (1 + growth * (level - 1))`.
#[must_use]
pub fn level_factor(growth: Fixed, level: u8) -> Fixed {
    Fixed::ONE + growth * Fixed::from_num(level.saturating_sub(1))
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}
