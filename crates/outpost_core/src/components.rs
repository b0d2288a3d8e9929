//! Shared data components.
//!
//! Plain data with no behavior beyond simple arithmetic helpers. Buildings,
//! units and projectiles are composed of these pieces.

use serde::{Deserialize, Serialize};

use crate::math::{scale_amount, Fixed};

/// Unique identifier for entities.
///
/// Buildings, units and projectiles draw from one counter, so an ID never
/// refers to two different things over a simulation's lifetime.
pub type EntityId = u64;

/// A price in both currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Cost {
    /// Gold amount.
    #[serde(default)]
    pub gold: u32,
    /// Elixir amount.
    #[serde(default)]
    pub elixir: u32,
}

impl Cost {
    /// Nothing.
    pub const ZERO: Self = Self { gold: 0, elixir: 0 };

    /// Create a new cost.
    #[must_use]
    pub const fn new(gold: u32, elixir: u32) -> Self {
        Self { gold, elixir }
    }

    /// Gold-only cost.
    #[must_use]
    pub const fn gold(gold: u32) -> Self {
        Self { gold, elixir: 0 }
    }

    /// Elixir-only cost.
    #[must_use]
    pub const fn elixir(elixir: u32) -> Self {
        Self { gold: 0, elixir }
    }

    /// Whether both currencies are zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.gold == 0 && self.elixir == 0
    }

    /// Multiply each currency by `factor`, rounding to nearest.
    #[must_use]
    pub fn scaled(self, factor: Fixed) -> Self {
        Self {
            gold: scale_amount(self.gold, factor),
            elixir: scale_amount(self.elixir, factor),
        }
    }
}

impl std::ops::Add for Cost {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            gold: self.gold.saturating_add(rhs.gold),
            elixir: self.elixir.saturating_add(rhs.elixir),
        }
    }
}

impl std::ops::AddAssign for Cost {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Health component for damageable entities.
///
/// Invariant: `current <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if entity is dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Check if entity is at full health.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current >= self.max
    }

    /// Health points missing from the maximum.
    #[must_use]
    pub const fn missing(&self) -> u32 {
        self.max.saturating_sub(self.current)
    }

    /// Apply damage, returning actual damage dealt.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current -= actual;
        actual
    }

    /// Heal the entity, returning actual amount healed.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.missing());
        self.current += actual;
        actual
    }

    /// Replace the maximum and refill to it.
    pub fn reset_to(&mut self, max: u32) {
        self.max = max;
        self.current = max;
    }

    /// Get health as a percentage (0-100).
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.max == 0 {
            0
        } else {
            (u64::from(self.current) * 100 / u64::from(self.max)) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_damage_clamps_at_zero() {
        let mut health = Health::new(100);
        assert_eq!(health.apply_damage(30), 30);
        assert_eq!(health.current, 70);
        assert_eq!(health.apply_damage(500), 70);
        assert!(health.is_dead());
    }

    #[test]
    fn test_health_heal_clamps_at_max() {
        let mut health = Health::new(100);
        health.apply_damage(40);
        assert_eq!(health.heal(10), 10);
        assert_eq!(health.heal(1000), 30);
        assert!(health.is_full());
        assert_eq!(health.percentage(), 100);
    }

    #[test]
    fn test_cost_scaled() {
        let cost = Cost::new(200, 50);
        assert_eq!(cost.scaled(Fixed::from_num(0.5)), Cost::new(100, 25));
        assert_eq!(cost + Cost::gold(5), Cost::new(205, 50));
        assert!(Cost::ZERO.is_zero());
    }
}
