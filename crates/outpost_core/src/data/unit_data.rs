//! Unit data structures for data-driven unit definitions.

use serde::{Deserialize, Serialize};

use crate::combat::TargetPriority;
use crate::components::Cost;
use crate::math::{fixed_decimal, level_factor, scale_amount, Fixed};

/// Every trainable unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitKind {
    /// Cheap melee infantry.
    Barbarian,
    /// Ranged infantry.
    Archer,
    /// Slow tank that goes for defences.
    Giant,
    /// Fast raider that goes for resources.
    Goblin,
    /// Flying bomber that goes for defences.
    Balloon,
    /// Ranged splash caster.
    Wizard,
    /// Heavy flyer.
    Dragon,
}

/// Data-driven unit definition.
///
/// # Example RON
///
/// ```ron
/// UnitData(
///     kind: Archer,
///     cost: (elixir: 50),
///     housing: 1,
///     train_time: 6.0,
///     health: 20,
///     move_speed: 24.0,
///     damage: 7,
///     attack_range: 35.0,
///     attack_speed: 1.0,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    /// Unit type.
    pub kind: UnitKind,
    /// Training cost.
    #[serde(default)]
    pub cost: Cost,
    /// Population consumed while trained or deployed.
    pub housing: u32,
    /// Seconds to train.
    #[serde(with = "fixed_decimal")]
    pub train_time: Fixed,
    /// Hit points at level 1.
    pub health: u32,
    /// Per-level hit point growth.
    #[serde(with = "fixed_decimal", default = "Fixed::default")]
    pub health_growth: Fixed,
    /// World units per second.
    #[serde(with = "fixed_decimal")]
    pub move_speed: Fixed,
    /// Damage per hit at level 1.
    pub damage: u32,
    /// Per-level damage growth.
    #[serde(with = "fixed_decimal", default = "Fixed::default")]
    pub damage_growth: Fixed,
    /// Reach in world units, measured to the target's edge.
    #[serde(with = "fixed_decimal")]
    pub attack_range: Fixed,
    /// Hits per second.
    #[serde(with = "fixed_decimal")]
    pub attack_speed: Fixed,
    /// Flying units ignore ground-only defences.
    #[serde(default)]
    pub is_air: bool,
    /// Target ranking policy.
    #[serde(default)]
    pub priority: TargetPriority,
    /// Trainer level needed to train this unit.
    #[serde(default = "default_unlock_level")]
    pub unlock_level: u8,
}

const fn default_unlock_level() -> u8 {
    1
}

impl UnitData {
    /// Maximum hit points at `level`.
    #[must_use]
    pub fn health_at(&self, level: u8) -> u32 {
        scale_amount(self.health, level_factor(self.health_growth, level)).max(1)
    }

    /// Damage per hit at `level`.
    #[must_use]
    pub fn damage_at(&self, level: u8) -> u32 {
        scale_amount(self.damage, level_factor(self.damage_growth, level))
    }

    /// Seconds between hits.
    #[must_use]
    pub fn cooldown(&self) -> Fixed {
        if self.attack_speed > Fixed::ZERO {
            Fixed::ONE / self.attack_speed
        } else {
            Fixed::MAX
        }
    }
}
