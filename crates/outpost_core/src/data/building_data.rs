//! Building data structures for data-driven building definitions.

use serde::{Deserialize, Serialize};

use super::unit_data::UnitKind;
use crate::combat::{TargetPriority, Trajectory};
use crate::components::Cost;
use crate::economy::ResourceKind;
use crate::grid::Footprint;
use crate::math::{fixed_decimal, level_factor, scale_amount, Fixed};

/// Upgrade cost grows by this much per current level.
const UPGRADE_COST_STEP: Fixed = Fixed::from_bits(1 << 31); // 0.5
/// Upgrade time grows by this much per current level.
const UPGRADE_TIME_STEP: Fixed = Fixed::from_bits(0x4CCC_CCCD); // ~0.3

/// Every building type in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuildingKind {
    /// Base centrepiece.
    TownHall,
    /// Single-target ground defence.
    Cannon,
    /// Tracking defence that hits air and ground.
    ArcherTower,
    /// Lobbing splash defence.
    Mortar,
    /// Anti-air defence.
    AirDefense,
    /// Gold producer.
    GoldMine,
    /// Elixir producer.
    ElixirCollector,
    /// Raises the gold cap.
    GoldStorage,
    /// Raises the elixir cap.
    ElixirStorage,
    /// Trains units.
    Barracks,
    /// Raises the population cap.
    ArmyCamp,
    /// Adds a worker.
    BuilderHut,
    /// Plain obstacle.
    Wall,
}

impl BuildingKind {
    /// Whether this kind is a wall segment.
    #[must_use]
    pub const fn is_wall(self) -> bool {
        matches!(self, Self::Wall)
    }
}

/// Attack profile of a defensive building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefenseData {
    /// Damage per projectile at level 1.
    pub damage: u32,
    /// Per-level damage growth.
    #[serde(with = "fixed_decimal", default = "Fixed::default")]
    pub damage_growth: Fixed,
    /// Attack range in world units.
    #[serde(with = "fixed_decimal")]
    pub range: Fixed,
    /// Shots per second.
    #[serde(with = "fixed_decimal")]
    pub attack_speed: Fixed,
    /// Splash radius in world units; zero means single-target.
    #[serde(with = "fixed_decimal", default = "Fixed::default")]
    pub damage_radius: Fixed,
    /// Projectile flight path.
    pub trajectory: Trajectory,
    /// Projectile speed in world units per second.
    #[serde(with = "fixed_decimal")]
    pub projectile_speed: Fixed,
    /// Whether air units are valid targets.
    #[serde(default)]
    pub can_attack_air: bool,
    /// Whether ground units are valid targets.
    #[serde(default = "default_true")]
    pub can_attack_ground: bool,
    /// Target ranking policy.
    #[serde(default)]
    pub priority: TargetPriority,
}

impl DefenseData {
    /// Damage per projectile at `level`.
    #[must_use]
    pub fn damage_at(&self, level: u8) -> u32 {
        scale_amount(self.damage, level_factor(self.damage_growth, level))
    }

    /// Seconds between shots.
    #[must_use]
    pub fn cooldown(&self) -> Fixed {
        if self.attack_speed > Fixed::ZERO {
            Fixed::ONE / self.attack_speed
        } else {
            Fixed::MAX
        }
    }
}

/// A building that accumulates a currency over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionData {
    /// Currency produced.
    pub resource: ResourceKind,
    /// Units produced per second at level 1.
    #[serde(with = "fixed_decimal")]
    pub rate: Fixed,
    /// Per-level rate growth.
    #[serde(with = "fixed_decimal", default = "Fixed::default")]
    pub rate_growth: Fixed,
    /// Internal storage at level 1.
    pub storage: u32,
    /// Per-level storage growth.
    #[serde(with = "fixed_decimal", default = "Fixed::default")]
    pub storage_growth: Fixed,
    /// Fraction of held stock lost when destroyed.
    #[serde(with = "fixed_decimal", default = "Fixed::default")]
    pub loss_fraction: Fixed,
}

impl ProductionData {
    /// Production rate at `level`.
    #[must_use]
    pub fn rate_at(&self, level: u8) -> Fixed {
        self.rate * level_factor(self.rate_growth, level)
    }

    /// Internal storage at `level`.
    #[must_use]
    pub fn storage_at(&self, level: u8) -> u32 {
        scale_amount(self.storage, level_factor(self.storage_growth, level))
    }
}

/// A building that raises a ledger cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageData {
    /// Pool whose cap is raised.
    pub resource: ResourceKind,
    /// Capacity at level 1.
    pub capacity: u32,
    /// Per-level capacity growth.
    #[serde(with = "fixed_decimal", default = "Fixed::default")]
    pub capacity_growth: Fixed,
    /// Fraction of the ledger amount lost when destroyed.
    #[serde(with = "fixed_decimal", default = "Fixed::default")]
    pub loss_fraction: Fixed,
}

impl StorageData {
    /// Capacity contributed at `level`.
    #[must_use]
    pub fn capacity_at(&self, level: u8) -> u32 {
        scale_amount(self.capacity, level_factor(self.capacity_growth, level))
    }
}

/// A building with a training queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerData {
    /// Queue slots before level bonuses.
    #[serde(default = "default_base_queue")]
    pub base_queue: u32,
    /// Units this building can train.
    pub units: Vec<UnitKind>,
}

impl TrainerData {
    /// Queue capacity at `level`: base plus one slot per level.
    #[must_use]
    pub fn queue_capacity(&self, level: u8) -> usize {
        self.base_queue as usize + level as usize
    }
}

/// Type-specific behaviour of a building.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoleData {
    /// No behaviour beyond hit points.
    #[default]
    Passive,
    /// Fires projectiles at hostile units.
    Defense(DefenseData),
    /// Accumulates a currency.
    Production(ProductionData),
    /// Raises a ledger cap.
    Storage(StorageData),
    /// Trains units.
    Trainer(TrainerData),
}

/// Data-driven building definition.
///
/// # Example RON
///
/// ```ron
/// BuildingData(
///     kind: GoldStorage,
///     cost: (elixir: 300),
///     build_time: 20.0,
///     upgrade_time: 30.0,
///     health: 600,
///     health_growth: 0.2,
///     max_level: 5,
///     footprint: (width: 3, height: 3),
///     role: Storage((resource: Gold, capacity: 1500, capacity_growth: 0.25)),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingData {
    /// Building type.
    pub kind: BuildingKind,
    /// Construction cost.
    #[serde(default)]
    pub cost: Cost,
    /// Seconds to construct.
    #[serde(with = "fixed_decimal")]
    pub build_time: Fixed,
    /// Base seconds to upgrade, scaled by level.
    #[serde(with = "fixed_decimal")]
    pub upgrade_time: Fixed,
    /// Hit points at level 1.
    pub health: u32,
    /// Per-level hit point growth.
    #[serde(with = "fixed_decimal", default = "Fixed::default")]
    pub health_growth: Fixed,
    /// Highest reachable level.
    #[serde(default = "default_max_level")]
    pub max_level: u8,
    /// Grid footprint.
    pub footprint: Footprint,
    /// Fraction of cost returned on cancel/demolish.
    #[serde(with = "fixed_decimal", default = "default_refund_rate")]
    pub refund_rate: Fixed,
    /// Type-specific behaviour.
    #[serde(default)]
    pub role: RoleData,
}

const fn default_true() -> bool {
    true
}

const fn default_base_queue() -> u32 {
    5
}

const fn default_max_level() -> u8 {
    1
}

fn default_refund_rate() -> Fixed {
    Fixed::from_num(0.5)
}

impl BuildingData {
    /// Maximum hit points at `level`.
    #[must_use]
    pub fn max_health(&self, level: u8) -> u32 {
        scale_amount(self.health, level_factor(self.health_growth, level)).max(1)
    }

    /// Cost of upgrading from `level` to `level + 1`.
    #[must_use]
    pub fn upgrade_cost(&self, level: u8) -> Cost {
        self.cost
            .scaled(Fixed::ONE + UPGRADE_COST_STEP * Fixed::from_num(level))
    }

    /// Seconds to upgrade from `level` to `level + 1`.
    #[must_use]
    pub fn upgrade_duration(&self, level: u8) -> Fixed {
        self.upgrade_time * (Fixed::ONE + UPGRADE_TIME_STEP * Fixed::from_num(level))
    }

    /// Whether units with a defence-first policy prefer this building.
    #[must_use]
    pub fn is_defense(&self) -> bool {
        matches!(self.role, RoleData::Defense(_))
    }

    /// Whether units with a resource-first policy prefer this building.
    #[must_use]
    pub fn is_resource(&self) -> bool {
        match &self.role {
            RoleData::Production(_) => true,
            RoleData::Storage(storage) => storage.resource.is_currency(),
            _ => false,
        }
    }

    /// Whether destroying this building counts toward battle destruction.
    #[must_use]
    pub fn counts_for_destruction(&self) -> bool {
        !self.kind.is_wall()
    }
}
