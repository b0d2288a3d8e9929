//! # Outpost Core
//!
//! Deterministic simulation core for a base-building and base-raiding
//! strategy game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Headless battle verification
//! - Replay systems
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`economy`] - Resource ledger with capacity enforcement
//! - [`grid`] - Footprint placement grid
//! - [`buildings`] - Building lifecycle and specialised roles
//! - [`training`] - Unit training queues
//! - [`units`] - Unit AI and movement
//! - [`combat`] - Targeting, projectiles and damage
//! - [`simulation`] - Simulation context and tick passes
//! - [`snapshot`] / [`replay`] - Plain-data persistence
//! - [`data`] - Building and unit definitions

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod buildings;
pub mod collectors;
pub mod combat;
pub mod components;
pub mod data;
pub mod economy;
pub mod error;
pub mod factions;
pub mod grid;
pub mod math;
pub mod replay;
pub mod simulation;
pub mod snapshot;
pub mod training;
pub mod units;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::buildings::{Building, BuildingRole, BuildingState};
    pub use crate::combat::{CombatEvent, DamageMode, Projectile, TargetPriority, Trajectory};
    pub use crate::components::{Cost, EntityId, Health};
    pub use crate::data::{BuildingKind, Catalog, UnitKind};
    pub use crate::economy::{ResourceKind, ResourceLedger};
    pub use crate::error::{GameError, Result};
    pub use crate::factions::FactionId;
    pub use crate::grid::{Footprint, GridOccupancy};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::simulation::{Simulation, SimulationConfig, TickEvents};
    pub use crate::units::{Unit, UnitState};
}
