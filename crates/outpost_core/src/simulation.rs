//! Simulation context and the per-tick system passes.
//!
//! A [`Simulation`] owns everything one base needs: ledger, grid, catalog,
//! entity registries and the seeded RNG. Entities refer to each other by
//! [`EntityId`] only; a removed entity simply stops resolving.
//!
//! # Determinism
//!
//! - No floating-point math (uses fixed-point via [`Fixed`])
//! - Seeded RNG only
//! - Registries are ordered maps, so every pass visits entities in
//!   ascending ID order
//!
//! # Example
//!
//! ```
//! use outpost_core::data::BuildingKind;
//! use outpost_core::economy::ResourceKind;
//! use outpost_core::math::Fixed;
//! use outpost_core::simulation::Simulation;
//!
//! let mut sim = Simulation::default();
//! let cannon = sim.place_building(BuildingKind::Cannon, 5, 5).unwrap();
//! assert_eq!(sim.ledger().get(ResourceKind::Gold), 250);
//!
//! for _ in 0..10 {
//!     sim.tick(Fixed::ONE);
//! }
//! assert!(!sim.building(cannon).unwrap().is_destroyed());
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::buildings::{
    Building, BuildingRole, BuildingState, ConstructionEvent, DamageReport, ProductionEvent, Site,
};
use crate::combat::{
    cooldown_ready, select_defense_target, CombatEvent, DamageMode, Projectile, ProjectileLaunch,
    TargetCandidate,
};
use crate::components::{Cost, EntityId};
use crate::data::{BuildingKind, Catalog, UnitKind};
use crate::economy::{LedgerConfig, LedgerEvent, ResourceKind, ResourceLedger};
use crate::error::{GameError, Result};
use crate::factions::FactionId;
use crate::grid::{Footprint, GridConfig, GridOccupancy};
use crate::math::{fixed_decimal, fixed_serde, Fixed, Vec2Fixed};
use crate::units::Unit;

/// Ticks per second a real-time driver is expected to run.
pub const TICK_RATE: u32 = 20;

// ============================================================================
// Configuration
// ============================================================================

/// Combat tuning shared by every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Straight and tracking projectiles land within this distance of their aim.
    #[serde(with = "fixed_decimal")]
    pub hit_distance: Fixed,
    /// Share of a unit's cost returned when its training is cancelled.
    #[serde(with = "fixed_decimal")]
    pub training_refund: Fixed,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            hit_distance: Fixed::from_num(5),
            training_refund: Fixed::from_bits(1 << 31),
        }
    }
}

/// Everything needed to start a simulation besides the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Starting ledger amounts and caps.
    pub ledger: LedgerConfig,
    /// Grid dimensions.
    pub grid: GridConfig,
    /// Combat tuning.
    pub combat: CombatConfig,
    /// RNG seed.
    pub seed: u64,
}

impl SimulationConfig {
    /// Parse a config from RON text. Missing sections keep their defaults.
    ///
    /// A ledger pool starting above its cap is rejected.
    pub fn from_ron(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| GameError::DataParseError {
            source_name: "simulation config".to_string(),
            message: e.to_string(),
        })?;
        config.ledger.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Events and Statistics
// ============================================================================

/// Everything that happened during one tick, in pass order.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Construction and upgrade completions.
    pub construction: Vec<ConstructionEvent>,
    /// Production and training output.
    pub production: Vec<ProductionEvent>,
    /// Targeting, projectiles, damage and deaths.
    pub combat: Vec<CombatEvent>,
    /// Ledger mutations, drained at the end of the tick.
    pub ledger: Vec<LedgerEvent>,
}

/// A unit deployment, as recorded for replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRecord {
    /// Battle time of the deploy.
    #[serde(with = "fixed_serde")]
    pub time: Fixed,
    /// Unit type.
    pub unit: UnitKind,
    /// Unit level.
    pub level: u8,
    /// World position.
    pub position: Vec2Fixed,
    /// Grid cell under the position, if on the map.
    pub cell: Option<(i32, i32)>,
}

/// Running totals for the current battle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BattleStats {
    /// A battle is in progress.
    pub active: bool,
    /// Seconds since the battle began.
    #[serde(with = "fixed_serde")]
    pub elapsed: Fixed,
    /// Standing defender buildings at the start, walls excluded.
    pub initial_buildings: u32,
    /// Defender buildings destroyed since, walls excluded.
    pub destroyed: u32,
    /// Currency lost by destroyed defender buildings.
    pub loot: Cost,
    /// Deployments in order.
    pub deploys: Vec<DeployRecord>,
}

impl BattleStats {
    /// Destroyed share of the initial buildings, `0..=100`.
    #[must_use]
    pub fn destruction_percent(&self) -> u32 {
        if self.initial_buildings == 0 {
            return 0;
        }
        (u64::from(self.destroyed) * 100 / u64::from(self.initial_buildings)).min(100) as u32
    }

    fn record_destruction(&mut self, building: &Building, loot: Cost) {
        if !self.active || building.faction != FactionId::Defender {
            return;
        }
        if building.data.counts_for_destruction() {
            self.destroyed += 1;
        }
        self.loot += loot;
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// One base and everything fighting over it.
///
/// # System Execution Order
///
/// Each tick, passes run in this order:
/// 1. **Construction** - construction and upgrade timers
/// 2. **Production** - resource production and unit training
/// 3. **Defense** - cooldowns, target validation, projectile launches
/// 4. **Projectiles** - flight and impact damage
/// 5. **Units** - AI, movement and melee strikes
/// 6. **Ledger** - pending ledger events are flushed to observers
#[derive(Debug)]
pub struct Simulation {
    pub(crate) config: SimulationConfig,
    pub(crate) ledger: ResourceLedger,
    pub(crate) grid: GridOccupancy,
    pub(crate) catalog: Catalog,
    pub(crate) buildings: BTreeMap<EntityId, Building>,
    pub(crate) units: BTreeMap<EntityId, Unit>,
    pub(crate) projectiles: Vec<Projectile>,
    pub(crate) rng: StdRng,
    pub(crate) next_id: EntityId,
    pub(crate) tick: u64,
    pub(crate) elapsed: Fixed,
    pub(crate) battle: BattleStats,
    pub(crate) unit_levels: BTreeMap<UnitKind, u8>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimulationConfig::default(), Catalog::standard())
    }
}

fn lookup(buildings: &mut BTreeMap<EntityId, Building>, id: EntityId) -> Result<&mut Building> {
    buildings.get_mut(&id).ok_or_else(|| {
        tracing::warn!(building = id, "Unknown building");
        GameError::InvalidTarget(id)
    })
}

impl Simulation {
    /// Create an empty base.
    #[must_use]
    pub fn new(config: SimulationConfig, catalog: Catalog) -> Self {
        Self {
            ledger: ResourceLedger::new(config.ledger),
            grid: GridOccupancy::new(&config.grid),
            catalog,
            buildings: BTreeMap::new(),
            units: BTreeMap::new(),
            projectiles: Vec::new(),
            rng: StdRng::seed_from_u64(config.seed),
            next_id: 1,
            tick: 0,
            elapsed: Fixed::ZERO,
            battle: BattleStats::default(),
            unit_levels: BTreeMap::new(),
            config,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Configuration the simulation was built with.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The resource ledger.
    #[must_use]
    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Mutable ledger, for observers and direct grants.
    pub fn ledger_mut(&mut self) -> &mut ResourceLedger {
        &mut self.ledger
    }

    /// The placement grid.
    #[must_use]
    pub fn grid(&self) -> &GridOccupancy {
        &self.grid
    }

    /// The content catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Look up a building.
    #[must_use]
    pub fn building(&self, id: EntityId) -> Option<&Building> {
        self.buildings.get(&id)
    }

    /// Building whose footprint covers cell `(x, y)`.
    #[must_use]
    pub fn building_at(&self, x: i32, y: i32) -> Option<&Building> {
        self.grid.owner_at(x, y).and_then(|id| self.buildings.get(&id))
    }

    /// All buildings, rubble included, in ID order.
    pub fn buildings(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: EntityId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// All units, dead included, in ID order.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    /// Projectiles in flight.
    #[must_use]
    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    /// Number of ticks run.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds.
    #[must_use]
    pub const fn elapsed(&self) -> Fixed {
        self.elapsed
    }

    /// Statistics of the current or last battle.
    #[must_use]
    pub fn battle_stats(&self) -> &BattleStats {
        &self.battle
    }

    /// Level deployed units of `kind` spawn at.
    #[must_use]
    pub fn unit_level(&self, kind: UnitKind) -> u8 {
        self.unit_levels.get(&kind).copied().unwrap_or(1)
    }

    /// Set the level deployed units of `kind` spawn at.
    pub fn set_unit_level(&mut self, kind: UnitKind, level: u8) {
        self.unit_levels.insert(kind, level.max(1));
    }

    /// Ready units across all trainers, counted per kind.
    #[must_use]
    pub fn army(&self) -> Vec<(UnitKind, u32)> {
        let mut counts: BTreeMap<UnitKind, u32> = BTreeMap::new();
        for queue in self.buildings.values().filter_map(Building::training_queue) {
            for ready in queue.ready() {
                *counts.entry(ready.unit).or_default() += 1;
            }
        }
        counts.into_iter().collect()
    }

    fn alloc_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_site(&self, x: i32, y: i32, footprint: Footprint) -> Result<()> {
        if self.grid.can_place(x, y, footprint) {
            Ok(())
        } else {
            Err(GameError::InvalidPlacement {
                x,
                y,
                width: footprint.width,
                height: footprint.height,
            })
        }
    }

    // ------------------------------------------------------------------------
    // Building control
    // ------------------------------------------------------------------------

    /// Place a new defender building and start constructing it.
    ///
    /// The footprint must be free, the cost affordable and a worker idle.
    /// Cost, worker and cells are taken together or not at all.
    pub fn place_building(&mut self, kind: BuildingKind, x: i32, y: i32) -> Result<EntityId> {
        let data = self.catalog.building(kind)?.clone();
        self.check_site(x, y, data.footprint)?;
        if self.ledger.available(ResourceKind::Workers) == 0 {
            return Err(GameError::InsufficientResources {
                resource: ResourceKind::Workers,
                required: 1,
                available: 0,
            });
        }
        self.ledger.spend(data.cost)?;
        if let Err(err) = self.ledger.use_worker() {
            self.ledger.credit(data.cost);
            return Err(err);
        }

        let id = self.alloc_id();
        self.grid.occupy(x, y, data.footprint, id);
        let site = Site::on_grid(&self.grid, x, y, data.footprint);
        self.buildings.insert(
            id,
            Building::under_construction(id, &data, FactionId::Defender, site),
        );
        tracing::debug!(building = id, kind = ?kind, x, y, "Construction started");
        Ok(id)
    }

    /// Place a finished building without paying for it.
    ///
    /// Used for restoring saved layouts and setting up enemy bases. Capacity
    /// contributions apply immediately.
    pub fn place_prebuilt(
        &mut self,
        kind: BuildingKind,
        level: u8,
        x: i32,
        y: i32,
        faction: FactionId,
    ) -> Result<EntityId> {
        let data = self.catalog.building(kind)?.clone();
        self.check_site(x, y, data.footprint)?;

        let id = self.alloc_id();
        self.grid.occupy(x, y, data.footprint, id);
        let site = Site::on_grid(&self.grid, x, y, data.footprint);
        let mut building = Building::prebuilt(id, &data, level, faction, site);
        building.activate(&mut self.ledger);
        self.buildings.insert(id, building);
        Ok(id)
    }

    /// Cancel a construction or upgrade. Returns the amount refunded.
    ///
    /// A cancelled construction frees its cells and leaves the registry.
    pub fn cancel_construction(&mut self, id: EntityId) -> Result<Cost> {
        let building = lookup(&mut self.buildings, id)?;
        let outcome = building.cancel_construction(&mut self.ledger)?;
        if outcome.removed {
            let (site, footprint) = (building.site, building.footprint());
            self.grid.free(site.x, site.y, footprint);
            self.buildings.remove(&id);
        }
        Ok(outcome.refund)
    }

    /// Demolish a building, freeing its cells. Returns the amount refunded.
    pub fn demolish(&mut self, id: EntityId) -> Result<Cost> {
        let building = lookup(&mut self.buildings, id)?;
        let refund = building.demolish(&mut self.ledger)?;
        let (site, footprint) = (building.site, building.footprint());
        self.grid.free(site.x, site.y, footprint);
        self.buildings.remove(&id);
        Ok(refund)
    }

    /// Clear the rubble of a destroyed building, freeing its cells.
    pub fn remove_building(&mut self, id: EntityId) -> Result<()> {
        let building = lookup(&mut self.buildings, id)?;
        if !building.is_destroyed() {
            return Err(GameError::InvalidState(format!(
                "building {id} is still standing"
            )));
        }
        building.release_reservations(&mut self.ledger);
        let (site, footprint) = (building.site, building.footprint());
        self.grid.free(site.x, site.y, footprint);
        self.buildings.remove(&id);
        Ok(())
    }

    /// Damage a building directly.
    pub fn damage_building(&mut self, id: EntityId, amount: u32) -> Result<DamageReport> {
        let building = lookup(&mut self.buildings, id)?;
        let report = building.take_damage(amount, &mut self.ledger)?;
        if report.destroyed {
            self.battle.record_destruction(building, report.loot);
        }
        Ok(report)
    }

    /// Repair a building. Returns its new hit points.
    pub fn repair_building(&mut self, id: EntityId, amount: u32) -> Result<u32> {
        lookup(&mut self.buildings, id)?.repair(amount)
    }

    /// Start upgrading a building. Returns the price paid.
    pub fn start_upgrade(&mut self, id: EntityId) -> Result<Cost> {
        lookup(&mut self.buildings, id)?.start_upgrade(&mut self.ledger)
    }

    /// Collect a producer's store. Returns the amount credited.
    pub fn collect(&mut self, id: EntityId) -> Result<u32> {
        lookup(&mut self.buildings, id)?.collect(&mut self.ledger)
    }

    // ------------------------------------------------------------------------
    // Training and deployment
    // ------------------------------------------------------------------------

    /// Queue a unit at a trainer.
    pub fn train_unit(&mut self, trainer: EntityId, kind: UnitKind) -> Result<()> {
        let data = self.catalog.unit(kind)?.clone();
        lookup(&mut self.buildings, trainer)?.train_unit(&data, &mut self.ledger)
    }

    /// Cancel a trainer's queue entry. Returns the amount refunded.
    pub fn cancel_training(&mut self, trainer: EntityId, index: usize) -> Result<Cost> {
        let refund_rate = self.config.combat.training_refund;
        lookup(&mut self.buildings, trainer)?.cancel_training(index, refund_rate, &mut self.ledger)
    }

    /// Deploy a trained unit at `position`.
    ///
    /// Takes the first ready unit of `kind` from the lowest-ID trainer that
    /// has one. The unit inherits the trainer's faction and carries its
    /// population reservation until it dies.
    pub fn deploy_unit(&mut self, kind: UnitKind, position: Vec2Fixed) -> Result<EntityId> {
        let data = self.catalog.unit(kind)?.clone();
        let (faction, ready) = self
            .buildings
            .values_mut()
            .find_map(|building| {
                let faction = building.faction;
                building
                    .training_queue_mut()?
                    .take_ready(kind)
                    .map(|ready| (faction, ready))
            })
            .ok_or(GameError::NoUnitAvailable(kind))?;

        let level = self.unit_level(kind);
        let id = self.alloc_id();
        self.units.insert(
            id,
            Unit::spawn(id, &data, level, position, faction, ready.housing),
        );
        self.battle.deploys.push(DeployRecord {
            time: self.battle.elapsed,
            unit: kind,
            level,
            position,
            cell: self.grid.world_to_grid(position),
        });
        tracing::debug!(unit = id, kind = ?kind, level, "Unit deployed");
        Ok(id)
    }

    /// Spawn a unit that holds no population reservation.
    pub fn spawn_unit(
        &mut self,
        kind: UnitKind,
        level: u8,
        position: Vec2Fixed,
        faction: FactionId,
    ) -> Result<EntityId> {
        let data = self.catalog.unit(kind)?.clone();
        let id = self.alloc_id();
        self.units
            .insert(id, Unit::spawn(id, &data, level, position, faction, 0));
        Ok(id)
    }

    /// Damage a unit directly. Returns its remaining hit points.
    pub fn damage_unit(&mut self, id: EntityId, amount: u32) -> Result<u32> {
        let unit = self.units.get_mut(&id).ok_or_else(|| {
            tracing::warn!(unit = id, "Unknown unit");
            GameError::InvalidTarget(id)
        })?;
        unit.take_damage(amount, &mut self.ledger)
    }

    /// Remove a unit, releasing any population it still holds.
    pub fn remove_unit(&mut self, id: EntityId) -> Option<Unit> {
        let mut unit = self.units.remove(&id)?;
        self.ledger
            .release_population(std::mem::take(&mut unit.population));
        Some(unit)
    }

    /// Drop dead units from the registry. Returns how many were removed.
    pub fn clear_dead_units(&mut self) -> usize {
        let before = self.units.len();
        self.units.retain(|_, unit| unit.is_alive());
        before - self.units.len()
    }

    // ------------------------------------------------------------------------
    // Battle
    // ------------------------------------------------------------------------

    /// Start a battle against the defender buildings now standing.
    pub fn begin_battle(&mut self) {
        let initial = self
            .buildings
            .values()
            .filter(|b| {
                b.faction == FactionId::Defender
                    && !b.is_destroyed()
                    && b.data.counts_for_destruction()
            })
            .count() as u32;
        self.battle = BattleStats {
            active: true,
            initial_buildings: initial,
            ..BattleStats::default()
        };
        tracing::info!(buildings = initial, "Battle started");
    }

    /// Stop the current battle and return its final statistics.
    pub fn end_battle(&mut self) -> BattleStats {
        self.battle.active = false;
        tracing::info!(
            destroyed = self.battle.destroyed,
            percent = self.battle.destruction_percent(),
            gold = self.battle.loot.gold,
            elixir = self.battle.loot.elixir,
            "Battle ended"
        );
        self.battle.clone()
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds.
    pub fn tick(&mut self, dt: Fixed) -> TickEvents {
        let mut events = TickEvents::default();

        self.run_construction_system(dt, &mut events);
        self.run_production_system(dt, &mut events);
        self.run_defense_system(dt, &mut events);
        self.run_projectile_system(dt, &mut events);
        self.run_unit_system(dt, &mut events);
        events.ledger = self.ledger.flush();

        self.tick += 1;
        self.elapsed += dt;
        if self.battle.active {
            self.battle.elapsed += dt;
        }

        #[cfg(feature = "debug-validation")]
        self.validate_invariants();

        #[cfg(debug_assertions)]
        tracing::trace!(tick = self.tick, state_hash = self.state_hash(), "Simulation state hash");

        events
    }

    fn run_construction_system(&mut self, dt: Fixed, events: &mut TickEvents) {
        for building in self.buildings.values_mut() {
            if let Some(event) = building.tick_construction(dt, &mut self.ledger) {
                events.construction.push(event);
            }
        }
    }

    fn run_production_system(&mut self, dt: Fixed, events: &mut TickEvents) {
        for building in self.buildings.values_mut() {
            if let Some(event) = building.tick_production(dt, &mut self.rng) {
                events.production.push(event);
            }
            if let Some(event) = building.tick_training(dt) {
                events.production.push(event);
            }
        }
    }

    fn run_defense_system(&mut self, dt: Fixed, events: &mut TickEvents) {
        let targets: Vec<(FactionId, TargetCandidate)> = self
            .units
            .values()
            .filter(|unit| unit.is_alive())
            .map(|unit| (unit.faction, unit.as_candidate()))
            .collect();

        let mut launches = Vec::new();
        for building in self.buildings.values_mut() {
            if let Some(launch) = aim_defense(building, dt, &targets, events) {
                launches.push(launch);
            }
        }

        for launch in launches {
            let id = self.alloc_id();
            events.combat.push(CombatEvent::ProjectileSpawned {
                source: launch.source,
                target: launch.target,
                projectile: id,
            });
            self.projectiles.push(Projectile::launch(id, launch));
        }
    }

    fn run_projectile_system(&mut self, dt: Fixed, events: &mut TickEvents) {
        let hit_distance = self.config.combat.hit_distance;
        let mut landed = Vec::new();
        for projectile in &mut self.projectiles {
            let live_target = self
                .units
                .get(&projectile.target)
                .filter(|unit| unit.is_alive())
                .map(|unit| unit.position);
            if projectile.advance(dt, live_target, hit_distance) {
                landed.push(projectile.id);
            }
        }
        if landed.is_empty() {
            return;
        }

        let (impacts, flying): (Vec<Projectile>, Vec<Projectile>) =
            std::mem::take(&mut self.projectiles)
                .into_iter()
                .partition(|p| landed.contains(&p.id));
        self.projectiles = flying;

        for projectile in impacts {
            tracing::debug!(projectile = projectile.id, target = projectile.target, "Projectile impact");
            events.combat.push(CombatEvent::ProjectileImpact {
                projectile: projectile.id,
                position: projectile.position,
            });

            let candidates: Vec<TargetCandidate> = self
                .units
                .values()
                .filter(|unit| unit.is_alive() && projectile.faction.is_hostile_to(unit.faction))
                .map(Unit::as_candidate)
                .collect();
            for (target, damage) in projectile.impact_damage(&candidates) {
                let Some(unit) = self.units.get_mut(&target) else {
                    continue;
                };
                let before = unit.health.current;
                let Ok(remaining) = unit.take_damage(damage, &mut self.ledger) else {
                    continue;
                };
                events.combat.push(CombatEvent::DamageDealt {
                    attacker: projectile.source,
                    target,
                    damage: before - remaining,
                });
                if remaining == 0 {
                    events.combat.push(CombatEvent::UnitKilled { unit: target });
                }
            }
        }
    }

    fn run_unit_system(&mut self, dt: Fixed, events: &mut TickEvents) {
        let mut targets: Vec<(FactionId, TargetCandidate)> = self
            .buildings
            .values()
            .filter(|b| !b.is_destroyed() && !b.kind().is_wall())
            .map(|b| (b.faction, b.as_candidate()))
            .collect();

        for unit in self.units.values_mut() {
            if !unit.is_alive() {
                continue;
            }
            let faction = unit.faction;
            let hostile: Vec<TargetCandidate> = targets
                .iter()
                .filter(|(owner, _)| faction.is_hostile_to(*owner))
                .map(|&(_, candidate)| candidate)
                .collect();

            let previous = unit.target;
            let strike = unit.think(dt, &hostile);
            if unit.target != previous {
                if let Some(target) = unit.target {
                    events.combat.push(CombatEvent::TargetAcquired {
                        attacker: unit.id,
                        target,
                    });
                }
            }

            let Some(strike) = strike else {
                continue;
            };
            let Some(building) = self.buildings.get_mut(&strike.target) else {
                continue;
            };
            let Ok(report) = building.take_damage(strike.damage, &mut self.ledger) else {
                continue;
            };
            events.combat.push(CombatEvent::DamageDealt {
                attacker: strike.attacker,
                target: strike.target,
                damage: report.dealt,
            });

            if report.destroyed {
                events.combat.push(CombatEvent::BuildingDestroyed {
                    building: strike.target,
                });
                self.battle.record_destruction(building, report.loot);
                targets.retain(|(_, candidate)| candidate.id != strike.target);
            } else if let Some((_, candidate)) =
                targets.iter_mut().find(|(_, c)| c.id == strike.target)
            {
                candidate.health = building.health;
            }
        }
    }

    #[cfg(feature = "debug-validation")]
    fn validate_invariants(&self) {
        for kind in ResourceKind::ALL {
            let pool = self.ledger.pool(kind);
            debug_assert!(
                !kind.is_currency() || pool.amount <= pool.cap,
                "{kind} above cap: {pool:?}"
            );
        }
        for building in self.buildings.values() {
            debug_assert!(
                building.health.current <= building.health.max,
                "building {} health out of bounds",
                building.id
            );
            debug_assert!(
                !building.is_destroyed() || building.health.current == 0,
                "destroyed building {} has hit points",
                building.id
            );
        }
        let reserved: u32 = self
            .buildings
            .values()
            .filter_map(Building::training_queue)
            .map(|queue| queue.reserved_population())
            .sum::<u32>()
            + self.units.values().map(|unit| unit.population).sum::<u32>();
        debug_assert!(
            reserved <= self.ledger.get(ResourceKind::Population),
            "population reservations exceed ledger usage"
        );
    }

    // ------------------------------------------------------------------------
    // Hashing
    // ------------------------------------------------------------------------

    /// Hash of the full simulation state, for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.elapsed.to_bits().hash(&mut hasher);
        self.next_id.hash(&mut hasher);
        self.ledger.snapshot().hash(&mut hasher);

        self.buildings.len().hash(&mut hasher);
        for (id, building) in &self.buildings {
            id.hash(&mut hasher);
            building.kind().hash(&mut hasher);
            building.faction.hash(&mut hasher);
            building.level.hash(&mut hasher);
            building.health.hash(&mut hasher);
            building.state.hash(&mut hasher);
            building.work_done.to_bits().hash(&mut hasher);
            match &building.role {
                BuildingRole::Passive => {}
                BuildingRole::Defense(turret) => {
                    turret.target.hash(&mut hasher);
                    turret.cooldown.to_bits().hash(&mut hasher);
                }
                BuildingRole::Production(producer) => {
                    producer.stored.hash(&mut hasher);
                    producer.timer.to_bits().hash(&mut hasher);
                }
                BuildingRole::Storage(provider) => provider.contributed.hash(&mut hasher),
                BuildingRole::Trainer(queue) => {
                    for entry in queue.entries() {
                        entry.unit.hash(&mut hasher);
                        entry.elapsed.to_bits().hash(&mut hasher);
                    }
                    queue.ready().hash(&mut hasher);
                }
            }
        }

        self.units.len().hash(&mut hasher);
        for (id, unit) in &self.units {
            id.hash(&mut hasher);
            unit.kind.hash(&mut hasher);
            unit.position.hash(&mut hasher);
            unit.health.hash(&mut hasher);
            unit.state.hash(&mut hasher);
            unit.target.hash(&mut hasher);
            unit.cooldown.to_bits().hash(&mut hasher);
        }

        self.projectiles.len().hash(&mut hasher);
        for projectile in &self.projectiles {
            projectile.id.hash(&mut hasher);
            projectile.target.hash(&mut hasher);
            projectile.position.hash(&mut hasher);
            projectile.elapsed.to_bits().hash(&mut hasher);
        }

        self.battle.destroyed.hash(&mut hasher);
        self.battle.loot.hash(&mut hasher);

        hasher.finish()
    }
}

/// One defensive building's targeting step.
///
/// Re-validates the current target once the cooldown has run out, picks a
/// new one if needed, and returns the projectile to launch.
fn aim_defense(
    building: &mut Building,
    dt: Fixed,
    targets: &[(FactionId, TargetCandidate)],
    events: &mut TickEvents,
) -> Option<ProjectileLaunch> {
    if building.state != BuildingState::Normal {
        return None;
    }
    let defense = building.defense_data()?.clone();
    let reach = building.defense_reach()?;
    let (id, faction, level, origin) = (
        building.id,
        building.faction,
        building.level,
        building.site.center,
    );
    let BuildingRole::Defense(turret) = &mut building.role else {
        return None;
    };
    if !cooldown_ready(&mut turret.cooldown, dt) {
        return None;
    }

    let hostile: Vec<TargetCandidate> = targets
        .iter()
        .filter(|(owner, _)| faction.is_hostile_to(*owner))
        .map(|&(_, candidate)| candidate)
        .collect();
    let retained = turret
        .target
        .and_then(|current| hostile.iter().find(|c| c.id == current))
        .filter(|c| reach.covers(origin, c))
        .copied();

    let target = if let Some(target) = retained {
        target
    } else {
        turret.target = None;
        let chosen = select_defense_target(defense.priority, origin, reach, &hostile)?;
        tracing::debug!(building = id, target = chosen, "Defense acquired target");
        events.combat.push(CombatEvent::TargetAcquired {
            attacker: id,
            target: chosen,
        });
        *hostile.iter().find(|c| c.id == chosen)?
    };

    turret.target = Some(target.id);
    turret.cooldown = defense.cooldown();
    Some(ProjectileLaunch {
        source: id,
        faction,
        target: target.id,
        origin,
        aim: target.position,
        damage: defense.damage_at(level),
        mode: DamageMode::from_radius(defense.damage_radius),
        trajectory: defense.trajectory,
        speed: defense.projectile_speed,
        hits_air: defense.can_attack_air,
        hits_ground: defense.can_attack_ground,
    })
}
