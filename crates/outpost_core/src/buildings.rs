//! Building entities and their lifecycle state machine.
//!
//! ```text
//! UnderConstruction --done--> Normal --start_upgrade--> Upgrading --done--> Normal
//!        |                      |  ^                       |
//!        +--cancel: removed     |  +------- cancel --------+
//!        any live state --hit points reach 0 / demolish--> Destroyed
//! ```
//!
//! Specialised behaviour lives in [`BuildingRole`], a tagged variant chosen
//! from the building's data. Every ledger side effect is passed an explicit
//! [`ResourceLedger`]; grid cells are handled by the owning simulation.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::collectors::{CapacityProvider, Producer};
use crate::combat::{DefenseReach, TargetCandidate};
use crate::components::{Cost, EntityId, Health};
use crate::data::{BuildingData, BuildingKind, DefenseData, RoleData, UnitData, UnitKind};
use crate::economy::{ResourceKind, ResourceLedger};
use crate::error::{GameError, Result};
use crate::factions::FactionId;
use crate::grid::{Footprint, GridOccupancy};
use crate::math::{fixed_serde, prorate, Fixed, Vec2Fixed};
use crate::training::TrainingQueue;

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingState {
    /// Fully built and working.
    Normal,
    /// Being built; holds a worker.
    UnderConstruction,
    /// Being upgraded; holds a worker.
    Upgrading,
    /// Terminal.
    Destroyed,
}

/// Runtime state of a defensive building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Turret {
    /// Unit currently aimed at.
    pub target: Option<EntityId>,
    /// Seconds until the next shot.
    #[serde(with = "fixed_serde")]
    pub cooldown: Fixed,
}

/// Type-specific runtime state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildingRole {
    /// Nothing beyond hit points.
    Passive,
    /// Fires at hostile units.
    Defense(Turret),
    /// Fills an internal store.
    Production(Producer),
    /// Raises a ledger cap.
    Storage(CapacityProvider),
    /// Trains units.
    Trainer(TrainingQueue),
}

impl BuildingRole {
    fn for_data(data: &BuildingData) -> Self {
        match data.role {
            RoleData::Passive => Self::Passive,
            RoleData::Defense(_) => Self::Defense(Turret::default()),
            RoleData::Production(_) => Self::Production(Producer::default()),
            RoleData::Storage(_) => Self::Storage(CapacityProvider::default()),
            RoleData::Trainer(_) => Self::Trainer(TrainingQueue::new()),
        }
    }
}

/// Where a building stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Origin column.
    pub x: i32,
    /// Origin row.
    pub y: i32,
    /// World centre of the footprint.
    pub center: Vec2Fixed,
    /// Half the shorter footprint side in world units.
    #[serde(with = "fixed_serde")]
    pub reach: Fixed,
}

impl Site {
    /// Site of `footprint` placed at `(x, y)` on `grid`.
    #[must_use]
    pub fn on_grid(grid: &GridOccupancy, x: i32, y: i32, footprint: Footprint) -> Self {
        Self {
            x,
            y,
            center: grid.footprint_center(x, y, footprint),
            reach: Fixed::from_num(footprint.min_side()) * grid.cell_size() / 2,
        }
    }
}

// ============================================================================
// Events and Reports
// ============================================================================

/// Events from the construction pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstructionEvent {
    /// Construction finished.
    Completed {
        /// The building.
        building: EntityId,
        /// Its type.
        kind: BuildingKind,
    },
    /// An upgrade finished.
    UpgradeCompleted {
        /// The building.
        building: EntityId,
        /// Its type.
        kind: BuildingKind,
        /// Level reached.
        level: u8,
    },
}

/// Events from the production and training pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionEvent {
    /// A producer added to its store.
    Produced {
        /// The producer.
        building: EntityId,
        /// Currency produced.
        resource: ResourceKind,
        /// Amount added.
        amount: u32,
    },
    /// A trainer finished a unit.
    UnitTrained {
        /// The trainer.
        trainer: EntityId,
        /// Unit ready to deploy.
        unit: UnitKind,
    },
}

/// Outcome of a cancelled construction or upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOutcome {
    /// Amount credited back.
    pub refund: Cost,
    /// True when a construction was cancelled and the building must go.
    pub removed: bool,
}

/// Outcome of a damage application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageReport {
    /// Hit points removed.
    pub dealt: u32,
    /// Hit points left.
    pub remaining: u32,
    /// The hit destroyed the building.
    pub destroyed: bool,
    /// Currency lost with the building.
    pub loot: Cost,
}

// ============================================================================
// Building
// ============================================================================

/// A placed building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Building {
    /// Entity ID.
    pub id: EntityId,
    /// Owning side.
    pub faction: FactionId,
    /// Current level, `1..=max_level`.
    pub level: u8,
    /// Hit points.
    pub health: Health,
    /// Lifecycle state.
    pub state: BuildingState,
    /// Placement.
    pub site: Site,
    /// Seconds of construction or upgrade work done.
    pub work_done: Fixed,
    /// Seconds of work the current construction or upgrade needs.
    pub work_total: Fixed,
    /// Price paid for the current construction or upgrade.
    pub invested: Cost,
    /// Whether this building currently holds a worker.
    pub holds_worker: bool,
    /// Static definition.
    pub data: BuildingData,
    /// Type-specific state.
    pub role: BuildingRole,
}

impl Building {
    /// A freshly placed building whose cost and worker are already taken.
    #[must_use]
    pub fn under_construction(id: EntityId, data: &BuildingData, faction: FactionId, site: Site) -> Self {
        Self {
            id,
            faction,
            level: 1,
            health: Health::new(data.max_health(1)),
            state: BuildingState::UnderConstruction,
            site,
            work_done: Fixed::ZERO,
            work_total: data.build_time.max(Fixed::ZERO),
            invested: data.cost,
            holds_worker: true,
            data: data.clone(),
            role: BuildingRole::for_data(data),
        }
    }

    /// A finished building at `level`; call [`activate`](Self::activate)
    /// to apply its capacity.
    #[must_use]
    pub fn prebuilt(
        id: EntityId,
        data: &BuildingData,
        level: u8,
        faction: FactionId,
        site: Site,
    ) -> Self {
        let level = level.clamp(1, data.max_level.max(1));
        Self {
            id,
            faction,
            level,
            health: Health::new(data.max_health(level)),
            state: BuildingState::Normal,
            site,
            work_done: Fixed::ZERO,
            work_total: Fixed::ZERO,
            invested: Cost::ZERO,
            holds_worker: false,
            data: data.clone(),
            role: BuildingRole::for_data(data),
        }
    }

    /// Building type.
    #[must_use]
    pub fn kind(&self) -> BuildingKind {
        self.data.kind
    }

    /// Grid footprint.
    #[must_use]
    pub fn footprint(&self) -> Footprint {
        self.data.footprint
    }

    /// Whether the building is rubble.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state == BuildingState::Destroyed
    }

    /// Completed fraction of the current construction or upgrade.
    #[must_use]
    pub fn progress(&self) -> Fixed {
        match self.state {
            BuildingState::UnderConstruction | BuildingState::Upgrading => {
                if self.work_total <= Fixed::ZERO {
                    Fixed::ONE
                } else {
                    (self.work_done / self.work_total).min(Fixed::ONE)
                }
            }
            BuildingState::Normal | BuildingState::Destroyed => Fixed::ZERO,
        }
    }

    /// Price of the next upgrade.
    #[must_use]
    pub fn upgrade_cost(&self) -> Cost {
        self.data.upgrade_cost(self.level)
    }

    /// Seconds the next upgrade takes.
    #[must_use]
    pub fn upgrade_duration(&self) -> Fixed {
        self.data.upgrade_duration(self.level)
    }

    /// Attack profile, for defensive buildings.
    #[must_use]
    pub fn defense_data(&self) -> Option<&DefenseData> {
        match &self.data.role {
            RoleData::Defense(defense) => Some(defense),
            _ => None,
        }
    }

    /// Range and air/ground capability, for defensive buildings.
    #[must_use]
    pub fn defense_reach(&self) -> Option<DefenseReach> {
        self.defense_data().map(|d| DefenseReach {
            range: d.range,
            can_attack_air: d.can_attack_air,
            can_attack_ground: d.can_attack_ground,
        })
    }

    /// Queue capacity, for trainers: base plus one slot per level.
    #[must_use]
    pub fn queue_capacity(&self) -> Option<usize> {
        match &self.data.role {
            RoleData::Trainer(trainer) => Some(trainer.queue_capacity(self.level)),
            _ => None,
        }
    }

    /// Training queue, for trainers.
    #[must_use]
    pub fn training_queue(&self) -> Option<&TrainingQueue> {
        match &self.role {
            BuildingRole::Trainer(queue) => Some(queue),
            _ => None,
        }
    }

    /// Mutable training queue, for trainers.
    pub fn training_queue_mut(&mut self) -> Option<&mut TrainingQueue> {
        match &mut self.role {
            BuildingRole::Trainer(queue) => Some(queue),
            _ => None,
        }
    }

    /// Amount waiting to be collected, for producers.
    #[must_use]
    pub fn stored(&self) -> Option<u32> {
        match &self.role {
            BuildingRole::Production(producer) => Some(producer.stored),
            _ => None,
        }
    }

    /// Capacity currently added to the ledger, for capacity providers.
    #[must_use]
    pub fn contributed_capacity(&self) -> Option<u32> {
        match &self.role {
            BuildingRole::Storage(provider) => Some(provider.contributed),
            _ => None,
        }
    }

    /// This building as a target for units.
    #[must_use]
    pub fn as_candidate(&self) -> TargetCandidate {
        TargetCandidate {
            id: self.id,
            position: self.site.center,
            reach: self.site.reach,
            health: self.health,
            is_air: false,
            is_defense: self.data.is_defense(),
            is_resource: self.data.is_resource(),
        }
    }

    fn ensure_standing(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(GameError::AlreadyDestroyed(self.id))
        } else {
            Ok(())
        }
    }

    fn ensure_normal(&self, action: &str) -> Result<()> {
        self.ensure_standing()?;
        if self.state == BuildingState::Normal {
            Ok(())
        } else {
            Err(GameError::InvalidState(format!(
                "cannot {action} building {} while {:?}",
                self.id, self.state
            )))
        }
    }

    fn release_worker(&mut self, ledger: &mut ResourceLedger) {
        if self.holds_worker {
            self.holds_worker = false;
            if ledger.release_worker().is_err() {
                tracing::warn!(building = self.id, "Worker already returned to pool");
            }
        }
    }

    /// Apply capacity contributions for the current level.
    ///
    /// Called on construction and upgrade completion and for prebuilt
    /// buildings; only capacity providers are affected.
    pub fn activate(&mut self, ledger: &mut ResourceLedger) {
        if let (BuildingRole::Storage(provider), RoleData::Storage(storage)) =
            (&mut self.role, &self.data.role)
        {
            provider.apply_level(storage, self.level, ledger);
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Advance construction or upgrade work by `dt` seconds.
    pub fn tick_construction(
        &mut self,
        dt: Fixed,
        ledger: &mut ResourceLedger,
    ) -> Option<ConstructionEvent> {
        if !matches!(
            self.state,
            BuildingState::UnderConstruction | BuildingState::Upgrading
        ) {
            return None;
        }

        self.work_done += dt;
        if self.work_done < self.work_total {
            return None;
        }

        let upgraded = self.state == BuildingState::Upgrading;
        if upgraded {
            self.level = self.level.saturating_add(1).min(self.data.max_level.max(1));
            self.health.reset_to(self.data.max_health(self.level));
        }
        self.state = BuildingState::Normal;
        self.work_done = Fixed::ZERO;
        self.work_total = Fixed::ZERO;
        self.invested = Cost::ZERO;
        self.release_worker(ledger);
        self.activate(ledger);

        if upgraded {
            tracing::debug!(building = self.id, kind = ?self.kind(), level = self.level, "Upgrade complete");
            Some(ConstructionEvent::UpgradeCompleted {
                building: self.id,
                kind: self.kind(),
                level: self.level,
            })
        } else {
            tracing::debug!(building = self.id, kind = ?self.kind(), "Construction complete");
            Some(ConstructionEvent::Completed {
                building: self.id,
                kind: self.kind(),
            })
        }
    }

    /// Begin upgrading to the next level.
    ///
    /// Requires state Normal, a level below the maximum, an affordable
    /// upgrade cost and an idle worker. Cost and worker are taken together
    /// or not at all. Returns the price paid.
    pub fn start_upgrade(&mut self, ledger: &mut ResourceLedger) -> Result<Cost> {
        self.ensure_normal("upgrade")?;
        if self.level >= self.data.max_level {
            return Err(GameError::InvalidState(format!(
                "building {} is already at max level {}",
                self.id, self.data.max_level
            )));
        }

        let cost = self.upgrade_cost();
        if ledger.available(ResourceKind::Workers) == 0 {
            return Err(GameError::InsufficientResources {
                resource: ResourceKind::Workers,
                required: 1,
                available: 0,
            });
        }
        ledger.spend(cost)?;
        if let Err(err) = ledger.use_worker() {
            ledger.credit(cost);
            return Err(err);
        }

        self.state = BuildingState::Upgrading;
        self.work_done = Fixed::ZERO;
        self.work_total = self.upgrade_duration().max(Fixed::ZERO);
        self.invested = cost;
        self.holds_worker = true;
        tracing::debug!(building = self.id, level = self.level, "Upgrade started");
        Ok(cost)
    }

    /// Cancel the current construction or upgrade.
    ///
    /// Refunds `invested * refund_rate * (1 - progress)` and frees the
    /// worker. A cancelled construction must be removed by the caller; a
    /// cancelled upgrade returns to Normal at the same level.
    pub fn cancel_construction(&mut self, ledger: &mut ResourceLedger) -> Result<CancelOutcome> {
        self.ensure_standing()?;
        let removed = match self.state {
            BuildingState::UnderConstruction => true,
            BuildingState::Upgrading => false,
            BuildingState::Normal | BuildingState::Destroyed => {
                return Err(GameError::InvalidState(format!(
                    "building {} has no construction to cancel",
                    self.id
                )));
            }
        };

        let remaining = (self.work_total - self.work_done).max(Fixed::ZERO);
        let rate = self.data.refund_rate;
        let refund = Cost::new(
            prorate(self.invested.gold, rate, remaining, self.work_total),
            prorate(self.invested.elixir, rate, remaining, self.work_total),
        );
        let credited = ledger.credit(refund);
        self.release_worker(ledger);

        self.work_done = Fixed::ZERO;
        self.work_total = Fixed::ZERO;
        self.invested = Cost::ZERO;
        if removed {
            self.state = BuildingState::Destroyed;
            self.health.current = 0;
        } else {
            self.state = BuildingState::Normal;
        }

        tracing::debug!(building = self.id, removed, gold = credited.gold, elixir = credited.elixir, "Construction cancelled");
        Ok(CancelOutcome {
            refund: credited,
            removed,
        })
    }

    /// Tear the building down voluntarily.
    ///
    /// Refunds `base cost * refund_rate` regardless of progress, collects any
    /// stored production, withdraws capacity without loss and releases every
    /// reservation the building holds. Returns the amount credited.
    pub fn demolish(&mut self, ledger: &mut ResourceLedger) -> Result<Cost> {
        self.ensure_standing()?;

        self.release_worker(ledger);
        match (&mut self.role, &self.data.role) {
            (BuildingRole::Production(producer), RoleData::Production(data)) => {
                producer.on_demolished(data, ledger);
            }
            (BuildingRole::Storage(provider), RoleData::Storage(data)) => {
                provider.withdraw(data, ledger);
            }
            (BuildingRole::Trainer(queue), _) => queue.release_all(ledger),
            (BuildingRole::Defense(turret), _) => turret.target = None,
            _ => {}
        }

        let refund = self.data.cost.scaled(self.data.refund_rate);
        let credited = ledger.credit(refund);
        self.state = BuildingState::Destroyed;
        self.health.current = 0;
        self.work_done = Fixed::ZERO;
        self.work_total = Fixed::ZERO;
        self.invested = Cost::ZERO;

        tracing::debug!(building = self.id, kind = ?self.kind(), "Demolished");
        Ok(credited)
    }

    /// Apply damage.
    ///
    /// A building reaching zero hit points is destroyed: its worker is
    /// released, stored production and storage contents are partly lost as
    /// loot, capacity is withdrawn, and queued training is dropped.
    pub fn take_damage(&mut self, amount: u32, ledger: &mut ResourceLedger) -> Result<DamageReport> {
        self.ensure_standing()?;
        let dealt = self.health.apply_damage(amount);
        let mut report = DamageReport {
            dealt,
            remaining: self.health.current,
            destroyed: false,
            loot: Cost::ZERO,
        };
        if self.health.is_dead() {
            report.loot = self.destroy(ledger);
            report.destroyed = true;
        }
        Ok(report)
    }

    fn destroy(&mut self, ledger: &mut ResourceLedger) -> Cost {
        self.release_worker(ledger);
        let loot = match (&mut self.role, &self.data.role) {
            (BuildingRole::Production(producer), RoleData::Production(data)) => {
                producer.on_destroyed(data, ledger)
            }
            (BuildingRole::Storage(provider), RoleData::Storage(data)) => {
                provider.on_destroyed(data, ledger)
            }
            (BuildingRole::Trainer(queue), _) => {
                queue.drop_queued(ledger);
                Cost::ZERO
            }
            (BuildingRole::Defense(turret), _) => {
                turret.target = None;
                Cost::ZERO
            }
            _ => Cost::ZERO,
        };

        self.state = BuildingState::Destroyed;
        self.health.current = 0;
        self.work_done = Fixed::ZERO;
        self.work_total = Fixed::ZERO;
        self.invested = Cost::ZERO;
        tracing::info!(building = self.id, kind = ?self.kind(), "Building destroyed");
        loot
    }

    /// Restore hit points, clamped at the maximum. Returns the new value.
    pub fn repair(&mut self, amount: u32) -> Result<u32> {
        self.ensure_standing()?;
        self.health.heal(amount);
        Ok(self.health.current)
    }

    /// Release every reservation still held before the building is removed
    /// from its registry.
    pub fn release_reservations(&mut self, ledger: &mut ResourceLedger) {
        self.release_worker(ledger);
        if let BuildingRole::Trainer(queue) = &mut self.role {
            queue.release_all(ledger);
        }
    }

    // ------------------------------------------------------------------------
    // Production
    // ------------------------------------------------------------------------

    /// Run production for `dt` seconds. Producers work only while Normal.
    pub fn tick_production<R: Rng>(&mut self, dt: Fixed, rng: &mut R) -> Option<ProductionEvent> {
        if self.state != BuildingState::Normal {
            return None;
        }
        let (BuildingRole::Production(producer), RoleData::Production(data)) =
            (&mut self.role, &self.data.role)
        else {
            return None;
        };
        let amount = producer.tick(data, self.level, dt, rng);
        (amount > 0).then(|| ProductionEvent::Produced {
            building: self.id,
            resource: data.resource,
            amount,
        })
    }

    /// Move stored production into the ledger. Returns the amount credited.
    pub fn collect(&mut self, ledger: &mut ResourceLedger) -> Result<u32> {
        self.ensure_standing()?;
        match (&mut self.role, &self.data.role) {
            (BuildingRole::Production(producer), RoleData::Production(data)) => {
                Ok(producer.collect(data, ledger))
            }
            _ => Err(GameError::InvalidState(format!(
                "building {} does not produce resources",
                self.id
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Training
    // ------------------------------------------------------------------------

    /// Queue a unit for training.
    ///
    /// Fails with no effect unless the building is a Normal trainer that
    /// offers `unit`, has a free queue slot and has reached the unit's unlock
    /// level, and the ledger can cover population and cost.
    pub fn train_unit(&mut self, unit: &UnitData, ledger: &mut ResourceLedger) -> Result<()> {
        self.ensure_normal("train at")?;
        let RoleData::Trainer(trainer) = &self.data.role else {
            return Err(GameError::InvalidState(format!(
                "building {} cannot train units",
                self.id
            )));
        };
        if !trainer.units.contains(&unit.kind) {
            return Err(GameError::InvalidState(format!(
                "{:?} cannot train {:?}",
                self.data.kind, unit.kind
            )));
        }

        let capacity = trainer.queue_capacity(self.level);
        let level = self.level;
        let BuildingRole::Trainer(queue) = &mut self.role else {
            return Err(GameError::InvalidState(format!(
                "building {} has no training queue",
                self.id
            )));
        };
        if queue.len() >= capacity {
            return Err(GameError::QueueFull { capacity });
        }
        if level < unit.unlock_level {
            return Err(GameError::LevelLocked {
                unit: unit.kind,
                required: unit.unlock_level,
                level,
            });
        }
        queue.enqueue(unit, capacity, ledger)
    }

    /// Cancel the queue entry at `index`. Returns the amount credited.
    pub fn cancel_training(
        &mut self,
        index: usize,
        refund_rate: Fixed,
        ledger: &mut ResourceLedger,
    ) -> Result<Cost> {
        self.ensure_standing()?;
        let id = self.id;
        self.training_queue_mut()
            .ok_or_else(|| GameError::InvalidState(format!("building {id} cannot train units")))?
            .cancel(index, refund_rate, ledger)
    }

    /// Advance training by `dt` seconds. Trainers work only while Normal.
    pub fn tick_training(&mut self, dt: Fixed) -> Option<ProductionEvent> {
        if self.state != BuildingState::Normal {
            return None;
        }
        let trainer = self.id;
        let unit = self.training_queue_mut()?.tick(dt)?;
        tracing::debug!(trainer, unit = ?unit, "Unit trained");
        Some(ProductionEvent::UnitTrained { trainer, unit })
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::data::Catalog;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn site() -> Site {
        Site {
            x: 5,
            y: 5,
            center: Vec2Fixed::from_ints(65, 65),
            reach: fixed(15),
        }
    }

    fn build(kind: BuildingKind, ledger: &mut ResourceLedger) -> Building {
        let catalog = Catalog::standard();
        let data = catalog.building(kind).unwrap();
        ledger.spend(data.cost).unwrap();
        ledger.use_worker().unwrap();
        Building::under_construction(1, data, FactionId::Defender, site())
    }

    fn finished(kind: BuildingKind, level: u8, ledger: &mut ResourceLedger) -> Building {
        let catalog = Catalog::standard();
        let mut building =
            Building::prebuilt(1, catalog.building(kind).unwrap(), level, FactionId::Defender, site());
        building.activate(ledger);
        building
    }

    #[test]
    fn test_construction_completes_and_releases_worker() {
        let mut ledger = ResourceLedger::default();
        let mut cannon = build(BuildingKind::Cannon, &mut ledger);
        assert_eq!(ledger.get(ResourceKind::Workers), 1);
        assert_eq!(ledger.get(ResourceKind::Gold), 250);

        assert_eq!(cannon.tick_construction(fixed(4), &mut ledger), None);
        assert_eq!(cannon.work_done, fixed(4));
        assert!(cannon.progress() > Fixed::ZERO && cannon.progress() < Fixed::ONE);
        let event = cannon.tick_construction(fixed(6), &mut ledger);
        assert_eq!(
            event,
            Some(ConstructionEvent::Completed {
                building: 1,
                kind: BuildingKind::Cannon
            })
        );
        assert_eq!(cannon.state, BuildingState::Normal);
        assert_eq!(ledger.get(ResourceKind::Workers), 0);
    }

    #[test]
    fn test_cancel_construction_refunds_remaining_share() {
        let mut ledger = ResourceLedger::default();
        let mut cannon = build(BuildingKind::Cannon, &mut ledger);
        cannon.tick_construction(fixed(4), &mut ledger);

        let outcome = cannon.cancel_construction(&mut ledger).unwrap();
        assert_eq!(outcome.refund, Cost::gold(75));
        assert!(outcome.removed);
        assert_eq!(ledger.get(ResourceKind::Gold), 325);
        assert_eq!(ledger.get(ResourceKind::Workers), 0);

        assert!(cannon.cancel_construction(&mut ledger).is_err());
        assert_eq!(ledger.get(ResourceKind::Workers), 0);
    }

    #[test]
    fn test_cancel_instant_construction_refunds_nothing() {
        let mut ledger = ResourceLedger::default();
        let mut wall = build(BuildingKind::Wall, &mut ledger);
        assert_eq!(wall.progress(), Fixed::ONE);

        let outcome = wall.cancel_construction(&mut ledger).unwrap();
        assert_eq!(outcome.refund, Cost::ZERO);
        assert_eq!(ledger.get(ResourceKind::Gold), 450);
        assert_eq!(ledger.get(ResourceKind::Workers), 0);
    }

    #[test]
    fn test_upgrade_is_atomic() {
        let mut ledger = ResourceLedger::default();
        let mut cannon = finished(BuildingKind::Cannon, 1, &mut ledger);

        ledger.set(ResourceKind::Gold, 300);
        let result = cannon.start_upgrade(&mut ledger);
        assert!(matches!(result, Err(GameError::InsufficientResources { .. })));
        assert_eq!(ledger.get(ResourceKind::Gold), 300);
        assert_eq!(ledger.get(ResourceKind::Workers), 0);

        ledger.set(ResourceKind::Gold, 1000);
        ledger.use_worker().unwrap();
        ledger.use_worker().unwrap();
        assert!(cannon.start_upgrade(&mut ledger).is_err());
        assert_eq!(ledger.get(ResourceKind::Gold), 1000);
        assert_eq!(cannon.state, BuildingState::Normal);
    }

    #[test]
    fn test_upgrade_completes_with_full_heal() {
        let mut ledger = ResourceLedger::default();
        let mut cannon = finished(BuildingKind::Cannon, 1, &mut ledger);
        cannon.take_damage(100, &mut ledger).unwrap();

        assert_eq!(cannon.start_upgrade(&mut ledger), Ok(Cost::gold(375)));
        assert_eq!(ledger.get(ResourceKind::Gold), 125);
        assert_eq!(ledger.get(ResourceKind::Workers), 1);

        let duration = cannon.upgrade_duration();
        let event = cannon.tick_construction(duration, &mut ledger);
        assert!(matches!(
            event,
            Some(ConstructionEvent::UpgradeCompleted { level: 2, .. })
        ));
        assert_eq!(cannon.level, 2);
        assert_eq!(cannon.health.current, cannon.data.max_health(2));
        assert_eq!(ledger.get(ResourceKind::Workers), 0);
    }

    #[test]
    fn test_cancel_upgrade_returns_to_normal() {
        let mut ledger = ResourceLedger::default();
        let mut cannon = finished(BuildingKind::Cannon, 1, &mut ledger);
        cannon.start_upgrade(&mut ledger).unwrap();

        let outcome = cannon.cancel_construction(&mut ledger).unwrap();
        assert!(!outcome.removed);
        assert_eq!(outcome.refund, Cost::gold(188));
        assert_eq!(cannon.state, BuildingState::Normal);
        assert_eq!(cannon.level, 1);
        assert_eq!(ledger.get(ResourceKind::Workers), 0);
    }

    #[test]
    fn test_max_level_rejects_upgrade() {
        let mut ledger = ResourceLedger::default();
        let mut hut = finished(BuildingKind::BuilderHut, 1, &mut ledger);
        assert!(matches!(
            hut.start_upgrade(&mut ledger),
            Err(GameError::InvalidState(_))
        ));
    }

    #[test]
    fn test_destroyed_building_ignores_damage_and_repair() {
        let mut ledger = ResourceLedger::default();
        let mut wall = finished(BuildingKind::Wall, 1, &mut ledger);

        let report = wall.take_damage(1000, &mut ledger).unwrap();
        assert!(report.destroyed);
        assert_eq!(report.remaining, 0);
        assert_eq!(wall.state, BuildingState::Destroyed);

        assert_eq!(wall.take_damage(5, &mut ledger), Err(GameError::AlreadyDestroyed(1)));
        assert_eq!(wall.repair(5), Err(GameError::AlreadyDestroyed(1)));
        assert!(wall.start_upgrade(&mut ledger).is_err());
    }

    #[test]
    fn test_repair_clamps_at_max() {
        let mut ledger = ResourceLedger::default();
        let mut wall = finished(BuildingKind::Wall, 1, &mut ledger);
        wall.take_damage(50, &mut ledger).unwrap();
        assert_eq!(wall.repair(500), Ok(300));
    }

    #[test]
    fn test_destroying_construction_site_releases_worker() {
        let mut ledger = ResourceLedger::default();
        let mut cannon = build(BuildingKind::Cannon, &mut ledger);
        cannon.take_damage(10_000, &mut ledger).unwrap();
        assert_eq!(ledger.get(ResourceKind::Workers), 0);
    }

    #[test]
    fn test_storage_contribution_follows_level() {
        let mut ledger = ResourceLedger::default();
        let mut storage = finished(BuildingKind::GoldStorage, 3, &mut ledger);
        assert_eq!(storage.contributed_capacity(), Some(2250));
        assert_eq!(ledger.cap(ResourceKind::Gold), 3250);

        storage.take_damage(10_000, &mut ledger).unwrap();
        assert_eq!(ledger.cap(ResourceKind::Gold), 1000);
    }

    #[test]
    fn test_demolish_refunds_base_cost_share() {
        let mut ledger = ResourceLedger::default();
        let mut storage = finished(BuildingKind::ElixirStorage, 1, &mut ledger);
        ledger.set(ResourceKind::Gold, 0);

        assert_eq!(storage.demolish(&mut ledger), Ok(Cost::gold(150)));
        assert_eq!(ledger.cap(ResourceKind::Elixir), 1000);
        assert!(storage.is_destroyed());
        assert!(storage.demolish(&mut ledger).is_err());
    }

    #[test]
    fn test_production_and_collect() {
        let mut ledger = ResourceLedger::default();
        let mut mine = finished(BuildingKind::GoldMine, 1, &mut ledger);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..10 {
            mine.tick_production(fixed(1), &mut rng);
        }
        let stored = mine.stored().unwrap();
        assert!((10..=20).contains(&stored));

        assert_eq!(mine.collect(&mut ledger), Ok(stored));
        assert_eq!(ledger.get(ResourceKind::Gold), 500 + stored);
        assert_eq!(mine.stored(), Some(0));
    }

    #[test]
    fn test_trainer_rejects_locked_units() {
        let catalog = Catalog::standard();
        let mut ledger = ResourceLedger::default();
        let mut barracks = finished(BuildingKind::Barracks, 1, &mut ledger);

        let giant = catalog.unit(UnitKind::Giant).unwrap();
        assert_eq!(
            barracks.train_unit(giant, &mut ledger),
            Err(GameError::LevelLocked {
                unit: UnitKind::Giant,
                required: 2,
                level: 1
            })
        );

        let barbarian = catalog.unit(UnitKind::Barbarian).unwrap();
        barracks.train_unit(barbarian, &mut ledger).unwrap();
        assert_eq!(barracks.training_queue().map(TrainingQueue::len), Some(1));
    }

    #[test]
    fn test_training_pauses_while_upgrading() {
        let catalog = Catalog::standard();
        let mut ledger = ResourceLedger::default();
        let mut barracks = finished(BuildingKind::Barracks, 1, &mut ledger);
        let barbarian = catalog.unit(UnitKind::Barbarian).unwrap();
        barracks.train_unit(barbarian, &mut ledger).unwrap();

        barracks.start_upgrade(&mut ledger).unwrap();
        assert_eq!(barracks.tick_training(fixed(10)), None);
        assert!(barracks.train_unit(barbarian, &mut ledger).is_err());
    }
}
