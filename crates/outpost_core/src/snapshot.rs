//! Plain-data base snapshots for save slots.
//!
//! The core picks no encoding; every structure derives serde traits and an
//! external serializer decides how to store them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::buildings::{Building, BuildingRole, BuildingState, Site};
use crate::components::Cost;
use crate::data::{BuildingKind, Catalog, RoleData, UnitKind};
use crate::economy::LedgerSnapshot;
use crate::error::{GameError, Result};
use crate::factions::FactionId;
use crate::math::{fixed_serde, Fixed};
use crate::simulation::{Simulation, SimulationConfig};
use crate::training::{ReadyUnit, TrainingEntry, TrainingQueue};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 2;

/// One standing building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingRecord {
    /// Building type.
    pub kind: BuildingKind,
    /// Owning side.
    pub faction: FactionId,
    /// Current level.
    pub level: u8,
    /// Origin column.
    pub x: i32,
    /// Origin row.
    pub y: i32,
    /// Current hit points.
    pub health: u32,
    /// Lifecycle state; never Destroyed.
    pub state: BuildingState,
    /// Seconds of construction or upgrade work done.
    #[serde(with = "fixed_serde")]
    pub work_done: Fixed,
    /// Seconds the current construction or upgrade needs.
    #[serde(with = "fixed_serde")]
    pub work_total: Fixed,
    /// Price paid for the current construction or upgrade.
    pub invested: Cost,
    /// Uncollected production.
    #[serde(default)]
    pub stored: u32,
    /// Seconds of production banked toward the next payout.
    #[serde(default, with = "fixed_serde")]
    pub timer: Fixed,
    /// Queued training, head first.
    #[serde(default)]
    pub training: Vec<TrainingEntry>,
    /// Trained units waiting to deploy from this building.
    #[serde(default)]
    pub ready: Vec<ReadyUnit>,
}

impl BuildingRecord {
    fn capture(building: &Building) -> Self {
        let (stored, timer) = match &building.role {
            BuildingRole::Production(producer) => (producer.stored, producer.timer),
            _ => (0, Fixed::ZERO),
        };
        let (training, ready) = match &building.role {
            BuildingRole::Trainer(queue) => {
                (queue.entries().cloned().collect(), queue.ready().to_vec())
            }
            _ => (Vec::new(), Vec::new()),
        };
        Self {
            kind: building.kind(),
            faction: building.faction,
            level: building.level,
            x: building.site.x,
            y: building.site.y,
            health: building.health.current,
            state: building.state,
            work_done: building.work_done,
            work_total: building.work_total,
            invested: building.invested,
            stored,
            timer,
            training,
            ready,
        }
    }
}

/// Everything needed to rebuild a base between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseSnapshot {
    /// Format version, [`SNAPSHOT_VERSION`] when written.
    pub version: u32,
    /// Ledger pools, with the reservations of the captured buildings only.
    pub ledger: LedgerSnapshot,
    /// Standing buildings in ID order.
    pub buildings: Vec<BuildingRecord>,
    /// Per-kind unit levels.
    pub unit_levels: BTreeMap<UnitKind, u8>,
}

impl BaseSnapshot {
    /// Ready units across every captured trainer, counted per kind.
    #[must_use]
    pub fn army(&self) -> Vec<(UnitKind, u32)> {
        let mut counts: BTreeMap<UnitKind, u32> = BTreeMap::new();
        for ready in self.buildings.iter().flat_map(|record| &record.ready) {
            *counts.entry(ready.unit).or_default() += 1;
        }
        counts.into_iter().collect()
    }
}

impl Simulation {
    /// Capture the base as plain data. Rubble, units and projectiles are not
    /// part of a base snapshot.
    ///
    /// Population held by deployed units leaves with them: the captured
    /// ledger only counts what the captured buildings reserve.
    #[must_use]
    pub fn snapshot(&self) -> BaseSnapshot {
        let mut ledger = self.ledger.snapshot();
        let deployed: u32 = self.units.values().map(|unit| unit.population).sum();
        ledger.population.amount = ledger.population.amount.saturating_sub(deployed);

        BaseSnapshot {
            version: SNAPSHOT_VERSION,
            ledger,
            buildings: self
                .buildings
                .values()
                .filter(|b| !b.is_destroyed())
                .map(BuildingRecord::capture)
                .collect(),
            unit_levels: self.unit_levels.clone(),
        }
    }

    /// Rebuild a simulation from a snapshot.
    ///
    /// The ledger is restored last and verbatim, so capacity contributions
    /// and reservations held by the restored buildings are not applied a
    /// second time. Ready units return to the trainer that made them.
    pub fn restore(
        config: SimulationConfig,
        catalog: Catalog,
        snapshot: &BaseSnapshot,
    ) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(GameError::InvalidState(format!(
                "snapshot version mismatch: expected {SNAPSHOT_VERSION}, got {}",
                snapshot.version
            )));
        }

        let mut sim = Self::new(config, catalog);
        for record in &snapshot.buildings {
            sim.restore_building(record)?;
        }

        sim.unit_levels = snapshot.unit_levels.clone();
        sim.ledger.restore(&snapshot.ledger);
        sim.ledger.flush();
        tracing::debug!(buildings = snapshot.buildings.len(), "Base restored");
        Ok(sim)
    }

    fn restore_building(&mut self, record: &BuildingRecord) -> Result<()> {
        if record.state == BuildingState::Destroyed {
            return Err(GameError::InvalidState(format!(
                "snapshot holds a destroyed {:?}",
                record.kind
            )));
        }
        let data = self.catalog.building(record.kind)?.clone();
        if !self.grid.can_place(record.x, record.y, data.footprint) {
            return Err(GameError::InvalidPlacement {
                x: record.x,
                y: record.y,
                width: data.footprint.width,
                height: data.footprint.height,
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        self.grid.occupy(record.x, record.y, data.footprint, id);
        let site = Site::on_grid(&self.grid, record.x, record.y, data.footprint);
        let mut building = Building::prebuilt(id, &data, record.level, record.faction, site);

        building.health.current = record.health.min(building.health.max);
        building.state = record.state;
        building.work_done = record.work_done;
        building.work_total = record.work_total;
        building.invested = record.invested;
        building.holds_worker = matches!(
            record.state,
            BuildingState::UnderConstruction | BuildingState::Upgrading
        );

        if !record.ready.is_empty() && building.training_queue().is_none() {
            return Err(GameError::InvalidState(format!(
                "snapshot holds ready units on a {:?}",
                record.kind
            )));
        }
        match (&mut building.role, &data.role) {
            (BuildingRole::Production(producer), _) => {
                producer.stored = record.stored;
                producer.timer = record.timer;
            }
            (BuildingRole::Storage(provider), RoleData::Storage(storage)) => {
                if record.state != BuildingState::UnderConstruction {
                    provider.contributed = storage.capacity_at(building.level);
                }
            }
            (BuildingRole::Trainer(queue), _) => {
                *queue = TrainingQueue::from_parts(record.training.clone(), record.ready.clone());
            }
            _ => {}
        }

        self.buildings.insert(id, building);
        Ok(())
    }
}
