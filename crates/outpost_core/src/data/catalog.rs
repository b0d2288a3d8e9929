//! Lookup tables of building and unit definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::building_data::{
    BuildingData, BuildingKind, DefenseData, ProductionData, RoleData, StorageData, TrainerData,
};
use super::unit_data::{UnitData, UnitKind};
use crate::combat::{TargetPriority, Trajectory};
use crate::components::Cost;
use crate::economy::ResourceKind;
use crate::error::{GameError, Result};
use crate::grid::Footprint;
use crate::math::Fixed;

/// On-disk shape of a catalog: two flat lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogData {
    /// Building definitions.
    #[serde(default)]
    pub buildings: Vec<BuildingData>,
    /// Unit definitions.
    #[serde(default)]
    pub units: Vec<UnitData>,
}

/// Every building and unit definition available to a simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    buildings: BTreeMap<BuildingKind, BuildingData>,
    units: BTreeMap<UnitKind, UnitData>,
}

impl Catalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from RON text.
    ///
    /// Later entries replace earlier ones of the same kind.
    pub fn from_ron(source_name: &str, text: &str) -> Result<Self> {
        let data: CatalogData = ron::from_str(text).map_err(|e| GameError::DataParseError {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!(
            source = source_name,
            buildings = data.buildings.len(),
            units = data.units.len(),
            "Loaded catalog"
        );
        Ok(Self::from_data(data))
    }

    /// Build a catalog from plain lists.
    #[must_use]
    pub fn from_data(data: CatalogData) -> Self {
        let mut catalog = Self::new();
        for building in data.buildings {
            catalog.insert_building(building);
        }
        for unit in data.units {
            catalog.insert_unit(unit);
        }
        catalog
    }

    /// Flatten back into lists, ordered by kind.
    #[must_use]
    pub fn to_data(&self) -> CatalogData {
        CatalogData {
            buildings: self.buildings.values().cloned().collect(),
            units: self.units.values().cloned().collect(),
        }
    }

    /// Add or replace a building definition.
    pub fn insert_building(&mut self, data: BuildingData) {
        self.buildings.insert(data.kind, data);
    }

    /// Add or replace a unit definition.
    pub fn insert_unit(&mut self, data: UnitData) {
        self.units.insert(data.kind, data);
    }

    /// Definition of a building kind.
    pub fn building(&self, kind: BuildingKind) -> Result<&BuildingData> {
        self.buildings
            .get(&kind)
            .ok_or_else(|| GameError::UnknownBlueprint(format!("{kind:?}")))
    }

    /// Definition of a unit kind.
    pub fn unit(&self, kind: UnitKind) -> Result<&UnitData> {
        self.units
            .get(&kind)
            .ok_or_else(|| GameError::UnknownBlueprint(format!("{kind:?}")))
    }

    /// Mutable definition of a building kind, for tuning in tests and tools.
    pub fn building_mut(&mut self, kind: BuildingKind) -> Option<&mut BuildingData> {
        self.buildings.get_mut(&kind)
    }

    /// Mutable definition of a unit kind.
    pub fn unit_mut(&mut self, kind: UnitKind) -> Option<&mut UnitData> {
        self.units.get_mut(&kind)
    }

    /// All building definitions in kind order.
    pub fn buildings(&self) -> impl Iterator<Item = &BuildingData> {
        self.buildings.values()
    }

    /// All unit definitions in kind order.
    pub fn units(&self) -> impl Iterator<Item = &UnitData> {
        self.units.values()
    }

    /// The built-in content set.
    #[must_use]
    pub fn standard() -> Self {
        Self::from_data(CatalogData {
            buildings: standard_buildings(),
            units: standard_units(),
        })
    }
}

fn fx(value: f64) -> Fixed {
    Fixed::from_num(value)
}

fn building(
    kind: BuildingKind,
    cost: Cost,
    build_time: f64,
    health: u32,
    max_level: u8,
    footprint: u32,
    role: RoleData,
) -> BuildingData {
    BuildingData {
        kind,
        cost,
        build_time: fx(build_time),
        upgrade_time: fx(build_time * 2.0),
        health,
        health_growth: fx(0.2),
        max_level,
        footprint: Footprint::square(footprint),
        refund_rate: fx(0.5),
        role,
    }
}

fn defense(
    damage: u32,
    range: f64,
    attack_speed: f64,
    trajectory: Trajectory,
    projectile_speed: f64,
) -> DefenseData {
    DefenseData {
        damage,
        damage_growth: fx(0.25),
        range: fx(range),
        attack_speed: fx(attack_speed),
        damage_radius: Fixed::ZERO,
        trajectory,
        projectile_speed: fx(projectile_speed),
        can_attack_air: false,
        can_attack_ground: true,
        priority: TargetPriority::Nearest,
    }
}

fn production(resource: ResourceKind) -> RoleData {
    RoleData::Production(ProductionData {
        resource,
        rate: fx(1.5),
        rate_growth: fx(0.5),
        storage: 500,
        storage_growth: fx(0.5),
        loss_fraction: fx(0.5),
    })
}

fn storage(resource: ResourceKind, capacity: u32, growth: f64, loss: f64) -> RoleData {
    RoleData::Storage(StorageData {
        resource,
        capacity,
        capacity_growth: fx(growth),
        loss_fraction: fx(loss),
    })
}

fn standard_buildings() -> Vec<BuildingData> {
    use BuildingKind as K;

    let mortar = DefenseData {
        damage_radius: fx(15.0),
        ..defense(
            40,
            110.0,
            0.2,
            Trajectory::Parabolic {
                max_height: fx(60.0),
            },
            150.0,
        )
    };
    let archer_tower = DefenseData {
        can_attack_air: true,
        ..defense(12, 100.0, 2.0, Trajectory::Tracking, 250.0)
    };
    let air_defense = DefenseData {
        can_attack_air: true,
        can_attack_ground: false,
        priority: TargetPriority::LowestHp,
        ..defense(80, 100.0, 1.0, Trajectory::Tracking, 200.0)
    };

    let mut wall = building(K::Wall, Cost::gold(50), 0.0, 300, 5, 1, RoleData::Passive);
    wall.health_growth = fx(0.5);
    let mut builder_hut = building(
        K::BuilderHut,
        Cost::gold(250),
        0.0,
        250,
        1,
        2,
        storage(ResourceKind::Workers, 1, 0.0, 0.0),
    );
    builder_hut.refund_rate = Fixed::ZERO;

    vec![
        building(K::TownHall, Cost::gold(1000), 60.0, 1500, 5, 4, RoleData::Passive),
        building(
            K::Cannon,
            Cost::gold(250),
            10.0,
            420,
            5,
            3,
            RoleData::Defense(defense(20, 90.0, 1.25, Trajectory::Straight, 300.0)),
        ),
        building(
            K::ArcherTower,
            Cost::gold(600),
            15.0,
            380,
            5,
            3,
            RoleData::Defense(archer_tower),
        ),
        building(K::Mortar, Cost::gold(900), 30.0, 400, 5, 3, RoleData::Defense(mortar)),
        building(
            K::AirDefense,
            Cost::gold(900),
            30.0,
            800,
            5,
            3,
            RoleData::Defense(air_defense),
        ),
        building(
            K::GoldMine,
            Cost::elixir(150),
            10.0,
            400,
            5,
            3,
            production(ResourceKind::Gold),
        ),
        building(
            K::ElixirCollector,
            Cost::gold(150),
            10.0,
            400,
            5,
            3,
            production(ResourceKind::Elixir),
        ),
        building(
            K::GoldStorage,
            Cost::elixir(300),
            20.0,
            600,
            5,
            3,
            storage(ResourceKind::Gold, 1500, 0.25, 0.2),
        ),
        building(
            K::ElixirStorage,
            Cost::gold(300),
            20.0,
            600,
            5,
            3,
            storage(ResourceKind::Elixir, 1500, 0.25, 0.2),
        ),
        building(
            K::Barracks,
            Cost::elixir(200),
            15.0,
            250,
            5,
            3,
            RoleData::Trainer(TrainerData {
                base_queue: 5,
                units: vec![
                    UnitKind::Barbarian,
                    UnitKind::Archer,
                    UnitKind::Giant,
                    UnitKind::Goblin,
                    UnitKind::Wizard,
                    UnitKind::Balloon,
                    UnitKind::Dragon,
                ],
            }),
        ),
        building(
            K::ArmyCamp,
            Cost::elixir(250),
            20.0,
            250,
            5,
            4,
            storage(ResourceKind::Population, 20, 0.5, 0.0),
        ),
        builder_hut,
        wall,
    ]
}

fn unit(
    kind: UnitKind,
    elixir: u32,
    housing: u32,
    train_time: f64,
    health: u32,
    move_speed: f64,
    damage: u32,
    attack_range: f64,
    attack_speed: f64,
    is_air: bool,
    priority: TargetPriority,
    unlock_level: u8,
) -> UnitData {
    UnitData {
        kind,
        cost: Cost::elixir(elixir),
        housing,
        train_time: fx(train_time),
        health,
        health_growth: fx(0.1),
        move_speed: fx(move_speed),
        damage,
        damage_growth: fx(0.1),
        attack_range: fx(attack_range),
        attack_speed: fx(attack_speed),
        is_air,
        priority,
        unlock_level,
    }
}

fn standard_units() -> Vec<UnitData> {
    use TargetPriority as P;
    use UnitKind as U;

    vec![
        unit(U::Barbarian, 25, 1, 5.0, 45, 16.0, 8, 4.0, 1.0, false, P::Nearest, 1),
        unit(U::Archer, 50, 1, 6.0, 20, 24.0, 7, 35.0, 1.0, false, P::Nearest, 1),
        unit(U::Giant, 250, 5, 30.0, 300, 12.0, 11, 4.0, 0.5, false, P::DefenseFirst, 2),
        unit(U::Goblin, 25, 1, 7.0, 25, 32.0, 11, 4.0, 1.0, false, P::ResourceFirst, 2),
        unit(U::Wizard, 150, 4, 20.0, 75, 16.0, 50, 30.0, 0.625, false, P::Nearest, 3),
        unit(U::Balloon, 175, 5, 25.0, 150, 10.0, 25, 4.0, 0.25, true, P::DefenseFirst, 4),
        unit(U::Dragon, 500, 20, 60.0, 1900, 16.0, 140, 15.0, 0.8, true, P::Nearest, 5),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_is_complete() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.buildings().count(), 13);
        assert_eq!(catalog.units().count(), 7);

        let barracks = catalog.building(BuildingKind::Barracks).unwrap();
        let RoleData::Trainer(trainer) = &barracks.role else {
            panic!("barracks should train units");
        };
        for kind in &trainer.units {
            assert!(catalog.unit(*kind).is_ok());
        }
    }

    #[test]
    fn test_catalog_ron_roundtrip() {
        let catalog = Catalog::standard();
        let text = ron::to_string(&catalog.to_data()).unwrap();
        let parsed = Catalog::from_ron("standard", &text).unwrap();
        assert_eq!(parsed, catalog);
    }

    #[test]
    fn test_catalog_from_hand_written_ron() {
        let text = r"(
            buildings: [
                (
                    kind: GoldStorage,
                    cost: (elixir: 300),
                    build_time: 20.0,
                    upgrade_time: 30.0,
                    health: 600,
                    health_growth: 0.2,
                    max_level: 5,
                    footprint: (width: 3, height: 3),
                    role: Storage((resource: Gold, capacity: 1500, capacity_growth: 0.25)),
                ),
            ],
            units: [
                (
                    kind: Archer,
                    cost: (elixir: 50),
                    housing: 1,
                    train_time: 6.0,
                    health: 20,
                    move_speed: 24.0,
                    damage: 7,
                    attack_range: 35.0,
                    attack_speed: 1.0,
                ),
            ],
        )";
        let catalog = Catalog::from_ron("inline", text).unwrap();

        let storage = catalog.building(BuildingKind::GoldStorage).unwrap();
        assert_eq!(storage.refund_rate, Fixed::from_num(0.5));
        assert_eq!(storage.max_health(1), 600);

        let archer = catalog.unit(UnitKind::Archer).unwrap();
        assert_eq!(archer.unlock_level, 1);
        assert_eq!(archer.priority, TargetPriority::Nearest);
        assert!(catalog.unit(UnitKind::Dragon).is_err());
    }

    #[test]
    fn test_catalog_parse_error() {
        let result = Catalog::from_ron("broken", "(buildings: [ (kind: Nope) ])");
        assert!(matches!(
            result,
            Err(GameError::DataParseError { ref source_name, .. }) if source_name == "broken"
        ));
    }
}
