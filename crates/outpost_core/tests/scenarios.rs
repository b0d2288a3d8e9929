//! End-to-end checks of the documented economy, combat and training
//! scenarios, driven through the public simulation API.

use outpost_core::combat::CombatEvent;
use outpost_core::components::Cost;
use outpost_core::data::{BuildingKind, Catalog, RoleData, UnitKind};
use outpost_core::economy::{ResourceKind, ResourceLedger};
use outpost_core::error::GameError;
use outpost_core::factions::FactionId;
use outpost_core::math::Fixed;
use outpost_core::simulation::{Simulation, SimulationConfig};
use outpost_test_utils::fixtures::{fixed, pos, quarter};
use outpost_test_utils::init_tracing;

// =============================================================================
// Economy
// =============================================================================

#[test]
fn test_consume_more_than_held_changes_nothing() {
    let mut ledger = ResourceLedger::default();
    assert_eq!(ledger.get(ResourceKind::Gold), 500);

    let result = ledger.consume(ResourceKind::Gold, 600);
    assert_eq!(
        result,
        Err(GameError::InsufficientResources {
            resource: ResourceKind::Gold,
            required: 600,
            available: 500,
        })
    );
    assert_eq!(ledger.get(ResourceKind::Gold), 500);
    assert!(ledger.pending_events().is_empty());
}

#[test]
fn test_storage_capacity_follows_level_and_destruction() {
    init_tracing();
    let mut sim = Simulation::default();
    let storage = sim
        .place_prebuilt(BuildingKind::GoldStorage, 3, 10, 10, FactionId::Defender)
        .unwrap();
    assert_eq!(sim.ledger().cap(ResourceKind::Gold), 1000 + 2250);

    sim.ledger_mut().set(ResourceKind::Gold, 3000);
    let report = sim.damage_building(storage, 100_000).unwrap();
    assert!(report.destroyed);
    assert_eq!(sim.ledger().cap(ResourceKind::Gold), 1000);
    assert_eq!(sim.ledger().get(ResourceKind::Gold), 1000);
}

#[test]
fn test_destroyed_builder_hut_takes_its_worker_with_it() {
    init_tracing();
    let mut sim = Simulation::default();
    let hut = sim
        .place_prebuilt(BuildingKind::BuilderHut, 1, 0, 0, FactionId::Defender)
        .unwrap();
    assert_eq!(sim.ledger().cap(ResourceKind::Workers), 3);

    sim.ledger_mut().raise_cap(ResourceKind::Gold, 1000);
    sim.ledger_mut().set(ResourceKind::Gold, 2000);
    for x in [10, 14, 18] {
        sim.place_building(BuildingKind::Cannon, x, 10).unwrap();
    }
    assert_eq!(sim.ledger().get(ResourceKind::Workers), 3);

    assert!(sim.damage_building(hut, 100_000).unwrap().destroyed);
    assert_eq!(sim.ledger().cap(ResourceKind::Workers), 2);
    assert_eq!(sim.ledger().available(ResourceKind::Workers), 0);

    for _ in 0..20 {
        sim.tick(fixed(1));
    }
    assert_eq!(sim.ledger().get(ResourceKind::Workers), 0);
    assert_eq!(sim.ledger().cap(ResourceKind::Workers), 2);
    assert_eq!(sim.ledger().available(ResourceKind::Workers), 2);
}

#[test]
fn test_destroyed_army_camp_housing_stays_gone_after_release() {
    init_tracing();
    let mut sim = Simulation::default();
    let camp = sim
        .place_prebuilt(BuildingKind::ArmyCamp, 1, 10, 10, FactionId::Defender)
        .unwrap();
    assert_eq!(sim.ledger().cap(ResourceKind::Population), 40);
    sim.ledger_mut().use_population(30).unwrap();

    assert!(sim.damage_building(camp, 100_000).unwrap().destroyed);
    assert_eq!(sim.ledger().cap(ResourceKind::Population), 20);
    assert!(sim.ledger_mut().use_population(1).is_err());

    sim.ledger_mut().release_population(30);
    assert_eq!(sim.ledger().get(ResourceKind::Population), 0);
    assert_eq!(sim.ledger().cap(ResourceKind::Population), 20);
}

// =============================================================================
// Combat
// =============================================================================

fn long_range_catalog() -> Catalog {
    let mut catalog = Catalog::standard();
    if let Some(cannon) = catalog.building_mut(BuildingKind::Cannon) {
        if let RoleData::Defense(defense) = &mut cannon.role {
            defense.range = fixed(250);
        }
    }
    catalog
}

#[test]
fn test_defense_ignores_units_out_of_range() {
    init_tracing();
    let mut sim = Simulation::new(SimulationConfig::default(), long_range_catalog());
    // Centre of a 3x3 footprint at (10, 10) is (115, 115).
    sim.place_prebuilt(BuildingKind::Cannon, 1, 10, 10, FactionId::Defender)
        .unwrap();
    let far = sim
        .spawn_unit(UnitKind::Giant, 1, pos(415, 115), FactionId::Attacker)
        .unwrap();

    for _ in 0..8 {
        let events = sim.tick(quarter());
        assert!(!events
            .combat
            .iter()
            .any(|e| matches!(e, CombatEvent::ProjectileSpawned { .. })));
    }
    assert!(sim.projectiles().is_empty());

    sim.remove_unit(far);
    let near = sim
        .spawn_unit(UnitKind::Giant, 1, pos(315, 115), FactionId::Attacker)
        .unwrap();
    let events = sim.tick(quarter());

    assert!(events.combat.iter().any(|e| matches!(
        e,
        CombatEvent::ProjectileSpawned { target, .. } if *target == near
    )));
    assert_eq!(sim.projectiles().len(), 1);
    assert_eq!(sim.projectiles()[0].target, near);
}

// =============================================================================
// Training
// =============================================================================

#[test]
fn test_full_queue_rejects_without_touching_ledger() {
    let mut sim = Simulation::default();
    let barracks = sim
        .place_prebuilt(BuildingKind::Barracks, 1, 10, 10, FactionId::Defender)
        .unwrap();
    assert_eq!(sim.building(barracks).unwrap().queue_capacity(), Some(6));

    for _ in 0..6 {
        sim.train_unit(barracks, UnitKind::Barbarian).unwrap();
    }
    let before = sim.ledger().snapshot();

    assert_eq!(
        sim.train_unit(barracks, UnitKind::Barbarian),
        Err(GameError::QueueFull { capacity: 6 })
    );
    assert_eq!(sim.ledger().snapshot(), before);
    assert_eq!(sim.ledger().get(ResourceKind::Elixir), 350);
    assert_eq!(sim.ledger().get(ResourceKind::Population), 6);
}

#[test]
fn test_cancelling_head_refunds_remaining_share() {
    let mut catalog = Catalog::standard();
    if let Some(barbarian) = catalog.unit_mut(UnitKind::Barbarian) {
        barbarian.cost = Cost::new(100, 200);
    }
    let mut sim = Simulation::new(SimulationConfig::default(), catalog);
    let barracks = sim
        .place_prebuilt(BuildingKind::Barracks, 1, 10, 10, FactionId::Defender)
        .unwrap();
    sim.train_unit(barracks, UnitKind::Barbarian).unwrap();
    assert_eq!(sim.ledger().get(ResourceKind::Gold), 400);
    assert_eq!(sim.ledger().get(ResourceKind::Elixir), 300);

    // Five seconds to train; two elapsed is 40%.
    sim.tick(Fixed::ONE);
    sim.tick(Fixed::ONE);
    let head = sim
        .building(barracks)
        .and_then(|b| b.training_queue())
        .and_then(|q| q.head())
        .unwrap();
    assert_eq!(head.elapsed, fixed(2));

    let refund = sim.cancel_training(barracks, 0).unwrap();
    assert_eq!(refund, Cost::new(30, 60));
    assert_eq!(sim.ledger().get(ResourceKind::Gold), 430);
    assert_eq!(sim.ledger().get(ResourceKind::Elixir), 360);
    assert_eq!(sim.ledger().get(ResourceKind::Population), 0);
}

#[test]
fn test_cancel_bad_index_is_reported() {
    let mut sim = Simulation::default();
    let barracks = sim
        .place_prebuilt(BuildingKind::Barracks, 1, 10, 10, FactionId::Defender)
        .unwrap();
    assert_eq!(
        sim.cancel_training(barracks, 0),
        Err(GameError::InvalidIndex(0))
    );
}
