//! Full raids against a fixture base: deployment, destruction accounting,
//! reservation cleanup and replay of the recorded battle.

use outpost_core::buildings::BuildingState;
use outpost_core::data::{BuildingKind, UnitKind};
use outpost_core::economy::ResourceKind;
use outpost_core::error::GameError;
use outpost_core::factions::FactionId;
use outpost_core::math::Fixed;
use outpost_core::replay::BattleReplay;
use outpost_core::simulation::{Simulation, TICK_RATE};
use outpost_test_utils::fixtures::{defended_base, pos, quarter, stock_attacker_army};
use outpost_test_utils::init_tracing;

const SEED: u64 = 42;

fn run_until_quiet(sim: &mut Simulation, max_ticks: u32) {
    for _ in 0..max_ticks {
        sim.tick(quarter());
        if sim.units().all(|u| !u.is_alive()) {
            break;
        }
    }
}

#[test]
fn test_raid_accounting_stays_consistent() {
    init_tracing();
    let mut sim = defended_base(SEED);
    stock_attacker_army(&mut sim, UnitKind::Barbarian, 8);
    assert_eq!(sim.army(), vec![(UnitKind::Barbarian, 8)]);
    let population = sim.ledger().get(ResourceKind::Population);

    sim.begin_battle();
    // Town hall, two cannons, mine and storage; walls do not count.
    assert_eq!(sim.battle_stats().initial_buildings, 5);

    for x in [40, 80, 120, 160, 200, 240, 280, 320] {
        sim.deploy_unit(UnitKind::Barbarian, pos(x, 30)).unwrap();
    }
    assert!(sim.army().is_empty());
    assert_eq!(sim.ledger().get(ResourceKind::Population), population);
    assert_eq!(
        sim.deploy_unit(UnitKind::Barbarian, pos(40, 30)),
        Err(GameError::NoUnitAvailable(UnitKind::Barbarian))
    );

    run_until_quiet(&mut sim, 180 * TICK_RATE);
    let stats = sim.end_battle();

    assert!(!stats.active);
    assert_eq!(stats.deploys.len(), 8);
    assert!(stats.deploys.iter().all(|d| d.time == Fixed::ZERO));
    assert_eq!(stats.deploys[0].cell, Some((4, 3)));
    assert!(stats.destroyed <= stats.initial_buildings);
    assert!(stats.destruction_percent() <= 100);

    let rubble = sim
        .buildings()
        .filter(|b| b.faction == FactionId::Defender && b.state == BuildingState::Destroyed)
        .filter(|b| !b.kind().is_wall())
        .count() as u32;
    assert_eq!(rubble, stats.destroyed);

    for kind in ResourceKind::ALL {
        assert!(sim.ledger().get(kind) <= sim.ledger().cap(kind));
    }

    // Population is held only by units still standing.
    let held: u32 = sim
        .units()
        .filter(|u| u.is_alive())
        .map(|u| u.population)
        .sum();
    assert_eq!(sim.ledger().get(ResourceKind::Population), held);
}

#[test]
fn test_clearing_rubble_frees_cells() {
    let mut sim = defended_base(SEED);
    let mine = sim.building_at(12, 26).unwrap().id;
    assert!(sim.damage_building(mine, 1_000_000).unwrap().destroyed);
    assert_eq!(
        sim.place_building(BuildingKind::Cannon, 12, 26),
        Err(GameError::InvalidPlacement {
            x: 12,
            y: 26,
            width: 3,
            height: 3,
        })
    );

    sim.remove_building(mine).unwrap();
    assert!(sim.building(mine).is_none());
    sim.place_building(BuildingKind::Cannon, 12, 26).unwrap();
}

#[test]
fn test_recorded_raid_replays_exactly() {
    init_tracing();
    let mut sim = defended_base(SEED);
    stock_attacker_army(&mut sim, UnitKind::Barbarian, 4);
    let base = sim.snapshot();

    sim.begin_battle();
    for (i, x) in [60, 140, 220, 300].into_iter().enumerate() {
        sim.deploy_unit(UnitKind::Barbarian, pos(x, 30)).unwrap();
        for _ in 0..=i {
            sim.tick(quarter());
        }
    }
    for _ in 0..120 {
        sim.tick(quarter());
    }
    let stats = sim.end_battle();
    assert_eq!(stats.deploys.len(), 4);

    let mut replay = BattleReplay::from_battle(SEED, base, &stats);
    assert_eq!(replay.duration, stats.elapsed);

    let first = replay
        .replay(*sim.config(), sim.catalog().clone(), quarter(), replay.duration)
        .unwrap();
    assert_eq!(first.battle_stats().deploys, stats.deploys);
    replay.finalize(first.state_hash());

    assert_eq!(
        replay.verify(*sim.config(), sim.catalog().clone(), quarter()),
        Ok(true)
    );
}
