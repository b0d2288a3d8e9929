//! Test fixtures and helpers.
//!
//! Pre-built bases and battle setups for consistent testing.

use fixed::types::I32F32;
use outpost_core::components::EntityId;
use outpost_core::data::{BuildingKind, UnitKind};
use outpost_core::factions::FactionId;
use outpost_core::math::{Fixed, Vec2Fixed};
use outpost_core::simulation::{Simulation, SimulationConfig};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Step size used by fixture battles: a quarter second.
#[must_use]
pub fn quarter() -> Fixed {
    Fixed::from_num(0.25)
}

/// Position in world units.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// A small finished defender base on the standard catalog.
///
/// Layout: town hall at (18,18), cannons at (12,12) and (26,26), a gold
/// mine at (12,26) and a gold storage at (26,12), plus a short wall.
#[must_use]
pub fn defended_base(seed: u64) -> Simulation {
    let config = SimulationConfig {
        seed,
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(config, outpost_core::data::Catalog::standard());
    let layout = [
        (BuildingKind::TownHall, 18, 18),
        (BuildingKind::Cannon, 12, 12),
        (BuildingKind::Cannon, 26, 26),
        (BuildingKind::GoldMine, 12, 26),
        (BuildingKind::GoldStorage, 26, 12),
        (BuildingKind::Wall, 16, 16),
        (BuildingKind::Wall, 17, 16),
    ];
    for (kind, x, y) in layout {
        if let Err(err) = sim.place_prebuilt(kind, 1, x, y, FactionId::Defender) {
            panic!("fixture layout rejected {kind:?} at ({x}, {y}): {err}");
        }
    }
    sim
}

/// Add an attacker barracks in the corner and fill it with `count` ready
/// units of `kind`. Returns the barracks ID.
///
/// The ledger is topped up so training never runs short.
pub fn stock_attacker_army(sim: &mut Simulation, kind: UnitKind, count: u32) -> EntityId {
    let barracks = match sim.place_prebuilt(BuildingKind::Barracks, 5, 38, 38, FactionId::Attacker)
    {
        Ok(id) => id,
        Err(err) => panic!("no room for the attacker barracks: {err}"),
    };
    for _ in 0..count {
        let ledger = sim.ledger_mut();
        ledger.set_cap(outpost_core::economy::ResourceKind::Elixir, 100_000);
        ledger.set(outpost_core::economy::ResourceKind::Elixir, 100_000);
        ledger.set_cap(outpost_core::economy::ResourceKind::Population, 1_000);
        if let Err(err) = sim.train_unit(barracks, kind) {
            panic!("fixture could not train {kind:?}: {err}");
        }
        while sim
            .building(barracks)
            .and_then(|b| b.training_queue())
            .is_some_and(|q| !q.is_empty())
        {
            sim.tick(Fixed::ONE);
        }
    }
    barracks
}

/// A defended base with barbarians deployed along its south edge and the
/// battle started.
#[must_use]
pub fn barbarian_raid(seed: u64) -> Simulation {
    let mut sim = defended_base(seed);
    stock_attacker_army(&mut sim, UnitKind::Barbarian, 6);
    sim.begin_battle();
    for x in [60, 120, 180, 240, 300, 360] {
        if let Err(err) = sim.deploy_unit(UnitKind::Barbarian, pos(x, 30)) {
            panic!("fixture deploy failed: {err}");
        }
    }
    sim
}
