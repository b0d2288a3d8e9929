//! Battle replays.
//!
//! A replay stores the defending base, the seed and the time-stamped deploy
//! stream. Playing it back at the same step size recreates the battle.

use serde::{Deserialize, Serialize};

use crate::data::Catalog;
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, Fixed};
use crate::simulation::{BattleStats, DeployRecord, Simulation, SimulationConfig};
use crate::snapshot::BaseSnapshot;

/// Replay format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// A recorded battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleReplay {
    /// Replay format version.
    pub version: u32,
    /// RNG seed the battle ran with.
    pub seed: u64,
    /// Base at the start of the battle.
    pub base: BaseSnapshot,
    /// Deployments in battle-time order.
    pub deploys: Vec<DeployRecord>,
    /// Battle length in seconds.
    #[serde(with = "fixed_serde")]
    pub duration: Fixed,
    /// State hash at the end of playback, once finalized.
    pub final_hash: Option<u64>,
}

impl BattleReplay {
    /// Start a replay for a battle against `base`.
    #[must_use]
    pub fn new(seed: u64, base: BaseSnapshot) -> Self {
        Self {
            version: REPLAY_VERSION,
            seed,
            base,
            deploys: Vec::new(),
            duration: Fixed::ZERO,
            final_hash: None,
        }
    }

    /// Build a replay from a finished battle's statistics.
    #[must_use]
    pub fn from_battle(seed: u64, base: BaseSnapshot, stats: &BattleStats) -> Self {
        Self {
            deploys: stats.deploys.clone(),
            duration: stats.elapsed,
            ..Self::new(seed, base)
        }
    }

    /// Append a deploy record.
    pub fn record_deploy(&mut self, record: DeployRecord) {
        self.deploys.push(record);
    }

    /// Store the hash a correct playback must end with.
    pub fn finalize(&mut self, final_hash: u64) {
        self.final_hash = Some(final_hash);
    }

    /// Re-run the battle with steps of `dt` until `duration` has elapsed.
    ///
    /// Each deploy happens before the first step that starts at or after its
    /// recorded time.
    pub fn replay(
        &self,
        mut config: SimulationConfig,
        catalog: Catalog,
        dt: Fixed,
        duration: Fixed,
    ) -> Result<Simulation> {
        if self.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                self.version
            )));
        }
        if dt <= Fixed::ZERO {
            return Err(GameError::InvalidState(format!(
                "replay step must be positive, got {dt}"
            )));
        }

        config.seed = self.seed;
        let mut sim = Simulation::restore(config, catalog, &self.base)?;
        sim.begin_battle();

        let mut pending = self.deploys.iter().peekable();
        while sim.battle_stats().elapsed < duration {
            let now = sim.battle_stats().elapsed;
            while let Some(record) = pending.next_if(|r| r.time <= now) {
                sim.set_unit_level(record.unit, record.level);
                sim.deploy_unit(record.unit, record.position)?;
            }
            sim.tick(dt);
        }

        tracing::info!(
            deploys = self.deploys.len(),
            destroyed = sim.battle_stats().destroyed,
            "Replay finished"
        );
        Ok(sim)
    }

    /// Play the replay over its recorded duration and compare the final
    /// state hash.
    pub fn verify(&self, config: SimulationConfig, catalog: Catalog, dt: Fixed) -> Result<bool> {
        let expected = self
            .final_hash
            .ok_or_else(|| GameError::InvalidState("replay was never finalized".to_string()))?;
        let sim = self.replay(config, catalog, dt, self.duration)?;
        Ok(sim.state_hash() == expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BuildingKind, UnitKind};
    use crate::factions::FactionId;
    use crate::math::Vec2Fixed;

    fn step() -> Fixed {
        Fixed::from_num(0.25)
    }

    fn armed_base() -> BaseSnapshot {
        let mut sim = Simulation::default();
        sim.place_prebuilt(BuildingKind::Cannon, 1, 20, 20, FactionId::Defender)
            .unwrap();
        sim.place_prebuilt(BuildingKind::GoldMine, 1, 10, 20, FactionId::Defender)
            .unwrap();
        let barracks = sim
            .place_prebuilt(BuildingKind::Barracks, 1, 38, 38, FactionId::Attacker)
            .unwrap();
        for _ in 0..3 {
            sim.train_unit(barracks, UnitKind::Barbarian).unwrap();
        }
        for _ in 0..15 {
            sim.tick(Fixed::ONE);
        }
        sim.snapshot()
    }

    fn replay() -> BattleReplay {
        let mut replay = BattleReplay::new(9, armed_base());
        for (i, x) in [40, 60, 80].into_iter().enumerate() {
            replay.record_deploy(DeployRecord {
                time: Fixed::from_num(i),
                unit: UnitKind::Barbarian,
                level: 1,
                position: Vec2Fixed::from_ints(x, 60),
                cell: None,
            });
        }
        replay.duration = Fixed::from_num(20);
        replay
    }

    #[test]
    fn test_replay_deploys_every_record() {
        let sim = replay()
            .replay(SimulationConfig::default(), Catalog::standard(), step(), Fixed::from_num(20))
            .unwrap();
        assert_eq!(sim.battle_stats().deploys.len(), 3);
        assert_eq!(sim.units().count(), 3);
        assert_eq!(sim.battle_stats().elapsed, Fixed::from_num(20));
    }

    #[test]
    fn test_finalized_replay_verifies() {
        let mut replay = replay();
        let sim = replay
            .replay(SimulationConfig::default(), Catalog::standard(), step(), replay.duration)
            .unwrap();
        replay.finalize(sim.state_hash());

        assert_eq!(
            replay.verify(SimulationConfig::default(), Catalog::standard(), step()),
            Ok(true)
        );
    }

    #[test]
    fn test_unavailable_deploy_fails_playback() {
        let mut replay = replay();
        replay.record_deploy(DeployRecord {
            time: Fixed::from_num(5),
            unit: UnitKind::Dragon,
            level: 1,
            position: Vec2Fixed::from_ints(60, 60),
            cell: None,
        });
        let result =
            replay.replay(SimulationConfig::default(), Catalog::standard(), step(), Fixed::from_num(10));
        assert_eq!(result.err(), Some(GameError::NoUnitAvailable(UnitKind::Dragon)));
    }

    #[test]
    fn test_zero_step_is_rejected() {
        let result = replay().replay(
            SimulationConfig::default(),
            Catalog::standard(),
            Fixed::ZERO,
            Fixed::from_num(1),
        );
        assert!(matches!(result, Err(GameError::InvalidState(_))));
    }
}
