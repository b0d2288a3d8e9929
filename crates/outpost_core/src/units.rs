//! Mobile combat units and their AI state machine.
//!
//! ```text
//! Idle --target found--> Moving --in range--> Attacking
//!  ^                                              |
//!  +------------- target destroyed/gone ----------+
//! any state --hit points reach 0--> Dead
//! ```
//!
//! Units move in straight lines and strike their target directly; they
//! never hold a reference to the building, only its ID.

use serde::{Deserialize, Serialize};

use crate::combat::{cooldown_ready, select_unit_target, TargetCandidate, TargetPriority};
use crate::components::{EntityId, Health};
use crate::data::{UnitData, UnitKind};
use crate::economy::ResourceLedger;
use crate::error::{GameError, Result};
use crate::factions::FactionId;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// AI state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitState {
    /// No target.
    #[default]
    Idle,
    /// Walking toward the target.
    Moving,
    /// In range and hitting the target.
    Attacking,
    /// Terminal.
    Dead,
}

/// A direct hit produced by a unit's AI step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitStrike {
    /// Unit that struck.
    pub attacker: EntityId,
    /// Building struck.
    pub target: EntityId,
    /// Damage to apply.
    pub damage: u32,
}

/// A deployed combat unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Entity ID.
    pub id: EntityId,
    /// Unit type.
    pub kind: UnitKind,
    /// Owning side.
    pub faction: FactionId,
    /// Level used for stat scaling.
    pub level: u8,
    /// Hit points.
    pub health: Health,
    /// Current position.
    pub position: Vec2Fixed,
    /// World units per second.
    #[serde(with = "fixed_serde")]
    pub move_speed: Fixed,
    /// Damage per hit.
    pub damage: u32,
    /// Reach to the target's edge.
    #[serde(with = "fixed_serde")]
    pub attack_range: Fixed,
    /// Seconds between hits.
    #[serde(with = "fixed_serde")]
    pub attack_interval: Fixed,
    /// Flying unit.
    pub is_air: bool,
    /// Target ranking policy.
    pub priority: TargetPriority,
    /// AI state.
    pub state: UnitState,
    /// Building being pursued.
    pub target: Option<EntityId>,
    /// Seconds until the next hit is allowed.
    #[serde(with = "fixed_serde")]
    pub cooldown: Fixed,
    /// Population still held by this unit; released once on death.
    pub population: u32,
}

impl Unit {
    /// Create a unit at `position` with stats for `level`.
    ///
    /// `population` is the housing this unit carries over from training, or
    /// zero for units spawned without a reservation.
    #[must_use]
    pub fn spawn(
        id: EntityId,
        data: &UnitData,
        level: u8,
        position: Vec2Fixed,
        faction: FactionId,
        population: u32,
    ) -> Self {
        let level = level.max(1);
        Self {
            id,
            kind: data.kind,
            faction,
            level,
            health: Health::new(data.health_at(level)),
            position,
            move_speed: data.move_speed,
            damage: data.damage_at(level),
            attack_range: data.attack_range,
            attack_interval: data.cooldown(),
            is_air: data.is_air,
            priority: data.priority,
            state: UnitState::Idle,
            target: None,
            cooldown: Fixed::ZERO,
            population,
        }
    }

    /// Whether the unit is still simulated.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state != UnitState::Dead
    }

    /// This unit as a point-sized target for defences.
    #[must_use]
    pub fn as_candidate(&self) -> TargetCandidate {
        TargetCandidate::unit(self.id, self.position, self.health, self.is_air)
    }

    fn lose_target(&mut self) {
        self.target = None;
        self.state = UnitState::Idle;
    }

    /// Run one AI step of `dt` seconds.
    ///
    /// `candidates` are the hostile buildings still standing, in ascending ID
    /// order. Returns a strike when the attack cooldown allows one.
    pub fn think(&mut self, dt: Fixed, candidates: &[TargetCandidate]) -> Option<UnitStrike> {
        if !self.is_alive() {
            return None;
        }

        let mut current = self
            .target
            .and_then(|id| candidates.iter().find(|c| c.id == id));
        if self.target.is_some() && current.is_none() {
            tracing::debug!(unit = self.id, "Target lost");
            self.lose_target();
        }

        if self.state == UnitState::Idle {
            let id = select_unit_target(self.priority, self.position, candidates)?;
            current = candidates.iter().find(|c| c.id == id);
            self.target = Some(id);
            self.state = UnitState::Moving;
            tracing::debug!(unit = self.id, target = id, "Target acquired");
        }
        let target = current?;

        if self.state == UnitState::Moving {
            if target.distance_from(self.position) > self.attack_range {
                let step = self.move_speed.saturating_mul(dt);
                self.position = self.position.move_towards(target.position, step);
            }
            if target.distance_from(self.position) <= self.attack_range {
                self.state = UnitState::Attacking;
            }
            return None;
        }

        if target.distance_from(self.position) > self.attack_range {
            self.state = UnitState::Moving;
            return None;
        }
        if !cooldown_ready(&mut self.cooldown, dt) {
            return None;
        }
        self.cooldown = self.attack_interval;
        Some(UnitStrike {
            attacker: self.id,
            target: target.id,
            damage: self.damage,
        })
    }

    /// Apply damage, returning remaining hit points.
    ///
    /// Reaching zero kills the unit and returns its population to the
    /// ledger; a dead unit rejects further damage.
    pub fn take_damage(&mut self, amount: u32, ledger: &mut ResourceLedger) -> Result<u32> {
        if !self.is_alive() {
            return Err(GameError::InvalidTarget(self.id));
        }
        self.health.apply_damage(amount);
        if self.health.is_dead() {
            self.state = UnitState::Dead;
            self.target = None;
            ledger.release_population(std::mem::take(&mut self.population));
            tracing::info!(unit = self.id, kind = ?self.kind, "Unit killed");
        }
        Ok(self.health.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Cost;
    use crate::economy::ResourceKind;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn barbarian() -> UnitData {
        UnitData {
            kind: UnitKind::Barbarian,
            cost: Cost::elixir(25),
            housing: 1,
            train_time: fixed(5),
            health: 45,
            health_growth: Fixed::ZERO,
            move_speed: fixed(10),
            damage: 8,
            damage_growth: Fixed::ZERO,
            attack_range: fixed(4),
            attack_speed: fixed(1),
            is_air: false,
            priority: TargetPriority::Nearest,
            unlock_level: 1,
        }
    }

    fn building(id: EntityId, x: i32) -> TargetCandidate {
        TargetCandidate {
            id,
            position: Vec2Fixed::from_ints(x, 0),
            reach: fixed(10),
            health: Health::new(100),
            is_air: false,
            is_defense: false,
            is_resource: false,
        }
    }

    fn spawn() -> Unit {
        Unit::spawn(1, &barbarian(), 1, Vec2Fixed::ZERO, FactionId::Attacker, 1)
    }

    #[test]
    fn test_idle_without_candidates() {
        let mut unit = spawn();
        assert_eq!(unit.think(fixed(1), &[]), None);
        assert_eq!(unit.state, UnitState::Idle);
    }

    #[test]
    fn test_moves_then_attacks() {
        let mut unit = spawn();
        let targets = [building(7, 34)];

        assert_eq!(unit.think(fixed(1), &targets), None);
        assert_eq!(unit.state, UnitState::Moving);
        assert_eq!(unit.target, Some(7));

        assert_eq!(unit.think(fixed(1), &targets), None);
        assert_eq!(unit.state, UnitState::Attacking);

        let strike = unit.think(fixed(1), &targets);
        assert_eq!(
            strike,
            Some(UnitStrike {
                attacker: 1,
                target: 7,
                damage: 8
            })
        );
        assert_eq!(unit.think(Fixed::from_num(0.5), &targets), None);
        assert!(unit.think(Fixed::from_num(0.5), &targets).is_some());
    }

    #[test]
    fn test_returns_to_idle_when_target_gone() {
        let mut unit = spawn();
        let targets = [building(7, 14)];
        unit.think(fixed(1), &targets);
        assert_eq!(unit.state, UnitState::Attacking);

        assert_eq!(unit.think(fixed(1), &[]), None);
        assert_eq!(unit.state, UnitState::Idle);
        assert_eq!(unit.target, None);
    }

    #[test]
    fn test_death_releases_population_once() {
        let mut ledger = ResourceLedger::default();
        ledger.use_population(1).unwrap();
        let mut unit = spawn();

        assert_eq!(unit.take_damage(40, &mut ledger), Ok(5));
        assert_eq!(unit.take_damage(40, &mut ledger), Ok(0));
        assert_eq!(unit.state, UnitState::Dead);
        assert_eq!(ledger.get(ResourceKind::Population), 0);

        ledger.use_population(1).unwrap();
        assert_eq!(unit.take_damage(1, &mut ledger), Err(GameError::InvalidTarget(1)));
        assert_eq!(ledger.get(ResourceKind::Population), 1);
        assert_eq!(unit.think(fixed(1), &[building(7, 14)]), None);
    }
}
