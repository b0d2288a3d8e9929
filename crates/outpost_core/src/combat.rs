//! Combat resolution: target selection, cooldowns, projectiles and damage.
//!
//! Everything here is pure: callers build [`TargetCandidate`] lists from
//! their registries, ask for a choice, and apply the resulting damage
//! themselves. Candidate order is the tie-breaker, so callers pass them in
//! ascending entity ID order.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Health};
use crate::factions::FactionId;
use crate::math::{fixed_decimal, fixed_serde, scale_amount, Fixed, Vec2Fixed};

/// Falloff at the edge of an area blast.
const EDGE_FALLOFF: Fixed = Fixed::from_bits(1 << 31); // 0.5

// ============================================================================
// Targeting
// ============================================================================

/// Policy used to rank eligible targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TargetPriority {
    /// Closest target wins.
    #[default]
    Nearest,
    /// Most damaged target wins.
    LowestHp,
    /// Defensive buildings first, then nearest.
    DefenseFirst,
    /// Resource buildings first, then nearest.
    ResourceFirst,
}

/// A potential target as seen by a targeting pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCandidate {
    /// Entity ID.
    pub id: EntityId,
    /// Centre position.
    pub position: Vec2Fixed,
    /// Distance from the centre to the edge; zero for point-sized units.
    pub reach: Fixed,
    /// Current hit points.
    pub health: Health,
    /// Flying unit.
    pub is_air: bool,
    /// Defensive building.
    pub is_defense: bool,
    /// Resource producer or currency storage.
    pub is_resource: bool,
}

impl TargetCandidate {
    /// A point-sized unit target.
    #[must_use]
    pub fn unit(id: EntityId, position: Vec2Fixed, health: Health, is_air: bool) -> Self {
        Self {
            id,
            position,
            reach: Fixed::ZERO,
            health,
            is_air,
            is_defense: false,
            is_resource: false,
        }
    }

    /// Distance from `origin` to this candidate's edge, never negative.
    #[must_use]
    pub fn distance_from(&self, origin: Vec2Fixed) -> Fixed {
        (origin.distance(self.position) - self.reach).max(Fixed::ZERO)
    }
}

fn nearest<'a>(
    origin: Vec2Fixed,
    candidates: impl Iterator<Item = &'a TargetCandidate>,
) -> Option<EntityId> {
    let mut best: Option<(EntityId, Fixed)> = None;
    for candidate in candidates {
        let distance = candidate.distance_from(origin);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((candidate.id, distance));
        }
    }
    best.map(|(id, _)| id)
}

fn most_damaged<'a>(candidates: impl Iterator<Item = &'a TargetCandidate>) -> Option<EntityId> {
    let mut best: Option<(EntityId, u32)> = None;
    for candidate in candidates {
        let missing = candidate.health.missing();
        if best.map_or(true, |(_, m)| missing > m) {
            best = Some((candidate.id, missing));
        }
    }
    best.map(|(id, _)| id)
}

/// Pick a building for a unit to pursue.
///
/// `candidates` must already exclude destroyed buildings. Preference
/// policies fall back to nearest-any when no preferred building remains.
/// Equal scores keep the earliest candidate.
#[must_use]
pub fn select_unit_target(
    priority: TargetPriority,
    origin: Vec2Fixed,
    candidates: &[TargetCandidate],
) -> Option<EntityId> {
    match priority {
        TargetPriority::Nearest => nearest(origin, candidates.iter()),
        TargetPriority::LowestHp => most_damaged(candidates.iter()),
        TargetPriority::DefenseFirst => {
            nearest(origin, candidates.iter().filter(|c| c.is_defense))
                .or_else(|| nearest(origin, candidates.iter()))
        }
        TargetPriority::ResourceFirst => {
            nearest(origin, candidates.iter().filter(|c| c.is_resource))
                .or_else(|| nearest(origin, candidates.iter()))
        }
    }
}

/// What a defensive building can shoot at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefenseReach {
    /// Maximum distance to a target.
    pub range: Fixed,
    /// Air units are eligible.
    pub can_attack_air: bool,
    /// Ground units are eligible.
    pub can_attack_ground: bool,
}

impl DefenseReach {
    /// Whether a candidate is in range and of an attackable kind.
    #[must_use]
    pub fn covers(&self, origin: Vec2Fixed, candidate: &TargetCandidate) -> bool {
        let kind_ok = if candidate.is_air {
            self.can_attack_air
        } else {
            self.can_attack_ground
        };
        kind_ok && candidate.distance_from(origin) <= self.range
    }
}

/// Pick a unit for a defensive building to shoot.
///
/// Only candidates in range and of an attackable kind are scored.
/// `LowestHp` scores `max - current`; every other policy scores
/// `range - distance`. Highest score wins, earliest candidate on ties.
#[must_use]
pub fn select_defense_target(
    priority: TargetPriority,
    origin: Vec2Fixed,
    reach: DefenseReach,
    candidates: &[TargetCandidate],
) -> Option<EntityId> {
    let mut best: Option<(EntityId, Fixed)> = None;
    for candidate in candidates.iter().filter(|c| reach.covers(origin, c)) {
        let score = match priority {
            TargetPriority::LowestHp => Fixed::from_num(candidate.health.missing()),
            TargetPriority::Nearest
            | TargetPriority::DefenseFirst
            | TargetPriority::ResourceFirst => reach.range - candidate.distance_from(origin),
        };
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate.id, score));
        }
    }
    best.map(|(id, _)| id)
}

/// Count a cooldown down by `dt`; true once it has run out.
pub fn cooldown_ready(cooldown: &mut Fixed, dt: Fixed) -> bool {
    *cooldown = (*cooldown - dt).max(Fixed::ZERO);
    *cooldown == Fixed::ZERO
}

/// Damage dealt at `distance` from the centre of a blast of `radius`.
///
/// Full damage at the centre, half at the edge, nothing beyond it.
#[must_use]
pub fn area_falloff(damage: u32, distance: Fixed, radius: Fixed) -> u32 {
    if radius <= Fixed::ZERO {
        return if distance <= Fixed::ZERO { damage } else { 0 };
    }
    if distance > radius {
        return 0;
    }
    let distance = distance.max(Fixed::ZERO);
    scale_amount(damage, Fixed::ONE - EDGE_FALLOFF * (distance / radius))
}

// ============================================================================
// Projectiles
// ============================================================================

/// Flight path of a projectile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trajectory {
    /// Flies straight at the point aimed at on launch.
    Straight,
    /// Lobbed arc to a fixed point; lands after `distance / speed` seconds.
    Parabolic {
        /// Peak height of the arc in world units.
        #[serde(with = "fixed_decimal")]
        max_height: Fixed,
    },
    /// Follows its live target.
    Tracking,
}

/// How impact damage is distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageMode {
    /// Only the original target is hit.
    Single,
    /// Everything within `radius` of the impact point is hit, with falloff.
    Area {
        /// Blast radius in world units.
        #[serde(with = "fixed_serde")]
        radius: Fixed,
    },
}

impl DamageMode {
    /// Single-target for a zero radius, area otherwise.
    #[must_use]
    pub fn from_radius(radius: Fixed) -> Self {
        if radius > Fixed::ZERO {
            Self::Area { radius }
        } else {
            Self::Single
        }
    }
}

/// Parameters of a projectile about to be fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectileLaunch {
    /// Building that fired.
    pub source: EntityId,
    /// Side of the building that fired.
    pub faction: FactionId,
    /// Unit aimed at.
    pub target: EntityId,
    /// Launch position.
    pub origin: Vec2Fixed,
    /// Target position at launch.
    pub aim: Vec2Fixed,
    /// Damage at the impact centre.
    pub damage: u32,
    /// Single or area.
    pub mode: DamageMode,
    /// Flight path.
    pub trajectory: Trajectory,
    /// World units per second.
    pub speed: Fixed,
    /// Area damage also hits air units.
    pub hits_air: bool,
    /// Area damage also hits ground units.
    pub hits_ground: bool,
}

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projectile {
    /// Entity ID.
    pub id: EntityId,
    /// Building that fired.
    pub source: EntityId,
    /// Side of the building that fired; impacts only hurt its enemies.
    pub faction: FactionId,
    /// Unit aimed at.
    pub target: EntityId,
    /// Damage at the impact centre.
    pub damage: u32,
    /// Single or area.
    pub mode: DamageMode,
    /// Flight path.
    pub trajectory: Trajectory,
    /// World units per second.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Launch position.
    pub origin: Vec2Fixed,
    /// Current ground position.
    pub position: Vec2Fixed,
    /// Point the projectile is flying at.
    pub aim: Vec2Fixed,
    /// Height above ground (parabolic arcs only).
    #[serde(with = "fixed_serde")]
    pub height: Fixed,
    /// Seconds in flight.
    #[serde(with = "fixed_serde")]
    pub elapsed: Fixed,
    /// Total flight time for parabolic arcs.
    #[serde(with = "fixed_serde")]
    pub flight_time: Fixed,
    /// Area damage also hits air units.
    pub hits_air: bool,
    /// Area damage also hits ground units.
    pub hits_ground: bool,
}

impl Projectile {
    /// Launch a projectile.
    #[must_use]
    pub fn launch(id: EntityId, launch: ProjectileLaunch) -> Self {
        let flight_time = if launch.speed > Fixed::ZERO {
            launch.origin.distance(launch.aim) / launch.speed
        } else {
            Fixed::ZERO
        };
        Self {
            id,
            source: launch.source,
            faction: launch.faction,
            target: launch.target,
            damage: launch.damage,
            mode: launch.mode,
            trajectory: launch.trajectory,
            speed: launch.speed,
            origin: launch.origin,
            position: launch.origin,
            aim: launch.aim,
            height: Fixed::ZERO,
            elapsed: Fixed::ZERO,
            flight_time,
            hits_air: launch.hits_air,
            hits_ground: launch.hits_ground,
        }
    }

    /// Fraction of a parabolic flight completed, in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> Fixed {
        if self.flight_time <= Fixed::ZERO {
            return Fixed::ONE;
        }
        (self.elapsed / self.flight_time).min(Fixed::ONE)
    }

    /// Move the projectile by `dt` seconds. Returns true on impact.
    ///
    /// `live_target` is the target's current position, or `None` once it is
    /// dead or gone; only tracking projectiles use it. A projectile without
    /// positive speed lands on its aim point at once, like a zero-length
    /// parabolic flight.
    pub fn advance(&mut self, dt: Fixed, live_target: Option<Vec2Fixed>, hit_distance: Fixed) -> bool {
        self.elapsed += dt;
        match self.trajectory {
            Trajectory::Parabolic { max_height } => {
                let t = self.progress();
                self.position = self.origin.lerp(self.aim, t);
                self.height = max_height * 4 * t * (Fixed::ONE - t);
                t >= Fixed::ONE
            }
            Trajectory::Straight | Trajectory::Tracking => {
                if self.trajectory == Trajectory::Tracking {
                    if let Some(position) = live_target {
                        self.aim = position;
                    }
                }
                if self.speed <= Fixed::ZERO {
                    self.position = self.aim;
                    return true;
                }
                if self.position.distance(self.aim) <= hit_distance {
                    return true;
                }
                let step = self.speed.saturating_mul(dt);
                self.position = self.position.move_towards(self.aim, step);
                self.position.distance(self.aim) <= hit_distance
            }
        }
    }

    /// Damage dealt on impact, in candidate order.
    ///
    /// `candidates` are the live hostile units. Single shots hit only the
    /// original target when it is still among them; area shots hit every
    /// eligible candidate within the radius of the impact point.
    #[must_use]
    pub fn impact_damage(&self, candidates: &[TargetCandidate]) -> Vec<(EntityId, u32)> {
        match self.mode {
            DamageMode::Single => candidates
                .iter()
                .find(|c| c.id == self.target)
                .map(|c| vec![(c.id, self.damage)])
                .unwrap_or_default(),
            DamageMode::Area { radius } => candidates
                .iter()
                .filter(|c| if c.is_air { self.hits_air } else { self.hits_ground })
                .filter_map(|c| {
                    let distance = c.distance_from(self.position);
                    (distance <= radius)
                        .then(|| (c.id, area_falloff(self.damage, distance, radius)))
                })
                .filter(|&(_, damage)| damage > 0)
                .collect(),
        }
    }
}

// ============================================================================
// Combat Events
// ============================================================================

/// Events generated by the combat passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// An attacker locked onto a new target.
    TargetAcquired {
        /// Building or unit choosing.
        attacker: EntityId,
        /// Entity chosen.
        target: EntityId,
    },
    /// A defence fired.
    ProjectileSpawned {
        /// Building that fired.
        source: EntityId,
        /// Unit aimed at.
        target: EntityId,
        /// Projectile entity.
        projectile: EntityId,
    },
    /// A projectile landed.
    ProjectileImpact {
        /// Projectile entity.
        projectile: EntityId,
        /// Ground position of the impact.
        position: Vec2Fixed,
    },
    /// Damage was applied.
    DamageDealt {
        /// Entity responsible.
        attacker: EntityId,
        /// Entity hit.
        target: EntityId,
        /// Hit points removed.
        damage: u32,
    },
    /// A unit died.
    UnitKilled {
        /// Dead unit.
        unit: EntityId,
    },
    /// A building was destroyed by damage.
    BuildingDestroyed {
        /// Destroyed building.
        building: EntityId,
    },
}
