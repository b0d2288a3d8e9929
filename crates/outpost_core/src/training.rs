//! Unit training queue.
//!
//! Entries train strictly FIFO: only the head accumulates time. Each entry
//! holds its population reservation from enqueue until it is cancelled,
//! dropped, or handed over to a deployed unit.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::components::Cost;
use crate::data::{UnitData, UnitKind};
use crate::economy::ResourceLedger;
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, prorate, Fixed};

/// A unit waiting in or being trained by a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingEntry {
    /// Unit being trained.
    pub unit: UnitKind,
    /// Price paid on enqueue.
    pub cost: Cost,
    /// Population reserved on enqueue.
    pub housing: u32,
    /// Seconds needed.
    #[serde(with = "fixed_serde")]
    pub train_time: Fixed,
    /// Seconds trained so far; only the head advances.
    #[serde(with = "fixed_serde")]
    pub elapsed: Fixed,
}

impl TrainingEntry {
    /// Completed fraction in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> Fixed {
        if self.train_time <= Fixed::ZERO {
            return Fixed::ONE;
        }
        (self.elapsed / self.train_time).clamp(Fixed::ZERO, Fixed::ONE)
    }
}

/// A trained unit waiting to be deployed. Its population stays reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadyUnit {
    /// Unit type.
    pub unit: UnitKind,
    /// Population held.
    pub housing: u32,
}

/// FIFO queue of unit productions plus the trained units it has produced.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingQueue {
    entries: VecDeque<TrainingEntry>,
    ready: Vec<ReadyUnit>,
}

impl TrainingQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a queue from persisted entries and ready units.
    ///
    /// Their population is assumed to be reserved in the ledger already.
    #[must_use]
    pub fn from_parts(entries: Vec<TrainingEntry>, ready: Vec<ReadyUnit>) -> Self {
        Self {
            entries: entries.into(),
            ready,
        }
    }

    /// Number of queued entries, head included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued entries in training order.
    pub fn entries(&self) -> impl Iterator<Item = &TrainingEntry> {
        self.entries.iter()
    }

    /// Entry currently training.
    #[must_use]
    pub fn head(&self) -> Option<&TrainingEntry> {
        self.entries.front()
    }

    /// Trained units awaiting deployment.
    #[must_use]
    pub fn ready(&self) -> &[ReadyUnit] {
        &self.ready
    }

    /// Number of ready units of `kind`.
    #[must_use]
    pub fn ready_count(&self, kind: UnitKind) -> usize {
        self.ready.iter().filter(|r| r.unit == kind).count()
    }

    /// Queue a unit, reserving its population then paying for it.
    ///
    /// Fails with no effect if the queue is at `capacity`, population is
    /// short, or the cost is unaffordable.
    pub fn enqueue(
        &mut self,
        data: &UnitData,
        capacity: usize,
        ledger: &mut ResourceLedger,
    ) -> Result<()> {
        if self.entries.len() >= capacity {
            return Err(GameError::QueueFull { capacity });
        }

        ledger.use_population(data.housing)?;
        if let Err(err) = ledger.spend(data.cost) {
            ledger.release_population(data.housing);
            return Err(err);
        }

        self.entries.push_back(TrainingEntry {
            unit: data.kind,
            cost: data.cost,
            housing: data.housing,
            train_time: data.train_time,
            elapsed: Fixed::ZERO,
        });
        Ok(())
    }

    /// Advance the head entry by `dt`.
    ///
    /// At most one entry completes per call; time past its completion is
    /// discarded and the next head starts from zero.
    pub fn tick(&mut self, dt: Fixed) -> Option<UnitKind> {
        let head = self.entries.front_mut()?;
        head.elapsed += dt;
        if head.elapsed < head.train_time {
            return None;
        }

        let done = self.entries.pop_front()?;
        self.ready.push(ReadyUnit {
            unit: done.unit,
            housing: done.housing,
        });
        Some(done.unit)
    }

    /// Remove the entry at `index`, refunding part of its cost.
    ///
    /// Non-head entries refund `cost * refund_rate`; the head refunds
    /// `cost * refund_rate * (1 - progress)`. The entry's population is
    /// released. Returns the amount actually credited.
    pub fn cancel(
        &mut self,
        index: usize,
        refund_rate: Fixed,
        ledger: &mut ResourceLedger,
    ) -> Result<Cost> {
        let entry = self
            .entries
            .remove(index)
            .ok_or(GameError::InvalidIndex(index))?;

        let (part, whole) = if index == 0 {
            (entry.train_time - entry.elapsed, entry.train_time)
        } else {
            (Fixed::ONE, Fixed::ONE)
        };
        let refund = Cost::new(
            prorate(entry.cost.gold, refund_rate, part, whole),
            prorate(entry.cost.elixir, refund_rate, part, whole),
        );

        if index == 0 {
            if let Some(next) = self.entries.front_mut() {
                next.elapsed = Fixed::ZERO;
            }
        }
        ledger.release_population(entry.housing);
        let credited = ledger.credit(refund);

        tracing::debug!(
            unit = ?entry.unit,
            index,
            gold = credited.gold,
            elixir = credited.elixir,
            "Cancelled training"
        );
        Ok(credited)
    }

    /// Take the first ready unit of `kind`, keeping its reservation.
    pub fn take_ready(&mut self, kind: UnitKind) -> Option<ReadyUnit> {
        let pos = self.ready.iter().position(|r| r.unit == kind)?;
        Some(self.ready.remove(pos))
    }

    /// Add a ready unit whose population is already accounted for.
    pub fn push_ready(&mut self, unit: ReadyUnit) {
        self.ready.push(unit);
    }

    /// Drop every queued entry, releasing their population without refund.
    ///
    /// Ready units are kept. Returns how many entries were dropped.
    pub fn drop_queued(&mut self, ledger: &mut ResourceLedger) -> usize {
        let dropped = self.entries.len();
        let housing: u32 = self.entries.drain(..).map(|e| e.housing).sum();
        ledger.release_population(housing);
        dropped
    }

    /// Drop queued entries and ready units, releasing all their population.
    pub fn release_all(&mut self, ledger: &mut ResourceLedger) {
        self.drop_queued(ledger);
        let housing: u32 = self.ready.drain(..).map(|r| r.housing).sum();
        ledger.release_population(housing);
    }

    /// Population held by queued and ready units.
    #[must_use]
    pub fn reserved_population(&self) -> u32 {
        self.entries.iter().map(|e| e.housing).sum::<u32>()
            + self.ready.iter().map(|r| r.housing).sum::<u32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::TargetPriority;
    use crate::economy::ResourceKind;

    fn archer() -> UnitData {
        UnitData {
            kind: UnitKind::Archer,
            cost: Cost::elixir(100),
            housing: 2,
            train_time: Fixed::from_num(5),
            health: 20,
            health_growth: Fixed::ZERO,
            move_speed: Fixed::from_num(24),
            damage: 7,
            damage_growth: Fixed::ZERO,
            attack_range: Fixed::from_num(35),
            attack_speed: Fixed::ONE,
            is_air: false,
            priority: TargetPriority::Nearest,
            unlock_level: 1,
        }
    }

    fn half() -> Fixed {
        Fixed::from_num(0.5)
    }

    #[test]
    fn test_enqueue_reserves_population_and_cost() {
        let mut ledger = ResourceLedger::default();
        let mut queue = TrainingQueue::new();

        queue.enqueue(&archer(), 6, &mut ledger).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(ledger.get(ResourceKind::Population), 2);
        assert_eq!(ledger.get(ResourceKind::Elixir), 400);
    }

    #[test]
    fn test_enqueue_full_queue_rejected() {
        let mut ledger = ResourceLedger::default();
        let mut queue = TrainingQueue::new();
        queue.enqueue(&archer(), 1, &mut ledger).unwrap();
        let before = ledger.snapshot();

        let result = queue.enqueue(&archer(), 1, &mut ledger);
        assert_eq!(result, Err(GameError::QueueFull { capacity: 1 }));
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn test_enqueue_unaffordable_releases_population() {
        let mut ledger = ResourceLedger::default();
        ledger.set(ResourceKind::Elixir, 50);
        let mut queue = TrainingQueue::new();

        let result = queue.enqueue(&archer(), 6, &mut ledger);
        assert!(matches!(
            result,
            Err(GameError::InsufficientResources {
                resource: ResourceKind::Elixir,
                ..
            })
        ));
        assert_eq!(ledger.get(ResourceKind::Population), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_completion_discards_overflow() {
        let mut ledger = ResourceLedger::default();
        let mut queue = TrainingQueue::new();
        queue.enqueue(&archer(), 6, &mut ledger).unwrap();
        queue.enqueue(&archer(), 6, &mut ledger).unwrap();

        assert_eq!(queue.tick(Fixed::from_num(4)), None);
        assert_eq!(queue.tick(Fixed::from_num(3)), Some(UnitKind::Archer));
        assert_eq!(queue.head().map(|h| h.elapsed), Some(Fixed::ZERO));
        assert_eq!(queue.ready_count(UnitKind::Archer), 1);
        assert_eq!(ledger.get(ResourceKind::Population), 4);
    }

    #[test]
    fn test_cancel_head_refunds_remaining_fraction() {
        let mut ledger = ResourceLedger::default();
        let mut queue = TrainingQueue::new();
        queue.enqueue(&archer(), 6, &mut ledger).unwrap();
        queue.enqueue(&archer(), 6, &mut ledger).unwrap();
        queue.tick(Fixed::from_num(2));

        let refund = queue.cancel(0, half(), &mut ledger).unwrap();
        assert_eq!(refund, Cost::elixir(30));
        assert_eq!(ledger.get(ResourceKind::Elixir), 330);
        assert_eq!(ledger.get(ResourceKind::Population), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.head().map(|h| h.elapsed), Some(Fixed::ZERO));
    }

    #[test]
    fn test_cancel_queued_entry_refunds_half() {
        let mut ledger = ResourceLedger::default();
        let mut queue = TrainingQueue::new();
        queue.enqueue(&archer(), 6, &mut ledger).unwrap();
        queue.enqueue(&archer(), 6, &mut ledger).unwrap();
        queue.tick(Fixed::from_num(2));

        let refund = queue.cancel(1, half(), &mut ledger).unwrap();
        assert_eq!(refund, Cost::elixir(50));
        assert_eq!(queue.head().map(|h| h.elapsed), Some(Fixed::from_num(2)));
    }

    #[test]
    fn test_cancel_instant_head_refunds_nothing() {
        let mut ledger = ResourceLedger::default();
        let mut queue = TrainingQueue::new();
        let instant = UnitData {
            train_time: Fixed::ZERO,
            ..archer()
        };
        queue.enqueue(&instant, 6, &mut ledger).unwrap();

        assert_eq!(queue.head().map(TrainingEntry::progress), Some(Fixed::ONE));

        let refund = queue.cancel(0, half(), &mut ledger).unwrap();
        assert_eq!(refund, Cost::ZERO);
        assert_eq!(ledger.get(ResourceKind::Population), 0);
    }

    #[test]
    fn test_cancel_invalid_index() {
        let mut ledger = ResourceLedger::default();
        let mut queue = TrainingQueue::new();
        assert_eq!(
            queue.cancel(0, half(), &mut ledger),
            Err(GameError::InvalidIndex(0))
        );
    }

    #[test]
    fn test_drop_queued_keeps_ready_units() {
        let mut ledger = ResourceLedger::default();
        let mut queue = TrainingQueue::new();
        queue.enqueue(&archer(), 6, &mut ledger).unwrap();
        queue.enqueue(&archer(), 6, &mut ledger).unwrap();
        queue.tick(Fixed::from_num(5));

        assert_eq!(queue.drop_queued(&mut ledger), 1);
        assert_eq!(queue.ready().len(), 1);
        assert_eq!(ledger.get(ResourceKind::Population), 2);
        assert_eq!(queue.reserved_population(), 2);

        queue.release_all(&mut ledger);
        assert!(queue.ready().is_empty());
        assert_eq!(ledger.get(ResourceKind::Population), 0);
    }
}
