//! Resource producers and capacity providers.
//!
//! Producers fill an internal store over time that the player collects into
//! the ledger. Capacity providers (storages, army camps, builder huts) raise
//! a ledger cap by whatever their current level contributes.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::components::Cost;
use crate::data::{ProductionData, StorageData};
use crate::economy::{ResourceKind, ResourceLedger};
use crate::math::{fixed_serde, scale_amount, Fixed};

fn currency_cost(kind: ResourceKind, amount: u32) -> Cost {
    match kind {
        ResourceKind::Gold => Cost::gold(amount),
        ResourceKind::Elixir => Cost::elixir(amount),
        ResourceKind::Population | ResourceKind::Workers => Cost::ZERO,
    }
}

// ============================================================================
// Producer
// ============================================================================

/// Runtime state of a production building.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Producer {
    /// Amount waiting to be collected.
    pub stored: u32,
    /// Seconds accumulated toward the next whole-second payout.
    #[serde(with = "fixed_serde")]
    pub timer: Fixed,
}

impl Producer {
    /// Accumulate `dt` seconds of production at `level`.
    ///
    /// Every whole second pays out `floor(rate)` units plus one more with
    /// probability equal to the fractional part of the rate. The store never
    /// exceeds its level's capacity. Returns the amount added to the store.
    pub fn tick<R: Rng>(&mut self, data: &ProductionData, level: u8, dt: Fixed, rng: &mut R) -> u32 {
        self.timer += dt;
        let rate = data.rate_at(level).max(Fixed::ZERO);
        let whole = rate.floor().to_num::<u32>();
        let fraction = rate.frac();
        let capacity = data.storage_at(level);

        let before = self.stored;
        while self.timer >= Fixed::ONE {
            self.timer -= Fixed::ONE;
            let mut amount = whole;
            if fraction > Fixed::ZERO {
                let roll = Fixed::from_bits(i64::from(rng.gen::<u32>()));
                if roll < fraction {
                    amount += 1;
                }
            }
            self.stored = self.stored.saturating_add(amount).min(capacity);
        }
        self.stored - before
    }

    /// Move the store into the ledger.
    ///
    /// Whatever the ledger cap cannot take stays in the building. Returns the
    /// amount actually credited.
    pub fn collect(&mut self, data: &ProductionData, ledger: &mut ResourceLedger) -> u32 {
        let added = ledger.add(data.resource, self.stored);
        self.stored -= added;
        added
    }

    /// Settle the store on destruction.
    ///
    /// The loss fraction is destroyed and reported as loot; the rest is
    /// credited to the ledger as far as the cap allows.
    pub fn on_destroyed(&mut self, data: &ProductionData, ledger: &mut ResourceLedger) -> Cost {
        let lost = scale_amount(self.stored, data.loss_fraction).min(self.stored);
        ledger.add(data.resource, self.stored - lost);
        self.stored = 0;
        self.timer = Fixed::ZERO;
        currency_cost(data.resource, lost)
    }

    /// Settle the store on voluntary demolition: everything is collected.
    pub fn on_demolished(&mut self, data: &ProductionData, ledger: &mut ResourceLedger) {
        ledger.add(data.resource, self.stored);
        self.stored = 0;
        self.timer = Fixed::ZERO;
    }
}

// ============================================================================
// Capacity Provider
// ============================================================================

/// Runtime state of a building that raises a ledger cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapacityProvider {
    /// Capacity currently added to the ledger.
    pub contributed: u32,
}

impl CapacityProvider {
    /// Bring the contribution up to date with `level`.
    ///
    /// Adds `new - previous` to the ledger cap. Returns the new contribution.
    pub fn apply_level(&mut self, data: &StorageData, level: u8, ledger: &mut ResourceLedger) -> u32 {
        let capacity = data.capacity_at(level);
        if capacity >= self.contributed {
            ledger.raise_cap(data.resource, capacity - self.contributed);
        } else {
            ledger.lower_cap(data.resource, self.contributed - capacity);
        }
        self.contributed = capacity;
        capacity
    }

    /// Withdraw the contribution after destruction.
    ///
    /// Currency storages first lose `loss_fraction` of the ledger amount,
    /// reported as loot; then the full contribution leaves the cap.
    pub fn on_destroyed(&mut self, data: &StorageData, ledger: &mut ResourceLedger) -> Cost {
        let mut loot = Cost::ZERO;
        if data.resource.is_currency() && self.contributed > 0 {
            let held = ledger.get(data.resource);
            let lost = scale_amount(held, data.loss_fraction).min(held);
            if ledger.consume(data.resource, lost).is_ok() {
                loot = currency_cost(data.resource, lost);
            }
        }
        self.withdraw(data, ledger);
        loot
    }

    /// Remove the contribution from the ledger cap, floored at zero.
    pub fn withdraw(&mut self, data: &StorageData, ledger: &mut ResourceLedger) {
        ledger.lower_cap(data.resource, self.contributed);
        self.contributed = 0;
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn gold_mine(rate: f64) -> ProductionData {
        ProductionData {
            resource: ResourceKind::Gold,
            rate: Fixed::from_num(rate),
            rate_growth: Fixed::ZERO,
            storage: 10,
            storage_growth: Fixed::ZERO,
            loss_fraction: Fixed::from_num(0.5),
        }
    }

    fn gold_storage() -> StorageData {
        StorageData {
            resource: ResourceKind::Gold,
            capacity: 1500,
            capacity_growth: Fixed::from_num(0.25),
            loss_fraction: Fixed::from_num(0.2),
        }
    }

    #[test]
    fn test_whole_rate_pays_each_second() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut producer = Producer::default();
        let data = gold_mine(2.0);

        assert_eq!(producer.tick(&data, 1, Fixed::from_num(0.5), &mut rng), 0);
        assert_eq!(producer.tick(&data, 1, Fixed::from_num(0.5), &mut rng), 2);
        assert_eq!(producer.tick(&data, 1, Fixed::from_num(3), &mut rng), 6);
        assert_eq!(producer.tick(&data, 1, Fixed::from_num(5), &mut rng), 2);
        assert_eq!(producer.stored, 10);
    }

    #[test]
    fn test_fractional_rate_stays_between_floor_and_ceil() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut producer = Producer::default();
        let mut data = gold_mine(1.5);
        data.storage = 1000;

        producer.tick(&data, 1, Fixed::from_num(100), &mut rng);
        assert!(producer.stored >= 100 && producer.stored <= 200);
    }

    #[test]
    fn test_collect_leaves_capped_remainder() {
        let mut ledger = ResourceLedger::default();
        ledger.set(ResourceKind::Gold, 995);
        let mut producer = Producer {
            stored: 8,
            timer: Fixed::ZERO,
        };

        assert_eq!(producer.collect(&gold_mine(1.0), &mut ledger), 5);
        assert_eq!(producer.stored, 3);
        assert_eq!(ledger.get(ResourceKind::Gold), 1000);
    }

    #[test]
    fn test_producer_destruction_splits_loot_and_ledger() {
        let mut ledger = ResourceLedger::default();
        let mut producer = Producer {
            stored: 10,
            timer: Fixed::ZERO,
        };

        let loot = producer.on_destroyed(&gold_mine(1.0), &mut ledger);
        assert_eq!(loot, Cost::gold(5));
        assert_eq!(ledger.get(ResourceKind::Gold), 505);
        assert_eq!(producer.stored, 0);
    }

    #[test]
    fn test_capacity_delta_on_level_change() {
        let mut ledger = ResourceLedger::default();
        let mut provider = CapacityProvider::default();

        provider.apply_level(&gold_storage(), 1, &mut ledger);
        assert_eq!(ledger.cap(ResourceKind::Gold), 2500);

        provider.apply_level(&gold_storage(), 3, &mut ledger);
        assert_eq!(provider.contributed, 2250);
        assert_eq!(ledger.cap(ResourceKind::Gold), 3250);
    }

    #[test]
    fn test_storage_destruction_takes_loss_then_lowers_cap() {
        let mut ledger = ResourceLedger::default();
        let mut provider = CapacityProvider::default();
        provider.apply_level(&gold_storage(), 1, &mut ledger);
        ledger.set(ResourceKind::Gold, 2000);

        let loot = provider.on_destroyed(&gold_storage(), &mut ledger);
        assert_eq!(loot, Cost::gold(400));
        assert_eq!(ledger.cap(ResourceKind::Gold), 1000);
        assert_eq!(ledger.get(ResourceKind::Gold), 1000);
        assert_eq!(provider.contributed, 0);
    }
}
