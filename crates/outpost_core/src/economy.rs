//! Resource ledger: currencies, population and the worker pool.
//!
//! The ledger is the only place resource amounts change. Every mutation is
//! all-or-nothing except [`ResourceLedger::add`], which clamps to the cap and
//! reports how much actually landed.
//!
//! Change notification is queued rather than dispatched inline: each
//! successful mutation appends a [`LedgerEvent`], and the owner drains the
//! queue with [`ResourceLedger::flush`] once per tick. Observers therefore
//! never run while the ledger is mid-mutation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::components::Cost;
use crate::error::{GameError, Result};

/// Resource tracked by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// First currency.
    Gold,
    /// Second currency.
    Elixir,
    /// Army housing; amount is the space in use.
    Population,
    /// Builders; amount is the number busy.
    Workers,
}

impl ResourceKind {
    /// All kinds in ledger order.
    pub const ALL: [Self; 4] = [Self::Gold, Self::Elixir, Self::Population, Self::Workers];

    /// Whether this kind is a spendable currency.
    #[must_use]
    pub const fn is_currency(self) -> bool {
        matches!(self, Self::Gold | Self::Elixir)
    }

    const fn index(self) -> usize {
        match self {
            Self::Gold => 0,
            Self::Elixir => 1,
            Self::Population => 2,
            Self::Workers => 3,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gold => "gold",
            Self::Elixir => "elixir",
            Self::Population => "population",
            Self::Workers => "workers",
        };
        f.write_str(name)
    }
}

/// Amount and cap of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Pool {
    /// Current amount (in use, for population and workers).
    pub amount: u32,
    /// Upper bound for `amount`; population and worker usage may exceed a
    /// cap lowered while reservations were outstanding.
    pub cap: u32,
}

impl Pool {
    /// Create a pool, clamping `amount` into `[0, cap]`.
    #[must_use]
    pub const fn new(amount: u32, cap: u32) -> Self {
        let amount = if amount > cap { cap } else { amount };
        Self { amount, cap }
    }

    /// Room left below the cap, zero when the pool is overcommitted.
    #[must_use]
    pub const fn headroom(&self) -> u32 {
        self.cap.saturating_sub(self.amount)
    }
}

/// Starting amounts and caps, restored by [`ResourceLedger::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Gold pool.
    pub gold: Pool,
    /// Elixir pool.
    pub elixir: Pool,
    /// Population in use / housing cap.
    pub population: Pool,
    /// Busy workers / total workers.
    pub workers: Pool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            gold: Pool::new(500, 1000),
            elixir: Pool::new(500, 1000),
            population: Pool::new(0, 20),
            workers: Pool::new(0, 2),
        }
    }
}

impl LedgerConfig {
    /// Pools in ledger order, each clamped so `amount <= cap`.
    fn pools(&self) -> [Pool; 4] {
        [self.gold, self.elixir, self.population, self.workers]
            .map(|pool| Pool::new(pool.amount, pool.cap))
    }

    /// Reject pools whose starting amount exceeds their cap.
    pub fn validate(&self) -> Result<()> {
        let raw = [self.gold, self.elixir, self.population, self.workers];
        for (kind, pool) in ResourceKind::ALL.into_iter().zip(raw) {
            if pool.amount > pool.cap {
                return Err(GameError::InvalidConfig(format!(
                    "{kind} starts at {} above its cap {}",
                    pool.amount, pool.cap
                )));
            }
        }
        Ok(())
    }
}

/// Which side of a pool changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerField {
    /// The current amount.
    Amount,
    /// The cap.
    Cap,
}

/// A recorded ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Resource that changed.
    pub kind: ResourceKind,
    /// Amount or cap.
    pub field: LedgerField,
    /// Value before the mutation.
    pub old: u32,
    /// Value after the mutation.
    pub new: u32,
}

/// Observer callback invoked from [`ResourceLedger::flush`].
pub type LedgerObserver = Box<dyn FnMut(&LedgerEvent) + Send>;

/// Plain-data copy of the ledger for save slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Gold pool.
    pub gold: Pool,
    /// Elixir pool.
    pub elixir: Pool,
    /// Population pool.
    pub population: Pool,
    /// Worker pool.
    pub workers: Pool,
}

/// Economy state for one base.
///
/// Invariants: currency amounts never exceed their cap; amounts never
/// underflow. Population and worker usage may sit above a cap that was cut
/// while reservations were outstanding, and no new reservation succeeds until
/// usage drains below it.
pub struct ResourceLedger {
    pools: [Pool; 4],
    defaults: LedgerConfig,
    pending: Vec<LedgerEvent>,
    observers: Vec<LedgerObserver>,
}

impl fmt::Debug for ResourceLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLedger")
            .field("pools", &self.pools)
            .field("pending", &self.pending.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for ResourceLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl ResourceLedger {
    /// Create a ledger at the configured defaults.
    #[must_use]
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            pools: config.pools(),
            defaults: config,
            pending: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Current amount of `kind`.
    #[must_use]
    pub fn get(&self, kind: ResourceKind) -> u32 {
        self.pools[kind.index()].amount
    }

    /// Cap of `kind`.
    #[must_use]
    pub fn cap(&self, kind: ResourceKind) -> u32 {
        self.pools[kind.index()].cap
    }

    /// Amount and cap of `kind`.
    #[must_use]
    pub fn pool(&self, kind: ResourceKind) -> Pool {
        self.pools[kind.index()]
    }

    /// Unused capacity of `kind` (free housing, idle workers, storage room).
    #[must_use]
    pub fn available(&self, kind: ResourceKind) -> u32 {
        self.pools[kind.index()].headroom()
    }

    /// Set the amount of `kind`, clamped to `[0, cap]`.
    ///
    /// Returns the value actually stored.
    pub fn set(&mut self, kind: ResourceKind, amount: u32) -> u32 {
        let clamped = amount.min(self.cap(kind));
        self.write_amount(kind, clamped);
        clamped
    }

    /// Replace the cap of `kind`.
    ///
    /// Currency amounts above the new cap are cut down to it. Population and
    /// worker usage is left alone: outstanding reservations stay valid and
    /// [`available`](Self::available) reports zero until they drain.
    pub fn set_cap(&mut self, kind: ResourceKind, cap: u32) {
        let amount = self.get(kind);
        self.write_cap(kind, cap);
        if kind.is_currency() && amount > cap {
            self.write_amount(kind, cap);
        }
    }

    /// Raise the cap of `kind` by `delta`.
    pub fn raise_cap(&mut self, kind: ResourceKind, delta: u32) {
        let cap = self.cap(kind).saturating_add(delta);
        self.set_cap(kind, cap);
    }

    /// Lower the cap of `kind` by `delta`, flooring at zero.
    pub fn lower_cap(&mut self, kind: ResourceKind, delta: u32) {
        let cap = self.cap(kind).saturating_sub(delta);
        self.set_cap(kind, cap);
    }

    /// Add up to `amount` of `kind`, clamped to the cap.
    ///
    /// Returns the amount actually added, which may be less than requested.
    pub fn add(&mut self, kind: ResourceKind, amount: u32) -> u32 {
        let added = amount.min(self.available(kind));
        if added > 0 {
            self.write_amount(kind, self.get(kind) + added);
        }
        added
    }

    /// Whether at least `amount` of `kind` is on hand.
    #[must_use]
    pub fn has_enough(&self, kind: ResourceKind, amount: u32) -> bool {
        self.get(kind) >= amount
    }

    /// Remove exactly `amount` of `kind`, or nothing at all.
    pub fn consume(&mut self, kind: ResourceKind, amount: u32) -> Result<()> {
        let available = self.get(kind);
        if available < amount {
            return Err(GameError::InsufficientResources {
                resource: kind,
                required: amount,
                available,
            });
        }
        if amount > 0 {
            self.write_amount(kind, available - amount);
        }
        Ok(())
    }

    /// Whether both currencies of `cost` are on hand.
    #[must_use]
    pub fn can_afford(&self, cost: Cost) -> bool {
        self.has_enough(ResourceKind::Gold, cost.gold)
            && self.has_enough(ResourceKind::Elixir, cost.elixir)
    }

    /// Spend both currencies of `cost` atomically.
    pub fn spend(&mut self, cost: Cost) -> Result<()> {
        // Check both before touching either.
        for (kind, required) in [
            (ResourceKind::Gold, cost.gold),
            (ResourceKind::Elixir, cost.elixir),
        ] {
            let available = self.get(kind);
            if available < required {
                return Err(GameError::InsufficientResources {
                    resource: kind,
                    required,
                    available,
                });
            }
        }
        self.consume(ResourceKind::Gold, cost.gold)?;
        self.consume(ResourceKind::Elixir, cost.elixir)?;
        Ok(())
    }

    /// Credit both currencies of `cost`, clamped to the caps.
    ///
    /// Returns what was actually credited.
    pub fn credit(&mut self, cost: Cost) -> Cost {
        Cost {
            gold: self.add(ResourceKind::Gold, cost.gold),
            elixir: self.add(ResourceKind::Elixir, cost.elixir),
        }
    }

    /// Reserve `amount` housing space.
    pub fn use_population(&mut self, amount: u32) -> Result<()> {
        let free = self.available(ResourceKind::Population);
        if free < amount {
            return Err(GameError::InsufficientResources {
                resource: ResourceKind::Population,
                required: amount,
                available: free,
            });
        }
        if amount > 0 {
            let used = self.get(ResourceKind::Population);
            self.write_amount(ResourceKind::Population, used + amount);
        }
        Ok(())
    }

    /// Return `amount` housing space, clamping usage at zero.
    pub fn release_population(&mut self, amount: u32) {
        let used = self.get(ResourceKind::Population);
        let remaining = used.saturating_sub(amount);
        if remaining != used {
            self.write_amount(ResourceKind::Population, remaining);
        }
    }

    /// Mark one worker busy.
    pub fn use_worker(&mut self) -> Result<()> {
        let idle = self.available(ResourceKind::Workers);
        if idle == 0 {
            return Err(GameError::InsufficientResources {
                resource: ResourceKind::Workers,
                required: 1,
                available: 0,
            });
        }
        let busy = self.get(ResourceKind::Workers);
        self.write_amount(ResourceKind::Workers, busy + 1);
        Ok(())
    }

    /// Return one busy worker to the pool.
    pub fn release_worker(&mut self) -> Result<()> {
        let busy = self.get(ResourceKind::Workers);
        if busy == 0 {
            return Err(GameError::InvalidState("no busy worker to release".into()));
        }
        self.write_amount(ResourceKind::Workers, busy - 1);
        Ok(())
    }

    /// Register a callback run for every event on [`flush`](Self::flush).
    pub fn register_observer(&mut self, observer: LedgerObserver) {
        self.observers.push(observer);
    }

    /// Events recorded since the last flush, without notifying observers.
    #[must_use]
    pub fn pending_events(&self) -> &[LedgerEvent] {
        &self.pending
    }

    /// Deliver queued events to every observer and return them.
    pub fn flush(&mut self) -> Vec<LedgerEvent> {
        let events = std::mem::take(&mut self.pending);
        for observer in &mut self.observers {
            for event in &events {
                observer(event);
            }
        }
        events
    }

    /// Restore the configured defaults.
    ///
    /// Every pool reports an amount and cap event, even when unchanged, so
    /// displays resynchronise after a reset.
    pub fn reset(&mut self) {
        let defaults = self.defaults.pools();
        for kind in ResourceKind::ALL {
            let old = self.pools[kind.index()];
            let new = defaults[kind.index()];
            self.pools[kind.index()] = new;
            self.pending.push(LedgerEvent {
                kind,
                field: LedgerField::Cap,
                old: old.cap,
                new: new.cap,
            });
            self.pending.push(LedgerEvent {
                kind,
                field: LedgerField::Amount,
                old: old.amount,
                new: new.amount,
            });
        }
        tracing::debug!("Ledger reset to defaults");
    }

    /// Plain-data copy of every pool.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            gold: self.pools[0],
            elixir: self.pools[1],
            population: self.pools[2],
            workers: self.pools[3],
        }
    }

    /// Overwrite every pool from a snapshot.
    ///
    /// Currency amounts are clamped to their caps; population and worker
    /// usage is kept as recorded.
    pub fn restore(&mut self, snapshot: &LedgerSnapshot) {
        let pools = [
            snapshot.gold,
            snapshot.elixir,
            snapshot.population,
            snapshot.workers,
        ];
        for kind in ResourceKind::ALL {
            let pool = pools[kind.index()];
            let amount = if kind.is_currency() {
                pool.amount.min(pool.cap)
            } else {
                pool.amount
            };
            self.write_cap(kind, pool.cap);
            self.write_amount(kind, amount);
        }
    }

    fn write_amount(&mut self, kind: ResourceKind, new: u32) {
        let pool = &mut self.pools[kind.index()];
        let old = pool.amount;
        debug_assert!(
            new <= pool.cap || (!kind.is_currency() && new <= old),
            "{kind} amount {new} above cap {}",
            pool.cap
        );
        if old == new {
            return;
        }
        pool.amount = new;
        self.pending.push(LedgerEvent {
            kind,
            field: LedgerField::Amount,
            old,
            new,
        });
    }

    fn write_cap(&mut self, kind: ResourceKind, new: u32) {
        let pool = &mut self.pools[kind.index()];
        let old = pool.cap;
        if old == new {
            return;
        }
        pool.cap = new;
        self.pending.push(LedgerEvent {
            kind,
            field: LedgerField::Cap,
            old,
            new,
        });
    }
}
