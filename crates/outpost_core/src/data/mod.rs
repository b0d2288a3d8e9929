//! Data structures for building and unit definitions.
//!
//! Pure data: every struct derives serde traits and can be written by hand in
//! RON. Tuning decimals are converted to fixed-point once, on load.

mod building_data;
mod catalog;
mod unit_data;

pub use building_data::{
    BuildingData, BuildingKind, DefenseData, ProductionData, RoleData, StorageData, TrainerData,
};
pub use catalog::{Catalog, CatalogData};
pub use unit_data::{UnitData, UnitKind};
