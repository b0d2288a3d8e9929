//! Error types for the simulation core.
//!
//! Every player-facing operation reports failure through [`GameError`]
//! and leaves state exactly as it was before the call.

use thiserror::Error;

use crate::components::EntityId;
use crate::data::UnitKind;
use crate::economy::ResourceKind;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// A currency, population or worker request cannot be satisfied.
    #[error("Insufficient resources: need {required} {resource}, have {available}")]
    InsufficientResources {
        /// Resource type.
        resource: ResourceKind,
        /// Amount required.
        required: u32,
        /// Amount available.
        available: u32,
    },

    /// Footprint is out of bounds or overlaps occupied/forbidden cells.
    #[error("Cannot place {width}x{height} footprint at ({x}, {y})")]
    InvalidPlacement {
        /// Origin column.
        x: i32,
        /// Origin row.
        y: i32,
        /// Footprint width in cells.
        width: u32,
        /// Footprint height in cells.
        height: u32,
    },

    /// Training queue is already at capacity.
    #[error("Training queue is full (capacity {capacity})")]
    QueueFull {
        /// Current queue capacity.
        capacity: usize,
    },

    /// Unit type is not unlocked at the trainer's level.
    #[error("{unit:?} requires trainer level {required}, trainer is level {level}")]
    LevelLocked {
        /// Unit that was requested.
        unit: UnitKind,
        /// Trainer level needed.
        required: u8,
        /// Current trainer level.
        level: u8,
    },

    /// No queue slot exists at the index.
    #[error("No queue entry at index {0}")]
    InvalidIndex(usize),

    /// Referenced entity does not exist or is no longer valid.
    #[error("Invalid target: entity {0}")]
    InvalidTarget(EntityId),

    /// Building is destroyed and ignores the request.
    #[error("Building {0} is already destroyed")]
    AlreadyDestroyed(EntityId),

    /// No trained unit of this kind is ready to deploy.
    #[error("No {0:?} ready to deploy")]
    NoUnitAvailable(UnitKind),

    /// Building/unit kind is missing from the catalog.
    #[error("Unknown blueprint: {0}")]
    UnknownBlueprint(String),

    /// Operation is not valid in the current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration parsed but holds inconsistent values.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Data file parsing error.
    #[error("Failed to parse data '{source_name}': {message}")]
    DataParseError {
        /// Name of the data source that failed to parse.
        source_name: String,
        /// Error message.
        message: String,
    },
}
