//! Faction identifiers.

use serde::{Deserialize, Serialize};

/// Side an entity fights for.
///
/// The base being simulated belongs to [`FactionId::Defender`]; units
/// deployed against it belong to [`FactionId::Attacker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FactionId {
    /// Owner of the base layout.
    Defender,
    /// Raiding army.
    Attacker,
}

impl FactionId {
    /// Get the display name for this faction.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Defender => "Defender",
            Self::Attacker => "Attacker",
        }
    }

    /// The opposing faction.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Defender => Self::Attacker,
            Self::Attacker => Self::Defender,
        }
    }

    /// Check whether `other` is hostile to this faction.
    #[must_use]
    pub fn is_hostile_to(self, other: Self) -> bool {
        self != other
    }
}

impl Default for FactionId {
    fn default() -> Self {
        Self::Defender
    }
}
