//! Well-known record identifiers.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a record in the per-event store.
///
/// The set is closed: unknown names are rejected when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RecordKey {
    #[cfg_attr(feature = "serde", serde(rename = "EventInfo"))]
    EventInfo,
    #[cfg_attr(feature = "serde", serde(rename = "Hits"))]
    Hits,
    #[cfg_attr(feature = "serde", serde(rename = "Collection_EM1"))]
    CollectionEm1,
    #[cfg_attr(feature = "serde", serde(rename = "Collection_EM2"))]
    CollectionEm2,
    #[cfg_attr(feature = "serde", serde(rename = "Collection_EM3"))]
    CollectionEm3,
    #[cfg_attr(feature = "serde", serde(rename = "Collection_HAD1"))]
    CollectionHad1,
    #[cfg_attr(feature = "serde", serde(rename = "Collection_HAD2"))]
    CollectionHad2,
    #[cfg_attr(feature = "serde", serde(rename = "Collection_HAD3"))]
    CollectionHad3,
    #[cfg_attr(feature = "serde", serde(rename = "Cells"))]
    Cells,
    #[cfg_attr(feature = "serde", serde(rename = "TruthCells"))]
    TruthCells,
    #[cfg_attr(feature = "serde", serde(rename = "XTCells"))]
    XTCells,
}

impl RecordKey {
    /// All known keys.
    pub const ALL: [RecordKey; 11] = [
        RecordKey::EventInfo,
        RecordKey::Hits,
        RecordKey::CollectionEm1,
        RecordKey::CollectionEm2,
        RecordKey::CollectionEm3,
        RecordKey::CollectionHad1,
        RecordKey::CollectionHad2,
        RecordKey::CollectionHad3,
        RecordKey::Cells,
        RecordKey::TruthCells,
        RecordKey::XTCells,
    ];

    /// Returns the canonical record name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EventInfo => "EventInfo",
            Self::Hits => "Hits",
            Self::CollectionEm1 => "Collection_EM1",
            Self::CollectionEm2 => "Collection_EM2",
            Self::CollectionEm3 => "Collection_EM3",
            Self::CollectionHad1 => "Collection_HAD1",
            Self::CollectionHad2 => "Collection_HAD2",
            Self::CollectionHad3 => "Collection_HAD3",
            Self::Cells => "Cells",
            Self::TruthCells => "TruthCells",
            Self::XTCells => "XTCells",
        }
    }

    /// Returns true for keys that name a per-layer cell collection.
    #[must_use]
    pub fn is_layer_collection(self) -> bool {
        matches!(
            self,
            Self::CollectionEm1
                | Self::CollectionEm2
                | Self::CollectionEm3
                | Self::CollectionHad1
                | Self::CollectionHad2
                | Self::CollectionHad3
        )
    }

    /// Stable numeric code used by binary writers.
    #[must_use]
    pub fn code(self) -> u8 {
        // ALL is indexed in declaration order
        Self::ALL.iter().position(|k| *k == self).map_or(u8::MAX, |i| {
            #[allow(clippy::cast_possible_truncation)]
            let code = i as u8;
            code
        })
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::UnknownRecordKey(s.to_string()))
    }
}
