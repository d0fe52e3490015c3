//! Cell collections and containers.

use crate::cell::{CaloCell, CellId, CellRecord, TruthCell};
use crate::key::RecordKey;
use crate::sampling::SamplingId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cells of one sampling layer for one event, in bin order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellCollection {
    pub key: RecordKey,
    pub sampling: SamplingId,
    pub cells: Vec<CaloCell>,
}

impl CellCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new(key: RecordKey, sampling: SamplingId) -> Self {
        Self {
            key,
            sampling,
            cells: Vec::new(),
        }
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if no cell was populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterates over the cells.
    pub fn iter(&self) -> impl Iterator<Item = &CaloCell> {
        self.cells.iter()
    }

    /// Finds a cell by id.
    #[must_use]
    pub fn get(&self, id: CellId) -> Option<&CaloCell> {
        self.cells
            .binary_search_by(|c| c.id.cmp(&id))
            .ok()
            .map(|i| &self.cells[i])
    }
}

/// Ordered container of cell records.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellContainer<C = CaloCell> {
    pub cells: Vec<C>,
}

impl<C> Default for CellContainer<C> {
    fn default() -> Self {
        Self { cells: Vec::new() }
    }
}

/// Container of noise-free cells.
pub type TruthCellContainer = CellContainer<TruthCell>;

impl<C> CellContainer<C> {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a container with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    /// Appends a cell.
    pub fn push(&mut self, cell: C) {
        self.cells.push(cell);
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterates over the cells.
    pub fn iter(&self) -> impl Iterator<Item = &C> {
        self.cells.iter()
    }
}

impl<C: CellRecord> CellContainer<C> {
    /// Cell ids in container order.
    #[must_use]
    pub fn ids(&self) -> Vec<CellId> {
        self.cells.iter().map(CellRecord::id).collect()
    }

    /// Sum of all cell energies.
    #[must_use]
    pub fn total_energy(&self) -> f32 {
        self.cells.iter().map(CellRecord::energy).sum()
    }
}

impl<C> FromIterator<C> for CellContainer<C> {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

/// Union of all layer collections of an event, split into reco and truth views.
///
/// Both views hold the same cell ids in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedCellContainer {
    pub reco: CellContainer,
    pub truth: TruthCellContainer,
}
