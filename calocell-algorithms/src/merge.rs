//! Merge of the per-layer collections into the event cell containers.

use std::collections::HashSet;

use calocell_core::cell::CaloCell;
use calocell_core::collection::{CellContainer, MergedCellContainer, TruthCellContainer};
use calocell_core::error::{Error, Result};
use calocell_core::key::RecordKey;
use calocell_core::store::{EventStore, Record};
use log::debug;

/// Unifies all layer collections of an event into reco and truth containers.
#[derive(Clone, Debug)]
pub struct CaloCellMerge {
    collection_keys: Vec<RecordKey>,
    cells_key: RecordKey,
    truth_cells_key: RecordKey,
}

impl CaloCellMerge {
    /// Creates the merge stage.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateCollectionKey`] if a collection key is listed
    /// twice, and a configuration error for empty or misplaced keys.
    pub fn new(
        collection_keys: Vec<RecordKey>,
        cells_key: RecordKey,
        truth_cells_key: RecordKey,
    ) -> Result<Self> {
        if collection_keys.is_empty() {
            return Err(Error::Config("merge needs at least one collection".into()));
        }
        let mut seen = HashSet::new();
        for &key in &collection_keys {
            if !key.is_layer_collection() {
                return Err(Error::Config(format!(
                    "{key} is not a layer collection key"
                )));
            }
            if !seen.insert(key) {
                return Err(Error::DuplicateCollectionKey(key));
            }
        }
        if cells_key == truth_cells_key
            || cells_key.is_layer_collection()
            || truth_cells_key.is_layer_collection()
        {
            return Err(Error::Config(format!(
                "invalid merge outputs {cells_key}/{truth_cells_key}"
            )));
        }
        Ok(Self {
            collection_keys,
            cells_key,
            truth_cells_key,
        })
    }

    /// Stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        "CaloCellMerge"
    }

    /// Input collections in merge order.
    #[must_use]
    pub fn collection_keys(&self) -> &[RecordKey] {
        &self.collection_keys
    }

    /// Key of the reco container.
    #[must_use]
    pub fn cells_key(&self) -> RecordKey {
        self.cells_key
    }

    /// Key of the truth container.
    #[must_use]
    pub fn truth_cells_key(&self) -> RecordKey {
        self.truth_cells_key
    }

    /// Builds the merged container from the layer collections in `store`.
    ///
    /// Cells keep the configured layer order, then bin order within a layer.
    ///
    /// # Errors
    /// Returns [`Error::MissingLayerOutput`] if a layer has not produced its
    /// collection and [`Error::DuplicateCell`] if a cell id repeats.
    pub fn merge(&self, store: &EventStore) -> Result<MergedCellContainer> {
        let mut collections = Vec::with_capacity(self.collection_keys.len());
        for &key in &self.collection_keys {
            let collection = store.collection(key).map_err(|e| match e {
                Error::MissingRecord(k) => Error::MissingLayerOutput(k),
                other => other,
            })?;
            collections.push(collection);
        }

        let total = collections.iter().map(|c| c.len()).sum();
        let mut seen = HashSet::with_capacity(total);
        let mut reco: CellContainer<CaloCell> = CellContainer::with_capacity(total);
        let mut truth = TruthCellContainer::with_capacity(total);
        for cell in collections.iter().flat_map(|c| c.iter()) {
            if !seen.insert(cell.id) {
                return Err(Error::DuplicateCell(cell.id));
            }
            truth.push(cell.truth_cell());
            reco.push(cell.clone());
        }
        Ok(MergedCellContainer { reco, truth })
    }

    /// Merges and records both containers in `store`.
    ///
    /// # Errors
    /// See [`CaloCellMerge::merge`]; also fails if an output key is taken.
    pub fn execute(&self, store: &mut EventStore) -> Result<usize> {
        let MergedCellContainer { reco, truth } = self.merge(store)?;
        let n = reco.len();
        debug!(
            "merged {} collection(s) into {} cell(s) under {}/{}",
            self.collection_keys.len(),
            n,
            self.cells_key,
            self.truth_cells_key
        );
        store.record(self.cells_key, Record::Cells(reco))?;
        store.record(self.truth_cells_key, Record::TruthCells(truth))?;
        Ok(n)
    }
}
