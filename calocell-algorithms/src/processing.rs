//! Per-event execution of the assembled reconstruction chain.

use crate::crosstalk::CrossTalk;
use crate::maker::{CaloCellMaker, CellMakerState};
use crate::merge::CaloCellMerge;
use crate::monitoring::MonitorSet;
use calocell_core::collection::CellCollection;
use calocell_core::error::Result;
use calocell_core::key::RecordKey;
use calocell_core::sampling::{SamplingId, SamplingLayerConfig};
use calocell_core::store::{EventState, EventStore, Record};
use log::debug;
use rayon::prelude::*;

/// Derives the random seed of one layer in one event.
///
/// Results depend only on (run seed, event, sampling), not on scheduling.
#[must_use]
pub fn derive_seed(run_seed: u64, event_number: u64, sampling: SamplingId) -> u64 {
    let mut z = run_seed
        ^ event_number.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ u64::from(sampling.0).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    // splitmix64 finalizer
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Counters of one layer for one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerReport {
    pub collection_key: RecordKey,
    pub state: CellMakerState,
}

/// Summary of one processed event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventReport {
    pub event_number: u64,
    pub layers: Vec<LayerReport>,
    /// Cells in the merged container.
    pub cells: usize,
    /// Cells modified by cross-talk, if the stage ran.
    pub crosstalk_cells: Option<usize>,
}

impl EventReport {
    /// Hits dropped for being outside their layer's bunch window.
    #[must_use]
    pub fn hits_out_of_window(&self) -> usize {
        self.layers.iter().map(|l| l.state.hits_out_of_window).sum()
    }
}

/// Ordered reconstruction chain: cell makers, merge, optional cross-talk.
#[derive(Debug)]
pub struct Pipeline {
    hits_key: RecordKey,
    makers: Vec<CaloCellMaker>,
    merge: CaloCellMerge,
    crosstalk: Option<CrossTalk>,
    seed: u64,
    histogram_path: String,
}

impl Pipeline {
    pub(crate) fn new(
        hits_key: RecordKey,
        makers: Vec<CaloCellMaker>,
        merge: CaloCellMerge,
        crosstalk: Option<CrossTalk>,
        seed: u64,
        histogram_path: String,
    ) -> Self {
        Self {
            hits_key,
            makers,
            merge,
            crosstalk,
            seed,
            histogram_path,
        }
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.makers.iter().map(CaloCellMaker::name).collect();
        names.push(self.merge.name().to_string());
        if let Some(xt) = &self.crosstalk {
            names.push(xt.name().to_string());
        }
        names
    }

    #[must_use]
    pub fn makers(&self) -> &[CaloCellMaker] {
        &self.makers
    }

    #[must_use]
    pub fn merge(&self) -> &CaloCellMerge {
        &self.merge
    }

    #[must_use]
    pub fn crosstalk(&self) -> Option<&CrossTalk> {
        self.crosstalk.as_ref()
    }

    #[must_use]
    pub fn hits_key(&self) -> RecordKey {
        self.hits_key
    }

    #[must_use]
    pub fn histogram_path(&self) -> &str {
        &self.histogram_path
    }

    /// Layer descriptions in configuration order.
    #[must_use]
    pub fn layers(&self) -> Vec<&SamplingLayerConfig> {
        self.makers.iter().map(CaloCellMaker::layer).collect()
    }

    /// Empty monitoring histograms for this chain.
    ///
    /// # Errors
    /// Propagates booking errors.
    pub fn book_monitoring(&self) -> Result<MonitorSet> {
        MonitorSet::book(&self.histogram_path, self.makers.iter().map(CaloCellMaker::layer))
    }

    /// Fills monitoring histograms from a processed event.
    pub fn fill_monitoring(&self, monitor: &mut MonitorSet, store: &EventStore) {
        for maker in &self.makers {
            if let Ok(collection) = store.collection(maker.collection_key()) {
                monitor.fill_collection(&self.histogram_path, &maker.layer().name, collection);
            }
        }
    }

    /// Runs the chain on one event.
    ///
    /// Layers are processed in parallel and joined before the merge. The
    /// store ends in [`EventState::Merged`] or [`EventState::CrossTalkApplied`].
    ///
    /// # Errors
    /// Returns the first failing stage's error.
    pub fn execute(&self, store: &mut EventStore) -> Result<EventReport> {
        store.advance(EventState::Accumulating)?;
        let event_number = store.info().event_number;

        let outputs: Vec<(CellCollection, CellMakerState)> = {
            let hits = store.hits(self.hits_key)?;
            self.makers
                .par_iter()
                .map(|maker| {
                    let mut state = CellMakerState::default();
                    let seed = derive_seed(self.seed, event_number, maker.sampling());
                    maker
                        .process(hits, seed, &mut state)
                        .map(|collection| (collection, state))
                })
                .collect::<Result<Vec<_>>>()?
        };
        store.advance(EventState::Filtered)?;

        let mut layers = Vec::with_capacity(outputs.len());
        for (collection, state) in outputs {
            let key = collection.key;
            store.record(key, Record::Collection(collection))?;
            layers.push(LayerReport {
                collection_key: key,
                state,
            });
        }

        let cells = self.merge.execute(store)?;
        store.advance(EventState::Merged)?;

        let crosstalk_cells = match &self.crosstalk {
            Some(xt) => {
                let changed = xt.execute(store)?;
                store.advance(EventState::CrossTalkApplied)?;
                Some(changed)
            }
            None => None,
        };

        debug!("event {event_number}: {cells} cell(s) reconstructed");
        Ok(EventReport {
            event_number,
            layers,
            cells,
            crosstalk_cells,
        })
    }

    /// Runs the chain on independent events in parallel.
    ///
    /// # Errors
    /// Returns the first error encountered.
    pub fn execute_all(&self, stores: &mut [EventStore]) -> Result<Vec<EventReport>> {
        stores.par_iter_mut().map(|store| self.execute(store)).collect()
    }
}
