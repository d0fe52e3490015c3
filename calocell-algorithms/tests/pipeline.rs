use approx::assert_abs_diff_eq;
use calocell_algorithms::{
    CaloCellBuilder, CaloCellMaker, CellBuilderConfig, CellEstimator, CellMakerState,
    OptimalFilter, PulseGeneratorConfig,
};
use calocell_core::{
    CaloHit, DetectorDescription, Error, EventInfo, EventState, EventStore, Position, RecordKey,
    SamplingId, SamplingLayerConfig, ShaperTable,
};
use std::f32::consts::PI;

fn layer(
    name: &str,
    sampling: u16,
    key: RecordKey,
    r: (f32, f32),
    n_eta: usize,
    n_phi: usize,
) -> SamplingLayerConfig {
    let eta_bins = (0..=n_eta)
        .map(|i| -1.0 + 2.0 * i as f32 / n_eta as f32)
        .collect();
    let phi_bins = (0..=n_phi)
        .map(|i| -PI + 2.0 * PI * i as f32 / n_phi as f32)
        .collect();
    let mut ofc_a = vec![0.0; 7];
    ofc_a[3] = 1.0;
    SamplingLayerConfig {
        name: name.to_string(),
        sampling: SamplingId(sampling),
        collection_key: key,
        eta_bins,
        phi_bins,
        z_min: -5000.0,
        z_max: 5000.0,
        r_min: r.0,
        r_max: r.1,
        samples: 7,
        start_sampling_bc: 3,
        shaper: ShaperTable::new(25.0, vec![0.0, 0.2, 0.6, 1.0, 0.7, 0.3, 0.1, 0.0]),
        noise: 30.0,
        ofc_a,
        ofc_b: vec![0.0; 7],
        bunch_id_start: -21,
        bunch_id_end: 4,
        bunch_duration: 25.0,
    }
}

fn single_cell_detector() -> DetectorDescription {
    DetectorDescription::new(vec![layer(
        "EMB2",
        2,
        RecordKey::CollectionEm2,
        (1500.0, 1800.0),
        1,
        1,
    )])
}

fn two_layer_detector() -> DetectorDescription {
    DetectorDescription::new(vec![
        layer("EMB1", 1, RecordKey::CollectionEm1, (1400.0, 1500.0), 4, 8),
        layer("EMB2", 2, RecordKey::CollectionEm2, (1500.0, 1800.0), 4, 8),
    ])
}

fn event(number: u64, hits: Vec<CaloHit>) -> EventStore {
    let info = EventInfo {
        event_number: number,
        ..EventInfo::default()
    };
    EventStore::new(info, RecordKey::Hits, hits)
}

fn hit(x: f32, y: f32, z: f32, edep: f32, bcid: i32) -> CaloHit {
    CaloHit::new(Position::new(x, y, z), 5.5, edep, bcid)
}

#[test]
fn test_single_hit_in_time_recovers_energy() {
    let pipeline = CaloCellBuilder::new(single_cell_detector(), CellBuilderConfig::default())
        .configure()
        .unwrap();
    // 10 GeV
    let mut store = event(0, vec![hit(1600.0, 0.0, 0.0, 10_000.0, 0)]);
    let report = pipeline.execute(&mut store).unwrap();
    assert_eq!(report.cells, 1);
    assert_eq!(store.state(), EventState::Merged);

    let cells = store.cells(RecordKey::Cells).unwrap();
    assert_eq!(cells.len(), 1);
    let cell = &cells.cells[0];
    assert_abs_diff_eq!(cell.energy, 10_000.0, epsilon = 1e-2);
    assert_abs_diff_eq!(cell.time, 0.0);
    assert_abs_diff_eq!(cell.pulse[3], 10_000.0, epsilon = 1e-2);
    assert_abs_diff_eq!(cell.pulse[2], 6_000.0, epsilon = 1e-2);

    let truth = store.truth_cells(RecordKey::TruthCells).unwrap();
    assert_abs_diff_eq!(truth.cells[0].energy, 10_000.0);
}

#[test]
fn test_out_of_window_hit_creates_no_cell() {
    let pipeline = CaloCellBuilder::new(single_cell_detector(), CellBuilderConfig::default())
        .configure()
        .unwrap();
    let mut store = event(0, vec![hit(1600.0, 0.0, 0.0, 10_000.0, 10)]);
    let report = pipeline.execute(&mut store).unwrap();
    assert_eq!(report.cells, 0);
    assert_eq!(report.hits_out_of_window(), 1);
    assert!(store.cells(RecordKey::Cells).unwrap().is_empty());
    assert!(store
        .collection(RecordKey::CollectionEm2)
        .unwrap()
        .is_empty());
}

#[test]
fn test_duplicate_collection_key_fails_before_processing() {
    let mut detector = two_layer_detector();
    detector.samplings[1].collection_key = RecordKey::CollectionEm1;
    let err = CaloCellBuilder::new(detector, CellBuilderConfig::default())
        .configure()
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DuplicateCollectionKey(RecordKey::CollectionEm1)
    ));
    assert!(err.is_configuration());
}

#[test]
fn test_inconsistent_layer_fails_before_processing() {
    let mut detector = two_layer_detector();
    detector.samplings[0].ofc_b.pop();
    let err = CaloCellBuilder::new(detector, CellBuilderConfig::default())
        .configure()
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_stage_order() {
    let pipeline = CaloCellBuilder::new(two_layer_detector(), CellBuilderConfig::default())
        .configure()
        .unwrap();
    assert_eq!(
        pipeline.stages(),
        vec![
            "CaloCellMaker_Collection_EM1",
            "CaloCellMaker_Collection_EM2",
            "CaloCellMerge"
        ]
    );
    let with_xt = CaloCellBuilder::new(
        two_layer_detector(),
        CellBuilderConfig::default().with_crosstalk(true),
    )
    .configure()
    .unwrap();
    assert_eq!(with_xt.stages().last().map(String::as_str), Some("CrossTalk"));
}

#[test]
fn test_accumulation_is_order_independent() {
    let detector = two_layer_detector();
    let maker =
        CaloCellMaker::new(detector.samplings[1].clone(), &PulseGeneratorConfig::default())
            .unwrap();
    let hits = vec![
        hit(1600.0, 100.0, 50.0, 120.0, 0),
        hit(1600.0, 110.0, 60.0, 40.0, -1),
        hit(1600.0, 90.0, 40.0, 75.0, 2),
        hit(-1600.0, -100.0, 800.0, 33.0, 0),
    ];
    let mut reversed = hits.clone();
    reversed.reverse();

    let mut s1 = CellMakerState::default();
    let mut s2 = CellMakerState::default();
    let a = maker.process(&hits, 7, &mut s1).unwrap();
    let b = maker.process(&reversed, 7, &mut s2).unwrap();
    assert_eq!(a.len(), 2);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.id, y.id);
        for (p, q) in x.pulse.iter().zip(&y.pulse) {
            assert_abs_diff_eq!(p, q, epsilon = 1e-3);
        }
        assert_abs_diff_eq!(x.energy, y.energy, epsilon = 1e-3);
    }
}

#[test]
fn test_filter_is_idempotent_on_reconstructed_pulse() {
    let pipeline = CaloCellBuilder::new(single_cell_detector(), CellBuilderConfig::default())
        .configure()
        .unwrap();
    let mut store = event(0, vec![hit(1600.0, 0.0, 0.0, 500.0, 0), hit(1600.0, 0.0, 0.0, 80.0, 1)]);
    pipeline.execute(&mut store).unwrap();
    let cell = &store.cells(RecordKey::Cells).unwrap().cells[0];
    let layer = &single_cell_detector().samplings[0];
    let of = OptimalFilter::from_layer(layer).unwrap();
    let first = of.estimate(&cell.pulse, cell.noise).unwrap();
    let second = of.estimate(&cell.pulse, cell.noise).unwrap();
    assert_eq!(first, second);
    assert_abs_diff_eq!(first.energy, cell.energy);
}

#[test]
fn test_merge_is_union_of_layers() {
    let pipeline = CaloCellBuilder::new(two_layer_detector(), CellBuilderConfig::default())
        .configure()
        .unwrap();
    let hits = vec![
        hit(1450.0, 10.0, 0.0, 100.0, 0),
        hit(1600.0, 10.0, 0.0, 100.0, 0),
        hit(-1600.0, 10.0, 900.0, 100.0, 0),
        hit(1000.0, 0.0, 0.0, 100.0, 0),
    ];
    let mut store = event(3, hits);
    pipeline.execute(&mut store).unwrap();

    let em1 = store.collection(RecordKey::CollectionEm1).unwrap();
    let em2 = store.collection(RecordKey::CollectionEm2).unwrap();
    let mut expected: Vec<_> = em1.iter().chain(em2.iter()).map(|c| c.id).collect();
    assert_eq!(expected.len(), 3);

    let merged = store.cells(RecordKey::Cells).unwrap().ids();
    assert_eq!(merged, expected);
    expected.sort();
    expected.dedup();
    assert_eq!(expected.len(), merged.len());
    assert_eq!(store.truth_cells(RecordKey::TruthCells).unwrap().ids(), merged);
}

#[test]
fn test_events_are_independent_and_seeded() {
    let config = CellBuilderConfig::default()
        .with_pulse(PulseGeneratorConfig::default().with_noise(0.0, 20.0))
        .with_seed(11);
    let pipeline = CaloCellBuilder::new(two_layer_detector(), config)
        .configure()
        .unwrap();
    let hits = vec![hit(1600.0, 10.0, 0.0, 100.0, 0)];

    let mut batch = vec![event(1, hits.clone()), event(2, hits.clone())];
    let reports = pipeline.execute_all(&mut batch).unwrap();
    assert_eq!(reports.len(), 2);

    let mut again = event(1, hits);
    pipeline.execute(&mut again).unwrap();
    assert_eq!(
        batch[0].cells(RecordKey::Cells).unwrap(),
        again.cells(RecordKey::Cells).unwrap()
    );
    assert_ne!(
        batch[0].cells(RecordKey::Cells).unwrap(),
        batch[1].cells(RecordKey::Cells).unwrap()
    );
}

#[test]
fn test_store_is_processed_once() {
    let pipeline = CaloCellBuilder::new(single_cell_detector(), CellBuilderConfig::default())
        .configure()
        .unwrap();
    let mut store = event(0, Vec::new());
    pipeline.execute(&mut store).unwrap();
    assert!(matches!(
        pipeline.execute(&mut store),
        Err(Error::InvalidTransition { .. })
    ));
    store.advance(EventState::Persisted).unwrap();
}

#[test]
fn test_monitoring_has_no_effect_on_results() {
    let pipeline = CaloCellBuilder::new(two_layer_detector(), CellBuilderConfig::default())
        .configure()
        .unwrap();
    let mut monitor = pipeline.book_monitoring().unwrap();
    let mut store = event(0, vec![hit(1600.0, 10.0, 0.0, 100.0, 0)]);
    pipeline.execute(&mut store).unwrap();
    let before = store.cells(RecordKey::Cells).unwrap().clone();
    pipeline.fill_monitoring(&mut monitor, &store);
    assert_eq!(store.cells(RecordKey::Cells).unwrap(), &before);
    let energy = monitor.get("Expert/EMB2/cells_energy").unwrap();
    assert_eq!(energy.entries(), 1);
    assert_eq!(monitor.get("Expert/EMB1/cells_energy").unwrap().entries(), 0);
}
