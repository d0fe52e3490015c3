use calocell_algorithms::{CaloCellBuilder, CellBuilderConfig};
use calocell_core::{EventState, RecordKey};
use calocell_io::{load_detector, CellFileWriter, HitEventReader, BINARY_RECORD_SIZE};
use std::io::Write;
use tempfile::TempDir;

const DETECTOR: &str = r#"{
  "detector": {
    "samplings": [
      {
        "name": "EMB1",
        "sampling": 1,
        "collection_key": "Collection_EM1",
        "eta_bins": { "min": -1.0, "max": 1.0, "count": 8 },
        "phi_bins": { "min": -3.1415927, "max": 3.1415927, "count": 16 },
        "z": [-5000.0, 5000.0],
        "r": [1400.0, 1500.0],
        "samples": 5,
        "start_sampling_bc": 2,
        "shaper_file": "shaper.dat",
        "noise": 20.0,
        "ofc_a": [0.0, 0.0, 1.0, 0.0, 0.0],
        "ofc_b": [0.0, 0.0, 0.0, 0.0, 0.0],
        "bunch_id_start": -21,
        "bunch_id_end": 4
      },
      {
        "name": "EMB2",
        "sampling": 2,
        "collection_key": "Collection_EM2",
        "eta_bins": { "min": -1.0, "max": 1.0, "count": 8 },
        "phi_bins": { "min": -3.1415927, "max": 3.1415927, "count": 16 },
        "z": [-5000.0, 5000.0],
        "r": [1500.0, 1800.0],
        "samples": 5,
        "start_sampling_bc": 2,
        "shaper_file": "shaper.dat",
        "noise": 30.0,
        "ofc_a": [0.0, 0.0, 1.0, 0.0, 0.0],
        "ofc_b": [0.0, 0.0, 0.0, 0.0, 0.0],
        "bunch_id_start": -21,
        "bunch_id_end": 4
      }
    ]
  }
}"#;

const EVENTS: &str = r#"{"event_number": 1, "hits": [{"x": 1450.0, "y": 20.0, "z": 0.0, "time": 5.0, "edep": 400.0}, {"x": 1600.0, "y": 20.0, "z": 0.0, "time": 5.5, "edep": 900.0}]}
{"event_number": 2, "hits": [{"x": 1600.0, "y": -300.0, "z": 200.0, "time": 6.0, "edep": 120.0, "bcid": 0}]}
"#;

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let mut shaper = std::fs::File::create(dir.path().join("shaper.dat")).unwrap();
    for (i, v) in [0.0, 0.3, 1.0, 0.6, 0.2, 0.0].iter().enumerate() {
        writeln!(shaper, "{} {v}", 25.0 * i as f32).unwrap();
    }
    std::fs::write(dir.path().join("detector.json"), DETECTOR).unwrap();
    std::fs::write(dir.path().join("hits.jsonl"), EVENTS).unwrap();
    dir
}

#[test]
fn test_files_to_cells() {
    let dir = workspace();
    let detector = load_detector(dir.path().join("detector.json")).unwrap();
    assert_eq!(detector.samplings.len(), 2);

    let pipeline = CaloCellBuilder::new(detector, CellBuilderConfig::default())
        .configure()
        .unwrap();
    let mut stores: Vec<_> = HitEventReader::open(dir.path().join("hits.jsonl"))
        .unwrap()
        .collect::<calocell_io::Result<_>>()
        .unwrap();
    assert_eq!(stores.len(), 2);
    pipeline.execute_all(&mut stores).unwrap();

    let output = dir.path().join("cells.bin");
    let mut writer = CellFileWriter::create(&output).unwrap();
    let mut expected = 0;
    for store in &mut stores {
        expected += 2 * store.cells(RecordKey::Cells).unwrap().len();
        writer.write_event(store).unwrap();
        store.advance(EventState::Persisted).unwrap();
    }
    writer.flush().unwrap();

    assert_eq!(expected, 6);
    assert_eq!(writer.records(), expected);
    let data = std::fs::read(&output).unwrap();
    assert_eq!(data.len(), expected * BINARY_RECORD_SIZE);
}

#[test]
fn test_csv_output_includes_crosstalk_cells() {
    let dir = workspace();
    let detector = load_detector(dir.path().join("detector.json")).unwrap();
    let pipeline = CaloCellBuilder::new(detector, CellBuilderConfig::default().with_crosstalk(true))
        .configure()
        .unwrap();

    let mut reader = HitEventReader::open(dir.path().join("hits.jsonl")).unwrap();
    let mut store = reader.read_event().unwrap().unwrap();
    pipeline.execute(&mut store).unwrap();

    let output = dir.path().join("cells.csv");
    let mut writer = CellFileWriter::create(&output).unwrap();
    writer.write_event(&store).unwrap();
    writer.flush().unwrap();

    let content = std::fs::read_to_string(&output).unwrap();
    assert!(content.lines().next().unwrap().starts_with("event,key,hash"));
    assert_eq!(content.lines().filter(|l| l.starts_with("1,Cells,")).count(), 2);
    assert_eq!(content.lines().filter(|l| l.starts_with("1,TruthCells,")).count(), 2);
    assert_eq!(content.lines().filter(|l| l.starts_with("1,XTCells,")).count(), 2);
}
