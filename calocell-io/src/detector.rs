//! JSON detector description loading.
//!
//! Schema:
//!
//! ```json
//! {
//!   "detector": {
//!     "samplings": [
//!       {
//!         "name": "EMB2",
//!         "sampling": 2,
//!         "collection_key": "Collection_EM2",
//!         "eta_bins": { "min": -1.4, "max": 1.4, "count": 112 },
//!         "phi_bins": [-3.14159, 0.0, 3.14159],
//!         "z": [-3000.0, 3000.0],
//!         "r": [1500.0, 1800.0],
//!         "samples": 5,
//!         "start_sampling_bc": 2,
//!         "shaper": { "step_ns": 0.5, "values": [0.0, 0.1, 1.0] },
//!         "noise": 30.0,
//!         "ofc_a": [...],
//!         "ofc_b": [...],
//!         "bunch_id_start": -21,
//!         "bunch_id_end": 4
//!       }
//!     ]
//!   }
//! }
//! ```
//!
//! Bin edges are either an explicit list or a uniform `{min, max, count}`
//! range. The shaper is given inline or via `shaper_file`, a two-column
//! (time, amplitude) text file resolved relative to the JSON file.
#![allow(clippy::cast_precision_loss)]

use crate::{Error, Result};
use calocell_core::{DetectorDescription, RecordKey, SamplingId, SamplingLayerConfig, ShaperTable};
use log::debug;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const DEFAULT_BUNCH_DURATION_NS: f32 = 25.0;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonConfig {
    detector: JsonDetector,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonDetector {
    samplings: Vec<JsonSampling>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonBins {
    Edges(Vec<f32>),
    Uniform { min: f32, max: f32, count: usize },
}

impl JsonBins {
    fn into_edges(self) -> Vec<f32> {
        match self {
            Self::Edges(edges) => edges,
            Self::Uniform { min, max, count } => {
                let width = (max - min) / count.max(1) as f32;
                (0..=count).map(|i| min + width * i as f32).collect()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonShaper {
    step_ns: f32,
    values: Vec<f32>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonSampling {
    name: String,
    sampling: u16,
    collection_key: String,
    eta_bins: JsonBins,
    phi_bins: JsonBins,
    z: [f32; 2],
    r: [f32; 2],
    samples: usize,
    start_sampling_bc: i32,
    #[serde(default)]
    shaper: Option<JsonShaper>,
    #[serde(default)]
    shaper_file: Option<PathBuf>,
    noise: f32,
    ofc_a: Vec<f32>,
    ofc_b: Vec<f32>,
    bunch_id_start: i32,
    bunch_id_end: i32,
    #[serde(default)]
    bunch_duration: Option<f32>,
}

/// Loads a detector description from a JSON file.
///
/// The description is validated before it is returned.
///
/// # Errors
/// Returns an error if the file cannot be read, contains unknown properties
/// or describes an inconsistent detector.
pub fn load_detector<P: AsRef<Path>>(path: P) -> Result<DetectorDescription> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config: JsonConfig = serde_json::from_reader(reader)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    from_json_config(config, base)
}

/// Parses a detector description from a JSON string.
///
/// Relative `shaper_file` paths are resolved against the working directory.
///
/// # Errors
/// Returns an error for malformed JSON, unknown properties or an
/// inconsistent detector.
pub fn parse_detector(json: &str) -> Result<DetectorDescription> {
    let config: JsonConfig = serde_json::from_str(json)?;
    from_json_config(config, Path::new("."))
}

fn from_json_config(config: JsonConfig, base: &Path) -> Result<DetectorDescription> {
    let samplings = config
        .detector
        .samplings
        .into_iter()
        .map(|s| sampling_from_json(s, base))
        .collect::<Result<Vec<_>>>()?;

    let detector = DetectorDescription::new(samplings);
    detector.validate()?;
    debug!(
        "loaded detector description with {} sampling layer(s)",
        detector.samplings.len()
    );
    Ok(detector)
}

fn sampling_from_json(s: JsonSampling, base: &Path) -> Result<SamplingLayerConfig> {
    let collection_key: RecordKey = s.collection_key.parse()?;

    let shaper = match (s.shaper, s.shaper_file) {
        (Some(inline), None) => ShaperTable::new(inline.step_ns, inline.values),
        (None, Some(file)) => read_shaper_file(base.join(file))?,
        (Some(_), Some(_)) => {
            return Err(Error::InvalidFormat(format!(
                "layer '{}' sets both shaper and shaper_file",
                s.name
            )))
        }
        (None, None) => {
            return Err(Error::InvalidFormat(format!(
                "layer '{}' has no shaper",
                s.name
            )))
        }
    };

    Ok(SamplingLayerConfig {
        name: s.name,
        sampling: SamplingId(s.sampling),
        collection_key,
        eta_bins: s.eta_bins.into_edges(),
        phi_bins: s.phi_bins.into_edges(),
        z_min: s.z[0],
        z_max: s.z[1],
        r_min: s.r[0],
        r_max: s.r[1],
        samples: s.samples,
        start_sampling_bc: s.start_sampling_bc,
        shaper,
        noise: s.noise,
        ofc_a: s.ofc_a,
        ofc_b: s.ofc_b,
        bunch_id_start: s.bunch_id_start,
        bunch_id_end: s.bunch_id_end,
        bunch_duration: s.bunch_duration.unwrap_or(DEFAULT_BUNCH_DURATION_NS),
    })
}

/// Reads a two-column (time in ns, amplitude) shaper table.
///
/// Blank lines and lines starting with `#` are skipped. Times must be
/// uniformly spaced.
///
/// # Errors
/// Returns [`Error::InvalidFormat`] for unparsable lines, fewer than two
/// points or a non-uniform time step.
pub fn read_shaper_file<P: AsRef<Path>>(path: P) -> Result<ShaperTable> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut times = Vec::new();
    let mut values = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut columns = line.split_whitespace().map(str::parse::<f32>);
        match (columns.next(), columns.next(), columns.next()) {
            (Some(Ok(t)), Some(Ok(v)), None) => {
                times.push(t);
                values.push(v);
            }
            _ => {
                return Err(Error::InvalidFormat(format!(
                    "{}:{}: expected two numeric columns",
                    path.display(),
                    index + 1
                )))
            }
        }
    }

    if times.len() < 2 {
        return Err(Error::InvalidFormat(format!(
            "{}: shaper needs at least two points",
            path.display()
        )));
    }
    let step_ns = times[1] - times[0];
    let uniform = times
        .windows(2)
        .all(|w| ((w[1] - w[0]) - step_ns).abs() <= 1e-4 * step_ns.abs().max(1.0));
    if step_ns.is_nan() || step_ns <= 0.0 || !uniform {
        return Err(Error::InvalidFormat(format!(
            "{}: shaper times must be uniformly increasing",
            path.display()
        )));
    }

    Ok(ShaperTable::new(step_ns, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn layer_json(extra: &str) -> String {
        format!(
            r#"{{
              "detector": {{
                "samplings": [{{
                  "name": "EMB2",
                  "sampling": 2,
                  "collection_key": "Collection_EM2",
                  "eta_bins": {{ "min": -1.0, "max": 1.0, "count": 4 }},
                  "phi_bins": [-3.2, 0.0, 3.2],
                  "z": [-3000.0, 3000.0],
                  "r": [1500.0, 1800.0],
                  "samples": 3,
                  "start_sampling_bc": 1,
                  "noise": 30.0,
                  "ofc_a": [0.0, 1.0, 0.0],
                  "ofc_b": [0.0, 0.0, 0.0],
                  "bunch_id_start": -2,
                  "bunch_id_end": 1{extra}
                }}]
              }}
            }}"#
        )
    }

    #[test]
    fn test_parse_inline_shaper() {
        let json = layer_json(r#", "shaper": { "step_ns": 25.0, "values": [0.0, 1.0, 0.5] }"#);
        let detector = parse_detector(&json).unwrap();
        let layer = &detector.samplings[0];
        assert_eq!(layer.collection_key, RecordKey::CollectionEm2);
        assert_eq!(layer.eta_bins.len(), 5);
        assert_abs_diff_eq!(layer.eta_bins[2], 0.0);
        assert_abs_diff_eq!(layer.bunch_duration, 25.0);
        assert_eq!(layer.shaper.values, vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_unknown_property_rejected() {
        let json = layer_json(
            r#", "shaper": { "step_ns": 25.0, "values": [1.0] }, "pedestal_typo": 3.0"#,
        );
        assert!(matches!(parse_detector(&json), Err(Error::JsonError(_))));
    }

    #[test]
    fn test_unknown_collection_key_rejected() {
        let json = layer_json(r#", "shaper": { "step_ns": 25.0, "values": [1.0] }"#)
            .replace("Collection_EM2", "Collection_EM7");
        let err = parse_detector(&json).unwrap_err();
        assert!(matches!(
            err,
            Error::CoreError(calocell_core::Error::UnknownRecordKey(_))
        ));
    }

    #[test]
    fn test_missing_shaper_rejected() {
        assert!(matches!(
            parse_detector(&layer_json("")),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_inconsistent_layer_rejected() {
        let json = layer_json(r#", "shaper": { "step_ns": 25.0, "values": [1.0] }"#)
            .replace(r#""ofc_b": [0.0, 0.0, 0.0]"#, r#""ofc_b": [0.0, 0.0]"#);
        let err = parse_detector(&json).unwrap_err();
        assert!(matches!(err, Error::CoreError(ref e) if e.is_configuration()));
    }

    #[test]
    fn test_load_with_shaper_file() {
        let dir = TempDir::new().unwrap();
        let mut shaper = File::create(dir.path().join("shaper.dat")).unwrap();
        writeln!(shaper, "# time amplitude").unwrap();
        writeln!(shaper, "0.0 0.0").unwrap();
        writeln!(shaper, "12.5 0.8").unwrap();
        writeln!(shaper, "25.0 0.4").unwrap();

        let json_path = dir.path().join("detector.json");
        std::fs::write(&json_path, layer_json(r#", "shaper_file": "shaper.dat""#)).unwrap();

        let detector = load_detector(&json_path).unwrap();
        let shaper = &detector.samplings[0].shaper;
        assert_abs_diff_eq!(shaper.step_ns, 12.5);
        assert_eq!(shaper.values, vec![0.0, 0.8, 0.4]);
    }

    #[test]
    fn test_shaper_file_non_uniform() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "0.0 0.0\n1.0 1.0\n3.0 0.5").unwrap();
        assert!(matches!(
            read_shaper_file(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_shaper_file_bad_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "0.0 0.0\n1.0").unwrap();
        assert!(matches!(
            read_shaper_file(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }
}
