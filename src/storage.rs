use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate};
use ndarray::Array2;
use ndarray_npy::write_npy;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::{
    config::CollectorConfig,
    types::{FRAMES_PER_RECORDING, LANDMARKS_PER_HAND, LandmarkSequence},
};

pub const METADATA_FILENAME: &str = "metadata.json";
pub const SEQUENCE_EXTENSION: &str = "npy";

/// Creates `base` and one directory per label. Existing directories and
/// their contents are left untouched.
pub fn ensure_layout<S: AsRef<str>>(base: &Path, labels: &[S]) -> Result<()> {
    fs::create_dir_all(base)
        .with_context(|| format!("failed to create dataset directory {}", base.display()))?;
    for label in labels {
        let dir = base.join(label.as_ref());
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create label directory {}", dir.display()))?;
    }
    log::info!(
        "dataset layout ready at {} ({} labels)",
        base.display(),
        labels.len()
    );
    Ok(())
}

pub fn recording_path(base: &Path, label: &str, index: u32) -> PathBuf {
    base.join(label)
        .join(format!("grabacion_{index}.{SEQUENCE_EXTENSION}"))
}

/// Lays the sequence out as a `[frames, width]` array. Rows narrower than the
/// widest one (fewer hands in that frame) are zero-padded on the right.
pub fn sequence_to_array(sequence: &LandmarkSequence) -> Result<Array2<f32>> {
    let rows = sequence.frames().len();
    let width = sequence.row_width();
    let mut flat = Vec::with_capacity(rows * width);
    for frame in sequence.frames() {
        flat.extend_from_slice(frame.as_slice());
        flat.resize(flat.len() + (width - frame.len()), 0.0);
    }
    Array2::from_shape_vec((rows, width), flat)
        .map_err(|err| anyhow!("failed to shape landmark sequence: {err}"))
}

/// Writes through a temporary sibling so an interrupted write never leaves a
/// file under the final recording name.
pub fn write_sequence(path: &Path, sequence: &LandmarkSequence) -> Result<()> {
    let array = sequence_to_array(sequence)?;
    let tmp_path = path.with_extension("npy.partial");
    let written = write_npy(&tmp_path, &array)
        .with_context(|| format!("failed to write {}", tmp_path.display()))
        .and_then(|()| {
            fs::rename(&tmp_path, path).with_context(|| {
                format!(
                    "failed to move recording {} into place at {}",
                    tmp_path.display(),
                    path.display()
                )
            })
        });
    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    #[serde(rename = "fecha_creacion")]
    pub created: String,
    #[serde(rename = "total_senas")]
    pub total_labels: usize,
    #[serde(rename = "grabaciones_por_sena")]
    pub recordings_per_label: u32,
    #[serde(rename = "frames_por_grabacion")]
    pub frames_per_recording: usize,
    #[serde(rename = "landmarks_por_frame")]
    pub landmarks_per_frame: usize,
    #[serde(rename = "senas_incluidas")]
    pub labels: Vec<String>,
}

impl DatasetMetadata {
    pub fn new(config: &CollectorConfig, created: NaiveDate) -> Self {
        Self {
            created: created.format("%Y-%m-%d").to_string(),
            total_labels: config.labels.len(),
            recordings_per_label: config.recordings_per_label(),
            frames_per_recording: FRAMES_PER_RECORDING,
            landmarks_per_frame: LANDMARKS_PER_HAND,
            labels: config.label_names(),
        }
    }

    pub fn for_today(config: &CollectorConfig) -> Self {
        Self::new(config, Local::now().date_naive())
    }

    pub fn read(base: &Path) -> Result<Self> {
        let path = base.join(METADATA_FILENAME);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }
}

pub fn write_metadata(base: &Path, metadata: &DatasetMetadata) -> Result<PathBuf> {
    let path = base.join(METADATA_FILENAME);
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    metadata
        .serialize(&mut serializer)
        .context("failed to serialize dataset metadata")?;

    let mut file =
        fs::File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(&out)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LandmarkVector;
    use ndarray_npy::read_npy;

    fn sequence_with_widths(widths: &[usize]) -> LandmarkSequence {
        let frames = (0..FRAMES_PER_RECORDING)
            .map(|i| {
                let width = widths[i % widths.len()];
                LandmarkVector::new((0..width).map(|v| v as f32 * 0.01).collect())
            })
            .collect();
        LandmarkSequence::from_frames(frames).unwrap()
    }

    #[test]
    fn layout_is_idempotent_and_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("dataset");
        ensure_layout(&base, &["hola", "gracias"]).unwrap();

        let keep = base.join("hola").join("grabacion_1.npy");
        fs::write(&keep, b"existing").unwrap();

        ensure_layout(&base, &["hola", "gracias"]).unwrap();
        assert_eq!(fs::read(&keep).unwrap(), b"existing");

        let mut entries: Vec<_> = fs::read_dir(&base)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["gracias", "hola"]);
    }

    #[test]
    fn recording_path_uses_label_and_index() {
        let path = recording_path(Path::new("base"), "por_favor", 7);
        assert_eq!(path, Path::new("base/por_favor/grabacion_7.npy"));
    }

    #[test]
    fn sequence_round_trips_through_npy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grabacion_1.npy");
        write_sequence(&path, &sequence_with_widths(&[LANDMARKS_PER_HAND])).unwrap();

        let array: Array2<f32> = read_npy(&path).unwrap();
        assert_eq!(array.shape(), &[FRAMES_PER_RECORDING, LANDMARKS_PER_HAND]);
        assert!((array[[3, 2]] - 0.02).abs() < 1e-6);
        assert!(!path.with_extension("npy.partial").exists());
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grabacion_1.npy");
        // A non-empty directory squatting on the final name makes the rename fail.
        fs::create_dir_all(path.join("occupied")).unwrap();

        let result = write_sequence(&path, &sequence_with_widths(&[LANDMARKS_PER_HAND]));

        assert!(result.is_err());
        assert!(!path.with_extension("npy.partial").exists());
        assert!(path.join("occupied").is_dir());
    }

    #[test]
    fn mixed_hand_counts_are_zero_padded() {
        let sequence = sequence_with_widths(&[LANDMARKS_PER_HAND, 2 * LANDMARKS_PER_HAND]);
        let array = sequence_to_array(&sequence).unwrap();
        assert_eq!(array.shape(), &[FRAMES_PER_RECORDING, 2 * LANDMARKS_PER_HAND]);
        assert_eq!(array[[0, LANDMARKS_PER_HAND]], 0.0);
        assert_eq!(array[[0, 2 * LANDMARKS_PER_HAND - 1]], 0.0);
        assert!(array[[1, 2 * LANDMARKS_PER_HAND - 1]] > 0.0);
    }

    #[test]
    fn metadata_uses_dataset_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectorConfig::with_labels(dir.path(), [("hola", 3), ("no", 4)]).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let path = write_metadata(dir.path(), &DatasetMetadata::new(&config, date)).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n    \"fecha_creacion\": \"2024-05-17\""));
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["total_senas"], 2);
        assert_eq!(value["grabaciones_por_sena"], 4);
        assert_eq!(value["frames_por_grabacion"], 30);
        assert_eq!(value["landmarks_por_frame"], 63);
        assert_eq!(value["senas_incluidas"], serde_json::json!(["hola", "no"]));

        let read_back = DatasetMetadata::read(dir.path()).unwrap();
        assert_eq!(read_back.labels, vec!["hola", "no"]);
    }
}
