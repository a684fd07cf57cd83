use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use crate::model_download::{
    default_handpose_estimator_model_path, default_palm_detector_model_path,
};

const DEFAULT_BASE_DIR: &str = "dataset_senas";
const DEFAULT_RECORDINGS_PER_LABEL: u32 = 30;
const DEFAULT_LABELS: &[&str] = &["hola", "gracias", "por_favor", "ayuda", "si", "no"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("at least one sign label is required")]
    NoLabels,
    #[error("sign label names must not be empty")]
    EmptyLabel,
    #[error("sign label '{0}' is listed more than once")]
    DuplicateLabel(String),
    #[error("sign label '{0}' cannot be used as a directory name")]
    InvalidLabel(String),
    #[error("sign label '{0}' needs at least one recording")]
    ZeroRecordings(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LabelTarget {
    pub name: String,
    pub recordings: u32,
}

impl LabelTarget {
    pub fn new(name: impl Into<String>, recordings: u32) -> Self {
        Self {
            name: name.into(),
            recordings,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub handpose_estimator: PathBuf,
    pub palm_detector: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            handpose_estimator: default_handpose_estimator_model_path(),
            palm_detector: default_palm_detector_model_path(),
        }
    }
}

/// Immutable collection settings handed to the collector at start-up.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub base_dir: PathBuf,
    pub labels: Vec<LabelTarget>,
    pub camera_index: u32,
    /// Consecutive hand-less frames tolerated while recording; `None` waits forever.
    pub max_idle_frames: Option<u32>,
    pub models: ModelPaths,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            labels: DEFAULT_LABELS
                .iter()
                .map(|name| LabelTarget::new(*name, DEFAULT_RECORDINGS_PER_LABEL))
                .collect(),
            camera_index: 0,
            max_idle_frames: None,
            models: ModelPaths::default(),
        }
    }
}

impl CollectorConfig {
    pub fn with_labels<I, S>(base_dir: impl Into<PathBuf>, labels: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let config = Self {
            base_dir: base_dir.into(),
            labels: labels
                .into_iter()
                .map(|(name, recordings)| LabelTarget::new(name, recordings))
                .collect(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.labels.is_empty() {
            return Err(ConfigError::NoLabels);
        }

        let mut seen = HashSet::new();
        for label in &self.labels {
            let name = label.name.as_str();
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyLabel);
            }
            if name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(ConfigError::InvalidLabel(label.name.clone()));
            }
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateLabel(label.name.clone()));
            }
            if label.recordings == 0 {
                return Err(ConfigError::ZeroRecordings(label.name.clone()));
            }
        }

        Ok(())
    }

    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }

    /// Largest per-label target; recorded in the dataset metadata.
    pub fn recordings_per_label(&self) -> u32 {
        self.labels.iter().map(|l| l.recordings).max().unwrap_or(0)
    }
}
