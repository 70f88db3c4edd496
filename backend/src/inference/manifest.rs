use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use super::labels::{LABELS, index_of_label};
use super::preprocess::INPUT_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Manifest lists {actual} labels, the classifier has {expected}")]
    LabelCount { expected: usize, actual: usize },
    #[error("Label {index} is {actual:?} in the manifest but {expected:?} in the classifier")]
    LabelMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("Manifest input size {actual} does not match the preprocessor ({expected})")]
    InputSize { expected: u32, actual: u32 },
    #[error("Weights checksum mismatch: manifest has {expected}, file has {actual}")]
    Checksum { expected: String, actual: String },
}

/// Versioned description of the model artifact: the label vocabulary in
/// output order and, optionally, the checksum of the weights it was trained as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub version: String,
    pub input_size: u32,
    pub labels: Vec<String>,
    #[serde(default)]
    pub weights_sha256: Option<String>,
}

impl ModelManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Checks the manifest against the compiled-in vocabulary and preprocessor.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.input_size != INPUT_SIZE {
            return Err(ManifestError::InputSize {
                expected: INPUT_SIZE,
                actual: self.input_size,
            });
        }
        if self.labels.len() != LABELS.len() {
            return Err(ManifestError::LabelCount {
                expected: LABELS.len(),
                actual: self.labels.len(),
            });
        }
        for (index, (expected, actual)) in LABELS.iter().zip(&self.labels).enumerate() {
            if expected != actual {
                match index_of_label(actual) {
                    Some(found) => log::error!(
                        "Manifest label {} is at position {} but the classifier emits it at {}",
                        actual,
                        index,
                        found
                    ),
                    None => log::error!("Manifest label {} is not in the classifier vocabulary", actual),
                }
                return Err(ManifestError::LabelMismatch {
                    index,
                    expected: expected.to_string(),
                    actual: actual.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn verify_weights(&self, weights_path: &Path) -> Result<(), ManifestError> {
        let Some(expected) = &self.weights_sha256 else {
            log::warn!(
                "Model manifest {} has no weights checksum; skipping verification",
                self.version
            );
            return Ok(());
        };

        let actual = file_sha256(weights_path)?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(ManifestError::Checksum {
                expected: expected.clone(),
                actual,
            });
        }
        log::info!("Weights checksum verified for manifest {}", self.version);
        Ok(())
    }
}

pub fn file_sha256(path: &Path) -> Result<String, ManifestError> {
    let io_err = |source| ManifestError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).map_err(io_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
