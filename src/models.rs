//! Segmentation model specification and asset loading
//!
//! The model file is an opaque ONNX asset at a known location. This module only
//! knows how to find it, read it, optionally verify its checksum, and describe
//! how the backend should feed it and read its output.

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Default location of the bundled model, relative to the working directory
pub const DEFAULT_MODEL_PATH: &str = "models/segmentation.onnx";

/// How the raw per-pixel model output is to be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputInterpretation {
    /// Single channel foreground probability in `[0, 1]`
    Probability,
    /// Single channel raw logits, sigmoid applied before thresholding
    Logits,
    /// Single channel of class ids; anything other than `background` is foreground
    ClassIndex { background: u32 },
    /// One score channel per class; the arg-max class decides membership
    ClassScores { background: u32 },
}

impl Default for OutputInterpretation {
    fn default() -> Self {
        Self::Probability
    }
}

/// Preprocessing parameters for the model input tensor
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Model input size as `[width, height]`
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

/// Specification of the segmentation model asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    /// Path to the ONNX model file
    pub path: PathBuf,
    /// Display name used in logs; falls back to the file stem
    pub name: Option<String>,
    /// Model input size as `(width, height)`
    pub input_size: (u32, u32),
    /// Per-channel RGB mean applied after scaling to `[0, 1]`
    pub mean: [f32; 3],
    /// Per-channel RGB standard deviation
    pub std: [f32; 3],
    /// How the model output is read
    pub interpretation: OutputInterpretation,
    /// Expected lowercase hex SHA-256 of the model file
    pub sha256: Option<String>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_MODEL_PATH),
            name: None,
            input_size: (1024, 1024),
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            interpretation: OutputInterpretation::Probability,
            sha256: None,
        }
    }
}

impl ModelSpec {
    /// Create a spec for the model at `path` with default preprocessing
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map_or_else(|| "model".to_string(), |s| s.to_string_lossy().into_owned())
        })
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [self.input_size.0, self.input_size.1],
            normalization_mean: self.mean,
            normalization_std: self.std,
        }
    }

    /// Check the spec for values no model could satisfy
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(BgRemovalError::invalid_config("Model path must not be empty"));
        }
        let (width, height) = self.input_size;
        if width == 0 || height == 0 || width > 8192 || height > 8192 {
            return Err(BgRemovalError::config_value_error(
                "model input size",
                format!("{width}x{height}"),
                "1-8192 per side",
            ));
        }
        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(BgRemovalError::invalid_config(
                "Normalization std values must be finite and positive",
            ));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(BgRemovalError::invalid_config(
                "Normalization mean values must be finite",
            ));
        }
        if let Some(ref digest) = self.sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(BgRemovalError::invalid_config(format!(
                    "Model sha256 must be 64 hex characters, got '{digest}'"
                )));
            }
        }
        Ok(())
    }
}

/// Information about a loaded model asset
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    /// NCHW input shape
    pub input_shape: (usize, usize, usize, usize),
}

/// Model bytes read from disk and verified against the spec
#[derive(Debug, Clone)]
pub struct ModelAsset {
    spec: ModelSpec,
    bytes: Vec<u8>,
}

impl ModelAsset {
    /// Read and verify the model asset
    ///
    /// # Errors
    /// `ModelUnavailable` when the file is missing, unreadable, empty or fails
    /// checksum verification.
    pub fn load(spec: &ModelSpec) -> Result<Self> {
        let path = spec.path.as_path();

        if !path.is_file() {
            return Err(BgRemovalError::model_error_with_context(
                "locate",
                path,
                "file does not exist",
                &["check the configured model path"],
            ));
        }

        let bytes = std::fs::read(path).map_err(|e| {
            BgRemovalError::model_error_with_context("read", path, &e.to_string(), &[])
        })?;

        if bytes.is_empty() {
            return Err(BgRemovalError::model_error_with_context(
                "read",
                path,
                "file is empty",
                &["re-install the model asset"],
            ));
        }

        if let Some(ref expected) = spec.sha256 {
            let actual = sha256_hex(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(BgRemovalError::model_error_with_context(
                    "verify",
                    path,
                    &format!("checksum mismatch (expected {expected}, got {actual})"),
                    &["the model file is corrupted or was replaced"],
                ));
            }
        }

        log::debug!(
            "Loaded model asset {} ({} bytes)",
            path.display(),
            bytes.len()
        );

        Ok(Self {
            spec: spec.clone(),
            bytes,
        })
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.spec.path
    }

    #[must_use]
    pub fn info(&self) -> ModelInfo {
        let (width, height) = self.spec.input_size;
        ModelInfo {
            name: self.spec.display_name(),
            size_bytes: self.bytes.len(),
            input_shape: (1, 3, height as usize, width as usize),
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
