//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use crate::models::ModelSpec;
use image::codecs::png::CompressionType;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest accepted source edge when no explicit limit is configured
pub const DEFAULT_MAX_DIMENSION: u32 = 16384;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration through `CoreML`
    CoreMl,
}

impl Default for ExecutionProvider {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference backend used to run the segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
    /// Tract backend (pure Rust, CPU only)
    Tract,
    /// Deterministic synthetic backend for tests and dry runs
    Mock,
}

impl Default for BackendType {
    fn default() -> Self {
        if cfg!(feature = "onnx") {
            Self::Onnx
        } else {
            Self::Tract
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// When the model asset is loaded and initialized
///
/// `PerCall` loads a fresh model for every invocation, so concurrent calls
/// share nothing and a model replaced on disk is picked up on the next call.
/// `Shared` loads once when the remover is built and serializes forward passes
/// through a mutex; model problems then surface from the constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelLoading {
    PerCall,
    Shared,
}

impl Default for ModelLoading {
    fn default() -> Self {
        Self::PerCall
    }
}

/// What the exported PNG contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// RGBA source pixels with the mask as alpha
    Cutout,
    /// The single-channel mask itself
    Mask,
}

impl Default for OutputMode {
    fn default() -> Self {
        Self::Cutout
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cutout => write!(f, "cutout"),
            Self::Mask => write!(f, "mask"),
        }
    }
}

/// Resampling filter used for both model-input and mask resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl Default for ResizeFilter {
    fn default() -> Self {
        Self::Triangle
    }
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// PNG compression effort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PngCompression {
    Fast,
    Default,
    Best,
}

impl Default for PngCompression {
    fn default() -> Self {
        Self::Default
    }
}

impl From<PngCompression> for CompressionType {
    fn from(compression: PngCompression) -> Self {
        match compression {
            PngCompression::Fast => CompressionType::Fast,
            PngCompression::Default => CompressionType::Default,
            PngCompression::Best => CompressionType::Best,
        }
    }
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Segmentation model asset and its input/output conventions
    pub model: ModelSpec,

    /// Inference backend
    pub backend: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Reject the environment unless the requested accelerator is present
    pub require_acceleration: bool,

    /// Model loading policy
    pub model_loading: ModelLoading,

    /// Cutout or bare mask
    pub output_mode: OutputMode,

    /// Output directory (None = OS temp directory)
    pub scratch_dir: Option<PathBuf>,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Largest accepted source width or height
    pub max_dimension: u32,

    pub resize_filter: ResizeFilter,

    pub png_compression: PngCompression,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model: ModelSpec::default(),
            backend: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            require_acceleration: false,
            model_loading: ModelLoading::default(),
            output_mode: OutputMode::default(),
            scratch_dir: None,
            intra_threads: 0,
            inter_threads: 0,
            max_dimension: DEFAULT_MAX_DIMENSION,
            resize_filter: ResizeFilter::default(),
            png_compression: PngCompression::default(),
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bgremove_mask::{BackendType, ModelLoading, OutputMode, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .backend(BackendType::Mock)
    ///     .model_loading(ModelLoading::Shared)
    ///     .output_mode(OutputMode::Mask)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.output_mode, OutputMode::Mask);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Load a configuration from a JSON file; missing fields take their defaults
    ///
    /// # Errors
    /// `InvalidConfig` when the file cannot be read, parsed or fails validation.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BgRemovalError::invalid_config(format!(
                "Failed to read config '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            BgRemovalError::invalid_config(format!(
                "Failed to parse config '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Invalid model spec (see [`ModelSpec::validate`])
    /// - `max_dimension` of zero
    /// - Tract backend combined with a GPU execution provider
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;

        if self.max_dimension == 0 {
            return Err(BgRemovalError::config_value_error(
                "max dimension",
                self.max_dimension,
                "1-4294967295",
            ));
        }

        if self.backend == BackendType::Tract
            && matches!(
                self.execution_provider,
                ExecutionProvider::Cuda | ExecutionProvider::CoreMl
            )
        {
            return Err(BgRemovalError::invalid_config(format!(
                "Tract backend only supports CPU execution, got '{}'",
                self.execution_provider
            )));
        }

        Ok(())
    }

    /// Directory the PNG artifacts are written to
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn model(mut self, model: ModelSpec) -> Self {
        self.config.model = model;
        self
    }

    /// Set the model file path, keeping the remaining model parameters
    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model.path = path.into();
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.backend = backend;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn require_acceleration(mut self, require: bool) -> Self {
        self.config.require_acceleration = require;
        self
    }

    #[must_use]
    pub fn model_loading(mut self, loading: ModelLoading) -> Self {
        self.config.model_loading = loading;
        self
    }

    #[must_use]
    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    #[must_use]
    pub fn scratch_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set intra threads to `threads` and inter threads to half of it (0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.config.max_dimension = max_dimension;
        self
    }

    #[must_use]
    pub fn resize_filter(mut self, filter: ResizeFilter) -> Self {
        self.config.resize_filter = filter;
        self
    }

    #[must_use]
    pub fn png_compression(mut self, compression: PngCompression) -> Self {
        self.config.png_compression = compression;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Any validation failure from [`RemovalConfig::validate`].
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::OutputInterpretation;

    #[test]
    fn test_default_config() {
        let config = RemovalConfig::default();
        assert_eq!(config.model_loading, ModelLoading::PerCall);
        assert_eq!(config.output_mode, OutputMode::Cutout);
        assert_eq!(config.max_dimension, DEFAULT_MAX_DIMENSION);
        assert_eq!(config.resize_filter, ResizeFilter::Triangle);
        assert_eq!(config.scratch_dir(), std::env::temp_dir());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RemovalConfig::builder()
            .backend(BackendType::Mock)
            .output_mode(OutputMode::Mask)
            .scratch_dir("/tmp/out")
            .num_threads(8)
            .png_compression(PngCompression::Fast)
            .build()
            .unwrap();

        assert_eq!(config.backend, BackendType::Mock);
        assert_eq!(config.output_mode, OutputMode::Mask);
        assert_eq!(config.scratch_dir(), PathBuf::from("/tmp/out"));
        assert_eq!(config.intra_threads, 8);
        assert_eq!(config.inter_threads, 4);
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        let err = RemovalConfig::builder().max_dimension(0).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let err = RemovalConfig::builder()
            .backend(BackendType::Tract)
            .execution_provider(ExecutionProvider::Cuda)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_json_roundtrip_with_defaults() {
        let json = r#"{
            "backend": "mock",
            "output_mode": "mask",
            "model": {
                "path": "models/deeplab.onnx",
                "input_size": [513, 513],
                "interpretation": { "type": "class_scores", "background": 0 }
            }
        }"#;
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, json).unwrap();

        let config = RemovalConfig::from_json_file(&path).unwrap();
        assert_eq!(config.backend, BackendType::Mock);
        assert_eq!(config.output_mode, OutputMode::Mask);
        assert_eq!(config.model.input_size, (513, 513));
        assert_eq!(
            config.model.interpretation,
            OutputInterpretation::ClassScores { background: 0 }
        );
        assert_eq!(config.max_dimension, DEFAULT_MAX_DIMENSION);
    }

    #[test]
    fn test_json_parse_error_is_invalid_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = RemovalConfig::from_json_file(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_filter_and_compression_mapping() {
        assert_eq!(FilterType::from(ResizeFilter::Nearest), FilterType::Nearest);
        assert!(matches!(
            CompressionType::from(PngCompression::Best),
            CompressionType::Best
        ));
    }
}
