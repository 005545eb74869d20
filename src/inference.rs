//! Inference backend abstraction and the segmentation engine built on it

use crate::{
    config::{BackendType, RemovalConfig},
    error::{BgRemovalError, ErrorKind, Result},
    models::{ModelAsset, ModelInfo, ModelSpec},
    types::{NormalizedBuffer, RenderContext, SegmentationResult},
    utils::preprocessing::ImagePreprocessor,
};
use ndarray::{Array4, ArrayD};
use tracing::{debug, instrument};

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Trait for inference backends
pub trait InferenceBackend: Send {
    /// Initialize the backend from model bytes
    ///
    /// Returns the load time on first initialization, `None` if already initialized.
    ///
    /// # Errors
    /// `ModelUnavailable` when the model cannot be parsed or a session cannot be built.
    fn initialize(&mut self, model: &ModelAsset, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// Run one forward pass on an NCHW input tensor
    ///
    /// # Errors
    /// `InferenceFailed` when the backend is not initialized or the run fails.
    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>>;

    /// Get model information for this backend
    ///
    /// # Errors
    /// `InferenceFailed` when no model has been loaded.
    fn get_model_info(&self) -> Result<ModelInfo>;

    fn backend_type(&self) -> BackendType;
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend of the given type
    ///
    /// # Errors
    /// `UnsupportedEnvironment` if the backend is not available in this build.
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends compiled into this build
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::new())),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::new())),
            BackendType::Mock => Ok(Box::new(crate::backends::MockBackend::new())),
            #[allow(unreachable_patterns)]
            other => Err(BgRemovalError::unsupported_environment(format!(
                "backend '{other}' is not compiled into this build"
            ))),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        crate::environment::compiled_backends()
    }
}

/// A loaded model bound to an initialized backend
pub struct SegmentationEngine {
    backend: Box<dyn InferenceBackend>,
    spec: ModelSpec,
    load_time: Duration,
}

impl std::fmt::Debug for SegmentationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationEngine")
            .field("backend", &self.backend.backend_type())
            .field("model", &self.spec.display_name())
            .field("load_time", &self.load_time)
            .finish()
    }
}

impl SegmentationEngine {
    /// Read the model asset and initialize a fresh backend with it
    ///
    /// # Errors
    /// `ModelUnavailable` for any asset or initialization failure;
    /// `UnsupportedEnvironment` if the factory cannot build the backend.
    #[instrument(skip_all, fields(backend = %config.backend, model = %config.model.path.display()))]
    pub fn load(factory: &dyn BackendFactory, config: &RemovalConfig) -> Result<Self> {
        let start = Instant::now();
        let asset = ModelAsset::load(&config.model)?;
        let mut backend = factory.create_backend(config.backend)?;

        backend.initialize(&asset, config).map_err(|e| match e.kind() {
            ErrorKind::ModelUnavailable => e,
            _ => BgRemovalError::model_unavailable(format!(
                "failed to initialize {} backend: {}",
                config.backend,
                e.message()
            )),
        })?;

        let load_time = start.elapsed();
        debug!(
            load_ms = load_time.as_millis() as u64,
            size_bytes = asset.bytes().len(),
            "segmentation model ready"
        );

        Ok(Self {
            backend,
            spec: config.model.clone(),
            load_time,
        })
    }

    /// Convert `buffer` to the model input tensor and run one forward pass
    ///
    /// # Errors
    /// `InferenceFailed` on tensor preparation, backend failure or unusable output shape.
    pub fn segment(
        &mut self,
        buffer: &NormalizedBuffer,
        ctx: &RenderContext,
    ) -> Result<SegmentationResult> {
        let tensor = ImagePreprocessor::tensor_from_buffer(
            buffer,
            &self.spec.preprocessing_config(),
            ctx.resize_filter.into(),
        )?;

        let output = self.backend.infer(&tensor).map_err(|e| match e.kind() {
            ErrorKind::InferenceFailed => e,
            _ => BgRemovalError::inference(e.message().to_string()),
        })?;

        debug!(output_shape = ?output.shape(), "forward pass complete");
        SegmentationResult::from_tensor(output, self.spec.interpretation)
    }

    #[must_use]
    pub fn load_time(&self) -> Duration {
        self.load_time
    }

    #[must_use]
    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    /// # Errors
    /// Propagates the backend's model info failure.
    pub fn model_info(&self) -> Result<ModelInfo> {
        self.backend.get_model_info()
    }
}
