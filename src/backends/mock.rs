//! Deterministic synthetic backend
//!
//! Produces a soft centered disc in whatever layout the configured
//! [`OutputInterpretation`] expects, without running any model. Used for
//! tests, benchmarks and dry runs of the pipeline.

use crate::{
    config::{BackendType, RemovalConfig},
    error::{BgRemovalError, Result},
    inference::{BackendFactory, InferenceBackend},
    models::{ModelAsset, ModelInfo, OutputInterpretation},
};
use instant::{Duration, Instant};
use ndarray::{Array4, ArrayD, IxDyn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock backend; clones share call counters
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    model_info: Option<ModelInfo>,
    interpretation: OutputInterpretation,
    fixed_output: Option<ArrayD<f32>>,
    should_fail_init: bool,
    should_fail_inference: bool,
    init_calls: Arc<AtomicUsize>,
    inference_calls: Arc<AtomicUsize>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `initialize` call
    #[must_use]
    pub fn with_init_failure(mut self) -> Self {
        self.should_fail_init = true;
        self
    }

    /// Fail every `infer` call
    #[must_use]
    pub fn with_inference_failure(mut self) -> Self {
        self.should_fail_inference = true;
        self
    }

    /// Return `output` from every `infer` call instead of the synthetic disc
    #[must_use]
    pub fn with_fixed_output(mut self, output: ArrayD<f32>) -> Self {
        self.fixed_output = Some(output);
        self
    }

    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn inference_calls(&self) -> usize {
        self.inference_calls.load(Ordering::SeqCst)
    }

    /// Foreground probability of a soft disc centered in a `width × height` frame
    fn disc(x: usize, y: usize, width: usize, height: usize) -> f32 {
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 3.0).max(1.0);
        let dx = x as f32 + 0.5 - center_x;
        let dy = y as f32 + 0.5 - center_y;
        let distance = (dx * dx + dy * dy).sqrt();
        ((radius - distance) / radius).clamp(0.0, 1.0)
    }

    #[allow(clippy::indexing_slicing)] // from_shape_fn indices match the requested rank
    fn synthetic_output(&self, height: usize, width: usize) -> ArrayD<f32> {
        match self.interpretation {
            OutputInterpretation::Probability => {
                ArrayD::from_shape_fn(IxDyn(&[1, 1, height, width]), |idx| {
                    Self::disc(idx[3], idx[2], width, height)
                })
            },
            OutputInterpretation::Logits => {
                ArrayD::from_shape_fn(IxDyn(&[1, 1, height, width]), |idx| {
                    (Self::disc(idx[3], idx[2], width, height) - 0.25) * 16.0
                })
            },
            OutputInterpretation::ClassIndex { background } => {
                let foreground = background.wrapping_add(1) as f32;
                ArrayD::from_shape_fn(IxDyn(&[1, 1, height, width]), |idx| {
                    if Self::disc(idx[3], idx[2], width, height) > 0.0 {
                        foreground
                    } else {
                        background as f32
                    }
                })
            },
            OutputInterpretation::ClassScores { background } => {
                let background = background as usize;
                let channels = (background + 2).max(2);
                let foreground = background + 1;
                ArrayD::from_shape_fn(IxDyn(&[1, channels, height, width]), |idx| {
                    let p = Self::disc(idx[3], idx[2], width, height);
                    match idx[1] {
                        c if c == background => 1.0 - p,
                        c if c == foreground => p,
                        _ => 0.0,
                    }
                })
            },
        }
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, model: &ModelAsset, _config: &RemovalConfig) -> Result<Option<Duration>> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);

        if self.should_fail_init {
            return Err(BgRemovalError::model_unavailable(
                "Mock backend initialization failed",
            ));
        }
        if self.model_info.is_some() {
            return Ok(None);
        }

        let start = Instant::now();
        self.interpretation = model.spec().interpretation;
        self.model_info = Some(model.info());
        Ok(Some(start.elapsed()))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        self.inference_calls.fetch_add(1, Ordering::SeqCst);

        if self.model_info.is_none() {
            return Err(BgRemovalError::inference("Mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(BgRemovalError::inference("Mock backend inference failed"));
        }
        if let Some(ref output) = self.fixed_output {
            return Ok(output.clone());
        }

        let (_, _, height, width) = input.dim();
        Ok(self.synthetic_output(height, width))
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        self.model_info
            .clone()
            .ok_or_else(|| BgRemovalError::inference("Mock backend not initialized"))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Mock
    }
}

/// Factory handing out clones of one configured [`MockBackend`] for every backend type
#[derive(Debug, Clone, Default)]
pub struct MockBackendFactory {
    template: MockBackend,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new(template: MockBackend) -> Self {
        Self { template }
    }

    /// `initialize` calls across every backend from this factory
    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.template.init_calls()
    }

    /// Forward passes run by any backend from this factory
    #[must_use]
    pub fn inference_calls(&self) -> usize {
        self.template.inference_calls()
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(&self, _backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(self.template.clone()))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract, BackendType::Mock]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelSpec;
    use tempfile::TempDir;

    fn asset(dir: &TempDir, interpretation: OutputInterpretation) -> ModelAsset {
        let path = dir.path().join("mock.onnx");
        std::fs::write(&path, b"mock").unwrap();
        let mut spec = ModelSpec::from_path(path);
        spec.input_size = (16, 8);
        spec.interpretation = interpretation;
        ModelAsset::load(&spec).unwrap()
    }

    #[test]
    fn test_infer_requires_initialization() {
        let mut backend = MockBackend::new();
        let input = Array4::<f32>::zeros((1, 3, 8, 16));
        assert!(backend.infer(&input).is_err());
        assert!(backend.get_model_info().is_err());
    }

    #[test]
    fn test_output_layout_follows_interpretation() {
        let dir = TempDir::new().unwrap();
        let input = Array4::<f32>::zeros((1, 3, 8, 16));

        for (interpretation, channels) in [
            (OutputInterpretation::Probability, 1),
            (OutputInterpretation::Logits, 1),
            (OutputInterpretation::ClassIndex { background: 0 }, 1),
            (OutputInterpretation::ClassScores { background: 0 }, 2),
            (OutputInterpretation::ClassScores { background: 3 }, 5),
        ] {
            let mut backend = MockBackend::new();
            backend
                .initialize(&asset(&dir, interpretation), &RemovalConfig::default())
                .unwrap();
            let output = backend.infer(&input).unwrap();
            assert_eq!(output.shape(), &[1, channels, 8, 16], "{interpretation:?}");
        }
    }

    #[test]
    fn test_disc_is_deterministic_and_centered() {
        let dir = TempDir::new().unwrap();
        let mut backend = MockBackend::new();
        backend
            .initialize(&asset(&dir, OutputInterpretation::Probability), &RemovalConfig::default())
            .unwrap();
        let input = Array4::<f32>::zeros((1, 3, 8, 16));

        let first = backend.infer(&input).unwrap();
        let second = backend.infer(&input).unwrap();
        assert_eq!(first, second);
        assert!(first[[0, 0, 4, 8]] > 0.5);
        assert_eq!(first[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_clones_share_counters() {
        let dir = TempDir::new().unwrap();
        let factory = MockBackendFactory::new(MockBackend::new());
        let mut backend = factory.create_backend(BackendType::Mock).unwrap();
        backend
            .initialize(&asset(&dir, OutputInterpretation::Probability), &RemovalConfig::default())
            .unwrap();
        backend.infer(&Array4::<f32>::zeros((1, 3, 8, 16))).unwrap();

        assert_eq!(factory.init_calls(), 1);
        assert_eq!(factory.inference_calls(), 1);
    }

    #[test]
    fn test_configured_failures() {
        let dir = TempDir::new().unwrap();
        let model = asset(&dir, OutputInterpretation::Probability);

        let mut backend = MockBackend::new().with_init_failure();
        let err = backend.initialize(&model, &RemovalConfig::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ModelUnavailable);

        let mut backend = MockBackend::new().with_inference_failure();
        backend.initialize(&model, &RemovalConfig::default()).unwrap();
        let err = backend.infer(&Array4::<f32>::zeros((1, 3, 8, 16))).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InferenceFailed);
    }
}
