//! Tract backend for segmentation models
//!
//! Pure Rust inference with no native runtime. The model input is pinned to
//! the configured `[1, 3, H, W]` shape before optimization so graphs with
//! symbolic dimensions can be planned.

use crate::config::{BackendType, RemovalConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelAsset, ModelInfo};
use log;
use ndarray::{Array4, ArrayD};
use tract_onnx::prelude::*;

use instant::{Duration, Instant};

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running segmentation models using pure Rust inference
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_info: Option<ModelInfo>,
}

impl TractBackend {
    /// Tract execution providers as `(name, available, description)`; CPU only
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("Tract backend system analysis:");
        log::debug!("  - Platform: {os}", os = std::env::consts::OS);
        log::debug!("  - Architecture: {arch}", arch = std::env::consts::ARCH);

        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn load_model(&mut self, model: &ModelAsset) -> Result<Duration> {
        let model_load_start = Instant::now();
        let info = model.info();
        let (_, _, height, width) = info.input_shape;
        let model_error = |stage: &str, e: &dyn std::fmt::Display| {
            BgRemovalError::model_error_with_context(
                "initialize",
                model.path(),
                &format!("{stage}: {e}"),
                &[
                    "verify the file is a valid ONNX model",
                    "check that the configured input size matches the model",
                ],
            )
        };

        #[allow(clippy::cast_precision_loss)]
        let size_mb = info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!("Initializing Tract backend for {} ({size_mb:.2} MB)", info.name);

        let runnable = onnx()
            .model_for_read(&mut std::io::Cursor::new(model.bytes()))
            .map_err(|e| model_error("failed to load ONNX model", &e))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, height, width)),
            )
            .map_err(|e| model_error("failed to set input shape", &e))?
            .into_optimized()
            .map_err(|e| model_error("failed to optimize model", &e))?
            .into_runnable()
            .map_err(|e| model_error("failed to create runnable model", &e))?;

        self.model = Some(runnable);
        self.model_info = Some(info);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, model: &ModelAsset, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }
        self.load_model(model).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgRemovalError::inference("Tract model not initialized"))?;

        log::debug!("Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensor found"))?
            .into_tensor();

        // Class-index models emit integer labels
        let as_float = output_tensor.cast_to::<f32>().map_err(|e| {
            BgRemovalError::inference(format!(
                "Cannot read {:?} output as f32: {e}",
                output_tensor.datum_type()
            ))
        })?;
        let output = as_float
            .to_array_view::<f32>()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to convert output tensor: {e}"))
            })?
            .to_owned();

        log::debug!(
            "Tract inference completed in {:.2}ms, output {:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            output.shape()
        );
        Ok(output)
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        self.model_info
            .clone()
            .ok_or_else(|| BgRemovalError::inference("Tract model not loaded"))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Tract
    }
}
