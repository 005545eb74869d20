//! ONNX Runtime backend for segmentation models
//!
//! Runs the model through ONNX Runtime with CPU, CUDA or `CoreML` execution
//! providers. Provider availability is checked before a provider is
//! registered; an unavailable accelerator falls back to CPU with a warning.

use crate::config::{BackendType, ExecutionProvider, RemovalConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelAsset, ModelInfo};
use instant::{Duration, Instant};
use log;
use ndarray::{Array4, ArrayD, IxDyn};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};

/// ONNX Runtime backend for running segmentation models
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_info: Option<ModelInfo>,
}

impl OnnxBackend {
    /// List ONNX Runtime execution providers as `(name, available, description)`
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bgremove_mask::backends::OnnxBackend;
    ///
    /// for (name, available, description) in OnnxBackend::list_providers() {
    ///     println!("{name}: {available} - {description}");
    /// }
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("System hardware analysis:");
        log::debug!("  - Platform: {os}", os = std::env::consts::OS);
        log::debug!("  - Architecture: {arch}", arch = std::env::consts::ARCH);
        log::debug!(
            "  - CPU cores: {cores}",
            cores = std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        );

        let cuda_available = Self::cuda_available();
        if cuda_available {
            log::info!("CUDA execution provider is available");
        } else {
            log::debug!("CUDA execution provider is not available");
        }

        let coreml_available = Self::coreml_available();
        if coreml_available {
            log::info!("CoreML execution provider is available");
        } else {
            #[cfg(target_os = "macos")]
            log::warn!("CoreML execution provider is not available on this Mac");
            #[cfg(not(target_os = "macos"))]
            log::debug!("CoreML execution provider is only available on macOS");
        }

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon acceleration (macOS only)".to_string(),
            ),
        ]
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cuda_available() -> bool {
        OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
    }

    fn coreml_available() -> bool {
        OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
    }

    /// Providers to register for `requested`, in priority order; empty means CPU
    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();
        match requested {
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
            },
            ExecutionProvider::Auto => {
                if Self::cuda_available() {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if Self::coreml_available() {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::warn!("No hardware acceleration available, falling back to CPU");
                }
            },
            ExecutionProvider::Cuda => {
                if Self::cuda_available() {
                    log::info!("Using CUDA execution provider");
                    providers.push(CUDAExecutionProvider::default().build());
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                }
            },
            ExecutionProvider::CoreMl => {
                if Self::coreml_available() {
                    log::info!("Using CoreML execution provider (explicitly requested)");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                }
            },
        }
        providers
    }

    fn thread_counts(config: &RemovalConfig) -> (usize, usize) {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            cores
        };
        let inter = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };
        (intra, inter)
    }

    fn load_model(&mut self, model: &ModelAsset, config: &RemovalConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        let session_error = |stage: &str, e: ort::Error| {
            BgRemovalError::model_error_with_context(
                "initialize",
                model.path(),
                &format!("{stage}: {e}"),
                &["verify the file is a valid ONNX model"],
            )
        };

        let mut session_builder = Session::builder()
            .map_err(|e| session_error("failed to create session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| session_error("failed to set optimization level", e))?;

        let providers = Self::select_providers(config.execution_provider);
        if !providers.is_empty() {
            log::debug!(
                "Registering {count} execution provider(s)",
                count = providers.len()
            );
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| session_error("failed to set execution providers", e))?;
        }

        let (intra_threads, inter_threads) = Self::thread_counts(config);
        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| session_error("failed to set intra threads", e))?
            .with_inter_threads(inter_threads)
            .map_err(|e| session_error("failed to set inter threads", e))?
            .commit_from_memory(model.bytes())
            .map_err(|e| session_error("failed to create session from model data", e))?;

        let info = model.info();
        log::debug!("ONNX Runtime session created");
        log::debug!("  - Requested provider: {}", config.execution_provider);
        log::debug!(
            "  - Threading: {intra_threads} intra-op threads, {inter_threads} inter-op threads"
        );
        log::debug!("  - Model: {} ({} bytes)", info.name, info.size_bytes);

        self.session = Some(session);
        self.model_info = Some(info);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, model: &ModelAsset, config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }
        self.load_model(model, config).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgRemovalError::inference("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| BgRemovalError::inference("No output tensors found"))?;
        log::debug!("Using positional output access (first output: {first_key})");
        let output = outputs
            .get(first_key)
            .ok_or_else(|| BgRemovalError::inference("First output tensor not found"))?;

        // Class-index models emit int64 labels
        let result = match output.try_extract_array::<f32>() {
            Ok(view) => {
                ArrayD::from_shape_vec(IxDyn(view.shape()), view.iter().copied().collect())
            },
            Err(float_error) => {
                let view = output.try_extract_array::<i64>().map_err(|_| {
                    BgRemovalError::inference(format!(
                        "Failed to extract output tensor: {float_error}"
                    ))
                })?;
                ArrayD::from_shape_vec(
                    IxDyn(view.shape()),
                    view.iter().map(|&v| v as f32).collect(),
                )
            },
        }
        .map_err(|e| BgRemovalError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::info!(
            "Inference complete: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        self.model_info
            .clone()
            .ok_or_else(|| BgRemovalError::inference("ONNX model not loaded"))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Onnx
    }
}
