#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bgremove-mask
//!
//! Single-pass background removal: an image is decoded, normalized into a
//! BGRA8 buffer, run through a segmentation model, turned into an 8-bit mask
//! at the source resolution and written as a PNG.
//!
//! ## Features
//!
//! - **Backends**: ONNX Runtime (CPU, CUDA, `CoreML`) and Tract (pure Rust),
//!   plus a deterministic mock backend for tests and dry runs
//! - **Model outputs**: probability maps, logits, class indices or per-class scores
//! - **Output**: RGBA cutout or single-channel mask, written atomically
//! - **Environment gate**: unsupported execution environments are rejected
//!   before any model or pixel work
//! - **Async and sync APIs** with exactly-once completion
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_mask::{remove_background, OutputMode, RemovalConfig};
//!
//! # async fn example() -> bgremove_mask::Result<()> {
//! let config = RemovalConfig::builder()
//!     .model_path("models/segmentation.onnx")
//!     .output_mode(OutputMode::Cutout)
//!     .scratch_dir("out")
//!     .build()?;
//!
//! let output = remove_background("photo.jpg", &config).await?;
//! println!("{} ({}x{})", output.path.display(), output.width, output.height);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): pure Rust backend
//! - `cli` (default): command-line tool and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI
//! - `webp-support`: WebP input decoding

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod environment;
pub mod error;
pub mod inference;
pub mod mask;
pub mod models;
pub mod processor;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use config::{
    BackendType, ExecutionProvider, ModelLoading, OutputMode, PngCompression, RemovalConfig,
    RemovalConfigBuilder, ResizeFilter,
};
pub use environment::{EnvironmentProbe, ExecutionEnvironment, RuntimeProbe, StaticProbe};
pub use error::{BgRemovalError, ErrorKind, Result};
pub use inference::{BackendFactory, DefaultBackendFactory, InferenceBackend, SegmentationEngine};
pub use mask::MaskMaterializer;
pub use models::{ModelAsset, ModelInfo, ModelSpec, OutputInterpretation};
pub use processor::BackgroundRemover;
pub use types::{
    MaskImage, NormalizedBuffer, ProcessingStage, ProcessingTimings, RemovalOutput,
    RenderContext, SegmentationResult, SourceImage,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

use std::sync::Arc;

/// Remove the background of the image at `uri` with a one-off remover
///
/// Builds a [`BackgroundRemover`] for `config` and runs it once on the
/// blocking pool. Reuse a remover directly when processing several images.
///
/// # Errors
/// Any [`BgRemovalError`]; see [`BackgroundRemover::new`] and
/// [`BackgroundRemover::run`].
pub async fn remove_background(uri: &str, config: &RemovalConfig) -> Result<RemovalOutput> {
    let remover = BackgroundRemover::new(config.clone()).inspect_err(|e| {
        tracing::warn!(kind = %e.kind(), error = %e, uri, "background remover rejected");
    })?;
    Arc::new(remover).remove_background(uri).await
}
