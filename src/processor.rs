//! Background removal pipeline
//!
//! [`BackgroundRemover`] owns the validated configuration, the rendering
//! context and the environment verdict, and runs the five stages of a call in
//! order: load source, normalize, inference, materialize mask, export. Every
//! call ends in exactly one `Ok` or one `Err`; failures are logged once here.

use crate::{
    config::{ModelLoading, RemovalConfig},
    environment::{EnvironmentProbe, ExecutionEnvironment, RuntimeProbe},
    error::{BgRemovalError, Result},
    inference::{BackendFactory, DefaultBackendFactory, SegmentationEngine},
    mask::MaskMaterializer,
    services::{parse_location, ExportService, ImageIOService},
    types::{
        NormalizedBuffer, ProcessingStage, ProcessingTimings, RemovalOutput, RenderContext,
        SegmentationResult,
    },
    utils::PixelBufferAdapter,
};
use instant::Instant;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, span, warn, Level};

/// Runs the background removal pipeline for one source at a time
///
/// The remover is `Send + Sync`; share it in an [`Arc`] to serve concurrent
/// calls. With [`ModelLoading::Shared`] the forward passes of concurrent
/// calls are serialized on the one loaded model; every other stage runs in
/// parallel.
///
/// # Examples
/// ```rust,no_run
/// use bgremove_mask::{BackgroundRemover, RemovalConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> bgremove_mask::Result<()> {
/// let config = RemovalConfig::builder()
///     .model_path("models/segmentation.onnx")
///     .build()?;
/// let remover = Arc::new(BackgroundRemover::new(config)?);
/// let output = remover.remove_background("photo.jpg").await?;
/// println!("{}", output.uri);
/// # Ok(())
/// # }
/// ```
pub struct BackgroundRemover {
    config: RemovalConfig,
    ctx: RenderContext,
    environment: ExecutionEnvironment,
    factory: Arc<dyn BackendFactory>,
    shared: Option<Mutex<SegmentationEngine>>,
    scratch_dir: PathBuf,
}

impl std::fmt::Debug for BackgroundRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemover")
            .field("config", &self.config)
            .field("environment", &self.environment)
            .field("shared_model", &self.shared.is_some())
            .field("scratch_dir", &self.scratch_dir)
            .finish_non_exhaustive()
    }
}

/// Engine used by one call
enum EngineHandle<'a> {
    Owned(SegmentationEngine),
    Shared(&'a Mutex<SegmentationEngine>),
}

impl EngineHandle<'_> {
    fn segment(
        &mut self,
        buffer: &NormalizedBuffer,
        ctx: &RenderContext,
    ) -> Result<SegmentationResult> {
        match self {
            Self::Owned(engine) => engine.segment(buffer, ctx),
            Self::Shared(engine) => engine
                .lock()
                .map_err(|_| {
                    BgRemovalError::internal("shared model is unusable after an earlier panic")
                })?
                .segment(buffer, ctx),
        }
    }
}

impl BackgroundRemover {
    /// Validate `config`, probe the environment and, for
    /// [`ModelLoading::Shared`], load the model once
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration is rejected
    /// - `ModelUnavailable` when a shared model cannot be loaded
    pub fn new(config: RemovalConfig) -> Result<Self> {
        Self::with_components(config, Arc::new(DefaultBackendFactory), &RuntimeProbe)
    }

    /// Like [`BackgroundRemover::new`] with an explicit backend factory and environment probe
    ///
    /// # Errors
    /// Same as [`BackgroundRemover::new`].
    pub fn with_components(
        config: RemovalConfig,
        factory: Arc<dyn BackendFactory>,
        probe: &dyn EnvironmentProbe,
    ) -> Result<Self> {
        config.validate()?;

        let mut environment = probe.probe(&config);
        if environment.is_supported() && !factory.available_backends().contains(&config.backend) {
            environment.unsupported_reason = Some(format!(
                "backend '{}' is not provided by the backend factory",
                config.backend
            ));
        }
        match environment.unsupported_reason {
            Some(ref reason) => warn!(%reason, "execution environment cannot run the model"),
            None => debug!(
                backend = %environment.backend,
                provider = %environment.execution_provider,
                accelerated = environment.has_accelerator(),
                "execution environment accepted"
            ),
        }

        // An unsupported environment never loads a model; calls fail at the gate
        let shared = match config.model_loading {
            ModelLoading::Shared if environment.is_supported() => {
                let engine = SegmentationEngine::load(factory.as_ref(), &config)?;
                let model = engine.model_info().map(|info| info.name).unwrap_or_default();
                info!(
                    %model,
                    backend = %engine.backend_type(),
                    load_ms = engine.load_time().as_millis() as u64,
                    "shared segmentation model loaded"
                );
                Some(Mutex::new(engine))
            },
            _ => None,
        };

        Ok(Self {
            ctx: RenderContext::from_config(&config),
            scratch_dir: config.scratch_dir(),
            config,
            environment,
            factory,
            shared,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    #[must_use]
    pub fn environment(&self) -> &ExecutionEnvironment {
        &self.environment
    }

    #[must_use]
    pub fn render_context(&self) -> &RenderContext {
        &self.ctx
    }

    /// Directory the PNG artifacts are written to
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Absolute path the artifact for `uri` will be written to
    ///
    /// # Errors
    /// `InvalidSource` when `uri` cannot be parsed, `WriteFailed` when no
    /// output name can be derived from it.
    pub fn output_path(&self, uri: &str) -> Result<PathBuf> {
        let source_path = parse_location(uri)?;
        let name =
            ExportService::destination_name(&source_path, &self.scratch_dir, self.ctx.output_mode)?;
        let path = self.scratch_dir.join(name);
        std::path::absolute(&path)
            .map_err(|e| BgRemovalError::write_io_error("resolve output path", &path, &e))
    }

    /// Run the pipeline on `uri` in the calling thread
    ///
    /// # Errors
    /// Exactly one [`BgRemovalError`] describing the first failing stage.
    #[instrument(skip(self), fields(mode = %self.ctx.output_mode))]
    pub fn run(&self, uri: &str) -> Result<RemovalOutput> {
        self.run_pipeline(uri).inspect_err(|e| {
            warn!(kind = %e.kind(), error = %e, uri, "background removal failed");
        })
    }

    /// Run the pipeline on Tokio's blocking pool
    ///
    /// Resolves exactly once. A panic inside the pipeline resolves as an
    /// `Internal` error. Dropping the future does not stop the work already
    /// submitted; its artifact may still be written.
    ///
    /// # Errors
    /// Same as [`BackgroundRemover::run`], plus `Internal` if the task panicked.
    pub async fn remove_background(self: Arc<Self>, uri: impl Into<String>) -> Result<RemovalOutput> {
        let uri = uri.into();
        let task_uri = uri.clone();
        let remover = Arc::clone(&self);

        match tokio::task::spawn_blocking(move || remover.run(&task_uri)).await {
            Ok(result) => result,
            Err(join_error) => {
                let e = BgRemovalError::internal(format!("pipeline task failed: {join_error}"));
                warn!(kind = %e.kind(), error = %e, uri = %uri, "background removal failed");
                Err(e)
            },
        }
    }

    fn run_pipeline(&self, uri: &str) -> Result<RemovalOutput> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::new();

        self.environment.ensure_supported()?;

        let stage_start = Instant::now();
        let mut engine = match self.shared {
            Some(ref shared) => EngineHandle::Shared(shared),
            None => EngineHandle::Owned(SegmentationEngine::load(self.factory.as_ref(), &self.config)?),
        };
        timings.record(ProcessingStage::ModelLoad, elapsed_ms(stage_start));

        let source = {
            let _span = span!(Level::DEBUG, "load_source", uri).entered();
            let stage_start = Instant::now();
            let source = ImageIOService::load_source(uri)?;
            timings.record(ProcessingStage::LoadSource, elapsed_ms(stage_start));
            source
        };
        let (width, height) = source.dimensions();

        let buffer = {
            let _span = span!(Level::DEBUG, "normalize", width, height).entered();
            let stage_start = Instant::now();
            let buffer = PixelBufferAdapter::normalize(&source, &self.ctx)?;
            timings.record(ProcessingStage::Normalize, elapsed_ms(stage_start));
            buffer
        };

        let segmentation = {
            let _span = span!(Level::INFO, "inference", backend = %self.config.backend).entered();
            let stage_start = Instant::now();
            let segmentation = engine.segment(&buffer, &self.ctx)?;
            timings.record(ProcessingStage::Inference, elapsed_ms(stage_start));
            segmentation
        };
        drop(engine);

        let mask = {
            let _span = span!(Level::DEBUG, "materialize_mask", width, height).entered();
            let stage_start = Instant::now();
            let mask = MaskMaterializer::materialize(&segmentation, (width, height), &self.ctx)?;
            timings.record(ProcessingStage::MaterializeMask, elapsed_ms(stage_start));
            debug!(foreground_ratio = mask.foreground_ratio(), "mask ready");
            mask
        };

        let artifact = {
            let _span = span!(Level::DEBUG, "export", mode = %self.ctx.output_mode).entered();
            let stage_start = Instant::now();
            let artifact = ExportService::export(
                source.path(),
                &buffer,
                &mask,
                &self.ctx,
                &self.scratch_dir,
            )?;
            timings.record(ProcessingStage::Export, elapsed_ms(stage_start));
            artifact
        };

        timings.total_ms = elapsed_ms(total_start);
        info!(
            path = %artifact.path.display(),
            width,
            height,
            total_ms = timings.total_ms,
            inference_ms = timings.inference_ms,
            "background removed"
        );

        Ok(RemovalOutput {
            path: artifact.path,
            uri: artifact.uri,
            width,
            height,
            mode: self.ctx.output_mode,
            timings,
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
