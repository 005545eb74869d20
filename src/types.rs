//! Data types flowing through the removal pipeline

use crate::config::{OutputMode, PngCompression, RemovalConfig, ResizeFilter};
use crate::error::{BgRemovalError, Result};
use crate::models::OutputInterpretation;
use image::{DynamicImage, GrayImage};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Decoded input image with orientation already applied
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: DynamicImage,
    path: PathBuf,
}

impl SourceImage {
    #[must_use]
    pub fn new(image: DynamicImage, path: PathBuf) -> Self {
        Self { image, path }
    }

    #[must_use]
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Tightly packed BGRA8 pixels covering the full source extent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
}

impl NormalizedBuffer {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Wrap BGRA bytes, checking that they cover `width × height` exactly
    ///
    /// # Errors
    /// `BufferAllocationFailed` when the extent is empty or the byte count does not match.
    pub fn from_bgra(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::buffer_allocation(format!(
                "zero-sized buffer {width}x{height}"
            )));
        }
        let stride = (width as usize)
            .checked_mul(Self::BYTES_PER_PIXEL)
            .ok_or_else(|| BgRemovalError::buffer_allocation("row stride overflows"))?;
        let expected = stride
            .checked_mul(height as usize)
            .ok_or_else(|| BgRemovalError::buffer_allocation("buffer size overflows"))?;
        if data.len() != expected {
            return Err(BgRemovalError::buffer_allocation(format!(
                "expected {expected} bytes for {width}x{height} BGRA, got {}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in bytes, always `width × 4`
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }
}

/// Raw model output at model-native resolution
///
/// Holds `channels × height × width` scores in row-major order together with
/// the declared extent. Nothing is trusted until [`SegmentationResult::validate`]
/// has run.
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    data: Vec<f32>,
    channels: usize,
    height: usize,
    width: usize,
    interpretation: OutputInterpretation,
}

impl SegmentationResult {
    /// Wrap raw scores with their declared layout
    #[must_use]
    pub fn new(
        data: Vec<f32>,
        channels: usize,
        height: usize,
        width: usize,
        interpretation: OutputInterpretation,
    ) -> Self {
        Self {
            data,
            channels,
            height,
            width,
            interpretation,
        }
    }

    /// Build from a backend output tensor of shape `[1, C, H, W]`, `[C, H, W]` or `[H, W]`
    ///
    /// # Errors
    /// `InferenceFailed` on an empty output, an unsupported rank or a batch larger than one.
    pub fn from_tensor(tensor: ArrayD<f32>, interpretation: OutputInterpretation) -> Result<Self> {
        if tensor.is_empty() {
            return Err(BgRemovalError::inference("model produced an empty output"));
        }
        let (channels, height, width) = match tensor.shape() {
            &[1, c, h, w] => (c, h, w),
            &[n, _, _, _] => {
                return Err(BgRemovalError::inference(format!(
                    "expected batch size 1, got {n}"
                )))
            },
            &[c, h, w] => (c, h, w),
            &[h, w] => (1, h, w),
            other => {
                return Err(BgRemovalError::inference(format!(
                    "expected output rank 2, 3 or 4, got shape {other:?}"
                )))
            },
        };
        // iter() walks in logical order, so non-standard layouts come out row-major
        let data: Vec<f32> = tensor.iter().copied().collect();
        Ok(Self::new(data, channels, height, width, interpretation))
    }

    /// Check the declared layout against the data
    ///
    /// # Errors
    /// `MaskConstructionFailed` on zero extent, element-count mismatch,
    /// non-finite values or a channel count the interpretation cannot read.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.height == 0 || self.width == 0 {
            return Err(BgRemovalError::mask_construction(format!(
                "zero extent in model output ({}x{}x{})",
                self.channels, self.height, self.width
            )));
        }

        let expected = self
            .channels
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(self.width))
            .ok_or_else(|| BgRemovalError::mask_construction("model output extent overflows"))?;
        if self.data.len() != expected {
            return Err(BgRemovalError::mask_construction(format!(
                "model output has {} elements, layout {}x{}x{} needs {}",
                self.data.len(),
                self.channels,
                self.height,
                self.width,
                expected
            )));
        }

        if u32::try_from(self.width).is_err() || u32::try_from(self.height).is_err() {
            return Err(BgRemovalError::mask_construction(
                "model output extent exceeds image limits",
            ));
        }

        match self.interpretation {
            OutputInterpretation::Probability
            | OutputInterpretation::Logits
            | OutputInterpretation::ClassIndex { .. } => {
                if self.channels != 1 {
                    return Err(BgRemovalError::mask_construction(format!(
                        "{:?} output needs 1 channel, got {}",
                        self.interpretation, self.channels
                    )));
                }
            },
            OutputInterpretation::ClassScores { background } => {
                if self.channels < 2 {
                    return Err(BgRemovalError::mask_construction(format!(
                        "class score output needs at least 2 channels, got {}",
                        self.channels
                    )));
                }
                if background as usize >= self.channels {
                    return Err(BgRemovalError::mask_construction(format!(
                        "background class {background} out of range for {} channels",
                        self.channels
                    )));
                }
            },
        }

        if let Some(index) = self.data.iter().position(|v| !v.is_finite()) {
            return Err(BgRemovalError::mask_construction(format!(
                "non-finite value at element {index}"
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn interpretation(&self) -> OutputInterpretation {
        self.interpretation
    }
}

/// Single-channel mask at the exact source extent
#[derive(Debug, Clone)]
pub struct MaskImage {
    mask: GrayImage,
}

impl MaskImage {
    /// Wrap a mask, rejecting any extent other than `expected`
    ///
    /// # Errors
    /// `MaskConstructionFailed` when the dimensions differ.
    pub fn new(mask: GrayImage, expected: (u32, u32)) -> Result<Self> {
        if mask.dimensions() != expected {
            return Err(BgRemovalError::mask_construction(format!(
                "mask is {}x{}, source is {}x{}",
                mask.width(),
                mask.height(),
                expected.0,
                expected.1
            )));
        }
        Ok(Self { mask })
    }

    #[must_use]
    pub fn as_gray(&self) -> &GrayImage {
        &self.mask
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Fraction of pixels at or above the midpoint
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        let total = self.mask.as_raw().len();
        if total == 0 {
            return 0.0;
        }
        let foreground = self.mask.as_raw().iter().filter(|&&v| v >= 128).count();
        foreground as f32 / total as f32
    }
}

/// Immutable rendering parameters shared by the adapter, materializer and exporter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    pub resize_filter: ResizeFilter,
    pub png_compression: PngCompression,
    pub max_dimension: u32,
    pub output_mode: OutputMode,
}

impl RenderContext {
    #[must_use]
    pub fn from_config(config: &RemovalConfig) -> Self {
        Self {
            resize_filter: config.resize_filter,
            png_compression: config.png_compression,
            max_dimension: config.max_dimension,
            output_mode: config.output_mode,
        }
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::from_config(&RemovalConfig::default())
    }
}

/// Pipeline stage, used to attribute timings and failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    ModelLoad,
    LoadSource,
    Normalize,
    Inference,
    MaterializeMask,
    Export,
}

impl ProcessingStage {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ModelLoad => "model_load",
            Self::LoadSource => "load_source",
            Self::Normalize => "normalize",
            Self::Inference => "inference",
            Self::MaterializeMask => "materialize_mask",
            Self::Export => "export",
        }
    }
}

/// Per-stage timing breakdown in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model loading time (zero when a shared model was reused)
    pub model_load_ms: u64,

    /// Source read and decode
    pub image_decode_ms: u64,

    /// BGRA buffer creation
    pub normalize_ms: u64,

    /// Tensor preparation and forward pass
    pub inference_ms: u64,

    /// Output interpretation and mask resampling
    pub mask_ms: u64,

    /// Composition, PNG encoding and write
    pub export_ms: u64,

    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: ProcessingStage, elapsed_ms: u64) {
        tracing::trace!(stage = stage.name(), elapsed_ms, "stage finished");
        match stage {
            ProcessingStage::ModelLoad => self.model_load_ms = elapsed_ms,
            ProcessingStage::LoadSource => self.image_decode_ms = elapsed_ms,
            ProcessingStage::Normalize => self.normalize_ms = elapsed_ms,
            ProcessingStage::Inference => self.inference_ms = elapsed_ms,
            ProcessingStage::MaterializeMask => self.mask_ms = elapsed_ms,
            ProcessingStage::Export => self.export_ms = elapsed_ms,
        }
    }

    /// Share of the total spent in the forward pass
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }
}

/// The written PNG artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalOutput {
    /// Absolute path of the PNG
    pub path: PathBuf,
    /// `file://` URI of the PNG
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub mode: OutputMode,
    pub timings: ProcessingTimings,
}
