//! Pixel buffer normalization and model input preparation

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
    types::{NormalizedBuffer, RenderContext, SourceImage},
    utils::validation::{DimensionValidator, TensorValidator},
};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};
use ndarray::Array4;
use std::borrow::Cow;

/// Converts decoded images into the fixed BGRA8 working format
pub struct PixelBufferAdapter;

impl PixelBufferAdapter {
    /// Copy the full source frame into a tightly packed BGRA8 buffer
    ///
    /// # Errors
    /// `BufferAllocationFailed` for zero-sized or oversized sources, size
    /// overflow, or when the allocation itself fails.
    pub fn normalize(source: &SourceImage, ctx: &RenderContext) -> Result<NormalizedBuffer> {
        let (width, height) = source.dimensions();
        DimensionValidator::validate_image_dimensions(width, height, ctx.max_dimension)?;
        let len = DimensionValidator::buffer_len(width, height, NormalizedBuffer::BYTES_PER_PIXEL)?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            BgRemovalError::buffer_allocation(format!(
                "Cannot allocate {len} bytes for {width}x{height} BGRA buffer: {e}"
            ))
        })?;

        let rgba: Cow<'_, RgbaImage> = match source.image() {
            DynamicImage::ImageRgba8(image) => Cow::Borrowed(image),
            other => Cow::Owned(other.to_rgba8()),
        };

        for pixel in rgba.as_raw().chunks_exact(4) {
            if let [r, g, b, a] = *pixel {
                data.extend_from_slice(&[b, g, r, a]);
            }
        }

        NormalizedBuffer::from_bgra(data, width, height)
    }
}

/// Builds model input tensors from normalized buffers
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Stretch the buffer to the model input size and convert to a normalized NCHW RGB tensor
    ///
    /// Pixels are scaled to `[0, 1]`, then `(v - mean) / std` per channel.
    ///
    /// # Errors
    /// `InferenceFailed` when the input size is empty or the tensor cannot be built.
    pub fn tensor_from_buffer(
        buffer: &NormalizedBuffer,
        preprocessing_config: &PreprocessingConfig,
        filter: FilterType,
    ) -> Result<Array4<f32>> {
        let [target_width, target_height] = preprocessing_config.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(BgRemovalError::inference(format!(
                "Model input size {target_width}x{target_height} is empty"
            )));
        }

        let rgb = Self::buffer_to_rgb(buffer)?;
        let canvas = if rgb.dimensions() == (target_width, target_height) {
            rgb
        } else {
            image::imageops::resize(&rgb, target_width, target_height, filter)
        };

        let tensor = Self::canvas_to_tensor(&canvas, preprocessing_config);
        TensorValidator::validate_tensor_shape(
            &tensor,
            (1, 3, target_height as usize, target_width as usize),
        )?;
        TensorValidator::validate_finite(&tensor)?;
        Ok(tensor)
    }

    fn buffer_to_rgb(buffer: &NormalizedBuffer) -> Result<RgbImage> {
        let raw: Vec<u8> = buffer
            .data()
            .chunks_exact(NormalizedBuffer::BYTES_PER_PIXEL)
            .flat_map(|pixel| match *pixel {
                [b, g, r, _] => [r, g, b],
                _ => [0, 0, 0],
            })
            .collect();

        RgbImage::from_raw(buffer.width(), buffer.height(), raw).ok_or_else(|| {
            BgRemovalError::inference(format!(
                "Buffer does not cover {}x{} RGB pixels",
                buffer.width(),
                buffer.height()
            ))
        })
    }

    #[allow(clippy::indexing_slicing)] // channel index comes from the fixed 3-channel shape
    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, channel, y, x)| {
                let value = f32::from(canvas.get_pixel(x as u32, y as u32)[channel]) / 255.0;
                (value - mean[channel]) / std[channel]
            },
        )
    }
}
