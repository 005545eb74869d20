//! Conversion of raw segmentation output into a source-sized mask

use crate::error::{BgRemovalError, Result};
use crate::models::OutputInterpretation;
use crate::types::{MaskImage, RenderContext, SegmentationResult};
use image::GrayImage;

/// Turns validated model output into an 8-bit mask at the source extent
pub struct MaskMaterializer;

impl MaskMaterializer {
    /// Validate, interpret and resample `result` to exactly `target` (width, height)
    ///
    /// # Errors
    /// `MaskConstructionFailed` when the output layout is inconsistent, the
    /// target is empty, or the resampled mask does not match the target.
    pub fn materialize(
        result: &SegmentationResult,
        target: (u32, u32),
        ctx: &RenderContext,
    ) -> Result<MaskImage> {
        let (target_width, target_height) = target;
        if target_width == 0 || target_height == 0 {
            return Err(BgRemovalError::mask_construction(format!(
                "target extent {target_width}x{target_height} is empty"
            )));
        }

        result.validate()?;
        let native = Self::interpret(result)?;

        let resized = if native.dimensions() == target {
            native
        } else {
            image::imageops::resize(
                &native,
                target_width,
                target_height,
                ctx.resize_filter.into(),
            )
        };

        MaskImage::new(resized, target)
    }

    /// Map raw values to 0..=255 at model-native resolution
    fn interpret(result: &SegmentationResult) -> Result<GrayImage> {
        let width = u32::try_from(result.width())
            .map_err(|_| BgRemovalError::mask_construction("model output too wide"))?;
        let height = u32::try_from(result.height())
            .map_err(|_| BgRemovalError::mask_construction("model output too tall"))?;
        let plane = result.width() * result.height();
        let data = result.data();

        let pixels: Vec<u8> = match result.interpretation() {
            OutputInterpretation::Probability => data.iter().map(|&v| probability_to_u8(v)).collect(),
            OutputInterpretation::Logits => data
                .iter()
                .map(|&v| probability_to_u8(sigmoid(v)))
                .collect(),
            OutputInterpretation::ClassIndex { background } => data
                .iter()
                .map(|&v| foreground_value(v.round() as i64 != i64::from(background)))
                .collect(),
            OutputInterpretation::ClassScores { background } => {
                let background = background as usize;
                (0..plane)
                    .map(|pixel| {
                        let winner = argmax(
                            (0..result.channels())
                                .filter_map(|channel| data.get(channel * plane + pixel).copied()),
                        );
                        foreground_value(winner != Some(background))
                    })
                    .collect()
            },
        };

        GrayImage::from_raw(width, height, pixels).ok_or_else(|| {
            BgRemovalError::mask_construction(format!(
                "interpreted mask does not cover {width}x{height}"
            ))
        })
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

fn probability_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn foreground_value(is_foreground: bool) -> u8 {
    if is_foreground {
        255
    } else {
        0
    }
}

/// Index of the largest value; the first one wins ties
fn argmax(values: impl Iterator<Item = f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, value) in values.enumerate() {
        match best {
            Some((_, current)) if value <= current => {},
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}
