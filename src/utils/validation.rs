//! Dimension and tensor validation
//!
//! Checks run before any large allocation or backend call.

use crate::error::{BgRemovalError, Result};
use ndarray::Array4;

/// Validator for source extents and buffer sizes
pub struct DimensionValidator;

impl DimensionValidator {
    /// Reject empty or oversized source images
    ///
    /// # Errors
    /// `BufferAllocationFailed` when either side is zero or above `max_dimension`.
    pub fn validate_image_dimensions(width: u32, height: u32, max_dimension: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::buffer_allocation(format!(
                "Image dimensions too small: {width}x{height}. Minimum: 1x1"
            )));
        }

        if width > max_dimension || height > max_dimension {
            return Err(BgRemovalError::buffer_allocation(format!(
                "Image dimensions too large: {width}x{height}. Maximum: {max_dimension}x{max_dimension}"
            )));
        }

        Ok(())
    }

    /// Byte length of a tightly packed buffer, checked for overflow
    ///
    /// # Errors
    /// `BufferAllocationFailed` when the size does not fit in `usize`.
    pub fn buffer_len(width: u32, height: u32, bytes_per_pixel: usize) -> Result<usize> {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(bytes_per_pixel))
            .ok_or_else(|| {
                BgRemovalError::buffer_allocation(format!(
                    "Buffer size for {width}x{height} at {bytes_per_pixel} bytes per pixel overflows"
                ))
            })
    }
}

/// Validator for model input tensors
pub struct TensorValidator;

impl TensorValidator {
    /// Validate tensor shape matches expected NCHW dimensions
    ///
    /// # Errors
    /// `InferenceFailed` on shape mismatch.
    pub fn validate_tensor_shape(
        tensor: &Array4<f32>,
        expected_shape: (usize, usize, usize, usize),
    ) -> Result<()> {
        let actual = tensor.dim();
        if actual != expected_shape {
            let (batch, channels, height, width) = expected_shape;
            return Err(BgRemovalError::inference(format!(
                "Tensor shape mismatch. Expected [{}, {}, {}, {}], got [{}, {}, {}, {}]",
                batch, channels, height, width, actual.0, actual.1, actual.2, actual.3
            )));
        }
        Ok(())
    }

    /// Validate that every element is finite
    ///
    /// # Errors
    /// `InferenceFailed` naming the first offending element.
    pub fn validate_finite(tensor: &Array4<f32>) -> Result<()> {
        if let Some((index, value)) = tensor.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(BgRemovalError::inference(format!(
                "Input tensor holds non-finite value {value} at {index:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_image_dimension_bounds() {
        assert!(DimensionValidator::validate_image_dimensions(1, 1, 16384).is_ok());
        assert!(DimensionValidator::validate_image_dimensions(16384, 16384, 16384).is_ok());

        let err = DimensionValidator::validate_image_dimensions(0, 10, 16384).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferAllocationFailed);

        let err = DimensionValidator::validate_image_dimensions(64, 65, 64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferAllocationFailed);
    }

    #[test]
    fn test_buffer_len() {
        assert_eq!(DimensionValidator::buffer_len(640, 480, 4).unwrap(), 1_228_800);
        assert!(DimensionValidator::buffer_len(u32::MAX, u32::MAX, usize::MAX).is_err());
    }

    #[test]
    fn test_tensor_validation() {
        let mut tensor = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(TensorValidator::validate_tensor_shape(&tensor, (1, 3, 4, 4)).is_ok());
        assert!(TensorValidator::validate_tensor_shape(&tensor, (1, 3, 4, 5)).is_err());
        assert!(TensorValidator::validate_finite(&tensor).is_ok());

        tensor[[0, 1, 2, 3]] = f32::INFINITY;
        let err = TensorValidator::validate_finite(&tensor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
    }
}
