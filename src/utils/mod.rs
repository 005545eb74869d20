//! Shared helpers for the removal pipeline

pub mod preprocessing;
pub mod providers;
pub mod validation;

pub use preprocessing::{ImagePreprocessor, PixelBufferAdapter};
pub use providers::{ExecutionProviderManager, ProviderInfo};
pub use validation::{DimensionValidator, TensorValidator};
