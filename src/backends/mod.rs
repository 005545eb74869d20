//! Inference backends
//!
//! - ONNX Runtime (CPU, CUDA, `CoreML`)
//! - Tract (pure Rust, CPU)
//! - Mock (deterministic synthetic output, always compiled)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub mod mock;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

pub use self::mock::{MockBackend, MockBackendFactory};
