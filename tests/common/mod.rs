//! Shared fixtures for integration tests

#![allow(dead_code)]

pub mod onnx_graph;

use bgremove_mask::{
    backends::{MockBackend, MockBackendFactory},
    BackendType, BackgroundRemover, ModelLoading, OutputMode, RemovalConfig, StaticProbe,
};
use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Workspace with a mock model file and an output directory
pub struct TestWorkspace {
    pub dir: TempDir,
    pub model_path: PathBuf,
    pub output_dir: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let model_path = dir.path().join("segmentation.onnx");
        std::fs::write(&model_path, b"mock segmentation model").expect("Failed to write model");
        let output_dir = dir.path().join("out");
        Self {
            dir,
            model_path,
            output_dir,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Mock-backend configuration writing into `output_dir`
    pub fn config(&self, mode: OutputMode, loading: ModelLoading) -> RemovalConfig {
        let mut config = RemovalConfig::builder()
            .backend(BackendType::Mock)
            .model_path(&self.model_path)
            .output_mode(mode)
            .model_loading(loading)
            .scratch_dir(&self.output_dir)
            .build()
            .expect("Failed to build config");
        config.model.input_size = (64, 64);
        config
    }

    /// Remover with a counting mock factory and a supported environment
    pub fn remover(
        &self,
        config: RemovalConfig,
        template: MockBackend,
    ) -> (Arc<BackgroundRemover>, MockBackendFactory) {
        let factory = MockBackendFactory::new(template);
        let remover = BackgroundRemover::with_components(
            config,
            Arc::new(factory.clone()),
            &StaticProbe::supported(),
        )
        .expect("Failed to build remover");
        (Arc::new(remover), factory)
    }
}

/// Gradient test pattern
pub fn pattern(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn write_png(path: &Path, width: u32, height: u32) -> PathBuf {
    pattern(width, height).save(path).expect("Failed to write PNG");
    path.to_path_buf()
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 90)
        .write_image(pattern(width, height).as_raw(), width, height, ExtendedColorType::Rgb8)
        .expect("Failed to encode JPEG");
    bytes
}

pub fn write_jpeg(path: &Path, width: u32, height: u32) -> PathBuf {
    std::fs::write(path, jpeg_bytes(width, height)).expect("Failed to write JPEG");
    path.to_path_buf()
}

/// JPEG whose EXIF block says "rotate 90° clockwise" (orientation 6)
pub fn write_rotated_jpeg(path: &Path, width: u32, height: u32) -> PathBuf {
    const EXIF_ORIENTATION_6: [u8; 36] = [
        0xFF, 0xE1, 0x00, 0x22, b'E', b'x', b'i', b'f', 0x00, 0x00, b'M', b'M', 0x00, 0x2A, 0x00,
        0x00, 0x00, 0x08, 0x00, 0x01, 0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x06,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    let jpeg = jpeg_bytes(width, height);
    let mut bytes = Vec::with_capacity(jpeg.len() + EXIF_ORIENTATION_6.len());
    bytes.extend_from_slice(&jpeg[..2]);
    bytes.extend_from_slice(&EXIF_ORIENTATION_6);
    bytes.extend_from_slice(&jpeg[2..]);
    std::fs::write(path, bytes).expect("Failed to write JPEG");
    path.to_path_buf()
}

pub fn uri(path: &Path) -> String {
    path.to_str().expect("Non UTF-8 temp path").to_string()
}
