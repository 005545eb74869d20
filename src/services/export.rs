//! Mask composition, PNG encoding and artifact persistence

use crate::{
    config::OutputMode,
    error::{BgRemovalError, Result},
    services::io::path_to_file_uri,
    types::{MaskImage, NormalizedBuffer, RenderContext},
};
use image::{
    codecs::png::{FilterType as PngFilterType, PngEncoder},
    ExtendedColorType, ImageEncoder,
};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Pixels ready for encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub color_type: ExtendedColorType,
}

/// Location of a written artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifact {
    pub path: PathBuf,
    pub uri: String,
}

/// Service for turning masks into PNG files on disk
pub struct ExportService;

impl ExportService {
    /// Compose, encode and write the artifact for `source_path` into `scratch_dir`
    ///
    /// # Errors
    /// `MaskConstructionFailed` if mask and buffer disagree, `EncodingFailed`
    /// if PNG encoding fails, `WriteFailed` if the file cannot be persisted.
    pub fn export(
        source_path: &Path,
        buffer: &NormalizedBuffer,
        mask: &MaskImage,
        ctx: &RenderContext,
        scratch_dir: &Path,
    ) -> Result<WrittenArtifact> {
        let composed = Self::compose(buffer, mask, ctx.output_mode)?;
        let png = Self::encode_png(&composed, ctx)?;
        let file_name = Self::destination_name(source_path, scratch_dir, ctx.output_mode)?;
        let path = Self::write_atomic(scratch_dir, &file_name, &png)?;
        let uri = path_to_file_uri(&path)?;
        Ok(WrittenArtifact { path, uri })
    }

    /// Output name: the source file name with its last extension replaced by `.png`
    ///
    /// # Errors
    /// `WriteFailed` when the source path has no file name.
    pub fn output_file_name(source_path: &Path) -> Result<OsString> {
        let stem = source_path.file_stem().ok_or_else(|| {
            BgRemovalError::write_failed(format!(
                "cannot derive an output name from '{}'",
                source_path.display()
            ))
        })?;
        let mut name = stem.to_os_string();
        name.push(".png");
        Ok(name)
    }

    /// File name to write in `scratch_dir` for `source_path`
    ///
    /// Normally [`ExportService::output_file_name`]. When that name would land on
    /// the source itself (a `.png` source inside the scratch directory), the
    /// mode is added before the extension: `photo.png` becomes `photo.mask.png`.
    ///
    /// # Errors
    /// `WriteFailed` when the source path has no file name.
    pub fn destination_name(
        source_path: &Path,
        scratch_dir: &Path,
        mode: OutputMode,
    ) -> Result<OsString> {
        let name = Self::output_file_name(source_path)?;
        if !is_same_file(&scratch_dir.join(&name), source_path) {
            return Ok(name);
        }

        let mut alternate = Path::new(&name)
            .file_stem()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        alternate.push(format!(".{mode}.png"));
        log::debug!(
            "Output for {} would replace the source, writing {} instead",
            source_path.display(),
            Path::new(&alternate).display()
        );
        Ok(alternate)
    }

    /// Build the output pixels for `mode`
    ///
    /// Cutout pixels whose mask is zero are fully zeroed.
    ///
    /// # Errors
    /// `MaskConstructionFailed` when the mask does not cover the buffer exactly.
    pub fn compose(
        buffer: &NormalizedBuffer,
        mask: &MaskImage,
        mode: OutputMode,
    ) -> Result<ComposedImage> {
        let (width, height) = (buffer.width(), buffer.height());
        if mask.dimensions() != (width, height) {
            let (mask_width, mask_height) = mask.dimensions();
            return Err(BgRemovalError::mask_construction(format!(
                "mask is {mask_width}x{mask_height}, buffer is {width}x{height}"
            )));
        }

        match mode {
            OutputMode::Mask => Ok(ComposedImage {
                pixels: mask.as_gray().as_raw().clone(),
                width,
                height,
                color_type: ExtendedColorType::L8,
            }),
            OutputMode::Cutout => {
                let mut pixels = Vec::with_capacity(buffer.data().len());
                for (bgra, &alpha) in buffer
                    .data()
                    .chunks_exact(NormalizedBuffer::BYTES_PER_PIXEL)
                    .zip(mask.as_gray().as_raw())
                {
                    match *bgra {
                        [_, _, _, _] if alpha == 0 => pixels.extend_from_slice(&[0, 0, 0, 0]),
                        [b, g, r, _] => pixels.extend_from_slice(&[r, g, b, alpha]),
                        _ => {},
                    }
                }
                Ok(ComposedImage {
                    pixels,
                    width,
                    height,
                    color_type: ExtendedColorType::Rgba8,
                })
            },
        }
    }

    /// Encode composed pixels to PNG in memory
    ///
    /// # Errors
    /// `EncodingFailed` on encoder errors.
    pub fn encode_png(composed: &ComposedImage, ctx: &RenderContext) -> Result<Vec<u8>> {
        let expected = u64::from(composed.width)
            * u64::from(composed.height)
            * u64::from(composed.color_type.bits_per_pixel() / 8);
        if composed.pixels.len() as u64 != expected {
            return Err(BgRemovalError::encoding(format!(
                "{}x{} {:?} image needs {expected} bytes, got {}",
                composed.width,
                composed.height,
                composed.color_type,
                composed.pixels.len()
            )));
        }

        let mut png = Vec::new();
        PngEncoder::new_with_quality(&mut png, ctx.png_compression.into(), PngFilterType::Adaptive)
            .write_image(
                &composed.pixels,
                composed.width,
                composed.height,
                composed.color_type,
            )
            .map_err(|e| {
                BgRemovalError::encoding(format!(
                    "PNG encoding of {}x{} {:?} image failed: {e}",
                    composed.width, composed.height, composed.color_type
                ))
            })?;
        Ok(png)
    }

    /// Write `bytes` to `dir/file_name` through a temporary file and rename
    ///
    /// An existing file is replaced. On failure the temporary file is removed
    /// and no partial artifact is left behind.
    ///
    /// # Errors
    /// `WriteFailed` on directory creation, write or rename failure.
    pub fn write_atomic(dir: &Path, file_name: &OsString, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .map_err(|e| BgRemovalError::write_io_error("create output directory", dir, &e))?;
        let dir = std::path::absolute(dir)
            .map_err(|e| BgRemovalError::write_io_error("resolve output directory", dir, &e))?;
        let destination = dir.join(file_name);

        let mut temp = tempfile::Builder::new()
            .prefix(".bgremove-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| BgRemovalError::write_io_error("create temporary file in", &dir, &e))?;

        let written = temp.write_all(bytes).and_then(|()| temp.flush());
        if let Err(e) = written {
            return Err(BgRemovalError::write_io_error("write", temp.path(), &e));
        }

        temp.persist(&destination)
            .map_err(|e| BgRemovalError::write_io_error("persist", &destination, &e.error))?;

        log::debug!(
            "Wrote {} bytes to {}",
            bytes.len(),
            destination.display()
        );
        Ok(destination)
    }
}

/// Both paths resolve to one existing file
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
