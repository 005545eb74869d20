//! Source location parsing and image loading

use crate::{
    error::{BgRemovalError, Result},
    types::SourceImage,
};
use image::{metadata::Orientation, DynamicImage, ImageDecoder, ImageReader};
use std::path::{Path, PathBuf};
use url::Url;

/// Resolve a caller-supplied location to a filesystem path
///
/// Accepts plain relative or absolute paths and `file:` URIs with an empty or
/// `localhost` authority. Any other `scheme://` location is rejected.
///
/// # Errors
/// `InvalidSource` for empty input, foreign schemes, remote hosts or malformed URIs.
pub fn parse_location(uri: &str) -> Result<PathBuf> {
    if uri.trim().is_empty() {
        return Err(BgRemovalError::invalid_source("empty source location"));
    }

    if !has_url_scheme(uri) {
        return Ok(PathBuf::from(uri));
    }

    let url = Url::parse(uri)
        .map_err(|e| BgRemovalError::invalid_source(format!("malformed URI '{uri}': {e}")))?;
    if url.scheme() != "file" {
        return Err(BgRemovalError::invalid_source(format!(
            "unsupported URI scheme '{}'",
            url.scheme()
        )));
    }

    url.to_file_path().map_err(|()| {
        BgRemovalError::invalid_source(format!("file URI '{uri}' does not name a local path"))
    })
}

/// `file://` URI for an absolute path
///
/// # Errors
/// `WriteFailed` when the path is relative or cannot be expressed as a URI.
pub fn path_to_file_uri(path: &Path) -> Result<String> {
    Url::from_file_path(path).map(String::from).map_err(|()| {
        BgRemovalError::write_failed(format!(
            "cannot express '{}' as a file URI",
            path.display()
        ))
    })
}

/// `file:` prefixes and `scheme://` forms; single letters are drive names, not schemes
fn has_url_scheme(uri: &str) -> bool {
    let Some((scheme, rest)) = uri.split_once(':') else {
        return false;
    };
    if scheme.eq_ignore_ascii_case("file") {
        return true;
    }

    let mut chars = scheme.chars();
    scheme.len() > 1
        && rest.starts_with("//")
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Service for reading source images
pub struct ImageIOService;

impl ImageIOService {
    /// Read and decode the image at `uri`, applying its EXIF orientation
    ///
    /// The format is detected from the file content, not its extension.
    ///
    /// # Errors
    /// `InvalidSource` when the location cannot be parsed, read or decoded.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bgremove_mask::services::ImageIOService;
    ///
    /// let source = ImageIOService::load_source("file:///tmp/my%20photo.jpg")?;
    /// println!("{:?}", source.dimensions());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_source(uri: &str) -> Result<SourceImage> {
        let path = parse_location(uri)?;
        let image = Self::load_image(&path)?;
        Ok(SourceImage::new(image, path))
    }

    /// Decode an image file with content-based format detection and orientation applied
    ///
    /// # Errors
    /// `InvalidSource` on any read or decode failure.
    pub fn load_image(path: &Path) -> Result<DynamicImage> {
        if path.is_dir() {
            return Err(BgRemovalError::invalid_source(format!(
                "'{}' is a directory",
                path.display()
            )));
        }

        let reader = ImageReader::open(path)
            .map_err(|e| BgRemovalError::source_io_error("open image", path, &e))?
            .with_guessed_format()
            .map_err(|e| BgRemovalError::source_io_error("read image header", path, &e))?;

        if reader.format().is_none() {
            return Err(BgRemovalError::invalid_source(format!(
                "unrecognized image format in '{}'",
                path.display()
            )));
        }

        let mut decoder = reader.into_decoder().map_err(|e| {
            BgRemovalError::invalid_source(format!(
                "unsupported image '{}': {e}",
                path.display()
            ))
        })?;

        let orientation = decoder.orientation().unwrap_or_else(|e| {
            log::debug!(
                "Ignoring unreadable orientation metadata in {}: {e}",
                path.display()
            );
            Orientation::NoTransforms
        });

        let mut image = DynamicImage::from_decoder(decoder).map_err(|e| {
            BgRemovalError::invalid_source(format!(
                "failed to decode '{}': {e}",
                path.display()
            ))
        })?;
        image.apply_orientation(orientation);

        log::debug!(
            "Decoded {} as {}x{} ({:?})",
            path.display(),
            image.width(),
            image.height(),
            orientation
        );

        Ok(image)
    }
}
