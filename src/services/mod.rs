//! Pipeline I/O services

pub mod export;
pub mod io;

pub use export::{ComposedImage, ExportService, WrittenArtifact};
pub use io::{parse_location, path_to_file_uri, ImageIOService};
