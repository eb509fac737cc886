//! Writing downloaded artifacts to disk

use pictor_core::{ContentHash, Result};
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::job::ArtifactRef;

const FALLBACK_EXTENSION: &str = "png";

/// A fetched artifact materialized as a local file
#[derive(Debug, Clone, Serialize)]
pub struct SavedArtifact {
    /// Path of the written file
    pub path: PathBuf,
    /// Remote URL it was downloaded from
    pub url: String,
    /// Content hash (sha256:...)
    pub content_hash: String,
    pub size_bytes: usize,
    /// Detected image format extension, or the png fallback
    pub format: String,
    /// Pixel dimensions, when the bytes decode as an image
    pub dimensions: Option<(u32, u32)>,
}

/// Write `bytes` into `output_dir` under a fresh, collision-free name
/// (`image_<unix-millis>_<8 hex>.<ext>`).
pub fn write_artifact(bytes: &[u8], source: &ArtifactRef, output_dir: &Path) -> Result<SavedArtifact> {
    std::fs::create_dir_all(output_dir)?;

    let extension = image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or(FALLBACK_EXTENSION);

    let path = output_dir.join(artifact_file_name(extension));
    std::fs::write(&path, bytes)?;

    Ok(SavedArtifact {
        path,
        url: source.as_str().to_string(),
        content_hash: ContentHash::from_bytes(bytes).to_prefixed_hex(),
        size_bytes: bytes.len(),
        format: extension.to_string(),
        dimensions: image_dimensions(bytes),
    })
}

fn artifact_file_name(extension: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("image_{}_{}.{}", millis, &suffix[..8], extension)
}

fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
