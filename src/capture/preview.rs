use std::path::PathBuf;

use anyhow::{Context, Result};
use image::{ColorType, ImageFormat};

/// The decoded fingerprint of the latest frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub hash: String,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Where previews are drawn. Called from a blocking thread on every tick.
pub trait PreviewSink: Send + Sync {
    fn show(&self, preview: &Preview) -> Result<()>;
}

/// Overwrites one PNG file with each new preview.
pub struct PngPreview {
    path: PathBuf,
}

impl PngPreview {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl PreviewSink for PngPreview {
    fn show(&self, preview: &Preview) -> Result<()> {
        // Write next to the target and rename, so readers never see a torn file
        let partial = self.path.with_extension("png.partial");
        image::save_buffer_with_format(
            &partial,
            &preview.rgba,
            preview.width,
            preview.height,
            ColorType::Rgba8,
            ImageFormat::Png,
        )
        .with_context(|| format!("failed to write preview {}", partial.display()))?;
        std::fs::rename(&partial, &self.path)
            .with_context(|| format!("failed to move preview into {}", self.path.display()))
    }
}

/// Discards previews.
pub struct NoPreview;

impl PreviewSink for NoPreview {
    fn show(&self, _preview: &Preview) -> Result<()> {
        Ok(())
    }
}
