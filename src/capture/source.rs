use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::{Rgba, RgbaImage};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// Something that yields the current frame of a video feed.
///
/// Called from a blocking thread, so implementations may do disk I/O.
pub trait FrameSource: Send + 'static {
    fn next_frame(&mut self) -> Result<RgbaImage>;
}

/// Still images from a directory, replayed in file-name order and looped.
pub struct DirectorySource {
    frames: Vec<PathBuf>,
    cursor: usize,
}

impl DirectorySource {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read frames directory {}", dir.display()))?;

        let mut frames = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                frames.push(path);
            }
        }

        if frames.is_empty() {
            bail!("no image files in {}", dir.display());
        }
        frames.sort();

        Ok(Self { frames, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<RgbaImage> {
        let path = &self.frames[self.cursor];
        self.cursor = (self.cursor + 1) % self.frames.len();

        let image = image::open(path)
            .with_context(|| format!("failed to decode frame {}", path.display()))?;
        Ok(image.to_rgba8())
    }
}

/// A synthetic feed: diagonal colour bands that drift a little every frame.
pub struct PatternSource {
    width: u32,
    height: u32,
    tick: u32,
}

impl PatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            tick: 0,
        }
    }
}

impl FrameSource for PatternSource {
    fn next_frame(&mut self) -> Result<RgbaImage> {
        let shift = self.tick.wrapping_mul(7);
        self.tick = self.tick.wrapping_add(1);

        let frame = RgbaImage::from_fn(self.width, self.height, |x, y| {
            let band = x.wrapping_add(y).wrapping_add(shift);
            Rgba([
                (band % 256) as u8,
                ((x * 255) / self.width) as u8,
                ((y * 255) / self.height) as u8,
                255,
            ])
        });
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_source_cycles_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbaImage::from_pixel(3, 3, Rgba([0, 0, 255, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = DirectorySource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.next_frame().unwrap().width(), 3);
        assert_eq!(source.next_frame().unwrap().width(), 2);
        assert_eq!(source.next_frame().unwrap().width(), 3);
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectorySource::open(dir.path()).is_err());
    }

    #[test]
    fn pattern_source_moves_between_frames() {
        let mut source = PatternSource::new(16, 8);
        let first = source.next_frame().unwrap();
        let second = source.next_frame().unwrap();
        assert_eq!(first.dimensions(), (16, 8));
        assert_ne!(first.as_raw(), second.as_raw());
    }
}
