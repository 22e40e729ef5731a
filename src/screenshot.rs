//! Backbuffer capture to PNG.
//!
//! The GPU copy itself lives in [`WgpuDevice`](crate::WgpuDevice); this
//! module holds the byte-level work around it: row pitch, de-padding, channel
//! order and the file write.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, thiserror::Error)]
pub enum ScreenshotError {
    #[error("surface does not support copying out of the backbuffer")]
    Unsupported,
    #[error("failed to map the readback buffer: {0}")]
    Map(String),
    #[error("captured {actual} bytes, expected {expected} for {width}x{height}")]
    Size {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("failed to create screenshot directory `{path}`")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write `{path}`")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Row pitch for a buffer copy: `width * 4` rounded up to wgpu's alignment.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Drops the padding at the end of each row.
pub fn unpad_rows(data: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<u8> {
    let row = (width * 4) as usize;
    data.chunks(padded_row as usize)
        .take(height as usize)
        .flat_map(|chunk| &chunk[..row.min(chunk.len())])
        .copied()
        .collect()
}

/// Swaps red and blue in place.
pub fn bgra_to_rgba(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

/// `<dir>/screenshot_<unix-seconds>.png`
pub fn screenshot_path(dir: &Path, time: SystemTime) -> PathBuf {
    let seconds = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("screenshot_{seconds}.png"))
}

/// Writes tightly packed RGBA8 pixels as a PNG, creating `dir` if needed.
pub fn save_png(dir: &Path, width: u32, height: u32, rgba: Vec<u8>) -> Result<PathBuf, ScreenshotError> {
    let expected = (width * height * 4) as usize;
    let actual = rgba.len();
    let image = image::RgbaImage::from_raw(width, height, rgba).ok_or(ScreenshotError::Size {
        width,
        height,
        expected,
        actual,
    })?;

    std::fs::create_dir_all(dir).map_err(|source| ScreenshotError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = screenshot_path(dir, SystemTime::now());
    image
        .save_with_format(&path, image::ImageFormat::Png)
        .map_err(|source| ScreenshotError::Encode {
            path: path.clone(),
            source,
        })?;
    log::info!("saved screenshot to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn row_pitch_is_aligned() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(1280), 5120);
    }

    #[test]
    fn unpad_keeps_only_pixels() {
        // Two rows of one pixel, each padded to 8 bytes.
        let data = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        assert_eq!(unpad_rows(&data, 1, 2, 8), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn swizzle() {
        let mut px = vec![10, 20, 30, 255, 1, 2, 3, 4];
        bgra_to_rgba(&mut px);
        assert_eq!(px, vec![30, 20, 10, 255, 3, 2, 1, 4]);
    }

    #[test]
    fn path_uses_unix_seconds() {
        let time = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(
            screenshot_path(Path::new("shots"), time),
            Path::new("shots").join("screenshot_1700000000.png")
        );
    }

    #[test]
    fn wrong_size_is_rejected() {
        let err = save_png(Path::new("unused"), 2, 2, vec![0; 8]).unwrap_err();
        assert!(matches!(err, ScreenshotError::Size { expected: 16, actual: 8, .. }));
    }

    #[test]
    fn png_written() {
        let dir = std::env::temp_dir().join(format!("render-labs-shot-{}", std::process::id()));
        let path = save_png(&dir, 2, 1, vec![255, 0, 0, 255, 0, 255, 0, 255]).unwrap();
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(decoded.get_pixel(1, 0).0, [0, 255, 0, 255]);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
