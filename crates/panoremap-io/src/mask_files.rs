//! Id-mask and label-map PNG files.
//!
//! Id masks are RGB PNGs carrying one 24-bit segment id per pixel (see
//! [`panoremap_core::mask`] for the packing). Exported label maps are
//! 8-bit (semantic) and 16-bit (instance) grayscale PNGs. All writes go
//! through a temporary sibling renamed into place.

use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, ImageFormat, Luma};
use panoremap_core::IdMask;

use crate::IoError;
use crate::document::tmp_sibling;

/// Load an id mask from an RGB PNG.
///
/// # Errors
///
/// [`IoError::Image`] when the file cannot be opened or decoded.
pub fn load_id_mask(path: &Path) -> Result<IdMask, IoError> {
    let image = image::open(path).map_err(|source| IoError::Image {
        path: path.to_owned(),
        source,
    })?;
    Ok(IdMask::from_rgb(&image.to_rgb8()))
}

/// Save an id mask as an RGB PNG (write-new-then-rename).
///
/// # Errors
///
/// [`IoError::Image`] when encoding fails, [`IoError::Write`] when the
/// temporary file cannot be renamed into place.
pub fn save_id_mask(path: &Path, mask: &IdMask) -> Result<(), IoError> {
    let tmp = tmp_sibling(path);
    mask.to_rgb()
        .save_with_format(&tmp, ImageFormat::Png)
        .map_err(|source| IoError::Image {
            path: tmp.clone(),
            source,
        })?;
    rename_into_place(&tmp, path)
}

/// Save an 8-bit grayscale label map (semantic segmentation).
///
/// # Errors
///
/// [`IoError::PixelBuffer`] when `data` does not match the dimensions,
/// [`IoError::Image`]/[`IoError::Write`] on encoding or rename failure.
pub fn save_gray8(path: &Path, width: u32, height: u32, data: Vec<u8>) -> Result<(), IoError> {
    let image: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_raw(width, height, data)
        .ok_or_else(|| IoError::PixelBuffer {
            path: path.to_owned(),
        })?;
    let tmp = tmp_sibling(path);
    image
        .save_with_format(&tmp, ImageFormat::Png)
        .map_err(|source| IoError::Image {
            path: tmp.clone(),
            source,
        })?;
    rename_into_place(&tmp, path)
}

/// Save a 16-bit grayscale label map (instance segmentation).
///
/// # Errors
///
/// [`IoError::PixelBuffer`] when `data` does not match the dimensions,
/// [`IoError::Image`]/[`IoError::Write`] on encoding or rename failure.
pub fn save_gray16(path: &Path, width: u32, height: u32, data: Vec<u16>) -> Result<(), IoError> {
    let image: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(width, height, data)
        .ok_or_else(|| IoError::PixelBuffer {
            path: path.to_owned(),
        })?;
    let tmp = tmp_sibling(path);
    image
        .save_with_format(&tmp, ImageFormat::Png)
        .map_err(|source| IoError::Image {
            path: tmp.clone(),
            source,
        })?;
    rename_into_place(&tmp, path)
}

fn rename_into_place(tmp: &Path, path: &Path) -> Result<(), IoError> {
    fs::rename(tmp, path).map_err(|source| IoError::Write {
        path: path.to_owned(),
        source,
    })
}

/// Copy a mask file verbatim (used when no consolidation touched it).
///
/// # Errors
///
/// [`IoError::Write`] when the copy fails.
pub fn copy_mask(source: &Path, target: &Path) -> Result<(), IoError> {
    fs::copy(source, target)
        .map(|_| ())
        .map_err(|io| IoError::Write {
            path: target.to_owned(),
            source: io,
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("panoremap-mask-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn id_mask_png_round_trips_exactly() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join("mask.png");
        let ids = vec![0, 1, 255, 70000, (1 << 24) - 1, 12345];
        let mask = IdMask::from_raw(3, 2, ids.clone()).unwrap();
        save_id_mask(&path, &mask).unwrap();
        let back = load_id_mask(&path).unwrap();
        assert_eq!(back.pixels(), &ids[..]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn gray8_rejects_mismatched_buffer() {
        let dir = scratch_dir("gray8");
        let err = save_gray8(&dir.join("x.png"), 2, 2, vec![0; 3]).unwrap_err();
        assert!(matches!(err, IoError::PixelBuffer { .. }));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn gray16_round_trips_wide_values() {
        let dir = scratch_dir("gray16");
        let path = dir.join("inst.png");
        save_gray16(&path, 2, 1, vec![26013, 300]).unwrap();
        let image = image::open(&path).unwrap().to_luma16();
        assert_eq!(image.get_pixel(0, 0).0, [26013]);
        assert_eq!(image.get_pixel(1, 0).0, [300]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_mask_file_is_an_image_error() {
        let err = load_id_mask(Path::new("/nonexistent/mask.png")).unwrap_err();
        assert!(matches!(err, IoError::Image { .. }));
    }
}
