//! In-memory id masks: per-pixel segment ids packed into 24-bit RGB, plus
//! derivation of semantic and instance label maps.
//!
//! COCO panoptic masks store each pixel's segment id across the three
//! 8-bit channels with **red least significant**:
//! `id = r + g * 256 + b * 65536`. The packing is exact for ids below
//! 2^24. This module operates on decoded in-memory images only; reading
//! and writing PNG files is the caller's concern.

use std::collections::HashMap;

use image::RgbImage;

use crate::types::{RemapError, SegmentInfo};

/// Largest segment id representable in a 24-bit mask.
pub const MAX_MASK_ID: u32 = (1 << 24) - 1;

/// A per-image mask of segment ids, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMask {
    width: u32,
    height: u32,
    data: Vec<u32>,
}

impl IdMask {
    /// Build a mask from raw row-major ids; `None` when the buffer length
    /// does not match the dimensions.
    #[must_use]
    pub fn from_raw(width: u32, height: u32, data: Vec<u32>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Unpack a decoded RGB mask image into segment ids.
    #[must_use]
    pub fn from_rgb(image: &RgbImage) -> Self {
        let data = image
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                u32::from(r) | (u32::from(g) << 8) | (u32::from(b) << 16)
            })
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            data,
        }
    }

    /// Pack the mask back into an RGB image, the exact inverse of
    /// [`IdMask::from_rgb`].
    #[must_use]
    pub fn to_rgb(&self) -> RgbImage {
        let mut image = RgbImage::new(self.width, self.height);
        for (pixel, &id) in image.pixels_mut().zip(&self.data) {
            pixel.0 = [(id & 0xFF) as u8, ((id >> 8) & 0xFF) as u8, ((id >> 16) & 0xFF) as u8];
        }
        image
    }

    /// Mask width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row-major per-pixel segment ids.
    #[must_use]
    pub fn pixels(&self) -> &[u32] {
        &self.data
    }

    /// Rewrite every pixel holding `retired` to `survivor`; returns the
    /// number of pixels touched.
    pub fn relabel(&mut self, retired: u32, survivor: u32) -> usize {
        let mut touched = 0;
        for id in &mut self.data {
            if *id == retired {
                *id = survivor;
                touched += 1;
            }
        }
        touched
    }
}

/// Per-pixel category ids (semantic segmentation) derived from an id mask
/// and its segment list. Pixels matching no segment stay 0.
///
/// # Errors
///
/// Returns [`RemapError::IdOutOfRange`] when a segment's category id does
/// not fit the 8-bit output format.
pub fn semantic_map(mask: &IdMask, segments: &[SegmentInfo]) -> Result<Vec<u8>, RemapError> {
    let mut by_id: HashMap<u32, u8> = HashMap::with_capacity(segments.len());
    for seg in segments {
        let Ok(pixel_id) = u32::try_from(seg.id) else {
            // Ids beyond the mask's range cannot address any pixel.
            continue;
        };
        let category = u8::try_from(seg.category_id).map_err(|_| RemapError::IdOutOfRange {
            id: seg.category_id,
            bits: 8,
        })?;
        by_id.insert(pixel_id, category);
    }
    Ok(mask
        .pixels()
        .iter()
        .map(|id| by_id.get(id).copied().unwrap_or(0))
        .collect())
}

/// Per-pixel instance ids derived from an id mask and its segment list.
///
/// Countable ("thing") segments are numbered `category_id * 1000 + n`
/// with `n` counting countable segments from 1 in list order; all other
/// segments carry their bare category id. Pixels matching no segment
/// stay 0.
///
/// # Errors
///
/// Returns [`RemapError::IdOutOfRange`] when an encoded value does not
/// fit the 16-bit output format.
pub fn instance_map(
    mask: &IdMask,
    segments: &[SegmentInfo],
    countable: &HashMap<i64, bool>,
) -> Result<Vec<u16>, RemapError> {
    let mut by_id: HashMap<u32, u16> = HashMap::with_capacity(segments.len());
    let mut instance_counter: i64 = 1;
    for seg in segments {
        let Ok(pixel_id) = u32::try_from(seg.id) else {
            continue;
        };
        let is_countable = countable.get(&seg.category_id).copied().unwrap_or(false);
        let encoded = if is_countable {
            let value = seg.category_id * 1000 + instance_counter;
            instance_counter += 1;
            value
        } else {
            seg.category_id
        };
        let encoded = u16::try_from(encoded).map_err(|_| RemapError::IdOutOfRange {
            id: encoded,
            bits: 16,
        })?;
        by_id.insert(pixel_id, encoded);
    }
    Ok(mask
        .pixels()
        .iter()
        .map(|id| by_id.get(id).copied().unwrap_or(0))
        .collect())
}
