//! 16-bit label images built from a finished result.

use tracing::warn;

use crate::config::MaskType;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::result::FociResult;

/// Largest number of peaks a 16-bit label image can hold.
pub const MASK_CAPACITY: usize = u16::MAX as usize;

/// Build a label image from `result`.
///
/// `image` must be the image the result was measured on. Per-peak masks label
/// each region with its peak id; single-label masks use 1 for every region.
/// Above-saddle masks keep only pixels above the peak's highest saddle (or the
/// background when it has none).
pub fn build_mask(result: &FociResult, image: &Image, mask_type: MaskType) -> Result<Vec<u16>> {
    let single = mask_type.single_label();
    if !single && result.peaks.len() > MASK_CAPACITY {
        warn!(
            peaks = result.peaks.len(),
            capacity = MASK_CAPACITY,
            "Too many peaks for a 16-bit mask"
        );
        return Err(Error::MaskCapacityExceeded {
            peaks: result.peaks.len(),
            capacity: MASK_CAPACITY,
        });
    }
    assert_eq!(
        image.pixels().len(),
        result.maxima.len(),
        "Image does not match the result"
    );

    let mut floors = vec![f64::NEG_INFINITY; result.peaks.len() + 1];
    if mask_type.above_saddle() {
        for peak in &result.peaks {
            floors[peak.id as usize] = if peak.has_saddle() {
                peak.highest_saddle_value
            } else {
                result.statistics.background
            };
        }
    }

    let labels = result
        .maxima
        .iter()
        .zip(image.pixels())
        .map(|(&id, &v)| {
            if id == 0 || v as f64 <= floors[id as usize] {
                0
            } else if single {
                1
            } else {
                id as u16
            }
        })
        .collect();
    Ok(labels)
}
