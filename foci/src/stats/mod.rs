//! Image histogram, region/background statistics and background resolution.

pub mod threshold;


use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{BackgroundMethod, Params, StatisticsMode};
use crate::image::Image;
use crate::pixel_type::PixelType;

/// Bins available to auto-thresholding; wider ranges are down-sampled.
pub const MAX_THRESHOLD_BINS: usize = 65536;

// ============================================================================
// Histogram
// ============================================================================

/// Exact histogram of the distinct pixel values, ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    values: Vec<f32>,
    counts: Vec<usize>,
    total: usize,
}

impl Histogram {
    pub fn from_values(values: impl IntoIterator<Item = f32>) -> Self {
        let mut sorted: Vec<f32> = values.into_iter().filter(|v| !v.is_nan()).collect();
        sorted.sort_unstable_by(f32::total_cmp);

        let total = sorted.len();
        let mut unique: Vec<f32> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        for v in sorted {
            match unique.last() {
                Some(&last) if last == v => {
                    if let Some(c) = counts.last_mut() {
                        *c += 1;
                    }
                }
                _ => {
                    unique.push(v);
                    counts.push(1);
                }
            }
        }
        Self {
            values: unique,
            counts,
            total,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of pixels counted.
    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn min(&self) -> Option<f32> {
        self.values.first().copied()
    }

    pub fn max(&self) -> Option<f32> {
        self.values.last().copied()
    }

    /// Bin index of `value`: the number of distinct values below it.
    #[inline]
    pub fn bin_of(&self, value: f32) -> usize {
        self.values.partition_point(|&v| v < value)
    }

    /// Counts handed to auto-thresholding.
    ///
    /// Integer data spanning at most [`MAX_THRESHOLD_BINS`] values keeps one bin
    /// per integer. Float data with at most [`MAX_THRESHOLD_BINS`] distinct
    /// values keeps one bin per distinct value. Anything larger is down-sampled
    /// to [`MAX_THRESHOLD_BINS`] equal-width bins.
    pub fn threshold_histogram(&self, is_integer: bool) -> ThresholdHistogram {
        let (Some(min), Some(max)) = (self.min(), self.max()) else {
            return ThresholdHistogram::default();
        };
        let (min, max) = (min as f64, max as f64);
        let range = max - min;

        if !is_integer && self.len() <= MAX_THRESHOLD_BINS {
            return ThresholdHistogram {
                counts: self.counts.iter().map(|&c| c as u64).collect(),
                min,
                bin_width: 0.0,
                bin_values: self.values.iter().map(|&v| v as f64).collect(),
            };
        }

        let (bins, bin_width) = if is_integer && range < MAX_THRESHOLD_BINS as f64 {
            (range as usize + 1, 1.0)
        } else {
            (MAX_THRESHOLD_BINS, range / (MAX_THRESHOLD_BINS - 1) as f64)
        };

        let mut counts = vec![0u64; bins];
        for (&v, &c) in self.values.iter().zip(&self.counts) {
            let bin = (((v as f64 - min) / bin_width).round() as usize).min(bins - 1);
            counts[bin] += c as u64;
        }
        ThresholdHistogram {
            counts,
            min,
            bin_width,
            bin_values: Vec::new(),
        }
    }
}

/// Histogram handed to the threshold algorithms.
///
/// Bins are either equal-width starting at `min`, or one per distinct value
/// listed in `bin_values`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdHistogram {
    pub counts: Vec<u64>,
    pub min: f64,
    pub bin_width: f64,
    pub bin_values: Vec<f64>,
}

impl ThresholdHistogram {
    #[inline]
    pub fn value_of_bin(&self, bin: usize) -> f64 {
        match self.bin_values.get(bin) {
            Some(&v) => v,
            None => self.min + bin as f64 * self.bin_width,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Summary of one set of pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelSummary {
    pub count: usize,
    pub minimum: f32,
    pub maximum: f32,
    pub total: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl PixelSummary {
    pub fn from_values(values: impl IntoIterator<Item = f32>) -> Self {
        let mut count = 0usize;
        let mut minimum = f32::INFINITY;
        let mut maximum = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for v in values {
            count += 1;
            minimum = minimum.min(v);
            maximum = maximum.max(v);
            sum += v as f64;
            sum_sq += v as f64 * v as f64;
        }
        if count == 0 {
            return Self::default();
        }
        let mean = sum / count as f64;
        let std_dev = if count > 1 {
            ((sum_sq - sum * sum / count as f64) / (count - 1) as f64)
                .max(0.0)
                .sqrt()
        } else {
            0.0
        };
        Self {
            count,
            minimum,
            maximum,
            total: sum,
            mean,
            std_dev,
        }
    }
}

/// Image statistics computed once per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Minimum over every non-NaN pixel of the image.
    pub image_minimum: f32,
    /// Pixels inside the mask/ROI.
    pub region: PixelSummary,
    /// Pixels selected by the statistics mode.
    pub background_stats: PixelSummary,
    /// Resolved background level.
    pub background: f64,
    /// Sum of `v - background` over region pixels above the background.
    pub region_total_above_background: f64,
    /// Sum of `v - image_minimum` over region pixels.
    pub region_total_above_minimum: f64,
}

impl Statistics {
    /// Saddle value used when a peak has no neighbour.
    #[inline]
    pub fn no_saddle_value(&self) -> f64 {
        no_saddle_value(self.background)
    }
}

/// `0` for non-negative backgrounds, `-inf` otherwise, so a missing saddle is
/// never mistaken for a saddle below a negative background.
#[inline]
pub fn no_saddle_value(background: f64) -> f64 {
    if background >= 0.0 {
        0.0
    } else {
        f64::NEG_INFINITY
    }
}

/// Compute statistics and the region histogram of `image`.
///
/// `types` carries the `EXCLUDED` flags. An image with no included pixels
/// yields zero statistics and an empty histogram.
pub fn compute_statistics(
    image: &Image,
    types: &[PixelType],
    params: &Params,
) -> (Statistics, Histogram) {
    let pixels = image.pixels();
    debug_assert_eq!(pixels.len(), types.len());

    let included = || {
        pixels
            .iter()
            .zip(types)
            .filter(|(_, t)| !t.contains(PixelType::EXCLUDED))
            .map(|(&v, _)| v)
    };

    let histogram = Histogram::from_values(included());
    if histogram.is_empty() {
        debug!("All pixels excluded, statistics are zero");
        let background = match params.background_method {
            BackgroundMethod::Absolute => params.background_parameter,
            _ => 0.0,
        };
        return (
            Statistics {
                background,
                ..Statistics::default()
            },
            histogram,
        );
    }

    let region = PixelSummary::from_values(included());
    let image_minimum = pixels
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f32::INFINITY, f32::min);

    let any_excluded_value = pixels
        .iter()
        .zip(types)
        .any(|(v, t)| t.contains(PixelType::EXCLUDED) && !v.is_nan());
    let mode = match params.statistics_mode {
        StatisticsMode::Outside if !any_excluded_value => {
            debug!("Nothing outside the mask/ROI, using inside statistics");
            StatisticsMode::Inside
        }
        mode => mode,
    };

    let background_histogram;
    let (background_stats, background_hist) = match mode {
        StatisticsMode::Inside => (region, &histogram),
        StatisticsMode::All => {
            let values = || pixels.iter().copied().filter(|v| !v.is_nan());
            background_histogram = Histogram::from_values(values());
            (PixelSummary::from_values(values()), &background_histogram)
        }
        StatisticsMode::Outside => {
            let values = || {
                pixels
                    .iter()
                    .zip(types)
                    .filter(|(v, t)| t.contains(PixelType::EXCLUDED) && !v.is_nan())
                    .map(|(&v, _)| v)
            };
            background_histogram = Histogram::from_values(values());
            (PixelSummary::from_values(values()), &background_histogram)
        }
    };

    let background = resolve_background(
        params,
        &background_stats,
        background_hist,
        &region,
        image_minimum,
        image.is_integer(),
    );

    let mut region_total_above_background = 0.0;
    let mut region_total_above_minimum = 0.0;
    for v in included() {
        let v = v as f64;
        if v > background {
            region_total_above_background += v - background;
        }
        region_total_above_minimum += v - image_minimum as f64;
    }

    debug!(
        included = region.count,
        background,
        image_minimum,
        method = %params.background_method,
        "Computed image statistics"
    );

    (
        Statistics {
            image_minimum,
            region,
            background_stats,
            background,
            region_total_above_background,
            region_total_above_minimum,
        },
        histogram,
    )
}

fn resolve_background(
    params: &Params,
    background_stats: &PixelSummary,
    background_hist: &Histogram,
    region: &PixelSummary,
    image_minimum: f32,
    is_integer: bool,
) -> f64 {
    match params.background_method {
        BackgroundMethod::Absolute => params.background_parameter,
        BackgroundMethod::Mean => background_stats.mean,
        BackgroundMethod::StdDevAboveMean => {
            background_stats.mean + params.background_parameter * background_stats.std_dev
        }
        BackgroundMethod::AutoThreshold => {
            let th = background_hist.threshold_histogram(is_integer);
            match threshold::threshold_bin(params.threshold_method, &th.counts) {
                Some(bin) => th.value_of_bin(bin),
                None => {
                    debug!(method = %params.threshold_method, "Threshold not found, using minimum");
                    th.min
                }
            }
        }
        BackgroundMethod::MinMaskOrRoi => region.minimum as f64,
        BackgroundMethod::None => image_minimum as f64,
    }
}
