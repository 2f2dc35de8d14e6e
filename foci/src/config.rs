//! Configuration types for foci detection.
//!
//! This module defines the flat [`Params`] struct and associated enums used by
//! the pipeline. Parameters are grouped by comments into pipeline stages.
//! Every enum is serializable and iterable so a driver can enumerate and store
//! parameter sets.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

// ============================================================================
// Enums
// ============================================================================

/// How the background level is derived from the image statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumIter)]
pub enum BackgroundMethod {
    /// `background_parameter` is used as the background value.
    Absolute,
    /// Mean of the background statistics pixels.
    Mean,
    /// Mean plus `background_parameter` standard deviations.
    StdDevAboveMean,
    /// Histogram threshold computed with `threshold_method`.
    #[default]
    AutoThreshold,
    /// Minimum value inside the mask/ROI.
    MinMaskOrRoi,
    /// No background: the image minimum is used.
    None,
}

/// Histogram auto-threshold algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumIter)]
pub enum ThresholdMethod {
    /// Iterative intermeans variant used as the default by ImageJ.
    Default,
    Huang,
    Intermodes,
    IsoData,
    Li,
    MaxEntropy,
    Mean,
    Minimum,
    Moments,
    #[default]
    Otsu,
    Percentile,
    Triangle,
    Yen,
}

/// Which pixels feed the background statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumIter)]
pub enum StatisticsMode {
    /// Every non-NaN pixel.
    All,
    /// Pixels inside the mask/ROI.
    #[default]
    Inside,
    /// Pixels outside the mask/ROI. Falls back to `Inside` when nothing is excluded.
    Outside,
}

/// How far regions are grown below their peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumIter)]
pub enum SearchMethod {
    /// Grow down to the background.
    #[default]
    AboveBackground,
    /// Grow down to `background + search_parameter * (max - background)`.
    FractionOfPeakMinusBackground,
    /// Grow down to `background + 0.5 * (max - background)`.
    HalfPeakValue,
}

impl SearchMethod {
    /// Per-peak lower limit, or `None` when the background is the only limit.
    pub fn peak_threshold(self, max_value: f64, background: f64, parameter: f64) -> Option<f64> {
        match self {
            Self::AboveBackground => None,
            Self::FractionOfPeakMinusBackground => {
                Some(background + parameter * (max_value - background))
            }
            Self::HalfPeakValue => Some(background + 0.5 * (max_value - background)),
        }
    }
}

/// How the minimum height of a peak above its highest saddle is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumIter)]
pub enum PeakMethod {
    /// `peak_parameter` in intensity units.
    Absolute,
    /// `peak_parameter * max_value`.
    Relative,
    /// `peak_parameter * (max_value - background)`.
    #[default]
    RelativeAboveBackground,
}

impl PeakMethod {
    pub fn required_height(self, max_value: f64, background: f64, parameter: f64) -> f64 {
        match self {
            Self::Absolute => parameter,
            Self::Relative => parameter * max_value,
            Self::RelativeAboveBackground => parameter * (max_value - background),
        }
    }
}

/// How the size criterion treats pixels above the highest saddle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumIter)]
pub enum AboveSaddleMode {
    /// Only the whole-region size is checked.
    Off,
    /// Count every region pixel above the saddle, connected or not.
    /// Kept for compatibility with legacy results.
    NonContiguous,
    /// Count pixels above the saddle connected to the peak.
    #[default]
    Contiguous,
}

/// Final ordering of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumIter)]
pub enum SortMethod {
    #[default]
    Intensity,
    IntensityMinusBackground,
    IntensityMinusMin,
    Count,
    MaxValue,
    AverageIntensity,
    AverageIntensityMinusBackground,
    AverageIntensityMinusMin,
    X,
    Y,
    Z,
    SaddleHeight,
    CountAboveSaddle,
    IntensityAboveSaddle,
    AbsoluteHeight,
    RelativeHeightAboveBackground,
    PeakId,
    Xyz,
}

impl SortMethod {
    /// Coordinate and id sorts are ascending, everything else descending.
    pub fn is_ascending(self) -> bool {
        matches!(self, Self::X | Self::Y | Self::Z | Self::Xyz | Self::PeakId)
    }

    /// Sort keys that change when centres move.
    pub fn is_coordinate(self) -> bool {
        matches!(self, Self::X | Self::Y | Self::Z | Self::Xyz)
    }
}

/// How the reported peak coordinate is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumIter)]
pub enum CentreMethod {
    /// Highest pixel of the search image.
    #[default]
    MaxValueSearch,
    /// Highest pixel of the original image.
    MaxValueOriginal,
    /// Iterative centre of mass on the search image.
    CentreOfMassSearch,
    /// Iterative centre of mass on the original image.
    CentreOfMassOriginal,
    /// 2D Gaussian fit of the search image projection.
    GaussianSearch,
    /// 2D Gaussian fit of the original image projection.
    GaussianOriginal,
}

impl CentreMethod {
    pub fn uses_original(self) -> bool {
        matches!(
            self,
            Self::MaxValueOriginal | Self::CentreOfMassOriginal | Self::GaussianOriginal
        )
    }

    pub fn is_gaussian(self) -> bool {
        matches!(self, Self::GaussianSearch | Self::GaussianOriginal)
    }
}

/// Label image contents produced by [`crate::build_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumIter)]
pub enum MaskType {
    /// Whole region of every peak.
    #[default]
    Peaks,
    /// Region pixels above the peak's highest saddle.
    PeaksAboveSaddle,
    /// Whole region, single label for every peak.
    Threshold,
    /// Pixels above the saddle, single label for every peak.
    ThresholdAboveSaddle,
}

impl MaskType {
    pub fn above_saddle(self) -> bool {
        matches!(self, Self::PeaksAboveSaddle | Self::ThresholdAboveSaddle)
    }

    pub fn single_label(self) -> bool {
        matches!(self, Self::Threshold | Self::ThresholdAboveSaddle)
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Parameters for a FindFoci run.
///
/// Single flat struct with all parameters grouped by pipeline stage.
/// Use constructor presets for common scenarios, then customize individual
/// fields as needed.
///
/// # Example
///
/// ```rust,ignore
/// use foci::Params;
///
/// let mut params = Params::nuclear_foci();
/// params.min_size = 10;
/// params.validate();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    // -- Statistics / background --
    pub background_method: BackgroundMethod,
    /// Absolute value or number of standard deviations, depending on the method.
    pub background_parameter: f64,
    pub threshold_method: ThresholdMethod,
    pub statistics_mode: StatisticsMode,

    // -- Pre-processing --
    /// Gaussian blur sigma applied to the search image. 0 = disabled.
    pub gaussian_blur: f64,

    // -- Search --
    pub search_method: SearchMethod,
    /// Fraction for `FractionOfPeakMinusBackground`. Range: 0-1.
    pub search_parameter: f64,
    /// Maximum number of candidate maxima before the run aborts.
    pub search_capacity: usize,

    // -- Merge --
    pub peak_method: PeakMethod,
    /// Height criterion. 0 = no height merging.
    pub peak_parameter: f64,
    /// Minimum region size in pixels. 1 = no size merging.
    pub min_size: usize,
    pub above_saddle: AboveSaddleMode,

    // -- Results --
    pub sort_method: SortMethod,
    pub max_peaks: usize,
    /// Drop peaks whose region touches the image or ROI border.
    pub remove_edge_maxima: bool,

    // -- Centre --
    pub centre_method: CentreMethod,
    /// Search radius for centre of mass, projection mode for Gaussian fitting.
    pub centre_parameter: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            // Statistics / background
            background_method: BackgroundMethod::AutoThreshold,
            background_parameter: 3.0,
            threshold_method: ThresholdMethod::Otsu,
            statistics_mode: StatisticsMode::Inside,

            // Pre-processing
            gaussian_blur: 0.0,

            // Search
            search_method: SearchMethod::AboveBackground,
            search_parameter: 0.3,
            search_capacity: 65535,

            // Merge
            peak_method: PeakMethod::RelativeAboveBackground,
            peak_parameter: 0.5,
            min_size: 5,
            above_saddle: AboveSaddleMode::Contiguous,

            // Results
            sort_method: SortMethod::Intensity,
            max_peaks: 500,
            remove_edge_maxima: false,

            // Centre
            centre_method: CentreMethod::MaxValueSearch,
            centre_parameter: 2.0,
        }
    }
}

impl Params {
    /// Report every local maximum above the image minimum, no merging.
    pub fn all_maxima() -> Self {
        Self {
            background_method: BackgroundMethod::None,
            peak_parameter: 0.0,
            min_size: 1,
            above_saddle: AboveSaddleMode::Off,
            max_peaks: usize::MAX,
            ..Self::default()
        }
    }

    /// Typical settings for counting nuclear foci inside a nucleus mask.
    pub fn nuclear_foci() -> Self {
        Self {
            background_method: BackgroundMethod::StdDevAboveMean,
            background_parameter: 3.0,
            statistics_mode: StatisticsMode::Inside,
            gaussian_blur: 1.0,
            search_method: SearchMethod::FractionOfPeakMinusBackground,
            search_parameter: 0.3,
            peak_method: PeakMethod::RelativeAboveBackground,
            peak_parameter: 0.5,
            min_size: 5,
            above_saddle: AboveSaddleMode::Contiguous,
            sort_method: SortMethod::IntensityAboveSaddle,
            centre_method: CentreMethod::CentreOfMassOriginal,
            centre_parameter: 2.0,
            ..Self::default()
        }
    }

    /// Validate all parameters. Panics on programmer errors.
    pub fn validate(&self) {
        assert!(
            self.background_parameter.is_finite(),
            "background_parameter must be finite, got {}",
            self.background_parameter
        );
        if self.background_method == BackgroundMethod::StdDevAboveMean {
            assert!(
                self.background_parameter >= 0.0,
                "background_parameter must be >= 0 for StdDevAboveMean, got {}",
                self.background_parameter
            );
        }
        assert!(
            self.gaussian_blur.is_finite() && self.gaussian_blur >= 0.0,
            "gaussian_blur must be >= 0, got {}",
            self.gaussian_blur
        );
        assert!(
            (0.0..=1.0).contains(&self.search_parameter),
            "search_parameter must be in [0, 1], got {}",
            self.search_parameter
        );
        assert!(
            self.search_capacity > 0,
            "search_capacity must be positive"
        );
        assert!(
            self.peak_parameter.is_finite() && self.peak_parameter >= 0.0,
            "peak_parameter must be >= 0, got {}",
            self.peak_parameter
        );
        assert!(self.min_size >= 1, "min_size must be >= 1, got {}", self.min_size);
        assert!(self.max_peaks >= 1, "max_peaks must be >= 1, got {}", self.max_peaks);
        assert!(
            self.centre_parameter.is_finite(),
            "centre_parameter must be finite, got {}",
            self.centre_parameter
        );
    }

    /// Read parameters from a YAML or JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        common::load_file(path)
    }

    /// Write parameters to a YAML or JSON file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        common::save_file(self, path)
    }
}
