//! # Foci
//!
//! Peak detection for counting foci in 2D and 3D greyscale images.
//!
//! Local maxima are found on an optionally blurred search image, grown into
//! regions by descending intensity, connected through saddle points, and
//! merged by height, size and pixel count above the saddle. Each surviving
//! peak gets statistics, a refined centre and a label in the optional mask.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use foci::{FindFoci, Image, MaskType, Params, build_mask};
//!
//! let image = Arc::new(Image::from_integer(width, height, depth, &pixels));
//! let params = Params::nuclear_foci();
//!
//! let result = FindFoci::new().run(Arc::clone(&image), None, None, &params)?;
//! for peak in &result.peaks {
//!     println!("#{} at ({}, {}, {}) = {}", peak.id, peak.x, peak.y, peak.z, peak.max_value);
//! }
//!
//! let labels = build_mask(&result, &image, MaskType::Peaks)?;
//! ```
//!
//! # Staged runs
//!
//! The engine exposes each checkpoint so a driver can search once and try
//! several merge settings:
//!
//! ```rust,ignore
//! let engine = FindFoci::new();
//! let init = engine.init(image, None, None, &params)?;
//! let searched = engine.search(&init, &params)?;
//! let results = engine.merge_variants(&searched, &[strict, loose]);
//! ```

pub mod blur;
pub mod centre;
pub mod config;
pub mod error;
pub mod geometry;
pub mod image;
pub mod mask;
pub mod maxima;
pub mod merge;
pub mod pipeline;
pub mod pixel_type;
pub mod region;
pub mod result;
pub mod saddle;
pub mod sort;
pub mod stats;

// ============================================================================
// Configuration
// ============================================================================

pub use config::{
    AboveSaddleMode, BackgroundMethod, CentreMethod, MaskType, Params, PeakMethod, SearchMethod,
    SortMethod, StatisticsMode, ThresholdMethod,
};

// ============================================================================
// Input
// ============================================================================

pub use geometry::{Coord, Geometry};
pub use image::{Image, Mask, Roi};

// ============================================================================
// Engine
// ============================================================================

pub use error::{Error, Result};
pub use pipeline::{FindFoci, InitSnapshot, Interrupt, Snapshot, Stage};

// ============================================================================
// Output
// ============================================================================

pub use centre::{GaussianFitter, LmGaussianFitter};
pub use mask::{MASK_CAPACITY, build_mask};
pub use result::{Bounds, FociResult, PeakResult};
pub use stats::Statistics;
