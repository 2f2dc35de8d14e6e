//! Staged FindFoci engine.
//!
//! A run is split into checkpoints that each produce a cloneable snapshot:
//!
//! 1. [`FindFoci::init`]: search image, exclusion flags, statistics
//! 2. [`FindFoci::search`]: maxima, region growing, saddles
//! 3. [`FindFoci::merge_height`], [`FindFoci::merge_size`], [`FindFoci::merge_final`]
//! 4. [`FindFoci::locate_centres`]: consolidation, centres, final ordering
//!
//! Snapshots share the images, histogram and statistics through `Arc` and own
//! only the mutable working arrays, so a driver can branch several merge
//! parameter sets from one search.


use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::blur::gaussian_blur;
use crate::centre::{GaussianFitter, LmGaussianFitter, locate_centres};
use crate::config::Params;
use crate::error::{Error, Result};
use crate::image::{Image, Mask, Roi, initial_types};
use crate::maxima::find_maxima;
use crate::merge::PeakSet;
use crate::pixel_type::PixelType;
use crate::region::grow_regions;
use crate::result::FociResult;
use crate::sort::{renumber, sort_peaks};
use crate::stats::{Histogram, Statistics, compute_statistics};

// ============================================================================
// Interrupt
// ============================================================================

/// Cooperative cancellation flag shared between a caller and running stages.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// Request cancellation of every run holding this handle.
    pub fn set(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Interrupted)` once cancellation was requested.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_set() {
            debug!("Run interrupted");
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Read-only state shared by every snapshot of one image.
#[derive(Debug, Clone)]
struct Shared {
    original: Arc<Image>,
    search: Arc<Image>,
    histogram: Arc<Histogram>,
    statistics: Arc<Statistics>,
    roi: Option<Roi>,
}

/// Output of [`FindFoci::init`].
#[derive(Debug, Clone)]
pub struct InitSnapshot {
    shared: Shared,
    types: Vec<PixelType>,
}

impl InitSnapshot {
    pub fn statistics(&self) -> &Statistics {
        &self.shared.statistics
    }

    /// The image maxima are searched on (blurred when requested).
    pub fn search_image(&self) -> &Image {
        &self.shared.search
    }
}

/// Checkpoint reached by a [`Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Searched,
    MergedHeight,
    MergedSize,
    MergedFinal,
}

/// Output of [`FindFoci::search`] and the merge stages.
#[derive(Debug, Clone)]
pub struct Snapshot {
    shared: Shared,
    types: Vec<PixelType>,
    maxima: Vec<u32>,
    peaks: PeakSet,
    stage: Stage,
}

impl Snapshot {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn statistics(&self) -> &Statistics {
        &self.shared.statistics
    }

    /// Current label image: 0 = unassigned, otherwise the owning peak id.
    pub fn maxima(&self) -> &[u32] {
        &self.maxima
    }

    pub fn peaks(&self) -> &PeakSet {
        &self.peaks
    }

    /// Clone for the next stage, which must not come before `next`.
    fn advance(&self, next: Stage) -> Self {
        assert!(
            self.stage < next,
            "Cannot run {next:?} on a snapshot at {:?}",
            self.stage
        );
        let mut snapshot = self.clone();
        snapshot.stage = next;
        snapshot
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Peak finder with an optional Gaussian fitting collaborator.
#[derive(Clone)]
pub struct FindFoci {
    fitter: Option<Arc<dyn GaussianFitter>>,
    interrupt: Interrupt,
}

impl Default for FindFoci {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FindFoci {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindFoci")
            .field("fitter", &self.fitter.is_some())
            .field("interrupt", &self.interrupt)
            .finish()
    }
}

impl FindFoci {
    /// Engine with the built-in Levenberg-Marquardt Gaussian fitter.
    pub fn new() -> Self {
        Self::with_fitter(Arc::new(LmGaussianFitter::default()))
    }

    pub fn with_fitter(fitter: Arc<dyn GaussianFitter>) -> Self {
        Self {
            fitter: Some(fitter),
            interrupt: Interrupt::default(),
        }
    }

    /// Engine without Gaussian fitting; Gaussian centre methods leave centres unchanged.
    pub fn without_fitter() -> Self {
        Self {
            fitter: None,
            interrupt: Interrupt::default(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Run every stage on one image.
    pub fn run(
        &self,
        image: impl Into<Arc<Image>>,
        mask: Option<&Mask>,
        roi: Option<&Roi>,
        params: &Params,
    ) -> Result<FociResult> {
        let init = self.init(image, mask, roi, params)?;
        let searched = self.search(&init, params)?;
        let result = self.merge_and_locate(&searched, params)?;
        info!(
            peaks = result.len(),
            background = result.statistics.background,
            "FindFoci complete"
        );
        Ok(result)
    }

    /// Run [`Self::run`] on several images in parallel.
    pub fn find_all(&self, images: &[Arc<Image>], params: &Params) -> Vec<Result<FociResult>> {
        images
            .par_iter()
            .map(|image| self.run(Arc::clone(image), None, None, params))
            .collect()
    }

    /// Finish one search snapshot with several merge parameter sets in parallel.
    ///
    /// Only the merge, result and centre parameters of each variant are used;
    /// the search itself is shared.
    pub fn merge_variants(
        &self,
        searched: &Snapshot,
        variants: &[Params],
    ) -> Vec<Result<FociResult>> {
        variants
            .par_iter()
            .map(|params| self.merge_and_locate(searched, params))
            .collect()
    }

    fn merge_and_locate(&self, searched: &Snapshot, params: &Params) -> Result<FociResult> {
        let merged = self.merge_height(searched, params)?;
        let merged = self.merge_size(&merged, params)?;
        let merged = self.merge_final(&merged, params)?;
        self.locate_centres(&merged, params)
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// Build the search image, exclusion flags and statistics.
    pub fn init(
        &self,
        image: impl Into<Arc<Image>>,
        mask: Option<&Mask>,
        roi: Option<&Roi>,
        params: &Params,
    ) -> Result<InitSnapshot> {
        params.validate();
        self.interrupt.check()?;

        let original: Arc<Image> = image.into();
        let search = if params.gaussian_blur > 0.0 {
            Arc::new(gaussian_blur(&original, params.gaussian_blur))
        } else {
            Arc::clone(&original)
        };
        let roi = roi.and_then(|r| r.clipped(search.geometry()));
        let types = initial_types(&search, mask, roi.as_ref());
        let (statistics, histogram) = compute_statistics(&search, &types, params);
        debug!(
            background = statistics.background,
            region_pixels = statistics.region.count,
            "Computed statistics"
        );

        Ok(InitSnapshot {
            shared: Shared {
                original,
                search,
                histogram: Arc::new(histogram),
                statistics: Arc::new(statistics),
                roi,
            },
            types,
        })
    }

    /// Find candidate maxima, grow their regions and find the saddles.
    pub fn search(&self, init: &InitSnapshot, params: &Params) -> Result<Snapshot> {
        self.interrupt.check()?;
        let shared = init.shared.clone();
        let image = &*shared.search;
        let stats = &*shared.statistics;
        let background = stats.background;

        let mut types = init.types.clone();
        let mut maxima = vec![0u32; image.pixels().len()];
        let candidates = find_maxima(
            image,
            &mut types,
            &mut maxima,
            background,
            stats.image_minimum,
            params.search_capacity,
        )?;

        let mut peak_limits = Vec::with_capacity(candidates.len() + 1);
        peak_limits.push(background);
        peak_limits.extend(candidates.iter().map(|c| {
            params
                .search_method
                .peak_threshold(c.value as f64, background, params.search_parameter)
                .map_or(background, |t| t.max(background))
        }));

        self.interrupt.check()?;
        grow_regions(
            image,
            &mut types,
            &mut maxima,
            &shared.histogram,
            &peak_limits,
            background,
            &self.interrupt,
        )?;

        self.interrupt.check()?;
        let peaks = PeakSet::build(image, &mut types, &maxima, &candidates, stats);
        debug!(peaks = peaks.len(), "Search complete");

        Ok(Snapshot {
            shared,
            types,
            maxima,
            peaks,
            stage: Stage::Searched,
        })
    }

    /// Merge peaks that do not rise far enough above their saddle.
    pub fn merge_height(&self, snapshot: &Snapshot, params: &Params) -> Result<Snapshot> {
        self.interrupt.check()?;
        let mut next = snapshot.advance(Stage::MergedHeight);
        next.peaks.merge_by_height(
            &mut next.types,
            &mut next.maxima,
            params.peak_method,
            params.peak_parameter,
        );
        Ok(next)
    }

    /// Merge peaks smaller than the minimum size.
    pub fn merge_size(&self, snapshot: &Snapshot, params: &Params) -> Result<Snapshot> {
        self.interrupt.check()?;
        let mut next = snapshot.advance(Stage::MergedSize);
        next.peaks
            .merge_by_size(&mut next.types, &mut next.maxima, params.min_size);
        Ok(next)
    }

    /// Merge peaks with too few pixels above their saddle.
    pub fn merge_final(&self, snapshot: &Snapshot, params: &Params) -> Result<Snapshot> {
        self.interrupt.check()?;
        let mut next = snapshot.advance(Stage::MergedFinal);
        next.peaks.merge_above_saddle(
            &next.shared.search,
            &mut next.types,
            &mut next.maxima,
            params.above_saddle,
            params.min_size,
        );
        Ok(next)
    }

    /// Consolidate the surviving peaks into the final result and locate centres.
    pub fn locate_centres(&self, snapshot: &Snapshot, params: &Params) -> Result<FociResult> {
        self.interrupt.check()?;
        let shared = &snapshot.shared;
        let search = &*shared.search;
        let background = shared.statistics.background;
        let mut types = snapshot.types.clone();
        let mut maxima = snapshot.maxima.clone();

        let mut peaks = snapshot.peaks.clone().consolidate(
            search,
            &mut types,
            &mut maxima,
            params,
            shared.roi.as_ref(),
        );

        self.interrupt.check()?;
        let centre_image = if params.centre_method.uses_original() {
            &*shared.original
        } else {
            search
        };
        locate_centres(
            &mut peaks,
            centre_image,
            &maxima,
            params.centre_method,
            params.centre_parameter,
            background,
            self.fitter.as_deref(),
        );

        if params.sort_method.is_coordinate() {
            sort_peaks(&mut peaks, params.sort_method, background);
            renumber(
                &mut peaks,
                &mut maxima,
                &mut types,
                shared.statistics.no_saddle_value(),
            );
        }

        let geometry = search.geometry();
        Ok(FociResult {
            peaks,
            statistics: (*shared.statistics).clone(),
            maxima,
            width: geometry.width(),
            height: geometry.height(),
            depth: geometry.depth(),
        })
    }
}
