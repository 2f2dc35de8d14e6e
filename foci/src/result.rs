//! Per-peak results and the final output of a run.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::geometry::Coord;
use crate::stats::Statistics;

/// Inclusive 3D bounding box of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Coord,
    pub max: Coord,
}

impl Bounds {
    pub fn point(c: Coord) -> Self {
        Self { min: c, max: c }
    }

    #[inline]
    pub fn include(&mut self, c: Coord) {
        self.min.x = self.min.x.min(c.x);
        self.min.y = self.min.y.min(c.y);
        self.min.z = self.min.z.min(c.z);
        self.max.x = self.max.x.max(c.x);
        self.max.y = self.max.y.max(c.y);
        self.max.z = self.max.z.max(c.z);
    }

    pub fn union(&mut self, other: &Bounds) {
        self.include(other.min);
        self.include(other.max);
    }

    pub fn width(&self) -> usize {
        self.max.x - self.min.x + 1
    }

    pub fn height(&self) -> usize {
        self.max.y - self.min.y + 1
    }

    pub fn depth(&self) -> usize {
        self.max.z - self.min.z + 1
    }

    pub fn contains(&self, c: Coord) -> bool {
        (self.min.x..=self.max.x).contains(&c.x)
            && (self.min.y..=self.max.y).contains(&c.y)
            && (self.min.z..=self.max.z).contains(&c.z)
    }
}

/// One surviving region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakResult {
    /// 1-based id, matching the values of the maxima map.
    pub id: u32,
    /// Representative pixel.
    pub x: usize,
    pub y: usize,
    pub z: usize,
    /// Sub-pixel centre from the centre locator. Equal to (x, y, z) until located.
    pub centre: DVec3,
    pub max_value: f32,
    pub count: usize,
    /// Sum of region pixel values. `-inf` marks a merged-away peak while merging.
    pub total_intensity: f64,
    pub intensity_minus_background: f64,
    pub intensity_minus_min: f64,
    /// Highest saddle towards any neighbour, or the no-saddle value.
    pub highest_saddle_value: f64,
    /// Neighbour across the highest saddle, 0 if none.
    pub saddle_neighbour_id: u32,
    pub count_above_saddle: usize,
    /// Sum of `v - saddle` over pixels above the saddle.
    pub intensity_above_saddle: f64,
    pub bounds: Bounds,
}

impl PeakResult {
    pub(crate) fn new(id: u32, c: Coord, max_value: f32, no_saddle: f64) -> Self {
        Self {
            id,
            x: c.x,
            y: c.y,
            z: c.z,
            centre: DVec3::new(c.x as f64, c.y as f64, c.z as f64),
            max_value,
            count: 0,
            total_intensity: 0.0,
            intensity_minus_background: 0.0,
            intensity_minus_min: 0.0,
            highest_saddle_value: no_saddle,
            saddle_neighbour_id: 0,
            count_above_saddle: 0,
            intensity_above_saddle: 0.0,
            bounds: Bounds::point(c),
        }
    }

    #[inline]
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y, self.z)
    }

    #[inline]
    pub(crate) fn set_coord(&mut self, c: Coord) {
        self.x = c.x;
        self.y = c.y;
        self.z = c.z;
        self.centre = DVec3::new(c.x as f64, c.y as f64, c.z as f64);
    }

    /// True once the peak has been merged away or removed.
    #[inline]
    pub fn is_merged(&self) -> bool {
        self.total_intensity == f64::NEG_INFINITY
    }

    #[inline]
    pub fn has_saddle(&self) -> bool {
        self.saddle_neighbour_id != 0
    }

    pub fn average_intensity(&self) -> f64 {
        ratio(self.total_intensity, self.count)
    }

    pub fn average_intensity_minus_background(&self) -> f64 {
        ratio(self.intensity_minus_background, self.count)
    }

    pub fn average_intensity_minus_min(&self) -> f64 {
        ratio(self.intensity_minus_min, self.count)
    }

    /// Height of the peak above its highest saddle or the background.
    pub fn absolute_height(&self, background: f64) -> f64 {
        self.max_value as f64 - self.highest_saddle_value.max(background)
    }

    /// Absolute height as a fraction of the peak height above background.
    pub fn relative_height_above_background(&self, background: f64) -> f64 {
        let denominator = self.max_value as f64 - background;
        if denominator > 0.0 {
            self.absolute_height(background) / denominator
        } else {
            0.0
        }
    }

    /// Share of the region intensity above background held by this peak, in percent.
    pub fn intensity_percent(&self, stats: &Statistics) -> f64 {
        percent(self.intensity_minus_background, stats.region_total_above_background)
    }

    /// Share of the region pixels held by this peak, in percent.
    pub fn count_percent(&self, stats: &Statistics) -> f64 {
        percent(self.count as f64, stats.region.count as f64)
    }

    /// Share of the region intensity above background held above the saddle, in percent.
    pub fn intensity_above_saddle_percent(&self, stats: &Statistics) -> f64 {
        percent(self.intensity_above_saddle, stats.region_total_above_background)
    }
}

fn ratio(total: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { total / count as f64 }
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { 100.0 * part / whole } else { 0.0 }
}

/// Output of a complete run.
#[derive(Debug, Clone, PartialEq)]
pub struct FociResult {
    pub peaks: Vec<PeakResult>,
    pub statistics: Statistics,
    /// Final label image: 0 = unassigned, otherwise the peak id.
    pub maxima: Vec<u32>,
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl FociResult {
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}
