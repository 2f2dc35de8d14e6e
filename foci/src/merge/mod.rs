//! Peak merging and result consolidation.
//!
//! Regions found by the search are reduced in up to three phases (height,
//! size, size above saddle). Merging never rewrites the maxima map directly:
//! ids are redirected through an [`IdMap`] and the map is flattened once at the
//! end of each phase.

pub mod id_map;
#[cfg(test)]
mod tests;

use tracing::debug;

use crate::config::{AboveSaddleMode, Params, PeakMethod};
use crate::geometry::{Coord, Geometry};
use crate::image::{Image, Roi};
use crate::maxima::Candidate;
use crate::pixel_type::PixelType;
use crate::result::{Bounds, PeakResult};
use crate::saddle::{SaddleList, SaddleScratch, find_saddles};
use crate::sort::{renumber, sort_peaks};
use crate::stats::Statistics;

pub use id_map::IdMap;

/// The mutable peak state shared by every merge phase.
///
/// `peaks[id - 1]` and `saddles[id]` describe peak `id`. A merged or removed
/// peak keeps its slot with `total_intensity == -inf`.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakSet {
    peaks: Vec<PeakResult>,
    saddles: Vec<SaddleList>,
    ids: IdMap,
    background: f64,
    no_saddle: f64,
    image_minimum: f64,
}

impl PeakSet {
    /// Collect per-region totals and bounds from the grown `maxima` map and
    /// find the saddles between touching regions.
    ///
    /// `candidates` must be numbered 1..N in order.
    pub fn build(
        image: &Image,
        types: &mut [PixelType],
        maxima: &[u32],
        candidates: &[Candidate],
        stats: &Statistics,
    ) -> Self {
        let geometry = image.geometry();
        let pixels = image.pixels();
        let no_saddle = stats.no_saddle_value();

        let mut peaks: Vec<PeakResult> = candidates
            .iter()
            .enumerate()
            .map(|(k, c)| {
                debug_assert_eq!(c.id as usize, k + 1);
                PeakResult::new(c.id, geometry.coord(c.index), c.value, no_saddle)
            })
            .collect();

        for (i, &m) in maxima.iter().enumerate() {
            if m == 0 {
                continue;
            }
            let peak = &mut peaks[m as usize - 1];
            peak.count += 1;
            peak.total_intensity += pixels[i] as f64;
            peak.bounds.include(geometry.coord(i));
        }

        let bounds: Vec<Bounds> = peaks.iter().map(|p| p.bounds).collect();
        let mut scratch = SaddleScratch::with_capacity(peaks.len());
        let saddles = find_saddles(image, types, maxima, &bounds, &mut scratch);

        Self {
            ids: IdMap::new(peaks.len()),
            peaks,
            saddles,
            background: stats.background,
            no_saddle,
            image_minimum: stats.image_minimum as f64,
        }
    }

    /// Number of peaks still alive.
    pub fn len(&self) -> usize {
        self.peaks.iter().filter(|p| !p.is_merged()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn peak(&self, id: u32) -> &PeakResult {
        &self.peaks[id as usize - 1]
    }

    pub fn saddles(&self, id: u32) -> &SaddleList {
        &self.saddles[id as usize]
    }

    /// Alive peaks in id order.
    pub fn alive(&self) -> impl Iterator<Item = &PeakResult> {
        self.peaks.iter().filter(|p| !p.is_merged())
    }

    fn alive_ids(&self) -> Vec<u32> {
        self.alive().map(|p| p.id).collect()
    }

    /// Value of the highest saddle of `id`, or the no-saddle value.
    fn saddle_value(&self, id: u32) -> f64 {
        self.saddles[id as usize]
            .highest()
            .map_or(self.no_saddle, |e| e.value as f64)
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    /// Fold the alive peak `from` into its alive neighbour `into`.
    fn merge(&mut self, from: u32, into: u32) {
        debug_assert_ne!(from, into);
        let source = &self.peaks[from as usize - 1];
        let (count, total, bounds, max_value, coord) = (
            source.count,
            source.total_intensity,
            source.bounds,
            source.max_value,
            source.coord(),
        );

        let target = &mut self.peaks[into as usize - 1];
        target.count += count;
        target.total_intensity += total;
        target.bounds.union(&bounds);
        if max_value > target.max_value {
            target.max_value = max_value;
            target.set_coord(coord);
        }
        self.peaks[from as usize - 1].total_intensity = f64::NEG_INFINITY;

        let edges = self.saddles[from as usize].take();
        self.saddles[into as usize].remove(from);
        for edge in edges.edges() {
            if edge.id == into {
                continue;
            }
            self.saddles[into as usize].upsert_max(edge.id, edge.value);
            self.saddles[edge.id as usize].rename(from, into);
        }

        self.ids.merge(from, into);
    }

    /// Drop the alive peak `id` and its pixels.
    fn remove(&mut self, id: u32) {
        self.peaks[id as usize - 1].total_intensity = f64::NEG_INFINITY;
        let edges = self.saddles[id as usize].take();
        for edge in edges.edges() {
            self.saddles[edge.id as usize].remove(id);
        }
        self.ids.remove(id);
    }

    /// Merge `id` into the neighbour across its highest saddle, or remove it
    /// when it has none. Returns the neighbour merged into.
    fn absorb_or_remove(&mut self, id: u32) -> Option<u32> {
        match self.saddles[id as usize].highest() {
            Some(edge) => {
                self.merge(id, edge.id);
                Some(edge.id)
            }
            None => {
                self.remove(id);
                None
            }
        }
    }

    /// Rewrite `maxima` to the current owners. Pixels of removed peaks lose
    /// `MAX_AREA`.
    pub fn flatten(&mut self, types: &mut [PixelType], maxima: &mut [u32]) {
        let table = self.ids.table();
        for (m, t) in maxima.iter_mut().zip(types.iter_mut()) {
            if *m != 0 {
                *m = table[*m as usize];
                if *m == 0 {
                    t.remove(PixelType::MAX_AREA);
                }
            }
        }
    }

    // ========================================================================
    // Merge phases
    // ========================================================================

    /// Merge peaks that do not rise far enough above their highest saddle.
    ///
    /// Peaks are visited by descending saddle value. A peak without a saddle
    /// that fails the height test above the background is removed.
    pub fn merge_by_height(
        &mut self,
        types: &mut [PixelType],
        maxima: &mut [u32],
        method: PeakMethod,
        parameter: f64,
    ) -> usize {
        if parameter <= 0.0 {
            return 0;
        }

        let mut order: Vec<(f64, u32)> = self
            .alive_ids()
            .into_iter()
            .map(|id| (self.saddle_value(id), id))
            .collect();
        order.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut changed = 0;
        for (_, id) in order {
            if !self.ids.is_alive(id) {
                continue;
            }
            let max_value = self.peak(id).max_value as f64;
            let required = method.required_height(max_value, self.background, parameter);
            let floor = self.saddle_value(id).max(self.background);
            if max_value - floor < required {
                self.absorb_or_remove(id);
                changed += 1;
            }
        }

        self.flatten(types, maxima);
        debug!(changed, remaining = self.len(), "Merged by height");
        changed
    }

    /// Merge peaks with fewer than `min_size` pixels, smallest first.
    pub fn merge_by_size(
        &mut self,
        types: &mut [PixelType],
        maxima: &mut [u32],
        min_size: usize,
    ) -> usize {
        if min_size <= 1 {
            return 0;
        }

        let mut order: Vec<(usize, u32)> = self.alive().map(|p| (p.count, p.id)).collect();
        order.sort_unstable();

        let mut changed = 0;
        for (_, id) in order {
            if !self.ids.is_alive(id) || self.peak(id).count >= min_size {
                continue;
            }
            self.absorb_or_remove(id);
            changed += 1;
        }

        self.flatten(types, maxima);
        debug!(changed, remaining = self.len(), "Merged by size");
        changed
    }

    /// Merge peaks with fewer than `min_size` pixels above their highest saddle.
    pub fn merge_above_saddle(
        &mut self,
        image: &Image,
        types: &mut [PixelType],
        maxima: &mut [u32],
        mode: AboveSaddleMode,
        min_size: usize,
    ) -> usize {
        if mode == AboveSaddleMode::Off || min_size <= 1 {
            return 0;
        }
        let contiguous = mode == AboveSaddleMode::Contiguous;
        let mut queue = Vec::new();

        for id in self.alive_ids() {
            self.update_above_saddle(image, types, maxima, id, contiguous, &mut queue);
        }

        let mut order: Vec<(usize, u32)> = self
            .alive()
            .map(|p| (p.count_above_saddle, p.id))
            .collect();
        order.sort_unstable();

        let mut changed = 0;
        for (_, id) in order {
            if !self.ids.is_alive(id) || self.peak(id).count_above_saddle >= min_size {
                continue;
            }
            let into = self.saddles[id as usize].highest().map(|e| e.id);
            let before = into.map(|into| self.saddle_value(into));
            changed += 1;
            if let (Some(into), Some(before)) = (self.absorb_or_remove(id), before) {
                if !contiguous || self.saddle_value(into) < before {
                    self.update_above_saddle(image, types, maxima, into, contiguous, &mut queue);
                }
            }
        }

        self.flatten(types, maxima);
        debug!(changed, remaining = self.len(), "Merged by size above saddle");
        changed
    }

    // ========================================================================
    // Above-saddle measurement
    // ========================================================================

    /// Floor for the above-saddle measurement of `id`.
    fn above_saddle_floor(&self, id: u32) -> f64 {
        self.saddles[id as usize]
            .highest()
            .map_or(self.background, |e| e.value as f64)
    }

    fn update_above_saddle(
        &mut self,
        image: &Image,
        types: &mut [PixelType],
        maxima: &[u32],
        id: u32,
        contiguous: bool,
        queue: &mut Vec<usize>,
    ) {
        let (count, intensity) = if contiguous {
            self.count_above_contiguous(image, types, maxima, id, queue)
        } else {
            self.count_above_anywhere(image, maxima, id)
        };
        let peak = &mut self.peaks[id as usize - 1];
        peak.count_above_saddle = count;
        peak.intensity_above_saddle = intensity;
    }

    /// Every region pixel above the floor, connected or not.
    fn count_above_anywhere(&mut self, image: &Image, maxima: &[u32], id: u32) -> (usize, f64) {
        let floor = self.above_saddle_floor(id);
        let pixels = image.pixels();
        let bounds = self.peak(id).bounds;
        let mut count = 0;
        let mut intensity = 0.0;
        for_each_in_bounds(image.geometry(), &bounds, |i| {
            let v = pixels[i] as f64;
            if maxima[i] != 0 && v > floor && self.ids.find(maxima[i]) == id {
                count += 1;
                intensity += v - floor;
            }
        });
        (count, intensity)
    }

    /// Region pixels above the floor connected to the representative pixel.
    fn count_above_contiguous(
        &mut self,
        image: &Image,
        types: &mut [PixelType],
        maxima: &[u32],
        id: u32,
        queue: &mut Vec<usize>,
    ) -> (usize, f64) {
        let floor = self.above_saddle_floor(id);
        let geometry = image.geometry();
        let pixels = image.pixels();
        let start = geometry.index(self.peak(id).coord());
        if (pixels[start] as f64) <= floor {
            return (0, 0.0);
        }

        queue.clear();
        queue.push(start);
        types[start].insert(PixelType::LISTED);
        let mut head = 0;
        let mut intensity = 0.0;
        while head < queue.len() {
            let i = queue[head];
            head += 1;
            intensity += pixels[i] as f64 - floor;
            for (j, _) in geometry.neighbours(i) {
                if types[j].contains(PixelType::LISTED)
                    || maxima[j] == 0
                    || pixels[j] as f64 <= floor
                    || self.ids.find(maxima[j]) != id
                {
                    continue;
                }
                types[j].insert(PixelType::LISTED);
                queue.push(j);
            }
        }

        for &i in queue.iter() {
            types[i].remove(PixelType::LISTED);
        }
        (queue.len(), intensity)
    }

    // ========================================================================
    // Consolidation
    // ========================================================================

    /// Turn the alive peaks into the final, sorted and renumbered result list.
    ///
    /// Edge peaks are dropped first when requested, then the saddle and
    /// above-saddle fields are filled, the list is sorted, truncated to
    /// `max_peaks` and renumbered, and `maxima` is remapped to the new ids.
    pub fn consolidate(
        mut self,
        image: &Image,
        types: &mut [PixelType],
        maxima: &mut [u32],
        params: &Params,
        roi: Option<&Roi>,
    ) -> Vec<PeakResult> {
        let geometry = image.geometry();
        self.flatten(types, maxima);

        if params.remove_edge_maxima {
            let removed = self.remove_edge_maxima(geometry, maxima, roi);
            if removed > 0 {
                self.flatten(types, maxima);
            }
            debug!(removed, "Removed edge maxima");
        }

        let contiguous = params.above_saddle == AboveSaddleMode::Contiguous;
        let mut queue = Vec::new();
        for id in self.alive_ids() {
            self.update_above_saddle(image, types, maxima, id, contiguous, &mut queue);

            let highest = self.saddles[id as usize].highest();
            let (background, image_minimum, no_saddle) =
                (self.background, self.image_minimum, self.no_saddle);
            let peak = &mut self.peaks[id as usize - 1];
            match highest {
                Some(edge) => {
                    peak.saddle_neighbour_id = edge.id;
                    peak.highest_saddle_value = edge.value as f64;
                }
                None => {
                    peak.saddle_neighbour_id = 0;
                    peak.highest_saddle_value = no_saddle;
                }
            }
            peak.intensity_minus_background = peak.total_intensity - background * peak.count as f64;
            peak.intensity_minus_min = peak.total_intensity - image_minimum * peak.count as f64;
        }

        let mut peaks: Vec<PeakResult> = self.peaks.into_iter().filter(|p| !p.is_merged()).collect();
        sort_peaks(&mut peaks, params.sort_method, self.background);
        peaks.truncate(params.max_peaks);
        renumber(&mut peaks, maxima, types, self.no_saddle);

        debug!(peaks = peaks.len(), "Consolidated results");
        peaks
    }

    /// Discard every peak whose region touches the x/y image border or the ROI
    /// border.
    fn remove_edge_maxima(&mut self, geometry: &Geometry, maxima: &[u32], roi: Option<&Roi>) -> usize {
        let mut on_edge = vec![false; self.peaks.len() + 1];
        for (i, &m) in maxima.iter().enumerate() {
            if m == 0 || on_edge[m as usize] {
                continue;
            }
            let c = geometry.coord(i);
            if geometry.is_xy_edge(c) || roi.is_some_and(|r| r.is_edge(c.x, c.y)) {
                on_edge[m as usize] = true;
            }
        }

        let mut removed = 0;
        for id in self.alive_ids() {
            if on_edge[id as usize] {
                self.discard(id);
                removed += 1;
            }
        }
        removed
    }

    /// Drop `id` from the results. Neighbours keep their saddle edges to it;
    /// those dangle and are cleared to "no saddle" when renumbering.
    fn discard(&mut self, id: u32) {
        self.peaks[id as usize - 1].total_intensity = f64::NEG_INFINITY;
        self.saddles[id as usize].clear();
        self.ids.remove(id);
    }
}

/// Visit every pixel index inside `bounds`.
fn for_each_in_bounds(geometry: &Geometry, bounds: &Bounds, mut f: impl FnMut(usize)) {
    for z in bounds.min.z..=bounds.max.z {
        for y in bounds.min.y..=bounds.max.y {
            let row = geometry.index(Coord::new(bounds.min.x, y, z));
            for i in row..row + bounds.width() {
                f(i);
            }
        }
    }
}
