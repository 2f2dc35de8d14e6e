//! Saddle discovery between touching regions.
//!
//! The saddle between two regions is the higher of the boundary heights,
//! where the height of a boundary pair of pixels is the lower of their two
//! values. Each peak keeps the full list of its neighbours' saddles so merges
//! can fall back to the next-best neighbour without rescanning pixels.

#[cfg(test)]
mod tests;

use smallvec::SmallVec;
use tracing::debug;

use crate::geometry::{Coord, Geometry};
use crate::image::Image;
use crate::pixel_type::{self, PixelType};
use crate::result::Bounds;

/// Saddle towards one neighbouring region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaddleEdge {
    pub id: u32,
    pub value: f32,
}

/// Neighbour saddles of one peak, sorted by descending value (ties by id),
/// at most one edge per neighbour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaddleList {
    edges: SmallVec<[SaddleEdge; 4]>,
}

impl SaddleList {
    pub fn from_edges(edges: impl IntoIterator<Item = SaddleEdge>) -> Self {
        let mut list = Self::default();
        for e in edges {
            list.upsert_max(e.id, e.value);
        }
        list
    }

    #[inline]
    pub fn edges(&self) -> &[SaddleEdge] {
        &self.edges
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Highest saddle, if the peak has any neighbour.
    #[inline]
    pub fn highest(&self) -> Option<SaddleEdge> {
        self.edges.first().copied()
    }

    pub fn get(&self, id: u32) -> Option<SaddleEdge> {
        self.edges.iter().find(|e| e.id == id).copied()
    }

    pub fn remove(&mut self, id: u32) -> Option<SaddleEdge> {
        let pos = self.edges.iter().position(|e| e.id == id)?;
        Some(self.edges.remove(pos))
    }

    /// Add an edge, keeping the higher value when the neighbour is already listed.
    pub fn upsert_max(&mut self, id: u32, value: f32) {
        let value = match self.remove(id) {
            Some(old) => old.value.max(value),
            None => value,
        };
        let pos = self
            .edges
            .iter()
            .position(|e| e.value < value || (e.value == value && e.id > id))
            .unwrap_or(self.edges.len());
        self.edges.insert(pos, SaddleEdge { id, value });
    }

    /// Point the edge towards `from` at `to`, keeping the higher value.
    pub fn rename(&mut self, from: u32, to: u32) {
        if let Some(edge) = self.remove(from) {
            self.upsert_max(to, edge.value);
        }
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }

    pub(crate) fn take(&mut self) -> SaddleList {
        std::mem::take(self)
    }
}

/// Caller-owned buffers for [`find_saddles`], sized to the number of peaks.
#[derive(Debug, Default)]
pub struct SaddleScratch {
    highest: Vec<f32>,
    touched: Vec<u32>,
}

impl SaddleScratch {
    pub fn with_capacity(peaks: usize) -> Self {
        let mut scratch = Self::default();
        scratch.ensure(peaks);
        scratch
    }

    fn ensure(&mut self, peaks: usize) {
        if self.highest.len() < peaks + 1 {
            self.highest.resize(peaks + 1, f32::NEG_INFINITY);
        }
    }

    fn record(&mut self, id: u32, value: f32) {
        let slot = &mut self.highest[id as usize];
        if *slot == f32::NEG_INFINITY {
            self.touched.push(id);
        }
        if value > *slot {
            *slot = value;
        }
    }

    /// Drain the recorded saddles into a list and reset the touched slots.
    fn drain(&mut self) -> SaddleList {
        let mut list = SaddleList::default();
        for id in self.touched.drain(..) {
            let slot = &mut self.highest[id as usize];
            list.upsert_max(id, *slot);
            *slot = f32::NEG_INFINITY;
        }
        list
    }
}

/// Find the saddles of every peak.
///
/// `bounds[id - 1]` is the bounding box of region `id`. Returns one list per
/// id, with index 0 unused. `SADDLE_SEARCH` is set and cleared internally.
pub fn find_saddles(
    image: &Image,
    types: &mut [PixelType],
    maxima: &[u32],
    bounds: &[Bounds],
    scratch: &mut SaddleScratch,
) -> Vec<SaddleList> {
    let geometry = image.geometry();
    let pixels = image.pixels();
    let peaks = bounds.len();
    scratch.ensure(peaks);

    mark_boundaries(geometry, types, maxima);

    let mut saddles = vec![SaddleList::default(); peaks + 1];
    for (k, b) in bounds.iter().enumerate() {
        let id = k as u32 + 1;
        for z in b.min.z..=b.max.z {
            for y in b.min.y..=b.max.y {
                let row = geometry.index(Coord::new(b.min.x, y, z));
                for i in row..row + b.width() {
                    if maxima[i] != id || !types[i].contains(PixelType::SADDLE_SEARCH) {
                        continue;
                    }
                    let v = pixels[i];
                    for (j, _) in geometry.neighbours(i) {
                        let other = maxima[j];
                        if other == 0 || other == id {
                            continue;
                        }
                        scratch.record(other, v.min(pixels[j]));
                    }
                }
            }
        }
        saddles[id as usize] = scratch.drain();
    }

    pixel_type::clear_all(types, PixelType::SADDLE_SEARCH);
    debug!(
        edges = saddles.iter().map(SaddleList::len).sum::<usize>() / 2,
        "Found saddles"
    );
    saddles
}

/// Flag both pixels of every pair of touching pixels from different regions.
fn mark_boundaries(geometry: &Geometry, types: &mut [PixelType], maxima: &[u32]) {
    for i in 0..maxima.len() {
        let id = maxima[i];
        if id == 0 {
            continue;
        }
        for (j, _) in geometry.half_neighbours(i) {
            let other = maxima[j];
            if other != 0 && other != id {
                types[i].insert(PixelType::SADDLE_SEARCH);
                types[j].insert(PixelType::SADDLE_SEARCH);
            }
        }
    }
}
