//! Local maxima discovery with plateau handling.
//!
//! A pixel is a candidate when no included neighbour is strictly greater.
//! Connected pixels of equal value form a plateau that is flooded once and
//! reduced to the single pixel nearest its centroid.


use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::image::Image;
use crate::pixel_type::PixelType;

/// A candidate maximum: representative pixel, 1-based id and value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub index: usize,
    pub id: u32,
    pub value: f32,
}

/// Flags that stop a pixel from starting a new maximum search.
const SKIP: PixelType = PixelType::EXCLUDED
    .union(PixelType::MAX_AREA)
    .union(PixelType::PLATEAU)
    .union(PixelType::NOT_MAXIMUM);

/// Scan `image` for local maxima above `threshold` and the image minimum.
///
/// Every maximum pixel (all plateau pixels included) gets `MAX_AREA` and its
/// id in `maxima`; the representative pixel also gets `MAXIMUM`. Candidates
/// are returned sorted by descending value (stable on discovery order) and
/// numbered 1..N, with `maxima` remapped accordingly.
///
/// Fails with [`Error::SearchCapacityExceeded`] when more than `capacity`
/// candidates are found.
pub fn find_maxima(
    image: &Image,
    types: &mut [PixelType],
    maxima: &mut [u32],
    threshold: f64,
    image_minimum: f32,
    capacity: usize,
) -> Result<Vec<Candidate>> {
    let geometry = image.geometry();
    let pixels = image.pixels();
    debug_assert_eq!(types.len(), pixels.len());
    debug_assert_eq!(maxima.len(), pixels.len());

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut plateau = PlateauScratch::default();

    for i in 0..pixels.len() {
        if types[i].intersects(SKIP) {
            continue;
        }
        let v = pixels[i];
        if v <= image_minimum || v as f64 <= threshold {
            continue;
        }

        let mut is_max = true;
        let mut is_plateau = false;
        for (j, _) in geometry.neighbours(i) {
            if types[j].contains(PixelType::EXCLUDED) {
                continue;
            }
            let v2 = pixels[j];
            if v2 > v {
                is_max = false;
                break;
            }
            if v2 == v {
                is_plateau = true;
            } else {
                types[j].insert(PixelType::NOT_MAXIMUM);
            }
        }

        if !is_max {
            types[i].insert(PixelType::NOT_MAXIMUM);
            continue;
        }

        let representative = if is_plateau {
            match plateau.flood(geometry, pixels, types, i) {
                Some(rep) => rep,
                None => continue,
            }
        } else {
            plateau.points.clear();
            plateau.points.push(i);
            i
        };

        if candidates.len() == capacity {
            warn!(
                capacity,
                "Search capacity exceeded, aborting. Increase the background or the capacity"
            );
            return Err(Error::SearchCapacityExceeded { capacity });
        }

        let id = candidates.len() as u32 + 1;
        for &p in &plateau.points {
            types[p].insert(PixelType::MAX_AREA);
            maxima[p] = id;
        }
        types[representative].insert(PixelType::MAXIMUM);
        candidates.push(Candidate {
            index: representative,
            id,
            value: v,
        });
    }

    renumber_by_value(&mut candidates, maxima);
    debug!(count = candidates.len(), "Found local maxima");
    Ok(candidates)
}

/// Sort candidates by descending value and renumber them 1..N.
fn renumber_by_value(candidates: &mut [Candidate], maxima: &mut [u32]) {
    candidates.sort_by(|a, b| b.value.total_cmp(&a.value));

    let mut table = vec![0u32; candidates.len() + 1];
    for (rank, c) in candidates.iter_mut().enumerate() {
        let new_id = rank as u32 + 1;
        table[c.id as usize] = new_id;
        c.id = new_id;
    }
    for m in maxima.iter_mut().filter(|m| **m != 0) {
        *m = table[*m as usize];
    }
}

/// Reusable buffers for plateau floods.
#[derive(Default)]
struct PlateauScratch {
    queue: Vec<usize>,
    points: Vec<usize>,
}

impl PlateauScratch {
    /// Flood the equal-valued plateau containing `start`.
    ///
    /// Returns the representative pixel, or `None` if any plateau pixel has a
    /// strictly higher neighbour. Rejected plateaus are marked `NOT_MAXIMUM`.
    /// `LISTED` and `PLATEAU` are cleared before returning.
    fn flood(
        &mut self,
        geometry: &Geometry,
        pixels: &[f32],
        types: &mut [PixelType],
        start: usize,
    ) -> Option<usize> {
        let v = pixels[start];
        self.queue.clear();
        self.points.clear();
        self.queue.push(start);
        types[start].insert(PixelType::LISTED | PixelType::PLATEAU);

        let mut is_max = true;
        while let Some(p) = self.queue.pop() {
            self.points.push(p);
            for (q, _) in geometry.neighbours(p) {
                if types[q].contains(PixelType::EXCLUDED) {
                    continue;
                }
                let vq = pixels[q];
                if vq > v {
                    is_max = false;
                } else if vq == v {
                    if !types[q].contains(PixelType::LISTED) {
                        types[q].insert(PixelType::LISTED | PixelType::PLATEAU);
                        self.queue.push(q);
                    }
                } else {
                    types[q].insert(PixelType::NOT_MAXIMUM);
                }
            }
        }

        self.points.sort_unstable();
        for &p in &self.points {
            types[p].remove(PixelType::LISTED | PixelType::PLATEAU);
        }

        if !is_max {
            for &p in &self.points {
                types[p].insert(PixelType::NOT_MAXIMUM);
            }
            return None;
        }

        Some(nearest_to_centroid(geometry, &self.points))
    }
}

/// Pixel of `points` nearest to their centroid; ties go to the lowest index.
///
/// `points` must be sorted ascending.
pub(crate) fn nearest_to_centroid(geometry: &Geometry, points: &[usize]) -> usize {
    let n = points.len() as f64;
    let (mut sx, mut sy, mut sz) = (0.0, 0.0, 0.0);
    for &p in points {
        let c = geometry.coord(p);
        sx += c.x as f64;
        sy += c.y as f64;
        sz += c.z as f64;
    }
    let (cx, cy, cz) = (sx / n, sy / n, sz / n);

    let mut best = points[0];
    let mut best_d = f64::INFINITY;
    for &p in points {
        let d = geometry.coord(p).distance_sq_to(cx, cy, cz);
        if d < best_d {
            best_d = d;
            best = p;
        }
    }
    best
}
