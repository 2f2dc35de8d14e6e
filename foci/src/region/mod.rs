//! Level-ordered region growing.
//!
//! Unassigned pixels above the background are bucketed by histogram bin with
//! a counting sort and processed from the highest level down. Each pixel joins
//! the region of its highest already-assigned neighbour. A level is swept
//! repeatedly until no more pixels can be assigned; pixels still waiting carry
//! over to the next lower level.

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::image::Image;
use crate::pipeline::Interrupt;
use crate::pixel_type::PixelType;
use crate::stats::Histogram;

/// Levels processed between interrupt checks.
const INTERRUPT_INTERVAL: usize = 64;

/// Assign every eligible pixel to a candidate maximum.
///
/// `peak_limits[id]` is the lowest value a pixel may have to join region `id`
/// (the background for search-above-background). Pixels whose best neighbour
/// belongs to a region with a higher limit are pruned and stay unassigned.
pub fn grow_regions(
    image: &Image,
    types: &mut [PixelType],
    maxima: &mut [u32],
    histogram: &Histogram,
    peak_limits: &[f64],
    background: f64,
    interrupt: &Interrupt,
) -> Result<()> {
    let geometry = image.geometry();
    let pixels = image.pixels();
    let bins = histogram.len();
    if bins == 0 {
        return Ok(());
    }

    // Counting sort of the eligible pixels by bin.
    let eligible = |i: usize, t: PixelType| {
        !t.intersects(PixelType::EXCLUDED | PixelType::MAX_AREA) && pixels[i] as f64 > background
    };
    let mut starts = vec![0usize; bins + 1];
    for (i, &t) in types.iter().enumerate() {
        if eligible(i, t) {
            starts[histogram.bin_of(pixels[i]) + 1] += 1;
        }
    }
    for b in 0..bins {
        starts[b + 1] += starts[b];
    }
    let mut cursor = starts.clone();
    let mut order = vec![0usize; starts[bins]];
    for (i, &t) in types.iter().enumerate() {
        if eligible(i, t) {
            let b = histogram.bin_of(pixels[i]);
            order[cursor[b]] = i;
            cursor[b] += 1;
        }
    }

    let mut pending: Vec<usize> = Vec::new();
    let mut assignments: Vec<(usize, u32)> = Vec::new();
    let mut levels = 0usize;
    let mut pruned = 0usize;

    for bin in (0..bins).rev() {
        let level = &order[starts[bin]..starts[bin + 1]];
        if level.is_empty() && pending.is_empty() {
            continue;
        }
        pending.extend_from_slice(level);

        levels += 1;
        if levels % INTERRUPT_INTERVAL == 0 && interrupt.is_set() {
            return Err(Error::Interrupted);
        }

        // Sweeps read the state at sweep start, then apply.
        while !pending.is_empty() {
            assignments.clear();
            assignments.extend(
                pending
                    .iter()
                    .filter_map(|&p| best_neighbour(geometry, pixels, maxima, p).map(|id| (p, id))),
            );
            if assignments.is_empty() {
                break;
            }
            for &(p, id) in &assignments {
                if (pixels[p] as f64) < peak_limits[id as usize] {
                    types[p].insert(PixelType::BELOW_SADDLE);
                    pruned += 1;
                } else {
                    maxima[p] = id;
                    types[p].insert(PixelType::MAX_AREA);
                }
            }
            pending.retain(|&p| !types[p].intersects(PixelType::MAX_AREA | PixelType::BELOW_SADDLE));
        }
    }

    if pruned > 0 {
        for t in types.iter_mut() {
            t.remove(PixelType::BELOW_SADDLE);
        }
    }
    debug!(
        levels,
        pruned,
        unassigned = pending.len(),
        "Region growing finished"
    );
    Ok(())
}

/// Id of the highest assigned neighbour of `p`.
///
/// Ties prefer axis-aligned neighbours, then the first in direction order.
#[inline]
fn best_neighbour(geometry: &Geometry, pixels: &[f32], maxima: &[u32], p: usize) -> Option<u32> {
    let mut best: Option<(f32, bool, u32)> = None;
    for (q, direction) in geometry.neighbours(p) {
        let id = maxima[q];
        if id == 0 {
            continue;
        }
        let v = pixels[q];
        let better = match best {
            None => true,
            Some((bv, flat, _)) => v > bv || (v == bv && direction.flat_edge && !flat),
        };
        if better {
            best = Some((v, direction.flat_edge, id));
        }
    }
    best.map(|(_, _, id)| id)
}
