//! Peak centre refinement.
//!
//! Each peak's region is cut out of its bounding box as a dense patch of
//! weights `v - floor`, where the floor is the highest saddle (or the
//! background for a peak without neighbours). Pixels of other regions or at
//! or below the floor weigh zero.

pub mod gaussian_fit;
pub mod lm;
#[cfg(test)]
mod tests;

pub use gaussian_fit::{GaussianFitter, LmGaussianFitter};

use glam::DVec3;
use tracing::{debug, warn};

use crate::config::CentreMethod;
use crate::geometry::Coord;
use crate::image::Image;
use crate::result::PeakResult;

/// Maximum centre-of-mass refinement passes.
const MAX_ITERATIONS: usize = 10;

/// Centre-of-mass refinement stops once the estimate moves less than this
/// (squared pixels).
const CONVERGENCE_SQ: f64 = 1.0;

/// Refine the centre of every peak in place.
///
/// `image` is the image the method measures (search or original). A method
/// that cannot produce a centre for a peak leaves it unchanged; Gaussian
/// methods without a `fitter` leave every peak unchanged.
pub fn locate_centres(
    peaks: &mut [PeakResult],
    image: &Image,
    maxima: &[u32],
    method: CentreMethod,
    parameter: f64,
    background: f64,
    fitter: Option<&dyn GaussianFitter>,
) {
    let geometry = image.geometry();
    if method.is_gaussian() && fitter.is_none() {
        warn!(%method, "No Gaussian fitter available, keeping peak coordinates");
        return;
    }

    let mut located = 0;
    for peak in peaks.iter_mut() {
        let floor = if peak.has_saddle() {
            peak.highest_saddle_value
        } else {
            background
        };
        let patch = Patch::extract(image, maxima, peak, floor);

        let centre = match method {
            CentreMethod::MaxValueSearch | CentreMethod::MaxValueOriginal => patch.max_value(),
            CentreMethod::CentreOfMassSearch | CentreMethod::CentreOfMassOriginal => {
                patch.centre_of_mass(peak.centre, parameter)
            }
            CentreMethod::GaussianSearch | CentreMethod::GaussianOriginal => {
                fitter.and_then(|fitter| patch.gaussian(fitter, parameter))
            }
        };

        if let Some(centre) = centre {
            peak.centre = centre;
            peak.x = round_to_pixel(centre.x, geometry.width());
            peak.y = round_to_pixel(centre.y, geometry.height());
            peak.z = round_to_pixel(centre.z, geometry.depth());
            located += 1;
        }
    }
    debug!(located, peaks = peaks.len(), %method, "Located centres");
}

fn round_to_pixel(v: f64, len: usize) -> usize {
    (v.round().max(0.0) as usize).min(len - 1)
}

/// Dense weights of one region over its bounding box.
struct Patch {
    origin: Coord,
    width: usize,
    height: usize,
    depth: usize,
    weights: Vec<f64>,
}

impl Patch {
    fn extract(image: &Image, maxima: &[u32], peak: &PeakResult, floor: f64) -> Self {
        let geometry = image.geometry();
        let pixels = image.pixels();
        let b = peak.bounds;
        let (width, height, depth) = (b.width(), b.height(), b.depth());

        let mut weights = Vec::with_capacity(width * height * depth);
        for z in b.min.z..=b.max.z {
            for y in b.min.y..=b.max.y {
                let row = geometry.index(Coord::new(b.min.x, y, z));
                for i in row..row + width {
                    let v = pixels[i] as f64;
                    let w = if maxima[i] == peak.id && v > floor {
                        v - floor
                    } else {
                        0.0
                    };
                    weights.push(w);
                }
            }
        }

        Self {
            origin: b.min,
            width,
            height,
            depth,
            weights,
        }
    }

    /// Absolute position of a patch index.
    #[inline]
    fn position(&self, i: usize) -> DVec3 {
        let plane = self.width * self.height;
        let z = i / plane;
        let y = (i % plane) / self.width;
        let x = i % self.width;
        DVec3::new(
            (self.origin.x + x) as f64,
            (self.origin.y + y) as f64,
            (self.origin.z + z) as f64,
        )
    }

    /// Highest pixel. Equal highest pixels resolve to the one nearest their
    /// centroid, then the lowest index.
    fn max_value(&self) -> Option<DVec3> {
        let top = self.weights.iter().copied().fold(0.0f64, f64::max);
        if top <= 0.0 {
            return None;
        }
        let ties: Vec<DVec3> = self
            .weights
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w == top)
            .map(|(i, _)| self.position(i))
            .collect();
        if ties.len() == 1 {
            return Some(ties[0]);
        }

        let centroid = ties.iter().copied().sum::<DVec3>() / ties.len() as f64;
        let mut best = ties[0];
        let mut best_d = f64::INFINITY;
        for &p in &ties {
            let d = p.distance_squared(centroid);
            if d < best_d {
                best_d = d;
                best = p;
            }
        }
        Some(best)
    }

    /// Iterative centre of mass within `radius` of the running estimate.
    /// A radius of zero or less uses the whole patch in a single pass.
    fn centre_of_mass(&self, start: DVec3, radius: f64) -> Option<DVec3> {
        let mut centre = start;
        let mut found = false;
        for _ in 0..MAX_ITERATIONS {
            let mut sum_w = 0.0;
            let mut sum = DVec3::ZERO;
            for (i, &w) in self.weights.iter().enumerate() {
                if w <= 0.0 {
                    continue;
                }
                let p = self.position(i);
                if radius > 0.0 && (p - centre).abs().max_element() > radius {
                    continue;
                }
                sum_w += w;
                sum += p * w;
            }
            if sum_w <= 0.0 {
                break;
            }

            let next = sum / sum_w;
            let shift = next.distance_squared(centre);
            centre = next;
            found = true;
            if radius <= 0.0 || shift < CONVERGENCE_SQ {
                break;
            }
        }
        found.then_some(centre)
    }

    /// Gaussian fit on the z projection. `parameter < 1` selects a maximum
    /// projection, otherwise the average. The z position is the centre of mass
    /// of the per-slice totals.
    fn gaussian(&self, fitter: &dyn GaussianFitter, parameter: f64) -> Option<DVec3> {
        let plane = self.width * self.height;
        let use_max = parameter < 1.0;

        let mut projection = vec![0.0f64; plane];
        let mut slice_totals = vec![0.0f64; self.depth];
        for (z, slice) in self.weights.chunks_exact(plane).enumerate() {
            for (p, &w) in projection.iter_mut().zip(slice) {
                if use_max {
                    *p = p.max(w);
                } else {
                    *p += w / self.depth as f64;
                }
            }
            slice_totals[z] = slice.iter().sum();
        }

        let xy = fitter.fit(&projection, self.width, self.height)?;

        let total: f64 = slice_totals.iter().sum();
        let z = if total > 0.0 {
            slice_totals
                .iter()
                .enumerate()
                .map(|(z, &s)| z as f64 * s)
                .sum::<f64>()
                / total
        } else {
            0.0
        };

        Some(DVec3::new(
            self.origin.x as f64 + xy.x,
            self.origin.y as f64 + xy.y,
            self.origin.z as f64 + z,
        ))
    }
}
