//! 2D Gaussian fitting used by the Gaussian centre methods.
//!
//! Fits f(x,y) = A × exp(-((x-x₀)²/2σ_x² + (y-y₀)²/2σ_y²)) + B
//! with Levenberg-Marquardt optimization.

use glam::DVec2;

use super::lm::{LMConfig, LMModel, Samples, optimize};

/// Fits a 2D Gaussian to a dense patch and reports its centre.
pub trait GaussianFitter: Send + Sync {
    /// `data` is row-major, `width * height` values. The returned centre is in
    /// patch coordinates (pixel centres at integer positions), or `None` if
    /// the fit failed.
    fn fit(&self, data: &[f64], width: usize, height: usize) -> Option<DVec2>;
}

/// 2D Gaussian model for L-M fitting.
/// Parameters: [x0, y0, amplitude, sigma_x, sigma_y, background]
struct Gaussian2D {
    max_sigma: f64,
}

impl LMModel<6> for Gaussian2D {
    #[inline]
    fn evaluate(&self, x: f64, y: f64, params: &[f64; 6]) -> f64 {
        let [x0, y0, amp, sigma_x, sigma_y, bg] = *params;
        let dx = x - x0;
        let dy = y - y0;
        let exponent = -0.5 * (dx * dx / (sigma_x * sigma_x) + dy * dy / (sigma_y * sigma_y));
        amp * exponent.exp() + bg
    }

    #[inline]
    fn jacobian_row(&self, x: f64, y: f64, params: &[f64; 6]) -> [f64; 6] {
        let [x0, y0, amp, sigma_x, sigma_y, _bg] = *params;
        let sigma_x2 = sigma_x * sigma_x;
        let sigma_y2 = sigma_y * sigma_y;

        let dx = x - x0;
        let dy = y - y0;
        let dx2 = dx * dx;
        let dy2 = dy * dy;
        let exp_val = (-0.5 * (dx2 / sigma_x2 + dy2 / sigma_y2)).exp();
        let amp_exp = amp * exp_val;

        [
            amp_exp * dx / sigma_x2,              // df/dx0
            amp_exp * dy / sigma_y2,              // df/dy0
            exp_val,                              // df/damp
            amp_exp * dx2 / (sigma_x2 * sigma_x), // df/dsigma_x
            amp_exp * dy2 / (sigma_y2 * sigma_y), // df/dsigma_y
            1.0,                                  // df/dbg
        ]
    }

    #[inline]
    fn constrain(&self, params: &mut [f64; 6]) {
        params[2] = params[2].max(0.01);
        params[3] = params[3].clamp(0.5, self.max_sigma);
        params[4] = params[4].clamp(0.5, self.max_sigma);
    }
}

/// Levenberg-Marquardt Gaussian fitter.
#[derive(Debug, Clone, Default)]
pub struct LmGaussianFitter {
    pub config: LMConfig,
}

impl LmGaussianFitter {
    pub fn new(config: LMConfig) -> Self {
        Self { config }
    }
}

impl GaussianFitter for LmGaussianFitter {
    fn fit(&self, data: &[f64], width: usize, height: usize) -> Option<DVec2> {
        debug_assert_eq!(data.len(), width * height);
        let n = data.len();
        if n < 7 {
            return None;
        }

        let mut data_x = Vec::with_capacity(n);
        let mut data_y = Vec::with_capacity(n);
        for y in 0..height {
            for x in 0..width {
                data_x.push(x as f64);
                data_y.push(y as f64);
            }
        }

        let background = data.iter().copied().fold(f64::INFINITY, f64::min);
        let peak = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if peak <= background {
            return None;
        }

        // Initial guess from moments above the minimum
        let (mut sw, mut sx, mut sy) = (0.0, 0.0, 0.0);
        for ((&x, &y), &v) in data_x.iter().zip(&data_y).zip(data) {
            let w = v - background;
            sw += w;
            sx += w * x;
            sy += w * y;
        }
        let (cx, cy) = (sx / sw, sy / sw);
        let mut sr = 0.0;
        for ((&x, &y), &v) in data_x.iter().zip(&data_y).zip(data) {
            sr += (v - background) * ((x - cx).powi(2) + (y - cy).powi(2));
        }
        let max_sigma = (width.max(height) as f64).max(1.0);
        let sigma = (sr / (2.0 * sw)).sqrt().clamp(0.5, max_sigma);

        let model = Gaussian2D { max_sigma };
        let result = optimize(
            &model,
            Samples {
                x: &data_x,
                y: &data_y,
                z: data,
            },
            [cx, cy, peak - background, sigma, sigma, background],
            &self.config,
        );

        let [x0, y0, ..] = result.params;
        let inside = (-0.5..width as f64 - 0.5).contains(&x0)
            && (-0.5..height as f64 - 0.5).contains(&y0);
        if !x0.is_finite() || !y0.is_finite() || !inside {
            return None;
        }
        Some(DVec2::new(x0, y0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_patch(width: usize, height: usize, x0: f64, y0: f64, sigma: f64) -> Vec<f64> {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let d2 = (x as f64 - x0).powi(2) + (y as f64 - y0).powi(2);
                data.push(5.0 + 100.0 * (-0.5 * d2 / (sigma * sigma)).exp());
            }
        }
        data
    }

    #[test]
    fn test_recovers_subpixel_centre() {
        let data = gaussian_patch(15, 13, 7.3, 5.8, 2.0);
        let centre = LmGaussianFitter::default().fit(&data, 15, 13).unwrap();
        assert!((centre.x - 7.3).abs() < 0.01, "x = {}", centre.x);
        assert!((centre.y - 5.8).abs() < 0.01, "y = {}", centre.y);
    }

    #[test]
    fn test_too_few_pixels() {
        let data = vec![1.0, 2.0, 1.0];
        assert!(LmGaussianFitter::default().fit(&data, 3, 1).is_none());
    }

    #[test]
    fn test_flat_patch_fails() {
        let data = vec![3.0; 25];
        assert!(LmGaussianFitter::default().fit(&data, 5, 5).is_none());
    }
}
