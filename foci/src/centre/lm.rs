//! Levenberg-Marquardt optimizer for small 2D profile models.
//!
//! Uses f64 throughout. The damped normal equations are symmetric, so each
//! step accumulates only their upper triangle and solves them with an
//! LDL^T factorization.

/// Configuration for Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LMConfig {
    /// Maximum iterations.
    pub max_iterations: usize,
    /// Convergence threshold for parameter changes.
    pub convergence_threshold: f64,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Factor to increase lambda on failed step.
    pub lambda_up: f64,
    /// Factor to decrease lambda on successful step.
    pub lambda_down: f64,
}

impl Default for LMConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            convergence_threshold: 1e-8,
            initial_lambda: 0.001,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

/// Result of L-M optimization.
#[derive(Debug, Clone, Copy)]
pub struct LMResult<const N: usize> {
    pub params: [f64; N],
    pub chi2: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// A model that can be fit with L-M optimization.
pub trait LMModel<const N: usize> {
    /// Evaluate the model at a point.
    fn evaluate(&self, x: f64, y: f64, params: &[f64; N]) -> f64;

    /// Partial derivatives at a point.
    fn jacobian_row(&self, x: f64, y: f64, params: &[f64; N]) -> [f64; N];

    /// Apply parameter constraints after an update.
    fn constrain(&self, params: &mut [f64; N]);
}

/// Sample points of a fit: positions and observed values.
#[derive(Debug, Clone, Copy)]
pub struct Samples<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub z: &'a [f64],
}

impl Samples<'_> {
    fn iter(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.x
            .iter()
            .zip(self.y)
            .zip(self.z)
            .map(|((&x, &y), &z)| (x, y, z))
    }
}

/// Run L-M optimization for an N-parameter model.
pub fn optimize<const N: usize, M: LMModel<N>>(
    model: &M,
    samples: Samples<'_>,
    initial_params: [f64; N],
    config: &LMConfig,
) -> LMResult<N> {
    let mut params = initial_params;
    let mut lambda = config.initial_lambda;
    let mut prev_chi2 = compute_chi2(model, samples, &params);
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        let mut normal = NormalEquations::<N>::default();
        for (x, y, z) in samples.iter() {
            normal.add(&model.jacobian_row(x, y, &params), z - model.evaluate(x, y, &params));
        }
        let Some(delta) = normal.solve_damped(lambda) else {
            break;
        };

        let mut new_params = params;
        for (p, d) in new_params.iter_mut().zip(delta.iter()) {
            *p += d;
        }
        model.constrain(&mut new_params);

        let new_chi2 = compute_chi2(model, samples, &new_params);

        if new_chi2 < prev_chi2 {
            params = new_params;
            lambda *= config.lambda_down;
            prev_chi2 = new_chi2;

            let max_delta = delta.iter().copied().fold(0.0f64, |a, d| a.max(d.abs()));
            if max_delta < config.convergence_threshold {
                converged = true;
                break;
            }
        } else {
            lambda *= config.lambda_up;
            if lambda > 1e10 {
                break;
            }
        }
    }

    LMResult {
        params,
        chi2: prev_chi2,
        converged,
        iterations,
    }
}

fn compute_chi2<const N: usize, M: LMModel<N>>(
    model: &M,
    samples: Samples<'_>,
    params: &[f64; N],
) -> f64 {
    samples
        .iter()
        .map(|(x, y, z)| {
            let residual = z - model.evaluate(x, y, params);
            residual * residual
        })
        .sum()
}

/// Normal equations `J^T J * delta = J^T r` of one LM step. Only the upper
/// triangle of `J^T J` is stored.
#[derive(Debug, Clone, Copy)]
pub struct NormalEquations<const N: usize> {
    jtj: [[f64; N]; N],
    jtr: [f64; N],
}

impl<const N: usize> Default for NormalEquations<N> {
    fn default() -> Self {
        Self {
            jtj: [[0.0; N]; N],
            jtr: [0.0; N],
        }
    }
}

impl<const N: usize> NormalEquations<N> {
    /// Accumulate one sample's Jacobian row and residual.
    pub fn add(&mut self, row: &[f64; N], residual: f64) {
        for (i, &ri) in row.iter().enumerate() {
            self.jtr[i] += ri * residual;
            for (h, &rj) in self.jtj[i][i..].iter_mut().zip(&row[i..]) {
                *h += ri * rj;
            }
        }
    }

    /// Solve with the diagonal scaled by `1 + lambda`.
    ///
    /// Returns `None` when the damped matrix is not positive definite.
    pub fn solve_damped(&self, lambda: f64) -> Option<[f64; N]> {
        let mut a = self.jtj;
        for (i, row) in a.iter_mut().enumerate() {
            row[i] *= 1.0 + lambda;
        }
        solve_symmetric(&a, &self.jtr)
    }
}

/// Solve `a * x = b` for a symmetric positive definite `a` given by its upper
/// triangle, using an LDL^T factorization.
///
/// Returns `None` when a pivot falls below `1e-12` relative to the largest
/// diagonal entry.
#[allow(clippy::needless_range_loop)]
pub fn solve_symmetric<const N: usize>(a: &[[f64; N]; N], b: &[f64; N]) -> Option<[f64; N]> {
    let scale = (0..N).map(|i| a[i][i].abs()).fold(0.0, f64::max);
    if scale == 0.0 {
        return None;
    }

    // l[i][j] for j < i holds the unit lower factor, d[i] the pivots.
    let mut l = [[0.0f64; N]; N];
    let mut d = [0.0f64; N];
    for i in 0..N {
        for j in 0..=i {
            let dot: f64 = (0..j).map(|k| l[i][k] * l[j][k] * d[k]).sum();
            let v = a[j][i] - dot;
            if i == j {
                if v <= 1e-12 * scale {
                    return None;
                }
                d[i] = v;
            } else {
                l[i][j] = v / d[j];
            }
        }
    }

    // L y = b, then D L^T x = y.
    let mut x = *b;
    for i in 0..N {
        x[i] -= (0..i).map(|k| l[i][k] * x[k]).sum::<f64>();
    }
    for i in (0..N).rev() {
        x[i] = x[i] / d[i] - (i + 1..N).map(|k| l[k][i] * x[k]).sum::<f64>();
    }
    Some(x)
}
