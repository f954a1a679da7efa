//! Covariance Matrix Adaptation Evolution Strategy (CMA-ES) state.
//!
//! Standard (μ/μ_w, λ) CMA-ES with cumulative step-size adaptation,
//! rank-one and rank-μ covariance updates, and a lazily refreshed
//! eigendecomposition of the covariance matrix.

use rand::Rng;
use rand_distr::StandardNormal;

/// Floor applied to eigenvalues of the covariance matrix.
const MIN_EIGENVALUE: f64 = 1e-16;

/// Maximum Jacobi sweeps per eigendecomposition.
const MAX_SWEEPS: usize = 64;

/// Default population size for a problem dimension: 4 + ⌊3 ln n⌋.
pub fn default_lambda(dimension: usize) -> usize {
    4 + (3.0 * (dimension.max(1) as f64).ln()).floor() as usize
}

/// Sampling distribution and adaptation state of a CMA-ES run.
#[derive(Debug, Clone)]
pub struct CmaState {
    dimension: usize,
    lambda: usize,
    mu: usize,
    weights: Vec<f64>,
    mu_eff: f64,

    c_sigma: f64,
    d_sigma: f64,
    c_c: f64,
    c_1: f64,
    c_mu: f64,
    chi_n: f64,

    mean: Vec<f64>,
    sigma: f64,
    covariance: Vec<Vec<f64>>,
    path_sigma: Vec<f64>,
    path_c: Vec<f64>,
    /// Eigenvalues of the covariance (squared axis lengths).
    eigenvalues: Vec<f64>,
    /// Eigenvectors of the covariance, one per column.
    eigenvectors: Vec<Vec<f64>>,
    eigen_generation: usize,
    generation: usize,
}

impl CmaState {
    /// Create the initial state around `mean` with step size `sigma`.
    pub fn new(mean: Vec<f64>, sigma: f64, lambda: Option<usize>) -> Self {
        let dimension = mean.len();
        let n = dimension as f64;
        let lambda = lambda.unwrap_or_else(|| default_lambda(dimension));
        let mu = (lambda / 2).max(1);

        let mut weights: Vec<f64> = (0..mu)
            .map(|i| ((lambda as f64 + 1.0) / 2.0).ln() - ((i + 1) as f64).ln())
            .collect();
        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }
        let mu_eff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        let c_sigma = (mu_eff + 2.0) / (n + mu_eff + 5.0);
        let d_sigma = 1.0 + 2.0 * (((mu_eff - 1.0) / (n + 1.0)).sqrt() - 1.0).max(0.0) + c_sigma;
        let c_c = (4.0 + mu_eff / n) / (n + 4.0 + 2.0 * mu_eff / n);
        let c_1 = 2.0 / ((n + 1.3).powi(2) + mu_eff);
        let c_mu = (2.0 * (mu_eff - 2.0 + 1.0 / mu_eff) / ((n + 2.0).powi(2) + mu_eff))
            .min(1.0 - c_1);
        let chi_n = n.sqrt() * (1.0 - 1.0 / (4.0 * n) + 1.0 / (21.0 * n * n));

        Self {
            dimension,
            lambda,
            mu,
            weights,
            mu_eff,
            c_sigma,
            d_sigma,
            c_c,
            c_1,
            c_mu,
            chi_n,
            mean,
            sigma,
            covariance: identity(dimension),
            path_sigma: vec![0.0; dimension],
            path_c: vec![0.0; dimension],
            eigenvalues: vec![1.0; dimension],
            eigenvectors: identity(dimension),
            eigen_generation: 0,
            generation: 0,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Population size.
    pub fn lambda(&self) -> usize {
        self.lambda
    }

    /// Number of parents used in recombination.
    pub fn mu(&self) -> usize {
        self.mu
    }

    /// Current distribution mean.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Current step size.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Completed updates.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Recombination weights (sum to one).
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Sample λ candidates `m + σ·B·D·z` with `z ~ N(0, I)`.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec<Vec<f64>> {
        (0..self.lambda)
            .map(|_| {
                let z: Vec<f64> = (0..self.dimension)
                    .map(|_| rng.sample(StandardNormal))
                    .collect();
                let y = self.transform(&z);
                self.mean
                    .iter()
                    .zip(&y)
                    .map(|(m, y)| m + self.sigma * y)
                    .collect()
            })
            .collect()
    }

    /// `B·D·z` where D holds the square roots of the eigenvalues.
    fn transform(&self, z: &[f64]) -> Vec<f64> {
        let n = self.dimension;
        let scaled: Vec<f64> = (0..n).map(|j| self.eigenvalues[j].sqrt() * z[j]).collect();
        (0..n)
            .map(|i| (0..n).map(|j| self.eigenvectors[i][j] * scaled[j]).sum())
            .collect()
    }

    /// `C^(-1/2)·y = B·D⁻¹·Bᵀ·y`.
    fn inverse_sqrt_times(&self, y: &[f64]) -> Vec<f64> {
        let n = self.dimension;
        let projected: Vec<f64> = (0..n)
            .map(|i| {
                let dot: f64 = (0..n).map(|j| self.eigenvectors[j][i] * y[j]).sum();
                dot / self.eigenvalues[i].sqrt().max(MIN_EIGENVALUE)
            })
            .collect();
        (0..n)
            .map(|i| (0..n).map(|j| self.eigenvectors[i][j] * projected[j]).sum())
            .collect()
    }

    /// Update the distribution from one evaluated generation (lower fitness is better).
    pub fn update(&mut self, candidates: &[Vec<f64>], fitness: &[f64]) {
        let n = self.dimension;
        let mut order: Vec<usize> = (0..candidates.len().min(fitness.len())).collect();
        order.sort_by(|&a, &b| fitness[a].total_cmp(&fitness[b]));

        // steps of the selected parents, in units of sigma
        let steps: Vec<Vec<f64>> = order
            .iter()
            .take(self.mu)
            .map(|&k| {
                candidates[k]
                    .iter()
                    .zip(&self.mean)
                    .map(|(x, m)| (x - m) / self.sigma)
                    .collect()
            })
            .collect();

        let mut y_w = vec![0.0; n];
        for (w, step) in self.weights.iter().zip(&steps) {
            for (acc, y) in y_w.iter_mut().zip(step) {
                *acc += w * y;
            }
        }

        let whitened = self.inverse_sqrt_times(&y_w);
        let cs_factor = (self.c_sigma * (2.0 - self.c_sigma) * self.mu_eff).sqrt();
        for (p, w) in self.path_sigma.iter_mut().zip(&whitened) {
            *p = (1.0 - self.c_sigma) * *p + cs_factor * w;
        }
        let ps_norm = self.path_sigma.iter().map(|p| p * p).sum::<f64>().sqrt();

        let decay = 1.0 - (1.0 - self.c_sigma).powi(2 * (self.generation as i32 + 1));
        let h_sigma = if ps_norm / decay.sqrt() / self.chi_n < 1.4 + 2.0 / (n as f64 + 1.0) {
            1.0
        } else {
            0.0
        };

        let cc_factor = (self.c_c * (2.0 - self.c_c) * self.mu_eff).sqrt();
        for (p, y) in self.path_c.iter_mut().zip(&y_w) {
            *p = (1.0 - self.c_c) * *p + h_sigma * cc_factor * y;
        }

        let delta_h = (1.0 - h_sigma) * self.c_c * (2.0 - self.c_c);
        let keep = 1.0 - self.c_1 - self.c_mu + delta_h * self.c_1;
        for i in 0..n {
            for j in 0..=i {
                let rank_one = self.path_c[i] * self.path_c[j];
                let rank_mu: f64 = self
                    .weights
                    .iter()
                    .zip(&steps)
                    .map(|(w, y)| w * y[i] * y[j])
                    .sum();
                let value =
                    keep * self.covariance[i][j] + self.c_1 * rank_one + self.c_mu * rank_mu;
                self.covariance[i][j] = value;
                self.covariance[j][i] = value;
            }
        }

        for (m, y) in self.mean.iter_mut().zip(&y_w) {
            *m += self.sigma * y;
        }
        self.sigma *= ((self.c_sigma / self.d_sigma) * (ps_norm / self.chi_n - 1.0)).exp();
        self.generation += 1;

        let interval = self.lambda as f64 / (self.c_1 + self.c_mu) / n as f64 / 10.0;
        if (self.generation - self.eigen_generation) as f64 > interval {
            self.refresh_eigensystem();
        }
    }

    fn refresh_eigensystem(&mut self) {
        let (mut values, vectors) = jacobi_eigen(&self.covariance);
        for v in &mut values {
            *v = v.max(MIN_EIGENVALUE);
        }
        self.eigenvalues = values;
        self.eigenvectors = vectors;
        self.eigen_generation = self.generation;
    }
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            row
        })
        .collect()
}

/// Cyclic Jacobi eigendecomposition of a symmetric matrix.
///
/// Returns the eigenvalues and a matrix whose columns are the eigenvectors.
fn jacobi_eigen(matrix: &[Vec<f64>]) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = matrix.len();
    let mut a = matrix.to_vec();
    let mut v = identity(n);

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        let mut norm = 0.0;
        for p in 0..n {
            for q in 0..n {
                let sq = a[p][q] * a[p][q];
                norm += sq;
                if p != q {
                    off += sq;
                }
            }
        }
        if off <= 1e-30 * norm || off == 0.0 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a[p][q] == 0.0 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for row in a.iter_mut() {
                    let (akp, akq) = (row[p], row[q]);
                    row[p] = c * akp - s * akq;
                    row[q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[p][k], a[q][k]);
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let (vkp, vkq) = (row[p], row[q]);
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    ((0..n).map(|i| a[i][i]).collect(), v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|v| (v - 3.0).powi(2)).sum()
    }

    #[test]
    fn test_default_lambda() {
        assert_eq!(default_lambda(1), 4);
        assert_eq!(default_lambda(2), 6);
        assert_eq!(default_lambda(10), 10);
        let state = CmaState::new(vec![0.0; 2], 1.0, None);
        assert_eq!(state.lambda(), 6);
        assert_eq!(state.mu(), 3);
        assert!((state.weights().iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_lambda_override() {
        let state = CmaState::new(vec![0.0; 5], 1.0, Some(20));
        assert_eq!(state.lambda(), 20);
        assert_eq!(state.mu(), 10);
    }

    #[test]
    fn test_sampling_reproducible() {
        let state = CmaState::new(vec![1.0, 2.0], 0.5, None);
        let a = state.sample(&mut StdRng::seed_from_u64(42));
        let b = state.sample(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
        assert!(a.iter().all(|x| x.len() == 2));
    }

    #[test]
    fn test_jacobi_reconstructs_matrix() {
        let m = vec![
            vec![4.0, 1.0, 0.5],
            vec![1.0, 3.0, 0.2],
            vec![0.5, 0.2, 2.0],
        ];
        let (values, vectors) = jacobi_eigen(&m);
        for i in 0..3 {
            for j in 0..3 {
                let rebuilt: f64 = (0..3)
                    .map(|k| vectors[i][k] * values[k] * vectors[j][k])
                    .sum();
                assert!((rebuilt - m[i][j]).abs() < 1e-9, "({i},{j})");
            }
        }
    }

    #[test]
    fn test_jacobi_2x2() {
        let (mut values, _) = jacobi_eigen(&[vec![2.0, 1.0], vec![1.0, 2.0]]);
        values.sort_by(f64::total_cmp);
        assert!((values[0] - 1.0).abs() < 1e-12);
        assert!((values[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_converges_on_sphere() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = CmaState::new(vec![0.0; 3], 2.0, None);
        for _ in 0..300 {
            let candidates = state.sample(&mut rng);
            let fitness: Vec<f64> = candidates.iter().map(|x| sphere(x)).collect();
            state.update(&candidates, &fitness);
        }
        assert!(sphere(state.mean()) < 1e-4);
        assert_eq!(state.generation(), 300);
    }
}
