//! Initiation-region classifiers
//!
//! Options learn where they may start from the positions visited shortly
//! before their termination condition fired. Two boundaries are used, both
//! with an RBF kernel whose width is either fixed or follows the
//! `gamma = 1 / (n_features * var(X))` heuristic:
//!
//! - a one-class SVM (nu formulation) around the positive positions, and
//! - when negative positions exist, a class-balanced two-class SVM whose
//!   positively predicted training points are re-fit with a one-class SVM.
//!
//! Both problems are solved by the same SMO solver with second-order
//! working-set selection.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dsc_core::{DscError, Result};

use crate::config::ClassifierConfig;

const TAU: f64 = 1e-12;

/// Which boundary an initiation classifier ended up with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierKind {
    /// One-class boundary around the positives
    OneClass,
    /// Two-class purification followed by a one-class re-fit
    TwoClass,
}

impl ClassifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::OneClass => "ocsvm",
            ClassifierKind::TwoClass => "tcsvm",
        }
    }
}

/// Named width heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GammaHeuristic {
    /// `1 / (n_features * var(X))`
    Scale,
}

/// RBF width, written as `"scale"` or as a number in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KernelGamma {
    Heuristic(GammaHeuristic),
    Fixed(f64),
}

impl KernelGamma {
    pub const SCALE: Self = KernelGamma::Heuristic(GammaHeuristic::Scale);

    pub fn validate(&self) -> Result<()> {
        match self {
            KernelGamma::Fixed(g) if !(g.is_finite() && *g > 0.0) => Err(DscError::Config(
                format!("kernel gamma must be positive: {g}"),
            )),
            _ => Ok(()),
        }
    }
}

/// Radial basis function kernel
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RbfKernel {
    pub gamma: f64,
}

impl RbfKernel {
    /// Kernel for a training matrix under the configured width
    pub fn for_data(x: &Array2<f64>, gamma: KernelGamma) -> Self {
        match gamma {
            KernelGamma::Heuristic(GammaHeuristic::Scale) => Self::scaled_for(x),
            KernelGamma::Fixed(gamma) => Self { gamma },
        }
    }

    /// `gamma = "scale"` over a training matrix
    pub fn scaled_for(x: &Array2<f64>) -> Self {
        let var = x.var(0.0);
        let gamma = if var > 0.0 && var.is_finite() {
            1.0 / (x.ncols() as f64 * var)
        } else {
            1.0
        };
        Self { gamma }
    }

    pub fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let dist2: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
        (-self.gamma * dist2).exp()
    }

    pub fn gram(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let mut k = Array2::zeros((n, n));
        for i in 0..n {
            k[[i, i]] = 1.0;
            for j in (i + 1)..n {
                let v = self.eval(x.row(i), x.row(j));
                k[[i, j]] = v;
                k[[j, i]] = v;
            }
        }
        k
    }
}

/// Dual solution of a box- and equality-constrained quadratic program
struct Solution {
    alpha: Vec<f64>,
    rho: f64,
}

/// SMO solver for `min 0.5 a'Qa + p'a  s.t.  y'a = const, 0 <= a_i <= c_i`
struct SmoSolver<'a> {
    q: &'a Array2<f64>,
    y: &'a [f64],
    c: &'a [f64],
    qd: Vec<f64>,
    alpha: Vec<f64>,
    grad: Vec<f64>,
}

impl<'a> SmoSolver<'a> {
    fn new(q: &'a Array2<f64>, p: &[f64], y: &'a [f64], c: &'a [f64], alpha: Vec<f64>) -> Self {
        let n = p.len();
        let qd = (0..n).map(|i| q[[i, i]]).collect();
        let mut grad = p.to_vec();
        for (i, &a) in alpha.iter().enumerate() {
            if a != 0.0 {
                for (j, g) in grad.iter_mut().enumerate() {
                    *g += a * q[[i, j]];
                }
            }
        }
        Self {
            q,
            y,
            c,
            qd,
            alpha,
            grad,
        }
    }

    fn is_upper(&self, i: usize) -> bool {
        self.alpha[i] >= self.c[i]
    }

    fn is_lower(&self, i: usize) -> bool {
        self.alpha[i] <= 0.0
    }

    fn solve(mut self, eps: f64, max_iterations: usize) -> Solution {
        let mut iterations = 0;
        while let Some((i, j)) = self.select_working_set(eps) {
            if iterations >= max_iterations {
                warn!("SMO reached the iteration limit ({}) before converging", max_iterations);
                break;
            }
            iterations += 1;
            self.update_pair(i, j);
        }
        debug!("SMO converged after {} iterations", iterations);
        let rho = self.rho();
        Solution {
            alpha: self.alpha,
            rho,
        }
    }

    fn select_working_set(&self, eps: f64) -> Option<(usize, usize)> {
        let n = self.alpha.len();
        let (y, g) = (self.y, &self.grad);

        let mut gmax = f64::NEG_INFINITY;
        let mut gmax_idx = None;
        for t in 0..n {
            if y[t] > 0.0 {
                if !self.is_upper(t) && -g[t] >= gmax {
                    gmax = -g[t];
                    gmax_idx = Some(t);
                }
            } else if !self.is_lower(t) && g[t] >= gmax {
                gmax = g[t];
                gmax_idx = Some(t);
            }
        }
        let i = gmax_idx?;

        let mut gmax2 = f64::NEG_INFINITY;
        let mut gmin_idx = None;
        let mut obj_diff_min = f64::INFINITY;
        for j in 0..n {
            let (grad_diff, quad) = if y[j] > 0.0 {
                if self.is_lower(j) {
                    continue;
                }
                gmax2 = gmax2.max(g[j]);
                (
                    gmax + g[j],
                    self.qd[i] + self.qd[j] - 2.0 * y[i] * self.q[[i, j]],
                )
            } else {
                if self.is_upper(j) {
                    continue;
                }
                gmax2 = gmax2.max(-g[j]);
                (
                    gmax - g[j],
                    self.qd[i] + self.qd[j] + 2.0 * y[i] * self.q[[i, j]],
                )
            };
            if grad_diff > 0.0 {
                let obj_diff = -(grad_diff * grad_diff) / if quad > 0.0 { quad } else { TAU };
                if obj_diff <= obj_diff_min {
                    gmin_idx = Some(j);
                    obj_diff_min = obj_diff;
                }
            }
        }

        match gmin_idx {
            Some(j) if gmax + gmax2 >= eps => Some((i, j)),
            _ => None,
        }
    }

    fn update_pair(&mut self, i: usize, j: usize) {
        let (ci, cj) = (self.c[i], self.c[j]);
        let (old_ai, old_aj) = (self.alpha[i], self.alpha[j]);
        let qij = self.q[[i, j]];
        let (mut ai, mut aj) = (old_ai, old_aj);

        if self.y[i] != self.y[j] {
            let quad = (self.qd[i] + self.qd[j] + 2.0 * qij).max(TAU);
            let delta = (-self.grad[i] - self.grad[j]) / quad;
            let diff = ai - aj;
            ai += delta;
            aj += delta;
            if diff > 0.0 {
                if aj < 0.0 {
                    aj = 0.0;
                    ai = diff;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = -diff;
            }
            if diff > ci - cj {
                if ai > ci {
                    ai = ci;
                    aj = ci - diff;
                }
            } else if aj > cj {
                aj = cj;
                ai = cj + diff;
            }
        } else {
            let quad = (self.qd[i] + self.qd[j] - 2.0 * qij).max(TAU);
            let delta = (self.grad[i] - self.grad[j]) / quad;
            let sum = ai + aj;
            ai -= delta;
            aj += delta;
            if sum > ci {
                if ai > ci {
                    ai = ci;
                    aj = sum - ci;
                }
            } else if aj < 0.0 {
                aj = 0.0;
                ai = sum;
            }
            if sum > cj {
                if aj > cj {
                    aj = cj;
                    ai = sum - cj;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = sum;
            }
        }

        self.alpha[i] = ai;
        self.alpha[j] = aj;
        let (dai, daj) = (ai - old_ai, aj - old_aj);
        for k in 0..self.grad.len() {
            self.grad[k] += self.q[[i, k]] * dai + self.q[[j, k]] * daj;
        }
    }

    fn rho(&self) -> f64 {
        let mut ub = f64::INFINITY;
        let mut lb = f64::NEG_INFINITY;
        let mut free = 0usize;
        let mut sum_free = 0.0;

        for i in 0..self.alpha.len() {
            let yg = self.y[i] * self.grad[i];
            if self.is_upper(i) {
                if self.y[i] < 0.0 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else if self.is_lower(i) {
                if self.y[i] > 0.0 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else {
                free += 1;
                sum_free += yg;
            }
        }

        if free > 0 {
            sum_free / free as f64
        } else {
            (ub + lb) / 2.0
        }
    }
}

/// Kernel expansion `sum_i coef_i * k(sv_i, x) - rho`
#[derive(Debug, Clone)]
struct KernelExpansion {
    support: Array2<f64>,
    coef: Array1<f64>,
    rho: f64,
    kernel: RbfKernel,
}

impl KernelExpansion {
    fn from_solution(x: &Array2<f64>, weights: &[f64], rho: f64, kernel: RbfKernel) -> Self {
        let keep: Vec<usize> = (0..weights.len()).filter(|&i| weights[i] != 0.0).collect();
        let support = x.select(Axis(0), &keep);
        let coef = keep.iter().map(|&i| weights[i]).collect();
        Self {
            support,
            coef,
            rho,
            kernel,
        }
    }

    fn decision(&self, x: ArrayView1<f64>) -> f64 {
        if x.len() != self.support.ncols() || x.iter().any(|v| !v.is_finite()) {
            return f64::NAN;
        }
        let total: f64 = self
            .support
            .outer_iter()
            .zip(self.coef.iter())
            .map(|(sv, c)| c * self.kernel.eval(sv, x))
            .sum();
        total - self.rho
    }
}

/// One-class SVM (nu formulation)
#[derive(Debug, Clone)]
pub struct OneClassSvm {
    expansion: KernelExpansion,
}

impl OneClassSvm {
    pub fn fit(
        x: &Array2<f64>,
        nu: f64,
        gamma: KernelGamma,
        tolerance: f64,
        max_iterations: usize,
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 {
            return Err(DscError::Classifier(
                "cannot fit a one-class boundary without samples".to_string(),
            ));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(DscError::Classifier("non-finite training sample".to_string()));
        }

        let kernel = RbfKernel::for_data(x, gamma);
        let q = kernel.gram(x);

        let budget = nu * n as f64;
        let full = (budget.floor() as usize).min(n);
        let mut alpha = vec![0.0; n];
        for a in alpha.iter_mut().take(full) {
            *a = 1.0;
        }
        if full < n {
            alpha[full] = budget - full as f64;
        }

        let p = vec![0.0; n];
        let y = vec![1.0; n];
        let c = vec![1.0; n];
        let solution = SmoSolver::new(&q, &p, &y, &c, alpha).solve(tolerance, max_iterations);

        Ok(Self {
            expansion: KernelExpansion::from_solution(x, &solution.alpha, solution.rho, kernel),
        })
    }

    /// Signed distance to the boundary, positive inside
    pub fn decision_function(&self, x: &[f64]) -> f64 {
        self.expansion.decision(ArrayView1::from(x))
    }

    pub fn predict(&self, x: &[f64]) -> bool {
        self.decision_function(x) > 0.0
    }

    pub fn num_support_vectors(&self) -> usize {
        self.expansion.coef.len()
    }

    pub fn gamma(&self) -> f64 {
        self.expansion.kernel.gamma
    }
}

/// Two-class C-SVM with balanced class weights
#[derive(Debug, Clone)]
pub struct TwoClassSvm {
    expansion: KernelExpansion,
}

impl TwoClassSvm {
    pub fn fit(
        x: &Array2<f64>,
        labels: &[bool],
        c: f64,
        gamma: KernelGamma,
        tolerance: f64,
        max_iterations: usize,
    ) -> Result<Self> {
        let n = x.nrows();
        let num_pos = labels.iter().filter(|&&l| l).count();
        let num_neg = n - num_pos;
        if num_pos == 0 || num_neg == 0 {
            return Err(DscError::Classifier(format!(
                "two-class boundary needs both classes ({num_pos} positive, {num_neg} negative)"
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(DscError::Classifier("non-finite training sample".to_string()));
        }

        let kernel = RbfKernel::for_data(x, gamma);
        let y: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { -1.0 }).collect();
        let mut q = kernel.gram(x);
        for i in 0..n {
            for j in 0..n {
                q[[i, j]] *= y[i] * y[j];
            }
        }

        let pos_weight = n as f64 / (2.0 * num_pos as f64);
        let neg_weight = n as f64 / (2.0 * num_neg as f64);
        let bounds: Vec<f64> = labels
            .iter()
            .map(|&l| c * if l { pos_weight } else { neg_weight })
            .collect();

        let p = vec![-1.0; n];
        let solution =
            SmoSolver::new(&q, &p, &y, &bounds, vec![0.0; n]).solve(tolerance, max_iterations);

        let weights: Vec<f64> = solution.alpha.iter().zip(&y).map(|(a, y)| a * y).collect();
        Ok(Self {
            expansion: KernelExpansion::from_solution(x, &weights, solution.rho, kernel),
        })
    }

    pub fn decision_function(&self, x: &[f64]) -> f64 {
        self.expansion.decision(ArrayView1::from(x))
    }

    pub fn predict(&self, x: &[f64]) -> bool {
        self.decision_function(x) > 0.0
    }
}

/// Fitted initiation region of an option
#[derive(Debug, Clone)]
pub struct InitiationClassifier {
    kind: ClassifierKind,
    boundary: OneClassSvm,
    num_positive: usize,
    num_negative: usize,
}

impl InitiationClassifier {
    /// Fit from flattened positive and negative positions.
    ///
    /// Without negatives this is a one-class boundary around the positives.
    /// With negatives, a balanced two-class boundary keeps only the
    /// positively predicted training points, which are then wrapped by a
    /// one-class boundary.
    pub fn fit(
        positives: &[Vec<f64>],
        negatives: &[Vec<f64>],
        config: &ClassifierConfig,
    ) -> Result<Self> {
        config.validate()?;
        if positives.is_empty() {
            return Err(DscError::Classifier("no positive examples".to_string()));
        }
        let positive_matrix = to_matrix(positives)?;

        if negatives.is_empty() {
            let boundary = OneClassSvm::fit(
                &positive_matrix,
                config.nu,
                config.gamma,
                config.tolerance,
                config.max_iterations,
            )?;
            return Ok(Self {
                kind: ClassifierKind::OneClass,
                boundary,
                num_positive: positives.len(),
                num_negative: 0,
            });
        }

        let all: Vec<Vec<f64>> = positives.iter().chain(negatives).cloned().collect();
        let x = to_matrix(&all)?;
        let labels: Vec<bool> = (0..all.len()).map(|i| i < positives.len()).collect();

        let two_class = TwoClassSvm::fit(
            &x,
            &labels,
            config.c,
            config.gamma,
            config.tolerance,
            config.max_iterations,
        )?;
        let kept: Vec<usize> = (0..x.nrows())
            .filter(|&i| two_class.predict(&all[i]))
            .collect();
        if kept.is_empty() {
            return Err(DscError::Classifier(
                "two-class boundary rejected every training sample".to_string(),
            ));
        }
        debug!(
            "Two-class purification kept {} of {} samples",
            kept.len(),
            x.nrows()
        );

        let purified = x.select(Axis(0), &kept);
        let boundary = OneClassSvm::fit(
            &purified,
            config.nu,
            config.gamma,
            config.tolerance,
            config.max_iterations,
        )?;
        Ok(Self {
            kind: ClassifierKind::TwoClass,
            boundary,
            num_positive: positives.len(),
            num_negative: negatives.len(),
        })
    }

    pub fn kind(&self) -> ClassifierKind {
        self.kind
    }

    /// Whether a position lies inside the initiation region
    pub fn contains(&self, position: &[f64]) -> bool {
        self.boundary.predict(position)
    }

    /// Signed distance from the region boundary, positive inside
    pub fn decision_function(&self, position: &[f64]) -> f64 {
        self.boundary.decision_function(position)
    }

    pub fn num_positive(&self) -> usize {
        self.num_positive
    }

    pub fn num_negative(&self) -> usize {
        self.num_negative
    }
}

fn to_matrix(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let dims = rows.first().map_or(0, Vec::len);
    if dims == 0 || rows.iter().any(|r| r.len() != dims) {
        return Err(DscError::Classifier(
            "training samples must share a non-zero dimension".to_string(),
        ));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), dims), flat)
        .map_err(|e| DscError::Classifier(e.to_string()))
}
