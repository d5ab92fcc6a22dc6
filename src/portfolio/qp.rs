//! # Quadratic Subproblem
//!
//! $$
//! \min_{\mathbf x\ge 0}\ \tfrac12\,\mathbf x^\top H\mathbf x+\mathbf q^\top\mathbf x
//! \quad\text{s.t.}\quad \mathbf 1^\top\mathbf x=1,\quad \mathbf a^\top\mathbf x=\beta
//! $$
//!
//! Primal active-set solver for the convex subproblems of the frontier SQP. The budget row
//! together with $\mathbf x\ge 0$ implies $\mathbf x\le 1$, so only lower bounds are tracked.
//!
//! When $\beta$ lies outside $[\min_i a_i,\ \max_i a_i]$ no long-only portfolio meets the
//! return row. The row is then relaxed to the nearest attainable value and the solution is
//! flagged, leaving the caller to decide whether the outer problem is infeasible.

use nalgebra::DMatrix;
use nalgebra::DVector;

/// Spread of `a`, relative to its magnitude floored at one, below which the return row is
/// parallel to the budget row.
const PARALLEL_TOL: f64 = 1e-12;
/// Residual accepted on the equality rows of the returned point.
const FEASIBILITY_TOL: f64 = 1e-10;
/// Relative objective decrease that counts as progress after hitting a bound.
const PROGRESS_TOL: f64 = 1e-14;
/// Negative bound multiplier tolerated at optimality, relative to the gradient scale.
const MULTIPLIER_TOL: f64 = 1e-10;
/// Relative singular value cutoff of the KKT solve.
const SVD_EPS: f64 = 1e-13;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum QpFailure {
  /// The equality rows cannot be met on the active face.
  Infeasible,
  /// The KKT system produced non-finite values.
  Singular,
  /// Active-set changes exceeded the iteration budget.
  IterationLimit,
}

#[derive(Clone, Debug)]
pub(crate) struct QpSolution {
  pub x: DVector<f64>,
  /// Multipliers of the equality rows that were kept, budget row first.
  pub multipliers: DVector<f64>,
  /// `true` when the return row had to be moved to an attainable value.
  pub relaxed: bool,
}

struct Equalities {
  rows: DMatrix<f64>,
  rhs: DVector<f64>,
  start: DVector<f64>,
  relaxed: bool,
}

pub(crate) struct SimplexQp<'a> {
  h: &'a DMatrix<f64>,
  q: &'a DVector<f64>,
  target: Option<(&'a DVector<f64>, f64)>,
}

impl<'a> SimplexQp<'a> {
  /// `h` must be symmetric positive definite on the null space of the equality rows. A
  /// singular `h` is tolerated, but its minimizer is then only one of many.
  pub fn new(h: &'a DMatrix<f64>, q: &'a DVector<f64>) -> Self {
    Self { h, q, target: None }
  }

  /// Add the return row `a'x = beta`.
  pub fn with_target(mut self, a: &'a DVector<f64>, beta: f64) -> Self {
    self.target = Some((a, beta));
    self
  }

  fn equalities(&self) -> Equalities {
    let n = self.q.len();
    let uniform = DVector::from_element(n, 1.0 / n as f64);
    let budget_only = |relaxed| Equalities {
      rows: DMatrix::from_element(1, n, 1.0),
      rhs: DVector::from_element(1, 1.0),
      start: uniform.clone(),
      relaxed,
    };

    let Some((a, beta)) = self.target else {
      return budget_only(false);
    };

    let (imin, amin) = a.argmin();
    let (imax, amax) = a.argmax();
    let scale = a.amax().max(beta.abs()).max(1.0);

    if amax - amin <= PARALLEL_TOL * scale {
      // every long-only x gives a'x = mean(a)
      let attainable = (beta - a.mean()).abs() <= FEASIBILITY_TOL * scale;
      return budget_only(!attainable);
    }

    let relaxed = beta < amin - FEASIBILITY_TOL * scale || beta > amax + FEASIBILITY_TOL * scale;
    let beta = beta.clamp(amin, amax);
    let t = (beta - amin) / (amax - amin);

    let mut start = DVector::zeros(n);
    start[imax] = t;
    start[imin] += 1.0 - t;

    let mut rows = DMatrix::from_element(2, n, 1.0);
    rows.set_row(1, &a.transpose());

    Equalities {
      rows,
      rhs: DVector::from_vec(vec![1.0, beta]),
      start,
      relaxed,
    }
  }

  pub fn solve(&self) -> Result<QpSolution, QpFailure> {
    let n = self.q.len();
    let Equalities {
      rows,
      rhs,
      start: mut x,
      relaxed,
    } = self.equalities();
    let m = rows.nrows();

    // the minimizer is invariant to a positive rescaling of the objective
    let h_scale = match self.h.diagonal().amax() {
      s if s > 0.0 && s.is_finite() => s,
      _ => 1.0,
    };
    let h = self.h / h_scale;
    let q = self.q / h_scale;
    let objective = |x: &DVector<f64>| 0.5 * x.dot(&(&h * x)) + q.dot(x);

    let mut active: Vec<bool> = x.iter().map(|&v| v <= 0.0).collect();
    // bounds hit without lowering the objective; kept active until it drops again
    let mut stalled = vec![false; n];
    let max_iter = 20 * (n + m) + 100;

    for _ in 0..max_iter {
      let free: Vec<usize> = (0..n).filter(|&i| !active[i]).collect();
      let nf = free.len();
      let grad = &h * &x + &q;
      let resid = &rhs - &rows * &x;

      // [H_FF  A_F'] [p     ]   [-g_F]
      // [A_F   0   ] [lambda] = [ r  ]
      let dim = nf + m;
      let mut kkt = DMatrix::<f64>::zeros(dim, dim);
      let mut b = DVector::<f64>::zeros(dim);
      for (r, &i) in free.iter().enumerate() {
        for (c, &j) in free.iter().enumerate() {
          kkt[(r, c)] = h[(i, j)];
        }
        for k in 0..m {
          kkt[(r, nf + k)] = rows[(k, i)];
          kkt[(nf + k, r)] = rows[(k, i)];
        }
        b[r] = -grad[i];
      }
      for k in 0..m {
        b[nf + k] = resid[k];
      }

      let eps = SVD_EPS * kkt.amax().max(1.0);
      let sol = kkt
        .svd(true, true)
        .solve(&b, eps)
        .map_err(|_| QpFailure::Singular)?;
      if sol.iter().any(|v| !v.is_finite()) {
        return Err(QpFailure::Singular);
      }
      let multipliers = sol.rows(nf, m).into_owned();

      let mut alpha = 1.0;
      let mut blocking = None;
      for (r, &i) in free.iter().enumerate() {
        let p = sol[r];
        if p < 0.0 && x[i] < -alpha * p {
          alpha = x[i] / -p;
          blocking = Some(i);
        }
      }

      let before = objective(&x);
      for (r, &i) in free.iter().enumerate() {
        x[i] = (x[i] + alpha * sol[r]).max(0.0);
      }

      if let Some(i) = blocking {
        x[i] = 0.0;
        active[i] = true;
        if objective(&x) < before - PROGRESS_TOL * (1.0 + before.abs()) {
          stalled.fill(false);
        } else {
          stalled[i] = true;
        }
        continue;
      }

      // full step taken: x minimizes the objective on the free face
      let grad = &h * &x + &q;
      let tol = MULTIPLIER_TOL * (1.0 + grad.amax());
      let mut release: Option<(usize, f64)> = None;
      for i in (0..n).filter(|&i| active[i] && !stalled[i]) {
        let mu = grad[i] + rows.column(i).dot(&multipliers);
        if mu < -tol && release.map_or(true, |(_, worst)| mu < worst) {
          release = Some((i, mu));
        }
      }

      match release {
        Some((i, _)) => active[i] = false,
        None => {
          if (&rhs - &rows * &x).amax() > FEASIBILITY_TOL * (1.0 + rhs.amax()) {
            return Err(QpFailure::Infeasible);
          }
          return Ok(QpSolution {
            x,
            multipliers: multipliers * h_scale,
            relaxed,
          });
        }
      }
    }

    Err(QpFailure::IterationLimit)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn diag(values: &[f64]) -> DMatrix<f64> {
    DMatrix::from_diagonal(&DVector::from_row_slice(values))
  }

  #[test]
  fn budget_only_minimum_variance_is_inverse_variance() {
    let h = diag(&[1.0, 2.0, 4.0]);
    let q = DVector::zeros(3);
    let sol = SimplexQp::new(&h, &q).solve().unwrap();

    // w_i proportional to 1 / h_ii
    let norm = 1.0 + 0.5 + 0.25;
    assert_abs_diff_eq!(sol.x[0], 1.0 / norm, epsilon = 1e-12);
    assert_abs_diff_eq!(sol.x[1], 0.5 / norm, epsilon = 1e-12);
    assert_abs_diff_eq!(sol.x[2], 0.25 / norm, epsilon = 1e-12);
    assert!(!sol.relaxed);
  }

  #[test]
  fn bounds_become_active() {
    // unconstrained optimum would short the third asset
    let h = diag(&[1.0, 1.0, 1.0]);
    let q = DVector::from_row_slice(&[0.0, 0.0, 2.0]);
    let sol = SimplexQp::new(&h, &q).solve().unwrap();

    assert_abs_diff_eq!(sol.x[0], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(sol.x[1], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(sol.x[2], 0.0, epsilon = 1e-12);
  }

  #[test]
  fn return_row_is_met_exactly() {
    let h = diag(&[1.0, 1.0, 1.0]);
    let q = DVector::zeros(3);
    let a = DVector::from_row_slice(&[0.1, 0.2, 0.3]);
    let sol = SimplexQp::new(&h, &q).with_target(&a, 0.25).solve().unwrap();

    assert_abs_diff_eq!(sol.x.sum(), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(a.dot(&sol.x), 0.25, epsilon = 1e-12);
    assert!(sol.x.iter().all(|&v| v >= 0.0));
    // min ||x||^2 on that line: x = (1/12, 1/3, 7/12)
    assert_abs_diff_eq!(sol.x[0], 1.0 / 12.0, epsilon = 1e-10);
    assert_abs_diff_eq!(sol.x[1], 1.0 / 3.0, epsilon = 1e-10);
    assert_abs_diff_eq!(sol.x[2], 7.0 / 12.0, epsilon = 1e-10);
  }

  #[test]
  fn unattainable_return_is_relaxed_to_the_best_vertex() {
    let h = diag(&[1.0, 1.0]);
    let q = DVector::zeros(2);
    let a = DVector::from_row_slice(&[0.1, 0.2]);
    let sol = SimplexQp::new(&h, &q).with_target(&a, 0.5).solve().unwrap();

    assert!(sol.relaxed);
    assert_abs_diff_eq!(sol.x[1], 1.0, epsilon = 1e-12);
  }

  #[test]
  fn parallel_return_row_is_dropped_when_consistent() {
    let h = diag(&[1.0, 1.0]);
    let q = DVector::zeros(2);
    let a = DVector::from_row_slice(&[0.2, 0.2]);
    let sol = SimplexQp::new(&h, &q).with_target(&a, 0.2).solve().unwrap();

    assert!(!sol.relaxed);
    assert_eq!(sol.multipliers.len(), 1);
    assert_abs_diff_eq!(sol.x[0], 0.5, epsilon = 1e-12);
  }

  #[test]
  fn singular_hessian_on_a_determined_face() {
    // rank-one H, the two rows pin x down completely
    let h = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
    let q = DVector::zeros(2);
    let a = DVector::from_row_slice(&[0.1, 0.2]);
    let sol = SimplexQp::new(&h, &q).with_target(&a, 0.13).solve().unwrap();

    assert_abs_diff_eq!(sol.x[0], 0.7, epsilon = 1e-10);
    assert_abs_diff_eq!(sol.x[1], 0.3, epsilon = 1e-10);
  }

  #[test]
  fn two_factor_hessian_over_six_assets() {
    // rank two, as a covariance estimated from three observations
    let b = DMatrix::from_row_slice(
      6,
      2,
      &[
        0.02, 0.01, 0.03, -0.01, 0.01, 0.02, 0.025, 0.0, 0.015, 0.015, 0.04, -0.02,
      ],
    );
    let h = &b * b.transpose();
    let q = DVector::from_row_slice(&[0.3, -0.1, 0.2, 0.0, -0.2, 0.1]) * 1e-4;
    let a = DVector::from_row_slice(&[0.05, 0.08, 0.12, 0.02, 0.09, 0.15]);
    let f = |x: &DVector<f64>| 0.5 * x.dot(&(&h * x)) + q.dot(x);

    let sol = SimplexQp::new(&h, &q).solve().unwrap();
    assert_abs_diff_eq!(sol.x.sum(), 1.0, epsilon = 1e-10);
    assert!(sol.x.iter().all(|&v| v >= 0.0));
    for i in 0..6usize {
      let mut vertex = DVector::zeros(6);
      vertex[i] = 1.0;
      assert!(f(&sol.x) <= f(&vertex) + 1e-12);
    }
    assert!(f(&sol.x) <= f(&DVector::from_element(6, 1.0 / 6.0)) + 1e-12);

    let sol = SimplexQp::new(&h, &q).with_target(&a, 0.1).solve().unwrap();
    assert!(!sol.relaxed);
    assert_abs_diff_eq!(sol.x.sum(), 1.0, epsilon = 1e-10);
    assert_abs_diff_eq!(a.dot(&sol.x), 0.1, epsilon = 1e-10);
    assert!(sol.x.iter().all(|&v| v >= 0.0));
    for lo in [0usize, 1, 3, 4] {
      for hi in [2usize, 5] {
        let t = (0.1 - a[lo]) / (a[hi] - a[lo]);
        let mut pair = DVector::zeros(6);
        pair[lo] = 1.0 - t;
        pair[hi] = t;
        assert!(f(&sol.x) <= f(&pair) + 1e-12);
      }
    }
  }

  #[test]
  fn flat_objective_on_the_budget_face() {
    // x'11'x is constant on the simplex, so every long-only point is optimal
    let h = DMatrix::from_element(5, 5, 1.0);
    let q = DVector::zeros(5);
    let sol = SimplexQp::new(&h, &q).solve().unwrap();

    assert_abs_diff_eq!(sol.x.sum(), 1.0, epsilon = 1e-12);
    assert!(sol.x.iter().all(|&v| v >= 0.0));
  }
}
