//! # Efficient Frontier
//!
//! $$
//! \sigma^\*(\tau)=\min_{\mathbf w\in[0,1]^N}\sqrt{D\,\mathbf w^\top\Sigma\mathbf w}
//! \quad\text{s.t.}\quad \mathbf 1^\top\mathbf w=1,\quad e^{D\mu^\top\mathbf w}-1=\tau
//! $$
//!
//! Long-only minimum-volatility portfolio for each target annual return, by sequential
//! quadratic programming. Since $\tau>-1$, the return constraint is imposed in the equivalent
//! form $D\mu^\top\mathbf w=\ln(1+\tau)$.
//!
//! Each iteration solves a convex subproblem with the bounds explicit
//! ([`super::qp`]) and globalizes the step with an $\ell_1$ merit line search.
//! Every point reports a [`SolveStatus`]; only converged points carry a volatility.

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array1;
use rayon::prelude::*;
use tracing::debug;
use tracing::warn;

use super::data::ReturnTable;
use super::metrics::MarketMoments;
use super::qp::QpFailure;
use super::qp::SimplexQp;
use super::types::Frontier;
use super::types::FrontierPoint;
use super::types::SolveStatus;
use super::types::TRADING_DAYS;
use crate::error::PortfolioError;
use crate::error::Result;

/// Volatility below which the objective gradient is not normalized.
const VOL_FLOOR: f64 = 1e-12;
/// Proximal regularization of the subproblem Hessian, relative to the largest variance.
/// Keeps the KKT solves well posed when the covariance is singular.
const RIDGE: f64 = 1e-6;
const ARMIJO: f64 = 1e-4;
const MIN_STEP: f64 = 1e-10;

/// Runtime configuration for [`FrontierSolver`].
#[derive(Clone, Debug)]
pub struct FrontierConfig {
  /// SQP iterations per target.
  pub max_iter: usize,
  /// Bound on the step and on the constraint residuals at convergence.
  pub tolerance: f64,
  /// Solve targets on the rayon pool.
  pub parallel: bool,
}

impl Default for FrontierConfig {
  fn default() -> Self {
    Self {
      max_iter: 100,
      tolerance: 1e-9,
      parallel: true,
    }
  }
}

/// `m` evenly spaced targets from `lo` to `hi` inclusive.
pub fn target_grid(lo: f64, hi: f64, m: usize) -> Vec<f64> {
  Array1::linspace(lo, hi, m).to_vec()
}

struct Solve {
  weights: DVector<f64>,
  status: SolveStatus,
  iterations: usize,
}

/// Annualized problem data in solver layout.
struct MeanVariance {
  sigma: DMatrix<f64>,
  drift: DVector<f64>,
  ridge: f64,
}

impl MeanVariance {
  fn from_moments(moments: &MarketMoments) -> Self {
    let n = moments.n_assets();
    let days = moments.trading_days();
    let sigma = DMatrix::from_fn(n, n, |i, j| days * moments.cov()[[i, j]]);
    let drift = DVector::from_fn(n, |i, _| days * moments.mean()[i]);
    let ridge = RIDGE * sigma.diagonal().amax().max(f64::MIN_POSITIVE);

    Self {
      sigma,
      drift,
      ridge,
    }
  }

  fn volatility(&self, w: &DVector<f64>) -> f64 {
    w.dot(&(&self.sigma * w)).max(0.0).sqrt()
  }

  /// Budget and return residuals, the latter zero without a target.
  fn residuals(&self, w: &DVector<f64>, log_target: Option<f64>) -> [f64; 2] {
    [
      w.sum() - 1.0,
      log_target.map_or(0.0, |b| self.drift.dot(w) - b),
    ]
  }

  fn solve(&self, log_target: Option<f64>, config: &FrontierConfig) -> Solve {
    let n = self.drift.len();
    let mut w = DVector::from_element(n, 1.0 / n as f64);
    let mut rho = 0.0f64;
    let l1 = |c: [f64; 2]| c[0].abs() + c[1].abs();

    for iteration in 1..=config.max_iter {
      let stop = |status| Solve {
        weights: w.clone(),
        status,
        iterations: iteration,
      };

      let vol = self.volatility(&w);
      let scale = if vol > VOL_FLOOR { vol } else { 1.0 };
      let g = (&self.sigma * &w) / scale;
      let mut h = &self.sigma / scale;
      for i in 0..n {
        h[(i, i)] += self.ridge / scale;
      }
      let q = &g - &h * &w;
      let c = self.residuals(&w, log_target);

      if !(vol.is_finite() && g.iter().chain(c.iter()).all(|v| v.is_finite())) {
        return stop(SolveStatus::Degenerate);
      }

      let qp = SimplexQp::new(&h, &q);
      let qp = match log_target {
        Some(beta) => qp.with_target(&self.drift, beta),
        None => qp,
      };
      let sol = match qp.solve() {
        Ok(sol) => sol,
        Err(QpFailure::Infeasible) => return stop(SolveStatus::Infeasible),
        Err(QpFailure::Singular | QpFailure::IterationLimit) => {
          return stop(SolveStatus::Degenerate);
        }
      };

      let d = &sol.x - &w;
      let step = d.amax();
      if step <= config.tolerance {
        if sol.relaxed {
          return stop(SolveStatus::Infeasible);
        }
        if c[0].abs().max(c[1].abs()) <= config.tolerance {
          return stop(SolveStatus::Converged);
        }
      }

      rho = rho.max(2.0 * sol.multipliers.amax());
      let merit = |v: &DVector<f64>| self.volatility(v) + rho * l1(self.residuals(v, log_target));
      let phi0 = vol + rho * l1(c);
      // constraints are linear, so the model residual after the step is exact
      let slope = g.dot(&d) + rho * (l1(self.residuals(&sol.x, log_target)) - l1(c));

      let mut alpha = 1.0;
      while alpha > MIN_STEP && merit(&(&w + &d * alpha)) > phi0 + ARMIJO * alpha * slope.min(0.0) {
        alpha *= 0.5;
      }
      w.axpy(alpha, &d, 1.0);
    }

    Solve {
      weights: w,
      status: SolveStatus::MaxIterations,
      iterations: config.max_iter,
    }
  }
}

/// SQP solver for long-only frontier points.
#[derive(Clone, Debug, Default)]
pub struct FrontierSolver {
  config: FrontierConfig,
}

impl FrontierSolver {
  pub fn new(config: FrontierConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &FrontierConfig {
    &self.config
  }

  /// Solve one frontier point per target annual return, annualizing with [`TRADING_DAYS`].
  pub fn solve_frontier(&self, returns: &ReturnTable, targets: &[f64]) -> Result<Frontier> {
    let moments = returns.moments(TRADING_DAYS)?;
    self.solve_moments(&moments, targets)
  }

  /// Solve one frontier point per target from precomputed moments.
  ///
  /// Points come back in target order. Targets that cannot be reached keep their slot with a
  /// non-converged [`SolveStatus`] and no volatility.
  pub fn solve_moments(&self, moments: &MarketMoments, targets: &[f64]) -> Result<Frontier> {
    check_universe(moments)?;
    if targets.is_empty() {
      return Err(PortfolioError::invalid("no target returns given"));
    }
    if let Some(tau) = targets.iter().find(|t| !(t.is_finite() && **t > -1.0)) {
      return Err(PortfolioError::invalid(format!(
        "target return {tau} must be finite and greater than -1"
      )));
    }

    debug!(
      n_assets = moments.n_assets(),
      n_targets = targets.len(),
      max_iter = self.config.max_iter,
      tolerance = self.config.tolerance,
      "solving efficient frontier"
    );

    let problem = MeanVariance::from_moments(moments);
    let solve_target = |&tau: &f64| self.point(&problem, moments, tau);

    let points: Vec<FrontierPoint> = if self.config.parallel {
      targets.par_iter().map(solve_target).collect()
    } else {
      targets.iter().map(solve_target).collect()
    };

    let frontier = Frontier { points };
    debug!(
      converged = frontier.len() - frontier.failures(),
      failed = frontier.failures(),
      "efficient frontier solved"
    );
    Ok(frontier)
  }

  /// Global minimum-volatility long-only portfolio.
  pub fn min_volatility(&self, returns: &ReturnTable) -> Result<FrontierPoint> {
    let moments = returns.moments(TRADING_DAYS)?;
    self.min_volatility_moments(&moments)
  }

  /// Global minimum-volatility portfolio from precomputed moments. Its `target_return` is the
  /// return the portfolio achieves.
  pub fn min_volatility_moments(&self, moments: &MarketMoments) -> Result<FrontierPoint> {
    check_universe(moments)?;

    let problem = MeanVariance::from_moments(moments);
    let solve = problem.solve(None, &self.config);
    let weights = Array1::from_iter(solve.weights.iter().copied());
    let achieved = moments.annual_return(weights.view());

    if solve.status != SolveStatus::Converged {
      warn!(
        status = %solve.status,
        iterations = solve.iterations,
        "minimum volatility portfolio did not converge"
      );
    }

    Ok(into_point(achieved, &problem, solve, weights))
  }

  fn point(&self, problem: &MeanVariance, moments: &MarketMoments, tau: f64) -> FrontierPoint {
    let solve = problem.solve(Some(tau.ln_1p()), &self.config);
    let weights = Array1::from_iter(solve.weights.iter().copied());

    if solve.status != SolveStatus::Converged {
      warn!(
        target_return = tau,
        achieved_return = moments.annual_return(weights.view()),
        status = %solve.status,
        iterations = solve.iterations,
        "frontier point did not converge"
      );
    }

    into_point(tau, problem, solve, weights)
  }
}

fn check_universe(moments: &MarketMoments) -> Result<()> {
  if moments.n_assets() < 2 {
    return Err(PortfolioError::invalid(format!(
      "frontier needs at least 2 assets, got {}",
      moments.n_assets()
    )));
  }
  Ok(())
}

fn into_point(
  target_return: f64,
  problem: &MeanVariance,
  solve: Solve,
  weights: Array1<f64>,
) -> FrontierPoint {
  let volatility = (solve.status == SolveStatus::Converged)
    .then(|| problem.volatility(&solve.weights))
    .filter(|v| v.is_finite());
  let status = match (solve.status, volatility) {
    (SolveStatus::Converged, None) => SolveStatus::Degenerate,
    (status, _) => status,
  };

  FrontierPoint::new(target_return, volatility, weights, status, solve.iterations)
}
