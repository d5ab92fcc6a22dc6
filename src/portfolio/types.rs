//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}\in\Delta_N} \frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Shared enums and result containers for the Monte Carlo sampler, the frontier solver
//! and the orchestrator.

use std::fmt::Display;
use std::str::FromStr;

use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use crate::error::PortfolioError;

/// Trading days per year used to annualize daily statistics.
pub const TRADING_DAYS: f64 = 252.0;

/// Distribution used to draw random long-only weight vectors.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum WeightSampling {
  /// I.i.d. `U(0,1)` draws normalized by their sum. Not uniform over the simplex:
  /// mass concentrates around equal weights.
  #[default]
  NormalizedUniform,
  /// I.i.d. `Exp(1)` draws normalized by their sum, i.e. a flat Dirichlet sample,
  /// uniform over the simplex.
  FlatDirichlet,
}

impl FromStr for WeightSampling {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "uniform" | "normalized-uniform" | "normalizeduniform" => Ok(Self::NormalizedUniform),
      "dirichlet" | "flat-dirichlet" | "flatdirichlet" | "simplex" => Ok(Self::FlatDirichlet),
      other => Err(PortfolioError::invalid(format!(
        "unknown weight sampling scheme '{other}'"
      ))),
    }
  }
}

/// Annualized metrics of a single weight vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PortfolioMetrics {
  /// `exp(252 * mean.w) - 1`.
  pub expected_return: f64,
  /// `sqrt(252 * w'Cov w)`.
  pub volatility: f64,
  /// `(expected_return - risk_free) / volatility`.
  pub sharpe: f64,
}

/// Outcome of a constrained solve for one frontier point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
  /// KKT point found within tolerance.
  Converged,
  /// Iteration budget exhausted before the tolerance was met.
  MaxIterations,
  /// Linearized constraints cannot be met inside the weight bounds,
  /// typically a target outside the attainable return range.
  Infeasible,
  /// Non-finite arithmetic or a breakdown of the quadratic subproblem.
  Degenerate,
}

impl Display for SolveStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SolveStatus::Converged => write!(f, "converged"),
      SolveStatus::MaxIterations => write!(f, "iteration limit reached"),
      SolveStatus::Infeasible => write!(f, "infeasible"),
      SolveStatus::Degenerate => write!(f, "degenerate"),
    }
  }
}

/// A solved (or failed) point on the efficient frontier.
#[derive(ImplNew, Clone, Debug)]
pub struct FrontierPoint {
  /// Target annual arithmetic return.
  pub target_return: f64,
  /// Minimum annualized volatility. `None` unless the solve converged.
  pub volatility: Option<f64>,
  /// Final iterate. Always long-only and fully invested; only meaningful
  /// as an optimum when the solve converged.
  pub weights: Array1<f64>,
  /// Solver outcome.
  pub status: SolveStatus,
  /// SQP iterations spent.
  pub iterations: usize,
}

impl FrontierPoint {
  /// `true` when the point is a verified constrained optimum.
  pub fn is_converged(&self) -> bool {
    self.status == SolveStatus::Converged
  }
}

/// Frontier points in target order.
#[derive(Clone, Debug, Default)]
pub struct Frontier {
  pub points: Vec<FrontierPoint>,
}

impl Frontier {
  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Converged points only.
  pub fn efficient(&self) -> impl Iterator<Item = &FrontierPoint> {
    self.points.iter().filter(|p| p.is_converged())
  }

  /// `(volatility, target_return)` pairs of the converged points, ready for plotting.
  pub fn curve(&self) -> Vec<(f64, f64)> {
    self
      .efficient()
      .filter_map(|p| p.volatility.map(|vol| (vol, p.target_return)))
      .collect()
  }

  /// Number of points that failed to converge.
  pub fn failures(&self) -> usize {
    self.points.iter().filter(|p| !p.is_converged()).count()
  }
}

/// Monte Carlo sample of the feasible risk/return region.
#[derive(Clone, Debug)]
pub struct MonteCarloSample {
  /// Annualized arithmetic return per trial.
  pub returns: Array1<f64>,
  /// Annualized volatility per trial.
  pub volatilities: Array1<f64>,
  /// Sharpe ratio per trial.
  pub sharpes: Array1<f64>,
  /// One weight vector per row.
  pub weights: Array2<f64>,
  /// Index of the maximum Sharpe ratio, lowest index on ties.
  pub best_index: usize,
  /// Draws discarded because their volatility was zero or non-finite.
  pub redraws: usize,
  /// Base seed of the run, `None` when a caller-supplied RNG was used.
  pub seed: Option<u64>,
}

impl MonteCarloSample {
  pub fn len(&self) -> usize {
    self.returns.len()
  }

  pub fn is_empty(&self) -> bool {
    self.returns.is_empty()
  }

  /// Metrics of trial `k`.
  pub fn metrics(&self, k: usize) -> PortfolioMetrics {
    PortfolioMetrics {
      expected_return: self.returns[k],
      volatility: self.volatilities[k],
      sharpe: self.sharpes[k],
    }
  }

  /// Metrics and weights of the maximum-Sharpe trial.
  pub fn best(&self) -> (PortfolioMetrics, ArrayView1<'_, f64>) {
    (
      self.metrics(self.best_index),
      self.weights.row(self.best_index),
    )
  }

  /// Smallest and largest sampled annual return.
  pub fn return_range(&self) -> (f64, f64) {
    self
      .returns
      .iter()
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
        (lo.min(r), hi.max(r))
      })
  }
}

/// Output of [`crate::portfolio::PortfolioOptimizer::optimize`].
#[derive(Clone, Debug)]
pub struct OptimizationResult {
  /// Asset identifiers in weight order.
  pub assets: Vec<String>,
  pub monte_carlo: MonteCarloSample,
  pub frontier: Frontier,
  /// Global minimum-volatility long-only portfolio (frontier vertex).
  pub min_volatility: FrontierPoint,
  /// Weights of the maximum-Sharpe Monte Carlo trial.
  pub best_weights: Array1<f64>,
  pub best_metrics: PortfolioMetrics,
}

impl OptimizationResult {
  /// Best-Sharpe weights paired with their asset identifiers.
  pub fn allocation(&self) -> Vec<(String, f64)> {
    self
      .assets
      .iter()
      .cloned()
      .zip(self.best_weights.iter().copied())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::*;

  #[test]
  fn weight_sampling_parses_aliases() {
    assert_eq!(
      "uniform".parse::<WeightSampling>().unwrap(),
      WeightSampling::NormalizedUniform
    );
    assert_eq!(
      "Flat-Dirichlet".parse::<WeightSampling>().unwrap(),
      WeightSampling::FlatDirichlet
    );
    assert!("sobol".parse::<WeightSampling>().is_err());
  }

  #[test]
  fn frontier_curve_skips_failed_points() {
    let frontier = Frontier {
      points: vec![
        FrontierPoint::new(0.1, Some(0.2), array![0.5, 0.5], SolveStatus::Converged, 3),
        FrontierPoint::new(0.9, None, array![0.5, 0.5], SolveStatus::Infeasible, 1),
      ],
    };

    assert_eq!(frontier.curve(), vec![(0.2, 0.1)]);
    assert_eq!(frontier.failures(), 1);
    assert_eq!(frontier.efficient().count(), 1);
  }

  #[test]
  fn return_range_spans_all_trials() {
    let sample = MonteCarloSample {
      returns: array![0.2, -0.1, 0.4],
      volatilities: array![0.1, 0.1, 0.1],
      sharpes: array![2.0, -1.0, 4.0],
      weights: array![[1.0, 0.0], [0.0, 1.0], [0.5, 0.5]],
      best_index: 2,
      redraws: 0,
      seed: Some(1),
    };

    assert_eq!(sample.return_range(), (-0.1, 0.4));
    let (metrics, weights) = sample.best();
    assert_eq!(metrics.sharpe, 4.0);
    assert_eq!(weights.to_vec(), vec![0.5, 0.5]);
  }
}
