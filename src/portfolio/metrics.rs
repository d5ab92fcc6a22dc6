//! # Portfolio Metrics
//!
//! $$
//! R_p=e^{D\,\mu^\top\mathbf w}-1,\qquad \sigma_p=\sqrt{D\,\mathbf w^\top\Sigma\mathbf w},
//! \qquad S_p=\frac{R_p-r_f}{\sigma_p}
//! $$
//!
//! Annualized return, volatility and Sharpe ratio of a weight vector, with $D$ trading days.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use super::types::PortfolioMetrics;
use crate::error::PortfolioError;
use crate::error::Result;

/// Relative asymmetry tolerated in a covariance matrix.
const SYMMETRY_TOL: f64 = 1e-10;

/// Daily mean log returns and their sample covariance, plus the annualization factor.
///
/// Built once per run and shared read-only by the sampler and the frontier solver.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketMoments {
  mean: Array1<f64>,
  cov: Array2<f64>,
  trading_days: f64,
}

impl MarketMoments {
  pub fn new(mean: Array1<f64>, cov: Array2<f64>, trading_days: f64) -> Result<Self> {
    let n = mean.len();

    if cov.nrows() != n || cov.ncols() != n {
      return Err(PortfolioError::invalid(format!(
        "covariance is {}x{} for {n} mean returns",
        cov.nrows(),
        cov.ncols()
      )));
    }
    if !(trading_days.is_finite() && trading_days > 0.0) {
      return Err(PortfolioError::invalid(format!(
        "trading days must be finite and positive, got {trading_days}"
      )));
    }
    if mean.iter().chain(cov.iter()).any(|v| !v.is_finite()) {
      return Err(PortfolioError::invalid("moments contain non-finite values"));
    }

    let scale = cov.iter().fold(0.0f64, |m, v| m.max(v.abs())).max(f64::MIN_POSITIVE);
    for i in 0..n {
      if cov[[i, i]] < 0.0 {
        return Err(PortfolioError::invalid(format!(
          "negative variance {} for asset {i}",
          cov[[i, i]]
        )));
      }
      for j in (i + 1)..n {
        if (cov[[i, j]] - cov[[j, i]]).abs() > SYMMETRY_TOL * scale {
          return Err(PortfolioError::invalid(format!(
            "covariance is not symmetric at ({i}, {j})"
          )));
        }
      }
    }

    Ok(Self {
      mean,
      cov,
      trading_days,
    })
  }

  pub fn n_assets(&self) -> usize {
    self.mean.len()
  }

  /// Daily mean log returns.
  pub fn mean(&self) -> &Array1<f64> {
    &self.mean
  }

  /// Daily covariance.
  pub fn cov(&self) -> &Array2<f64> {
    &self.cov
  }

  pub fn trading_days(&self) -> f64 {
    self.trading_days
  }

  /// Annualized arithmetic return `exp(D * mean.w) - 1`.
  pub fn annual_return(&self, w: ArrayView1<f64>) -> f64 {
    (self.trading_days * self.mean.dot(&w)).exp() - 1.0
  }

  /// Annualized variance `D * w'Cov w`, clipped at zero.
  pub fn annual_variance(&self, w: ArrayView1<f64>) -> f64 {
    (self.trading_days * w.dot(&self.cov.dot(&w))).max(0.0)
  }

  pub fn annual_volatility(&self, w: ArrayView1<f64>) -> f64 {
    self.annual_variance(w).sqrt()
  }

  /// Return, volatility and Sharpe ratio of `w`.
  ///
  /// Fails with [`PortfolioError::Numerical`] when the volatility is zero or non-finite,
  /// since the Sharpe ratio is undefined there.
  pub fn evaluate(&self, w: ArrayView1<f64>, risk_free: f64) -> Result<PortfolioMetrics> {
    let expected_return = self.annual_return(w);
    let volatility = self.annual_volatility(w);

    if !(volatility > 0.0 && volatility.is_finite() && expected_return.is_finite()) {
      return Err(PortfolioError::numerical(format!(
        "portfolio volatility {volatility} leaves the Sharpe ratio undefined"
      )));
    }

    Ok(PortfolioMetrics {
      expected_return,
      volatility,
      sharpe: (expected_return - risk_free) / volatility,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn two_asset() -> MarketMoments {
    MarketMoments::new(
      array![0.001, 0.002],
      array![[0.0004, 0.0001], [0.0001, 0.0009]],
      252.0,
    )
    .unwrap()
  }

  #[test]
  fn evaluate_annualizes_with_trading_days() {
    let moments = two_asset();
    let w = array![0.5, 0.5];
    let m = moments.evaluate(w.view(), 0.0).unwrap();

    let daily_mean: f64 = 0.0015;
    let daily_var: f64 = 0.25 * 0.0004 + 0.25 * 0.0009 + 2.0 * 0.25 * 0.0001;
    assert_abs_diff_eq!(m.expected_return, (252.0 * daily_mean).exp() - 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(m.volatility, (252.0 * daily_var).sqrt(), epsilon = 1e-12);
    assert_abs_diff_eq!(m.sharpe, m.expected_return / m.volatility, epsilon = 1e-12);
  }

  #[test]
  fn risk_free_shifts_sharpe() {
    let moments = two_asset();
    let w = array![1.0, 0.0];
    let m = moments.evaluate(w.view(), 0.05).unwrap();
    assert_abs_diff_eq!(
      m.sharpe,
      (m.expected_return - 0.05) / m.volatility,
      epsilon = 1e-12
    );
  }

  #[test]
  fn zero_volatility_is_a_numerical_error() {
    let moments = MarketMoments::new(array![0.001, 0.002], Array2::zeros((2, 2)), 252.0).unwrap();
    let w = array![0.5, 0.5];
    assert!(matches!(
      moments.evaluate(w.view(), 0.0),
      Err(PortfolioError::Numerical(_))
    ));
  }

  #[test]
  fn new_rejects_malformed_moments() {
    assert!(MarketMoments::new(array![0.1], array![[0.1, 0.0]], 252.0).is_err());
    assert!(MarketMoments::new(array![0.1, 0.1], array![[0.1, 0.0], [0.05, 0.1]], 252.0).is_err());
    assert!(MarketMoments::new(array![0.1], array![[-0.1]], 252.0).is_err());
    assert!(MarketMoments::new(array![0.1], array![[0.1]], 0.0).is_err());
    assert!(MarketMoments::new(array![f64::NAN], array![[0.1]], 252.0).is_err());
  }
}
