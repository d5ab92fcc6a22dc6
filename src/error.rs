//! # Errors
//!
//! $$
//! \text{input}\ \to\ \text{Result}\langle T,\ \text{PortfolioError}\rangle
//! $$
//!
//! Fatal error taxonomy of the optimization core. Non-fatal solver failures are reported
//! per frontier point through [`crate::portfolio::SolveStatus`] instead.

use thiserror::Error;

/// Errors raised by the portfolio optimization core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortfolioError {
  /// Malformed or insufficient input: shape mismatches, non-positive prices,
  /// too few assets or observations.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// Degenerate arithmetic during computation, e.g. a zero-volatility portfolio
  /// that leaves the Sharpe ratio undefined.
  #[error("numerical error: {0}")]
  Numerical(String),
}

impl PortfolioError {
  pub(crate) fn invalid(msg: impl Into<String>) -> Self {
    Self::InvalidInput(msg.into())
  }

  pub(crate) fn numerical(msg: impl Into<String>) -> Self {
    Self::Numerical(msg.into())
  }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PortfolioError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_names_the_failure_kind() {
    let err = PortfolioError::invalid("price table needs at least 2 rows");
    assert_eq!(
      err.to_string(),
      "invalid input: price table needs at least 2 rows"
    );

    let err = PortfolioError::numerical("zero volatility");
    assert!(err.to_string().starts_with("numerical error"));
  }
}
