//! # Portfolio Optimizer
//!
//! $$
//! P\ \xrightarrow{\ \ln\ }\ r\ \to\ (\mu,\Sigma)\ \to\
//! \big(\{\mathbf w^{(k)}\},\ \sigma^\*(\tau_1..\tau_M)\big)
//! $$
//!
//! End-to-end pipeline over a price table: log returns, moments, the Monte Carlo scatter and
//! the efficient frontier across the sampled return range.

use chrono::NaiveDate;
use tracing::debug;
use tracing::info;

use super::data::PriceTable;
use super::data::compute_log_returns;
use super::frontier::FrontierConfig;
use super::frontier::FrontierSolver;
use super::frontier::target_grid;
use super::monte_carlo::MonteCarloConfig;
use super::monte_carlo::MonteCarloSampler;
use super::source::PriceSource;
use super::types::OptimizationResult;
use super::types::TRADING_DAYS;
use crate::error::PortfolioError;
use crate::error::Result;

/// Runtime configuration for [`PortfolioOptimizer`].
#[derive(Clone, Debug)]
pub struct PortfolioOptimizerConfig {
  /// Random portfolios drawn by [`PortfolioOptimizer::run`].
  pub num_portfolios: usize,
  /// Frontier targets solved by [`PortfolioOptimizer::run`].
  pub num_frontier_points: usize,
  /// Annualization factor.
  pub trading_days: f64,
  pub monte_carlo: MonteCarloConfig,
  pub frontier: FrontierConfig,
}

impl Default for PortfolioOptimizerConfig {
  fn default() -> Self {
    Self {
      num_portfolios: 50_000,
      num_frontier_points: 50,
      trading_days: TRADING_DAYS,
      monte_carlo: MonteCarloConfig::default(),
      frontier: FrontierConfig::default(),
    }
  }
}

/// Mean-variance optimizer over a fixed universe and date range.
#[derive(Clone, Debug)]
pub struct PortfolioOptimizer {
  universe: Vec<String>,
  start: NaiveDate,
  end: NaiveDate,
  prices: PriceTable,
  config: PortfolioOptimizerConfig,
}

impl PortfolioOptimizer {
  /// Optimizer over a price table already aligned on dates. The date range is the table's.
  pub fn new(prices: PriceTable, config: PortfolioOptimizerConfig) -> Result<Self> {
    let (Some(&start), Some(&end)) = (prices.dates().first(), prices.dates().last()) else {
      return Err(PortfolioError::invalid("price table has no dates"));
    };
    Self::with_range(prices, start, end, config)
  }

  /// Fetch prices for `universe` over `[start, end]` and build an optimizer on them.
  pub fn from_source<S: PriceSource + ?Sized>(
    source: &S,
    universe: &[String],
    start: NaiveDate,
    end: NaiveDate,
    config: PortfolioOptimizerConfig,
  ) -> Result<Self> {
    let prices = source.fetch(universe, start, end)?;
    debug!(
      assets = universe.len(),
      rows = prices.n_dates(),
      %start,
      %end,
      "fetched price table"
    );
    Self::with_range(prices, start, end, config)
  }

  fn with_range(
    prices: PriceTable,
    start: NaiveDate,
    end: NaiveDate,
    config: PortfolioOptimizerConfig,
  ) -> Result<Self> {
    if prices.n_assets() < 2 {
      return Err(PortfolioError::invalid(format!(
        "optimization needs at least 2 assets, got {}",
        prices.n_assets()
      )));
    }

    Ok(Self {
      universe: prices.assets().to_vec(),
      start,
      end,
      prices,
      config,
    })
  }

  pub fn universe(&self) -> &[String] {
    &self.universe
  }

  pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
    (self.start, self.end)
  }

  pub fn prices(&self) -> &PriceTable {
    &self.prices
  }

  pub fn config(&self) -> &PortfolioOptimizerConfig {
    &self.config
  }

  /// Run with the configured portfolio and frontier counts.
  pub fn run(&self) -> Result<OptimizationResult> {
    self.optimize(self.config.num_portfolios, self.config.num_frontier_points)
  }

  /// Sample `num_portfolios` random portfolios, then solve `num_frontier_points` frontier
  /// targets evenly spaced over the sampled return range.
  pub fn optimize(
    &self,
    num_portfolios: usize,
    num_frontier_points: usize,
  ) -> Result<OptimizationResult> {
    if num_frontier_points == 0 {
      return Err(PortfolioError::invalid(
        "num_frontier_points must be at least 1",
      ));
    }

    let returns = compute_log_returns(&self.prices)?;
    let moments = returns.moments(self.config.trading_days)?;
    debug!(
      assets = moments.n_assets(),
      observations = returns.n_observations(),
      "estimated return moments"
    );

    let sample = MonteCarloSampler::new(self.config.monte_carlo.clone())
      .sample_moments(&moments, num_portfolios)?;
    let (best_metrics, best_weights) = sample.best();
    let best_weights = best_weights.to_owned();

    let (lo, hi) = sample.return_range();
    let solver = FrontierSolver::new(self.config.frontier.clone());
    let frontier = solver.solve_moments(&moments, &target_grid(lo, hi, num_frontier_points))?;
    let min_volatility = solver.min_volatility_moments(&moments)?;

    info!(
      sharpe = best_metrics.sharpe,
      expected_return = best_metrics.expected_return,
      volatility = best_metrics.volatility,
      frontier_points = frontier.len(),
      frontier_failures = frontier.failures(),
      "portfolio optimization finished"
    );

    Ok(OptimizationResult {
      assets: self.universe.clone(),
      monte_carlo: sample,
      frontier,
      min_volatility,
      best_weights,
      best_metrics,
    })
  }
}
