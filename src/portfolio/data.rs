//! # Portfolio Data
//!
//! $$
//! r_{t,i}=\ln\frac{p_{t,i}}{p_{t-1,i}},\qquad
//! \Sigma_{ij}=\frac{1}{T-1}\sum_t (r_{t,i}-\bar r_i)(r_{t,j}-\bar r_j)
//! $$
//!
//! Price and log-return tables and the sample moments derived from them.

use std::collections::HashSet;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray::s;
use ndarray_stats::CorrelationExt;

use super::metrics::MarketMoments;
use crate::error::PortfolioError;
use crate::error::Result;

fn check_universe(assets: &[String]) -> Result<()> {
  let mut seen = HashSet::with_capacity(assets.len());
  for asset in assets {
    if !seen.insert(asset.as_str()) {
      return Err(PortfolioError::invalid(format!(
        "asset '{asset}' appears more than once in the universe"
      )));
    }
  }
  Ok(())
}

fn check_dates(dates: &[NaiveDate]) -> Result<()> {
  match dates.windows(2).find(|pair| pair[0] >= pair[1]) {
    Some(pair) => Err(PortfolioError::invalid(format!(
      "dates must be strictly ascending, found {} before {}",
      pair[0], pair[1]
    ))),
    None => Ok(()),
  }
}

fn check_shape(rows: usize, cols: usize, dates: &[NaiveDate], assets: &[String]) -> Result<()> {
  if rows != dates.len() || cols != assets.len() {
    return Err(PortfolioError::invalid(format!(
      "table is {rows}x{cols} but {} dates and {} assets were given",
      dates.len(),
      assets.len()
    )));
  }
  Ok(())
}

fn check_prices(prices: &Array2<f64>, dates: &[NaiveDate], assets: &[String]) -> Result<()> {
  match prices
    .indexed_iter()
    .find(|(_, p)| !(p.is_finite() && **p > 0.0))
  {
    Some(((t, i), p)) => Err(PortfolioError::invalid(format!(
      "price {p} for asset '{}' on {} is not strictly positive",
      assets[i], dates[t]
    ))),
    None => Ok(()),
  }
}

/// Aligned close prices: one row per trading date, one column per asset.
/// Every price is finite and strictly positive.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceTable {
  assets: Vec<String>,
  dates: Vec<NaiveDate>,
  prices: Array2<f64>,
}

impl PriceTable {
  /// Build a table, checking matching shape, distinct assets, strictly ascending dates and
  /// strictly positive prices.
  pub fn new(assets: Vec<String>, dates: Vec<NaiveDate>, prices: Array2<f64>) -> Result<Self> {
    check_shape(prices.nrows(), prices.ncols(), &dates, &assets)?;
    check_universe(&assets)?;
    check_dates(&dates)?;
    check_prices(&prices, &dates, &assets)?;

    Ok(Self {
      assets,
      dates,
      prices,
    })
  }

  /// Build a table from per-asset price columns of equal length.
  pub fn from_columns(dates: Vec<NaiveDate>, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
    let rows = dates.len();
    let mut prices = Array2::<f64>::zeros((rows, columns.len()));
    let mut assets = Vec::with_capacity(columns.len());

    for (j, (asset, column)) in columns.into_iter().enumerate() {
      if column.len() != rows {
        return Err(PortfolioError::invalid(format!(
          "column '{asset}' has {} prices for {rows} dates",
          column.len()
        )));
      }
      prices.column_mut(j).assign(&Array1::from(column));
      assets.push(asset);
    }

    Self::new(assets, dates, prices)
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn prices(&self) -> &Array2<f64> {
    &self.prices
  }

  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  pub fn n_dates(&self) -> usize {
    self.dates.len()
  }

  /// Rows dated inside the closed interval `[start, end]`.
  pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Result<Self> {
    if start > end {
      return Err(PortfolioError::invalid(format!(
        "window start {start} is after end {end}"
      )));
    }

    let lo = self.dates.partition_point(|d| *d < start);
    let hi = self.dates.partition_point(|d| *d <= end);

    Ok(Self {
      assets: self.assets.clone(),
      dates: self.dates[lo..hi].to_vec(),
      prices: self.prices.slice(s![lo..hi, ..]).to_owned(),
    })
  }

  /// Columns reordered to follow `universe`.
  pub fn select(&self, universe: &[String]) -> Result<Self> {
    check_universe(universe)?;

    let indices = universe
      .iter()
      .map(|asset| {
        self
          .assets
          .iter()
          .position(|a| a == asset)
          .ok_or_else(|| PortfolioError::invalid(format!("no prices for asset '{asset}'")))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      assets: universe.to_vec(),
      dates: self.dates.clone(),
      prices: self.prices.select(Axis(1), &indices),
    })
  }
}

/// Daily log returns: one fewer row than the price table they came from.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnTable {
  assets: Vec<String>,
  dates: Vec<NaiveDate>,
  returns: Array2<f64>,
}

impl ReturnTable {
  /// Wrap precomputed returns. Every value must be finite.
  pub fn new(assets: Vec<String>, dates: Vec<NaiveDate>, returns: Array2<f64>) -> Result<Self> {
    check_shape(returns.nrows(), returns.ncols(), &dates, &assets)?;
    check_universe(&assets)?;
    check_dates(&dates)?;

    if let Some(((t, i), r)) = returns.indexed_iter().find(|(_, r)| !r.is_finite()) {
      return Err(PortfolioError::invalid(format!(
        "non-finite return {r} for asset '{}' at row {t}",
        assets[i]
      )));
    }

    Ok(Self {
      assets,
      dates,
      returns,
    })
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn returns(&self) -> &Array2<f64> {
    &self.returns
  }

  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  pub fn n_observations(&self) -> usize {
    self.returns.nrows()
  }

  /// Per-asset arithmetic mean of the daily log returns.
  pub fn mean_returns(&self) -> Result<Array1<f64>> {
    self
      .returns
      .mean_axis(Axis(0))
      .ok_or_else(|| PortfolioError::invalid("return table has no observations"))
  }

  /// Sample covariance of the daily log returns (`T - 1` denominator).
  pub fn covariance(&self) -> Result<Array2<f64>> {
    if self.n_observations() < 2 {
      return Err(PortfolioError::invalid(format!(
        "covariance needs at least 2 return observations, got {}",
        self.n_observations()
      )));
    }

    self
      .returns
      .t()
      .cov(1.0)
      .map_err(|e| PortfolioError::invalid(format!("covariance: {e}")))
  }

  /// Mean vector and covariance matrix, annualized with `trading_days`.
  pub fn moments(&self, trading_days: f64) -> Result<MarketMoments> {
    MarketMoments::new(self.mean_returns()?, self.covariance()?, trading_days)
  }
}

/// Log-difference a price table, dropping the first (undefined) row.
pub fn compute_log_returns(prices: &PriceTable) -> Result<ReturnTable> {
  let table = prices.prices();

  if table.nrows() < 2 {
    return Err(PortfolioError::invalid(format!(
      "price table needs at least 2 rows, got {}",
      table.nrows()
    )));
  }
  if table.ncols() == 0 {
    return Err(PortfolioError::invalid("price table has no asset columns"));
  }

  let prev = table.slice(s![..-1, ..]);
  let next = table.slice(s![1.., ..]);
  let returns = (&next / &prev).mapv(f64::ln);

  ReturnTable::new(
    prices.assets().to_vec(),
    prices.dates()[1..].to_vec(),
    returns,
  )
}
