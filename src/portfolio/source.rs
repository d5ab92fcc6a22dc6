//! # Price Sources
//!
//! $$
//! (\mathcal U,\ [t_0,t_1])\ \mapsto\ P\in\mathbb R_{>0}^{T\times N}
//! $$
//!
//! Input boundary of the optimizer. Fetching, caching and cleaning market data live behind
//! [`PriceSource`]; the core only sees the aligned table it returns.

use chrono::NaiveDate;
use impl_new_derive::ImplNew;

use super::data::PriceTable;
use crate::error::Result;

/// Provider of aligned price tables.
pub trait PriceSource {
  /// Prices for `universe` (columns in that order) over the closed interval `[start, end]`.
  fn fetch(&self, universe: &[String], start: NaiveDate, end: NaiveDate) -> Result<PriceTable>;
}

/// Serves windows and column subsets of a table already in memory.
#[derive(ImplNew, Clone, Debug)]
pub struct InMemoryPriceSource {
  pub table: PriceTable,
}

impl PriceSource for InMemoryPriceSource {
  fn fetch(&self, universe: &[String], start: NaiveDate, end: NaiveDate) -> Result<PriceTable> {
    self.table.select(universe)?.window(start, end)
  }
}
