//! # markowitz-rs
//!
//! $$
//! \min_{\mathbf w\ge 0,\ \mathbf 1^\top\mathbf w=1}\ \mathbf w^\top\Sigma\mathbf w
//! \quad\text{s.t.}\quad \mathbb E[R_p]=\tau
//! $$
//!
//! Markowitz efficient frontier and maximum-Sharpe portfolio search over a table of daily
//! prices. Random long-only portfolios map the feasible risk/return region and pick an
//! approximate tangency portfolio; a constrained solver traces the exact frontier boundary.

pub mod error;
pub mod portfolio;

pub use error::PortfolioError;
pub use error::Result;
pub use portfolio::OptimizationResult;
pub use portfolio::PortfolioOptimizer;
pub use portfolio::PortfolioOptimizerConfig;
