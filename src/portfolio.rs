//! # Portfolio
//!
//! $$
//! \sigma_p^2=\mathbf w^\top\Sigma\mathbf w,\qquad \mathbf w\in\Delta_N
//! $$
//!
//! Long-only mean-variance analysis: price and return tables, random-portfolio sampling,
//! the efficient frontier and the pipeline tying them together.

pub mod data;
pub mod engine;
pub mod frontier;
pub mod metrics;
pub mod monte_carlo;
mod qp;
pub mod source;
pub mod types;

pub use data::PriceTable;
pub use data::ReturnTable;
pub use data::compute_log_returns;
pub use engine::PortfolioOptimizer;
pub use engine::PortfolioOptimizerConfig;
pub use frontier::FrontierConfig;
pub use frontier::FrontierSolver;
pub use frontier::target_grid;
pub use metrics::MarketMoments;
pub use monte_carlo::MonteCarloConfig;
pub use monte_carlo::MonteCarloSampler;
pub use source::InMemoryPriceSource;
pub use source::PriceSource;
pub use types::Frontier;
pub use types::FrontierPoint;
pub use types::MonteCarloSample;
pub use types::OptimizationResult;
pub use types::PortfolioMetrics;
pub use types::SolveStatus;
pub use types::TRADING_DAYS;
pub use types::WeightSampling;
