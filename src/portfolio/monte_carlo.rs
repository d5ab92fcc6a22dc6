//! # Monte Carlo Portfolio Sampler
//!
//! $$
//! \mathbf w^{(k)}=\frac{\mathbf u^{(k)}}{\mathbf 1^\top\mathbf u^{(k)}},\quad
//! u^{(k)}_i\overset{iid}{\sim}U(0,1),\qquad
//! k^\*=\arg\max_k S\big(\mathbf w^{(k)}\big)
//! $$
//!
//! Random long-only portfolios scattered over the feasible risk/return region, with the
//! best-Sharpe draw as an approximate tangency portfolio.
//!
//! Trials run in fixed-size chunks on the rayon pool. Each chunk owns a [`StdRng`] seeded from
//! the run seed and the chunk index, so a seed reproduces the same sample set whatever the
//! thread count.

use ndarray::Array1;
use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Exp1;
use rand_distr::Uniform;
use rayon::prelude::*;
use tracing::debug;
use tracing::warn;

use super::data::ReturnTable;
use super::metrics::MarketMoments;
use super::types::MonteCarloSample;
use super::types::PortfolioMetrics;
use super::types::TRADING_DAYS;
use super::types::WeightSampling;
use crate::error::PortfolioError;
use crate::error::Result;

const SEED_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

fn splitmix64(mut z: u64) -> u64 {
  z = z.wrapping_add(SEED_GAMMA);
  z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
  z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
  z ^ (z >> 31)
}

fn chunk_seed(base: u64, chunk: usize) -> u64 {
  splitmix64(base ^ (chunk as u64).wrapping_mul(SEED_GAMMA))
}

/// Runtime configuration for [`MonteCarloSampler`].
#[derive(Clone, Debug)]
pub struct MonteCarloConfig {
  /// Run seed. `None` draws one from the thread RNG and logs it.
  pub seed: Option<u64>,
  /// Weight distribution.
  pub sampling: WeightSampling,
  /// Risk-free rate subtracted in the Sharpe ratio.
  pub risk_free: f64,
  /// Redraws allowed per trial when a draw has zero volatility.
  pub max_redraws: usize,
  /// Trials per RNG stream. Part of the reproducibility contract: the same seed and chunk
  /// size give the same sample.
  pub chunk_size: usize,
  /// Spread chunks over the rayon pool.
  pub parallel: bool,
}

impl Default for MonteCarloConfig {
  fn default() -> Self {
    Self {
      seed: None,
      sampling: WeightSampling::NormalizedUniform,
      risk_free: 0.0,
      max_redraws: 64,
      chunk_size: 4096,
      parallel: true,
    }
  }
}

#[derive(Default)]
struct Trials {
  returns: Vec<f64>,
  volatilities: Vec<f64>,
  sharpes: Vec<f64>,
  weights: Vec<f64>,
  redraws: usize,
}

impl Trials {
  fn with_capacity(len: usize, n_assets: usize) -> Self {
    Self {
      returns: Vec::with_capacity(len),
      volatilities: Vec::with_capacity(len),
      sharpes: Vec::with_capacity(len),
      weights: Vec::with_capacity(len * n_assets),
      redraws: 0,
    }
  }

  fn push(&mut self, w: &Array1<f64>, metrics: PortfolioMetrics) {
    self.returns.push(metrics.expected_return);
    self.volatilities.push(metrics.volatility);
    self.sharpes.push(metrics.sharpe);
    self.weights.extend(w.iter().copied());
  }
}

fn argmax_first(xs: &[f64]) -> usize {
  let mut best = 0;
  for (k, &x) in xs.iter().enumerate().skip(1) {
    if x > xs[best] {
      best = k;
    }
  }
  best
}

fn assemble(chunks: Vec<Trials>, n_assets: usize, seed: Option<u64>) -> Result<MonteCarloSample> {
  let total: usize = chunks.iter().map(|c| c.returns.len()).sum();
  let mut all = Trials::with_capacity(total, n_assets);

  for chunk in chunks {
    all.returns.extend(chunk.returns);
    all.volatilities.extend(chunk.volatilities);
    all.sharpes.extend(chunk.sharpes);
    all.weights.extend(chunk.weights);
    all.redraws += chunk.redraws;
  }

  if all.redraws > 0 {
    warn!(
      redraws = all.redraws,
      "discarded random portfolios with zero volatility"
    );
  }

  let best_index = argmax_first(&all.sharpes);
  let weights = Array2::from_shape_vec((total, n_assets), all.weights)
    .map_err(|e| PortfolioError::numerical(format!("weight table: {e}")))?;

  Ok(MonteCarloSample {
    returns: Array1::from(all.returns),
    volatilities: Array1::from(all.volatilities),
    sharpes: Array1::from(all.sharpes),
    weights,
    best_index,
    redraws: all.redraws,
    seed,
  })
}

/// Random-portfolio sampler over the long-only simplex.
#[derive(Clone, Debug, Default)]
pub struct MonteCarloSampler {
  config: MonteCarloConfig,
}

impl MonteCarloSampler {
  pub fn new(config: MonteCarloConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &MonteCarloConfig {
    &self.config
  }

  /// Sample `num_portfolios` random portfolios from a return table, annualizing with
  /// [`TRADING_DAYS`].
  pub fn sample(&self, returns: &ReturnTable, num_portfolios: usize) -> Result<MonteCarloSample> {
    if returns.n_assets() == 0 {
      return Err(PortfolioError::invalid("return table has no asset columns"));
    }
    let moments = returns.moments(TRADING_DAYS)?;
    self.sample_moments(&moments, num_portfolios)
  }

  /// Sample from precomputed moments using the configured seed.
  pub fn sample_moments(
    &self,
    moments: &MarketMoments,
    num_portfolios: usize,
  ) -> Result<MonteCarloSample> {
    Self::check_request(moments, num_portfolios)?;

    let seed = self.config.seed.unwrap_or_else(|| {
      let seed = rand::thread_rng().gen::<u64>();
      debug!(seed, "no monte carlo seed configured, drew one");
      seed
    });
    let chunk_size = self.config.chunk_size.max(1);
    let n_chunks = num_portfolios.div_ceil(chunk_size);

    debug!(
      num_portfolios,
      n_assets = moments.n_assets(),
      seed,
      n_chunks,
      parallel = self.config.parallel,
      "sampling random portfolios"
    );

    let run_chunk = |chunk: usize| {
      let len = chunk_size.min(num_portfolios - chunk * chunk_size);
      let mut rng = StdRng::seed_from_u64(chunk_seed(seed, chunk));
      self.draw_trials(moments, len, &mut rng)
    };

    let chunks = if self.config.parallel {
      (0..n_chunks)
        .into_par_iter()
        .map(run_chunk)
        .collect::<Result<Vec<_>>>()?
    } else {
      (0..n_chunks).map(run_chunk).collect::<Result<Vec<_>>>()?
    };

    assemble(chunks, moments.n_assets(), Some(seed))
  }

  /// Sample sequentially from a caller-supplied random engine.
  pub fn sample_with_rng<R: Rng + ?Sized>(
    &self,
    moments: &MarketMoments,
    num_portfolios: usize,
    rng: &mut R,
  ) -> Result<MonteCarloSample> {
    Self::check_request(moments, num_portfolios)?;
    let trials = self.draw_trials(moments, num_portfolios, rng)?;
    assemble(vec![trials], moments.n_assets(), None)
  }

  fn check_request(moments: &MarketMoments, num_portfolios: usize) -> Result<()> {
    if moments.n_assets() == 0 {
      return Err(PortfolioError::invalid("cannot sample portfolios of zero assets"));
    }
    if num_portfolios == 0 {
      return Err(PortfolioError::invalid("num_portfolios must be at least 1"));
    }
    Ok(())
  }

  fn draw_weights<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Option<Array1<f64>> {
    let raw: Array1<f64> = match self.config.sampling {
      WeightSampling::NormalizedUniform => Array1::random_using(n, Uniform::new(0.0, 1.0), rng),
      WeightSampling::FlatDirichlet => Array1::random_using(n, Exp1, rng),
    };

    let total = raw.sum();
    if total > 0.0 && total.is_finite() {
      Some(raw / total)
    } else {
      None
    }
  }

  fn draw_trials<R: Rng + ?Sized>(
    &self,
    moments: &MarketMoments,
    len: usize,
    rng: &mut R,
  ) -> Result<Trials> {
    let n = moments.n_assets();
    let mut trials = Trials::with_capacity(len, n);

    for _ in 0..len {
      let mut attempts = 0;
      loop {
        let drawn = self
          .draw_weights(n, rng)
          .map(|w| {
            let metrics = moments.evaluate(w.view(), self.config.risk_free);
            (w, metrics)
          });

        if let Some((w, Ok(metrics))) = drawn {
          trials.push(&w, metrics);
          break;
        }

        attempts += 1;
        trials.redraws += 1;
        if attempts > self.config.max_redraws {
          return Err(PortfolioError::numerical(format!(
            "no portfolio with positive volatility after {attempts} draws"
          )));
        }
      }
    }

    Ok(trials)
  }
}
