use std::hint::black_box;

use anyhow::Context;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use markowitz_rs::portfolio::MarketMoments;
use markowitz_rs::portfolio::MonteCarloConfig;
use markowitz_rs::portfolio::MonteCarloSampler;
use markowitz_rs::portfolio::TRADING_DAYS;
use markowitz_rs::portfolio::WeightSampling;
use ndarray::Array1;
use ndarray::Array2;

const N_PORTFOLIOS: usize = 50_000;

fn moments(n: usize) -> anyhow::Result<MarketMoments> {
  let mean = Array1::from_shape_fn(n, |i| 0.0002 + 0.0001 * i as f64);
  let cov = Array2::from_shape_fn((n, n), |(i, j)| {
    if i == j {
      0.0001 * (1.0 + i as f64)
    } else {
      0.00002
    }
  });
  MarketMoments::new(mean, cov, TRADING_DAYS)
    .with_context(|| format!("bench moments for {n} assets"))
}

fn bench_sampling(c: &mut Criterion) {
  let mut group = c.benchmark_group("MonteCarlo");
  group.sample_size(10);

  for &n in &[2usize, 10, 50] {
    let moments = moments(n).expect("bench moments");

    for (label, parallel) in [("sequential", false), ("rayon", true)] {
      let sampler = MonteCarloSampler::new(MonteCarloConfig {
        seed: Some(42),
        parallel,
        ..MonteCarloConfig::default()
      });
      group.bench_with_input(BenchmarkId::new(label, n), &n, |b, _| {
        b.iter(|| black_box(sampler.sample_moments(&moments, N_PORTFOLIOS)))
      });
    }
  }

  group.finish();
}

fn bench_weight_sampling(c: &mut Criterion) {
  let mut group = c.benchmark_group("WeightSampling");
  group.sample_size(10);

  let moments = moments(10).expect("bench moments");
  for sampling in [WeightSampling::NormalizedUniform, WeightSampling::FlatDirichlet] {
    let sampler = MonteCarloSampler::new(MonteCarloConfig {
      seed: Some(7),
      sampling,
      ..MonteCarloConfig::default()
    });
    group.bench_function(format!("{sampling:?}"), |b| {
      b.iter(|| black_box(sampler.sample_moments(&moments, N_PORTFOLIOS)))
    });
  }

  group.finish();
}

criterion_group!(benches, bench_sampling, bench_weight_sampling);
criterion_main!(benches);
