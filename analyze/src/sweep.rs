use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use crate::error::FitError;
use crate::topic_modeling::{CovariateTable, FittedModel, TopicModelFitter};
use crate::vocabulary::DocumentTermMatrix;

pub static THREAD_NAME_SWEEP_WORKER: &str = "topics-sweep-worker";

/// Fits one model per topic count on a fixed-size worker pool.
pub struct Sweep {
    pool: ThreadPool,
    seed: u64,
}

/// Partial mapping from topic count to fitted model or fit failure.
#[derive(Debug, Default)]
pub struct SweepResults {
    results: BTreeMap<usize, Result<FittedModel, FitError>>,
}

impl Sweep {
    pub fn new(workers: usize, seed: u64) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("{}-{}", THREAD_NAME_SWEEP_WORKER, i))
            .build()?;

        Ok(Sweep { pool, seed })
    }

    /// Blocks until every topic count is fitted. A failing or panicking fit
    /// only loses its own topic count.
    pub fn run<F: TopicModelFitter>(
        &self,
        fitter: &F,
        dtm: &DocumentTermMatrix,
        covariates: &CovariateTable,
        topic_counts: &[usize],
    ) -> SweepResults {
        let total = topic_counts.len();
        let completed = AtomicUsize::new(0);

        info!(
            "sweeping {} topic counts on {} workers",
            total,
            self.pool.current_num_threads()
        );

        let fitted: Vec<(usize, Result<FittedModel, FitError>)> = self.pool.install(|| {
            topic_counts
                .par_iter()
                .map(|&k| {
                    let result = Self::fit_one(fitter, dtm, covariates, k, self.seed);
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;

                    match &result {
                        Ok(model) => info!(
                            "[{}/{}] fitted K={} in {} iterations{}",
                            done,
                            total,
                            k,
                            model.iterations(),
                            if model.converged { "" } else { " (not converged)" }
                        ),
                        Err(err) => warn!("[{}/{}] {}", done, total, err),
                    }

                    (k, result)
                })
                .collect()
        });

        SweepResults {
            results: fitted.into_iter().collect(),
        }
    }

    fn fit_one<F: TopicModelFitter>(
        fitter: &F,
        dtm: &DocumentTermMatrix,
        covariates: &CovariateTable,
        k: usize,
        seed: u64,
    ) -> Result<FittedModel, FitError> {
        panic::catch_unwind(AssertUnwindSafe(|| fitter.fit(dtm, covariates, k, seed)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "fit panicked".to_string());

                Err(FitError::Aborted { k, message })
            })
    }
}

impl SweepResults {
    pub fn get(&self, k: usize) -> Option<&Result<FittedModel, FitError>> {
        self.results.get(&k)
    }

    pub fn model(&self, k: usize) -> Option<&FittedModel> {
        self.results.get(&k).and_then(|result| result.as_ref().ok())
    }

    pub fn topic_counts(&self) -> Vec<usize> {
        self.results.keys().copied().collect()
    }

    pub fn successes(&self) -> impl Iterator<Item = (usize, &FittedModel)> {
        self.results
            .iter()
            .filter_map(|(&k, result)| result.as_ref().ok().map(|model| (k, model)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &FitError)> {
        self.results
            .iter()
            .filter_map(|(&k, result)| result.as_ref().err().map(|err| (k, err)))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
