use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::heldout::HeldoutSplit;
use crate::sweep::{Sweep, SweepResults};
use crate::topic_modeling::{CovariateTable, FittedModel, TopicModelFitter};
use crate::vocabulary::DocumentTermMatrix;

#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    pub top_terms: usize,  // Terms per topic used by coherence and exclusivity
    pub frex_weight: f64, // Weight of exclusivity against frequency in FREX
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub document_proportion: f64,
    pub token_proportion: f64,
    pub heldout_seed: u64,
    pub diagnostics: DiagnosticsConfig,
}

/// Goodness-of-fit bundle for one topic count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub k: usize,
    pub heldout: Option<f64>,
    pub semantic_coherence: Vec<f64>, // Per topic
    pub exclusivity: Vec<f64>,        // Per topic
    pub residual_dispersion: f64,
    pub bound: f64,       // Final objective value
    pub lower_bound: f64, // Bound corrected for topic label permutations
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedFit {
    pub k: usize,
    pub reason: String,
}

/// Per-K diagnostics of a sweep. Selecting the final K is left to the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticTable {
    pub generated_at: DateTime<Utc>,
    pub records: Vec<DiagnosticRecord>,
    pub failures: Vec<FailedFit>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        DiagnosticsConfig {
            top_terms: 10,
            frex_weight: 0.7,
        }
    }
}

/// `ln(k!)`
pub fn log_factorial(k: usize) -> f64 {
    (2..=k).map(|i| (i as f64).ln()).sum()
}

/// Makes bounds comparable across topic counts: any of the `k!` topic
/// labellings reaches the same objective.
pub fn lower_bound(bound: f64, k: usize) -> f64 {
    bound + log_factorial(k)
}

/// Mimno et al. coherence over each topic's top terms, averaged over term
/// pairs: `ln((D(wi, wj) + 1) / D(wj))` with `wj` ranked above `wi`.
pub fn semantic_coherence(model: &FittedModel, dtm: &DocumentTermMatrix, top_terms: usize) -> Vec<f64> {
    let doc_frequencies = dtm.doc_frequencies();

    (0..model.k)
        .map(|topic| {
            let top: Vec<usize> = model
                .ranked_terms(topic)
                .into_iter()
                .take(top_terms)
                .collect();

            let mut total = 0.0;
            let mut pairs = 0;
            for i in 1..top.len() {
                for j in 0..i {
                    let (wi, wj) = (top[i], top[j]);
                    if doc_frequencies[wj] == 0 {
                        continue;
                    }
                    let together = dtm.co_doc_frequency(wi, wj) as f64;
                    total += ((together + 1.0) / doc_frequencies[wj] as f64).ln();
                    pairs += 1;
                }
            }

            if pairs > 0 {
                total / pairs as f64
            } else {
                0.0
            }
        })
        .collect()
}

/// Empirical CDF value of each element, averaging ranks on ties.
fn ecdf_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start;
        while end + 1 < n && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }

        // 1-based ranks start..=end share their average
        let average = (start + end) as f64 / 2.0 + 1.0;
        for &index in &order[start..=end] {
            ranks[index] = average / n as f64;
        }
        start = end + 1;
    }

    ranks
}

/// FREX exclusivity summed over each topic's top terms.
pub fn exclusivity(model: &FittedModel, top_terms: usize, frex_weight: f64) -> Vec<f64> {
    let n_terms = model.n_terms();
    let term_totals: Vec<f64> = (0..n_terms)
        .map(|v| model.beta.iter().map(|topic| topic[v]).sum())
        .collect();

    (0..model.k)
        .map(|topic| {
            let row = &model.beta[topic];
            let shares: Vec<f64> = row
                .iter()
                .zip(&term_totals)
                .map(|(p, total)| if *total > 0.0 { p / total } else { 0.0 })
                .collect();

            let exclusive = ecdf_ranks(&shares);
            let frequent = ecdf_ranks(row);

            model
                .ranked_terms(topic)
                .into_iter()
                .take(top_terms)
                .map(|v| 1.0 / (frex_weight / exclusive[v] + (1.0 - frex_weight) / frequent[v]))
                .sum()
        })
        .collect()
}

/// Taddy's dispersion estimate: the sum over cells of
/// `(x - m)^2 / (m (1 - q))` divided by the residual degrees of freedom.
/// Values well above one indicate overdispersion.
pub fn residual_dispersion(model: &FittedModel, dtm: &DocumentTermMatrix) -> f64 {
    let n_docs = dtm.n_docs();
    let n_terms = dtm.n_terms();
    let k = model.k;

    let mut statistic = 0.0;
    let mut observed = vec![0.0; n_terms];

    for d in 0..n_docs {
        let length = dtm.row_total(d) as f64;
        observed.iter_mut().for_each(|x| *x = 0.0);
        for &(v, count) in dtm.row(d) {
            observed[v] = count as f64;
        }

        for (v, &x) in observed.iter().enumerate() {
            let q = model.term_probability(d, v);
            let expected = length * q;
            if expected > 0.0 && q < 1.0 {
                statistic += (x - expected).powi(2) / (expected * (1.0 - q));
            }
        }
    }

    let cells = (n_docs * n_terms) as f64;
    let parameters = (n_docs * k.saturating_sub(1) + k * n_terms.saturating_sub(1)) as f64;
    let freedom = if cells > parameters { cells - parameters } else { cells };

    statistic / freedom
}

/// Computes every diagnostic of one model fitted on `split.training`.
pub fn diagnose(model: &FittedModel, split: &HeldoutSplit, config: &DiagnosticsConfig) -> DiagnosticRecord {
    let dtm = &split.training;
    let bound = model.bound();

    DiagnosticRecord {
        k: model.k,
        heldout: split.evaluate(model),
        semantic_coherence: semantic_coherence(model, dtm, config.top_terms),
        exclusivity: exclusivity(model, config.top_terms, config.frex_weight),
        residual_dispersion: residual_dispersion(model, dtm),
        bound,
        lower_bound: lower_bound(bound, model.k),
        iterations: model.iterations(),
        converged: model.converged,
    }
}

/// Diagnoses every topic count that fitted; failures are carried along.
pub fn diagnose_sweep(results: &SweepResults, split: &HeldoutSplit, config: &DiagnosticsConfig) -> DiagnosticTable {
    let records: Vec<DiagnosticRecord> = results
        .successes()
        .map(|(_, model)| diagnose(model, split, config))
        .collect();

    let failures: Vec<FailedFit> = results
        .failures()
        .map(|(k, err)| FailedFit {
            k,
            reason: err.to_string(),
        })
        .collect();

    if !failures.is_empty() {
        warn!("{} topic counts failed and have no diagnostics", failures.len());
    }
    info!("computed diagnostics for {} topic counts", records.len());

    DiagnosticTable {
        generated_at: Utc::now(),
        records,
        failures,
    }
}

/// Heldout split, sweep on the training matrix, then diagnostics.
pub fn search_k<F: TopicModelFitter>(
    fitter: &F,
    sweep: &Sweep,
    dtm: &DocumentTermMatrix,
    covariates: &CovariateTable,
    topic_counts: &[usize],
    config: &SearchConfig,
) -> Result<DiagnosticTable, PipelineError> {
    let split = HeldoutSplit::make(
        dtm,
        config.document_proportion,
        config.token_proportion,
        config.heldout_seed,
    );

    let results = sweep.run(fitter, &split.training, covariates, topic_counts);
    if results.successes().next().is_none() {
        return Err(PipelineError::EmptySweep(topic_counts.to_vec()));
    }

    Ok(diagnose_sweep(&results, &split, &config.diagnostics))
}

impl DiagnosticRecord {
    fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    pub fn mean_coherence(&self) -> f64 {
        Self::mean(&self.semantic_coherence)
    }

    pub fn mean_exclusivity(&self) -> f64 {
        Self::mean(&self.exclusivity)
    }
}

impl DiagnosticTable {
    pub fn record(&self, k: usize) -> Option<&DiagnosticRecord> {
        self.records.iter().find(|record| record.k == k)
    }

    /// `(k, mean coherence, mean exclusivity)` for the coherence/exclusivity
    /// scatter.
    pub fn coherence_exclusivity_points(&self) -> Vec<(usize, f64, f64)> {
        self.records
            .iter()
            .map(|record| (record.k, record.mean_coherence(), record.mean_exclusivity()))
            .collect()
    }

    pub fn print_summary(&self) {
        println!("📊 Diagnostics generated at {}", self.generated_at.to_rfc3339());
        println!(
            "   {:>4} {:>12} {:>12} {:>12} {:>12} {:>14} {:>6}",
            "K", "heldout", "coherence", "exclusivity", "residual", "lower bound", "iters"
        );
        for record in &self.records {
            println!(
                "   {:>4} {:>12} {:>12.3} {:>12.3} {:>12.3} {:>14.1} {:>5}{}",
                record.k,
                record
                    .heldout
                    .map(|h| format!("{:.4}", h))
                    .unwrap_or_else(|| "-".to_string()),
                record.mean_coherence(),
                record.mean_exclusivity(),
                record.residual_dispersion,
                record.lower_bound,
                record.iterations,
                if record.converged { " " } else { "*" }
            );
        }
        for failure in &self.failures {
            println!("   {:>4} failed: {}", failure.k, failure.reason);
        }
    }
}
