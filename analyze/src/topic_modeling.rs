use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{FitError, VocabularyError};
use crate::models::{Corpus, Document};
use crate::vocabulary::DocumentTermMatrix;

/// Covariates of the matrix rows, in matrix row order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovariateTable {
    pub doc_ids: Vec<u64>,
    pub years: Vec<i32>,
    pub main_concepts: Vec<String>,
}

/// Result of fitting one topic count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub k: usize,
    pub beta: Vec<Vec<f64>>,  // Topics x terms, rows sum to one
    pub theta: Vec<Vec<f64>>, // Documents x topics, rows sum to one
    pub gamma: Vec<Vec<f64>>, // Covariates x topics prevalence effects
    pub covariate_names: Vec<String>,
    pub trace: Vec<f64>, // Objective value per iteration
    pub converged: bool,
    pub seed: u64,
}

/// A topic-model fitting primitive. Implementations must be deterministic
/// for a given seed.
pub trait TopicModelFitter: Sync {
    fn fit(
        &self,
        dtm: &DocumentTermMatrix,
        covariates: &CovariateTable,
        k: usize,
        seed: u64,
    ) -> Result<FittedModel, FitError>;
}

#[derive(Debug, Clone)]
pub struct EmConfig {
    pub max_iterations: usize,
    pub tolerance: f64,           // Relative objective change that counts as converged
    pub prior_concentration: f64, // Weight of the covariate prior on topic proportions
    pub term_smoothing: f64,      // Pseudo-count added to every topic-term cell
    pub covariate_penalty: f64,   // L1 strength on non-intercept prevalence effects
    pub prior_sweeps: usize,      // Coordinate descent passes per iteration
}

impl Default for EmConfig {
    fn default() -> Self {
        EmConfig {
            max_iterations: 500,
            tolerance: 1e-5,
            prior_concentration: 1.0,
            term_smoothing: 0.01,
            covariate_penalty: 0.05,
            prior_sweeps: 5,
        }
    }
}

/// EM topic model whose per-document topic prior is `softmax(x_d . gamma)`,
/// with `x_d` holding an intercept, the standardized year and one-hot main
/// concepts. Prevalence effects are re-estimated each iteration by
/// L1-penalized coordinate descent.
pub struct CovariateEm {
    config: EmConfig,
}

impl CovariateTable {
    /// Lines covariates up with the matrix rows. Every row needs a document
    /// and every document needs both covariate values.
    pub fn align(dtm: &DocumentTermMatrix, corpus: &Corpus) -> Result<Self, VocabularyError> {
        let by_id: HashMap<u64, &Document> =
            corpus.documents.iter().map(|doc| (doc.id, doc)).collect();

        let mut years = Vec::with_capacity(dtm.n_docs());
        let mut main_concepts = Vec::with_capacity(dtm.n_docs());
        let mut incomplete = 0;

        for id in dtm.doc_ids() {
            let doc = by_id
                .get(id)
                .ok_or(VocabularyError::MissingCovariateRow(*id))?;

            if !doc.covariates.is_complete() {
                incomplete += 1;
                continue;
            }
            if let (Some(year), Some(concept)) = (doc.covariates.year, &doc.covariates.main_concept) {
                years.push(year);
                main_concepts.push(concept.clone());
            }
        }

        if incomplete > 0 {
            warn!("{} matrix documents are missing covariate values", incomplete);
            return Err(VocabularyError::IncompleteCovariates(incomplete));
        }

        Ok(CovariateTable {
            doc_ids: dtm.doc_ids().to_vec(),
            years,
            main_concepts,
        })
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Concept levels in sorted order; the first one is the reference level.
    pub fn concept_levels(&self) -> Vec<String> {
        self.main_concepts
            .iter()
            .cloned()
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }

    /// Rows of `[1, standardized year, one-hot concept...]` and their names.
    pub fn design_matrix(&self) -> (Vec<Vec<f64>>, Vec<String>) {
        let levels = self.concept_levels();
        let n = self.len().max(1) as f64;

        let mean = self.years.iter().map(|&y| y as f64).sum::<f64>() / n;
        let variance = self
            .years
            .iter()
            .map(|&y| (y as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        let sd = variance.sqrt();

        let mut names = vec!["(Intercept)".to_string(), "year".to_string()];
        names.extend(levels.iter().skip(1).map(|level| format!("concept:{}", level)));

        let rows = self
            .years
            .iter()
            .zip(&self.main_concepts)
            .map(|(&year, concept)| {
                let mut row = vec![1.0, if sd > 0.0 { (year as f64 - mean) / sd } else { 0.0 }];
                row.extend(
                    levels
                        .iter()
                        .skip(1)
                        .map(|level| if level == concept { 1.0 } else { 0.0 }),
                );
                row
            })
            .collect();

        (rows, names)
    }
}

impl FittedModel {
    pub fn iterations(&self) -> usize {
        self.trace.len()
    }

    /// Final objective value, or negative infinity for an empty trace.
    pub fn bound(&self) -> f64 {
        self.trace.last().copied().unwrap_or(f64::NEG_INFINITY)
    }

    pub fn n_docs(&self) -> usize {
        self.theta.len()
    }

    pub fn n_terms(&self) -> usize {
        self.beta.first().map(|row| row.len()).unwrap_or(0)
    }

    /// Term indices of a topic by decreasing probability, ties by index.
    pub fn ranked_terms(&self, topic: usize) -> Vec<usize> {
        let row = &self.beta[topic];
        let mut order: Vec<usize> = (0..row.len()).collect();
        order.sort_by(|&a, &b| row[b].total_cmp(&row[a]).then(a.cmp(&b)));
        order
    }

    /// Model-implied probability of a term in a document.
    pub fn term_probability(&self, doc: usize, term: usize) -> f64 {
        self.theta[doc]
            .iter()
            .zip(&self.beta)
            .map(|(share, topic)| share * topic[term])
            .sum()
    }
}

impl CovariateEm {
    pub fn new(config: EmConfig) -> Self {
        CovariateEm { config }
    }

    fn check_inputs(
        &self,
        dtm: &DocumentTermMatrix,
        covariates: &CovariateTable,
        k: usize,
    ) -> Result<(), FitError> {
        let degenerate = |reason: &str| FitError::Degenerate {
            k,
            reason: reason.to_string(),
        };

        if dtm.n_docs() == 0 || dtm.n_terms() == 0 {
            return Err(degenerate("document-term matrix is empty"));
        }
        if k < 2 {
            return Err(degenerate("at least two topics are required"));
        }
        if k > dtm.n_terms() {
            return Err(degenerate("more topics than vocabulary terms"));
        }
        if dtm.rows().iter().any(|row| row.is_empty()) {
            return Err(degenerate("matrix has an empty document"));
        }
        if covariates.len() != dtm.n_docs() {
            return Err(FitError::CovariateRows {
                covariates: covariates.len(),
                documents: dtm.n_docs(),
            });
        }

        Ok(())
    }

    fn initial_beta(&self, dtm: &DocumentTermMatrix, k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
        let totals = dtm.column_totals();

        let mut beta: Vec<Vec<f64>> = (0..k)
            .map(|_| {
                totals
                    .iter()
                    .map(|&total| (total as f64 + 1.0) * rng.gen_range(0.5..1.5))
                    .collect()
            })
            .collect();

        Self::normalize_rows(&mut beta);
        beta
    }

    fn normalize_rows(rows: &mut [Vec<f64>]) {
        for row in rows.iter_mut() {
            let sum: f64 = row.iter().sum();
            if sum > 0.0 {
                row.iter_mut().for_each(|value| *value /= sum);
            }
        }
    }

    fn softmax(logits: &[f64]) -> Vec<f64> {
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
        let sum: f64 = exp.iter().sum();
        exp.into_iter().map(|e| e / sum).collect()
    }

    fn prior_means(design: &[Vec<f64>], gamma: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
        design
            .iter()
            .map(|x| {
                let logits: Vec<f64> = (0..k)
                    .map(|topic| x.iter().zip(gamma).map(|(xj, g)| xj * g[topic]).sum())
                    .collect();
                Self::softmax(&logits)
            })
            .collect()
    }

    fn soft_threshold(value: f64, lambda: f64) -> f64 {
        if value > lambda {
            value - lambda
        } else if value < -lambda {
            value + lambda
        } else {
            0.0
        }
    }

    /// Lasso regression of centered log topic proportions on the design,
    /// warm-started from the previous effects. The intercept is unpenalized.
    fn update_prevalence(&self, design: &[Vec<f64>], theta: &[Vec<f64>], gamma: &mut [Vec<f64>]) {
        let n = design.len() as f64;
        let p = gamma.len();
        let k = theta.first().map(|row| row.len()).unwrap_or(0);

        let targets: Vec<Vec<f64>> = theta
            .iter()
            .map(|shares| {
                let logs: Vec<f64> = shares.iter().map(|s| s.ln()).collect();
                let mean = logs.iter().sum::<f64>() / logs.len() as f64;
                logs.into_iter().map(|l| l - mean).collect()
            })
            .collect();

        let scale: Vec<f64> = (0..p)
            .map(|j| design.iter().map(|x| x[j] * x[j]).sum::<f64>() / n)
            .collect();

        for topic in 0..k {
            for _ in 0..self.config.prior_sweeps {
                for j in 0..p {
                    if scale[j] == 0.0 {
                        gamma[j][topic] = 0.0;
                        continue;
                    }

                    let rho = design
                        .iter()
                        .zip(&targets)
                        .map(|(x, y)| {
                            let partial: f64 = (0..p)
                                .filter(|&l| l != j)
                                .map(|l| x[l] * gamma[l][topic])
                                .sum();
                            x[j] * (y[topic] - partial)
                        })
                        .sum::<f64>()
                        / n;

                    gamma[j][topic] = if j == 0 {
                        rho / scale[j]
                    } else {
                        Self::soft_threshold(rho, self.config.covariate_penalty) / scale[j]
                    };
                }
            }
        }
    }

    fn penalty(&self, gamma: &[Vec<f64>]) -> f64 {
        self.config.covariate_penalty
            * gamma
                .iter()
                .skip(1)
                .flatten()
                .map(|g| g.abs())
                .sum::<f64>()
    }
}

impl TopicModelFitter for CovariateEm {
    fn fit(
        &self,
        dtm: &DocumentTermMatrix,
        covariates: &CovariateTable,
        k: usize,
        seed: u64,
    ) -> Result<FittedModel, FitError> {
        self.check_inputs(dtm, covariates, k)?;

        let n_docs = dtm.n_docs();
        let n_terms = dtm.n_terms();
        let alpha = self.config.prior_concentration;
        let eta = self.config.term_smoothing;

        // Step 1: Initialize parameters from the seed
        let mut rng = StdRng::seed_from_u64(seed);
        let (design, covariate_names) = covariates.design_matrix();
        let mut beta = self.initial_beta(dtm, k, &mut rng);
        let mut theta = vec![vec![1.0 / k as f64; k]; n_docs];
        let mut gamma = vec![vec![0.0; k]; covariate_names.len()];
        let mut mu = Self::prior_means(&design, &gamma, k);

        let mut trace: Vec<f64> = Vec::new();
        let mut converged = false;

        for iteration in 0..self.config.max_iterations {
            // Step 2: Expected topic assignments of every token
            let mut doc_topic = vec![vec![0.0; k]; n_docs];
            let mut topic_term = vec![vec![0.0; n_terms]; k];
            let mut log_likelihood = 0.0;
            let mut responsibilities = vec![0.0; k];

            for d in 0..n_docs {
                for &(v, count) in dtm.row(d) {
                    let count = count as f64;
                    let mut sum = 0.0;
                    for topic in 0..k {
                        responsibilities[topic] = theta[d][topic] * beta[topic][v];
                        sum += responsibilities[topic];
                    }

                    if !(sum > 0.0 && sum.is_finite()) {
                        return Err(FitError::Numerical { k, iteration });
                    }

                    log_likelihood += count * sum.ln();
                    for topic in 0..k {
                        let weight = count * responsibilities[topic] / sum;
                        doc_topic[d][topic] += weight;
                        topic_term[topic][v] += weight;
                    }
                }
            }

            // Step 3: Objective of the current parameters
            let prior: f64 = mu
                .iter()
                .zip(&theta)
                .map(|(means, shares)| {
                    means
                        .iter()
                        .zip(shares)
                        .map(|(m, s)| alpha * m * s.ln())
                        .sum::<f64>()
                })
                .sum();
            let objective = log_likelihood + prior - self.penalty(&gamma);

            if !objective.is_finite() {
                return Err(FitError::Numerical { k, iteration });
            }

            let previous = trace.last().copied();
            trace.push(objective);

            if let Some(previous) = previous {
                if ((objective - previous) / previous.abs().max(f64::MIN_POSITIVE)).abs()
                    < self.config.tolerance
                {
                    converged = true;
                    break;
                }
            }

            // Step 4: Topic-term distributions
            for (topic, row) in topic_term.iter().enumerate() {
                let total: f64 = row.iter().sum::<f64>() + n_terms as f64 * eta;
                for v in 0..n_terms {
                    beta[topic][v] = (row[v] + eta) / total;
                }
            }

            // Step 5: Topic proportions shrunk toward the covariate prior
            for d in 0..n_docs {
                let length = dtm.row_total(d) as f64;
                for topic in 0..k {
                    theta[d][topic] = (doc_topic[d][topic] + alpha * mu[d][topic]) / (length + alpha);
                }
            }

            // Step 6: Prevalence effects and the prior they imply
            self.update_prevalence(&design, &theta, &mut gamma);
            mu = Self::prior_means(&design, &gamma, k);
        }

        if converged {
            debug!("K={} converged after {} iterations", k, trace.len());
        } else {
            debug!(
                "K={} stopped at the iteration budget ({}) without converging",
                k,
                trace.len()
            );
        }

        Ok(FittedModel {
            k,
            beta,
            theta,
            gamma,
            covariate_names,
            trace,
            converged,
            seed,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Covariates;

    /// Two clearly separated vocabularies across six documents.
    pub(crate) fn fixture() -> (DocumentTermMatrix, CovariateTable) {
        let terms: Vec<String> = ["app", "feed", "like", "parent", "school", "teen"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        let rows = vec![
            vec![(0, 4), (1, 3), (2, 5)],
            vec![(0, 3), (1, 4), (2, 2), (5, 1)],
            vec![(0, 5), (1, 2), (2, 3)],
            vec![(3, 4), (4, 5), (5, 3)],
            vec![(2, 1), (3, 3), (4, 4), (5, 5)],
            vec![(3, 5), (4, 2), (5, 4)],
        ];
        let dtm = DocumentTermMatrix::from_rows((1..=6).collect(), terms, rows)
            .expect("fixture rows are valid");
        let covariates = CovariateTable {
            doc_ids: (1..=6).collect(),
            years: vec![2010, 2012, 2014, 2016, 2018, 2020],
            main_concepts: ["Psychology", "Psychology", "Sociology", "Sociology", "Psychology", "Sociology"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        };
        (dtm, covariates)
    }

    fn fitter() -> CovariateEm {
        CovariateEm::new(EmConfig {
            max_iterations: 200,
            ..Default::default()
        })
    }

    fn document(id: u64, year: Option<i32>, concept: Option<&str>) -> Document {
        Document {
            id,
            raw_text: String::new(),
            normalized_text: String::new(),
            lemmatized_text: String::new(),
            covariates: Covariates {
                year,
                main_concept: concept.map(|c| c.to_string()),
                concepts: vec![],
            },
        }
    }

    #[test]
    fn it_fits_normalized_distributions() {
        let (dtm, covariates) = fixture();

        let model = fitter().fit(&dtm, &covariates, 2, 42).expect("fit succeeds");

        assert_eq!(model.k, 2);
        assert_eq!(model.beta.len(), 2);
        assert_eq!(model.theta.len(), 6);
        for row in model.beta.iter().chain(model.theta.iter()) {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
        assert_eq!(model.covariate_names, vec!["(Intercept)", "year", "concept:Sociology"]);
        assert!(model.iterations() > 1);
    }

    #[test]
    fn it_separates_distinct_vocabularies() {
        let (dtm, covariates) = fixture();

        let model = fitter().fit(&dtm, &covariates, 2, 7).expect("fit succeeds");
        let dominant = |d: usize| if model.theta[d][0] >= model.theta[d][1] { 0 } else { 1 };

        assert_eq!(dominant(0), dominant(2));
        assert_eq!(dominant(3), dominant(5));
        assert_ne!(dominant(0), dominant(3));
    }

    #[test]
    fn it_is_deterministic_for_a_seed() {
        let (dtm, covariates) = fixture();

        let first = fitter().fit(&dtm, &covariates, 3, 1234).expect("fit succeeds");
        let second = fitter().fit(&dtm, &covariates, 3, 1234).expect("fit succeeds");

        assert_eq!(first, second);
    }

    #[test]
    fn it_returns_unconverged_model_at_iteration_budget() {
        let (dtm, covariates) = fixture();
        let fitter = CovariateEm::new(EmConfig {
            max_iterations: 2,
            tolerance: 1e-300,
            ..Default::default()
        });

        let model = fitter.fit(&dtm, &covariates, 2, 1).expect("fit still succeeds");

        assert!(!model.converged);
        assert_eq!(model.iterations(), 2);
        assert_eq!(model.bound(), model.trace[1]);
    }

    #[test]
    fn it_rejects_degenerate_inputs() {
        let (dtm, covariates) = fixture();

        assert!(matches!(
            fitter().fit(&dtm, &covariates, 7, 1),
            Err(FitError::Degenerate { k: 7, .. })
        ));
        assert!(matches!(
            fitter().fit(&dtm, &covariates, 1, 1),
            Err(FitError::Degenerate { k: 1, .. })
        ));

        let mut short = covariates.clone();
        short.doc_ids.pop();
        short.years.pop();
        short.main_concepts.pop();
        assert!(matches!(
            fitter().fit(&dtm, &short, 2, 1),
            Err(FitError::CovariateRows { covariates: 5, documents: 6 })
        ));
    }

    #[test]
    fn it_shrinks_small_effects_to_zero() {
        assert_eq!(CovariateEm::soft_threshold(0.03, 0.05), 0.0);
        assert!((CovariateEm::soft_threshold(0.08, 0.05) - 0.03).abs() < 1e-12);
        assert!((CovariateEm::soft_threshold(-0.08, 0.05) + 0.03).abs() < 1e-12);
    }

    #[test]
    fn it_builds_design_matrix() {
        let covariates = CovariateTable {
            doc_ids: vec![1, 2],
            years: vec![2000, 2002],
            main_concepts: vec!["Sociology".to_string(), "Psychology".to_string()],
        };

        let (rows, names) = covariates.design_matrix();

        assert_eq!(names, vec!["(Intercept)", "year", "concept:Sociology"]);
        assert_eq!(rows, vec![vec![1.0, -1.0, 1.0], vec![1.0, 1.0, 0.0]]);
    }

    #[test]
    fn it_aligns_covariates_with_matrix_rows() {
        let (dtm, _) = fixture();
        let corpus = Corpus::new(
            (1..=6)
                .rev()
                .map(|id| document(id, Some(2000 + id as i32), Some("Sociology")))
                .collect(),
        );

        let table = CovariateTable::align(&dtm, &corpus).expect("aligned");

        assert_eq!(table.doc_ids, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(table.years, vec![2001, 2002, 2003, 2004, 2005, 2006]);
    }

    #[test]
    fn it_reports_rows_without_covariates() {
        let (dtm, _) = fixture();
        let corpus = Corpus::new((1..=5).map(|id| document(id, Some(2000), Some("A"))).collect());

        assert!(matches!(
            CovariateTable::align(&dtm, &corpus),
            Err(VocabularyError::MissingCovariateRow(6))
        ));

        let mut documents: Vec<Document> =
            (1..=6).map(|id| document(id, Some(2000), Some("A"))).collect();
        documents[1].covariates.year = None;
        documents[4].covariates.main_concept = None;

        assert!(matches!(
            CovariateTable::align(&dtm, &Corpus::new(documents)),
            Err(VocabularyError::IncompleteCovariates(2))
        ));
    }
}
