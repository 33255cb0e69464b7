use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("syntax error in config file: {0}")]
    Syntax(#[from] toml::de::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid relevance pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("relevance filter needs at least one phrase or pattern")]
    NoPatterns,
}

#[derive(Debug, Error)]
pub enum LemmaError {
    #[error("lemmatizer unavailable: {0}")]
    Unavailable(String),
    #[error("lemmatizer returned {actual} annotated documents for {expected} inputs")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("malformed annotation on line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
    #[error("no annotations for document {0}")]
    MissingAnnotations(u64),
}

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("no terms survived vocabulary filtering")]
    EmptyVocabulary,
    #[error("document {0} has a matrix row but no covariate row")]
    MissingCovariateRow(u64),
    #[error("{0} documents are missing covariate values")]
    IncompleteCovariates(usize),
}

/// Failure of a single topic-model fit. Only a hard numerical failure is an
/// error: running out of iterations still yields a model.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FitError {
    #[error("degenerate input for K={k}: {reason}")]
    Degenerate { k: usize, reason: String },
    #[error("numerical failure for K={k} at iteration {iteration}")]
    Numerical { k: usize, iteration: usize },
    #[error("covariate table has {covariates} rows, matrix has {documents}")]
    CovariateRows { covariates: usize, documents: usize },
    #[error("fit for K={k} aborted: {message}")]
    Aborted { k: usize, message: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot (de)serialize {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot parse label mapping {path}: {source}")]
    Labels {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Lemma(#[from] LemmaError),
    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("no model could be fitted for any K in {0:?}")]
    EmptySweep(Vec<usize>),
}
