use std::path::PathBuf;

use serde::Deserialize;

use super::defaults;
use crate::topic_modeling::EmConfig;
use crate::vocabulary::FrequencyThreshold;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: ConfigLogging,
    pub filter: ConfigFilter,
    pub vocabulary: ConfigVocabulary,
    pub heldout: ConfigHeldout,
    pub sweep: ConfigSweep,
    pub diagnostics: ConfigDiagnostics,
    pub inspect: ConfigInspect,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigLogging {
    #[serde(default = "defaults::logging_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFilter {
    #[serde(default = "defaults::filter_document_type")]
    pub document_type: String,

    #[serde(default = "defaults::filter_phrases")]
    pub phrases: Vec<String>,

    #[serde(default = "defaults::filter_patterns")]
    pub patterns: Vec<String>,

    #[serde(default = "defaults::filter_allowed_concepts")]
    pub allowed_concepts: Vec<String>,

    // Dropped as a candidate unless it is the only concept on a document
    #[serde(default = "defaults::filter_excluded_concepts")]
    pub excluded_concepts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    AtLeast,
    MoreThan,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigVocabulary {
    #[serde(default = "defaults::vocabulary_min_term_frequency")]
    pub min_term_frequency: usize,

    #[serde(default = "ConfigVocabulary::default_mode")]
    pub threshold: ThresholdMode,

    #[serde(default = "defaults::vocabulary_reserved_stems")]
    pub reserved_stems: Vec<String>,

    #[serde(default)]
    pub common_words: Vec<String>,

    pub common_words_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigHeldout {
    #[serde(default = "defaults::heldout_document_proportion")]
    pub document_proportion: f64,

    #[serde(default = "defaults::heldout_token_proportion")]
    pub token_proportion: f64,

    #[serde(default = "defaults::heldout_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSweep {
    #[serde(default = "defaults::sweep_k_min")]
    pub k_min: usize,

    #[serde(default = "defaults::sweep_k_max")]
    pub k_max: usize,

    #[serde(default = "defaults::sweep_seed")]
    pub seed: u64,

    #[serde(default = "defaults::sweep_workers")]
    pub workers: usize,

    #[serde(default = "defaults::sweep_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "defaults::sweep_tolerance")]
    pub tolerance: f64,

    #[serde(default = "defaults::sweep_prior_concentration")]
    pub prior_concentration: f64,

    #[serde(default = "defaults::sweep_term_smoothing")]
    pub term_smoothing: f64,

    #[serde(default = "defaults::sweep_covariate_penalty")]
    pub covariate_penalty: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigDiagnostics {
    #[serde(default = "defaults::diagnostics_top_terms")]
    pub top_terms: usize,

    #[serde(default = "defaults::diagnostics_frex_weight")]
    pub frex_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigInspect {
    #[serde(default = "defaults::inspect_selected_k")]
    pub selected_k: usize,

    #[serde(default = "defaults::inspect_top_terms")]
    pub top_terms: usize,

    pub labels_path: Option<PathBuf>,

    #[serde(default)]
    pub seminal_works: Vec<String>,
}

impl ConfigVocabulary {
    fn default_mode() -> ThresholdMode {
        ThresholdMode::MoreThan
    }

    pub fn frequency_threshold(&self) -> FrequencyThreshold {
        match self.threshold {
            ThresholdMode::AtLeast => FrequencyThreshold::AtLeast(self.min_term_frequency),
            ThresholdMode::MoreThan => FrequencyThreshold::MoreThan(self.min_term_frequency),
        }
    }
}

impl ConfigSweep {
    pub fn topic_counts(&self) -> Vec<usize> {
        (self.k_min..=self.k_max).collect()
    }

    pub fn em_config(&self) -> EmConfig {
        EmConfig {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            prior_concentration: self.prior_concentration,
            term_smoothing: self.term_smoothing,
            covariate_penalty: self.covariate_penalty,
            ..EmConfig::default()
        }
    }
}

impl Default for ConfigLogging {
    fn default() -> Self {
        ConfigLogging {
            level: defaults::logging_level(),
        }
    }
}

impl Default for ConfigFilter {
    fn default() -> Self {
        ConfigFilter {
            document_type: defaults::filter_document_type(),
            phrases: defaults::filter_phrases(),
            patterns: defaults::filter_patterns(),
            allowed_concepts: defaults::filter_allowed_concepts(),
            excluded_concepts: defaults::filter_excluded_concepts(),
        }
    }
}

impl Default for ConfigVocabulary {
    fn default() -> Self {
        ConfigVocabulary {
            min_term_frequency: defaults::vocabulary_min_term_frequency(),
            threshold: Self::default_mode(),
            reserved_stems: defaults::vocabulary_reserved_stems(),
            common_words: Vec::new(),
            common_words_path: None,
        }
    }
}

impl Default for ConfigHeldout {
    fn default() -> Self {
        ConfigHeldout {
            document_proportion: defaults::heldout_document_proportion(),
            token_proportion: defaults::heldout_token_proportion(),
            seed: defaults::heldout_seed(),
        }
    }
}

impl Default for ConfigSweep {
    fn default() -> Self {
        ConfigSweep {
            k_min: defaults::sweep_k_min(),
            k_max: defaults::sweep_k_max(),
            seed: defaults::sweep_seed(),
            workers: defaults::sweep_workers(),
            max_iterations: defaults::sweep_max_iterations(),
            tolerance: defaults::sweep_tolerance(),
            prior_concentration: defaults::sweep_prior_concentration(),
            term_smoothing: defaults::sweep_term_smoothing(),
            covariate_penalty: defaults::sweep_covariate_penalty(),
        }
    }
}

impl Default for ConfigDiagnostics {
    fn default() -> Self {
        ConfigDiagnostics {
            top_terms: defaults::diagnostics_top_terms(),
            frex_weight: defaults::diagnostics_frex_weight(),
        }
    }
}

impl Default for ConfigInspect {
    fn default() -> Self {
        ConfigInspect {
            selected_k: defaults::inspect_selected_k(),
            top_terms: defaults::inspect_top_terms(),
            labels_path: None,
            seminal_works: Vec::new(),
        }
    }
}
