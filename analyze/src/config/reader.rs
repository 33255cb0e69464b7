use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::{debug, LevelFilter};

use super::Config;
use crate::error::ConfigError;

pub struct ConfigReader;

impl ConfigReader {
    pub fn read(path: &Path) -> Result<Config, ConfigError> {
        debug!("reading config file: {}", path.display());

        let conf = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("read config file: {}", path.display());

        Self::parse(&conf)
    }

    pub fn parse(conf: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(conf)?;

        Self::validate(&config)?;

        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), ConfigError> {
        if LevelFilter::from_str(&config.logging.level).is_err() {
            return Err(ConfigError::Invalid {
                field: "logging.level",
                reason: format!("unknown level '{}'", config.logging.level),
            });
        }

        let sweep = &config.sweep;

        // A single topic has no meaningful exclusivity or coherence contrast
        if sweep.k_min < 2 {
            return Err(ConfigError::Invalid {
                field: "sweep.k_min",
                reason: format!("must be at least 2, got {}", sweep.k_min),
            });
        }
        if sweep.k_min > sweep.k_max {
            return Err(ConfigError::Invalid {
                field: "sweep.k_max",
                reason: format!("must not be lower than k_min ({})", sweep.k_min),
            });
        }
        if sweep.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "sweep.workers",
                reason: "must not be zero".to_string(),
            });
        }
        if sweep.tolerance <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "sweep.tolerance",
                reason: "must be strictly positive".to_string(),
            });
        }

        for (field, value) in [
            ("sweep.prior_concentration", sweep.prior_concentration),
            ("sweep.term_smoothing", sweep.term_smoothing),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be strictly positive, got {}", value),
                });
            }
        }
        if !(sweep.covariate_penalty >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "sweep.covariate_penalty",
                reason: format!("must not be negative, got {}", sweep.covariate_penalty),
            });
        }
        if !(0.0..=1.0).contains(&config.diagnostics.frex_weight) {
            return Err(ConfigError::Invalid {
                field: "diagnostics.frex_weight",
                reason: format!("must lie in [0, 1], got {}", config.diagnostics.frex_weight),
            });
        }

        for (field, value) in [
            ("heldout.document_proportion", config.heldout.document_proportion),
            ("heldout.token_proportion", config.heldout.token_proportion),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must lie in (0, 1), got {}", value),
                });
            }
        }

        if config.inspect.selected_k < 2 {
            return Err(ConfigError::Invalid {
                field: "inspect.selected_k",
                reason: format!("must be at least 2, got {}", config.inspect.selected_k),
            });
        }

        Ok(())
    }
}
