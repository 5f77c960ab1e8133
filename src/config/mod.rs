//! Layered configuration resolution.
//!
//! Three default layers (engine behaviour, dataset location, metric selection)
//! are merged with a request-supplied [`Overrides`] set. Each key belongs to
//! exactly one layer; an override for a key no layer owns is rejected.

mod layers;
mod overrides;

pub use layers::{ConfigLayer, DatasetConfig, EvalConfig, MetricsConfig};
pub use overrides::Overrides;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default configuration layers, before any request overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayers {
    pub eval: EvalConfig,
    pub dataset: DatasetConfig,
    pub metrics: MetricsConfig,
}

/// The three validated layers after overrides were applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub eval: EvalConfig,
    pub dataset: DatasetConfig,
    pub metrics: MetricsConfig,
}

impl ConfigLayers {
    /// Load default layers from a JSON file with optional `eval`, `dataset`
    /// and `metrics` objects. Missing fields keep their built-in defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file '{}': {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("failed to parse config file '{}': {}", path.display(), e))
        })
    }

    /// Apply `overrides` by key and validate the result.
    ///
    /// The merge is order independent: every key is routed to the one layer
    /// that owns it.
    pub fn resolve(&self, overrides: &Overrides) -> Result<ResolvedConfig> {
        let mut eval = self.eval.clone();
        let mut dataset = self.dataset.clone();
        let mut metrics = self.metrics.clone();

        for (key, tokens) in overrides.iter() {
            let owners = [
                EvalConfig::owns(key),
                DatasetConfig::owns(key),
                MetricsConfig::owns(key),
            ];
            match owners.iter().filter(|owned| **owned).count() {
                0 => {
                    return Err(Error::Config(format!(
                        "unknown configuration key '{}'",
                        key
                    )))
                }
                1 => {}
                _ => {
                    return Err(Error::Config(format!(
                        "configuration key '{}' is claimed by more than one layer",
                        key
                    )))
                }
            }

            if owners[0] {
                eval.apply(key, tokens)?;
            } else if owners[1] {
                dataset.apply(key, tokens)?;
            } else {
                metrics.apply(key, tokens)?;
            }
        }

        if metrics.metrics.is_empty() {
            return Err(Error::Config("no metrics selected for evaluation".to_string()));
        }
        if dataset.classes_to_eval.is_empty() {
            return Err(Error::Config("CLASSES_TO_EVAL must not be empty".to_string()));
        }
        // Ground truth is rewritten per request, so each sequence needs its own file.
        for placeholder in ["{gt_folder}", "{seq}"] {
            if !dataset.gt_loc_format.contains(placeholder) {
                return Err(Error::Config(format!(
                    "GT_LOC_FORMAT '{}' must contain {}",
                    dataset.gt_loc_format, placeholder
                )));
            }
        }

        Ok(ResolvedConfig {
            eval,
            dataset,
            metrics,
        })
    }
}
