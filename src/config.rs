use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    audio::constants::{MAX_LEN, SAMPLE_RATE},
    error::{Error, Result},
    model::config::ClassifierConfig,
};

/// Where `train` writes the model and `predict` reads it.
pub const DEFAULT_MODEL_PATH: &str = "models/depression_model.safetensors";

/// Every constant shared between training and inference.
///
/// There is deliberately no global: the CLI loads one of these and hands it to
/// both sides, so the sequence length used to train a model is the one used to
/// query it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rate every recording is resampled to before feature extraction
    pub sample_rate: u32,

    /// Frames per feature sequence. Changing it invalidates trained models.
    pub max_len: usize,

    /// Model artifact location
    pub model_path: PathBuf,

    pub training: TrainingConfig,
}

/// Hyper-parameters for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,

    /// Fraction of examples held out for validation, drawn at random each run
    pub validation_split: f64,

    /// Adam step size
    pub learning_rate: f64,

    /// Fixes the holdout and shuffling order. Weight initialisation is still random.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            max_len: MAX_LEN,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            training: TrainingConfig::default(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 8,
            validation_split: 0.2,
            learning_rate: 1e-3,
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Load a TOML config file. Missing keys fall back to the defaults.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&text).map_err(|e| {
            Error::InvalidConfig(format!("{}: {e}", path.as_ref().display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidConfig("sample_rate must be positive".into()));
        }
        let min_len = ClassifierConfig::min_sequence_len();
        if self.max_len < min_len {
            return Err(Error::InvalidConfig(format!(
                "max_len {} is shorter than the {min_len} frames the network needs",
                self.max_len
            )));
        }
        self.training.validate()
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(Error::InvalidConfig(
                "epochs and batch_size must be positive".into(),
            ));
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "validation_split must be in (0, 1), got {}",
                self.validation_split
            )));
        }
        Ok(())
    }

    /// Number of examples kept for training out of `n`; the rest validate.
    pub fn train_size(&self, n: usize) -> usize {
        (n as f64 * (1.0 - self.validation_split)).floor() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.sample_rate, 16_000);
        assert_eq!(config.max_len, MAX_LEN);
        assert_eq!(config.training.epochs, 10);
        assert_eq!(config.training.batch_size, 8);
        assert_eq!(config.training.validation_split, 0.2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            max_len = 64
            [training]
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.max_len, 64);
        assert_eq!(config.sample_rate, 16_000);
        assert_eq!(config.training.seed, Some(7));
        assert_eq!(config.training.batch_size, 8);
    }

    #[test]
    fn test_rejects_short_sequences() {
        let config = PipelineConfig {
            max_len: 4,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_split() {
        let mut config = PipelineConfig::default();
        config.training.validation_split = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_train_size_matches_holdout_arithmetic() {
        let training = TrainingConfig::default();
        assert_eq!(training.train_size(10), 8);
        assert_eq!(training.train_size(7), 5);
        assert_eq!(training.train_size(2), 1);
        assert_eq!(training.train_size(1), 0);
    }
}
