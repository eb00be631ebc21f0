// Depression risk estimation from speech using Burn
//
// audio file → MFCC sequence (MAX_LEN × 40) → CNN-BiLSTM → LOW / HIGH risk
//
// Research heuristic only, not a clinical instrument.

pub mod audio;
pub mod config;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod model;

use std::path::Path;

use burn::tensor::backend::Backend;

pub use audio::{FeatureExtractor, FeatureSequence};
pub use config::{PipelineConfig, TrainingConfig};
pub use dataset::{DatasetBuilder, RiskLabel, TrainingBatch};
pub use error::{Error, Result};
pub use inference::{InferencePipeline, PredictionResult};
pub use model::{TrainingReport, train_in_background, train_model};

/// Fixed-shape MFCC sequence of one recording.
pub fn extract_features<P: AsRef<Path>>(
    path: P,
    config: &PipelineConfig,
) -> Result<FeatureSequence> {
    FeatureExtractor::new(config.sample_rate, config.max_len).extract(path)
}

/// Labelled `[N, max_len, 40]` features and `[N, 2]` one-hot labels for `split`.
pub fn build_dataset(base: &Path, split: &str, config: &PipelineConfig) -> Result<TrainingBatch> {
    DatasetBuilder::new(FeatureExtractor::new(config.sample_rate, config.max_len))
        .build_parallel(base, split)
}

/// Risk prediction for one recording with the model at `config.model_path`.
pub fn predict<B: Backend, P: AsRef<Path>>(
    path: P,
    config: &PipelineConfig,
    device: B::Device,
) -> Result<PredictionResult> {
    InferencePipeline::<B>::new(config, device).predict(path)
}
