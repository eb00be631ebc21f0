use std::path::{Path, PathBuf};

use burn::tensor::{Tensor, backend::Backend};
use serde::Serialize;

use crate::{
    audio::{FeatureExtractor, FeatureSequence, constants::N_MFCC},
    config::PipelineConfig,
    dataset::RiskLabel,
    error::{Error, Result},
    model::{config::ClassifierConfig, store, train::argmax},
};

/// Outcome of one prediction, with the features the model saw.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub label: RiskLabel,
    /// Probability of `label`, in [0, 1]
    pub confidence: f32,
    /// `[P(low), P(high)]`
    pub probabilities: [f32; 2],
    /// Input sequence, unchanged, for explainability rendering
    pub features: FeatureSequence,
    pub coefficient_names: Vec<String>,
}

impl PredictionResult {
    /// Coefficient-by-time grid of the input, `[40][max_len]`.
    pub fn heatmap(&self) -> Vec<Vec<f32>> {
        self.features.heatmap()
    }
}

/// Pick the class with the higher probability.
///
/// Equal probabilities resolve to `Low`: the first maximum wins.
pub fn decide(probabilities: [f32; 2]) -> (RiskLabel, f32) {
    let index = argmax(&probabilities);
    let label = RiskLabel::from_index(index).unwrap_or(RiskLabel::Low);
    (label, probabilities[label.index()])
}

/// Recording → risk label pipeline.
///
/// The model is read from disk on every call, so a newly trained artifact is
/// picked up without restarting and no model handle outlives a prediction.
pub struct InferencePipeline<B: Backend> {
    extractor: FeatureExtractor,
    model_path: PathBuf,
    classifier: ClassifierConfig,
    device: B::Device,
}

impl<B: Backend> InferencePipeline<B> {
    pub fn new(config: &PipelineConfig, device: B::Device) -> Self {
        Self {
            extractor: FeatureExtractor::new(config.sample_rate, config.max_len),
            model_path: config.model_path.clone(),
            classifier: ClassifierConfig::new(),
            device,
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Predict the depression risk of the recording at `path`.
    pub fn predict<P: AsRef<Path>>(&self, path: P) -> Result<PredictionResult> {
        // Fail before the expensive extraction when there is nothing to run
        if !self.model_path.is_file() {
            return Err(Error::ModelNotTrained(self.model_path.clone()));
        }

        let features = self.extractor.extract(path.as_ref())?;
        self.predict_features(features)
    }

    /// Predict from an already extracted sequence.
    pub fn predict_features(&self, features: FeatureSequence) -> Result<PredictionResult> {
        let expected = [self.extractor.max_len(), N_MFCC];
        if features.shape() != expected {
            return Err(Error::ShapeMismatch {
                expected: format!("{expected:?}"),
                found: format!("{:?}", features.shape()),
            });
        }

        let model = store::load::<B>(&self.model_path, &self.classifier, &self.device)?;

        let input = Tensor::<B, 3>::from_data(features.to_batch_data(), &self.device);
        let probs: Vec<f32> = model.probabilities(input).into_data().iter::<f32>().collect();
        let probabilities = [probs[0], probs[1]];

        let (label, confidence) = decide(probabilities);
        tracing::info!(%label, confidence, "prediction");

        Ok(PredictionResult {
            label,
            confidence,
            probabilities,
            features,
            coefficient_names: self.extractor.coefficient_names(),
        })
    }
}
