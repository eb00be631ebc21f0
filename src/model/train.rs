use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};

use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        ElementConversion, Tensor,
        activation::log_softmax,
        backend::{AutodiffBackend, Backend},
    },
};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::Serialize;

use crate::{
    audio::{FeatureExtractor, constants::N_MFCC},
    config::{PipelineConfig, TrainingConfig},
    dataset::{DatasetBuilder, TrainingBatch},
    error::{Error, Result},
    model::{classifier::SequenceClassifier, config::ClassifierConfig, store},
};

/// Loss and accuracy after one epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f32,
    pub train_accuracy: f32,
    pub valid_loss: f32,
    pub valid_accuracy: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub epochs: Vec<EpochMetrics>,
    pub n_train: usize,
    pub n_valid: usize,
    /// Set once the model has been persisted
    pub model_path: Option<PathBuf>,
}

impl TrainingReport {
    pub fn final_validation_accuracy(&self) -> Option<f32> {
        self.epochs.last().map(|m| m.valid_accuracy)
    }
}

/// Categorical cross-entropy between logits and one-hot targets, averaged
/// over the batch.
pub fn categorical_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    (log_probs * targets).sum_dim(1).neg().mean()
}

/// Index of the largest value; the first one wins a tie.
pub fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv { (i, v) } else { (bi, bv) }
        })
        .0
}

/// Number of rows whose highest score is on the labelled class.
fn count_correct(scores: &[f32], targets: &[f32], n_classes: usize) -> usize {
    scores
        .chunks(n_classes)
        .zip(targets.chunks(n_classes))
        .filter(|(s, t)| argmax(s) == argmax(t))
        .count()
}

/// Check that `batch` fits the fixed network input `(max_len, N_MFCC)`.
pub fn check_shape(batch: &TrainingBatch, max_len: usize) -> Result<()> {
    let [n, time, coeffs] = batch.shape();
    if n == 0 || time != max_len || coeffs != N_MFCC {
        return Err(Error::ShapeMismatch {
            expected: format!("(N > 0, {max_len}, {N_MFCC})"),
            found: format!("({n}, {time}, {coeffs})"),
        });
    }
    Ok(())
}

/// Train a fresh classifier on `batch`.
///
/// A random `validation_split` share of the examples is held out and scored
/// after every epoch; the rest is reshuffled each epoch and fed in batches of
/// `batch_size`. Returns the trained network (without autodiff) and the
/// per-epoch metrics.
pub fn fit<B: AutodiffBackend>(
    batch: &TrainingBatch,
    max_len: usize,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<(SequenceClassifier<B::InnerBackend>, TrainingReport)> {
    check_shape(batch, max_len)?;
    config.validate()?;

    let n = batch.len();
    let n_train = config.train_size(n);
    if n_train == 0 {
        return Err(Error::InsufficientData {
            required: 2,
            found: n,
        });
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    let (train_idx, valid_idx) = indices.split_at(n_train);
    let mut train_idx = train_idx.to_vec();
    tracing::info!(
        n_train,
        n_valid = valid_idx.len(),
        "holding out validation examples"
    );

    let classifier = ClassifierConfig::new();
    let mut model: SequenceClassifier<B> = classifier.init(device);
    let mut optim = AdamConfig::new().init::<B, SequenceClassifier<B>>();

    let mut epochs = Vec::with_capacity(config.epochs);
    for epoch in 1..=config.epochs {
        train_idx.shuffle(&mut rng);

        let mut loss_sum = 0.0f32;
        let mut correct = 0usize;
        for chunk in train_idx.chunks(config.batch_size) {
            let (x, y) = batch.gather(chunk);
            let targets = y.iter::<f32>().collect::<Vec<_>>();
            let x = Tensor::<B, 3>::from_data(x, device);
            let y = Tensor::<B, 2>::from_data(y, device);

            let logits = model.forward(x);
            let loss = categorical_cross_entropy(logits.clone(), y);

            loss_sum += loss.clone().into_scalar().elem::<f32>() * chunk.len() as f32;
            let scores = logits.into_data().iter::<f32>().collect::<Vec<_>>();
            correct += count_correct(&scores, &targets, classifier.n_classes);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(config.learning_rate, model, grads);
        }

        let (valid_loss, valid_accuracy) =
            evaluate(&model.valid(), batch, valid_idx, classifier.n_classes, device);
        let metrics = EpochMetrics {
            epoch,
            train_loss: loss_sum / n_train as f32,
            train_accuracy: correct as f32 / n_train as f32,
            valid_loss,
            valid_accuracy,
        };
        tracing::info!(
            "epoch {}/{}: loss {:.4} acc {:.3} | val_loss {:.4} val_acc {:.3}",
            epoch,
            config.epochs,
            metrics.train_loss,
            metrics.train_accuracy,
            metrics.valid_loss,
            metrics.valid_accuracy
        );
        epochs.push(metrics);
    }

    let report = TrainingReport {
        epochs,
        n_train,
        n_valid: valid_idx.len(),
        model_path: None,
    };
    Ok((model.valid(), report))
}

/// Mean loss and accuracy of `model` on the examples at `indices`.
fn evaluate<B: Backend>(
    model: &SequenceClassifier<B>,
    batch: &TrainingBatch,
    indices: &[usize],
    n_classes: usize,
    device: &B::Device,
) -> (f32, f32) {
    let (x, y) = batch.gather(indices);
    let targets = y.iter::<f32>().collect::<Vec<_>>();
    let logits = model.forward(Tensor::<B, 3>::from_data(x, device));
    let loss = categorical_cross_entropy(logits.clone(), Tensor::<B, 2>::from_data(y, device))
        .into_scalar()
        .elem::<f32>();
    let scores = logits.into_data().iter::<f32>().collect::<Vec<_>>();
    let accuracy = count_correct(&scores, &targets, n_classes) as f32 / indices.len() as f32;
    (loss, accuracy)
}

/// Build the `train` split under `base`, fit a classifier and persist it to
/// `config.model_path`.
///
/// This is the only way a model reaches inference: `predict` reads the file.
pub fn train_model<B: AutodiffBackend>(
    config: &PipelineConfig,
    base: &Path,
    device: &B::Device,
) -> Result<TrainingReport> {
    config.validate()?;

    let builder = DatasetBuilder::new(FeatureExtractor::new(config.sample_rate, config.max_len));
    let batch = builder.build_parallel(base, "train")?;

    tracing::info!(shape = ?batch.shape(), "starting training");
    let (model, mut report) = fit::<B>(&batch, config.max_len, &config.training, device)?;

    store::save(&model, &config.model_path)?;
    report.model_path = Some(config.model_path.clone());
    Ok(report)
}

/// Run `train_model` on a worker thread.
///
/// The receiver yields exactly one message once training finishes or fails.
pub fn train_in_background<B: AutodiffBackend>(
    config: PipelineConfig,
    base: PathBuf,
    device: B::Device,
) -> Receiver<Result<TrainingReport>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = train_model::<B>(&config, &base, &device);
        if let Err(e) = &result {
            tracing::error!("training failed: {e}");
        }
        // receiver may have been dropped; nothing left to notify
        let _ = tx.send(result);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FeatureSequence;
    use crate::dataset::{LabeledExample, RiskLabel};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    const MAX_LEN: usize = 16;

    fn synthetic_batch(n: usize) -> TrainingBatch {
        let examples = (0..n)
            .map(|i| {
                let label = if i % 2 == 0 { RiskLabel::Low } else { RiskLabel::High };
                let level = if label == RiskLabel::Low { -1.0 } else { 1.0 };
                let frames: Vec<Vec<f32>> = (0..MAX_LEN)
                    .map(|t| {
                        (0..N_MFCC)
                            .map(|c| level + 0.01 * ((t * N_MFCC + c + i) % 7) as f32)
                            .collect()
                    })
                    .collect();
                LabeledExample {
                    participant_id: 300 + i as u32,
                    path: PathBuf::from(format!("{}_AUDIO.wav", 300 + i)),
                    features: FeatureSequence::from_frames(&frames, MAX_LEN, N_MFCC),
                    label,
                }
            })
            .collect();
        TrainingBatch::from_examples(examples, MAX_LEN, N_MFCC)
    }

    #[test]
    fn test_cross_entropy_matches_hand_computation() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0], [2.0, 0.0]], &device);
        let targets = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [0.0, 1.0]], &device);
        let loss = categorical_cross_entropy(logits, targets)
            .into_scalar()
            .elem::<f32>();

        // row 0: -ln(0.5); row 1: -ln(1 / (1 + e^2))
        let expected = (2.0f32.ln() + (1.0 + 2.0f32.exp()).ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-5, "{loss} vs {expected}");
    }

    #[test]
    fn test_argmax_first_max_wins() {
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.2, 0.8]), 1);
        assert_eq!(argmax(&[0.9, 0.1]), 0);
    }

    #[test]
    fn test_count_correct() {
        let scores = [0.9, 0.1, 0.3, 0.7, 0.6, 0.4];
        let targets = [1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        assert_eq!(count_correct(&scores, &targets, 2), 2);
    }

    #[test]
    fn test_empty_batch_is_shape_mismatch() {
        let device = Default::default();
        let batch = TrainingBatch::from_examples(Vec::new(), MAX_LEN, N_MFCC);
        let result = fit::<TestAutodiffBackend>(&batch, MAX_LEN, &TrainingConfig::default(), &device);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_wrong_length_is_shape_mismatch() {
        let device = Default::default();
        let batch = synthetic_batch(4);
        let result =
            fit::<TestAutodiffBackend>(&batch, MAX_LEN + 1, &TrainingConfig::default(), &device);
        match result {
            Err(Error::ShapeMismatch { found, .. }) => assert_eq!(found, "(4, 16, 40)"),
            other => panic!("expected ShapeMismatch, got {:?}", other.map(|(_, r)| r)),
        }
    }

    #[test]
    fn test_single_example_is_insufficient() {
        let device = Default::default();
        let batch = synthetic_batch(1);
        let result = fit::<TestAutodiffBackend>(&batch, MAX_LEN, &TrainingConfig::default(), &device);
        assert!(matches!(
            result,
            Err(Error::InsufficientData {
                required: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_fit_reports_every_epoch() {
        let device = Default::default();
        let batch = synthetic_batch(10);
        let config = TrainingConfig {
            epochs: 3,
            seed: Some(42),
            ..Default::default()
        };

        let (model, report) = fit::<TestAutodiffBackend>(&batch, MAX_LEN, &config, &device).unwrap();

        assert_eq!(report.n_train, 8);
        assert_eq!(report.n_valid, 2);
        assert_eq!(report.epochs.len(), 3);
        for (i, m) in report.epochs.iter().enumerate() {
            assert_eq!(m.epoch, i + 1);
            assert!(m.train_loss.is_finite() && m.valid_loss.is_finite());
            assert!((0.0..=1.0).contains(&m.valid_accuracy));
        }

        let (x, _) = batch.gather(&[0]);
        let probs = model.probabilities(Tensor::<TestBackend, 3>::from_data(x, &device));
        assert_eq!(probs.shape().dims, [1, 2]);
    }
}
