use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use burn::tensor::TensorData;
use rayon::prelude::*;

use crate::{
    audio::{FeatureExtractor, FeatureSequence, constants::N_MFCC},
    dataset::labels::{LabelTable, RiskLabel},
    error::{Error, Result},
};

/// Suffix every participant recording carries: `<id>_AUDIO.wav`
pub const AUDIO_SUFFIX: &str = "_AUDIO.wav";

/// Log progress every this many extracted files
const PROGRESS_EVERY: usize = 5;

/// One recording joined to its label.
#[derive(Debug, Clone)]
pub struct LabeledExample {
    pub participant_id: u32,
    pub path: PathBuf,
    pub features: FeatureSequence,
    pub label: RiskLabel,
}

/// Stacked training examples.
///
/// `x` is `[n, max_len, n_mfcc]` and `y` the one-hot `[n, 2]` labels, with
/// class 0 = low risk and 1 = high risk. Rows are ordered by participant id.
#[derive(Debug, Clone)]
pub struct TrainingBatch {
    features: Vec<f32>,
    labels: Vec<RiskLabel>,
    participant_ids: Vec<u32>,
    max_len: usize,
    n_mfcc: usize,
}

impl TrainingBatch {
    pub fn from_examples(examples: Vec<LabeledExample>, max_len: usize, n_mfcc: usize) -> Self {
        let mut batch = Self {
            features: Vec::with_capacity(examples.len() * max_len * n_mfcc),
            labels: Vec::with_capacity(examples.len()),
            participant_ids: Vec::with_capacity(examples.len()),
            max_len,
            n_mfcc,
        };
        for example in examples {
            batch.labels.push(example.label);
            batch.participant_ids.push(example.participant_id);
            batch.features.extend(example.features.into_values());
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `[n, max_len, n_mfcc]`
    pub fn shape(&self) -> [usize; 3] {
        [self.len(), self.max_len, self.n_mfcc]
    }

    pub fn labels(&self) -> &[RiskLabel] {
        &self.labels
    }

    pub fn participant_ids(&self) -> &[u32] {
        &self.participant_ids
    }

    /// Flattened features of example `i`.
    pub fn example(&self, i: usize) -> &[f32] {
        let stride = self.max_len * self.n_mfcc;
        &self.features[i * stride..(i + 1) * stride]
    }

    /// One-hot rows for `labels`, flattened `[n, 2]`.
    pub fn one_hot(labels: impl IntoIterator<Item = RiskLabel>) -> Vec<f32> {
        labels
            .into_iter()
            .flat_map(|label| match label {
                RiskLabel::Low => [1.0, 0.0],
                RiskLabel::High => [0.0, 1.0],
            })
            .collect()
    }

    /// Features and one-hot labels for the examples at `indices`, in that order.
    pub fn gather(&self, indices: &[usize]) -> (TensorData, TensorData) {
        let mut features = Vec::with_capacity(indices.len() * self.max_len * self.n_mfcc);
        for &i in indices {
            features.extend_from_slice(self.example(i));
        }
        let labels = Self::one_hot(indices.iter().map(|&i| self.labels[i]));
        (
            TensorData::new(features, [indices.len(), self.max_len, self.n_mfcc]),
            TensorData::new(labels, [indices.len(), 2]),
        )
    }

    /// `[n, max_len, n_mfcc]` feature tensor.
    pub fn x(&self) -> TensorData {
        TensorData::new(self.features.clone(), self.shape())
    }

    /// `[n, 2]` one-hot label tensor.
    pub fn y(&self) -> TensorData {
        TensorData::new(Self::one_hot(self.labels.iter().copied()), [self.len(), 2])
    }
}

/// A recording whose filename parsed and whose participant has a label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    participant_id: u32,
    path: PathBuf,
    label: RiskLabel,
}

/// Joins `<base>/audio/*_AUDIO.wav` against a split's label table.
pub struct DatasetBuilder {
    extractor: FeatureExtractor,
}

impl DatasetBuilder {
    pub fn new(extractor: FeatureExtractor) -> Self {
        Self { extractor }
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Build the dataset for `split`, extracting one file at a time.
    pub fn build(&self, base: &Path, split: &str) -> Result<TrainingBatch> {
        self.build_with(base, split, false)
    }

    /// Same as `build` but extracts files on the rayon thread pool.
    ///
    /// The result is identical to `build`: examples are still stacked in
    /// participant order.
    pub fn build_parallel(&self, base: &Path, split: &str) -> Result<TrainingBatch> {
        self.build_with(base, split, true)
    }

    fn build_with(&self, base: &Path, split: &str, parallel: bool) -> Result<TrainingBatch> {
        tracing::info!(base = %base.display(), split, "loading labels");
        let table = LabelTable::load(base, split)?;

        let audio_dir = base.join("audio");
        let candidates = collect_candidates(&audio_dir, &table)?;
        tracing::info!(
            candidates = candidates.len(),
            labels = table.len(),
            "scanned audio files"
        );

        let processed = AtomicUsize::new(0);
        let extract = |candidate: &Candidate| -> Option<LabeledExample> {
            match self.extractor.extract(&candidate.path) {
                Ok(features) => {
                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % PROGRESS_EVERY == 0 {
                        tracing::info!("processed {done} files");
                    }
                    Some(LabeledExample {
                        participant_id: candidate.participant_id,
                        path: candidate.path.clone(),
                        features,
                        label: candidate.label,
                    })
                }
                Err(e) => {
                    tracing::warn!("skipping {}: {e}", candidate.path.display());
                    None
                }
            }
        };

        let examples: Vec<LabeledExample> = if parallel {
            candidates.par_iter().filter_map(extract).collect()
        } else {
            candidates.iter().filter_map(extract).collect()
        };

        if examples.is_empty() {
            return Err(Error::NoTrainingData(audio_dir));
        }

        let batch = TrainingBatch::from_examples(examples, self.extractor.max_len(), N_MFCC);
        tracing::info!(shape = ?batch.shape(), "dataset assembled");
        Ok(batch)
    }
}

/// Participant id encoded before the first underscore of a filename.
pub fn parse_participant_id(file_name: &str) -> Option<u32> {
    file_name.split('_').next()?.parse().ok()
}

/// List labelled recordings in `audio_dir`, sorted by participant id.
///
/// Directory listing order differs between platforms; sorting keeps the
/// stacked tensor reproducible.
fn collect_candidates(audio_dir: &Path, table: &LabelTable) -> Result<Vec<Candidate>> {
    let entries = match std::fs::read_dir(audio_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("audio directory {} does not exist", audio_dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("error reading entry in {}: {e}", audio_dir.display());
                continue;
            }
        };
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.ends_with(AUDIO_SUFFIX) || !path.is_file() {
            continue;
        }

        let Some(participant_id) = parse_participant_id(file_name) else {
            tracing::warn!("skipping {file_name}: participant id is not numeric");
            continue;
        };
        let Some(raw) = table.label_for(participant_id) else {
            tracing::debug!("skipping {file_name}: no label row for {participant_id}");
            continue;
        };
        let Some(label) = RiskLabel::from_index(raw as usize) else {
            tracing::warn!("skipping {file_name}: PHQ8_Binary is {raw}, expected 0 or 1");
            continue;
        };

        candidates.push(Candidate {
            participant_id,
            path,
            label,
        });
    }

    candidates.sort();
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(id: u32, label: RiskLabel, fill: f32) -> LabeledExample {
        let frames = vec![vec![fill; 2]; 3];
        LabeledExample {
            participant_id: id,
            path: PathBuf::from(format!("{id}_AUDIO.wav")),
            features: FeatureSequence::from_frames(&frames, 3, 2),
            label,
        }
    }

    #[test]
    fn test_parse_participant_id() {
        assert_eq!(parse_participant_id("300_AUDIO.wav"), Some(300));
        assert_eq!(parse_participant_id("42_P_AUDIO.wav"), Some(42));
        assert_eq!(parse_participant_id("abc_AUDIO.wav"), None);
        assert_eq!(parse_participant_id("_AUDIO.wav"), None);
        assert_eq!(parse_participant_id("-3_AUDIO.wav"), None);
    }

    #[test]
    fn test_one_hot() {
        let y = TrainingBatch::one_hot([RiskLabel::Low, RiskLabel::High, RiskLabel::High]);
        assert_eq!(y, vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_batch_tensors() {
        let batch = TrainingBatch::from_examples(
            vec![
                example(300, RiskLabel::Low, 1.0),
                example(301, RiskLabel::High, 2.0),
            ],
            3,
            2,
        );
        assert_eq!(batch.shape(), [2, 3, 2]);
        assert_eq!(batch.x().shape, vec![2, 3, 2]);
        assert_eq!(batch.y().shape, vec![2, 2]);
        assert_eq!(
            batch.y().to_vec::<f32>().unwrap(),
            vec![1.0, 0.0, 0.0, 1.0]
        );
        assert_eq!(batch.example(1), &[2.0; 6]);
        assert_eq!(batch.participant_ids(), &[300, 301]);
    }

    #[test]
    fn test_gather_follows_indices() {
        let batch = TrainingBatch::from_examples(
            vec![
                example(300, RiskLabel::Low, 1.0),
                example(301, RiskLabel::High, 2.0),
                example(302, RiskLabel::Low, 3.0),
            ],
            3,
            2,
        );
        let (x, y) = batch.gather(&[2, 1]);
        assert_eq!(x.shape, vec![2, 3, 2]);
        let x = x.to_vec::<f32>().unwrap();
        assert_eq!(&x[..6], &[3.0; 6]);
        assert_eq!(&x[6..], &[2.0; 6]);
        assert_eq!(y.to_vec::<f32>().unwrap(), vec![1.0, 0.0, 0.0, 1.0]);
    }
}
