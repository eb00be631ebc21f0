use std::path::Path;

use burn::tensor::TensorData;
use serde::Serialize;

use crate::{
    audio::{
        constants::{MAX_LEN, N_MFCC, SAMPLE_RATE},
        mfcc::MfccTransform,
        preprocessing::load_audio,
    },
    error::{Error, Result},
};

/// Fixed-length MFCC sequence: exactly `max_len` frames of `n_mfcc` coefficients.
///
/// Stored row-major with time leading, i.e. `values[t * n_mfcc + c]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSequence {
    values: Vec<f32>,
    max_len: usize,
    n_mfcc: usize,
}

impl FeatureSequence {
    /// Pad or truncate a `[time][n_mfcc]` grid to exactly `max_len` rows.
    ///
    /// Short grids get all-zero rows appended at the end; long grids keep
    /// their first `max_len` rows.
    pub fn from_frames(frames: &[Vec<f32>], max_len: usize, n_mfcc: usize) -> Self {
        let mut values = vec![0.0f32; max_len * n_mfcc];
        for (row, frame) in values.chunks_exact_mut(n_mfcc).zip(frames.iter().take(max_len)) {
            row.copy_from_slice(&frame[..n_mfcc]);
        }
        Self {
            values,
            max_len,
            n_mfcc,
        }
    }

    /// (time, coefficients)
    pub fn shape(&self) -> [usize; 2] {
        [self.max_len, self.n_mfcc]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn row(&self, t: usize) -> &[f32] {
        &self.values[t * self.n_mfcc..(t + 1) * self.n_mfcc]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.values.chunks_exact(self.n_mfcc)
    }

    /// Coefficient-by-time grid (`[n_mfcc][max_len]`) for heatmap rendering.
    pub fn heatmap(&self) -> Vec<Vec<f32>> {
        (0..self.n_mfcc)
            .map(|c| self.rows().map(|row| row[c]).collect())
            .collect()
    }

    /// A single-example batch `[1, max_len, n_mfcc]`.
    pub fn to_batch_data(&self) -> TensorData {
        TensorData::new(self.values.clone(), [1, self.max_len, self.n_mfcc])
    }

    pub(crate) fn into_values(self) -> Vec<f32> {
        self.values
    }
}

/// `"MFCC_0"` … `"MFCC_{n-1}"`
pub fn coefficient_names(n_mfcc: usize) -> Vec<String> {
    (0..n_mfcc).map(|i| format!("MFCC_{i}")).collect()
}

/// Turns audio files into fixed-shape MFCC sequences.
///
/// Holds no mutable state, so one extractor can serve any number of
/// threads extracting different files.
pub struct FeatureExtractor {
    sample_rate: u32,
    max_len: usize,
    transform: MfccTransform,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(SAMPLE_RATE, MAX_LEN)
    }
}

impl FeatureExtractor {
    pub fn new(sample_rate: u32, max_len: usize) -> Self {
        Self {
            sample_rate,
            max_len,
            transform: MfccTransform::new(sample_rate, N_MFCC),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn coefficient_names(&self) -> Vec<String> {
        coefficient_names(self.transform.n_mfcc())
    }

    /// Decode `path` and return its `(max_len, 40)` MFCC sequence.
    ///
    /// Any decode failure comes back as `Error::FeatureExtraction` carrying
    /// the path, so dataset assembly can log it and move on.
    pub fn extract<P: AsRef<Path>>(&self, path: P) -> Result<FeatureSequence> {
        let path = path.as_ref();
        let samples =
            load_audio(path, self.sample_rate).map_err(|e| Error::FeatureExtraction {
                path: path.to_path_buf(),
                source: e.into(),
            })?;
        tracing::debug!(
            path = %path.display(),
            samples = samples.len(),
            "decoded audio"
        );
        Ok(self.extract_samples(&samples))
    }

    /// Same as `extract`, for samples already decoded at `sample_rate`.
    pub fn extract_samples(&self, samples: &[f32]) -> FeatureSequence {
        let frames = self.transform.compute(samples);
        FeatureSequence::from_frames(&frames, self.max_len, self.transform.n_mfcc())
    }

    /// Full-length MFCC grid before padding or truncation.
    pub fn frames(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.transform.compute(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(n: usize) -> Vec<f32> {
        // xorshift so the test does not depend on a random crate's stream
        let mut state = 0x2545_f491_u32;
        (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) - 0.5
            })
            .collect()
    }

    #[test]
    fn test_from_frames_pads_with_zero_rows() {
        let frames = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let seq = FeatureSequence::from_frames(&frames, 4, 2);
        assert_eq!(seq.shape(), [4, 2]);
        assert_eq!(seq.values(), &[1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_from_frames_keeps_head() {
        let frames = vec![vec![1.0], vec![2.0], vec![3.0]];
        let seq = FeatureSequence::from_frames(&frames, 2, 1);
        assert_eq!(seq.values(), &[1.0, 2.0]);
    }

    #[test]
    fn test_shape_is_fixed_for_any_duration() {
        let extractor = FeatureExtractor::new(SAMPLE_RATE, 20);
        for n in [1, 511, 5_000, 10_240, 64_000] {
            let seq = extractor.extract_samples(&noise(n));
            assert_eq!(seq.shape(), [20, N_MFCC], "{n} samples");
        }
    }

    #[test]
    fn test_padding_rows_are_zero() {
        let extractor = FeatureExtractor::new(SAMPLE_RATE, 50);
        let samples = noise(8_000);
        let time = MfccTransform::frame_count(samples.len());
        assert!(time < 50);

        let seq = extractor.extract_samples(&samples);
        for t in time..50 {
            assert!(seq.row(t).iter().all(|v| *v == 0.0), "row {t} not zero");
        }
        assert!(seq.row(0).iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_truncation_keeps_first_rows_exactly() {
        let extractor = FeatureExtractor::new(SAMPLE_RATE, 10);
        let samples = noise(16_000);
        let full = extractor.frames(&samples);
        assert!(full.len() > 10);

        let seq = extractor.extract_samples(&samples);
        for (t, frame) in full.iter().take(10).enumerate() {
            assert_eq!(seq.row(t), frame.as_slice());
        }
    }

    #[test]
    fn test_heatmap_is_transposed() {
        let frames = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let seq = FeatureSequence::from_frames(&frames, 2, 3);
        assert_eq!(
            seq.heatmap(),
            vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]
        );
    }

    #[test]
    fn test_coefficient_names() {
        let names = coefficient_names(N_MFCC);
        assert_eq!(names.len(), 40);
        assert_eq!(names[0], "MFCC_0");
        assert_eq!(names[39], "MFCC_39");
    }

    #[test]
    fn test_missing_file_is_extraction_failure() {
        let extractor = FeatureExtractor::default();
        match extractor.extract("/no/such/300_AUDIO.wav") {
            Err(Error::FeatureExtraction { path, .. }) => {
                assert!(path.ends_with("300_AUDIO.wav"))
            }
            other => panic!("expected FeatureExtraction, got {other:?}"),
        }
    }
}
