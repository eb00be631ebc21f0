use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::audio::constants::{AMIN, F_MIN, HOP_LENGTH, N_FFT, N_FFT_BINS, N_MELS, TOP_DB};

/// Precomputed short-time cepstral transform.
///
/// Building the window, the mel filterbank and the DCT basis is the expensive
/// part of an MFCC, and none of it depends on the signal. A transform is built
/// once per sample rate and can then be shared between threads: `compute` only
/// takes `&self`.
pub struct MfccTransform {
    n_mfcc: usize,
    window: Vec<f32>,
    /// [n_mels][n_fft_bins]
    mel_filters: Vec<Vec<f32>>,
    /// [n_mfcc][n_mels]
    dct_basis: Vec<Vec<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl MfccTransform {
    pub fn new(sample_rate: u32, n_mfcc: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let f_max = sample_rate as f64 / 2.0;
        Self {
            n_mfcc,
            window: hann_window(N_FFT),
            mel_filters: mel_filterbank(N_FFT, N_MELS, sample_rate as f64, F_MIN as f64, f_max),
            dct_basis: dct_basis(n_mfcc, N_MELS),
            fft: planner.plan_fft_forward(N_FFT),
        }
    }

    pub fn n_mfcc(&self) -> usize {
        self.n_mfcc
    }

    /// Number of frames `compute` produces for a signal of `n_samples`.
    ///
    /// Frames are centered: the signal is padded with `N_FFT / 2` zeros on
    /// both sides, so frame `t` is centered on sample `t * HOP_LENGTH`.
    pub fn frame_count(n_samples: usize) -> usize {
        1 + n_samples / HOP_LENGTH
    }

    /// Compute MFCCs for mono samples.
    ///
    /// Returns a `[n_frames][n_mfcc]` grid, time leading.
    pub fn compute(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let pad = N_FFT / 2;
        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let n_frames = Self::frame_count(samples.len());
        let mut log_mel = vec![vec![0.0f32; N_MELS]; n_frames];

        let mut fft_buf = vec![Complex::new(0.0f32, 0.0); N_FFT];
        let mut power = vec![0.0f32; N_FFT_BINS];

        for (frame_idx, mel_frame) in log_mel.iter_mut().enumerate() {
            let start = frame_idx * HOP_LENGTH;

            for (i, slot) in fft_buf.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * self.window[i], 0.0);
            }
            self.fft.process(&mut fft_buf);

            // Power spectrum, only the non-redundant half
            for (k, p) in power.iter_mut().enumerate() {
                *p = fft_buf[k].norm_sqr();
            }

            for (mel_val, filter) in mel_frame.iter_mut().zip(&self.mel_filters) {
                let energy: f32 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                *mel_val = 10.0 * energy.max(AMIN).log10();
            }
        }

        // Keep an 80 dB range below the loudest point of the whole recording
        let global_max = log_mel
            .iter()
            .flatten()
            .fold(f32::NEG_INFINITY, |acc, v| acc.max(*v));
        let floor = global_max - TOP_DB;
        for v in log_mel.iter_mut().flatten() {
            *v = v.max(floor);
        }

        log_mel
            .iter()
            .map(|frame| {
                self.dct_basis
                    .iter()
                    .map(|basis| basis.iter().zip(frame).map(|(b, v)| b * v).sum::<f32>())
                    .collect()
            })
            .collect()
    }
}

/// Periodic Hann window of the given length.
///
/// The FFT assumes the frame it sees repeats forever. Tapering the frame to
/// zero at both ends removes the discontinuity at the seam, which would
/// otherwise show up as energy at frequencies that are not in the signal.
fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / n as f64).cos())) as f32)
        .collect()
}

// Slaney's mel scale: linear below 1 kHz, logarithmic above.
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Convert frequency in Hz to the Slaney mel scale.
fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

/// Convert a Slaney mel value back to Hz.
fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Build the mel filterbank matrix: shape [n_mels][n_fft_bins].
///
/// Band edges are evenly spaced on the mel scale between `f_min` and `f_max`,
/// with one extra point on each side so every band has a left and right foot.
/// Each band is a triangle over the FFT bin frequencies, scaled by
/// `2 / bandwidth` so that wide high-frequency bands do not dominate.
fn mel_filterbank(
    n_fft: usize,
    n_mels: usize,
    sample_rate: f64,
    f_min: f64,
    f_max: f64,
) -> Vec<Vec<f32>> {
    let n_fft_bins = (n_fft / 2) + 1;
    let fft_freqs: Vec<f64> = (0..n_fft_bins)
        .map(|k| k as f64 * sample_rate / n_fft as f64)
        .collect();

    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);
    let band_edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (band_edges[m], band_edges[m + 1], band_edges[m + 2]);
            let enorm = 2.0 / (right - left);
            fft_freqs
                .iter()
                .map(|&f| {
                    let rising = (f - left) / (center - left);
                    let falling = (right - f) / (right - center);
                    (rising.min(falling).max(0.0) * enorm) as f32
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II basis: shape [n_out][n_in].
///
/// Only the first `n_out` rows are built since the higher cepstral
/// coefficients are discarded anyway.
fn dct_basis(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| (scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()) as f32)
                .collect()
        })
        .collect()
}
