// Short-time cepstral transform parameters
//
// Audio is re-sampled to 16,000 Hz and described by 40 mel-frequency
// cepstral coefficients per frame. The frame geometry (2048-point window,
// 512-sample hop, 128 mel bands) is the conventional default for speech MFCCs.

/// 16 KHz sample rate
pub const SAMPLE_RATE: u32 = 16_000;

/// Number of cepstral coefficients kept per frame
pub const N_MFCC: usize = 40;

/// Number of frames every feature sequence is padded or truncated to.
///
/// This is the single source of truth for the sequence length. Training and
/// inference both read it (through `PipelineConfig::max_len`), and a persisted
/// model is only valid for the value it was trained with.
pub const MAX_LEN: usize = 500;

/// FFT size in samples (128ms at 16kHz)
///
/// The window covers the whole FFT, so this is also the frame length.
pub const N_FFT: usize = 2048;

pub const N_FFT_BINS: usize = (N_FFT / 2) + 1;

/// 32ms stride at 16kHz
pub const HOP_LENGTH: usize = 512;

/// Number of mel bands the power spectrum is folded into before the DCT
pub const N_MELS: usize = 128;

pub const F_MIN: f32 = 0.0;

/// Floor applied before taking the log so silence stays finite
pub const AMIN: f32 = 1e-10;

/// Dynamic range kept below the loudest point, in dB
pub const TOP_DB: f32 = 80.0;
