use std::{io::ErrorKind, path::Path};

use anyhow::{Context, Result, bail};
use rubato::{FftFixedIn, Resampler};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

/// Input frames per resampler call.
const RESAMPLE_CHUNK: usize = 1024;

/// Interleaved PCM as it came out of the decoder.
struct DecodedAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

impl DecodedAudio {
    /// Average the channels of each frame.
    fn into_mono(self) -> Vec<f32> {
        downmix(self.samples, self.channels)
    }
}

/// Load an audio file (WAV, FLAC, MP3, …) and return mono PCM at `sample_rate`.
///
/// Amplitudes are left untouched: the cepstral transform is computed on the
/// signal as recorded, so quiet speakers stay quiet.
pub fn load_audio<P: AsRef<Path>>(path: P, sample_rate: u32) -> Result<Vec<f32>> {
    let decoded = decode(path.as_ref())?;
    let source_rate = decoded.sample_rate;

    let mono = decoded.into_mono();
    if mono.is_empty() {
        bail!("audio stream contains no samples");
    }

    if source_rate == sample_rate {
        return Ok(mono);
    }
    resample(&mono, source_rate, sample_rate)
}

fn decode(path: &Path) -> Result<DecodedAudio> {
    let file = std::fs::File::open(path).context("opening audio file")?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut reader = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("unsupported audio format")?
        .format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("no audio track found")?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params.sample_rate.context("unknown sample rate")?;
    let mut channels = params.channels.map_or(1, |c| c.count());
    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .context("creating decoder")?;

    let mut samples = Vec::new();

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e).context("reading packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // a corrupt packet costs its own frames, not the recording
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!(reason, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e).context("decoding packet"),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count();
        let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        interleaved.copy_interleaved_ref(decoded);
        samples.extend_from_slice(interleaved.samples());
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

fn downmix(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Resample mono audio from `src_rate` to `dst_rate`.
///
/// The output is aligned with the input (resampler delay removed) and holds
/// `round(len * dst_rate / src_rate)` samples.
fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Result<Vec<f32>> {
    let mut resampler =
        FftFixedIn::<f32>::new(src_rate as usize, dst_rate as usize, RESAMPLE_CHUNK, 2, 1)
            .context("creating resampler")?;

    let target = (samples.len() as f64 * dst_rate as f64 / src_rate as f64).round() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(target + delay + resampler.output_frames_max());

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let end = pos + resampler.input_frames_next();
        let chunk = [&samples[pos..end]];
        let frames = resampler
            .process(&chunk[..], None)
            .context("resampling")?;
        output.extend_from_slice(&frames[0]);
        pos = end;
    }
    if pos < samples.len() {
        let tail = [&samples[pos..]];
        let frames = resampler
            .process_partial(Some(&tail[..]), None)
            .context("resampling tail")?;
        output.extend_from_slice(&frames[0]);
    }

    // Flush the filter until the delayed tail is out
    while output.len() < target + delay {
        let frames = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .context("flushing resampler")?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(target);
    Ok(output)
}
