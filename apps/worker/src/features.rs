//! Audio decoding and feature extraction
//!
//! Decodes an audio file to mono f32 samples with symphonia, then derives
//! the eight-dimensional feature vector used by the similarity engine plus
//! a few raw spectral descriptors kept for diagnostics.
//!
//! All derivations are deterministic: the same file always produces the
//! same vector.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::dsp::{self, SpectralAnalyzer, FRAME_SIZE, HOP_SIZE};
use crate::error::{WorkerError, WorkerResult};
use crate::similarity::FeatureVector;

/// Cap on decoded samples, about 4 minutes of mono 44.1 kHz audio.
/// Enough signal for stable statistics without unbounded memory on long files.
const MAX_SAMPLES: usize = 44_100 * 240;

/// Complete analysis result for one audio file
#[derive(Debug, Clone)]
pub struct TrackAnalysis {
    /// The eight-dimensional feature vector
    pub vector: FeatureVector,
    /// Mean spectral centroid in Hz
    pub spectral_centroid: f64,
    /// Mean spectral rolloff in Hz
    pub spectral_rolloff: f64,
    /// Mean spectral bandwidth in Hz
    pub spectral_bandwidth: f64,
    /// Decoded duration in seconds
    pub duration_secs: f64,
    /// Source sample rate
    pub sample_rate: u32,
    /// Number of mono samples analyzed
    pub num_samples: usize,
}

/// Decoded mono audio
struct DecodedAudio {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Extract the full feature set from an audio file
///
/// This is CPU-bound and synchronous; callers run it inside
/// `spawn_blocking` with a timeout.
pub fn extract(path: &Path) -> WorkerResult<TrackAnalysis> {
    let decoded = decode_to_mono(path)?;
    if decoded.samples.is_empty() {
        return Err(WorkerError::decode(
            path.display().to_string(),
            "no decodable audio samples",
        ));
    }

    Ok(analyze_samples(&decoded.samples, decoded.sample_rate))
}

/// Derive features from raw mono samples
///
/// Exposed separately so tests can feed synthetic signals without files.
pub fn analyze_samples(samples: &[f32], sample_rate: u32) -> TrackAnalysis {
    let mut analyzer = SpectralAnalyzer::new(sample_rate);

    // Frame-level spectral statistics
    let mut centroids = Vec::new();
    let mut rolloffs = Vec::new();
    let mut bandwidths = Vec::new();
    let mut flatnesses = Vec::new();
    let mut hf_ratios = Vec::new();
    let mut vocal_ratios = Vec::new();

    let mut pos = 0;
    while pos + FRAME_SIZE <= samples.len() {
        let spectrum = analyzer.compute_spectrum(&samples[pos..pos + FRAME_SIZE]);
        let centroid = analyzer.spectral_centroid(&spectrum);

        centroids.push(centroid);
        rolloffs.push(analyzer.spectral_rolloff(&spectrum, 0.85));
        bandwidths.push(analyzer.spectral_bandwidth(&spectrum, centroid));
        flatnesses.push(analyzer.spectral_flatness(&spectrum));
        hf_ratios.push(analyzer.band_energy_ratio(&spectrum, 4000.0, sample_rate as f64 / 2.0));
        vocal_ratios.push(analyzer.band_energy_ratio(&spectrum, 300.0, 3400.0));

        pos += HOP_SIZE;
    }

    let centroid = mean(&centroids);
    let rolloff = mean(&rolloffs);
    let bandwidth = mean(&bandwidths);
    let flatness = mean(&flatnesses);
    let hf_ratio = mean(&hf_ratios);
    let vocal_ratio = mean(&vocal_ratios);

    // Time-domain statistics
    let rms = dsp::rms(samples);
    let zcr = dsp::zero_crossing_rate(samples);

    // Rhythm
    let onsets = dsp::onset_strength(&mut analyzer, samples);
    let tempo_estimate = dsp::estimate_tempo(&onsets, sample_rate, HOP_SIZE);

    // Feature mappings
    let energy = (rms * 10.0).min(1.0);
    let loudness = if rms > 0.0 {
        (20.0 * rms.log10()).clamp(-60.0, 0.0)
    } else {
        -60.0
    };
    let danceability = dsp::danceability(&tempo_estimate);

    // Brightness proxy: centroids above ~4 kHz read as fully bright
    let brightness = (centroid / 4000.0).clamp(0.0, 1.0);
    let valence = (0.5 * energy + 0.5 * brightness).clamp(0.0, 1.0);

    let acousticness = ((1.0 - hf_ratio) * (1.0 - flatness)).clamp(0.0, 1.0);
    let instrumentalness = (1.0 - vocal_ratio).clamp(0.0, 1.0);
    let speechiness = (0.5 * (zcr * 4.0).min(1.0) + 0.5 * flatness).clamp(0.0, 1.0);

    TrackAnalysis {
        vector: FeatureVector {
            energy,
            valence,
            danceability,
            tempo: tempo_estimate.bpm,
            acousticness,
            instrumentalness,
            loudness,
            speechiness,
        },
        spectral_centroid: centroid,
        spectral_rolloff: rolloff,
        spectral_bandwidth: bandwidth,
        duration_secs: samples.len() as f64 / sample_rate as f64,
        sample_rate,
        num_samples: samples.len(),
    }
}

/// Decode a file to mono f32, averaging channels
fn decode_to_mono(path: &Path) -> WorkerResult<DecodedAudio> {
    let path_str = path.display().to_string();

    let file = File::open(path).map_err(|e| WorkerError::file_access(&path_str, e))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| WorkerError::decode(&path_str, e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| WorkerError::decode(&path_str, "no supported audio track"))?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| WorkerError::decode(&path_str, "unknown sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| WorkerError::decode(&path_str, e))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(WorkerError::decode(&path_str, e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::new(decoded.capacity() as u64, spec)
                });
                buf.copy_interleaved_ref(decoded);

                let channels = spec.channels.count().max(1);
                for frame in buf.samples().chunks(channels) {
                    let sum: f32 = frame.iter().sum();
                    samples.push(sum / channels as f32);
                }

                if samples.len() >= MAX_SAMPLES {
                    samples.truncate(MAX_SAMPLES);
                    break;
                }
            }
            // Isolated corrupt packets are skipped; the file may still analyze
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(WorkerError::decode(&path_str, e)),
        }
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
