//! Spectral and rhythm analysis primitives
//!
//! Frame-based FFT analysis (centroid, rolloff, flatness, flux, band energy)
//! plus onset-strength tempo estimation by autocorrelation. Everything here
//! is pure and deterministic so the same file always yields the same numbers.

use realfft::RealFftPlanner;
use rustfft::num_complex::Complex;

/// Default analysis frame size in samples
pub const FRAME_SIZE: usize = 2048;

/// Default hop between frames in samples
pub const HOP_SIZE: usize = 512;

/// Tempo search range in BPM
const MIN_BPM: f64 = 60.0;
const MAX_BPM: f64 = 200.0;

/// Fallback tempo when no periodicity is detectable
const DEFAULT_BPM: f64 = 120.0;

/// Frame-based spectral analyzer backed by a real-input FFT
pub struct SpectralAnalyzer {
    frame_size: usize,
    hop_size: usize,
    sample_rate: u32,
    window: Vec<f64>,
    planner: RealFftPlanner<f64>,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_frame_size(sample_rate, FRAME_SIZE, HOP_SIZE)
    }

    pub fn with_frame_size(sample_rate: u32, frame_size: usize, hop_size: usize) -> Self {
        let window: Vec<f64> = apodize::hanning_iter(frame_size).collect();
        Self {
            frame_size,
            hop_size,
            sample_rate,
            window,
            planner: RealFftPlanner::new(),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Compute the magnitude spectrum of one windowed frame
    ///
    /// Frames shorter than the frame size are zero-padded.
    pub fn compute_spectrum(&mut self, frame: &[f32]) -> Vec<f64> {
        let fft = self.planner.plan_fft_forward(self.frame_size);

        let mut input: Vec<f64> = vec![0.0; self.frame_size];
        for (i, &sample) in frame.iter().take(self.frame_size).enumerate() {
            input[i] = sample as f64 * self.window[i];
        }

        let mut output: Vec<Complex<f64>> = vec![Complex::default(); self.frame_size / 2 + 1];
        if fft.process(&mut input, &mut output).is_err() {
            return vec![0.0; self.frame_size / 2 + 1];
        }

        output.iter().map(|c| c.norm()).collect()
    }

    /// Spectral centroid: the magnitude-weighted mean frequency in Hz
    pub fn spectral_centroid(&self, spectrum: &[f64]) -> f64 {
        let total: f64 = spectrum.iter().sum();
        if total <= f64::EPSILON {
            return 0.0;
        }

        let weighted: f64 = spectrum
            .iter()
            .enumerate()
            .map(|(bin, &mag)| self.bin_to_frequency(bin) * mag)
            .sum();

        weighted / total
    }

    /// Spectral rolloff: the frequency below which `fraction` of the energy lies
    pub fn spectral_rolloff(&self, spectrum: &[f64], fraction: f64) -> f64 {
        let total: f64 = spectrum.iter().map(|m| m * m).sum();
        if total <= f64::EPSILON {
            return 0.0;
        }

        let target = total * fraction;
        let mut cumulative = 0.0;
        for (bin, &mag) in spectrum.iter().enumerate() {
            cumulative += mag * mag;
            if cumulative >= target {
                return self.bin_to_frequency(bin);
            }
        }

        self.bin_to_frequency(spectrum.len().saturating_sub(1))
    }

    /// Spectral flatness: geometric mean over arithmetic mean of magnitudes
    ///
    /// Near 1.0 for noise, near 0.0 for tonal content.
    pub fn spectral_flatness(&self, spectrum: &[f64]) -> f64 {
        if spectrum.is_empty() {
            return 0.0;
        }

        let arithmetic: f64 = spectrum.iter().sum::<f64>() / spectrum.len() as f64;
        if arithmetic <= f64::EPSILON {
            return 0.0;
        }

        let log_sum: f64 = spectrum.iter().map(|&m| (m + 1e-10).ln()).sum();
        let geometric = (log_sum / spectrum.len() as f64).exp();

        (geometric / arithmetic).clamp(0.0, 1.0)
    }

    /// Spectral bandwidth: magnitude-weighted standard deviation around the centroid
    pub fn spectral_bandwidth(&self, spectrum: &[f64], centroid: f64) -> f64 {
        let total: f64 = spectrum.iter().sum();
        if total <= f64::EPSILON {
            return 0.0;
        }

        let variance: f64 = spectrum
            .iter()
            .enumerate()
            .map(|(bin, &mag)| {
                let delta = self.bin_to_frequency(bin) - centroid;
                delta * delta * mag
            })
            .sum::<f64>()
            / total;

        variance.sqrt()
    }

    /// Spectral flux: sum of positive magnitude differences between frames
    pub fn spectral_flux(&self, previous: &[f64], current: &[f64]) -> f64 {
        current
            .iter()
            .zip(previous.iter())
            .map(|(&cur, &prev)| (cur - prev).max(0.0))
            .sum()
    }

    /// Fraction of total spectral energy between `low_hz` and `high_hz`
    pub fn band_energy_ratio(&self, spectrum: &[f64], low_hz: f64, high_hz: f64) -> f64 {
        let total: f64 = spectrum.iter().map(|m| m * m).sum();
        if total <= f64::EPSILON {
            return 0.0;
        }

        let low_bin = self.frequency_to_bin(low_hz);
        let high_bin = self.frequency_to_bin(high_hz).min(spectrum.len());
        if low_bin >= high_bin {
            return 0.0;
        }

        let band: f64 = spectrum[low_bin..high_bin].iter().map(|m| m * m).sum();
        band / total
    }

    fn bin_to_frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.sample_rate as f64 / self.frame_size as f64
    }

    fn frequency_to_bin(&self, freq: f64) -> usize {
        ((freq * self.frame_size as f64 / self.sample_rate as f64).round() as usize)
            .min(self.frame_size / 2)
    }
}

/// Fraction of adjacent sample pairs that cross zero
pub fn zero_crossing_rate(samples: &[f32]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }

    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();

    crossings as f64 / (samples.len() - 1) as f64
}

/// Root-mean-square amplitude
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_sq: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Onset strength envelope from frame-to-frame spectral flux
///
/// The raw flux is smoothed with a short moving average so single-bin
/// noise doesn't register as onsets.
pub fn onset_strength(analyzer: &mut SpectralAnalyzer, samples: &[f32]) -> Vec<f64> {
    let frame_size = analyzer.frame_size();
    let hop_size = analyzer.hop_size();
    if samples.len() < frame_size {
        return Vec::new();
    }

    let mut flux = Vec::new();
    let mut previous: Option<Vec<f64>> = None;

    let mut pos = 0;
    while pos + frame_size <= samples.len() {
        let spectrum = analyzer.compute_spectrum(&samples[pos..pos + frame_size]);
        if let Some(prev) = &previous {
            flux.push(analyzer.spectral_flux(prev, &spectrum));
        }
        previous = Some(spectrum);
        pos += hop_size;
    }

    moving_average(&flux, 5)
}

fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if values.is_empty() || window == 0 {
        return values.to_vec();
    }

    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(values.len());
            values[start..end].iter().sum::<f64>() / (end - start) as f64
        })
        .collect()
}

/// Result of tempo estimation over an onset envelope
#[derive(Debug, Clone, Copy)]
pub struct TempoEstimate {
    /// Estimated tempo in BPM
    pub bpm: f64,
    /// How evenly spaced the detected onsets are, 0.0 to 1.0
    pub regularity: f64,
    /// Relative prominence of onset peaks, 0.0 to 1.0
    pub beat_strength: f64,
}

impl Default for TempoEstimate {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            regularity: 0.0,
            beat_strength: 0.0,
        }
    }
}

/// Estimate tempo by autocorrelating the onset envelope over the lag range
/// corresponding to 60-200 BPM
pub fn estimate_tempo(onsets: &[f64], sample_rate: u32, hop_size: usize) -> TempoEstimate {
    if onsets.len() < 8 {
        return TempoEstimate::default();
    }

    let frames_per_second = sample_rate as f64 / hop_size as f64;
    let min_lag = ((frames_per_second * 60.0) / MAX_BPM).floor() as usize;
    let max_lag = (((frames_per_second * 60.0) / MIN_BPM).ceil() as usize).min(onsets.len() / 2);
    if min_lag == 0 || min_lag >= max_lag {
        return TempoEstimate::default();
    }

    let mean = onsets.iter().sum::<f64>() / onsets.len() as f64;
    let centered: Vec<f64> = onsets.iter().map(|&v| v - mean).collect();
    let energy: f64 = centered.iter().map(|v| v * v).sum();
    if energy <= f64::EPSILON {
        return TempoEstimate::default();
    }

    let mut best_lag = 0;
    let mut best_corr = 0.0;
    for lag in min_lag..=max_lag {
        let corr: f64 = centered
            .iter()
            .zip(centered[lag..].iter())
            .map(|(&a, &b)| a * b)
            .sum::<f64>()
            / energy;
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    if best_lag == 0 || best_corr <= 0.0 {
        return TempoEstimate::default();
    }

    let bpm = frames_per_second * 60.0 / best_lag as f64;
    let regularity = tempo_regularity(onsets, best_lag);
    let beat_strength = beat_strength(onsets);

    TempoEstimate {
        bpm: bpm.clamp(MIN_BPM, MAX_BPM),
        regularity,
        beat_strength,
    }
}

/// How closely the intervals between onset peaks match the expected lag
fn tempo_regularity(onsets: &[f64], expected_lag: usize) -> f64 {
    let peaks = find_peaks(onsets);
    if peaks.len() < 3 {
        return 0.0;
    }

    let deviations: Vec<f64> = peaks
        .windows(2)
        .map(|pair| {
            let interval = (pair[1] - pair[0]) as f64;
            let expected = expected_lag as f64;
            // Intervals at integer multiples of the lag still count as regular
            let ratio = interval / expected;
            let nearest = ratio.round().max(1.0);
            (ratio - nearest).abs() / nearest
        })
        .collect();

    let mean_deviation = deviations.iter().sum::<f64>() / deviations.len() as f64;
    (1.0 - mean_deviation * 2.0).clamp(0.0, 1.0)
}

/// Contrast between onset peaks and the envelope floor
fn beat_strength(onsets: &[f64]) -> f64 {
    let peaks = find_peaks(onsets);
    if peaks.is_empty() {
        return 0.0;
    }

    let mean = onsets.iter().sum::<f64>() / onsets.len() as f64;
    if mean <= f64::EPSILON {
        return 0.0;
    }

    let peak_mean =
        peaks.iter().map(|&i| onsets[i]).sum::<f64>() / peaks.len() as f64;
    let contrast = peak_mean / mean;

    (contrast / 10.0).clamp(0.0, 1.0)
}

fn find_peaks(values: &[f64]) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let threshold = mean * 1.5;

    (1..values.len() - 1)
        .filter(|&i| {
            values[i] > values[i - 1] && values[i] > values[i + 1] && values[i] > threshold
        })
        .collect()
}

/// Danceability from tempo estimate components
///
/// Tracks near 120 BPM with regular, strong beats score highest.
pub fn danceability(estimate: &TempoEstimate) -> f64 {
    let tempo_preference = 1.0 - ((estimate.bpm - 120.0).abs() / 80.0).min(1.0) * 0.3;
    let score =
        0.4 * estimate.regularity + 0.4 * estimate.beat_strength + 0.2 * tempo_preference;
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44_100;

    fn generate_sine(freq: f64, duration_secs: f64) -> Vec<f32> {
        let num_samples = (SAMPLE_RATE as f64 * duration_secs) as usize;
        (0..num_samples)
            .map(|i| {
                let t = i as f64 / SAMPLE_RATE as f64;
                (2.0 * std::f64::consts::PI * freq * t).sin() as f32
            })
            .collect()
    }

    /// White-noise-ish samples from a linear congruential generator
    fn generate_noise(duration_secs: f64) -> Vec<f32> {
        let num_samples = (SAMPLE_RATE as f64 * duration_secs) as usize;
        let mut state: u64 = 0x2545F4914F6CDD1D;
        (0..num_samples)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64 - 1.0) as f32 * 0.5
            })
            .collect()
    }

    /// Short decaying clicks spaced to the given BPM
    fn generate_click_track(bpm: f64, duration_secs: f64) -> Vec<f32> {
        let num_samples = (SAMPLE_RATE as f64 * duration_secs) as usize;
        let mut samples = vec![0.0f32; num_samples];
        let interval = (SAMPLE_RATE as f64 * 60.0 / bpm) as usize;
        let click_len = 512;

        let mut pos = 0;
        while pos < num_samples {
            for i in 0..click_len.min(num_samples - pos) {
                let decay = 1.0 - i as f32 / click_len as f32;
                let t = i as f64 / SAMPLE_RATE as f64;
                samples[pos + i] =
                    decay * (2.0 * std::f64::consts::PI * 1000.0 * t).sin() as f32;
            }
            pos += interval;
        }

        samples
    }

    #[test]
    fn test_centroid_tracks_tone_frequency() {
        let mut analyzer = SpectralAnalyzer::new(SAMPLE_RATE);
        let samples = generate_sine(1000.0, 0.1);
        let spectrum = analyzer.compute_spectrum(&samples[..FRAME_SIZE]);
        let centroid = analyzer.spectral_centroid(&spectrum);

        assert!(
            (centroid - 1000.0).abs() < 150.0,
            "centroid {} too far from 1000 Hz",
            centroid
        );
    }

    #[test]
    fn test_centroid_of_silence_is_zero() {
        let mut analyzer = SpectralAnalyzer::new(SAMPLE_RATE);
        let spectrum = analyzer.compute_spectrum(&vec![0.0f32; FRAME_SIZE]);
        assert_eq!(analyzer.spectral_centroid(&spectrum), 0.0);
    }

    #[test]
    fn test_flatness_separates_tone_from_noise() {
        let mut analyzer = SpectralAnalyzer::new(SAMPLE_RATE);

        let tone = generate_sine(440.0, 0.1);
        let tone_spectrum = analyzer.compute_spectrum(&tone[..FRAME_SIZE]);
        let tone_flatness = analyzer.spectral_flatness(&tone_spectrum);

        let noise = generate_noise(0.1);
        let noise_spectrum = analyzer.compute_spectrum(&noise[..FRAME_SIZE]);
        let noise_flatness = analyzer.spectral_flatness(&noise_spectrum);

        assert!(
            tone_flatness < noise_flatness,
            "tone flatness {} should be below noise flatness {}",
            tone_flatness,
            noise_flatness
        );
    }

    #[test]
    fn test_rolloff_below_nyquist() {
        let mut analyzer = SpectralAnalyzer::new(SAMPLE_RATE);
        let samples = generate_sine(2000.0, 0.1);
        let spectrum = analyzer.compute_spectrum(&samples[..FRAME_SIZE]);
        let rolloff = analyzer.spectral_rolloff(&spectrum, 0.85);

        assert!(rolloff > 0.0);
        assert!(rolloff <= SAMPLE_RATE as f64 / 2.0);
    }

    #[test]
    fn test_bandwidth_wider_for_noise() {
        let mut analyzer = SpectralAnalyzer::new(SAMPLE_RATE);

        let tone = generate_sine(1000.0, 0.1);
        let tone_spectrum = analyzer.compute_spectrum(&tone[..FRAME_SIZE]);
        let tone_centroid = analyzer.spectral_centroid(&tone_spectrum);
        let tone_bw = analyzer.spectral_bandwidth(&tone_spectrum, tone_centroid);

        let noise = generate_noise(0.1);
        let noise_spectrum = analyzer.compute_spectrum(&noise[..FRAME_SIZE]);
        let noise_centroid = analyzer.spectral_centroid(&noise_spectrum);
        let noise_bw = analyzer.spectral_bandwidth(&noise_spectrum, noise_centroid);

        assert!(noise_bw > tone_bw);
    }

    #[test]
    fn test_band_energy_ratio_concentrated_at_tone() {
        let mut analyzer = SpectralAnalyzer::new(SAMPLE_RATE);
        let samples = generate_sine(440.0, 0.1);
        let spectrum = analyzer.compute_spectrum(&samples[..FRAME_SIZE]);

        let in_band = analyzer.band_energy_ratio(&spectrum, 300.0, 600.0);
        let out_of_band = analyzer.band_energy_ratio(&spectrum, 5000.0, 10000.0);

        assert!(in_band > 0.8);
        assert!(out_of_band < 0.05);
    }

    #[test]
    fn test_zero_crossing_rate_scales_with_frequency() {
        let low = generate_sine(100.0, 0.1);
        let high = generate_sine(4000.0, 0.1);
        assert!(zero_crossing_rate(&high) > zero_crossing_rate(&low));
    }

    #[test]
    fn test_zero_crossing_rate_of_silence() {
        assert_eq!(zero_crossing_rate(&vec![0.1f32; 1000]), 0.0);
        assert_eq!(zero_crossing_rate(&[]), 0.0);
    }

    #[test]
    fn test_rms_of_full_scale_square() {
        let samples: Vec<f32> = (0..1000).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!((rms(&samples) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_tempo_estimate_on_click_track() {
        let samples = generate_click_track(120.0, 8.0);
        let mut analyzer = SpectralAnalyzer::new(SAMPLE_RATE);
        let onsets = onset_strength(&mut analyzer, &samples);
        let estimate = estimate_tempo(&onsets, SAMPLE_RATE, HOP_SIZE);

        // Octave errors (60 or 240) are the usual failure mode, allow half/double
        let candidates = [estimate.bpm, estimate.bpm * 2.0, estimate.bpm / 2.0];
        assert!(
            candidates.iter().any(|&bpm| (bpm - 120.0).abs() < 8.0),
            "estimated {} BPM for a 120 BPM click track",
            estimate.bpm
        );
    }

    #[test]
    fn test_tempo_estimate_empty_envelope_defaults() {
        let estimate = estimate_tempo(&[], SAMPLE_RATE, HOP_SIZE);
        assert_eq!(estimate.bpm, DEFAULT_BPM);
        assert_eq!(estimate.regularity, 0.0);
    }

    #[test]
    fn test_click_track_more_danceable_than_noise() {
        let mut analyzer = SpectralAnalyzer::new(SAMPLE_RATE);

        let clicks = generate_click_track(120.0, 8.0);
        let click_onsets = onset_strength(&mut analyzer, &clicks);
        let click_estimate = estimate_tempo(&click_onsets, SAMPLE_RATE, HOP_SIZE);

        let noise = generate_noise(8.0);
        let noise_onsets = onset_strength(&mut analyzer, &noise);
        let noise_estimate = estimate_tempo(&noise_onsets, SAMPLE_RATE, HOP_SIZE);

        assert!(danceability(&click_estimate) > danceability(&noise_estimate));
    }

    #[test]
    fn test_danceability_bounds() {
        let perfect = TempoEstimate {
            bpm: 120.0,
            regularity: 1.0,
            beat_strength: 1.0,
        };
        let score = danceability(&perfect);
        assert!(score > 0.9 && score <= 1.0);

        let flat = TempoEstimate {
            bpm: 200.0,
            regularity: 0.0,
            beat_strength: 0.0,
        };
        assert!(danceability(&flat) < 0.3);
    }

    #[test]
    fn test_moving_average_smooths() {
        let smoothed = moving_average(&[0.0, 10.0, 0.0, 10.0, 0.0], 3);
        assert_eq!(smoothed.len(), 5);
        assert!(smoothed[2] > 0.0 && smoothed[2] < 10.0);
    }
}
