use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_FFT_SIZE: usize = 2048;
const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32768;

/// Byte spectrum settings, matching the defaults of a browser analyser node.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AnalyserSettings {
    pub fft_size: usize,
    /// Per-bin exponential smoothing between snapshots (0.0-1.0)
    pub smoothing_time_constant: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            smoothing_time_constant: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

/// Windowed FFT producing 0-255 magnitudes per bin.
pub struct SpectrumAnalyzer {
    settings: AnalyserSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(mut settings: AnalyserSettings) -> Self {
        let size = settings
            .fft_size
            .clamp(MIN_FFT_SIZE, MAX_FFT_SIZE)
            .next_power_of_two();
        if size != settings.fft_size {
            log::warn!("FFT size {} adjusted to {}", settings.fft_size, size);
            settings.fft_size = size;
        }
        if settings.max_db <= settings.min_db {
            log::warn!(
                "Analyser dB range [{}, {}] is empty, using defaults",
                settings.min_db, settings.max_db
            );
            let defaults = AnalyserSettings::default();
            settings.min_db = defaults.min_db;
            settings.max_db = defaults.max_db;
        }
        settings.smoothing_time_constant = settings.smoothing_time_constant.clamp(0.0, 1.0);

        let fft = FftPlanner::<f32>::new().plan_fft_forward(size);

        Self {
            window: blackman_window(size),
            smoothed: vec![0.0; size / 2],
            buffer: vec![Complex::new(0.0, 0.0); size],
            fft,
            settings,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.settings.fft_size
    }

    /// Analyses the most recent `fft_size` samples. Shorter input is treated
    /// as preceded by silence.
    pub fn process(&mut self, samples: &[f32]) -> Vec<u8> {
        let size = self.fft_size();
        let tail = &samples[samples.len().saturating_sub(size)..];
        let pad = size - tail.len();

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < pad { 0.0 } else { tail[i - pad] };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let tau = self.settings.smoothing_time_constant;
        let scale = 255.0 / (self.settings.max_db - self.settings.min_db);

        self.smoothed
            .iter_mut()
            .zip(self.buffer.iter())
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() / size as f32;
                *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
                if !smoothed.is_finite() {
                    *smoothed = 0.0;
                }
                if *smoothed <= 0.0 {
                    return 0;
                }
                let db = 20.0 * smoothed.log10();
                (scale * (db - self.settings.min_db)).floor().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * std::f32::consts::PI * x).cos()
                + a2 * (4.0 * std::f32::consts::PI * x).cos()
        })
        .collect()
}
