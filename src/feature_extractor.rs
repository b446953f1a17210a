use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::PreprocessingConfig;
use crate::error::{Result, TrainerError};
use crate::types::{FeatureVector, RawSample};

/// Características por canal: RMS, MAV, longitud de onda, cruces por cero, potencia en banda
pub const FEATURES_PER_CHANNEL: usize = 5;

/// Ventana cruda → vector de características de longitud fija
pub trait WindowFeatures {
    fn extract(&mut self, window: &[RawSample]) -> Result<FeatureVector>;
}

pub struct EmgFeatureExtractor {
    planner: FftPlanner<f32>,
    sample_rate: f32,
    low_freq: f32,
    high_freq: f32,
}

impl EmgFeatureExtractor {
    pub fn new(config: &PreprocessingConfig) -> Self {
        Self {
            planner: FftPlanner::new(),
            sample_rate: config.sample_rate,
            low_freq: config.low_freq,
            high_freq: config.high_freq,
        }
    }

    /// Extrae una columna (canal) de la ventana
    fn channel(window: &[RawSample], idx: usize) -> Vec<f32> {
        window.iter().map(|sample| sample[idx]).collect()
    }

    fn time_domain_features(signal: &[f32]) -> [f32; 4] {
        let n = signal.len() as f32;
        let mean = signal.iter().sum::<f32>() / n;

        let rms = (signal.iter().map(|x| x * x).sum::<f32>() / n).sqrt();
        let mav = signal.iter().map(|x| x.abs()).sum::<f32>() / n;
        let waveform_length: f32 = signal.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        // Cruces por cero de la señal sin componente DC
        let zero_crossings = signal
            .windows(2)
            .filter(|w| (w[0] - mean) * (w[1] - mean) < 0.0)
            .count() as f32;

        [rms, mav, waveform_length, zero_crossings]
    }

    /// Potencia de la señal (sin media) dentro de `[low_freq, high_freq]`
    fn band_power(&mut self, signal: &[f32]) -> f32 {
        if signal.len() < 2 {
            return 0.0;
        }

        let mean = signal.iter().sum::<f32>() / signal.len() as f32;
        let mut centered: Vec<Complex<f32>> = signal
            .iter()
            .map(|&x| Complex::new(x - mean, 0.0))
            .collect();

        let fft = self.planner.plan_fft_forward(centered.len());
        fft.process(&mut centered);

        // PSD de frecuencias positivas: |X|² / N
        let n = signal.len() as f32;
        let resolution = self.sample_rate / n;
        let psd: Vec<f32> = centered
            .iter()
            .take(centered.len() / 2 + 1)
            .map(|c| c.norm_sqr() / n)
            .collect();

        let mut power = 0.0;
        for i in 1..psd.len() {
            let f0 = (i - 1) as f32 * resolution;
            let f1 = i as f32 * resolution;
            if f0 >= self.low_freq && f1 <= self.high_freq {
                power += 0.5 * (psd[i - 1] + psd[i]) * resolution;
            }
        }
        power
    }
}

impl WindowFeatures for EmgFeatureExtractor {
    /// `[canales * FEATURES_PER_CHANNEL]`, agrupado por canal
    fn extract(&mut self, window: &[RawSample]) -> Result<FeatureVector> {
        let channels = window.first().map_or(0, Vec::len);
        if channels == 0 {
            return Err(TrainerError::invalid("empty window"));
        }
        if window.iter().any(|sample| sample.len() != channels) {
            return Err(TrainerError::invalid(format!(
                "window samples must all have {} channels",
                channels
            )));
        }

        let mut features = Vec::with_capacity(channels * FEATURES_PER_CHANNEL);
        for ch in 0..channels {
            let signal = Self::channel(window, ch);
            features.extend(Self::time_domain_features(&signal));
            features.push(self.band_power(&signal));
        }
        Ok(features)
    }
}
