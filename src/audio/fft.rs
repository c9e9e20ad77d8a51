use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Magnitudes at or below this level map to 0.0
const DB_FLOOR: f32 = -100.0;
/// Magnitudes at or above this level map to 1.0
const DB_CEILING: f32 = -30.0;

/// Windowed FFT that folds the spectrum into a fixed number of 0..1 bins.
pub struct SpectrumAnalyzer {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    bins: usize,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize, bins: usize) -> Self {
        let fft_size = fft_size.max(2);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft_size,
            fft,
            window: Self::hann_window(fft_size),
            bins: bins.clamp(1, fft_size / 2),
        }
    }

    fn hann_window(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Analyze up to `fft_size` samples; shorter input is zero padded.
    pub fn analyze(&self, samples: &[f32]) -> Vec<f32> {
        let spectrum = self.compute_fft(samples);
        self.fold(&spectrum)
    }

    fn compute_fft(&self, samples: &[f32]) -> Vec<f32> {
        let len = self.fft_size.min(samples.len());
        let mut buffer: Vec<Complex<f32>> = (0..len)
            .map(|i| Complex::new(samples[i] * self.window[i], 0.0))
            .collect();
        buffer.resize(self.fft_size, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        buffer[..self.fft_size / 2]
            .iter()
            .map(|c| c.norm() * 2.0 / self.fft_size as f32)
            .collect()
    }

    /// Average linear magnitudes into `bins` equal-width buckets, then map
    /// each bucket from decibels into 0..1.
    fn fold(&self, spectrum: &[f32]) -> Vec<f32> {
        let per_bin = spectrum.len() / self.bins;
        (0..self.bins)
            .map(|bin| {
                let start = bin * per_bin;
                let end = if bin + 1 == self.bins { spectrum.len() } else { start + per_bin };
                let mean = spectrum[start..end].iter().sum::<f32>() / (end - start) as f32;
                Self::normalize_db(mean)
            })
            .collect()
    }

    fn normalize_db(magnitude: f32) -> f32 {
        if magnitude <= 0.0 {
            return 0.0;
        }
        let db = 20.0 * magnitude.log10();
        ((db - DB_FLOOR) / (DB_CEILING - DB_FLOOR)).clamp(0.0, 1.0)
    }
}
