use super::{BandSampler, SpectrumAnalyzer};
use anyhow::{bail, Result};
use log::info;
use std::path::Path;
use std::time::{Duration, Instant};

const FFT_SIZE: usize = 1024;

/// Band sampler over a decoded WAV file, read at wall-clock speed.
///
/// The file is not played back; the sampler only tracks where playback would
/// be and analyzes the window of samples starting there.
pub struct WavBandSampler {
    samples: Vec<f32>,
    sample_rate: u32,
    analyzer: SpectrumAnalyzer,
    started_at: Option<Instant>,
    frame: Vec<f32>,
}

impl WavBandSampler {
    pub fn open<P: AsRef<Path>>(path: P, bins: usize) -> Result<Self> {
        let mut reader = hound::WavReader::open(&path)?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            bail!("WAV file has no channels or no sample rate");
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };

        // Mix to mono for analysis
        let channels = spec.channels as usize;
        let samples: Vec<f32> = interleaved
            .chunks_exact(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect();

        info!(
            "Loaded {}: {} Hz, {} channel(s), {:.1}s",
            path.as_ref().display(),
            spec.sample_rate,
            spec.channels,
            samples.len() as f64 / spec.sample_rate as f64
        );

        Ok(Self::from_samples(samples, spec.sample_rate, bins))
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, bins: usize) -> Self {
        Self {
            samples,
            sample_rate: sample_rate.max(1),
            analyzer: SpectrumAnalyzer::new(FFT_SIZE, bins),
            started_at: None,
            frame: Vec::new(),
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Bins for the audio at `now`, or `None` before `start` and past the end.
    pub fn sample_at(&mut self, now: Instant) -> Option<&[f32]> {
        let started_at = self.started_at?;
        let elapsed = now.saturating_duration_since(started_at).as_secs_f64();
        let position = (elapsed * self.sample_rate as f64) as usize;
        if position >= self.samples.len() {
            return None;
        }

        let end = (position + self.analyzer.fft_size()).min(self.samples.len());
        self.frame = self.analyzer.analyze(&self.samples[position..end]);
        Some(&self.frame)
    }
}

impl BandSampler for WavBandSampler {
    /// Starts the clock on the first call.
    fn sample(&mut self) -> Option<&[f32]> {
        let now = Instant::now();
        if self.started_at.is_none() {
            self.start(now);
        }
        self.sample_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(seconds: f32, sample_rate: u32) -> Vec<f32> {
        let len = (seconds * sample_rate as f32) as usize;
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sample_rate as f32).sin() * 0.8)
            .collect()
    }

    #[test]
    fn nothing_before_start_or_after_end() {
        let mut sampler = WavBandSampler::from_samples(tone(1.0, 8000), 8000, 16);
        let t0 = Instant::now();
        assert!(sampler.sample_at(t0).is_none());

        sampler.start(t0);
        let bins = sampler.sample_at(t0 + Duration::from_millis(500)).map(<[f32]>::to_vec);
        assert_eq!(bins.map(|b| b.len()), Some(16));
        assert!(sampler.sample_at(t0 + Duration::from_millis(1001)).is_none());
    }

    #[test]
    fn reads_stereo_int_wav_as_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in tone(0.5, 8000) {
            let value = (sample * i16::MAX as f32) as i16;
            writer.write_sample(value).unwrap();
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        let mut sampler = WavBandSampler::open(&path, 8).unwrap();
        assert!((sampler.duration().as_secs_f64() - 0.5).abs() < 1e-3);

        let t0 = Instant::now();
        sampler.start(t0);
        let bins = sampler.sample_at(t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(bins.len(), 8);
        assert!(bins[0] > 0.5);
    }
}
