pub mod fft;
pub mod playback;

pub use fft::SpectrumAnalyzer;
pub use playback::WavBandSampler;

/// Produces one frame of normalized frequency bins per tick.
///
/// Bins are in 0.0..=1.0, lowest frequency first. `None` means no audio is
/// available this tick (not started, finished, or device gone).
pub trait BandSampler {
    fn sample(&mut self) -> Option<&[f32]>;
}

/// Sampler for sessions without local audio.
pub struct SilentSampler;

impl BandSampler for SilentSampler {
    fn sample(&mut self) -> Option<&[f32]> {
        None
    }
}
