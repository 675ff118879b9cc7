//! Analysis Tap
//!
//! The [`Analyser`] node sits in the signal path just before the output sink and
//! passes audio through unchanged while recording it into a ring buffer. The
//! matching [`AnalysisTap`] is the read-only, pull-based view that visualization
//! code polls for the current waveform or spectrum. Nothing is pushed.

use crate::config::AnalyserMode;
use crate::port::{GraphModule, PortDef, PortSpec, PortValues, SignalKind};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Floor reported for empty spectrum bins
const SILENCE_DB: f32 = -120.0;

/// Fixed-capacity sample history
#[derive(Debug)]
struct ScopeBuffer {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl ScopeBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
        }
    }

    fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Samples ordered oldest to newest
    fn ordered(&self) -> Vec<f32> {
        let (newest, oldest) = self.buffer.split_at(self.write_pos);
        oldest.iter().chain(newest.iter()).copied().collect()
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Read-only view of the most recent output samples
#[derive(Clone)]
pub struct AnalysisTap {
    shared: Arc<Mutex<ScopeBuffer>>,
    fft: Arc<dyn Fft<f32>>,
    window: Arc<[f32]>,
    mode: AnalyserMode,
}

impl AnalysisTap {
    /// Create a tap holding `size` samples
    pub fn new(size: usize, mode: AnalyserMode) -> Self {
        let size = size.max(1);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);

        // Hann window
        let window: Vec<f32> = (0..size)
            .map(|i| {
                if size > 1 {
                    0.5 * (1.0 - (2.0 * PI * i as f32 / (size - 1) as f32).cos())
                } else {
                    1.0
                }
            })
            .collect();

        Self {
            shared: Arc::new(Mutex::new(ScopeBuffer::new(size))),
            fft,
            window: window.into(),
            mode,
        }
    }

    /// Number of samples held
    pub fn size(&self) -> usize {
        self.window.len()
    }

    /// Readback mode served by [`AnalysisTap::read`]
    pub fn mode(&self) -> AnalyserMode {
        self.mode
    }

    /// Current time-domain buffer, oldest sample first
    pub fn waveform(&self) -> Vec<f32> {
        self.lock().ordered()
    }

    /// Current magnitude spectrum in dB, `size / 2` bins from DC upward
    pub fn spectrum(&self) -> Vec<f32> {
        let samples = self.waveform();
        let size = samples.len();
        let mut scratch: Vec<Complex<f32>> = samples
            .iter()
            .zip(self.window.iter())
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();

        self.fft.process(&mut scratch);

        let scale = 1.0 / size as f32;
        scratch
            .iter()
            .take((size / 2).max(1))
            .map(|bin| {
                let magnitude = bin.norm() * scale;
                if magnitude > 0.0 {
                    (20.0 * magnitude.log10()).max(SILENCE_DB)
                } else {
                    SILENCE_DB
                }
            })
            .collect()
    }

    /// Readback in the configured mode
    pub fn read(&self) -> Vec<f32> {
        match self.mode {
            AnalyserMode::Waveform => self.waveform(),
            AnalyserMode::Fft => self.spectrum(),
        }
    }

    /// Node that feeds this tap
    pub fn analyser(&self) -> Analyser {
        Analyser::new(Arc::clone(&self.shared))
    }

    fn lock(&self) -> MutexGuard<'_, ScopeBuffer> {
        // A poisoned buffer only ever holds samples; keep reading it
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for AnalysisTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisTap")
            .field("size", &self.size())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Pass-through node that records into an [`AnalysisTap`]
pub struct Analyser {
    shared: Arc<Mutex<ScopeBuffer>>,
    spec: PortSpec,
}

impl Analyser {
    fn new(shared: Arc<Mutex<ScopeBuffer>>) -> Self {
        Self {
            shared,
            spec: PortSpec {
                inputs: vec![PortDef::new(0, "in", SignalKind::Audio)],
                outputs: vec![PortDef::new(10, "out", SignalKind::Audio)],
            },
        }
    }
}

impl GraphModule for Analyser {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let input = inputs.get_or(0, 0.0);
        if let Ok(mut buffer) = self.shared.lock() {
            buffer.write(input as f32);
        }
        outputs.set(10, input);
    }

    fn reset(&mut self) {
        if let Ok(mut buffer) = self.shared.lock() {
            buffer.clear();
        }
    }

    fn set_sample_rate(&mut self, _: f64) {}

    fn type_id(&self) -> &'static str {
        "analyser"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(analyser: &mut Analyser, samples: &[f64]) {
        for &sample in samples {
            let mut inputs = PortValues::new();
            inputs.set(0, sample);
            let mut outputs = PortValues::new();
            analyser.tick(&inputs, &mut outputs);
            assert_eq!(outputs.get(10), Some(sample));
        }
    }

    #[test]
    fn test_waveform_is_ordered_oldest_first() {
        let tap = AnalysisTap::new(4, AnalyserMode::Waveform);
        let mut analyser = tap.analyser();

        feed(&mut analyser, &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert_eq!(tap.waveform(), vec![0.3, 0.4, 0.5, 0.6]);
        assert_eq!(tap.read(), tap.waveform());
    }

    #[test]
    fn test_spectrum_of_silence() {
        let tap = AnalysisTap::new(64, AnalyserMode::Fft);
        let spectrum = tap.read();
        assert_eq!(spectrum.len(), 32);
        assert!(spectrum.iter().all(|&db| db == SILENCE_DB));
    }

    #[test]
    fn test_spectrum_peak_at_tone_bin() {
        let size = 256;
        let tap = AnalysisTap::new(size, AnalyserMode::Fft);
        let mut analyser = tap.analyser();

        // Exactly 16 cycles across the buffer
        let samples: Vec<f64> = (0..size)
            .map(|i| (2.0 * std::f64::consts::PI * 16.0 * i as f64 / size as f64).sin())
            .collect();
        feed(&mut analyser, &samples);

        let spectrum = tap.spectrum();
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(16));
    }

    #[test]
    fn test_reset_clears_history() {
        let tap = AnalysisTap::new(3, AnalyserMode::Waveform);
        let mut analyser = tap.analyser();
        feed(&mut analyser, &[1.0, 1.0]);
        analyser.reset();
        assert_eq!(tap.waveform(), vec![0.0, 0.0, 0.0]);
    }
}
