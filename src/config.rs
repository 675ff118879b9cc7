//! Configuration Snapshots
//!
//! The hosting application owns the synthesizer settings and pushes complete,
//! immutable snapshots into the engine. The engine never mutates a snapshot; it
//! reads a clamped copy produced by [`SynthSnapshot::sanitized`].
//!
//! [`EngineConfig`] holds the settings fixed at engine construction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Oscillator waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OscillatorShape {
    Sine,
    Square,
    Triangle,
    #[default]
    Sawtooth,
    Pulse,
    Pwm,
}

impl OscillatorShape {
    /// Pulse-family shapes take a width and have no fat variant
    pub fn is_pulse(&self) -> bool {
        matches!(self, OscillatorShape::Pulse | OscillatorShape::Pwm)
    }

    pub(crate) fn index(&self) -> f64 {
        match self {
            OscillatorShape::Sine => 0.0,
            OscillatorShape::Square => 1.0,
            OscillatorShape::Triangle => 2.0,
            OscillatorShape::Sawtooth => 3.0,
            OscillatorShape::Pulse => 4.0,
            OscillatorShape::Pwm => 5.0,
        }
    }

    pub(crate) fn from_index(index: f64) -> Self {
        match index.round() as i64 {
            0 => OscillatorShape::Sine,
            1 => OscillatorShape::Square,
            2 => OscillatorShape::Triangle,
            4 => OscillatorShape::Pulse,
            5 => OscillatorShape::Pwm,
            _ => OscillatorShape::Sawtooth,
        }
    }
}

/// Attack/decay/sustain/release shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    /// Seconds
    pub attack: f64,
    /// Seconds
    pub decay: f64,
    /// Level, 0–1
    pub sustain: f64,
    /// Seconds
    pub release: f64,
}

impl Adsr {
    pub const fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Clamp every stage into its valid range
    pub fn sanitized(&self) -> Self {
        Self {
            attack: non_negative(self.attack),
            decay: non_negative(self.decay),
            sustain: clamp_or(self.sustain, 0.0, 1.0, 0.0),
            release: non_negative(self.release),
        }
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self::new(0.01, 0.2, 0.5, 1.0)
    }
}

/// Settings for one oscillator voice
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub shape: OscillatorShape,
    /// Stacked detuned copies; ignored for pulse shapes
    pub fat: bool,
    /// Fine detune in cents
    pub detune: f64,
    /// Coarse shift in semitones, −24..24
    pub semitone: i32,
    /// Fat-mode spread in cents, 0–100
    pub spread: f64,
    /// Pulse width, 0–1 (pulse and pwm only)
    pub pulse_width: f64,
    /// Start phase in degrees, 0–360
    pub phase: f64,
    pub envelope: Adsr,
    /// Output level in dB, −60..+6; `f64::NEG_INFINITY` mutes
    pub level_db: f64,
}

impl VoiceConfig {
    /// Clamp every field into its documented range
    pub fn sanitized(&self) -> Self {
        Self {
            shape: self.shape,
            fat: self.fat && !self.shape.is_pulse(),
            detune: finite_or(self.detune, 0.0),
            semitone: self.semitone.clamp(-24, 24),
            spread: clamp_or(self.spread, 0.0, 100.0, 0.0),
            pulse_width: clamp_or(self.pulse_width, 0.0, 1.0, 0.5),
            phase: clamp_or(self.phase, 0.0, 360.0, 0.0),
            envelope: self.envelope.sanitized(),
            level_db: clamp_level_db(self.level_db),
        }
    }

    /// Net detune in cents
    pub fn total_detune(&self) -> f64 {
        self.detune + f64::from(self.semitone) * 100.0
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            shape: OscillatorShape::Sawtooth,
            fat: false,
            detune: 0.0,
            semitone: 0,
            spread: 20.0,
            pulse_width: 0.5,
            phase: 0.0,
            envelope: Adsr::default(),
            level_db: -12.0,
        }
    }
}

/// Biquad response of the shared filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Allpass,
    Lowshelf,
    Highshelf,
    Peaking,
}

impl FilterType {
    pub(crate) fn index(&self) -> f64 {
        match self {
            FilterType::Lowpass => 0.0,
            FilterType::Highpass => 1.0,
            FilterType::Bandpass => 2.0,
            FilterType::Notch => 3.0,
            FilterType::Allpass => 4.0,
            FilterType::Lowshelf => 5.0,
            FilterType::Highshelf => 6.0,
            FilterType::Peaking => 7.0,
        }
    }

    pub(crate) fn from_index(index: f64) -> Self {
        match index.round() as i64 {
            1 => FilterType::Highpass,
            2 => FilterType::Bandpass,
            3 => FilterType::Notch,
            4 => FilterType::Allpass,
            5 => FilterType::Lowshelf,
            6 => FilterType::Highshelf,
            7 => FilterType::Peaking,
            _ => FilterType::Lowpass,
        }
    }
}

/// Distortion transfer curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistortionCurve {
    #[default]
    Soft,
    Hard,
    Fuzz,
}

impl DistortionCurve {
    pub(crate) fn index(&self) -> f64 {
        match self {
            DistortionCurve::Soft => 0.0,
            DistortionCurve::Hard => 1.0,
            DistortionCurve::Fuzz => 2.0,
        }
    }

    pub(crate) fn from_index(index: f64) -> Self {
        match index.round() as i64 {
            1 => DistortionCurve::Hard,
            2 => DistortionCurve::Fuzz,
            _ => DistortionCurve::Soft,
        }
    }
}

/// Settings for the shared filter and distortion stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub filter_type: FilterType,
    /// Base cutoff in Hz, 20–20000
    pub frequency: f64,
    /// Resonance
    pub q: f64,
    /// Envelope-to-cutoff amount in percent, −100..100
    pub envelope_amount: f64,
    pub distortion_enabled: bool,
    /// 0–1
    pub distortion_amount: f64,
    pub distortion_curve: DistortionCurve,
}

impl FilterConfig {
    /// Clamp every field into its documented range
    pub fn sanitized(&self) -> Self {
        Self {
            filter_type: self.filter_type,
            frequency: clamp_or(self.frequency, 20.0, 20_000.0, 1000.0),
            q: if self.q.is_nan() { 1.0 } else { self.q.max(0.0).min(1000.0) },
            envelope_amount: clamp_or(self.envelope_amount, -100.0, 100.0, 0.0),
            distortion_enabled: self.distortion_enabled,
            distortion_amount: clamp_or(self.distortion_amount, 0.0, 1.0, 0.0),
            distortion_curve: self.distortion_curve,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Lowpass,
            frequency: 7000.0,
            q: 1.0,
            envelope_amount: 50.0,
            distortion_enabled: false,
            distortion_amount: 0.3,
            distortion_curve: DistortionCurve::Soft,
        }
    }
}

/// Cross-voice modulation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModulationType {
    #[default]
    None,
    RingMod,
    Fm,
    HardSync,
}

impl ModulationType {
    pub const ALL: [ModulationType; 4] = [
        ModulationType::None,
        ModulationType::RingMod,
        ModulationType::Fm,
        ModulationType::HardSync,
    ];
}

impl fmt::Display for ModulationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModulationType::None => "none",
            ModulationType::RingMod => "ringmod",
            ModulationType::Fm => "fm",
            ModulationType::HardSync => "hardsync",
        };
        f.write_str(name)
    }
}

/// Settings for the cross-voice modulation path
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulationConfig {
    pub modulation_type: ModulationType,
    /// Percent, 0–100
    pub amount: f64,
}

impl ModulationConfig {
    pub fn sanitized(&self) -> Self {
        Self {
            modulation_type: self.modulation_type,
            amount: clamp_or(self.amount, 0.0, 100.0, 0.0),
        }
    }
}

/// Where voice 2's envelope is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeDestination {
    /// Voice 2's envelope shapes its own amplitude
    #[default]
    VoiceAmplitude,
    /// Voice 2's envelope sweeps the shared filter cutoff
    FilterCutoff,
}

/// A complete configuration snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthSnapshot {
    pub voice1: VoiceConfig,
    pub voice2: VoiceConfig,
    pub filter: FilterConfig,
    pub modulation: ModulationConfig,
    pub envelope_destination: EnvelopeDestination,
}

impl SynthSnapshot {
    /// A copy with every field clamped into range
    pub fn sanitized(&self) -> Self {
        Self {
            voice1: self.voice1.sanitized(),
            voice2: self.voice2.sanitized(),
            filter: self.filter.sanitized(),
            modulation: self.modulation.sanitized(),
            envelope_destination: self.envelope_destination,
        }
    }

    /// Whether the two snapshots differ in a field that changes graph topology
    pub fn topology_differs(&self, other: &SynthSnapshot) -> bool {
        self.modulation.modulation_type != other.modulation.modulation_type
            || self.envelope_destination != other.envelope_destination
    }

    /// Serialize to a JSON string
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from a JSON string; missing fields take their defaults
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for SynthSnapshot {
    fn default() -> Self {
        Self {
            voice1: VoiceConfig::default(),
            voice2: VoiceConfig {
                shape: OscillatorShape::Square,
                ..VoiceConfig::default()
            },
            filter: FilterConfig::default(),
            modulation: ModulationConfig::default(),
            envelope_destination: EnvelopeDestination::VoiceAmplitude,
        }
    }
}

/// Which readback the analysis tap serves by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyserMode {
    #[default]
    Waveform,
    Fft,
}

/// Settings fixed at engine construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: f64,
    /// Simultaneous note instances per voice
    pub max_polyphony: usize,
    /// Analysis buffer length in samples
    pub analyser_size: usize,
    pub analyser_mode: AnalyserMode,
    /// Distortion curve table length
    pub curve_resolution: usize,
    /// Maximum number of nodes the runtime accepts
    pub node_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            max_polyphony: 32,
            analyser_size: 2048,
            analyser_mode: AnalyserMode::Waveform,
            curve_resolution: 8192,
            node_limit: None,
        }
    }
}

impl EngineConfig {
    /// Lowest sample rate the runtime accepts
    pub const MIN_SAMPLE_RATE: f64 = 8000.0;
    pub const MAX_SAMPLE_RATE: f64 = 384_000.0;

    /// Clamp construction settings into a range the runtime can render
    ///
    /// A non-finite or non-positive sample rate falls back to 44.1 kHz.
    pub fn sanitized(&self) -> Self {
        let sample_rate = if self.sample_rate.is_finite() && self.sample_rate > 0.0 {
            self.sample_rate
                .clamp(Self::MIN_SAMPLE_RATE, Self::MAX_SAMPLE_RATE)
        } else {
            44100.0
        };
        Self {
            sample_rate,
            max_polyphony: self.max_polyphony.max(1),
            ..self.clone()
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_node_limit(mut self, limit: usize) -> Self {
        self.node_limit = Some(limit);
        self
    }
}

/// Convert decibels to linear gain; −∞ (and anything at or below the floor) is silence
pub fn db_to_gain(db: f64) -> f64 {
    if db == f64::NEG_INFINITY {
        0.0
    } else {
        libm::pow(10.0, db / 20.0)
    }
}

fn clamp_level_db(db: f64) -> f64 {
    if db == f64::NEG_INFINITY {
        db
    } else {
        clamp_or(db, -60.0, 6.0, -60.0)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.max(0.0)
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn clamp_or(value: f64, min: f64, max: f64, nan_fallback: f64) -> f64 {
    if value.is_nan() {
        nan_fallback
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_engine_config_sample_rate() {
        let low = EngineConfig::default().with_sample_rate(16.0).sanitized();
        assert_eq!(low.sample_rate, EngineConfig::MIN_SAMPLE_RATE);

        for rate in [0.0, -48000.0, f64::NAN, f64::INFINITY] {
            let config = EngineConfig::default().with_sample_rate(rate).sanitized();
            assert_eq!(config.sample_rate, 44100.0);
        }

        let normal = EngineConfig::default().with_sample_rate(48000.0).sanitized();
        assert_eq!(normal, EngineConfig::default().with_sample_rate(48000.0));
    }

    #[test]
    fn test_voice_clamping() {
        let config = VoiceConfig {
            semitone: 40,
            spread: 250.0,
            pulse_width: -1.0,
            phase: 720.0,
            level_db: 20.0,
            envelope: Adsr::new(-1.0, f64::NAN, 3.0, -0.5),
            ..VoiceConfig::default()
        }
        .sanitized();

        assert_eq!(config.semitone, 24);
        assert_eq!(config.spread, 100.0);
        assert_eq!(config.pulse_width, 0.0);
        assert_eq!(config.phase, 360.0);
        assert_eq!(config.level_db, 6.0);
        assert_eq!(config.envelope, Adsr::new(0.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn test_mute_sentinel_survives_sanitizing() {
        let config = VoiceConfig {
            level_db: f64::NEG_INFINITY,
            ..VoiceConfig::default()
        };
        assert_eq!(config.sanitized().level_db, f64::NEG_INFINITY);
        assert_eq!(db_to_gain(f64::NEG_INFINITY), 0.0);
        assert_relative_eq!(db_to_gain(-6.0), 0.501_187, epsilon = 1e-6);
    }

    #[test]
    fn test_pulse_shape_drops_fat() {
        let config = VoiceConfig {
            shape: OscillatorShape::Pwm,
            fat: true,
            ..VoiceConfig::default()
        };
        assert!(!config.sanitized().fat);
    }

    #[test]
    fn test_total_detune() {
        let config = VoiceConfig {
            detune: 7.0,
            semitone: -2,
            ..VoiceConfig::default()
        };
        assert_eq!(config.total_detune(), -193.0);
    }

    #[test]
    fn test_filter_clamping() {
        let config = FilterConfig {
            frequency: 5.0,
            q: -3.0,
            envelope_amount: 150.0,
            distortion_amount: 2.0,
            ..FilterConfig::default()
        }
        .sanitized();

        assert_eq!(config.frequency, 20.0);
        assert_eq!(config.q, 0.0);
        assert_eq!(config.envelope_amount, 100.0);
        assert_eq!(config.distortion_amount, 1.0);
    }

    #[test]
    fn test_topology_diff() {
        let base = SynthSnapshot::default();
        let mut amount_only = base;
        amount_only.modulation.amount = 80.0;
        amount_only.filter.frequency = 300.0;
        assert!(!base.topology_differs(&amount_only));

        let mut fm = base;
        fm.modulation.modulation_type = ModulationType::Fm;
        assert!(base.topology_differs(&fm));

        let mut routed = base;
        routed.envelope_destination = EnvelopeDestination::FilterCutoff;
        assert!(base.topology_differs(&routed));
    }

    #[test]
    fn test_enum_indices_round_trip() {
        for shape in [
            OscillatorShape::Sine,
            OscillatorShape::Square,
            OscillatorShape::Triangle,
            OscillatorShape::Sawtooth,
            OscillatorShape::Pulse,
            OscillatorShape::Pwm,
        ] {
            assert_eq!(OscillatorShape::from_index(shape.index()), shape);
        }
        for curve in [
            DistortionCurve::Soft,
            DistortionCurve::Hard,
            DistortionCurve::Fuzz,
        ] {
            assert_eq!(DistortionCurve::from_index(curve.index()), curve);
        }
        assert_eq!(FilterType::from_index(FilterType::Peaking.index()), FilterType::Peaking);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_partial_snapshot() {
        let json = r#"{
            "modulation": { "modulation_type": "ringmod", "amount": 40.0 },
            "envelope_destination": "filterCutoff"
        }"#;
        let snapshot = SynthSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.modulation.modulation_type, ModulationType::RingMod);
        assert_eq!(
            snapshot.envelope_destination,
            EnvelopeDestination::FilterCutoff
        );
        assert_eq!(snapshot.voice2.shape, OscillatorShape::Square);

        let text = snapshot.to_json().unwrap();
        assert_eq!(SynthSnapshot::from_json(&text).unwrap(), snapshot);
    }
}
