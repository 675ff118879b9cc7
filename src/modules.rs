//! Node Implementations
//!
//! The built-in node runtime: a polyphonic oscillator voice, a monophonic
//! envelope, gain and multiply stages, a biquad filter, a waveshaping distortion
//! with wet/dry mix, and the output sink.
//!
//! Parameter-style inputs (`frequency`, `gain`, `factor`) are added to the
//! node's base parameter value, so an unconnected input leaves the base value
//! untouched.

use crate::config::{Adsr, DistortionCurve, FilterType, OscillatorShape};
use crate::curve;
use crate::note::{Note, ScheduleTime};
use crate::port::{GraphModule, ParamId, PortDef, PortSpec, PortValues, SignalKind};
use std::cmp::Reverse;
use std::f64::consts::{PI, TAU};

/// Rate of the internal width sweep of the pwm shape
const PWM_RATE_HZ: f64 = 0.4;

/// Copies rendered by a fat oscillator
const FAT_COUNT: usize = 3;

// =============================================================================
// Envelope state
// =============================================================================

/// ADSR stage enumeration
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear-segment ADSR state shared by polyphonic and monophonic envelopes
#[derive(Debug, Clone, Copy)]
struct EnvelopeState {
    stage: Stage,
    level: f64,
    release_from: f64,
}

impl EnvelopeState {
    fn new() -> Self {
        Self {
            stage: Stage::Idle,
            level: 0.0,
            release_from: 0.0,
        }
    }

    /// Start (or restart) the attack from the current level
    fn attack(&mut self) {
        self.stage = Stage::Attack;
    }

    fn release(&mut self) {
        if self.stage != Stage::Idle {
            self.stage = Stage::Release;
            self.release_from = self.level;
        }
    }

    fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    fn is_held(&self) -> bool {
        matches!(self.stage, Stage::Attack | Stage::Decay | Stage::Sustain)
    }

    /// Advance one sample and return the new level
    fn advance(&mut self, adsr: &Adsr, sample_rate: f64) -> f64 {
        match self.stage {
            Stage::Idle => {
                self.level = 0.0;
            }
            Stage::Attack => {
                let samples = adsr.attack * sample_rate;
                self.level = if samples < 1.0 {
                    1.0
                } else {
                    self.level + 1.0 / samples
                };
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                let samples = adsr.decay * sample_rate;
                self.level = if samples < 1.0 {
                    adsr.sustain
                } else {
                    self.level - (1.0 - adsr.sustain) / samples
                };
                if self.level <= adsr.sustain {
                    self.level = adsr.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {
                self.level = adsr.sustain;
            }
            Stage::Release => {
                let samples = adsr.release * sample_rate;
                self.level = if samples < 1.0 {
                    0.0
                } else {
                    self.level - self.release_from.max(1e-6) / samples
                };
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}

fn adsr_param(adsr: &Adsr, id: ParamId, base: ParamId) -> Option<f64> {
    match id.checked_sub(base)? {
        0 => Some(adsr.attack),
        1 => Some(adsr.decay),
        2 => Some(adsr.sustain),
        3 => Some(adsr.release),
        _ => None,
    }
}

fn set_adsr_param(adsr: &mut Adsr, id: ParamId, base: ParamId, value: f64) {
    match id.checked_sub(base) {
        Some(0) => adsr.attack = value.max(0.0),
        Some(1) => adsr.decay = value.max(0.0),
        Some(2) => adsr.sustain = value.clamp(0.0, 1.0),
        Some(3) => adsr.release = value.max(0.0),
        _ => {}
    }
}

// =============================================================================
// Polyphonic oscillator voice
// =============================================================================

/// One sounding note inside a [`PolyOscillator`]
struct NoteInstance {
    note: Note,
    frequency: f64,
    velocity: f64,
    phases: [f64; FAT_COUNT],
    envelope: EnvelopeState,
    age: u64,
}

/// Polyphonic oscillator with a per-note envelope
///
/// Every note-on starts an independent instance that shares the node's current
/// waveform and ADSR settings. The `frequency` input is added, in Hz, to the
/// pitch of every instance (used as the FM destination).
pub struct PolyOscillator {
    instances: Vec<NoteInstance>,
    max_polyphony: usize,
    shape: OscillatorShape,
    fat: bool,
    spread: f64,
    pulse_width: f64,
    phase: f64,
    detune: f64,
    envelope: Adsr,
    pwm_phase: f64,
    sample_rate: f64,
    spec: PortSpec,
}

impl PolyOscillator {
    pub const SHAPE: ParamId = 0;
    pub const FAT: ParamId = 1;
    pub const SPREAD: ParamId = 2;
    pub const PULSE_WIDTH: ParamId = 3;
    pub const PHASE: ParamId = 4;
    pub const DETUNE: ParamId = 5;
    pub const ATTACK: ParamId = 6;
    pub const DECAY: ParamId = 7;
    pub const SUSTAIN: ParamId = 8;
    pub const RELEASE: ParamId = 9;
    /// Read-only: instances not yet released
    pub const HELD: ParamId = 10;
    /// Read-only: instances still producing sound
    pub const SOUNDING: ParamId = 11;

    pub fn new(sample_rate: f64, max_polyphony: usize) -> Self {
        Self {
            instances: Vec::new(),
            max_polyphony: max_polyphony.max(1),
            shape: OscillatorShape::Sawtooth,
            fat: false,
            spread: 0.0,
            pulse_width: 0.5,
            phase: 0.0,
            detune: 0.0,
            envelope: Adsr::default(),
            pwm_phase: 0.0,
            sample_rate,
            spec: PortSpec {
                inputs: vec![PortDef::new(0, "frequency", SignalKind::Frequency)],
                outputs: vec![PortDef::new(10, "out", SignalKind::Audio)],
            },
        }
    }

    fn duty(&self) -> f64 {
        let width = self.pulse_width.clamp(0.01, 0.99);
        match self.shape {
            OscillatorShape::Pwm => {
                let depth = width.min(1.0 - width) - 0.01;
                width + depth * (self.pwm_phase * TAU).sin()
            }
            _ => width,
        }
    }

    fn waveform(&self, phase: f64, duty: f64) -> f64 {
        match self.shape {
            OscillatorShape::Sine => (phase * TAU).sin(),
            OscillatorShape::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            OscillatorShape::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            OscillatorShape::Sawtooth => 2.0 * phase - 1.0,
            OscillatorShape::Pulse | OscillatorShape::Pwm => {
                if phase < duty {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

impl Default for PolyOscillator {
    fn default() -> Self {
        Self::new(44100.0, 32)
    }
}

impl GraphModule for PolyOscillator {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let fm = inputs.get_or(0, 0.0);
        let detune_ratio = libm::pow(2.0, self.detune / 1200.0);
        let copies = if self.fat { FAT_COUNT } else { 1 };
        let copy_gain = 1.0 / (copies as f64).sqrt();
        let duty = self.duty();

        let mut out = 0.0;
        for index in 0..self.instances.len() {
            let level = {
                let instance = &mut self.instances[index];
                instance.age = instance.age.saturating_add(1);
                instance.envelope.advance(&self.envelope, self.sample_rate)
            };

            let base = self.instances[index].frequency * detune_ratio + fm;
            let mut sample = 0.0;
            for copy in 0..copies {
                let offset_cents = if copies > 1 {
                    (copy as f64 - 1.0) * self.spread / 2.0
                } else {
                    0.0
                };
                let freq = base * libm::pow(2.0, offset_cents / 1200.0);
                let phase = self.instances[index].phases[copy];
                sample += self.waveform(phase, duty) * copy_gain;
                self.instances[index].phases[copy] =
                    (phase + freq / self.sample_rate).rem_euclid(1.0);
            }

            out += sample * level * self.instances[index].velocity;
        }

        self.instances.retain(|instance| !instance.envelope.is_idle());
        self.pwm_phase = (self.pwm_phase + PWM_RATE_HZ / self.sample_rate).fract();

        outputs.set(10, out);
    }

    fn reset(&mut self) {
        self.instances.clear();
        self.pwm_phase = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn get_param(&self, id: ParamId) -> Option<f64> {
        match id {
            Self::SHAPE => Some(self.shape.index()),
            Self::FAT => Some(if self.fat { 1.0 } else { 0.0 }),
            Self::SPREAD => Some(self.spread),
            Self::PULSE_WIDTH => Some(self.pulse_width),
            Self::PHASE => Some(self.phase),
            Self::DETUNE => Some(self.detune),
            Self::HELD => Some(
                self.instances
                    .iter()
                    .filter(|i| i.envelope.is_held())
                    .count() as f64,
            ),
            Self::SOUNDING => Some(self.instances.len() as f64),
            _ => adsr_param(&self.envelope, id, Self::ATTACK),
        }
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        match id {
            Self::SHAPE => {
                self.shape = OscillatorShape::from_index(value);
                self.fat &= !self.shape.is_pulse();
            }
            Self::FAT => self.fat = value >= 0.5 && !self.shape.is_pulse(),
            Self::SPREAD => self.spread = value.clamp(0.0, 100.0),
            Self::PULSE_WIDTH => self.pulse_width = value.clamp(0.0, 1.0),
            Self::PHASE => self.phase = value.clamp(0.0, 360.0),
            Self::DETUNE => self.detune = value,
            _ => set_adsr_param(&mut self.envelope, id, Self::ATTACK, value),
        }
    }

    fn note_on(&mut self, note: &Note, velocity: f64, _time: Option<ScheduleTime>) {
        let velocity = velocity.clamp(0.0, 1.0);

        if let Some(instance) = self.instances.iter_mut().find(|i| &i.note == note) {
            instance.velocity = velocity;
            instance.age = 0;
            instance.envelope.attack();
            return;
        }

        if self.instances.len() >= self.max_polyphony {
            if let Some(oldest) = self
                .instances
                .iter()
                .enumerate()
                .min_by_key(|(_, i)| Reverse(i.age))
                .map(|(index, _)| index)
            {
                self.instances.remove(oldest);
            }
        }

        let mut envelope = EnvelopeState::new();
        envelope.attack();
        let start = self.phase / 360.0;
        self.instances.push(NoteInstance {
            note: note.clone(),
            frequency: note.frequency(),
            velocity,
            phases: [start; FAT_COUNT],
            envelope,
            age: 0,
        });
    }

    fn note_off(&mut self, note: &Note, _time: Option<ScheduleTime>) {
        if let Some(instance) = self
            .instances
            .iter_mut()
            .find(|i| &i.note == note && i.envelope.is_held())
        {
            instance.envelope.release();
        }
    }

    fn release_all(&mut self) {
        for instance in &mut self.instances {
            instance.envelope.release();
        }
    }

    fn holds_note(&self, note: &Note) -> bool {
        self.instances
            .iter()
            .any(|i| &i.note == note && i.envelope.is_held())
    }

    fn type_id(&self) -> &'static str {
        "poly_oscillator"
    }
}

// =============================================================================
// Monophonic envelope
// =============================================================================

/// Gate-driven envelope with a 0–1 control output
pub struct Envelope {
    state: EnvelopeState,
    adsr: Adsr,
    sample_rate: f64,
    spec: PortSpec,
}

impl Envelope {
    pub const ATTACK: ParamId = 0;
    pub const DECAY: ParamId = 1;
    pub const SUSTAIN: ParamId = 2;
    pub const RELEASE: ParamId = 3;
    /// Read-only: current output level
    pub const LEVEL: ParamId = 4;
    /// Read-only: 1 while the gate is open
    pub const GATE: ParamId = 5;

    pub fn new(sample_rate: f64) -> Self {
        Self {
            state: EnvelopeState::new(),
            adsr: Adsr::default(),
            sample_rate,
            spec: PortSpec {
                inputs: vec![],
                outputs: vec![PortDef::new(10, "out", SignalKind::Control)],
            },
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Envelope {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, _inputs: &PortValues, outputs: &mut PortValues) {
        let level = self.state.advance(&self.adsr, self.sample_rate);
        outputs.set(10, level);
    }

    fn reset(&mut self) {
        self.state = EnvelopeState::new();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn get_param(&self, id: ParamId) -> Option<f64> {
        match id {
            Self::LEVEL => Some(self.state.level),
            Self::GATE => Some(if self.state.is_held() { 1.0 } else { 0.0 }),
            _ => adsr_param(&self.adsr, id, Self::ATTACK),
        }
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        set_adsr_param(&mut self.adsr, id, Self::ATTACK, value);
    }

    fn trigger_attack(&mut self, _time: Option<ScheduleTime>) {
        self.state.attack();
    }

    fn trigger_release(&mut self, _time: Option<ScheduleTime>) {
        self.state.release();
    }

    fn release_all(&mut self) {
        self.state.release();
    }

    fn type_id(&self) -> &'static str {
        "envelope"
    }
}

// =============================================================================
// Gain and multiply
// =============================================================================

/// Linear gain stage
///
/// Serves as a voice's output level, as the envelope-to-cutoff scaler, and as
/// the scaling coefficient of every modulation path.
pub struct Gain {
    gain: f64,
    spec: PortSpec,
}

impl Gain {
    pub const GAIN: ParamId = 0;

    pub fn new(gain: f64) -> Self {
        Self {
            gain,
            spec: PortSpec {
                inputs: vec![
                    PortDef::new(0, "in", SignalKind::Audio),
                    PortDef::new(1, "gain", SignalKind::Gain),
                ],
                outputs: vec![PortDef::new(10, "out", SignalKind::Audio)],
            },
        }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl GraphModule for Gain {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let input = inputs.get_or(0, 0.0);
        let gain = self.gain + inputs.get_or(1, 0.0);
        outputs.set(10, input * gain);
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _: f64) {}

    fn get_param(&self, id: ParamId) -> Option<f64> {
        (id == Self::GAIN).then_some(self.gain)
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        if id == Self::GAIN && !value.is_nan() {
            self.gain = value;
        }
    }

    fn type_id(&self) -> &'static str {
        "gain"
    }
}

/// Signal multiplier: `out = in × (factor + factor input)`
pub struct Multiply {
    factor: f64,
    spec: PortSpec,
}

impl Multiply {
    pub const FACTOR: ParamId = 0;

    pub fn new() -> Self {
        Self {
            factor: 0.0,
            spec: PortSpec {
                inputs: vec![
                    PortDef::new(0, "in", SignalKind::Audio),
                    PortDef::new(1, "factor", SignalKind::Gain),
                ],
                outputs: vec![PortDef::new(10, "out", SignalKind::Audio)],
            },
        }
    }
}

impl Default for Multiply {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphModule for Multiply {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let input = inputs.get_or(0, 0.0);
        let factor = self.factor + inputs.get_or(1, 0.0);
        outputs.set(10, input * factor);
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _: f64) {}

    fn get_param(&self, id: ParamId) -> Option<f64> {
        (id == Self::FACTOR).then_some(self.factor)
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        if id == Self::FACTOR {
            self.factor = value;
        }
    }

    fn type_id(&self) -> &'static str {
        "multiply"
    }
}

// =============================================================================
// Biquad filter
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct BiquadCoefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoefficients {
    const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Audio-EQ-cookbook coefficients; shelf and peak gain is 0 dB
    fn design(filter_type: FilterType, cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let (sin, cos) = (w0.sin(), w0.cos());

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            // Resonance of the pass filters is given in dB
            FilterType::Lowpass | FilterType::Highpass => {
                let q_linear = libm::pow(10.0, q / 20.0);
                let alpha = sin / (2.0 * q_linear);
                if filter_type == FilterType::Lowpass {
                    let b = (1.0 - cos) / 2.0;
                    (b, 1.0 - cos, b, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
                } else {
                    let b = (1.0 + cos) / 2.0;
                    (b, -(1.0 + cos), b, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
                }
            }
            FilterType::Bandpass => {
                let alpha = sin / (2.0 * q.max(1e-4));
                (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
            }
            FilterType::Notch => {
                let alpha = sin / (2.0 * q.max(1e-4));
                (1.0, -2.0 * cos, 1.0, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
            }
            FilterType::Allpass => {
                let alpha = sin / (2.0 * q.max(1e-4));
                (
                    1.0 - alpha,
                    -2.0 * cos,
                    1.0 + alpha,
                    1.0 + alpha,
                    -2.0 * cos,
                    1.0 - alpha,
                )
            }
            FilterType::Lowshelf | FilterType::Highshelf | FilterType::Peaking => {
                return Self::IDENTITY;
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Biquad filter with a modulatable cutoff
///
/// The `frequency` input is added, in Hz, to the base cutoff; the effective
/// cutoff is clamped to [10 Hz, 0.49 × sample rate].
pub struct Filter {
    filter_type: FilterType,
    frequency: f64,
    q: f64,
    coefficients: BiquadCoefficients,
    designed_for: Option<(FilterType, f64, f64)>,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
    sample_rate: f64,
    spec: PortSpec,
}

impl Filter {
    pub const TYPE: ParamId = 0;
    pub const FREQUENCY: ParamId = 1;
    pub const Q: ParamId = 2;

    pub fn new(sample_rate: f64) -> Self {
        Self {
            filter_type: FilterType::Lowpass,
            frequency: 1000.0,
            q: 1.0,
            coefficients: BiquadCoefficients::IDENTITY,
            designed_for: None,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            sample_rate,
            spec: PortSpec {
                inputs: vec![
                    PortDef::new(0, "in", SignalKind::Audio),
                    PortDef::new(1, "frequency", SignalKind::Frequency),
                ],
                outputs: vec![PortDef::new(10, "out", SignalKind::Audio)],
            },
        }
    }

    fn update_coefficients(&mut self, cutoff: f64) {
        let key = (self.filter_type, cutoff, self.q);
        if self.designed_for != Some(key) {
            self.coefficients =
                BiquadCoefficients::design(self.filter_type, cutoff, self.q, self.sample_rate);
            self.designed_for = Some(key);
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Filter {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let input = inputs.get_or(0, 0.0);
        let nyquist_limit = (self.sample_rate * 0.49).max(10.0);
        let cutoff = (self.frequency + inputs.get_or(1, 0.0)).clamp(10.0, nyquist_limit);
        self.update_coefficients(cutoff);

        let c = self.coefficients;
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        outputs.set(10, output);
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.designed_for = None;
    }

    fn get_param(&self, id: ParamId) -> Option<f64> {
        match id {
            Self::TYPE => Some(self.filter_type.index()),
            Self::FREQUENCY => Some(self.frequency),
            Self::Q => Some(self.q),
            _ => None,
        }
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        match id {
            Self::TYPE => self.filter_type = FilterType::from_index(value),
            Self::FREQUENCY => self.frequency = value.clamp(20.0, 20_000.0),
            Self::Q => self.q = value.max(0.0),
            _ => {}
        }
    }

    fn type_id(&self) -> &'static str {
        "filter"
    }
}

// =============================================================================
// Distortion
// =============================================================================

/// Table-driven waveshaper with a wet/dry mix
///
/// The stage is never removed from the signal path; with `wet = 0` the dry
/// input is passed through untouched.
pub struct Distortion {
    curve: DistortionCurve,
    amount: f64,
    wet: f64,
    resolution: usize,
    table: Vec<f64>,
    spec: PortSpec,
}

impl Distortion {
    pub const AMOUNT: ParamId = 0;
    pub const CURVE: ParamId = 1;
    pub const WET: ParamId = 2;

    pub fn new(resolution: usize) -> Self {
        let curve = DistortionCurve::Soft;
        let amount = 0.4;
        Self {
            curve,
            amount,
            wet: 1.0,
            resolution,
            table: curve::build_table(curve, amount, resolution),
            spec: PortSpec {
                inputs: vec![PortDef::new(0, "in", SignalKind::Audio)],
                outputs: vec![PortDef::new(10, "out", SignalKind::Audio)],
            },
        }
    }

    /// The current transfer table
    pub fn table(&self) -> &[f64] {
        &self.table
    }

    fn rebuild(&mut self) {
        self.table = curve::build_table(self.curve, self.amount, self.resolution);
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new(curve::DEFAULT_RESOLUTION)
    }
}

impl GraphModule for Distortion {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let dry = inputs.get_or(0, 0.0);
        if self.wet <= 0.0 {
            outputs.set(10, dry);
            return;
        }
        let shaped = curve::shape(&self.table, dry);
        outputs.set(10, dry * (1.0 - self.wet) + shaped * self.wet);
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _: f64) {}

    fn get_param(&self, id: ParamId) -> Option<f64> {
        match id {
            Self::AMOUNT => Some(self.amount),
            Self::CURVE => Some(self.curve.index()),
            Self::WET => Some(self.wet),
            _ => None,
        }
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        match id {
            Self::AMOUNT => {
                let amount = value.clamp(0.0, 1.0);
                if amount != self.amount {
                    self.amount = amount;
                    self.rebuild();
                }
            }
            Self::CURVE => {
                let curve = DistortionCurve::from_index(value);
                if curve != self.curve {
                    self.curve = curve;
                    self.rebuild();
                }
            }
            Self::WET => self.wet = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn type_id(&self) -> &'static str {
        "distortion"
    }
}

// =============================================================================
// Output sink
// =============================================================================

/// Final destination of the graph
pub struct Output {
    spec: PortSpec,
}

impl Output {
    pub fn new() -> Self {
        Self {
            spec: PortSpec {
                inputs: vec![PortDef::new(0, "in", SignalKind::Audio)],
                outputs: vec![PortDef::new(10, "out", SignalKind::Audio)],
            },
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphModule for Output {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        outputs.set(10, inputs.get_or(0, 0.0));
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _: f64) {}

    fn type_id(&self) -> &'static str {
        "output"
    }
}
