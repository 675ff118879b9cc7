//! Voice Engine
//!
//! One polyphonic oscillator with per-note envelopes, followed by a linear
//! output gain. The gain is the voice's level control; muting sets it to zero
//! and never removes the voice from the graph, so toggling a voice while notes
//! are held does not click.

use crate::config::{db_to_gain, Adsr, OscillatorShape, VoiceConfig};
use crate::graph::{NodeHandle, NodeId, Patch, PatchError};
use crate::modules::{Gain, PolyOscillator};
use crate::note::{Note, ScheduleTime};

/// Velocity used when a note event carries none
pub const DEFAULT_VELOCITY: f64 = 1.0;

/// An oscillator→gain chain with polyphonic articulation
#[derive(Debug, Clone)]
pub struct VoiceEngine {
    label: String,
    oscillator: NodeHandle,
    output: NodeHandle,
}

impl VoiceEngine {
    /// Create the voice's nodes in `patch`
    ///
    /// Node names are prefixed with `label` (e.g. `voice1_osc`, `voice1_gain`).
    pub fn new(patch: &mut Patch, label: &str, max_polyphony: usize) -> Result<Self, PatchError> {
        let oscillator = patch.add(
            format!("{}_osc", label),
            PolyOscillator::new(patch.sample_rate(), max_polyphony),
        )?;
        let output = match patch.add(format!("{}_gain", label), Gain::new(db_to_gain(-12.0))) {
            Ok(handle) => handle,
            Err(err) => {
                let _ = patch.remove(oscillator.id());
                return Err(err);
            }
        };

        Ok(Self {
            label: label.to_string(),
            oscillator,
            output,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The oscillator node (signal source and FM destination)
    pub fn oscillator(&self) -> &NodeHandle {
        &self.oscillator
    }

    /// The output gain node
    pub fn output(&self) -> &NodeHandle {
        &self.output
    }

    /// Every node owned by this voice
    pub fn nodes(&self) -> [NodeId; 2] {
        [self.oscillator.id(), self.output.id()]
    }

    /// Start an independent envelope instance for `note`
    pub fn note_on(
        &self,
        patch: &mut Patch,
        note: &Note,
        velocity: Option<f64>,
        time: Option<ScheduleTime>,
    ) {
        let velocity = velocity.filter(|v| !v.is_nan()).unwrap_or(DEFAULT_VELOCITY);
        patch.note_on(self.oscillator.id(), note, velocity, time);
    }

    /// Release the instance sounding `note`; no-op when there is none
    pub fn note_off(&self, patch: &mut Patch, note: &Note, time: Option<ScheduleTime>) {
        patch.note_off(self.oscillator.id(), note, time);
    }

    /// Force-release every sounding instance
    pub fn release_all(&self, patch: &mut Patch) {
        patch.release_all(self.oscillator.id());
    }

    /// Set waveform parameters
    ///
    /// Fat mode is dropped for pulse shapes whatever `fat` requests.
    pub fn set_oscillator_shape(
        &self,
        patch: &mut Patch,
        shape: OscillatorShape,
        fat: bool,
        spread: f64,
        pulse_width: f64,
        phase: f64,
    ) {
        let id = self.oscillator.id();
        let fat = fat && !shape.is_pulse();
        patch.set_param(id, PolyOscillator::SHAPE, shape.index());
        patch.set_param(id, PolyOscillator::FAT, if fat { 1.0 } else { 0.0 });
        if !spread.is_nan() {
            patch.set_param(id, PolyOscillator::SPREAD, spread);
        }
        if !pulse_width.is_nan() {
            patch.set_param(id, PolyOscillator::PULSE_WIDTH, pulse_width);
        }
        if !phase.is_nan() {
            patch.set_param(id, PolyOscillator::PHASE, phase);
        }
    }

    /// Apply `detune_cents + semitones × 100` as one detune value
    pub fn set_tuning(&self, patch: &mut Patch, detune_cents: f64, semitones: i32) {
        let detune = if detune_cents.is_finite() { detune_cents } else { 0.0 };
        let total = detune + f64::from(semitones.clamp(-24, 24)) * 100.0;
        patch.set_param(self.oscillator.id(), PolyOscillator::DETUNE, total);
    }

    /// Update the ADSR shared by future and in-flight instances
    pub fn set_envelope(&self, patch: &mut Patch, envelope: &Adsr) {
        let envelope = envelope.sanitized();
        let id = self.oscillator.id();
        patch.set_param(id, PolyOscillator::ATTACK, envelope.attack);
        patch.set_param(id, PolyOscillator::DECAY, envelope.decay);
        patch.set_param(id, PolyOscillator::SUSTAIN, envelope.sustain);
        patch.set_param(id, PolyOscillator::RELEASE, envelope.release);
    }

    /// Set the output level in dB; `f64::NEG_INFINITY` mutes
    pub fn set_output_level(&self, patch: &mut Patch, level_db: f64) {
        let level_db = if level_db == f64::NEG_INFINITY {
            level_db
        } else if level_db.is_nan() {
            -60.0
        } else {
            level_db.clamp(-60.0, 6.0)
        };
        patch.set_param(self.output.id(), Gain::GAIN, db_to_gain(level_db));
    }

    /// Apply every field of a voice configuration
    pub fn apply(&self, patch: &mut Patch, config: &VoiceConfig) {
        let config = config.sanitized();
        self.set_oscillator_shape(
            patch,
            config.shape,
            config.fat,
            config.spread,
            config.pulse_width,
            config.phase,
        );
        self.set_tuning(patch, config.detune, config.semitone);
        self.set_envelope(patch, &config.envelope);
        self.set_output_level(patch, config.level_db);
    }

    /// The ADSR currently set on the oscillator
    pub fn envelope(&self, patch: &Patch) -> Adsr {
        let id = self.oscillator.id();
        let read = |param, fallback| patch.get_param(id, param).unwrap_or(fallback);
        let defaults = Adsr::default();
        Adsr::new(
            read(PolyOscillator::ATTACK, defaults.attack),
            read(PolyOscillator::DECAY, defaults.decay),
            read(PolyOscillator::SUSTAIN, defaults.sustain),
            read(PolyOscillator::RELEASE, defaults.release),
        )
    }

    pub fn shape(&self, patch: &Patch) -> OscillatorShape {
        patch
            .get_param(self.oscillator.id(), PolyOscillator::SHAPE)
            .map(OscillatorShape::from_index)
            .unwrap_or_default()
    }

    pub fn is_fat(&self, patch: &Patch) -> bool {
        patch
            .get_param(self.oscillator.id(), PolyOscillator::FAT)
            .is_some_and(|fat| fat >= 0.5)
    }

    /// Net detune in cents
    pub fn detune(&self, patch: &Patch) -> f64 {
        patch
            .get_param(self.oscillator.id(), PolyOscillator::DETUNE)
            .unwrap_or(0.0)
    }

    /// Linear output gain
    pub fn output_gain(&self, patch: &Patch) -> f64 {
        patch.get_param(self.output.id(), Gain::GAIN).unwrap_or(0.0)
    }

    pub fn holds_note(&self, patch: &Patch, note: &Note) -> bool {
        patch.holds_note(self.oscillator.id(), note)
    }

    /// Instances that have not been released
    pub fn held_notes(&self, patch: &Patch) -> usize {
        patch
            .get_param(self.oscillator.id(), PolyOscillator::HELD)
            .unwrap_or(0.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn voice() -> (Patch, VoiceEngine) {
        let mut patch = Patch::new(44100.0);
        let voice = VoiceEngine::new(&mut patch, "voice1", 8).unwrap();
        (patch, voice)
    }

    fn note(name: &str) -> Note {
        Note::parse(name).unwrap()
    }

    #[test]
    fn test_creates_named_nodes() {
        let (patch, voice) = voice();
        assert_eq!(patch.get_name(voice.oscillator().id()), Some("voice1_osc"));
        assert_eq!(patch.get_name(voice.output().id()), Some("voice1_gain"));
        assert_eq!(voice.label(), "voice1");
    }

    #[test]
    fn test_pulse_forces_fat_off() {
        let (mut patch, voice) = voice();
        voice.set_oscillator_shape(&mut patch, OscillatorShape::Sawtooth, true, 30.0, 0.5, 0.0);
        assert!(voice.is_fat(&patch));

        voice.set_oscillator_shape(&mut patch, OscillatorShape::Pulse, true, 30.0, 0.3, 0.0);
        assert!(!voice.is_fat(&patch));
        assert_eq!(voice.shape(&patch), OscillatorShape::Pulse);

        voice.set_oscillator_shape(&mut patch, OscillatorShape::Pwm, true, 30.0, 0.3, 0.0);
        assert!(!voice.is_fat(&patch));
    }

    #[test]
    fn test_tuning_is_combined() {
        let (mut patch, voice) = voice();
        voice.set_tuning(&mut patch, 7.0, -2);
        assert_relative_eq!(voice.detune(&patch), -193.0);

        voice.set_tuning(&mut patch, 0.0, 40);
        assert_relative_eq!(voice.detune(&patch), 2400.0);
    }

    #[test]
    fn test_envelope_round_trip() {
        let (mut patch, voice) = voice();
        let adsr = Adsr::new(0.3, 0.1, 0.7, 2.0);
        voice.set_envelope(&mut patch, &adsr);
        assert_eq!(voice.envelope(&patch), adsr);

        voice.set_envelope(&mut patch, &Adsr::new(-1.0, 0.1, 3.0, 0.2));
        let clamped = voice.envelope(&patch);
        assert_eq!(clamped.attack, 0.0);
        assert_eq!(clamped.sustain, 1.0);
    }

    #[test]
    fn test_mute_is_zero_gain_not_disconnect() {
        let (mut patch, voice) = voice();
        patch
            .connect(voice.oscillator().output("out").unwrap(), voice.output().input("in").unwrap())
            .unwrap();

        voice.set_output_level(&mut patch, f64::NEG_INFINITY);
        assert_eq!(voice.output_gain(&patch), 0.0);
        assert_eq!(patch.cable_count(), 1);

        voice.set_output_level(&mut patch, 0.0);
        assert_relative_eq!(voice.output_gain(&patch), 1.0);

        voice.set_output_level(&mut patch, 40.0);
        assert_relative_eq!(voice.output_gain(&patch), db_to_gain(6.0));
    }

    #[test]
    fn test_note_articulation() {
        let (mut patch, voice) = voice();
        voice.note_on(&mut patch, &note("C4"), None, None);
        voice.note_on(&mut patch, &note("G4"), Some(0.5), Some(ScheduleTime(0.25)));
        assert_eq!(voice.held_notes(&patch), 2);

        voice.note_off(&mut patch, &note("D4"), None);
        assert_eq!(voice.held_notes(&patch), 2);

        voice.note_off(&mut patch, &note("C4"), None);
        assert_eq!(voice.held_notes(&patch), 1);

        voice.release_all(&mut patch);
        assert_eq!(voice.held_notes(&patch), 0);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let (mut patch, voice) = voice();
        let config = VoiceConfig {
            shape: OscillatorShape::Triangle,
            fat: true,
            detune: 12.0,
            semitone: 1,
            ..VoiceConfig::default()
        };
        voice.apply(&mut patch, &config);
        let first = (voice.shape(&patch), voice.detune(&patch), voice.output_gain(&patch));
        voice.apply(&mut patch, &config);
        let second = (voice.shape(&patch), voice.detune(&patch), voice.output_gain(&patch));
        assert_eq!(first, second);
        assert!(voice.is_fat(&patch));
    }

    #[test]
    fn test_creation_fails_cleanly_at_node_limit() {
        let mut patch = Patch::with_node_limit(44100.0, 1);
        assert!(VoiceEngine::new(&mut patch, "voice1", 8).is_err());
        assert_eq!(patch.node_count(), 0);
    }
}
