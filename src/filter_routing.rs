//! Filter Routing
//!
//! Owns the shared filter, the envelope-to-cutoff path (a mono envelope and a
//! scaling gain) and the distortion stage, and switches voice 2's envelope
//! between shaping its own amplitude and sweeping the filter cutoff.
//!
//! ```text
//! VoiceDriven:   envelope ─╳                          (idle, unconnected)
//! FilterDriven:  envelope ──▶ scaler ──▶ filter.frequency
//! ```

use crate::config::{Adsr, EnvelopeDestination, FilterConfig, VoiceConfig};
use crate::graph::{NodeHandle, NodeId, Patch, PatchError};
use crate::modules::{Distortion, Envelope, Filter, Gain};
use crate::note::ScheduleTime;
use crate::voice::VoiceEngine;
use tracing::debug;

/// Cutoff deviation in Hz at ±100 % envelope amount
pub const CUTOFF_RANGE_HZ: f64 = 10_000.0;

/// Envelope voice 2 plays with while its own envelope drives the filter
pub const PASS_THROUGH_ENVELOPE: Adsr = Adsr::new(0.01, 0.2, 0.8, 0.5);

/// Which of voice 2's targets the envelope is driving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingState {
    VoiceDriven,
    FilterDriven,
}

impl From<EnvelopeDestination> for RoutingState {
    fn from(destination: EnvelopeDestination) -> Self {
        match destination {
            EnvelopeDestination::VoiceAmplitude => RoutingState::VoiceDriven,
            EnvelopeDestination::FilterCutoff => RoutingState::FilterDriven,
        }
    }
}

/// Shared filter, envelope-to-cutoff path and distortion
#[derive(Debug)]
pub struct FilterRoutingController {
    filter: NodeHandle,
    envelope: NodeHandle,
    scaler: NodeHandle,
    distortion: NodeHandle,
    state: RoutingState,
}

impl FilterRoutingController {
    pub fn new(patch: &mut Patch, curve_resolution: usize) -> Result<Self, PatchError> {
        let mut created = Vec::with_capacity(4);
        let result = Self::build(patch, curve_resolution, &mut created);
        if result.is_err() {
            for node in created {
                let _ = patch.remove(node);
            }
        }
        result
    }

    fn build(
        patch: &mut Patch,
        curve_resolution: usize,
        created: &mut Vec<NodeId>,
    ) -> Result<Self, PatchError> {
        let sample_rate = patch.sample_rate();
        let filter = patch.add("filter", Filter::new(sample_rate))?;
        created.push(filter.id());
        let envelope = patch.add("filter_envelope", Envelope::new(sample_rate))?;
        created.push(envelope.id());
        let scaler = patch.add("filter_envelope_scale", Gain::new(0.0))?;
        created.push(scaler.id());
        let distortion = patch.add("distortion", Distortion::new(curve_resolution))?;

        Ok(Self {
            filter,
            envelope,
            scaler,
            distortion,
            state: RoutingState::VoiceDriven,
        })
    }

    pub fn state(&self) -> RoutingState {
        self.state
    }

    pub fn filter(&self) -> &NodeHandle {
        &self.filter
    }

    pub fn distortion(&self) -> &NodeHandle {
        &self.distortion
    }

    /// Every node owned by the controller
    pub fn nodes(&self) -> [NodeId; 4] {
        [
            self.filter.id(),
            self.envelope.id(),
            self.scaler.id(),
            self.distortion.id(),
        ]
    }

    /// Move to the state for `destination`
    ///
    /// The envelope path is torn down first on every call, so repeated calls
    /// never leave parallel edges behind. `voice2_config` supplies the ADSR
    /// restored on the way back to [`RoutingState::VoiceDriven`].
    pub fn set_destination(
        &mut self,
        patch: &mut Patch,
        destination: EnvelopeDestination,
        voice2: &VoiceEngine,
        voice2_config: &VoiceConfig,
    ) -> Result<(), PatchError> {
        patch.disconnect_node(self.envelope.id());
        patch.disconnect_node(self.scaler.id());

        let target = RoutingState::from(destination);
        if target != self.state {
            debug!(from = ?self.state, to = ?target, "envelope destination transition");
        }

        match target {
            RoutingState::FilterDriven => {
                patch.connect(self.envelope.output("out")?, self.scaler.input("in")?)?;
                patch.connect(self.scaler.output("out")?, self.filter.input("frequency")?)?;
                voice2.set_envelope(patch, &PASS_THROUGH_ENVELOPE);
            }
            RoutingState::VoiceDriven => {
                voice2.set_envelope(patch, &voice2_config.envelope);
            }
        }

        self.state = target;
        Ok(())
    }

    /// The ADSR voice 2 should carry in the current state
    pub fn voice2_envelope(&self, configured: &Adsr) -> Adsr {
        match self.state {
            RoutingState::VoiceDriven => *configured,
            RoutingState::FilterDriven => PASS_THROUGH_ENVELOPE,
        }
    }

    /// Apply filter, envelope-amount and distortion settings in place
    pub fn apply_filter(&self, patch: &mut Patch, config: &FilterConfig) {
        let config = config.sanitized();

        let filter = self.filter.id();
        patch.set_param(filter, Filter::TYPE, config.filter_type.index());
        patch.set_param(filter, Filter::FREQUENCY, config.frequency);
        patch.set_param(filter, Filter::Q, config.q);

        patch.set_param(
            self.scaler.id(),
            Gain::GAIN,
            config.envelope_amount / 100.0 * CUTOFF_RANGE_HZ,
        );

        let distortion = self.distortion.id();
        patch.set_param(distortion, Distortion::CURVE, config.distortion_curve.index());
        patch.set_param(distortion, Distortion::AMOUNT, config.distortion_amount);
        patch.set_param(
            distortion,
            Distortion::WET,
            if config.distortion_enabled { 1.0 } else { 0.0 },
        );
    }

    /// Mirror voice 2's configured ADSR onto the shared envelope
    pub fn set_envelope(&self, patch: &mut Patch, envelope: &Adsr) {
        let envelope = envelope.sanitized();
        let id = self.envelope.id();
        patch.set_param(id, Envelope::ATTACK, envelope.attack);
        patch.set_param(id, Envelope::DECAY, envelope.decay);
        patch.set_param(id, Envelope::SUSTAIN, envelope.sustain);
        patch.set_param(id, Envelope::RELEASE, envelope.release);
    }

    pub fn trigger_attack(&self, patch: &mut Patch, time: Option<ScheduleTime>) {
        patch.trigger_attack(self.envelope.id(), time);
    }

    pub fn trigger_release(&self, patch: &mut Patch, time: Option<ScheduleTime>) {
        patch.trigger_release(self.envelope.id(), time);
    }

    /// Force the shared envelope into release
    pub fn release_envelope(&self, patch: &mut Patch) {
        patch.release_all(self.envelope.id());
    }

    /// Whether the shared envelope's gate is open
    pub fn envelope_open(&self, patch: &Patch) -> bool {
        patch
            .get_param(self.envelope.id(), Envelope::GATE)
            .is_some_and(|gate| gate >= 0.5)
    }

    /// Current envelope-to-cutoff scale in Hz per unit of envelope
    pub fn cutoff_scale(&self, patch: &Patch) -> f64 {
        patch.get_param(self.scaler.id(), Gain::GAIN).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistortionCurve, FilterType};
    use approx::assert_relative_eq;

    fn setup() -> (Patch, FilterRoutingController, VoiceEngine) {
        let mut patch = Patch::new(44100.0);
        let routing = FilterRoutingController::new(&mut patch, 512).unwrap();
        let voice2 = VoiceEngine::new(&mut patch, "voice2", 8).unwrap();
        (patch, routing, voice2)
    }

    fn envelope_edges(patch: &Patch) -> Vec<(String, String)> {
        patch
            .named_edges()
            .into_iter()
            .filter(|(from, _)| from.starts_with("filter_envelope"))
            .collect()
    }

    #[test]
    fn test_filter_driven_wiring() {
        let (mut patch, mut routing, voice2) = setup();
        let config = VoiceConfig::default();

        routing
            .set_destination(&mut patch, EnvelopeDestination::FilterCutoff, &voice2, &config)
            .unwrap();
        assert_eq!(routing.state(), RoutingState::FilterDriven);
        assert_eq!(
            envelope_edges(&patch),
            vec![
                ("filter_envelope.out".to_string(), "filter_envelope_scale.in".to_string()),
                ("filter_envelope_scale.out".to_string(), "filter.frequency".to_string()),
            ]
        );
        assert_eq!(voice2.envelope(&patch), PASS_THROUGH_ENVELOPE);
    }

    #[test]
    fn test_repeated_toggling_leaves_no_parallel_edges() {
        let (mut patch, mut routing, voice2) = setup();
        let config = VoiceConfig::default();

        for _ in 0..3 {
            routing
                .set_destination(&mut patch, EnvelopeDestination::FilterCutoff, &voice2, &config)
                .unwrap();
        }
        assert_eq!(patch.cable_count(), 2);

        routing
            .set_destination(&mut patch, EnvelopeDestination::VoiceAmplitude, &voice2, &config)
            .unwrap();
        assert_eq!(patch.cable_count(), 0);
    }

    #[test]
    fn test_voice_envelope_restored() {
        let (mut patch, mut routing, voice2) = setup();
        let config = VoiceConfig {
            envelope: Adsr::new(0.5, 0.4, 0.3, 0.2),
            ..VoiceConfig::default()
        };
        voice2.set_envelope(&mut patch, &config.envelope);

        routing
            .set_destination(&mut patch, EnvelopeDestination::FilterCutoff, &voice2, &config)
            .unwrap();
        assert_eq!(routing.voice2_envelope(&config.envelope), PASS_THROUGH_ENVELOPE);

        routing
            .set_destination(&mut patch, EnvelopeDestination::VoiceAmplitude, &voice2, &config)
            .unwrap();
        assert_eq!(voice2.envelope(&patch), config.envelope);
        assert_eq!(routing.voice2_envelope(&config.envelope), config.envelope);
    }

    #[test]
    fn test_apply_filter_in_place() {
        let (mut patch, routing, _voice2) = setup();
        let cables_before = patch.cable_count();

        let config = FilterConfig {
            filter_type: FilterType::Highpass,
            frequency: 50_000.0,
            q: 4.0,
            envelope_amount: -40.0,
            distortion_enabled: true,
            distortion_amount: 0.8,
            distortion_curve: DistortionCurve::Fuzz,
        };
        routing.apply_filter(&mut patch, &config);

        let filter = routing.filter().id();
        assert_eq!(patch.get_param(filter, Filter::TYPE), Some(FilterType::Highpass.index()));
        assert_eq!(patch.get_param(filter, Filter::FREQUENCY), Some(20_000.0));
        assert_relative_eq!(routing.cutoff_scale(&patch), -4000.0);

        let distortion = routing.distortion().id();
        assert_eq!(patch.get_param(distortion, Distortion::WET), Some(1.0));
        assert_eq!(
            patch.get_param(distortion, Distortion::CURVE),
            Some(DistortionCurve::Fuzz.index())
        );
        assert_eq!(patch.cable_count(), cables_before);
    }

    #[test]
    fn test_distortion_disabled_is_dry() {
        let (mut patch, routing, _voice2) = setup();
        routing.apply_filter(
            &mut patch,
            &FilterConfig {
                distortion_enabled: false,
                distortion_amount: 1.0,
                ..FilterConfig::default()
            },
        );
        assert_eq!(
            patch.get_param(routing.distortion().id(), Distortion::WET),
            Some(0.0)
        );
    }

    #[test]
    fn test_shared_envelope_gate() {
        let (mut patch, routing, _voice2) = setup();
        routing.set_envelope(&mut patch, &Adsr::new(0.0, 0.0, 1.0, 0.0));
        assert!(!routing.envelope_open(&patch));

        routing.trigger_attack(&mut patch, None);
        assert!(routing.envelope_open(&patch));

        routing.trigger_release(&mut patch, None);
        assert!(!routing.envelope_open(&patch));
    }
}
