//! Modulation Router
//!
//! Builds and tears down the cross-voice modulation path. Exactly one mode is
//! active at a time, and every switch disposes the previous mode's extra
//! nodes before the new mode is constructed.
//!
//! ```text
//! none      voice1 ──▶ gain1              voice2 ──▶ gain2
//! ringmod   voice1 ──▶ ring_mod ──▶ gain1  voice2 ──▶ gain2
//!           voice2 ──▶ ring_mod_depth ──▶ ring_mod.factor
//! fm        voice1 ──▶ gain1              voice2 ──▶ gain2
//!           voice1 ──▶ fm_gain ──▶ voice2.frequency
//! hardsync  as fm, through sync_gain with a smaller scale
//! ```

use crate::config::ModulationType;
use crate::error::EngineError;
use crate::graph::{NodeHandle, NodeId, Patch, PatchError};
use crate::modules::{Gain, Multiply};
use crate::voice::VoiceEngine;
use tracing::{debug, error};

/// FM deviation in Hz at 100 % amount
pub const FM_SCALE: f64 = 500.0;

/// Hardsync deviation in Hz at 100 % amount
pub const HARDSYNC_SCALE: f64 = 10.0;

/// Extra nodes of the active mode
#[derive(Debug, Clone)]
enum ActiveModulation {
    None,
    RingMod { multiply: NodeHandle, depth: NodeHandle },
    Fm { scale: NodeHandle },
    HardSync { scale: NodeHandle },
}

impl ActiveModulation {
    fn mode(&self) -> ModulationType {
        match self {
            ActiveModulation::None => ModulationType::None,
            ActiveModulation::RingMod { .. } => ModulationType::RingMod,
            ActiveModulation::Fm { .. } => ModulationType::Fm,
            ActiveModulation::HardSync { .. } => ModulationType::HardSync,
        }
    }

    fn nodes(&self) -> Vec<NodeId> {
        match self {
            ActiveModulation::None => vec![],
            ActiveModulation::RingMod { multiply, depth } => vec![multiply.id(), depth.id()],
            ActiveModulation::Fm { scale } | ActiveModulation::HardSync { scale } => {
                vec![scale.id()]
            }
        }
    }

    /// The node carrying the amount coefficient and its value for `amount` percent
    fn coefficient(&self, amount: f64) -> Option<(NodeId, f64)> {
        match self {
            ActiveModulation::None => None,
            ActiveModulation::RingMod { depth, .. } => Some((depth.id(), amount / 100.0)),
            ActiveModulation::Fm { scale } => Some((scale.id(), amount / 100.0 * FM_SCALE)),
            ActiveModulation::HardSync { scale } => {
                Some((scale.id(), amount / 100.0 * HARDSYNC_SCALE))
            }
        }
    }
}

/// Owner of the cross-voice modulation path
#[derive(Debug)]
pub struct ModulationRouter {
    active: ActiveModulation,
    amount: f64,
}

impl ModulationRouter {
    pub fn new() -> Self {
        Self {
            active: ActiveModulation::None,
            amount: 0.0,
        }
    }

    /// The mode currently wired
    pub fn mode(&self) -> ModulationType {
        self.active.mode()
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Extra nodes owned by the active mode
    pub fn nodes(&self) -> Vec<NodeId> {
        self.active.nodes()
    }

    /// Replace the active mode with `mode` and wire both voices into their gains
    ///
    /// If the new mode cannot be constructed the failure is logged and the
    /// voices are wired independently. Returns the mode actually in effect.
    pub fn switch(
        &mut self,
        patch: &mut Patch,
        mode: ModulationType,
        amount: f64,
        voice1: &VoiceEngine,
        voice2: &VoiceEngine,
    ) -> ModulationType {
        self.teardown(patch);
        self.amount = clamp_amount(amount);

        let mut created = Vec::new();
        match self.build(patch, mode, voice1, voice2, &mut created) {
            Ok(active) => {
                self.active = active;
            }
            Err(source) => {
                let err = EngineError::TopologyConstruction { mode, source };
                error!("{}; falling back to independent voices", err);

                for node in created {
                    let _ = patch.remove(node);
                }
                self.active = ActiveModulation::None;
                for voice in [voice1, voice2] {
                    if let Err(err) = wire_direct(patch, voice) {
                        error!("failed to wire {}: {}", voice.label(), err);
                    }
                }
            }
        }

        self.apply_coefficient(patch);
        debug!(mode = %self.mode(), amount = self.amount, "modulation wired");
        self.mode()
    }

    /// Update the amount of the active mode without touching the wiring
    pub fn set_amount(&mut self, patch: &mut Patch, amount: f64) {
        self.amount = clamp_amount(amount);
        self.apply_coefficient(patch);
    }

    /// Disconnect and dispose the active mode's extra nodes
    pub fn teardown(&mut self, patch: &mut Patch) {
        for node in self.active.nodes() {
            patch.disconnect_node(node);
            let _ = patch.remove(node);
        }
        self.active = ActiveModulation::None;
    }

    fn build(
        &self,
        patch: &mut Patch,
        mode: ModulationType,
        voice1: &VoiceEngine,
        voice2: &VoiceEngine,
        created: &mut Vec<NodeId>,
    ) -> Result<ActiveModulation, PatchError> {
        let osc1 = voice1.oscillator();
        let osc2 = voice2.oscillator();

        match mode {
            ModulationType::None => {
                wire_direct(patch, voice1)?;
                wire_direct(patch, voice2)?;
                Ok(ActiveModulation::None)
            }
            ModulationType::RingMod => {
                let multiply = patch.add("ring_mod", Multiply::new())?;
                created.push(multiply.id());
                let depth = patch.add("ring_mod_depth", Gain::new(0.0))?;
                created.push(depth.id());

                patch.connect(osc1.output("out")?, multiply.input("in")?)?;
                patch.connect(osc2.output("out")?, depth.input("in")?)?;
                patch.connect(depth.output("out")?, multiply.input("factor")?)?;
                patch.connect(multiply.output("out")?, voice1.output().input("in")?)?;
                wire_direct(patch, voice2)?;

                Ok(ActiveModulation::RingMod { multiply, depth })
            }
            ModulationType::Fm | ModulationType::HardSync => {
                let name = if mode == ModulationType::Fm {
                    "fm_gain"
                } else {
                    "sync_gain"
                };
                let scale = patch.add(name, Gain::new(0.0))?;
                created.push(scale.id());

                wire_direct(patch, voice1)?;
                patch.connect(osc1.output("out")?, scale.input("in")?)?;
                patch.connect(scale.output("out")?, osc2.input("frequency")?)?;
                wire_direct(patch, voice2)?;

                Ok(if mode == ModulationType::Fm {
                    ActiveModulation::Fm { scale }
                } else {
                    ActiveModulation::HardSync { scale }
                })
            }
        }
    }

    fn apply_coefficient(&self, patch: &mut Patch) {
        if let Some((node, value)) = self.active.coefficient(self.amount) {
            patch.set_param(node, Gain::GAIN, value);
        }
    }
}

impl Default for ModulationRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn wire_direct(patch: &mut Patch, voice: &VoiceEngine) -> Result<(), PatchError> {
    patch.connect(voice.oscillator().output("out")?, voice.output().input("in")?)
}

fn clamp_amount(amount: f64) -> f64 {
    if amount.is_nan() {
        0.0
    } else {
        amount.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeSet;

    fn setup(limit: Option<usize>) -> (Patch, VoiceEngine, VoiceEngine) {
        let mut patch = match limit {
            Some(limit) => Patch::with_node_limit(44100.0, limit),
            None => Patch::new(44100.0),
        };
        let voice1 = VoiceEngine::new(&mut patch, "voice1", 8).unwrap();
        let voice2 = VoiceEngine::new(&mut patch, "voice2", 8).unwrap();
        (patch, voice1, voice2)
    }

    fn edges(patch: &Patch) -> BTreeSet<(String, String)> {
        patch.named_edges().into_iter().collect()
    }

    fn edge(from: &str, to: &str) -> (String, String) {
        (from.to_string(), to.to_string())
    }

    #[test]
    fn test_none_wiring() {
        let (mut patch, voice1, voice2) = setup(None);
        let mut router = ModulationRouter::new();
        router.switch(&mut patch, ModulationType::None, 50.0, &voice1, &voice2);

        let expected: BTreeSet<_> = [
            edge("voice1_osc.out", "voice1_gain.in"),
            edge("voice2_osc.out", "voice2_gain.in"),
        ]
        .into_iter()
        .collect();
        assert_eq!(edges(&patch), expected);
        assert!(router.nodes().is_empty());
    }

    #[test]
    fn test_ring_mod_is_asymmetric() {
        let (mut patch, voice1, voice2) = setup(None);
        let mut router = ModulationRouter::new();
        router.switch(&mut patch, ModulationType::RingMod, 40.0, &voice1, &voice2);

        let expected: BTreeSet<_> = [
            edge("voice1_osc.out", "ring_mod.in"),
            edge("voice2_osc.out", "ring_mod_depth.in"),
            edge("ring_mod_depth.out", "ring_mod.factor"),
            edge("ring_mod.out", "voice1_gain.in"),
            edge("voice2_osc.out", "voice2_gain.in"),
        ]
        .into_iter()
        .collect();
        assert_eq!(edges(&patch), expected);

        let depth = router.nodes()[1];
        assert_relative_eq!(patch.get_param(depth, Gain::GAIN).unwrap(), 0.4);
    }

    #[test]
    fn test_fm_and_hardsync_scales() {
        let (mut patch, voice1, voice2) = setup(None);
        let mut router = ModulationRouter::new();

        router.switch(&mut patch, ModulationType::Fm, 20.0, &voice1, &voice2);
        let scale = router.nodes()[0];
        assert_eq!(patch.get_name(scale), Some("fm_gain"));
        assert_relative_eq!(patch.get_param(scale, Gain::GAIN).unwrap(), 100.0);
        assert!(edges(&patch).contains(&edge("fm_gain.out", "voice2_osc.frequency")));
        assert!(edges(&patch).contains(&edge("voice1_osc.out", "voice1_gain.in")));

        patch.disconnect_node(voice1.oscillator().id());
        patch.disconnect_node(voice2.oscillator().id());
        router.switch(&mut patch, ModulationType::HardSync, 20.0, &voice1, &voice2);
        let scale = router.nodes()[0];
        assert_eq!(patch.get_name(scale), Some("sync_gain"));
        assert_relative_eq!(patch.get_param(scale, Gain::GAIN).unwrap(), 2.0);
        assert!(!edges(&patch).iter().any(|(from, _)| from.starts_with("fm_gain")));
    }

    #[test]
    fn test_amount_updates_in_place() {
        let (mut patch, voice1, voice2) = setup(None);
        let mut router = ModulationRouter::new();
        router.switch(&mut patch, ModulationType::Fm, 10.0, &voice1, &voice2);
        let scale = router.nodes()[0];
        let before = edges(&patch);

        router.set_amount(&mut patch, 80.0);
        assert_eq!(router.nodes()[0], scale);
        assert_relative_eq!(patch.get_param(scale, Gain::GAIN).unwrap(), 400.0);
        assert_eq!(edges(&patch), before);

        router.set_amount(&mut patch, 250.0);
        assert_relative_eq!(patch.get_param(scale, Gain::GAIN).unwrap(), 500.0);
    }

    #[test]
    fn test_switch_disposes_previous_nodes() {
        let (mut patch, voice1, voice2) = setup(None);
        let mut router = ModulationRouter::new();
        router.switch(&mut patch, ModulationType::RingMod, 50.0, &voice1, &voice2);
        let ring_nodes = router.nodes();

        router.teardown(&mut patch);
        for node in ring_nodes {
            assert!(!patch.contains(node));
        }
        assert_eq!(patch.node_count(), 4);
    }

    #[test]
    fn test_construction_failure_falls_back_to_none() {
        // Room for one extra node: ringmod needs two
        let (mut patch, voice1, voice2) = setup(Some(5));
        let mut router = ModulationRouter::new();

        let mode = router.switch(&mut patch, ModulationType::RingMod, 50.0, &voice1, &voice2);
        assert_eq!(mode, ModulationType::None);
        assert_eq!(router.mode(), ModulationType::None);
        assert_eq!(patch.node_count(), 4);
        assert_eq!(patch.cable_count(), 2);

        let mode = router.switch(&mut patch, ModulationType::Fm, 50.0, &voice1, &voice2);
        assert_eq!(mode, ModulationType::Fm);
    }
}
