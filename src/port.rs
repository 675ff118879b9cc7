//! Signal Conventions and Port System
//!
//! This module defines the signal types, port definitions, and the type-erased
//! node interface that every node in a [`Patch`](crate::graph::Patch) implements.
//!
//! Signals follow Web-Audio conventions rather than modular voltages: audio is
//! full scale at ±1.0, and parameter-style inputs carry values in the unit of the
//! parameter they modulate (Hz for frequency inputs, linear gain for gain inputs).

use crate::note::{Note, ScheduleTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a port within a node
pub type PortId = u32;

/// Unique identifier for a parameter within a node
pub type ParamId = u32;

/// Semantic signal classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Audio signal, full scale ±1.0
    Audio,

    /// Unipolar control signal, 0.0–1.0 (envelopes)
    Control,

    /// Offset added to a frequency parameter, in Hz
    Frequency,

    /// Offset added to a linear gain or factor parameter
    Gain,
}

/// Definition of a single port (input or output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    /// Unique identifier within the node
    pub id: PortId,

    /// Human-readable name (e.g., "in", "frequency", "out")
    pub name: String,

    /// Signal kind for validation and introspection
    pub kind: SignalKind,

    /// Value used when no edge is connected
    pub default: f64,
}

impl PortDef {
    pub fn new(id: PortId, name: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            default: 0.0,
        }
    }
}

/// Specification of all ports for a node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSpec {
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
}

impl PortSpec {
    pub fn input_by_name(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn input_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.id == id)
    }

    pub fn output_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.id == id)
    }
}

/// Runtime port values container
#[derive(Debug, Clone, Default)]
pub struct PortValues {
    pub values: HashMap<PortId, f64>,
}

impl PortValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: PortId) -> Option<f64> {
        self.values.get(&id).copied()
    }

    pub fn get_or(&self, id: PortId, default: f64) -> f64 {
        self.values.get(&id).copied().unwrap_or(default)
    }

    pub fn set(&mut self, id: PortId, value: f64) {
        self.values.insert(id, value);
    }
}

/// Type-erased node interface for graph-based patching
///
/// Besides per-sample processing, a node may accept note and trigger events.
/// The default implementations ignore them, so only nodes that articulate notes
/// (oscillator voices) or gates (envelopes) need to override them.
pub trait GraphModule: Send + Sync {
    /// Returns the node's port specification
    fn port_spec(&self) -> &PortSpec;

    /// Process one sample given port values
    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues);

    /// Reset internal state
    fn reset(&mut self);

    /// Set sample rate
    fn set_sample_rate(&mut self, sample_rate: f64);

    /// Get a parameter value
    fn get_param(&self, _id: ParamId) -> Option<f64> {
        None
    }

    /// Set a parameter value
    fn set_param(&mut self, _id: ParamId, _value: f64) {}

    /// Start a polyphonic note instance
    fn note_on(&mut self, _note: &Note, _velocity: f64, _time: Option<ScheduleTime>) {}

    /// Release a polyphonic note instance
    fn note_off(&mut self, _note: &Note, _time: Option<ScheduleTime>) {}

    /// Force-release every sounding instance
    fn release_all(&mut self) {}

    /// Whether `note` has an instance that has not been released
    fn holds_note(&self, _note: &Note) -> bool {
        false
    }

    /// Open a monophonic gate
    fn trigger_attack(&mut self, _time: Option<ScheduleTime>) {}

    /// Close a monophonic gate
    fn trigger_release(&mut self, _time: Option<ScheduleTime>) {}

    /// Get node type identifier
    fn type_id(&self) -> &'static str {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_spec_lookup() {
        let spec = PortSpec {
            inputs: vec![
                PortDef::new(0, "in", SignalKind::Audio),
                PortDef::new(1, "frequency", SignalKind::Frequency),
            ],
            outputs: vec![PortDef::new(10, "out", SignalKind::Audio)],
        };

        assert_eq!(spec.input_by_name("frequency").map(|p| p.id), Some(1));
        assert_eq!(spec.output_by_id(10).map(|p| p.name.as_str()), Some("out"));
        assert!(spec.input_by_name("out").is_none());
    }
}
