//! # Duosynth: Two-Voice Synthesizer Engine
//!
//! `duosynth` is the topology and modulation-routing core of a two-voice
//! subtractive synthesizer. Two polyphonic oscillator voices feed a shared
//! filter and distortion stage, with switchable cross-voice modulation (ring
//! modulation, FM, hardsync) and a second envelope that can either shape voice
//! 2's amplitude or sweep the filter cutoff.
//!
//! ## Architecture
//!
//! The library is organized in three layers:
//!
//! - **Layer 1: Node Runtime** - Port conventions, the [`GraphModule`] trait, the
//!   [`Patch`] graph and the built-in nodes
//! - **Layer 2: Components** - Voices, filter routing, modulation routing,
//!   envelope trigger coordination and graph assembly
//! - **Layer 3: Engine** - [`SynthEngine`], the explicit context that reconciles
//!   configuration snapshots and dispatches note events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duosynth::prelude::*;
//!
//! let mut snapshot = SynthSnapshot::default();
//! snapshot.modulation.modulation_type = ModulationType::Fm;
//! snapshot.modulation.amount = 30.0;
//!
//! let mut engine = SynthEngine::new(EngineConfig::default(), &snapshot).unwrap();
//! engine.note_on("C4", None, None);
//! engine.note_on("E4", Some(0.8), None);
//!
//! let mut block = vec![0.0f32; 512];
//! engine.render(&mut block);
//!
//! let scope = engine.analysis().waveform();
//! ```

pub mod analysis;
pub mod assembler;
pub mod config;
pub mod curve;
pub mod engine;
pub mod error;
pub mod filter_routing;
pub mod graph;
pub mod modulation;
pub mod modules;
pub mod note;
pub mod port;
pub mod trigger;
pub mod voice;

/// Prelude module for convenient imports
pub mod prelude {
    // Layer 1: Node runtime
    pub use crate::graph::{Cable, NodeHandle, NodeId, Patch, PatchError, PortRef};
    pub use crate::modules::{
        Distortion, Envelope, Filter, Gain, Multiply, Output, PolyOscillator,
    };
    pub use crate::port::{GraphModule, ParamId, PortDef, PortId, PortSpec, PortValues, SignalKind};

    // Configuration
    pub use crate::config::{
        db_to_gain, Adsr, AnalyserMode, DistortionCurve, EngineConfig, EnvelopeDestination,
        FilterConfig, FilterType, ModulationConfig, ModulationType, OscillatorShape,
        SynthSnapshot, VoiceConfig,
    };
    pub use crate::note::{Note, ScheduleTime};

    // Layer 2: Components
    pub use crate::analysis::{Analyser, AnalysisTap};
    pub use crate::assembler::SignalGraphAssembler;
    pub use crate::filter_routing::{FilterRoutingController, RoutingState};
    pub use crate::modulation::ModulationRouter;
    pub use crate::trigger::EnvelopeTriggerCoordinator;
    pub use crate::voice::VoiceEngine;

    // Layer 3: Engine
    pub use crate::engine::SynthEngine;
    pub use crate::error::EngineError;
}

// Re-export key types at crate root for convenience
pub use prelude::*;
