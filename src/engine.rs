//! Synth Engine
//!
//! [`SynthEngine`] is the explicit context object for the two-voice instrument.
//! It owns the [`Patch`] and every component, takes configuration snapshots and
//! note events, and renders audio from the output sink.
//!
//! Each snapshot goes through two passes in a fixed order:
//!
//! 1. [`SynthEngine::reconcile`] compares the topology fields (modulation type
//!    and envelope destination) with the last applied snapshot and rebuilds the
//!    graph when either changed.
//! 2. [`SynthEngine::apply_parameters`] sets every other field in place.
//!
//! ```ignore
//! let mut engine = SynthEngine::new(EngineConfig::default(), &SynthSnapshot::default())?;
//! engine.note_on("C4", None, None);
//! let mut block = [0.0f32; 512];
//! engine.render(&mut block);
//! ```

use crate::analysis::AnalysisTap;
use crate::assembler::SignalGraphAssembler;
use crate::config::{EngineConfig, EnvelopeDestination, ModulationType, SynthSnapshot, VoiceConfig};
use crate::error::EngineError;
use crate::filter_routing::FilterRoutingController;
use crate::graph::{NodeId, Patch};
use crate::modulation::ModulationRouter;
use crate::note::{Note, ScheduleTime};
use crate::trigger::EnvelopeTriggerCoordinator;
use crate::voice::VoiceEngine;
use tracing::{debug, error, info, warn};

/// The two-voice engine context
pub struct SynthEngine {
    config: EngineConfig,
    patch: Patch,
    voices: [VoiceEngine; 2],
    routing: FilterRoutingController,
    router: ModulationRouter,
    coordinator: EnvelopeTriggerCoordinator,
    assembler: SignalGraphAssembler,
    tap: AnalysisTap,
    applied: Option<SynthSnapshot>,
    shut_down: bool,
}

impl SynthEngine {
    /// Create every node and apply the initial snapshot
    pub fn new(config: EngineConfig, snapshot: &SynthSnapshot) -> Result<Self, EngineError> {
        let config = config.sanitized();
        let mut patch = match config.node_limit {
            Some(limit) => Patch::with_node_limit(config.sample_rate, limit),
            None => Patch::new(config.sample_rate),
        };

        let voices = [
            VoiceEngine::new(&mut patch, "voice1", config.max_polyphony)?,
            VoiceEngine::new(&mut patch, "voice2", config.max_polyphony)?,
        ];
        let routing = FilterRoutingController::new(&mut patch, config.curve_resolution)?;
        let tap = AnalysisTap::new(config.analyser_size, config.analyser_mode);
        let assembler = SignalGraphAssembler::new(&mut patch, &tap)?;

        let mut engine = Self {
            config,
            patch,
            voices,
            routing,
            router: ModulationRouter::new(),
            coordinator: EnvelopeTriggerCoordinator::new(),
            assembler,
            tap,
            applied: None,
            shut_down: false,
        };
        engine.apply_snapshot(snapshot);

        info!(
            sample_rate = engine.config.sample_rate,
            nodes = engine.patch.node_count(),
            "synth engine initialized"
        );
        Ok(engine)
    }

    /// Reconcile topology, then apply parameters
    pub fn apply_snapshot(&mut self, snapshot: &SynthSnapshot) {
        self.reconcile(snapshot);
        self.apply_parameters(snapshot);
    }

    /// Rebuild the graph if a topology-relevant field changed
    ///
    /// Returns whether a rebuild happened.
    pub fn reconcile(&mut self, snapshot: &SynthSnapshot) -> bool {
        if self.shut_down {
            return false;
        }
        let snapshot = snapshot.sanitized();

        let changed = match &self.applied {
            Some(previous) => previous.topology_differs(&snapshot),
            None => true,
        };
        if !changed {
            return false;
        }

        let leaving_shared = self
            .applied
            .is_some_and(|previous| previous.envelope_destination == EnvelopeDestination::FilterCutoff)
            && snapshot.envelope_destination != EnvelopeDestination::FilterCutoff;
        if leaving_shared {
            self.coordinator.reset(&mut self.patch, &self.routing);
        }

        debug!(
            modulation = %snapshot.modulation.modulation_type,
            destination = ?snapshot.envelope_destination,
            "reconciling topology"
        );
        if let Err(err) = self.assembler.rebuild(
            &mut self.patch,
            &snapshot,
            &self.voices,
            &mut self.routing,
            &mut self.router,
        ) {
            error!("signal graph rebuild failed: {}", err);
        }

        self.applied = Some(snapshot);
        true
    }

    /// Apply every non-topology field in place
    pub fn apply_parameters(&mut self, snapshot: &SynthSnapshot) {
        if self.shut_down {
            return;
        }
        let snapshot = snapshot.sanitized();
        let [voice1, voice2] = &self.voices;

        voice1.apply(&mut self.patch, &snapshot.voice1);
        voice2.apply(
            &mut self.patch,
            &VoiceConfig {
                envelope: self.routing.voice2_envelope(&snapshot.voice2.envelope),
                ..snapshot.voice2
            },
        );

        self.routing.apply_filter(&mut self.patch, &snapshot.filter);
        self.routing.set_envelope(&mut self.patch, &snapshot.voice2.envelope);
        self.router.set_amount(&mut self.patch, snapshot.modulation.amount);

        if let Some(applied) = &mut self.applied {
            applied.voice1 = snapshot.voice1;
            applied.voice2 = snapshot.voice2;
            applied.filter = snapshot.filter;
            applied.modulation.amount = snapshot.modulation.amount;
        }
    }

    /// Start `note` on both voices
    ///
    /// Unparseable note names are logged and ignored.
    pub fn note_on(&mut self, note: &str, velocity: Option<f64>, time: Option<ScheduleTime>) {
        if self.shut_down {
            return;
        }
        let Some(note) = parse_note(note) else {
            return;
        };
        self.coordinator.note_on(
            &mut self.patch,
            &self.voices,
            &self.routing,
            &note,
            velocity,
            time,
        );
    }

    /// Release `note` on both voices
    pub fn note_off(&mut self, note: &str, time: Option<ScheduleTime>) {
        if self.shut_down {
            return;
        }
        let Some(note) = parse_note(note) else {
            return;
        };
        self.coordinator
            .note_off(&mut self.patch, &self.voices, &self.routing, &note, time);
    }

    /// Force-release everything and clear the held-note set
    pub fn release_all(&mut self) {
        if self.shut_down {
            return;
        }
        self.coordinator
            .release_all(&mut self.patch, &self.voices, &self.routing);
    }

    /// Render one sample
    pub fn tick(&mut self) -> f64 {
        if self.shut_down {
            return 0.0;
        }
        self.patch.tick()
    }

    /// Render a block of samples
    pub fn render(&mut self, buffer: &mut [f32]) {
        if self.shut_down {
            buffer.fill(0.0);
            return;
        }
        self.patch.render(buffer);
    }

    /// Read-only view of the most recent output
    pub fn analysis(&self) -> &AnalysisTap {
        &self.tap
    }

    /// The node runtime, for introspection
    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn voice(&self, index: usize) -> Option<&VoiceEngine> {
        self.voices.get(index)
    }

    pub fn filter_routing(&self) -> &FilterRoutingController {
        &self.routing
    }

    pub fn coordinator(&self) -> &EnvelopeTriggerCoordinator {
        &self.coordinator
    }

    /// Modulation mode actually wired; `None` after a construction failure
    pub fn modulation_type(&self) -> ModulationType {
        self.router.mode()
    }

    /// The last snapshot applied, after clamping
    pub fn snapshot(&self) -> Option<&SynthSnapshot> {
        self.applied.as_ref()
    }

    pub fn rebuilds(&self) -> u64 {
        self.assembler.rebuilds()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Disconnect and dispose every owned node
    ///
    /// Later calls, and every other operation afterwards, are no-ops.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        self.coordinator
            .release_all(&mut self.patch, &self.voices, &self.routing);
        self.router.teardown(&mut self.patch);

        let mut owned: Vec<NodeId> = Vec::new();
        for voice in &self.voices {
            owned.extend(voice.nodes());
        }
        owned.extend(self.routing.nodes());
        owned.extend(self.assembler.nodes());
        for node in owned {
            self.patch.disconnect_node(node);
            let _ = self.patch.remove(node);
        }

        self.shut_down = true;
        info!("synth engine shut down");
    }
}

impl std::fmt::Debug for SynthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthEngine")
            .field("config", &self.config)
            .field("modulation", &self.router.mode())
            .field("routing", &self.routing.state())
            .field("nodes", &self.patch.node_count())
            .field("edges", &self.patch.cable_count())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

fn parse_note(text: &str) -> Option<Note> {
    match Note::parse(text) {
        Ok(note) => Some(note),
        Err(err) => {
            warn!("ignoring note event: {}", err);
            None
        }
    }
}
