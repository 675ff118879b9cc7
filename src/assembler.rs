//! Signal Graph Assembler
//!
//! Rebuilds the whole signal graph whenever a topology-relevant setting
//! changes. Every owned node is disconnected first, then the graph is wired
//! back in a fixed order:
//!
//! ```text
//! voices ─▶ modulation ─▶ voice gains ─▶ filter ─▶ distortion ─▶ analyser ─▶ output
//! ```
//!
//! followed by the envelope-destination path.

use crate::analysis::AnalysisTap;
use crate::config::SynthSnapshot;
use crate::filter_routing::FilterRoutingController;
use crate::graph::{NodeHandle, NodeId, Patch, PatchError};
use crate::modulation::ModulationRouter;
use crate::modules::Output;
use crate::voice::VoiceEngine;
use tracing::debug;

/// Owner of the graph tail (analyser and output sink) and of the rebuild order
#[derive(Debug)]
pub struct SignalGraphAssembler {
    analyser: NodeHandle,
    output: NodeHandle,
    rebuilds: u64,
}

impl SignalGraphAssembler {
    pub fn new(patch: &mut Patch, tap: &AnalysisTap) -> Result<Self, PatchError> {
        let analyser = patch.add("analyser", tap.analyser())?;
        let output = match patch.add("output", Output::new()) {
            Ok(handle) => handle,
            Err(err) => {
                let _ = patch.remove(analyser.id());
                return Err(err);
            }
        };
        patch.set_output(output.id());

        Ok(Self {
            analyser,
            output,
            rebuilds: 0,
        })
    }

    pub fn output(&self) -> &NodeHandle {
        &self.output
    }

    /// Number of full rebuilds performed
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn nodes(&self) -> [NodeId; 2] {
        [self.analyser.id(), self.output.id()]
    }

    /// Tear down and rewire the whole graph for `snapshot`
    ///
    /// Disconnecting a node with no edges is a silent no-op, so every owned
    /// node is disconnected unconditionally.
    pub fn rebuild(
        &mut self,
        patch: &mut Patch,
        snapshot: &SynthSnapshot,
        voices: &[VoiceEngine; 2],
        routing: &mut FilterRoutingController,
        router: &mut ModulationRouter,
    ) -> Result<(), PatchError> {
        let [voice1, voice2] = voices;

        let mut owned: Vec<NodeId> = Vec::new();
        owned.extend(voice1.nodes());
        owned.extend(voice2.nodes());
        owned.extend(router.nodes());
        owned.extend(routing.nodes());
        owned.extend(self.nodes());
        for node in owned {
            patch.disconnect_node(node);
        }

        // Voice outputs and modulation wiring into the voice gains
        router.switch(
            patch,
            snapshot.modulation.modulation_type,
            snapshot.modulation.amount,
            voice1,
            voice2,
        );

        let filter = routing.filter();
        let distortion = routing.distortion();
        for voice in voices {
            patch.connect(voice.output().output("out")?, filter.input("in")?)?;
        }
        patch.connect(filter.output("out")?, distortion.input("in")?)?;
        patch.connect(distortion.output("out")?, self.analyser.input("in")?)?;
        patch.connect(self.analyser.output("out")?, self.output.input("in")?)?;

        routing.set_destination(
            patch,
            snapshot.envelope_destination,
            voice2,
            &snapshot.voice2,
        )?;

        self.rebuilds += 1;
        debug!(
            rebuild = self.rebuilds,
            modulation = %router.mode(),
            destination = ?snapshot.envelope_destination,
            edges = patch.cable_count(),
            "signal graph rebuilt"
        );
        Ok(())
    }
}
