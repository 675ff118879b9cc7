//! Patch Graph
//!
//! [`Patch`] is the explicit engine context: it owns every node, the directed
//! edge set between node ports, and the render state. Components of the engine
//! hold [`NodeHandle`]s and receive `&mut Patch` for each operation.
//!
//! Edge semantics mirror a Web-Audio style runtime:
//!
//! - connecting an edge that already exists is a no-op, so the edge set never
//!   holds duplicates
//! - disconnecting a node removes all of its outgoing edges and always succeeds,
//!   even when the node has none
//! - removing (disposing) a node drops every edge that touches it

use crate::note::{Note, ScheduleTime};
use crate::port::{GraphModule, ParamId, PortId, PortSpec, PortValues};
use serde::{Deserialize, Serialize};
use slotmap::{DefaultKey, SlotMap};
use std::collections::{HashMap, VecDeque};
use tracing::error;

/// Unique identifier for a node in the patch graph
pub type NodeId = DefaultKey;

/// Reference to a specific port on a specific node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub port: PortId,
}

/// A directed edge from an output port to an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cable {
    pub from: PortRef,
    pub to: PortRef,
}

/// Internal node representation
struct Node {
    module: Box<dyn GraphModule>,
    name: String,
}

/// Error types for patch operations
#[derive(Debug, Clone, PartialEq)]
pub enum PatchError {
    InvalidNode,
    InvalidPort,
    CycleDetected { nodes: Vec<NodeId> },
    NodeLimit { limit: usize },
}

impl std::fmt::Display for PatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchError::InvalidNode => write!(f, "Invalid node"),
            PatchError::InvalidPort => write!(f, "Invalid port"),
            PatchError::CycleDetected { nodes } => {
                write!(f, "Cycle detected involving {} nodes", nodes.len())
            }
            PatchError::NodeLimit { limit } => {
                write!(f, "Node limit of {} reached", limit)
            }
        }
    }
}

impl std::error::Error for PatchError {}

/// Handle to a node for ergonomic port references
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: NodeId,
    spec: PortSpec,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Reference an output port by name
    pub fn output(&self, name: &str) -> Result<PortRef, PatchError> {
        let port = self
            .spec
            .output_by_name(name)
            .ok_or(PatchError::InvalidPort)?;
        Ok(PortRef {
            node: self.id,
            port: port.id,
        })
    }

    /// Reference an input port by name
    pub fn input(&self, name: &str) -> Result<PortRef, PatchError> {
        let port = self
            .spec
            .input_by_name(name)
            .ok_or(PatchError::InvalidPort)?;
        Ok(PortRef {
            node: self.id,
            port: port.id,
        })
    }

    /// Get the port specification
    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }
}

/// The node store, edge set and render state
pub struct Patch {
    nodes: SlotMap<NodeId, Node>,
    cables: Vec<Cable>,

    // Execution state
    execution_order: Vec<NodeId>,
    compiled: bool,
    buffers: HashMap<PortRef, f64>,

    // Configuration
    sample_rate: f64,
    node_limit: Option<usize>,

    // Output node
    output_node: Option<NodeId>,
}

impl Patch {
    /// Create a new empty patch
    pub fn new(sample_rate: f64) -> Self {
        Self {
            nodes: SlotMap::new(),
            cables: Vec::new(),
            execution_order: Vec::new(),
            compiled: false,
            buffers: HashMap::new(),
            sample_rate,
            node_limit: None,
            output_node: None,
        }
    }

    /// Create a patch that refuses to hold more than `limit` nodes
    pub fn with_node_limit(sample_rate: f64, limit: usize) -> Self {
        let mut patch = Self::new(sample_rate);
        patch.node_limit = Some(limit);
        patch
    }

    /// Get the sample rate
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Add a node to the patch
    pub fn add<M: GraphModule + 'static>(
        &mut self,
        name: impl Into<String>,
        module: M,
    ) -> Result<NodeHandle, PatchError> {
        self.add_boxed(name, Box::new(module))
    }

    /// Add a boxed node to the patch
    pub fn add_boxed(
        &mut self,
        name: impl Into<String>,
        mut module: Box<dyn GraphModule>,
    ) -> Result<NodeHandle, PatchError> {
        if let Some(limit) = self.node_limit {
            if self.nodes.len() >= limit {
                return Err(PatchError::NodeLimit { limit });
            }
        }

        module.set_sample_rate(self.sample_rate);
        let spec = module.port_spec().clone();
        let id = self.nodes.insert(Node {
            module,
            name: name.into(),
        });
        self.invalidate();
        Ok(NodeHandle { id, spec })
    }

    /// Dispose a node and every edge touching it
    pub fn remove(&mut self, node: NodeId) -> Result<(), PatchError> {
        if self.nodes.remove(node).is_none() {
            return Err(PatchError::InvalidNode);
        }

        self.cables
            .retain(|cable| cable.from.node != node && cable.to.node != node);
        self.buffers.retain(|port, _| port.node != node);

        if self.output_node == Some(node) {
            self.output_node = None;
        }

        self.invalidate();
        Ok(())
    }

    /// Whether the node is still present
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    /// Connect an output port to an input port
    ///
    /// Connecting an edge that already exists leaves the edge set unchanged.
    pub fn connect(&mut self, from: PortRef, to: PortRef) -> Result<(), PatchError> {
        self.validate_output_port(from)?;
        self.validate_input_port(to)?;

        let cable = Cable { from, to };
        if !self.cables.contains(&cable) {
            self.cables.push(cable);
            self.invalidate();
        }
        Ok(())
    }

    /// Remove a single edge, returning whether it existed
    pub fn disconnect(&mut self, from: PortRef, to: PortRef) -> bool {
        let before = self.cables.len();
        self.cables.retain(|c| !(c.from == from && c.to == to));
        let removed = self.cables.len() != before;
        if removed {
            self.invalidate();
        }
        removed
    }

    /// Remove every outgoing edge of a node
    ///
    /// Always succeeds; returns the number of edges removed.
    pub fn disconnect_node(&mut self, node: NodeId) -> usize {
        let before = self.cables.len();
        self.cables.retain(|c| c.from.node != node);
        let removed = before - self.cables.len();
        if removed > 0 {
            self.invalidate();
        }
        removed
    }

    /// Set the node whose first output is the patch output
    pub fn set_output(&mut self, node: NodeId) {
        self.output_node = Some(node);
    }

    /// Set a parameter on a node
    pub fn set_param(&mut self, node: NodeId, param: ParamId, value: f64) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.module.set_param(param, value);
        }
    }

    /// Get a parameter value from a node
    pub fn get_param(&self, node: NodeId, param: ParamId) -> Option<f64> {
        self.nodes.get(node).and_then(|n| n.module.get_param(param))
    }

    /// Forward a note-on to a node
    pub fn note_on(
        &mut self,
        node: NodeId,
        note: &Note,
        velocity: f64,
        time: Option<ScheduleTime>,
    ) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.module.note_on(note, velocity, time);
        }
    }

    /// Forward a note-off to a node
    pub fn note_off(&mut self, node: NodeId, note: &Note, time: Option<ScheduleTime>) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.module.note_off(note, time);
        }
    }

    /// Whether a node still holds an unreleased instance of `note`
    pub fn holds_note(&self, node: NodeId, note: &Note) -> bool {
        self.nodes
            .get(node)
            .is_some_and(|n| n.module.holds_note(note))
    }

    /// Force-release every note instance on a node
    pub fn release_all(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.module.release_all();
        }
    }

    /// Open a node's monophonic gate
    pub fn trigger_attack(&mut self, node: NodeId, time: Option<ScheduleTime>) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.module.trigger_attack(time);
        }
    }

    /// Close a node's monophonic gate
    pub fn trigger_release(&mut self, node: NodeId, time: Option<ScheduleTime>) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.module.trigger_release(time);
        }
    }

    /// Get node name
    pub fn get_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).map(|n| n.name.as_str())
    }

    /// Get number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get number of edges
    pub fn cable_count(&self) -> usize {
        self.cables.len()
    }

    /// Get all edges
    pub fn cables(&self) -> &[Cable] {
        &self.cables
    }

    /// Whether a specific edge exists
    pub fn has_edge(&self, from: PortRef, to: PortRef) -> bool {
        self.cables.iter().any(|c| c.from == from && c.to == to)
    }

    /// Edges described by node and port names, for introspection
    pub fn named_edges(&self) -> Vec<(String, String)> {
        self.cables
            .iter()
            .filter_map(|cable| {
                let from = self.describe_output(cable.from)?;
                let to = self.describe_input(cable.to)?;
                Some((from, to))
            })
            .collect()
    }

    fn describe_output(&self, port_ref: PortRef) -> Option<String> {
        let node = self.nodes.get(port_ref.node)?;
        let port = node.module.port_spec().output_by_id(port_ref.port)?;
        Some(format!("{}.{}", node.name, port.name))
    }

    fn describe_input(&self, port_ref: PortRef) -> Option<String> {
        let node = self.nodes.get(port_ref.node)?;
        let port = node.module.port_spec().input_by_id(port_ref.port)?;
        Some(format!("{}.{}", node.name, port.name))
    }

    fn invalidate(&mut self) {
        self.execution_order.clear();
        self.compiled = false;
    }

    fn validate_output_port(&self, port_ref: PortRef) -> Result<(), PatchError> {
        let node = self.nodes.get(port_ref.node).ok_or(PatchError::InvalidNode)?;
        node.module
            .port_spec()
            .output_by_id(port_ref.port)
            .ok_or(PatchError::InvalidPort)?;
        Ok(())
    }

    fn validate_input_port(&self, port_ref: PortRef) -> Result<(), PatchError> {
        let node = self.nodes.get(port_ref.node).ok_or(PatchError::InvalidNode)?;
        node.module
            .port_spec()
            .input_by_id(port_ref.port)
            .ok_or(PatchError::InvalidPort)?;
        Ok(())
    }

    /// Compile the patch into an executable order
    pub fn compile(&mut self) -> Result<(), PatchError> {
        let order = self.topological_sort()?;
        self.execution_order = order;
        self.compiled = true;

        for (id, node) in &self.nodes {
            for output in &node.module.port_spec().outputs {
                self.buffers
                    .entry(PortRef {
                        node: id,
                        port: output.id,
                    })
                    .or_insert(0.0);
            }
        }

        Ok(())
    }

    fn topological_sort(&self) -> Result<Vec<NodeId>, PatchError> {
        let mut in_degree: HashMap<NodeId, usize> = self.nodes.keys().map(|k| (k, 0)).collect();
        let mut successors: HashMap<NodeId, Vec<NodeId>> =
            self.nodes.keys().map(|k| (k, vec![])).collect();

        for cable in &self.cables {
            *in_degree.entry(cable.to.node).or_insert(0) += 1;
            successors
                .entry(cable.from.node)
                .or_default()
                .push(cable.to.node);
        }

        // Kahn's algorithm, seeded in slot order so rendering is deterministic
        let mut queue: VecDeque<NodeId> = self
            .nodes
            .keys()
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            result.push(node);
            if let Some(succs) = successors.get(&node) {
                for succ in succs {
                    if let Some(deg) = in_degree.get_mut(succ) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(*succ);
                        }
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            let in_cycle: Vec<NodeId> = in_degree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(id, _)| id)
                .collect();
            return Err(PatchError::CycleDetected { nodes: in_cycle });
        }

        Ok(result)
    }

    /// Process a single sample, returning the mono output
    ///
    /// Recompiles lazily after any topology change. A patch that fails to
    /// compile renders silence.
    pub fn tick(&mut self) -> f64 {
        if !self.compiled {
            if let Err(err) = self.compile() {
                error!("patch failed to compile: {}", err);
                return 0.0;
            }
        }

        for index in 0..self.execution_order.len() {
            let node_id = self.execution_order[index];
            let inputs = self.gather_inputs(node_id);
            let mut outputs = PortValues::new();

            if let Some(node) = self.nodes.get_mut(node_id) {
                node.module.tick(&inputs, &mut outputs);
            }

            self.scatter_outputs(node_id, &outputs);
        }

        self.read_output()
    }

    /// Render a block of samples
    pub fn render(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.tick() as f32;
        }
    }

    fn gather_inputs(&self, node_id: NodeId) -> PortValues {
        let node = match self.nodes.get(node_id) {
            Some(n) => n,
            None => return PortValues::new(),
        };
        let mut values = PortValues::new();

        for input in &node.module.port_spec().inputs {
            let port_ref = PortRef {
                node: node_id,
                port: input.id,
            };

            // Sum all incoming edges
            let mut sum = 0.0;
            let mut has_connection = false;

            for cable in &self.cables {
                if cable.to == port_ref {
                    has_connection = true;
                    sum += self.buffers.get(&cable.from).copied().unwrap_or(0.0);
                }
            }

            values.set(input.id, if has_connection { sum } else { input.default });
        }

        values
    }

    fn scatter_outputs(&mut self, node_id: NodeId, outputs: &PortValues) {
        for (&port_id, &value) in &outputs.values {
            self.buffers.insert(
                PortRef {
                    node: node_id,
                    port: port_id,
                },
                value,
            );
        }
    }

    fn read_output(&self) -> f64 {
        let Some(output_node) = self.output_node else {
            return 0.0;
        };
        let Some(node) = self.nodes.get(output_node) else {
            return 0.0;
        };
        node.module
            .port_spec()
            .outputs
            .first()
            .and_then(|port| {
                self.buffers
                    .get(&PortRef {
                        node: output_node,
                        port: port.id,
                    })
                    .copied()
            })
            .unwrap_or(0.0)
    }
}
