use anyhow::{Result, bail};
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::mem;

use crate::audio::analysis::AnalysisTap;
use crate::chain::EffectKind;
use crate::effects::Stage;
use crate::effects::level::LevelStage;
use crate::graph::registry::EffectNodeRegistry;
use crate::graph::{Connection, EffectNode, NodeRef, StereoBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerRole {
    Dry,
    Wet,
    Sum,
}

/// Transient gain stage of a parallel block.
pub struct Mixer {
    pub kind: EffectKind,
    pub role: MixerRole,
    pub stage: LevelStage,
}

#[derive(Clone, Copy)]
enum Step {
    /// Emit the delay line's output before its input is known.
    DelayRead(usize),
    Process(usize),
    /// Feed the summed inputs into the delay line.
    DelayWrite(usize),
}

/// A wired graph plus the render schedule compiled from it.
///
/// Connections are collected first with [`Topology::connect`]; then
/// [`Topology::compile`] orders the nodes and preallocates one buffer per
/// node. A compiled topology renders without allocating.
pub struct Topology {
    connections: Vec<Connection>,
    mixers: Vec<Mixer>,
    tap_point: Option<NodeRef>,

    nodes: Vec<NodeRef>,
    inputs: Vec<Vec<usize>>,
    schedule: Vec<Step>,
    buffers: Vec<StereoBuffer>,
    scratch: StereoBuffer,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology {
    pub fn new() -> Self {
        Self {
            connections: Vec::new(),
            mixers: Vec::new(),
            tap_point: None,
            nodes: Vec::new(),
            inputs: Vec::new(),
            schedule: Vec::new(),
            buffers: Vec::new(),
            scratch: StereoBuffer::new(0),
        }
    }

    /// Add an edge. Duplicates are ignored.
    pub fn connect(&mut self, from: NodeRef, to: NodeRef) {
        let connection = Connection { from, to };
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
    }

    pub fn add_mixer(&mut self, kind: EffectKind, role: MixerRole, gain: f32) -> NodeRef {
        self.mixers.push(Mixer {
            kind,
            role,
            stage: LevelStage::new(gain),
        });
        NodeRef::Mixer(self.mixers.len() - 1)
    }

    pub fn set_tap_point(&mut self, point: NodeRef) {
        self.tap_point = Some(point);
    }

    /// Node feeding the analysis tap.
    pub const fn tap_point(&self) -> Option<NodeRef> {
        self.tap_point
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn mixers(&self) -> &[Mixer] {
        &self.mixers
    }

    pub fn mixer(&self, node: NodeRef) -> Option<&Mixer> {
        match node {
            NodeRef::Mixer(idx) => self.mixers.get(idx),
            _ => None,
        }
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        self.connections.iter().any(|c| c.from == node || c.to == node)
    }

    pub fn successors(&self, node: NodeRef) -> Vec<NodeRef> {
        self.connections
            .iter()
            .filter(|c| c.from == node)
            .map(|c| c.to)
            .collect()
    }

    pub fn predecessors(&self, node: NodeRef) -> Vec<NodeRef> {
        self.connections
            .iter()
            .filter(|c| c.to == node)
            .map(|c| c.from)
            .collect()
    }

    /// Walk from the source to the sink while the path does not branch,
    /// ignoring the delay feedback loop. Returns `None` at the first split.
    pub fn linear_path(&self) -> Option<Vec<NodeRef>> {
        let mut path = vec![NodeRef::Source];
        let mut current = NodeRef::Source;
        while current != NodeRef::Sink {
            let next: Vec<NodeRef> = self
                .successors(current)
                .into_iter()
                .filter(|&n| n != NodeRef::Effect(EffectNode::DelayFeedback))
                .collect();
            match next.as_slice() {
                [only] if !path.contains(only) => {
                    path.push(*only);
                    current = *only;
                }
                _ => return None,
            }
        }
        Some(path)
    }

    /// Effect kinds between master and tap, one entry per block.
    pub fn effect_groups(&self) -> Option<Vec<EffectKind>> {
        let mut groups: Vec<EffectKind> = Vec::new();
        for node in self.linear_path()? {
            if let NodeRef::Effect(effect) = node
                && groups.last() != Some(&effect.kind())
            {
                groups.push(effect.kind());
            }
        }
        Some(groups)
    }

    /// Order the nodes for rendering and allocate their buffers.
    ///
    /// Edges into the delay line do not constrain the order, which breaks
    /// the feedback cycle; any other cycle is an error.
    pub fn compile(&mut self, registry: &EffectNodeRegistry, quantum: usize) -> Result<()> {
        let mut index: HashMap<NodeRef, usize> = HashMap::new();
        let mut nodes: Vec<NodeRef> = Vec::new();
        for c in &self.connections {
            for node in [c.from, c.to] {
                index.entry(node).or_insert_with(|| {
                    nodes.push(node);
                    nodes.len() - 1
                });
            }
        }

        if !index.contains_key(&NodeRef::Source) || !index.contains_key(&NodeRef::Sink) {
            bail!("topology must connect the source to the sink");
        }
        for &node in &nodes {
            match node {
                NodeRef::Effect(effect) if !registry.contains(effect.kind()) => {
                    bail!("{node} is wired but its node was never created");
                }
                NodeRef::Mixer(idx) if idx >= self.mixers.len() => {
                    bail!("{node} does not exist");
                }
                _ => {}
            }
        }

        let delay = NodeRef::Effect(EffectNode::Delay);
        let mut inputs = vec![Vec::new(); nodes.len()];
        let mut outputs = vec![Vec::new(); nodes.len()];
        let mut pending = vec![0usize; nodes.len()];
        for c in &self.connections {
            let (from, to) = (index[&c.from], index[&c.to]);
            inputs[to].push(from);
            if c.to != delay {
                outputs[from].push(to);
                pending[to] += 1;
            }
        }

        let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| pending[i] == 0).collect();
        let mut schedule = Vec::with_capacity(nodes.len() + 1);
        let mut delay_idx = None;
        while let Some(i) = ready.pop_front() {
            if nodes[i] == delay {
                schedule.push(Step::DelayRead(i));
                delay_idx = Some(i);
            } else {
                schedule.push(Step::Process(i));
            }
            for &next in &outputs[i] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.push_back(next);
                }
            }
        }
        if schedule.len() != nodes.len() {
            bail!("topology has a cycle that does not pass through the delay line");
        }
        if let Some(i) = delay_idx {
            schedule.push(Step::DelayWrite(i));
        }

        debug!(
            "Compiled topology: {} nodes, {} connections",
            nodes.len(),
            self.connections.len()
        );

        self.buffers = vec![StereoBuffer::new(quantum); nodes.len()];
        self.scratch = StereoBuffer::new(quantum);
        self.nodes = nodes;
        self.inputs = inputs;
        self.schedule = schedule;
        Ok(())
    }

    pub fn is_compiled(&self) -> bool {
        !self.schedule.is_empty()
    }

    /// Render order, delay write last.
    pub fn render_order(&self) -> Vec<NodeRef> {
        self.schedule
            .iter()
            .map(|step| match step {
                Step::DelayRead(i) | Step::Process(i) | Step::DelayWrite(i) => self.nodes[*i],
            })
            .collect()
    }

    fn gather_inputs(&mut self, i: usize) {
        self.scratch.clear();
        for &input in &self.inputs[i] {
            self.scratch.add(&self.buffers[input]);
        }
    }

    /// Render one quantum from `input` into the output slices.
    pub fn render(
        &mut self,
        registry: &mut EffectNodeRegistry,
        tap: &mut AnalysisTap,
        input: &StereoBuffer,
        left_out: &mut [f32],
        right_out: &mut [f32],
    ) {
        let mut sink = None;

        for step in 0..self.schedule.len() {
            match self.schedule[step] {
                Step::DelayRead(i) => {
                    let (l, r) = self.buffers[i].channels_mut();
                    registry.delay_read(l, r);
                }
                Step::DelayWrite(i) => {
                    self.gather_inputs(i);
                    registry.delay_write(self.scratch.left(), self.scratch.right());
                }
                Step::Process(i) => {
                    if self.nodes[i] == NodeRef::Source {
                        self.buffers[i].copy_from(input.left(), input.right());
                        continue;
                    }

                    self.gather_inputs(i);
                    mem::swap(&mut self.scratch, &mut self.buffers[i]);
                    let (l, r) = self.buffers[i].channels_mut();
                    match self.nodes[i] {
                        NodeRef::Master => registry.master_mut().process_block(l, r),
                        NodeRef::Effect(node) => registry.process(node, l, r),
                        NodeRef::Mixer(m) => self.mixers[m].stage.process_block(l, r),
                        NodeRef::Tap => tap.process(l, r),
                        NodeRef::Sink => sink = Some(i),
                        NodeRef::Source => {}
                    }
                }
            }
        }

        match sink {
            Some(i) => self.buffers[i].copy_to(left_out, right_out),
            None => {
                left_out.fill(0.0);
                right_out.fill(0.0);
            }
        }
    }
}
