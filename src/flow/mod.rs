//! Control-flow graphs and analyses over them
//!
//! Analyses in this module are written against the [`ControlFlowGraph`]
//! trait, so any caller-provided graph with stable, hashable node identities
//! works. [`FlowGraph`] is the crate's own adjacency-list implementation,
//! convenient for building graphs by hand.

mod dominators;

pub use dominators::*;

use std::fmt::Debug;
use std::hash::Hash;

/// Abstract control-flow graph
///
/// Node identities are used as map keys by the analyses, so they must be
/// cheap to copy, hash and compare, and must be stable for the life of the
/// graph.
pub trait ControlFlowGraph {
    type Node: Copy + Eq + Hash + Debug;

    /// The node where execution enters
    fn entrypoint(&self) -> Self::Node;

    /// Targets of the node's outgoing edges
    fn successors(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Sources of the node's incoming edges
    fn predecessors(&self, node: Self::Node) -> Vec<Self::Node>;
}

/// Adjacency-list control-flow graph with `usize` node ids
pub struct FlowGraph {
    entrypoint: usize,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl FlowGraph {
    /// New graph with `count` nodes, no edges, and node 0 as entrypoint
    pub fn with_nodes(count: usize) -> FlowGraph {
        FlowGraph {
            entrypoint: 0,
            successors: vec![Vec::new(); count],
            predecessors: vec![Vec::new(); count],
        }
    }

    /// Add a node, returning its id
    pub fn add_node(&mut self) -> usize {
        self.successors.push(Vec::new());
        self.predecessors.push(Vec::new());
        self.successors.len() - 1
    }

    pub fn node_count(&self) -> usize {
        self.successors.len()
    }

    /// Add a directed edge
    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.successors[from].push(to);
        self.predecessors[to].push(from);
    }

    pub fn set_entrypoint(&mut self, node: usize) {
        self.entrypoint = node;
    }
}

impl ControlFlowGraph for FlowGraph {
    type Node = usize;

    fn entrypoint(&self) -> usize {
        self.entrypoint
    }

    fn successors(&self, node: usize) -> Vec<usize> {
        self.successors[node].clone()
    }

    fn predecessors(&self, node: usize) -> Vec<usize> {
        self.predecessors[node].clone()
    }
}
