use super::ControlFlowGraph;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::OnceLock;

/// Dominator tree of a control-flow graph
///
/// Built once from a snapshot of the graph; later edits to the graph are not
/// observed. Immediate dominators come from the Lengauer-Tarjan algorithm
/// (semidominators, buckets, and an ancestor forest with path compression),
/// which is near-linear in the size of the graph.
///
/// Nodes unreachable from the entrypoint are absent from every query: they
/// have no dominators and no frontier.
///
/// All queries are pure reads. The dominance frontier is computed on first
/// request through a one-shot initializer, so concurrent readers either see
/// the finished map or block once while it is built.
pub struct DominatorTree<N> {
    /// Reachable nodes in depth-first pre-order; index in this list is the
    /// node's order number
    pre_order: Vec<N>,

    /// Order number of each reachable node
    order: HashMap<N, usize>,

    /// Immediate dominator by order number; the entrypoint is its own
    /// immediate dominator
    idom: Vec<usize>,

    /// Tree children by order number
    children: Vec<Vec<usize>>,

    /// Reachable predecessors by order number, snapshotted at construction
    predecessors: Vec<Vec<usize>>,

    /// Per-node dominance frontier, computed lazily
    frontier: OnceLock<Vec<HashSet<usize>>>,
}

impl<N: Copy + Eq + Hash + Debug> DominatorTree<N> {
    /// Build the dominator tree of `graph` from its entrypoint
    pub fn new<G: ControlFlowGraph<Node = N>>(graph: &G) -> DominatorTree<N> {
        let (pre_order, order, parent) = depth_first_order(graph);
        let count = pre_order.len();

        // Predecessor lists in order-number space, unreachable sources
        // dropped
        let predecessors: Vec<Vec<usize>> = pre_order
            .iter()
            .map(|&node| {
                graph
                    .predecessors(node)
                    .into_iter()
                    .filter_map(|pred| order.get(&pred).copied())
                    .collect()
            })
            .collect();

        // Lengauer-Tarjan. Everything below works in order-number space,
        // where the order of a node is the node itself.
        let mut semi: Vec<usize> = (0..count).collect();
        let mut ancestor: Vec<Option<usize>> = vec![None; count];
        let mut label: Vec<usize> = (0..count).collect();
        let mut bucket: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut idom: Vec<usize> = vec![0; count];

        for v in (1..count).rev() {
            for index in 0..predecessors[v].len() {
                let p = predecessors[v][index];
                let u = eval(p, &mut ancestor, &mut label, &semi);
                if semi[u] < semi[v] {
                    semi[v] = semi[u];
                }
            }
            bucket[semi[v]].push(v);
            ancestor[v] = Some(parent[v]);

            for w in std::mem::take(&mut bucket[parent[v]]) {
                let u = eval(w, &mut ancestor, &mut label, &semi);
                idom[w] = if semi[u] < semi[w] { u } else { parent[v] };
            }
        }

        for v in 1..count {
            if idom[v] != semi[v] {
                idom[v] = idom[idom[v]];
            }
        }
        if count > 0 {
            idom[0] = 0;
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        for v in 1..count {
            children[idom[v]].push(v);
        }

        log::debug!("dominator tree over {} reachable nodes", count);
        DominatorTree {
            pre_order,
            order,
            idom,
            children,
            predecessors,
            frontier: OnceLock::new(),
        }
    }

    /// Is `node` reachable from the entrypoint the tree was built from?
    pub fn contains(&self, node: N) -> bool {
        self.order.contains_key(&node)
    }

    /// Reachable nodes in depth-first pre-order
    pub fn pre_order(&self) -> &[N] {
        &self.pre_order
    }

    /// Immediate dominator of `node`
    ///
    /// The entrypoint is reported as its own immediate dominator; `None`
    /// means the node is unreachable.
    pub fn immediate_dominator(&self, node: N) -> Option<N> {
        let index = *self.order.get(&node)?;
        Some(self.pre_order[self.idom[index]])
    }

    /// Children of `node` in the dominator tree
    pub fn dominated_children(&self, node: N) -> Vec<N> {
        match self.order.get(&node) {
            None => Vec::new(),
            Some(&index) => self.children[index]
                .iter()
                .map(|&child| self.pre_order[child])
                .collect(),
        }
    }

    /// Does `dominator` dominate `node`? (Reflexive: every node dominates
    /// itself.)
    pub fn dominates(&self, dominator: N, node: N) -> bool {
        let (Some(&dominator), Some(&node)) = (self.order.get(&dominator), self.order.get(&node))
        else {
            return false;
        };
        let mut current = node;
        loop {
            if current == dominator {
                return true;
            }
            if current == 0 {
                return false;
            }
            current = self.idom[current];
        }
    }

    /// Does `dominator` dominate `node` without being it?
    pub fn strictly_dominates(&self, dominator: N, node: N) -> bool {
        dominator != node && self.dominates(dominator, node)
    }

    /// Dominance frontier of `node`: the nodes where its dominance stops
    ///
    /// `n` is in the frontier of `d` exactly when `d` dominates some
    /// predecessor of `n` but does not strictly dominate `n` itself.
    pub fn dominance_frontier(&self, node: N) -> Option<HashSet<N>> {
        let index = *self.order.get(&node)?;
        Some(
            self.frontier_sets()[index]
                .iter()
                .map(|&frontier_node| self.pre_order[frontier_node])
                .collect(),
        )
    }

    /// Iterated dominance frontier of a set of seed nodes
    ///
    /// The frontier of the seeds, plus the frontier of that frontier, and so
    /// on to a fixed point. This is the placement set used when converting to
    /// static single assignment form.
    pub fn iterated_dominance_frontier(
        &self,
        seeds: impl IntoIterator<Item = N>,
    ) -> HashSet<N> {
        let frontier_sets = self.frontier_sets();
        let mut result: HashSet<usize> = HashSet::new();
        let mut worklist: Vec<usize> = seeds
            .into_iter()
            .filter_map(|node| self.order.get(&node).copied())
            .collect();

        while let Some(node) = worklist.pop() {
            for &frontier_node in &frontier_sets[node] {
                if result.insert(frontier_node) {
                    worklist.push(frontier_node);
                }
            }
        }

        result
            .into_iter()
            .map(|index| self.pre_order[index])
            .collect()
    }

    /// The cached frontier, computed on first use
    fn frontier_sets(&self) -> &[HashSet<usize>] {
        self.frontier.get_or_init(|| {
            let count = self.pre_order.len();
            let mut frontier: Vec<HashSet<usize>> = vec![HashSet::new(); count];
            for node in 0..count {
                if self.predecessors[node].len() < 2 {
                    continue;
                }
                for &pred in &self.predecessors[node] {
                    let mut runner = pred;
                    while runner != self.idom[node] {
                        frontier[runner].insert(node);
                        runner = self.idom[runner];
                    }
                }
            }
            log::debug!("dominance frontier initialized for {} nodes", count);
            frontier
        })
    }
}

/// Depth-first traversal from the entrypoint, recording pre-order numbers
/// and traversal-tree parents (in order-number space)
fn depth_first_order<G: ControlFlowGraph>(
    graph: &G,
) -> (Vec<G::Node>, HashMap<G::Node, usize>, Vec<usize>) {
    let entry = graph.entrypoint();
    let mut pre_order: Vec<G::Node> = Vec::new();
    let mut order: HashMap<G::Node, usize> = HashMap::new();
    let mut parent: Vec<usize> = Vec::new();

    let mut stack: Vec<(G::Node, usize)> = vec![(entry, 0)];
    while let Some((node, parent_index)) = stack.pop() {
        if order.contains_key(&node) {
            continue;
        }
        let index = pre_order.len();
        order.insert(node, index);
        pre_order.push(node);
        parent.push(parent_index);

        // Reversed so the first successor is visited first
        for successor in graph.successors(node).into_iter().rev() {
            if !order.contains_key(&successor) {
                stack.push((successor, index));
            }
        }
    }

    (pre_order, order, parent)
}

/// Lengauer-Tarjan `Eval` with path compression
///
/// Returns the node with minimal semidominator order on the ancestor-forest
/// path above `v` (or `v` itself when it has no ancestor yet).
fn eval(
    v: usize,
    ancestor: &mut [Option<usize>],
    label: &mut [usize],
    semi: &[usize],
) -> usize {
    if ancestor[v].is_none() {
        return v;
    }

    // Collect the path from `v` up to just below the forest root
    let mut path = vec![v];
    let mut top = v;
    while let Some(above) = ancestor[top] {
        if ancestor[above].is_some() {
            path.push(above);
            top = above;
        } else {
            break;
        }
    }

    // Compress top-down so every label on the path accumulates the minimum
    for &w in path.iter().rev() {
        let above = ancestor[w].expect("nodes on the path have ancestors");
        if let Some(root) = ancestor[above] {
            if semi[label[above]] < semi[label[w]] {
                label[w] = label[above];
            }
            ancestor[w] = Some(root);
        }
    }

    label[v]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flow::FlowGraph;

    /// `A -> B, A -> C, B -> D, C -> D`
    fn diamond() -> FlowGraph {
        let mut graph = FlowGraph::with_nodes(4);
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 3);
        graph.add_edge(2, 3);
        graph
    }

    #[test]
    fn diamond_dominators() {
        let tree = DominatorTree::new(&diamond());

        assert_eq!(tree.immediate_dominator(0), Some(0));
        assert_eq!(tree.immediate_dominator(1), Some(0));
        assert_eq!(tree.immediate_dominator(2), Some(0));
        assert_eq!(
            tree.immediate_dominator(3),
            Some(0),
            "the join point is dominated by the fork, not by either arm"
        );

        assert!(tree.dominates(0, 3));
        assert!(tree.dominates(3, 3), "domination is reflexive");
        assert!(!tree.strictly_dominates(3, 3));
        assert!(!tree.dominates(1, 3));
        assert!(!tree.dominates(2, 3));
    }

    #[test]
    fn diamond_frontier() {
        let tree = DominatorTree::new(&diamond());

        assert_eq!(tree.dominance_frontier(1), Some(HashSet::from([3])));
        assert_eq!(tree.dominance_frontier(2), Some(HashSet::from([3])));
        assert_eq!(tree.dominance_frontier(0), Some(HashSet::new()));
        assert_eq!(tree.dominance_frontier(3), Some(HashSet::new()));
    }

    /// `A -> B, A -> C, B -> C, C -> B`: the loop between B and C has two
    /// entries, so neither dominates the other
    fn irreducible() -> FlowGraph {
        let mut graph = FlowGraph::with_nodes(3);
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 2);
        graph.add_edge(2, 1);
        graph
    }

    #[test]
    fn irreducible_loop_dominators() {
        let tree = DominatorTree::new(&irreducible());

        assert_eq!(tree.immediate_dominator(1), Some(0));
        assert_eq!(tree.immediate_dominator(2), Some(0));
        assert!(!tree.dominates(1, 2));
        assert!(!tree.dominates(2, 1));
    }

    #[test]
    fn irreducible_loop_frontiers() {
        let tree = DominatorTree::new(&irreducible());

        // Each loop node's dominance ends at the other: it dominates a
        // predecessor (itself) of the other but not the other node
        assert_eq!(tree.dominance_frontier(1), Some(HashSet::from([2])));
        assert_eq!(tree.dominance_frontier(2), Some(HashSet::from([1])));

        // Iterating to a fixed point pulls each node into its own extended
        // frontier through the cycle
        assert_eq!(
            tree.iterated_dominance_frontier([1]),
            HashSet::from([1, 2])
        );
        assert_eq!(
            tree.iterated_dominance_frontier([2]),
            HashSet::from([1, 2])
        );
    }

    #[test]
    fn unreachable_nodes_are_absent() {
        let mut graph = FlowGraph::with_nodes(3);
        graph.add_edge(0, 1);
        // node 2 has no incoming path
        graph.add_edge(2, 1);

        let tree = DominatorTree::new(&graph);
        assert!(tree.contains(0));
        assert!(tree.contains(1));
        assert!(!tree.contains(2));
        assert_eq!(tree.immediate_dominator(2), None);
        assert_eq!(tree.dominance_frontier(2), None);
        assert!(!tree.dominates(2, 1));

        // The unreachable predecessor does not disturb node 1's dominators
        assert_eq!(tree.immediate_dominator(1), Some(0));
    }

    /// Loop with a branch in the body and an exit
    ///
    /// ```text
    ///   0 -> 1 -> 2 -> 4 -> 1,  2 -> 3 -> 4,  1 -> 5
    /// ```
    #[test]
    fn loop_with_inner_branch() {
        let mut graph = FlowGraph::with_nodes(6);
        graph.add_edge(0, 1);
        graph.add_edge(1, 2);
        graph.add_edge(2, 3);
        graph.add_edge(2, 4);
        graph.add_edge(3, 4);
        graph.add_edge(4, 1);
        graph.add_edge(1, 5);

        let tree = DominatorTree::new(&graph);
        assert_eq!(tree.immediate_dominator(1), Some(0));
        assert_eq!(tree.immediate_dominator(2), Some(1));
        assert_eq!(tree.immediate_dominator(3), Some(2));
        assert_eq!(tree.immediate_dominator(4), Some(2));
        assert_eq!(tree.immediate_dominator(5), Some(1));

        // The loop body's dominance ends at the loop header
        assert_eq!(tree.dominance_frontier(4), Some(HashSet::from([1])));
        assert_eq!(tree.dominance_frontier(2), Some(HashSet::from([1])));
        assert_eq!(tree.dominance_frontier(3), Some(HashSet::from([4])));
    }

    #[test]
    fn pre_order_invariants() {
        let mut graph = FlowGraph::with_nodes(7);
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 3);
        graph.add_edge(2, 3);
        graph.add_edge(3, 4);
        graph.add_edge(4, 5);
        graph.add_edge(5, 3);
        graph.add_edge(4, 6);

        let tree = DominatorTree::new(&graph);
        let order: HashMap<usize, usize> = tree
            .pre_order()
            .iter()
            .enumerate()
            .map(|(index, &node)| (node, index))
            .collect();

        for &node in tree.pre_order() {
            let idom = tree.immediate_dominator(node).unwrap();
            if node == 0 {
                assert_eq!(idom, 0, "the entrypoint is its own immediate dominator");
            } else {
                assert!(
                    order[&idom] < order[&node],
                    "an immediate dominator precedes its node in pre-order"
                );
                assert!(tree.strictly_dominates(idom, node));
            }
        }

        // Transitivity spot check through the chain 0 -> 3 -> 4
        assert!(tree.dominates(0, 3));
        assert!(tree.dominates(3, 4));
        assert!(tree.dominates(0, 4));
    }
}
