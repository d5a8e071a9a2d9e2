//! Liveness analysis for graph splitting.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::Model;

/// Remaining-consumer count and closed node-index lifetime of one runtime
/// tensor: the lower bound is its first occurrence, the upper bound its last
/// occurrence as an input.
struct Liveness {
    read_count: usize,
    range: (usize, usize),
}

impl Model {
    /// Splits the node list at every node whose kind is in `kinds`.
    ///
    /// Returns, keyed by node name, the set of tensor names that are alive
    /// across that node's position: produced before it, still awaiting a
    /// consumer at or after it, minus the node's own outputs. This is
    /// exactly the input/output contract a graph segment boundary at that
    /// node must expose.
    pub fn split_points(&self, kinds: &HashSet<String>) -> HashMap<String, BTreeSet<String>> {
        let nodes = self.nodes();

        let mut counters: HashMap<&str, Liveness> = HashMap::with_capacity(nodes.len());
        let mut producer_index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());

        // pass 1: read counts and lifetime intervals, file order
        for (index, node) in nodes.iter().enumerate() {
            for output in node.outputs() {
                producer_index.insert(output.as_str(), index);
            }

            for input in node.inputs() {
                // constants never cross a boundary at runtime
                if input.is_empty() || self.initializer(input).is_some() {
                    continue;
                }

                let first = producer_index.get(input.as_str()).copied().unwrap_or(0);
                let counter = counters.entry(input.as_str()).or_insert(Liveness {
                    read_count: 0,
                    range: (first, first),
                });
                counter.read_count += 1;
                counter.range.1 = index;
            }
        }

        // pass 2: retire reads in order; at each split point the intervals
        // covering the current index are the alive set
        let mut boundaries: HashMap<String, BTreeSet<String>> = HashMap::new();

        for (index, node) in nodes.iter().enumerate() {
            for input in node.inputs() {
                if input.is_empty() || self.initializer(input).is_some() {
                    continue;
                }
                if let Some(counter) = counters.get_mut(input.as_str()) {
                    if counter.read_count > 0 {
                        counter.read_count -= 1;
                    } else {
                        counters.remove(input.as_str());
                    }
                }
            }

            if kinds.contains(node.op_type()) {
                let own_outputs: HashSet<&str> =
                    node.outputs().iter().map(String::as_str).collect();
                let alive: BTreeSet<String> = counters
                    .iter()
                    .filter(|(name, counter)| {
                        counter.range.0 <= index
                            && index <= counter.range.1
                            && !own_outputs.contains(*name)
                    })
                    .map(|(name, _)| (*name).to_string())
                    .collect();
                boundaries.insert(node.name().to_string(), alive);
            }
        }

        boundaries
    }
}
