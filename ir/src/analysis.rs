//! Producer/consumer edge analysis.
//!
//! Edges come from two sources: explicit `inputs`, and `input_names` resolved against the
//! outputs of earlier nodes. A name with no earlier writer is an external reference
//! (parameter, loop variable) and contributes no edge.

use std::collections::HashMap;

use itertools::Itertools;
use tracing::{trace, warn};

use crate::{IRFunction, NodeId};

/// Populate `producers` and `consumers` for every node of `func`.
///
/// Existing edges are cleared first, so running the analysis twice yields the same graph.
/// Input ids past the end of the arena are logged and skipped; [`IRFunction::validate`]
/// does not check them.
pub fn analyze(func: &mut IRFunction) {
    for node in func.all_nodes_mut() {
        node.producers.clear();
        node.consumers.clear();
    }

    let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
    let mut writers: HashMap<&str, NodeId> = HashMap::new();
    let count = func.all_nodes().len();

    for node in func.all_nodes() {
        for &input in &node.inputs {
            if input.index() < count {
                edges.push((input, node.id));
            } else {
                warn!(node = %node.id, %input, "input names no node, edge dropped");
            }
        }

        for name in &node.input_names {
            if let Some(&writer) = writers.get(name.as_str()) {
                edges.push((writer, node.id));
            }
        }

        for out in &node.outputs {
            writers.insert(out.as_str(), node.id);
        }
    }

    // Sorted (producer, consumer) pairs keep both edge lists ascending.
    let edges = edges.into_iter().sorted().dedup().collect_vec();
    trace!(edges = edges.len(), "dataflow edges resolved");

    for (producer, consumer) in edges {
        func[consumer].producers.push(producer);
        func[producer].consumers.push(consumer);
    }
}
