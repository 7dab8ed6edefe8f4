//! Read-only graph export for external visualizers.
//!
//! Discovers the reachable node set from a set of roots with the same
//! rank-ordered traversal the backward propagator uses, without computing
//! any gradients.

use super::{node::Value, registry, OpNodeId, ValueId};
use crate::{array::ArrayDesc, compat::*};

#[derive(Clone, Debug)]
pub struct ValueInfo {
    pub id: ValueId,
    pub rank: usize,
    pub requires_grad: bool,
    pub is_leaf: bool,
    pub desc: Option<ArrayDesc>,
}

#[derive(Clone, Debug)]
pub struct OpInfo {
    pub id: OpNodeId,
    pub name: String,
    pub rank: usize,
}

/// A directed edge of the exported graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphEdge {
    /// An input edge: value consumed by an operation.
    ValueToOp { from: ValueId, to: OpNodeId },
    /// A creator edge: operation produced a value.
    OpToValue { from: OpNodeId, to: ValueId },
}

#[derive(Clone, Debug, Default)]
pub struct GraphDump {
    pub values: Vec<ValueInfo>,
    pub ops: Vec<OpInfo>,
    pub edges: Vec<GraphEdge>,
}

/// Collects every value/operation node reachable upstream of `roots`.
pub fn export(roots: &[Value]) -> GraphDump {
    let mut dump = GraphDump::default();
    let mut seen_values: HashSet<ValueId> = HashSet::new();
    let mut seen_ops: HashSet<OpNodeId> = HashSet::new();
    let mut pending_ops: BinaryHeap<(usize, OpNodeId)> = BinaryHeap::new();

    let visit_value = |value_id: ValueId, dump: &mut GraphDump, seen_values: &mut HashSet<ValueId>| {
        if !seen_values.insert(value_id) {
            return None;
        }
        registry::with_value(value_id, |v| {
            dump.values.push(ValueInfo {
                id: value_id,
                rank: v.rank,
                requires_grad: v.requires_grad,
                is_leaf: v.creator.is_none(),
                desc: v.array.as_ref().map(|a| a.desc()),
            });
            v.creator
        })
        .flatten()
    };

    for root in roots {
        if let Some(op_id) = visit_value(root.id(), &mut dump, &mut seen_values) {
            if seen_ops.insert(op_id) {
                if let Some(rank) = registry::with_op(op_id, |o| o.rank) {
                    pending_ops.push((rank, op_id));
                }
            }
        }
    }

    while let Some((_, op_id)) = pending_ops.pop() {
        let Some((name, rank, inputs, outputs)) = registry::with_op(op_id, |o| {
            (o.op.name().to_string(), o.rank, o.inputs.clone(), o.outputs.clone())
        }) else {
            continue;
        };

        dump.ops.push(OpInfo {
            id: op_id,
            name,
            rank,
        });

        // Creator edges to whichever outputs are still live.
        for &output_id in &outputs {
            if registry::value_exists(output_id) {
                // The creator of this output is the op being visited.
                let _ = visit_value(output_id, &mut dump, &mut seen_values);
                dump.edges.push(GraphEdge::OpToValue {
                    from: op_id,
                    to: output_id,
                });
            }
        }

        for &input_id in &inputs {
            dump.edges.push(GraphEdge::ValueToOp {
                from: input_id,
                to: op_id,
            });
            if let Some(creator_id) = visit_value(input_id, &mut dump, &mut seen_values) {
                if seen_ops.insert(creator_id) {
                    if let Some(creator_rank) = registry::with_op(creator_id, |o| o.rank) {
                        pending_ops.push((creator_rank, creator_id));
                    }
                }
            }
        }
    }

    dump
}

impl GraphDump {
    /// Graphviz rendering: values as ovals, operations as boxes.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph gyeol {\n");
        for value in &self.values {
            let label = match &value.desc {
                Some(desc) => format!("v{} {:?}", value.id.0, desc),
                None => format!("v{} (pending)", value.id.0),
            };
            out.push_str(&format!(
                "  v{} [shape=oval, label=\"{label}\", style={}];\n",
                value.id.0,
                if value.requires_grad { "solid" } else { "dashed" }
            ));
        }
        for op in &self.ops {
            out.push_str(&format!(
                "  o{} [shape=box, label=\"{} (rank {})\"];\n",
                op.id.0, op.name, op.rank
            ));
        }
        for edge in &self.edges {
            match edge {
                GraphEdge::ValueToOp { from, to } => {
                    out.push_str(&format!("  v{} -> o{};\n", from.0, to.0));
                },
                GraphEdge::OpToValue { from, to } => {
                    out.push_str(&format!("  o{} -> v{};\n", from.0, to.0));
                },
            }
        }
        out.push_str("}\n");
        out
    }
}
