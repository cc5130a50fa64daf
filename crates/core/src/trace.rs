//! # Trace Entry and Exit
//!
//! [`trace`] runs a function under a fresh trace level: it wraps every
//! input leaf with a caller-supplied start node, calls the function,
//! then unwraps the result exactly one level. Output leaves still boxed
//! at this trace's level are valid traced outputs and yield their
//! nodes; anything else (a raw constant, or a box belonging to an
//! enclosing trace) passes through untouched and is marked as not
//! depending on the inputs.
//!
//! The level is held by a [`TraceGuard`](crate::stack::TraceGuard), so
//! it is released on every exit path, including an error or panic in
//! the traced function.

use std::rc::Rc;

use crate::boxed::{box_parts, new_box, Value};
use crate::error::{Result, TraceError};
use crate::layout::{Layout, MaskedLayout};
use crate::node::{NodeRef, NodeTree, RootNode};
use crate::stack::{new_trace, TraceLevel};

/// What a completed trace hands back to a gradient engine.
pub struct TraceOutput {
    /// The function's result, unwrapped one level.
    pub values: Value,
    /// Per output leaf, the node that produced it (`Leaf(None)` where
    /// the leaf does not depend on the traced inputs).
    pub nodes: NodeTree,
    /// The output layout restricted to the leaves that were traced;
    /// where a gradient engine injects and extracts seeds.
    pub mapper: MaskedLayout,
}

impl std::fmt::Debug for TraceOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceOutput").finish_non_exhaustive()
    }
}

fn layout_for(layouts: &[Layout], index: usize) -> &Layout {
    layouts.get(index).unwrap_or(&Layout::Leaf)
}

/// Run `fun` under a fresh trace level, with `start_nodes` seeding the
/// input leaves in visit order across `inputs`.
pub fn trace(
    start_nodes: &[NodeRef],
    fun: impl FnOnce(&[Value]) -> Result<Value>,
    inputs: &[Value],
    in_layouts: &[Layout],
    out_layout: &Layout,
) -> Result<TraceOutput> {
    let guard = new_trace();

    let mut next = 0;
    let mut wrapped = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        let boxed = layout_for(in_layouts, index).map(input, &mut |leaf| {
            let node = start_nodes
                .get(next)
                .ok_or(TraceError::StructureMismatch {
                    context: "wrapping trace inputs",
                    expected: start_nodes.len(),
                    found: next + 1,
                })?;
            next += 1;
            new_box(guard.level(), leaf, Some(node))
        })?;
        wrapped.push(boxed);
    }
    if next != start_nodes.len() {
        return Err(TraceError::StructureMismatch {
            context: "wrapping trace inputs",
            expected: start_nodes.len(),
            found: next,
        });
    }

    let out = fun(&wrapped)?;

    let mut mask = Vec::new();
    let (values, nodes) = unpack(out_layout, &out, guard.level(), &mut mask)?;
    Ok(TraceOutput {
        values,
        nodes,
        mapper: MaskedLayout::new(out_layout.clone(), mask),
    })
}

/// [`trace`] with one freshly minted root node per input leaf.
///
/// Returns the trace output together with the roots, in input visit
/// order, so the caller can match gradients back to inputs.
pub fn trace_rooted<N, F>(
    fun: F,
    inputs: &[Value],
    in_layouts: &[Layout],
    out_layout: &Layout,
) -> Result<(TraceOutput, Vec<NodeRef>)>
where
    N: RootNode,
    F: FnOnce(&[Value]) -> Result<Value>,
{
    let mut roots: Vec<NodeRef> = Vec::new();
    for (index, input) in inputs.iter().enumerate() {
        for _ in 0..layout_for(in_layouts, index).leaf_count(input)? {
            let root: NodeRef = N::new_root();
            roots.push(root);
        }
    }
    let output = trace(&roots, fun, inputs, in_layouts, out_layout)?;
    Ok((output, roots))
}

/// Unwrap one level of boxing, leaf by leaf, recording which leaves
/// were traced outputs.
fn unpack(
    layout: &Layout,
    value: &Value,
    level: TraceLevel,
    mask: &mut Vec<bool>,
) -> Result<(Value, NodeTree)> {
    let context = "unwrapping trace outputs";
    match layout {
        Layout::Leaf => {
            if let Some(parts) = box_parts(value) {
                if parts.level == level {
                    mask.push(true);
                    return Ok((parts.value.clone(), NodeTree::Leaf(Some(parts.node.clone()))));
                }
            }
            mask.push(false);
            Ok((value.clone(), NodeTree::Leaf(None)))
        }
        Layout::Tuple(items) => {
            let elements = Layout::tuple_elements(items, value, context)?;
            let mut values = Vec::with_capacity(elements.len());
            let mut nodes = Vec::with_capacity(elements.len());
            for (item, element) in items.iter().zip(elements) {
                let (element_value, element_nodes) = unpack(item, element, level, mask)?;
                values.push(element_value);
                nodes.push(element_nodes);
            }
            let values: Value = Rc::new(values);
            Ok((values, NodeTree::Seq(nodes)))
        }
        Layout::Seq(item) => {
            let elements = Layout::elements(value, context)?;
            let mut values = Vec::with_capacity(elements.len());
            let mut nodes = Vec::with_capacity(elements.len());
            for element in elements {
                let (element_value, element_nodes) = unpack(item, element, level, mask)?;
                values.push(element_value);
                nodes.push(element_nodes);
            }
            let values: Value = Rc::new(values);
            Ok((values, NodeTree::Seq(nodes)))
        }
    }
}
