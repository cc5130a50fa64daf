//! # Graph Nodes
//!
//! One node per traced primitive invocation (or per traced input, as a
//! root). Nodes form an append-only DAG: each node holds shared
//! references to its parents, a box holds a shared reference to the
//! node that produced it, and nothing is ever mutated after creation.
//! A node therefore lives exactly as long as a box, a descendant node,
//! or the caller still references it — including after its trace has
//! exited.
//!
//! Differentiation modes plug in here: a reverse-mode engine's node
//! records a vjp closure, a forward-mode engine's node carries a
//! tangent. This crate defines only the extension point.

use std::any::Any;
use std::rc::Rc;

use crate::boxed::Value;
use crate::error::Result;
use crate::primitive::{Params, Primitive};

/// Shared handle to a graph node.
pub type NodeRef = Rc<dyn Node>;

/// The extension point implemented once per differentiation mode.
pub trait Node: 'static {
    /// Record one traced primitive call as a graph vertex.
    ///
    /// Called on the node type bound to the active wrapping level with
    /// the concrete answer, the primitive, its arguments unwrapped to
    /// the level below, the call's auxiliary parameters, the flattened
    /// leaf positions that were differentiable parents, and those
    /// parents' nodes. Must return a node structure isomorphic to the
    /// primitive's output layout, with `None` for output leaves that do
    /// not depend differentiably on any parent.
    fn process_primitive(
        &self,
        ans: &Value,
        primitive: &Primitive,
        argvals: &[Value],
        params: &Params,
        parent_argnums: &[usize],
        parents: &[NodeRef],
    ) -> Result<NodeTree>;

    /// Downcast hook for gradient engines that know their node type.
    fn as_any(&self) -> &dyn Any;
}

/// Node types that can mint parentless input nodes.
///
/// Used by [`trace_rooted`](crate::trace::trace_rooted) to seed one
/// root per traced input leaf.
pub trait RootNode: Node + Sized {
    /// Construct an input node with no parents.
    fn new_root() -> Rc<Self>;
}

/// A structure of nodes isomorphic to some value structure.
///
/// `Leaf(None)` is the "no node" sentinel: that output leaf carries no
/// differentiable dependency and stays unwrapped.
#[derive(Clone)]
pub enum NodeTree {
    /// A single output position.
    Leaf(Option<NodeRef>),
    /// One entry per element of a sequence-shaped output.
    Seq(Vec<NodeTree>),
}

impl NodeTree {
    /// The node of a single-leaf tree, if any.
    pub fn single(&self) -> Option<&NodeRef> {
        match self {
            NodeTree::Leaf(node) => node.as_ref(),
            NodeTree::Seq(_) => None,
        }
    }

    /// All leaves in visit order.
    pub fn leaves(&self) -> Vec<Option<NodeRef>> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<Option<NodeRef>>) {
        match self {
            NodeTree::Leaf(node) => out.push(node.clone()),
            NodeTree::Seq(items) => {
                for item in items {
                    item.collect_leaves(out);
                }
            }
        }
    }
}
