//! # Structure Mapping
//!
//! Primitives take and return arbitrarily nested containers of leaves.
//! Rather than hard-coding tuple or mapping handling, every primitive
//! carries [`Layout`] shape descriptors for its arguments and result,
//! and the dispatch protocol walks values by their layout: find the
//! wrapped leaves, rebuild an isomorphic structure, pair output leaves
//! with their nodes.
//!
//! Every walk validates arity as it goes. A layout that disagrees with
//! the value (or node structure) it is applied to fails loudly with
//! [`TraceError::StructureMismatch`] instead of silently mis-aligning
//! parent bookkeeping.

use std::rc::Rc;

use crate::boxed::Value;
use crate::error::{Result, TraceError};
use crate::node::{NodeRef, NodeTree};

/// Shape descriptor for a primitive argument or result.
#[derive(Clone, Debug)]
pub enum Layout {
    /// The whole value is a single leaf.
    Leaf,
    /// A fixed-arity sequence (`Rc<Vec<Value>>`), element `i` shaped by
    /// the `i`-th sub-layout.
    Tuple(Vec<Layout>),
    /// A homogeneous sequence of any length, every element shaped by
    /// the sub-layout.
    Seq(Box<Layout>),
}

impl Layout {
    pub(crate) fn elements<'a>(value: &'a Value, context: &'static str) -> Result<&'a Vec<Value>> {
        value
            .downcast_ref::<Vec<Value>>()
            .ok_or(TraceError::NotASequence { context })
    }

    pub(crate) fn tuple_elements<'a>(
        items: &[Layout],
        value: &'a Value,
        context: &'static str,
    ) -> Result<&'a Vec<Value>> {
        let elements = Self::elements(value, context)?;
        if elements.len() != items.len() {
            return Err(TraceError::StructureMismatch {
                context,
                expected: items.len(),
                found: elements.len(),
            });
        }
        Ok(elements)
    }

    /// Visit every leaf of `value` in order.
    pub fn visit(&self, value: &Value, f: &mut dyn FnMut(&Value) -> Result<()>) -> Result<()> {
        match self {
            Layout::Leaf => f(value),
            Layout::Tuple(items) => {
                let elements = Self::tuple_elements(items, value, "visiting a tuple layout")?;
                for (item, element) in items.iter().zip(elements) {
                    item.visit(element, &mut *f)?;
                }
                Ok(())
            }
            Layout::Seq(item) => {
                let elements = Self::elements(value, "visiting a sequence layout")?;
                for element in elements {
                    item.visit(element, &mut *f)?;
                }
                Ok(())
            }
        }
    }

    /// Apply `f` to every leaf, rebuilding an isomorphic structure.
    pub fn map(&self, value: &Value, f: &mut dyn FnMut(&Value) -> Result<Value>) -> Result<Value> {
        match self {
            Layout::Leaf => f(value),
            Layout::Tuple(items) => {
                let elements = Self::tuple_elements(items, value, "mapping a tuple layout")?;
                let mut mapped = Vec::with_capacity(elements.len());
                for (item, element) in items.iter().zip(elements) {
                    mapped.push(item.map(element, &mut *f)?);
                }
                Ok(Rc::new(mapped))
            }
            Layout::Seq(item) => {
                let elements = Self::elements(value, "mapping a sequence layout")?;
                let mut mapped = Vec::with_capacity(elements.len());
                for element in elements {
                    mapped.push(item.map(element, &mut *f)?);
                }
                Ok(Rc::new(mapped))
            }
        }
    }

    /// Zip a value with an isomorphic node structure, leaf by leaf.
    pub fn map_with_nodes(
        &self,
        value: &Value,
        nodes: &NodeTree,
        f: &mut dyn FnMut(&Value, Option<&NodeRef>) -> Result<Value>,
    ) -> Result<Value> {
        let context = "pairing output leaves with their nodes";
        match (self, nodes) {
            (Layout::Leaf, NodeTree::Leaf(node)) => f(value, node.as_ref()),
            (Layout::Tuple(items), NodeTree::Seq(node_items)) => {
                let elements = Self::tuple_elements(items, value, context)?;
                if node_items.len() != items.len() {
                    return Err(TraceError::NodeShapeMismatch { context });
                }
                let mut mapped = Vec::with_capacity(elements.len());
                for ((item, element), node_item) in items.iter().zip(elements).zip(node_items) {
                    mapped.push(item.map_with_nodes(element, node_item, &mut *f)?);
                }
                Ok(Rc::new(mapped))
            }
            (Layout::Seq(item), NodeTree::Seq(node_items)) => {
                let elements = Self::elements(value, context)?;
                if node_items.len() != elements.len() {
                    return Err(TraceError::NodeShapeMismatch { context });
                }
                let mut mapped = Vec::with_capacity(elements.len());
                for (element, node_item) in elements.iter().zip(node_items) {
                    mapped.push(item.map_with_nodes(element, node_item, &mut *f)?);
                }
                Ok(Rc::new(mapped))
            }
            _ => Err(TraceError::NodeShapeMismatch { context }),
        }
    }

    /// Build a node structure isomorphic to `value`, one node decision
    /// per leaf. The usual way for a [`Node`](crate::node::Node)
    /// implementation to shape its `process_primitive` result.
    pub fn node_tree(
        &self,
        value: &Value,
        f: &mut dyn FnMut(&Value) -> Result<Option<NodeRef>>,
    ) -> Result<NodeTree> {
        match self {
            Layout::Leaf => Ok(NodeTree::Leaf(f(value)?)),
            Layout::Tuple(items) => {
                let elements = Self::tuple_elements(items, value, "building a node structure")?;
                let mut nodes = Vec::with_capacity(elements.len());
                for (item, element) in items.iter().zip(elements) {
                    nodes.push(item.node_tree(element, &mut *f)?);
                }
                Ok(NodeTree::Seq(nodes))
            }
            Layout::Seq(item) => {
                let elements = Self::elements(value, "building a node structure")?;
                let mut nodes = Vec::with_capacity(elements.len());
                for element in elements {
                    nodes.push(item.node_tree(element, &mut *f)?);
                }
                Ok(NodeTree::Seq(nodes))
            }
        }
    }

    /// Number of leaves in `value` under this layout.
    pub fn leaf_count(&self, value: &Value) -> Result<usize> {
        let mut count = 0;
        self.visit(value, &mut |_| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }
}

/// A layout restricted to a subset of its leaves.
///
/// Produced by trace exit: the mask selects exactly the output leaves
/// that were valid wrapped outputs, so a gradient engine knows where to
/// inject and extract seeds in an isomorphic structure.
#[derive(Clone)]
pub struct MaskedLayout {
    layout: Layout,
    mask: Vec<bool>,
}

impl MaskedLayout {
    /// Restrict `layout` to the leaves selected by `mask` (in visit
    /// order).
    pub fn new(layout: Layout, mask: Vec<bool>) -> Self {
        Self { layout, mask }
    }

    /// The underlying unrestricted layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Leaf selection in visit order.
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Number of selected leaves.
    pub fn selected(&self) -> usize {
        self.mask.iter().filter(|keep| **keep).count()
    }

    /// Apply `f` to the selected leaves only; every other leaf passes
    /// through unchanged.
    pub fn map(&self, value: &Value, f: &mut dyn FnMut(&Value) -> Result<Value>) -> Result<Value> {
        let mut index = 0;
        let mapped = self.layout.map(value, &mut |leaf| {
            let keep = self.mask.get(index).copied().unwrap_or(false);
            index += 1;
            if keep {
                f(leaf)
            } else {
                Ok(leaf.clone())
            }
        })?;
        if index != self.mask.len() {
            return Err(TraceError::StructureMismatch {
                context: "applying a restricted mapper",
                expected: self.mask.len(),
                found: index,
            });
        }
        Ok(mapped)
    }
}
