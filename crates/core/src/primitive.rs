//! # Primitives and the Dispatch Protocol
//!
//! A primitive is a raw function made traceable: every call runs the
//! dispatch protocol, which decides whether to record the call and at
//! which nesting level.
//!
//! The protocol, per call:
//!
//! 1. Scan the argument leaves for boxes. None found: call the raw
//!    function directly — zero tracing overhead on the
//!    non-differentiated path.
//! 2. Pick the numerically highest trace level among the boxed leaves;
//!    that level's trace is the innermost one active for this call, and
//!    one of its boxes supplies the recording node.
//! 3. Peel only the leaves boxed at exactly that level, collecting
//!    their nodes as the call's parents. Boxes from enclosing (lower)
//!    levels are opaque constants here and pass through still wrapped.
//! 4. Re-dispatch on the peeled arguments. Recursion peels one level
//!    per step, so depth is bounded by the number of live trace levels,
//!    and each enclosing level records its own node as the answer
//!    propagates back out.
//! 5. Ask the recording node to turn the call into graph vertices.
//! 6. Re-wrap the answer at the selected level, pairing each output
//!    leaf with its node; leaves with no node stay raw.
//!
//! Keeping outer-level boxes wrapped through an inner trace (step 3) is
//! what prevents perturbation confusion in nested differentiation.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::boxed::{box_parts, deep_value, new_box, Value};
use crate::error::Result;
use crate::layout::Layout;
use crate::node::NodeRef;
use crate::stack::TraceLevel;

/// Named auxiliary parameters for a primitive call.
///
/// Never scanned for boxes and never traced; handed to the raw function
/// and to `process_primitive` untouched.
#[derive(Clone, Default)]
pub struct Params(BTreeMap<&'static str, Value>);

impl Params {
    /// An empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &'static str, value: Value) -> Self {
        self.0.insert(key, value);
        self
    }

    /// Look up a parameter by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no parameters were supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The raw, untraced implementation of a primitive.
pub(crate) type RawFn = Rc<dyn Fn(&[Value], &Params) -> Result<Value>>;

/// A function wrapped so its invocations can be recorded.
#[derive(Clone)]
pub struct Primitive {
    name: &'static str,
    raw: RawFn,
    in_layouts: Vec<Layout>,
    out_layout: Layout,
}

impl Primitive {
    /// Wrap a raw function. Every argument and the result are treated
    /// as single leaves; use [`with_layouts`](Self::with_layouts) for
    /// structured arguments or results.
    pub fn new(
        name: &'static str,
        raw: impl Fn(&[Value], &Params) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            name,
            raw: Rc::new(raw),
            in_layouts: Vec::new(),
            out_layout: Layout::Leaf,
        }
    }

    /// Attach structure descriptors for the arguments and the result.
    /// Arguments beyond `in_layouts` are treated as single leaves.
    pub fn with_layouts(mut self, in_layouts: Vec<Layout>, out_layout: Layout) -> Self {
        self.in_layouts = in_layouts;
        self.out_layout = out_layout;
        self
    }

    /// The primitive's name, for diagnostics and node bookkeeping.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The result's structure descriptor.
    pub fn out_layout(&self) -> &Layout {
        &self.out_layout
    }

    fn arg_layout(&self, index: usize) -> &Layout {
        self.in_layouts.get(index).unwrap_or(&Layout::Leaf)
    }

    /// Invoke the primitive through the dispatch protocol.
    pub fn call(&self, args: &[Value], params: &Params) -> Result<Value> {
        // Step 1-2: find the innermost active level among boxed leaves,
        // keeping that box's node as the recorder for this call.
        let mut active: Option<(TraceLevel, NodeRef)> = None;
        for (index, arg) in args.iter().enumerate() {
            self.arg_layout(index).visit(arg, &mut |leaf| {
                if let Some(parts) = box_parts(leaf) {
                    let deeper = match &active {
                        Some((level, _)) => parts.level > *level,
                        None => true,
                    };
                    if deeper {
                        active = Some((parts.level, parts.node.clone()));
                    }
                }
                Ok(())
            })?;
        }
        let Some((level, recorder)) = active else {
            return (self.raw)(args, params);
        };

        // Step 3: peel exactly the active level. Leaf positions are
        // flattened across arguments in visit order.
        let mut argvals = Vec::with_capacity(args.len());
        let mut parents: Vec<NodeRef> = Vec::new();
        let mut parent_argnums: Vec<usize> = Vec::new();
        let mut leaf_index = 0;
        for (index, arg) in args.iter().enumerate() {
            let peeled = self.arg_layout(index).map(arg, &mut |leaf| {
                let position = leaf_index;
                leaf_index += 1;
                if let Some(parts) = box_parts(leaf) {
                    if parts.level == level {
                        parent_argnums.push(position);
                        parents.push(parts.node.clone());
                        return Ok(parts.value.clone());
                    }
                }
                Ok(leaf.clone())
            })?;
            argvals.push(peeled);
        }

        // Step 4: re-dispatch; enclosing levels record their own nodes.
        let ans = self.call(&argvals, params)?;

        // Step 5: one graph vertex for this call.
        let output_nodes =
            recorder.process_primitive(&ans, self, &argvals, params, &parent_argnums, &parents)?;

        // Step 6: re-wrap at the active level, leaf by leaf.
        self.out_layout
            .map_with_nodes(&ans, &output_nodes, &mut |leaf, node| {
                new_box(level, leaf, node)
            })
    }
}

/// A primitive variant for operations that are never differentiable
/// (shape queries, comparisons, casts).
///
/// Every argument leaf is deep-unwrapped regardless of level before the
/// raw function runs; no node is ever created and the result is
/// returned raw.
#[derive(Clone)]
pub struct NotracePrimitive {
    name: &'static str,
    raw: RawFn,
    in_layouts: Vec<Layout>,
}

impl NotracePrimitive {
    /// Wrap a raw function; every argument is a single leaf by default.
    pub fn new(
        name: &'static str,
        raw: impl Fn(&[Value], &Params) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            name,
            raw: Rc::new(raw),
            in_layouts: Vec::new(),
        }
    }

    /// Attach structure descriptors for the arguments.
    pub fn with_in_layouts(mut self, in_layouts: Vec<Layout>) -> Self {
        self.in_layouts = in_layouts;
        self
    }

    /// The primitive's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn arg_layout(&self, index: usize) -> &Layout {
        self.in_layouts.get(index).unwrap_or(&Layout::Leaf)
    }

    /// Invoke with every argument leaf stripped of all wrapping.
    pub fn call(&self, args: &[Value], params: &Params) -> Result<Value> {
        let mut argvals = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            argvals.push(
                self.arg_layout(index)
                    .map(arg, &mut |leaf| Ok(deep_value(leaf)))?,
            );
        }
        (self.raw)(&argvals, params)
    }
}
