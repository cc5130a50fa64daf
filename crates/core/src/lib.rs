//! # adtrace-core
//!
//! The operator-overloading tracer at the bottom of an automatic
//! differentiation engine. It does not compute a single derivative;
//! it observes a function's execution and records which traceable
//! operations touched which values, producing a computation graph a
//! gradient engine can walk.
//!
//! The moving parts:
//!
//! - **Trace levels** ([`stack`]): a thread-local nesting discipline so
//!   traces can be opened inside traces (higher-order derivatives)
//!   without confusing one trace's values with another's.
//! - **Boxes** ([`boxed`]): tagged wrappers pairing a value with its
//!   trace level and producing graph node, over a registry of wrappable
//!   raw types.
//! - **Nodes** ([`node`]): the extension point a differentiation mode
//!   implements to decide what gets recorded per traced call.
//! - **Primitives** ([`primitive`]): functions wrapped in the dispatch
//!   protocol that routes each call to the innermost active trace.
//! - **Trace entry/exit** ([`trace`]): run a function with wrapped
//!   inputs, hand back unwrapped outputs plus their graph.
//!
//! A minimal tape over scalar addition:
//!
//! ```
//! use std::any::Any;
//! use std::rc::Rc;
//! use adtrace_core::{
//!     downcast, leaf, register, trace_rooted, Layout, Node, NodeRef, NodeTree,
//!     Params, Primitive, Result, RootNode, Value,
//! };
//!
//! struct Tape {
//!     parents: Vec<NodeRef>,
//! }
//!
//! impl Node for Tape {
//!     fn process_primitive(
//!         &self,
//!         ans: &Value,
//!         primitive: &Primitive,
//!         _argvals: &[Value],
//!         _params: &Params,
//!         _parent_argnums: &[usize],
//!         parents: &[NodeRef],
//!     ) -> Result<NodeTree> {
//!         primitive.out_layout().node_tree(ans, &mut |_| {
//!             let node: NodeRef = Rc::new(Tape { parents: parents.to_vec() });
//!             Ok(Some(node))
//!         })
//!     }
//!
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//!
//! impl RootNode for Tape {
//!     fn new_root() -> Rc<Self> {
//!         Rc::new(Tape { parents: Vec::new() })
//!     }
//! }
//!
//! register::<f64>();
//! let add = Primitive::new("add", |args, _| {
//!     let a = downcast::<f64>(&args[0]).copied().unwrap();
//!     let b = downcast::<f64>(&args[1]).copied().unwrap();
//!     Ok(leaf(a + b))
//! });
//!
//! // double(x) = x + x, traced at x = 3.
//! let (output, roots) = trace_rooted::<Tape, _>(
//!     |args| add.call(&[args[0].clone(), args[0].clone()], &Params::new()),
//!     &[leaf(3.0_f64)],
//!     &[Layout::Leaf],
//!     &Layout::Leaf,
//! )?;
//!
//! assert_eq!(downcast::<f64>(&output.values), Some(&6.0));
//! let node = output.nodes.single().unwrap();
//! let tape = node.as_any().downcast_ref::<Tape>().unwrap();
//! assert_eq!(tape.parents.len(), 2);
//! assert!(Rc::ptr_eq(&tape.parents[0], &roots[0]));
//! # Ok::<(), adtrace_core::TraceError>(())
//! ```

pub mod boxed;
pub mod error;
pub mod layout;
pub mod node;
pub mod primitive;
pub mod stack;
pub mod trace;

#[cfg(test)]
mod test_util;

pub use boxed::{
    box_parts, deep_value, downcast, is_box, leaf, new_box, register, seq, BoxParts, Boxed, Value,
};
pub use error::{Result, TraceError};
pub use layout::{Layout, MaskedLayout};
pub use node::{Node, NodeRef, NodeTree, RootNode};
pub use primitive::{NotracePrimitive, Params, Primitive};
pub use stack::{new_trace, open_levels, TraceGuard, TraceLevel};
pub use trace::{trace, trace_rooted, TraceOutput};
