//! Shared test fixtures: a bookkeeping node type that records exactly
//! what the dispatch protocol handed it, plus a thread-local census of
//! node creation for overhead assertions.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use crate::boxed::{downcast, leaf, Value};
use crate::error::Result;
use crate::node::{Node, NodeRef, NodeTree, RootNode};
use crate::primitive::{Params, Primitive};

thread_local! {
    static NODES_CREATED: Cell<usize> = const { Cell::new(0) };
}

pub(crate) fn nodes_created() -> usize {
    NODES_CREATED.with(Cell::get)
}

pub(crate) fn reset_node_count() {
    NODES_CREATED.with(|count| count.set(0));
}

fn count_one() {
    NODES_CREATED.with(|count| count.set(count.get() + 1));
}

/// A node that remembers its wiring and nothing else.
pub(crate) struct Recorded {
    pub(crate) primitive: &'static str,
    pub(crate) parent_argnums: Vec<usize>,
    pub(crate) parents: Vec<NodeRef>,
    /// The "factor" parameter as seen by `process_primitive`, if any.
    pub(crate) factor: Option<f64>,
}

impl Node for Recorded {
    fn process_primitive(
        &self,
        ans: &Value,
        primitive: &Primitive,
        _argvals: &[Value],
        params: &Params,
        parent_argnums: &[usize],
        parents: &[NodeRef],
    ) -> Result<NodeTree> {
        primitive.out_layout().node_tree(ans, &mut |_| {
            count_one();
            let node: NodeRef = Rc::new(Recorded {
                primitive: primitive.name(),
                parent_argnums: parent_argnums.to_vec(),
                parents: parents.to_vec(),
                factor: params.get("factor").and_then(downcast::<f64>).copied(),
            });
            Ok(Some(node))
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RootNode for Recorded {
    fn new_root() -> Rc<Self> {
        count_one();
        Rc::new(Recorded {
            primitive: "input",
            parent_argnums: Vec::new(),
            parents: Vec::new(),
            factor: None,
        })
    }
}

pub(crate) fn root() -> NodeRef {
    Recorded::new_root()
}

/// Scalar two-argument addition, the workhorse primitive of the tests.
pub(crate) fn add2() -> Primitive {
    Primitive::new("add", |args, _| {
        let a = downcast::<f64>(&args[0]).copied().expect("f64 argument");
        let b = downcast::<f64>(&args[1]).copied().expect("f64 argument");
        Ok(leaf(a + b))
    })
}
