//! Tracing a function into a computation graph.
//!
//! Run with: cargo run -p adtrace-core --example trace_double
//!
//! This example demonstrates:
//! - Registering a raw type and wrapping functions as primitives
//! - Running a function under a trace and inspecting the graph
//! - The zero-overhead path when no trace is open
//!
//! Key insight: the tracer never computes a derivative. It records
//! which primitives touched which values; a gradient engine walks the
//! resulting graph.

use std::any::Any;
use std::rc::Rc;

use adtrace_core::{
    downcast, leaf, register, trace_rooted, Layout, Node, NodeRef, NodeTree, Params, Primitive,
    Result, RootNode, Value,
};

/// A bare-bones tape node: remembers the operation and its parents.
struct Tape {
    op: &'static str,
    parents: Vec<NodeRef>,
}

impl Node for Tape {
    fn process_primitive(
        &self,
        ans: &Value,
        primitive: &Primitive,
        _argvals: &[Value],
        _params: &Params,
        _parent_argnums: &[usize],
        parents: &[NodeRef],
    ) -> Result<NodeTree> {
        primitive.out_layout().node_tree(ans, &mut |_| {
            let node: NodeRef = Rc::new(Tape {
                op: primitive.name(),
                parents: parents.to_vec(),
            });
            Ok(Some(node))
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RootNode for Tape {
    fn new_root() -> Rc<Self> {
        Rc::new(Tape {
            op: "input",
            parents: Vec::new(),
        })
    }
}

fn walk(node: &NodeRef, depth: usize) {
    let tape = node.as_any().downcast_ref::<Tape>().expect("tape node");
    println!("{:indent$}{}", "", tape.op, indent = depth * 2);
    for parent in &tape.parents {
        walk(parent, depth + 1);
    }
}

fn main() -> Result<()> {
    println!("=== Tracing double(x) = x + x ===\n");

    register::<f64>();
    let add = Primitive::new("add", |args, _| {
        let a = downcast::<f64>(&args[0]).copied().expect("f64 argument");
        let b = downcast::<f64>(&args[1]).copied().expect("f64 argument");
        Ok(leaf(a + b))
    });

    // -------------------------------------------------------------------------
    // 1. Untraced call: the raw function runs directly
    // -------------------------------------------------------------------------
    println!("1. Untraced call");
    println!("----------------");
    let out = add.call(&[leaf(3.0_f64), leaf(3.0_f64)], &Params::new())?;
    println!("add(3, 3) = {:?}\n", downcast::<f64>(&out).unwrap());

    // -------------------------------------------------------------------------
    // 2. Traced call: same function, graph recorded on the side
    // -------------------------------------------------------------------------
    println!("2. Traced call");
    println!("--------------");
    let (output, _roots) = trace_rooted::<Tape, _>(
        |args| add.call(&[args[0].clone(), args[0].clone()], &Params::new()),
        &[leaf(3.0_f64)],
        &[Layout::Leaf],
        &Layout::Leaf,
    )?;
    println!("double(3) = {:?}", downcast::<f64>(&output.values).unwrap());
    println!("traced output leaves: {}\n", output.mapper.selected());

    // -------------------------------------------------------------------------
    // 3. Walking the recorded graph
    // -------------------------------------------------------------------------
    println!("3. Recorded graph (operation, then parents)");
    println!("-------------------------------------------");
    let node = output.nodes.single().expect("output was traced");
    walk(node, 0);
    println!("\nBoth parents are the same input node: x was used twice.");

    Ok(())
}
