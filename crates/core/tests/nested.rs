//! End-to-end tracing through the public API: nested traces, structured
//! outputs, and unwinding.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use adtrace_core::{
    downcast, leaf, open_levels, register, seq, trace_rooted, Layout, Node, NodeRef, NodeTree,
    Params, Primitive, Result, RootNode, Value,
};

thread_local! {
    static NODES_CREATED: Cell<usize> = const { Cell::new(0) };
}

fn count_one() {
    NODES_CREATED.with(|count| count.set(count.get() + 1));
}

struct Tape {
    op: &'static str,
    parents: Vec<NodeRef>,
    parent_argnums: Vec<usize>,
}

impl Node for Tape {
    fn process_primitive(
        &self,
        ans: &Value,
        primitive: &Primitive,
        _argvals: &[Value],
        _params: &Params,
        parent_argnums: &[usize],
        parents: &[NodeRef],
    ) -> Result<NodeTree> {
        primitive.out_layout().node_tree(ans, &mut |_| {
            count_one();
            let node: NodeRef = Rc::new(Tape {
                op: primitive.name(),
                parents: parents.to_vec(),
                parent_argnums: parent_argnums.to_vec(),
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
        count_one();
        Rc::new(Tape {
            op: "input",
            parents: Vec::new(),
            parent_argnums: Vec::new(),
        })
    }
}

fn scalar_op(name: &'static str, op: fn(f64, f64) -> f64) -> Primitive {
    Primitive::new(name, move |args, _| {
        let a = downcast::<f64>(&args[0]).copied().expect("f64 argument");
        let b = downcast::<f64>(&args[1]).copied().expect("f64 argument");
        Ok(leaf(op(a, b)))
    })
}

// ============================================================================
// Nested traces: each level records its own graph
// ============================================================================

#[test]
fn test_nested_traces_record_one_node_per_level() {
    register::<f64>();
    NODES_CREATED.with(|count| count.set(0));
    let mul = scalar_op("mul", |a, b| a * b);

    // Outer trace over x; inside it, an inner trace over y computes
    // x * y with x belonging to the enclosing trace.
    let (outer_out, outer_roots) = trace_rooted::<Tape, _>(
        |outer_args| {
            let x = outer_args[0].clone();
            let (inner_out, inner_roots) = trace_rooted::<Tape, _>(
                |inner_args| mul.call(&[x.clone(), inner_args[0].clone()], &Params::new()),
                &[leaf(4.0_f64)],
                &[Layout::Leaf],
                &Layout::Leaf,
            )?;

            // The inner graph knows only y: x passed through as an
            // opaque constant.
            let inner_node = inner_out.nodes.single().expect("inner output is traced");
            let tape = inner_node.as_any().downcast_ref::<Tape>().unwrap();
            assert_eq!(tape.op, "mul");
            assert_eq!(tape.parent_argnums, vec![1]);
            assert_eq!(tape.parents.len(), 1);
            assert!(Rc::ptr_eq(&tape.parents[0], &inner_roots[0]));

            // Unwrapping the inner level exposes the outer trace's box.
            Ok(inner_out.values)
        },
        &[leaf(3.0_f64)],
        &[Layout::Leaf],
        &Layout::Leaf,
    )
    .unwrap();

    // The outer graph saw the same multiplication through its own box.
    let outer_node = outer_out.nodes.single().expect("outer output is traced");
    let tape = outer_node.as_any().downcast_ref::<Tape>().unwrap();
    assert_eq!(tape.op, "mul");
    assert_eq!(tape.parent_argnums, vec![0]);
    assert!(Rc::ptr_eq(&tape.parents[0], &outer_roots[0]));

    assert_eq!(downcast::<f64>(&outer_out.values), Some(&12.0));
    assert_eq!(open_levels(), 0);

    // Two roots and one mul node per level, nothing else.
    assert_eq!(NODES_CREATED.with(Cell::get), 4);
}

// ============================================================================
// Structured outputs
// ============================================================================

#[test]
fn test_sequence_output_yields_one_node_per_leaf() {
    register::<f64>();
    let add = scalar_op("add", |a, b| a + b);
    let out_layout = Layout::Seq(Box::new(Layout::Leaf));

    let (output, roots) = trace_rooted::<Tape, _>(
        |args| {
            let double = add.call(&[args[0].clone(), args[0].clone()], &Params::new())?;
            let triple = add.call(&[double.clone(), args[0].clone()], &Params::new())?;
            Ok(seq(vec![double, triple]))
        },
        &[leaf(3.0_f64)],
        &[Layout::Leaf],
        &out_layout,
    )
    .unwrap();

    let elements = downcast::<Vec<Value>>(&output.values).unwrap();
    assert_eq!(downcast::<f64>(&elements[0]), Some(&6.0));
    assert_eq!(downcast::<f64>(&elements[1]), Some(&9.0));
    assert_eq!(output.mapper.mask(), &[true, true]);

    let leaves = output.nodes.leaves();
    let double_node = leaves[0].as_ref().expect("first leaf is traced");
    let triple_node = leaves[1].as_ref().expect("second leaf is traced");

    // triple = double + x: one parent is the double node, the other the
    // input root.
    let tape = triple_node.as_any().downcast_ref::<Tape>().unwrap();
    assert_eq!(tape.parent_argnums, vec![0, 1]);
    assert!(Rc::ptr_eq(&tape.parents[0], double_node));
    assert!(Rc::ptr_eq(&tape.parents[1], &roots[0]));
}

// ============================================================================
// Unwinding
// ============================================================================

#[test]
fn test_panic_inside_nested_traces_releases_all_levels() {
    register::<f64>();
    let before = open_levels();

    let result = std::panic::catch_unwind(|| {
        let _ = trace_rooted::<Tape, _>(
            |_| {
                let _ = trace_rooted::<Tape, _>(
                    |_| -> Result<Value> { panic!("inner trace blew up") },
                    &[leaf(1.0_f64)],
                    &[Layout::Leaf],
                    &Layout::Leaf,
                );
                unreachable!("the inner panic unwinds through here");
            },
            &[leaf(1.0_f64)],
            &[Layout::Leaf],
            &Layout::Leaf,
        );
    });

    assert!(result.is_err());
    assert_eq!(open_levels(), before);
}

// ============================================================================
// Graph lifetime
// ============================================================================

#[test]
fn test_graph_outlives_its_trace() {
    register::<f64>();
    let add = scalar_op("add", |a, b| a + b);

    let (output, roots) = trace_rooted::<Tape, _>(
        |args| add.call(&[args[0].clone(), args[1].clone()], &Params::new()),
        &[leaf(1.0_f64), leaf(2.0_f64)],
        &[Layout::Leaf, Layout::Leaf],
        &Layout::Leaf,
    )
    .unwrap();

    // The trace has exited; the node and its parent chain are still
    // walkable from the output.
    assert_eq!(open_levels(), 0);
    let node = output.nodes.single().unwrap();
    let tape = node.as_any().downcast_ref::<Tape>().unwrap();
    assert_eq!(tape.parents.len(), 2);
    assert!(Rc::ptr_eq(&tape.parents[0], &roots[0]));
    assert!(Rc::ptr_eq(&tape.parents[1], &roots[1]));
}
