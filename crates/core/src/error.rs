//! # Error Types
//!
//! Failures in the tracer core are few and final: either a value's type
//! has no registered wrapper (it cannot participate in differentiation),
//! or a structure descriptor disagrees with the value or node structure
//! it is walking. There are no retries — every traced operation is
//! assumed pure and deterministic.
//!
//! Errors raised by raw primitive functions or by the user function
//! under trace are carried through unchanged in the `External` variant;
//! this core adds no translation layer.

use std::any::TypeId;

use thiserror::Error;

/// Result alias used throughout the tracer core.
pub type Result<T> = std::result::Result<T, TraceError>;

/// Errors produced by the tracer core.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Wrapping was requested for a value whose concrete type has no
    /// registered wrapper. Fatal; surfaced immediately to the caller.
    #[error("can't differentiate with respect to a value of unregistered type {type_id:?}")]
    UnsupportedType {
        /// Runtime type of the offending value.
        type_id: TypeId,
    },

    /// A layout and the value (or node structure) it was applied to
    /// disagree on arity. Failing loudly here is deliberate: a silent
    /// misalignment would corrupt the graph's parent bookkeeping.
    #[error("structure mismatch while {context}: expected {expected} elements, found {found}")]
    StructureMismatch {
        /// What the walk was doing when the mismatch was found.
        context: &'static str,
        /// Element count the layout called for.
        expected: usize,
        /// Element count actually present.
        found: usize,
    },

    /// A node structure returned by `process_primitive` is not
    /// isomorphic to the primitive's output layout.
    #[error("node structure is not isomorphic to the output layout while {context}")]
    NodeShapeMismatch {
        /// What the walk was doing when the mismatch was found.
        context: &'static str,
    },

    /// A layout expected a sequence value (`Rc<Vec<Value>>`) and found
    /// something else.
    #[error("expected a sequence value while {context}")]
    NotASequence {
        /// What the walk was doing when the mismatch was found.
        context: &'static str,
    },

    /// An error raised by a raw primitive function or by the traced
    /// user function, propagated unchanged.
    #[error(transparent)]
    External(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TraceError {
    /// Wrap an arbitrary failure from a raw function or user function.
    pub fn external(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        TraceError::External(err.into())
    }
}
