//! # Wrapped Values and the Type Registry
//!
//! A traced value ("box") tags a raw value with the trace level it
//! belongs to and the graph node that explains how it was produced.
//! The tracer is value-type agnostic: raw values travel as
//! [`Value`] (`Rc<dyn Any>`), and a registry maps each registered raw
//! type to its wrapper type.
//!
//! One distinct wrapper type exists per raw type — [`Boxed<T>`] is
//! monomorphized per registration — so "is this a box?" stays a
//! constant-time membership test on concrete runtime types, without
//! open-ended dynamic dispatch. Registering `T` also makes `Boxed<T>`
//! itself wrappable, which is how a nested trace level wraps a value
//! that an outer level already wrapped.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::{OnceLock, RwLock};

use crate::error::{Result, TraceError};
use crate::node::NodeRef;
use crate::stack::TraceLevel;

/// A type-erased traced or raw value.
///
/// Sequence-shaped values are `Rc<Vec<Value>>`, walked by a
/// [`Layout`](crate::layout::Layout).
pub type Value = Rc<dyn Any>;

/// Erase a concrete value into a [`Value`] leaf.
pub fn leaf<T: 'static>(value: T) -> Value {
    Rc::new(value)
}

/// Build a sequence [`Value`] from its elements.
pub fn seq(elements: Vec<Value>) -> Value {
    Rc::new(elements)
}

/// Borrow the concrete value behind a [`Value`], if it has that type.
pub fn downcast<T: 'static>(value: &Value) -> Option<&T> {
    value.downcast_ref::<T>()
}

/// The common payload every wrapper type carries.
pub struct BoxParts {
    /// The wrapped value. May itself be a box from an enclosing trace.
    pub value: Value,
    /// The trace level this box belongs to.
    pub level: TraceLevel,
    /// The graph node that produced this value.
    pub node: NodeRef,
}

/// The wrapper type for raw values of type `T`.
///
/// Instances are only ever constructed through [`new_box`] after
/// [`register`] has installed the mapping for `T`.
pub struct Boxed<T: 'static> {
    parts: BoxParts,
    _raw: PhantomData<T>,
}

type BoxFn = fn(&Value, TraceLevel, NodeRef) -> Value;
type PeelFn = fn(&dyn Any) -> &BoxParts;

#[derive(Default)]
struct Registry {
    /// Raw type (or wrapper type, for re-wrapping) -> constructor.
    boxers: HashMap<TypeId, BoxFn>,
    /// Wrapper type -> payload accessor. The key set is the set of all
    /// ever-registered wrapper types.
    peelers: HashMap<TypeId, PeelFn>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(Default::default)
}

fn make_box<T: 'static>(value: &Value, level: TraceLevel, node: NodeRef) -> Value {
    Rc::new(Boxed::<T> {
        parts: BoxParts {
            value: value.clone(),
            level,
            node,
        },
        _raw: PhantomData,
    })
}

fn peel<T: 'static>(any: &dyn Any) -> &BoxParts {
    let boxed = any
        .downcast_ref::<Boxed<T>>()
        .expect("registry peeler keyed to a different wrapper type");
    &boxed.parts
}

/// Install the wrapper mapping for raw type `T`.
///
/// Idempotent: re-registering a type overwrites the entry with an
/// identical one.
pub fn register<T: 'static>() {
    let mut reg = registry().write().expect("box registry poisoned");
    reg.boxers.insert(TypeId::of::<T>(), make_box::<T>);
    // A box can be boxed again by a deeper trace; the wrapper type
    // stays the same, with the inner box as its value.
    reg.boxers.insert(TypeId::of::<Boxed<T>>(), make_box::<T>);
    reg.peelers.insert(TypeId::of::<Boxed<T>>(), peel::<T>);
}

fn boxer_for(value: &Value) -> Option<BoxFn> {
    let reg = registry().read().expect("box registry poisoned");
    reg.boxers.get(&(**value).type_id()).copied()
}

fn peeler_for(value: &Value) -> Option<PeelFn> {
    let reg = registry().read().expect("box registry poisoned");
    reg.peelers.get(&(**value).type_id()).copied()
}

/// Is this value a box (of any registered wrapper type, any level)?
pub fn is_box(value: &Value) -> bool {
    peeler_for(value).is_some()
}

/// Borrow the level/node/value payload of a box; `None` for raw values.
pub fn box_parts(value: &Value) -> Option<&BoxParts> {
    peeler_for(value).map(|peel| peel(&**value))
}

/// Wrap `value` at `level`, recording `node` as its producer.
///
/// A `None` node is the explicit "no node" sentinel: the output does
/// not depend differentiably on any wrapped input, and the raw value is
/// returned unchanged. Wrapping a value of an unregistered type is a
/// fatal [`TraceError::UnsupportedType`].
pub fn new_box(level: TraceLevel, value: &Value, node: Option<&NodeRef>) -> Result<Value> {
    let Some(node) = node else {
        return Ok(value.clone());
    };
    match boxer_for(value) {
        Some(make) => Ok(make(value, level, node.clone())),
        None => Err(TraceError::UnsupportedType {
            type_id: (**value).type_id(),
        }),
    }
}

/// Strip every level of wrapping and return the innermost raw value.
///
/// Identity (and idempotent) on values that are not boxes.
pub fn deep_value(value: &Value) -> Value {
    let mut current = value.clone();
    loop {
        let inner = match box_parts(&current) {
            Some(parts) => parts.value.clone(),
            None => return current,
        };
        current = inner;
    }
}
