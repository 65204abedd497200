//! The producer contract format authors implement.
//!
//! A producer is the Rust stand-in for spec's lazy, restartable
//! `create_fields` sequence (see spec §9 "Coroutine-shaped producers"): an
//! explicit step-function object instead of a generator. `FieldTree`
//! drives it one step at a time, calling `next` again only when another
//! child is actually requested (random access, iteration, or an explicit
//! `read_more_fields`).
//!
//! A producer's state must be fully reconstructible from the owning field
//! set alone (no captured external state) so that `FieldTree::reset`,
//! which rebuilds the producer from scratch, is well defined — in
//! practice this means `Producer` impls are small `Clone`-free state
//! machines built by a factory closure stored alongside the field set.

use crate::endian::Endian;
use crate::error::Result;
use crate::field::LeafKind;
use crate::tree::{FieldSetId, FieldTree};

/// One field a producer wants appended next.
pub struct FieldSpec {
    pub name: String,
    pub description: Option<String>,
    /// Overrides the field set's inherited endianness for this one field.
    pub endian_override: Option<Endian>,
    pub payload: FieldPayload,
}

impl FieldSpec {
    pub fn leaf(name: impl Into<String>, kind: LeafKind) -> Self {
        FieldSpec { name: name.into(), description: None, endian_override: None, payload: FieldPayload::Leaf(kind) }
    }

    pub fn set(name: impl Into<String>, producer: Box<dyn Producer>, size_bits: Option<u64>) -> Self {
        FieldSpec { name: name.into(), description: None, endian_override: None, payload: FieldPayload::Set { producer, size_bits } }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian_override = Some(endian);
        self
    }
}

pub enum FieldPayload {
    Leaf(LeafKind),
    /// A nested field set. `size_bits`, when given, lets the child stay
    /// fully lazy (its size is known without feeding it); when `None` the
    /// driver must fully feed the child immediately to learn its size,
    /// same as spec's default (non-size-hinted) nested-set behaviour.
    Set { producer: Box<dyn Producer>, size_bits: Option<u64> },
}

/// Format authors implement this to describe one field set's children, in
/// order. `next` is called once per child; it sees the field set's
/// already-materialized children (including ones from earlier in this
/// same call sequence) through `tree`, so it's safe to read a sibling's
/// decoded value to decide what comes next (e.g. a length field deciding a
/// following payload's size).
pub trait Producer: Send {
    fn next(&mut self, tree: &FieldTree, set: FieldSetId) -> Result<Option<FieldSpec>>;

    /// Rewind to the first field. The default no-op is correct for any
    /// producer whose state is exactly `(the field set it was built for)`,
    /// since `FieldTree::reset` rebuilds child state around it from
    /// scratch; override only if the producer carries its own step state.
    fn reset(&mut self) {}
}

/// A producer built from a step index and a closure, for the common case
/// of a small, linear sequence of fields. `make` is called with the
/// 0-based step number and must be a pure function of `(tree, set, step)`;
/// returning `Ok(None)` ends the sequence.
pub struct StepProducer<F> {
    step: u32,
    make: F,
}

impl<F> StepProducer<F>
where
    F: FnMut(&FieldTree, FieldSetId, u32) -> Result<Option<FieldSpec>> + Send,
{
    pub fn new(make: F) -> Self {
        StepProducer { step: 0, make }
    }
}

impl<F> Producer for StepProducer<F>
where
    F: FnMut(&FieldTree, FieldSetId, u32) -> Result<Option<FieldSpec>> + Send,
{
    fn next(&mut self, tree: &FieldTree, set: FieldSetId) -> Result<Option<FieldSpec>> {
        let step = self.step;
        let result = (self.make)(tree, set, step)?;
        if result.is_some() {
            self.step += 1;
        }
        Ok(result)
    }

    fn reset(&mut self) {
        self.step = 0;
    }
}
