//! Atomic change-sets applied to the [`super::Store`].
//!
//! `apply(change_set)` applies an ordered list of operations as one unit,
//! failing the whole batch with `StoreError` if any operation conflicts.
//! `ExplicitUpdate` is the CAS-style integer delta used for
//! concurrency-safe balance edits (account CP being the canonical case).

use super::records::Record;
use uuid::Uuid;

/// One operation within a [`ChangeSet`].
#[derive(Debug, Clone)]
pub enum ChangeOp {
    /// Insert a brand new record. Fails if the UUID is already present.
    Insert(Record),
    /// Replace the record at `uuid` wholesale.
    Update(Uuid, Record),
    /// Remove the record at `uuid` from the arena (and backing store).
    Delete(Uuid),
    /// Add `delta` to an integer field, failing if the field's current
    /// value does not equal `expected` at apply time.
    ExplicitUpdate {
        uuid: Uuid,
        field: &'static str,
        delta: i64,
        expected: i64,
    },
}

/// An ordered, atomically-applied batch of [`ChangeOp`]s.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    ops: Vec<ChangeOp>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, record: Record) -> Self {
        self.ops.push(ChangeOp::Insert(record));
        self
    }

    pub fn update(mut self, uuid: Uuid, record: Record) -> Self {
        self.ops.push(ChangeOp::Update(uuid, record));
        self
    }

    pub fn delete(mut self, uuid: Uuid) -> Self {
        self.ops.push(ChangeOp::Delete(uuid));
        self
    }

    pub fn explicit_update(mut self, uuid: Uuid, field: &'static str, delta: i64, expected: i64) -> Self {
        self.ops.push(ChangeOp::ExplicitUpdate {
            uuid,
            field,
            delta,
            expected,
        });
        self
    }

    pub fn ops(&self) -> &[ChangeOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
