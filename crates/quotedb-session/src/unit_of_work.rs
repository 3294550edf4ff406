//! Unit of work: the write queue of a session.
//!
//! Operations are kept in the order they were staged. The flush reorders
//! inserts by foreign-key dependency and deletes child-first; see
//! [`crate::flush`].

use quotedb_core::{ErasedRef, same_instance};

/// A staged write.
#[derive(Clone)]
pub enum PendingOp {
    Insert(ErasedRef),
    Update(ErasedRef),
    Delete(ErasedRef),
}

impl PendingOp {
    pub fn object(&self) -> &ErasedRef {
        match self {
            PendingOp::Insert(o) | PendingOp::Update(o) | PendingOp::Delete(o) => o,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, PendingOp::Insert(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PendingOp::Insert(_) => "insert",
            PendingOp::Update(_) => "update",
            PendingOp::Delete(_) => "delete",
        }
    }
}

impl std::fmt::Debug for PendingOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let object = self.object();
        write!(
            f,
            "{}({}#{})",
            self.kind(),
            object.meta().name,
            object
                .id()
                .map_or_else(|| "new".to_string(), |id| id.to_string())
        )
    }
}

/// Pending operations in staging order, plus the instances flushed by the
/// current transaction.
#[derive(Default)]
pub struct UnitOfWork {
    ops: Vec<PendingOp>,
    uncommitted: Vec<ErasedRef>,
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("ops", &self.ops)
            .field("uncommitted", &self.uncommitted.len())
            .finish()
    }
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an INSERT. Staging the same instance twice is a no-op.
    pub fn stage_insert(&mut self, object: ErasedRef) {
        if !self.is_staged_insert(&object) {
            self.ops.push(PendingOp::Insert(object));
        }
    }

    /// Stage an UPDATE of a managed instance.
    pub fn stage_update(&mut self, object: ErasedRef) {
        let already = self.ops.iter().any(|op| {
            matches!(op, PendingOp::Update(_) | PendingOp::Insert(_))
                && same_instance(op.object(), &object)
        });
        if !already {
            self.ops.push(PendingOp::Update(object));
        }
    }

    /// Stage a DELETE.
    ///
    /// An instance still waiting for its INSERT is simply unstaged, and
    /// pending updates of the instance are dropped.
    pub fn stage_delete(&mut self, object: ErasedRef) {
        if self.unstage_insert(&object) {
            return;
        }
        self.ops
            .retain(|op| !(matches!(op, PendingOp::Update(_)) && same_instance(op.object(), &object)));
        if !self
            .ops
            .iter()
            .any(|op| matches!(op, PendingOp::Delete(_)) && same_instance(op.object(), &object))
        {
            self.ops.push(PendingOp::Delete(object));
        }
    }

    pub fn is_staged_insert(&self, object: &ErasedRef) -> bool {
        self.ops
            .iter()
            .any(|op| op.is_insert() && same_instance(op.object(), object))
    }

    fn unstage_insert(&mut self, object: &ErasedRef) -> bool {
        let before = self.ops.len();
        self.ops
            .retain(|op| !(op.is_insert() && same_instance(op.object(), object)));
        before != self.ops.len()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Take the queue, leaving it empty.
    pub fn take(&mut self) -> Vec<PendingOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Remember instances whose INSERT ran in the current transaction.
    pub fn record_inserted(&mut self, objects: Vec<ErasedRef>) {
        self.uncommitted.extend(objects);
    }

    pub fn uncommitted_len(&self) -> usize {
        self.uncommitted.len()
    }

    /// The transaction committed; the generated keys are now permanent.
    pub fn commit_inserted(&mut self) {
        self.uncommitted.clear();
    }

    /// The transaction rolled back: clear the keys it generated so the
    /// instances are transient again. Returns how many were reset.
    pub fn revert_inserted(&mut self) -> usize {
        let reverted = self.uncommitted.len();
        for object in self.uncommitted.drain(..) {
            object.clear_id();
        }
        reverted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::author;
    use quotedb_core::erase;

    #[test]
    fn staging_is_idempotent_per_instance() {
        let mut uow = UnitOfWork::new();
        let a = erase(&author(None, "Wim Hof"));
        let b = erase(&author(None, "Wim Hof"));
        uow.stage_insert(a.clone());
        uow.stage_insert(a.clone());
        uow.stage_insert(b.clone());
        assert_eq!(uow.len(), 2);
        assert!(uow.is_staged_insert(&a));

        // Updating a pending insert adds nothing.
        uow.stage_update(a.clone());
        assert_eq!(uow.len(), 2);
    }

    #[test]
    fn deleting_a_pending_insert_unstages_it() {
        let mut uow = UnitOfWork::new();
        let a = erase(&author(None, "Wim Hof"));
        uow.stage_insert(a.clone());
        uow.stage_delete(a.clone());
        assert!(uow.is_empty());
    }

    #[test]
    fn delete_replaces_update() {
        let mut uow = UnitOfWork::new();
        let a = erase(&author(Some(1), "Ron Paul"));
        uow.stage_update(a.clone());
        uow.stage_update(a.clone());
        assert_eq!(uow.len(), 1);
        uow.stage_delete(a.clone());
        uow.stage_delete(a.clone());
        let ops = uow.take();
        assert_eq!(ops.len(), 1);
        assert_eq!(format!("{:?}", ops[0]), "delete(Author#1)");
        assert!(uow.is_empty());
    }

    #[test]
    fn reverting_clears_generated_keys() {
        let mut uow = UnitOfWork::new();
        let flushed = author(None, "Wim Hof");
        let erased = erase(&flushed);
        erased.set_id(7);
        uow.record_inserted(vec![erased]);
        assert_eq!(uow.uncommitted_len(), 1);

        assert_eq!(uow.revert_inserted(), 1);
        assert_eq!(flushed.read().unwrap().id, None);
        assert_eq!(uow.uncommitted_len(), 0);

        let kept = author(None, "Ron Paul");
        let erased = erase(&kept);
        erased.set_id(8);
        uow.record_inserted(vec![erased]);
        uow.commit_inserted();
        assert_eq!(uow.revert_inserted(), 0);
        assert_eq!(kept.read().unwrap().id, Some(8));
    }
}
