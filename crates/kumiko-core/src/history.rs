//! Linear undo history over (store, selection) snapshots.
//!
//! Snapshots are cheap to retain (the store is copy-on-write), so history
//! keeps whole frames rather than inverse operations. Frames come in two
//! flavors: a persistent dispatch commits an undo checkpoint; a transient
//! dispatch replaces the present without one. The first transient after a
//! committed state stashes the displaced present as a pending baseline,
//! and promoting that baseline later turns an entire burst of transient
//! edits — every keystroke of a typed word — into a single undo step
//! landing on the pre-burst state.

use std::collections::VecDeque;

use crate::selection::Selection;
use crate::store::BlockStore;

/// Default maximum number of undo steps retained; the oldest fall off.
pub const DEFAULT_HISTORY_CAP: usize = 100;

/// How a dispatched change interacts with undo history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persistence {
    /// Replace the present without an undo checkpoint.
    Transient,
    /// Commit an undo checkpoint.
    Persistent,
}

/// One committed frame: the store and the selection that went with it.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub store: BlockStore,
    pub selection: Selection,
}

/// Past / present / future frame stacks.
///
/// Linear only: committing anything new discards the future stack.
#[derive(Debug)]
pub struct History {
    past: VecDeque<HistoryEntry>,
    present: HistoryEntry,
    future: Vec<HistoryEntry>,
    /// Present as it was before the current transient burst began; the
    /// frame a later promotion will commit.
    pending: Option<HistoryEntry>,
    cap: usize,
}

impl History {
    pub fn new(present: HistoryEntry) -> Self {
        Self::with_cap(present, DEFAULT_HISTORY_CAP)
    }

    pub fn with_cap(present: HistoryEntry, cap: usize) -> Self {
        Self {
            past: VecDeque::new(),
            present,
            future: Vec::new(),
            pending: None,
            cap: cap.max(1),
        }
    }

    pub fn present(&self) -> &HistoryEntry {
        &self.present
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty() || self.pending.is_some()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Committed undo depth. A pending (unpromoted) burst counts as one.
    pub fn undo_depth(&self) -> usize {
        self.past.len() + usize::from(self.pending.is_some())
    }

    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    /// Install a new present.
    ///
    /// Transient: the present is replaced in place; the first transient
    /// after a committed state captures the displaced present for later
    /// promotion. Persistent: the present becomes an undo step and the
    /// future is discarded.
    pub fn dispatch(&mut self, entry: HistoryEntry, persistence: Persistence) {
        match persistence {
            Persistence::Transient => {
                let displaced = std::mem::replace(&mut self.present, entry);
                if self.pending.is_none() {
                    self.pending = Some(displaced);
                }
            }
            Persistence::Persistent => {
                let displaced = std::mem::replace(&mut self.present, entry);
                // A pending baseline supersedes the displaced present: the
                // whole burst plus this change collapses into one step.
                let checkpoint = self.pending.take().unwrap_or(displaced);
                self.push_past(checkpoint);
                self.future.clear();
            }
        }
    }

    /// Update the present frame's selection in place. Pure selection
    /// changes are not undo steps of their own; they ride with whatever
    /// frame gets committed next.
    pub fn update_selection(&mut self, selection: Selection) {
        self.present.selection = selection;
    }

    /// Commit the pending transient burst as one undo step. Returns
    /// whether anything was promoted.
    pub fn mark_persistent(&mut self) -> bool {
        let Some(baseline) = self.pending.take() else {
            return false;
        };
        self.push_past(baseline);
        self.future.clear();
        true
    }

    /// Step back one frame. Returns false (and changes nothing) when
    /// there is nothing to undo. An open transient burst is promoted
    /// first, so undo-while-typing lands on the pre-burst state.
    pub fn undo(&mut self) -> bool {
        self.mark_persistent();
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        let present = std::mem::replace(&mut self.present, previous);
        self.future.push(present);
        true
    }

    /// Step forward one frame. Returns false when there is no future.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop() else {
            return false;
        };
        let present = std::mem::replace(&mut self.present, next);
        self.push_past(present);
        true
    }

    /// Replace the present and drop both stacks — a full reload is not
    /// undoable to the prior document.
    pub fn reset(&mut self, present: HistoryEntry) {
        self.past.clear();
        self.future.clear();
        self.pending = None;
        self.present = present;
    }

    fn push_past(&mut self, entry: HistoryEntry) {
        self.past.push_back(entry);
        if self.past.len() > self.cap {
            self.past.pop_front();
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use kumiko_types::BlockNode;

    fn frame(store: &BlockStore) -> HistoryEntry {
        HistoryEntry {
            store: store.clone(),
            selection: Selection::None,
        }
    }

    fn grown(store: &BlockStore) -> BlockStore {
        store
            .insert(store.root(), 0, &[BlockNode::new("core/paragraph")])
            .unwrap()
    }

    #[test]
    fn test_persistent_dispatch_checkpoints() {
        let s0 = BlockStore::new();
        let mut history = History::new(frame(&s0));
        assert!(!history.can_undo());

        let s1 = grown(&s0);
        history.dispatch(frame(&s1), Persistence::Persistent);

        assert!(history.can_undo());
        assert_eq!(history.undo_depth(), 1);
        assert!(history.present().store.ptr_eq(&s1));
    }

    #[test]
    fn test_undo_restores_prior_frame_exactly() {
        let s0 = BlockStore::new();
        let mut history = History::new(frame(&s0));
        let s1 = grown(&s0);
        history.dispatch(frame(&s1), Persistence::Persistent);

        assert!(history.undo());
        assert!(history.present().store.ptr_eq(&s0));
        assert!(history.can_redo());
    }

    #[test]
    fn test_redo_of_undo_is_identity() {
        let s0 = BlockStore::new();
        let mut history = History::new(frame(&s0));
        let s1 = grown(&s0);
        history.dispatch(frame(&s1), Persistence::Persistent);

        history.undo();
        assert!(history.redo());
        assert!(history.present().store.ptr_eq(&s1));
        assert!(!history.can_redo());
        assert_eq!(history.undo_depth(), 1);
    }

    #[test]
    fn test_undo_redo_empty_stacks_are_noops() {
        let s0 = BlockStore::new();
        let mut history = History::new(frame(&s0));

        assert!(!history.undo());
        assert!(!history.redo());
        assert!(history.present().store.ptr_eq(&s0));
    }

    #[test]
    fn test_transient_burst_promotes_to_one_step() {
        let s0 = BlockStore::new();
        let mut history = History::new(frame(&s0));

        // Five keystrokes' worth of transient frames.
        let mut current = s0.clone();
        for _ in 0..5 {
            current = grown(&current);
            history.dispatch(frame(&current), Persistence::Transient);
        }
        assert_eq!(history.past.len(), 0);

        assert!(history.mark_persistent());
        assert_eq!(history.undo_depth(), 1);

        // Undo lands on the pre-burst state, not an intermediate one.
        assert!(history.undo());
        assert!(history.present().store.ptr_eq(&s0));
    }

    #[test]
    fn test_mark_persistent_without_burst_is_noop() {
        let s0 = BlockStore::new();
        let mut history = History::new(frame(&s0));
        assert!(!history.mark_persistent());
        assert_eq!(history.undo_depth(), 0);
    }

    #[test]
    fn test_undo_during_burst_promotes_first() {
        let s0 = BlockStore::new();
        let mut history = History::new(frame(&s0));

        let s1 = grown(&s0);
        history.dispatch(frame(&s1), Persistence::Transient);

        assert!(history.undo());
        assert!(history.present().store.ptr_eq(&s0));
    }

    #[test]
    fn test_persistent_dispatch_collapses_open_burst() {
        let s0 = BlockStore::new();
        let mut history = History::new(frame(&s0));

        let s1 = grown(&s0);
        history.dispatch(frame(&s1), Persistence::Transient);
        let s2 = grown(&s1);
        history.dispatch(frame(&s2), Persistence::Persistent);

        // One step only; it rewinds past the transient frame to s0.
        assert_eq!(history.undo_depth(), 1);
        history.undo();
        assert!(history.present().store.ptr_eq(&s0));
    }

    #[test]
    fn test_new_dispatch_invalidates_future() {
        let s0 = BlockStore::new();
        let mut history = History::new(frame(&s0));
        let s1 = grown(&s0);
        history.dispatch(frame(&s1), Persistence::Persistent);
        history.undo();
        assert!(history.can_redo());

        let s2 = grown(&s0);
        history.dispatch(frame(&s2), Persistence::Persistent);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_cap_drops_oldest() {
        let s0 = BlockStore::new();
        let mut history = History::with_cap(frame(&s0), 3);

        let mut current = s0;
        for _ in 0..10 {
            current = grown(&current);
            history.dispatch(frame(&current), Persistence::Persistent);
        }

        assert_eq!(history.undo_depth(), 3);
        assert!(history.undo());
        assert!(history.undo());
        assert!(history.undo());
        assert!(!history.undo());
        // Ten frames were committed but only the last three survive.
        assert_eq!(history.present().store.len(), 7);
    }

    #[test]
    fn test_reset_clears_both_stacks() {
        let s0 = BlockStore::new();
        let mut history = History::new(frame(&s0));
        let s1 = grown(&s0);
        history.dispatch(frame(&s1), Persistence::Persistent);
        history.undo();

        let fresh = BlockStore::new();
        history.reset(frame(&fresh));

        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert!(history.present().store.ptr_eq(&fresh));
    }

    #[test]
    fn test_selection_travels_with_frames() {
        let s0 = BlockStore::new();
        let mut history = History::new(frame(&s0));

        let node = BlockNode::new("core/paragraph");
        let id = node.id;
        let s1 = s0.insert(s0.root(), 0, &[node]).unwrap();
        history.dispatch(
            HistoryEntry {
                store: s1,
                selection: Selection::single(id),
            },
            Persistence::Persistent,
        );

        history.undo();
        assert_eq!(history.present().selection, Selection::None);
        history.redo();
        assert_eq!(history.present().selection, Selection::single(id));
    }
}
