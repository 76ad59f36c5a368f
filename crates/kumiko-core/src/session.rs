//! The editing session: sole mutation surface over one document.
//!
//! `EditorSession` owns the history (and through it the committed store
//! and selection), the typing tracker, the advisory insertion point, the
//! query cache, and the change subscribers. UI layers hand it command
//! values and selection gestures; everything else — validation, history
//! classification, selection reconciliation, notification — happens here,
//! in one place, synchronously.
//!
//! Exactly one session owns a document. Mutation takes `&mut self`, and
//! the interior query caches make the type deliberately not `Sync`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kumiko_types::{Block, BlockId, BlockNode};

use crate::commands::Command;
use crate::history::{History, HistoryEntry, Persistence};
use crate::query::QueryCache;
use crate::selection::{self, Caret, Selection, TypingTracker};
use crate::store::BlockStore;
use crate::Result;

/// Default pointer-movement threshold (in caller units, typically pixels)
/// below which motion during typing is treated as jitter.
pub const DEFAULT_TYPING_JITTER: f64 = 16.0;

/// Which parts of the session changed in one committed step.
///
/// Subscribers get flags, not payloads — they re-read whatever they need
/// through the query surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Change {
    pub store: bool,
    pub selection: bool,
    pub history: bool,
}

/// Advisory drop-target state: where a pending insert would land.
///
/// Set and cleared by drag/keyboard-navigation UI; the mutation layer
/// never reads it — an actual insert always carries its own target, so a
/// stale indicator can never redirect a drop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionPoint {
    pub parent: BlockId,
    pub index: usize,
    pub visible: bool,
}

type ChangeCallback = Box<dyn FnMut(&Change)>;

/// One document, one session.
pub struct EditorSession {
    history: History,
    typing: TypingTracker,
    insertion_point: Option<InsertionPoint>,
    cache: QueryCache,
    callbacks: Vec<ChangeCallback>,
}

impl EditorSession {
    /// Session over an empty document.
    pub fn new() -> Self {
        Self::from_store(BlockStore::new())
    }

    /// Session over a document parsed into the given top-level subtrees.
    pub fn with_content(subtrees: &[BlockNode]) -> Result<Self> {
        Ok(Self::from_store(BlockStore::from_nodes(subtrees)?))
    }

    /// Override the typing jitter threshold, builder-style.
    pub fn with_typing_jitter(mut self, threshold: f64) -> Self {
        self.typing = TypingTracker::new(threshold);
        self
    }

    fn from_store(store: BlockStore) -> Self {
        Self {
            history: History::new(HistoryEntry {
                store,
                selection: Selection::None,
            }),
            typing: TypingTracker::new(DEFAULT_TYPING_JITTER),
            insertion_point: None,
            cache: QueryCache::new(),
            callbacks: Vec::new(),
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Apply one command with default history classification: structural
    /// commands are persistent; attribute edits during active typing are
    /// transient (coalesced into one undo step when typing ends).
    ///
    /// Returns whether anything changed — boundary moves and no-op merges
    /// report `false` and leave history and subscribers untouched.
    pub fn apply(&mut self, command: Command) -> Result<bool> {
        let persistence = if !command.is_structural() && self.typing.is_typing() {
            Persistence::Transient
        } else {
            Persistence::Persistent
        };
        self.apply_as(command, persistence)
    }

    /// Apply one command with an explicit history classification.
    pub fn apply_as(&mut self, command: Command, persistence: Persistence) -> Result<bool> {
        let before = self.history.present().store.clone();
        let after = command.apply(&before)?;
        if after.ptr_eq(&before) {
            return Ok(false);
        }

        let current = self.history.present().selection.clone();
        let next_selection = selection_after(&command, &before, &current);
        self.commit(after, next_selection, &current, persistence);
        Ok(true)
    }

    /// Apply related commands as one atomic step and one undo frame.
    ///
    /// Commands see each other's effects in order; if any fails, nothing
    /// is committed. This is the entry point for composite edits — a
    /// block merge issued as remove+insert undoes as a single step.
    pub fn apply_batch(&mut self, commands: &[Command]) -> Result<bool> {
        let before = self.history.present().store.clone();
        let current = self.history.present().selection.clone();

        let mut store = before.clone();
        let mut next_selection = current.clone();
        for command in commands {
            let next = command.apply(&store)?;
            if next.ptr_eq(&store) {
                continue;
            }
            next_selection = selection_after(command, &store, &next_selection);
            store = next;
        }
        if store.ptr_eq(&before) {
            return Ok(false);
        }

        self.commit(store, next_selection, &current, Persistence::Persistent);
        Ok(true)
    }

    /// Step back one undo frame. False when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        if !self.history.undo() {
            return false;
        }
        self.prune_insertion_point();
        self.notify(Change {
            store: true,
            selection: true,
            history: true,
        });
        true
    }

    /// Step forward one redo frame. False when there is no future.
    pub fn redo(&mut self) -> bool {
        if !self.history.redo() {
            return false;
        }
        self.prune_insertion_point();
        self.notify(Change {
            store: true,
            selection: true,
            history: true,
        });
        true
    }

    /// Load a fresh document, discarding all history. A reload is not
    /// undoable to the prior document.
    pub fn reset(&mut self, subtrees: &[BlockNode]) -> Result<()> {
        let store = BlockStore::from_nodes(subtrees)?;
        self.history.reset(HistoryEntry {
            store,
            selection: Selection::None,
        });
        self.insertion_point = None;
        self.typing.stop();
        self.notify(Change {
            store: true,
            selection: true,
            history: true,
        });
        Ok(())
    }

    fn commit(
        &mut self,
        store: BlockStore,
        next_selection: Selection,
        current: &Selection,
        persistence: Persistence,
    ) {
        debug_assert!(
            store.check_invariants().is_ok(),
            "commit would install an inconsistent store"
        );
        let selection_changed = next_selection != *current;
        self.history.dispatch(
            HistoryEntry {
                store,
                selection: next_selection,
            },
            persistence,
        );
        self.prune_insertion_point();
        self.notify(Change {
            store: true,
            selection: selection_changed,
            history: true,
        });
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Select a single block. Selecting the current block with the same
    /// caret is a no-op; unknown ids and the root are ignored (logged).
    pub fn select(&mut self, id: BlockId, caret: Caret) -> bool {
        {
            let store = &self.history.present().store;
            if !store.contains(id) || id == store.root() {
                tracing::debug!(block = %id, "selection target not selectable, ignoring");
                return false;
            }
        }
        self.commit_selection(Selection::Single { id, caret })
    }

    /// Extend the current selection to `to`, producing the minimal
    /// contiguous sibling span covering both ends (document order,
    /// regardless of gesture direction). With no current selection this
    /// is a plain select.
    pub fn extend_selection(&mut self, to: BlockId) -> bool {
        let next = {
            let store = &self.history.present().store;
            if !store.contains(to) || to == store.root() {
                tracing::debug!(block = %to, "selection focus not selectable, ignoring");
                return false;
            }
            match self.history.present().selection.anchor() {
                Some(anchor) if store.contains(anchor) => selection::extend(anchor, to, store),
                _ => Selection::single(to),
            }
        };
        self.commit_selection(next)
    }

    /// Collapse any selection to none.
    pub fn deselect(&mut self) -> bool {
        self.commit_selection(Selection::None)
    }

    fn commit_selection(&mut self, next: Selection) -> bool {
        if self.history.present().selection == next {
            return false;
        }
        self.history.update_selection(next);
        self.notify(Change {
            store: false,
            selection: true,
            history: false,
        });
        true
    }

    // =========================================================================
    // Typing
    // =========================================================================

    /// Enter typing state: subsequent attribute edits coalesce.
    pub fn start_typing(&mut self) {
        self.typing.start();
    }

    /// Leave typing state and promote the coalesced burst to one undo step.
    pub fn stop_typing(&mut self) {
        self.typing.stop();
        self.promote_burst();
    }

    /// Forward a pointer position. Movement beyond the jitter threshold
    /// ends typing (and promotes the burst) exactly like `stop_typing`.
    pub fn pointer_moved(&mut self, x: f64, y: f64) {
        if self.typing.pointer_moved(x, y) {
            self.promote_burst();
        }
    }

    pub fn is_typing(&self) -> bool {
        self.typing.is_typing()
    }

    fn promote_burst(&mut self) {
        if self.history.mark_persistent() {
            self.notify(Change {
                store: false,
                selection: false,
                history: true,
            });
        }
    }

    // =========================================================================
    // Insertion point
    // =========================================================================

    /// Set the advisory insertion point. Unknown parents are ignored
    /// (logged): the indicator may race a removal.
    pub fn set_insertion_point(&mut self, parent: BlockId, index: usize, visible: bool) -> bool {
        if !self.history.present().store.contains(parent) {
            tracing::debug!(block = %parent, "insertion point parent not in store, ignoring");
            return false;
        }
        let next = Some(InsertionPoint {
            parent,
            index,
            visible,
        });
        if self.insertion_point == next {
            return false;
        }
        self.insertion_point = next;
        true
    }

    /// Clear the insertion point (drop completed or cancelled).
    pub fn clear_insertion_point(&mut self) -> bool {
        self.insertion_point.take().is_some()
    }

    pub fn insertion_point(&self) -> Option<&InsertionPoint> {
        self.insertion_point.as_ref()
    }

    fn prune_insertion_point(&mut self) {
        if let Some(point) = self.insertion_point {
            if !self.history.present().store.contains(point.parent) {
                self.insertion_point = None;
            }
        }
    }

    // =========================================================================
    // Notification
    // =========================================================================

    /// Subscribe to committed changes. Callbacks run synchronously, in
    /// registration order, after every commit/undo/redo/selection change.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&Change) + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    fn notify(&mut self, change: Change) {
        for callback in &mut self.callbacks {
            callback(&change);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The committed store snapshot.
    pub fn store(&self) -> &BlockStore {
        &self.history.present().store
    }

    /// The committed selection.
    pub fn selection(&self) -> &Selection {
        &self.history.present().selection
    }

    /// The root sentinel id — the parent for top-level inserts.
    pub fn root(&self) -> BlockId {
        self.store().root()
    }

    pub fn block(&self, id: BlockId) -> Option<&Arc<Block>> {
        self.store().get(id)
    }

    pub fn children(&self, id: BlockId) -> &[BlockId] {
        self.store().children(id)
    }

    /// Flat pre-order traversal of all content blocks. Memoized.
    pub fn traverse(&self) -> Arc<[BlockId]> {
        self.cache.traverse(self.store())
    }

    /// Ancestor path from immediate parent upward, root excluded. Memoized.
    pub fn ancestors(&self, id: BlockId) -> Arc<[BlockId]> {
        self.cache.ancestors(self.store(), id)
    }

    /// Ids the current selection resolves to, in document order. Memoized.
    pub fn selected_ids(&self) -> Arc<[BlockId]> {
        let present = self.history.present();
        self.cache.selected_ids(&present.store, &present.selection)
    }

    pub fn is_selected(&self, id: BlockId) -> bool {
        let present = self.history.present();
        self.cache.is_selected(&present.store, &present.selection, id)
    }

    pub fn is_first_sibling(&self, id: BlockId) -> bool {
        self.cache.is_first_sibling(self.store(), id)
    }

    pub fn is_last_sibling(&self, id: BlockId) -> bool {
        self.cache.is_last_sibling(self.store(), id)
    }

    pub fn previous_sibling(&self, id: BlockId) -> Option<BlockId> {
        self.cache.previous_sibling(self.store(), id)
    }

    pub fn next_sibling(&self, id: BlockId) -> Option<BlockId> {
        self.cache.next_sibling(self.store(), id)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Selection after a command lands, per the rules the UI expects:
/// inserts select their first block, removals fall back to the previous
/// sibling / ancestor chain, replacements re-target only when the old
/// selection pointed into the replaced run.
fn selection_after(command: &Command, before: &BlockStore, current: &Selection) -> Selection {
    match command {
        Command::Insert { subtrees, .. } => match subtrees.first() {
            Some(node) => Selection::single(node.id),
            None => current.clone(),
        },
        Command::Remove { ids } => {
            let removed = before.subtree_ids(ids);
            selection::reconcile_after_removal(current, &removed, before)
        }
        Command::Replace { ids, subtrees } => {
            let removed = before.subtree_ids(ids);
            let touched = current.endpoints().iter().any(|id| removed.contains(id));
            if !touched {
                current.clone()
            } else if let Some(first) = subtrees.first() {
                Selection::single(first.id)
            } else {
                selection::reconcile_after_removal(current, &removed, before)
            }
        }
        Command::Move { .. }
        | Command::UpdateAttributes { .. }
        | Command::ReorderChildren { .. } => current.clone(),
    }
}

// =========================================================================
// Tests
// =========================================================================
