//! Selection, caret, and typing state.
//!
//! Selection is block-granular: nothing here knows about characters.
//! `Single` carries an opaque caret config that the UI layer stores and
//! restores verbatim; `Range` is a contiguous sibling span kept in
//! document order no matter which direction the gesture ran.
//!
//! Typing state is tracked orthogonally. The tracker exists to gate undo
//! coalescing: while it reports typing, attribute edits stay transient.
//! Pointer movement only ends typing once it exceeds a caller-supplied
//! threshold, so the hand resting on a trackpad during a keystroke does
//! not break up an undo step.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use kumiko_types::BlockId;

use crate::store::{BlockStore, MAX_TREE_DEPTH};

/// Opaque caret/focus configuration for a single selected block.
///
/// The core round-trips this untouched; only the UI layer interprets it
/// (e.g. which editable field has focus and at what offset).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caret {
    pub target: Option<String>,
    pub offset: Option<usize>,
}

/// Current block selection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Selection {
    /// Nothing selected.
    #[default]
    None,
    /// One block selected, with caret state.
    Single { id: BlockId, caret: Caret },
    /// A contiguous sibling span; `start` precedes `end` in document order.
    Range { start: BlockId, end: BlockId },
}

impl Selection {
    /// Single selection with a default caret.
    pub fn single(id: BlockId) -> Self {
        Selection::Single {
            id,
            caret: Caret::default(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Selection::None)
    }

    /// The block a gesture extends from: the single block, or the range
    /// start.
    pub fn anchor(&self) -> Option<BlockId> {
        match self {
            Selection::None => None,
            Selection::Single { id, .. } => Some(*id),
            Selection::Range { start, .. } => Some(*start),
        }
    }

    /// Ids this selection points at directly (not the resolved span).
    pub(crate) fn endpoints(&self) -> Vec<BlockId> {
        match self {
            Selection::None => Vec::new(),
            Selection::Single { id, .. } => vec![*id],
            Selection::Range { start, end } => vec![*start, *end],
        }
    }
}

/// Compute the selection produced by extending from `anchor` to `focus`.
///
/// The two blocks may sit anywhere in the tree; each is lifted to its
/// ancestor that is a direct child of their lowest common ancestor, and
/// those two siblings bound the span — ordered by the parent's order
/// entry, not by gesture direction. When one endpoint contains the other
/// the span collapses to that single block.
pub(crate) fn extend(anchor: BlockId, focus: BlockId, store: &BlockStore) -> Selection {
    if anchor == focus {
        return Selection::single(anchor);
    }
    let Some(path_a) = path_from_root(store, anchor) else {
        tracing::debug!(block = %anchor, "selection anchor not in store");
        return Selection::single(focus);
    };
    let Some(path_b) = path_from_root(store, focus) else {
        tracing::debug!(block = %focus, "selection focus not in store");
        return Selection::single(anchor);
    };

    // Length of the shared prefix; both paths start at the root, so it is
    // at least 1.
    let mut common = 0;
    while common < path_a.len()
        && common < path_b.len()
        && path_a[common] == path_b[common]
    {
        common += 1;
    }

    let (Some(a), Some(b)) = (path_a.get(common), path_b.get(common)) else {
        // One endpoint is an ancestor of the other; the minimal span
        // containing both is the ancestor alone.
        let ancestor = path_a[common - 1];
        if ancestor == store.root() {
            return Selection::None;
        }
        return Selection::single(ancestor);
    };

    let lca = path_a[common - 1];
    let siblings = store.children(lca);
    let pos_a = siblings.iter().position(|c| c == a);
    let pos_b = siblings.iter().position(|c| c == b);
    match (pos_a, pos_b) {
        (Some(pa), Some(pb)) if pa <= pb => Selection::Range { start: *a, end: *b },
        (Some(_), Some(_)) => Selection::Range { start: *b, end: *a },
        _ => Selection::single(anchor),
    }
}

/// Resolve a range to `(parent, start index, end index)` in the current
/// order, normalizing endpoint order. `None` when either endpoint no
/// longer resolves to a sibling of the other.
pub(crate) fn range_span(
    store: &BlockStore,
    start: BlockId,
    end: BlockId,
) -> Option<(BlockId, usize, usize)> {
    let parent = store.parent(start)?;
    if store.parent(end) != Some(parent) {
        return None;
    }
    let siblings = store.children(parent);
    let a = siblings.iter().position(|c| *c == start)?;
    let b = siblings.iter().position(|c| *c == end)?;
    Some((parent, a.min(b), a.max(b)))
}

/// Selection after some ids were removed from `before`.
///
/// If the selection did not touch a removed id it is returned unchanged.
/// Otherwise it falls back to the nearest surviving previous sibling of
/// the lost block, then the nearest surviving ancestor, then `None`. The
/// root sentinel is never selected — a document emptied by the removal
/// ends with no selection.
pub(crate) fn reconcile_after_removal(
    selection: &Selection,
    removed: &HashSet<BlockId>,
    before: &BlockStore,
) -> Selection {
    let endpoints = selection.endpoints();
    let Some(lost) = endpoints.iter().find(|id| removed.contains(*id)) else {
        return selection.clone();
    };

    // Previous surviving sibling of the lost block.
    if let Some(parent) = before.parent(*lost) {
        let siblings = before.children(parent);
        if let Some(position) = siblings.iter().position(|c| c == lost) {
            for candidate in siblings[..position].iter().rev() {
                if !removed.contains(candidate) {
                    return Selection::single(*candidate);
                }
            }
        }
    }

    // Nearest surviving ancestor, stopping short of the root.
    let mut current = before.parent(*lost);
    while let Some(id) = current {
        if id == before.root() {
            break;
        }
        if !removed.contains(&id) {
            return Selection::single(id);
        }
        current = before.parent(id);
    }

    Selection::None
}

/// Path from the root (inclusive) down to `id` (inclusive). `None` for
/// unknown ids or corrupted parent chains.
fn path_from_root(store: &BlockStore, id: BlockId) -> Option<Vec<BlockId>> {
    if !store.contains(id) {
        return None;
    }
    let mut path = vec![id];
    let mut current = id;
    while let Some(parent) = store.parent(current) {
        path.push(parent);
        current = parent;
        if path.len() > MAX_TREE_DEPTH {
            return None;
        }
    }
    if current != store.root() {
        return None;
    }
    path.reverse();
    Some(path)
}

/// Tracks whether the user is actively typing.
///
/// Driven entirely by events the caller forwards — there are no global
/// listeners here. `pointer_moved` ends typing only once cumulative
/// movement from the first observed position exceeds the threshold.
#[derive(Clone, Debug)]
pub struct TypingTracker {
    threshold: f64,
    active: bool,
    origin: Option<(f64, f64)>,
}

impl TypingTracker {
    /// `threshold` is the per-axis pointer movement (in caller units,
    /// typically pixels) below which motion is treated as jitter.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            active: false,
            origin: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.active
    }

    /// Enter typing state (keydown in an editable field).
    pub fn start(&mut self) {
        self.active = true;
        self.origin = None;
    }

    /// Leave typing state explicitly (blur, escape, selection gesture).
    pub fn stop(&mut self) {
        self.active = false;
        self.origin = None;
    }

    /// Feed a pointer position. Returns true if this movement ended the
    /// typing state.
    pub fn pointer_moved(&mut self, x: f64, y: f64) -> bool {
        if !self.active {
            return false;
        }
        match self.origin {
            None => {
                self.origin = Some((x, y));
                false
            }
            Some((ox, oy)) => {
                if (x - ox).abs() > self.threshold || (y - oy).abs() > self.threshold {
                    self.stop();
                    true
                } else {
                    false
                }
            }
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

    fn paragraph() -> BlockNode {
        BlockNode::new("core/paragraph")
    }

    fn abc_store() -> (BlockStore, Vec<BlockId>) {
        let nodes = vec![paragraph(), paragraph(), paragraph()];
        let ids = nodes.iter().map(|n| n.id).collect();
        (BlockStore::from_nodes(&nodes).unwrap(), ids)
    }

    // ── Extend ────────────────────────────────────────────────────────

    #[test]
    fn test_extend_orders_by_document_position() {
        let (store, ids) = abc_store();

        let forward = extend(ids[0], ids[2], &store);
        assert_eq!(
            forward,
            Selection::Range {
                start: ids[0],
                end: ids[2]
            }
        );

        // Same span when the gesture ran backwards.
        let backward = extend(ids[2], ids[0], &store);
        assert_eq!(backward, forward);
    }

    #[test]
    fn test_extend_to_self_is_single() {
        let (store, ids) = abc_store();
        assert_eq!(extend(ids[1], ids[1], &store), Selection::single(ids[1]));
    }

    #[test]
    fn test_extend_across_subtrees_lifts_to_common_parent() {
        // list1[item_a], list2[item_b] under root: extending from item_a
        // to item_b spans the two lists.
        let list1 = BlockNode::new("core/list").with_children(vec![paragraph()]);
        let list2 = BlockNode::new("core/list").with_children(vec![paragraph()]);
        let (l1, a) = (list1.id, list1.children[0].id);
        let (l2, b) = (list2.id, list2.children[0].id);
        let store = BlockStore::from_nodes(&[list1, list2]).unwrap();

        assert_eq!(extend(a, b, &store), Selection::Range { start: l1, end: l2 });
    }

    #[test]
    fn test_extend_within_nested_siblings() {
        let list = BlockNode::new("core/list").with_children(vec![
            paragraph(),
            paragraph(),
            paragraph(),
        ]);
        let items: Vec<BlockId> = list.children.iter().map(|c| c.id).collect();
        let store = BlockStore::from_nodes(&[list]).unwrap();

        assert_eq!(
            extend(items[2], items[0], &store),
            Selection::Range {
                start: items[0],
                end: items[2]
            }
        );
    }

    #[test]
    fn test_extend_to_own_descendant_collapses() {
        let list = BlockNode::new("core/list").with_children(vec![paragraph()]);
        let (list_id, item_id) = (list.id, list.children[0].id);
        let store = BlockStore::from_nodes(&[list]).unwrap();

        assert_eq!(extend(list_id, item_id, &store), Selection::single(list_id));
        assert_eq!(extend(item_id, list_id, &store), Selection::single(list_id));
    }

    #[test]
    fn test_extend_with_unknown_focus_keeps_anchor() {
        let (store, ids) = abc_store();
        let selection = extend(ids[0], BlockId::new(), &store);
        assert_eq!(selection, Selection::single(ids[0]));
    }

    // ── Range span ────────────────────────────────────────────────────

    #[test]
    fn test_range_span_normalizes_order() {
        let (store, ids) = abc_store();
        let span = range_span(&store, ids[2], ids[0]).unwrap();
        assert_eq!(span, (store.root(), 0, 2));
    }

    #[test]
    fn test_range_span_rejects_non_siblings() {
        let list = BlockNode::new("core/list").with_children(vec![paragraph()]);
        let (list_id, item_id) = (list.id, list.children[0].id);
        let store = BlockStore::from_nodes(&[list]).unwrap();

        assert!(range_span(&store, list_id, item_id).is_none());
    }

    // ── Removal reconciliation ────────────────────────────────────────

    #[test]
    fn test_reconcile_prefers_previous_sibling() {
        let (store, ids) = abc_store();
        let selection = Selection::single(ids[1]);
        let removed: HashSet<_> = [ids[1]].into();

        let next = reconcile_after_removal(&selection, &removed, &store);
        assert_eq!(next, Selection::single(ids[0]));
    }

    #[test]
    fn test_reconcile_skips_removed_siblings() {
        let (store, ids) = abc_store();
        let selection = Selection::single(ids[2]);
        let removed: HashSet<_> = [ids[1], ids[2]].into();

        let next = reconcile_after_removal(&selection, &removed, &store);
        assert_eq!(next, Selection::single(ids[0]));
    }

    #[test]
    fn test_reconcile_falls_back_to_parent() {
        let list = BlockNode::new("core/list").with_children(vec![paragraph()]);
        let (list_id, item_id) = (list.id, list.children[0].id);
        let store = BlockStore::from_nodes(&[list]).unwrap();

        let selection = Selection::single(item_id);
        let removed: HashSet<_> = [item_id].into();

        let next = reconcile_after_removal(&selection, &removed, &store);
        assert_eq!(next, Selection::single(list_id));
    }

    #[test]
    fn test_reconcile_never_selects_root() {
        let (store, ids) = abc_store();
        let selection = Selection::single(ids[0]);
        let removed: HashSet<_> = ids.iter().copied().collect();

        let next = reconcile_after_removal(&selection, &removed, &store);
        assert_eq!(next, Selection::None);
    }

    #[test]
    fn test_reconcile_range_end_removed_becomes_single_start() {
        let (store, ids) = abc_store();
        let selection = Selection::Range {
            start: ids[0],
            end: ids[1],
        };
        let removed: HashSet<_> = [ids[1]].into();

        let next = reconcile_after_removal(&selection, &removed, &store);
        assert_eq!(next, Selection::single(ids[0]));
    }

    #[test]
    fn test_reconcile_untouched_selection_is_unchanged() {
        let (store, ids) = abc_store();
        let selection = Selection::single(ids[0]);
        let removed: HashSet<_> = [ids[2]].into();

        let next = reconcile_after_removal(&selection, &removed, &store);
        assert_eq!(next, selection);
    }

    // ── Typing tracker ────────────────────────────────────────────────

    #[test]
    fn test_typing_starts_and_stops() {
        let mut typing = TypingTracker::new(16.0);
        assert!(!typing.is_typing());

        typing.start();
        assert!(typing.is_typing());

        typing.stop();
        assert!(!typing.is_typing());
    }

    #[test]
    fn test_jitter_does_not_end_typing() {
        let mut typing = TypingTracker::new(16.0);
        typing.start();

        assert!(!typing.pointer_moved(100.0, 100.0)); // first sample = origin
        assert!(!typing.pointer_moved(104.0, 98.0));
        assert!(!typing.pointer_moved(109.0, 103.0));
        assert!(typing.is_typing());
    }

    #[test]
    fn test_real_movement_ends_typing() {
        let mut typing = TypingTracker::new(16.0);
        typing.start();

        typing.pointer_moved(100.0, 100.0);
        assert!(typing.pointer_moved(140.0, 100.0));
        assert!(!typing.is_typing());
    }

    #[test]
    fn test_pointer_ignored_when_not_typing() {
        let mut typing = TypingTracker::new(16.0);
        assert!(!typing.pointer_moved(0.0, 0.0));
        assert!(!typing.pointer_moved(500.0, 500.0));
    }
}
