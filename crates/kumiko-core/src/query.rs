//! Memoized read model over store and selection.
//!
//! Projections here are pure: they never touch the store, only derive
//! views from it. The expensive ones (flat traversal, ancestor paths,
//! resolved selection span) are cached keyed by the identity of the
//! snapshot's underlying maps, so repeated reads against an unchanged
//! store cost one pointer comparison, and committing a new snapshot
//! invalidates everything automatically — no explicit invalidation calls.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kumiko_types::BlockId;

use crate::selection::{self, Selection};
use crate::store::BlockStore;

/// Identity-keyed cache of derived views.
///
/// Owned by the session alongside the committed store. Interior
/// mutability keeps the query surface `&self`; the cache is not
/// thread-safe, matching the single-session ownership model.
#[derive(Debug, Default)]
pub struct QueryCache {
    key: Cell<Option<(usize, usize)>>,
    traversal: RefCell<Option<Arc<[BlockId]>>>,
    ancestors: RefCell<HashMap<BlockId, Arc<[BlockId]>>>,
    selected: RefCell<Option<(Selection, Arc<[BlockId]>)>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flat pre-order traversal of all content blocks (root excluded).
    pub fn traverse(&self, store: &BlockStore) -> Arc<[BlockId]> {
        self.sync(store);
        if let Some(cached) = self.traversal.borrow().as_ref() {
            return Arc::clone(cached);
        }

        let mut out = Vec::with_capacity(store.len());
        let mut visited = HashSet::new();
        let mut stack: Vec<BlockId> = store.children(store.root()).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                tracing::warn!(block = %id, "cycle encountered during traversal, skipping");
                continue;
            }
            out.push(id);
            stack.extend(store.children(id).iter().rev().copied());
        }

        let result: Arc<[BlockId]> = out.into();
        *self.traversal.borrow_mut() = Some(Arc::clone(&result));
        result
    }

    /// Ancestor path of a block, from immediate parent upward. The root
    /// sentinel is not included; top-level blocks have an empty path, as
    /// do unknown ids.
    pub fn ancestors(&self, store: &BlockStore, id: BlockId) -> Arc<[BlockId]> {
        self.sync(store);
        if let Some(cached) = self.ancestors.borrow().get(&id) {
            return Arc::clone(cached);
        }

        let mut path = Vec::new();
        let mut current = store.parent(id);
        while let Some(parent) = current {
            if parent == store.root() {
                break;
            }
            path.push(parent);
            current = store.parent(parent);
        }

        let result: Arc<[BlockId]> = path.into();
        self.ancestors.borrow_mut().insert(id, Arc::clone(&result));
        result
    }

    /// The ids a selection resolves to, in document order: empty for
    /// `None` (and for stale selections pointing at vanished blocks), one
    /// id for `Single`, the contiguous sibling slice for `Range`.
    pub fn selected_ids(&self, store: &BlockStore, current: &Selection) -> Arc<[BlockId]> {
        self.sync(store);
        if let Some((cached_for, cached)) = self.selected.borrow().as_ref() {
            if cached_for == current {
                return Arc::clone(cached);
            }
        }

        let resolved: Vec<BlockId> = match current {
            Selection::None => Vec::new(),
            Selection::Single { id, .. } => {
                if store.contains(*id) {
                    vec![*id]
                } else {
                    Vec::new()
                }
            }
            Selection::Range { start, end } => {
                match selection::range_span(store, *start, *end) {
                    Some((parent, first, last)) => store.children(parent)[first..=last].to_vec(),
                    None => Vec::new(),
                }
            }
        };

        let result: Arc<[BlockId]> = resolved.into();
        *self.selected.borrow_mut() = Some((current.clone(), Arc::clone(&result)));
        result
    }

    /// Whether a block falls inside the current selection's resolved span.
    pub fn is_selected(&self, store: &BlockStore, current: &Selection, id: BlockId) -> bool {
        self.selected_ids(store, current).contains(&id)
    }

    // ── Direct reads (cheap enough to skip the cache) ───────────────────

    pub fn is_first_sibling(&self, store: &BlockStore, id: BlockId) -> bool {
        store.position(id) == Some(0)
    }

    pub fn is_last_sibling(&self, store: &BlockStore, id: BlockId) -> bool {
        match store.parent(id) {
            Some(parent) => store.position(id) == Some(store.children(parent).len() - 1),
            None => false,
        }
    }

    pub fn previous_sibling(&self, store: &BlockStore, id: BlockId) -> Option<BlockId> {
        let parent = store.parent(id)?;
        let position = store.position(id)?;
        store.children(parent).get(position.wrapping_sub(1)).copied()
    }

    pub fn next_sibling(&self, store: &BlockStore, id: BlockId) -> Option<BlockId> {
        let parent = store.parent(id)?;
        let position = store.position(id)?;
        store.children(parent).get(position + 1).copied()
    }

    /// Drop everything when the snapshot identity changed.
    fn sync(&self, store: &BlockStore) {
        let key = store.cache_key();
        if self.key.get() == Some(key) {
            return;
        }
        self.key.set(Some(key));
        *self.traversal.borrow_mut() = None;
        self.ancestors.borrow_mut().clear();
        *self.selected.borrow_mut() = None;
    }
}

// =========================================================================
// Tests
// =========================================================================
