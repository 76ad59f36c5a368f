//! Normalized block store with copy-on-write snapshots.
//!
//! Block records live in one id-keyed map; sibling order lives in a
//! separate per-parent index. Every block has an index entry (leaves map
//! to an empty run), and the index is the single source of truth for
//! order — block records never embed their children.
//!
//! Mutations never modify a store in place: each produces a new snapshot
//! whose maps share every untouched `Arc<Block>` and order run with the
//! original, so retaining snapshots in undo history costs two pointer
//! bumps per frame. Operations that turn out to be no-ops (boundary
//! moves, attribute merges that change nothing) hand back a snapshot that
//! is `ptr_eq`-identical to the input, which callers use to skip history
//! recording and change notification.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kumiko_types::{Attributes, Block, BlockId, BlockNode};

use crate::commands::MoveDirection;
use crate::{EditError, Result};

/// Type name of the root sentinel block.
pub const ROOT_TYPE_NAME: &str = "kumiko/root";

/// Hard ceiling on tree depth. Parent chains longer than this are treated
/// as corruption rather than traversed further.
pub const MAX_TREE_DEPTH: usize = 512;

/// An immutable snapshot of the block tree.
///
/// The root sentinel is a real record (`parent_id: None`, type
/// [`ROOT_TYPE_NAME`]) so that top-level blocks need no special-casing in
/// the index, but it is never a valid removal, move, or replacement
/// target.
#[derive(Clone, Debug)]
pub struct BlockStore {
    root: BlockId,
    blocks: Arc<HashMap<BlockId, Arc<Block>>>,
    order: Arc<HashMap<BlockId, Arc<[BlockId]>>>,
}

impl BlockStore {
    /// Create an empty document: just the root sentinel.
    pub fn new() -> Self {
        let root = BlockId::new();
        let mut blocks = HashMap::new();
        blocks.insert(
            root,
            Arc::new(Block {
                id: root,
                type_name: ROOT_TYPE_NAME.to_string(),
                attributes: Attributes::new(),
                parent_id: None,
            }),
        );
        let mut order = HashMap::new();
        order.insert(root, empty_run());

        Self {
            root,
            blocks: Arc::new(blocks),
            order: Arc::new(order),
        }
    }

    /// Create a document with the given top-level subtrees.
    pub fn from_nodes(subtrees: &[BlockNode]) -> Result<Self> {
        let store = Self::new();
        store.insert(store.root, 0, subtrees)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The root sentinel id.
    pub fn root(&self) -> BlockId {
        self.root
    }

    /// Number of content blocks (the root sentinel is not counted).
    pub fn len(&self) -> usize {
        self.blocks.len() - 1
    }

    /// Whether the document has no content blocks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a block record by id.
    pub fn get(&self, id: BlockId) -> Option<&Arc<Block>> {
        self.blocks.get(&id)
    }

    /// Whether the store holds a block with this id.
    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Ordered children of a block. Empty for leaves and unknown ids.
    pub fn children(&self, id: BlockId) -> &[BlockId] {
        self.order.get(&id).map(|run| run.as_ref()).unwrap_or(&[])
    }

    /// Parent of a block. `None` for the root and for unknown ids.
    pub fn parent(&self, id: BlockId) -> Option<BlockId> {
        self.blocks.get(&id).and_then(|b| b.parent_id)
    }

    /// Index of a block among its siblings.
    pub fn position(&self, id: BlockId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Whether two stores are the same snapshot (shared maps, not deep
    /// equality). No-op mutations return `ptr_eq`-identical snapshots.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.blocks, &other.blocks) && Arc::ptr_eq(&self.order, &other.order)
    }

    /// Identity key of the underlying maps, for identity-keyed memoization.
    pub(crate) fn cache_key(&self) -> (usize, usize) {
        (
            Arc::as_ptr(&self.blocks) as *const u8 as usize,
            Arc::as_ptr(&self.order) as *const u8 as usize,
        )
    }

    // =========================================================================
    // Mutations — each returns a new snapshot
    // =========================================================================

    /// Insert fully-formed subtrees under `parent` at `index`.
    ///
    /// An out-of-range index clamps to append. Fails if `parent` is
    /// unknown or any payload id collides with an existing block (or is
    /// repeated within the payload).
    pub fn insert(&self, parent: BlockId, index: usize, subtrees: &[BlockNode]) -> Result<Self> {
        if !self.blocks.contains_key(&parent) {
            return Err(EditError::UnknownParent(parent));
        }
        if subtrees.is_empty() {
            return Ok(self.clone());
        }

        let mut blocks = (*self.blocks).clone();
        let mut order = (*self.order).clone();
        for node in subtrees {
            flatten_into(node, parent, &mut blocks, &mut order)?;
        }

        let siblings = &self.order[&parent];
        let index = index.min(siblings.len());
        let mut next = Vec::with_capacity(siblings.len() + subtrees.len());
        next.extend_from_slice(&siblings[..index]);
        next.extend(subtrees.iter().map(|n| n.id));
        next.extend_from_slice(&siblings[index..]);
        order.insert(parent, next.into());

        Ok(Self {
            root: self.root,
            blocks: Arc::new(blocks),
            order: Arc::new(order),
        })
    }

    /// Remove blocks and all their descendants.
    ///
    /// Unknown ids among `ids` are skipped (tolerated UI race, logged at
    /// debug). Removing every content block leaves a valid empty
    /// document. Fails only if the root sentinel is targeted.
    pub fn remove(&self, ids: &[BlockId]) -> Result<Self> {
        if ids.contains(&self.root) {
            return Err(EditError::RootNotMutable);
        }

        let mut doomed = HashSet::new();
        for id in ids {
            if !self.blocks.contains_key(id) {
                tracing::debug!(block = %id, "remove target not in store, skipping");
                continue;
            }
            self.collect_subtree(*id, &mut doomed);
        }
        if doomed.is_empty() {
            return Ok(self.clone());
        }

        let blocks: HashMap<_, _> = self
            .blocks
            .iter()
            .filter(|(id, _)| !doomed.contains(*id))
            .map(|(id, block)| (*id, Arc::clone(block)))
            .collect();
        let order: HashMap<_, _> = self
            .order
            .iter()
            .filter(|(id, _)| !doomed.contains(*id))
            .map(|(id, run)| {
                if run.iter().any(|child| doomed.contains(child)) {
                    let filtered: Arc<[BlockId]> = run
                        .iter()
                        .copied()
                        .filter(|child| !doomed.contains(child))
                        .collect();
                    (*id, filtered)
                } else {
                    (*id, Arc::clone(run))
                }
            })
            .collect();

        Ok(Self {
            root: self.root,
            blocks: Arc::new(blocks),
            order: Arc::new(order),
        })
    }

    /// Shift a contiguous sibling run one position up or down.
    ///
    /// At the boundary (run already first / already last) the input
    /// snapshot is returned unchanged, `ptr_eq`-identical, so callers can
    /// skip history recording.
    pub fn move_run(&self, ids: &[BlockId], direction: MoveDirection) -> Result<Self> {
        let (parent, first) = self.locate_run(ids, EditError::NonContiguousRun)?;
        let siblings = &self.order[&parent];
        let last = first + ids.len() - 1;

        let at_boundary = match direction {
            MoveDirection::Up => first == 0,
            MoveDirection::Down => last + 1 == siblings.len(),
        };
        if at_boundary {
            return Ok(self.clone());
        }

        let mut next = siblings.to_vec();
        match direction {
            MoveDirection::Up => {
                let displaced = next.remove(first - 1);
                next.insert(last, displaced);
            }
            MoveDirection::Down => {
                let displaced = next.remove(last + 1);
                next.insert(first, displaced);
            }
        }

        let mut order = (*self.order).clone();
        order.insert(parent, next.into());

        Ok(Self {
            root: self.root,
            blocks: Arc::clone(&self.blocks),
            order: Arc::new(order),
        })
    }

    /// Atomically swap a contiguous sibling run for replacement subtrees
    /// at the same position.
    ///
    /// The old run and its descendants are pruned before the replacements
    /// are indexed, so no id is ever listed under two parents, even
    /// transiently. An empty `subtrees` degenerates to removal-in-place.
    pub fn replace(&self, ids: &[BlockId], subtrees: &[BlockNode]) -> Result<Self> {
        let (parent, first) = self.locate_run(ids, EditError::NonContiguousReplacement)?;

        let mut doomed = HashSet::new();
        for id in ids {
            self.collect_subtree(*id, &mut doomed);
        }

        let mut blocks: HashMap<_, _> = self
            .blocks
            .iter()
            .filter(|(id, _)| !doomed.contains(*id))
            .map(|(id, block)| (*id, Arc::clone(block)))
            .collect();
        let mut order: HashMap<_, _> = self
            .order
            .iter()
            .filter(|(id, _)| !doomed.contains(*id))
            .map(|(id, run)| (*id, Arc::clone(run)))
            .collect();
        for node in subtrees {
            flatten_into(node, parent, &mut blocks, &mut order)?;
        }

        let siblings = &self.order[&parent];
        let mut next = Vec::with_capacity(siblings.len() - ids.len() + subtrees.len());
        next.extend_from_slice(&siblings[..first]);
        next.extend(subtrees.iter().map(|n| n.id));
        next.extend_from_slice(&siblings[first + ids.len()..]);
        order.insert(parent, next.into());

        Ok(Self {
            root: self.root,
            blocks: Arc::new(blocks),
            order: Arc::new(order),
        })
    }

    /// Shallow-merge attributes into a block.
    ///
    /// Unknown ids are a logged no-op (the UI may race a removal). When
    /// every merged value already matches, the input snapshot is returned
    /// unchanged, reference identity preserved.
    pub fn update_attributes(&self, id: BlockId, partial: &Attributes) -> Self {
        let Some(block) = self.blocks.get(&id) else {
            tracing::debug!(block = %id, "attribute update for unknown block, ignoring");
            return self.clone();
        };

        let changed = partial
            .iter()
            .any(|(key, value)| block.attributes.get(key) != Some(value));
        if !changed {
            return self.clone();
        }

        let mut attributes = block.attributes.clone();
        for (key, value) in partial {
            attributes.insert(key.clone(), value.clone());
        }
        let mut updated = (**block).clone();
        updated.attributes = attributes;

        let mut blocks = (*self.blocks).clone();
        blocks.insert(id, Arc::new(updated));

        Self {
            root: self.root,
            blocks: Arc::new(blocks),
            order: Arc::clone(&self.order),
        }
    }

    /// Replace a parent's order entry wholesale.
    ///
    /// `new_order` must be a permutation of the existing children. An
    /// identical order returns the input snapshot unchanged.
    pub fn reorder_children(&self, parent: BlockId, new_order: &[BlockId]) -> Result<Self> {
        if !self.blocks.contains_key(&parent) {
            return Err(EditError::UnknownParent(parent));
        }

        let current = self.children(parent);
        if current == new_order {
            return Ok(self.clone());
        }

        let current_set: HashSet<_> = current.iter().collect();
        let new_set: HashSet<_> = new_order.iter().collect();
        if current.len() != new_order.len() || current_set != new_set {
            return Err(EditError::OrderMismatch { parent });
        }

        let mut order = (*self.order).clone();
        order.insert(parent, new_order.into());

        Ok(Self {
            root: self.root,
            blocks: Arc::clone(&self.blocks),
            order: Arc::new(order),
        })
    }

    // =========================================================================
    // Consistency
    // =========================================================================

    /// Verify every structural invariant of the snapshot.
    ///
    /// Checks that the order index and parent links agree exactly, that
    /// no id is listed under two parents, that nothing dangles, and that
    /// every parent chain terminates at the root within
    /// [`MAX_TREE_DEPTH`]. Cheap enough for `debug_assert!` after every
    /// commit; the fuzz suite runs it after every step.
    pub fn check_invariants(&self) -> Result<()> {
        let corrupted = |msg: String| Err(EditError::Corrupted(msg));

        let Some(root) = self.blocks.get(&self.root) else {
            return corrupted("root block missing".to_string());
        };
        if root.parent_id.is_some() {
            return corrupted("root block has a parent".to_string());
        }
        if self.blocks.len() != self.order.len() {
            return corrupted(format!(
                "order index has {} entries for {} blocks",
                self.order.len(),
                self.blocks.len()
            ));
        }

        let mut listed = HashSet::new();
        for (parent, run) in self.order.iter() {
            if !self.blocks.contains_key(parent) {
                return corrupted(format!("order entry for unknown block {parent:?}"));
            }
            for child in run.iter() {
                if !listed.insert(*child) {
                    return corrupted(format!("{child:?} listed under two parents"));
                }
                match self.blocks.get(child) {
                    None => return corrupted(format!("ordered child {child:?} has no record")),
                    Some(block) if block.parent_id != Some(*parent) => {
                        return corrupted(format!(
                            "{child:?} ordered under {parent:?} but parented to {:?}",
                            block.parent_id
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
        if listed.contains(&self.root) {
            return corrupted("root listed as a child".to_string());
        }
        if listed.len() != self.blocks.len() - 1 {
            return corrupted(format!(
                "{} blocks unreachable from the order index",
                self.blocks.len() - 1 - listed.len()
            ));
        }

        for id in self.blocks.keys() {
            let mut current = *id;
            let mut hops = 0;
            while current != self.root {
                let Some(parent) = self.parent(current) else {
                    return corrupted(format!("parent chain of {id:?} dangles at {current:?}"));
                };
                current = parent;
                hops += 1;
                if hops > MAX_TREE_DEPTH {
                    return corrupted(format!("parent chain of {id:?} exceeds depth limit"));
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Collect `id` and all its descendants into `out`.
    pub(crate) fn collect_subtree(&self, id: BlockId, out: &mut HashSet<BlockId>) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !out.insert(next) {
                continue;
            }
            if let Some(children) = self.order.get(&next) {
                stack.extend(children.iter().copied());
            }
        }
    }

    /// All ids that a removal of `ids` would cascade to. Unknown ids are
    /// ignored, matching [`BlockStore::remove`].
    pub(crate) fn subtree_ids(&self, ids: &[BlockId]) -> HashSet<BlockId> {
        let mut out = HashSet::new();
        for id in ids {
            if self.blocks.contains_key(id) {
                self.collect_subtree(*id, &mut out);
            }
        }
        out
    }

    /// Validate that `ids` is a non-empty contiguous sibling run given in
    /// document order; returns the shared parent and the run's first
    /// index. `gap_error` is the validation error for a broken run.
    fn locate_run(&self, ids: &[BlockId], gap_error: EditError) -> Result<(BlockId, usize)> {
        let Some(first_id) = ids.first() else {
            return Err(gap_error);
        };
        if ids.contains(&self.root) {
            return Err(EditError::RootNotMutable);
        }
        for id in ids {
            if !self.blocks.contains_key(id) {
                return Err(EditError::UnknownBlock(*id));
            }
        }

        // Unwrap is safe: only the root has no parent, excluded above.
        let parent = self.parent(*first_id).expect("non-root block has a parent");
        let siblings = self.children(parent);
        let Some(first) = siblings.iter().position(|c| c == first_id) else {
            return Err(EditError::Corrupted(format!(
                "{first_id:?} missing from its parent's order entry"
            )));
        };
        for (offset, id) in ids.iter().enumerate() {
            if siblings.get(first + offset) != Some(id) {
                return Err(gap_error);
            }
        }

        Ok((parent, first))
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_run() -> Arc<[BlockId]> {
    Vec::new().into()
}

/// Flatten a subtree into the candidate maps: one record and one order
/// entry per node, parent links set along the way. Fails on id collision
/// with anything already present — including nodes flattened earlier from
/// the same payload.
fn flatten_into(
    node: &BlockNode,
    parent: BlockId,
    blocks: &mut HashMap<BlockId, Arc<Block>>,
    order: &mut HashMap<BlockId, Arc<[BlockId]>>,
) -> Result<()> {
    let record = Arc::new(Block {
        id: node.id,
        type_name: node.type_name.clone(),
        attributes: node.attributes.clone(),
        parent_id: Some(parent),
    });
    if blocks.insert(node.id, record).is_some() {
        return Err(EditError::DuplicateBlock(node.id));
    }
    order.insert(node.id, node.children.iter().map(|c| c.id).collect());

    for child in &node.children {
        flatten_into(child, node.id, blocks, order)?;
    }
    Ok(())
}

// =========================================================================
// Tests
// =========================================================================
