//! The closed mutation command set.
//!
//! Every change to a document flows through [`Command`] — there is no
//! other mutation surface. UI layers build command values (a drop builds
//! an `Insert`, a keystroke an `UpdateAttributes`, a toolbar action a
//! `Move`) and hand them to the session, which validates, applies, and
//! records them. Commands are plain serializable data, so a sequence of
//! them replays a session deterministically.

use serde::{Deserialize, Serialize};

use kumiko_types::{Attributes, BlockId, BlockNode};

use crate::store::BlockStore;
use crate::Result;

/// Direction for [`Command::Move`]: one position toward the start or the
/// end of the sibling run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveDirection {
    Up,
    Down,
}

/// A single atomic document mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Insert fully-formed subtrees under `parent` at `index`
    /// (out-of-range clamps to append).
    Insert {
        parent: BlockId,
        index: usize,
        subtrees: Vec<BlockNode>,
    },
    /// Remove blocks and all their descendants. Unknown ids are skipped.
    Remove { ids: Vec<BlockId> },
    /// Shift a contiguous sibling run one position. A boundary move is a
    /// no-op that callers can detect via snapshot identity.
    Move {
        ids: Vec<BlockId>,
        direction: MoveDirection,
    },
    /// Swap a contiguous sibling run for replacement subtrees at the same
    /// position.
    Replace {
        ids: Vec<BlockId>,
        subtrees: Vec<BlockNode>,
    },
    /// Shallow-merge attributes into one block. Unknown ids are a no-op.
    UpdateAttributes { id: BlockId, attributes: Attributes },
    /// Replace a parent's child order wholesale with a permutation.
    ReorderChildren {
        parent: BlockId,
        order: Vec<BlockId>,
    },
}

impl Command {
    /// Apply this command against a snapshot, producing the next one.
    ///
    /// The input is never modified; on error it remains the last good
    /// state. A command that changes nothing returns a snapshot that is
    /// `ptr_eq`-identical to the input.
    pub fn apply(&self, store: &BlockStore) -> Result<BlockStore> {
        match self {
            Command::Insert {
                parent,
                index,
                subtrees,
            } => store.insert(*parent, *index, subtrees),
            Command::Remove { ids } => store.remove(ids),
            Command::Move { ids, direction } => store.move_run(ids, *direction),
            Command::Replace { ids, subtrees } => store.replace(ids, subtrees),
            Command::UpdateAttributes { id, attributes } => {
                Ok(store.update_attributes(*id, attributes))
            }
            Command::ReorderChildren { parent, order } => {
                store.reorder_children(*parent, order)
            }
        }
    }

    /// Whether this command changes tree structure (as opposed to block
    /// content). Structural commands always create an undo checkpoint;
    /// attribute edits coalesce while typing.
    pub(crate) fn is_structural(&self) -> bool {
        !matches!(self, Command::UpdateAttributes { .. })
    }
}

// =========================================================================
// Tests
// =========================================================================
