//! Error types for document mutations.

use thiserror::Error;

use kumiko_types::BlockId;

/// Errors that can occur when applying a command against a store.
///
/// Variants fall into three classes:
///
/// - Malformed command arguments (`NonContiguousReplacement`,
///   `NonContiguousRun`, `OrderMismatch`, `RootNotMutable`) — surfaced
///   synchronously, nothing is touched.
/// - Missing references where silence would hide a real bug
///   (`UnknownParent`, `UnknownBlock`) — insert, replace, and move fail
///   hard. Lookup-tolerant paths (attribute updates, selection targets)
///   never reach this enum; they are logged no-ops instead.
/// - Consistency violations (`DuplicateBlock`, `Corrupted`) — the mutation
///   aborts rather than committing a corrupted store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// Insertion or replacement parent does not exist.
    #[error("parent block not found: {0:?}")]
    UnknownParent(BlockId),

    /// A command referenced a block that is not in the store.
    #[error("block not found: {0:?}")]
    UnknownBlock(BlockId),

    /// The root sentinel was named as a removal, move, or replacement target.
    #[error("the root block cannot be removed, moved, or replaced")]
    RootNotMutable,

    /// Replacement targets are not a contiguous sibling run under one parent.
    #[error("replacement targets are not a contiguous sibling run")]
    NonContiguousReplacement,

    /// Move targets are not a contiguous sibling run under one parent.
    #[error("move targets are not a contiguous sibling run")]
    NonContiguousRun,

    /// Reorder payload is not a permutation of the parent's children.
    #[error("new order for {parent:?} is not a permutation of its children")]
    OrderMismatch { parent: BlockId },

    /// An inserted subtree carries an id that already exists.
    #[error("block already exists: {0:?}")]
    DuplicateBlock(BlockId),

    /// Internal consistency check failed; the mutation was aborted.
    #[error("store consistency violated: {0}")]
    Corrupted(String),
}
