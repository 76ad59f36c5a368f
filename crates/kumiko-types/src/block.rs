//! Block records and inbound subtrees.
//!
//! A `Block` is the flat, normalized record the store keeps per id: type
//! name, attributes, and the parent link. Sibling order is deliberately
//! NOT embedded here — it lives in the store's order index, so reordering
//! never rewrites block records.
//!
//! A `BlockNode` is the nested form blocks take at the boundary: an
//! external parser hands the core fully-formed subtrees with ids already
//! assigned, and insert/replace commands carry them as payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::BlockId;

/// Attribute map of a block. JSON-serializable by construction; the
/// attribute schema per block type is owned by the external type registry.
pub type Attributes = serde_json::Map<String, Value>;

/// A single normalized block record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Identity, unique for the lifetime of the document. Never reused.
    pub id: BlockId,
    /// Block type name (e.g. `"core/paragraph"`), opaque to the model.
    pub type_name: String,
    /// Current attribute state.
    #[serde(default)]
    pub attributes: Attributes,
    /// Parent link. `None` only for the root sentinel.
    pub parent_id: Option<BlockId>,
}

/// A fully-formed block subtree, as produced by the external parser.
///
/// Ids are pre-assigned by whoever builds the node; the store refuses
/// payloads whose ids collide with blocks it already holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    pub id: BlockId,
    pub type_name: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub children: Vec<BlockNode>,
}

impl BlockNode {
    /// Create a leaf node of the given type with a fresh id.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            id: BlockId::new(),
            type_name: type_name.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    /// Set a single attribute, builder-style.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Set the child subtrees, builder-style.
    pub fn with_children(mut self, children: Vec<BlockNode>) -> Self {
        self.children = children;
        self
    }

    /// Total number of blocks in this subtree (including self).
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(BlockNode::len).sum::<usize>()
    }

    /// Always false — a node is at least itself.
    pub fn is_empty(&self) -> bool {
        false
    }
}

// ============================================================================
// Tests
// ============================================================================
