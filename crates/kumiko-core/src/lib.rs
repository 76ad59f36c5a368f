//! Normalized, undoable block document model for kumiko.
//!
//! The document is a tree of typed blocks held in normalized form: one
//! id-keyed map of flat records plus a per-parent order index, never
//! nested arrays. All change flows through a closed command set, every
//! command produces a new copy-on-write snapshot, and history retains
//! whole (store, selection) frames — undo and redo are pointer swaps.
//!
//! # Design Philosophy
//!
//! - **One mutation surface.** UI layers build [`Command`] values and hand
//!   them to an [`EditorSession`]; there are no ad-hoc mutating calls to
//!   reach around it, so a command log replays a session exactly.
//! - **Snapshots over deltas.** Copy-on-write sharing makes whole-state
//!   frames cheap, which in turn makes coalescing trivial: a burst of
//!   keystrokes is just frames that never became checkpoints.
//! - **Tolerant reads, strict structure.** Attribute updates and selection
//!   gestures against vanished blocks are logged no-ops (the UI races
//!   removals constantly); anything that would bend the tree — duplicate
//!   ids, non-contiguous runs, a targeted root — fails before commit.
//!
//! The inline rich-text engine, block-type registry, serializer, and
//! event wiring are external collaborators: they call the mutation API
//! and read the query API, nothing more.

mod commands;
mod error;
mod history;
mod query;
mod selection;
mod session;
mod store;

pub use commands::{Command, MoveDirection};
pub use error::EditError;
pub use history::{History, HistoryEntry, Persistence, DEFAULT_HISTORY_CAP};
pub use query::QueryCache;
pub use selection::{Caret, Selection, TypingTracker};
pub use session::{Change, EditorSession, InsertionPoint, DEFAULT_TYPING_JITTER};
pub use store::{BlockStore, MAX_TREE_DEPTH, ROOT_TYPE_NAME};

// Re-export the leaf types: most callers want both crates through one door.
pub use kumiko_types::{Attributes, Block, BlockId, BlockNode};

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, EditError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paragraph(text: &str) -> BlockNode {
        BlockNode::new("core/paragraph").with_attribute("content", json!(text))
    }

    #[test]
    fn test_session_end_to_end() {
        let intro = paragraph("intro");
        let body = paragraph("body");
        let (intro_id, body_id) = (intro.id, body.id);
        let mut session = EditorSession::with_content(&[intro, body]).unwrap();

        // Type into the body block: one undo step for the whole word.
        session.select(body_id, Caret::default());
        session.start_typing();
        for text in ["b", "bo", "bod", "body!"] {
            let mut attributes = Attributes::new();
            attributes.insert("content".to_string(), json!(text));
            session
                .apply(Command::UpdateAttributes {
                    id: body_id,
                    attributes,
                })
                .unwrap();
        }
        session.stop_typing();

        // Then move it above the intro.
        session
            .apply(Command::Move {
                ids: vec![body_id],
                direction: MoveDirection::Up,
            })
            .unwrap();
        assert_eq!(session.children(session.root()), &[body_id, intro_id]);
        assert_eq!(session.undo_depth(), 2);

        // Undo the move, undo the word.
        assert!(session.undo());
        assert_eq!(session.children(session.root()), &[intro_id, body_id]);
        assert!(session.undo());
        assert_eq!(
            session.block(body_id).unwrap().attributes["content"],
            json!("body")
        );
        assert!(!session.can_undo());
    }

    #[test]
    fn test_deep_nesting_roundtrip() {
        // quote > list > item > paragraph, four levels down.
        let node = BlockNode::new("core/quote").with_children(vec![
            BlockNode::new("core/list").with_children(vec![
                BlockNode::new("core/list-item")
                    .with_children(vec![paragraph("deep")]),
            ]),
        ]);
        let quote_id = node.id;
        let deep_id = node.children[0].children[0].children[0].id;

        let mut session = EditorSession::with_content(&[node]).unwrap();
        assert_eq!(session.ancestors(deep_id).len(), 3);
        assert_eq!(session.traverse().len(), 4);

        // Removing the top of the chain takes the whole spine with it.
        session
            .apply(Command::Remove {
                ids: vec![quote_id],
            })
            .unwrap();
        assert!(session.store().is_empty());

        assert!(session.undo());
        assert_eq!(session.traverse().len(), 4);
        assert_eq!(
            session.block(deep_id).unwrap().attributes["content"],
            json!("deep")
        );
    }

    #[test]
    fn test_replayed_commands_are_deterministic() {
        let nodes = vec![paragraph("a"), paragraph("b"), paragraph("c")];
        let ids: Vec<BlockId> = nodes.iter().map(|n| n.id).collect();

        let d = BlockNode::new("core/heading").with_attribute("content", json!("d"));
        let commands = vec![
            Command::Insert {
                parent: BlockId::nil(), // patched per-session below
                index: 1,
                subtrees: vec![d],
            },
            Command::Remove {
                ids: vec![ids[2]],
            },
            Command::ReorderChildren {
                parent: BlockId::nil(),
                order: Vec::new(), // patched per-session below
            },
        ];

        let run = |commands: &[Command]| -> Vec<BlockId> {
            let mut session = EditorSession::with_content(&nodes).unwrap();
            let root = session.root();
            for command in commands {
                let command = match command.clone() {
                    Command::Insert {
                        index, subtrees, ..
                    } => Command::Insert {
                        parent: root,
                        index,
                        subtrees,
                    },
                    Command::ReorderChildren { .. } => {
                        let mut order: Vec<BlockId> = session.children(root).to_vec();
                        order.reverse();
                        Command::ReorderChildren {
                            parent: root,
                            order,
                        }
                    }
                    other => other,
                };
                session.apply(command).unwrap();
            }
            session.traverse().to_vec()
        };

        assert_eq!(run(&commands), run(&commands));
    }
}
