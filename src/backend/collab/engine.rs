/**
 * CRDT Engine
 *
 * The merge algorithm is opaque to the rest of the server: sessions only
 * load a snapshot, apply operations, and take a snapshot back. The
 * diamond-types implementation keeps one `ListOpLog` per live document
 * plus a `ListBranch` checked out at its tip.
 *
 * # Snapshots
 *
 * A snapshot is the full encoded oplog. Loading replays it into an empty
 * document, the same path a client patch takes.
 *
 * # Versions
 *
 * The version reported to clients is the oplog length, so it only grows.
 */

use diamond_types::list::encoding::EncodeOptions;
use diamond_types::list::{Branch as ListBranch, OpLog as ListOpLog};
use thiserror::Error;

use crate::shared::{DocumentState, EditOperation};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("position {position} is outside the document (length {len})")]
    OutOfBounds { position: usize, len: usize },
    /// A client patch could not be decoded or merged
    #[error("could not merge patch: {0}")]
    Decode(String),
    /// Stored state could not be decoded
    #[error("stored document state is unreadable: {0}")]
    CorruptSnapshot(String),
}

/// Creates documents from stored snapshots
pub trait CrdtEngine: Send + Sync {
    fn empty(&self) -> Box<dyn CrdtDocument>;

    fn load(&self, snapshot: &[u8]) -> Result<Box<dyn CrdtDocument>, EngineError>;
}

/// One live replicated document
pub trait CrdtDocument: Send {
    /// Apply one operation on behalf of `agent`
    fn apply(&mut self, agent: &str, op: &EditOperation) -> Result<(), EngineError>;

    /// Full binary state, suitable for `CrdtEngine::load`
    fn snapshot(&self) -> Vec<u8>;

    fn content(&self) -> String;

    /// Character count
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn version(&self) -> usize;

    fn state(&self) -> DocumentState {
        DocumentState {
            content: self.content(),
            version: self.version(),
        }
    }
}

/// diamond-types backed engine
#[derive(Debug, Default, Clone, Copy)]
pub struct DiamondEngine;

impl CrdtEngine for DiamondEngine {
    fn empty(&self) -> Box<dyn CrdtDocument> {
        Box::new(DiamondDocument::from_oplog(ListOpLog::new()))
    }

    fn load(&self, snapshot: &[u8]) -> Result<Box<dyn CrdtDocument>, EngineError> {
        let oplog = ListOpLog::load_from(snapshot).map_err(|e| EngineError::CorruptSnapshot(format!("{:?}", e)))?;
        Ok(Box::new(DiamondDocument::from_oplog(oplog)))
    }
}

struct DiamondDocument {
    oplog: ListOpLog,
    branch: ListBranch,
}

impl DiamondDocument {
    fn from_oplog(oplog: ListOpLog) -> Self {
        let branch = ListBranch::new_at_tip(&oplog);
        Self { oplog, branch }
    }
}

impl CrdtDocument for DiamondDocument {
    fn apply(&mut self, agent: &str, op: &EditOperation) -> Result<(), EngineError> {
        let len = self.len();
        match op {
            EditOperation::Insert { position, text } => {
                if *position > len {
                    return Err(EngineError::OutOfBounds { position: *position, len });
                }
                let agent = self.oplog.get_or_create_agent_id(agent);
                self.branch.insert(&mut self.oplog, agent, *position, text);
            }
            EditOperation::Delete { start, end } => {
                if *end > len || start >= end {
                    return Err(EngineError::OutOfBounds { position: *end, len });
                }
                let agent = self.oplog.get_or_create_agent_id(agent);
                self.branch.delete_without_content(&mut self.oplog, agent, *start..*end);
            }
            EditOperation::Patch { data } => {
                self.oplog
                    .decode_and_add(data)
                    .map_err(|e| EngineError::Decode(format!("{:?}", e)))?;
                self.branch = ListBranch::new_at_tip(&self.oplog);
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<u8> {
        self.oplog.encode(EncodeOptions::default())
    }

    fn content(&self) -> String {
        self.branch.content().to_string()
    }

    fn len(&self) -> usize {
        self.branch.len()
    }

    fn version(&self) -> usize {
        self.oplog.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_insert_and_delete() {
        let mut doc = DiamondEngine.empty();
        doc.apply("a", &EditOperation::insert(0, "hello world")).unwrap();
        doc.apply("a", &EditOperation::delete(5, 11)).unwrap();
        assert_eq!(doc.content(), "hello");
        assert!(doc.version() > 0);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut doc = DiamondEngine.empty();
        doc.apply("a", &EditOperation::insert(0, "abc")).unwrap();
        assert_matches!(
            doc.apply("a", &EditOperation::insert(4, "x")),
            Err(EngineError::OutOfBounds { position: 4, len: 3 })
        );
        assert_matches!(doc.apply("a", &EditOperation::delete(1, 9)), Err(EngineError::OutOfBounds { .. }));
        assert_eq!(doc.content(), "abc");
    }

    #[test]
    fn test_positions_count_characters() {
        let mut doc = DiamondEngine.empty();
        doc.apply("a", &EditOperation::insert(0, "héllo")).unwrap();
        doc.apply("a", &EditOperation::insert(5, "!")).unwrap();
        assert_eq!(doc.content(), "héllo!");
    }

    #[test]
    fn test_snapshot_reload() {
        let mut doc = DiamondEngine.empty();
        doc.apply("a", &EditOperation::insert(0, "hello")).unwrap();
        let snapshot = doc.snapshot();

        let reloaded = DiamondEngine.load(&snapshot).unwrap();
        assert_eq!(reloaded.content(), "hello");
        assert_eq!(reloaded.version(), doc.version());
    }

    #[test]
    fn test_patch_from_another_replica_merges() {
        let mut remote = DiamondEngine.empty();
        remote.apply("remote", &EditOperation::insert(0, "from afar")).unwrap();
        let patch = remote.snapshot();

        let mut local = DiamondEngine.empty();
        local.apply("local", &EditOperation::Patch { data: patch }).unwrap();
        assert_eq!(local.content(), "from afar");
    }

    #[test]
    fn test_garbage_snapshot_rejected() {
        assert!(matches!(
            DiamondEngine.load(b"definitely not an oplog"),
            Err(EngineError::CorruptSnapshot(_))
        ));
    }
}
