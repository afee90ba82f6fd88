//! Completion records and percentage roll-up
//!
//! Only leaf nodes are completed directly. Parents become complete when
//! their last open child is completed, by writing their own record in the
//! same transaction.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension};

use super::catalog::ContentTree;
use super::db::EngineDb;
use super::models::{CompletionRecord, CompletionResult, ProgressView, RolledUpNode};
use super::unlock::{ensure_unlocked, UnlockGraph};
use crate::domain::{CompletionPayload, NodeId, ProgressNode};
use crate::error::{EngineError, EngineResult};

/// Records completions and computes roll-ups
#[derive(Clone)]
pub struct ProgressTracker {
    db: EngineDb,
}

impl ProgressTracker {
    pub fn new(db: EngineDb) -> Self {
        Self { db }
    }

    /// Record a completion without awarding XP.
    ///
    /// Fails with `LockedNode` if the node is not unlocked for the learner.
    pub fn record_completion(
        &self,
        learner_id: &str,
        node_id: &str,
        payload: Option<&CompletionPayload>,
        now_ms: i64,
    ) -> EngineResult<CompletionResult> {
        self.db.write(|conn| {
            let tree = ContentTree::load(conn)?;
            let completed = completed_nodes(conn, learner_id)?;
            let graph = UnlockGraph::new(&tree, &completed);
            ensure_unlocked(&graph, learner_id, node_id)?;
            record_in(conn, &tree, learner_id, node_id, payload, now_ms)
        })
    }

    /// Completion percentage of `node_id` for the learner (0..=100)
    pub fn completion_percentage(&self, learner_id: &str, node_id: &str) -> EngineResult<u8> {
        self.db.read(|conn| {
            let tree = ContentTree::load(conn)?;
            tree.require(node_id)?;
            let completed = completed_nodes(conn, learner_id)?;
            Ok(percentage(&tree, &completed, node_id))
        })
    }

    /// Ids of every node the learner has a record for
    pub fn completed(&self, learner_id: &str) -> EngineResult<HashSet<NodeId>> {
        self.db.read(|conn| completed_nodes(conn, learner_id))
    }

    pub fn record(&self, learner_id: &str, node_id: &str) -> EngineResult<Option<CompletionRecord>> {
        self.db.read(|conn| load_record(conn, learner_id, node_id))
    }
}

pub(crate) fn completed_nodes(conn: &Connection, learner_id: &str) -> EngineResult<HashSet<NodeId>> {
    let mut stmt = conn.prepare("SELECT node_id FROM completion_records WHERE learner_id = ?1")?;
    let ids = stmt
        .query_map([learner_id], |r| r.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

pub(crate) fn load_record(
    conn: &Connection,
    learner_id: &str,
    node_id: &str,
) -> EngineResult<Option<CompletionRecord>> {
    let row = conn
        .query_row(
            "SELECT first_completed_at, completed_at, payload
             FROM completion_records WHERE learner_id = ?1 AND node_id = ?2",
            (learner_id, node_id),
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((first_completed_at, completed_at, payload)) = row else {
        return Ok(None);
    };
    let payload = payload
        .map(|raw| serde_json::from_str::<CompletionPayload>(&raw))
        .transpose()?;
    Ok(Some(CompletionRecord {
        learner_id: learner_id.to_string(),
        node_id: node_id.to_string(),
        first_completed_at,
        completed_at,
        payload,
    }))
}

/// Check that `node` accepts `payload` as a direct completion
pub(crate) fn validate_submission(
    tree: &ContentTree,
    node: &ProgressNode,
    payload: Option<&CompletionPayload>,
) -> EngineResult<()> {
    if !tree.is_leaf(&node.id) {
        return Err(EngineError::Validation(format!(
            "{} {} has children and completes through them",
            node.kind, node.id
        )));
    }
    if let Some(payload) = payload {
        payload.validate()?;
        match node.content_kind {
            Some(expected) if payload.kind() != expected => {
                return Err(EngineError::Validation(format!(
                    "Node {} expects a {} payload, got {}",
                    node.id,
                    expected.as_str(),
                    payload.kind().as_str()
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Upsert the leaf's record and roll completion up through its ancestors.
///
/// Caller is responsible for the unlock check; this runs inside its transaction.
pub(crate) fn record_in(
    conn: &Connection,
    tree: &ContentTree,
    learner_id: &str,
    node_id: &str,
    payload: Option<&CompletionPayload>,
    now_ms: i64,
) -> EngineResult<CompletionResult> {
    let node = tree.require(node_id)?;
    validate_submission(tree, node, payload)?;

    let payload_json = payload.map(serde_json::to_string).transpose()?;
    let first_completion = insert_record(conn, learner_id, node_id, payload_json.as_deref(), now_ms)?;
    if !first_completion {
        // Re-submission: latest response wins, first_completed_at is kept
        conn.execute(
            "UPDATE completion_records SET completed_at = ?1, payload = ?2
             WHERE learner_id = ?3 AND node_id = ?4",
            (now_ms, payload_json.as_deref(), learner_id, node_id),
        )?;
        tracing::debug!(learner_id, node_id, "Completion re-submitted");
    }

    let mut completed = completed_nodes(conn, learner_id)?;
    let mut rolled_up = Vec::new();
    for ancestor in tree.ancestors(node_id) {
        if completed.contains(&ancestor.id) {
            continue;
        }
        let all_done = tree.children(&ancestor.id).iter().all(|c| completed.contains(c));
        if !all_done {
            break;
        }
        if insert_record(conn, learner_id, &ancestor.id, None, now_ms)? {
            tracing::info!(learner_id, node_id = %ancestor.id, kind = %ancestor.kind, "Rolled up completion");
            rolled_up.push(RolledUpNode {
                node_id: ancestor.id.clone(),
                kind: ancestor.kind,
            });
        }
        completed.insert(ancestor.id.clone());
    }

    Ok(CompletionResult {
        learner_id: learner_id.to_string(),
        node_id: node_id.to_string(),
        first_completion,
        completed_at: now_ms,
        rolled_up,
    })
}

/// Insert a record; false if one already existed
fn insert_record(
    conn: &Connection,
    learner_id: &str,
    node_id: &str,
    payload_json: Option<&str>,
    now_ms: i64,
) -> EngineResult<bool> {
    let inserted = conn.execute(
        "INSERT INTO completion_records (learner_id, node_id, first_completed_at, completed_at, payload)
         VALUES (?1, ?2, ?3, ?3, ?4)
         ON CONFLICT(learner_id, node_id) DO NOTHING",
        (learner_id, node_id, now_ms, payload_json),
    )?;
    Ok(inserted == 1)
}

/// Whether `node_id` counts as complete: it has a record, or it has
/// children and all of them are complete
pub fn is_complete(tree: &ContentTree, completed: &HashSet<NodeId>, node_id: &str) -> bool {
    if completed.contains(node_id) {
        return true;
    }
    let children = tree.children(node_id);
    !children.is_empty() && children.iter().all(|c| is_complete(tree, completed, c))
}

/// `floor(completed children / children * 100)`. A node with no children is 100.
pub fn percentage(tree: &ContentTree, completed: &HashSet<NodeId>, node_id: &str) -> u8 {
    let children = tree.children(node_id);
    if children.is_empty() {
        return 100;
    }
    let done = children
        .iter()
        .filter(|c| is_complete(tree, completed, c))
        .count();
    // done <= children.len(), so this fits in u8
    (done * 100 / children.len()) as u8
}

/// Build the progress tree rooted at `scope`
pub fn progress_view(
    tree: &ContentTree,
    completed: &HashSet<NodeId>,
    graph: &UnlockGraph<'_>,
    scope: &str,
) -> EngineResult<ProgressView> {
    let node = tree.require(scope)?;
    let children = tree
        .children(scope)
        .iter()
        .map(|child| progress_view(tree, completed, graph, child))
        .collect::<EngineResult<Vec<_>>>()?;
    let completed_here = is_complete(tree, completed, scope);
    let percentage = if children.is_empty() {
        if completed_here { 100 } else { 0 }
    } else {
        percentage(tree, completed, scope)
    };
    Ok(ProgressView {
        node_id: node.id.clone(),
        kind: node.kind,
        title: node.title.clone(),
        completed: completed_here,
        unlocked: graph.is_unlocked(scope)?,
        percentage,
        children,
    })
}
