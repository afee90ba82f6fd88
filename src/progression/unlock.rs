//! Unlock evaluation over the content tree
//!
//! Pure reads: a graph is built from the tree and one learner's set of
//! completed node ids, and never writes. Completion records are never
//! deleted and every rule below only asks "is X complete?", so a node that
//! evaluates as unlocked stays unlocked.

use std::collections::{HashMap, HashSet};
use std::cell::RefCell;

use super::catalog::ContentTree;
use crate::domain::{NodeId, NodeKind, ProgressNode, UnlockRule};
use crate::error::{EngineError, EngineResult};

/// Unlock evaluator for one learner
pub struct UnlockGraph<'a> {
    tree: &'a ContentTree,
    completed: &'a HashSet<NodeId>,
    memo: RefCell<HashMap<NodeId, bool>>,
}

impl<'a> UnlockGraph<'a> {
    pub fn new(tree: &'a ContentTree, completed: &'a HashSet<NodeId>) -> Self {
        Self {
            tree,
            completed,
            memo: RefCell::new(HashMap::new()),
        }
    }

    pub fn is_completed(&self, node_id: &str) -> bool {
        self.completed.contains(node_id)
    }

    /// Whether the learner may complete `node_id` now
    pub fn is_unlocked(&self, node_id: &str) -> EngineResult<bool> {
        let node = self.tree.require(node_id)?;
        Ok(self.evaluate(node))
    }

    /// Ids among `candidates` that are unlocked, in the given order
    pub fn unlocked_among<'n>(&self, candidates: impl IntoIterator<Item = &'n ProgressNode>) -> Vec<NodeId> {
        candidates
            .into_iter()
            .filter(|n| self.evaluate(n))
            .map(|n| n.id.clone())
            .collect()
    }

    fn evaluate(&self, node: &ProgressNode) -> bool {
        if let Some(known) = self.memo.borrow().get(&node.id) {
            return *known;
        }
        let unlocked = match &node.unlock_rule {
            UnlockRule::Open => true,
            // Conjunction: every prerequisite must be complete
            UnlockRule::After { prerequisites } => {
                prerequisites.iter().all(|p| self.is_completed(p))
            }
            UnlockRule::Sequential => self.evaluate_sequential(node),
        };
        tracing::trace!(node_id = %node.id, unlocked, "Evaluated unlock rule");
        self.memo.borrow_mut().insert(node.id.clone(), unlocked);
        unlocked
    }

    fn evaluate_sequential(&self, node: &ProgressNode) -> bool {
        if node.kind == NodeKind::Zone {
            return self.evaluate_zone(node);
        }
        match self.tree.previous_sibling(&node.id) {
            // Step n requires step n-1
            Some(previous) => self.is_completed(&previous.id),
            // First child opens with its parent
            None => node
                .parent_id
                .as_deref()
                .and_then(|p| self.tree.get(p))
                .is_some_and(|parent| self.evaluate(parent)),
        }
    }

    fn evaluate_zone(&self, zone: &ProgressNode) -> bool {
        let Some(previous) = self.tree.previous_sibling(&zone.id) else {
            return true;
        };
        match self.tree.terminal_child(&previous.id) {
            Some(last_chapter) => self.is_completed(&last_chapter.id),
            // A previous zone without chapters has nothing to finish
            None => self.evaluate(previous),
        }
    }
}

/// Validation error if `node_id` is locked
pub(crate) fn ensure_unlocked(graph: &UnlockGraph<'_>, learner_id: &str, node_id: &str) -> EngineResult<()> {
    if graph.is_unlocked(node_id)? {
        Ok(())
    } else {
        Err(EngineError::LockedNode {
            learner_id: learner_id.to_string(),
            node_id: node_id.to_string(),
        })
    }
}
