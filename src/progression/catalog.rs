//! Content tree loading and validation
//!
//! The tree is authored elsewhere. This module indexes it for traversal and
//! validates imported catalogs so the engine can rely on a strict tree:
//! single parent, no cycles, correct kind nesting, unique sibling order.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::domain::{NodeId, NodeKind, PayloadKind, ProgressNode, UnlockRule};
use crate::error::{EngineError, EngineResult};

static NODE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").expect("node id pattern compiles"));

/// Indexed, validated content tree
#[derive(Debug, Clone, Default)]
pub struct ContentTree {
    nodes: HashMap<NodeId, ProgressNode>,
    /// Children by parent id (None = zones), sorted by order_index
    children: HashMap<Option<NodeId>, Vec<NodeId>>,
}

impl ContentTree {
    /// Build and validate a tree from a flat node list
    pub fn from_nodes(nodes: Vec<ProgressNode>) -> EngineResult<Self> {
        let mut by_id: HashMap<NodeId, ProgressNode> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if !NODE_ID_RE.is_match(&node.id) {
                return Err(EngineError::Validation(format!("Invalid node id: {:?}", node.id)));
            }
            if by_id.contains_key(&node.id) {
                return Err(EngineError::Validation(format!("Duplicate node id: {}", node.id)));
            }
            by_id.insert(node.id.clone(), node);
        }

        for node in by_id.values() {
            match (&node.parent_id, node.kind.parent_kind()) {
                (None, None) => {}
                (Some(parent_id), Some(expected)) => {
                    let parent = by_id.get(parent_id).ok_or_else(|| {
                        EngineError::Validation(format!(
                            "Node {} references missing parent {parent_id}",
                            node.id
                        ))
                    })?;
                    if parent.kind != expected {
                        return Err(EngineError::Validation(format!(
                            "{} {} cannot be placed under {} {}",
                            node.kind, node.id, parent.kind, parent.id
                        )));
                    }
                }
                (None, Some(expected)) => {
                    return Err(EngineError::Validation(format!(
                        "{} {} needs a {expected} parent",
                        node.kind, node.id
                    )));
                }
                (Some(_), None) => {
                    return Err(EngineError::Validation(format!(
                        "Zone {} cannot have a parent",
                        node.id
                    )));
                }
            }

            if let UnlockRule::After { prerequisites } = &node.unlock_rule {
                for prereq in prerequisites {
                    if prereq == &node.id {
                        return Err(EngineError::Validation(format!(
                            "Node {} lists itself as a prerequisite",
                            node.id
                        )));
                    }
                    if !by_id.contains_key(prereq) {
                        return Err(EngineError::Validation(format!(
                            "Node {} requires unknown node {prereq}",
                            node.id
                        )));
                    }
                }
            }
        }
        // Kind nesting strictly descends zone > chapter > phase > page, so parent
        // links cannot form a cycle once every parent has the expected kind.

        let mut children: HashMap<Option<NodeId>, Vec<NodeId>> = HashMap::new();
        for node in by_id.values() {
            children
                .entry(node.parent_id.clone())
                .or_default()
                .push(node.id.clone());
        }
        for (parent, siblings) in children.iter_mut() {
            siblings.sort_by_key(|id| by_id[id].order_index);
            let mut seen = HashSet::new();
            for id in siblings.iter() {
                if !seen.insert(by_id[id].order_index) {
                    return Err(EngineError::Validation(format!(
                        "Duplicate order {} under {}",
                        by_id[id].order_index,
                        parent.as_deref().unwrap_or("<root>")
                    )));
                }
            }
        }

        Ok(Self {
            nodes: by_id,
            children,
        })
    }

    /// Load the authored tree from the database
    pub fn load(conn: &Connection) -> EngineResult<Self> {
        let mut stmt = conn.prepare(
            "SELECT id, kind, parent_id, order_index, title, unlock_rule, content_kind
             FROM progress_nodes",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, i64>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let (id, kind, parent_id, order_index, title, rule, content_kind) = row?;
            let kind = NodeKind::from_str(&kind)
                .ok_or_else(|| EngineError::Validation(format!("Node {id} has unknown kind {kind}")))?;
            let unlock_rule: UnlockRule = serde_json::from_str(&rule)?;
            let content_kind = match content_kind {
                Some(k) => Some(PayloadKind::from_str(&k).ok_or_else(|| {
                    EngineError::Validation(format!("Node {id} has unknown content kind {k}"))
                })?),
                None => None,
            };
            nodes.push(ProgressNode {
                id,
                kind,
                parent_id,
                order_index,
                title,
                unlock_rule,
                content_kind,
            });
        }
        Self::from_nodes(nodes)
    }

    /// Replace the stored tree with this one
    pub fn store(&self, conn: &Connection) -> EngineResult<()> {
        conn.execute("DELETE FROM progress_nodes", [])?;

        // Parents before children so the self-reference holds on every insert
        let mut ordered: Vec<&ProgressNode> = self.nodes.values().collect();
        ordered.sort_by(|a, b| (a.kind, a.order_index, &a.id).cmp(&(b.kind, b.order_index, &b.id)));

        let mut stmt = conn.prepare(
            "INSERT INTO progress_nodes (id, kind, parent_id, order_index, title, unlock_rule, content_kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for node in ordered {
            stmt.execute(rusqlite::params![
                node.id,
                node.kind.as_str(),
                node.parent_id,
                node.order_index,
                node.title,
                serde_json::to_string(&node.unlock_rule)?,
                node.content_kind.map(|k| k.as_str()),
            ])?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &ProgressNode> {
        self.nodes.values()
    }

    pub fn get(&self, id: &str) -> Option<&ProgressNode> {
        self.nodes.get(id)
    }

    /// Look up a node, failing with a validation error if it does not exist
    pub fn require(&self, id: &str) -> EngineResult<&ProgressNode> {
        self.get(id).ok_or_else(|| EngineError::unknown_node(id))
    }

    /// Children of `id` in order
    pub fn children(&self, id: &str) -> &[NodeId] {
        self.children
            .get(&Some(id.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All zones in order
    pub fn zones(&self) -> &[NodeId] {
        self.children.get(&None).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_leaf(&self, id: &str) -> bool {
        self.children(id).is_empty()
    }

    /// Siblings of `id` (including itself) in order
    pub fn siblings(&self, id: &str) -> &[NodeId] {
        let parent = self.get(id).and_then(|n| n.parent_id.clone());
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sibling immediately before `id` by order_index
    pub fn previous_sibling(&self, id: &str) -> Option<&ProgressNode> {
        let siblings = self.siblings(id);
        let pos = siblings.iter().position(|s| s == id)?;
        pos.checked_sub(1).and_then(|p| self.get(&siblings[p]))
    }

    /// Sibling immediately after `id` by order_index
    pub fn next_sibling(&self, id: &str) -> Option<&ProgressNode> {
        let siblings = self.siblings(id);
        let pos = siblings.iter().position(|s| s == id)?;
        siblings.get(pos + 1).and_then(|s| self.get(s))
    }

    /// Last child by order_index
    pub fn terminal_child(&self, id: &str) -> Option<&ProgressNode> {
        self.children(id).last().and_then(|c| self.get(c))
    }

    /// Parent chain from the immediate parent up to the zone
    pub fn ancestors(&self, id: &str) -> Vec<&ProgressNode> {
        let mut out = Vec::new();
        let mut cursor = self.get(id).and_then(|n| n.parent_id.as_deref());
        while let Some(parent_id) = cursor {
            let Some(parent) = self.get(parent_id) else {
                break;
            };
            out.push(parent);
            cursor = parent.parent_id.as_deref();
        }
        out
    }

    /// Zone containing `id` (the node itself if it is a zone)
    pub fn zone_of(&self, id: &str) -> Option<&ProgressNode> {
        let node = self.get(id)?;
        if node.kind == NodeKind::Zone {
            return Some(node);
        }
        self.ancestors(id).into_iter().last()
    }

    /// Every node: zones in order, each followed by its subtree
    pub fn walk(&self) -> Vec<&ProgressNode> {
        self.zones().iter().flat_map(|zone| self.subtree(zone)).collect()
    }

    /// `id` and every descendant, parents before children
    pub fn subtree(&self, id: &str) -> Vec<&ProgressNode> {
        let mut out = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.get(&current) {
                out.push(node);
                for child in self.children(&current).iter().rev() {
                    stack.push(child.clone());
                }
            }
        }
        out
    }
}

/// One `[[node]]` table in a catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub parent: Option<String>,
    pub order: i64,
    #[serde(default)]
    pub title: String,
    /// "open" or "sequential" (default)
    #[serde(default)]
    pub unlock: Option<String>,
    /// Explicit prerequisites; overrides `unlock`
    #[serde(default)]
    pub after: Option<Vec<String>>,
    /// Expected payload kind
    #[serde(default)]
    pub content: Option<String>,
}

/// Catalog file as exported by the authoring store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub node: Vec<CatalogEntry>,
}

impl CatalogFile {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse catalog: {}", path.display()))
    }

    /// Convert entries to nodes and validate the resulting tree
    pub fn into_tree(self) -> EngineResult<ContentTree> {
        let nodes = self
            .node
            .into_iter()
            .map(CatalogEntry::into_node)
            .collect::<EngineResult<Vec<_>>>()?;
        ContentTree::from_nodes(nodes)
    }
}

impl CatalogEntry {
    fn into_node(self) -> EngineResult<ProgressNode> {
        let kind = NodeKind::from_str(&self.kind).ok_or_else(|| {
            EngineError::Validation(format!("Node {} has unknown kind {}", self.id, self.kind))
        })?;
        let unlock_rule = match (self.after, self.unlock.as_deref()) {
            (Some(prerequisites), _) => UnlockRule::After { prerequisites },
            (None, None | Some("sequential")) => UnlockRule::Sequential,
            (None, Some("open")) => UnlockRule::Open,
            (None, Some(other)) => {
                return Err(EngineError::Validation(format!(
                    "Node {} has unknown unlock rule {other}",
                    self.id
                )));
            }
        };
        let content_kind = match self.content.as_deref() {
            Some(k) => Some(PayloadKind::from_str(k).ok_or_else(|| {
                EngineError::Validation(format!("Node {} has unknown content kind {k}", self.id))
            })?),
            None => None,
        };
        Ok(ProgressNode {
            id: self.id,
            kind,
            parent_id: self.parent,
            order_index: self.order,
            title: self.title,
            unlock_rule,
            content_kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::EngineDb;
    use tempfile::tempdir;

    fn sample() -> Vec<ProgressNode> {
        vec![
            ProgressNode::new("z1", NodeKind::Zone, None, 0),
            ProgressNode::new("c1", NodeKind::Chapter, Some("z1"), 0),
            ProgressNode::new("c2", NodeKind::Chapter, Some("z1"), 1),
            ProgressNode::new("p2", NodeKind::Phase, Some("c1"), 2),
            ProgressNode::new("p1", NodeKind::Phase, Some("c1"), 1),
        ]
    }

    #[test]
    fn test_children_sorted_by_order() {
        let tree = ContentTree::from_nodes(sample()).unwrap();
        assert_eq!(tree.children("c1"), &["p1".to_string(), "p2".to_string()]);
        assert_eq!(tree.previous_sibling("p2").unwrap().id, "p1");
        assert!(tree.previous_sibling("p1").is_none());
        assert_eq!(tree.terminal_child("z1").unwrap().id, "c2");
        assert_eq!(tree.zone_of("p2").unwrap().id, "z1");
        assert!(tree.is_leaf("c2"));
    }

    #[test]
    fn test_rejects_bad_nesting() {
        let mut nodes = sample();
        nodes.push(ProgressNode::new("bad", NodeKind::Page, Some("c1"), 9));
        assert!(matches!(
            ContentTree::from_nodes(nodes),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_sibling_order() {
        let mut nodes = sample();
        nodes.push(ProgressNode::new("p3", NodeKind::Phase, Some("c1"), 1));
        assert!(ContentTree::from_nodes(nodes).is_err());

        let mut nodes = sample();
        nodes.push(ProgressNode::new("z2", NodeKind::Zone, None, 0));
        assert!(ContentTree::from_nodes(nodes).is_err());
    }

    #[test]
    fn test_rejects_missing_parent_and_prereq() {
        let mut nodes = sample();
        nodes.push(ProgressNode::new("c9", NodeKind::Chapter, Some("z9"), 0));
        assert!(ContentTree::from_nodes(nodes).is_err());

        let mut nodes = sample();
        nodes.push(
            ProgressNode::new("c3", NodeKind::Chapter, Some("z1"), 2).with_rule(UnlockRule::After {
                prerequisites: vec!["nowhere".into()],
            }),
        );
        assert!(ContentTree::from_nodes(nodes).is_err());
    }

    #[test]
    fn test_rejects_bad_ids() {
        let nodes = vec![ProgressNode::new("Zone One", NodeKind::Zone, None, 0)];
        assert!(ContentTree::from_nodes(nodes).is_err());
    }

    #[test]
    fn test_catalog_file_parse() {
        let catalog: CatalogFile = toml::from_str(
            r#"
            [[node]]
            id = "z1"
            kind = "zone"
            order = 0
            unlock = "open"

            [[node]]
            id = "c1"
            kind = "chapter"
            parent = "z1"
            order = 0

            [[node]]
            id = "s1"
            kind = "step"
            parent = "c1"
            order = 0
            content = "self-assessment"
            after = ["z1"]
            "#,
        )
        .unwrap();
        let tree = catalog.into_tree().unwrap();
        assert_eq!(tree.get("z1").unwrap().unlock_rule, UnlockRule::Open);
        let step = tree.get("s1").unwrap();
        assert_eq!(step.kind, NodeKind::Phase);
        assert_eq!(step.content_kind, Some(PayloadKind::SelfAssessment));
    }

    #[test]
    fn test_store_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let db = EngineDb::open(&dir.path().join("progress.db")).unwrap();
        let tree = ContentTree::from_nodes(sample()).unwrap();
        db.write(|conn| tree.store(conn)).unwrap();

        let loaded = db.read(|conn| ContentTree::load(conn)).unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded.children("c1"), tree.children("c1"));
    }
}
