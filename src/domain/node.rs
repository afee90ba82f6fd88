use serde::{Deserialize, Serialize};

use super::{NodeId, PayloadKind};

/// Level of a node in the content hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Zone,
    Chapter,
    Phase,
    Page,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zone => "zone",
            Self::Chapter => "chapter",
            Self::Phase => "phase",
            Self::Page => "page",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "zone" => Some(Self::Zone),
            "chapter" => Some(Self::Chapter),
            // "step" is the older authoring name for a phase
            "phase" | "step" => Some(Self::Phase),
            "page" => Some(Self::Page),
            _ => None,
        }
    }

    /// The only kind allowed as this kind's parent (None for zones)
    pub fn parent_kind(&self) -> Option<NodeKind> {
        match self {
            Self::Zone => None,
            Self::Chapter => Some(Self::Zone),
            Self::Phase => Some(Self::Chapter),
            Self::Page => Some(Self::Phase),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Prerequisite predicate gating a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "lowercase")]
pub enum UnlockRule {
    /// Always unlocked
    Open,
    /// Unlocked once every listed node has a completion record
    After { prerequisites: Vec<NodeId> },
    /// Derived from the node's position in the hierarchy
    #[default]
    Sequential,
}

/// A node in the zone/chapter/phase/page tree.
///
/// Authored externally; read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub parent_id: Option<NodeId>,
    pub order_index: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub unlock_rule: UnlockRule,
    /// Payload kind this node expects on completion, if constrained
    #[serde(default)]
    pub content_kind: Option<PayloadKind>,
}

impl ProgressNode {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, parent_id: Option<&str>, order_index: i64) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id: parent_id.map(str::to_string),
            order_index,
            title: String::new(),
            unlock_rule: UnlockRule::Sequential,
            content_kind: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_rule(mut self, rule: UnlockRule) -> Self {
        self.unlock_rule = rule;
        self
    }

    pub fn with_content_kind(mut self, kind: PayloadKind) -> Self {
        self.content_kind = Some(kind);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_nesting() {
        assert_eq!(NodeKind::Zone.parent_kind(), None);
        assert_eq!(NodeKind::Page.parent_kind(), Some(NodeKind::Phase));
        assert_eq!(NodeKind::from_str("step"), Some(NodeKind::Phase));
        assert_eq!(NodeKind::from_str("module"), None);
    }

    #[test]
    fn test_unlock_rule_serde() {
        let rule: UnlockRule =
            serde_json::from_str(r#"{"rule":"after","prerequisites":["a","b"]}"#).unwrap();
        assert_eq!(
            rule,
            UnlockRule::After {
                prerequisites: vec!["a".to_string(), "b".to_string()]
            }
        );
        let json = serde_json::to_string(&UnlockRule::Sequential).unwrap();
        assert_eq!(json, r#"{"rule":"sequential"}"#);
    }
}
