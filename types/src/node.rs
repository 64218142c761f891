//! Organizational nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Unique identifier for a node.
pub type NodeId = Uuid;

/// Number of digits each hierarchy level contributes to a node code.
pub const NODE_CODE_SEGMENT: usize = 3;

/// A node in the organizational hierarchy.
///
/// `code` encodes the node's position: three digits per level, so a
/// node's code always starts with its parent's code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Node {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    pub parent_id: Option<NodeId>,
    /// Depth in the hierarchy, starting at 1
    pub level: u32,
    /// Hierarchy code
    pub code: String,
    /// Whether the node has no children
    pub is_leaf: bool,
    pub created_time: DateTime<Utc>,
}

impl Node {
    /// Code of the parent node, if this node is not top-level.
    pub fn parent_code(&self) -> Option<&str> {
        if self.code.len() > NODE_CODE_SEGMENT {
            Some(&self.code[..self.code.len() - NODE_CODE_SEGMENT])
        } else {
            None
        }
    }

    /// Whether `other` lies in the subtree rooted at this node (inclusive).
    pub fn contains(&self, other: &Node) -> bool {
        other.code.starts_with(&self.code)
    }
}

/// A node with its children, for tree responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct NodeTreeEntry {
    pub node: Node,
    #[cfg_attr(feature = "openapi", schema(no_recursion))]
    pub children: Vec<NodeTreeEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(code: &str) -> Node {
        Node {
            id: Uuid::new_v4(),
            name: code.to_string(),
            parent_id: None,
            level: (code.len() / NODE_CODE_SEGMENT) as u32,
            code: code.to_string(),
            is_leaf: true,
            created_time: Utc::now(),
        }
    }

    #[test]
    fn test_parent_code() {
        assert_eq!(node("001").parent_code(), None);
        assert_eq!(node("001002").parent_code(), Some("001"));
    }

    #[test]
    fn test_contains_subtree() {
        let root = node("001");
        assert!(root.contains(&node("001")));
        assert!(root.contains(&node("001004")));
        assert!(!root.contains(&node("002001")));
    }
}
