//! Course content nodes: modules and the lessons inside them.

use serde::{Deserialize, Serialize};

use memberhub_core::ContentNodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ContentKind {
    Module,
    Lesson { module: ContentNodeId },
}

/// A module or lesson that may be locked and drip-scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: ContentNodeId,
    #[serde(flatten)]
    pub kind: ContentKind,
    pub locked: bool,
    /// Days after the principal's anchor date before the node opens.
    /// Negative values are treated as zero.
    #[serde(default)]
    pub drip_delay_days: i64,
}

impl ContentNode {
    pub fn module(id: ContentNodeId) -> Self {
        Self {
            id,
            kind: ContentKind::Module,
            locked: false,
            drip_delay_days: 0,
        }
    }

    pub fn lesson(id: ContentNodeId, module: ContentNodeId) -> Self {
        Self {
            id,
            kind: ContentKind::Lesson { module },
            locked: false,
            drip_delay_days: 0,
        }
    }

    pub fn locked(mut self, drip_delay_days: i64) -> Self {
        self.locked = true;
        self.drip_delay_days = drip_delay_days;
        self
    }

    pub fn parent(&self) -> Option<ContentNodeId> {
        match self.kind {
            ContentKind::Module => None,
            ContentKind::Lesson { module } => Some(module),
        }
    }

    pub fn is_module(&self) -> bool {
        matches!(self.kind, ContentKind::Module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lesson_row_deserializes_with_parent() {
        let id = ContentNodeId::new();
        let module = ContentNodeId::new();
        let node: ContentNode = serde_json::from_value(json!({
            "id": id,
            "kind": "lesson",
            "module": module,
            "locked": true,
            "drip_delay_days": 7,
        }))
        .unwrap();

        assert_eq!(node, ContentNode::lesson(id, module).locked(7));
        assert_eq!(node.parent(), Some(module));
    }

    #[test]
    fn missing_drip_defaults_to_zero() {
        let node: ContentNode = serde_json::from_value(json!({
            "id": ContentNodeId::new(),
            "kind": "module",
            "locked": true,
        }))
        .unwrap();
        assert_eq!(node.drip_delay_days, 0);
        assert!(node.is_module());
    }
}
