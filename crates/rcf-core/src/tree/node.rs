//! Arena nodes.

use super::bbox::{BoundingBox, Cut};

/// Index of a node in its tree's arena.
pub type NodeId = usize;

/// Leaf or internal payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// One distinct point; `duplicates` counts extra exact copies.
    Leaf { point: Vec<f64>, duplicates: usize },
    /// A random cut with both children.
    Internal {
        cut: Cut,
        left: NodeId,
        right: NodeId,
    },
}

/// A tree node. `mass` counts every point below it, duplicates included.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub mass: usize,
    pub bbox: BoundingBox,
    pub kind: NodeKind,
}

impl Node {
    pub fn leaf(point: Vec<f64>, parent: Option<NodeId>) -> Self {
        Node {
            parent,
            mass: 1,
            bbox: BoundingBox::from_point(&point),
            kind: NodeKind::Leaf {
                point,
                duplicates: 0,
            },
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Children as `(left, right)` for internal nodes.
    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match self.kind {
            NodeKind::Internal { left, right, .. } => Some((left, right)),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Point held by a leaf.
    pub fn point(&self) -> Option<&[f64]> {
        match &self.kind {
            NodeKind::Leaf { point, .. } => Some(point),
            NodeKind::Internal { .. } => None,
        }
    }
}
