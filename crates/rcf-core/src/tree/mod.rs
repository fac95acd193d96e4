//! Random cut trees.
//!
//! A [`RandomCutTree`] partitions a bounded point sample with random
//! axis-aligned cuts. Nodes live in a tree-owned arena and refer to each
//! other by index; freed slots are recycled through a free list.
//!
//! Structural invariants (checked by [`RandomCutTree::validate`]):
//! - an internal node's box is the union of its children's boxes
//! - an internal node's mass is the sum of its children's masses
//! - a leaf's mass is `1 + duplicates` and its box is its point
//! - every point left of a cut has `x[d] <= value`, every point right `x[d] > value`

pub mod bbox;
pub mod node;

pub use bbox::{BoundingBox, Cut};
pub use node::{Node, NodeId, NodeKind};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rcf_common::{Error, Result};

/// A single randomized partition tree over a point sample.
#[derive(Debug, Clone)]
pub struct RandomCutTree {
    dimensions: usize,
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    rng: ChaCha8Rng,
}

impl RandomCutTree {
    /// Empty tree drawing its cuts from `rng`.
    pub fn new(dimensions: usize, rng: ChaCha8Rng) -> Self {
        Self {
            dimensions,
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            rng,
        }
    }

    /// Empty tree seeded directly.
    pub fn with_seed(dimensions: usize, seed: u64) -> Self {
        Self::new(dimensions, ChaCha8Rng::seed_from_u64(seed))
    }

    /// Rebuild from a dense node list, validating every invariant.
    pub(crate) fn from_parts(
        dimensions: usize,
        nodes: Vec<Node>,
        root: Option<NodeId>,
        rng: ChaCha8Rng,
    ) -> Result<Self> {
        let tree = Self {
            dimensions,
            nodes: nodes.into_iter().map(Some).collect(),
            free: Vec::new(),
            root,
            rng,
        };
        tree.validate()?;
        Ok(tree)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Live node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    pub(crate) fn rng(&self) -> &ChaCha8Rng {
        &self.rng
    }

    /// Total number of points, duplicates included.
    pub fn len(&self) -> usize {
        self.root.map_or(0, |r| self.node_ref(r).mass)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of distinct points.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().flatten().filter(|n| n.is_leaf()).count()
    }

    /// Number of live nodes, leaves and internal.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Longest root-to-leaf edge count. Empty and single-leaf trees are 0.
    pub fn depth(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            match self.node_ref(id).children() {
                Some((left, right)) => {
                    stack.push((left, depth + 1));
                    stack.push((right, depth + 1));
                }
                None => deepest = deepest.max(depth),
            }
        }
        deepest
    }

    /// True if a point with exactly these coordinates is stored.
    pub fn contains(&self, point: &[f64]) -> bool {
        self.multiplicity(point) > 0
    }

    /// Copies of `point` held by its leaf, 0 when absent.
    pub fn multiplicity(&self, point: &[f64]) -> usize {
        if point.len() != self.dimensions {
            return 0;
        }
        self.find_leaf(point)
            .map(|id| self.node_ref(id))
            .filter(|leaf| leaf.point() == Some(point))
            .map_or(0, |leaf| leaf.mass)
    }

    /// Insert a point, or bump the duplicate count of an identical leaf.
    pub fn insert(&mut self, point: &[f64]) -> Result<()> {
        self.check_dimensions(point)?;

        let Some(root) = self.root else {
            let id = self.alloc(Node::leaf(point.to_vec(), None));
            self.root = Some(id);
            return Ok(());
        };

        if let Some(leaf) = self.find_leaf(point) {
            if self.node_ref(leaf).point() == Some(point) {
                if let NodeKind::Leaf { duplicates, .. } = &mut self.node_mut(leaf).kind {
                    *duplicates += 1;
                }
                self.adjust_mass_upward(leaf, true);
                return Ok(());
            }
        }

        let mut current = root;
        loop {
            let merged = self.node_ref(current).bbox.merged_with_point(point);
            let drawn = merged.random_cut(&mut self.rng);

            let step = {
                let node = self.node_ref(current);
                let separation = drawn.and_then(|cut| {
                    let d = cut.dimension;
                    if cut.value < node.bbox.min()[d] {
                        Some((cut, true))
                    } else if cut.value >= node.bbox.max()[d] {
                        Some((cut, false))
                    } else {
                        None
                    }
                });
                match (separation, &node.kind) {
                    (Some((cut, leaf_left)), _) => InsertStep::Split(cut, leaf_left),
                    (None, NodeKind::Internal { cut, left, right }) => {
                        InsertStep::Descend(if cut.goes_left(point) { *left } else { *right })
                    }
                    (None, NodeKind::Leaf { point: existing, .. }) => {
                        // Only reachable when the merged range overflows; cut
                        // at the lower value on the first differing dimension.
                        let d = existing
                            .iter()
                            .zip(point)
                            .position(|(a, b)| a != b)
                            .unwrap_or(0);
                        let cut = Cut {
                            dimension: d,
                            value: existing[d].min(point[d]),
                        };
                        InsertStep::Split(cut, point[d] < existing[d])
                    }
                }
            };

            match step {
                InsertStep::Split(cut, leaf_left) => {
                    self.splice_above(current, point, cut, leaf_left, merged);
                    return Ok(());
                }
                InsertStep::Descend(next) => current = next,
            }
        }
    }

    /// Remove one copy of `point`.
    ///
    /// Fails with [`Error::NotFound`] and leaves the tree untouched when no
    /// leaf holds exactly this value.
    pub fn delete(&mut self, point: &[f64]) -> Result<()> {
        self.check_dimensions(point)?;

        let leaf = match self.find_leaf(point) {
            Some(id) if self.node_ref(id).point() == Some(point) => id,
            _ => return Err(Error::NotFound(format!("{:?}", point))),
        };

        if let NodeKind::Leaf { duplicates, .. } = &mut self.node_mut(leaf).kind {
            if *duplicates > 0 {
                *duplicates -= 1;
                self.adjust_mass_upward(leaf, false);
                return Ok(());
            }
        }

        let Some(parent) = self.node_ref(leaf).parent else {
            self.release(leaf);
            self.root = None;
            return Ok(());
        };

        let sibling = match self.node_ref(parent).children() {
            Some((left, right)) if left == leaf => right,
            Some((left, _)) => left,
            None => unreachable!("leaf parent is always internal"),
        };
        let grandparent = self.node_ref(parent).parent;

        self.node_mut(sibling).parent = grandparent;
        match grandparent {
            None => self.root = Some(sibling),
            Some(g) => self.replace_child(g, parent, sibling),
        }
        self.release(leaf);
        self.release(parent);

        let mut current = grandparent;
        while let Some(id) = current {
            let (left, right) = self
                .node_ref(id)
                .children()
                .expect("ancestor is internal");
            let bbox = self.node_ref(left).bbox.union(&self.node_ref(right).bbox);
            let node = self.node_mut(id);
            node.mass -= 1;
            node.bbox = bbox;
            current = node.parent;
        }
        Ok(())
    }

    /// Expected displacement of `point` against this tree, in `[0, 1)`.
    ///
    /// Walking the cut path from the root, `point` would be separated at node
    /// `v` with probability equal to the share of the merged box perimeter
    /// it adds there. Separation at `v` displaces `v`'s subtree
    /// (`mass / (mass + 1)`) and every sibling passed on the way down
    /// (`sibling / (parent + 1)`); the tree reports the probability-weighted
    /// maximum. An exact duplicate never separates, so it only collects the
    /// sibling terms. A tree that is empty or whose root is a leaf scores 0.
    ///
    /// A point of the wrong dimensionality fails with
    /// [`Error::DimensionMismatch`].
    pub fn score(&self, point: &[f64]) -> Result<f64> {
        self.check_dimensions(point)?;
        Ok(self.displacement(point))
    }

    /// [`score`](Self::score) for a point already checked by the caller.
    pub(crate) fn displacement(&self, point: &[f64]) -> f64 {
        let Some(root) = self.root else {
            return 0.0;
        };
        if self.node_ref(root).is_leaf() {
            return 0.0;
        }

        let mut expected = 0.0;
        let mut unseparated = 1.0;
        let mut sibling_max = 0.0_f64;
        let mut current = root;
        loop {
            let node = self.node_ref(current);
            let mass = node.mass as f64;
            let own = mass / (mass + 1.0);
            match &node.kind {
                NodeKind::Leaf { point: stored, .. } => {
                    if stored.as_slice() == point {
                        expected += unseparated * sibling_max;
                    } else {
                        expected += unseparated * sibling_max.max(own);
                    }
                    return expected;
                }
                NodeKind::Internal { cut, left, right } => {
                    let merged = node.bbox.perimeter_with(point);
                    if merged > 0.0 {
                        let p = (merged - node.bbox.perimeter()) / merged;
                        if p > 0.0 {
                            expected += unseparated * p * sibling_max.max(own);
                            unseparated *= 1.0 - p;
                        }
                    }
                    let (next, sibling) = if cut.goes_left(point) {
                        (*left, *right)
                    } else {
                        (*right, *left)
                    };
                    let displaced = self.node_ref(sibling).mass as f64 / (mass + 1.0);
                    sibling_max = sibling_max.max(displaced);
                    current = next;
                }
            }
        }
    }

    /// Check every structural invariant.
    pub fn validate(&self) -> Result<()> {
        let live = self.node_count();
        let Some(root) = self.root else {
            return if live == 0 {
                Ok(())
            } else {
                Err(corrupt(format!("empty tree holds {} nodes", live)))
            };
        };

        let root_node = self
            .node(root)
            .ok_or_else(|| corrupt(format!("root {} is not a live node", root)))?;
        if root_node.parent.is_some() {
            return Err(corrupt("root has a parent".to_string()));
        }

        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![root];
        let mut reached = 0usize;
        while let Some(id) = stack.pop() {
            if visited[id] {
                return Err(corrupt(format!("node {} reached twice", id)));
            }
            visited[id] = true;
            reached += 1;

            let node = self.node_ref(id);
            if !self.box_fits(&node.bbox) {
                return Err(corrupt(format!("node {} box has wrong dimensionality", id)));
            }
            match &node.kind {
                NodeKind::Leaf { point, duplicates } => {
                    if point.len() != self.dimensions {
                        return Err(corrupt(format!("leaf {} has wrong dimensionality", id)));
                    }
                    if point.iter().any(|x| !x.is_finite()) {
                        return Err(corrupt(format!("leaf {} holds a non-finite value", id)));
                    }
                    if duplicates.checked_add(1) != Some(node.mass) {
                        return Err(corrupt(format!(
                            "leaf {} mass {} != 1 + {} duplicates",
                            id, node.mass, duplicates
                        )));
                    }
                    if node.bbox != BoundingBox::from_point(point) {
                        return Err(corrupt(format!("leaf {} box is not its point", id)));
                    }
                }
                NodeKind::Internal { cut, left, right } => {
                    if left == right {
                        return Err(corrupt(format!("node {} has identical children", id)));
                    }
                    for &child in [left, right] {
                        let child_node = self.node(child).ok_or_else(|| {
                            corrupt(format!("node {} child {} is not a live node", id, child))
                        })?;
                        if child_node.parent != Some(id) {
                            return Err(corrupt(format!(
                                "node {} child {} points at parent {:?}",
                                id, child, child_node.parent
                            )));
                        }
                    }
                    let (l, r) = (self.node_ref(*left), self.node_ref(*right));
                    if l.mass.checked_add(r.mass) != Some(node.mass) {
                        return Err(corrupt(format!(
                            "node {} mass {} != {} + {}",
                            id, node.mass, l.mass, r.mass
                        )));
                    }
                    if !self.box_fits(&l.bbox) || !self.box_fits(&r.bbox) {
                        return Err(corrupt(format!("node {} child box has wrong dimensionality", id)));
                    }
                    if node.bbox != l.bbox.union(&r.bbox) {
                        return Err(corrupt(format!("node {} box is not the union of its children", id)));
                    }
                    let d = cut.dimension;
                    if d >= self.dimensions
                        || !cut.value.is_finite()
                        || l.bbox.max()[d] > cut.value
                        || r.bbox.min()[d] <= cut.value
                    {
                        return Err(corrupt(format!("node {} cut does not separate its children", id)));
                    }
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }

        if reached != live {
            return Err(corrupt(format!(
                "{} nodes unreachable from the root",
                live - reached
            )));
        }
        Ok(())
    }

    /// Live nodes renumbered depth-first from the root, free slots dropped.
    pub(crate) fn compacted(&self) -> (Vec<Node>, Option<NodeId>) {
        let Some(root) = self.root else {
            return (Vec::new(), None);
        };
        let mut order = Vec::with_capacity(self.node_count());
        let mut remap = vec![usize::MAX; self.nodes.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            remap[id] = order.len();
            order.push(id);
            if let Some((left, right)) = self.node_ref(id).children() {
                stack.push(right);
                stack.push(left);
            }
        }

        let nodes = order
            .iter()
            .map(|&id| {
                let mut node = self.node_ref(id).clone();
                node.parent = node.parent.map(|p| remap[p]);
                if let NodeKind::Internal { left, right, .. } = &mut node.kind {
                    *left = remap[*left];
                    *right = remap[*right];
                }
                node
            })
            .collect();
        (nodes, Some(0))
    }

    fn box_fits(&self, bbox: &BoundingBox) -> bool {
        bbox.min().len() == self.dimensions && bbox.max().len() == self.dimensions
    }

    fn check_dimensions(&self, point: &[f64]) -> Result<()> {
        if point.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: point.len(),
            });
        }
        Ok(())
    }

    /// Leaf reached by following cuts from the root.
    fn find_leaf(&self, point: &[f64]) -> Option<NodeId> {
        let mut current = self.root?;
        loop {
            match &self.node_ref(current).kind {
                NodeKind::Leaf { .. } => return Some(current),
                NodeKind::Internal { cut, left, right } => {
                    current = if cut.goes_left(point) { *left } else { *right };
                }
            }
        }
    }

    /// Put a new internal node above `sibling` holding a new leaf for `point`.
    fn splice_above(
        &mut self,
        sibling: NodeId,
        point: &[f64],
        cut: Cut,
        leaf_left: bool,
        bbox: BoundingBox,
    ) {
        let parent = self.node_ref(sibling).parent;
        let mass = self.node_ref(sibling).mass + 1;
        let leaf = self.alloc(Node::leaf(point.to_vec(), None));
        let (left, right) = if leaf_left {
            (leaf, sibling)
        } else {
            (sibling, leaf)
        };
        let internal = self.alloc(Node {
            parent,
            mass,
            bbox,
            kind: NodeKind::Internal { cut, left, right },
        });
        self.node_mut(leaf).parent = Some(internal);
        self.node_mut(sibling).parent = Some(internal);

        match parent {
            None => self.root = Some(internal),
            Some(p) => {
                self.replace_child(p, sibling, internal);
                let mut current = Some(p);
                while let Some(id) = current {
                    let node = self.node_mut(id);
                    node.mass += 1;
                    node.bbox.extend(point);
                    current = node.parent;
                }
            }
        }
    }

    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        if let NodeKind::Internal { left, right, .. } = &mut self.node_mut(parent).kind {
            if *left == old {
                *left = new;
            } else {
                *right = new;
            }
        }
    }

    /// Add or remove one unit of mass from `from` up to the root.
    fn adjust_mass_upward(&mut self, from: NodeId, grow: bool) {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = self.node_mut(id);
            if grow {
                node.mass += 1;
            } else {
                node.mass -= 1;
            }
            current = node.parent;
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = None;
        self.free.push(id);
    }

    fn node_ref(&self, id: NodeId) -> &Node {
        self.nodes[id].as_ref().expect("arena index refers to a live node")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id].as_mut().expect("arena index refers to a live node")
    }
}

enum InsertStep {
    Split(Cut, bool),
    Descend(NodeId),
}

fn corrupt(message: String) -> Error {
    Error::Serialization(format!("tree invariant violated: {}", message))
}
