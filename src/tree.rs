//! Binary space partition tree.
//!
//! Arena-backed: nodes live in a slot vector and are addressed by index,
//! with a side table from cell id to slot. Interior nodes keep the cell
//! they were split from; leaves correspond one-to-one to graph nodes.

use crate::graph::CellId;
use crate::polyhedron::Polyhedron;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Traversal {
    Depth,
    Width,
}

#[derive(Debug)]
pub struct BspNode {
    pub cell: CellId,
    pub convex: Polyhedron,
    /// Indices into the running primitive arrays still crossing this cell.
    pub plane_ids: Vec<usize>,
    parent: Option<usize>,
    children: Vec<usize>,
}

pub struct BspTree {
    slots: Vec<Option<BspNode>>,
    index: BTreeMap<CellId, usize>,
    root: usize,
}

impl BspTree {
    pub fn new(cell: CellId, convex: Polyhedron, plane_ids: Vec<usize>) -> Self {
        let root = BspNode {
            cell,
            convex,
            plane_ids,
            parent: None,
            children: Vec::new(),
        };
        let mut index = BTreeMap::new();
        index.insert(cell, 0);
        Self {
            slots: vec![Some(root)],
            index,
            root: 0,
        }
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn node(&self, slot: usize) -> &BspNode {
        self.slots[slot].as_ref().expect("vacant tree slot")
    }

    pub fn node_mut(&mut self, slot: usize) -> &mut BspNode {
        self.slots[slot].as_mut().expect("vacant tree slot")
    }

    pub fn slot_of(&self, cell: CellId) -> Option<usize> {
        self.index.get(&cell).copied()
    }

    pub fn is_leaf(&self, slot: usize) -> bool {
        self.node(slot).children.is_empty()
    }

    pub fn children(&self, slot: usize) -> &[usize] {
        &self.node(slot).children
    }

    pub fn parent(&self, slot: usize) -> Option<usize> {
        self.node(slot).parent
    }

    pub fn add_child(&mut self, parent: usize, cell: CellId, convex: Polyhedron, plane_ids: Vec<usize>) -> usize {
        let slot = self.slots.len();
        self.slots.push(Some(BspNode {
            cell,
            convex,
            plane_ids,
            parent: Some(parent),
            children: Vec::new(),
        }));
        self.node_mut(parent).children.push(slot);
        self.index.insert(cell, slot);
        slot
    }

    /// Cell ids of all leaves, in depth-first order.
    pub fn leaves(&self) -> Vec<CellId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(slot) = stack.pop() {
            if self.slots[slot].is_none() {
                continue;
            }
            let node = self.node(slot);
            if node.children.is_empty() {
                out.push(node.cell);
            } else {
                for &c in node.children.iter().rev() {
                    stack.push(c);
                }
            }
        }
        out
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves().len()
    }

    /// The other child of `cell`'s parent, if it exists and is a leaf.
    pub fn leaf_sibling(&self, cell: CellId) -> Option<CellId> {
        let slot = self.slot_of(cell)?;
        let parent = self.parent(slot)?;
        let sibling = *self.children(parent).iter().find(|&&c| c != slot)?;
        if self.is_leaf(sibling) {
            Some(self.node(sibling).cell)
        } else {
            None
        }
    }

    /// Replace two sibling leaves and their parent by a single leaf
    /// tagged `keep`, carrying the parent's convex and plane set.
    ///
    /// Returns the merged convex, or `None` when `keep` and `gone` are
    /// not leaf children of the same interior node.
    pub fn contract_leaf_pair(&mut self, keep: CellId, gone: CellId) -> Option<Polyhedron> {
        let keep_slot = self.slot_of(keep)?;
        let gone_slot = self.slot_of(gone)?;
        if !self.is_leaf(keep_slot) || !self.is_leaf(gone_slot) {
            return None;
        }
        let parent = self.parent(keep_slot)?;
        if self.parent(gone_slot) != Some(parent) {
            return None;
        }

        let parent_node = self.slots[parent].take().expect("vacant tree slot");
        self.slots[keep_slot] = None;
        self.slots[gone_slot] = None;
        self.index.remove(&parent_node.cell);
        self.index.remove(&keep);
        self.index.remove(&gone);

        let merged = parent_node.convex.clone();
        let slot = self.slots.len();
        self.slots.push(Some(BspNode {
            cell: keep,
            convex: parent_node.convex,
            plane_ids: parent_node.plane_ids,
            parent: parent_node.parent,
            children: Vec::new(),
        }));
        self.index.insert(keep, slot);

        match parent_node.parent {
            Some(g) => {
                let children = &mut self.node_mut(g).children;
                let pos = children.iter().position(|&c| c == parent).expect("detached parent");
                children[pos] = slot;
            }
            None => self.root = slot,
        }
        Some(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::rational_from_f64;

    fn cube() -> Polyhedron {
        let q = |v: f64| rational_from_f64(v).unwrap();
        Polyhedron::from_bounds(&[q(0.0), q(0.0), q(0.0)], &[q(1.0), q(1.0), q(1.0)])
    }

    #[test]
    fn leaves_track_growth() {
        let mut t = BspTree::new(0, cube(), vec![0, 1]);
        assert_eq!(t.leaves(), vec![0]);
        let root = t.root();
        t.add_child(root, 1, cube(), vec![]);
        t.add_child(root, 2, cube(), vec![1]);
        assert_eq!(t.leaves(), vec![1, 2]);
        let slot2 = t.slot_of(2).unwrap();
        t.add_child(slot2, 3, cube(), vec![]);
        t.add_child(slot2, 4, cube(), vec![]);
        assert_eq!(t.leaves(), vec![1, 3, 4]);
        assert_eq!(t.leaf_sibling(1), None); // sibling 2 is interior
        assert_eq!(t.leaf_sibling(3), Some(4));
    }

    #[test]
    fn contraction_replaces_parent_with_leaf() {
        let mut t = BspTree::new(0, cube(), vec![]);
        let root = t.root();
        t.add_child(root, 1, cube(), vec![]);
        let slot2 = t.add_child(root, 2, cube(), vec![]);
        t.add_child(slot2, 3, cube(), vec![]);
        t.add_child(slot2, 4, cube(), vec![]);

        assert!(t.contract_leaf_pair(3, 1).is_none()); // not siblings
        let merged = t.contract_leaf_pair(3, 4);
        assert!(merged.is_some());
        assert_eq!(t.leaves(), vec![1, 3]);
        assert_eq!(t.leaf_sibling(3), Some(1));
    }

    #[test]
    fn contracting_the_last_pair_resets_the_root() {
        let mut t = BspTree::new(0, cube(), vec![]);
        let root = t.root();
        t.add_child(root, 1, cube(), vec![]);
        t.add_child(root, 2, cube(), vec![]);
        t.contract_leaf_pair(1, 2).unwrap();
        assert_eq!(t.leaves(), vec![1]);
        assert_eq!(t.node(t.root()).cell, 1);
    }
}
