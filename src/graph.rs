//! Cell adjacency graph.
//!
//! Nodes are cells of the partition, edges are shared 2D facets. Both
//! live in id-keyed tables (edge keys are ordered pairs), which keeps
//! iteration order deterministic and lets the builders address records
//! by stable cell ids while cells come and go.

use crate::linalg::QVec3;
use crate::plane::QPlane;
use crate::polyhedron::Polyhedron;
use std::collections::{BTreeMap, BTreeSet};

pub type CellId = usize;

#[derive(Clone, Debug)]
pub struct CellRecord {
    pub convex: Polyhedron,
    /// Rounded occupancy, set by the labeler.
    pub occupancy: Option<bool>,
    /// Continuous occupancy estimate from the labeler.
    pub float_occupancy: Option<f32>,
}

impl CellRecord {
    pub fn new(convex: Polyhedron) -> Self {
        Self {
            convex,
            occupancy: None,
            float_occupancy: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FacetRecord {
    /// The shared 2D polygon between the two cells.
    pub intersection: Polyhedron,
    /// Plane that carries the facet.
    pub supporting_plane: QPlane,
    /// Extra corners recovered by polygon finalization.
    pub vertices: Vec<QVec3>,
    /// True iff the union of the two cells is convex across this facet.
    pub convex_intersection: bool,
    /// Simplifier bookkeeping.
    pub processed: bool,
}

impl FacetRecord {
    pub fn new(intersection: Polyhedron, supporting_plane: QPlane, convex_intersection: bool) -> Self {
        Self {
            intersection,
            supporting_plane,
            vertices: Vec::new(),
            convex_intersection,
            processed: false,
        }
    }
}

fn key(a: CellId, b: CellId) -> (CellId, CellId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Default)]
pub struct CellGraph {
    nodes: BTreeMap<CellId, CellRecord>,
    edges: BTreeMap<(CellId, CellId), FacetRecord>,
    adjacency: BTreeMap<CellId, BTreeSet<CellId>>,
}

impl CellGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn add_node(&mut self, id: CellId, record: CellRecord) {
        self.nodes.insert(id, record);
        self.adjacency.entry(id).or_default();
    }

    pub fn node(&self, id: CellId) -> &CellRecord {
        &self.nodes[&id]
    }

    pub fn node_mut(&mut self, id: CellId) -> &mut CellRecord {
        self.nodes.get_mut(&id).expect("unknown cell id")
    }

    pub fn node_ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (CellId, &CellRecord)> {
        self.nodes.iter().map(|(id, r)| (*id, r))
    }

    pub fn add_edge(&mut self, a: CellId, b: CellId, record: FacetRecord) {
        assert_ne!(a, b, "self loop on cell {}", a);
        self.edges.insert(key(a, b), record);
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn has_edge(&self, a: CellId, b: CellId) -> bool {
        self.edges.contains_key(&key(a, b))
    }

    pub fn edge(&self, a: CellId, b: CellId) -> Option<&FacetRecord> {
        self.edges.get(&key(a, b))
    }

    pub fn edge_mut(&mut self, a: CellId, b: CellId) -> Option<&mut FacetRecord> {
        self.edges.get_mut(&key(a, b))
    }

    pub fn remove_edge(&mut self, a: CellId, b: CellId) -> Option<FacetRecord> {
        let record = self.edges.remove(&key(a, b));
        if record.is_some() {
            if let Some(s) = self.adjacency.get_mut(&a) {
                s.remove(&b);
            }
            if let Some(s) = self.adjacency.get_mut(&b) {
                s.remove(&a);
            }
        }
        record
    }

    pub fn neighbors(&self, id: CellId) -> Vec<CellId> {
        self.adjacency.get(&id).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    /// Remove a cell together with all its incident edges.
    pub fn remove_node(&mut self, id: CellId) {
        for n in self.neighbors(id) {
            self.remove_edge(id, n);
        }
        self.adjacency.remove(&id);
        self.nodes.remove(&id);
    }

    /// Snapshot of the edge keys in deterministic order.
    pub fn edge_keys(&self) -> Vec<(CellId, CellId)> {
        self.edges.keys().copied().collect()
    }

    pub fn edges(&self) -> impl Iterator<Item = ((CellId, CellId), &FacetRecord)> {
        self.edges.iter().map(|(k, r)| (*k, r))
    }

    /// Contract the edge `(keep, gone)`: `gone`'s adjacencies move onto
    /// `keep` (existing edges of `keep` win), then `gone` is removed.
    pub fn contract_edge(&mut self, keep: CellId, gone: CellId) {
        self.remove_edge(keep, gone);
        for n in self.neighbors(gone) {
            if n == keep {
                continue;
            }
            if let Some(record) = self.remove_edge(gone, n) {
                if !self.has_edge(keep, n) {
                    self.add_edge(keep, n, record);
                }
            }
        }
        self.remove_node(gone);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::QPlane;
    use crate::polyhedron::Polyhedron;
    use crate::rational::rational_from_f64;

    fn q(v: f64) -> crate::rational::Scalar {
        rational_from_f64(v).unwrap()
    }

    fn cube() -> Polyhedron {
        Polyhedron::from_bounds(&[q(0.0), q(0.0), q(0.0)], &[q(1.0), q(1.0), q(1.0)])
    }

    fn facet() -> FacetRecord {
        FacetRecord::new(cube(), QPlane::from_f32([0.0, 0.0, 1.0, 0.0]).unwrap(), false)
    }

    #[test]
    fn edges_are_undirected() {
        let mut g = CellGraph::new();
        g.add_node(1, CellRecord::new(cube()));
        g.add_node(2, CellRecord::new(cube()));
        g.add_edge(2, 1, facet());
        assert!(g.has_edge(1, 2));
        assert_eq!(g.neighbors(1), vec![2]);
        assert_eq!(g.neighbors(2), vec![1]);
    }

    #[test]
    fn removing_a_node_drops_incident_edges() {
        let mut g = CellGraph::new();
        for id in 0..3 {
            g.add_node(id, CellRecord::new(cube()));
        }
        g.add_edge(0, 1, facet());
        g.add_edge(1, 2, facet());
        g.remove_node(1);
        assert_eq!(g.num_edges(), 0);
        assert_eq!(g.len(), 2);
        assert!(g.neighbors(0).is_empty());
    }

    #[test]
    fn contraction_moves_adjacencies_without_self_loops() {
        let mut g = CellGraph::new();
        for id in 0..4 {
            g.add_node(id, CellRecord::new(cube()));
        }
        g.add_edge(0, 1, facet());
        g.add_edge(1, 2, facet());
        g.add_edge(1, 3, facet());
        g.add_edge(0, 3, facet());
        g.contract_edge(0, 1);
        assert!(!g.contains(1));
        assert!(g.has_edge(0, 2));
        assert!(g.has_edge(0, 3));
        assert_eq!(g.num_edges(), 2);
    }
}
