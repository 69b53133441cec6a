//! Cell complex from a planar primitive arrangement.
//!
//! The complex partitions a bounding polytope with the primitive planes.
//! The adaptive builder inserts planes recursively, picking at every
//! subspace the splitter that best separates the remaining primitives;
//! the exhaustive builder inserts every plane into every cell it can
//! reach and exists for benchmarking. Both maintain the adjacency graph
//! incrementally; the adaptive one additionally records the BSP tree
//! that the simplifier later walks.

use crate::bounds::Aabb;
use crate::graph::{CellGraph, CellId, CellRecord, FacetRecord};
use crate::label::Labeler;
use crate::linalg::{QVec3, Vec3};
use crate::plane::{Ineq, QPlane};
use crate::polyhedron::Polyhedron;
use crate::primitive::Primitives;
use crate::rational::{rational_from_f64, Scalar};
use crate::tree::{BspTree, Traversal};
use anyhow::{ensure, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use scoped_threadpool::Pool;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

const EPSILON: f64 = 1e-4;

/// Splitter selection inside a subspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneOrder {
    /// Score every candidate and take the best separator.
    Optimal,
    /// Take candidates in input order.
    Input,
}

pub struct CellComplex {
    // running primitive arrays; splitting appends, never reorders
    planes: Vec<QPlane>,
    halfspaces: Vec<(Ineq, Ineq)>,
    point_groups: Vec<Vec<Vec3>>,
    bounds: Vec<Aabb>,
    split_counts: Vec<u32>,
    initial_planes: usize,

    bounding_poly: Polyhedron,
    graph: CellGraph,
    tree: Option<BspTree>,
    next_cell_id: CellId,
    split_total: usize,
    constructed: bool,
    polygons_initialized: bool,
}

/// Padded AABB of the union point cloud; the initial partition volume.
pub fn initial_bound(points: &[Vec3], padding: f64) -> Result<Aabb> {
    ensure!(!points.is_empty(), "cannot bound an empty point cloud");
    let bound = Aabb::from_points(points);
    let extent = bound.extent();
    ensure!(
        extent.x > 0.0 && extent.y > 0.0 && extent.z > 0.0,
        "point cloud is degenerate, bounding box has no volume"
    );
    Ok(bound.padded(padding))
}

impl CellComplex {
    pub fn new(primitives: Primitives, bound: Aabb) -> Result<Self> {
        ensure!(!primitives.is_empty(), "no primitives to partition with");
        let min = exact_point(bound.min)?;
        let max = exact_point(bound.max)?;
        let bounding_poly = Polyhedron::from_bounds(&min, &max);
        ensure!(bounding_poly.dim() == 3, "initial bound is not a volume");
        debug!("initial bound {:?} .. {:?}", bound.min, bound.max);

        let mut graph = CellGraph::new();
        graph.add_node(0, CellRecord::new(bounding_poly.clone()));

        let initial_planes = primitives.len();
        Ok(Self {
            split_counts: vec![0; initial_planes],
            planes: primitives.planes,
            halfspaces: primitives.halfspaces,
            point_groups: primitives.groups,
            bounds: primitives.bounds,
            initial_planes,
            bounding_poly,
            graph,
            tree: None,
            next_cell_id: 0,
            split_total: 0,
            constructed: false,
            polygons_initialized: false,
        })
    }

    pub fn graph(&self) -> &CellGraph {
        &self.graph
    }

    pub fn tree(&self) -> Option<&BspTree> {
        self.tree.as_ref()
    }

    pub fn bounding_poly(&self) -> &Polyhedron {
        &self.bounding_poly
    }

    pub fn num_cells(&self) -> usize {
        self.graph.len()
    }

    /// Number of primitives, including clones created by splitting.
    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn split_counts(&self) -> &[u32] {
        &self.split_counts
    }

    pub fn split_total(&self) -> usize {
        self.split_total
    }

    pub fn point_groups(&self) -> &[Vec<Vec3>] {
        &self.point_groups
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Polyhedron)> {
        self.graph.nodes().map(|(id, record)| (id, &record.convex))
    }

    /// Exact cell volumes, in cell id order.
    pub fn volumes(&self) -> Vec<Scalar> {
        self.cells().map(|(_, convex)| convex.volume()).collect()
    }

    pub fn occupancy(&self, id: CellId) -> Option<bool> {
        self.graph.node(id).occupancy
    }

    pub fn set_occupancy(&mut self, id: CellId, occupancy: bool) {
        let node = self.graph.node_mut(id);
        node.occupancy = Some(occupancy);
        node.float_occupancy = Some(occupancy as u8 as f32);
    }

    pub fn print_info(&self) {
        info!("number of planes: {}", self.num_planes());
        info!("number of cells: {}", self.num_cells());
    }

    /// Round and store the labeler's occupancy estimates.
    pub fn label_cells(&mut self, labeler: &dyn Labeler, n_test_points: usize) -> Result<()> {
        let ids: Vec<CellId> = self.graph.node_ids().collect();
        let occupancies = {
            let cells: Vec<&Polyhedron> = ids.iter().map(|&id| &self.graph.node(id).convex).collect();
            labeler.label(&cells, n_test_points)?
        };
        ensure!(
            occupancies.len() == ids.len(),
            "labeler returned {} occupancies for {} cells",
            occupancies.len(),
            ids.len()
        );
        for (id, occ) in ids.into_iter().zip(occupancies) {
            let node = self.graph.node_mut(id);
            node.float_occupancy = Some(occ);
            node.occupancy = Some(occ >= 0.5);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // adaptive construction

    /// Build the partition by recursive best-plane insertion.
    pub fn construct_partition(&mut self, mode: Traversal, order: PlaneOrder, th: usize) -> Result<()> {
        ensure!(!self.constructed, "complex already constructed");
        ensure!(th >= 1, "split threshold must be at least 1");
        info!("constructing adaptive cell complex over {} primitives", self.initial_planes);

        let root_ids: Vec<usize> = (0..self.planes.len()).collect();
        let mut tree = BspTree::new(0, self.bounding_poly.clone(), root_ids);
        let mut worklist: VecDeque<usize> = VecDeque::new();
        worklist.push_back(tree.root());

        while let Some(slot) = match mode {
            Traversal::Depth => worklist.pop_back(),
            Traversal::Width => worklist.pop_front(),
        } {
            let (cell_id, current_ids) = {
                let node = tree.node(slot);
                (node.cell, node.plane_ids.clone())
            };
            if current_ids.is_empty() {
                continue;
            }

            let best_index = match order {
                PlaneOrder::Optimal => self.best_plane(&current_ids),
                PlaneOrder::Input => 0,
            };
            let best_id = current_ids[best_index];

            let (left_ids, right_ids) = self.split_planes(best_index, &current_ids, th)?;

            let current_cell = tree.node(slot).convex.clone();
            let (hspace_positive, hspace_negative) = self.halfspaces[best_id].clone();
            let cell_negative = current_cell.intersection_with(&hspace_negative);
            let cell_positive = current_cell.intersection_with(&hspace_positive);

            let mut negative_id = None;
            if cell_negative.dim() == 3 {
                self.next_cell_id += 1;
                let id = self.next_cell_id;
                let child = tree.add_child(slot, id, cell_negative.clone(), left_ids);
                self.graph.add_node(id, CellRecord::new(cell_negative.clone()));
                negative_id = Some((id, child));
            }
            let mut positive_id = None;
            if cell_positive.dim() == 3 {
                self.next_cell_id += 1;
                let id = self.next_cell_id;
                let child = tree.add_child(slot, id, cell_positive.clone(), right_ids);
                self.graph.add_node(id, CellRecord::new(cell_positive.clone()));
                positive_id = Some((id, child));
            }

            if let (Some((neg, _)), Some((pos, _))) = (&negative_id, &positive_id) {
                let facet = cell_negative.intersection(&cell_positive);
                debug_assert_eq!(facet.dim(), 2);
                self.graph
                    .add_edge(*neg, *pos, FacetRecord::new(facet, self.planes[best_id].clone(), true));
            }

            // connect the children to the old cell's neighbours
            for m in self.graph.neighbors(cell_id) {
                let old = self.graph.edge(cell_id, m).expect("adjacency without edge").clone();
                let m_convex = self.graph.node(m).convex.clone();
                if let Some((neg, _)) = negative_id {
                    self.inherit_edge(m, neg, &m_convex, &cell_negative, &old);
                }
                if let Some((pos, _)) = positive_id {
                    self.inherit_edge(m, pos, &m_convex, &cell_positive, &old);
                }
            }
            self.graph.remove_node(cell_id);

            // children are visited in creation order (negative first)
            match mode {
                Traversal::Depth => {
                    if let Some((_, child)) = positive_id {
                        worklist.push_back(child);
                    }
                    if let Some((_, child)) = negative_id {
                        worklist.push_back(child);
                    }
                }
                Traversal::Width => {
                    if let Some((_, child)) = negative_id {
                        worklist.push_back(child);
                    }
                    if let Some((_, child)) = positive_id {
                        worklist.push_back(child);
                    }
                }
            }
        }

        self.tree = Some(tree);
        self.constructed = true;
        self.polygons_initialized = true;
        info!(
            "out of {} planes {} were split, making a total of {} planes now",
            self.initial_planes,
            self.split_total,
            self.planes.len()
        );
        Ok(())
    }

    /// Index into `current_ids` of the best splitter.
    ///
    /// A plane that separates all other primitives without splitting any
    /// wins immediately; otherwise the product of left and right
    /// separation counts is maximised. Ties keep the lowest index.
    fn best_plane(&self, current_ids: &[usize]) -> usize {
        let n = current_ids.len();
        let mut best = 0usize;
        let mut best_score = None;
        for (i, &id) in current_ids.iter().enumerate() {
            let mut left = 0usize;
            let mut right = 0usize;
            for &other in current_ids {
                if other == id {
                    continue;
                }
                let group = &self.point_groups[other];
                if group.iter().all(|&p| self.planes[id].eval_f64(p) < 0.0) {
                    left += 1;
                } else if group.iter().all(|&p| self.planes[id].eval_f64(p) > 0.0) {
                    right += 1;
                }
            }
            if left == n - 1 || right == n - 1 {
                return i;
            }
            let score = left * right;
            if best_score.map_or(true, |s| score > s) {
                best_score = Some(score);
                best = i;
            }
        }
        best
    }

    /// Distribute the remaining primitives into the two half-spaces of
    /// the chosen splitter, cloning the ones that straddle it.
    fn split_planes(
        &mut self,
        best_index: usize,
        current_ids: &[usize],
        th: usize,
    ) -> Result<(Vec<usize>, Vec<usize>)> {
        let best_id = current_ids[best_index];
        let best_plane = self.planes[best_id].clone();

        let mut left_ids = Vec::new();
        let mut right_ids = Vec::new();
        for &id in current_ids {
            if id == best_id {
                continue;
            }
            let group = &self.point_groups[id];
            let n = group.len();
            ensure!(
                n > th,
                "primitive {} has {} supporting points, not above the split threshold {}",
                id,
                n,
                th
            );
            let mut left_points = Vec::new();
            let mut right_points = Vec::new();
            for &p in group {
                let side = best_plane.eval_f64(p);
                if side < 0.0 {
                    left_points.push(p);
                } else if side > 0.0 {
                    right_points.push(p);
                }
            }
            let (nl, nr) = (left_points.len(), right_points.len());
            if n - nl < th {
                // effectively entirely on the left; drop the stragglers
                left_ids.push(id);
                self.point_groups[id] = left_points;
            } else if n - nr < th {
                right_ids.push(id);
                self.point_groups[id] = right_points;
            } else {
                if nl > th {
                    left_ids.push(self.clone_primitive(id, left_points));
                }
                if nr > th {
                    right_ids.push(self.clone_primitive(id, right_points));
                }
                self.split_total += 1;
            }
        }
        Ok((left_ids, right_ids))
    }

    fn clone_primitive(&mut self, id: usize, points: Vec<Vec3>) -> usize {
        let new_id = self.planes.len();
        self.planes.push(self.planes[id].clone());
        self.halfspaces.push(self.halfspaces[id].clone());
        self.bounds.push(Aabb::from_points(&points));
        self.split_counts.push(self.split_counts[id] + 1);
        self.point_groups.push(points);
        new_id
    }

    /// Carry an edge of the removed parent over to a surviving child.
    /// The convexity flag only survives when the facet is unchanged.
    fn inherit_edge(&mut self, m: CellId, child: CellId, m_convex: &Polyhedron, child_convex: &Polyhedron, old: &FacetRecord) {
        let facet = m_convex.intersection(child_convex);
        if facet.dim() == 2 {
            let convex_intersection = old.convex_intersection && facet.same_as(&old.intersection);
            self.graph
                .add_edge(m, child, FacetRecord::new(facet, old.supporting_plane.clone(), convex_intersection));
        }
    }

    // ------------------------------------------------------------------
    // exhaustive construction

    /// Insert every primitive into every cell it intersects, in input
    /// order. Benchmarking baseline for the adaptive builder.
    ///
    /// With `num_workers > 0` the per-neighbour adjacency tests of each
    /// split run on a worker pool; graph writes stay on the caller
    /// thread.
    pub fn construct_exhaustive(&mut self, num_workers: usize) -> Result<()> {
        ensure!(!self.constructed, "complex already constructed");
        info!("constructing exhaustive cell complex over {} primitives", self.initial_planes);

        let mut pool = if num_workers > 0 {
            Some(Pool::new(num_workers as u32))
        } else {
            None
        };

        let mut cells_bounds: BTreeMap<CellId, Aabb> = BTreeMap::new();
        cells_bounds.insert(0, self.bounding_poly.bbox());

        for i in 0..self.initial_planes {
            let candidates = self.candidate_cells(i, &cells_bounds);
            ensure!(
                !candidates.is_empty(),
                "no candidate cells for primitive {}; check the initial bound",
                i
            );

            let (hspace_positive, hspace_negative) = self.halfspaces[i].clone();
            let mut parents = Vec::new();
            for cell_id in candidates {
                let cell = self.graph.node(cell_id).convex.clone();
                let cell_positive = cell.intersection_with(&hspace_positive);
                let cell_negative = cell.intersection_with(&hspace_negative);
                if cell_positive.dim() != 3 || cell_negative.dim() != 3 {
                    // the plane does not actually cut this cell
                    continue;
                }

                let positive_id = self.next_cell_id + 1;
                let negative_id = self.next_cell_id + 2;
                self.next_cell_id += 2;
                self.graph.add_node(positive_id, CellRecord::new(cell_positive.clone()));
                self.graph.add_node(negative_id, CellRecord::new(cell_negative.clone()));
                let facet = cell_positive.intersection(&cell_negative);
                self.graph
                    .add_edge(positive_id, negative_id, FacetRecord::new(facet, self.planes[i].clone(), true));

                let tasks: Vec<NeighbourTask> = self
                    .graph
                    .neighbors(cell_id)
                    .into_iter()
                    .map(|m| {
                        let old = self.graph.edge(cell_id, m).expect("adjacency without edge");
                        NeighbourTask {
                            neighbour: m,
                            convex: self.graph.node(m).convex.clone(),
                            supporting_plane: old.supporting_plane.clone(),
                            convex_intersection: old.convex_intersection,
                            facet: old.intersection.clone(),
                        }
                    })
                    .collect();

                let results = match pool.as_mut() {
                    Some(pool) if tasks.len() > 1 => {
                        let collected = Mutex::new(Vec::with_capacity(tasks.len()));
                        let chunk_size = (tasks.len() + num_workers - 1) / num_workers;
                        pool.scoped(|scope| {
                            for chunk in tasks.chunks(chunk_size) {
                                let collected = &collected;
                                let positive = &cell_positive;
                                let negative = &cell_negative;
                                scope.execute(move || {
                                    let mut local: Vec<_> = chunk
                                        .iter()
                                        .map(|t| t.intersect(positive, negative))
                                        .collect();
                                    collected.lock().append(&mut local);
                                });
                            }
                        });
                        let mut results = collected.into_inner();
                        results.sort_by_key(|r| r.0);
                        results
                    }
                    _ => tasks.iter().map(|t| t.intersect(&cell_positive, &cell_negative)).collect(),
                };
                for (m, to_positive, to_negative) in results {
                    if let Some(record) = to_positive {
                        self.graph.add_edge(m, positive_id, record);
                    }
                    if let Some(record) = to_negative {
                        self.graph.add_edge(m, negative_id, record);
                    }
                }

                cells_bounds.insert(positive_id, cell_positive.bbox());
                cells_bounds.insert(negative_id, cell_negative.bbox());
                parents.push(cell_id);
            }

            for parent in parents {
                self.graph.remove_node(parent);
                cells_bounds.remove(&parent);
            }
        }

        self.constructed = true;
        self.polygons_initialized = true;
        self.print_info();
        Ok(())
    }

    /// Cells whose bounds overlap the primitive's bounds and straddle
    /// its plane. Unbounded primitives intersect everything.
    fn candidate_cells(&self, i: usize, cells_bounds: &BTreeMap<CellId, Aabb>) -> Vec<CellId> {
        if self.bounds[i].is_infinite() {
            return cells_bounds.keys().copied().collect();
        }
        let plane = self.planes[i].coeffs_f64();
        cells_bounds
            .iter()
            .filter(|(_, b)| b.overlaps(&self.bounds[i], EPSILON) && b.intersects_plane(&plane, EPSILON))
            .map(|(&id, _)| id)
            .collect()
    }

    // ------------------------------------------------------------------
    // polygon finalization

    /// Recompute every facet polygon and clear the recovered vertices.
    pub fn init_polygons(&mut self) {
        for (a, b) in self.graph.edge_keys() {
            let facet = self.graph.node(a).convex.intersection(&self.graph.node(b).convex);
            let edge = self.graph.edge_mut(a, b).expect("edge vanished");
            edge.intersection = facet;
            edge.vertices.clear();
        }
        self.polygons_initialized = true;
    }

    /// Recover facet corners that T-junctions with neighbours of
    /// neighbours introduced. Only boundary facets (edges with opposite
    /// occupancy) need complete corner lists.
    pub fn construct_polygons(&mut self) {
        if !self.polygons_initialized {
            self.init_polygons();
        }
        for (a, b) in self.graph.edge_keys() {
            let occ_a = self.graph.node(a).occupancy;
            let occ_b = self.graph.node(b).occupancy;
            if occ_a.is_none() || occ_b.is_none() || occ_a == occ_b {
                continue;
            }
            self.recover_corners(a, b);
            self.recover_corners(b, a);
        }
    }

    fn recover_corners(&mut self, a: CellId, b: CellId) {
        for m in self.graph.neighbors(a) {
            if m == b {
                continue;
            }
            let shared = {
                let current = &self.graph.edge(a, b).expect("edge vanished").intersection;
                let other = &self.graph.edge(a, m).expect("adjacency without edge").intersection;
                current.intersection(other)
            };
            if shared.dim() == 0 || shared.dim() == 1 {
                let corners: Vec<QVec3> = shared.vertices().to_vec();
                push_unique(&mut self.graph.edge_mut(a, b).expect("edge vanished").vertices, &corners);
                push_unique(&mut self.graph.edge_mut(a, m).expect("edge vanished").vertices, &corners);
            }
        }
    }

    // ------------------------------------------------------------------
    // simplification

    /// Contract same-occupancy neighbours across convex interfaces until
    /// none remain.
    ///
    /// Sibling leaves reuse the parent's stored convex (the hull by
    /// construction) and keep the tree-leaf/graph-node bijection intact;
    /// contracting a non-sibling pair has no tree counterpart, so the
    /// tree is dropped when that happens.
    pub fn simplify(&mut self) {
        loop {
            let qualifying = self.qualifying_edges();
            if qualifying.is_empty() {
                break;
            }
            let mut deleted: BTreeSet<CellId> = BTreeSet::new();
            for (a, b) in qualifying {
                if deleted.contains(&a) || deleted.contains(&b) || !self.graph.has_edge(a, b) {
                    continue;
                }
                self.contract(a, b);
                deleted.insert(b);
            }
        }
        self.init_polygons();
    }

    /// Single sweep of [`CellComplex::simplify`]: contract what the
    /// current edge list offers, without rescanning.
    pub fn collapse_convex_intersections(&mut self) {
        let mut deleted: BTreeSet<CellId> = BTreeSet::new();
        for (a, b) in self.qualifying_edges() {
            if deleted.contains(&a) || deleted.contains(&b) || !self.graph.has_edge(a, b) {
                continue;
            }
            self.contract(a, b);
            deleted.insert(b);
        }
        self.init_polygons();
    }

    fn qualifying_edges(&self) -> Vec<(CellId, CellId)> {
        self.graph
            .edges()
            .filter(|((a, b), record)| {
                record.convex_intersection
                    && self.graph.node(*a).occupancy.is_some()
                    && self.graph.node(*a).occupancy == self.graph.node(*b).occupancy
            })
            .map(|(key, _)| key)
            .collect()
    }

    fn contract(&mut self, a: CellId, b: CellId) {
        let merged = match self.tree.as_mut().and_then(|t| t.contract_leaf_pair(a, b)) {
            Some(parent_convex) => parent_convex,
            None => {
                let hull = self.graph.node(a).convex.convex_hull(&self.graph.node(b).convex);
                if self.tree.take().is_some() {
                    debug!("dropping the partition tree after a non-sibling contraction");
                }
                hull
            }
        };
        self.graph.contract_edge(a, b);
        self.graph.node_mut(a).convex = merged;

        // the merged cell and its new tree sibling may now qualify too
        if let Some(sibling) = self.tree.as_ref().and_then(|t| t.leaf_sibling(a)) {
            if let Some(edge) = self.graph.edge_mut(a, sibling) {
                edge.convex_intersection = true;
                edge.processed = false;
            }
        }
    }
}

fn exact_point(p: Vec3) -> Result<[Scalar; 3]> {
    Ok([rational_from_f64(p.x)?, rational_from_f64(p.y)?, rational_from_f64(p.z)?])
}

fn push_unique(list: &mut Vec<QVec3>, corners: &[QVec3]) {
    for corner in corners {
        if !list.contains(corner) {
            list.push(corner.clone());
        }
    }
}

struct NeighbourTask {
    neighbour: CellId,
    convex: Polyhedron,
    supporting_plane: QPlane,
    convex_intersection: bool,
    facet: Polyhedron,
}

impl NeighbourTask {
    /// Adjacency test of one old neighbour against both children. An
    /// uncut neighbour connects with exactly one child; a cut one with
    /// both.
    fn intersect(
        &self,
        positive: &Polyhedron,
        negative: &Polyhedron,
    ) -> (CellId, Option<FacetRecord>, Option<FacetRecord>) {
        let record = |facet: Polyhedron| {
            let convex_intersection = self.convex_intersection && facet.same_as(&self.facet);
            FacetRecord::new(facet, self.supporting_plane.clone(), convex_intersection)
        };

        let to_positive = positive.intersection(&self.convex);
        if to_positive.dim() == 2 {
            let to_negative = negative.intersection(&self.convex);
            let negative_record = if to_negative.dim() == 2 {
                Some(record(to_negative))
            } else {
                None
            };
            (self.neighbour, Some(record(to_positive)), negative_record)
        } else {
            let to_negative = negative.intersection(&self.convex);
            if to_negative.dim() != 2 {
                warn!("neighbour {} lost contact with both children", self.neighbour);
                return (self.neighbour, None, None);
            }
            (self.neighbour, None, Some(record(to_negative)))
        }
    }
}
