//! Planar primitive bundles.
//!
//! A primitive is a plane, its half-space pair, its supporting point
//! group and the group's AABB. The bundle keeps the four arrays aligned;
//! the builders extend them append-only, so indices stored in tree nodes
//! never move.

use crate::bounds::Aabb;
use crate::linalg::Vec3;
use crate::plane::{Ineq, QPlane};
use crate::utils::Rng;
use crate::vertex_group::VertexGroup;
use anyhow::{ensure, Result};
use log::info;
use std::cmp::Ordering;

const SLOPE_EPSILON: f64 = 1e-4;
const SLOPE_THRESHOLD: f64 = 0.9;

/// Primitive reordering applied before construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    /// Near-vertical planes first; favours building facades.
    Vertical,
    /// Descending AABB diagonal.
    Norm,
    /// Descending AABB volume.
    Volume,
    /// Deterministic shuffle.
    Random,
}

pub struct Primitives {
    pub planes: Vec<QPlane>,
    pub halfspaces: Vec<(Ineq, Ineq)>,
    pub groups: Vec<Vec<Vec3>>,
    pub bounds: Vec<Aabb>,
}

impl Primitives {
    pub fn from_vertex_group(vg: &VertexGroup) -> Result<Self> {
        ensure!(!vg.planes.is_empty(), "no primitives to partition with");
        let mut planes = Vec::with_capacity(vg.planes.len());
        let mut halfspaces = Vec::with_capacity(vg.planes.len());
        let mut groups = Vec::with_capacity(vg.planes.len());
        let mut bounds = Vec::with_capacity(vg.planes.len());
        for (params, group) in vg.planes.iter().zip(&vg.groups) {
            let plane = QPlane::from_f32(*params)?;
            halfspaces.push(plane.halfspaces());
            planes.push(plane);
            // a group without support behaves like an additional plane:
            // it may cut anywhere
            bounds.push(if group.is_empty() {
                Aabb::infinite()
            } else {
                Aabb::from_points(group)
            });
            groups.push(group.clone());
        }
        Ok(Self {
            planes,
            halfspaces,
            groups,
            bounds,
        })
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Append planes without supporting points (missing walls the
    /// detector could not see). They carry sentinel bounds so that every
    /// cell is a candidate intersector.
    pub fn append_unbounded(&mut self, params: &[[f32; 4]]) -> Result<()> {
        for p in params {
            let plane = QPlane::from_f32(*p)?;
            self.halfspaces.push(plane.halfspaces());
            self.planes.push(plane);
            self.groups.push(Vec::new());
            self.bounds.push(Aabb::infinite());
        }
        Ok(())
    }

    /// Stable reorder of the bundle. Unbounded planes always end up in
    /// front, whatever the mode.
    pub fn prioritise(&mut self, mode: Option<Priority>, rng: &mut Rng) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        match mode {
            Some(Priority::Vertical) => {
                info!("prioritising vertical primitives");
                order.sort_by_key(|&i| !self.is_vertical(i));
            }
            Some(Priority::Norm) => {
                info!("prioritising primitives by extent");
                order.sort_by(|&i, &j| descending(self.bounds[i].diagonal(), self.bounds[j].diagonal()));
            }
            Some(Priority::Volume) => {
                info!("prioritising primitives by bound volume");
                order.sort_by(|&i, &j| descending(self.bounds[i].volume(), self.bounds[j].volume()));
            }
            Some(Priority::Random) => {
                info!("shuffling primitives");
                rng.shuffle(&mut order);
            }
            None => {}
        }
        // never miss an intersection with an unbounded plane
        order.sort_by_key(|&i| !self.bounds[i].is_infinite());

        self.planes = reorder(std::mem::take(&mut self.planes), &order);
        self.halfspaces = reorder(std::mem::take(&mut self.halfspaces), &order);
        self.groups = reorder(std::mem::take(&mut self.groups), &order);
        self.bounds = reorder(std::mem::take(&mut self.bounds), &order);
    }

    fn is_vertical(&self, i: usize) -> bool {
        let [a, b, c, _] = self.planes[i].coeffs_f64();
        let slope_squared = (a * a + b * b) / (c * c + SLOPE_EPSILON);
        slope_squared > SLOPE_THRESHOLD * SLOPE_THRESHOLD
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn reorder<T>(values: Vec<T>, order: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = values.into_iter().map(Some).collect();
    order
        .iter()
        .map(|&i| slots[i].take().expect("index repeated in permutation"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(planes: Vec<[f32; 4]>, groups: Vec<Vec<Vec3>>) -> Primitives {
        let points = groups.iter().flatten().copied().collect();
        let vg = VertexGroup {
            points,
            planes,
            groups,
        };
        Primitives::from_vertex_group(&vg).unwrap()
    }

    #[test]
    fn vertical_planes_come_first() {
        let mut prims = bundle(
            vec![[0.0, 0.0, 1.0, 0.0], [1.0, 0.0, 0.0, -0.5], [0.0, 1.0, 0.0, 0.2]],
            vec![
                vec![Vec3::new(0.0, 0.0, 0.0)],
                vec![Vec3::new(0.5, 0.0, 0.0)],
                vec![Vec3::new(0.0, -0.2, 0.0)],
            ],
        );
        prims.prioritise(Some(Priority::Vertical), &mut Rng::seeded(1));
        // the horizontal z-plane moves to the back, relative order kept
        assert_eq!(prims.planes[0].coeffs_f64(), [1.0, 0.0, 0.0, -0.5]);
        assert_eq!(prims.planes[1].coeffs_f64(), [0.0, 1.0, 0.0, 0.2]);
        assert_eq!(prims.planes[2].coeffs_f64(), [0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn norm_ordering_is_descending() {
        let big = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 4.0, 0.0)];
        let small = vec![Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 1.0, 1.0)];
        let mut prims = bundle(vec![[0.0, 0.0, 1.0, -1.0], [0.0, 0.0, 1.0, 0.0]], vec![small, big]);
        prims.prioritise(Some(Priority::Norm), &mut Rng::seeded(1));
        assert!(prims.bounds[0].diagonal() > prims.bounds[1].diagonal());
    }

    #[test]
    fn unbounded_planes_take_precedence() {
        let mut prims = bundle(
            vec![[0.0, 0.0, 1.0, 0.0]],
            vec![vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0)]],
        );
        prims.append_unbounded(&[[1.0, 0.0, 0.0, -0.25]]).unwrap();
        prims.prioritise(Some(Priority::Norm), &mut Rng::seeded(1));
        assert!(prims.bounds[0].is_infinite());
        assert!(prims.groups[0].is_empty());
        assert_eq!(prims.len(), 2);
    }
}
