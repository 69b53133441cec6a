//! Exact convex polyhedra.
//!
//! A polyhedron is held in H-representation (rational half-spaces) with
//! an eagerly enumerated V-representation. Every predicate the partition
//! relies on (`dim`, intersection, equality, volume) is decided over
//! `BigRational`, so degenerate contacts (shared faces, edges, corners)
//! are classified exactly instead of by epsilon.
//!
//! The kernel assumes bounded input: every polyhedron built by the crate
//! contains the bounding-box inequalities, so the vertex set determines
//! the set. Unbounded inequality systems are outside the contract.

use crate::bounds::Aabb;
use crate::linalg::{det3, QVec3};
use crate::plane::Ineq;
use crate::rational::Scalar;
use itertools::Itertools;
use num::{BigInt, Signed, Zero};
use std::cmp::Ordering;

#[derive(Clone, Debug)]
pub struct Polyhedron {
    ineqs: Vec<Ineq>,
    vertices: Vec<QVec3>,
    dim: i32,
}

impl Polyhedron {
    /// Axis-aligned box `[min, max]`.
    pub fn from_bounds(min: &[Scalar; 3], max: &[Scalar; 3]) -> Polyhedron {
        let one = Scalar::from_integer(BigInt::from(1));
        let zero = Scalar::zero();
        let mut ineqs = Vec::with_capacity(6);
        for axis in 0..3 {
            let mut lo = [zero.clone(), zero.clone(), zero.clone()];
            lo[axis] = one.clone();
            // x_axis - min_axis >= 0
            ineqs.push(Ineq::new(lo[0].clone(), lo[1].clone(), lo[2].clone(), -min[axis].clone()));
            // max_axis - x_axis >= 0
            ineqs.push(Ineq::new(-lo[0].clone(), -lo[1].clone(), -lo[2].clone(), max[axis].clone()));
        }
        Self::from_ineqs(ineqs)
    }

    /// Intersection of the given half-spaces.
    pub fn from_ineqs(raw: Vec<Ineq>) -> Polyhedron {
        let mut ineqs = Vec::with_capacity(raw.len());
        for q in &raw {
            if q.is_degenerate() {
                if q.d.is_negative() {
                    // trivially infeasible constraint
                    return Polyhedron {
                        ineqs: vec![q.canonical()],
                        vertices: Vec::new(),
                        dim: -1,
                    };
                }
                continue; // trivially true
            }
            ineqs.push(q.canonical());
        }
        ineqs.sort();
        ineqs.dedup();

        let mut vertices = enumerate_vertices(&ineqs);
        vertices.sort();
        vertices.dedup();

        if !vertices.is_empty() {
            // Inequalities slack at every vertex are redundant for a
            // bounded polytope and only slow further intersections down.
            ineqs.retain(|q| vertices.iter().any(|v| q.eval(v).is_zero()));
        }

        let dim = affine_rank(&vertices);
        Polyhedron { ineqs, vertices, dim }
    }

    /// Dimension of the polyhedron: -1 (empty), 0, 1, 2 or 3.
    pub fn dim(&self) -> i32 {
        self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.dim < 0
    }

    pub fn vertices(&self) -> &[QVec3] {
        &self.vertices
    }

    pub fn ineqs(&self) -> &[Ineq] {
        &self.ineqs
    }

    pub fn intersection(&self, other: &Polyhedron) -> Polyhedron {
        let mut ineqs = self.ineqs.clone();
        ineqs.extend_from_slice(&other.ineqs);
        Self::from_ineqs(ineqs)
    }

    pub fn intersection_with(&self, halfspace: &Ineq) -> Polyhedron {
        let mut ineqs = self.ineqs.clone();
        ineqs.push(halfspace.clone());
        Self::from_ineqs(ineqs)
    }

    /// Exact membership.
    pub fn contains(&self, p: &QVec3) -> bool {
        self.ineqs.iter().all(|q| !q.eval(p).is_negative())
    }

    /// Centroid of the vertex set.
    pub fn center(&self) -> QVec3 {
        assert!(!self.vertices.is_empty(), "center of an empty polyhedron");
        let mut sum = QVec3::zero();
        for v in &self.vertices {
            sum = &sum + v;
        }
        let n = Scalar::from_integer(BigInt::from(self.vertices.len()));
        QVec3::new(&sum.x / &n, &sum.y / &n, &sum.z / &n)
    }

    /// Float bounding box of the vertex set.
    pub fn bbox(&self) -> Aabb {
        let mut b = Aabb::empty();
        for v in &self.vertices {
            b.grow(v.to_f64());
        }
        b
    }

    /// Two polyhedra are the same set iff they have the same vertices.
    pub fn same_as(&self, other: &Polyhedron) -> bool {
        self.vertices == other.vertices
    }

    /// Vertex index cycles of the 2-faces, each in convex boundary order.
    pub fn facets(&self) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        for q in &self.ineqs {
            let tight: Vec<usize> = (0..self.vertices.len())
                .filter(|&i| q.eval(&self.vertices[i]).is_zero())
                .collect();
            if tight.len() < 3 {
                continue;
            }
            let cycle = order_cycle(&self.vertices, &tight, &q.normal());
            if cycle.len() >= 3 && !out.contains(&cycle) {
                out.push(cycle);
            }
        }
        out
    }

    /// Exact volume; zero for anything below dimension 3.
    pub fn volume(&self) -> Scalar {
        if self.dim < 3 {
            return Scalar::zero();
        }
        let apex = self.center();
        let mut six_vol = Scalar::zero();
        for cycle in self.facets() {
            let p0 = &self.vertices[cycle[0]] - &apex;
            for w in 1..cycle.len() - 1 {
                let p1 = &self.vertices[cycle[w]] - &apex;
                let p2 = &self.vertices[cycle[w + 1]] - &apex;
                six_vol += det3(&p0, &p1, &p2).abs();
            }
        }
        six_vol / Scalar::from_integer(BigInt::from(6))
    }

    /// Convex hull of the union of two polyhedra.
    ///
    /// Supporting planes are recovered combinatorially from the merged
    /// vertex sets; intended for full-dimensional operands (cell merges).
    pub fn convex_hull(&self, other: &Polyhedron) -> Polyhedron {
        let mut pts: Vec<QVec3> = self.vertices.iter().chain(other.vertices.iter()).cloned().collect();
        pts.sort();
        pts.dedup();

        let mut ineqs = Vec::new();
        for (pi, pj, pk) in pts.iter().tuple_combinations() {
            let n = (pj - pi).cross(&(pk - pi));
            if n.is_zero() {
                continue;
            }
            let d = -n.dot(pi);
            let candidate = Ineq::new(n.x.clone(), n.y.clone(), n.z.clone(), d);
            let mut above = false;
            let mut below = false;
            for p in &pts {
                let s = candidate.eval(p);
                above |= s.is_positive();
                below |= s.is_negative();
                if above && below {
                    break;
                }
            }
            if !below {
                ineqs.push(candidate.canonical());
            } else if !above {
                ineqs.push(candidate.negated().canonical());
            }
        }
        ineqs.sort();
        ineqs.dedup();
        Self::from_ineqs(ineqs)
    }
}

/// All intersection points of inequality-boundary triples that satisfy
/// the whole system.
fn enumerate_vertices(ineqs: &[Ineq]) -> Vec<QVec3> {
    let mut out = Vec::new();
    for (qi, qj, qk) in ineqs.iter().tuple_combinations() {
        let (ni, nj, nk) = (qi.normal(), qj.normal(), qk.normal());
        let det = det3(&ni, &nj, &nk);
        if det.is_zero() {
            continue;
        }
        // Cramer on the system n_t . x = -d_t
        let rhs = |q: &Ineq| -> Scalar { -&q.d };
        let dx = det3(
            &QVec3::new(rhs(qi), ni.y.clone(), ni.z.clone()),
            &QVec3::new(rhs(qj), nj.y.clone(), nj.z.clone()),
            &QVec3::new(rhs(qk), nk.y.clone(), nk.z.clone()),
        );
        let dy = det3(
            &QVec3::new(ni.x.clone(), rhs(qi), ni.z.clone()),
            &QVec3::new(nj.x.clone(), rhs(qj), nj.z.clone()),
            &QVec3::new(nk.x.clone(), rhs(qk), nk.z.clone()),
        );
        let dz = det3(
            &QVec3::new(ni.x.clone(), ni.y.clone(), rhs(qi)),
            &QVec3::new(nj.x.clone(), nj.y.clone(), rhs(qj)),
            &QVec3::new(nk.x.clone(), nk.y.clone(), rhs(qk)),
        );
        let p = QVec3::new(&dx / &det, &dy / &det, &dz / &det);
        if ineqs.iter().all(|q| !q.eval(&p).is_negative()) {
            out.push(p);
        }
    }
    out
}

/// Affine rank of a point set: 0 for a point, up to 3 for full dimension;
/// -1 for the empty set.
fn affine_rank(vertices: &[QVec3]) -> i32 {
    if vertices.is_empty() {
        return -1;
    }
    let origin = &vertices[0];
    let mut basis: Vec<QVec3> = Vec::new();
    for v in &vertices[1..] {
        let mut w = v - origin;
        for b in &basis {
            let pivot = pivot_index(b);
            if !w[pivot].is_zero() {
                let factor = &w[pivot] / &b[pivot];
                w = &w - &b.scale(&factor);
            }
        }
        if !w.is_zero() {
            basis.push(w);
            if basis.len() == 3 {
                break;
            }
        }
    }
    basis.len() as i32
}

fn pivot_index(v: &QVec3) -> usize {
    for i in 0..3 {
        if !v[i].is_zero() {
            return i;
        }
    }
    0
}

/// Order coplanar vertices into a convex cycle, exactly.
///
/// Projects along the dominant normal axis and sorts around the 2D
/// centroid with sign-of-cross comparisons; no trigonometry involved.
fn order_cycle(vertices: &[QVec3], tight: &[usize], normal: &QVec3) -> Vec<usize> {
    let drop = {
        let (ax, ay, az) = (normal.x.abs(), normal.y.abs(), normal.z.abs());
        if ax >= ay && ax >= az {
            0
        } else if ay >= az {
            1
        } else {
            2
        }
    };
    let (u_axis, v_axis) = match drop {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };

    let coords: Vec<(Scalar, Scalar)> = tight
        .iter()
        .map(|&i| (vertices[i][u_axis].clone(), vertices[i][v_axis].clone()))
        .collect();
    let n = Scalar::from_integer(BigInt::from(coords.len()));
    let cu = coords.iter().fold(Scalar::zero(), |acc, c| acc + &c.0) / &n;
    let cv = coords.iter().fold(Scalar::zero(), |acc, c| acc + &c.1) / &n;

    let offsets: Vec<(Scalar, Scalar)> = coords.iter().map(|(u, v)| (u - &cu, v - &cv)).collect();
    let half = |p: &(Scalar, Scalar)| -> u8 {
        if p.1.is_negative() || (p.1.is_zero() && p.0.is_negative()) {
            1
        } else {
            0
        }
    };

    let mut order: Vec<usize> = (0..tight.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, pb) = (&offsets[a], &offsets[b]);
        match half(pa).cmp(&half(pb)) {
            Ordering::Equal => {
                let cross = &pa.0 * &pb.1 - &pa.1 * &pb.0;
                if cross.is_positive() {
                    Ordering::Less
                } else if cross.is_negative() {
                    Ordering::Greater
                } else {
                    tight[a].cmp(&tight[b])
                }
            }
            other => other,
        }
    });
    order.into_iter().map(|i| tight[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::QPlane;
    use crate::rational::{rational_from_f64, to_f64};

    fn q(v: f64) -> Scalar {
        rational_from_f64(v).unwrap()
    }

    fn unit_cube() -> Polyhedron {
        Polyhedron::from_bounds(&[q(0.0), q(0.0), q(0.0)], &[q(1.0), q(1.0), q(1.0)])
    }

    #[test]
    fn cube_has_eight_vertices_and_unit_volume() {
        let cube = unit_cube();
        assert_eq!(cube.dim(), 3);
        assert_eq!(cube.vertices().len(), 8);
        assert_eq!(cube.volume(), q(1.0));
        assert_eq!(cube.center(), QVec3::new(q(0.5), q(0.5), q(0.5)));
        assert_eq!(cube.facets().len(), 6);
    }

    #[test]
    fn halfspace_cut_is_exact() {
        let cube = unit_cube();
        let plane = QPlane::from_f32([0.0, 0.0, 1.0, -0.5]).unwrap();
        let (pos, neg) = plane.halfspaces();
        let upper = cube.intersection_with(&pos);
        let lower = cube.intersection_with(&neg);
        assert_eq!(upper.dim(), 3);
        assert_eq!(lower.dim(), 3);
        assert_eq!(upper.volume(), q(0.5));
        assert_eq!(lower.volume(), q(0.5));
        assert_eq!(&upper.volume() + &lower.volume(), cube.volume());
    }

    #[test]
    fn shared_face_has_dimension_two() {
        let cube = unit_cube();
        let plane = QPlane::from_f32([0.0, 0.0, 1.0, -0.5]).unwrap();
        let (pos, neg) = plane.halfspaces();
        let upper = cube.intersection_with(&pos);
        let lower = cube.intersection_with(&neg);
        let face = upper.intersection(&lower);
        assert_eq!(face.dim(), 2);
        assert_eq!(face.vertices().len(), 4);
    }

    #[test]
    fn degenerate_intersections_report_their_dimension() {
        let a = unit_cube();
        let shifted = |dx: f64, dy: f64| {
            Polyhedron::from_bounds(&[q(1.0), q(dx), q(dy)], &[q(2.0), q(dx + 1.0), q(dy + 1.0)])
        };
        // face contact
        assert_eq!(a.intersection(&shifted(0.0, 0.0)).dim(), 2);
        // edge contact
        assert_eq!(a.intersection(&shifted(1.0, 0.0)).dim(), 1);
        // corner contact
        assert_eq!(a.intersection(&shifted(1.0, 1.0)).dim(), 0);
        // no contact
        let far = Polyhedron::from_bounds(&[q(5.0), q(5.0), q(5.0)], &[q(6.0), q(6.0), q(6.0)]);
        assert_eq!(a.intersection(&far).dim(), -1);
        assert!(a.intersection(&far).is_empty());
    }

    #[test]
    fn oblique_cut_volumes_sum_exactly() {
        let cube = unit_cube();
        let plane = QPlane::from_f32([1.0, 1.0, 1.0, -1.2]).unwrap();
        let (pos, neg) = plane.halfspaces();
        let a = cube.intersection_with(&pos);
        let b = cube.intersection_with(&neg);
        assert_eq!(a.dim(), 3);
        assert_eq!(b.dim(), 3);
        assert_eq!(&a.volume() + &b.volume(), q(1.0));
    }

    #[test]
    fn hull_of_two_half_cubes_is_the_cube() {
        let cube = unit_cube();
        let plane = QPlane::from_f32([0.0, 0.0, 1.0, -0.5]).unwrap();
        let (pos, neg) = plane.halfspaces();
        let upper = cube.intersection_with(&pos);
        let lower = cube.intersection_with(&neg);
        let hull = lower.convex_hull(&upper);
        assert_eq!(hull.dim(), 3);
        assert!(hull.same_as(&cube));
        assert_eq!(hull.volume(), q(1.0));
    }

    #[test]
    fn bbox_matches_vertices() {
        let cube = unit_cube();
        let b = cube.bbox();
        assert_eq!(to_f64(&q(0.0)), b.min.x);
        assert_eq!(b.max.z, 1.0);
    }

    #[test]
    fn contains_is_exact_on_the_boundary() {
        let cube = unit_cube();
        assert!(cube.contains(&QVec3::new(q(0.0), q(0.5), q(1.0))));
        assert!(!cube.contains(&QVec3::new(q(-0.0000001), q(0.5), q(0.5))));
    }
}
