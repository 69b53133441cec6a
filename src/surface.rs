//! Surface extraction from a labeled complex.
//!
//! Every edge between cells of opposite occupancy contributes one facet
//! to the output surface. Corners are gathered exactly, ordered by angle
//! around the facet centroid in the supporting plane, then oriented so
//! the facet normal points away from the interior.

use crate::complex::CellComplex;
use crate::export::write_off;
use crate::graph::CellId;
use crate::linalg::{QVec3, Vec3};
use crate::plane::QPlane;
use anyhow::{bail, Result};
use log::warn;
use num::Signed;
use std::collections::BTreeMap;
use std::path::Path;

/// One oriented polygon of the boundary surface.
pub struct BoundaryFacet {
    /// Ordered corners; the implied normal points from `inside` to `outside`.
    pub points: Vec<QVec3>,
    pub inside: CellId,
    pub outside: CellId,
}

/// Collect, order and orient all boundary facets.
///
/// `exact` selects the rational orientation helper over the float one;
/// `strict` turns degenerate facets (duplicate projected angles, fewer
/// than three corners) into errors instead of skipped warnings.
pub fn boundary_facets(complex: &CellComplex, exact: bool, strict: bool) -> Result<Vec<BoundaryFacet>> {
    let graph = complex.graph();
    let mut facets = Vec::new();
    for ((a, b), edge) in graph.edges() {
        let occ_a = graph.node(a).occupancy;
        let occ_b = graph.node(b).occupancy;
        if occ_a.is_none() || occ_b.is_none() || occ_a == occ_b {
            continue;
        }

        // exact corner list: facet polygon plus recovered T-junctions
        let mut corners: Vec<QVec3> = edge.intersection.vertices().to_vec();
        for v in &edge.vertices {
            if !corners.contains(v) {
                corners.push(v.clone());
            }
        }

        if corners.len() < 3 {
            if strict {
                bail!("facet between cells {} and {} has fewer than 3 corners", a, b);
            }
            warn!("skipping facet between cells {} and {} with fewer than 3 corners", a, b);
            continue;
        }

        let float_corners: Vec<Vec3> = corners.iter().map(|c| c.to_f64()).collect();
        let order = match sort_by_angle(&float_corners, &edge.supporting_plane) {
            Some(order) => order,
            None => {
                if strict {
                    bail!("duplicate projected angle on facet between cells {} and {}", a, b);
                }
                warn!("duplicate projected angle, skipping facet between cells {} and {}", a, b);
                continue;
            }
        };
        let mut ordered: Vec<QVec3> = order.into_iter().map(|i| corners[i].clone()).collect();

        let (inside, outside) = if occ_a == Some(true) { (a, b) } else { (b, a) };
        let outside_center = graph.node(outside).convex.center();
        let flip = if exact {
            orient_exact(&ordered, &outside_center)
        } else {
            orient_inexact(&float_corners_of(&ordered), outside_center.to_f64())
        };
        if flip {
            ordered.reverse();
        }

        facets.push(BoundaryFacet {
            points: ordered,
            inside,
            outside,
        });
    }
    Ok(facets)
}

fn float_corners_of(points: &[QVec3]) -> Vec<Vec3> {
    points.iter().map(|p| p.to_f64()).collect()
}

/// Indices of `points` sorted by angle around their centroid in the
/// supporting plane. `None` when two points project to the same angle.
fn sort_by_angle(points: &[Vec3], plane: &QPlane) -> Option<Vec<usize>> {
    let e0 = plane.normal_f64().normalize();
    // orthonormal in-plane basis from the dominant normal axis by the
    // swap-and-negate trick
    let dominant = e0.max_dimension();
    let mut e1 = [0.0f64; 3];
    let y = (dominant + 1) % 3;
    let x = (y + 1) % 3;
    e1[x] = 0.0;
    e1[y] = -e0[dominant];
    e1[dominant] = e0[y];
    let e1 = Vec3::new(e1[0], e1[1], e1[2]).normalize();
    let e2 = e0.cross(&e1);

    let projected: Vec<(f64, f64)> = points.iter().map(|p| (e1.dot(p), e2.dot(p))).collect();
    let cu = projected.iter().map(|p| p.0).sum::<f64>() / projected.len() as f64;
    let cv = projected.iter().map(|p| p.1).sum::<f64>() / projected.len() as f64;
    let radians: Vec<f64> = projected.iter().map(|(u, v)| (v - cv).atan2(u - cu)).collect();
    if radians.iter().any(|r| r.is_nan()) {
        return None;
    }

    let mut sorted_radians = radians.clone();
    sorted_radians.sort_by(|p, q| p.partial_cmp(q).unwrap_or(std::cmp::Ordering::Equal));
    if sorted_radians.windows(2).any(|w| w[0] == w[1]) {
        return None;
    }

    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&i, &j| radians[i].partial_cmp(&radians[j]).unwrap_or(std::cmp::Ordering::Equal));
    Some(order)
}

/// True when the ordered polygon must be reversed so its normal points
/// toward `outside`. Exact version.
pub fn orient_exact(points: &[QVec3], outside: &QVec3) -> bool {
    for i in 0..points.len().saturating_sub(2) {
        let u = &points[i + 1] - &points[i];
        let v = &points[i + 2] - &points[i];
        let normal = u.cross(&v);
        if normal.is_zero() {
            continue;
        }
        let toward = outside - &points[i];
        return normal.dot(&toward).is_negative();
    }
    false
}

/// True when the ordered polygon must be reversed. Float version, kept
/// for the soup path; may flip near-degenerate facets.
pub fn orient_inexact(points: &[Vec3], outside: Vec3) -> bool {
    for i in 0..points.len().saturating_sub(2) {
        let u = (points[i + 1] - points[i]).normalize();
        let v = (points[i + 2] - points[i]).normalize();
        let normal = u.cross(&v);
        if normal.length() == 0.0 || !normal.length().is_finite() {
            continue;
        }
        let toward = (outside - points[i]).normalize();
        return normal.normalize().dot(&toward) < 0.0;
    }
    false
}

/// Indexed OFF surface: vertex pool deduplicated by exact equality,
/// exact orientation, degenerate facets are fatal.
pub fn extract_surface(complex: &CellComplex, path: &Path) -> Result<()> {
    let facets = boundary_facets(complex, true, true)?;
    let mut pool: Vec<Vec3> = Vec::new();
    let mut pool_index: BTreeMap<QVec3, usize> = BTreeMap::new();
    let mut faces = Vec::with_capacity(facets.len());
    for facet in &facets {
        let mut face = Vec::with_capacity(facet.points.len());
        for p in &facet.points {
            let next = pool.len();
            let index = *pool_index.entry(p.clone()).or_insert(next);
            if index == next {
                pool.push(p.to_f64());
            }
            face.push(index);
        }
        faces.push(face);
    }
    log::debug!("saving polygon mesh to {}", path.display());
    write_off(path, &pool, &faces)
}

/// OFF polygon soup: one vertex run per facet, inexact orientation,
/// degenerate facets skipped.
pub fn extract_soup(complex: &CellComplex, path: &Path) -> Result<()> {
    let facets = boundary_facets(complex, false, false)?;
    let mut points = Vec::new();
    let mut faces = Vec::with_capacity(facets.len());
    for facet in &facets {
        let base = points.len();
        points.extend(facet.points.iter().map(|p| p.to_f64()));
        faces.push((base..points.len()).collect());
    }
    log::debug!("saving polygon soup to {}", path.display());
    write_off(path, &points, &faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Aabb;
    use crate::complex::{CellComplex, PlaneOrder};
    use crate::primitive::Primitives;
    use crate::tree::Traversal;
    use crate::vertex_group::VertexGroup;
    use std::collections::BTreeMap;

    fn bundle(planes: Vec<[f32; 4]>, groups: Vec<Vec<Vec3>>) -> Primitives {
        let points = groups.iter().flatten().copied().collect();
        let vg = VertexGroup {
            points,
            planes,
            groups,
        };
        Primitives::from_vertex_group(&vg).unwrap()
    }

    fn bound(min: f64, max: f64) -> Aabb {
        Aabb::from_points(&[Vec3::new(min, min, min), Vec3::new(max, max, max)])
    }

    fn axis_plane_points(axis: usize, offset: f64, spread: &[f64]) -> Vec<Vec3> {
        let mut points = Vec::new();
        for &u in spread {
            for &v in spread {
                let mut p = [0.0f64; 3];
                p[axis] = offset;
                p[(axis + 1) % 3] = u;
                p[(axis + 2) % 3] = v;
                points.push(Vec3::new(p[0], p[1], p[2]));
            }
        }
        points
    }

    fn polygon_area(points: &[Vec3]) -> f64 {
        let mut doubled = Vec3::new(0.0, 0.0, 0.0);
        for i in 1..points.len() - 1 {
            let u = points[i] - points[0];
            let v = points[i + 1] - points[0];
            doubled = doubled + u.cross(&v);
        }
        doubled.length() / 2.0
    }

    fn facet_normal(points: &[Vec3]) -> Vec3 {
        for i in 0..points.len() - 2 {
            let n = (points[i + 1] - points[i]).cross(&(points[i + 2] - points[i]));
            if n.length() > 0.0 {
                return n.normalize();
            }
        }
        panic!("degenerate facet");
    }

    /// Octant complex with only the (+,+,+) octant labeled inside.
    fn labeled_octants() -> CellComplex {
        let spread = [-0.9, -0.5, 0.5, 0.9];
        let prims = bundle(
            vec![[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]],
            vec![
                axis_plane_points(0, 0.0, &spread),
                axis_plane_points(1, 0.0, &spread),
                axis_plane_points(2, 0.0, &spread),
            ],
        );
        let mut complex = CellComplex::new(prims, bound(-1.0, 1.0)).unwrap();
        complex
            .construct_partition(Traversal::Depth, PlaneOrder::Optimal, 1)
            .unwrap();
        let ids: Vec<_> = complex.graph().node_ids().collect();
        for id in ids {
            let center = complex.graph().node(id).convex.center().to_f64();
            complex.set_occupancy(id, center.x > 0.0 && center.y > 0.0 && center.z > 0.0);
        }
        complex.construct_polygons();
        complex
    }

    #[test]
    fn octant_labeling_yields_three_oriented_unit_squares() {
        let complex = labeled_octants();
        let facets = boundary_facets(&complex, true, true).unwrap();
        assert_eq!(facets.len(), 3);
        for facet in &facets {
            assert_eq!(facet.points.len(), 4);
            let float_points: Vec<Vec3> = facet.points.iter().map(|p| p.to_f64()).collect();
            assert!((polygon_area(&float_points) - 1.0).abs() < 1e-9);

            // the normal points away from the inside cell
            let normal = facet_normal(&float_points);
            let inside_center = complex.graph().node(facet.inside).convex.center().to_f64();
            assert!(normal.dot(&(inside_center - float_points[0])) < 0.0);
            // and towards the outside cell
            let outside_center = complex.graph().node(facet.outside).convex.center().to_f64();
            assert!(normal.dot(&(outside_center - float_points[0])) > 0.0);
        }
    }

    #[test]
    fn exact_and_inexact_orientation_agree_on_clean_facets() {
        let complex = labeled_octants();
        let exact = boundary_facets(&complex, true, true).unwrap();
        let inexact = boundary_facets(&complex, false, true).unwrap();
        assert_eq!(exact.len(), inexact.len());
        for (e, i) in exact.iter().zip(&inexact) {
            assert_eq!(e.points, i.points);
        }
    }

    /// Six planes boxing an interior cell; the extracted boundary is a
    /// closed cube surface.
    fn labeled_inner_box() -> CellComplex {
        let mut planes = Vec::new();
        let mut groups = Vec::new();
        for axis in 0..3 {
            for &offset in &[0.25f64, 0.75] {
                let mut plane = [0.0f32; 4];
                plane[axis] = 1.0;
                plane[3] = -(offset as f32);
                planes.push(plane);
                groups.push(axis_plane_points(axis, offset, &[0.05, 0.95]));
            }
        }
        let mut complex = CellComplex::new(bundle(planes, groups), bound(0.0, 1.0)).unwrap();
        complex.construct_exhaustive(0).unwrap();
        assert_eq!(complex.num_cells(), 27);
        let ids: Vec<_> = complex.graph().node_ids().collect();
        for id in ids {
            let c = complex.graph().node(id).convex.center().to_f64();
            let inner =
                (0.25..0.75).contains(&c.x) && (0.25..0.75).contains(&c.y) && (0.25..0.75).contains(&c.z);
            complex.set_occupancy(id, inner);
        }
        complex.construct_polygons();
        complex
    }

    #[test]
    fn closed_surface_is_manifold_with_opposite_half_edges() {
        let complex = labeled_inner_box();
        let facets = boundary_facets(&complex, true, true).unwrap();
        assert_eq!(facets.len(), 6);

        let mut half_edges: BTreeMap<(QVec3, QVec3), usize> = BTreeMap::new();
        for facet in &facets {
            let float_points: Vec<Vec3> = facet.points.iter().map(|p| p.to_f64()).collect();
            assert!((polygon_area(&float_points) - 0.25).abs() < 1e-9);
            let n = facet.points.len();
            for i in 0..n {
                let from = facet.points[i].clone();
                let to = facet.points[(i + 1) % n].clone();
                *half_edges.entry((from, to)).or_insert(0) += 1;
            }
        }
        for ((from, to), count) in &half_edges {
            assert_eq!(*count, 1, "duplicated half-edge");
            assert_eq!(
                half_edges.get(&(to.clone(), from.clone())),
                Some(&1),
                "half-edge without an opposite"
            );
        }
    }

    #[test]
    fn surface_and_soup_files_share_the_face_count() {
        let complex = labeled_octants();
        let dir = std::env::temp_dir().join("polypart_surface_test");
        let surface_path = dir.join("surface.off");
        let soup_path = dir.join("soup.off");
        extract_surface(&complex, &surface_path).unwrap();
        extract_soup(&complex, &soup_path).unwrap();

        let surface = std::fs::read_to_string(&surface_path).unwrap();
        let soup = std::fs::read_to_string(&soup_path).unwrap();
        // 3 squares; the indexed surface shares corner vertices
        assert!(surface.starts_with("OFF\n7 3 0\n"));
        assert!(soup.starts_with("OFF\n12 3 0\n"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unlabeled_complex_has_no_boundary() {
        let spread = [-0.9, -0.5, 0.5, 0.9];
        let prims = bundle(
            vec![[0.0, 0.0, 1.0, 0.0]],
            vec![axis_plane_points(2, 0.0, &spread)],
        );
        let mut complex = CellComplex::new(prims, bound(-1.0, 1.0)).unwrap();
        complex
            .construct_partition(Traversal::Depth, PlaneOrder::Optimal, 1)
            .unwrap();
        let facets = boundary_facets(&complex, true, true).unwrap();
        assert!(facets.is_empty());
    }
}
