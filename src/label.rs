//! Cell occupancy labeling.
//!
//! The core does not decide inside/outside itself; it hands the cells to
//! a [`Labeler`] and stores whatever the oracle returns. The bundled
//! [`MeshLabeler`] estimates occupancy against a watertight reference
//! mesh by parity ray tests on points sampled inside each cell.

use crate::linalg::Vec3;
use crate::polyhedron::Polyhedron;
use crate::utils::Rng;
use anyhow::{bail, ensure, Context, Result};
use log::{info, warn};
use std::path::Path;

/// Occupancy oracle: one continuous estimate in `[0, 1]` per cell.
pub trait Labeler {
    fn label(&self, cells: &[&Polyhedron], n_test_points: usize) -> Result<Vec<f32>>;
}

/// Labels cells against a triangle mesh loaded from an OBJ file.
pub struct MeshLabeler {
    triangles: Vec<[Vec3; 3]>,
}

// slightly irrational direction so rays rarely graze edges exactly
const RAY_DIRECTION: Vec3 = Vec3 {
    x: 0.5773502691896258,
    y: 0.5773502691896257,
    z: 0.5773502691896259,
};
const RAY_EPSILON: f64 = 1e-12;

impl MeshLabeler {
    pub fn from_obj(path: &Path) -> Result<Self> {
        let (models, _) = tobj::load_obj(path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {:?}", path.display(), e))?;
        let mut triangles = Vec::new();
        for model in models {
            let mesh = model.mesh;
            let positions: Vec<Vec3> = mesh
                .positions
                .chunks(3)
                .map(|p| Vec3::new(p[0] as f64, p[1] as f64, p[2] as f64))
                .collect();
            for face in mesh.indices.chunks(3) {
                triangles.push([
                    positions[face[0] as usize],
                    positions[face[1] as usize],
                    positions[face[2] as usize],
                ]);
            }
        }
        ensure!(!triangles.is_empty(), "reference mesh {} has no triangles", path.display());
        info!("loaded reference mesh with {} triangles", triangles.len());
        Ok(Self { triangles })
    }

    pub fn from_triangles(triangles: Vec<[Vec3; 3]>) -> Result<Self> {
        ensure!(!triangles.is_empty(), "reference mesh has no triangles");
        Ok(Self { triangles })
    }

    /// Parity test: odd number of crossings means inside.
    fn inside(&self, p: Vec3) -> bool {
        let mut crossings = 0usize;
        for tri in &self.triangles {
            if ray_hits_triangle(p, RAY_DIRECTION, tri) {
                crossings += 1;
            }
        }
        crossings % 2 == 1
    }
}

impl Labeler for MeshLabeler {
    fn label(&self, cells: &[&Polyhedron], n_test_points: usize) -> Result<Vec<f32>> {
        ensure!(n_test_points > 0, "n_test_points must be positive");
        let mut occupancies = Vec::with_capacity(cells.len());
        for (index, cell) in cells.iter().enumerate() {
            let samples = sample_in_cell(cell, n_test_points, index as u64)
                .with_context(|| format!("sampling test points in cell {}", index))?;
            let inside = samples.iter().filter(|&&p| self.inside(p)).count();
            occupancies.push(inside as f32 / samples.len() as f32);
        }
        Ok(occupancies)
    }
}

/// Rejection-sample points in the cell's bounding box; falls back to the
/// vertex centroid when the cell is too thin to hit.
fn sample_in_cell(cell: &Polyhedron, n: usize, seed: u64) -> Result<Vec<Vec3>> {
    if cell.vertices().is_empty() {
        bail!("cannot sample an empty cell");
    }
    let bbox = cell.bbox();
    let ineqs: Vec<[f64; 4]> = cell.ineqs().iter().map(|q| q.to_f64()).collect();
    let inside = |p: Vec3| {
        ineqs
            .iter()
            .all(|q| q[0] * p.x + q[1] * p.y + q[2] * p.z + q[3] >= 0.0)
    };

    let mut rng = Rng::seeded(seed);
    let mut samples = Vec::with_capacity(n);
    let mut attempts = 0usize;
    while samples.len() < n && attempts < n * 100 {
        attempts += 1;
        let p = Vec3::new(
            rng.uniform_range(bbox.min.x, bbox.max.x),
            rng.uniform_range(bbox.min.y, bbox.max.y),
            rng.uniform_range(bbox.min.z, bbox.max.z),
        );
        if inside(p) {
            samples.push(p);
        }
    }
    if samples.is_empty() {
        warn!("rejection sampling failed, falling back to the cell centroid");
        samples.push(cell.center().to_f64());
    }
    Ok(samples)
}

/// Watertight enough for parity counting: Möller-Trumbore with a small
/// tolerance, front and back faces alike.
fn ray_hits_triangle(origin: Vec3, direction: Vec3, tri: &[Vec3; 3]) -> bool {
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let pvec = direction.cross(&e2);
    let det = e1.dot(&pvec);
    if det.abs() < RAY_EPSILON {
        return false;
    }
    let inv_det = 1.0 / det;
    let tvec = origin - tri[0];
    let u = tvec.dot(&pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return false;
    }
    let qvec = tvec.cross(&e1);
    let v = direction.dot(&qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return false;
    }
    let t = e2.dot(&qvec) * inv_det;
    t > RAY_EPSILON
}
