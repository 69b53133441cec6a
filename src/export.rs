//! Serialization of meshes, cells and partitions.

use crate::complex::CellComplex;
use crate::graph::CellId;
use crate::linalg::Vec3;
use crate::polyhedron::Polyhedron;
use crate::utils::Rng;
use anyhow::{Context, Result};
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// ASCII OFF polygon mesh.
pub fn write_off(path: &Path, points: &[Vec3], faces: &[Vec<usize>]) -> Result<()> {
    let mut out = create(path)?;
    writeln!(out, "OFF")?;
    writeln!(out, "{} {} 0", points.len(), faces.len())?;
    for p in points {
        writeln!(out, "{} {} {}", p.x, p.y, p.z)?;
    }
    for face in faces {
        write!(out, "{}", face.len())?;
        for index in face {
            write!(out, " {}", index)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// ASCII PLY of colored cells, one disconnected shell per cell.
fn write_cells_ply(path: &Path, comment: &str, cells: &[(&Polyhedron, [u8; 3])]) -> Result<()> {
    let mut vertices: Vec<(Vec3, [u8; 3])> = Vec::new();
    let mut faces: Vec<Vec<usize>> = Vec::new();
    for (convex, color) in cells {
        let base = vertices.len();
        for v in convex.vertices() {
            vertices.push((v.to_f64(), *color));
        }
        for cycle in convex.facets() {
            faces.push(cycle.into_iter().map(|i| base + i).collect());
        }
    }

    let mut out = create(path)?;
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "comment : {}", comment)?;
    writeln!(out, "element vertex {}", vertices.len())?;
    writeln!(out, "property float x")?;
    writeln!(out, "property float y")?;
    writeln!(out, "property float z")?;
    writeln!(out, "property uchar red")?;
    writeln!(out, "property uchar green")?;
    writeln!(out, "property uchar blue")?;
    writeln!(out, "element face {}", faces.len())?;
    writeln!(out, "property list uchar int vertex_index")?;
    writeln!(out, "end_header")?;
    for (p, c) in &vertices {
        writeln!(out, "{} {} {} {} {} {}", p.x, p.y, p.z, c[0], c[1], c[2])?;
    }
    for face in &faces {
        write!(out, "{}", face.len())?;
        for index in face {
            write!(out, " {}", index)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Dump the cells labeled inside, one random color per cell.
pub fn extract_in_cells(complex: &CellComplex, path: &Path) -> Result<()> {
    let mut rng = Rng::new();
    let cells: Vec<(&Polyhedron, [u8; 3])> = complex
        .graph()
        .nodes()
        .filter(|(_, record)| record.occupancy == Some(true))
        .map(|(_, record)| {
            let color = [
                (rng.uniform_f64() * 255.0) as u8,
                (rng.uniform_f64() * 255.0) as u8,
                (rng.uniform_f64() * 255.0) as u8,
            ];
            (&record.convex, color)
        })
        .collect();
    debug!("saving {} inside cells to {}", cells.len(), path.display());
    write_cells_ply(path, &format!("in_cells:{}", cells.len()), &cells)
}

/// Dump every labeled cell, inside red and outside blue.
pub fn extract_in_out_cells(complex: &CellComplex, path: &Path) -> Result<()> {
    let cells: Vec<(&Polyhedron, [u8; 3])> = complex
        .graph()
        .nodes()
        .filter(|(_, record)| record.occupancy.is_some())
        .map(|(_, record)| {
            let color = if record.occupancy == Some(true) {
                [255, 0, 0]
            } else {
                [0, 0, 255]
            };
            (&record.convex, color)
        })
        .collect();
    debug!("saving {} labeled cells to {}", cells.len(), path.display());
    write_cells_ply(path, &format!("in_out_cells:{}", cells.len()), &cells)
}

/// OBJ polygon soup of the partition, optionally restricted to a set of
/// cell ids.
pub fn extract_partition(complex: &CellComplex, path: &Path, indices: Option<&[CellId]>) -> Result<()> {
    let mut out = create(path)?;
    writeln!(out, "# cells: {}", complex.num_cells())?;
    let mut base = 1usize; // obj indices are 1-based
    for (id, convex) in complex.cells() {
        if let Some(wanted) = indices {
            if !wanted.contains(&id) {
                continue;
            }
        }
        writeln!(out, "o cell_{}", id)?;
        for v in convex.vertices() {
            let p = v.to_f64();
            writeln!(out, "v {} {} {}", p.x, p.y, p.z)?;
        }
        for cycle in convex.facets() {
            write!(out, "f")?;
            for index in cycle {
                write!(out, " {}", base + index)?;
            }
            writeln!(out)?;
        }
        base += convex.vertices().len();
    }
    Ok(())
}
