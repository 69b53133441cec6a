//! Vertex-group archives of planar primitives.
//!
//! Loads the Mapple-style `.vg` (ASCII) and `.bvg` (binary,
//! little-endian) formats: a shared point cloud plus groups of inlier
//! indices, one fitted plane per group. Labels, colors and normals are
//! parsed but not kept.

use crate::linalg::Vec3;
use anyhow::{bail, ensure, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub struct VertexGroup {
    /// Union point cloud.
    pub points: Vec<Vec3>,
    /// Fitted plane `(a, b, c, d)` per group.
    pub planes: Vec<[f32; 4]>,
    /// Supporting points per group.
    pub groups: Vec<Vec<Vec3>>,
}

impl VertexGroup {
    pub fn load(path: &Path, merge_duplicates: bool) -> Result<Self> {
        debug!("processing {}", path.display());
        let mut group = match path.extension().and_then(|e| e.to_str()) {
            Some("vg") => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_vg_str(&text)?
            }
            Some("bvg") => {
                let file = File::open(path).with_context(|| format!("reading {}", path.display()))?;
                Self::from_bvg(BufReader::new(file))?
            }
            _ => bail!("unable to load {}, expected *.vg or *.bvg", path.display()),
        };
        ensure!(!group.planes.is_empty(), "empty primitive archive {}", path.display());
        if merge_duplicates {
            group.merge_duplicates();
        }
        info!(
            "loaded {} primitives over {} points from {}",
            group.planes.len(),
            group.points.len(),
            path.display()
        );
        Ok(group)
    }

    pub fn from_vg_str(text: &str) -> Result<Self> {
        let mut tokens = Tokens::new(text);

        tokens.expect_key("num_points")?;
        let num_points = tokens.next_usize()?;
        let mut points = Vec::with_capacity(num_points);
        for _ in 0..num_points {
            points.push(Vec3::new(tokens.next_f64()?, tokens.next_f64()?, tokens.next_f64()?));
        }

        tokens.expect_key("num_colors")?;
        let _num_colors = tokens.next_usize()?;
        tokens.skip_values();

        tokens.expect_key("num_normals")?;
        let _num_normals = tokens.next_usize()?;
        tokens.skip_values();

        tokens.expect_key("num_groups")?;
        let num_groups = tokens.next_usize()?;

        let mut planes = Vec::with_capacity(num_groups);
        let mut groups = Vec::with_capacity(num_groups);
        for g in 0..num_groups {
            tokens.expect_key("group_type")?;
            let _ = tokens.next_usize()?;
            tokens.expect_key("num_group_parameters")?;
            let num_parameters = tokens.next_usize()?;
            ensure!(num_parameters == 4, "group {} has {} parameters, expected 4", g, num_parameters);
            tokens.expect_key("group_parameters")?;
            let mut plane = [0f32; 4];
            for p in plane.iter_mut() {
                *p = tokens.next_f64()? as f32;
            }
            tokens.expect_key("group_label")?;
            tokens.skip_values();
            tokens.expect_key("group_color")?;
            tokens.skip_values();
            tokens.expect_key("group_num_point")?;
            let num_group_points = tokens.next_usize()?;
            let mut group = Vec::with_capacity(num_group_points);
            for _ in 0..num_group_points {
                let index = tokens.next_usize()?;
                ensure!(index < points.len(), "point index {} out of range in group {}", index, g);
                group.push(points[index]);
            }
            tokens.expect_key("num_children")?;
            let children = tokens.next_usize()?;
            if children != 0 {
                warn!("group {} declares {} children; nested groups are read flat", g, children);
            }
            planes.push(plane);
            groups.push(group);
        }

        Ok(Self { points, planes, groups })
    }

    pub fn from_bvg<R: Read>(mut r: R) -> Result<Self> {
        let num_points = read_count(&mut r, "num_points")?;
        let mut points = Vec::with_capacity(num_points);
        for _ in 0..num_points {
            let x = r.read_f32::<LittleEndian>()?;
            let y = r.read_f32::<LittleEndian>()?;
            let z = r.read_f32::<LittleEndian>()?;
            points.push(Vec3::new(x as f64, y as f64, z as f64));
        }

        let num_colors = read_count(&mut r, "num_colors")?;
        skip_f32(&mut r, num_colors * 3)?;
        let num_normals = read_count(&mut r, "num_normals")?;
        skip_f32(&mut r, num_normals * 3)?;

        let num_groups = read_count(&mut r, "num_groups")?;
        let mut planes = Vec::with_capacity(num_groups);
        let mut groups = Vec::with_capacity(num_groups);
        for g in 0..num_groups {
            let _group_type = r.read_i32::<LittleEndian>()?;
            let num_parameters = read_count(&mut r, "num_group_parameters")?;
            ensure!(num_parameters == 4, "group {} has {} parameters, expected 4", g, num_parameters);
            let mut plane = [0f32; 4];
            for p in plane.iter_mut() {
                *p = r.read_f32::<LittleEndian>()?;
            }
            let label_size = read_count(&mut r, "group_label size")?;
            let mut label = vec![0u8; label_size];
            r.read_exact(&mut label)?;
            skip_f32(&mut r, 3)?; // color
            let num_group_points = read_count(&mut r, "group_num_point")?;
            let mut group = Vec::with_capacity(num_group_points);
            for _ in 0..num_group_points {
                let index = r.read_i32::<LittleEndian>()?;
                ensure!(
                    index >= 0 && (index as usize) < points.len(),
                    "point index {} out of range in group {}",
                    index,
                    g
                );
                group.push(points[index as usize]);
            }
            let children = read_count(&mut r, "num_children")?;
            if children != 0 {
                warn!("group {} declares {} children; nested groups are read flat", g, children);
            }
            planes.push(plane);
            groups.push(group);
        }

        Ok(Self { points, planes, groups })
    }

    /// Merge groups that share identical plane coefficients. Detections of
    /// the same plane over disconnected patches would otherwise insert the
    /// same splitter into a cell twice.
    pub fn merge_duplicates(&mut self) {
        let mut first: HashMap<[u32; 4], usize> = HashMap::new();
        let mut planes = Vec::new();
        let mut groups: Vec<Vec<Vec3>> = Vec::new();
        for (plane, group) in self.planes.iter().zip(self.groups.drain(..)) {
            let bits = [
                plane[0].to_bits(),
                plane[1].to_bits(),
                plane[2].to_bits(),
                plane[3].to_bits(),
            ];
            match first.get(&bits) {
                Some(&at) => groups[at].extend(group),
                None => {
                    first.insert(bits, planes.len());
                    planes.push(*plane);
                    groups.push(group);
                }
            }
        }
        if planes.len() < self.planes.len() {
            info!("merged {} duplicate primitives", self.planes.len() - planes.len());
        }
        self.planes = planes;
        self.groups = groups;
    }
}

fn read_count<R: Read>(r: &mut R, what: &str) -> Result<usize> {
    let v = r.read_i32::<LittleEndian>()?;
    ensure!(v >= 0, "negative {} in binary vertex group", what);
    Ok(v as usize)
}

fn skip_f32<R: Read>(r: &mut R, count: usize) -> Result<()> {
    for _ in 0..count {
        let _ = r.read_f32::<LittleEndian>()?;
    }
    Ok(())
}

struct Tokens<'a> {
    inner: std::iter::Peekable<std::str::SplitAsciiWhitespace<'a>>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.split_ascii_whitespace().peekable(),
        }
    }

    fn next(&mut self) -> Result<&'a str> {
        self.inner.next().context("unexpected end of vertex group file")
    }

    fn expect_key(&mut self, key: &str) -> Result<()> {
        let token = self.next()?;
        ensure!(
            token.strip_suffix(':') == Some(key),
            "expected '{}:', found {:?}",
            key,
            token
        );
        Ok(())
    }

    fn next_usize(&mut self) -> Result<usize> {
        let token = self.next()?;
        token.parse().with_context(|| format!("expected integer, found {:?}", token))
    }

    fn next_f64(&mut self) -> Result<f64> {
        let token = self.next()?;
        token.parse().with_context(|| format!("expected number, found {:?}", token))
    }

    /// Consume value tokens up to the next `key:` marker.
    fn skip_values(&mut self) {
        while let Some(token) = self.inner.peek() {
            if token.ends_with(':') {
                return;
            }
            self.inner.next();
        }
    }
}
