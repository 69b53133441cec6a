//! Run configuration, deserialized from a JSON file.

use crate::complex::PlaneOrder;
use crate::primitive::Priority;
use crate::tree::Traversal;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Vertex group archive (.vg or .bvg) with the detected primitives.
    pub input: PathBuf,
    /// Watertight reference mesh for occupancy labeling.
    #[serde(default)]
    pub mesh: Option<PathBuf>,
    /// Test points sampled per cell by the labeler.
    #[serde(default = "default_n_test_points")]
    pub n_test_points: usize,
    /// Bounding box inflation around the point cloud.
    #[serde(default = "default_initial_padding")]
    pub initial_padding: f64,
    /// Use the exhaustive builder instead of the adaptive one.
    #[serde(default)]
    pub exhaustive: bool,
    #[serde(default)]
    pub ordering: OrderingMode,
    #[serde(default)]
    pub mode: TraversalMode,
    /// Split threshold: minimum points a clipped primitive must keep.
    #[serde(default = "default_th")]
    pub th: usize,
    /// Worker threads for the exhaustive builder's adjacency tests;
    /// defaults to the number of logical CPUs.
    #[serde(default)]
    pub num_workers: Option<usize>,
    /// Merge primitives with identical plane coefficients on ingestion.
    #[serde(default)]
    pub merge_duplicates: bool,
    #[serde(default)]
    pub prioritise: PriorityMode,
    /// Planes without supporting points, inserted with highest priority.
    #[serde(default)]
    pub additional_planes: Vec<[f32; 4]>,
    /// Contract same-occupancy cells across convex interfaces.
    #[serde(default)]
    pub simplify: bool,
    /// Indexed OFF surface output.
    #[serde(default)]
    pub surface: Option<PathBuf>,
    /// OFF polygon soup output.
    #[serde(default)]
    pub soup: Option<PathBuf>,
    /// OBJ dump of the whole partition.
    #[serde(default)]
    pub partition: Option<PathBuf>,
    /// Colored PLY dump of the inside cells.
    #[serde(default)]
    pub cells: Option<PathBuf>,
    /// Seed for random prioritisation.
    #[serde(default)]
    pub seed: u64,
}

fn default_n_test_points() -> usize {
    50
}

fn default_initial_padding() -> f64 {
    0.1
}

fn default_th() -> usize {
    1
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderingMode {
    Optimal,
    Input,
}

impl Default for OrderingMode {
    fn default() -> Self {
        OrderingMode::Optimal
    }
}

impl From<OrderingMode> for PlaneOrder {
    fn from(mode: OrderingMode) -> PlaneOrder {
        match mode {
            OrderingMode::Optimal => PlaneOrder::Optimal,
            OrderingMode::Input => PlaneOrder::Input,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TraversalMode {
    Depth,
    Width,
}

impl Default for TraversalMode {
    fn default() -> Self {
        TraversalMode::Depth
    }
}

impl From<TraversalMode> for Traversal {
    fn from(mode: TraversalMode) -> Traversal {
        match mode {
            TraversalMode::Depth => Traversal::Depth,
            TraversalMode::Width => Traversal::Width,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriorityMode {
    None,
    Vertical,
    Norm,
    Volume,
    Random,
}

impl Default for PriorityMode {
    fn default() -> Self {
        PriorityMode::None
    }
}

impl From<PriorityMode> for Option<Priority> {
    fn from(mode: PriorityMode) -> Option<Priority> {
        match mode {
            PriorityMode::None => None,
            PriorityMode::Vertical => Some(Priority::Vertical),
            PriorityMode::Norm => Some(Priority::Norm),
            PriorityMode::Volume => Some(Priority::Volume),
            PriorityMode::Random => Some(Priority::Random),
        }
    }
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing configuration {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let config: Config = serde_json::from_str(r#"{ "input": "scene.vg" }"#).unwrap();
        assert_eq!(config.th, 1);
        assert_eq!(config.n_test_points, 50);
        assert_eq!(config.initial_padding, 0.1);
        assert_eq!(config.ordering, OrderingMode::Optimal);
        assert_eq!(config.mode, TraversalMode::Depth);
        assert_eq!(config.prioritise, PriorityMode::None);
        assert!(!config.exhaustive);
        assert!(config.mesh.is_none());
    }

    #[test]
    fn enums_parse_lowercase() {
        let config: Config = serde_json::from_str(
            r#"{ "input": "scene.bvg", "ordering": "input", "mode": "width", "prioritise": "vertical" }"#,
        )
        .unwrap();
        assert_eq!(config.ordering, OrderingMode::Input);
        assert_eq!(config.mode, TraversalMode::Width);
        assert_eq!(config.prioritise, PriorityMode::Vertical);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{ "input": "a.vg", "typo": 1 }"#).is_err());
    }
}
