use serde::{Deserialize, Serialize};

use crate::error::{NaniteError, Result};

/// How meshlet adjacency is derived from boundary edges. Both produce the same graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjacencyStrategy {
    /// Edge -> owning meshlets map. Linear in the total boundary edge count.
    EdgeMap,
    /// Intersect every pair of boundary sets. Quadratic, kept for cross-checking.
    PairwiseScan,
}

/// Knobs for one hierarchy build.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Safety cap on the number of simplified levels above the leaves.
    /// Each level roughly halves the triangle count, so 15 levels of 124-triangle
    /// meshlets covers about 4M leaf triangles.
    pub max_lods: u32,
    /// Target number of meshlets merged into one group.
    pub group_size: usize,
    pub meshlet_max_vertices: usize,
    pub meshlet_max_triangles: usize,
    /// Error threshold passed to the simplifier, relative to the mesh extent.
    pub target_simplify_error: f32,
    /// Triangle reduction per level (2 halves each group).
    pub decimate_factor: usize,
    pub adjacency: AdjacencyStrategy,
    /// Reduce the groups of a level on the rayon pool.
    pub parallel: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_lods: 15,
            group_size: 4,
            meshlet_max_vertices: 64,
            meshlet_max_triangles: 124,
            target_simplify_error: 0.05,
            decimate_factor: 2,
            adjacency: AdjacencyStrategy::EdgeMap,
            parallel: true,
        }
    }
}

impl BuildConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_lods == 0 {
            return Err(NaniteError::InvalidConfig("max_lods must be at least 1".into()));
        }
        if self.group_size == 0 {
            return Err(NaniteError::InvalidConfig("group_size must be at least 1".into()));
        }
        if self.decimate_factor == 0 {
            return Err(NaniteError::InvalidConfig("decimate_factor must be at least 1".into()));
        }
        // meshoptimizer limits
        if !(3..=255).contains(&self.meshlet_max_vertices) {
            return Err(NaniteError::InvalidConfig(format!(
                "meshlet_max_vertices {} must be within 3..=255",
                self.meshlet_max_vertices
            )));
        }
        if !(1..=512).contains(&self.meshlet_max_triangles) || self.meshlet_max_triangles % 4 != 0 {
            return Err(NaniteError::InvalidConfig(format!(
                "meshlet_max_triangles {} must be within 1..=512 and divisible by 4",
                self.meshlet_max_triangles
            )));
        }
        if !self.target_simplify_error.is_finite() || self.target_simplify_error < 0.0 {
            return Err(NaniteError::InvalidConfig(format!(
                "target_simplify_error {} must be a non-negative number",
                self.target_simplify_error
            )));
        }
        Ok(())
    }
}
