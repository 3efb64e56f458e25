use meshopt::build_meshlets;

use crate::error::{NaniteError, Result};
use crate::processor::simplifier::position_adapter;

/// Splits a triangle list into meshlets of bounded size.
pub trait Clusterer: Sync {
    /// Returns one triangle list per meshlet, indexing the same vertex buffer as `indices`.
    fn cluster(
        &self,
        positions: &[[f32; 3]],
        indices: &[u32],
        max_vertices: usize,
        max_triangles: usize,
    ) -> Result<Vec<Vec<u32>>>;
}

impl<T: Clusterer + ?Sized> Clusterer for &T {
    fn cluster(
        &self,
        positions: &[[f32; 3]],
        indices: &[u32],
        max_vertices: usize,
        max_triangles: usize,
    ) -> Result<Vec<Vec<u32>>> {
        (**self).cluster(positions, indices, max_vertices, max_triangles)
    }
}

/// meshoptimizer's greedy meshlet builder.
#[derive(Copy, Clone, Debug, Default)]
pub struct MeshoptClusterer;

impl Clusterer for MeshoptClusterer {
    fn cluster(
        &self,
        positions: &[[f32; 3]],
        indices: &[u32],
        max_vertices: usize,
        max_triangles: usize,
    ) -> Result<Vec<Vec<u32>>> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        let adapter = position_adapter(positions).map_err(|e| NaniteError::Clustering(e.to_string()))?;
        let meshlets = build_meshlets(indices, &adapter, max_vertices, max_triangles, 0.0);

        // meshlet-local triangles back to global vertex indices
        Ok(meshlets
            .iter()
            .map(|m| m.triangles.iter().map(|&t| m.vertices[t as usize]).collect())
            .collect())
    }
}
