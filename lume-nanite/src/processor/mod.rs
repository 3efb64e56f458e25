pub mod types;
pub mod edges;
pub mod registry;
pub mod clusterer;
pub mod simplifier;
pub mod partitioner;
pub mod builder;

pub use types::*;
pub use builder::{merge_meshlets, NaniteBuilder};
pub use registry::{LeafStats, MeshletDag, MeshletRegistry};

use crate::config::BuildConfig;
use crate::error::Result;

/// Builds the hierarchy from a flat `xyz` position array with the meshopt-backed collaborators.
pub fn process_mesh(positions: &[f32], indices: &[u32], config: BuildConfig) -> Result<MeshletDag> {
    let vertices: Vec<[f32; 3]> = positions
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect();

    NaniteBuilder::new(vertices).with_config(config).build(indices)
}
