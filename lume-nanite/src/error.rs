use thiserror::Error;

use crate::processor::types::MeshletId;

/// Errors produced while building or exporting a meshlet hierarchy.
#[derive(Debug, Error)]
pub enum NaniteError {
    #[error("Mesh has no triangles")]
    EmptyMesh,

    #[error("Index buffer length {0} is not a multiple of 3")]
    InvalidIndexBuffer(usize),

    #[error("Index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("Invalid build config: {0}")]
    InvalidConfig(String),

    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error("Simplification failed: {0}")]
    Simplification(String),

    #[error("Graph partitioning failed: {0}")]
    Partitioning(String),

    /// The level cap was hit while the working set still held several meshlets.
    /// Raise `max_lods` or reconsider the input mesh size.
    #[error(
        "Created {max_lods} LOD levels and would still require more ({meshlet_count} meshlets left). \
         Increase max_lods or reconsider the mesh"
    )]
    LevelCapExceeded { max_lods: u32, meshlet_count: usize },

    /// The loop finished normally but did not converge to exactly one root.
    #[error("Hierarchy finished with {meshlet_count} top-level meshlets, expected exactly 1")]
    InconsistentHierarchy { meshlet_count: usize },

    #[error("Parent of meshlet {id} was already assigned")]
    ParentAlreadyAssigned { id: MeshletId },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, NaniteError>;
