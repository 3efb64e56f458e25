pub mod config;
pub mod error;
pub mod export;
pub mod processor;

pub use config::{AdjacencyStrategy, BuildConfig};
pub use error::{NaniteError, Result};
pub use export::{NaniteFlatAsset, PackedMeshletNode};
pub use processor::{process_mesh, BoundingSphere, MeshletDag, MeshletId, MeshletNode, NaniteBuilder};
