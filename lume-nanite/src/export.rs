use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{NaniteError, Result};
use crate::processor::{MeshletDag, MeshletNode};

/// Stand-in for an unset parent error; shaders compare against it as "never refine".
pub const PARENT_ERROR_INFINITY: f32 = 9_999_999.0;

const ASSET_MAGIC: [u8; 4] = *b"LNAD";
const ASSET_VERSION: u32 = 1;
const HEADER_SIZE: usize = 8;

/// GPU layout of one DAG node, 64 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct PackedMeshletNode {
    /// xyz: shared siblings bounds center, w: max siblings error
    pub shared_bounds_and_error: [f32; 4],
    /// xyz: parent bounds center (0 for the root), w: parent error
    pub parent_bounds_and_error: [f32; 4],
    pub own_bounds: [f32; 4],
    pub triangle_count: u32,
    /// Offset into the asset's index buffer, in indices.
    pub first_index_offset: u32,
    pub lod_level: u32,
    pub _padding: u32,
}

impl PackedMeshletNode {
    pub fn pack(node: &MeshletNode, first_index_offset: u32) -> Self {
        let shared = node.shared_siblings_bounds.center;
        let parent = node.parent_bounds().map_or([0.0; 3], |b| b.center);
        let parent_error = match node.parent_error() {
            e if e.is_finite() => e,
            _ => PARENT_ERROR_INFINITY,
        };

        Self {
            shared_bounds_and_error: [shared[0], shared[1], shared[2], node.max_siblings_error],
            parent_bounds_and_error: [parent[0], parent[1], parent[2], parent_error],
            own_bounds: node.own_bounds.to_vec4(),
            triangle_count: node.triangle_count() as u32,
            first_index_offset,
            lod_level: node.lod_level,
            _padding: 0,
        }
    }
}

/// Flattened hierarchy ready for upload. Node `i` is the registry node with id `i`.
#[derive(Default, Serialize, Deserialize, Debug, PartialEq)]
pub struct NaniteFlatAsset {
    pub positions: Vec<[f32; 3]>,
    pub nodes: Vec<PackedMeshletNode>,
    /// Every node's triangles, concatenated in node order.
    pub indices: Vec<u32>,
    /// `created_from` lists, concatenated in node order.
    pub children: Vec<u32>,
    /// Per node: `[offset, count]` into `children`.
    pub child_ranges: Vec<[u32; 2]>,
    pub root: u32,
}

impl NaniteFlatAsset {
    pub fn from_dag(dag: &MeshletDag, positions: &[[f32; 3]]) -> Self {
        let node_count = dag.nodes().len();
        let mut asset = NaniteFlatAsset {
            positions: positions.to_vec(),
            nodes: Vec::with_capacity(node_count),
            indices: Vec::with_capacity(dag.total_triangle_count() * 3),
            children: Vec::new(),
            child_ranges: Vec::with_capacity(node_count),
            root: dag.root_id(),
        };

        for node in dag.nodes() {
            let first_index_offset = asset.indices.len() as u32;
            asset.indices.extend_from_slice(&node.indices);
            asset.nodes.push(PackedMeshletNode::pack(node, first_index_offset));

            let child_offset = asset.children.len() as u32;
            asset.children.extend_from_slice(&node.created_from);
            asset.child_ranges.push([child_offset, node.created_from.len() as u32]);
        }

        asset
    }

    pub fn children_of(&self, node: usize) -> &[u32] {
        let [offset, count] = self.child_ranges[node];
        &self.children[offset as usize..(offset + count) as usize]
    }

    pub fn triangles_of(&self, node: usize) -> &[u32] {
        let packed = &self.nodes[node];
        let start = packed.first_index_offset as usize;
        &self.indices[start..start + packed.triangle_count as usize * 3]
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::with_capacity(1024 * 1024, file);

        writer.write_all(&ASSET_MAGIC)?;
        writer.write_all(&ASSET_VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut writer, self)?;

        writer.flush()?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the file must not be truncated or rewritten while mapped; the asset is
        // fully deserialized before the mapping is dropped
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < HEADER_SIZE || mmap[..4] != ASSET_MAGIC {
            return Err(invalid_data("not a nanite asset file"));
        }
        let version = u32::from_le_bytes([mmap[4], mmap[5], mmap[6], mmap[7]]);
        if version != ASSET_VERSION {
            return Err(invalid_data(&format!("unsupported asset version {version}")));
        }

        Ok(bincode::deserialize(&mmap[HEADER_SIZE..])?)
    }
}

fn invalid_data(msg: &str) -> NaniteError {
    NaniteError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string()))
}
