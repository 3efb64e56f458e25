use crate::error::{NaniteError, Result};
use crate::processor::edges::{boundary_edges_of, edges_of};
use crate::processor::types::{BoundingSphere, MeshletId, MeshletNode, ParentLink};

/// Append-only arena of every node created by one build.
///
/// A node's id is its position in the arena, so creation order is the storage
/// order. Leaves come first, in the order the clusterer produced them; buffer
/// layout code downstream relies on that.
#[derive(Debug, Default)]
pub struct MeshletRegistry {
    nodes: Vec<MeshletNode>,
    next_id: MeshletId,
}

impl MeshletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> MeshletId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Creates a node with an unset parent link. Boundary edges and own bounds
    /// are derived from `indices` here and never change afterwards.
    pub fn create_node(
        &mut self,
        positions: &[[f32; 3]],
        indices: Vec<u32>,
        lod_level: u32,
        max_siblings_error: f32,
        shared_siblings_bounds: BoundingSphere,
    ) -> Result<MeshletId> {
        if indices.len() % 3 != 0 {
            return Err(NaniteError::InvalidIndexBuffer(indices.len()));
        }

        let boundary_edges = boundary_edges_of(&edges_of(&indices));
        let own_bounds = BoundingSphere::from_indices(positions, &indices);
        let id = self.allocate_id();
        debug_assert_eq!(id as usize, self.nodes.len());

        self.nodes.push(MeshletNode {
            id,
            lod_level,
            indices,
            boundary_edges,
            own_bounds,
            shared_siblings_bounds,
            max_siblings_error,
            parent: ParentLink::Unset,
            created_from: Vec::new(),
        });
        Ok(id)
    }

    /// Records the parent group's error and bounds on a node. Allowed once per node.
    pub fn assign_parent(&mut self, id: MeshletId, error: f32, bounds: BoundingSphere) -> Result<()> {
        let node = &mut self.nodes[id as usize];
        if node.has_parent() {
            return Err(NaniteError::ParentAlreadyAssigned { id });
        }
        node.parent = ParentLink::Assigned { error, bounds };
        Ok(())
    }

    pub fn add_children(&mut self, id: MeshletId, children: &[MeshletId]) {
        self.nodes[id as usize].created_from.extend_from_slice(children);
    }

    pub fn get(&self, id: MeshletId) -> &MeshletNode {
        &self.nodes[id as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn finish(self, root: MeshletId) -> MeshletDag {
        MeshletDag { nodes: self.nodes, root }
    }
}

/// Pre-simplification totals of the leaf level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LeafStats {
    pub meshlet_count: usize,
    pub triangle_count: usize,
}

/// Finished hierarchy. Every node ever created, in creation order, with a single root.
#[derive(Debug)]
pub struct MeshletDag {
    nodes: Vec<MeshletNode>,
    root: MeshletId,
}

impl MeshletDag {
    /// All nodes; `nodes()[i].id == i`. Level 0 comes first in clustering order.
    pub fn nodes(&self) -> &[MeshletNode] {
        &self.nodes
    }

    pub fn get(&self, id: MeshletId) -> Option<&MeshletNode> {
        self.nodes.get(id as usize)
    }

    pub fn root_id(&self) -> MeshletId {
        self.root
    }

    pub fn root(&self) -> &MeshletNode {
        &self.nodes[self.root as usize]
    }

    pub fn level(&self, lod_level: u32) -> impl Iterator<Item = &MeshletNode> {
        self.nodes.iter().filter(move |n| n.lod_level == lod_level)
    }

    pub fn lod_level_count(&self) -> u32 {
        self.root().lod_level + 1
    }

    pub fn leaf_stats(&self) -> LeafStats {
        let mut stats = LeafStats { meshlet_count: 0, triangle_count: 0 };
        for node in self.level(0) {
            stats.meshlet_count += 1;
            stats.triangle_count += node.triangle_count();
        }
        stats
    }

    pub fn total_triangle_count(&self) -> usize {
        self.nodes.iter().map(|n| n.triangle_count()).sum()
    }

    pub fn into_nodes(self) -> Vec<MeshletNode> {
        self.nodes
    }
}
