use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Position of a node in the registry. Ids are handed out in creation order.
pub type MeshletId = u32;

/// Undirected edge between two vertex indices, stored with the smaller index first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub v0: u32,
    pub v1: u32,
}

impl Edge {
    pub fn new(a: u32, b: u32) -> Self {
        Self { v0: a.min(b), v1: a.max(b) }
    }
}

/// Conservative enclosing sphere. Not minimal.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: [f32; 3],
    pub radius: f32,
}

impl BoundingSphere {
    /// Centroid of the points, radius to the farthest one.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Vec3> + Clone,
    {
        let mut center = Vec3::ZERO;
        let mut count = 0usize;
        for p in points.clone() {
            center += p;
            count += 1;
        }
        if count == 0 {
            return Self::default();
        }
        center /= count as f32;

        let mut radius: f32 = 0.0;
        for p in points {
            radius = radius.max(center.distance(p));
        }

        Self { center: center.to_array(), radius }
    }

    /// Sphere around the vertices referenced by an index buffer.
    pub fn from_indices(positions: &[[f32; 3]], indices: &[u32]) -> Self {
        Self::from_points(indices.iter().map(|&i| Vec3::from_array(positions[i as usize])))
    }

    pub fn to_vec4(&self) -> [f32; 4] {
        [self.center[0], self.center[1], self.center[2], self.radius]
    }
}

/// Link from a node to the group it was simplified into.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum ParentLink {
    /// Top of the hierarchy so far.
    #[default]
    Unset,
    Assigned { error: f32, bounds: BoundingSphere },
}

/// Node of the meshlet DAG while it is being built.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshletNode {
    pub id: MeshletId,
    /// 0 for leaves, highest at the root.
    pub lod_level: u32,
    /// Triangle list into the shared vertex buffer, owned by this node.
    pub indices: Vec<u32>,
    /// Edges used by exactly one triangle of `indices`.
    pub boundary_edges: Vec<Edge>,
    pub own_bounds: BoundingSphere,
    /// Bounds of the simplified group this node was split from. Same for all siblings.
    pub shared_siblings_bounds: BoundingSphere,
    /// Accumulated simplification error up to and including this node's group.
    pub max_siblings_error: f32,
    pub(crate) parent: ParentLink,
    /// Children this node was simplified from. Siblings share the full list.
    pub created_from: Vec<MeshletId>,
}

impl MeshletNode {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn parent_link(&self) -> ParentLink {
        self.parent
    }

    /// `f32::INFINITY` until the node is consumed by a parent group.
    pub fn parent_error(&self) -> f32 {
        match self.parent {
            ParentLink::Unset => f32::INFINITY,
            ParentLink::Assigned { error, .. } => error,
        }
    }

    pub fn parent_bounds(&self) -> Option<BoundingSphere> {
        match self.parent {
            ParentLink::Unset => None,
            ParentLink::Assigned { bounds, .. } => Some(bounds),
        }
    }

    pub fn has_parent(&self) -> bool {
        matches!(self.parent, ParentLink::Assigned { .. })
    }
}
