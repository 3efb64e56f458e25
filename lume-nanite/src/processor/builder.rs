use log::{debug, info, trace};
use rayon::prelude::*;

use crate::config::BuildConfig;
use crate::error::{NaniteError, Result};
use crate::processor::clusterer::{Clusterer, MeshoptClusterer};
use crate::processor::partitioner::{partition_level, GraphPartitioner, GreedyPartitioner, LevelPartition};
use crate::processor::registry::{MeshletDag, MeshletRegistry};
use crate::processor::simplifier::{MeshoptSimplifier, Simplifier};
use crate::processor::types::{BoundingSphere, Edge, MeshletId};

/// Builds the meshlet LOD hierarchy for one vertex buffer.
///
/// Leaves are clustered from the input triangles. Each following level groups
/// neighbouring meshlets, simplifies every group to half its triangles with the
/// group border locked, and re-clusters the result. The build stops once a level
/// holds a single meshlet, which becomes the root.
pub struct NaniteBuilder<C = MeshoptClusterer, S = MeshoptSimplifier, P = GreedyPartitioner> {
    positions: Vec<[f32; 3]>,
    config: BuildConfig,
    clusterer: C,
    simplifier: S,
    partitioner: P,
}

/// Result of simplifying one group, before any node is created for it.
struct GroupReduction {
    children: Vec<MeshletId>,
    merged_index_count: usize,
    simplified_index_count: usize,
    total_error: f32,
    bounds: BoundingSphere,
    /// Index buffers of the nodes this group turns into.
    parts: Vec<Vec<u32>>,
}

impl NaniteBuilder {
    pub fn new(positions: Vec<[f32; 3]>) -> Self {
        Self {
            positions,
            config: BuildConfig::default(),
            clusterer: MeshoptClusterer,
            simplifier: MeshoptSimplifier,
            partitioner: GreedyPartitioner,
        }
    }
}

impl<C, S, P> NaniteBuilder<C, S, P>
where
    C: Clusterer,
    S: Simplifier,
    P: GraphPartitioner,
{
    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clusterer<C2: Clusterer>(self, clusterer: C2) -> NaniteBuilder<C2, S, P> {
        NaniteBuilder {
            positions: self.positions,
            config: self.config,
            clusterer,
            simplifier: self.simplifier,
            partitioner: self.partitioner,
        }
    }

    pub fn with_simplifier<S2: Simplifier>(self, simplifier: S2) -> NaniteBuilder<C, S2, P> {
        NaniteBuilder {
            positions: self.positions,
            config: self.config,
            clusterer: self.clusterer,
            simplifier,
            partitioner: self.partitioner,
        }
    }

    pub fn with_partitioner<P2: GraphPartitioner>(self, partitioner: P2) -> NaniteBuilder<C, S, P2> {
        NaniteBuilder {
            positions: self.positions,
            config: self.config,
            clusterer: self.clusterer,
            simplifier: self.simplifier,
            partitioner,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    /// Builds the full hierarchy for a triangle list. Either every invariant holds
    /// on the returned DAG or the whole build fails.
    pub fn build(&self, indices: &[u32]) -> Result<MeshletDag> {
        self.config.validate()?;
        self.validate_indices(indices)?;

        let mut registry = MeshletRegistry::new();
        let mesh_bounds = BoundingSphere::from_indices(&self.positions, indices);
        let leaves = self.cluster(indices)?;
        let mut current = self.create_meshlets(&mut registry, leaves, 0, 0.0, mesh_bounds)?;
        debug!("LOD 0: {} meshlets from {} triangles", current.len(), indices.len() / 3);

        // a single leaf is already the root
        if current.len() == 1 {
            info!("Mesh fits into one meshlet, no LOD levels built");
            return Ok(registry.finish(current[0]));
        }

        let mut lod_level = 1;
        loop {
            let partition = {
                let boundary_edges: Vec<&[Edge]> = current
                    .iter()
                    .map(|&id| registry.get(id).boundary_edges.as_slice())
                    .collect();
                partition_level(
                    &self.partitioner,
                    &boundary_edges,
                    self.config.group_size,
                    self.config.adjacency,
                )?
            };
            debug!(
                "LOD {}: {} meshlets in {} groups",
                lod_level,
                current.len(),
                partition.group_count()
            );

            current = self.reduce_level(&mut registry, &current, partition, lod_level)?;
            if current.len() < 2 {
                break;
            }
            if lod_level >= self.config.max_lods {
                return Err(NaniteError::LevelCapExceeded {
                    max_lods: self.config.max_lods,
                    meshlet_count: current.len(),
                });
            }
            lod_level += 1;
        }

        if current.len() != 1 {
            return Err(NaniteError::InconsistentHierarchy { meshlet_count: current.len() });
        }

        info!(
            "Built {} LOD levels, {} meshlets in total",
            lod_level + 1,
            registry.len()
        );
        Ok(registry.finish(current[0]))
    }

    fn validate_indices(&self, indices: &[u32]) -> Result<()> {
        if indices.len() % 3 != 0 {
            return Err(NaniteError::InvalidIndexBuffer(indices.len()));
        }
        if indices.is_empty() {
            return Err(NaniteError::EmptyMesh);
        }
        if let Some(index) = self.first_out_of_range(indices) {
            return Err(NaniteError::IndexOutOfRange { index, vertex_count: self.positions.len() });
        }
        Ok(())
    }

    fn first_out_of_range(&self, indices: &[u32]) -> Option<u32> {
        indices.iter().copied().find(|&i| i as usize >= self.positions.len())
    }

    fn cluster(&self, indices: &[u32]) -> Result<Vec<Vec<u32>>> {
        let parts = self.clusterer.cluster(
            &self.positions,
            indices,
            self.config.meshlet_max_vertices,
            self.config.meshlet_max_triangles,
        )?;
        if parts.is_empty() && !indices.is_empty() {
            return Err(NaniteError::Clustering(format!(
                "{} triangles produced no meshlets",
                indices.len() / 3
            )));
        }
        for part in &parts {
            if part.len() % 3 != 0 {
                return Err(NaniteError::Clustering(format!(
                    "meshlet with {} indices, not whole triangles",
                    part.len()
                )));
            }
            if let Some(index) = self.first_out_of_range(part) {
                return Err(NaniteError::Clustering(format!(
                    "meshlet references vertex {index}, only {} exist",
                    self.positions.len()
                )));
            }
        }
        Ok(parts)
    }

    /// Turns clustered index buffers into nodes that share one error and bounds.
    fn create_meshlets(
        &self,
        registry: &mut MeshletRegistry,
        parts: Vec<Vec<u32>>,
        lod_level: u32,
        error: f32,
        bounds: BoundingSphere,
    ) -> Result<Vec<MeshletId>> {
        parts
            .into_iter()
            .map(|indices| registry.create_node(&self.positions, indices, lod_level, error, bounds))
            .collect()
    }

    /// Reduces every group of a level and links the results into the registry.
    /// Returns the ids of the next level, in group order.
    fn reduce_level(
        &self,
        registry: &mut MeshletRegistry,
        current: &[MeshletId],
        partition: LevelPartition,
        lod_level: u32,
    ) -> Result<Vec<MeshletId>> {
        let (groups, terminal) = match partition {
            LevelPartition::Terminal(group) => (vec![group], true),
            LevelPartition::Subdivide(groups) => (groups, false),
        };
        let groups: Vec<Vec<MeshletId>> = groups
            .into_iter()
            .map(|group| group.into_iter().map(|i| current[i]).collect())
            .collect();

        // heavy lifting may run in parallel; linking below stays in group order
        let reader: &MeshletRegistry = registry;
        let reductions: Vec<GroupReduction> = if self.config.parallel && groups.len() > 1 {
            groups
                .par_iter()
                .map(|children| self.reduce_group(reader, children, terminal))
                .collect::<Result<_>>()?
        } else {
            groups
                .iter()
                .map(|children| self.reduce_group(reader, children, terminal))
                .collect::<Result<_>>()?
        };

        let mut original_tris = 0;
        let mut simplified_tris = 0;
        let mut next_level = Vec::with_capacity(reductions.len() * 2);
        for reduction in reductions {
            original_tris += reduction.merged_index_count / 3;
            simplified_tris += reduction.simplified_index_count / 3;

            let new_ids = self.create_meshlets(
                registry,
                reduction.parts,
                lod_level,
                reduction.total_error,
                reduction.bounds,
            )?;
            for &child in &reduction.children {
                registry.assign_parent(child, reduction.total_error, reduction.bounds)?;
            }
            // siblings from one group all depend on the whole group
            for &id in &new_ids {
                registry.add_children(id, &reduction.children);
            }
            next_level.extend(new_ids);
        }

        debug!(
            "LOD {} summary: tris {} -> {}, ratio {:.2}, {} meshlets",
            lod_level,
            original_tris,
            simplified_tris,
            simplified_tris as f32 / original_tris.max(1) as f32,
            next_level.len()
        );
        Ok(next_level)
    }

    fn reduce_group(
        &self,
        registry: &MeshletRegistry,
        children: &[MeshletId],
        terminal: bool,
    ) -> Result<GroupReduction> {
        let merged = merge_meshlets(children.iter().map(move |&id| registry.get(id).indices.as_slice()));
        let target_index_count = merged.len() / self.config.decimate_factor;

        let simplified = self.simplifier.simplify(
            &self.positions,
            &merged,
            target_index_count,
            self.config.target_simplify_error,
            true,
        )?;
        if simplified.indices.len() % 3 != 0 {
            return Err(NaniteError::Simplification(format!(
                "returned {} indices, not whole triangles",
                simplified.indices.len()
            )));
        }
        if let Some(index) = self.first_out_of_range(&simplified.indices) {
            return Err(NaniteError::Simplification(format!(
                "returned vertex {index}, only {} exist",
                self.positions.len()
            )));
        }
        if simplified.indices.is_empty() && !merged.is_empty() {
            return Err(NaniteError::Simplification(format!(
                "group of {} meshlets collapsed to nothing",
                children.len()
            )));
        }
        let error_now = simplified.world_error();
        if !error_now.is_finite() || error_now < 0.0 {
            return Err(NaniteError::Simplification(format!(
                "invalid error {} (scale {})",
                simplified.error, simplified.error_scale
            )));
        }

        // accumulate on top of the worst child so the bound covers the whole chain
        let children_error = children
            .iter()
            .map(|&id| registry.get(id).max_siblings_error)
            .fold(0.0f32, f32::max);
        let total_error = error_now + children_error;
        let bounds = BoundingSphere::from_indices(&self.positions, &simplified.indices);

        trace!(
            "Group of {}: {} -> {} indices, error {:.5} + {:.5}",
            children.len(),
            merged.len(),
            simplified.indices.len(),
            error_now,
            children_error
        );

        let simplified_index_count = simplified.indices.len();
        let parts = if terminal {
            vec![simplified.indices]
        } else {
            self.cluster(&simplified.indices)?
        };

        Ok(GroupReduction {
            children: children.to_vec(),
            merged_index_count: merged.len(),
            simplified_index_count,
            total_error,
            bounds,
            parts,
        })
    }
}

/// Concatenates index buffers in the given order.
pub fn merge_meshlets<'a, I>(buffers: I) -> Vec<u32>
where
    I: IntoIterator<Item = &'a [u32]> + Clone,
{
    let len = buffers.clone().into_iter().map(|b| b.len()).sum();
    let mut merged = Vec::with_capacity(len);
    for buffer in buffers {
        merged.extend_from_slice(buffer);
    }
    merged
}
