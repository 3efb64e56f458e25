use std::collections::VecDeque;

use log::trace;

use crate::config::AdjacencyStrategy;
use crate::error::{NaniteError, Result};
use crate::processor::edges::{find_adjacent_meshlets, Adjacency};
use crate::processor::types::Edge;

/// Splits a weighted graph into `part_count` parts of roughly equal size.
pub trait GraphPartitioner: Sync {
    /// Returns node indices per part. Every node in `0..adjacency.node_count()`
    /// must appear in exactly one part.
    fn partition(&self, adjacency: &Adjacency, part_count: usize) -> Result<Vec<Vec<usize>>>;
}

impl<T: GraphPartitioner + ?Sized> GraphPartitioner for &T {
    fn partition(&self, adjacency: &Adjacency, part_count: usize) -> Result<Vec<Vec<usize>>> {
        (**self).partition(adjacency, part_count)
    }
}

/// How the meshlets of one level are grouped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LevelPartition {
    /// A single group. Its reduction yields the root.
    Terminal(Vec<usize>),
    /// Several groups, each re-clustered into the next level.
    Subdivide(Vec<Vec<usize>>),
}

impl LevelPartition {
    pub fn group_count(&self) -> usize {
        match self {
            LevelPartition::Terminal(_) => 1,
            LevelPartition::Subdivide(groups) => groups.len(),
        }
    }
}

/// Groups the meshlets of a level, given their boundary edges.
///
/// Levels with at most `group_size` meshlets become one terminal group without
/// consulting the partitioner.
pub fn partition_level<P: GraphPartitioner + ?Sized>(
    partitioner: &P,
    boundary_edges: &[&[Edge]],
    group_size: usize,
    strategy: AdjacencyStrategy,
) -> Result<LevelPartition> {
    let n = boundary_edges.len();
    if n <= group_size {
        return Ok(LevelPartition::Terminal((0..n).collect()));
    }

    let part_count = n.div_ceil(group_size);
    let adjacency = find_adjacent_meshlets(boundary_edges, strategy);
    let parts = partitioner.partition(&adjacency, part_count)?;
    let mut groups = validate_partition(parts, n)?;
    trace!("Partitioned {} meshlets into {} groups (requested {})", n, groups.len(), part_count);

    if groups.len() == 1 {
        return Ok(LevelPartition::Terminal(groups.remove(0)));
    }
    Ok(LevelPartition::Subdivide(groups))
}

/// Checks that `parts` covers `0..n` exactly once. Empty parts are dropped.
fn validate_partition(parts: Vec<Vec<usize>>, n: usize) -> Result<Vec<Vec<usize>>> {
    let mut seen = vec![false; n];
    for &idx in parts.iter().flatten() {
        if idx >= n {
            return Err(NaniteError::Partitioning(format!("part references node {idx}, only {n} nodes exist")));
        }
        if seen[idx] {
            return Err(NaniteError::Partitioning(format!("node {idx} assigned to more than one part")));
        }
        seen[idx] = true;
    }
    if let Some(missing) = seen.iter().position(|s| !s) {
        return Err(NaniteError::Partitioning(format!("node {missing} not assigned to any part")));
    }
    Ok(parts.into_iter().filter(|p| !p.is_empty()).collect())
}

/// Breadth-first region growing. Heavier-connected neighbours are visited first and
/// each region is capped at `ceil(n / part_count)` nodes. When disconnected pieces or
/// cut-off fragments leave more regions than requested, they are packed into
/// `part_count` parts, largest region first into the smallest part.
#[derive(Copy, Clone, Debug, Default)]
pub struct GreedyPartitioner;

impl GraphPartitioner for GreedyPartitioner {
    fn partition(&self, adjacency: &Adjacency, part_count: usize) -> Result<Vec<Vec<usize>>> {
        let n = adjacency.node_count();
        if part_count == 0 {
            return Err(NaniteError::Partitioning("requested 0 parts".into()));
        }
        let target_size = n.div_ceil(part_count).max(1);

        // bitset of assigned nodes
        let mut assigned = vec![0u64; n.div_ceil(64)];
        let is_assigned = |v: &[u64], i: usize| (v[i / 64] & (1 << (i % 64))) != 0;
        let set_assigned = |v: &mut [u64], i: usize| v[i / 64] |= 1 << (i % 64);

        let mut parts = Vec::with_capacity(part_count);
        let mut queue = VecDeque::with_capacity(target_size * 2);
        let mut ranked: Vec<(u32, u32)> = Vec::new();

        for start in 0..n {
            if is_assigned(&assigned, start) {
                continue;
            }

            let mut part = Vec::with_capacity(target_size);
            queue.clear();
            queue.push_back(start);

            // nodes are marked when they join a part, so anything left in the
            // queue at the size cap stays free for later parts
            while let Some(node) = queue.pop_front() {
                if is_assigned(&assigned, node) {
                    continue;
                }
                set_assigned(&mut assigned, node);
                part.push(node);
                if part.len() >= target_size {
                    break;
                }

                ranked.clear();
                ranked.extend(
                    adjacency
                        .get_neighbors(node)
                        .iter()
                        .zip(adjacency.get_weights(node))
                        .map(|(&nb, &w)| (nb, w))
                        .filter(|&(nb, _)| !is_assigned(&assigned, nb as usize)),
                );
                ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
                queue.extend(ranked.iter().map(|&(nb, _)| nb as usize));
            }

            parts.push(part);
        }

        Ok(pack_regions(parts, part_count))
    }
}

/// Merges regions down to at most `part_count` parts.
fn pack_regions(mut regions: Vec<Vec<usize>>, part_count: usize) -> Vec<Vec<usize>> {
    if regions.len() <= part_count {
        return regions;
    }
    trace!("Packing {} regions into {} parts", regions.len(), part_count);

    // stable, so equal-sized regions keep discovery order
    regions.sort_by(|a, b| b.len().cmp(&a.len()));
    let mut parts: Vec<Vec<usize>> = vec![Vec::new(); part_count];
    for region in regions {
        let smallest = parts
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| p.len())
            .map_or(0, |(i, _)| i);
        parts[smallest].extend(region);
    }
    parts
}
