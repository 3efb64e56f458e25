use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::AdjacencyStrategy;
use crate::processor::types::Edge;

/// All triangle edges of an index buffer, with repeats. Degenerate edges are skipped.
pub fn edges_of(indices: &[u32]) -> Vec<Edge> {
    let mut edges = Vec::with_capacity(indices.len());
    for tri in indices.chunks_exact(3) {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            if a != b {
                edges.push(Edge::new(a, b));
            }
        }
    }
    edges
}

/// Edges that occur exactly once, in order of first appearance.
pub fn boundary_edges_of(edges: &[Edge]) -> Vec<Edge> {
    let mut counts: HashMap<Edge, u32> = HashMap::with_capacity(edges.len());
    for &edge in edges {
        *counts.entry(edge).or_insert(0) += 1;
    }
    edges.iter().copied().filter(|e| counts[e] == 1).collect()
}

/// Weighted meshlet graph in CSR form. Weight = number of shared boundary edges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Adjacency {
    pub offsets: Vec<u32>,
    pub neighbors: Vec<u32>,
    pub weights: Vec<u32>,
}

impl Adjacency {
    /// Builds the CSR arrays from undirected `(min, max) -> weight` pairs.
    fn from_pairs(node_count: usize, pairs: &BTreeMap<(u32, u32), u32>) -> Self {
        let mut offsets = vec![0u32; node_count + 1];
        for &(a, b) in pairs.keys() {
            offsets[a as usize + 1] += 1;
            offsets[b as usize + 1] += 1;
        }

        // prefix sum
        for i in 0..node_count {
            offsets[i + 1] += offsets[i];
        }

        let mut cursor = offsets.clone();
        let mut neighbors = vec![0u32; pairs.len() * 2];
        let mut weights = vec![0u32; pairs.len() * 2];
        for (&(a, b), &w) in pairs {
            let slot = cursor[a as usize] as usize;
            neighbors[slot] = b;
            weights[slot] = w;
            cursor[a as usize] += 1;

            let slot = cursor[b as usize] as usize;
            neighbors[slot] = a;
            weights[slot] = w;
            cursor[b as usize] += 1;
        }

        Self { offsets, neighbors, weights }
    }

    pub fn node_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn get_neighbors(&self, node: usize) -> &[u32] {
        let start = self.offsets[node] as usize;
        let end = self.offsets[node + 1] as usize;
        &self.neighbors[start..end]
    }

    pub fn get_weights(&self, node: usize) -> &[u32] {
        let start = self.offsets[node] as usize;
        let end = self.offsets[node + 1] as usize;
        &self.weights[start..end]
    }

    /// Weight of the edge between two nodes, 0 if they do not touch.
    pub fn weight(&self, a: usize, b: usize) -> u32 {
        self.get_neighbors(a)
            .iter()
            .zip(self.get_weights(a))
            .find(|(n, _)| **n as usize == b)
            .map_or(0, |(_, w)| *w)
    }
}

pub fn find_adjacent_meshlets(boundary_edges: &[&[Edge]], strategy: AdjacencyStrategy) -> Adjacency {
    match strategy {
        AdjacencyStrategy::EdgeMap => find_adjacent_meshlets_map(boundary_edges),
        AdjacencyStrategy::PairwiseScan => find_adjacent_meshlets_pairwise(boundary_edges),
    }
}

pub fn find_adjacent_meshlets_map(boundary_edges: &[&[Edge]]) -> Adjacency {
    let mut owners: HashMap<Edge, Vec<u32>> = HashMap::new();
    for (meshlet, edges) in boundary_edges.iter().enumerate() {
        for &edge in edges.iter() {
            let list = owners.entry(edge).or_default();
            // boundary sets hold each edge once, but stay safe on repeats
            if list.last() != Some(&(meshlet as u32)) {
                list.push(meshlet as u32);
            }
        }
    }

    let mut pairs = BTreeMap::new();
    for list in owners.values().filter(|l| l.len() > 1) {
        for (i, &a) in list.iter().enumerate() {
            for &b in &list[i + 1..] {
                *pairs.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
    }

    Adjacency::from_pairs(boundary_edges.len(), &pairs)
}

pub fn find_adjacent_meshlets_pairwise(boundary_edges: &[&[Edge]]) -> Adjacency {
    let sets: Vec<HashSet<Edge>> = boundary_edges
        .iter()
        .map(|edges| edges.iter().copied().collect())
        .collect();

    let mut pairs = BTreeMap::new();
    for a in 0..sets.len() {
        for b in (a + 1)..sets.len() {
            let shared = sets[a].intersection(&sets[b]).count() as u32;
            if shared > 0 {
                pairs.insert((a as u32, b as u32), shared);
            }
        }
    }

    Adjacency::from_pairs(boundary_edges.len(), &pairs)
}
