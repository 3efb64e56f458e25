use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use lume_nanite::processor::clusterer::Clusterer;
use lume_nanite::processor::edges::Adjacency;
use lume_nanite::processor::partitioner::{GraphPartitioner, GreedyPartitioner};
use lume_nanite::processor::simplifier::{SimplifiedMesh, Simplifier};
use lume_nanite::{AdjacencyStrategy, BuildConfig, MeshletDag, NaniteBuilder, NaniteError, NaniteFlatAsset, Result};

const TRIS_PER_MESHLET: usize = 4;
const LEVEL_ERROR: f32 = 0.01;
const ERROR_SCALE: f32 = 2.0;

/// Cuts the triangle list into consecutive runs of `TRIS_PER_MESHLET` triangles.
struct ChunkClusterer;

impl Clusterer for ChunkClusterer {
    fn cluster(&self, _: &[[f32; 3]], indices: &[u32], _: usize, _: usize) -> Result<Vec<Vec<u32>>> {
        Ok(indices.chunks(TRIS_PER_MESHLET * 3).map(|c| c.to_vec()).collect())
    }
}

/// Keeps the leading triangles up to the target count, at least one.
#[derive(Default)]
struct TruncatingSimplifier {
    calls: AtomicUsize,
}

impl Simplifier for TruncatingSimplifier {
    fn simplify(
        &self,
        _: &[[f32; 3]],
        indices: &[u32],
        target_index_count: usize,
        _: f32,
        lock_border: bool,
    ) -> Result<SimplifiedMesh> {
        assert!(lock_border, "group borders must stay locked");
        self.calls.fetch_add(1, Ordering::SeqCst);
        let keep = (target_index_count / 3 * 3).max(3).min(indices.len());
        Ok(SimplifiedMesh {
            indices: indices[..keep].to_vec(),
            error: LEVEL_ERROR,
            error_scale: ERROR_SCALE,
        })
    }
}

struct FailingSimplifier;

impl Simplifier for FailingSimplifier {
    fn simplify(&self, _: &[[f32; 3]], _: &[u32], _: usize, _: f32, _: bool) -> Result<SimplifiedMesh> {
        Err(NaniteError::Simplification("cannot meet constraints".into()))
    }
}

/// Answers every request with a triangle on a vertex that does not exist.
struct StraySimplifier;

impl Simplifier for StraySimplifier {
    fn simplify(&self, _: &[[f32; 3]], _: &[u32], _: usize, _: f32, _: bool) -> Result<SimplifiedMesh> {
        Ok(SimplifiedMesh { indices: vec![9999, 9999, 9999], error: 0.0, error_scale: 1.0 })
    }
}

/// Like `ChunkClusterer`, but shifts the last meshlet past the vertex buffer.
struct StrayClusterer;

impl Clusterer for StrayClusterer {
    fn cluster(&self, positions: &[[f32; 3]], indices: &[u32], max_v: usize, max_t: usize) -> Result<Vec<Vec<u32>>> {
        let mut parts = ChunkClusterer.cluster(positions, indices, max_v, max_t)?;
        if let Some(last) = parts.last_mut() {
            last[0] = positions.len() as u32;
        }
        Ok(parts)
    }
}

/// Contiguous runs of `ceil(n / parts)` nodes. Records every request and answer.
#[derive(Default)]
struct ChunkPartitioner {
    calls: Mutex<Vec<(usize, usize, Vec<Vec<usize>>)>>,
}

impl GraphPartitioner for ChunkPartitioner {
    fn partition(&self, adjacency: &Adjacency, part_count: usize) -> Result<Vec<Vec<usize>>> {
        let n = adjacency.node_count();
        let size = n.div_ceil(part_count);
        let parts: Vec<Vec<usize>> = (0..n).collect::<Vec<_>>().chunks(size).map(|c| c.to_vec()).collect();
        self.calls.lock().unwrap().push((n, part_count, parts.clone()));
        Ok(parts)
    }
}

/// Triangle strip: triangle `i` is `(i, i + 1, i + 2)`, neighbours share an edge.
fn strip(triangle_count: u32) -> (Vec<[f32; 3]>, Vec<u32>) {
    let positions = (0..triangle_count + 2)
        .map(|i| [(i / 2) as f32, (i % 2) as f32, 0.0])
        .collect();
    let indices = (0..triangle_count).flat_map(|i| [i, i + 1, i + 2]).collect();
    (positions, indices)
}

fn fake_builder(
    positions: Vec<[f32; 3]>,
) -> NaniteBuilder<ChunkClusterer, TruncatingSimplifier, ChunkPartitioner> {
    NaniteBuilder::new(positions)
        .with_clusterer(ChunkClusterer)
        .with_simplifier(TruncatingSimplifier::default())
        .with_partitioner(ChunkPartitioner::default())
}

fn triangles_for(meshlets: u32) -> u32 {
    meshlets * TRIS_PER_MESHLET as u32
}

/// Structural invariants every successful build has to satisfy.
fn assert_invariants(dag: &MeshletDag) {
    let nodes = dag.nodes();

    let ids: HashSet<u32> = nodes.iter().map(|n| n.id).collect();
    assert_eq!(ids.len(), nodes.len(), "ids must be unique");
    for (i, node) in nodes.iter().enumerate() {
        assert_eq!(node.id as usize, i, "id must equal creation position");
        assert_eq!(node.indices.len() % 3, 0);
    }

    let orphans: Vec<u32> = nodes.iter().filter(|n| !n.has_parent()).map(|n| n.id).collect();
    assert_eq!(orphans, vec![dag.root_id()], "exactly the root has no parent");
    assert_eq!(dag.root().parent_error(), f32::INFINITY);
    assert!(dag.root().parent_bounds().is_none());

    for node in nodes.iter().filter(|n| n.has_parent()) {
        assert!(node.parent_error().is_finite());
        assert!(node.parent_bounds().is_some());
        assert!(node.max_siblings_error <= node.parent_error());
    }

    for parent in nodes {
        for &child in &parent.created_from {
            let child = dag.get(child).unwrap();
            assert_eq!(child.parent_error(), parent.max_siblings_error);
            assert_eq!(child.parent_bounds(), Some(parent.shared_siblings_bounds));
            assert_eq!(child.lod_level + 1, parent.lod_level);
        }
    }

    // every leaf is reachable from the root
    let mut reached = HashSet::new();
    let mut stack = vec![dag.root_id()];
    while let Some(id) = stack.pop() {
        if reached.insert(id) {
            stack.extend(dag.get(id).unwrap().created_from.iter().copied());
        }
    }
    for leaf in dag.level(0) {
        assert!(reached.contains(&leaf.id), "leaf {} unreachable from root", leaf.id);
    }
}

#[test]
fn single_meshlet_is_its_own_root() {
    let (positions, indices) = strip(3);
    let builder = fake_builder(positions);
    let dag = builder.build(&indices).unwrap();

    assert_eq!(dag.nodes().len(), 1);
    assert_eq!(dag.root_id(), 0);
    assert_eq!(dag.root().lod_level, 0);
    assert_eq!(dag.root().parent_error(), f32::INFINITY);
    assert_eq!(dag.lod_level_count(), 1);
    assert_eq!(dag.leaf_stats().triangle_count, 3);
    assert_invariants(&dag);
}

#[test]
fn group_sized_level_reduces_once() {
    let (positions, indices) = strip(triangles_for(4));
    let dag = fake_builder(positions).build(&indices).unwrap();

    assert_eq!(dag.nodes().len(), 5);
    assert_eq!(dag.level(0).count(), 4);
    let root = dag.root();
    assert_eq!(root.id, 4);
    assert_eq!(root.lod_level, 1);
    assert_eq!(root.created_from, vec![0, 1, 2, 3]);
    // 16 triangles halved
    assert_eq!(root.triangle_count(), 8);
    assert_eq!(root.max_siblings_error, LEVEL_ERROR * ERROR_SCALE);
    for leaf in dag.level(0) {
        assert_eq!(leaf.parent_error(), LEVEL_ERROR * ERROR_SCALE);
        assert_eq!(leaf.max_siblings_error, 0.0);
    }
    assert_invariants(&dag);
}

#[test]
fn group_sized_level_skips_partitioner() {
    let (positions, indices) = strip(triangles_for(4));
    let simplifier = TruncatingSimplifier::default();
    let partitioner = ChunkPartitioner::default();
    NaniteBuilder::new(positions)
        .with_clusterer(ChunkClusterer)
        .with_simplifier(&simplifier)
        .with_partitioner(&partitioner)
        .build(&indices)
        .unwrap();

    assert!(partitioner.calls.lock().unwrap().is_empty());
    assert_eq!(simplifier.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn every_leaf_feeds_exactly_one_group() {
    let (positions, indices) = strip(triangles_for(17));
    let dag = fake_builder(positions).build(&indices).unwrap();
    assert_eq!(dag.level(0).count(), 17);

    let mut seen = HashSet::new();
    for group_children in dag
        .level(1)
        .map(|n| n.created_from.clone())
        .collect::<HashSet<_>>()
    {
        for child in group_children {
            assert!(seen.insert(child), "leaf {child} appears in two groups");
        }
    }
    assert_eq!(seen.len(), 17);
}

#[test]
fn partition_requests_are_recorded() {
    let (positions, indices) = strip(triangles_for(17));
    let partitioner = ChunkPartitioner::default();
    let dag = NaniteBuilder::new(positions)
        .with_clusterer(ChunkClusterer)
        .with_simplifier(TruncatingSimplifier::default())
        .with_partitioner(&partitioner)
        .build(&indices)
        .unwrap();

    let calls = partitioner.calls.lock().unwrap();
    let (n, part_count, parts) = &calls[0];
    assert_eq!(*n, 17);
    assert_eq!(*part_count, 5);
    let mut covered: Vec<usize> = parts.iter().flatten().copied().collect();
    covered.sort_unstable();
    assert_eq!(covered, (0..17).collect::<Vec<_>>());

    // 17 -> 9 -> 6 -> 3 -> root, the last level skips the partitioner
    assert_eq!(calls.iter().map(|c| c.0).collect::<Vec<_>>(), vec![17, 9, 6]);
    assert_eq!(dag.lod_level_count(), 5);
    assert_eq!(dag.root().lod_level, 4);
}

#[test]
fn errors_accumulate_per_level() {
    let (positions, indices) = strip(triangles_for(17));
    let dag = fake_builder(positions).build(&indices).unwrap();

    for node in dag.nodes() {
        let expected = node.lod_level as f32 * LEVEL_ERROR * ERROR_SCALE;
        assert!((node.max_siblings_error - expected).abs() < 1e-6, "node {} error {}", node.id, node.max_siblings_error);
    }
    assert_invariants(&dag);
}

#[test]
fn siblings_share_children_and_bounds() {
    let (positions, indices) = strip(triangles_for(17));
    let dag = fake_builder(positions).build(&indices).unwrap();

    // first group of level 1 holds leaves 0..4 and splits into two nodes
    let level1: Vec<_> = dag.level(1).collect();
    assert_eq!(level1[0].created_from, vec![0, 1, 2, 3]);
    assert_eq!(level1[1].created_from, vec![0, 1, 2, 3]);
    assert_eq!(level1[0].shared_siblings_bounds, level1[1].shared_siblings_bounds);
    assert_ne!(level1[0].own_bounds, level1[1].own_bounds);
}

#[test]
fn builds_are_deterministic() {
    let (positions, indices) = strip(triangles_for(23));
    let first = fake_builder(positions.clone()).build(&indices).unwrap();
    let second = fake_builder(positions.clone()).build(&indices).unwrap();
    let sequential = fake_builder(positions)
        .with_config(BuildConfig { parallel: false, ..Default::default() })
        .build(&indices)
        .unwrap();

    for other in [&second, &sequential] {
        assert_eq!(first.nodes().len(), other.nodes().len());
        for (a, b) in first.nodes().iter().zip(other.nodes()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.lod_level, b.lod_level);
            assert_eq!(a.indices, b.indices);
            assert_eq!(a.created_from, b.created_from);
        }
    }
    assert_invariants(&first);
}

#[test]
fn level_cap_is_reported() {
    let (positions, indices) = strip(triangles_for(17));
    let result = fake_builder(positions)
        .with_config(BuildConfig { max_lods: 1, ..Default::default() })
        .build(&indices);

    match result {
        Err(NaniteError::LevelCapExceeded { max_lods, meshlet_count }) => {
            assert_eq!(max_lods, 1);
            assert_eq!(meshlet_count, 9);
        }
        other => panic!("expected LevelCapExceeded, got {other:?}"),
    }
}

#[test]
fn simplifier_failure_aborts_build() {
    let (positions, indices) = strip(triangles_for(9));
    let result = NaniteBuilder::new(positions)
        .with_clusterer(ChunkClusterer)
        .with_simplifier(FailingSimplifier)
        .with_partitioner(ChunkPartitioner::default())
        .build(&indices);
    assert!(matches!(result, Err(NaniteError::Simplification(_))));
}

#[test]
fn out_of_range_simplifier_output_is_an_error() {
    let (positions, indices) = grid(20);
    let result = NaniteBuilder::new(positions)
        .with_clusterer(ChunkClusterer)
        .with_simplifier(StraySimplifier)
        .with_partitioner(ChunkPartitioner::default())
        .build(&indices);
    assert!(matches!(result, Err(NaniteError::Simplification(_))), "got {result:?}");
}

#[test]
fn out_of_range_clusterer_output_is_an_error() {
    let (positions, indices) = strip(triangles_for(9));
    let result = NaniteBuilder::new(positions)
        .with_clusterer(StrayClusterer)
        .with_simplifier(TruncatingSimplifier::default())
        .with_partitioner(ChunkPartitioner::default())
        .build(&indices);
    assert!(matches!(result, Err(NaniteError::Clustering(_))), "got {result:?}");
}

#[test]
fn adjacency_strategies_build_the_same_dag() {
    let (positions, indices) = strip(triangles_for(23));
    // greedy grouping follows the adjacency graph, so both strategies are exercised
    let build = |adjacency| {
        fake_builder(positions.clone())
            .with_partitioner(GreedyPartitioner)
            .with_config(BuildConfig { adjacency, ..Default::default() })
            .build(&indices)
            .unwrap()
    };
    let edge_map = build(AdjacencyStrategy::EdgeMap);
    let pairwise = build(AdjacencyStrategy::PairwiseScan);

    assert_invariants(&edge_map);

    assert_eq!(edge_map.root_id(), pairwise.root_id());
    assert_eq!(edge_map.nodes(), pairwise.nodes());
}

#[test]
fn single_leaf_never_simplifies() {
    let (positions, indices) = strip(2);
    let simplifier = TruncatingSimplifier::default();
    let partitioner = ChunkPartitioner::default();
    let dag = NaniteBuilder::new(positions)
        .with_clusterer(ChunkClusterer)
        .with_simplifier(&simplifier)
        .with_partitioner(&partitioner)
        .build(&indices)
        .unwrap();

    assert_eq!(dag.nodes().len(), 1);
    assert_eq!(simplifier.calls.load(Ordering::SeqCst), 0);
    assert!(partitioner.calls.lock().unwrap().is_empty());
}

/// Flat `n` x `n` quad grid.
fn grid(n: u32) -> (Vec<[f32; 3]>, Vec<u32>) {
    let row = n + 1;
    let positions = (0..row * row)
        .map(|i| [(i % row) as f32, 0.0, (i / row) as f32])
        .collect();
    let mut indices = Vec::new();
    for z in 0..n {
        for x in 0..n {
            let i = z * row + x;
            indices.extend_from_slice(&[i, i + row, i + 1, i + 1, i + row, i + row + 1]);
        }
    }
    (positions, indices)
}

#[test]
fn meshopt_grid_builds_valid_hierarchy() {
    let (positions, indices) = grid(32);
    let config = BuildConfig {
        meshlet_max_vertices: 255,
        meshlet_max_triangles: 128,
        ..Default::default()
    };
    let builder = NaniteBuilder::new(positions).with_config(config);
    let dag = builder.build(&indices).unwrap();

    assert_invariants(&dag);
    assert_eq!(dag.leaf_stats().triangle_count, 2048);
    assert!(dag.lod_level_count() > 1);
    assert!(dag.root().triangle_count() < 2048);

    let asset = NaniteFlatAsset::from_dag(&dag, builder.positions());
    assert_eq!(asset.nodes.len(), dag.nodes().len());
    assert_eq!(asset.root, dag.root_id());
    assert_eq!(asset.indices.len(), dag.total_triangle_count() * 3);
}

/// Appends a closed UV sphere with consistent winding.
fn append_sphere(center: [f32; 3], positions: &mut Vec<[f32; 3]>, indices: &mut Vec<u32>) {
    const SEGMENTS: u32 = 16;
    const RINGS: u32 = 8;
    let base = positions.len() as u32;
    let [cx, cy, cz] = center;

    positions.push([cx, cy + 1.0, cz]);
    for r in 1..RINGS {
        let phi = std::f32::consts::PI * r as f32 / RINGS as f32;
        for s in 0..SEGMENTS {
            let theta = std::f32::consts::TAU * s as f32 / SEGMENTS as f32;
            positions.push([cx + phi.sin() * theta.cos(), cy + phi.cos(), cz + phi.sin() * theta.sin()]);
        }
    }
    positions.push([cx, cy - 1.0, cz]);

    let top = base;
    let bottom = base + 1 + (RINGS - 1) * SEGMENTS;
    let ring = |r: u32, s: u32| base + 1 + (r - 1) * SEGMENTS + s % SEGMENTS;
    for s in 0..SEGMENTS {
        indices.extend_from_slice(&[top, ring(1, s + 1), ring(1, s)]);
        for r in 1..RINGS - 1 {
            let (a, b, c, d) = (ring(r, s), ring(r, s + 1), ring(r + 1, s), ring(r + 1, s + 1));
            indices.extend_from_slice(&[a, b, c, b, d, c]);
        }
        indices.extend_from_slice(&[bottom, ring(RINGS - 1, s), ring(RINGS - 1, s + 1)]);
    }
}

#[test]
fn meshopt_disconnected_objects_reach_one_root() {
    // separate objects share no boundary edge, so the adjacency graph has one
    // component per object and every level still has to shrink
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    for i in 0..12 {
        append_sphere([i as f32 * 3.0, 0.0, 0.0], &mut positions, &mut indices);
    }
    assert_eq!(indices.len() / 3, 12 * 224);

    let dag = NaniteBuilder::new(positions).build(&indices).unwrap();

    assert_invariants(&dag);
    assert_eq!(dag.leaf_stats().triangle_count, 12 * 224);
    assert!(dag.lod_level_count() > 2);
    assert!(dag.root().triangle_count() < 12 * 224);
}
