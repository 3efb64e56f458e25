use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use lume_nanite::{BuildConfig, NaniteBuilder, NaniteFlatAsset};
use std::path::{Path, PathBuf};

/// Offline meshlet LOD hierarchy builder.
#[derive(Parser, Debug)]
#[command(name = "lume-processor")]
#[command(about = "Builds a meshlet LOD DAG from an OBJ file and writes a packed .lad asset")]
struct Args {
    /// Input OBJ file.
    input: PathBuf,

    /// Output asset path.
    output: PathBuf,

    /// Maximum number of simplified levels above the leaves.
    #[arg(long, default_value_t = BuildConfig::default().max_lods)]
    max_lods: u32,

    /// Meshlets per simplification group.
    #[arg(long, default_value_t = BuildConfig::default().group_size)]
    group_size: usize,

    /// Relative error bound handed to the simplifier.
    #[arg(long, default_value_t = BuildConfig::default().target_simplify_error)]
    target_error: f32,

    /// Center the mesh and scale its longest side to 2.
    #[arg(long)]
    normalize: bool,
}

impl Args {
    fn build_config(&self) -> BuildConfig {
        BuildConfig {
            max_lods: self.max_lods,
            group_size: self.group_size,
            target_simplify_error: self.target_error,
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let start_total = std::time::Instant::now();
    let (positions, indices) = load_obj_welded(&args.input, args.normalize)?;
    info!(
        "Loaded and welded {} in {:.2}s: {} vertices, {} triangles",
        args.input.display(),
        start_total.elapsed().as_secs_f32(),
        positions.len(),
        indices.len() / 3
    );

    let build_start = std::time::Instant::now();
    let builder = NaniteBuilder::new(positions).with_config(args.build_config());
    let dag = builder
        .build(&indices)
        .with_context(|| format!("Failed to build meshlet hierarchy for {}", args.input.display()))?;
    let leaves = dag.leaf_stats();
    info!(
        "Nanite build complete in {:.2}s: {} LOD levels, {} meshlets ({} leaves, {} leaf triangles)",
        build_start.elapsed().as_secs_f32(),
        dag.lod_level_count(),
        dag.nodes().len(),
        leaves.meshlet_count,
        leaves.triangle_count
    );

    let save_start = std::time::Instant::now();
    let asset = NaniteFlatAsset::from_dag(&dag, builder.positions());
    asset
        .save_to_file(&args.output)
        .with_context(|| format!("Failed to write asset: {}", args.output.display()))?;
    info!("Saved to {} in {:.2}s", args.output.display(), save_start.elapsed().as_secs_f32());
    info!("Total execution time: {:.2}s", start_total.elapsed().as_secs_f32());

    Ok(())
}

/// Loads every model of an OBJ into one position/index buffer and welds duplicate positions.
fn load_obj_welded(path: &Path, normalize: bool) -> Result<(Vec<[f32; 3]>, Vec<u32>)> {
    let (models, _materials) = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS)
        .with_context(|| format!("Failed to load OBJ file: {}", path.display()))?;
    if models.is_empty() {
        bail!("No models found in {}", path.display());
    }

    let mut raw_positions: Vec<[f32; 3]> = Vec::new();
    let mut raw_indices = Vec::new();
    for model in models {
        let mesh = &model.mesh;
        let index_offset = raw_positions.len() as u32;
        raw_positions.extend(mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));
        raw_indices.extend(mesh.indices.iter().map(|&i| i + index_offset));
    }

    // the simplifier can only lock borders that are shared by index
    use meshopt::{generate_vertex_remap, remap_index_buffer, remap_vertex_buffer};
    let (vertex_count, remap) = generate_vertex_remap(&raw_positions, Some(raw_indices.as_slice()));
    let mut positions = remap_vertex_buffer(&raw_positions, vertex_count, &remap);
    let indices = remap_index_buffer(Some(raw_indices.as_slice()), vertex_count, &remap);

    if normalize {
        normalize_to_unit_cube(&mut positions);
    }
    Ok((positions, indices))
}

/// Centers the mesh and scales its longest side to 2.
fn normalize_to_unit_cube(positions: &mut [[f32; 3]]) {
    let mut min_p = [f32::MAX; 3];
    let mut max_p = [f32::MIN; 3];
    for p in positions.iter() {
        for i in 0..3 {
            min_p[i] = min_p[i].min(p[i]);
            max_p[i] = max_p[i].max(p[i]);
        }
    }
    let center = [(min_p[0] + max_p[0]) / 2.0, (min_p[1] + max_p[1]) / 2.0, (min_p[2] + max_p[2]) / 2.0];
    let max_dim = (0..3).map(|i| max_p[i] - min_p[i]).fold(0.0f32, f32::max);
    let scale = if max_dim > 0.0 { 2.0 / max_dim } else { 1.0 };

    for p in positions.iter_mut() {
        for i in 0..3 {
            p[i] = (p[i] - center[i]) * scale;
        }
    }
}
