use meshopt::{simplify, simplify_scale, SimplifyOptions, VertexDataAdapter};

use crate::error::{NaniteError, Result};

pub struct SimplifiedMesh {
    pub indices: Vec<u32>,
    /// Error in the simplifier's relative units.
    pub error: f32,
    /// Multiplier taking `error` to world units.
    pub error_scale: f32,
}

impl SimplifiedMesh {
    pub fn world_error(&self) -> f32 {
        self.error * self.error_scale
    }
}

/// Decimates a triangle list toward a target index count.
pub trait Simplifier: Sync {
    fn simplify(
        &self,
        positions: &[[f32; 3]],
        indices: &[u32],
        target_index_count: usize,
        target_error: f32,
        lock_border: bool,
    ) -> Result<SimplifiedMesh>;
}

impl<T: Simplifier + ?Sized> Simplifier for &T {
    fn simplify(
        &self,
        positions: &[[f32; 3]],
        indices: &[u32],
        target_index_count: usize,
        target_error: f32,
        lock_border: bool,
    ) -> Result<SimplifiedMesh> {
        (**self).simplify(positions, indices, target_index_count, target_error, lock_border)
    }
}

pub(crate) fn position_adapter(positions: &[[f32; 3]]) -> Result<VertexDataAdapter<'_>> {
    VertexDataAdapter::new(bytemuck::cast_slice(positions), std::mem::size_of::<[f32; 3]>(), 0)
        .map_err(|e| NaniteError::Simplification(format!("invalid vertex data: {e:?}")))
}

/// Quadric simplification from meshoptimizer.
#[derive(Copy, Clone, Debug, Default)]
pub struct MeshoptSimplifier;

impl Simplifier for MeshoptSimplifier {
    fn simplify(
        &self,
        positions: &[[f32; 3]],
        indices: &[u32],
        target_index_count: usize,
        target_error: f32,
        lock_border: bool,
    ) -> Result<SimplifiedMesh> {
        let adapter = position_adapter(positions)?;
        let options = if lock_border { SimplifyOptions::LockBorder } else { SimplifyOptions::empty() };

        let mut error = 0.0;
        let simplified = simplify(indices, &adapter, target_index_count, target_error, options, Some(&mut error));

        Ok(SimplifiedMesh {
            indices: simplified,
            error,
            error_scale: simplify_scale(&adapter),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat n x n quad grid in the XZ plane.
    fn grid(n: u32) -> (Vec<[f32; 3]>, Vec<u32>) {
        let mut positions = Vec::new();
        for z in 0..=n {
            for x in 0..=n {
                positions.push([x as f32, 0.0, z as f32]);
            }
        }
        let mut indices = Vec::new();
        let row = n + 1;
        for z in 0..n {
            for x in 0..n {
                let i = z * row + x;
                indices.extend_from_slice(&[i, i + row, i + 1, i + 1, i + row, i + row + 1]);
            }
        }
        (positions, indices)
    }

    #[test]
    fn test_flat_grid_halves_without_error() {
        let (positions, indices) = grid(8);
        let result = MeshoptSimplifier
            .simplify(&positions, &indices, indices.len() / 2, 0.05, false)
            .unwrap();
        assert!(result.indices.len() <= indices.len() / 2);
        assert_eq!(result.indices.len() % 3, 0);
        assert!(result.error < 1e-4);
        assert!((result.error_scale - 8.0).abs() < 1e-4);
    }

    #[test]
    fn test_locked_border_keeps_outline() {
        let (positions, indices) = grid(4);
        let result = MeshoptSimplifier.simplify(&positions, &indices, 0, 1.0, true).unwrap();
        // every border vertex of the original grid survives
        for (i, p) in positions.iter().enumerate() {
            let on_border = p[0] == 0.0 || p[0] == 4.0 || p[2] == 0.0 || p[2] == 4.0;
            if on_border {
                assert!(result.indices.contains(&(i as u32)), "border vertex {i} was removed");
            }
        }
    }
}
