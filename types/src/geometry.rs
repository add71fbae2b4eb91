use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    #[must_use]
    pub const fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Bounds of a flat `[x0, y0, z0, x1, ...]` position buffer.
    ///
    /// Returns `None` for an empty buffer.
    #[must_use]
    pub fn from_positions(positions: &[f64]) -> Option<Self> {
        let mut points = positions.chunks_exact(3);
        let first = points.next()?;
        let mut bbox = Self::new([first[0], first[1], first[2]], [first[0], first[1], first[2]]);
        for p in points {
            for axis in 0..3 {
                bbox.min[axis] = bbox.min[axis].min(p[axis]);
                bbox.max[axis] = bbox.max[axis].max(p[axis]);
            }
        }
        Some(bbox)
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for axis in 0..3 {
            out.min[axis] = out.min[axis].min(other.min[axis]);
            out.max[axis] = out.max[axis].max(other.max[axis]);
        }
        out
    }

    #[must_use]
    pub fn center(&self, axis: usize) -> f64 {
        0.5 * (self.min[axis] + self.max[axis])
    }

    #[must_use]
    pub fn extent(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("position buffer length {len} is not a multiple of 3")]
    RaggedPositions { len: usize },
    #[error("index buffer length {len} is not a multiple of 3")]
    RaggedIndices { len: usize },
    #[error("triangle index {index} out of range for {vertices} vertices")]
    IndexOutOfRange { index: u32, vertices: usize },
}

/// Triangulated surface: flat xyz positions plus triangle indices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SurfaceGeometry {
    positions: Vec<f64>,
    indices: Vec<u32>,
}

impl SurfaceGeometry {
    pub fn new(positions: Vec<f64>, indices: Vec<u32>) -> Result<Self, GeometryError> {
        if positions.len() % 3 != 0 {
            return Err(GeometryError::RaggedPositions {
                len: positions.len(),
            });
        }
        if indices.len() % 3 != 0 {
            return Err(GeometryError::RaggedIndices { len: indices.len() });
        }
        let vertices = positions.len() / 3;
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices) {
            return Err(GeometryError::IndexOutOfRange { index, vertices });
        }
        Ok(Self { positions, indices })
    }

    #[must_use]
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn points(&self) -> impl Iterator<Item = [f64; 3]> + '_ {
        self.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]])
    }

    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_positions(&self.positions)
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<f64>, Vec<u32>) {
        (self.positions, self.indices)
    }
}
