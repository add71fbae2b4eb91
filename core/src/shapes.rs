//! Simple observation grids sized from the scene.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use arche_types::{BoundingBox, GeometryError, SurfaceGeometry};
use serde::{Deserialize, Serialize};

const DISK_SEGMENTS: u32 = 100;

/// Plane an observation grid lies in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    XY,
    XZ,
    YZ,
}

impl Orientation {
    /// (in-plane axes, normal axis) as 0 = x, 1 = y, 2 = z.
    fn axes(self) -> ([usize; 2], usize) {
        match self {
            Self::XY => ([0, 1], 2),
            Self::XZ => ([0, 2], 1),
            Self::YZ => ([1, 2], 0),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::XY => "XY",
            Self::XZ => "XZ",
            Self::YZ => "YZ",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown orientation `{0}` (expected XY, XZ or YZ)")]
pub struct ParseOrientationError(String);

impl FromStr for Orientation {
    type Err = ParseOrientationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "XY" | "YX" => Ok(Self::XY),
            "XZ" | "ZX" => Ok(Self::XZ),
            "YZ" | "ZY" => Ok(Self::YZ),
            _ => Err(ParseOrientationError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Plane,
    Disk,
}

impl ShapeKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Plane => "plane",
            Self::Disk => "disk",
        }
    }

    pub fn geometry(
        self,
        orientation: Orientation,
        bbox: &BoundingBox,
    ) -> Result<SurfaceGeometry, GeometryError> {
        match self {
            Self::Plane => plane_geometry(orientation, bbox),
            Self::Disk => disk_geometry(orientation, bbox),
        }
    }
}

fn place(orientation: Orientation, a: f64, b: f64, level: f64) -> [f64; 3] {
    let ([ia, ib], normal) = orientation.axes();
    let mut p = [0.0; 3];
    p[ia] = a;
    p[ib] = b;
    p[normal] = level;
    p
}

/// Rectangle spanning `bbox` in the orientation plane, at mid-height of the
/// normal axis.
pub fn plane_geometry(
    orientation: Orientation,
    bbox: &BoundingBox,
) -> Result<SurfaceGeometry, GeometryError> {
    let ([a, b], normal) = orientation.axes();
    let level = bbox.center(normal);
    let corners = [
        (bbox.min[a], bbox.min[b]),
        (bbox.min[a], bbox.max[b]),
        (bbox.max[a], bbox.max[b]),
        (bbox.max[a], bbox.min[b]),
    ];
    let positions = corners
        .iter()
        .flat_map(|&(u, v)| place(orientation, u, v, level))
        .collect();
    SurfaceGeometry::new(positions, vec![0, 1, 2, 2, 3, 0])
}

/// Triangle fan disk centred on `bbox`, radius half its largest in-plane
/// extent.
pub fn disk_geometry(
    orientation: Orientation,
    bbox: &BoundingBox,
) -> Result<SurfaceGeometry, GeometryError> {
    let ([a, b], normal) = orientation.axes();
    let level = bbox.center(normal);
    let radius = bbox.extent(a).max(bbox.extent(b)) / 2.0;
    let (ca, cb) = (bbox.center(a), bbox.center(b));

    let mut positions = Vec::with_capacity(3 * (DISK_SEGMENTS as usize + 1));
    positions.extend(place(orientation, ca, cb, level));
    for i in 0..DISK_SEGMENTS {
        let angle = 2.0 * PI * f64::from(i) / f64::from(DISK_SEGMENTS);
        positions.extend(place(
            orientation,
            ca + radius * angle.cos(),
            cb + radius * angle.sin(),
            level,
        ));
    }

    let mut indices = Vec::with_capacity(3 * DISK_SEGMENTS as usize);
    for i in 0..DISK_SEGMENTS - 1 {
        indices.extend([0, i + 1, i + 2]);
    }
    indices.extend([0, DISK_SEGMENTS, 1]);
    SurfaceGeometry::new(positions, indices)
}
