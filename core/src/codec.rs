//! Text codec for triangulated surfaces and JSON codec for resolved fields.
//!
//! Surfaces use a GOCAD TSurf-like layout:
//!
//! ```text
//! GOCAD TSurf 1
//! HEADER {
//! name: fault
//! }
//! TFACE
//! VRTX 1 0 0 0
//! PVRTX 2 1 0 0
//! VRTX 3 0 1 0
//! TRGL 1 2 3
//! END
//! ```
//!
//! Vertex ids are file-local and remapped to 0-based indices. Unknown
//! keywords are skipped.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use arche_types::{GeometryError, SurfaceGeometry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("line {line}: triangle references unknown vertex {vertex}")]
    UnknownVertex { line: usize, vertex: u64 },
    #[error("no surface found in content")]
    Empty,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("invalid field samples: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Default)]
struct PendingSurface {
    ids: HashMap<u64, u32>,
    positions: Vec<f64>,
    indices: Vec<u32>,
}

impl PendingSurface {
    fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn finish(self) -> Result<SurfaceGeometry, CodecError> {
        Ok(SurfaceGeometry::new(self.positions, self.indices)?)
    }
}

fn parse_num<T: std::str::FromStr>(token: Option<&str>, line: usize, what: &str) -> Result<T, CodecError> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| CodecError::Malformed {
            line,
            reason: format!("expected {what}"),
        })
}

/// Decode every surface of `text`.
pub fn decode_surfaces(text: &str) -> Result<Vec<SurfaceGeometry>, CodecError> {
    let mut surfaces = Vec::new();
    let mut pending = PendingSurface::default();

    for (n, raw) in text.lines().enumerate() {
        let line = n + 1;
        let mut tokens = raw.split_whitespace();
        match tokens.next() {
            Some("VRTX" | "PVRTX") => {
                let id: u64 = parse_num(tokens.next(), line, "vertex id")?;
                let mut xyz = [0.0; 3];
                for (axis, value) in xyz.iter_mut().enumerate() {
                    *value = parse_num(tokens.next(), line, &format!("coordinate {axis}"))?;
                }
                let index = u32::try_from(pending.positions.len() / 3).map_err(|_| {
                    CodecError::Malformed {
                        line,
                        reason: "too many vertices".to_string(),
                    }
                })?;
                pending.ids.insert(id, index);
                pending.positions.extend_from_slice(&xyz);
            }
            Some("TRGL") => {
                for _ in 0..3 {
                    let vertex: u64 = parse_num(tokens.next(), line, "vertex reference")?;
                    let index = *pending
                        .ids
                        .get(&vertex)
                        .ok_or(CodecError::UnknownVertex { line, vertex })?;
                    pending.indices.push(index);
                }
            }
            Some("END") => {
                let done = std::mem::take(&mut pending);
                if !done.is_empty() {
                    surfaces.push(done.finish()?);
                }
            }
            _ => {}
        }
    }
    if !pending.is_empty() {
        surfaces.push(pending.finish()?);
    }
    Ok(surfaces)
}

/// Decode and require at least one surface.
pub fn decode_non_empty(text: &str) -> Result<Vec<SurfaceGeometry>, CodecError> {
    let surfaces = decode_surfaces(text)?;
    if surfaces.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(surfaces)
}

#[must_use]
pub fn encode_surfaces(surfaces: &[SurfaceGeometry], name: &str) -> String {
    let mut out = String::new();
    for surface in surfaces {
        let _ = writeln!(out, "GOCAD TSurf 1\nHEADER {{\nname: {name}\n}}\nTFACE");
        for (i, [x, y, z]) in surface.points().enumerate() {
            let _ = writeln!(out, "VRTX {} {x} {y} {z}", i + 1);
        }
        for tri in surface.indices().chunks_exact(3) {
            let _ = writeln!(out, "TRGL {} {} {}", tri[0] + 1, tri[1] + 1, tri[2] + 1);
        }
        out.push_str("END\n");
    }
    out
}

/// Resolved field values per series name, one row per mesh vertex.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldSamples {
    pub series: BTreeMap<String, Vec<Vec<f64>>>,
}

impl FieldSamples {
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Number of rows of the longest series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).max().unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
