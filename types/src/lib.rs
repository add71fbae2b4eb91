//! Core domain types for Arche projects.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the engine.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod geometry;
mod ids;
mod model;
mod node;
mod params;

pub use geometry::{BoundingBox, GeometryError, SurfaceGeometry};
pub use ids::{FileId, NodeId, SolutionId};
pub use model::{Component, Model, Solution, Surface};
pub use node::{
    MeshInfo, Node, NodeKind, ProcessCount, ProcessSnapshot, RealizationInfo, RootInfo,
    new_project_node,
};
pub use params::{
    AndersonianParams, AxisCondition, AxisKind, BoundaryConditionParams, Constraint,
    CoulombOrthoParams, CoulombParams, FieldSpec, MaterialParams, Parameters, Remote,
};
