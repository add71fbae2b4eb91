//! Project state management for Arche.
//!
//! A [`StateMgr`] owns one project tree, applies edits to it, and keeps it
//! reconciled with an [`Environment`] that solves the project model and
//! resolves solutions onto observation meshes. Published
//! [`ProjectState`](arche_core::ProjectState)s are immutable snapshots; a
//! downstream manager can continue from any of them.

mod builder;
mod config;
mod drive;
mod environment;
mod local;
mod manager;
mod output;
mod selection;
mod visu;

pub use builder::{BuildError, build_model};
pub use config::{ConfigError, EngineConfig};
pub use drive::{Drive, DriveError, DriveFut, File, MemoryDrive};
pub use environment::{EnvFut, Environment, EnvironmentError};
pub use local::{FarFieldBackend, FieldEvaluator, LocalEnvironment, STRESS_SERIES, SolverBackend, UniformField};
pub use manager::{ManagerError, StateMgr, StateMgrBuilder};
pub use output::{FailureContext, ManagerOutput, ProcessFailure, ProjectOutput};
pub use selection::WatchList;
pub use visu::{DisplayObject, Visu3dState, VisuError};
