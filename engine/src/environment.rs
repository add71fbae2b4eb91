//! Solve/resolve provider seam.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arche_core::CodecError;
use arche_types::{FileId, Model, NodeId, Solution, SolutionId};
use thiserror::Error;

use crate::drive::{Drive, DriveError, File};

pub type EnvFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, EnvironmentError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Drive(#[from] DriveError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("model serialization failed: {0}")]
    Model(#[from] serde_json::Error),
    #[error("solution {solution_id} is unknown to this environment")]
    UnknownSolution { solution_id: SolutionId },
    #[error("solver failed: {0:#}")]
    Backend(anyhow::Error),
    #[error("operation cancelled")]
    Cancelled,
}

/// Where models are solved and solutions resolved on observation meshes.
///
/// Both operations may run on any thread; results are handed back to the
/// state manager, never applied here.
pub trait Environment: Send + Sync {
    fn drive(&self) -> Arc<dyn Drive>;

    /// Folder receiving files created on behalf of the project.
    fn folder_id(&self) -> &str;

    fn solve(&self, model: Arc<Model>) -> EnvFut<'_, Solution>;

    /// Evaluate `solution` at the vertices of the mesh stored in
    /// `mesh_file_id`, returning the file holding the samples.
    fn resolve<'a>(
        &'a self,
        solution: &'a Solution,
        owner_id: &'a str,
        mesh_id: &'a NodeId,
        mesh_file_id: &'a FileId,
    ) -> EnvFut<'a, File>;
}
