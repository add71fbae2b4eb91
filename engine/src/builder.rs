//! Translation of a project tree into the solver's input model.

use std::sync::Arc;

use arche_core::query::{find_all, material};
use arche_core::{CodecError, decode_surfaces};
use arche_types::{FileId, Model, Node, NodeId, NodeKind, Surface};
use futures_util::future::try_join_all;
use thiserror::Error;

use crate::drive::{Drive, DriveError};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Drive(#[from] DriveError),
    #[error("mesh file {file_id}: {source}")]
    Codec {
        file_id: FileId,
        source: CodecError,
    },
    #[error("project has no material node")]
    MissingMaterial,
    #[error("discontinuity {discontinuity} has no boundary condition")]
    MissingBoundaryCondition { discontinuity: NodeId },
}

async fn discontinuity_surfaces(
    discontinuity: &Arc<Node>,
    drive: &dyn Drive,
) -> Result<Vec<Surface>, BuildError> {
    let boundary_condition = discontinuity
        .children()
        .iter()
        .find_map(|c| match c.kind() {
            NodeKind::BoundaryCondition(p) => Some(p.clone()),
            _ => None,
        })
        .ok_or_else(|| BuildError::MissingBoundaryCondition {
            discontinuity: discontinuity.id().clone(),
        })?;
    let constraints: Vec<_> = discontinuity
        .children()
        .iter()
        .filter_map(|c| match c.kind() {
            NodeKind::Constraint(constraint) => Some(*constraint),
            _ => None,
        })
        .collect();

    let file_ids: Vec<&FileId> = discontinuity
        .children()
        .iter()
        .filter_map(|c| match c.kind() {
            NodeKind::DiscontinuityMesh(info) => Some(&info.file_id),
            _ => None,
        })
        .collect();
    let contents = try_join_all(file_ids.iter().map(|id| drive.read_as_text(id))).await?;

    let mut surfaces = Vec::new();
    for (file_id, content) in file_ids.into_iter().zip(contents) {
        let decoded = decode_surfaces(&content).map_err(|source| BuildError::Codec {
            file_id: file_id.clone(),
            source,
        })?;
        surfaces.extend(decoded.into_iter().map(|geometry| {
            let (positions, indices) = geometry.into_parts();
            Surface {
                positions,
                indices,
                boundary_condition: boundary_condition.clone(),
                constraints: constraints.clone(),
            }
        }));
    }
    Ok(surfaces)
}

/// Build the solver model of `root`.
///
/// Surfaces follow discontinuity pre-order, then mesh sibling order, then
/// surface order inside each file. Remotes follow pre-order.
pub async fn build_model(root: &Arc<Node>, drive: &dyn Drive) -> Result<Model, BuildError> {
    let material = material(root)
        .and_then(|node| match node.kind() {
            NodeKind::Material(p) => Some(*p),
            _ => None,
        })
        .ok_or(BuildError::MissingMaterial)?;

    let mut surfaces = Vec::new();
    for discontinuity in find_all(root, |n| matches!(n.kind(), NodeKind::Discontinuity)) {
        surfaces.extend(discontinuity_surfaces(&discontinuity, drive).await?);
    }

    let remotes = find_all(root, |n| matches!(n.kind(), NodeKind::Remote(_)))
        .iter()
        .filter_map(|n| match n.kind() {
            NodeKind::Remote(r) => Some(*r),
            _ => None,
        })
        .collect();

    Ok(Model {
        surfaces,
        material,
        remotes,
    })
}
