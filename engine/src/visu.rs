//! Display objects built from mesh files, memoized per node.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use arche_core::query::{find_all, path_to};
use arche_core::{CodecError, FieldSamples, decode_non_empty};
use arche_types::{FileId, GeometryError, Node, NodeId, NodeKind, SurfaceGeometry};
use thiserror::Error;

use crate::drive::{Drive, DriveError};

#[derive(Debug, Error)]
pub enum VisuError {
    #[error("node {id} not found in tree")]
    NotFound { id: NodeId },
    #[error("node {id} ({kind}) has no displayable geometry")]
    NotDisplayable { id: NodeId, kind: &'static str },
    #[error(transparent)]
    Drive(#[from] DriveError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Renderable geometry of one node, optionally carrying resolved samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayObject {
    pub node_id: NodeId,
    /// Slash-separated node names, project name first.
    pub name: String,
    pub geometry: SurfaceGeometry,
    pub wireframe: bool,
    pub field: Option<FieldSamples>,
}

fn merge(surfaces: Vec<SurfaceGeometry>) -> Result<SurfaceGeometry, GeometryError> {
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    for surface in surfaces {
        let offset = (positions.len() / 3) as u32;
        let (p, i) = surface.into_parts();
        positions.extend(p);
        indices.extend(i.into_iter().map(|index| index + offset));
    }
    SurfaceGeometry::new(positions, indices)
}

/// Per-manager display object cache.
///
/// The lock is never held across an await.
pub struct Visu3dState {
    project_name: String,
    drive: Arc<dyn Drive>,
    cache: RwLock<HashMap<NodeId, Arc<DisplayObject>>>,
}

impl Visu3dState {
    pub fn new(project_name: impl Into<String>, drive: Arc<dyn Drive>) -> Self {
        Self {
            project_name: project_name.into(),
            drive,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn cached(&self, node_id: &NodeId) -> Option<Arc<DisplayObject>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_id)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn geometry(&self, file_id: &FileId) -> Result<SurfaceGeometry, VisuError> {
        let text = self.drive.read_as_text(file_id).await?;
        Ok(merge(decode_non_empty(&text)?)?)
    }

    async fn field(&self, file_id: &FileId) -> Result<FieldSamples, VisuError> {
        let text = self.drive.read_as_text(file_id).await?;
        Ok(FieldSamples::from_json(&text)?)
    }

    /// Display object for `node_id` in `root`, built on first request.
    pub async fn build_object(
        &self,
        root: &Arc<Node>,
        node_id: &NodeId,
    ) -> Result<Arc<DisplayObject>, VisuError> {
        if let Some(hit) = self.cached(node_id) {
            return Ok(hit);
        }
        let path = path_to(root, node_id).ok_or_else(|| VisuError::NotFound {
            id: node_id.clone(),
        })?;
        let Some(node) = path.last() else {
            return Err(VisuError::NotFound {
                id: node_id.clone(),
            });
        };

        let (geometry, field, wireframe) = match node.kind() {
            NodeKind::DiscontinuityMesh(info) => (self.geometry(&info.file_id).await?, None, false),
            NodeKind::ObservationMesh(info) => {
                let field = match node.current_realization() {
                    Some(realization) => Some(self.field(&realization.file_id).await?),
                    None => None,
                };
                (self.geometry(&info.file_id).await?, field, true)
            }
            NodeKind::Realization(info) => (
                self.geometry(&info.mesh_file_id).await?,
                Some(self.field(&info.file_id).await?),
                false,
            ),
            other => {
                return Err(VisuError::NotDisplayable {
                    id: node_id.clone(),
                    kind: other.label(),
                });
            }
        };

        let mut names: Vec<&str> = path.iter().map(|n| n.name()).collect();
        names[0] = &self.project_name;
        let object = Arc::new(DisplayObject {
            node_id: node_id.clone(),
            name: names.join("/"),
            geometry,
            wireframe,
            field,
        });

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.clone(), Arc::clone(&object));
        Ok(object)
    }

    /// Evict `node` and every mesh or realization below it.
    pub fn revoke_from(&self, node: &Arc<Node>) {
        let doomed = find_all(node, |n| {
            matches!(
                n.kind(),
                NodeKind::DiscontinuityMesh(_) | NodeKind::ObservationMesh(_) | NodeKind::Realization(_)
            )
        });
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = usize::from(cache.remove(node.id()).is_some());
        for n in doomed {
            evicted += usize::from(cache.remove(n.id()).is_some());
        }
        tracing::debug!(node = %node.id(), evicted, "Display cache revoked");
    }
}
