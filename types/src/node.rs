//! Typed project tree nodes.
//!
//! Nodes are immutable once built. Revisions of a tree share unchanged
//! subtrees through `Arc`, and a node keeps its [`NodeId`] when it is
//! superseded by a newer version of itself.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::geometry::BoundingBox;
use crate::ids::{FileId, NodeId, SolutionId};
use crate::params::{BoundaryConditionParams, Constraint, MaterialParams, Parameters, Remote};

/// File-backed triangulated geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInfo {
    pub file_id: FileId,
    pub bounding_box: BoundingBox,
}

/// Field resolved on an observation mesh for one solution.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizationInfo {
    /// File holding the resolved samples.
    pub file_id: FileId,
    /// Geometry the samples were resolved against.
    pub mesh_file_id: FileId,
    pub solution_id: SolutionId,
}

/// In-flight background work of one tree.
///
/// Shared by every revision of a root, so it survives copy-on-write rewrites.
#[derive(Debug, Default)]
pub struct ProcessCount {
    solving: AtomicUsize,
    resolving: Mutex<Vec<NodeId>>,
}

/// Point-in-time copy of a [`ProcessCount`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessSnapshot {
    pub solving: usize,
    pub resolving: Vec<NodeId>,
}

impl ProcessCount {
    pub fn begin_solve(&self) {
        self.solving.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_solve(&self) {
        let _ = self
            .solving
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn begin_resolve(&self, mesh_id: NodeId) {
        self.resolving
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mesh_id);
    }

    pub fn end_resolve(&self, mesh_id: &NodeId) {
        let mut resolving = self.resolving.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = resolving.iter().position(|id| id == mesh_id) {
            resolving.remove(pos);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            solving: self.solving.load(Ordering::SeqCst),
            resolving: self
                .resolving
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RootInfo {
    /// Drive folder ids keyed by role (e.g. "discontinuities").
    pub folders: BTreeMap<String, String>,
    pub process_count: Arc<ProcessCount>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root(RootInfo),
    FolderDiscontinuity,
    FolderObservation,
    FolderRemote,
    /// Grouping node wrapping a generated observation mesh.
    Observation,
    Material(MaterialParams),
    Discontinuity,
    DiscontinuityMesh(MeshInfo),
    BoundaryCondition(BoundaryConditionParams),
    Constraint(Constraint),
    Remote(Remote),
    ObservationMesh(MeshInfo),
    Realization(RealizationInfo),
}

impl NodeKind {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Root(_) => "root",
            Self::FolderDiscontinuity => "discontinuity-folder",
            Self::FolderObservation => "observation-folder",
            Self::FolderRemote => "remote-folder",
            Self::Observation => "observation",
            Self::Material(_) => "material",
            Self::Discontinuity => "discontinuity",
            Self::DiscontinuityMesh(_) => "discontinuity-mesh",
            Self::BoundaryCondition(_) => "boundary-condition",
            Self::Constraint(_) => "constraint",
            Self::Remote(_) => "remote",
            Self::ObservationMesh(_) => "observation-mesh",
            Self::Realization(_) => "realization",
        }
    }

    /// Whether nodes of this kind may hold children.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Root(_)
                | Self::FolderDiscontinuity
                | Self::FolderObservation
                | Self::FolderRemote
                | Self::Observation
                | Self::Discontinuity
                | Self::ObservationMesh(_)
        )
    }

    #[must_use]
    pub fn mesh_info(&self) -> Option<&MeshInfo> {
        match self {
            Self::DiscontinuityMesh(info) | Self::ObservationMesh(info) => Some(info),
            _ => None,
        }
    }

    #[must_use]
    pub fn parameters(&self) -> Option<Parameters> {
        match self {
            Self::Material(p) => Some(Parameters::Material(*p)),
            Self::BoundaryCondition(p) => Some(Parameters::BoundaryCondition(p.clone())),
            Self::Constraint(c) => Some(Parameters::Constraint(*c)),
            Self::Remote(r) => Some(Parameters::Remote(*r)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    owner_id: String,
    name: String,
    tags: Vec<String>,
    kind: NodeKind,
    children: Vec<Arc<Node>>,
}

impl Node {
    #[must_use]
    pub fn new(id: NodeId, owner_id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
            name: name.into(),
            tags: Vec::new(),
            kind,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<Arc<Node>>) -> Self {
        self.children = children;
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub fn children(&self) -> &[Arc<Node>] {
        &self.children
    }

    #[must_use]
    pub fn process_count(&self) -> Option<&Arc<ProcessCount>> {
        match &self.kind {
            NodeKind::Root(info) => Some(&info.process_count),
            _ => None,
        }
    }

    /// Realization child of an observation mesh, if resolved.
    #[must_use]
    pub fn current_realization(&self) -> Option<&RealizationInfo> {
        self.children.iter().find_map(|child| match child.kind() {
            NodeKind::Realization(info) => Some(info),
            _ => None,
        })
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn root(owner_id: impl Into<String>, children: Vec<Arc<Node>>) -> Self {
        Self::new(NodeId::random(), owner_id, "", NodeKind::Root(RootInfo::default()))
            .with_children(children)
    }

    #[must_use]
    pub fn folder(kind: NodeKind, owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(NodeId::random(), owner_id, name, kind).with_tags(vec!["folder".to_string()])
    }

    #[must_use]
    pub fn material(id: NodeId, owner_id: impl Into<String>, params: MaterialParams) -> Self {
        Self::new(id, owner_id, "material", NodeKind::Material(params))
    }

    /// A new discontinuity with its mandatory boundary-condition child.
    #[must_use]
    pub fn discontinuity(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let owner_id = owner_id.into();
        let bc = Self::new(
            NodeId::random(),
            owner_id.clone(),
            "boundary conditions",
            NodeKind::BoundaryCondition(BoundaryConditionParams::default()),
        );
        Self::new(NodeId::random(), owner_id, name, NodeKind::Discontinuity)
            .with_children(vec![Arc::new(bc)])
    }

    #[must_use]
    pub fn discontinuity_mesh(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        file_id: FileId,
        bounding_box: BoundingBox,
    ) -> Self {
        Self::new(
            NodeId::random(),
            owner_id,
            name,
            NodeKind::DiscontinuityMesh(MeshInfo {
                file_id,
                bounding_box,
            }),
        )
        .with_tags(vec!["mesh".to_string()])
    }

    #[must_use]
    pub fn observation_mesh(
        id: NodeId,
        owner_id: impl Into<String>,
        name: impl Into<String>,
        file_id: FileId,
        bounding_box: BoundingBox,
    ) -> Self {
        Self::new(
            id,
            owner_id,
            name,
            NodeKind::ObservationMesh(MeshInfo {
                file_id,
                bounding_box,
            }),
        )
        .with_tags(vec!["mesh".to_string()])
    }

    #[must_use]
    pub fn constraint(owner_id: impl Into<String>, constraint: Constraint) -> Self {
        Self::new(
            NodeId::random(),
            owner_id,
            constraint.label(),
            NodeKind::Constraint(constraint),
        )
        .with_tags(vec!["constraint".to_string()])
    }

    #[must_use]
    pub fn remote(owner_id: impl Into<String>, remote: Remote) -> Self {
        Self::new(NodeId::random(), owner_id, remote.label(), NodeKind::Remote(remote))
    }

    #[must_use]
    pub fn realization(id: NodeId, owner_id: impl Into<String>, info: RealizationInfo) -> Self {
        Self::new(id, owner_id, "realization", NodeKind::Realization(info))
    }
}

/// Root of an empty project: default material and the three singleton folders.
#[must_use]
pub fn new_project_node(owner_id: &str) -> Node {
    let children = vec![
        Arc::new(Node::folder(NodeKind::FolderDiscontinuity, owner_id, "discontinuities")),
        Arc::new(Node::material(NodeId::random(), owner_id, MaterialParams::default())),
        Arc::new(Node::folder(NodeKind::FolderObservation, owner_id, "grids")),
        Arc::new(Node::folder(NodeKind::FolderRemote, owner_id, "remotes")),
    ];
    Node::root(owner_id, children)
}
