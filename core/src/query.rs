//! Read-only lookups over a project tree.

use std::collections::HashSet;
use std::sync::Arc;

use arche_types::{BoundingBox, Node, NodeId, NodeKind, SolutionId};

use crate::tree::TreeError;

/// All nodes matching `pred`, in pre-order with sibling order preserved.
pub fn find_all(root: &Arc<Node>, pred: impl Fn(&Node) -> bool) -> Vec<Arc<Node>> {
    fn walk(node: &Arc<Node>, pred: &dyn Fn(&Node) -> bool, out: &mut Vec<Arc<Node>>) {
        if pred(node) {
            out.push(Arc::clone(node));
        }
        for child in node.children() {
            walk(child, pred, out);
        }
    }
    let mut out = Vec::new();
    walk(root, &pred, &mut out);
    out
}

pub fn find_first(root: &Arc<Node>, pred: impl Fn(&Node) -> bool) -> Option<Arc<Node>> {
    fn walk(node: &Arc<Node>, pred: &dyn Fn(&Node) -> bool) -> Option<Arc<Node>> {
        if pred(node) {
            return Some(Arc::clone(node));
        }
        node.children().iter().find_map(|child| walk(child, pred))
    }
    walk(root, &pred)
}

#[must_use]
pub fn find_by_id(root: &Arc<Node>, id: &NodeId) -> Option<Arc<Node>> {
    find_first(root, |node| node.id() == id)
}

/// Chain of nodes from `root` down to the node with `id`, both included.
#[must_use]
pub fn path_to(root: &Arc<Node>, id: &NodeId) -> Option<Vec<Arc<Node>>> {
    fn walk(node: &Arc<Node>, id: &NodeId, path: &mut Vec<Arc<Node>>) -> bool {
        path.push(Arc::clone(node));
        if node.id() == id {
            return true;
        }
        for child in node.children() {
            if walk(child, id, path) {
                return true;
            }
        }
        path.pop();
        false
    }
    let mut path = Vec::new();
    walk(root, id, &mut path).then_some(path)
}

/// Ids of every node in the subtree, `node` included.
#[must_use]
pub fn subtree_ids(node: &Arc<Node>) -> HashSet<NodeId> {
    find_all(node, |_| true)
        .into_iter()
        .map(|n| n.id().clone())
        .collect()
}

#[must_use]
pub fn material(root: &Arc<Node>) -> Option<Arc<Node>> {
    find_first(root, |n| matches!(n.kind(), NodeKind::Material(_)))
}

#[must_use]
pub fn remote_folder(root: &Arc<Node>) -> Option<Arc<Node>> {
    find_first(root, |n| matches!(n.kind(), NodeKind::FolderRemote))
}

#[must_use]
pub fn has_discontinuity_mesh(root: &Arc<Node>) -> bool {
    find_first(root, |n| matches!(n.kind(), NodeKind::DiscontinuityMesh(_))).is_some()
}

#[must_use]
pub fn observation_meshes(root: &Arc<Node>) -> Vec<Arc<Node>> {
    find_all(root, |n| matches!(n.kind(), NodeKind::ObservationMesh(_)))
}

/// Union of the bounding boxes of every discontinuity mesh.
pub fn scene_bounding_box(root: &Arc<Node>) -> Result<BoundingBox, TreeError> {
    find_all(root, |n| matches!(n.kind(), NodeKind::DiscontinuityMesh(_)))
        .iter()
        .filter_map(|n| n.kind().mesh_info().map(|info| info.bounding_box))
        .reduce(|acc, bbox| acc.union(&bbox))
        .ok_or(TreeError::EmptyScene)
}

/// Observation meshes with no realization for `solution_id`.
///
/// With `owner` set, meshes owned by another manager are left out.
#[must_use]
pub fn unresolved_observation_meshes(
    root: &Arc<Node>,
    solution_id: &SolutionId,
    owner: Option<&str>,
) -> Vec<Arc<Node>> {
    observation_meshes(root)
        .into_iter()
        .filter(|mesh| {
            mesh.current_realization()
                .is_none_or(|r| &r.solution_id != solution_id)
        })
        .filter(|mesh| owner.is_none_or(|owner| mesh.owner_id() == owner))
        .collect()
}
