//! Persistent project tree and the structural command log.
//!
//! Every command produces a new root by rewriting the path from the root to
//! the edited node; untouched subtrees are shared with the previous root. A
//! published root is never mutated.

use std::collections::HashSet;
use std::fmt;
use std::mem::discriminant;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arche_types::{BoundingBox, FileId, MeshInfo, Node, NodeId, NodeKind, Parameters};
use thiserror::Error;

use crate::query::{find_all, path_to, subtree_ids};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {id} not found in tree")]
    NodeNotFound { id: NodeId },
    #[error("node {id} ({kind}) cannot hold children")]
    NotAContainer { id: NodeId, kind: &'static str },
    #[error("attribute `{attribute}` does not apply to node {id} ({kind})")]
    AttributeMismatch {
        id: NodeId,
        kind: &'static str,
        attribute: &'static str,
    },
    #[error("node id {id} already present in tree")]
    DuplicateId { id: NodeId },
    #[error("the root node cannot be removed")]
    RootRemoval,
    #[error("{kind} singleton rule broken at node {id}")]
    SingletonViolation { id: NodeId, kind: &'static str },
    #[error("replacing node {id} would change its kind from {from} to {to}")]
    KindChanged {
        id: NodeId,
        from: &'static str,
        to: &'static str,
    },
    #[error("replacement for node {expected} carries id {found}")]
    IdChanged { expected: NodeId, found: NodeId },
    #[error("scene has no discontinuity meshes")]
    EmptyScene,
}

/// Process-unique, monotonically increasing command identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u64);

impl CommandId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// Partial attribute update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct NodeAttributes {
    pub name: Option<String>,
    pub parameters: Option<Parameters>,
    pub file_id: Option<FileId>,
    pub bounding_box: Option<BoundingBox>,
    pub children: Option<Vec<Arc<Node>>>,
}

impl NodeAttributes {
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn parameters(parameters: impl Into<Parameters>) -> Self {
        Self {
            parameters: Some(parameters.into()),
            ..Self::default()
        }
    }

    /// New geometry file for a mesh; stale children are dropped.
    #[must_use]
    pub fn mesh_file(file_id: FileId, bounding_box: Option<BoundingBox>) -> Self {
        Self {
            file_id: Some(file_id),
            bounding_box,
            children: Some(Vec::new()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub enum CommandOp {
    /// Marks the first revision of a tree. Changes nothing.
    Init,
    AddChild {
        parent: NodeId,
        child: Arc<Node>,
    },
    RemoveNode {
        target: NodeId,
    },
    ReplaceNode {
        old: NodeId,
        new: Arc<Node>,
    },
    /// `target` is the node as the issuer saw it; the current version with
    /// the same id is the one edited.
    ReplaceAttributes {
        target: Arc<Node>,
        attributes: NodeAttributes,
    },
}

/// One structural edit. Commands compare by identity, never by content.
#[derive(Debug)]
pub struct Command {
    id: CommandId,
    op: CommandOp,
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Command {}

impl Command {
    #[must_use]
    pub fn new(op: CommandOp) -> Arc<Self> {
        Arc::new(Self {
            id: CommandId::next(),
            op,
        })
    }

    #[must_use]
    pub fn init() -> Arc<Self> {
        Self::new(CommandOp::Init)
    }

    #[must_use]
    pub fn add_child(parent: NodeId, child: impl Into<Arc<Node>>) -> Arc<Self> {
        Self::new(CommandOp::AddChild {
            parent,
            child: child.into(),
        })
    }

    #[must_use]
    pub fn remove_node(target: NodeId) -> Arc<Self> {
        Self::new(CommandOp::RemoveNode { target })
    }

    /// Replace the node with `new.id()` by `new`.
    #[must_use]
    pub fn replace_node(new: impl Into<Arc<Node>>) -> Arc<Self> {
        let new = new.into();
        Self::new(CommandOp::ReplaceNode {
            old: new.id().clone(),
            new,
        })
    }

    #[must_use]
    pub fn replace_attributes(target: Arc<Node>, attributes: NodeAttributes) -> Arc<Self> {
        Self::new(CommandOp::ReplaceAttributes { target, attributes })
    }

    #[must_use]
    pub fn id(&self) -> CommandId {
        self.id
    }

    #[must_use]
    pub fn op(&self) -> &CommandOp {
        &self.op
    }

    #[must_use]
    pub fn is_init(&self) -> bool {
        matches!(self.op, CommandOp::Init)
    }
}

/// Result of applying one command.
#[derive(Debug, Clone)]
pub struct Update {
    pub command: Arc<Command>,
    pub old_root: Arc<Node>,
    pub new_root: Arc<Node>,
    pub added: Vec<Arc<Node>>,
    pub replaced: Vec<Arc<Node>>,
    pub removed: Vec<Arc<Node>>,
}

impl Update {
    /// The no-op revision marking a tree's starting point.
    #[must_use]
    pub fn init(root: Arc<Node>) -> Self {
        Self {
            command: Command::init(),
            old_root: Arc::clone(&root),
            new_root: root,
            added: Vec::new(),
            replaced: Vec::new(),
            removed: Vec::new(),
        }
    }
}

fn is_singleton(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Root(_)
            | NodeKind::Material(_)
            | NodeKind::FolderDiscontinuity
            | NodeKind::FolderObservation
            | NodeKind::FolderRemote
    )
}

/// Kinds that appear exactly once, directly under the root.
const ROOT_SINGLETONS: [&str; 4] = [
    "material",
    "discontinuity-folder",
    "observation-folder",
    "remote-folder",
];

/// Structure every project revision keeps: each root singleton exactly once
/// under the root and nowhere else, and exactly one boundary condition per
/// discontinuity.
fn validate(root: &Arc<Node>) -> Result<(), TreeError> {
    let violation = |id: &NodeId, kind: &'static str| TreeError::SingletonViolation {
        id: id.clone(),
        kind,
    };
    if matches!(root.kind(), NodeKind::Root(_)) {
        for label in ROOT_SINGLETONS {
            let count = root
                .children()
                .iter()
                .filter(|c| c.kind().label() == label)
                .count();
            if count != 1 {
                return Err(violation(root.id(), label));
            }
        }
    }
    for node in find_all(root, |_| true) {
        let top = Arc::ptr_eq(&node, root);
        for child in node.children() {
            let misplaced = match child.kind() {
                NodeKind::Root(_) => true,
                kind => is_singleton(kind) && !top,
            };
            if misplaced {
                return Err(violation(child.id(), child.kind().label()));
            }
        }
        if matches!(node.kind(), NodeKind::Discontinuity) {
            let conditions = node
                .children()
                .iter()
                .filter(|c| matches!(c.kind(), NodeKind::BoundaryCondition(_)))
                .count();
            if conditions != 1 {
                return Err(violation(node.id(), "boundary-condition"));
            }
        }
    }
    Ok(())
}

/// Path to `id` split into its ancestors and the node itself.
fn locate(root: &Arc<Node>, id: &NodeId) -> Result<(Vec<Arc<Node>>, Arc<Node>), TreeError> {
    let mut path = path_to(root, id).ok_or_else(|| TreeError::NodeNotFound { id: id.clone() })?;
    let node = path
        .pop()
        .ok_or_else(|| TreeError::NodeNotFound { id: id.clone() })?;
    Ok((path, node))
}

/// Rebuild `ancestors` (root first) around the replacement of `target`.
///
/// `None` removes the target from its parent. Each rebuilt ancestor is
/// tagged with `owner`.
fn rebuild(
    ancestors: &[Arc<Node>],
    target: &NodeId,
    replacement: Option<Arc<Node>>,
    owner: &str,
) -> Result<Arc<Node>, TreeError> {
    let mut current = replacement;
    let mut child_id = target.clone();
    for ancestor in ancestors.iter().rev() {
        let children = ancestor
            .children()
            .iter()
            .filter_map(|c| {
                if c.id() == &child_id {
                    current.clone()
                } else {
                    Some(Arc::clone(c))
                }
            })
            .collect();
        let rebuilt = ancestor
            .as_ref()
            .clone()
            .with_children(children)
            .with_owner(owner);
        child_id = ancestor.id().clone();
        current = Some(Arc::new(rebuilt));
    }
    current.ok_or(TreeError::RootRemoval)
}

/// Fails when any node of `incoming` reuses an id of `existing` or of
/// another incoming node.
fn check_unique(existing: &HashSet<NodeId>, incoming: &[Arc<Node>]) -> Result<(), TreeError> {
    let mut seen = HashSet::new();
    for node in incoming {
        for n in find_all(node, |_| true) {
            let id = n.id();
            if existing.contains(id) || !seen.insert(id.clone()) {
                return Err(TreeError::DuplicateId { id: id.clone() });
            }
        }
    }
    Ok(())
}

/// Ids of `root` minus those under `node`.
fn ids_outside(root: &Arc<Node>, node: &Arc<Node>) -> HashSet<NodeId> {
    let inside = subtree_ids(node);
    let mut ids = subtree_ids(root);
    ids.retain(|id| !inside.contains(id));
    ids
}

/// Nodes of the `new` subtree absent from `old`, and the reverse.
fn subtree_diff(old: &Arc<Node>, new: &Arc<Node>) -> (Vec<Arc<Node>>, Vec<Arc<Node>>) {
    let old_ids = subtree_ids(old);
    let new_ids = subtree_ids(new);
    let added = find_all(new, |n| !old_ids.contains(n.id()));
    let removed = find_all(old, |n| !new_ids.contains(n.id()));
    (added, removed)
}

fn apply_mesh_attributes(info: &mut MeshInfo, attributes: &NodeAttributes) {
    if let Some(file_id) = &attributes.file_id {
        info.file_id = file_id.clone();
    }
    if let Some(bbox) = attributes.bounding_box {
        info.bounding_box = bbox;
    }
}

fn with_attributes(
    current: &Arc<Node>,
    attributes: &NodeAttributes,
    owner: &str,
) -> Result<Node, TreeError> {
    let mismatch = |attribute| TreeError::AttributeMismatch {
        id: current.id().clone(),
        kind: current.kind().label(),
        attribute,
    };
    let mut kind = current.kind().clone();

    if let Some(parameters) = &attributes.parameters {
        kind = match (kind, parameters) {
            (NodeKind::Material(_), Parameters::Material(p)) => NodeKind::Material(*p),
            (NodeKind::BoundaryCondition(_), Parameters::BoundaryCondition(p)) => {
                NodeKind::BoundaryCondition(p.clone())
            }
            (NodeKind::Constraint(_), Parameters::Constraint(c)) => NodeKind::Constraint(*c),
            (NodeKind::Remote(_), Parameters::Remote(r)) => NodeKind::Remote(*r),
            _ => return Err(mismatch("parameters")),
        };
    }

    if attributes.file_id.is_some() || attributes.bounding_box.is_some() {
        kind = match kind {
            NodeKind::DiscontinuityMesh(mut info) => {
                apply_mesh_attributes(&mut info, attributes);
                NodeKind::DiscontinuityMesh(info)
            }
            NodeKind::ObservationMesh(mut info) => {
                apply_mesh_attributes(&mut info, attributes);
                NodeKind::ObservationMesh(info)
            }
            _ => return Err(mismatch("file_id")),
        };
    }

    let mut node = current.as_ref().clone().with_kind(kind).with_owner(owner);
    if let Some(name) = &attributes.name {
        node = node.with_name(name.clone());
    }
    if let Some(children) = &attributes.children {
        if !current.kind().is_container() && !children.is_empty() {
            return Err(mismatch("children"));
        }
        node = node.with_children(children.clone());
    }
    Ok(node)
}

/// Apply one command to `root`, tagging every rewritten node with `owner`.
///
/// `root` is left untouched; on error no new root exists. Edits that would
/// leave the project without its singletons, or a discontinuity without
/// exactly one boundary condition, are rejected.
pub fn apply(root: &Arc<Node>, command: &Arc<Command>, owner: &str) -> Result<Update, TreeError> {
    let mut update = Update {
        command: Arc::clone(command),
        old_root: Arc::clone(root),
        new_root: Arc::clone(root),
        added: Vec::new(),
        replaced: Vec::new(),
        removed: Vec::new(),
    };

    match command.op() {
        CommandOp::Init => {}
        CommandOp::AddChild { parent, child } => {
            let (ancestors, parent_node) = locate(root, parent)?;
            if !parent_node.kind().is_container() {
                return Err(TreeError::NotAContainer {
                    id: parent.clone(),
                    kind: parent_node.kind().label(),
                });
            }
            let second_bc = matches!(child.kind(), NodeKind::BoundaryCondition(_))
                && parent_node
                    .children()
                    .iter()
                    .any(|c| matches!(c.kind(), NodeKind::BoundaryCondition(_)));
            if is_singleton(child.kind()) || second_bc {
                return Err(TreeError::SingletonViolation {
                    id: child.id().clone(),
                    kind: child.kind().label(),
                });
            }
            check_unique(&subtree_ids(root), std::slice::from_ref(child))?;

            let mut children = parent_node.children().to_vec();
            children.push(Arc::clone(child));
            let new_parent = parent_node
                .as_ref()
                .clone()
                .with_children(children)
                .with_owner(owner);
            update.new_root = rebuild(&ancestors, parent, Some(Arc::new(new_parent)), owner)?;
            update.added = find_all(child, |_| true);
        }
        CommandOp::RemoveNode { target } => {
            let (ancestors, node) = locate(root, target)?;
            if ancestors.is_empty() {
                return Err(TreeError::RootRemoval);
            }
            if is_singleton(node.kind()) || matches!(node.kind(), NodeKind::BoundaryCondition(_)) {
                return Err(TreeError::SingletonViolation {
                    id: target.clone(),
                    kind: node.kind().label(),
                });
            }
            update.new_root = rebuild(&ancestors, target, None, owner)?;
            update.removed = find_all(&node, |_| true);
        }
        CommandOp::ReplaceNode { old, new } => {
            if new.id() != old {
                return Err(TreeError::IdChanged {
                    expected: old.clone(),
                    found: new.id().clone(),
                });
            }
            let (ancestors, current) = locate(root, old)?;
            if discriminant(current.kind()) != discriminant(new.kind()) {
                return Err(TreeError::KindChanged {
                    id: old.clone(),
                    from: current.kind().label(),
                    to: new.kind().label(),
                });
            }
            check_unique(&ids_outside(root, &current), new.children())?;

            update.new_root = rebuild(&ancestors, old, Some(Arc::clone(new)), owner)?;
            let (added, removed) = subtree_diff(&current, new);
            update.added = added;
            update.removed = removed;
            update.replaced = vec![Arc::clone(new)];
        }
        CommandOp::ReplaceAttributes { target, attributes } => {
            let (ancestors, current) = locate(root, target.id())?;
            if let Some(children) = &attributes.children {
                check_unique(&ids_outside(root, &current), children)?;
            }
            let new = Arc::new(with_attributes(&current, attributes, owner)?);
            update.new_root = rebuild(&ancestors, target.id(), Some(Arc::clone(&new)), owner)?;
            let (added, removed) = subtree_diff(&current, &new);
            update.added = added;
            update.removed = removed;
            update.replaced = vec![new];
        }
    }

    if !Arc::ptr_eq(&update.new_root, root) {
        validate(&update.new_root)?;
    }
    Ok(update)
}

/// Apply `commands` in order. All or nothing: on the first failure the
/// error is returned and no update is kept.
pub fn apply_batch(
    root: &Arc<Node>,
    commands: &[Arc<Command>],
    owner: &str,
) -> Result<Vec<Update>, TreeError> {
    let mut updates = Vec::with_capacity(commands.len());
    let mut current = Arc::clone(root);
    for command in commands {
        let update = apply(&current, command, owner).inspect_err(|err| {
            tracing::debug!(command = %command.id(), error = %err, "Command rejected");
        })?;
        current = Arc::clone(&update.new_root);
        updates.push(update);
    }
    Ok(updates)
}
