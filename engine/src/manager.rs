//! Project state manager.
//!
//! A [`StateMgr`] owns the live tree of one project and is its only writer.
//! Edits are applied synchronously and republished as [`ProjectState`]s.
//! Solves and resolves run as spawned tasks; their results come back through
//! a mailbox drained by [`StateMgr::poll_events`] or
//! [`StateMgr::process_next_event`], and are applied by the owner like any
//! other edit.
//!
//! A solution stays attached to published states for as long as no
//! needs-solve command has been applied after the point it was computed for.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use arche_core::query::{
    find_all, find_by_id, has_discontinuity_mesh, material, remote_folder, scene_bounding_box,
    unresolved_observation_meshes,
};
use arche_core::tree;
use arche_core::{
    CodecError, Command, CommandId, NodeAttributes, Orientation, ProjectState, ShapeKind, TreeError,
    Update, decode_non_empty, encode_surfaces, needs_solve,
};
use arche_types::{
    Component, FileId, GeometryError, Node, NodeId, NodeKind, Parameters, ProcessCount,
    ProcessSnapshot, RealizationInfo, Solution, SolutionId, SurfaceGeometry, new_project_node,
};
use futures_util::FutureExt;
use futures_util::future::{AbortHandle, Abortable};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::builder::build_model;
use crate::config::EngineConfig;
use crate::drive::{DriveError, File};
use crate::environment::Environment;
use crate::output::{FailureContext, ManagerOutput, ProcessFailure, ProjectOutput};
use crate::selection::WatchList;
use crate::visu::{DisplayObject, Visu3dState, VisuError};

/// Channel capacity for the event channel between tasks and the manager.
const EVENT_CHANNEL_CAPACITY: usize = 256;

const FROM_COMPONENT_TAG: &str = "fromComponent";

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no environment was provided")]
    MissingEnvironment,
    #[error("starting state has no tree")]
    MissingRoot,
    #[error("starting tree is rooted at a {kind} node")]
    NotARoot { kind: &'static str },
    #[error("material component given but the tree has no material node")]
    MissingMaterial,
    #[error("remote component given but the tree has no remote folder")]
    MissingRemoteFolder,
    #[error("no mesh node references file {file_id}")]
    UnknownFile { file_id: FileId },
    #[error("cannot drop a file on {id} ({kind})")]
    InvalidDropTarget { id: NodeId, kind: &'static str },
    #[error("state manager was disposed")]
    Disposed,
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Drive(#[from] DriveError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Visu(#[from] VisuError),
}

/// Position in the command history a solution was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReusePoint {
    /// Before any command of this manager.
    Origin,
    After(CommandId),
}

#[derive(Debug, Clone)]
struct SolutionRef {
    solution: Solution,
    point: ReusePoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolveKey {
    mesh_id: NodeId,
    mesh_file_id: FileId,
    solution_id: SolutionId,
}

struct ActiveSolve {
    handle: AbortHandle,
    point: ReusePoint,
}

#[derive(Debug)]
enum TaskEvent {
    SolveFinished {
        generation: u64,
        result: Result<Solution, String>,
    },
    ResolveFinished {
        key: ResolveKey,
        result: Result<File, String>,
    },
}

async fn run_solve(root: Arc<Node>, environment: Arc<dyn Environment>) -> Result<Solution, String> {
    let drive = environment.drive();
    let model = build_model(&root, drive.as_ref())
        .await
        .map_err(|e| e.to_string())?;
    environment
        .solve(Arc::new(model))
        .await
        .map_err(|e| e.to_string())
}

fn panic_payload_to_string(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// `task`, with a panic reported as an error instead of unwinding.
async fn contain_panic<T>(task: impl Future<Output = Result<T, String>>) -> Result<T, String> {
    match AssertUnwindSafe(task).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(format!("worker panicked: {}", panic_payload_to_string(&payload))),
    }
}

async fn run_resolve(
    environment: Arc<dyn Environment>,
    solution: Solution,
    owner_id: String,
    key: ResolveKey,
) -> Result<File, String> {
    environment
        .resolve(&solution, &owner_id, &key.mesh_id, &key.mesh_file_id)
        .await
        .map_err(|e| e.to_string())
}

fn component_commands(
    root: &Arc<Node>,
    owner_id: &str,
    components: &[Component],
) -> Result<Vec<Arc<Command>>, ManagerError> {
    let tags = || vec![FROM_COMPONENT_TAG.to_string()];
    components
        .iter()
        .map(|component| match component {
            Component::Material(params) => {
                let current = material(root).ok_or(ManagerError::MissingMaterial)?;
                let node = Node::material(current.id().clone(), owner_id, *params).with_tags(tags());
                Ok(Command::replace_node(node))
            }
            Component::Remote(remote) => {
                let folder = remote_folder(root).ok_or(ManagerError::MissingRemoteFolder)?;
                let node = Node::remote(owner_id, *remote).with_tags(tags());
                Ok(Command::add_child(folder.id().clone(), node))
            }
        })
        .collect()
}

/// Inputs of a [`StateMgr`]. Only the environment is mandatory.
pub struct StateMgrBuilder {
    id: String,
    name: String,
    from_state: Option<Arc<ProjectState>>,
    prior_commands: Vec<Arc<Command>>,
    components: Vec<Component>,
    environment: Option<Arc<dyn Environment>>,
    config: EngineConfig,
}

impl StateMgrBuilder {
    /// State to continue from. Defaults to a fresh project.
    #[must_use]
    pub fn from_state(mut self, state: Arc<ProjectState>) -> Self {
        self.from_state = Some(state);
        self
    }

    /// Commands replayed on top of the starting tree.
    #[must_use]
    pub fn prior_commands(mut self, commands: Vec<Arc<Command>>) -> Self {
        self.prior_commands = commands;
        self
    }

    #[must_use]
    pub fn components(mut self, components: Vec<Component>) -> Self {
        self.components = components;
        self
    }

    #[must_use]
    pub fn environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Apply components and prior commands, publish the first state and
    /// start a solve if it is needed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<StateMgr, ManagerError> {
        let environment = self.environment.ok_or(ManagerError::MissingEnvironment)?;
        let from_state = match self.from_state {
            Some(state) => state,
            None => Arc::new(ProjectState::from_root(
                self.id.clone(),
                Arc::new(new_project_node(&self.id)),
            )),
        };
        let input_state = ProjectState::new(
            self.id.clone(),
            Some(Arc::clone(&from_state)),
            self.prior_commands.clone(),
            self.components.clone(),
            None,
            None,
        );
        let root = input_state
            .node()
            .or(from_state.node())
            .cloned()
            .ok_or(ManagerError::MissingRoot)?;
        let process = root
            .process_count()
            .cloned()
            .ok_or(ManagerError::NotARoot {
                kind: root.kind().label(),
            })?;

        let mut commands = component_commands(&root, &self.id, &self.components)?;
        commands.extend(self.prior_commands.into_iter().filter(|c| !c.is_init()));
        let updates = if commands.is_empty() {
            vec![Update::init(Arc::clone(&root))]
        } else {
            tree::apply_batch(&root, &commands, &self.id)?
        };

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let last_solution = input_state.solution().cloned().map(|solution| SolutionRef {
            solution,
            point: ReusePoint::Origin,
        });
        let visu = Visu3dState::new(self.name.clone(), environment.drive());
        let mut manager = StateMgr {
            id: self.id,
            name: self.name,
            environment,
            config: self.config,
            latest: Arc::new(input_state.clone()),
            input_state,
            root,
            commands: Vec::new(),
            last_solution,
            process,
            watched: WatchList::default(),
            visu,
            events_tx,
            events_rx,
            generation: 0,
            active_solves: HashMap::new(),
            resolving: HashMap::new(),
            failed_resolves: HashSet::new(),
            history: Vec::new(),
            subscribers: Vec::new(),
            disposed: false,
        };
        tracing::info!(manager = %manager.id, name = %manager.name, "State manager started");
        manager.on_updates(&updates);
        Ok(manager)
    }
}

/// Reconciles one project tree with its environment.
pub struct StateMgr {
    id: String,
    name: String,
    environment: Arc<dyn Environment>,
    config: EngineConfig,
    input_state: ProjectState,
    latest: Arc<ProjectState>,
    root: Arc<Node>,
    /// Every non-`Init` command applied to the live tree, in order.
    commands: Vec<Arc<Command>>,
    last_solution: Option<SolutionRef>,
    process: Arc<ProcessCount>,
    watched: WatchList,
    visu: Visu3dState,
    events_tx: mpsc::Sender<TaskEvent>,
    events_rx: mpsc::Receiver<TaskEvent>,
    generation: u64,
    active_solves: HashMap<u64, ActiveSolve>,
    resolving: HashMap<ResolveKey, AbortHandle>,
    /// Not retried automatically; a new solution or mesh file starts over.
    failed_resolves: HashSet<ResolveKey>,
    history: Vec<ManagerOutput>,
    subscribers: Vec<mpsc::UnboundedSender<ManagerOutput>>,
    disposed: bool,
}

impl StateMgr {
    #[must_use]
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> StateMgrBuilder {
        StateMgrBuilder {
            id: id.into(),
            name: name.into(),
            from_state: None,
            prior_commands: Vec::new(),
            components: Vec::new(),
            environment: None,
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.environment
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// Last published state.
    #[must_use]
    pub fn latest_state(&self) -> Arc<ProjectState> {
        Arc::clone(&self.latest)
    }

    /// Solves and resolves currently running for this tree.
    #[must_use]
    pub fn processing(&self) -> ProcessSnapshot {
        self.process.snapshot()
    }

    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.active_solves.is_empty() || !self.resolving.is_empty()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Every output published so far, then live outputs until disposal.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ManagerOutput> {
        let (tx, rx) = mpsc::unbounded_channel();
        for output in &self.history {
            let _ = tx.send(output.clone());
        }
        if !self.disposed {
            self.subscribers.push(tx);
        }
        rx
    }

    pub fn add_selection_watch(&mut self, node_id: NodeId) {
        self.watched.add(node_id);
    }

    pub fn remove_selection_watch(&mut self, node_id: &NodeId) {
        self.watched.remove(node_id);
    }

    pub fn apply(&mut self, command: Arc<Command>) -> Result<(), ManagerError> {
        self.apply_batch(vec![command])
    }

    /// Apply `commands` as one edit: a single state is published for the
    /// whole batch, or nothing at all if any command is rejected.
    pub fn apply_batch(&mut self, commands: Vec<Arc<Command>>) -> Result<(), ManagerError> {
        self.ensure_live()?;
        let commands: Vec<_> = commands.into_iter().filter(|c| !c.is_init()).collect();
        if commands.is_empty() {
            return Ok(());
        }
        let updates = tree::apply_batch(&self.root, &commands, &self.id)?;
        self.on_updates(&updates);
        Ok(())
    }

    pub fn add_child(&mut self, parent: &NodeId, child: Node) -> Result<NodeId, ManagerError> {
        let id = child.id().clone();
        self.apply(Command::add_child(parent.clone(), child))?;
        Ok(id)
    }

    pub fn remove_node(&mut self, node_id: &NodeId) -> Result<(), ManagerError> {
        self.apply(Command::remove_node(node_id.clone()))
    }

    pub fn replace_node(&mut self, node: Node) -> Result<(), ManagerError> {
        self.apply(Command::replace_node(node))
    }

    pub fn replace_attributes(
        &mut self,
        node_id: &NodeId,
        attributes: NodeAttributes,
    ) -> Result<(), ManagerError> {
        let target = self.node(node_id)?;
        self.apply(Command::replace_attributes(target, attributes))
    }

    pub fn rename(&mut self, node_id: &NodeId, name: impl Into<String>) -> Result<(), ManagerError> {
        self.replace_attributes(node_id, NodeAttributes::name(name))
    }

    /// Replace the parameters of a material, boundary condition, constraint
    /// or remote node.
    pub fn save_node(
        &mut self,
        node_id: &NodeId,
        parameters: impl Into<Parameters>,
    ) -> Result<(), ManagerError> {
        self.replace_attributes(node_id, NodeAttributes::parameters(parameters))
    }

    /// Overwrite the geometry stored in `file_id` and refresh every mesh
    /// node referencing it.
    pub async fn save_mesh(
        &mut self,
        file_id: &FileId,
        surfaces: &[SurfaceGeometry],
    ) -> Result<(), ManagerError> {
        self.ensure_live()?;
        let meshes = find_all(&self.root, |n| {
            n.kind()
                .mesh_info()
                .is_some_and(|info| &info.file_id == file_id)
        });
        let Some(first) = meshes.first() else {
            return Err(ManagerError::UnknownFile {
                file_id: file_id.clone(),
            });
        };
        let bounding_box = surfaces
            .iter()
            .filter_map(SurfaceGeometry::bounding_box)
            .reduce(|acc, bbox| acc.union(&bbox))
            .ok_or(CodecError::Empty)?;
        let text = encode_surfaces(surfaces, first.name());
        self.environment
            .drive()
            .update_content(file_id, text)
            .await?;

        let commands = meshes
            .into_iter()
            .map(|mesh| {
                self.visu.revoke_from(&mesh);
                Command::replace_attributes(
                    mesh,
                    NodeAttributes::mesh_file(file_id.clone(), Some(bounding_box)),
                )
            })
            .collect();
        self.apply_batch(commands)
    }

    /// Store `content` as a new geometry file and attach it to the
    /// discontinuity `parent`.
    pub async fn drop_file(
        &mut self,
        parent: &NodeId,
        file_name: &str,
        content: String,
    ) -> Result<NodeId, ManagerError> {
        self.ensure_live()?;
        let target = self.node(parent)?;
        if !matches!(target.kind(), NodeKind::Discontinuity) {
            return Err(ManagerError::InvalidDropTarget {
                id: parent.clone(),
                kind: target.kind().label(),
            });
        }
        let bounding_box = decode_non_empty(&content)?
            .iter()
            .filter_map(SurfaceGeometry::bounding_box)
            .reduce(|acc, bbox| acc.union(&bbox))
            .ok_or(CodecError::Empty)?;

        let environment = Arc::clone(&self.environment);
        let file = environment
            .drive()
            .create_file(environment.folder_id(), file_name, content)
            .await?;
        tracing::debug!(manager = %self.id, file = %file.id, "Geometry file stored");

        let mesh = Node::discontinuity_mesh(self.id.clone(), file.name, file.id, bounding_box);
        self.add_child(parent, mesh)
    }

    /// Add an observation grid spanning the discontinuities' bounding box
    /// under `parent`. Returns the id of the new mesh node.
    pub async fn add_simple_shape(
        &mut self,
        parent: &NodeId,
        kind: ShapeKind,
        orientation: Orientation,
    ) -> Result<NodeId, ManagerError> {
        self.ensure_live()?;
        self.node(parent)?;
        let scene = scene_bounding_box(&self.root)?;
        let geometry = kind.geometry(orientation, &scene)?;
        let bounding_box = geometry.bounding_box().ok_or(CodecError::Empty)?;

        let uid = uuid::Uuid::new_v4().simple().to_string();
        let text = encode_surfaces(std::slice::from_ref(&geometry), kind.label());
        let environment = Arc::clone(&self.environment);
        let file = environment
            .drive()
            .create_file(environment.folder_id(), &format!("mesh-{uid}.ts"), text)
            .await?;

        let mesh_id = NodeId::new(format!("mesh-{uid}"));
        let mesh = Node::observation_mesh(mesh_id.clone(), self.id.clone(), "mesh", file.id, bounding_box);
        let observation = Node::new(
            NodeId::new(format!("obsNode-{mesh_id}")),
            self.id.clone(),
            format!("{} ({orientation})", kind.label()),
            NodeKind::Observation,
        )
        .with_tags(vec!["folder".to_string()])
        .with_children(vec![Arc::new(mesh)]);
        self.add_child(parent, observation)?;
        Ok(mesh_id)
    }

    pub async fn build_object3d(&self, node_id: &NodeId) -> Result<Arc<DisplayObject>, ManagerError> {
        Ok(self.visu.build_object(&self.root, node_id).await?)
    }

    /// Start a new solve when the current state has none. Returns whether
    /// one was dispatched.
    pub fn retry_solve(&mut self) -> Result<bool, ManagerError> {
        self.ensure_live()?;
        if self.latest.solution().is_some() || !has_discontinuity_mesh(&self.root) {
            return Ok(false);
        }
        let point = self
            .commands
            .last()
            .map_or(ReusePoint::Origin, |c| ReusePoint::After(c.id()));
        self.dispatch_solve(point);
        Ok(true)
    }

    /// Forget failed resolves and resolve every mesh lacking a realization
    /// for the current solution. Returns the number of resolves dispatched.
    pub fn retry_resolves(&mut self) -> Result<usize, ManagerError> {
        self.ensure_live()?;
        self.failed_resolves.clear();
        let Some(solution) = self.latest.solution().cloned() else {
            return Ok(0);
        };
        let before = self.resolving.len();
        let meshes = unresolved_observation_meshes(&self.root, &solution.solution_id, None);
        self.dispatch_resolves(&solution, meshes);
        Ok(self.resolving.len() - before)
    }

    /// Abort running work and close every subscription.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.abort_all();
        self.subscribers.clear();
        self.disposed = true;
        tracing::info!(manager = %self.id, "State manager disposed");
    }

    /// Handle up to `budget` task events without waiting.
    pub fn poll_events(&mut self, budget: usize) -> usize {
        let mut count = 0;
        while count < budget {
            match self.events_rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    count += 1;
                }
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }
        count
    }

    /// [`poll_events`](Self::poll_events) with the configured budget.
    pub fn poll_pending(&mut self) -> usize {
        self.poll_events(self.config.event_budget)
    }

    /// Wait for the next task event and handle it. Returns `false` without
    /// waiting when nothing is running.
    pub async fn process_next_event(&mut self) -> bool {
        if !self.has_pending_work() {
            return false;
        }
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Handle events until no solve or resolve is running, including the
    /// work those events start.
    pub async fn settle(&mut self) {
        while self.process_next_event().await {}
    }

    fn ensure_live(&self) -> Result<(), ManagerError> {
        if self.disposed {
            Err(ManagerError::Disposed)
        } else {
            Ok(())
        }
    }

    fn node(&self, node_id: &NodeId) -> Result<Arc<Node>, ManagerError> {
        find_by_id(&self.root, node_id).ok_or_else(|| {
            TreeError::NodeNotFound {
                id: node_id.clone(),
            }
            .into()
        })
    }

    fn is_current(&self, point: ReusePoint) -> bool {
        let since = match point {
            ReusePoint::Origin => &self.commands[..],
            ReusePoint::After(id) => match self.commands.iter().position(|c| c.id() == id) {
                Some(index) => &self.commands[index + 1..],
                None => return false,
            },
        };
        !needs_solve(since)
    }

    fn reusable_solution(&self) -> Option<Solution> {
        let current = self.last_solution.as_ref()?;
        self.is_current(current.point)
            .then(|| current.solution.clone())
    }

    fn project(&self) -> ProjectState {
        ProjectState::new(
            self.id.clone(),
            self.input_state.initial().cloned(),
            self.commands.clone(),
            self.input_state.components().to_vec(),
            Some(Arc::clone(&self.root)),
            self.reusable_solution(),
        )
    }

    fn publish(&mut self, output: ManagerOutput) {
        self.subscribers.retain(|tx| tx.send(output.clone()).is_ok());
        self.history.push(output);
    }

    fn publish_state(&mut self, state: ProjectState, selection: Vec<Arc<Node>>) {
        let state = Arc::new(state);
        self.latest = Arc::clone(&state);
        self.publish(ManagerOutput::State(ProjectOutput {
            environment: Arc::clone(&self.environment),
            manager_id: self.id.clone(),
            manager_name: self.name.clone(),
            state,
            selection,
        }));
    }

    fn publish_failure(&mut self, context: FailureContext, message: String) {
        self.publish(ManagerOutput::Failure(ProcessFailure { context, message }));
    }

    fn on_updates(&mut self, updates: &[Update]) {
        let Some(last) = updates.last() else {
            return;
        };
        self.root = Arc::clone(&last.new_root);
        for update in updates {
            for node in update.removed.iter().chain(&update.replaced) {
                self.visu.revoke_from(node);
            }
        }
        let batch: Vec<Arc<Command>> = updates
            .iter()
            .map(|u| Arc::clone(&u.command))
            .filter(|c| !c.is_init())
            .collect();
        self.commands.extend(batch.iter().cloned());

        let state = self.project();
        let selection = self.watched.select(updates);
        tracing::debug!(
            manager = %self.id,
            commands = batch.len(),
            solved = state.solution().is_some(),
            "Project state published"
        );
        self.publish_state(state, selection);

        if needs_solve(&batch) && has_discontinuity_mesh(&self.root) {
            let point = batch
                .last()
                .map_or(ReusePoint::Origin, |c| ReusePoint::After(c.id()));
            self.dispatch_solve(point);
        }
        if let Some(solution) = self.latest.solution().cloned() {
            let owner = self
                .config
                .owner_filter_new_meshes
                .then_some(self.id.as_str());
            let meshes = unresolved_observation_meshes(&self.root, &solution.solution_id, owner);
            self.dispatch_resolves(&solution, meshes);
        }
    }

    fn dispatch_solve(&mut self, point: ReusePoint) {
        if self.config.fence_stale_solves {
            for (generation, stale) in self.active_solves.drain() {
                stale.handle.abort();
                self.process.end_solve();
                tracing::debug!(manager = %self.id, generation, "Superseded solve aborted");
            }
        }
        self.generation += 1;
        let generation = self.generation;
        let (handle, registration) = AbortHandle::new_pair();
        self.active_solves
            .insert(generation, ActiveSolve { handle, point });
        self.process.begin_solve();
        tracing::info!(manager = %self.id, generation, "Solve dispatched");

        let task = contain_panic(run_solve(Arc::clone(&self.root), Arc::clone(&self.environment)));
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            if let Ok(result) = Abortable::new(task, registration).await {
                let _ = tx.send(TaskEvent::SolveFinished { generation, result }).await;
            }
        });
    }

    fn dispatch_resolves(&mut self, solution: &Solution, meshes: Vec<Arc<Node>>) {
        for mesh in meshes {
            let Some(info) = mesh.kind().mesh_info() else {
                continue;
            };
            let key = ResolveKey {
                mesh_id: mesh.id().clone(),
                mesh_file_id: info.file_id.clone(),
                solution_id: solution.solution_id.clone(),
            };
            if self.resolving.contains_key(&key) || self.failed_resolves.contains(&key) {
                continue;
            }
            let (handle, registration) = AbortHandle::new_pair();
            self.resolving.insert(key.clone(), handle);
            self.process.begin_resolve(key.mesh_id.clone());
            tracing::debug!(
                manager = %self.id,
                mesh = %key.mesh_id,
                solution = %key.solution_id,
                "Resolve dispatched"
            );

            let task = contain_panic(run_resolve(
                Arc::clone(&self.environment),
                solution.clone(),
                self.id.clone(),
                key.clone(),
            ));
            let tx = self.events_tx.clone();
            tokio::spawn(async move {
                if let Ok(result) = Abortable::new(task, registration).await {
                    let _ = tx.send(TaskEvent::ResolveFinished { key, result }).await;
                }
            });
        }
    }

    fn abort_all(&mut self) {
        for (_, solve) in self.active_solves.drain() {
            solve.handle.abort();
            self.process.end_solve();
        }
        for (key, handle) in self.resolving.drain() {
            handle.abort();
            self.process.end_resolve(&key.mesh_id);
        }
    }

    fn handle_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::SolveFinished { generation, result } => {
                self.on_solve_finished(generation, result);
            }
            TaskEvent::ResolveFinished { key, result } => self.on_resolve_finished(key, result),
        }
    }

    fn on_solve_finished(&mut self, generation: u64, result: Result<Solution, String>) {
        let Some(active) = self.active_solves.remove(&generation) else {
            tracing::debug!(manager = %self.id, generation, "Ignoring result of aborted solve");
            return;
        };
        self.process.end_solve();
        let solution = match result {
            Ok(solution) => solution,
            Err(message) => {
                tracing::warn!(manager = %self.id, generation, error = %message, "Solve failed");
                let command = match active.point {
                    ReusePoint::Origin => None,
                    ReusePoint::After(id) => Some(id),
                };
                self.publish_failure(FailureContext::Solve { command }, message);
                return;
            }
        };
        if !self.is_current(active.point) {
            tracing::info!(
                manager = %self.id,
                generation,
                solution = %solution.solution_id,
                "Discarding solution of an outdated tree"
            );
            return;
        }

        tracing::info!(manager = %self.id, solution = %solution.solution_id, "Solution ready");
        self.last_solution = Some(SolutionRef {
            solution: solution.clone(),
            point: active.point,
        });
        if self.latest.solution() != Some(&solution) {
            let state = self.latest.with_solution(solution.clone());
            self.publish_state(state, Vec::new());
        }
        let meshes = unresolved_observation_meshes(&self.root, &solution.solution_id, None);
        self.dispatch_resolves(&solution, meshes);
    }

    fn on_resolve_finished(&mut self, key: ResolveKey, result: Result<File, String>) {
        if self.resolving.remove(&key).is_none() {
            return;
        }
        self.process.end_resolve(&key.mesh_id);
        let file = match result {
            Ok(file) => file,
            Err(message) => {
                tracing::warn!(
                    manager = %self.id,
                    mesh = %key.mesh_id,
                    error = %message,
                    "Resolve failed"
                );
                self.failed_resolves.insert(key.clone());
                self.publish_failure(
                    FailureContext::Resolve {
                        mesh_id: key.mesh_id,
                        solution_id: key.solution_id,
                    },
                    message,
                );
                return;
            }
        };

        if self.latest.solution().map(|s| &s.solution_id) != Some(&key.solution_id) {
            tracing::debug!(mesh = %key.mesh_id, "Discarding realization of a superseded solution");
            return;
        }
        let Some(mesh) = find_by_id(&self.root, &key.mesh_id) else {
            tracing::debug!(mesh = %key.mesh_id, "Discarding realization of a removed mesh");
            return;
        };
        if !matches!(mesh.kind(), NodeKind::ObservationMesh(info) if info.file_id == key.mesh_file_id) {
            tracing::debug!(mesh = %key.mesh_id, "Discarding realization of changed geometry");
            return;
        }

        let realization = Node::realization(
            NodeId::new(format!("{}{}", self.config.realization_prefix, key.mesh_id)),
            self.id.clone(),
            RealizationInfo {
                file_id: file.id,
                mesh_file_id: key.mesh_file_id,
                solution_id: key.solution_id,
            },
        );
        let resolved = (*mesh)
            .clone()
            .with_owner(self.id.clone())
            .with_children(vec![Arc::new(realization)]);
        if let Err(err) = self.replace_node(resolved) {
            tracing::warn!(manager = %self.id, mesh = %key.mesh_id, error = %err, "Realization rejected");
        }
    }
}

impl Drop for StateMgr {
    fn drop(&mut self) {
        self.abort_all();
    }
}
